//! Domain entities and the repository seam
//!
//! Every domain object belongs to exactly one company (tenant). All repository
//! operations take the tenant id and must never return or touch rows of
//! another tenant; tools rely on this to produce the uniform
//! "not found or you don't have access" behavior.

pub mod memory;
pub mod pg;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Statuses and priority
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "planning",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planning" => Some(Self::Planning),
            "in_progress" => Some(Self::InProgress),
            "on_hold" => Some(Self::OnHold),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "blocked" => Some(Self::Blocked),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    InProgress,
    Completed,
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneStatus::Pending => "pending",
            MilestoneStatus::InProgress => "in_progress",
            MilestoneStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Clone, Debug, Serialize)]
pub struct Project {
    pub id: i64,
    pub company_id: i64,
    pub program_id: Option<i64>,
    pub name: String,
    pub description: String,
    pub methodology: String,
    pub status: ProjectStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget: f64,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Milestone {
    pub id: i64,
    pub company_id: i64,
    pub project_id: i64,
    pub name: String,
    pub description: String,
    pub status: MilestoneStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Task {
    pub id: i64,
    pub company_id: i64,
    pub project_id: Option<i64>,
    pub milestone_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<i64>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Subtask {
    pub id: i64,
    pub task_id: i64,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Program {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tenant member, for assignment resolution
#[derive(Clone, Debug, Serialize)]
pub struct Member {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
}

// ============================================================================
// Creation payloads, patches, filters
// ============================================================================

#[derive(Clone, Debug, Default)]
pub struct NewProject {
    pub program_id: Option<i64>,
    pub name: String,
    pub description: String,
    pub methodology: String,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget: f64,
}

#[derive(Clone, Debug, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub methodology: Option<String>,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget: Option<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub program_id: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub struct NewMilestone {
    pub project_id: i64,
    pub name: String,
    pub description: String,
    pub status: Option<MilestoneStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default)]
pub struct MilestonePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<MilestoneStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default)]
pub struct MilestoneFilter {
    pub project_id: Option<i64>,
    pub status: Option<MilestoneStatus>,
}

#[derive(Clone, Debug, Default)]
pub struct NewTask {
    pub project_id: Option<i64>,
    pub milestone_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub assigned_to: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub struct TaskFilter {
    pub project_id: Option<i64>,
    pub milestone_id: Option<i64>,
    pub status: Option<TaskStatus>,
    pub assigned_to: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub struct NewProgram {
    pub name: String,
    pub description: String,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default)]
pub struct ProgramPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default)]
pub struct ProgramFilter {
    pub status: Option<ProjectStatus>,
}

// ============================================================================
// Structured-generation plan (fully resolved dates, persisted atomically)
// ============================================================================

#[derive(Clone, Debug)]
pub struct StructurePlan {
    pub milestones: Vec<PlannedMilestone>,
    /// New project end date, when the generated timeline runs past the
    /// current one
    pub project_end: Option<NaiveDate>,
}

#[derive(Clone, Debug)]
pub struct PlannedMilestone {
    pub name: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub tasks: Vec<PlannedTask>,
}

#[derive(Clone, Debug)]
pub struct PlannedTask {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    pub subtasks: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StructureOutcome {
    pub milestones_created: usize,
    pub tasks_created: usize,
    pub subtasks_created: usize,
    pub project_end_updated: bool,
}

// ============================================================================
// Repository traits
// ============================================================================

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn get(&self, company_id: i64, id: i64) -> Result<Option<Project>>;
    async fn list(&self, company_id: i64, filter: &ProjectFilter) -> Result<Vec<Project>>;
    async fn create(&self, company_id: i64, created_by: i64, new: NewProject) -> Result<Project>;
    async fn update(&self, company_id: i64, id: i64, patch: ProjectPatch)
        -> Result<Option<Project>>;
    async fn delete(&self, company_id: i64, id: i64) -> Result<bool>;
    /// Percentage of done tasks across the project, 0..=100
    async fn compute_progress_from_work(&self, company_id: i64, id: i64) -> Result<f64>;
}

#[async_trait]
pub trait MilestoneRepository: Send + Sync {
    async fn get(&self, company_id: i64, id: i64) -> Result<Option<Milestone>>;
    async fn list(&self, company_id: i64, filter: &MilestoneFilter) -> Result<Vec<Milestone>>;
    async fn create(&self, company_id: i64, new: NewMilestone) -> Result<Milestone>;
    async fn update(
        &self,
        company_id: i64,
        id: i64,
        patch: MilestonePatch,
    ) -> Result<Option<Milestone>>;
    async fn delete(&self, company_id: i64, id: i64) -> Result<bool>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn get(&self, company_id: i64, id: i64) -> Result<Option<Task>>;
    async fn list(&self, company_id: i64, filter: &TaskFilter) -> Result<Vec<Task>>;
    async fn create(&self, company_id: i64, created_by: i64, new: NewTask) -> Result<Task>;
    async fn update(&self, company_id: i64, id: i64, patch: TaskPatch) -> Result<Option<Task>>;
    async fn delete(&self, company_id: i64, id: i64) -> Result<bool>;
}

#[async_trait]
pub trait SubtaskRepository: Send + Sync {
    async fn list(&self, task_id: i64) -> Result<Vec<Subtask>>;
    async fn create(&self, task_id: i64, title: &str) -> Result<Subtask>;
    async fn count_for_task(&self, task_id: i64) -> Result<i64>;
}

#[async_trait]
pub trait ProgramRepository: Send + Sync {
    async fn get(&self, company_id: i64, id: i64) -> Result<Option<Program>>;
    async fn list(&self, company_id: i64, filter: &ProgramFilter) -> Result<Vec<Program>>;
    async fn create(&self, company_id: i64, new: NewProgram) -> Result<Program>;
    async fn update(
        &self,
        company_id: i64,
        id: i64,
        patch: ProgramPatch,
    ) -> Result<Option<Program>>;
    async fn delete(&self, company_id: i64, id: i64) -> Result<bool>;
}

#[async_trait]
pub trait MemberRepository: Send + Sync {
    async fn get(&self, company_id: i64, id: i64) -> Result<Option<Member>>;
}

/// Writes a fully-resolved structure plan in one unit of work.
///
/// A mid-plan failure must leave the project untouched; the Postgres
/// implementation wraps the whole plan in one transaction.
#[async_trait]
pub trait StructureWriter: Send + Sync {
    async fn persist_structure(
        &self,
        company_id: i64,
        created_by: i64,
        project_id: i64,
        plan: &StructurePlan,
    ) -> Result<StructureOutcome>;
}

/// Bundle of repository handles handed to tools and the form handler
#[derive(Clone)]
pub struct Repositories {
    pub projects: Arc<dyn ProjectRepository>,
    pub milestones: Arc<dyn MilestoneRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub subtasks: Arc<dyn SubtaskRepository>,
    pub programs: Arc<dyn ProgramRepository>,
    pub members: Arc<dyn MemberRepository>,
    pub structure: Arc<dyn StructureWriter>,
}
