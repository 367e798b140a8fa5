//! Postgres repositories
//!
//! Diesel over one shared connection behind an async mutex. Status and
//! priority enums live in text columns; a row with an unrecognized value is a
//! data error and surfaces as such instead of being silently coerced.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::*;
use crate::auth::{AuthProvider, AuthUser, Role};
use crate::chat::{Chat, ChatPage, ChatStore, MessageRole, StoredMessage};
use crate::schema::{chat_messages, chats, milestones, programs, projects, subtasks, tasks, users};

pub type SharedConnection = Arc<Mutex<PgConnection>>;

// ============================================================================
// Row types
// ============================================================================

#[derive(Queryable)]
struct ProjectRow {
    id: i64,
    company_id: i64,
    program_id: Option<i64>,
    name: String,
    description: String,
    methodology: String,
    status: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    budget: f64,
    created_by: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProjectRow {
    fn into_domain(self) -> Result<Project> {
        Ok(Project {
            id: self.id,
            company_id: self.company_id,
            program_id: self.program_id,
            name: self.name,
            description: self.description,
            methodology: self.methodology,
            status: ProjectStatus::parse(&self.status)
                .ok_or_else(|| anyhow!("unknown project status '{}'", self.status))?,
            start_date: self.start_date,
            end_date: self.end_date,
            budget: self.budget,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = projects)]
struct NewProjectRow<'a> {
    company_id: i64,
    program_id: Option<i64>,
    name: &'a str,
    description: &'a str,
    methodology: &'a str,
    status: &'a str,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    budget: f64,
    created_by: i64,
}

#[derive(AsChangeset)]
#[diesel(table_name = projects)]
struct ProjectChangeset {
    name: Option<String>,
    description: Option<String>,
    methodology: Option<String>,
    status: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    budget: Option<f64>,
    updated_at: DateTime<Utc>,
}

#[derive(Queryable)]
struct MilestoneRow {
    id: i64,
    company_id: i64,
    project_id: i64,
    name: String,
    description: String,
    status: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MilestoneRow {
    fn into_domain(self) -> Result<Milestone> {
        Ok(Milestone {
            id: self.id,
            company_id: self.company_id,
            project_id: self.project_id,
            name: self.name,
            description: self.description,
            status: MilestoneStatus::parse(&self.status)
                .ok_or_else(|| anyhow!("unknown milestone status '{}'", self.status))?,
            start_date: self.start_date,
            end_date: self.end_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = milestones)]
struct NewMilestoneRow<'a> {
    company_id: i64,
    project_id: i64,
    name: &'a str,
    description: &'a str,
    status: &'a str,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

#[derive(AsChangeset)]
#[diesel(table_name = milestones)]
struct MilestoneChangeset {
    name: Option<String>,
    description: Option<String>,
    status: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    updated_at: DateTime<Utc>,
}

#[derive(Queryable)]
struct TaskRow {
    id: i64,
    company_id: i64,
    project_id: Option<i64>,
    milestone_id: Option<i64>,
    title: String,
    description: String,
    status: String,
    priority: String,
    start_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    assigned_to: Option<i64>,
    created_by: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_domain(self) -> Result<Task> {
        Ok(Task {
            id: self.id,
            company_id: self.company_id,
            project_id: self.project_id,
            milestone_id: self.milestone_id,
            title: self.title,
            description: self.description,
            status: TaskStatus::parse(&self.status)
                .ok_or_else(|| anyhow!("unknown task status '{}'", self.status))?,
            priority: Priority::parse(&self.priority)
                .ok_or_else(|| anyhow!("unknown task priority '{}'", self.priority))?,
            start_date: self.start_date,
            due_date: self.due_date,
            assigned_to: self.assigned_to,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = tasks)]
struct NewTaskRow<'a> {
    company_id: i64,
    project_id: Option<i64>,
    milestone_id: Option<i64>,
    title: &'a str,
    description: &'a str,
    status: &'a str,
    priority: &'a str,
    start_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    assigned_to: Option<i64>,
    created_by: i64,
}

#[derive(AsChangeset)]
#[diesel(table_name = tasks)]
struct TaskChangeset {
    title: Option<String>,
    description: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    start_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    assigned_to: Option<i64>,
    updated_at: DateTime<Utc>,
}

#[derive(Queryable)]
struct SubtaskRow {
    id: i64,
    task_id: i64,
    title: String,
    completed: bool,
    created_at: DateTime<Utc>,
}

impl SubtaskRow {
    fn into_domain(self) -> Subtask {
        Subtask {
            id: self.id,
            task_id: self.task_id,
            title: self.title,
            completed: self.completed,
            created_at: self.created_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = subtasks)]
struct NewSubtaskRow<'a> {
    task_id: i64,
    title: &'a str,
    completed: bool,
}

#[derive(Queryable)]
struct ProgramRow {
    id: i64,
    company_id: i64,
    name: String,
    description: String,
    status: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProgramRow {
    fn into_domain(self) -> Result<Program> {
        Ok(Program {
            id: self.id,
            company_id: self.company_id,
            name: self.name,
            description: self.description,
            status: ProjectStatus::parse(&self.status)
                .ok_or_else(|| anyhow!("unknown program status '{}'", self.status))?,
            start_date: self.start_date,
            end_date: self.end_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = programs)]
struct NewProgramRow<'a> {
    company_id: i64,
    name: &'a str,
    description: &'a str,
    status: &'a str,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

#[derive(AsChangeset)]
#[diesel(table_name = programs)]
struct ProgramChangeset {
    name: Option<String>,
    description: Option<String>,
    status: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    updated_at: DateTime<Utc>,
}

#[derive(Queryable)]
struct ChatRow {
    id: Uuid,
    user_id: i64,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ChatRow {
    fn into_domain(self) -> Chat {
        Chat {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = chats)]
struct NewChatRow<'a> {
    id: Uuid,
    user_id: i64,
    title: &'a str,
}

#[derive(Queryable)]
struct MessageRow {
    id: Uuid,
    chat_id: Uuid,
    role: String,
    content: String,
    raw_output: Option<String>,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    fn into_domain(self) -> Result<StoredMessage> {
        Ok(StoredMessage {
            id: self.id,
            chat_id: self.chat_id,
            role: MessageRole::parse(&self.role)
                .ok_or_else(|| anyhow!("unknown message role '{}'", self.role))?,
            content: self.content,
            raw_output: self.raw_output,
            created_at: self.created_at,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = chat_messages)]
struct NewMessageRow<'a> {
    id: Uuid,
    chat_id: Uuid,
    role: &'a str,
    content: &'a str,
    raw_output: Option<&'a str>,
}

// ============================================================================
// Repositories
// ============================================================================

pub struct PgRepositories {
    conn: SharedConnection,
}

impl PgRepositories {
    pub fn new(conn: SharedConnection) -> Arc<Self> {
        Arc::new(Self { conn })
    }
}

impl Repositories {
    /// All repository handles backed by one Postgres connection
    pub fn postgres(conn: SharedConnection) -> Self {
        let pg = PgRepositories::new(conn);
        Self {
            projects: pg.clone(),
            milestones: pg.clone(),
            tasks: pg.clone(),
            subtasks: pg.clone(),
            programs: pg.clone(),
            members: pg.clone(),
            structure: pg,
        }
    }
}

fn insert_milestone_tx(
    conn: &mut PgConnection,
    company_id: i64,
    new: &NewMilestone,
) -> QueryResult<MilestoneRow> {
    diesel::insert_into(milestones::table)
        .values(NewMilestoneRow {
            company_id,
            project_id: new.project_id,
            name: &new.name,
            description: &new.description,
            status: new.status.unwrap_or(MilestoneStatus::Pending).as_str(),
            start_date: new.start_date,
            end_date: new.end_date,
        })
        .get_result(conn)
}

fn insert_task_tx(
    conn: &mut PgConnection,
    company_id: i64,
    created_by: i64,
    new: &NewTask,
) -> QueryResult<TaskRow> {
    diesel::insert_into(tasks::table)
        .values(NewTaskRow {
            company_id,
            project_id: new.project_id,
            milestone_id: new.milestone_id,
            title: &new.title,
            description: &new.description,
            status: new.status.unwrap_or(TaskStatus::Todo).as_str(),
            priority: new.priority.unwrap_or(Priority::Medium).as_str(),
            start_date: new.start_date,
            due_date: new.due_date,
            assigned_to: new.assigned_to,
            created_by,
        })
        .get_result(conn)
}

#[async_trait]
impl ProjectRepository for PgRepositories {
    async fn get(&self, company_id: i64, id: i64) -> Result<Option<Project>> {
        let mut conn = self.conn.lock().await;
        projects::table
            .filter(projects::company_id.eq(company_id))
            .filter(projects::id.eq(id))
            .first::<ProjectRow>(&mut *conn)
            .optional()
            .context("loading project")?
            .map(ProjectRow::into_domain)
            .transpose()
    }

    async fn list(&self, company_id: i64, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let mut conn = self.conn.lock().await;
        let mut query = projects::table
            .filter(projects::company_id.eq(company_id))
            .into_boxed();
        if let Some(status) = filter.status {
            query = query.filter(projects::status.eq(status.as_str()));
        }
        if let Some(program_id) = filter.program_id {
            query = query.filter(projects::program_id.eq(program_id));
        }
        query
            .order(projects::id.asc())
            .load::<ProjectRow>(&mut *conn)
            .context("listing projects")?
            .into_iter()
            .map(ProjectRow::into_domain)
            .collect()
    }

    async fn create(&self, company_id: i64, created_by: i64, new: NewProject) -> Result<Project> {
        let mut conn = self.conn.lock().await;
        diesel::insert_into(projects::table)
            .values(NewProjectRow {
                company_id,
                program_id: new.program_id,
                name: &new.name,
                description: &new.description,
                methodology: &new.methodology,
                status: new.status.unwrap_or(ProjectStatus::Planning).as_str(),
                start_date: new.start_date,
                end_date: new.end_date,
                budget: new.budget,
                created_by,
            })
            .get_result::<ProjectRow>(&mut *conn)
            .context("creating project")?
            .into_domain()
    }

    async fn update(
        &self,
        company_id: i64,
        id: i64,
        patch: ProjectPatch,
    ) -> Result<Option<Project>> {
        let mut conn = self.conn.lock().await;
        diesel::update(
            projects::table
                .filter(projects::company_id.eq(company_id))
                .filter(projects::id.eq(id)),
        )
        .set(ProjectChangeset {
            name: patch.name,
            description: patch.description,
            methodology: patch.methodology,
            status: patch.status.map(|s| s.as_str().to_string()),
            start_date: patch.start_date,
            end_date: patch.end_date,
            budget: patch.budget,
            updated_at: Utc::now(),
        })
        .get_result::<ProjectRow>(&mut *conn)
        .optional()
        .context("updating project")?
        .map(ProjectRow::into_domain)
        .transpose()
    }

    async fn delete(&self, company_id: i64, id: i64) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let deleted = diesel::delete(
            projects::table
                .filter(projects::company_id.eq(company_id))
                .filter(projects::id.eq(id)),
        )
        .execute(&mut *conn)
        .context("deleting project")?;
        Ok(deleted > 0)
    }

    async fn compute_progress_from_work(&self, company_id: i64, id: i64) -> Result<f64> {
        let mut conn = self.conn.lock().await;
        let total: i64 = tasks::table
            .filter(tasks::company_id.eq(company_id))
            .filter(tasks::project_id.eq(id))
            .count()
            .get_result(&mut *conn)
            .context("counting project tasks")?;
        if total == 0 {
            return Ok(0.0);
        }
        let done: i64 = tasks::table
            .filter(tasks::company_id.eq(company_id))
            .filter(tasks::project_id.eq(id))
            .filter(tasks::status.eq(TaskStatus::Done.as_str()))
            .count()
            .get_result(&mut *conn)
            .context("counting done tasks")?;
        Ok(done as f64 * 100.0 / total as f64)
    }
}

#[async_trait]
impl MilestoneRepository for PgRepositories {
    async fn get(&self, company_id: i64, id: i64) -> Result<Option<Milestone>> {
        let mut conn = self.conn.lock().await;
        milestones::table
            .filter(milestones::company_id.eq(company_id))
            .filter(milestones::id.eq(id))
            .first::<MilestoneRow>(&mut *conn)
            .optional()
            .context("loading milestone")?
            .map(MilestoneRow::into_domain)
            .transpose()
    }

    async fn list(&self, company_id: i64, filter: &MilestoneFilter) -> Result<Vec<Milestone>> {
        let mut conn = self.conn.lock().await;
        let mut query = milestones::table
            .filter(milestones::company_id.eq(company_id))
            .into_boxed();
        if let Some(project_id) = filter.project_id {
            query = query.filter(milestones::project_id.eq(project_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(milestones::status.eq(status.as_str()));
        }
        query
            .order(milestones::id.asc())
            .load::<MilestoneRow>(&mut *conn)
            .context("listing milestones")?
            .into_iter()
            .map(MilestoneRow::into_domain)
            .collect()
    }

    async fn create(&self, company_id: i64, new: NewMilestone) -> Result<Milestone> {
        let mut conn = self.conn.lock().await;
        insert_milestone_tx(&mut conn, company_id, &new)
            .context("creating milestone")?
            .into_domain()
    }

    async fn update(
        &self,
        company_id: i64,
        id: i64,
        patch: MilestonePatch,
    ) -> Result<Option<Milestone>> {
        let mut conn = self.conn.lock().await;
        diesel::update(
            milestones::table
                .filter(milestones::company_id.eq(company_id))
                .filter(milestones::id.eq(id)),
        )
        .set(MilestoneChangeset {
            name: patch.name,
            description: patch.description,
            status: patch.status.map(|s| s.as_str().to_string()),
            start_date: patch.start_date,
            end_date: patch.end_date,
            updated_at: Utc::now(),
        })
        .get_result::<MilestoneRow>(&mut *conn)
        .optional()
        .context("updating milestone")?
        .map(MilestoneRow::into_domain)
        .transpose()
    }

    async fn delete(&self, company_id: i64, id: i64) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let deleted = diesel::delete(
            milestones::table
                .filter(milestones::company_id.eq(company_id))
                .filter(milestones::id.eq(id)),
        )
        .execute(&mut *conn)
        .context("deleting milestone")?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl TaskRepository for PgRepositories {
    async fn get(&self, company_id: i64, id: i64) -> Result<Option<Task>> {
        let mut conn = self.conn.lock().await;
        tasks::table
            .filter(tasks::company_id.eq(company_id))
            .filter(tasks::id.eq(id))
            .first::<TaskRow>(&mut *conn)
            .optional()
            .context("loading task")?
            .map(TaskRow::into_domain)
            .transpose()
    }

    async fn list(&self, company_id: i64, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut conn = self.conn.lock().await;
        let mut query = tasks::table
            .filter(tasks::company_id.eq(company_id))
            .into_boxed();
        if let Some(project_id) = filter.project_id {
            query = query.filter(tasks::project_id.eq(project_id));
        }
        if let Some(milestone_id) = filter.milestone_id {
            query = query.filter(tasks::milestone_id.eq(milestone_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(tasks::status.eq(status.as_str()));
        }
        if let Some(assigned_to) = filter.assigned_to {
            query = query.filter(tasks::assigned_to.eq(assigned_to));
        }
        query
            .order(tasks::id.asc())
            .load::<TaskRow>(&mut *conn)
            .context("listing tasks")?
            .into_iter()
            .map(TaskRow::into_domain)
            .collect()
    }

    async fn create(&self, company_id: i64, created_by: i64, new: NewTask) -> Result<Task> {
        let mut conn = self.conn.lock().await;
        insert_task_tx(&mut conn, company_id, created_by, &new)
            .context("creating task")?
            .into_domain()
    }

    async fn update(&self, company_id: i64, id: i64, patch: TaskPatch) -> Result<Option<Task>> {
        let mut conn = self.conn.lock().await;
        diesel::update(
            tasks::table
                .filter(tasks::company_id.eq(company_id))
                .filter(tasks::id.eq(id)),
        )
        .set(TaskChangeset {
            title: patch.title,
            description: patch.description,
            status: patch.status.map(|s| s.as_str().to_string()),
            priority: patch.priority.map(|p| p.as_str().to_string()),
            start_date: patch.start_date,
            due_date: patch.due_date,
            assigned_to: patch.assigned_to,
            updated_at: Utc::now(),
        })
        .get_result::<TaskRow>(&mut *conn)
        .optional()
        .context("updating task")?
        .map(TaskRow::into_domain)
        .transpose()
    }

    async fn delete(&self, company_id: i64, id: i64) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let deleted = diesel::delete(
            tasks::table
                .filter(tasks::company_id.eq(company_id))
                .filter(tasks::id.eq(id)),
        )
        .execute(&mut *conn)
        .context("deleting task")?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl SubtaskRepository for PgRepositories {
    async fn list(&self, task_id: i64) -> Result<Vec<Subtask>> {
        let mut conn = self.conn.lock().await;
        Ok(subtasks::table
            .filter(subtasks::task_id.eq(task_id))
            .order(subtasks::id.asc())
            .load::<SubtaskRow>(&mut *conn)
            .context("listing subtasks")?
            .into_iter()
            .map(SubtaskRow::into_domain)
            .collect())
    }

    async fn create(&self, task_id: i64, title: &str) -> Result<Subtask> {
        let mut conn = self.conn.lock().await;
        Ok(diesel::insert_into(subtasks::table)
            .values(NewSubtaskRow {
                task_id,
                title,
                completed: false,
            })
            .get_result::<SubtaskRow>(&mut *conn)
            .context("creating subtask")?
            .into_domain())
    }

    async fn count_for_task(&self, task_id: i64) -> Result<i64> {
        let mut conn = self.conn.lock().await;
        subtasks::table
            .filter(subtasks::task_id.eq(task_id))
            .count()
            .get_result(&mut *conn)
            .context("counting subtasks")
    }
}

#[async_trait]
impl ProgramRepository for PgRepositories {
    async fn get(&self, company_id: i64, id: i64) -> Result<Option<Program>> {
        let mut conn = self.conn.lock().await;
        programs::table
            .filter(programs::company_id.eq(company_id))
            .filter(programs::id.eq(id))
            .first::<ProgramRow>(&mut *conn)
            .optional()
            .context("loading program")?
            .map(ProgramRow::into_domain)
            .transpose()
    }

    async fn list(&self, company_id: i64, filter: &ProgramFilter) -> Result<Vec<Program>> {
        let mut conn = self.conn.lock().await;
        let mut query = programs::table
            .filter(programs::company_id.eq(company_id))
            .into_boxed();
        if let Some(status) = filter.status {
            query = query.filter(programs::status.eq(status.as_str()));
        }
        query
            .order(programs::id.asc())
            .load::<ProgramRow>(&mut *conn)
            .context("listing programs")?
            .into_iter()
            .map(ProgramRow::into_domain)
            .collect()
    }

    async fn create(&self, company_id: i64, new: NewProgram) -> Result<Program> {
        let mut conn = self.conn.lock().await;
        diesel::insert_into(programs::table)
            .values(NewProgramRow {
                company_id,
                name: &new.name,
                description: &new.description,
                status: new.status.unwrap_or(ProjectStatus::Planning).as_str(),
                start_date: new.start_date,
                end_date: new.end_date,
            })
            .get_result::<ProgramRow>(&mut *conn)
            .context("creating program")?
            .into_domain()
    }

    async fn update(
        &self,
        company_id: i64,
        id: i64,
        patch: ProgramPatch,
    ) -> Result<Option<Program>> {
        let mut conn = self.conn.lock().await;
        diesel::update(
            programs::table
                .filter(programs::company_id.eq(company_id))
                .filter(programs::id.eq(id)),
        )
        .set(ProgramChangeset {
            name: patch.name,
            description: patch.description,
            status: patch.status.map(|s| s.as_str().to_string()),
            start_date: patch.start_date,
            end_date: patch.end_date,
            updated_at: Utc::now(),
        })
        .get_result::<ProgramRow>(&mut *conn)
        .optional()
        .context("updating program")?
        .map(ProgramRow::into_domain)
        .transpose()
    }

    async fn delete(&self, company_id: i64, id: i64) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        let deleted = diesel::delete(
            programs::table
                .filter(programs::company_id.eq(company_id))
                .filter(programs::id.eq(id)),
        )
        .execute(&mut *conn)
        .context("deleting program")?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl MemberRepository for PgRepositories {
    async fn get(&self, company_id: i64, id: i64) -> Result<Option<Member>> {
        let mut conn = self.conn.lock().await;
        Ok(users::table
            .filter(users::company_id.eq(company_id))
            .filter(users::id.eq(id))
            .select((
                users::id,
                users::company_id,
                users::name,
                users::email,
                users::role,
            ))
            .first::<(i64, i64, String, String, String)>(&mut *conn)
            .optional()
            .context("loading member")?
            .map(|(id, company_id, name, email, role)| Member {
                id,
                company_id,
                name,
                email,
                role,
            }))
    }
}

#[async_trait]
impl StructureWriter for PgRepositories {
    async fn persist_structure(
        &self,
        company_id: i64,
        created_by: i64,
        project_id: i64,
        plan: &StructurePlan,
    ) -> Result<StructureOutcome> {
        let mut conn = self.conn.lock().await;
        let outcome = conn.transaction::<StructureOutcome, anyhow::Error, _>(|conn| {
            let owned: i64 = projects::table
                .filter(projects::company_id.eq(company_id))
                .filter(projects::id.eq(project_id))
                .count()
                .get_result(conn)?;
            if owned == 0 {
                anyhow::bail!("project {} not found for company {}", project_id, company_id);
            }

            let mut outcome = StructureOutcome::default();
            for planned in &plan.milestones {
                let milestone = insert_milestone_tx(
                    conn,
                    company_id,
                    &NewMilestone {
                        project_id,
                        name: planned.name.clone(),
                        description: planned.description.clone(),
                        status: Some(MilestoneStatus::Pending),
                        start_date: Some(planned.start_date),
                        end_date: Some(planned.end_date),
                    },
                )?;
                outcome.milestones_created += 1;

                for planned_task in &planned.tasks {
                    let task = insert_task_tx(
                        conn,
                        company_id,
                        created_by,
                        &NewTask {
                            project_id: Some(project_id),
                            milestone_id: Some(milestone.id),
                            title: planned_task.title.clone(),
                            description: planned_task.description.clone(),
                            status: Some(TaskStatus::Todo),
                            priority: Some(planned_task.priority),
                            start_date: Some(planned_task.start_date),
                            due_date: Some(planned_task.due_date),
                            assigned_to: None,
                        },
                    )?;
                    outcome.tasks_created += 1;

                    for title in &planned_task.subtasks {
                        diesel::insert_into(subtasks::table)
                            .values(NewSubtaskRow {
                                task_id: task.id,
                                title,
                                completed: false,
                            })
                            .execute(conn)?;
                        outcome.subtasks_created += 1;
                    }
                }
            }

            if let Some(new_end) = plan.project_end {
                diesel::update(
                    projects::table
                        .filter(projects::company_id.eq(company_id))
                        .filter(projects::id.eq(project_id)),
                )
                .set((
                    projects::end_date.eq(Some(new_end)),
                    projects::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
                outcome.project_end_updated = true;
            }

            Ok(outcome)
        })?;
        Ok(outcome)
    }
}

// ============================================================================
// Chat store
// ============================================================================

pub struct PgChatStore {
    conn: SharedConnection,
}

impl PgChatStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn create_chat(&self, user_id: i64, title: &str) -> Result<Chat> {
        let mut conn = self.conn.lock().await;
        Ok(diesel::insert_into(chats::table)
            .values(NewChatRow {
                id: Uuid::new_v4(),
                user_id,
                title,
            })
            .get_result::<ChatRow>(&mut *conn)
            .context("creating chat")?
            .into_domain())
    }

    async fn get_chat(&self, chat_id: Uuid) -> Result<Option<Chat>> {
        let mut conn = self.conn.lock().await;
        Ok(chats::table
            .filter(chats::id.eq(chat_id))
            .first::<ChatRow>(&mut *conn)
            .optional()
            .context("loading chat")?
            .map(ChatRow::into_domain))
    }

    async fn list_chats(&self, user_id: i64, page: usize, size: usize) -> Result<ChatPage> {
        let mut conn = self.conn.lock().await;
        let page = page.max(1);
        let size = size.clamp(1, 100);

        let total: i64 = chats::table
            .filter(chats::user_id.eq(user_id))
            .count()
            .get_result(&mut *conn)
            .context("counting chats")?;

        let rows = chats::table
            .filter(chats::user_id.eq(user_id))
            .order(chats::updated_at.desc())
            .offset(((page - 1) * size) as i64)
            .limit(size as i64)
            .load::<ChatRow>(&mut *conn)
            .context("listing chats")?;

        Ok(ChatPage {
            chats: rows.into_iter().map(ChatRow::into_domain).collect(),
            total: total as usize,
            page,
            size,
        })
    }

    async fn search_chats(&self, user_id: i64, query: &str) -> Result<Vec<Chat>> {
        let mut conn = self.conn.lock().await;
        let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));
        Ok(chats::table
            .filter(chats::user_id.eq(user_id))
            .filter(chats::title.ilike(pattern))
            .order(chats::updated_at.desc())
            .load::<ChatRow>(&mut *conn)
            .context("searching chats")?
            .into_iter()
            .map(ChatRow::into_domain)
            .collect())
    }

    async fn append_message(
        &self,
        chat_id: Uuid,
        role: MessageRole,
        content: &str,
        raw_output: Option<&str>,
    ) -> Result<StoredMessage> {
        let mut conn = self.conn.lock().await;
        let message = conn.transaction::<MessageRow, anyhow::Error, _>(|conn| {
            let row = diesel::insert_into(chat_messages::table)
                .values(NewMessageRow {
                    id: Uuid::new_v4(),
                    chat_id,
                    role: role.as_str(),
                    content,
                    raw_output,
                })
                .get_result::<MessageRow>(conn)?;
            diesel::update(chats::table.filter(chats::id.eq(chat_id)))
                .set(chats::updated_at.eq(row.created_at))
                .execute(conn)?;
            Ok(row)
        })?;
        message.into_domain()
    }

    async fn history(&self, chat_id: Uuid) -> Result<Vec<StoredMessage>> {
        let mut conn = self.conn.lock().await;
        chat_messages::table
            .filter(chat_messages::chat_id.eq(chat_id))
            .order(chat_messages::created_at.asc())
            .load::<MessageRow>(&mut *conn)
            .context("loading history")?
            .into_iter()
            .map(MessageRow::into_domain)
            .collect()
    }

    async fn get_message(&self, chat_id: Uuid, message_id: Uuid) -> Result<Option<StoredMessage>> {
        let mut conn = self.conn.lock().await;
        chat_messages::table
            .filter(chat_messages::chat_id.eq(chat_id))
            .filter(chat_messages::id.eq(message_id))
            .first::<MessageRow>(&mut *conn)
            .optional()
            .context("loading message")?
            .map(MessageRow::into_domain)
            .transpose()
    }

    async fn update_message_content(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        content: &str,
    ) -> Result<Option<StoredMessage>> {
        let mut conn = self.conn.lock().await;
        diesel::update(
            chat_messages::table
                .filter(chat_messages::chat_id.eq(chat_id))
                .filter(chat_messages::id.eq(message_id)),
        )
        .set(chat_messages::content.eq(content))
        .get_result::<MessageRow>(&mut *conn)
        .optional()
        .context("updating message")?
        .map(MessageRow::into_domain)
        .transpose()
    }

    async fn delete_messages_after(&self, chat_id: Uuid, after: DateTime<Utc>) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        diesel::delete(
            chat_messages::table
                .filter(chat_messages::chat_id.eq(chat_id))
                .filter(chat_messages::created_at.gt(after)),
        )
        .execute(&mut *conn)
        .context("deleting messages")
    }
}

// ============================================================================
// Token resolution
// ============================================================================

pub struct PgAuthProvider {
    conn: SharedConnection,
}

impl PgAuthProvider {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl AuthProvider for PgAuthProvider {
    async fn resolve(&self, token: &str) -> Option<AuthUser> {
        let mut conn = self.conn.lock().await;
        let row = users::table
            .filter(users::api_token.eq(token))
            .select((users::id, users::name, users::role, users::company_id))
            .first::<(i64, String, String, i64)>(&mut *conn)
            .optional()
            .ok()??;
        let role = Role::parse(&row.2)?;
        Some(AuthUser {
            id: row.0,
            name: row.1,
            role,
            company_id: row.3,
        })
    }
}
