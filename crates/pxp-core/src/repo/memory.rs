//! In-memory repositories
//!
//! Backs the test suite and local development without Postgres. One store
//! implements every repository trait; `Repositories::in_memory()` clones the
//! same `Arc` into each handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use super::*;

#[derive(Default)]
struct Tables {
    projects: HashMap<i64, Project>,
    milestones: HashMap<i64, Milestone>,
    tasks: HashMap<i64, Task>,
    subtasks: HashMap<i64, Subtask>,
    programs: HashMap<i64, Program>,
    members: HashMap<i64, Member>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    next_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tables: Mutex::new(Tables::default()),
            next_id: AtomicI64::new(1),
        })
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().expect("store poisoned")
    }

    /// Seed a tenant member (tests)
    pub fn add_member(&self, member: Member) {
        self.lock().members.insert(member.id, member);
    }

    fn insert_project(
        &self,
        tables: &mut Tables,
        company_id: i64,
        created_by: i64,
        new: NewProject,
    ) -> Project {
        let now = Utc::now();
        let project = Project {
            id: self.allocate_id(),
            company_id,
            program_id: new.program_id,
            name: new.name,
            description: new.description,
            methodology: new.methodology,
            status: new.status.unwrap_or(ProjectStatus::Planning),
            start_date: new.start_date,
            end_date: new.end_date,
            budget: new.budget,
            created_by,
            created_at: now,
            updated_at: now,
        };
        tables.projects.insert(project.id, project.clone());
        project
    }

    fn insert_milestone(
        &self,
        tables: &mut Tables,
        company_id: i64,
        new: NewMilestone,
    ) -> Milestone {
        let now = Utc::now();
        let milestone = Milestone {
            id: self.allocate_id(),
            company_id,
            project_id: new.project_id,
            name: new.name,
            description: new.description,
            status: new.status.unwrap_or(MilestoneStatus::Pending),
            start_date: new.start_date,
            end_date: new.end_date,
            created_at: now,
            updated_at: now,
        };
        tables.milestones.insert(milestone.id, milestone.clone());
        milestone
    }

    fn insert_task(
        &self,
        tables: &mut Tables,
        company_id: i64,
        created_by: i64,
        new: NewTask,
    ) -> Task {
        let now = Utc::now();
        let task = Task {
            id: self.allocate_id(),
            company_id,
            project_id: new.project_id,
            milestone_id: new.milestone_id,
            title: new.title,
            description: new.description,
            status: new.status.unwrap_or(TaskStatus::Todo),
            priority: new.priority.unwrap_or(Priority::Medium),
            start_date: new.start_date,
            due_date: new.due_date,
            assigned_to: new.assigned_to,
            created_by,
            created_at: now,
            updated_at: now,
        };
        tables.tasks.insert(task.id, task.clone());
        task
    }

    fn insert_subtask(&self, tables: &mut Tables, task_id: i64, title: &str) -> Subtask {
        let subtask = Subtask {
            id: self.allocate_id(),
            task_id,
            title: title.to_string(),
            completed: false,
            created_at: Utc::now(),
        };
        tables.subtasks.insert(subtask.id, subtask.clone());
        subtask
    }
}

fn sorted_by_id<T: Clone>(items: impl Iterator<Item = T>, id: impl Fn(&T) -> i64) -> Vec<T> {
    let mut out: Vec<T> = items.collect();
    out.sort_by_key(|item| id(item));
    out
}

#[async_trait]
impl ProjectRepository for InMemoryStore {
    async fn get(&self, company_id: i64, id: i64) -> Result<Option<Project>> {
        Ok(self
            .lock()
            .projects
            .get(&id)
            .filter(|p| p.company_id == company_id)
            .cloned())
    }

    async fn list(&self, company_id: i64, filter: &ProjectFilter) -> Result<Vec<Project>> {
        let tables = self.lock();
        Ok(sorted_by_id(
            tables
                .projects
                .values()
                .filter(|p| p.company_id == company_id)
                .filter(|p| filter.status.map_or(true, |s| p.status == s))
                .filter(|p| filter.program_id.map_or(true, |id| p.program_id == Some(id)))
                .cloned(),
            |p| p.id,
        ))
    }

    async fn create(&self, company_id: i64, created_by: i64, new: NewProject) -> Result<Project> {
        let mut tables = self.lock();
        Ok(self.insert_project(&mut tables, company_id, created_by, new))
    }

    async fn update(
        &self,
        company_id: i64,
        id: i64,
        patch: ProjectPatch,
    ) -> Result<Option<Project>> {
        let mut tables = self.lock();
        let Some(project) = tables
            .projects
            .get_mut(&id)
            .filter(|p| p.company_id == company_id)
        else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            project.name = name;
        }
        if let Some(description) = patch.description {
            project.description = description;
        }
        if let Some(methodology) = patch.methodology {
            project.methodology = methodology;
        }
        if let Some(status) = patch.status {
            project.status = status;
        }
        if let Some(start) = patch.start_date {
            project.start_date = Some(start);
        }
        if let Some(end) = patch.end_date {
            project.end_date = Some(end);
        }
        if let Some(budget) = patch.budget {
            project.budget = budget;
        }
        project.updated_at = Utc::now();
        Ok(Some(project.clone()))
    }

    async fn delete(&self, company_id: i64, id: i64) -> Result<bool> {
        let mut tables = self.lock();
        let owned = tables
            .projects
            .get(&id)
            .is_some_and(|p| p.company_id == company_id);
        if owned {
            tables.projects.remove(&id);
        }
        Ok(owned)
    }

    async fn compute_progress_from_work(&self, company_id: i64, id: i64) -> Result<f64> {
        let tables = self.lock();
        let tasks: Vec<&Task> = tables
            .tasks
            .values()
            .filter(|t| t.company_id == company_id && t.project_id == Some(id))
            .collect();
        if tasks.is_empty() {
            return Ok(0.0);
        }
        let done = tasks.iter().filter(|t| t.status == TaskStatus::Done).count();
        Ok(done as f64 * 100.0 / tasks.len() as f64)
    }
}

#[async_trait]
impl MilestoneRepository for InMemoryStore {
    async fn get(&self, company_id: i64, id: i64) -> Result<Option<Milestone>> {
        Ok(self
            .lock()
            .milestones
            .get(&id)
            .filter(|m| m.company_id == company_id)
            .cloned())
    }

    async fn list(&self, company_id: i64, filter: &MilestoneFilter) -> Result<Vec<Milestone>> {
        let tables = self.lock();
        Ok(sorted_by_id(
            tables
                .milestones
                .values()
                .filter(|m| m.company_id == company_id)
                .filter(|m| filter.project_id.map_or(true, |id| m.project_id == id))
                .filter(|m| filter.status.map_or(true, |s| m.status == s))
                .cloned(),
            |m| m.id,
        ))
    }

    async fn create(&self, company_id: i64, new: NewMilestone) -> Result<Milestone> {
        let mut tables = self.lock();
        Ok(self.insert_milestone(&mut tables, company_id, new))
    }

    async fn update(
        &self,
        company_id: i64,
        id: i64,
        patch: MilestonePatch,
    ) -> Result<Option<Milestone>> {
        let mut tables = self.lock();
        let Some(milestone) = tables
            .milestones
            .get_mut(&id)
            .filter(|m| m.company_id == company_id)
        else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            milestone.name = name;
        }
        if let Some(description) = patch.description {
            milestone.description = description;
        }
        if let Some(status) = patch.status {
            milestone.status = status;
        }
        if let Some(start) = patch.start_date {
            milestone.start_date = Some(start);
        }
        if let Some(end) = patch.end_date {
            milestone.end_date = Some(end);
        }
        milestone.updated_at = Utc::now();
        Ok(Some(milestone.clone()))
    }

    async fn delete(&self, company_id: i64, id: i64) -> Result<bool> {
        let mut tables = self.lock();
        let owned = tables
            .milestones
            .get(&id)
            .is_some_and(|m| m.company_id == company_id);
        if owned {
            tables.milestones.remove(&id);
        }
        Ok(owned)
    }
}

#[async_trait]
impl TaskRepository for InMemoryStore {
    async fn get(&self, company_id: i64, id: i64) -> Result<Option<Task>> {
        Ok(self
            .lock()
            .tasks
            .get(&id)
            .filter(|t| t.company_id == company_id)
            .cloned())
    }

    async fn list(&self, company_id: i64, filter: &TaskFilter) -> Result<Vec<Task>> {
        let tables = self.lock();
        Ok(sorted_by_id(
            tables
                .tasks
                .values()
                .filter(|t| t.company_id == company_id)
                .filter(|t| filter.project_id.map_or(true, |id| t.project_id == Some(id)))
                .filter(|t| {
                    filter
                        .milestone_id
                        .map_or(true, |id| t.milestone_id == Some(id))
                })
                .filter(|t| filter.status.map_or(true, |s| t.status == s))
                .filter(|t| {
                    filter
                        .assigned_to
                        .map_or(true, |id| t.assigned_to == Some(id))
                })
                .cloned(),
            |t| t.id,
        ))
    }

    async fn create(&self, company_id: i64, created_by: i64, new: NewTask) -> Result<Task> {
        let mut tables = self.lock();
        Ok(self.insert_task(&mut tables, company_id, created_by, new))
    }

    async fn update(&self, company_id: i64, id: i64, patch: TaskPatch) -> Result<Option<Task>> {
        let mut tables = self.lock();
        let Some(task) = tables
            .tasks
            .get_mut(&id)
            .filter(|t| t.company_id == company_id)
        else {
            return Ok(None);
        };
        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(start) = patch.start_date {
            task.start_date = Some(start);
        }
        if let Some(due) = patch.due_date {
            task.due_date = Some(due);
        }
        if let Some(assignee) = patch.assigned_to {
            task.assigned_to = Some(assignee);
        }
        task.updated_at = Utc::now();
        Ok(Some(task.clone()))
    }

    async fn delete(&self, company_id: i64, id: i64) -> Result<bool> {
        let mut tables = self.lock();
        let owned = tables
            .tasks
            .get(&id)
            .is_some_and(|t| t.company_id == company_id);
        if owned {
            tables.tasks.remove(&id);
        }
        Ok(owned)
    }
}

#[async_trait]
impl SubtaskRepository for InMemoryStore {
    async fn list(&self, task_id: i64) -> Result<Vec<Subtask>> {
        let tables = self.lock();
        Ok(sorted_by_id(
            tables
                .subtasks
                .values()
                .filter(|s| s.task_id == task_id)
                .cloned(),
            |s| s.id,
        ))
    }

    async fn create(&self, task_id: i64, title: &str) -> Result<Subtask> {
        let mut tables = self.lock();
        Ok(self.insert_subtask(&mut tables, task_id, title))
    }

    async fn count_for_task(&self, task_id: i64) -> Result<i64> {
        let tables = self.lock();
        Ok(tables
            .subtasks
            .values()
            .filter(|s| s.task_id == task_id)
            .count() as i64)
    }
}

#[async_trait]
impl ProgramRepository for InMemoryStore {
    async fn get(&self, company_id: i64, id: i64) -> Result<Option<Program>> {
        Ok(self
            .lock()
            .programs
            .get(&id)
            .filter(|p| p.company_id == company_id)
            .cloned())
    }

    async fn list(&self, company_id: i64, filter: &ProgramFilter) -> Result<Vec<Program>> {
        let tables = self.lock();
        Ok(sorted_by_id(
            tables
                .programs
                .values()
                .filter(|p| p.company_id == company_id)
                .filter(|p| filter.status.map_or(true, |s| p.status == s))
                .cloned(),
            |p| p.id,
        ))
    }

    async fn create(&self, company_id: i64, new: NewProgram) -> Result<Program> {
        let now = Utc::now();
        let program = Program {
            id: self.allocate_id(),
            company_id,
            name: new.name,
            description: new.description,
            status: new.status.unwrap_or(ProjectStatus::Planning),
            start_date: new.start_date,
            end_date: new.end_date,
            created_at: now,
            updated_at: now,
        };
        self.lock().programs.insert(program.id, program.clone());
        Ok(program)
    }

    async fn update(
        &self,
        company_id: i64,
        id: i64,
        patch: ProgramPatch,
    ) -> Result<Option<Program>> {
        let mut tables = self.lock();
        let Some(program) = tables
            .programs
            .get_mut(&id)
            .filter(|p| p.company_id == company_id)
        else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            program.name = name;
        }
        if let Some(description) = patch.description {
            program.description = description;
        }
        if let Some(status) = patch.status {
            program.status = status;
        }
        if let Some(start) = patch.start_date {
            program.start_date = Some(start);
        }
        if let Some(end) = patch.end_date {
            program.end_date = Some(end);
        }
        program.updated_at = Utc::now();
        Ok(Some(program.clone()))
    }

    async fn delete(&self, company_id: i64, id: i64) -> Result<bool> {
        let mut tables = self.lock();
        let owned = tables
            .programs
            .get(&id)
            .is_some_and(|p| p.company_id == company_id);
        if owned {
            tables.programs.remove(&id);
        }
        Ok(owned)
    }
}

#[async_trait]
impl MemberRepository for InMemoryStore {
    async fn get(&self, company_id: i64, id: i64) -> Result<Option<Member>> {
        Ok(self
            .lock()
            .members
            .get(&id)
            .filter(|m| m.company_id == company_id)
            .cloned())
    }
}

#[async_trait]
impl StructureWriter for InMemoryStore {
    async fn persist_structure(
        &self,
        company_id: i64,
        created_by: i64,
        project_id: i64,
        plan: &StructurePlan,
    ) -> Result<StructureOutcome> {
        let mut tables = self.lock();
        // Single lock acquisition makes the whole plan atomic here; the
        // project must exist under this tenant before anything is written.
        if !tables
            .projects
            .get(&project_id)
            .is_some_and(|p| p.company_id == company_id)
        {
            anyhow::bail!("project {} not found for company {}", project_id, company_id);
        }

        let mut outcome = StructureOutcome::default();
        for planned in &plan.milestones {
            let milestone = self.insert_milestone(
                &mut tables,
                company_id,
                NewMilestone {
                    project_id,
                    name: planned.name.clone(),
                    description: planned.description.clone(),
                    status: Some(MilestoneStatus::Pending),
                    start_date: Some(planned.start_date),
                    end_date: Some(planned.end_date),
                },
            );
            outcome.milestones_created += 1;

            for planned_task in &planned.tasks {
                let task = self.insert_task(
                    &mut tables,
                    company_id,
                    created_by,
                    NewTask {
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
                );
                outcome.tasks_created += 1;

                for title in &planned_task.subtasks {
                    self.insert_subtask(&mut tables, task.id, title);
                    outcome.subtasks_created += 1;
                }
            }
        }

        if let Some(new_end) = plan.project_end {
            let project = tables
                .projects
                .get_mut(&project_id)
                .expect("existence checked above");
            project.end_date = Some(new_end);
            project.updated_at = Utc::now();
            outcome.project_end_updated = true;
        }

        Ok(outcome)
    }
}

impl Repositories {
    /// Repositories backed by a single shared in-memory store
    pub fn in_memory() -> (Self, Arc<InMemoryStore>) {
        let store = InMemoryStore::new();
        let repos = Self {
            projects: store.clone(),
            milestones: store.clone(),
            tasks: store.clone(),
            subtasks: store.clone(),
            programs: store.clone(),
            members: store.clone(),
            structure: store.clone(),
        };
        (repos, store)
    }
}
