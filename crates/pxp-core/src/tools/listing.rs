//! Listing tools
//!
//! Read-only, so the widened role set applies. Results are paginated
//! projections with a couple of derived aggregates (project progress, subtask
//! counts) rather than raw rows.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::auth::{require_permission, READ_ROLES};
use crate::repo::{
    MilestoneFilter, MilestoneStatus, ProgramFilter, ProjectFilter, ProjectStatus, Repositories,
    TaskFilter, TaskStatus,
};
use crate::tools::{error_payload, Tool, ToolArgs, ToolParam};

fn date_json(date: Option<NaiveDate>) -> Value {
    match date {
        Some(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        None => Value::Null,
    }
}

fn page_params() -> [ToolParam; 2] {
    [
        ToolParam::integer("page", "Page number, starting at 1").default_value(Value::from(1)),
        ToolParam::integer("size", "Items per page").default_value(Value::from(10)),
    ]
}

/// Page bounds from coerced args; nonsense values are clamped, not rejected
fn page_bounds(args: &ToolArgs) -> (usize, usize) {
    let page = args.opt_i64("page").unwrap_or(1).max(1) as usize;
    let size = args.opt_i64("size").unwrap_or(10).clamp(1, 100) as usize;
    (page, size)
}

fn paginate<T>(items: Vec<T>, page: usize, size: usize) -> (usize, Vec<T>) {
    let total = items.len();
    let start = (page - 1) * size;
    let slice = items.into_iter().skip(start).take(size).collect();
    (total, slice)
}

pub struct ListProjectsTool {
    repos: Repositories,
}

impl ListProjectsTool {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl Tool for ListProjectsTool {
    fn name(&self) -> &'static str {
        "list_projects"
    }

    fn description(&self) -> &'static str {
        "List the company's projects with progress, optionally filtered by status (planning, in_progress, on_hold, completed, cancelled)."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        let mut params = vec![ToolParam::string("status", "Status filter").optional()];
        params.extend(page_params());
        params
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value> {
        let ctx = match require_permission(READ_ROLES) {
            Ok(ctx) => ctx,
            Err(denied) => return Ok(denied),
        };

        let mut filter = ProjectFilter::default();
        if let Some(raw) = args.opt_str("status") {
            match ProjectStatus::parse(raw) {
                Some(status) => filter.status = Some(status),
                None => return Ok(error_payload(format!("Unknown project status '{}'", raw))),
            }
        }

        let projects = self.repos.projects.list(ctx.company_id(), &filter).await?;
        let (page, size) = page_bounds(args);
        let (total, slice) = paginate(projects, page, size);

        let mut items = Vec::with_capacity(slice.len());
        for project in slice {
            let progress = self
                .repos
                .projects
                .compute_progress_from_work(ctx.company_id(), project.id)
                .await?;
            items.push(json!({
                "id": project.id,
                "name": project.name,
                "description": project.description,
                "methodology": project.methodology,
                "status": project.status.as_str(),
                "start_date": date_json(project.start_date),
                "end_date": date_json(project.end_date),
                "budget": project.budget,
                "program_id": project.program_id,
                "progress": progress,
            }));
        }

        Ok(json!({
            "total": total,
            "page": page,
            "size": size,
            "projects": items,
        }))
    }
}

pub struct ListTasksTool {
    repos: Repositories,
}

impl ListTasksTool {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl Tool for ListTasksTool {
    fn name(&self) -> &'static str {
        "list_tasks"
    }

    fn description(&self) -> &'static str {
        "List tasks, optionally filtered by project, milestone, status (todo, in_progress, blocked, done), or restricted to the current user's assignments."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        let mut params = vec![
            ToolParam::integer("project_id", "Only tasks of this project").optional(),
            ToolParam::integer("milestone_id", "Only tasks of this milestone").optional(),
            ToolParam::string("status", "Status filter").optional(),
            ToolParam::boolean("assigned_to_me", "Only tasks assigned to the current user")
                .default_value(Value::from(false)),
        ];
        params.extend(page_params());
        params
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value> {
        let ctx = match require_permission(READ_ROLES) {
            Ok(ctx) => ctx,
            Err(denied) => return Ok(denied),
        };

        let mut filter = TaskFilter {
            project_id: args.opt_i64("project_id"),
            milestone_id: args.opt_i64("milestone_id"),
            ..Default::default()
        };
        if let Some(raw) = args.opt_str("status") {
            match TaskStatus::parse(raw) {
                Some(status) => filter.status = Some(status),
                None => return Ok(error_payload(format!("Unknown task status '{}'", raw))),
            }
        }
        if args.opt_bool("assigned_to_me").unwrap_or(false) {
            filter.assigned_to = Some(ctx.user.id);
        }

        let tasks = self.repos.tasks.list(ctx.company_id(), &filter).await?;
        let (page, size) = page_bounds(args);
        let (total, slice) = paginate(tasks, page, size);

        let mut items = Vec::with_capacity(slice.len());
        for task in slice {
            let subtask_count = self.repos.subtasks.count_for_task(task.id).await?;
            items.push(json!({
                "id": task.id,
                "title": task.title,
                "status": task.status.as_str(),
                "priority": task.priority.as_str(),
                "start_date": date_json(task.start_date),
                "due_date": date_json(task.due_date),
                "project_id": task.project_id,
                "milestone_id": task.milestone_id,
                "assigned_to": task.assigned_to,
                "subtask_count": subtask_count,
            }));
        }

        Ok(json!({
            "total": total,
            "page": page,
            "size": size,
            "tasks": items,
        }))
    }
}

pub struct ListMilestonesTool {
    repos: Repositories,
}

impl ListMilestonesTool {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl Tool for ListMilestonesTool {
    fn name(&self) -> &'static str {
        "list_milestones"
    }

    fn description(&self) -> &'static str {
        "List milestones, optionally filtered by project or status (pending, in_progress, completed)."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        let mut params = vec![
            ToolParam::integer("project_id", "Only milestones of this project").optional(),
            ToolParam::string("status", "Status filter").optional(),
        ];
        params.extend(page_params());
        params
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value> {
        let ctx = match require_permission(READ_ROLES) {
            Ok(ctx) => ctx,
            Err(denied) => return Ok(denied),
        };

        let mut filter = MilestoneFilter {
            project_id: args.opt_i64("project_id"),
            ..Default::default()
        };
        if let Some(raw) = args.opt_str("status") {
            match MilestoneStatus::parse(raw) {
                Some(status) => filter.status = Some(status),
                None => {
                    return Ok(error_payload(format!("Unknown milestone status '{}'", raw)))
                }
            }
        }

        let milestones = self
            .repos
            .milestones
            .list(ctx.company_id(), &filter)
            .await?;
        let (page, size) = page_bounds(args);
        let (total, slice) = paginate(milestones, page, size);

        let mut items = Vec::with_capacity(slice.len());
        for milestone in slice {
            let tasks = self
                .repos
                .tasks
                .list(
                    ctx.company_id(),
                    &TaskFilter {
                        milestone_id: Some(milestone.id),
                        ..Default::default()
                    },
                )
                .await?;
            items.push(json!({
                "id": milestone.id,
                "name": milestone.name,
                "status": milestone.status.as_str(),
                "start_date": date_json(milestone.start_date),
                "end_date": date_json(milestone.end_date),
                "project_id": milestone.project_id,
                "task_count": tasks.len(),
            }));
        }

        Ok(json!({
            "total": total,
            "page": page,
            "size": size,
            "milestones": items,
        }))
    }
}

pub struct ListProgramsTool {
    repos: Repositories,
}

impl ListProgramsTool {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl Tool for ListProgramsTool {
    fn name(&self) -> &'static str {
        "list_programs"
    }

    fn description(&self) -> &'static str {
        "List the company's programmes with their project counts, optionally filtered by status."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        let mut params = vec![ToolParam::string("status", "Status filter").optional()];
        params.extend(page_params());
        params
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value> {
        let ctx = match require_permission(READ_ROLES) {
            Ok(ctx) => ctx,
            Err(denied) => return Ok(denied),
        };

        let mut filter = ProgramFilter::default();
        if let Some(raw) = args.opt_str("status") {
            match ProjectStatus::parse(raw) {
                Some(status) => filter.status = Some(status),
                None => return Ok(error_payload(format!("Unknown program status '{}'", raw))),
            }
        }

        let programs = self.repos.programs.list(ctx.company_id(), &filter).await?;
        let (page, size) = page_bounds(args);
        let (total, slice) = paginate(programs, page, size);

        let mut items = Vec::with_capacity(slice.len());
        for program in slice {
            let projects = self
                .repos
                .projects
                .list(
                    ctx.company_id(),
                    &ProjectFilter {
                        program_id: Some(program.id),
                        ..Default::default()
                    },
                )
                .await?;
            items.push(json!({
                "id": program.id,
                "name": program.name,
                "status": program.status.as_str(),
                "start_date": date_json(program.start_date),
                "end_date": date_json(program.end_date),
                "project_count": projects.len(),
            }));
        }

        Ok(json!({
            "total": total,
            "page": page,
            "size": size,
            "programs": items,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthUser, Role};
    use crate::context::{self, RequestContext};
    use crate::repo::{NewProject, NewTask};
    use serde_json::json;

    fn ctx(user_id: i64, role: Role, company: i64) -> RequestContext {
        RequestContext::new(
            "token",
            AuthUser {
                id: user_id,
                name: "Dana".to_string(),
                role,
                company_id: company,
            },
        )
    }

    fn args(tool: &dyn Tool, raw: serde_json::Value) -> ToolArgs {
        ToolArgs::from_value(&tool.parameters(), raw).expect("args coerce")
    }

    async fn seed_projects(repos: &Repositories, company: i64, count: usize) {
        for i in 0..count {
            repos
                .projects
                .create(
                    company,
                    7,
                    NewProject {
                        name: format!("Project {}", i),
                        ..Default::default()
                    },
                )
                .await
                .expect("create");
        }
    }

    #[tokio::test]
    async fn listing_is_paginated_with_a_stable_total() {
        let (repos, _store) = Repositories::in_memory();
        seed_projects(&repos, 1, 25).await;

        let tool = ListProjectsTool::new(repos);
        let raw = json!({ "page": 3, "size": 10 });
        let payload = context::scope(ctx(7, Role::TeamMember, 1), async {
            tool.execute(&args(&tool, raw)).await.expect("execute")
        })
        .await;

        assert_eq!(payload["total"], 25);
        assert_eq!(payload["page"], 3);
        assert_eq!(payload["projects"].as_array().expect("items").len(), 5);
    }

    #[tokio::test]
    async fn listing_never_crosses_tenants() {
        let (repos, _store) = Repositories::in_memory();
        seed_projects(&repos, 1, 3).await;
        seed_projects(&repos, 2, 4).await;

        let tool = ListProjectsTool::new(repos);
        let payload = context::scope(ctx(7, Role::Pm, 1), async {
            tool.execute(&args(&tool, json!({}))).await.expect("execute")
        })
        .await;

        assert_eq!(payload["total"], 3);
    }

    #[tokio::test]
    async fn assigned_to_me_resolves_the_current_user() {
        let (repos, _store) = Repositories::in_memory();
        repos
            .tasks
            .create(
                1,
                7,
                NewTask {
                    title: "Mine".to_string(),
                    assigned_to: Some(7),
                    ..Default::default()
                },
            )
            .await
            .expect("create");
        repos
            .tasks
            .create(
                1,
                7,
                NewTask {
                    title: "Theirs".to_string(),
                    assigned_to: Some(8),
                    ..Default::default()
                },
            )
            .await
            .expect("create");

        let tool = ListTasksTool::new(repos);
        let raw = json!({ "assigned_to_me": true });
        let payload = context::scope(ctx(7, Role::TeamMember, 1), async {
            tool.execute(&args(&tool, raw)).await.expect("execute")
        })
        .await;

        let tasks = payload["tasks"].as_array().expect("tasks");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["title"], "Mine");
    }

    #[tokio::test]
    async fn unknown_status_filter_is_a_structured_error() {
        let (repos, _store) = Repositories::in_memory();
        let tool = ListTasksTool::new(repos);
        let raw = json!({ "status": "paused" });
        let payload = context::scope(ctx(7, Role::Pm, 1), async {
            tool.execute(&args(&tool, raw)).await.expect("execute")
        })
        .await;
        assert_eq!(payload["error"], "Unknown task status 'paused'");
    }
}
