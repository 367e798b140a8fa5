//! Form-returning tools
//!
//! These never mutate anything. Each returns a form schema payload verbatim
//! to the caller (return_direct), either blank for creation or bound to an
//! existing entity with its current values for updates.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::auth::{require_permission, DEFAULT_ROLES};
use crate::forms::form_schema;
use crate::repo::{Milestone, Project, Repositories, Task};
use crate::tools::{not_found_payload, parse_entity_id, Tool, ToolArgs, ToolParam};

fn date_value(date: Option<NaiveDate>) -> Value {
    match date {
        Some(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        None => Value::Null,
    }
}

fn opt_i64_value(v: Option<i64>) -> Value {
    match v {
        Some(n) => Value::from(n),
        None => Value::Null,
    }
}

fn blank_form(form_type: &str) -> Value {
    form_schema(form_type)
        .unwrap_or_else(|| panic!("form '{}' missing from catalog", form_type))
        .to_value()
}

fn project_values(project: &Project) -> Map<String, Value> {
    let mut values = Map::new();
    values.insert("name".into(), Value::from(project.name.clone()));
    values.insert("description".into(), Value::from(project.description.clone()));
    values.insert("methodology".into(), Value::from(project.methodology.clone()));
    values.insert("status".into(), Value::from(project.status.as_str()));
    values.insert("start_date".into(), date_value(project.start_date));
    values.insert("end_date".into(), date_value(project.end_date));
    values.insert("budget".into(), Value::from(project.budget));
    values
}

fn task_values(task: &Task) -> Map<String, Value> {
    let mut values = Map::new();
    values.insert("title".into(), Value::from(task.title.clone()));
    values.insert("description".into(), Value::from(task.description.clone()));
    values.insert("milestone_id".into(), opt_i64_value(task.milestone_id));
    values.insert("status".into(), Value::from(task.status.as_str()));
    values.insert("priority".into(), Value::from(task.priority.as_str()));
    values.insert("start_date".into(), date_value(task.start_date));
    values.insert("due_date".into(), date_value(task.due_date));
    values.insert("assigned_to".into(), opt_i64_value(task.assigned_to));
    values
}

fn milestone_values(milestone: &Milestone) -> Map<String, Value> {
    let mut values = Map::new();
    values.insert("name".into(), Value::from(milestone.name.clone()));
    values.insert(
        "description".into(),
        Value::from(milestone.description.clone()),
    );
    values.insert("project_id".into(), Value::from(milestone.project_id));
    values.insert("status".into(), Value::from(milestone.status.as_str()));
    values.insert("start_date".into(), date_value(milestone.start_date));
    values.insert("end_date".into(), date_value(milestone.end_date));
    values
}

// ============================================================================
// Creation forms
// ============================================================================

pub struct GetProjectFormTool;

#[async_trait]
impl Tool for GetProjectFormTool {
    fn name(&self) -> &'static str {
        "get_project_form"
    }

    fn description(&self) -> &'static str {
        "Open a blank project creation form. Use this whenever the user wants to create a new project."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        Vec::new()
    }

    fn return_direct(&self) -> bool {
        true
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<Value> {
        if let Err(denied) = require_permission(DEFAULT_ROLES) {
            return Ok(denied);
        }
        Ok(blank_form("project_creation"))
    }
}

pub struct GetTaskFormTool;

#[async_trait]
impl Tool for GetTaskFormTool {
    fn name(&self) -> &'static str {
        "get_task_form"
    }

    fn description(&self) -> &'static str {
        "Open a blank task creation form. Use this whenever the user wants to create a new task."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        Vec::new()
    }

    fn return_direct(&self) -> bool {
        true
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<Value> {
        if let Err(denied) = require_permission(DEFAULT_ROLES) {
            return Ok(denied);
        }
        Ok(blank_form("task_creation"))
    }
}

pub struct GetMilestoneFormTool;

#[async_trait]
impl Tool for GetMilestoneFormTool {
    fn name(&self) -> &'static str {
        "get_milestone_form"
    }

    fn description(&self) -> &'static str {
        "Open a blank milestone creation form. Use this whenever the user wants to create a new milestone."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        Vec::new()
    }

    fn return_direct(&self) -> bool {
        true
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<Value> {
        if let Err(denied) = require_permission(DEFAULT_ROLES) {
            return Ok(denied);
        }
        Ok(blank_form("milestone_creation"))
    }
}

pub struct GetProgramFormTool;

#[async_trait]
impl Tool for GetProgramFormTool {
    fn name(&self) -> &'static str {
        "get_program_form"
    }

    fn description(&self) -> &'static str {
        "Open a blank programme creation form. Use this whenever the user wants to create a new programme."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        Vec::new()
    }

    fn return_direct(&self) -> bool {
        true
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<Value> {
        if let Err(denied) = require_permission(DEFAULT_ROLES) {
            return Ok(denied);
        }
        Ok(blank_form("program_creation"))
    }
}

// ============================================================================
// Update forms (prefilled)
// ============================================================================

pub struct UpdateProjectFormTool {
    repos: Repositories,
}

impl UpdateProjectFormTool {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl Tool for UpdateProjectFormTool {
    fn name(&self) -> &'static str {
        "update_project_form"
    }

    fn description(&self) -> &'static str {
        "Open a project update form prefilled with the project's current values. Requires the numeric project ID."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        vec![ToolParam::string(
            "project_id",
            "ID of the project to update",
        )]
    }

    fn return_direct(&self) -> bool {
        true
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value> {
        let ctx = match require_permission(DEFAULT_ROLES) {
            Ok(ctx) => ctx,
            Err(denied) => return Ok(denied),
        };
        let id = match parse_entity_id(args.get_str("project_id")?, "project") {
            Ok(id) => id,
            Err(invalid) => return Ok(invalid),
        };
        let Some(project) = self.repos.projects.get(ctx.company_id(), id).await? else {
            return Ok(not_found_payload("Project", id));
        };
        let schema = form_schema("project_update").expect("catalog form");
        Ok(schema.for_entity(id, project_values(&project)).to_value())
    }
}

pub struct UpdateTaskFormTool {
    repos: Repositories,
}

impl UpdateTaskFormTool {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl Tool for UpdateTaskFormTool {
    fn name(&self) -> &'static str {
        "update_task_form"
    }

    fn description(&self) -> &'static str {
        "Open a task update form prefilled with the task's current values. Requires the numeric task ID."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        vec![ToolParam::string("task_id", "ID of the task to update")]
    }

    fn return_direct(&self) -> bool {
        true
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value> {
        let ctx = match require_permission(DEFAULT_ROLES) {
            Ok(ctx) => ctx,
            Err(denied) => return Ok(denied),
        };
        let id = match parse_entity_id(args.get_str("task_id")?, "task") {
            Ok(id) => id,
            Err(invalid) => return Ok(invalid),
        };
        let Some(task) = self.repos.tasks.get(ctx.company_id(), id).await? else {
            return Ok(not_found_payload("Task", id));
        };
        let schema = form_schema("task_update").expect("catalog form");
        Ok(schema.for_entity(id, task_values(&task)).to_value())
    }
}

pub struct UpdateMilestoneFormTool {
    repos: Repositories,
}

impl UpdateMilestoneFormTool {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl Tool for UpdateMilestoneFormTool {
    fn name(&self) -> &'static str {
        "update_milestone_form"
    }

    fn description(&self) -> &'static str {
        "Open a milestone update form prefilled with the milestone's current values. Requires the numeric milestone ID."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        vec![ToolParam::string(
            "milestone_id",
            "ID of the milestone to update",
        )]
    }

    fn return_direct(&self) -> bool {
        true
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value> {
        let ctx = match require_permission(DEFAULT_ROLES) {
            Ok(ctx) => ctx,
            Err(denied) => return Ok(denied),
        };
        let id = match parse_entity_id(args.get_str("milestone_id")?, "milestone") {
            Ok(id) => id,
            Err(invalid) => return Ok(invalid),
        };
        let Some(milestone) = self.repos.milestones.get(ctx.company_id(), id).await? else {
            return Ok(not_found_payload("Milestone", id));
        };
        let schema = form_schema("milestone_update").expect("catalog form");
        Ok(schema
            .for_entity(id, milestone_values(&milestone))
            .to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthUser, Role, UNAUTHORIZED_MESSAGE};
    use crate::context::{self, RequestContext};
    use crate::repo::{NewProject, ProjectStatus, Repositories};

    fn ctx(role: Role) -> RequestContext {
        RequestContext::new(
            "token",
            AuthUser {
                id: 7,
                name: "Dana".to_string(),
                role,
                company_id: 1,
            },
        )
    }

    fn args(params: &[ToolParam], raw: serde_json::Value) -> ToolArgs {
        ToolArgs::from_value(params, raw).expect("args coerce")
    }

    #[tokio::test]
    async fn creation_form_is_returned_blank() {
        let tool = GetProjectFormTool;
        let payload = context::scope(ctx(Role::Pm), async move {
            tool.execute(&ToolArgs::default()).await.expect("execute")
        })
        .await;
        assert_eq!(payload["form_type"], "project_creation");
        assert!(payload.get("entity_id").is_none());
    }

    #[tokio::test]
    async fn team_member_cannot_open_forms() {
        let tool = GetTaskFormTool;
        let payload = context::scope(ctx(Role::TeamMember), async move {
            tool.execute(&ToolArgs::default()).await.expect("execute")
        })
        .await;
        assert_eq!(payload["error"], UNAUTHORIZED_MESSAGE);
    }

    #[tokio::test]
    async fn update_form_is_prefilled_from_the_entity() {
        let (repos, _store) = Repositories::in_memory();
        let project = repos
            .projects
            .create(
                1,
                7,
                NewProject {
                    name: "Apollo".to_string(),
                    methodology: "scrum".to_string(),
                    status: Some(ProjectStatus::Planning),
                    budget: 1500.0,
                    ..Default::default()
                },
            )
            .await
            .expect("create");

        let tool = UpdateProjectFormTool::new(repos);
        let params = tool.parameters();
        let payload = context::scope(ctx(Role::Admin), async move {
            tool.execute(&args(
                &params,
                serde_json::json!({ "project_id": project.id.to_string() }),
            ))
            .await
            .expect("execute")
        })
        .await;

        assert_eq!(payload["form_type"], "project_update");
        assert_eq!(payload["current_values"]["name"], "Apollo");
        assert_eq!(payload["current_values"]["budget"], 1500.0);
        assert!(payload["entity_id"].as_i64().is_some());
    }

    #[tokio::test]
    async fn update_form_hides_other_tenants_and_bad_ids() {
        let (repos, _store) = Repositories::in_memory();
        let foreign = repos
            .projects
            .create(2, 9, NewProject::default())
            .await
            .expect("create");

        let tool = UpdateProjectFormTool::new(repos);
        let params = tool.parameters();
        let payload = context::scope(ctx(Role::Pm), async move {
            let cross = tool
                .execute(&args(
                    &params,
                    serde_json::json!({ "project_id": foreign.id.to_string() }),
                ))
                .await
                .expect("execute");
            let invalid = tool
                .execute(&args(&params, serde_json::json!({ "project_id": "abc" })))
                .await
                .expect("execute");
            (cross, invalid)
        })
        .await;

        assert!(payload.0["error"]
            .as_str()
            .expect("error")
            .contains("not found or you don't have access"));
        assert_eq!(payload.1["error"], "Invalid project ID format");
    }
}
