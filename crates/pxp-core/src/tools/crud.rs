//! Deletion tools
//!
//! Creation and updates go through forms; direct mutation from chat is
//! limited to deletes. Each tool captures the entity name before deleting so
//! the confirmation can quote it.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::auth::{require_permission, DEFAULT_ROLES};
use crate::repo::Repositories;
use crate::tools::{
    not_found_payload, parse_entity_id, success_payload, Tool, ToolArgs, ToolParam,
};

fn deleted_message(kind: &str, name: &str) -> String {
    format!("{} '{}' has been successfully deleted.", kind, name)
}

pub struct DeleteProjectTool {
    repos: Repositories,
}

impl DeleteProjectTool {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl Tool for DeleteProjectTool {
    fn name(&self) -> &'static str {
        "delete_project"
    }

    fn description(&self) -> &'static str {
        "Permanently delete a project by its numeric ID. Only use this after the user clearly asked for deletion."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        vec![ToolParam::string(
            "project_id",
            "ID of the project to delete",
        )]
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
        if !self.repos.projects.delete(ctx.company_id(), id).await? {
            return Ok(not_found_payload("Project", id));
        }
        info!(project_id = id, user_id = ctx.user.id, "project deleted");
        Ok(success_payload(deleted_message("Project", &project.name)))
    }
}

pub struct DeleteTaskTool {
    repos: Repositories,
}

impl DeleteTaskTool {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl Tool for DeleteTaskTool {
    fn name(&self) -> &'static str {
        "delete_task"
    }

    fn description(&self) -> &'static str {
        "Permanently delete a task by its numeric ID. Only use this after the user clearly asked for deletion."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        vec![ToolParam::string("task_id", "ID of the task to delete")]
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
        if !self.repos.tasks.delete(ctx.company_id(), id).await? {
            return Ok(not_found_payload("Task", id));
        }
        info!(task_id = id, user_id = ctx.user.id, "task deleted");
        Ok(success_payload(deleted_message("Task", &task.title)))
    }
}

pub struct DeleteMilestoneTool {
    repos: Repositories,
}

impl DeleteMilestoneTool {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl Tool for DeleteMilestoneTool {
    fn name(&self) -> &'static str {
        "delete_milestone"
    }

    fn description(&self) -> &'static str {
        "Permanently delete a milestone by its numeric ID. Only use this after the user clearly asked for deletion."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        vec![ToolParam::string(
            "milestone_id",
            "ID of the milestone to delete",
        )]
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
        if !self.repos.milestones.delete(ctx.company_id(), id).await? {
            return Ok(not_found_payload("Milestone", id));
        }
        info!(milestone_id = id, user_id = ctx.user.id, "milestone deleted");
        Ok(success_payload(deleted_message(
            "Milestone",
            &milestone.name,
        )))
    }
}

pub struct DeleteProgramTool {
    repos: Repositories,
}

impl DeleteProgramTool {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl Tool for DeleteProgramTool {
    fn name(&self) -> &'static str {
        "delete_program"
    }

    fn description(&self) -> &'static str {
        "Permanently delete a programme by its numeric ID. Only use this after the user clearly asked for deletion."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        vec![ToolParam::string(
            "program_id",
            "ID of the programme to delete",
        )]
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value> {
        let ctx = match require_permission(DEFAULT_ROLES) {
            Ok(ctx) => ctx,
            Err(denied) => return Ok(denied),
        };
        let id = match parse_entity_id(args.get_str("program_id")?, "program") {
            Ok(id) => id,
            Err(invalid) => return Ok(invalid),
        };
        let Some(program) = self.repos.programs.get(ctx.company_id(), id).await? else {
            return Ok(not_found_payload("Program", id));
        };
        if !self.repos.programs.delete(ctx.company_id(), id).await? {
            return Ok(not_found_payload("Program", id));
        }
        info!(program_id = id, user_id = ctx.user.id, "programme deleted");
        Ok(success_payload(deleted_message("Program", &program.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthUser, Role, UNAUTHORIZED_MESSAGE};
    use crate::context::{self, RequestContext};
    use crate::repo::{NewProject, NewTask};
    use serde_json::json;

    fn ctx(role: Role, company: i64) -> RequestContext {
        RequestContext::new(
            "token",
            AuthUser {
                id: 7,
                name: "Dana".to_string(),
                role,
                company_id: company,
            },
        )
    }

    fn args(tool: &dyn Tool, raw: serde_json::Value) -> ToolArgs {
        ToolArgs::from_value(&tool.parameters(), raw).expect("args coerce")
    }

    #[tokio::test]
    async fn delete_confirms_with_the_entity_name() {
        let (repos, _store) = Repositories::in_memory();
        let project = repos
            .projects
            .create(
                1,
                7,
                NewProject {
                    name: "Apollo".to_string(),
                    ..Default::default()
                },
            )
            .await
            .expect("create");

        let tool = DeleteProjectTool::new(repos.clone());
        let raw = json!({ "project_id": project.id.to_string() });
        let payload = context::scope(ctx(Role::Pm, 1), async {
            tool.execute(&args(&tool, raw)).await.expect("execute")
        })
        .await;

        assert_eq!(payload["success"], true);
        assert_eq!(
            payload["message"],
            "Project 'Apollo' has been successfully deleted."
        );
        assert!(repos
            .projects
            .get(1, project.id)
            .await
            .expect("get")
            .is_none());
    }

    #[tokio::test]
    async fn cross_tenant_delete_reports_not_found_and_leaves_the_row() {
        let (repos, _store) = Repositories::in_memory();
        let task = repos
            .tasks
            .create(
                2,
                9,
                NewTask {
                    title: "Ship it".to_string(),
                    ..Default::default()
                },
            )
            .await
            .expect("create");

        let tool = DeleteTaskTool::new(repos.clone());
        let raw = json!({ "task_id": task.id.to_string() });
        let payload = context::scope(ctx(Role::Admin, 1), async {
            tool.execute(&args(&tool, raw)).await.expect("execute")
        })
        .await;

        assert!(payload["error"]
            .as_str()
            .expect("error")
            .contains("not found or you don't have access"));
        assert!(repos.tasks.get(2, task.id).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn team_member_cannot_delete() {
        let (repos, _store) = Repositories::in_memory();
        let tool = DeleteMilestoneTool::new(repos);
        let raw = json!({ "milestone_id": "1" });
        let payload = context::scope(ctx(Role::TeamMember, 1), async {
            tool.execute(&args(&tool, raw)).await.expect("execute")
        })
        .await;
        assert_eq!(payload["error"], UNAUTHORIZED_MESSAGE);
    }

    #[tokio::test]
    async fn malformed_id_is_rejected_before_lookup() {
        let (repos, _store) = Repositories::in_memory();
        let tool = DeleteProgramTool::new(repos);
        let raw = json!({ "program_id": "12b" });
        let payload = context::scope(ctx(Role::Pm, 1), async {
            tool.execute(&args(&tool, raw)).await.expect("execute")
        })
        .await;
        assert_eq!(payload["error"], "Invalid program ID format");
    }
}
