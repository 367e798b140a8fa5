//! Form submission handling
//!
//! Completed forms come back from the UI as a form type plus a data object.
//! Creation forms are validated against the catalog's required fields and
//! turned into new entities with the documented defaults; update forms apply
//! only the fields that were provided.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::auth::{require_permission, DEFAULT_ROLES};
use crate::error::AgentError;
use crate::forms::form_schema;
use crate::repo::{
    MilestonePatch, MilestoneStatus, NewMilestone, NewProgram, NewProject, NewTask, Priority,
    ProjectPatch, ProjectStatus, Repositories, TaskPatch, TaskStatus,
};

#[derive(Debug, Deserialize)]
pub struct FormSubmission {
    pub form_type: String,
    #[serde(default)]
    pub entity_id: Option<i64>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug)]
pub struct FormResult {
    /// True when a new entity was created (HTTP 201)
    pub created: bool,
    pub body: Value,
}

pub struct FormSubmissionHandler {
    repos: Repositories,
}

fn present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

fn field_str(data: &Map<String, Value>, key: &str) -> Option<String> {
    match data.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn field_i64(data: &Map<String, Value>, key: &str) -> Result<Option<i64>, AgentError> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::Number(n)) if n.is_i64() => Ok(n.as_i64()),
        Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| {
            AgentError::InvalidArgument(format!("Field '{}' must be a whole number", key))
        }),
        Some(_) => Err(AgentError::InvalidArgument(format!(
            "Field '{}' must be a whole number",
            key
        ))),
    }
}

fn field_f64(data: &Map<String, Value>, key: &str) -> Result<Option<f64>, AgentError> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(|_| {
            AgentError::InvalidArgument(format!("Field '{}' must be a number", key))
        }),
        Some(_) => Err(AgentError::InvalidArgument(format!(
            "Field '{}' must be a number",
            key
        ))),
    }
}

fn field_date(data: &Map<String, Value>, key: &str) -> Result<Option<NaiveDate>, AgentError> {
    let Some(raw) = field_str(data, key) else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| {
            AgentError::InvalidArgument(format!(
                "Invalid date format for field '{}' (expected YYYY-MM-DD)",
                key
            ))
        })
}

fn success_body<T: serde::Serialize>(message: String, data: &T) -> Value {
    json!({ "success": true, "message": message, "data": data })
}

fn not_found(entity: &str, id: i64) -> AgentError {
    AgentError::NotFound(format!(
        "{} with ID {} not found or you don't have access to it.",
        entity, id
    ))
}

impl FormSubmissionHandler {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    pub async fn submit(&self, submission: FormSubmission) -> Result<FormResult, AgentError> {
        let ctx = require_permission(DEFAULT_ROLES).map_err(|_| AgentError::Unauthorized)?;
        let company_id = ctx.company_id();
        let user_id = ctx.user.id;

        let Some(schema) = form_schema(&submission.form_type) else {
            return Err(AgentError::UnknownFormType(submission.form_type));
        };

        let is_creation = submission.form_type.ends_with("_creation");
        if is_creation {
            for field in schema.required_fields() {
                if !present(submission.data.get(field)) {
                    return Err(AgentError::InvalidArgument(format!(
                        "Missing required field: {}",
                        field
                    )));
                }
            }
        }

        let data = &submission.data;
        match submission.form_type.as_str() {
            "project_creation" => {
                let project = self
                    .repos
                    .projects
                    .create(
                        company_id,
                        user_id,
                        NewProject {
                            name: field_str(data, "name").unwrap_or_default(),
                            description: field_str(data, "description").unwrap_or_default(),
                            methodology: field_str(data, "methodology").unwrap_or_default(),
                            status: Some(ProjectStatus::Planning),
                            start_date: field_date(data, "start_date")?,
                            end_date: field_date(data, "end_date")?,
                            budget: field_f64(data, "budget")?.unwrap_or(0.0),
                            program_id: field_i64(data, "program_id")?,
                        },
                    )
                    .await?;
                Ok(FormResult {
                    created: true,
                    body: success_body(
                        format!("Project '{}' created successfully.", project.name),
                        &project,
                    ),
                })
            }
            "project_update" => {
                let id = self.entity_id(&submission)?;
                let status = self.parse_status(data, ProjectStatus::parse, "project")?;
                let patch = ProjectPatch {
                    name: field_str(data, "name"),
                    description: field_str(data, "description"),
                    methodology: field_str(data, "methodology"),
                    status,
                    start_date: field_date(data, "start_date")?,
                    end_date: field_date(data, "end_date")?,
                    budget: field_f64(data, "budget")?,
                };
                let project = self
                    .repos
                    .projects
                    .update(company_id, id, patch)
                    .await?
                    .ok_or_else(|| not_found("Project", id))?;
                Ok(FormResult {
                    created: false,
                    body: success_body(
                        format!("Project '{}' updated successfully.", project.name),
                        &project,
                    ),
                })
            }
            "task_creation" => {
                let milestone_id = field_i64(data, "milestone_id")?
                    .ok_or_else(|| AgentError::InvalidArgument(
                        "Missing required field: milestone_id".to_string(),
                    ))?;
                let milestone = self
                    .repos
                    .milestones
                    .get(company_id, milestone_id)
                    .await?
                    .ok_or_else(|| not_found("Milestone", milestone_id))?;

                let assigned_to = field_i64(data, "assigned_to")?;
                if let Some(member_id) = assigned_to {
                    self.repos
                        .members
                        .get(company_id, member_id)
                        .await?
                        .ok_or_else(|| not_found("Member", member_id))?;
                }

                let priority = match field_str(data, "priority") {
                    Some(raw) => Priority::parse(&raw).ok_or_else(|| {
                        AgentError::InvalidArgument(format!("Unknown priority '{}'", raw))
                    })?,
                    None => Priority::Medium,
                };

                let task = self
                    .repos
                    .tasks
                    .create(
                        company_id,
                        user_id,
                        NewTask {
                            project_id: Some(milestone.project_id),
                            milestone_id: Some(milestone_id),
                            title: field_str(data, "title").unwrap_or_default(),
                            description: field_str(data, "description").unwrap_or_default(),
                            status: Some(TaskStatus::Todo),
                            priority: Some(priority),
                            start_date: field_date(data, "start_date")?,
                            due_date: field_date(data, "due_date")?,
                            assigned_to,
                        },
                    )
                    .await?;
                Ok(FormResult {
                    created: true,
                    body: success_body(
                        format!("Task '{}' created successfully.", task.title),
                        &task,
                    ),
                })
            }
            "task_update" => {
                let id = self.entity_id(&submission)?;
                let status = self.parse_status(data, TaskStatus::parse, "task")?;
                let priority = match field_str(data, "priority") {
                    Some(raw) => Some(Priority::parse(&raw).ok_or_else(|| {
                        AgentError::InvalidArgument(format!("Unknown priority '{}'", raw))
                    })?),
                    None => None,
                };
                let assigned_to = field_i64(data, "assigned_to")?;
                if let Some(member_id) = assigned_to {
                    self.repos
                        .members
                        .get(company_id, member_id)
                        .await?
                        .ok_or_else(|| not_found("Member", member_id))?;
                }
                let patch = TaskPatch {
                    title: field_str(data, "title"),
                    description: field_str(data, "description"),
                    status,
                    priority,
                    start_date: field_date(data, "start_date")?,
                    due_date: field_date(data, "due_date")?,
                    assigned_to,
                };
                let task = self
                    .repos
                    .tasks
                    .update(company_id, id, patch)
                    .await?
                    .ok_or_else(|| not_found("Task", id))?;
                Ok(FormResult {
                    created: false,
                    body: success_body(
                        format!("Task '{}' updated successfully.", task.title),
                        &task,
                    ),
                })
            }
            "milestone_creation" => {
                let project_id = field_i64(data, "project_id")?
                    .ok_or_else(|| AgentError::InvalidArgument(
                        "Missing required field: project_id".to_string(),
                    ))?;
                self.repos
                    .projects
                    .get(company_id, project_id)
                    .await?
                    .ok_or_else(|| not_found("Project", project_id))?;

                let milestone = self
                    .repos
                    .milestones
                    .create(
                        company_id,
                        NewMilestone {
                            project_id,
                            name: field_str(data, "name").unwrap_or_default(),
                            description: field_str(data, "description").unwrap_or_default(),
                            status: Some(MilestoneStatus::Pending),
                            start_date: field_date(data, "start_date")?,
                            end_date: field_date(data, "end_date")?,
                        },
                    )
                    .await?;
                Ok(FormResult {
                    created: true,
                    body: success_body(
                        format!("Milestone '{}' created successfully.", milestone.name),
                        &milestone,
                    ),
                })
            }
            "milestone_update" => {
                let id = self.entity_id(&submission)?;
                let status = self.parse_status(data, MilestoneStatus::parse, "milestone")?;
                let patch = MilestonePatch {
                    name: field_str(data, "name"),
                    description: field_str(data, "description"),
                    status,
                    start_date: field_date(data, "start_date")?,
                    end_date: field_date(data, "end_date")?,
                };
                let milestone = self
                    .repos
                    .milestones
                    .update(company_id, id, patch)
                    .await?
                    .ok_or_else(|| not_found("Milestone", id))?;
                Ok(FormResult {
                    created: false,
                    body: success_body(
                        format!("Milestone '{}' updated successfully.", milestone.name),
                        &milestone,
                    ),
                })
            }
            "program_creation" => {
                let program = self
                    .repos
                    .programs
                    .create(
                        company_id,
                        NewProgram {
                            name: field_str(data, "name").unwrap_or_default(),
                            description: field_str(data, "description").unwrap_or_default(),
                            status: Some(ProjectStatus::Planning),
                            start_date: field_date(data, "start_date")?,
                            end_date: field_date(data, "end_date")?,
                        },
                    )
                    .await?;
                Ok(FormResult {
                    created: true,
                    body: success_body(
                        format!("Program '{}' created successfully.", program.name),
                        &program,
                    ),
                })
            }
            // catalog membership was checked above; update forms without a
            // dedicated arm would be a catalog/handler mismatch
            other => Err(AgentError::UnknownFormType(other.to_string())),
        }
    }

    fn entity_id(&self, submission: &FormSubmission) -> Result<i64, AgentError> {
        submission.entity_id.ok_or_else(|| {
            AgentError::InvalidArgument("Missing entity_id for update form.".to_string())
        })
    }

    fn parse_status<S>(
        &self,
        data: &Map<String, Value>,
        parse: fn(&str) -> Option<S>,
        kind: &str,
    ) -> Result<Option<S>, AgentError> {
        match field_str(data, "status") {
            Some(raw) => parse(&raw).map(Some).ok_or_else(|| {
                AgentError::InvalidArgument(format!("Unknown {} status '{}'", kind, raw))
            }),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthUser, Role};
    use crate::context::{self, RequestContext};
    use crate::repo::Member;
    use serde_json::json;

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

    fn submission(form_type: &str, entity_id: Option<i64>, data: Value) -> FormSubmission {
        FormSubmission {
            form_type: form_type.to_string(),
            entity_id,
            data: data.as_object().expect("object").clone(),
        }
    }

    #[tokio::test]
    async fn project_creation_applies_defaults() {
        let (repos, _store) = Repositories::in_memory();
        let handler = FormSubmissionHandler::new(repos.clone());
        let result = context::scope(ctx(Role::Pm), async {
            handler
                .submit(submission(
                    "project_creation",
                    None,
                    json!({
                        "name": "Apollo",
                        "methodology": "scrum",
                        "start_date": "2026-01-01",
                        "end_date": "2026-06-30",
                    }),
                ))
                .await
                .expect("submit")
        })
        .await;

        assert!(result.created);
        assert_eq!(result.body["success"], true);
        assert_eq!(result.body["message"], "Project 'Apollo' created successfully.");
        assert_eq!(result.body["data"]["status"], "planning");
        assert_eq!(result.body["data"]["budget"], 0.0);
    }

    #[tokio::test]
    async fn missing_required_field_is_rejected() {
        let (repos, _store) = Repositories::in_memory();
        let handler = FormSubmissionHandler::new(repos);
        let err = context::scope(ctx(Role::Pm), async {
            handler
                .submit(submission(
                    "project_creation",
                    None,
                    json!({ "name": "No dates" }),
                ))
                .await
                .expect_err("must fail")
        })
        .await;
        assert_eq!(err.to_string(), "Missing required field: methodology");
    }

    #[tokio::test]
    async fn task_creation_derives_project_and_checks_assignee() {
        let (repos, store) = Repositories::in_memory();
        let project = repos
            .projects
            .create(1, 7, Default::default())
            .await
            .expect("create");
        let milestone = repos
            .milestones
            .create(
                1,
                NewMilestone {
                    project_id: project.id,
                    name: "Beta".to_string(),
                    ..Default::default()
                },
            )
            .await
            .expect("create");
        store.add_member(Member {
            id: 42,
            company_id: 1,
            name: "Kim".to_string(),
            email: "kim@example.com".to_string(),
            role: "team_member".to_string(),
        });

        let handler = FormSubmissionHandler::new(repos.clone());
        let result = context::scope(ctx(Role::Pm), async {
            handler
                .submit(submission(
                    "task_creation",
                    None,
                    json!({
                        "title": "QA pass",
                        "milestone_id": milestone.id.to_string(),
                        "assigned_to": 42,
                    }),
                ))
                .await
                .expect("submit")
        })
        .await;

        assert!(result.created);
        assert_eq!(result.body["data"]["project_id"], project.id);
        assert_eq!(result.body["data"]["priority"], "medium");
        assert_eq!(result.body["data"]["status"], "todo");

        // unknown assignee in the same tenant fails
        let err = context::scope(ctx(Role::Pm), async {
            handler
                .submit(submission(
                    "task_creation",
                    None,
                    json!({
                        "title": "QA pass",
                        "milestone_id": milestone.id,
                        "assigned_to": 999,
                    }),
                ))
                .await
                .expect_err("must fail")
        })
        .await;
        assert!(matches!(err, AgentError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_patches_only_provided_fields() {
        let (repos, _store) = Repositories::in_memory();
        let project = repos
            .projects
            .create(
                1,
                7,
                NewProject {
                    name: "Apollo".to_string(),
                    methodology: "scrum".to_string(),
                    budget: 500.0,
                    ..Default::default()
                },
            )
            .await
            .expect("create");

        let handler = FormSubmissionHandler::new(repos.clone());
        let result = context::scope(ctx(Role::Admin), async {
            handler
                .submit(submission(
                    "project_update",
                    Some(project.id),
                    json!({ "status": "in_progress" }),
                ))
                .await
                .expect("submit")
        })
        .await;

        assert!(!result.created);
        assert_eq!(result.body["data"]["status"], "in_progress");
        assert_eq!(result.body["data"]["name"], "Apollo");
        assert_eq!(result.body["data"]["budget"], 500.0);
    }

    #[tokio::test]
    async fn update_without_entity_id_is_invalid() {
        let (repos, _store) = Repositories::in_memory();
        let handler = FormSubmissionHandler::new(repos);
        let err = context::scope(ctx(Role::Pm), async {
            handler
                .submit(submission("task_update", None, json!({ "title": "x" })))
                .await
                .expect_err("must fail")
        })
        .await;
        assert_eq!(err.to_string(), "Missing entity_id for update form.");
    }

    #[tokio::test]
    async fn unknown_form_type_and_bad_dates_are_rejected() {
        let (repos, _store) = Repositories::in_memory();
        let handler = FormSubmissionHandler::new(repos);
        context::scope(ctx(Role::Pm), async {
            let unknown = handler
                .submit(submission("badge_creation", None, json!({})))
                .await
                .expect_err("must fail");
            assert!(matches!(unknown, AgentError::UnknownFormType(_)));

            let bad_date = handler
                .submit(submission(
                    "project_creation",
                    None,
                    json!({
                        "name": "Apollo",
                        "methodology": "scrum",
                        "start_date": "01-01-2026",
                        "end_date": "2026-06-30",
                    }),
                ))
                .await
                .expect_err("must fail");
            assert_eq!(
                bad_date.to_string(),
                "Invalid date format for field 'start_date' (expected YYYY-MM-DD)"
            );
        })
        .await;
    }

    #[tokio::test]
    async fn team_member_cannot_submit() {
        let (repos, _store) = Repositories::in_memory();
        let handler = FormSubmissionHandler::new(repos);
        let err = context::scope(ctx(Role::TeamMember), async {
            handler
                .submit(submission("program_creation", None, json!({ "name": "P" })))
                .await
                .expect_err("must fail")
        })
        .await;
        assert!(matches!(err, AgentError::Unauthorized));
    }
}
