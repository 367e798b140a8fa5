//! Structured project generation
//!
//! A dedicated model call turns a free-text description into a milestone and
//! task breakdown. The breakdown carries relative durations only; dates are
//! resolved here by walking forward from the project start, and the resolved
//! plan is persisted through a single `StructureWriter` call so a mid-plan
//! failure leaves the project untouched.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::{require_permission, DEFAULT_ROLES, READ_ROLES};
use crate::repo::{
    PlannedMilestone, PlannedTask, Priority, Repositories, StructurePlan,
};
use crate::tools::{error_payload, not_found_payload, parse_entity_id, Tool, ToolArgs, ToolParam};
use pxp_llm::{ChatMessage, ChatModel};

const STRUCTURE_SYSTEM_PROMPT: &str = "\
You are a project planning assistant. Given a project description, produce a \
milestone and task breakdown as JSON. Respond with JSON only, no prose, no \
code fences, exactly this shape:
{
  \"milestones\": [
    {
      \"name\": \"...\",
      \"description\": \"...\",
      \"duration_days\": 14,
      \"tasks\": [
        {
          \"title\": \"...\",
          \"description\": \"...\",
          \"priority\": \"low|medium|high|critical\",
          \"duration_days\": 3,
          \"subtasks\": [{\"title\": \"...\"}]
        }
      ]
    }
  ]
}
Durations are working estimates in whole days. Keep the plan realistic: \
3 to 7 milestones, 2 to 6 tasks each.";

#[derive(Debug, Deserialize)]
struct Breakdown {
    milestones: Vec<BreakdownMilestone>,
}

#[derive(Debug, Deserialize)]
struct BreakdownMilestone {
    name: String,
    #[serde(default)]
    description: String,
    duration_days: i64,
    #[serde(default)]
    tasks: Vec<BreakdownTask>,
}

#[derive(Debug, Deserialize)]
struct BreakdownTask {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    priority: Option<String>,
    duration_days: i64,
    #[serde(default)]
    subtasks: Vec<BreakdownSubtask>,
}

#[derive(Debug, Deserialize, Serialize)]
struct BreakdownSubtask {
    title: String,
}

/// Drop a leading/trailing markdown fence if the model added one anyway
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

fn parse_breakdown(raw: &str) -> Result<Breakdown, Value> {
    serde_json::from_str(strip_code_fences(raw)).map_err(|e| {
        error_payload(format!(
            "Failed to parse AI response as JSON: {}. Please try again with a clearer description.",
            e
        ))
    })
}

/// Resolve relative durations into concrete dates, walking from `start`.
///
/// Tasks run sequentially inside their milestone and are clamped to the
/// milestone end; milestones run back to back.
fn resolve_plan(breakdown: &Breakdown, start: NaiveDate, project_end: Option<NaiveDate>) -> StructurePlan {
    let mut cursor = start;
    let mut milestones = Vec::with_capacity(breakdown.milestones.len());

    for milestone in &breakdown.milestones {
        let m_start = cursor;
        let m_end = m_start + Duration::days(milestone.duration_days.max(1));

        let mut task_cursor = m_start;
        let mut tasks = Vec::with_capacity(milestone.tasks.len());
        for task in &milestone.tasks {
            let t_start = task_cursor.min(m_end);
            let mut t_due = t_start + Duration::days(task.duration_days.max(1));
            if t_due > m_end {
                t_due = m_end;
            }
            task_cursor = t_due;
            tasks.push(PlannedTask {
                title: task.title.clone(),
                description: task.description.clone(),
                priority: task
                    .priority
                    .as_deref()
                    .and_then(Priority::parse)
                    .unwrap_or(Priority::Medium),
                start_date: t_start,
                due_date: t_due,
                subtasks: task.subtasks.iter().map(|s| s.title.clone()).collect(),
            });
        }

        milestones.push(PlannedMilestone {
            name: milestone.name.clone(),
            description: milestone.description.clone(),
            start_date: m_start,
            end_date: m_end,
            tasks,
        });
        cursor = m_end;
    }

    let new_end = match project_end {
        Some(end) if cursor <= end => None,
        _ => Some(cursor),
    };

    StructurePlan {
        milestones,
        project_end: new_end,
    }
}

async fn generate_breakdown(
    model: &Arc<dyn ChatModel>,
    description: &str,
) -> Result<Breakdown, Value> {
    let messages = [
        ChatMessage::system(STRUCTURE_SYSTEM_PROMPT),
        ChatMessage::user(description),
    ];
    let turn = match model.complete(&messages, &[]).await {
        Ok(turn) => turn,
        Err(e) => {
            warn!("structure generation failed: {}", e);
            return Err(error_payload(e.to_string()));
        }
    };
    let Some(content) = turn.content else {
        return Err(error_payload(
            "AI service returned an empty response. Please try again.",
        ));
    };
    parse_breakdown(&content)
}

pub struct ParseAndCreateProjectStructureTool {
    repos: Repositories,
    model: Arc<dyn ChatModel>,
}

impl ParseAndCreateProjectStructureTool {
    pub fn new(repos: Repositories, model: Arc<dyn ChatModel>) -> Self {
        Self { repos, model }
    }
}

#[async_trait]
impl Tool for ParseAndCreateProjectStructureTool {
    fn name(&self) -> &'static str {
        "parse_and_create_project_structure"
    }

    fn description(&self) -> &'static str {
        "Generate milestones, tasks and subtasks for an existing project from a free-text description, and persist them."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::string("project_id", "ID of the project to fill in"),
            ToolParam::string(
                "description",
                "What the project should accomplish, with any constraints worth planning around",
            ),
        ]
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

        let breakdown = match generate_breakdown(&self.model, args.get_str("description")?).await {
            Ok(breakdown) => breakdown,
            Err(payload) => return Ok(payload),
        };
        if breakdown.milestones.is_empty() {
            return Ok(error_payload(
                "The generated plan contained no milestones. Please try again with a clearer description.",
            ));
        }

        let start = project
            .start_date
            .unwrap_or_else(|| Utc::now().date_naive());
        let plan = resolve_plan(&breakdown, start, project.end_date);
        let outcome = self
            .repos
            .structure
            .persist_structure(ctx.company_id(), ctx.user.id, id, &plan)
            .await?;

        info!(
            project_id = id,
            milestones = outcome.milestones_created,
            tasks = outcome.tasks_created,
            "project structure created"
        );

        let milestone_summaries: Vec<Value> = plan
            .milestones
            .iter()
            .map(|m| {
                json!({
                    "name": m.name,
                    "start_date": m.start_date.format("%Y-%m-%d").to_string(),
                    "end_date": m.end_date.format("%Y-%m-%d").to_string(),
                    "task_count": m.tasks.len(),
                })
            })
            .collect();

        Ok(json!({
            "success": true,
            "project_id": id,
            "project_name": project.name,
            "milestones_created": outcome.milestones_created,
            "tasks_created": outcome.tasks_created,
            "subtasks_created": outcome.subtasks_created,
            "project_end_updated": outcome.project_end_updated,
            "milestones": milestone_summaries,
        }))
    }
}

pub struct SuggestProjectStructureTool {
    model: Arc<dyn ChatModel>,
}

impl SuggestProjectStructureTool {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Tool for SuggestProjectStructureTool {
    fn name(&self) -> &'static str {
        "suggest_project_structure"
    }

    fn description(&self) -> &'static str {
        "Draft a milestone and task breakdown from a free-text description without saving anything. Use this when the user wants a proposal to review first."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        vec![ToolParam::string(
            "description",
            "What the project should accomplish",
        )]
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value> {
        if let Err(denied) = require_permission(READ_ROLES) {
            return Ok(denied);
        }

        let breakdown = match generate_breakdown(&self.model, args.get_str("description")?).await {
            Ok(breakdown) => breakdown,
            Err(payload) => return Ok(payload),
        };

        let total_days: i64 = breakdown
            .milestones
            .iter()
            .map(|m| m.duration_days.max(1))
            .sum();
        let total_tasks: usize = breakdown.milestones.iter().map(|m| m.tasks.len()).sum();

        let milestones: Vec<Value> = breakdown
            .milestones
            .iter()
            .map(|m| {
                json!({
                    "name": m.name,
                    "description": m.description,
                    "duration_days": m.duration_days,
                    "tasks": m.tasks.iter().map(|t| json!({
                        "title": t.title,
                        "priority": t.priority.as_deref().unwrap_or("medium"),
                        "duration_days": t.duration_days,
                        "subtasks": t.subtasks,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();

        Ok(json!({
            "suggestion": true,
            "milestone_count": breakdown.milestones.len(),
            "task_count": total_tasks,
            "estimated_duration_days": total_days,
            "milestones": milestones,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthUser, Role};
    use crate::context::{self, RequestContext};
    use crate::repo::{NewProject, TaskFilter};
    use pxp_llm::{LlmError, ModelTurn, ToolSpec};
    use serde_json::json;

    struct ScriptedModel {
        reply: String,
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<ModelTurn, LlmError> {
            Ok(ModelTurn {
                content: Some(self.reply.clone()),
                tool_calls: Vec::new(),
            })
        }
    }

    fn breakdown_json() -> String {
        json!({
            "milestones": [
                {
                    "name": "Discovery",
                    "description": "Scoping and research",
                    "duration_days": 10,
                    "tasks": [
                        {
                            "title": "Stakeholder interviews",
                            "priority": "high",
                            "duration_days": 4,
                            "subtasks": [{"title": "Draft questions"}, {"title": "Schedule sessions"}]
                        },
                        { "title": "Competitor scan", "duration_days": 3 }
                    ]
                },
                {
                    "name": "Build",
                    "duration_days": 20,
                    "tasks": [
                        { "title": "Implement core flows", "priority": "critical", "duration_days": 15 }
                    ]
                }
            ]
        })
        .to_string()
    }

    fn ctx() -> RequestContext {
        RequestContext::new(
            "token",
            AuthUser {
                id: 7,
                name: "Dana".to_string(),
                role: Role::Pm,
                company_id: 1,
            },
        )
    }

    fn args(tool: &dyn Tool, raw: serde_json::Value) -> ToolArgs {
        ToolArgs::from_value(&tool.parameters(), raw).expect("args coerce")
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn fenced_json_is_accepted() {
        let fenced = format!("```json\n{}\n```", breakdown_json());
        let breakdown = parse_breakdown(&fenced).expect("parse");
        assert_eq!(breakdown.milestones.len(), 2);
    }

    #[test]
    fn non_json_reply_is_a_structured_error() {
        let payload = parse_breakdown("Here is your plan:").expect_err("must fail");
        assert!(payload["error"]
            .as_str()
            .expect("error")
            .starts_with("Failed to parse AI response as JSON:"));
    }

    #[test]
    fn dates_walk_forward_and_clamp_to_the_milestone() {
        let breakdown = parse_breakdown(&breakdown_json()).expect("parse");
        let plan = resolve_plan(&breakdown, date("2026-01-01"), Some(date("2026-02-15")));

        let discovery = &plan.milestones[0];
        assert_eq!(discovery.start_date, date("2026-01-01"));
        assert_eq!(discovery.end_date, date("2026-01-11"));
        assert_eq!(discovery.tasks[0].start_date, date("2026-01-01"));
        assert_eq!(discovery.tasks[0].due_date, date("2026-01-05"));
        // second task starts where the first ended
        assert_eq!(discovery.tasks[1].start_date, date("2026-01-05"));

        let build = &plan.milestones[1];
        assert_eq!(build.start_date, date("2026-01-11"));
        assert_eq!(build.end_date, date("2026-01-31"));
        // timeline fits, so the project end is left alone
        assert!(plan.project_end.is_none());

        let tight = resolve_plan(&breakdown, date("2026-01-01"), Some(date("2026-01-20")));
        assert_eq!(tight.project_end, Some(date("2026-01-31")));
    }

    #[tokio::test]
    async fn create_persists_the_whole_plan() {
        let (repos, _store) = Repositories::in_memory();
        let project = repos
            .projects
            .create(
                1,
                7,
                NewProject {
                    name: "Apollo".to_string(),
                    start_date: Some(date("2026-01-01")),
                    end_date: Some(date("2026-01-20")),
                    ..Default::default()
                },
            )
            .await
            .expect("create");

        let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel {
            reply: breakdown_json(),
        });
        let tool = ParseAndCreateProjectStructureTool::new(repos.clone(), model);
        let raw = json!({
            "project_id": project.id.to_string(),
            "description": "CRM rollout for the sales team",
        });
        let payload = context::scope(ctx(), async {
            tool.execute(&args(&tool, raw)).await.expect("execute")
        })
        .await;

        assert_eq!(payload["success"], true);
        assert_eq!(payload["milestones_created"], 2);
        assert_eq!(payload["tasks_created"], 3);
        assert_eq!(payload["subtasks_created"], 2);
        assert_eq!(payload["project_end_updated"], true);

        let tasks = repos
            .tasks
            .list(
                1,
                &TaskFilter {
                    project_id: Some(project.id),
                    ..Default::default()
                },
            )
            .await
            .expect("list");
        assert_eq!(tasks.len(), 3);

        let stored = repos.projects.get(1, project.id).await.expect("get").expect("row");
        assert_eq!(stored.end_date, Some(date("2026-01-31")));
    }

    #[tokio::test]
    async fn garbage_model_output_persists_nothing() {
        let (repos, _store) = Repositories::in_memory();
        let project = repos
            .projects
            .create(1, 7, NewProject::default())
            .await
            .expect("create");

        let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel {
            reply: "I cannot help with that.".to_string(),
        });
        let tool = ParseAndCreateProjectStructureTool::new(repos.clone(), model);
        let raw = json!({ "project_id": project.id.to_string(), "description": "x" });
        let payload = context::scope(ctx(), async {
            tool.execute(&args(&tool, raw)).await.expect("execute")
        })
        .await;

        assert!(payload["error"]
            .as_str()
            .expect("error")
            .starts_with("Failed to parse AI response as JSON:"));
        let milestones = repos
            .milestones
            .list(1, &Default::default())
            .await
            .expect("list");
        assert!(milestones.is_empty());
    }

    #[tokio::test]
    async fn suggestion_reports_totals_without_saving() {
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel {
            reply: breakdown_json(),
        });
        let tool = SuggestProjectStructureTool::new(model);
        let raw = json!({ "description": "CRM rollout" });
        let payload = context::scope(ctx(), async {
            tool.execute(&args(&tool, raw)).await.expect("execute")
        })
        .await;

        assert_eq!(payload["suggestion"], true);
        assert_eq!(payload["milestone_count"], 2);
        assert_eq!(payload["task_count"], 3);
        assert_eq!(payload["estimated_duration_days"], 30);
        // subtasks pass through the suggestion unflattened
        assert_eq!(
            payload["milestones"][0]["tasks"][0]["subtasks"],
            json!([{ "title": "Draft questions" }, { "title": "Schedule sessions" }])
        );
    }
}
