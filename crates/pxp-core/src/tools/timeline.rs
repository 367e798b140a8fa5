//! Timeline adjustment tools
//!
//! Durations arrive as free text ("2 weeks", "reduce by 3 days", "-1 month").
//! Parsing is unit-sum based: every number/unit pair contributes, bare numbers
//! count as days, and reduction wording negates each positive value. Date math
//! happens in whole days; sub-day remainders round toward zero.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::info;

use crate::auth::{require_permission, DEFAULT_ROLES};
use crate::repo::{
    MilestonePatch, ProjectPatch, Repositories, TaskFilter, TaskPatch,
};
use crate::tools::{error_payload, not_found_payload, parse_entity_id, Tool, ToolArgs, ToolParam};

const REDUCTION_WORDS: &[&str] = &["reduce", "shorten", "decrease", "subtract"];

const FILLER_WORDS: &[&str] = &[
    "by", "extend", "reduce", "for", "add", "shorten", "decrease", "subtract",
];

static COMPONENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(-?\d+(?:\.\d+)?)\s*(weeks?|days?|months?|years?|hours?|mo|w|d|y|h)?")
        .expect("duration regex compiles")
});

fn unit_hours(unit: &str) -> f64 {
    match unit {
        "week" | "weeks" | "w" => 7.0 * 24.0,
        "month" | "months" | "mo" => 30.0 * 24.0,
        "year" | "years" | "y" => 365.0 * 24.0,
        "hour" | "hours" | "h" => 1.0,
        // bare numbers and day units both mean days
        _ => 24.0,
    }
}

/// Parse a free-text duration into a signed `chrono::Duration`.
///
/// Returns `None` when no numeric component is found or the total is zero.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let lowered = input.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    let is_reduction = lowered
        .split_whitespace()
        .any(|word| REDUCTION_WORDS.contains(&word));
    let stripped: String = lowered
        .split_whitespace()
        .filter(|word| !FILLER_WORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ");

    let mut total_hours = 0.0_f64;
    let mut matched = false;
    for caps in COMPONENT_RE.captures_iter(&stripped) {
        let mut number: f64 = caps[1].parse().ok()?;
        if is_reduction && number > 0.0 {
            number = -number;
        }
        let unit = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        total_hours += number * unit_hours(unit);
        matched = true;
    }
    if !matched {
        return None;
    }

    let minutes = (total_hours * 60.0).round() as i64;
    if minutes == 0 {
        return None;
    }
    Some(Duration::minutes(minutes))
}

fn unparsable_payload(raw: &str) -> Value {
    error_payload(format!(
        "Could not parse duration '{}'. Please use formats like '2 weeks', '3 days', '1 month', etc.",
        raw
    ))
}

fn duration_param() -> ToolParam {
    ToolParam::string(
        "duration",
        "How far to shift, e.g. '2 weeks', 'reduce by 3 days', '-1 month'",
    )
}

fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn opt_date_str(date: Option<NaiveDate>) -> Value {
    match date {
        Some(d) => Value::String(date_str(d)),
        None => Value::Null,
    }
}

pub struct AdjustProjectTimelineTool {
    repos: Repositories,
}

impl AdjustProjectTimelineTool {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl Tool for AdjustProjectTimelineTool {
    fn name(&self) -> &'static str {
        "adjust_project_timeline"
    }

    fn description(&self) -> &'static str {
        "Shift a project's end date (and optionally its start date) by a duration like '2 weeks' or 'reduce by 1 month'."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::string("project_id", "ID of the project to adjust"),
            duration_param(),
            ToolParam::boolean(
                "adjust_end_date_only",
                "When false, the start date shifts by the same amount",
            )
            .default_value(Value::from(true)),
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
        let raw_duration = args.get_str("duration")?;
        let Some(delta) = parse_duration(raw_duration) else {
            return Ok(unparsable_payload(raw_duration));
        };
        let days = delta.num_days();

        let Some(project) = self.repos.projects.get(ctx.company_id(), id).await? else {
            return Ok(not_found_payload("Project", id));
        };
        let Some(old_end) = project.end_date else {
            return Ok(error_payload("Project has no end date to adjust."));
        };

        let end_only = args.opt_bool("adjust_end_date_only").unwrap_or(true);
        let new_end = old_end + Duration::days(days);
        let mut patch = ProjectPatch {
            end_date: Some(new_end),
            ..Default::default()
        };
        let mut new_start = None;
        if !end_only {
            if let Some(old_start) = project.start_date {
                let shifted = old_start + Duration::days(days);
                patch.start_date = Some(shifted);
                new_start = Some(shifted);
            }
        }
        self.repos.projects.update(ctx.company_id(), id, patch).await?;

        info!(project_id = id, days, "project timeline adjusted");
        Ok(json!({
            "success": true,
            "project_id": id,
            "adjusted_by_days": days,
            "old_end_date": date_str(old_end),
            "new_end_date": date_str(new_end),
            "old_start_date": opt_date_str(project.start_date),
            "new_start_date": opt_date_str(new_start.or(project.start_date)),
        }))
    }
}

pub struct AdjustMilestoneTimelineTool {
    repos: Repositories,
}

impl AdjustMilestoneTimelineTool {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl Tool for AdjustMilestoneTimelineTool {
    fn name(&self) -> &'static str {
        "adjust_milestone_timeline"
    }

    fn description(&self) -> &'static str {
        "Shift a milestone's end date by a duration, optionally cascading the same shift to every task in the milestone."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::string("milestone_id", "ID of the milestone to adjust"),
            duration_param(),
            ToolParam::boolean(
                "adjust_end_date_only",
                "When false, start dates shift by the same amount",
            )
            .default_value(Value::from(true)),
            ToolParam::boolean(
                "cascade_to_tasks",
                "When true, every task in the milestone shifts by the same amount",
            )
            .default_value(Value::from(true)),
        ]
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
        let raw_duration = args.get_str("duration")?;
        let Some(delta) = parse_duration(raw_duration) else {
            return Ok(unparsable_payload(raw_duration));
        };
        let days = delta.num_days();

        let Some(milestone) = self.repos.milestones.get(ctx.company_id(), id).await? else {
            return Ok(not_found_payload("Milestone", id));
        };
        let Some(old_end) = milestone.end_date else {
            return Ok(error_payload("Milestone has no end date to adjust."));
        };

        let end_only = args.opt_bool("adjust_end_date_only").unwrap_or(true);
        let new_end = old_end + Duration::days(days);
        let mut patch = MilestonePatch {
            end_date: Some(new_end),
            ..Default::default()
        };
        if !end_only {
            if let Some(old_start) = milestone.start_date {
                patch.start_date = Some(old_start + Duration::days(days));
            }
        }
        self.repos.milestones.update(ctx.company_id(), id, patch).await?;

        let mut tasks_adjusted = 0;
        if args.opt_bool("cascade_to_tasks").unwrap_or(true) {
            let tasks = self
                .repos
                .tasks
                .list(
                    ctx.company_id(),
                    &TaskFilter {
                        milestone_id: Some(id),
                        ..Default::default()
                    },
                )
                .await?;
            for task in tasks {
                let Some(due) = task.due_date else { continue };
                let mut patch = TaskPatch {
                    due_date: Some(due + Duration::days(days)),
                    ..Default::default()
                };
                if !end_only {
                    if let Some(start) = task.start_date {
                        patch.start_date = Some(start + Duration::days(days));
                    }
                }
                self.repos
                    .tasks
                    .update(ctx.company_id(), task.id, patch)
                    .await?;
                tasks_adjusted += 1;
            }
        }

        info!(milestone_id = id, days, tasks_adjusted, "milestone timeline adjusted");
        Ok(json!({
            "success": true,
            "milestone_id": id,
            "adjusted_by_days": days,
            "old_end_date": date_str(old_end),
            "new_end_date": date_str(new_end),
            "tasks_adjusted": tasks_adjusted,
        }))
    }
}

pub struct AdjustTaskTimelineTool {
    repos: Repositories,
}

impl AdjustTaskTimelineTool {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }
}

#[async_trait]
impl Tool for AdjustTaskTimelineTool {
    fn name(&self) -> &'static str {
        "adjust_task_timeline"
    }

    fn description(&self) -> &'static str {
        "Shift a task's due date (and optionally its start date) by a duration like '3 days' or 'reduce by 1 week'."
    }

    fn parameters(&self) -> Vec<ToolParam> {
        vec![
            ToolParam::string("task_id", "ID of the task to adjust"),
            duration_param(),
            ToolParam::boolean(
                "adjust_due_date_only",
                "When false, the start date shifts by the same amount",
            )
            .default_value(Value::from(true)),
        ]
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
        let raw_duration = args.get_str("duration")?;
        let Some(delta) = parse_duration(raw_duration) else {
            return Ok(unparsable_payload(raw_duration));
        };
        let days = delta.num_days();

        let Some(task) = self.repos.tasks.get(ctx.company_id(), id).await? else {
            return Ok(not_found_payload("Task", id));
        };
        let Some(old_due) = task.due_date else {
            return Ok(error_payload("Task has no due date to adjust."));
        };

        let due_only = args.opt_bool("adjust_due_date_only").unwrap_or(true);
        let new_due = old_due + Duration::days(days);
        let mut patch = TaskPatch {
            due_date: Some(new_due),
            ..Default::default()
        };
        let mut new_start = None;
        if !due_only {
            if let Some(old_start) = task.start_date {
                let shifted = old_start + Duration::days(days);
                patch.start_date = Some(shifted);
                new_start = Some(shifted);
            }
        }
        self.repos.tasks.update(ctx.company_id(), id, patch).await?;

        info!(task_id = id, days, "task timeline adjusted");
        Ok(json!({
            "success": true,
            "task_id": id,
            "adjusted_by_days": days,
            "old_due_date": date_str(old_due),
            "new_due_date": date_str(new_due),
            "old_start_date": opt_date_str(task.start_date),
            "new_start_date": opt_date_str(new_start.or(task.start_date)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthUser, Role};
    use crate::context::{self, RequestContext};
    use crate::repo::{NewMilestone, NewProject, NewTask};
    use serde_json::json;

    #[test]
    fn reduction_wording_negates_the_total() {
        assert_eq!(parse_duration("reduce by 2 weeks").expect("parse").num_days(), -14);
        assert_eq!(parse_duration("shorten 3 days").expect("parse").num_days(), -3);
    }

    #[test]
    fn explicit_negatives_pass_through() {
        assert_eq!(parse_duration("-2 weeks").expect("parse").num_days(), -14);
    }

    #[test]
    fn reduction_words_only_count_as_whole_words() {
        assert_eq!(parse_duration("shortened by 2 weeks").expect("parse").num_days(), 14);
        assert_eq!(parse_duration("reduced to 3 days").expect("parse").num_days(), 3);
    }

    #[test]
    fn bare_numbers_mean_days() {
        assert_eq!(parse_duration("5").expect("parse").num_days(), 5);
        assert_eq!(parse_duration("extend by 10").expect("parse").num_days(), 10);
    }

    #[test]
    fn components_accumulate() {
        assert_eq!(parse_duration("1 month 3 days").expect("parse").num_days(), 33);
        assert_eq!(parse_duration("2w").expect("parse").num_days(), 14);
        assert_eq!(parse_duration("1 year").expect("parse").num_days(), 365);
        assert_eq!(parse_duration("12 hours").expect("parse").num_hours(), 12);
    }

    #[test]
    fn zero_and_garbage_are_none() {
        assert!(parse_duration("0 days").is_none());
        assert!(parse_duration("soon").is_none());
        assert!(parse_duration("").is_none());
    }

    #[test]
    fn add_then_reduce_is_a_round_trip() {
        let add = parse_duration("3 weeks").expect("parse");
        let reduce = parse_duration("reduce by 3 weeks").expect("parse");
        assert_eq!(add + reduce, Duration::zero());
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

    #[tokio::test]
    async fn project_end_date_shifts_by_the_parsed_days() {
        let (repos, _store) = Repositories::in_memory();
        let project = repos
            .projects
            .create(
                1,
                7,
                NewProject {
                    name: "Apollo".to_string(),
                    start_date: Some(date("2026-01-01")),
                    end_date: Some(date("2026-03-01")),
                    ..Default::default()
                },
            )
            .await
            .expect("create");

        let tool = AdjustProjectTimelineTool::new(repos.clone());
        let raw = json!({ "project_id": project.id.to_string(), "duration": "2 weeks" });
        let payload = context::scope(ctx(), async {
            tool.execute(&args(&tool, raw)).await.expect("execute")
        })
        .await;

        assert_eq!(payload["adjusted_by_days"], 14);
        assert_eq!(payload["new_end_date"], "2026-03-15");
        // start date untouched by default
        let stored = repos.projects.get(1, project.id).await.expect("get").expect("row");
        assert_eq!(stored.start_date, Some(date("2026-01-01")));
        assert_eq!(stored.end_date, Some(date("2026-03-15")));
    }

    #[tokio::test]
    async fn milestone_reduction_cascades_to_task_due_dates() {
        let (repos, _store) = Repositories::in_memory();
        let project = repos
            .projects
            .create(1, 7, NewProject::default())
            .await
            .expect("create");
        let milestone = repos
            .milestones
            .create(
                1,
                NewMilestone {
                    project_id: project.id,
                    name: "Beta".to_string(),
                    end_date: Some(date("2026-06-30")),
                    ..Default::default()
                },
            )
            .await
            .expect("create");
        let task = repos
            .tasks
            .create(
                1,
                7,
                NewTask {
                    project_id: Some(project.id),
                    milestone_id: Some(milestone.id),
                    title: "QA pass".to_string(),
                    due_date: Some(date("2026-06-20")),
                    ..Default::default()
                },
            )
            .await
            .expect("create");

        let tool = AdjustMilestoneTimelineTool::new(repos.clone());
        let raw = json!({
            "milestone_id": milestone.id.to_string(),
            "duration": "reduce by 2 weeks",
        });
        let payload = context::scope(ctx(), async {
            tool.execute(&args(&tool, raw)).await.expect("execute")
        })
        .await;

        assert_eq!(payload["adjusted_by_days"], -14);
        assert_eq!(payload["new_end_date"], "2026-06-16");
        assert_eq!(payload["tasks_adjusted"], 1);
        let stored = repos.tasks.get(1, task.id).await.expect("get").expect("row");
        assert_eq!(stored.due_date, Some(date("2026-06-06")));
    }

    #[tokio::test]
    async fn unparsable_duration_is_a_structured_error() {
        let (repos, _store) = Repositories::in_memory();
        let tool = AdjustTaskTimelineTool::new(repos);
        let raw = json!({ "task_id": "1", "duration": "whenever" });
        let payload = context::scope(ctx(), async {
            tool.execute(&args(&tool, raw)).await.expect("execute")
        })
        .await;
        assert_eq!(
            payload["error"],
            "Could not parse duration 'whenever'. Please use formats like '2 weeks', '3 days', '1 month', etc."
        );
    }
}
