//! Tool registry and typed argument schemas
//!
//! Tools are registered once at startup; the set is read-only afterwards and
//! shared across requests. Arguments coming back from the model are validated
//! and coerced against the declared parameter schema before a tool body runs,
//! so tools only ever see well-typed values. Domain failures cross the tool
//! boundary as structured `{error: …}` payloads, never as `Err`.

pub mod crud;
pub mod forms;
pub mod listing;
pub mod structure;
pub mod timeline;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::AgentError;
use crate::repo::Repositories;
use pxp_llm::{ChatModel, ToolSpec};

// ============================================================================
// Parameter schema
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
    Float,
}

impl ParamKind {
    fn json_type(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
            ParamKind::Float => "number",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ToolParam {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
}

impl ToolParam {
    fn new(name: &'static str, description: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            description,
            kind,
            required: true,
            default: None,
        }
    }

    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self::new(name, description, ParamKind::String)
    }

    pub fn integer(name: &'static str, description: &'static str) -> Self {
        Self::new(name, description, ParamKind::Integer)
    }

    pub fn boolean(name: &'static str, description: &'static str) -> Self {
        Self::new(name, description, ParamKind::Boolean)
    }

    pub fn float(name: &'static str, description: &'static str) -> Self {
        Self::new(name, description, ParamKind::Float)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Optional parameter with a default applied when the model omits it
    pub fn default_value(mut self, value: Value) -> Self {
        self.required = false;
        self.default = Some(value);
        self
    }
}

/// Validated, coerced arguments handed to a tool body
#[derive(Clone, Debug, Default)]
pub struct ToolArgs {
    values: HashMap<String, Value>,
}

impl ToolArgs {
    pub fn get_str(&self, name: &str) -> Result<&str, AgentError> {
        self.opt_str(name)
            .ok_or_else(|| AgentError::InvalidArgument(format!("Missing argument '{}'", name)))
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, name: &str) -> Result<i64, AgentError> {
        self.opt_i64(name)
            .ok_or_else(|| AgentError::InvalidArgument(format!("Missing argument '{}'", name)))
    }

    pub fn opt_i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(|v| v.as_i64())
    }

    pub fn get_bool(&self, name: &str) -> Result<bool, AgentError> {
        self.opt_bool(name)
            .ok_or_else(|| AgentError::InvalidArgument(format!("Missing argument '{}'", name)))
    }

    pub fn opt_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(|v| v.as_bool())
    }

    pub fn opt_f64(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(|v| v.as_f64())
    }

    #[cfg(test)]
    pub fn from_value(params: &[ToolParam], raw: Value) -> Result<Self, AgentError> {
        coerce_arguments(params, &raw)
    }
}

/// Validate and coerce raw model arguments against a parameter schema.
///
/// Models frequently pass numbers and booleans as strings; those are accepted
/// and converted. A value that cannot be represented in the declared type
/// fails with `InvalidArgument` before the tool body executes.
pub fn coerce_arguments(params: &[ToolParam], raw: &Value) -> Result<ToolArgs, AgentError> {
    let empty = Map::new();
    let object = match raw {
        Value::Null => &empty,
        Value::Object(map) => map,
        other => {
            return Err(AgentError::InvalidArgument(format!(
                "Tool arguments must be an object, got {}",
                other
            )))
        }
    };

    let mut values = HashMap::new();
    for param in params {
        let provided = object.get(param.name).filter(|v| !v.is_null());
        let value = match provided {
            Some(value) => coerce_value(param, value)?,
            None => match &param.default {
                Some(default) => default.clone(),
                None if param.required => {
                    return Err(AgentError::InvalidArgument(format!(
                        "Missing required argument '{}'",
                        param.name
                    )))
                }
                None => continue,
            },
        };
        values.insert(param.name.to_string(), value);
    }

    // Extra keys the model invented are dropped silently.
    Ok(ToolArgs { values })
}

fn coerce_value(param: &ToolParam, value: &Value) -> Result<Value, AgentError> {
    let mismatch = || {
        AgentError::InvalidArgument(format!(
            "Argument '{}' must be of type {}",
            param.name,
            param.kind.json_type()
        ))
    };

    match param.kind {
        ParamKind::String => match value {
            Value::String(s) => Ok(Value::String(s.clone())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(mismatch()),
        },
        ParamKind::Integer => match value {
            Value::Number(n) if n.is_i64() => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
        ParamKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        },
        ParamKind::Float => match value {
            Value::Number(n) => n.as_f64().map(Value::from).ok_or_else(mismatch),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| mismatch()),
            _ => Err(mismatch()),
        },
    }
}

// ============================================================================
// Tool trait and registry
// ============================================================================

/// A named operation the model may invoke
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> Vec<ToolParam>;

    /// When true, the tool's return value is surfaced as the model's final
    /// response unchanged (forms and view directives).
    fn return_direct(&self) -> bool {
        false
    }

    async fn execute(&self, args: &ToolArgs) -> Result<Value>;
}

/// Registry of available tools, fixed at process start
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!("tool '{}' registered twice, keeping the latest", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Model-facing tool declarations, sorted by name for deterministic prompts
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| {
                let params = tool.parameters();
                let mut properties = Map::new();
                let mut required = Vec::new();
                for param in &params {
                    properties.insert(
                        param.name.to_string(),
                        json!({
                            "type": param.kind.json_type(),
                            "description": param.description,
                        }),
                    );
                    if param.required {
                        required.push(Value::from(param.name));
                    }
                }
                ToolSpec {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    parameters: json!({
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    }),
                }
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }
}

/// Register the full domain tool set
pub fn build_registry(repos: Repositories, model: Arc<dyn ChatModel>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    // Form-returning tools (return_direct)
    registry.register(Arc::new(forms::GetProjectFormTool));
    registry.register(Arc::new(forms::UpdateProjectFormTool::new(repos.clone())));
    registry.register(Arc::new(forms::GetTaskFormTool));
    registry.register(Arc::new(forms::UpdateTaskFormTool::new(repos.clone())));
    registry.register(Arc::new(forms::GetMilestoneFormTool));
    registry.register(Arc::new(forms::UpdateMilestoneFormTool::new(repos.clone())));
    registry.register(Arc::new(forms::GetProgramFormTool));

    // Mutation tools
    registry.register(Arc::new(crud::DeleteProjectTool::new(repos.clone())));
    registry.register(Arc::new(crud::DeleteTaskTool::new(repos.clone())));
    registry.register(Arc::new(crud::DeleteMilestoneTool::new(repos.clone())));
    registry.register(Arc::new(crud::DeleteProgramTool::new(repos.clone())));

    // Read tools
    registry.register(Arc::new(listing::ListProjectsTool::new(repos.clone())));
    registry.register(Arc::new(listing::ListTasksTool::new(repos.clone())));
    registry.register(Arc::new(listing::ListMilestonesTool::new(repos.clone())));
    registry.register(Arc::new(listing::ListProgramsTool::new(repos.clone())));

    // Structured generation
    registry.register(Arc::new(structure::ParseAndCreateProjectStructureTool::new(
        repos.clone(),
        model.clone(),
    )));
    registry.register(Arc::new(structure::SuggestProjectStructureTool::new(model)));

    // Timeline adjustment
    registry.register(Arc::new(timeline::AdjustProjectTimelineTool::new(
        repos.clone(),
    )));
    registry.register(Arc::new(timeline::AdjustMilestoneTimelineTool::new(
        repos.clone(),
    )));
    registry.register(Arc::new(timeline::AdjustTaskTimelineTool::new(repos)));

    registry
}

// ============================================================================
// Shared payload helpers
// ============================================================================

pub fn error_payload(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

pub fn success_payload(message: impl Into<String>) -> Value {
    json!({ "success": true, "message": message.into() })
}

/// Entity ids arrive from the model as strings; accept all-digit strings only
pub fn parse_entity_id(raw: &str, entity: &str) -> Result<i64, Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(error_payload(format!("Invalid {} ID format", entity)));
    }
    trimmed
        .parse::<i64>()
        .map_err(|_| error_payload(format!("Invalid {} ID format", entity)))
}

/// Uniform phrasing so cross-tenant existence never leaks
pub fn not_found_payload(entity: &str, id: i64) -> Value {
    error_payload(format!(
        "{} with ID {} not found or you don't have access to it.",
        entity, id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<ToolParam> {
        vec![
            ToolParam::string("project_id", "Project id"),
            ToolParam::integer("page", "Page").default_value(Value::from(1)),
            ToolParam::boolean("cascade", "Cascade").default_value(Value::from(true)),
            ToolParam::string("status", "Status filter").optional(),
        ]
    }

    #[test]
    fn defaults_apply_and_optionals_may_be_absent() {
        let args = coerce_arguments(&params(), &json!({ "project_id": "7" })).expect("coerce");
        assert_eq!(args.get_str("project_id").expect("id"), "7");
        assert_eq!(args.get_i64("page").expect("page"), 1);
        assert!(args.get_bool("cascade").expect("cascade"));
        assert!(args.opt_str("status").is_none());
    }

    #[test]
    fn stringly_typed_model_output_is_coerced() {
        let raw = json!({ "project_id": 7, "page": "3", "cascade": "false" });
        let args = coerce_arguments(&params(), &raw).expect("coerce");
        assert_eq!(args.get_str("project_id").expect("id"), "7");
        assert_eq!(args.get_i64("page").expect("page"), 3);
        assert!(!args.get_bool("cascade").expect("cascade"));
    }

    #[test]
    fn missing_required_and_type_mismatch_fail_before_execution() {
        let missing = coerce_arguments(&params(), &json!({})).expect_err("must fail");
        assert!(matches!(missing, AgentError::InvalidArgument(_)));

        let mismatch = coerce_arguments(&params(), &json!({ "project_id": "7", "page": "x" }))
            .expect_err("must fail");
        assert!(mismatch.to_string().contains("'page'"));
    }

    #[test]
    fn entity_id_must_be_all_digits() {
        assert_eq!(parse_entity_id("42", "Project").expect("ok"), 42);
        assert_eq!(parse_entity_id(" 42 ", "Project").expect("ok"), 42);
        let err = parse_entity_id("42a", "Project").expect_err("must fail");
        assert_eq!(err["error"], "Invalid Project ID format");
        assert!(parse_entity_id("-3", "Task").is_err());
        assert!(parse_entity_id("", "Task").is_err());
    }

    #[test]
    fn registry_specs_are_sorted_and_unique() {
        use crate::repo::Repositories;

        struct NullModel;
        #[async_trait]
        impl ChatModel for NullModel {
            async fn complete(
                &self,
                _messages: &[pxp_llm::ChatMessage],
                _tools: &[ToolSpec],
            ) -> Result<pxp_llm::ModelTurn, pxp_llm::LlmError> {
                Ok(pxp_llm::ModelTurn::default())
            }
        }

        let (repos, _) = Repositories::in_memory();
        let registry = build_registry(repos, Arc::new(NullModel));
        assert_eq!(registry.len(), 20);

        let specs = registry.specs();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
        assert!(registry.has("delete_project"));
        assert!(registry.has("parse_and_create_project_structure"));
    }
}
