//! Agent driver
//!
//! Runs the multi-step tool-calling loop for one user turn. Persisted history
//! goes in as plain user/assistant messages; tool calls and their results
//! exist only inside the loop. Tool failures are fed back to the model as
//! `{error: …}` payloads so it can correct itself, except return_direct tools
//! whose payload short-circuits the loop and becomes the final answer.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::chat::{MessageRole, StoredMessage};
use crate::error::AgentError;
use crate::tools::{coerce_arguments, error_payload, ToolRegistry};
use pxp_llm::{ChatMessage, ChatModel};

const MAX_STEPS: usize = 10;

const AGENT_INSTRUCTION: &str = "\
You are the ProjeXtPal assistant, helping project managers run their \
projects, programmes, milestones and tasks. Use the available tools to \
answer questions and carry out requests; never invent projects, tasks or \
IDs that the tools did not return. When the user wants to create or update \
something, prefer opening the matching form over asking for every field in \
chat. Keep answers short and concrete. If a tool reports an error, tell the \
user what went wrong instead of retrying endlessly.";

const STEPS_EXHAUSTED_REPLY: &str =
    "I wasn't able to complete that request. Please try rephrasing it.";

const EMPTY_REPLY_FALLBACK: &str =
    "I'm sorry, I couldn't produce a response. Please try again.";

pub struct AgentDriver {
    registry: Arc<ToolRegistry>,
    model: Arc<dyn ChatModel>,
    max_steps: usize,
}

impl AgentDriver {
    pub fn new(registry: Arc<ToolRegistry>, model: Arc<dyn ChatModel>) -> Self {
        Self {
            registry,
            model,
            max_steps: MAX_STEPS,
        }
    }

    #[cfg(test)]
    fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// One full turn: history plus the language-tagged user message in,
    /// final assistant text out.
    pub async fn run(
        &self,
        history: &[StoredMessage],
        message_with_language: &str,
    ) -> Result<String, AgentError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(AGENT_INSTRUCTION));
        for stored in history {
            messages.push(match stored.role {
                MessageRole::User => ChatMessage::user(&stored.content),
                MessageRole::Assistant => ChatMessage::assistant(&stored.content),
            });
        }
        messages.push(ChatMessage::user(message_with_language));

        let specs = self.registry.specs();

        for step in 0..self.max_steps {
            let turn = self.model.complete(&messages, &specs).await?;

            if turn.tool_calls.is_empty() {
                return Ok(turn
                    .content
                    .unwrap_or_else(|| EMPTY_REPLY_FALLBACK.to_string()));
            }

            debug!(step, calls = turn.tool_calls.len(), "executing tool calls");
            let calls = turn.tool_calls.clone();
            messages.push(ChatMessage::assistant_tool_calls(turn.tool_calls));

            for call in calls {
                let payload = match self.registry.get(&call.name) {
                    None => {
                        warn!(tool = %call.name, "model requested unknown tool");
                        error_payload(format!("Unknown tool: {}", call.name))
                    }
                    Some(tool) => match coerce_arguments(&tool.parameters(), &call.arguments) {
                        Err(e) => error_payload(e.to_string()),
                        Ok(args) => match tool.execute(&args).await {
                            Ok(payload) => {
                                if tool.return_direct() {
                                    return Ok(payload.to_string());
                                }
                                payload
                            }
                            Err(e) => {
                                warn!(tool = %call.name, "tool execution failed: {:#}", e);
                                error_payload(format!("Tool '{}' failed: {}", call.name, e))
                            }
                        },
                    },
                };
                messages.push(ChatMessage::tool_result(call.id, payload.to_string()));
            }
        }

        warn!(max_steps = self.max_steps, "agent loop exhausted its step budget");
        Ok(STEPS_EXHAUSTED_REPLY.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthUser, Role};
    use crate::context::{self, RequestContext};
    use crate::repo::Repositories;
    use crate::tools::build_registry;
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use pxp_llm::{LlmError, ModelTurn, ToolInvocation, ToolSpec};

    /// Model that replays a fixed sequence of turns and records what it saw
    struct ScriptedModel {
        turns: Mutex<Vec<ModelTurn>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn new(turns: Vec<ModelTurn>) -> Arc<Self> {
            Arc::new(Self {
                turns: Mutex::new(turns),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last_seen(&self) -> Vec<ChatMessage> {
            self.seen.lock().expect("lock").last().cloned().expect("a call")
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<ModelTurn, LlmError> {
            self.seen.lock().expect("lock").push(messages.to_vec());
            let mut turns = self.turns.lock().expect("lock");
            if turns.is_empty() {
                return Ok(ModelTurn::text("done"));
            }
            Ok(turns.remove(0))
        }
    }

    fn call(name: &str, arguments: Value) -> ToolInvocation {
        ToolInvocation {
            id: format!("call-{}", name),
            name: name.to_string(),
            arguments,
        }
    }

    fn tool_turn(calls: Vec<ToolInvocation>) -> ModelTurn {
        ModelTurn {
            content: None,
            tool_calls: calls,
        }
    }

    fn driver(model: Arc<ScriptedModel>) -> AgentDriver {
        let (repos, _store) = Repositories::in_memory();
        let registry = Arc::new(build_registry(repos, model.clone()));
        AgentDriver::new(registry, model)
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

    #[tokio::test]
    async fn plain_answer_passes_through() {
        let model = ScriptedModel::new(vec![ModelTurn::text("All projects look healthy.")]);
        let driver = driver(model.clone());
        let reply = context::scope(ctx(), driver.run(&[], "status?"))
            .await
            .expect("run");
        assert_eq!(reply, "All projects look healthy.");

        // system prompt first, tagged user message last
        let seen = model.last_seen();
        assert_eq!(seen[0].role, "system");
        assert_eq!(seen.last().expect("msg").content.as_deref(), Some("status?"));
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_to_the_model() {
        let model = ScriptedModel::new(vec![
            tool_turn(vec![call("list_projects", json!({}))]),
            ModelTurn::text("You have no projects yet."),
        ]);
        let driver = driver(model.clone());
        let reply = context::scope(ctx(), driver.run(&[], "list my projects"))
            .await
            .expect("run");
        assert_eq!(reply, "You have no projects yet.");

        let seen = model.last_seen();
        let tool_msg = seen.iter().find(|m| m.role == "tool").expect("tool result");
        assert!(tool_msg.content.as_deref().expect("content").contains("\"total\":0"));
    }

    #[tokio::test]
    async fn return_direct_short_circuits_the_loop() {
        let model = ScriptedModel::new(vec![
            tool_turn(vec![call("get_project_form", json!({}))]),
            // never reached
            ModelTurn::text("should not appear"),
        ]);
        let driver = driver(model);
        let reply = context::scope(ctx(), driver.run(&[], "new project"))
            .await
            .expect("run");
        let payload: Value = serde_json::from_str(&reply).expect("json");
        assert_eq!(payload["form_type"], "project_creation");
    }

    #[tokio::test]
    async fn unknown_tools_and_bad_args_become_error_results() {
        let model = ScriptedModel::new(vec![
            tool_turn(vec![
                call("summon_unicorn", json!({})),
                call("delete_project", json!({})),
            ]),
            ModelTurn::text("recovered"),
        ]);
        let driver = driver(model.clone());
        let reply = context::scope(ctx(), driver.run(&[], "do things"))
            .await
            .expect("run");
        assert_eq!(reply, "recovered");

        let seen = model.last_seen();
        let tool_payloads: Vec<&str> = seen
            .iter()
            .filter(|m| m.role == "tool")
            .map(|m| m.content.as_deref().expect("content"))
            .collect();
        assert_eq!(tool_payloads.len(), 2);
        assert!(tool_payloads[0].contains("Unknown tool: summon_unicorn"));
        assert!(tool_payloads[1].contains("Missing required argument 'project_id'"));
    }

    #[tokio::test]
    async fn step_budget_exhaustion_yields_the_fallback_reply() {
        let looping: Vec<ModelTurn> = (0..5)
            .map(|_| tool_turn(vec![call("list_projects", json!({}))]))
            .collect();
        let model = ScriptedModel::new(looping);
        let driver = driver(model).with_max_steps(3);
        let reply = context::scope(ctx(), driver.run(&[], "loop forever"))
            .await
            .expect("run");
        assert_eq!(reply, STEPS_EXHAUSTED_REPLY);
    }

    #[tokio::test]
    async fn history_is_replayed_as_plain_turns() {
        use chrono::Utc;
        use uuid::Uuid;

        let history = vec![
            StoredMessage {
                id: Uuid::new_v4(),
                chat_id: Uuid::new_v4(),
                role: MessageRole::User,
                content: "earlier question".to_string(),
                raw_output: None,
                created_at: Utc::now(),
            },
            StoredMessage {
                id: Uuid::new_v4(),
                chat_id: Uuid::new_v4(),
                role: MessageRole::Assistant,
                content: "earlier answer".to_string(),
                raw_output: Some("{\"view\":\"x\"}".to_string()),
                created_at: Utc::now(),
            },
        ];

        let model = ScriptedModel::new(vec![ModelTurn::text("ok")]);
        let driver = driver(model.clone());
        context::scope(ctx(), driver.run(&history, "next"))
            .await
            .expect("run");

        let seen = model.last_seen();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[1].content.as_deref(), Some("earlier question"));
        assert_eq!(seen[2].role, "assistant");
        assert!(seen[2].tool_calls.is_empty());
    }
}
