//! OpenAI-compatible chat-completions client with tool calling
//!
//! Works against any endpoint exposing the /chat/completions contract
//! (OpenAI, OpenRouter, local gateways). Requests carry a bounded timeout;
//! a timeout is surfaced as its own error variant so callers can report
//! "AI service timeout" instead of a generic failure.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{ChatMessage, ChatModel, ModelTurn, ToolInvocation, ToolSpec};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("AI service timeout, please try again")]
    Timeout,
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, LlmError> {
        Self::with_timeout(base_url, api_key, model, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("ProjeXtPal/0.1.0")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: 0.2,
        })
    }

    fn to_wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.clone(),
                content: m.content.clone(),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|c| WireToolCall {
                                id: c.id.clone(),
                                kind: "function".to_string(),
                                function: WireFunctionCall {
                                    name: c.name.clone(),
                                    arguments: c.arguments.to_string(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    fn to_wire_tools(tools: &[ToolSpec]) -> Vec<WireTool> {
        tools
            .iter()
            .map(|t| WireTool {
                kind: "function".to_string(),
                function: WireFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }
}

#[async_trait]
impl ChatModel for ChatCompletionsClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelTurn, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: Self::to_wire_messages(messages),
            tools: if tools.is_empty() {
                None
            } else {
                Some(Self::to_wire_tools(tools))
            },
            tool_choice: if tools.is_empty() { None } else { Some("auto") },
            temperature: self.temperature,
        };

        debug!(
            "chat completion: {} messages, {} tools",
            messages.len(),
            tools.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Request(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Protocol("response contained no choices".to_string()))?;

        let mut tool_calls = Vec::new();
        for call in choice.message.tool_calls.unwrap_or_default() {
            // Arguments arrive as a JSON-encoded string per the wire contract
            let arguments: Value = match serde_json::from_str(&call.function.arguments) {
                Ok(v) => v,
                Err(e) => {
                    warn!(
                        "model sent malformed arguments for tool {}: {}",
                        call.function.name, e
                    );
                    return Err(LlmError::Protocol(format!(
                        "malformed tool arguments for '{}': {}",
                        call.function.name, e
                    )));
                }
            };
            tool_calls.push(ToolInvocation {
                id: call.id,
                name: call.function.name,
                arguments,
            });
        }

        Ok(ModelTurn {
            content: choice.message.content,
            tool_calls,
        })
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}
