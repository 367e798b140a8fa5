//! Model-facing types shared between the agent runtime and LLM clients

use async_trait::async_trait;
use serde_json::Value;

use crate::client::LlmError;

/// A single message in the conversation sent to the model
#[derive(Clone, Debug)]
pub struct ChatMessage {
    pub role: String,
    pub content: Option<String>,
    /// Tool calls the assistant made (assistant turns only)
    pub tool_calls: Vec<ToolInvocation>,
    /// Which tool call this message answers (tool turns only)
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content)
    }

    /// Assistant turn that requested tool calls instead of answering
    pub fn assistant_tool_calls(calls: Vec<ToolInvocation>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: None,
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    /// Result of a tool execution, answering `call_id`
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Declaration of a callable tool, as presented to the model
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object
    pub parameters: Value,
}

/// A tool call requested by the model
#[derive(Clone, Debug)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// Parsed arguments object
    pub arguments: Value,
}

/// One completion turn from the model: either final text, tool calls, or both
#[derive(Clone, Debug, Default)]
pub struct ModelTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolInvocation>,
}

impl ModelTurn {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// A chat model capable of tool calling.
///
/// Implementations must pass tool names and arguments through deterministically;
/// the runtime relies on the returned invocations matching the registered specs.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelTurn, LlmError>;
}
