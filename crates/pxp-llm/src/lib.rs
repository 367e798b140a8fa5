//! LLM client crate for ProjeXtPal
//!
//! Exposes the `ChatModel` trait the agent runtime drives, plus a concrete
//! client speaking the OpenAI-compatible chat-completions protocol with
//! native tool calling.

pub mod client;
pub mod model;

pub use client::{ChatCompletionsClient, LlmError};
pub use model::{ChatMessage, ChatModel, ModelTurn, ToolInvocation, ToolSpec};
