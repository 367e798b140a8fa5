//! ProjeXtPal agent runtime
//!
//! Conversational layer of the ProjeXtPal project-management suite: a
//! tool-calling agent over the company's projects, programmes, milestones and
//! tasks, with per-tenant isolation, Dutch/English response handling and
//! form-driven mutations.

pub mod agent;
pub mod auth;
pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod form_submit;
pub mod forms;
pub mod language;
pub mod repo;
pub mod schema;
pub mod server;
pub mod service;
pub mod shaper;
pub mod tools;

pub use agent::AgentDriver;
pub use auth::{AuthProvider, AuthUser, Role};
pub use config::Config;
pub use error::AgentError;
pub use repo::Repositories;
pub use service::ChatService;
