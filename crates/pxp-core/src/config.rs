//! Environment-driven configuration

use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct Config {
    /// OpenAI-compatible chat completions base URL
    pub ai_api_url: String,
    pub ai_api_key: Option<String>,
    pub ai_model: String,
    pub ai_timeout_secs: u64,
    pub database_url: String,
    pub http_port: u16,
    /// Website language hint used when detection is inconclusive
    pub default_language: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            ai_api_url: std::env::var("AI_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            ai_api_key: std::env::var("AI_API_KEY").ok(),
            ai_model: std::env::var("AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            ai_timeout_secs: std::env::var("AI_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            default_language: std::env::var("DEFAULT_LANGUAGE")
                .unwrap_or_else(|_| "nl".to_string()),
        })
    }
}
