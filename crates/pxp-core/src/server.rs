//! HTTP surface
//!
//! Thin axum layer over the chat service and form handler. Every route except
//! /health requires a bearer token; the resolved user is installed as the
//! request context around the whole handler body so tools can pick it up.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::auth::AuthProvider;
use crate::context::{self, RequestContext};
use crate::error::AgentError;
use crate::form_submit::{FormSubmission, FormSubmissionHandler};
use crate::service::ChatService;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthProvider>,
    pub chats: Arc<ChatService>,
    pub forms: Arc<FormSubmissionHandler>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chats/", post(create_chat).get(list_chats))
        .route("/chats/search/", get(search_chats))
        .route("/chats/{chat_id}/history/", get(chat_history))
        .route("/chats/{chat_id}/send_message/", post(send_message))
        .route("/chats/{chat_id}/edit_message/", post(edit_message))
        .route("/form/submit/", post(submit_form))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Resolve the bearer token into a request context
async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<RequestContext, AgentError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AgentError::Unauthorized)?;
    let user = state
        .auth
        .resolve(token)
        .await
        .ok_or(AgentError::Unauthorized)?;
    Ok(RequestContext::new(token, user))
}

#[derive(Debug, Deserialize)]
struct CreateChatBody {
    #[serde(default)]
    title: String,
}

async fn create_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateChatBody>,
) -> Result<Response, AgentError> {
    let ctx = authenticate(&state, &headers).await?;
    let chat = context::scope(ctx, state.chats.create_chat(&body.title)).await?;
    Ok((StatusCode::CREATED, Json(chat)).into_response())
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_size")]
    size: usize,
}

fn default_page() -> usize {
    1
}

fn default_size() -> usize {
    10
}

async fn list_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Response, AgentError> {
    let ctx = authenticate(&state, &headers).await?;
    let page = context::scope(ctx, state.chats.list_chats(query.page, query.size)).await?;
    Ok(Json(page).into_response())
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_size")]
    size: usize,
}

async fn search_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Result<Response, AgentError> {
    let ctx = authenticate(&state, &headers).await?;
    let page = context::scope(
        ctx,
        state.chats.search_chats(&query.q, query.page, query.size),
    )
    .await?;
    Ok(Json(page).into_response())
}

async fn chat_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<Uuid>,
) -> Result<Response, AgentError> {
    let ctx = authenticate(&state, &headers).await?;
    let messages = context::scope(ctx, state.chats.history(chat_id)).await?;
    Ok(Json(json!({ "messages": messages })).into_response())
}

#[derive(Debug, Deserialize)]
struct SendMessageBody {
    message: String,
    #[serde(default)]
    language: Option<String>,
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<Uuid>,
    Json(body): Json<SendMessageBody>,
) -> Result<Response, AgentError> {
    let ctx = authenticate(&state, &headers).await?;
    if body.message.trim().is_empty() {
        return Err(AgentError::InvalidArgument(
            "Message must not be empty.".to_string(),
        ));
    }
    let turn = context::scope(
        ctx,
        state
            .chats
            .send_message(chat_id, &body.message, body.language.as_deref()),
    )
    .await?;
    Ok(Json(turn).into_response())
}

#[derive(Debug, Deserialize)]
struct EditMessageBody {
    message_id: Uuid,
    content: String,
    #[serde(default)]
    regenerate_ai: bool,
    #[serde(default)]
    language: Option<String>,
}

async fn edit_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<Uuid>,
    Json(body): Json<EditMessageBody>,
) -> Result<Response, AgentError> {
    let ctx = authenticate(&state, &headers).await?;
    if body.content.trim().is_empty() {
        return Err(AgentError::InvalidArgument(
            "Message must not be empty.".to_string(),
        ));
    }
    let edit = context::scope(
        ctx,
        state.chats.edit_message(
            chat_id,
            body.message_id,
            &body.content,
            body.regenerate_ai,
            body.language.as_deref(),
        ),
    )
    .await?;
    Ok(Json(edit).into_response())
}

async fn submit_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(submission): Json<FormSubmission>,
) -> Result<Response, AgentError> {
    let ctx = authenticate(&state, &headers).await?;
    let result = context::scope(ctx, state.forms.submit(submission)).await?;
    let status = if result.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result.body)).into_response())
}
