//! Chat orchestration
//!
//! One service instance owns the driver, the chat store and a per-chat lock
//! map so concurrent sends to the same chat serialize instead of interleaving
//! history. The user's message is persisted before the model runs; a model
//! failure therefore never loses what the user typed.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::agent::AgentDriver;
use crate::chat::{Chat, ChatPage, ChatStore, MessageRole, StoredMessage};
use crate::context;
use crate::error::AgentError;
use crate::language::{self, Language};
use crate::shaper;

const EDIT_USER_ONLY: &str = "Only user messages can be edited.";

#[derive(Clone, Debug, Serialize)]
pub struct TurnResponse {
    pub user_message: StoredMessage,
    pub ai_response: StoredMessage,
}

#[derive(Clone, Debug, Serialize)]
pub struct EditResponse {
    pub edited_message: StoredMessage,
    /// Present when regeneration was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_response: Option<StoredMessage>,
}

pub struct ChatService {
    store: Arc<dyn ChatStore>,
    driver: Arc<AgentDriver>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    default_language: String,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        driver: Arc<AgentDriver>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            store,
            driver,
            locks: Mutex::new(HashMap::new()),
            default_language: default_language.into(),
        }
    }

    async fn chat_lock(&self, chat_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(chat_id).or_default().clone()
    }

    fn current_user_id(&self) -> Result<i64, AgentError> {
        context::current()
            .map(|ctx| ctx.user.id)
            .ok_or(AgentError::Unauthorized)
    }

    /// Ownership check with the uniform not-found phrasing, so a foreign
    /// chat id is indistinguishable from a missing one.
    async fn owned_chat(&self, chat_id: Uuid) -> Result<Chat, AgentError> {
        let user_id = self.current_user_id()?;
        match self.store.get_chat(chat_id).await? {
            Some(chat) if chat.user_id == user_id => Ok(chat),
            _ => Err(AgentError::NotFound(format!("Chat {} not found", chat_id))),
        }
    }

    fn resolve_language(&self, text: &str, hint: Option<&str>) -> Language {
        language::choose(text, hint.unwrap_or(&self.default_language))
    }

    pub async fn create_chat(&self, title: &str) -> Result<Chat, AgentError> {
        let user_id = self.current_user_id()?;
        let title = if title.trim().is_empty() {
            "New chat"
        } else {
            title.trim()
        };
        Ok(self.store.create_chat(user_id, title).await?)
    }

    pub async fn list_chats(&self, page: usize, size: usize) -> Result<ChatPage, AgentError> {
        let user_id = self.current_user_id()?;
        Ok(self.store.list_chats(user_id, page, size).await?)
    }

    pub async fn search_chats(
        &self,
        query: &str,
        page: usize,
        size: usize,
    ) -> Result<ChatPage, AgentError> {
        let user_id = self.current_user_id()?;
        let matches = self.store.search_chats(user_id, query).await?;
        let total = matches.len();
        let page = page.max(1);
        let size = size.clamp(1, 100);
        let chats = matches
            .into_iter()
            .skip((page - 1) * size)
            .take(size)
            .collect();
        Ok(ChatPage {
            chats,
            total,
            page,
            size,
        })
    }

    pub async fn history(&self, chat_id: Uuid) -> Result<Vec<StoredMessage>, AgentError> {
        self.owned_chat(chat_id).await?;
        Ok(self.store.history(chat_id).await?)
    }

    /// One user turn: persist the message, run the driver, persist the reply.
    pub async fn send_message(
        &self,
        chat_id: Uuid,
        message: &str,
        language_hint: Option<&str>,
    ) -> Result<TurnResponse, AgentError> {
        let lock = self.chat_lock(chat_id).await;
        let _guard = lock.lock().await;

        self.owned_chat(chat_id).await?;
        let history = self.store.history(chat_id).await?;

        // Stored untagged, before the model runs.
        let user_message = self
            .store
            .append_message(chat_id, MessageRole::User, message, None)
            .await?;

        let lang = self.resolve_language(message, language_hint);
        let tagged = language::tag_message(message, lang);
        let raw_reply = self.driver.run(&history, &tagged).await?;
        let shaped = shaper::shape(&raw_reply, lang);

        let ai_response = self
            .store
            .append_message(
                chat_id,
                MessageRole::Assistant,
                &shaped.display_content,
                shaped.raw_output.as_deref(),
            )
            .await?;

        info!(%chat_id, language = lang.code(), "chat turn completed");
        Ok(TurnResponse {
            user_message,
            ai_response,
        })
    }

    /// Edit a past user message, optionally discarding everything after it
    /// and regenerating the assistant reply from the edited content.
    pub async fn edit_message(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        content: &str,
        regenerate: bool,
        language_hint: Option<&str>,
    ) -> Result<EditResponse, AgentError> {
        let lock = self.chat_lock(chat_id).await;
        let _guard = lock.lock().await;

        self.owned_chat(chat_id).await?;
        let Some(original) = self.store.get_message(chat_id, message_id).await? else {
            return Err(AgentError::NotFound(format!(
                "Message {} not found",
                message_id
            )));
        };
        if original.role != MessageRole::User {
            return Err(AgentError::InvalidArgument(EDIT_USER_ONLY.to_string()));
        }

        let edited = self
            .store
            .update_message_content(chat_id, message_id, content)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("Message {} not found", message_id)))?;

        if !regenerate {
            return Ok(EditResponse {
                edited_message: edited,
                ai_response: None,
            });
        }

        let removed = self
            .store
            .delete_messages_after(chat_id, original.created_at)
            .await?;
        info!(%chat_id, removed, "regenerating from edited message");

        // History now ends with the edited message itself; the driver gets
        // everything before it plus the edited content as the live turn.
        let history = self.store.history(chat_id).await?;
        let prior = &history[..history.len().saturating_sub(1)];

        let lang = self.resolve_language(content, language_hint);
        let tagged = language::tag_message(content, lang);
        let raw_reply = self.driver.run(prior, &tagged).await?;
        let shaped = shaper::shape(&raw_reply, lang);

        let ai_response = self
            .store
            .append_message(
                chat_id,
                MessageRole::Assistant,
                &shaped.display_content,
                shaped.raw_output.as_deref(),
            )
            .await?;

        Ok(EditResponse {
            edited_message: edited,
            ai_response: Some(ai_response),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthUser, Role};
    use crate::chat::InMemoryChatStore;
    use crate::context::RequestContext;
    use crate::repo::Repositories;
    use crate::tools::build_registry;
    use async_trait::async_trait;
    use pxp_llm::{ChatMessage, ChatModel, LlmError, ModelTurn, ToolSpec};

    struct EchoModel;

    #[async_trait]
    impl ChatModel for EchoModel {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<ModelTurn, LlmError> {
            let last = messages.last().and_then(|m| m.content.clone()).unwrap_or_default();
            Ok(ModelTurn::text(format!("echo: {}", last)))
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolSpec],
        ) -> Result<ModelTurn, LlmError> {
            Err(LlmError::Timeout)
        }
    }

    fn service(model: Arc<dyn ChatModel>) -> ChatService {
        let (repos, _store) = Repositories::in_memory();
        let registry = Arc::new(build_registry(repos, model.clone()));
        let driver = Arc::new(AgentDriver::new(registry, model));
        ChatService::new(Arc::new(InMemoryChatStore::new()), driver, "nl")
    }

    fn ctx(user_id: i64) -> RequestContext {
        RequestContext::new(
            "token",
            AuthUser {
                id: user_id,
                name: "Dana".to_string(),
                role: Role::Pm,
                company_id: 1,
            },
        )
    }

    #[tokio::test]
    async fn send_persists_untagged_user_message_and_reply() {
        let svc = service(Arc::new(EchoModel));
        context::scope(ctx(7), async {
            let chat = svc.create_chat("Planning").await.expect("create");
            let turn = svc
                .send_message(chat.id, "Geef een overzicht van alle projecten", None)
                .await
                .expect("send");

            assert_eq!(turn.user_message.content, "Geef een overzicht van alle projecten");
            // model saw the tagged version
            assert!(turn
                .ai_response
                .content
                .contains(language::DUTCH_INSTRUCTION));

            let history = svc.history(chat.id).await.expect("history");
            assert_eq!(history.len(), 2);
            assert!(!history[0].content.contains("BELANGRIJK"));
        })
        .await;
    }

    #[tokio::test]
    async fn model_failure_keeps_the_user_message() {
        let svc = service(Arc::new(FailingModel));
        context::scope(ctx(7), async {
            let chat = svc.create_chat("Flaky").await.expect("create");
            let err = svc
                .send_message(chat.id, "hello there friend", None)
                .await
                .expect_err("must fail");
            assert!(matches!(err, AgentError::Model(_)));

            let history = svc.history(chat.id).await.expect("history");
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].content, "hello there friend");
        })
        .await;
    }

    #[tokio::test]
    async fn foreign_chats_look_missing() {
        let svc = service(Arc::new(EchoModel));
        let chat = context::scope(ctx(7), svc.create_chat("Mine"))
            .await
            .expect("create");

        let err = context::scope(ctx(8), svc.send_message(chat.id, "hi", None))
            .await
            .expect_err("must fail");
        assert!(matches!(err, AgentError::NotFound(_)));
    }

    #[tokio::test]
    async fn edit_with_regenerate_discards_later_messages() {
        let svc = service(Arc::new(EchoModel));
        context::scope(ctx(7), async {
            let chat = svc.create_chat("Edits").await.expect("create");
            let first = svc
                .send_message(chat.id, "show all projects please", None)
                .await
                .expect("send");
            svc.send_message(chat.id, "and all the tasks too", None)
                .await
                .expect("send");

            let edited = svc
                .edit_message(
                    chat.id,
                    first.user_message.id,
                    "show all the programs instead",
                    true,
                    Some("en"),
                )
                .await
                .expect("edit");

            assert_eq!(edited.edited_message.content, "show all the programs instead");
            let reply = edited.ai_response.expect("regenerated");
            assert!(reply.content.contains("show all the programs instead"));

            // edited user turn + fresh reply, later turns gone
            let history = svc.history(chat.id).await.expect("history");
            assert_eq!(history.len(), 2);
            assert_eq!(history[0].id, first.user_message.id);
            assert_eq!(history[1].id, reply.id);
        })
        .await;
    }

    #[tokio::test]
    async fn edit_without_regenerate_only_rewrites_content() {
        let svc = service(Arc::new(EchoModel));
        context::scope(ctx(7), async {
            let chat = svc.create_chat("Edits").await.expect("create");
            let turn = svc
                .send_message(chat.id, "original message here", None)
                .await
                .expect("send");

            let edited = svc
                .edit_message(chat.id, turn.user_message.id, "fixed typo", false, None)
                .await
                .expect("edit");
            assert!(edited.ai_response.is_none());

            let history = svc.history(chat.id).await.expect("history");
            assert_eq!(history.len(), 2);
            assert_eq!(history[0].content, "fixed typo");
        })
        .await;
    }

    #[tokio::test]
    async fn assistant_messages_cannot_be_edited() {
        let svc = service(Arc::new(EchoModel));
        context::scope(ctx(7), async {
            let chat = svc.create_chat("Edits").await.expect("create");
            let turn = svc
                .send_message(chat.id, "hello hello hello", None)
                .await
                .expect("send");

            let err = svc
                .edit_message(chat.id, turn.ai_response.id, "nope", false, None)
                .await
                .expect_err("must fail");
            assert!(matches!(err, AgentError::InvalidArgument(_)));
            assert_eq!(err.to_string(), EDIT_USER_ONLY);
        })
        .await;
    }
}
