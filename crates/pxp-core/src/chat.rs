//! Chat persistence
//!
//! Conversations and their messages. Only user and assistant turns are
//! stored; tool-call exchanges live inside a single driver run and are never
//! persisted. `raw_output` keeps the untransformed model output alongside the
//! display text when the shaper rewrote it.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChatPage {
    pub chats: Vec<Chat>,
    pub total: usize,
    pub page: usize,
    pub size: usize,
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_chat(&self, user_id: i64, title: &str) -> Result<Chat>;
    async fn get_chat(&self, chat_id: Uuid) -> Result<Option<Chat>>;
    /// Chats of one user, most recently active first
    async fn list_chats(&self, user_id: i64, page: usize, size: usize) -> Result<ChatPage>;
    /// Case-insensitive title substring search over the user's chats
    async fn search_chats(&self, user_id: i64, query: &str) -> Result<Vec<Chat>>;
    /// Appends and bumps the chat's `updated_at`
    async fn append_message(
        &self,
        chat_id: Uuid,
        role: MessageRole,
        content: &str,
        raw_output: Option<&str>,
    ) -> Result<StoredMessage>;
    /// Full history, oldest first
    async fn history(&self, chat_id: Uuid) -> Result<Vec<StoredMessage>>;
    async fn get_message(&self, chat_id: Uuid, message_id: Uuid) -> Result<Option<StoredMessage>>;
    async fn update_message_content(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        content: &str,
    ) -> Result<Option<StoredMessage>>;
    /// Remove every message strictly newer than `after`
    async fn delete_messages_after(&self, chat_id: Uuid, after: DateTime<Utc>) -> Result<usize>;
}

/// In-memory chat store for tests and local development
#[derive(Default)]
pub struct InMemoryChatStore {
    inner: std::sync::Mutex<ChatTables>,
}

#[derive(Default)]
struct ChatTables {
    chats: Vec<Chat>,
    messages: Vec<StoredMessage>,
    last_stamp: Option<DateTime<Utc>>,
}

impl ChatTables {
    /// Strictly increasing timestamps so ordering and the
    /// delete-after cutoff are deterministic even within one millisecond.
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_stamp {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_stamp = Some(now);
        now
    }
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChatTables> {
        self.inner.lock().expect("chat store poisoned")
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn create_chat(&self, user_id: i64, title: &str) -> Result<Chat> {
        let mut tables = self.lock();
        let now = tables.next_stamp();
        let chat = Chat {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        tables.chats.push(chat.clone());
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: Uuid) -> Result<Option<Chat>> {
        Ok(self.lock().chats.iter().find(|c| c.id == chat_id).cloned())
    }

    async fn list_chats(&self, user_id: i64, page: usize, size: usize) -> Result<ChatPage> {
        let tables = self.lock();
        let mut chats: Vec<Chat> = tables
            .chats
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let total = chats.len();
        let page = page.max(1);
        let size = size.clamp(1, 100);
        let chats = chats.into_iter().skip((page - 1) * size).take(size).collect();
        Ok(ChatPage {
            chats,
            total,
            page,
            size,
        })
    }

    async fn search_chats(&self, user_id: i64, query: &str) -> Result<Vec<Chat>> {
        let needle = query.to_lowercase();
        let tables = self.lock();
        let mut chats: Vec<Chat> = tables
            .chats
            .iter()
            .filter(|c| c.user_id == user_id && c.title.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(chats)
    }

    async fn append_message(
        &self,
        chat_id: Uuid,
        role: MessageRole,
        content: &str,
        raw_output: Option<&str>,
    ) -> Result<StoredMessage> {
        let mut tables = self.lock();
        if !tables.chats.iter().any(|c| c.id == chat_id) {
            anyhow::bail!("chat {} not found", chat_id);
        }
        let now = tables.next_stamp();
        let message = StoredMessage {
            id: Uuid::new_v4(),
            chat_id,
            role,
            content: content.to_string(),
            raw_output: raw_output.map(str::to_string),
            created_at: now,
        };
        tables.messages.push(message.clone());
        if let Some(chat) = tables.chats.iter_mut().find(|c| c.id == chat_id) {
            chat.updated_at = now;
        }
        Ok(message)
    }

    async fn history(&self, chat_id: Uuid) -> Result<Vec<StoredMessage>> {
        let tables = self.lock();
        let mut messages: Vec<StoredMessage> = tables
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn get_message(&self, chat_id: Uuid, message_id: Uuid) -> Result<Option<StoredMessage>> {
        Ok(self
            .lock()
            .messages
            .iter()
            .find(|m| m.chat_id == chat_id && m.id == message_id)
            .cloned())
    }

    async fn update_message_content(
        &self,
        chat_id: Uuid,
        message_id: Uuid,
        content: &str,
    ) -> Result<Option<StoredMessage>> {
        let mut tables = self.lock();
        let Some(message) = tables
            .messages
            .iter_mut()
            .find(|m| m.chat_id == chat_id && m.id == message_id)
        else {
            return Ok(None);
        };
        message.content = content.to_string();
        Ok(Some(message.clone()))
    }

    async fn delete_messages_after(&self, chat_id: Uuid, after: DateTime<Utc>) -> Result<usize> {
        let mut tables = self.lock();
        let before = tables.messages.len();
        tables
            .messages
            .retain(|m| m.chat_id != chat_id || m.created_at <= after);
        Ok(before - tables.messages.len())
    }
}
