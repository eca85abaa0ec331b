//! Conversation Store: owns conversations, their messages, the shared list
//! of uploaded files and the transient per-conversation request state.
//!
//! Each conversation moves `Idle -> Loading -> Streaming -> Idle`, and back
//! to `Idle` from either busy phase on abort or failure. Only one request
//! may be in flight per conversation. The check and the transition happen
//! under the same `&mut self` borrow, so wrapping the store in a mutex
//! ([`SharedStore`]) makes the guard atomic.

pub mod files;
pub mod models;
pub mod persistence;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::llm::models::{Message, Role};
pub use models::{
    derive_title, now_millis, ChatMessage, Conversation, Product, Theme, UploadedFile,
    DEFAULT_TITLE,
};
use persistence::PersistedState;

pub type SharedStore = Arc<Mutex<ConversationStore>>;

/// Stand-in prompt when files are submitted without any text.
pub const FILE_ONLY_PROMPT: &str = "Please analyze the uploaded files.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Conversation {0} not found")]
    NotFound(String),
    #[error("Conversation {0} already has a request in flight")]
    Busy(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestPhase {
    Idle,
    Loading,
    Streaming,
}

#[derive(Debug)]
struct InFlight {
    request_id: Uuid,
    phase: RequestPhase,
    streaming_message: Option<String>,
    cancel: CancellationToken,
}

/// Everything a dispatcher needs to answer one submitted message.
#[derive(Debug, Clone)]
pub struct Submission {
    pub request_id: Uuid,
    pub conversation_id: String,
    pub message: String,
    /// Turns preceding `message`.
    pub history: Vec<Message>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    /// Most recently created first.
    conversations: Vec<Conversation>,
    in_flight: HashMap<String, InFlight>,
    files: Vec<UploadedFile>,
    theme: Theme,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn from_persisted(state: PersistedState) -> Self {
        Self {
            conversations: state.conversations,
            theme: state.theme,
            ..Self::default()
        }
    }

    /// Persistable view. Transient request state is never included.
    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            conversations: self.conversations.clone(),
            theme: self.theme,
        }
    }

    // --- Conversations ---

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn conversation_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    pub fn create_conversation(&mut self) -> String {
        let conversation = Conversation::new();
        let id = conversation.id.clone();
        self.conversations.insert(0, conversation);
        info!("Created conversation {}", id);
        id
    }

    pub fn delete_conversation(&mut self, id: &str) -> bool {
        self.abort(id);
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        self.conversations.len() != before
    }

    /// Drops every conversation, aborting whatever is in flight.
    pub fn clear_all(&mut self) {
        for (_, request) in self.in_flight.drain() {
            request.cancel.cancel();
        }
        self.conversations.clear();
        info!("Cleared all conversations");
    }

    // --- Request lifecycle ---

    /// Appends the user's message and moves the conversation to `Loading`.
    ///
    /// Returns `Ok(None)` without touching any state when there is neither
    /// text nor an attached file. Without `conversation_id` a conversation
    /// is created on the fly.
    pub fn submit(
        &mut self,
        conversation_id: Option<&str>,
        text: &str,
        has_files: bool,
    ) -> Result<Option<Submission>, StoreError> {
        let trimmed = text.trim();
        if trimmed.is_empty() && !has_files {
            return Ok(None);
        }

        if let Some(id) = conversation_id {
            if self.conversation(id).is_none() {
                return Err(StoreError::NotFound(id.to_string()));
            }
            if self.in_flight.contains_key(id) {
                return Err(StoreError::Busy(id.to_string()));
            }
        }
        let id = match conversation_id {
            Some(id) => id.to_string(),
            None => self.create_conversation(),
        };

        let content = if trimmed.is_empty() {
            FILE_ONLY_PROMPT.to_string()
        } else {
            trimmed.to_string()
        };

        let conversation = self
            .conversation_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let history: Vec<Message> = conversation
            .messages
            .iter()
            .map(ChatMessage::to_llm)
            .collect();

        let is_first_user_message = !conversation.messages.iter().any(|m| m.role == Role::User);
        if is_first_user_message && conversation.title == DEFAULT_TITLE {
            conversation.title = derive_title(&content);
        }
        let message = ChatMessage::new(Role::User, content.clone());
        conversation.updated_at = message.timestamp;
        conversation.messages.push(message);

        let request_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        self.in_flight.insert(
            id.clone(),
            InFlight {
                request_id,
                phase: RequestPhase::Loading,
                streaming_message: None,
                cancel: cancel.clone(),
            },
        );
        debug!("Conversation {} is loading (request {})", id, request_id);

        Ok(Some(Submission {
            request_id,
            conversation_id: id,
            message: content,
            history,
            cancel,
        }))
    }

    fn current(&mut self, id: &str, request_id: Uuid) -> Option<&mut InFlight> {
        self.in_flight
            .get_mut(id)
            .filter(|r| r.request_id == request_id)
    }

    /// Records partial output. Ignored once the request was aborted or replaced.
    pub fn update_streaming(&mut self, id: &str, request_id: Uuid, text: &str) -> bool {
        match self.current(id, request_id) {
            Some(request) if !request.cancel.is_cancelled() => {
                request.phase = RequestPhase::Streaming;
                request.streaming_message = Some(text.to_string());
                true
            }
            _ => false,
        }
    }

    /// Appends the final assistant message and returns the conversation to `Idle`.
    pub fn complete(&mut self, id: &str, request_id: Uuid, content: &str) -> Option<ChatMessage> {
        self.current(id, request_id)?;
        self.in_flight.remove(id);

        let conversation = self.conversation_mut(id)?;
        let message = ChatMessage::new(Role::Assistant, content);
        conversation.updated_at = message.timestamp;
        conversation.messages.push(message.clone());
        Some(message)
    }

    /// Returns to `Idle` discarding partial output, no assistant message is kept.
    pub fn fail(&mut self, id: &str, request_id: Uuid) -> bool {
        if self.current(id, request_id).is_none() {
            return false;
        }
        self.in_flight.remove(id).is_some()
    }

    /// Cancels the in-flight request, if any, and returns to `Idle`.
    pub fn abort(&mut self, id: &str) -> bool {
        match self.in_flight.remove(id) {
            Some(request) => {
                request.cancel.cancel();
                info!("Aborted request {} for conversation {}", request.request_id, id);
                true
            }
            None => false,
        }
    }

    pub fn phase(&self, id: &str) -> RequestPhase {
        self.in_flight
            .get(id)
            .map(|r| r.phase)
            .unwrap_or(RequestPhase::Idle)
    }

    pub fn is_loading(&self, id: &str) -> bool {
        self.phase(id) != RequestPhase::Idle
    }

    pub fn streaming_message(&self, id: &str) -> Option<&str> {
        self.in_flight
            .get(id)
            .and_then(|r| r.streaming_message.as_deref())
    }

    // --- Files ---

    pub fn files(&self) -> &[UploadedFile] {
        &self.files
    }

    /// Adds a file, replacing any earlier upload with the same name.
    pub fn add_file(&mut self, file: UploadedFile) {
        self.files.retain(|f| f.name != file.name);
        self.files.push(file);
    }

    pub fn remove_file(&mut self, name: &str) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.name != name);
        self.files.len() != before
    }

    pub fn clear_files(&mut self) {
        self.files.clear();
    }

    // --- Theme ---

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }
}
