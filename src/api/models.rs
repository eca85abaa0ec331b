use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::ProviderKind;
use crate::store::models::iso_date;
use crate::store::{ChatMessage, Conversation, RequestPhase, Theme};

#[derive(Debug, Deserialize)]
pub struct ChatTurnRequest {
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub content: String,
    pub provider: Option<ProviderKind>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub message_count: usize,
    pub phase: RequestPhase,
    #[serde(with = "iso_date")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso_date")]
    pub updated_at: DateTime<Utc>,
}

impl ConversationSummary {
    pub fn new(conversation: &Conversation, phase: RequestPhase) -> Self {
        Self {
            id: conversation.id.clone(),
            title: conversation.title.clone(),
            message_count: conversation.messages.len(),
            phase,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

/// A conversation plus its transient request state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub phase: RequestPhase,
    pub streaming_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedConversation {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThemeBody {
    pub theme: Theme,
}

/// Server-sent events of `POST /api/chat`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    Started { conversation_id: String },
    /// Full text so far.
    Chunk { content: String },
    Done { message: ChatMessage },
    Cancelled,
    Error { message: String },
}

impl ChatEvent {
    pub fn to_sse(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({ "type": "error", "message": e.to_string() }).to_string()
        });
        format!("data: {}\n\n", json)
    }
}
