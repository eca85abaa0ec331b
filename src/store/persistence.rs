use std::collections::HashSet;

use duckdb::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::service::StorageService;
use crate::store::models::{ChatMessage, Conversation, ConversationHeader, Product, Theme};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage error: {0}")]
    Storage(#[from] duckdb::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How conversations are laid out in local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageLayout {
    /// One key holding `{ conversations, theme }`.
    Blob,
    /// A header list plus one message array per conversation.
    Keyed,
}

impl StorageLayout {
    pub fn for_product(product: Product) -> Self {
        match product {
            Product::StratifyPm => StorageLayout::Blob,
            Product::MeetingMind => StorageLayout::Keyed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub theme: Theme,
}

/// Storage keys for one product.
#[derive(Debug, Clone)]
pub struct StorageKeys {
    prefix: &'static str,
}

impl StorageKeys {
    pub fn new(product: Product) -> Self {
        Self {
            prefix: product.storage_prefix(),
        }
    }

    pub fn blob(&self) -> String {
        format!("{}-storage", self.prefix)
    }

    pub fn conversations(&self) -> String {
        format!("{}-conversations", self.prefix)
    }

    pub fn messages_prefix(&self) -> String {
        format!("{}-messages-", self.prefix)
    }

    pub fn messages(&self, conversation_id: &str) -> String {
        format!("{}{}", self.messages_prefix(), conversation_id)
    }

    pub fn theme(&self) -> String {
        format!("{}-theme", self.prefix)
    }
}

pub struct Persistence {
    keys: StorageKeys,
    layout: StorageLayout,
}

impl Persistence {
    pub fn new(product: Product, layout: StorageLayout) -> Self {
        Self {
            keys: StorageKeys::new(product),
            layout,
        }
    }

    pub fn layout(&self) -> StorageLayout {
        self.layout
    }

    pub fn save(&self, conn: &Connection, state: &PersistedState) -> Result<(), PersistenceError> {
        match self.layout {
            StorageLayout::Blob => {
                let blob = serde_json::to_string(state)?;
                StorageService::set_item(conn, &self.keys.blob(), &blob)?;
            }
            StorageLayout::Keyed => {
                let headers: Vec<ConversationHeader> =
                    state.conversations.iter().map(Conversation::header).collect();
                StorageService::set_item(
                    conn,
                    &self.keys.conversations(),
                    &serde_json::to_string(&headers)?,
                )?;

                let mut live = HashSet::new();
                for conversation in &state.conversations {
                    let key = self.keys.messages(&conversation.id);
                    StorageService::set_item(
                        conn,
                        &key,
                        &serde_json::to_string(&conversation.messages)?,
                    )?;
                    live.insert(key);
                }
                for key in StorageService::keys_with_prefix(conn, &self.keys.messages_prefix())? {
                    if !live.contains(&key) {
                        StorageService::remove_item(conn, &key)?;
                    }
                }

                StorageService::set_item(
                    conn,
                    &self.keys.theme(),
                    &serde_json::to_string(&state.theme)?,
                )?;
            }
        }
        debug!("Saved {} conversations", state.conversations.len());
        Ok(())
    }

    /// Loads persisted state. Corrupt JSON is logged and treated as absent,
    /// individual unparseable dates are revived as "now".
    pub fn load(&self, conn: &Connection) -> Result<PersistedState, PersistenceError> {
        match self.layout {
            StorageLayout::Blob => {
                let Some(blob) = StorageService::get_item(conn, &self.keys.blob())? else {
                    return Ok(PersistedState::default());
                };
                Ok(parse_or_default(&self.keys.blob(), &blob))
            }
            StorageLayout::Keyed => {
                let headers: Vec<ConversationHeader> =
                    match StorageService::get_item(conn, &self.keys.conversations())? {
                        Some(raw) => parse_or_default(&self.keys.conversations(), &raw),
                        None => Vec::new(),
                    };

                let mut conversations = Vec::with_capacity(headers.len());
                for header in headers {
                    let key = self.keys.messages(&header.id);
                    let messages: Vec<ChatMessage> = match StorageService::get_item(conn, &key)? {
                        Some(raw) => parse_or_default(&key, &raw),
                        None => Vec::new(),
                    };
                    conversations.push(Conversation {
                        id: header.id,
                        title: header.title,
                        messages,
                        created_at: header.created_at,
                        updated_at: header.updated_at,
                    });
                }

                let theme = match StorageService::get_item(conn, &self.keys.theme())? {
                    Some(raw) => parse_or_default(&self.keys.theme(), &raw),
                    None => Theme::default(),
                };

                Ok(PersistedState { conversations, theme })
            }
        }
    }
}

fn parse_or_default<T>(key: &str, raw: &str) -> T
where
    T: for<'de> Deserialize<'de> + Default,
{
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Discarding unreadable stored value for {}: {}", key, e);
        T::default()
    })
}
