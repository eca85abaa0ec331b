use std::sync::{Arc, MutexGuard};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::db::{get_connection, DbPool};
use crate::llm::{LlmError, OnChunk, ProviderKind};
use crate::pipeline::{ChatService, SendRequest};
use crate::store::persistence::{Persistence, PersistenceError};
use crate::store::{
    ChatMessage, ConversationStore, SharedStore, StoreError, Submission, Theme, UploadedFile,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("Storage error: {0}")]
    Storage(#[from] duckdb::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn user_message(&self) -> String {
        match self {
            AppError::Llm(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Completed {
        conversation_id: String,
        message: ChatMessage,
    },
    /// Stopped by the user; no assistant message was recorded.
    Cancelled { conversation_id: String },
}

/// Application wiring: the store, the dispatcher and local storage.
pub struct AppState {
    pub config: AppConfig,
    pub service: Arc<ChatService>,
    store: SharedStore,
    storage: DbPool,
    persistence: Persistence,
}

impl AppState {
    pub fn open(config: AppConfig) -> Result<Self, AppError> {
        let storage = get_connection(&config.storage)?;
        let service = ChatService::from_config(&config);
        Self::new(config, service, storage)
    }

    /// Restores persisted conversations from `storage`.
    pub fn new(config: AppConfig, service: ChatService, storage: DbPool) -> Result<Self, AppError> {
        let persistence = Persistence::new(config.chat.product, config.storage_layout());
        let state = {
            let conn = lock_db(&storage);
            persistence.load(&conn)?
        };
        info!(
            "Loaded {} conversations ({:?} layout)",
            state.conversations.len(),
            persistence.layout()
        );

        Ok(Self {
            config,
            service: Arc::new(service),
            store: ConversationStore::from_persisted(state).shared(),
            storage,
            persistence,
        })
    }

    pub fn store(&self) -> MutexGuard<'_, ConversationStore> {
        lock_store(&self.store)
    }

    pub fn default_provider(&self) -> ProviderKind {
        self.config.llm.default_provider
    }

    /// Writes conversations and theme to local storage.
    pub fn persist(&self) -> Result<(), AppError> {
        let snapshot = self.store().to_persisted();
        let conn = lock_db(&self.storage);
        self.persistence.save(&conn, &snapshot)?;
        Ok(())
    }

    /// Records the user's message and reserves the conversation. `Ok(None)`
    /// when there is nothing to send.
    pub fn begin_turn(
        &self,
        conversation_id: Option<&str>,
        text: &str,
    ) -> Result<Option<(Submission, Vec<UploadedFile>)>, AppError> {
        let turn = {
            let mut store = self.store();
            let files = store.files().to_vec();
            store
                .submit(conversation_id, text, !files.is_empty())?
                .map(|submission| (submission, files))
        };
        if let Some((submission, _)) = &turn {
            if let Err(e) = self.persist() {
                // Release the reservation so the conversation does not stay busy.
                self.store().fail(&submission.conversation_id, submission.request_id);
                return Err(e);
            }
        }
        Ok(turn)
    }

    /// Runs the dispatcher for a reserved turn and records the outcome.
    pub async fn run_turn(
        &self,
        submission: Submission,
        files: Vec<UploadedFile>,
        provider: ProviderKind,
        on_chunk: &mut OnChunk<'_>,
    ) -> Result<TurnOutcome, AppError> {
        let conversation_id = submission.conversation_id.clone();
        let request_id = submission.request_id;

        let store = self.store.clone();
        let mut forward = |text: &str| {
            if lock_store(&store).update_streaming(&conversation_id, request_id, text) {
                on_chunk(text);
            }
        };

        let request = SendRequest {
            message: &submission.message,
            provider,
            history: &submission.history,
            files: &files,
        };
        let result = self
            .service
            .send_message(request, &mut forward, &submission.cancel)
            .await;

        match result {
            Ok(content) => {
                let message = self.store().complete(&conversation_id, request_id, &content);
                match message {
                    Some(message) => {
                        self.persist()?;
                        Ok(TurnOutcome::Completed {
                            conversation_id,
                            message,
                        })
                    }
                    None => {
                        debug!("Reply for {} arrived after the turn was closed", conversation_id);
                        Ok(TurnOutcome::Cancelled { conversation_id })
                    }
                }
            }
            Err(e) if e.is_aborted() => {
                self.store().fail(&conversation_id, request_id);
                Ok(TurnOutcome::Cancelled { conversation_id })
            }
            Err(e) => {
                self.store().fail(&conversation_id, request_id);
                Err(e.into())
            }
        }
    }

    /// Convenience for callers that do not need the submission in between.
    pub async fn send(
        &self,
        conversation_id: Option<&str>,
        text: &str,
        provider: ProviderKind,
        on_chunk: &mut OnChunk<'_>,
    ) -> Result<Option<TurnOutcome>, AppError> {
        let Some((submission, files)) = self.begin_turn(conversation_id, text)? else {
            return Ok(None);
        };
        self.run_turn(submission, files, provider, on_chunk)
            .await
            .map(Some)
    }

    /// Aborts the in-flight request of a conversation.
    pub fn stop(&self, conversation_id: &str) -> bool {
        self.store().abort(conversation_id)
    }

    pub fn create_conversation(&self) -> Result<String, AppError> {
        let id = self.store().create_conversation();
        self.persist()?;
        Ok(id)
    }

    pub fn delete_conversation(&self, conversation_id: &str) -> Result<bool, AppError> {
        let deleted = self.store().delete_conversation(conversation_id);
        if deleted {
            self.persist()?;
        }
        Ok(deleted)
    }

    /// Deletes every conversation and starts a fresh context-cache session.
    /// The theme survives.
    pub fn clear_all(&self) -> Result<(), AppError> {
        self.store().clear_all();
        self.service.cache().clear();
        self.persist()
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), AppError> {
        self.store().set_theme(theme);
        self.persist()
    }

    pub fn add_file(&self, file: UploadedFile) {
        info!("Attached file {} ({} rows)", file.name, file.content.len());
        self.store().add_file(file);
    }
}

fn lock_store(store: &SharedStore) -> MutexGuard<'_, ConversationStore> {
    store.lock().unwrap_or_else(|poisoned| {
        warn!("Conversation store lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn lock_db(pool: &DbPool) -> MutexGuard<'_, duckdb::Connection> {
    pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
