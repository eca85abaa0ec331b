//! Single-slot cache of the most recently fetched search context.
//!
//! Last query wins: a write replaces whatever was cached, whichever
//! conversation it came from. Concurrent conversations can therefore evict
//! each other's context. Relevance is a keyword-overlap heuristic, not a
//! semantic comparison.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::config::PipelineConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub query: String,
    pub context: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheRules {
    pub ttl: Duration,
    pub min_shared_keywords: usize,
    pub keyword_ratio: f64,
    /// Only words longer than this count as keywords.
    pub min_word_len: usize,
}

impl From<&PipelineConfig> for CacheRules {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            ttl: Duration::from_secs(config.cache_ttl_secs),
            min_shared_keywords: config.cache_min_shared_keywords,
            keyword_ratio: config.cache_keyword_ratio,
            min_word_len: config.cache_min_word_len,
        }
    }
}

impl Default for CacheRules {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

#[derive(Debug)]
struct Slot {
    entry: Option<CacheEntry>,
    session_id: Uuid,
}

#[derive(Debug)]
pub struct ContextCache {
    rules: CacheRules,
    slot: Mutex<Slot>,
}

impl ContextCache {
    pub fn new(rules: CacheRules) -> Self {
        Self {
            rules,
            slot: Mutex::new(Slot {
                entry: None,
                session_id: Uuid::new_v4(),
            }),
        }
    }

    pub fn is_valid(&self, query: &str) -> bool {
        self.is_valid_at(query, Utc::now())
    }

    pub fn is_valid_at(&self, query: &str, now: DateTime<Utc>) -> bool {
        let slot = self.lock();
        self.slot_valid(&slot, query, now)
    }

    fn slot_valid(&self, slot: &Slot, query: &str, now: DateTime<Utc>) -> bool {
        let Some(entry) = slot.entry.as_ref() else {
            return false;
        };
        if entry.session_id != slot.session_id {
            return false;
        }
        let age = now.signed_duration_since(entry.timestamp);
        let fresh = age
            .to_std()
            .map(|age| age < self.rules.ttl)
            // a timestamp in the future only happens with clock skew
            .unwrap_or(true);
        fresh && self.related(query, &entry.query)
    }

    /// Cached context when valid for `query`.
    pub fn get(&self, query: &str) -> Option<String> {
        let slot = self.lock();
        if !self.slot_valid(&slot, query, Utc::now()) {
            return None;
        }
        slot.entry.as_ref().map(|e| e.context.clone())
    }

    pub fn update(&self, query: &str, context: &str) {
        self.update_at(query, context, Utc::now());
    }

    pub fn update_at(&self, query: &str, context: &str, now: DateTime<Utc>) {
        let mut slot = self.lock();
        let session_id = slot.session_id;
        slot.entry = Some(CacheEntry {
            query: query.to_string(),
            context: context.to_string(),
            timestamp: now,
            session_id,
        });
        debug!("Cached search context for '{}'", query);
    }

    /// Empties the slot and starts a new session.
    pub fn clear(&self) {
        let mut slot = self.lock();
        slot.entry = None;
        slot.session_id = Uuid::new_v4();
    }

    pub fn entry(&self) -> Option<CacheEntry> {
        self.lock().entry.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Keyword overlap test: the query shares at least
    /// `min(min_shared_keywords, ceil(keyword_ratio * keywords))` keywords
    /// with the cached query. Queries without keywords must match exactly.
    fn related(&self, query: &str, cached: &str) -> bool {
        let query_words = self.keywords(query);
        if query_words.is_empty() {
            return query.trim().eq_ignore_ascii_case(cached.trim());
        }
        let cached_words = self.keywords(cached);
        let shared = query_words.intersection(&cached_words).count();

        let by_ratio = (self.rules.keyword_ratio * query_words.len() as f64).ceil() as usize;
        let required = self.rules.min_shared_keywords.min(by_ratio).max(1);
        shared >= required
    }

    fn keywords(&self, text: &str) -> HashSet<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > self.rules.min_word_len)
            .map(str::to_string)
            .collect()
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new(CacheRules::default())
    }
}
