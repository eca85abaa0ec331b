use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row of the key/value table standing in for browser local storage.
#[derive(Debug, Clone, Serialize)]
pub struct StoredItem {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
