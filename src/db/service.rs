use crate::db::models::StoredItem;
use chrono::{NaiveDateTime, Utc};
use duckdb::{params, Connection, Result as DbResult, Row};

/// Local-storage style access: string keys, string values.
pub struct StorageService;

impl StorageService {
    fn row_to_item(row: &Row) -> DbResult<StoredItem> {
        // Timestamps are selected AS VARCHAR, e.g. "2024-05-01 10:20:30.123"
        let updated_str: String = row.get(2)?;
        let updated_at = NaiveDateTime::parse_from_str(&updated_str, "%Y-%m-%d %H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .unwrap_or_else(|_| Utc::now());

        Ok(StoredItem {
            key: row.get(0)?,
            value: row.get(1)?,
            updated_at,
        })
    }

    pub fn get_item(conn: &Connection, key: &str) -> DbResult<Option<String>> {
        let mut stmt = conn.prepare("SELECT value FROM local_storage WHERE key = ?")?;
        let mut rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn set_item(conn: &Connection, key: &str, value: &str) -> DbResult<()> {
        conn.execute(
            "INSERT OR REPLACE INTO local_storage (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn remove_item(conn: &Connection, key: &str) -> DbResult<bool> {
        let removed = conn.execute("DELETE FROM local_storage WHERE key = ?", params![key])?;
        Ok(removed > 0)
    }

    pub fn items_with_prefix(conn: &Connection, prefix: &str) -> DbResult<Vec<StoredItem>> {
        let mut stmt = conn.prepare(
            "SELECT key, value, CAST(updated_at AS VARCHAR) FROM local_storage
             WHERE starts_with(key, ?)
             ORDER BY key ASC",
        )?;
        let rows = stmt.query_map(params![prefix], Self::row_to_item)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    pub fn keys_with_prefix(conn: &Connection, prefix: &str) -> DbResult<Vec<String>> {
        Ok(Self::items_with_prefix(conn, prefix)?
            .into_iter()
            .map(|item| item.key)
            .collect())
    }

    /// Removes every key starting with `prefix`; returns how many were removed.
    pub fn clear(conn: &Connection, prefix: &str) -> DbResult<usize> {
        conn.execute(
            "DELETE FROM local_storage WHERE starts_with(key, ?)",
            params![prefix],
        )
    }
}
