use super::StateStore;
use crate::types::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use libsql::{Builder, Connection, Database};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Durable state store on a libsql (SQLite) database.
///
/// One row per `(session_key, field_key)`; a put is a single upsert, which is
/// the per-key atomicity concurrent workers rely on.
pub struct LibsqlStore {
    // Keeps the database alive for the lifetime of the connection.
    _db: Database,
    conn: Connection,
}

fn unavailable(context: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(format!("{}: {}", context, e))
}

impl LibsqlStore {
    /// Open (or create) a database file. Parent directories are created.
    pub async fn open_local(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| unavailable("Failed to create state directory", e))?;
            }
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| unavailable("Failed to open state database", e))?;
        Self::from_database(db).await
    }

    /// Open a private in-memory database (used by tests).
    pub async fn open_memory() -> Result<Self, StoreError> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| unavailable("Failed to open in-memory database", e))?;
        Self::from_database(db).await
    }

    async fn from_database(db: Database) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| unavailable("Failed to get connection", e))?;
        let store = Self { _db: db, conn };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS session_state (
                    session_key TEXT NOT NULL,
                    field_key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (session_key, field_key)
                )",
                (),
            )
            .await
            .map_err(|e| unavailable("Failed to create session_state table", e))?;

        Ok(())
    }
}

fn decode(field: &str, payload: &str) -> Result<Value, StoreError> {
    serde_json::from_str(payload).map_err(|e| StoreError::Corrupt {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl StateStore for LibsqlStore {
    async fn put(&self, session: &str, field: &str, value: Value) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&value).map_err(|e| StoreError::Corrupt {
            field: field.to_string(),
            reason: e.to_string(),
        })?;
        let now = Utc::now().timestamp();

        self.conn
            .execute(
                "INSERT INTO session_state (session_key, field_key, value, updated_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (session_key, field_key)
                 DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                (session, field, payload, now),
            )
            .await
            .map_err(|e| unavailable("Failed to write state", e))?;

        Ok(())
    }

    async fn get(&self, session: &str, field: &str) -> Result<Option<Value>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM session_state WHERE session_key = ? AND field_key = ?",
                (session, field),
            )
            .await
            .map_err(|e| unavailable("Failed to query state", e))?;

        if let Some(row) = rows
            .next()
            .await
            .map_err(|e| unavailable("Failed to read state row", e))?
        {
            let payload: String = row
                .get(0)
                .map_err(|e| unavailable("Failed to read state value", e))?;
            decode(field, &payload).map(Some)
        } else {
            Ok(None)
        }
    }

    async fn list(&self, session: &str) -> Result<BTreeMap<String, Value>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT field_key, value FROM session_state
                 WHERE session_key = ? ORDER BY field_key ASC",
                [session],
            )
            .await
            .map_err(|e| unavailable("Failed to query state", e))?;

        let mut fields = BTreeMap::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| unavailable("Failed to read state row", e))?
        {
            let field: String = row
                .get(0)
                .map_err(|e| unavailable("Failed to read field key", e))?;
            let payload: String = row
                .get(1)
                .map_err(|e| unavailable("Failed to read state value", e))?;
            let value = decode(&field, &payload)?;
            fields.insert(field, value);
        }

        Ok(fields)
    }

    async fn delete(&self, session: &str, field: &str) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM session_state WHERE session_key = ? AND field_key = ?",
                (session, field),
            )
            .await
            .map_err(|e| unavailable("Failed to delete state", e))?;
        Ok(removed > 0)
    }

    async fn clear(&self, session: &str) -> Result<usize, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM session_state WHERE session_key = ?", [session])
            .await
            .map_err(|e| unavailable("Failed to clear session state", e))?;
        Ok(removed as usize)
    }

    fn backend(&self) -> &'static str {
        "libsql"
    }
}
