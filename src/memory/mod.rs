//! Shared research-session state.
//!
//! Every pipeline stage commits its output here and the next stage reads it
//! back, so any stage can be inspected or restarted on its own. Values are
//! JSON documents addressed by `(session_key, field_key)`.
//!
//! Two backends satisfy the same contract:
//! - [`InMemoryStore`] - process-local fallback, lost on exit
//! - [`LibsqlStore`] - durable SQLite file via libsql
//!
//! Both give read-after-write visibility for a key to every caller, and
//! writes to distinct keys never contend, so concurrent research workers can
//! commit notes without extra locking.
//!
//! # Example
//!
//! ```rust,ignore
//! use swarm::memory::{StoreExt, StoreProvider};
//!
//! let store = StoreProvider::from_env().open().await;
//! store.put_json(&session.key, fields::SUBTOPICS, &subtopics).await?;
//! let plan: Option<Vec<Subtopic>> = store.get_json(&session.key, fields::SUBTOPICS).await?;
//! ```

/// Process-local backend.
pub mod in_memory;
/// libsql (SQLite) backend.
pub mod libsql_store;

pub use in_memory::InMemoryStore;
pub use libsql_store::LibsqlStore;

use crate::types::{EvidenceNote, PipelineError, ResearchBatch, StoreError};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Field keys used by the pipeline.
pub mod fields {
    pub const SESSION: &str = "session";
    pub const QUESTION: &str = "question";
    pub const SUBTOPICS: &str = "subtopics";
    pub const REPORT: &str = "report";
    pub const CRITIQUE: &str = "critique";
    pub const ARTIFACT: &str = "artifact";

    const EVIDENCE_PREFIX: &str = "evidence:";

    /// Key for the evidence note of one subtopic.
    pub fn evidence(index: usize) -> String {
        format!("{}{:04}", EVIDENCE_PREFIX, index)
    }

    /// Inverse of [`evidence`]; `None` for any other field key.
    pub fn evidence_index(field: &str) -> Option<usize> {
        field.strip_prefix(EVIDENCE_PREFIX)?.parse().ok()
    }
}

/// Key/value store over research-session data.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Insert or replace the value of one field.
    async fn put(&self, session: &str, field: &str, value: Value) -> Result<(), StoreError>;

    /// Read one field; `Ok(None)` when it was never written.
    async fn get(&self, session: &str, field: &str) -> Result<Option<Value>, StoreError>;

    /// All fields of a session, ordered by field key.
    async fn list(&self, session: &str) -> Result<BTreeMap<String, Value>, StoreError>;

    /// Remove one field. Returns whether it existed.
    async fn delete(&self, session: &str, field: &str) -> Result<bool, StoreError>;

    /// Remove every field of a session. Returns how many were removed.
    async fn clear(&self, session: &str) -> Result<usize, StoreError>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Typed helpers over [`StateStore`].
#[async_trait]
pub trait StoreExt: StateStore {
    async fn put_json<T>(&self, session: &str, field: &str, value: &T) -> Result<(), StoreError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let value = serde_json::to_value(value).map_err(|e| StoreError::Corrupt {
            field: field.to_string(),
            reason: e.to_string(),
        })?;
        self.put(session, field, value).await
    }

    async fn get_json<T>(&self, session: &str, field: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(session, field).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    field: field.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }
}

impl<S: StateStore + ?Sized> StoreExt for S {}

impl ResearchBatch {
    /// Rebuild a session's batch from its committed evidence notes.
    pub async fn load(
        store: &dyn StateStore,
        session: &str,
        expected: usize,
    ) -> crate::types::Result<Self> {
        let mut notes = Vec::with_capacity(expected);
        for (field, value) in store.list(session).await? {
            if fields::evidence_index(&field).is_none() {
                continue;
            }
            let note: EvidenceNote =
                serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
                    field: field.clone(),
                    reason: e.to_string(),
                })?;
            notes.push(note);
        }
        if notes.len() != expected {
            return Err(PipelineError::IncompleteBatch(format!(
                "found {} evidence notes for {} subtopics",
                notes.len(),
                expected
            )));
        }
        ResearchBatch::assemble(expected, notes)
    }
}

/// Store backend selection, resolved once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StoreProvider {
    /// In-process fallback (ephemeral)
    #[default]
    Memory,
    /// Durable libsql database file
    Libsql {
        /// Path to the database file
        path: String,
    },
}

impl StoreProvider {
    /// Pick a backend from `SWARM_STATE_PATH`, defaulting to memory.
    pub fn from_env() -> Self {
        match std::env::var("SWARM_STATE_PATH") {
            Ok(path) => Self::from_path(Some(path.as_str())),
            Err(_) => StoreProvider::Memory,
        }
    }

    /// Pick a backend from an optional configured path.
    pub fn from_path(path: Option<&str>) -> Self {
        match path.map(str::trim) {
            Some(path) if !path.is_empty() && path != ":memory:" => StoreProvider::Libsql {
                path: path.to_string(),
            },
            _ => StoreProvider::Memory,
        }
    }

    /// Open the selected backend.
    pub async fn try_open(&self) -> Result<Arc<dyn StateStore>, StoreError> {
        match self {
            StoreProvider::Memory => Ok(Arc::new(InMemoryStore::new())),
            StoreProvider::Libsql { path } => Ok(Arc::new(LibsqlStore::open_local(path).await?)),
        }
    }

    /// Open the selected backend, falling back to memory if the durable
    /// backend cannot be opened.
    pub async fn open(&self) -> Arc<dyn StateStore> {
        match self.try_open().await {
            Ok(store) => {
                tracing::info!(backend = store.backend(), "State store ready");
                store
            }
            Err(e) => {
                tracing::warn!(
                    "Durable state store unavailable ({}), falling back to in-memory store",
                    e
                );
                Arc::new(InMemoryStore::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evidence_keys_round_trip() {
        assert_eq!(fields::evidence(3), "evidence:0003");
        assert_eq!(fields::evidence_index("evidence:0003"), Some(3));
        assert_eq!(fields::evidence_index("evidence:12345"), Some(12345));
        assert_eq!(fields::evidence_index("report"), None);
        assert_eq!(fields::evidence_index("evidence:abc"), None);
    }

    #[test]
    fn test_evidence_keys_sort_by_index() {
        let mut keys = vec![fields::evidence(10), fields::evidence(2), fields::evidence(0)];
        keys.sort();
        assert_eq!(keys, vec!["evidence:0000", "evidence:0002", "evidence:0010"]);
    }

    #[test]
    fn test_provider_from_path() {
        assert_eq!(StoreProvider::from_path(None), StoreProvider::Memory);
        assert_eq!(StoreProvider::from_path(Some("")), StoreProvider::Memory);
        assert_eq!(StoreProvider::from_path(Some(":memory:")), StoreProvider::Memory);
        assert_eq!(
            StoreProvider::from_path(Some("./data/swarm.db")),
            StoreProvider::Libsql {
                path: "./data/swarm.db".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_open_falls_back_to_memory() {
        // Parent "directory" is a regular file, so the database cannot be created.
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let provider = StoreProvider::Libsql {
            path: blocker.path().join("swarm.db").to_string_lossy().to_string(),
        };
        let store = provider.open().await;
        assert_eq!(store.backend(), "memory");
    }

    #[tokio::test]
    async fn test_batch_load_orders_and_checks_completeness() {
        let store = InMemoryStore::new();
        for index in [2usize, 0, 1] {
            let note = EvidenceNote {
                subtopic_index: index,
                summary: format!("note {}", index),
                citations: vec![],
                worker_id: "scout-alpha".into(),
                confidence: None,
            };
            store.put_json("s", &fields::evidence(index), &note).await.unwrap();
        }
        store.put_json("s", fields::QUESTION, "q").await.unwrap();

        let batch = ResearchBatch::load(&store, "s", 3).await.unwrap();
        let order: Vec<usize> = batch.notes().iter().map(|n| n.subtopic_index).collect();
        assert_eq!(order, vec![0, 1, 2]);

        assert!(matches!(
            ResearchBatch::load(&store, "s", 4).await,
            Err(PipelineError::IncompleteBatch(_))
        ));
    }
}
