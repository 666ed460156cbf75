use super::StateStore;
use crate::types::StoreError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// In-process state store.
///
/// Values are kept serialized, exactly as the durable backend keeps them, so
/// a value read back is always a fresh copy and both backends round-trip the
/// same documents.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<String, BTreeMap<String, String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with at least one field.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

fn decode(field: &str, payload: &str) -> Result<Value, StoreError> {
    serde_json::from_str(payload).map_err(|e| StoreError::Corrupt {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn put(&self, session: &str, field: &str, value: Value) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&value).map_err(|e| StoreError::Corrupt {
            field: field.to_string(),
            reason: e.to_string(),
        })?;
        self.sessions
            .write()
            .entry(session.to_string())
            .or_default()
            .insert(field.to_string(), payload);
        Ok(())
    }

    async fn get(&self, session: &str, field: &str) -> Result<Option<Value>, StoreError> {
        let sessions = self.sessions.read();
        match sessions.get(session).and_then(|fields| fields.get(field)) {
            Some(payload) => decode(field, payload).map(Some),
            None => Ok(None),
        }
    }

    async fn list(&self, session: &str) -> Result<BTreeMap<String, Value>, StoreError> {
        let sessions = self.sessions.read();
        let Some(fields) = sessions.get(session) else {
            return Ok(BTreeMap::new());
        };
        fields
            .iter()
            .map(|(field, payload)| Ok((field.clone(), decode(field, payload)?)))
            .collect()
    }

    async fn delete(&self, session: &str, field: &str) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write();
        let Some(fields) = sessions.get_mut(session) else {
            return Ok(false);
        };
        let existed = fields.remove(field).is_some();
        if fields.is_empty() {
            sessions.remove(session);
        }
        Ok(existed)
    }

    async fn clear(&self, session: &str) -> Result<usize, StoreError> {
        Ok(self
            .sessions
            .write()
            .remove(session)
            .map(|fields| fields.len())
            .unwrap_or(0))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
