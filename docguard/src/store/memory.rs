use super::DocumentStore;
use crate::error::{DocGuardError, Result};
use serde_yaml::Value;
use std::collections::BTreeMap;

/// Collections held in process. Useful for tests and for callers that already
/// have their documents in hand.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    databases: BTreeMap<String, BTreeMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a collection.
    pub fn with_collection(
        mut self,
        database: impl Into<String>,
        collection: impl Into<String>,
        documents: Vec<Value>,
    ) -> Self {
        self.insert_collection(database, collection, documents);
        self
    }

    pub fn insert_collection(
        &mut self,
        database: impl Into<String>,
        collection: impl Into<String>,
        documents: Vec<Value>,
    ) {
        self.databases
            .entry(database.into())
            .or_default()
            .insert(collection.into(), documents);
    }
}

impl DocumentStore for MemoryStore {
    fn fetch_all(&self, database: &str, collection: &str) -> Result<Vec<Value>> {
        self.databases
            .get(database)
            .and_then(|db| db.get(collection))
            .cloned()
            .ok_or_else(|| DocGuardError::CollectionNotFound {
                database: database.into(),
                collection: collection.into(),
            })
    }

    fn collections(&self, database: &str) -> Result<Vec<String>> {
        Ok(self
            .databases
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default())
    }
}
