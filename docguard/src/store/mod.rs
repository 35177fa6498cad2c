// Store access - where raw documents come from

mod directory;
mod memory;
mod sqlite;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::{DocGuardError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::PathBuf;

/// Environment variable holding the store URL
pub const URL_ENV: &str = "DOCGUARD_URL";

/// Read access to raw, unvalidated documents, scoped by database name.
///
/// Implementations must be safe for concurrent reads: the relation checker
/// fetches both of its collections at once.
pub trait DocumentStore: Send + Sync {
    /// Every document in `database/collection`, in a stable order.
    fn fetch_all(&self, database: &str, collection: &str) -> Result<Vec<Value>>;

    /// Names of the collections in `database`, sorted.
    fn collections(&self, database: &str) -> Result<Vec<String>>;
}

/// How to reach a store. The URL scheme picks the backend:
///
/// - `dir://<path>`: a directory of document files ([`DirectoryStore`])
/// - `sqlite://<path>`: an existing SQLite document table ([`SqliteStore`])
/// - `sqlite::memory:`: a fresh in-memory SQLite store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDetails {
    pub url: String,
}

impl ConnectionDetails {
    pub fn new(url: impl Into<String>) -> Self {
        ConnectionDetails { url: url.into() }
    }

    /// Read the URL from `DOCGUARD_URL`.
    pub fn from_env() -> Result<Self> {
        match std::env::var(URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Ok(ConnectionDetails::new(url)),
            _ => Err(DocGuardError::Config(format!(
                "Missing environment variable {URL_ENV}"
            ))),
        }
    }
}

/// Open the store named by `details`.
pub fn connect(details: &ConnectionDetails) -> Result<Box<dyn DocumentStore>> {
    let url = details.url.trim();
    log::debug!("Connecting to {url}");

    if url == "sqlite::memory:" {
        return Ok(Box::new(SqliteStore::open_in_memory().map_err(into_connection)?));
    }
    if let Some(path) = url.strip_prefix("sqlite://") {
        let store = SqliteStore::open_existing(&PathBuf::from(path)).map_err(into_connection)?;
        return Ok(Box::new(store));
    }
    if let Some(path) = url.strip_prefix("dir://") {
        return Ok(Box::new(DirectoryStore::open(path)?));
    }

    Err(DocGuardError::Connection(format!(
        "Unsupported store URL '{url}' (expected dir://, sqlite:// or sqlite::memory:)"
    )))
}

fn into_connection(e: DocGuardError) -> DocGuardError {
    match e {
        DocGuardError::Connection(_) => e,
        other => DocGuardError::Connection(other.to_string()),
    }
}
