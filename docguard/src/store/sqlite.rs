use super::DocumentStore;
use crate::error::{DocGuardError, Result};
use rusqlite::{params, Connection, OpenFlags};
use serde_yaml::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Documents stored as JSON rows in a single SQLite table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the document database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        store.initialize_tables()?;
        Ok(store)
    }

    /// Open a document database that must already exist. A missing file is
    /// a connection error rather than a new, empty store.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DocGuardError::Connection(format!(
                "SQLite database not found: {}",
                path.display()
            )));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        store.initialize_tables()?;
        Ok(store)
    }

    /// Open an in-memory document database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore {
            conn: Mutex::new(conn),
        };
        store.initialize_tables()?;
        Ok(store)
    }

    fn initialize_tables(&self) -> Result<()> {
        self.lock()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                database TEXT NOT NULL,
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data_json TEXT NOT NULL,
                PRIMARY KEY (database, collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(database, collection);
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DocGuardError::Other("SQLite connection lock poisoned".into()))
    }

    /// Upsert a document. The id is taken from its `_id` field when that is a
    /// string or number, otherwise a new ULID is assigned. Returns the id.
    pub fn insert(&self, database: &str, collection: &str, data: &Value) -> Result<String> {
        let id = document_id(data).unwrap_or_else(|| ulid::Ulid::new().to_string());
        let data_json = serde_json::to_string(data)?;
        self.lock()?.execute(
            "INSERT OR REPLACE INTO documents (database, collection, id, data_json) VALUES (?1, ?2, ?3, ?4)",
            params![database, collection, id, data_json],
        )?;
        Ok(id)
    }

    /// Insert several documents in one transaction. All or nothing.
    pub fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: &[Value],
    ) -> Result<Vec<String>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(documents.len());
        for data in documents {
            let id = document_id(data).unwrap_or_else(|| ulid::Ulid::new().to_string());
            let data_json = serde_json::to_string(data)?;
            tx.execute(
                "INSERT OR REPLACE INTO documents (database, collection, id, data_json) VALUES (?1, ?2, ?3, ?4)",
                params![database, collection, id, data_json],
            )?;
            ids.push(id);
        }
        tx.commit()?;
        Ok(ids)
    }

    /// Delete all documents in a collection.
    pub fn clear_collection(&self, database: &str, collection: &str) -> Result<()> {
        self.lock()?.execute(
            "DELETE FROM documents WHERE database = ?1 AND collection = ?2",
            params![database, collection],
        )?;
        Ok(())
    }
}

impl DocumentStore for SqliteStore {
    /// A collection with no rows reads as empty.
    fn fetch_all(&self, database: &str, collection: &str) -> Result<Vec<Value>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT data_json FROM documents WHERE database = ?1 AND collection = ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![database, collection], |row| row.get::<_, String>(0))?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(serde_json::from_str(&row?)?);
        }
        Ok(docs)
    }

    fn collections(&self, database: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT collection FROM documents WHERE database = ?1 ORDER BY collection",
        )?;
        let rows = stmt.query_map(params![database], |row| row.get::<_, String>(0))?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }
}

fn document_id(data: &Value) -> Option<String> {
    match data.get("_id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
