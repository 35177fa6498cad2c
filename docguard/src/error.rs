use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocGuardError {
    /// `location` is the collection name, with `[index]` when the document
    /// came from an array
    #[error("Schema violation in {location}: {}", .errors.join("; "))]
    SchemaViolation { location: String, errors: Vec<String> },

    #[error("Connection failure: {0}")]
    Connection(String),

    #[error("Duplicate value in unique field '{field}': {value}")]
    UniquenessViolation { field: String, value: String },

    #[error("Encountered invalid relation in {collection}.{field}: {value}")]
    ReferentialViolation {
        collection: String,
        field: String,
        value: String,
    },

    #[error("Collection not found: {database}/{collection}")]
    CollectionNotFound { database: String, collection: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("{0}")]
    Other(String),
}

impl DocGuardError {
    /// True when the error reports a violated constraint rather than a check
    /// that could not run.
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            DocGuardError::UniquenessViolation { .. } | DocGuardError::ReferentialViolation { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DocGuardError>;
