//! Constraint checks over schema-validated records.
//!
//! Every check is a pure function of its inputs and returns a [`CheckReport`].
//! A report with violations means the check ran and the data is bad; an
//! `Err` means the check could not run at all.

mod config;
pub mod constrained;
pub mod relation;
pub mod unique;

pub use config::{
    CheckOptions, FieldConstraint, RelationMatching, RelationSpec, ReportMode, UniquenessSpec,
};

use crate::error::{DocGuardError, Result};
use crate::record::describe_value;
use serde::Serialize;
use serde_yaml::Value;
use std::fmt;

/// A detected breach of a uniqueness or referential constraint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Several records share `value` in a field flagged unique
    Uniqueness {
        field: String,
        value: Value,
        /// Positions of every record holding the value
        records: Vec<usize>,
    },
    /// A main record's field value is not among the allowed relation values
    Referential {
        collection: String,
        field: String,
        value: Value,
        record: usize,
    },
}

impl Violation {
    pub fn field(&self) -> &str {
        match self {
            Violation::Uniqueness { field, .. } | Violation::Referential { field, .. } => field,
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            Violation::Uniqueness { value, .. } | Violation::Referential { value, .. } => value,
        }
    }

    pub fn into_error(self) -> DocGuardError {
        match self {
            Violation::Uniqueness { field, value, .. } => DocGuardError::UniquenessViolation {
                field,
                value: describe_value(&value),
            },
            Violation::Referential {
                collection,
                field,
                value,
                ..
            } => DocGuardError::ReferentialViolation {
                collection,
                field,
                value: describe_value(&value),
            },
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Uniqueness {
                field,
                value,
                records,
            } => write!(
                f,
                "duplicate value {} in unique field '{field}' (records {records:?})",
                describe_value(value)
            ),
            Violation::Referential {
                collection,
                field,
                value,
                record,
            } => write!(
                f,
                "invalid relation in {collection}.{field}: {} (record {record})",
                describe_value(value)
            ),
        }
    }
}

/// Outcome of one check: how many records were looked at, and what was wrong
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckReport {
    pub examined: usize,
    pub violations: Vec<Violation>,
}

impl CheckReport {
    pub fn new(examined: usize) -> Self {
        CheckReport {
            examined,
            violations: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn first_violation(&self) -> Option<&Violation> {
        self.violations.first()
    }

    /// The examined count on success, the first violation as an error
    /// otherwise.
    pub fn into_result(self) -> Result<usize> {
        match self.violations.into_iter().next() {
            None => Ok(self.examined),
            Some(v) => Err(v.into_error()),
        }
    }
}
