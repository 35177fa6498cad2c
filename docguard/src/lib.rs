pub mod check;
pub mod error;
pub mod plan;
pub mod record;
pub mod schema;
pub mod store;
pub mod validation;

pub use check::constrained::Constrained;
pub use check::relation::{check_relations, RelationConfig, StoreSource};
pub use check::unique::{check_unique, UniqueValidator};
pub use check::{
    CheckOptions, CheckReport, RelationMatching, RelationSpec, ReportMode, UniquenessSpec,
    Violation,
};
pub use error::{DocGuardError, Result};
pub use plan::{load_plan, parse_plan_str, CheckPlan, PlanReport};
pub use record::Record;
pub use schema::{CollectionSchema, SchemaDefinition};
pub use store::{connect, ConnectionDetails, DocumentStore};
pub use validation::SchemaValidator;
