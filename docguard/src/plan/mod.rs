// Check plans - a YAML file naming the collections, schemas and constraints to run

use crate::check::relation::check_relations;
use crate::check::unique::check_unique;
use crate::check::{CheckOptions, CheckReport, RelationMatching, RelationSpec, UniquenessSpec};
use crate::error::{DocGuardError, Result};
use crate::record::Record;
use crate::schema::CollectionSchema;
use crate::store::{ConnectionDetails, DocumentStore};
use crate::validation::SchemaValidator;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Default plan file name
pub const PLAN_FILE: &str = "docguard.yaml";

/// A declared set of integrity checks over one database
#[derive(Debug, Clone, Deserialize)]
pub struct CheckPlan {
    /// Store URL; `DOCGUARD_URL` is used when absent
    #[serde(default)]
    pub url: Option<String>,
    pub database: String,
    #[serde(default)]
    pub options: CheckOptions,
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionPlan>,
    #[serde(default)]
    pub relations: Vec<RelationPlan>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionPlan {
    /// Accept any mapping when absent
    #[serde(default)]
    pub schema: Option<CollectionSchema>,
    #[serde(default)]
    pub unique: UniquenessSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelationPlan {
    pub main: String,
    pub relation: String,
    pub fields: RelationSpec,
    /// Overrides the plan-wide matching for this relation
    #[serde(default)]
    pub matching: Option<RelationMatching>,
}

/// One named constraint and its outcome
#[derive(Debug, Clone, Serialize)]
pub struct NamedReport {
    pub name: String,
    #[serde(flatten)]
    pub report: CheckReport,
}

/// Outcome of running a whole plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub database: String,
    /// Document count per fetched collection
    pub collections: BTreeMap<String, usize>,
    pub checks: Vec<NamedReport>,
}

impl PlanReport {
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|c| c.report.is_ok())
    }

    pub fn violation_count(&self) -> usize {
        self.checks.iter().map(|c| c.report.violations.len()).sum()
    }
}

/// Load a plan file
pub fn load_plan(path: &Path) -> Result<CheckPlan> {
    let content = std::fs::read_to_string(path)?;
    parse_plan_str(&content)
}

/// Parse a plan from YAML and check that every relation names declared
/// collections.
pub fn parse_plan_str(content: &str) -> Result<CheckPlan> {
    let mut plan: CheckPlan = serde_yaml::from_str(content)?;

    for (name, collection) in plan.collections.iter_mut() {
        if let Some(schema) = collection.schema.as_mut() {
            schema.name = name.clone();
        }
    }

    plan.validate()?;
    Ok(plan)
}

impl CheckPlan {
    /// Every relation must name declared collections and map at least one
    /// field.
    pub fn validate(&self) -> Result<()> {
        for relation in &self.relations {
            for name in [&relation.main, &relation.relation] {
                if !self.collections.contains_key(name) {
                    return Err(DocGuardError::Config(format!(
                        "Relation {} -> {} names undeclared collection '{name}'",
                        relation.main, relation.relation
                    )));
                }
            }
            if relation.fields.is_empty() {
                return Err(DocGuardError::Config(format!(
                    "Relation {} -> {} maps no fields",
                    relation.main, relation.relation
                )));
            }
        }
        Ok(())
    }

    /// Pick the store URL: an explicit override, then the plan's `url`, then
    /// the environment.
    pub fn connection_details(&self, url_override: Option<&str>) -> Result<ConnectionDetails> {
        match url_override.or(self.url.as_deref()) {
            Some(url) => Ok(ConnectionDetails::new(url)),
            None => ConnectionDetails::from_env(),
        }
    }

    fn schema_for(&self, name: &str) -> CollectionSchema {
        self.collections
            .get(name)
            .and_then(|c| c.schema.clone())
            .unwrap_or_else(|| CollectionSchema::permissive(name))
    }

    /// Fetch every declared collection once, validate it, and run every
    /// uniqueness and relation constraint.
    ///
    /// A store or schema failure aborts the run with an error; constraint
    /// violations are collected into the returned report.
    pub fn run(&self, store: &dyn DocumentStore) -> Result<PlanReport> {
        self.validate()?;
        let names: BTreeSet<&str> = self.collections.keys().map(String::as_str).collect();

        let fetched: Vec<(&str, Result<Vec<Value>>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = names
                .iter()
                .map(|name| (*name, scope.spawn(move || store.fetch_all(&self.database, name))))
                .collect();
            handles
                .into_iter()
                .map(|(name, handle)| {
                    let result = handle
                        .join()
                        .unwrap_or_else(|_| Err(DocGuardError::Other("Collection fetch panicked".into())));
                    (name, result)
                })
                .collect()
        });

        let mut records: BTreeMap<&str, Vec<Record>> = BTreeMap::new();
        for (name, raw) in fetched {
            let schema = self.schema_for(name);
            records.insert(name, schema.validate_array(&raw?)?);
        }

        let mut checks = Vec::new();

        for (name, collection) in &self.collections {
            if collection.unique.is_empty() {
                continue;
            }
            let report = check_unique(&records[name.as_str()], &collection.unique, self.options.mode);
            checks.push(NamedReport {
                name: format!("unique {name}"),
                report,
            });
        }

        for relation in &self.relations {
            let mut options = self.options;
            if let Some(matching) = relation.matching {
                options.matching = matching;
            }
            let report = check_relations(
                &relation.main,
                &records[relation.main.as_str()],
                &records[relation.relation.as_str()],
                &relation.fields,
                options,
            );
            checks.push(NamedReport {
                name: format!("relation {} -> {}", relation.main, relation.relation),
                report,
            });
        }

        let report = PlanReport {
            database: self.database.clone(),
            collections: records
                .iter()
                .map(|(name, recs)| (name.to_string(), recs.len()))
                .collect(),
            checks,
        };

        log::info!(
            "Ran {} checks on {}: {} violations",
            report.checks.len(),
            report.database,
            report.violation_count()
        );
        Ok(report)
    }
}
