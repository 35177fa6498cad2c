use super::{CheckOptions, CheckReport, RelationMatching, RelationSpec, ReportMode, Violation};
use crate::error::{DocGuardError, Result};
use crate::record::Record;
use crate::store::{connect, ConnectionDetails, DocumentStore};
use crate::validation::SchemaValidator;
use serde_yaml::Value;
use std::collections::{HashMap, HashSet};

/// Check that every mapped field of every main record takes a value present
/// in the relation records.
///
/// With [`RelationMatching::Union`] a main value is accepted when it equals
/// any value of any mapped relation field; with `PerField` only values of its
/// own paired field count. Comparison is strict deep equality and absent
/// fields read as `null`.
pub fn check_relations(
    main_collection: &str,
    main: &[Record],
    relation: &[Record],
    spec: &RelationSpec,
    options: CheckOptions,
) -> CheckReport {
    let allowed = AllowedValues::build(relation, spec, options.matching);
    let mut report = CheckReport::new(main.len());

    'records: for (index, record) in main.iter().enumerate() {
        for (main_field, relation_field) in spec.pairs() {
            let value = record.value_of(main_field);
            if !allowed.contains(relation_field, value) {
                report.violations.push(Violation::Referential {
                    collection: main_collection.to_string(),
                    field: main_field.to_string(),
                    value: value.clone(),
                    record: index,
                });
                if options.mode == ReportMode::FirstViolation {
                    report.examined = index + 1;
                    break 'records;
                }
            }
        }
    }

    log::debug!(
        "Checked {} {main_collection} records against {} relation records: {} violations",
        report.examined,
        relation.len(),
        report.violations.len()
    );
    report
}

/// The precomputed set of values main fields may take
enum AllowedValues<'a> {
    Union(HashSet<&'a Value>),
    PerField(HashMap<&'a str, HashSet<&'a Value>>),
}

impl<'a> AllowedValues<'a> {
    fn build(relation: &'a [Record], spec: &'a RelationSpec, matching: RelationMatching) -> Self {
        match matching {
            RelationMatching::Union => {
                let mut values = HashSet::new();
                for field in spec.relation_fields() {
                    values.extend(relation.iter().map(|r| r.value_of(field)));
                }
                AllowedValues::Union(values)
            }
            RelationMatching::PerField => {
                let sets = spec
                    .relation_fields()
                    .into_iter()
                    .map(|field| {
                        let values = relation.iter().map(|r| r.value_of(field));
                        (field, values.collect::<HashSet<_>>())
                    })
                    .collect();
                AllowedValues::PerField(sets)
            }
        }
    }

    fn contains(&self, relation_field: &str, value: &Value) -> bool {
        match self {
            AllowedValues::Union(values) => values.contains(value),
            AllowedValues::PerField(sets) => sets
                .get(relation_field)
                .map(|values| values.contains(value))
                .unwrap_or(false),
        }
    }
}

/// Where the relation check gets its documents from
pub enum StoreSource<'a> {
    /// An already-open store, owned by the caller
    Connected(&'a dyn DocumentStore),
    /// Open a store for the duration of the check
    Details(ConnectionDetails),
}

/// Everything needed to fetch, validate and cross-check two collections.
pub struct RelationConfig<'a> {
    pub database: String,
    pub main_collection: String,
    pub main_schema: &'a dyn SchemaValidator,
    pub relation_collection: String,
    pub relation_schema: &'a dyn SchemaValidator,
    pub relations: RelationSpec,
    pub source: StoreSource<'a>,
    pub options: CheckOptions,
}

impl<'a> RelationConfig<'a> {
    /// Fetch both collections, validate them against their schemas and run
    /// [`check_relations`].
    ///
    /// Fails when the store can't be reached, a collection can't be read or a
    /// document doesn't match its schema. Constraint violations are reported
    /// in the returned [`CheckReport`].
    pub fn check(&self) -> Result<CheckReport> {
        let opened;
        let store: &dyn DocumentStore = match &self.source {
            StoreSource::Connected(store) => *store,
            StoreSource::Details(details) => {
                opened = connect(details)?;
                opened.as_ref()
            }
        };

        let (main, relation) = self.acquire(store)?;
        Ok(check_relations(
            &self.main_collection,
            &main,
            &relation,
            &self.relations,
            self.options,
        ))
    }

    /// Fetch both collections concurrently and validate them.
    fn acquire(&self, store: &dyn DocumentStore) -> Result<(Vec<Record>, Vec<Record>)> {
        let (main_raw, relation_raw) = std::thread::scope(|scope| {
            let main = scope.spawn(|| store.fetch_all(&self.database, &self.main_collection));
            let relation =
                scope.spawn(|| store.fetch_all(&self.database, &self.relation_collection));
            (join_fetch(main), join_fetch(relation))
        });
        let (main_raw, relation_raw) = (main_raw?, relation_raw?);

        log::debug!(
            "Fetched {} {} and {} {} documents from {}",
            main_raw.len(),
            self.main_collection,
            relation_raw.len(),
            self.relation_collection,
            self.database
        );

        let relation = self.relation_schema.validate_array(&relation_raw)?;
        let main = self.main_schema.validate_array(&main_raw)?;
        Ok((main, relation))
    }
}

fn join_fetch(handle: std::thread::ScopedJoinHandle<'_, Result<Vec<Value>>>) -> Result<Vec<Value>> {
    handle
        .join()
        .map_err(|_| DocGuardError::Other("Collection fetch panicked".into()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{parse_schema_str, SchemaDefinition};
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn records(yaml: &str) -> Vec<Record> {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn raw(yaml: &str) -> Vec<Value> {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn collection_spec() -> RelationSpec {
        RelationSpec::new().map("collection", "collectionslug")
    }

    #[test]
    fn test_matching_relation_passes() {
        let main = records("[{slug: a, collection: c1}]");
        let relation = records("[{collectionslug: c1}]");
        let report = check_relations(
            "music",
            &main,
            &relation,
            &collection_spec(),
            CheckOptions::default(),
        );
        assert!(report.is_ok());
        assert_eq!(report.examined, 1);
        assert_eq!(report.into_result().unwrap(), 1);
    }

    #[test]
    fn test_missing_relation_fails() {
        let main = records("[{slug: a, collection: c2}]");
        let relation = records("[{collectionslug: c1}]");
        let report = check_relations(
            "music",
            &main,
            &relation,
            &collection_spec(),
            CheckOptions::default(),
        );
        assert_eq!(
            report.violations,
            vec![Violation::Referential {
                collection: "music".into(),
                field: "collection".into(),
                value: Value::String("c2".into()),
                record: 0,
            }]
        );
    }

    #[test]
    fn test_empty_relation_collection_fails() {
        let main = records("[{collection: c1}]");
        let report = check_relations("music", &main, &[], &collection_spec(), CheckOptions::default());
        assert!(!report.is_ok());
    }

    #[test]
    fn test_empty_main_collection_passes() {
        let relation = records("[{collectionslug: c1}]");
        let report = check_relations(
            "music",
            &[],
            &relation,
            &collection_spec(),
            CheckOptions::default(),
        );
        assert!(report.is_ok());
        assert_eq!(report.examined, 0);
    }

    #[test]
    fn test_collects_all_or_stops_at_first() {
        let main = records("[{collection: x}, {collection: c1}, {collection: y}]");
        let relation = records("[{collectionslug: c1}]");

        let all = check_relations("music", &main, &relation, &collection_spec(), CheckOptions::default());
        assert_eq!(all.violations.len(), 2);
        assert_eq!(all.examined, 3);

        let first = check_relations(
            "music",
            &main,
            &relation,
            &collection_spec(),
            CheckOptions::default().first_violation(),
        );
        assert_eq!(first.violations.len(), 1);
        assert_eq!(first.examined, 1);
    }

    #[test]
    fn test_union_versus_per_field_matching() {
        // "artist" holds a value that only exists in the collectionslug column
        let spec = RelationSpec::new()
            .map("collection", "collectionslug")
            .map("artist", "curator");
        let main = records("[{collection: c1, artist: c1}]");
        let relation = records("[{collectionslug: c1, curator: mikayla}]");

        let union = check_relations("music", &main, &relation, &spec, CheckOptions::default());
        assert!(union.is_ok());

        let strict = check_relations(
            "music",
            &main,
            &relation,
            &spec,
            CheckOptions::default().per_field(),
        );
        assert_eq!(strict.violations.len(), 1);
        assert_eq!(strict.violations[0].field(), "artist");
    }

    #[test]
    fn test_type_strict_matching() {
        let spec = RelationSpec::new().map("album", "number");
        let main = records(r#"[{album: "1"}]"#);
        let relation = records("[{number: 1}]");
        let report = check_relations("music", &main, &relation, &spec, CheckOptions::default());
        assert!(!report.is_ok());
    }

    fn schemas() -> SchemaDefinition {
        parse_schema_str(
            r#"
collections:
  music:
    fields:
      slug: { type: string, required: true }
      collection: { type: string, required: true }
  music-collection:
    fields:
      collectionslug: { type: string, required: true }
"#,
        )
        .unwrap()
    }

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_collection(
                "site",
                "music",
                raw("[{slug: a, collection: c1}, {slug: b, collection: c2}]"),
            )
            .with_collection(
                "site",
                "music-collection",
                raw("[{collectionslug: c1}, {collectionslug: c2}]"),
            )
    }

    fn config<'a>(
        schemas: &'a SchemaDefinition,
        source: StoreSource<'a>,
    ) -> RelationConfig<'a> {
        RelationConfig {
            database: "site".into(),
            main_collection: "music".into(),
            main_schema: schemas.collection("music").unwrap(),
            relation_collection: "music-collection".into(),
            relation_schema: schemas.collection("music-collection").unwrap(),
            relations: RelationSpec::new().map("collection", "collectionslug"),
            source,
            options: CheckOptions::default(),
        }
    }

    #[test]
    fn test_check_with_connected_store() {
        let schemas = schemas();
        let store = store();
        let report = config(&schemas, StoreSource::Connected(&store)).check().unwrap();
        assert!(report.is_ok());
        assert_eq!(report.examined, 2);
    }

    #[test]
    fn test_check_surfaces_schema_violation() {
        let schemas = schemas();
        let store = store().with_collection("site", "music", raw("[{slug: a}]"));
        let err = config(&schemas, StoreSource::Connected(&store))
            .check()
            .unwrap_err();
        match err {
            DocGuardError::SchemaViolation { location, .. } => assert_eq!(location, "music[0]"),
            other => panic!("expected schema violation, got {other:?}"),
        }
    }

    #[test]
    fn test_check_surfaces_missing_collection() {
        let schemas = schemas();
        let store = MemoryStore::new().with_collection("site", "music", vec![]);
        let err = config(&schemas, StoreSource::Connected(&store))
            .check()
            .unwrap_err();
        assert!(matches!(err, DocGuardError::CollectionNotFound { .. }));
    }

    #[test]
    fn test_check_surfaces_connection_failure() {
        let schemas = schemas();
        let source = StoreSource::Details(ConnectionDetails::new("nowhere://"));
        let err = config(&schemas, source).check().unwrap_err();
        assert!(matches!(err, DocGuardError::Connection(_)));
    }

    #[test]
    fn test_check_opens_store_from_details() {
        let tmp = tempfile::TempDir::new().unwrap();
        let music = tmp.path().join("site/music");
        let colls = tmp.path().join("site/music-collection");
        std::fs::create_dir_all(&music).unwrap();
        std::fs::create_dir_all(&colls).unwrap();
        std::fs::write(music.join("a.yaml"), "slug: a\ncollection: missing\n").unwrap();
        std::fs::write(colls.join("c1.yaml"), "collectionslug: c1\n").unwrap();

        let schemas = schemas();
        let details = ConnectionDetails::new(format!("dir://{}", tmp.path().display()));
        let report = config(&schemas, StoreSource::Details(details)).check().unwrap();
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].value(), &Value::String("missing".into()));
    }
}
