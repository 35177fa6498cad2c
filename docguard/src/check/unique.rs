use super::{CheckReport, ReportMode, UniquenessSpec, Violation};
use crate::error::Result;
use crate::record::Record;
use crate::validation::SchemaValidator;
use serde_yaml::Value;
use std::collections::HashMap;

/// Check that every field flagged in `spec` holds pairwise-distinct values.
///
/// Values compare by strict deep equality; a field missing from a record
/// counts as `null`. One violation is reported per colliding value, in the
/// order the value first appears.
pub fn check_unique(records: &[Record], spec: &UniquenessSpec, mode: ReportMode) -> CheckReport {
    let mut report = CheckReport::new(records.len());

    for field in spec.unique_fields() {
        let mut positions: HashMap<&Value, Vec<usize>> = HashMap::with_capacity(records.len());
        let mut order: Vec<&Value> = Vec::new();

        for (index, record) in records.iter().enumerate() {
            let value = record.value_of(field);
            let seen = positions.entry(value).or_default();
            if seen.is_empty() {
                order.push(value);
            }
            seen.push(index);
        }

        for value in order {
            let holders = &positions[value];
            if holders.len() > 1 {
                report.violations.push(Violation::Uniqueness {
                    field: field.to_string(),
                    value: value.clone(),
                    records: holders.clone(),
                });
                if mode == ReportMode::FirstViolation {
                    return report;
                }
            }
        }

        log::debug!(
            "Checked uniqueness of '{field}' across {} records ({} distinct)",
            records.len(),
            positions.len()
        );
    }

    report
}

/// A schema bound to a uniqueness spec: parsing a collection validates every
/// document and then rejects duplicates in the flagged fields.
#[derive(Debug, Clone)]
pub struct UniqueValidator<V> {
    schema: V,
    spec: UniquenessSpec,
}

impl<V: SchemaValidator> UniqueValidator<V> {
    pub fn new(schema: V, spec: UniquenessSpec) -> Self {
        UniqueValidator { schema, spec }
    }

    /// Flag each of `fields` unique.
    pub fn from_fields<I, S>(schema: V, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(schema, UniquenessSpec::from_fields(fields))
    }

    pub fn schema(&self) -> &V {
        &self.schema
    }

    pub fn spec(&self) -> &UniquenessSpec {
        &self.spec
    }

    /// Validate and check. Fails with `SchemaViolation` or with
    /// `UniquenessViolation` for the first duplicate found.
    pub fn parse(&self, raw: &[Value]) -> Result<Vec<Record>> {
        let records = self.schema.validate_array(raw)?;
        check_unique(&records, &self.spec, ReportMode::FirstViolation).into_result()?;
        Ok(records)
    }

    /// Validate, then report every duplicate rather than failing on the first.
    pub fn report(&self, raw: &[Value]) -> Result<CheckReport> {
        let records = self.schema.validate_array(raw)?;
        Ok(check_unique(&records, &self.spec, ReportMode::AllViolations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocGuardError;
    use crate::schema::parse_collection_schema_str;
    use pretty_assertions::assert_eq;

    fn records(yaml: &str) -> Vec<Record> {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn slug_spec() -> UniquenessSpec {
        UniquenessSpec::new().field("slug", true)
    }

    #[test]
    fn test_distinct_values_pass() {
        let recs = records("[{slug: a}, {slug: b}, {slug: c}]");
        let report = check_unique(&recs, &slug_spec(), ReportMode::AllViolations);
        assert!(report.is_ok());
        assert_eq!(report.examined, 3);
    }

    #[test]
    fn test_duplicate_slug_fails() {
        let recs = records("[{slug: a}, {slug: a}]");
        let report = check_unique(&recs, &slug_spec(), ReportMode::AllViolations);
        assert_eq!(
            report.violations,
            vec![Violation::Uniqueness {
                field: "slug".into(),
                value: Value::String("a".into()),
                records: vec![0, 1],
            }]
        );
    }

    #[test]
    fn test_empty_sequence_passes() {
        let report = check_unique(&[], &slug_spec(), ReportMode::AllViolations);
        assert!(report.is_ok());
        assert_eq!(report.examined, 0);
    }

    #[test]
    fn test_every_flagged_field_is_checked() {
        // the duplicate is in the second flagged field
        let spec = UniquenessSpec::from_fields(["slug", "name"]);
        let recs = records("[{slug: a, name: x}, {slug: b, name: x}]");
        let report = check_unique(&recs, &spec, ReportMode::AllViolations);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].field(), "name");
    }

    #[test]
    fn test_repeated_field_reports_once() {
        let spec = UniquenessSpec::from_fields(["slug", "slug"]);
        let recs = records("[{slug: a}, {slug: a}]");
        let report = check_unique(&recs, &spec, ReportMode::AllViolations);
        assert_eq!(report.violations.len(), 1);
    }

    #[test]
    fn test_unflagged_fields_ignored() {
        let spec = UniquenessSpec::new().field("name", false).field("slug", true);
        let recs = records("[{slug: a, name: x}, {slug: b, name: x}]");
        assert!(check_unique(&recs, &spec, ReportMode::AllViolations).is_ok());
    }

    #[test]
    fn test_all_violations_collected() {
        let spec = UniquenessSpec::from_fields(["slug", "name"]);
        let recs = records(
            "[{slug: a, name: x}, {slug: a, name: y}, {slug: b, name: y}, {slug: b, name: z}]",
        );
        let report = check_unique(&recs, &spec, ReportMode::AllViolations);
        let found: Vec<(&str, &Value)> = report
            .violations
            .iter()
            .map(|v| (v.field(), v.value()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("slug", &Value::String("a".into())),
                ("slug", &Value::String("b".into())),
                ("name", &Value::String("y".into())),
            ]
        );

        let first = check_unique(&recs, &spec, ReportMode::FirstViolation);
        assert_eq!(first.violations.len(), 1);
        assert_eq!(first.violations[0].value(), &Value::String("a".into()));
    }

    #[test]
    fn test_deep_and_strict_equality() {
        let spec = UniquenessSpec::from_fields(["key"]);

        let composite = records("[{key: {a: 1, b: [1, 2]}}, {key: {a: 1, b: [1, 2]}}]");
        assert!(!check_unique(&composite, &spec, ReportMode::AllViolations).is_ok());

        let mixed = records(r#"[{key: 1}, {key: "1"}, {key: A}, {key: a}]"#);
        assert!(check_unique(&mixed, &spec, ReportMode::AllViolations).is_ok());
    }

    #[test]
    fn test_missing_fields_collide_as_null() {
        let recs = records("[{slug: a}, {other: 1}, {other: 2}]");
        let report = check_unique(&recs, &slug_spec(), ReportMode::AllViolations);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].value(), &Value::Null);
    }

    #[test]
    fn test_unique_validator_parse() {
        let schema = parse_collection_schema_str(
            "music",
            "fields:\n  slug: { type: string, required: true }",
        )
        .unwrap();
        let validator = UniqueValidator::from_fields(schema, ["slug"]);

        let ok: Vec<Value> = serde_yaml::from_str("[{slug: a}, {slug: b}]").unwrap();
        assert_eq!(validator.parse(&ok).unwrap().len(), 2);

        let dup: Vec<Value> = serde_yaml::from_str("[{slug: a}, {slug: a}]").unwrap();
        match validator.parse(&dup) {
            Err(DocGuardError::UniquenessViolation { field, value }) => {
                assert_eq!(field, "slug");
                assert_eq!(value, "a");
            }
            other => panic!("expected uniqueness violation, got {other:?}"),
        }

        let bad: Vec<Value> = serde_yaml::from_str("[{slug: a}, {name: b}]").unwrap();
        assert!(matches!(
            validator.parse(&bad),
            Err(DocGuardError::SchemaViolation { .. })
        ));
        assert!(validator.report(&dup).unwrap().violations.len() == 1);
    }
}
