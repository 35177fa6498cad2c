use crate::error::{DocGuardError, Result};
use crate::record::Record;
use crate::schema::{CollectionSchema, FieldDefinition, FieldType};
use serde_yaml::Value;

/// The capability the checkers need from a schema: turn a raw document into a
/// validated [`Record`], or say why it can't.
pub trait SchemaValidator: Send + Sync {
    /// Name used in violation locations, usually the collection name
    fn name(&self) -> &str;

    /// Validate one raw document. Fails with `SchemaViolation`.
    fn validate(&self, raw: &Value) -> Result<Record>;

    /// Validate a whole collection, failing on the first bad element.
    fn validate_array(&self, raw: &[Value]) -> Result<Vec<Record>> {
        raw.iter()
            .enumerate()
            .map(|(index, value)| {
                self.validate(value).map_err(|e| match e {
                    DocGuardError::SchemaViolation { errors, .. } => {
                        DocGuardError::SchemaViolation {
                            location: format!("{}[{index}]", self.name()),
                            errors,
                        }
                    }
                    other => other,
                })
            })
            .collect()
    }

    /// Whether a raw document conforms. Never fails.
    fn conforms(&self, raw: &Value) -> bool {
        self.validate(raw).is_ok()
    }
}

impl<V: SchemaValidator + ?Sized> SchemaValidator for &V {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn validate(&self, raw: &Value) -> Result<Record> {
        (**self).validate(raw)
    }
}

impl<V: SchemaValidator + ?Sized> SchemaValidator for std::sync::Arc<V> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn validate(&self, raw: &Value) -> Result<Record> {
        (**self).validate(raw)
    }
}

/// Result of validating a document
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

impl SchemaValidator for CollectionSchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, raw: &Value) -> Result<Record> {
        let mut data = raw.clone();
        apply_defaults(self, &mut data);
        let result = validate_document(self, &data);

        if !result.is_ok() {
            return Err(DocGuardError::SchemaViolation {
                location: self.name.clone(),
                errors: result.errors,
            });
        }
        for warning in &result.warnings {
            log::warn!("{}: {}", self.name, warning);
        }

        Record::try_from(data).map_err(|_| DocGuardError::SchemaViolation {
            location: self.name.clone(),
            errors: vec!["Document data must be a YAML mapping".into()],
        })
    }
}

/// Validate a document's data against its collection schema.
/// If strict mode is off, issues are reported as warnings only.
pub fn validate_document(collection: &CollectionSchema, data: &Value) -> ValidationResult {
    let mut result = ValidationResult::default();

    let mapping = match data.as_mapping() {
        Some(m) => m,
        None => {
            result
                .errors
                .push("Document data must be a YAML mapping".into());
            return result;
        }
    };

    for (field_name, field_def) in &collection.fields {
        let value = mapping.get(field_name.as_str());

        // `any` fields accept an explicit null
        let missing = match value {
            None => true,
            Some(Value::Null) => field_def.field_type != FieldType::Any,
            Some(_) => false,
        };
        if field_def.required && missing {
            add_issue(
                &mut result,
                collection.strict,
                format!("Required field '{field_name}' is missing"),
            );
            continue;
        }

        if let Some(val) = value {
            if *val != Value::Null {
                validate_field_value(field_name, field_def, val, collection.strict, &mut result);
            }
        }
    }

    if !collection.additional_properties {
        for key in mapping.keys() {
            if let Value::String(key_str) = key {
                if !collection.fields.contains_key(key_str) {
                    add_issue(
                        &mut result,
                        collection.strict,
                        format!("Unexpected field '{key_str}' (additional_properties is false)"),
                    );
                }
            }
        }
    }

    result
}

/// Apply default values to missing or null fields, in place.
pub fn apply_defaults(collection: &CollectionSchema, data: &mut Value) {
    let mapping = match data.as_mapping_mut() {
        Some(m) => m,
        None => return,
    };

    for (field_name, field_def) in &collection.fields {
        let key = Value::String(field_name.clone());
        let has_value = mapping
            .get(&key)
            .map(|v| *v != Value::Null)
            .unwrap_or(false);

        if !has_value {
            if let Some(default) = &field_def.default {
                mapping.insert(key, default.clone());
            }
        }
    }
}

fn validate_field_value(
    field_name: &str,
    field_def: &FieldDefinition,
    value: &Value,
    strict: bool,
    result: &mut ValidationResult,
) {
    if let Some(message) = type_mismatch(field_def.field_type, value) {
        add_issue(result, strict, format!("Field '{field_name}' {message}"));
        return;
    }

    if let Some(s) = value.as_str() {
        if let Some(enum_values) = &field_def.enum_values {
            if !enum_values.iter().any(|v| v == s) {
                add_issue(
                    result,
                    strict,
                    format!("Field '{field_name}' value '{s}' is not in enum: {enum_values:?}"),
                );
            }
        }
        if let Some(pattern) = &field_def.pattern {
            if !pattern.is_match(s) {
                add_issue(
                    result,
                    strict,
                    format!(
                        "Field '{field_name}' value '{s}' does not match pattern '{}'",
                        pattern.as_str()
                    ),
                );
            }
        }
    }

    if let (Some(item_type), Some(items)) = (field_def.items, value.as_sequence()) {
        for (i, item) in items.iter().enumerate() {
            if let Some(message) = type_mismatch(item_type, item) {
                add_issue(result, strict, format!("Field '{field_name}[{i}]' {message}"));
            }
        }
    }
}

/// Describe why `value` is not of `field_type`, or `None` when it is.
fn type_mismatch(field_type: FieldType, value: &Value) -> Option<String> {
    let ok = match field_type {
        FieldType::Any => true,
        FieldType::String => value.is_string(),
        FieldType::Number => value.is_number(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Boolean => value.is_bool(),
        FieldType::List => value.is_sequence(),
        FieldType::Object => value.is_mapping(),
        FieldType::Date => {
            return match value.as_str() {
                Some(s) if chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() => None,
                Some(s) => Some(format!("value '{s}' is not a YYYY-MM-DD date")),
                None => Some(format!("expected date string, got {}", type_name(value))),
            };
        }
        FieldType::Datetime => {
            return match value.as_str() {
                Some(s) if chrono::DateTime::parse_from_rfc3339(s).is_ok() => None,
                Some(s) => Some(format!("value '{s}' is not an RFC 3339 datetime")),
                None => Some(format!("expected datetime string, got {}", type_name(value))),
            };
        }
    };

    if ok {
        None
    } else {
        Some(format!("expected {}, got {}", expected_name(field_type), type_name(value)))
    }
}

fn add_issue(result: &mut ValidationResult, strict: bool, message: String) {
    if strict {
        result.errors.push(message);
    } else {
        result.warnings.push(message);
    }
}

fn expected_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "string",
        FieldType::Number => "number",
        FieldType::Integer => "integer",
        FieldType::Boolean => "boolean",
        FieldType::Date => "date",
        FieldType::Datetime => "datetime",
        FieldType::List => "list",
        FieldType::Object => "object",
        FieldType::Any => "any",
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "object",
        Value::Tagged(_) => "tagged",
    }
}
