use crate::record::Record;
use crate::validation::SchemaValidator;
use serde_yaml::Value;

/// A reusable conformance check bound to one schema. Never fails; a value
/// that doesn't validate is simply `false` / `None`.
#[derive(Debug, Clone)]
pub struct Constrained<V> {
    schema: V,
}

impl<V: SchemaValidator> Constrained<V> {
    pub fn new(schema: V) -> Self {
        Constrained { schema }
    }

    pub fn schema(&self) -> &V {
        &self.schema
    }

    pub fn check(&self, value: &Value) -> bool {
        self.schema.conforms(value)
    }

    /// True when every element conforms. An empty slice conforms.
    pub fn check_array(&self, values: &[Value]) -> bool {
        values.iter().all(|v| self.check(v))
    }

    /// The validated record, when `value` conforms.
    pub fn narrow(&self, value: &Value) -> Option<Record> {
        self.schema.validate(value).ok()
    }

    pub fn narrow_array(&self, values: &[Value]) -> Option<Vec<Record>> {
        self.schema.validate_array(values).ok()
    }
}
