use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};

/// Top-level schema file: a set of named collection schemas
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub collections: HashMap<String, CollectionSchema>,
}

/// Declared shape of the documents in one collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Filled in from the map key when parsed as part of a schema file or plan
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldDefinition>,
    #[serde(default = "default_true")]
    pub additional_properties: bool,
    #[serde(default = "default_true")]
    pub strict: bool,
}

/// Definition of a single field in a collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "enum", default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
    #[serde(default)]
    pub pattern: Option<Pattern>,
    #[serde(default)]
    pub items: Option<FieldType>,
}

/// Field type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Date,
    Datetime,
    List,
    Object,
    /// Accepts any value, including null (opaque store ids)
    Any,
}

/// A regex constraint on string fields, compiled once when the schema is read
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(source: &str) -> crate::Result<Self> {
        Ok(Pattern(Regex::new(source)?))
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.0.is_match(s)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Regex::new(&source)
            .map(Pattern)
            .map_err(serde::de::Error::custom)
    }
}

fn default_true() -> bool {
    true
}

impl CollectionSchema {
    /// An empty schema that accepts any mapping.
    pub fn permissive(name: impl Into<String>) -> Self {
        CollectionSchema {
            name: name.into(),
            fields: BTreeMap::new(),
            additional_properties: true,
            strict: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, field: FieldDefinition) -> Self {
        self.fields.insert(name.into(), field);
        self
    }
}

impl FieldDefinition {
    pub fn of(field_type: FieldType) -> Self {
        FieldDefinition {
            field_type,
            required: false,
            enum_values: None,
            default: None,
            pattern: None,
            items: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

impl SchemaDefinition {
    /// Look up a collection schema by name
    pub fn collection(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections.get(name)
    }

    /// Copy each map key into the schema's `name`.
    pub(crate) fn assign_names(&mut self) {
        for (name, collection) in self.collections.iter_mut() {
            collection.name = name.clone();
        }
    }
}
