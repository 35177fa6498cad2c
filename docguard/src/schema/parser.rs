use crate::error::Result;
use super::types::{CollectionSchema, SchemaDefinition};
use std::path::Path;

/// Parse a schema.yaml file into a SchemaDefinition
pub fn parse_schema(path: &Path) -> Result<SchemaDefinition> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content)
}

/// Parse a schema YAML string into a SchemaDefinition
pub fn parse_schema_str(content: &str) -> Result<SchemaDefinition> {
    let mut schema: SchemaDefinition = serde_yaml::from_str(content)?;
    schema.assign_names();
    Ok(schema)
}

/// Parse a single collection schema (the body under one `collections:` key)
pub fn parse_collection_schema_str(name: &str, content: &str) -> Result<CollectionSchema> {
    let schema: CollectionSchema = serde_yaml::from_str(content)?;
    Ok(schema.with_name(name))
}
