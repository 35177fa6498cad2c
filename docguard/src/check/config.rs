use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// Whether a check stops at the first violation or reports all of them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    #[default]
    AllViolations,
    FirstViolation,
}

/// Which relation values a main field may match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationMatching {
    /// Any value of any mapped relation field
    #[default]
    Union,
    /// Only values of the relation field paired with this main field
    PerField,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOptions {
    #[serde(default)]
    pub mode: ReportMode,
    #[serde(default)]
    pub matching: RelationMatching,
}

impl CheckOptions {
    pub fn first_violation(mut self) -> Self {
        self.mode = ReportMode::FirstViolation;
        self
    }

    pub fn per_field(mut self) -> Self {
        self.matching = RelationMatching::PerField;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConstraint {
    #[serde(default)]
    pub unique: bool,
}

/// Fields whose values must be pairwise distinct across a collection.
///
/// Reads from YAML either as a list of field names (all unique) or as a
/// mapping `field: { unique: bool }`. Field order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "UniquenessRepr")]
pub struct UniquenessSpec {
    fields: Vec<(String, FieldConstraint)>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UniquenessRepr {
    Fields(Vec<String>),
    Flags(Mapping),
}

impl TryFrom<UniquenessRepr> for UniquenessSpec {
    type Error = String;

    fn try_from(repr: UniquenessRepr) -> Result<Self, Self::Error> {
        match repr {
            UniquenessRepr::Fields(names) => Ok(UniquenessSpec::from_fields(names)),
            UniquenessRepr::Flags(mapping) => Ok(UniquenessSpec {
                fields: ordered_pairs(mapping)?,
            }),
        }
    }
}

impl UniquenessSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every named field is flagged unique.
    pub fn from_fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .fold(UniquenessSpec::new(), |spec, name| spec.field(name, true))
    }

    pub fn field(mut self, name: impl Into<String>, unique: bool) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, constraint)) => constraint.unique = unique,
            None => self.fields.push((name, FieldConstraint { unique })),
        }
        self
    }

    /// Flagged fields, in declaration order. Unflagged entries are skipped.
    pub fn unique_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, c)| c.unique)
            .map(|(n, _)| n.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.unique_fields().next().is_none()
    }
}

/// Main field → relation field pairs for a referential check. Each main
/// field maps to exactly one relation field; order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Mapping")]
pub struct RelationSpec {
    pairs: Vec<(String, String)>,
}

impl TryFrom<Mapping> for RelationSpec {
    type Error = String;

    fn try_from(mapping: Mapping) -> Result<Self, Self::Error> {
        Ok(RelationSpec {
            pairs: ordered_pairs(mapping)?,
        })
    }
}

impl RelationSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `main_field` to `relation_field`, replacing an earlier mapping of
    /// the same main field.
    pub fn map(mut self, main_field: impl Into<String>, relation_field: impl Into<String>) -> Self {
        let main_field = main_field.into();
        let relation_field = relation_field.into();
        match self.pairs.iter_mut().find(|(m, _)| *m == main_field) {
            Some((_, r)) => *r = relation_field,
            None => self.pairs.push((main_field, relation_field)),
        }
        self
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(m, r)| (m.as_str(), r.as_str()))
    }

    /// Distinct relation fields, in first-mention order.
    pub fn relation_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for (_, r) in &self.pairs {
            if !fields.contains(&r.as_str()) {
                fields.push(r);
            }
        }
        fields
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<M: Into<String>, R: Into<String>> FromIterator<(M, R)> for RelationSpec {
    fn from_iter<I: IntoIterator<Item = (M, R)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(RelationSpec::new(), |spec, (m, r)| spec.map(m, r))
    }
}

/// Read a YAML mapping with string keys into ordered pairs.
fn ordered_pairs<T: DeserializeOwned>(mapping: Mapping) -> Result<Vec<(String, T)>, String> {
    mapping
        .into_iter()
        .map(|(key, value)| {
            let name = match key {
                Value::String(s) => s,
                other => return Err(format!("field names must be strings, got {other:?}")),
            };
            let parsed = serde_yaml::from_value(value)
                .map_err(|e| format!("field '{name}': {e}"))?;
            Ok((name, parsed))
        })
        .collect()
}
