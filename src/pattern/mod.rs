//! Pattern definitions, loading, and compilation.
//!
//! A pattern is a named set of per-column match conditions:
//!
//! ```json
//! { "name": "HighFollowers",
//!   "pattern": { "seguidores": [">1000"], "verificado": [true] } }
//! ```
//!
//! Definitions come from a [`PatternSource`] and are turned into typed
//! [`CompiledPattern`]s by [`compile`].

mod compile;
mod source;

pub use compile::{
    compile, CompileIssue, CompiledPattern, Condition, FieldKind, FieldRule, Operator,
    PatternCache,
};
pub use source::{
    parse_content, parse_document, LoadReport, PatternDirSource, PatternSource,
    PatternValidationError, RejectedPattern,
};

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::fmt;

/// One raw value from a pattern's column list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::Number(n) => write!(f, "{}", n),
            RawValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        RawValue::Bool(b)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

/// A named pattern as written by the user.
///
/// Column order is preserved from the source document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatternDefinition {
    pub name: String,
    columns: Vec<(String, Vec<RawValue>)>,
}

impl PatternDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Add (or replace) the value list for a column.
    pub fn with_column<V: Into<RawValue>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.insert(column.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn insert(&mut self, column: String, values: Vec<RawValue>) {
        match self.columns.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = values,
            None => self.columns.push((column, values)),
        }
    }

    /// Columns in definition order with their raw values.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &[RawValue])> {
        self.columns.iter().map(|(c, v)| (c.as_str(), v.as_slice()))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Serialize to the single-line JSON form written above result rows.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"name\":{:?}}}", self.name))
    }
}

/// Ordered map of column -> values, serialized as a JSON object.
struct ColumnMap<'a>(&'a [(String, Vec<RawValue>)]);

impl Serialize for ColumnMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (column, values) in self.0 {
            map.serialize_entry(column, values)?;
        }
        map.end()
    }
}

impl Serialize for PatternDefinition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("PatternDefinition", 2)?;
        s.serialize_field("name", &self.name)?;
        s.serialize_field("pattern", &ColumnMap(&self.columns))?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_serializes_in_column_order() {
        let def = PatternDefinition::new("HighFollowers")
            .with_column("seguidores", [">1000"])
            .with_column("verificado", [true]);

        assert_eq!(
            def.to_json_string(),
            r#"{"name":"HighFollowers","pattern":{"seguidores":[">1000"],"verificado":[true]}}"#
        );
    }

    #[test]
    fn test_insert_replaces_existing_column() {
        let mut def = PatternDefinition::new("p").with_column("a", ["x"]);
        def.insert("a".to_string(), vec![RawValue::from("y")]);
        assert_eq!(def.column_names(), vec!["a".to_string()]);
        let (_, values) = def.columns().next().unwrap();
        assert_eq!(values, &[RawValue::from("y")]);
    }
}
