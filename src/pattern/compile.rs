//! Rule compilation: raw pattern values to typed per-column rules.
//!
//! Each column's value list is inspected as a whole to pick a [`FieldKind`]:
//!
//! 1. all values are booleans -> `Boolean`
//! 2. any value is operator-shaped (`>`, `<`, `=` prefix, or a bare number)
//!    -> `Date` when most operator tokens look like `YYYY-MM-DD`, otherwise
//!    `Numeric`
//! 3. otherwise -> `String` (lowercased substring conditions)
//!
//! Values that fail to parse under the inferred kind are dropped and reported
//! as [`CompileIssue`]s. Compilation never fails.

use chrono::NaiveDate;
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{PatternDefinition, RawValue};

lazy_static::lazy_static! {
    /// Token shape that marks a date comparison.
    static ref DATE_SHAPE: Regex = Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}$").unwrap();
}

/// Comparison operator for numeric and date conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "=")]
    Equal,
}

impl Operator {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '>' => Some(Operator::Greater),
            '<' => Some(Operator::Less),
            '=' => Some(Operator::Equal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Greater => ">",
            Operator::Less => "<",
            Operator::Equal => "=",
        }
    }

    /// Apply the operator as `actual <op> expected`.
    pub fn compare<T: PartialOrd>(&self, actual: &T, expected: &T) -> bool {
        match self {
            Operator::Greater => actual > expected,
            Operator::Less => actual < expected,
            Operator::Equal => actual == expected,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed comparison condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Condition<T> {
    pub op: Operator,
    pub value: T,
}

impl<T> Condition<T> {
    pub fn new(op: Operator, value: T) -> Self {
        Self { op, value }
    }
}

/// The comparison semantics of a column rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldKind {
    String,
    Numeric,
    Date,
    Boolean,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldKind::String => "STRING",
            FieldKind::Numeric => "NUMERIC",
            FieldKind::Date => "DATE",
            FieldKind::Boolean => "BOOLEAN",
        };
        f.write_str(s)
    }
}

/// Typed condition list for one column.
///
/// A rule with no conditions can never be satisfied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "conditions", rename_all = "UPPERCASE")]
pub enum FieldRule {
    /// Lowercased substrings.
    String(Vec<String>),
    Numeric(Vec<Condition<f64>>),
    Date(Vec<Condition<NaiveDate>>),
    Boolean(Vec<bool>),
}

impl FieldRule {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldRule::String(_) => FieldKind::String,
            FieldRule::Numeric(_) => FieldKind::Numeric,
            FieldRule::Date(_) => FieldKind::Date,
            FieldRule::Boolean(_) => FieldKind::Boolean,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FieldRule::String(c) => c.len(),
            FieldRule::Numeric(c) => c.len(),
            FieldRule::Date(c) => c.len(),
            FieldRule::Boolean(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A problem found while compiling one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompileIssue {
    pub column: String,
    /// The offending raw value; `None` when the issue concerns the whole rule.
    pub value: Option<String>,
    pub message: String,
}

/// Typed, validated form of a [`PatternDefinition`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledPattern {
    pub name: String,
    fields: Vec<(String, FieldRule)>,
    #[serde(skip)]
    pub issues: Vec<CompileIssue>,
}

impl CompiledPattern {
    /// Column rules in definition order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields.iter().map(|(c, r)| (c.as_str(), r))
    }

    pub fn rule(&self, column: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|(c, _)| c == column).map(|(_, r)| r)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }

    pub fn column_count(&self) -> usize {
        self.fields.len()
    }

    /// True when the pattern references no columns and so matches every row.
    pub fn is_vacuous(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Compile a pattern definition.
///
/// Pure and deterministic: the same definition always yields the same rules
/// and issues.
pub fn compile(def: &PatternDefinition) -> CompiledPattern {
    let mut issues = Vec::new();
    let fields = def
        .columns()
        .map(|(column, values)| {
            let rule = compile_field(column, values, &mut issues);
            (column.to_string(), rule)
        })
        .collect();

    CompiledPattern {
        name: def.name.clone(),
        fields,
        issues,
    }
}

/// Split an operator-shaped value into its operator and trimmed token.
fn split_operator(value: &RawValue) -> Option<(Operator, String)> {
    match value {
        RawValue::Number(n) => Some((Operator::Equal, n.to_string())),
        RawValue::Text(s) => {
            let mut chars = s.trim_start().chars();
            let op = Operator::from_char(chars.next()?)?;
            let token = chars.as_str().trim();
            if token.is_empty() {
                return None;
            }
            Some((op, token.to_string()))
        }
        RawValue::Bool(_) => None,
    }
}

fn parse_number(token: &str) -> Option<f64> {
    token.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn infer_kind(values: &[RawValue]) -> FieldKind {
    if !values.is_empty() && values.iter().all(|v| matches!(v, RawValue::Bool(_))) {
        return FieldKind::Boolean;
    }

    // Only an operator followed by a number or a date counts; "=)" is text.
    let tokens: Vec<String> = values
        .iter()
        .filter_map(split_operator)
        .map(|(_, token)| token)
        .filter(|t| DATE_SHAPE.is_match(t) || parse_number(t).is_some())
        .collect();
    if tokens.is_empty() {
        return FieldKind::String;
    }

    let date_votes = tokens.iter().filter(|t| DATE_SHAPE.is_match(t)).count();
    let numeric_votes = tokens.len() - date_votes;
    if date_votes > numeric_votes {
        FieldKind::Date
    } else {
        FieldKind::Numeric
    }
}

fn compile_field(column: &str, values: &[RawValue], issues: &mut Vec<CompileIssue>) -> FieldRule {
    let mut drop_value = |value: &RawValue, message: String| {
        issues.push(CompileIssue {
            column: column.to_string(),
            value: Some(value.to_string()),
            message,
        });
    };

    let rule = match infer_kind(values) {
        FieldKind::Boolean => FieldRule::Boolean(
            values
                .iter()
                .filter_map(|v| match v {
                    RawValue::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect(),
        ),
        FieldKind::String => FieldRule::String(
            values
                .iter()
                .map(|v| v.to_string().to_lowercase())
                .collect(),
        ),
        FieldKind::Numeric => {
            let mut conditions = Vec::new();
            for value in values {
                match split_operator(value) {
                    Some((op, token)) => match parse_number(&token) {
                        Some(n) => conditions.push(Condition::new(op, n)),
                        None => drop_value(value, format!("{:?} is not a number", token)),
                    },
                    None => drop_value(value, "numeric value needs a >, < or = operator".into()),
                }
            }
            FieldRule::Numeric(conditions)
        }
        FieldKind::Date => {
            let mut conditions = Vec::new();
            for value in values {
                match split_operator(value) {
                    Some((op, token)) => match NaiveDate::parse_from_str(&token, "%Y-%m-%d") {
                        Ok(d) => conditions.push(Condition::new(op, d)),
                        Err(e) => {
                            drop_value(value, format!("{:?} is not a YYYY-MM-DD date: {}", token, e))
                        }
                    },
                    None => drop_value(value, "date value needs a >, < or = operator".into()),
                }
            }
            FieldRule::Date(conditions)
        }
    };

    if rule.is_empty() {
        issues.push(CompileIssue {
            column: column.to_string(),
            value: None,
            message: format!("{} rule has no usable conditions and can never match", rule.kind()),
        });
    }

    rule
}

/// Run-scoped memo of compiled patterns, keyed by pattern name.
///
/// Each name is compiled at most once, even when requested concurrently.
#[derive(Default)]
pub struct PatternCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<Arc<CompiledPattern>>>>>,
    compilations: AtomicUsize,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the compiled form of `def`, compiling it on first request.
    pub fn get_or_compile(&self, def: &PatternDefinition) -> Arc<CompiledPattern> {
        let cell = {
            let mut entries = match self.entries.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(entries.entry(def.name.clone()).or_default())
        };

        Arc::clone(cell.get_or_init(|| {
            self.compilations.fetch_add(1, Ordering::Relaxed);
            Arc::new(compile(def))
        }))
    }

    /// Get a previously compiled pattern.
    pub fn get(&self, name: &str) -> Option<Arc<CompiledPattern>> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(name).and_then(|cell| cell.get().cloned())
    }

    /// Number of compilations performed so far.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }
}
