//! In-memory tables partitioned by language.
//!
//! A [`LanguageTable`] is a rectangular grid of [`Cell`]s with named columns.
//! Rows keep their source position so match results can be traced back to
//! the input they came from.

use chrono::NaiveDate;
use phf::phf_map;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl Cell {
    /// Convert a JSON value into a cell.
    ///
    /// Arrays and objects have no tabular meaning and are kept as their
    /// JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Cell::Null,
            serde_json::Value::Bool(b) => Cell::Bool(*b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => Cell::Number(f),
                None => Cell::Text(n.to_string()),
            },
            serde_json::Value::String(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Short name of the cell's type, used in warnings.
    pub fn type_name(&self) -> &'static str {
        match self {
            Cell::Null => "null",
            Cell::Bool(_) => "bool",
            Cell::Number(_) => "number",
            Cell::Date(_) => "date",
            Cell::Text(_) => "text",
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

/// Fixed aliases applied after basic column-name normalization.
static COLUMN_ALIASES: phf::Map<&'static str, &'static str> = phf_map! {
    "tweet id" => "tweet_id",
    "usuario nombre" => "usuario_nombre",
    "usuario genero" => "usuario_genero",
    "tipo de verificacion" => "tipo_de_verificacion",
    "public metrics dump" => "public_metrics_dump",
    "user dump" => "user_dump",
    "tweet dump" => "tweet_dump",
    "source file" => "_source_file",
    "source path" => "_source_path",
    "sheet name" => "_sheet_name",
    "language" => "_language",
};

/// Letters with no canonical decomposition, folded by hand.
static STROKE_FOLDS: phf::Map<char, char> = phf_map! {
    'ł' => 'l', 'ø' => 'o', 'đ' => 'd', 'ħ' => 'h', 'ı' => 'i', 'ŧ' => 't',
};

/// Normalize a column name for comparison.
///
/// Strips combining marks after NFD decomposition, lowercases, collapses
/// whitespace and applies the alias table, so `"Tweet  ID"` and `"tweet_id"`
/// resolve to the same column.
pub fn normalize_column_name(name: &str) -> String {
    let stripped: String = name.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let lowered: String = stripped
        .to_lowercase()
        .chars()
        .map(|c| STROKE_FOLDS.get(&c).copied().unwrap_or(c))
        .collect();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    match COLUMN_ALIASES.get(collapsed.as_str()) {
        Some(alias) => (*alias).to_string(),
        None => collapsed,
    }
}

/// Table of rows for a single language.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LanguageTable {
    pub language: String,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
    index: HashMap<String, usize>,
}

impl LanguageTable {
    /// Create an empty table with the given columns.
    pub fn new(language: impl Into<String>, columns: Vec<String>) -> Self {
        let mut table = Self {
            language: language.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            index: HashMap::new(),
        };
        for column in columns {
            table.add_column(column);
        }
        table
    }

    /// Build a table from columns and rows in one step.
    pub fn with_rows(
        language: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<Cell>>,
    ) -> Self {
        let mut table = Self::new(language, columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Add a column if no column with the same normalized name exists.
    ///
    /// Returns the column's index. Existing rows get `Null` in the new column.
    pub fn add_column(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        let key = normalize_column_name(&name);
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.columns.len();
        self.columns.push(name);
        self.index.insert(key, idx);
        for row in &mut self.rows {
            row.push(Cell::Null);
        }
        idx
    }

    /// Append a row, padding or truncating it to the column count.
    pub fn push_row(&mut self, mut cells: Vec<Cell>) {
        cells.resize(self.columns.len(), Cell::Null);
        self.rows.push(cells);
    }

    /// Resolve a column name (after normalization) to its index.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(&normalize_column_name(name)).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get a row view by position.
    pub fn row(&self, position: usize) -> Option<Row<'_>> {
        self.rows.get(position).map(|cells| Row {
            table: self,
            position,
            cells,
        })
    }

    /// Iterate rows in source order.
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().enumerate().map(move |(position, cells)| Row {
            table: self,
            position,
            cells,
        })
    }

    /// Append every row of `other`, merging column sets by normalized name.
    pub fn extend_from(&mut self, other: &LanguageTable) {
        let mapping: Vec<usize> = other
            .columns
            .iter()
            .map(|c| self.add_column(c.clone()))
            .collect();
        for row in &other.rows {
            let mut cells = vec![Cell::Null; self.columns.len()];
            for (src, &dst) in mapping.iter().enumerate() {
                if let Some(cell) = row.get(src) {
                    cells[dst] = cell.clone();
                }
            }
            self.rows.push(cells);
        }
    }
}

/// Borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a LanguageTable,
    position: usize,
    cells: &'a [Cell],
}

impl<'a> Row<'a> {
    /// Original position of the row in its table.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn cells(&self) -> &'a [Cell] {
        self.cells
    }

    /// Get a cell by column name; `None` if the table lacks the column.
    pub fn get(&self, column: &str) -> Option<&'a Cell> {
        self.table
            .column_index(column)
            .map(|idx| self.cells.get(idx).unwrap_or(&Cell::Null))
    }

    pub fn cell_at(&self, idx: usize) -> &'a Cell {
        self.cells.get(idx).unwrap_or(&Cell::Null)
    }

    pub fn table(&self) -> &'a LanguageTable {
        self.table
    }
}
