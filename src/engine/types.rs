//! Core types for match results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::table::Cell;

/// Categories of recoverable problems seen during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    /// A pattern references a column the language table lacks.
    #[serde(rename = "schema_mismatch")]
    SchemaMismatch,
    /// A cell could not be coerced to the type its rule needs.
    #[serde(rename = "coercion")]
    Coercion,
    /// A pattern value did not parse under its column's inferred kind.
    #[serde(rename = "malformed_pattern_value")]
    MalformedPatternValue,
    /// A column rule ended up with no conditions.
    #[serde(rename = "empty_field_rule")]
    EmptyFieldRule,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::SchemaMismatch => "schema_mismatch",
            WarningKind::Coercion => "coercion",
            WarningKind::MalformedPatternValue => "malformed_pattern_value",
            WarningKind::EmptyFieldRule => "empty_field_rule",
        }
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recoverable problem, with enough context to trace it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] pattern '{}'", self.kind, self.pattern)?;
        if let Some(language) = &self.language {
            write!(f, ", language '{}'", language)?;
        }
        if let Some(column) = &self.column {
            write!(f, ", column '{}'", column)?;
        }
        if let Some(row) = self.row {
            write!(f, ", row {}", row)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Whether a (pattern, language) pair was scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PartitionStatus {
    Evaluated,
    /// The table lacks columns the pattern needs; no row was examined.
    Skipped { missing_columns: Vec<String> },
}

impl PartitionStatus {
    pub fn is_skipped(&self) -> bool {
        matches!(self, PartitionStatus::Skipped { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionStatus::Evaluated => "evaluated",
            PartitionStatus::Skipped { .. } => "skipped",
        }
    }
}

/// A matching row with its original position and values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRow {
    pub position: usize,
    pub cells: Vec<Cell>,
}

/// Rows of one language table that satisfied one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub pattern: String,
    pub language: String,
    pub status: PartitionStatus,
    /// Column headers of the source table, in table order.
    pub headers: Vec<String>,
    /// Matching rows, in source order.
    pub rows: Vec<MatchedRow>,
    /// Table columns the pattern touched (the column mapping).
    pub columns: Vec<String>,
    pub rows_examined: usize,
    /// Warnings raised while producing this record.
    pub warnings: Vec<Warning>,
}

impl MatchRecord {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Row positions of the matches, in order.
    pub fn positions(&self) -> Vec<usize> {
        self.rows.iter().map(|r| r.position).collect()
    }
}

/// Counts for one (pattern, language) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSummary {
    pub status: String,
    pub rows_examined: usize,
    pub rows_matched: usize,
    pub warnings: usize,
}

/// Counts for one pattern across languages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub rows_examined: usize,
    pub rows_matched: usize,
    pub warnings: usize,
    pub skipped_languages: usize,
    pub languages: BTreeMap<String, PartitionSummary>,
}

/// Counts for one language across patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSummary {
    pub rows_examined: usize,
    pub rows_matched: usize,
    pub warnings: usize,
    pub skipped_patterns: usize,
}

/// Aggregate counts for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_patterns: usize,
    pub total_languages: usize,
    pub rows_examined: usize,
    pub rows_matched: usize,
    /// All warnings, including pattern compilation warnings.
    pub warnings: usize,
    pub compile_warnings: usize,
    pub skipped_pairs: usize,
    pub patterns: BTreeMap<String, PatternSummary>,
    pub languages: BTreeMap<String, LanguageSummary>,
}

impl AnalysisSummary {
    /// Build the summary from finished records.
    pub fn build<'a>(
        records: impl IntoIterator<Item = &'a MatchRecord>,
        compile_warnings: &BTreeMap<String, Vec<Warning>>,
    ) -> Self {
        let mut summary = AnalysisSummary::default();

        for (pattern, warnings) in compile_warnings {
            let entry = summary.patterns.entry(pattern.clone()).or_default();
            entry.warnings += warnings.len();
            summary.compile_warnings += warnings.len();
        }
        summary.warnings = summary.compile_warnings;

        for record in records {
            let pattern = summary.patterns.entry(record.pattern.clone()).or_default();
            let language = summary.languages.entry(record.language.clone()).or_default();

            let partition = PartitionSummary {
                status: record.status.as_str().to_string(),
                rows_examined: record.rows_examined,
                rows_matched: record.rows.len(),
                warnings: record.warnings.len(),
            };

            pattern.rows_examined += partition.rows_examined;
            pattern.rows_matched += partition.rows_matched;
            pattern.warnings += partition.warnings;
            language.rows_examined += partition.rows_examined;
            language.rows_matched += partition.rows_matched;
            language.warnings += partition.warnings;
            summary.rows_examined += partition.rows_examined;
            summary.rows_matched += partition.rows_matched;
            summary.warnings += partition.warnings;

            if record.status.is_skipped() {
                pattern.skipped_languages += 1;
                language.skipped_patterns += 1;
                summary.skipped_pairs += 1;
            }

            pattern.languages.insert(record.language.clone(), partition);
        }

        summary.total_patterns = summary.patterns.len();
        summary.total_languages = summary.languages.len();
        summary
    }

    /// Matched row count for a pair; `None` if the pair was never run.
    pub fn matched(&self, pattern: &str, language: &str) -> Option<usize> {
        self.patterns
            .get(pattern)
            .and_then(|p| p.languages.get(language))
            .map(|p| p.rows_matched)
    }
}
