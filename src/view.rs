//! Read-only access to a finished run and the handoff to result sinks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::engine::{AnalysisSummary, MatchRecord, Warning};
use crate::pattern::{CompiledPattern, PatternDefinition};
use crate::table::Cell;

/// Which columns are handed to the sink for each matching row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputColumns {
    /// Only the columns the pattern touched.
    #[default]
    Pattern,
    /// Pattern columns first, then every other table column.
    PatternFirst,
}

impl std::str::FromStr for OutputColumns {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pattern" => Ok(OutputColumns::Pattern),
            "pattern_first" | "pattern-first" => Ok(OutputColumns::PatternFirst),
            _ => Err(format!("unknown output columns mode: {}", s)),
        }
    }
}

/// Everything a result sink needs to write one (pattern, language) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinkBatch {
    pub pattern: String,
    pub language: String,
    /// Serialized pattern definition, written first for auditing.
    pub definition: String,
    /// Suggested destination directory, `<pattern>_<timestamp>`.
    pub destination: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    /// Source row positions, parallel to `rows`.
    pub positions: Vec<usize>,
}

/// Consumer of match batches.
pub trait ResultSink {
    /// Persist one batch, returning where it was written.
    fn write(&mut self, batch: &SinkBatch) -> anyhow::Result<PathBuf>;
}

/// Make a pattern name safe to use as a path segment.
pub fn sanitize_segment(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "pattern".to_string()
    } else {
        cleaned
    }
}

/// Timestamp used to qualify destination names.
pub fn run_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Results of a finished run.
#[derive(Debug)]
pub struct RunResults {
    definitions: BTreeMap<String, PatternDefinition>,
    compiled: BTreeMap<String, Arc<CompiledPattern>>,
    compile_warnings: BTreeMap<String, Vec<Warning>>,
    records: BTreeMap<(String, String), MatchRecord>,
    summary: AnalysisSummary,
}

impl RunResults {
    pub(crate) fn new(
        definitions: BTreeMap<String, PatternDefinition>,
        compiled: BTreeMap<String, Arc<CompiledPattern>>,
        compile_warnings: BTreeMap<String, Vec<Warning>>,
        records: BTreeMap<(String, String), MatchRecord>,
    ) -> Self {
        let summary = AnalysisSummary::build(records.values(), &compile_warnings);
        Self {
            definitions,
            compiled,
            compile_warnings,
            records,
            summary,
        }
    }

    pub fn summary(&self) -> &AnalysisSummary {
        &self.summary
    }

    pub fn pattern_names(&self) -> Vec<&str> {
        self.definitions.keys().map(String::as_str).collect()
    }

    pub fn definition(&self, pattern: &str) -> Option<&PatternDefinition> {
        self.definitions.get(pattern)
    }

    pub fn compiled(&self, pattern: &str) -> Option<&CompiledPattern> {
        self.compiled.get(pattern).map(Arc::as_ref)
    }

    /// Records for one pattern, or all records when `pattern` is `None`.
    ///
    /// Ordered by pattern name, then language.
    pub fn records(&self, pattern: Option<&str>) -> Vec<&MatchRecord> {
        self.records
            .values()
            .filter(|r| pattern.map_or(true, |p| r.pattern == p))
            .collect()
    }

    pub fn record(&self, pattern: &str, language: &str) -> Option<&MatchRecord> {
        self.records
            .get(&(pattern.to_string(), language.to_string()))
    }

    /// Column mapping of one pattern: language -> touched table columns.
    pub fn column_mapping(&self, pattern: &str) -> BTreeMap<String, Vec<String>> {
        self.records(Some(pattern))
            .into_iter()
            .map(|r| (r.language.clone(), r.columns.clone()))
            .collect()
    }

    /// Column mappings of every pattern.
    pub fn column_mappings(&self) -> BTreeMap<String, BTreeMap<String, Vec<String>>> {
        let mut all: BTreeMap<String, BTreeMap<String, Vec<String>>> = self
            .definitions
            .keys()
            .map(|name| (name.clone(), BTreeMap::new()))
            .collect();
        for record in self.records.values() {
            all.entry(record.pattern.clone())
                .or_default()
                .insert(record.language.clone(), record.columns.clone());
        }
        all
    }

    /// Every warning: compile warnings first, then per-partition warnings.
    pub fn warnings(&self) -> Vec<&Warning> {
        self.compile_warnings
            .values()
            .flatten()
            .chain(self.records.values().flat_map(|r| r.warnings.iter()))
            .collect()
    }

    /// Build sink batches for every pair with at least one match.
    pub fn handoffs(&self, columns: OutputColumns, timestamp: &str) -> Vec<SinkBatch> {
        self.records
            .values()
            .filter(|r| !r.rows.is_empty())
            .map(|r| self.batch(r, columns, timestamp))
            .collect()
    }

    fn batch(&self, record: &MatchRecord, columns: OutputColumns, timestamp: &str) -> SinkBatch {
        let selected: Vec<usize> = output_indices(record, columns);
        let definition = self
            .definitions
            .get(&record.pattern)
            .map(PatternDefinition::to_json_string)
            .unwrap_or_default();

        SinkBatch {
            pattern: record.pattern.clone(),
            language: record.language.clone(),
            definition,
            destination: PathBuf::from(format!(
                "{}_{}",
                sanitize_segment(&record.pattern),
                timestamp
            )),
            headers: selected.iter().map(|&i| record.headers[i].clone()).collect(),
            rows: record
                .rows
                .iter()
                .map(|row| {
                    selected
                        .iter()
                        .map(|&i| row.cells.get(i).cloned().unwrap_or(Cell::Null))
                        .collect()
                })
                .collect(),
            positions: record.positions(),
        }
    }
}

/// Header indices to output for a record.
///
/// A pattern that touched no columns outputs the whole row.
fn output_indices(record: &MatchRecord, columns: OutputColumns) -> Vec<usize> {
    let touched: Vec<usize> = record
        .columns
        .iter()
        .filter_map(|c| record.headers.iter().position(|h| h == c))
        .collect();

    if touched.is_empty() {
        return (0..record.headers.len()).collect();
    }

    match columns {
        OutputColumns::Pattern => touched,
        OutputColumns::PatternFirst => {
            let rest = (0..record.headers.len()).filter(|i| !touched.contains(i));
            touched.iter().copied().chain(rest).collect()
        }
    }
}

/// Hand every non-empty pair to `sink`.
///
/// Returns the written locations. Stops at the first sink failure.
pub fn deliver<S: ResultSink + ?Sized>(
    results: &RunResults,
    sink: &mut S,
    columns: OutputColumns,
    timestamp: &str,
) -> anyhow::Result<Vec<PathBuf>> {
    results
        .handoffs(columns, timestamp)
        .iter()
        .map(|batch| sink.write(batch))
        .collect()
}
