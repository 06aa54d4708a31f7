//! Match aggregation over every (pattern, language) pair.

use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::evaluate::bind;
use super::{MatchRecord, MatchedRow, PartitionStatus, Warning, WarningKind};
use crate::pattern::{CompiledPattern, PatternCache, PatternDefinition};
use crate::table::LanguageTable;
use crate::view::RunResults;

/// Caller mistakes that stop `apply_patterns` outright.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EngineError {
    #[error("pattern registered as '{key}' is named '{name}'")]
    PatternNameMismatch { key: String, name: String },
    #[error("results for pattern '{pattern}' in language '{language}' were already recorded")]
    DuplicatePartition { pattern: String, language: String },
}

/// Run-scoped store for everything a run produces.
///
/// Each (pattern, language) slot is written once; the compile cache is the
/// only state shared between partitions.
#[derive(Default)]
pub struct RunAccumulator {
    cache: PatternCache,
    definitions: BTreeMap<String, PatternDefinition>,
    compiled: BTreeMap<String, Arc<CompiledPattern>>,
    compile_warnings: BTreeMap<String, Vec<Warning>>,
    records: BTreeMap<(String, String), MatchRecord>,
}

impl RunAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &PatternCache {
        &self.cache
    }

    pub fn has_partition(&self, pattern: &str, language: &str) -> bool {
        self.records
            .contains_key(&(pattern.to_string(), language.to_string()))
    }

    /// Store a finished partition.
    pub fn record(&mut self, record: MatchRecord) -> Result<(), EngineError> {
        let key = (record.pattern.clone(), record.language.clone());
        if self.records.contains_key(&key) {
            return Err(EngineError::DuplicatePartition {
                pattern: key.0,
                language: key.1,
            });
        }
        self.records.insert(key, record);
        Ok(())
    }

    /// Compile (once) and remember a definition, logging its compile issues.
    fn register(&mut self, def: &PatternDefinition) -> Arc<CompiledPattern> {
        let compiled = self.cache.get_or_compile(def);
        if !self.compiled.contains_key(&def.name) {
            let warnings = compile_warnings(&compiled);
            for w in &warnings {
                warn!(pattern = %w.pattern, column = ?w.column, "{}", w.message);
            }
            info!(
                pattern = %def.name,
                columns = compiled.column_count(),
                dropped = warnings.len(),
                "compiled pattern"
            );
            if !warnings.is_empty() {
                self.compile_warnings.insert(def.name.clone(), warnings);
            }
            self.definitions.insert(def.name.clone(), def.clone());
            self.compiled.insert(def.name.clone(), Arc::clone(&compiled));
        }
        compiled
    }

    /// Close the run and build the summary.
    pub fn finish(self) -> RunResults {
        RunResults::new(
            self.definitions,
            self.compiled,
            self.compile_warnings,
            self.records,
        )
    }
}

fn compile_warnings(compiled: &CompiledPattern) -> Vec<Warning> {
    compiled
        .issues
        .iter()
        .map(|issue| Warning {
            kind: if issue.value.is_some() {
                WarningKind::MalformedPatternValue
            } else {
                WarningKind::EmptyFieldRule
            },
            pattern: compiled.name.clone(),
            language: None,
            column: Some(issue.column.clone()),
            row: None,
            message: match &issue.value {
                Some(v) => format!("dropped value {:?}: {}", v, issue.message),
                None => issue.message.clone(),
            },
        })
        .collect()
}

/// Scan one table with one pattern.
///
/// A table missing any pattern column yields an empty, skipped record. Cell
/// coercion failures make that row non-matching and become warnings.
pub fn evaluate_partition(
    pattern: &CompiledPattern,
    language: &str,
    table: &LanguageTable,
) -> MatchRecord {
    let mut record = MatchRecord {
        pattern: pattern.name.clone(),
        language: language.to_string(),
        status: PartitionStatus::Evaluated,
        headers: table.columns().to_vec(),
        rows: Vec::new(),
        columns: Vec::new(),
        rows_examined: 0,
        warnings: Vec::new(),
    };

    let bound = match bind(pattern, table) {
        Ok(bound) => bound,
        Err(missing) => {
            warn!(
                pattern = %pattern.name,
                language,
                missing = ?missing,
                "table lacks pattern columns, skipping"
            );
            record.warnings.push(Warning {
                kind: WarningKind::SchemaMismatch,
                pattern: pattern.name.clone(),
                language: Some(language.to_string()),
                column: Some(missing.join(", ")),
                row: None,
                message: format!(
                    "column(s) {} not found; available: {}",
                    missing.join(", "),
                    table.columns().join(", ")
                ),
            });
            record.status = PartitionStatus::Skipped {
                missing_columns: missing,
            };
            return record;
        }
    };

    record.columns = bound.table_columns();

    for row in table.rows() {
        record.rows_examined += 1;
        let outcome = bound.evaluate(row.cells());

        for issue in outcome.issues {
            warn!(
                pattern = %pattern.name,
                language,
                column = %issue.column,
                row = row.position(),
                "{}",
                issue.error
            );
            record.warnings.push(Warning {
                kind: WarningKind::Coercion,
                pattern: pattern.name.clone(),
                language: Some(language.to_string()),
                column: Some(issue.column),
                row: Some(row.position()),
                message: issue.error.to_string(),
            });
        }

        if outcome.matched {
            record.rows.push(MatchedRow {
                position: row.position(),
                cells: row.cells().to_vec(),
            });
        }
    }

    debug!(
        pattern = %pattern.name,
        language,
        examined = record.rows_examined,
        matched = record.rows.len(),
        "partition done"
    );
    record
}

/// Applies patterns to language tables.
pub struct Analyzer {
    parallel: bool,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    /// Create an analyzer that evaluates partitions in parallel.
    pub fn new() -> Self {
        Self { parallel: true }
    }

    /// Set whether partitions are evaluated on the rayon pool.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Evaluate every pattern against every table, storing results in `acc`.
    pub fn apply_patterns(
        &self,
        tables: &BTreeMap<String, LanguageTable>,
        patterns: &BTreeMap<String, PatternDefinition>,
        acc: &mut RunAccumulator,
    ) -> Result<(), EngineError> {
        for (key, def) in patterns {
            if *key != def.name {
                return Err(EngineError::PatternNameMismatch {
                    key: key.clone(),
                    name: def.name.clone(),
                });
            }
            for language in tables.keys() {
                if acc.has_partition(&def.name, language) {
                    return Err(EngineError::DuplicatePartition {
                        pattern: def.name.clone(),
                        language: language.clone(),
                    });
                }
            }
        }

        info!(
            patterns = patterns.len(),
            languages = tables.len(),
            parallel = self.parallel,
            "starting pattern application"
        );

        let jobs: Vec<(Arc<CompiledPattern>, &str, &LanguageTable)> = patterns
            .values()
            .flat_map(|def| {
                let compiled = acc.register(def);
                tables
                    .iter()
                    .map(move |(language, table)| (Arc::clone(&compiled), language.as_str(), table))
                    .collect::<Vec<_>>()
            })
            .collect();

        let records: Vec<MatchRecord> = if self.parallel {
            jobs.par_iter()
                .map(|(compiled, language, table)| evaluate_partition(compiled, language, table))
                .collect()
        } else {
            jobs.iter()
                .map(|(compiled, language, table)| evaluate_partition(compiled, language, table))
                .collect()
        };

        for record in records {
            if !record.rows.is_empty() {
                info!(
                    pattern = %record.pattern,
                    language = %record.language,
                    matched = record.rows.len(),
                    "found matching rows"
                );
            }
            acc.record(record)?;
        }

        info!("pattern application completed");
        Ok(())
    }

    /// Run a complete analysis in a fresh accumulator.
    pub fn run(
        &self,
        tables: &BTreeMap<String, LanguageTable>,
        patterns: &BTreeMap<String, PatternDefinition>,
    ) -> Result<RunResults, EngineError> {
        let mut acc = RunAccumulator::new();
        self.apply_patterns(tables, patterns, &mut acc)?;
        Ok(acc.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn tables() -> BTreeMap<String, LanguageTable> {
        let mut tables = BTreeMap::new();
        tables.insert(
            "es".to_string(),
            LanguageTable::with_rows(
                "es",
                vec!["texto".into(), "seguidores".into()],
                vec![
                    vec![text("hola mundo"), Cell::Number(10.0)],
                    vec![text("adios"), Cell::Number(20.0)],
                    vec![text("HOLA otra vez"), text("muchos")],
                    vec![text("hola"), Cell::Number(30.0)],
                ],
            ),
        );
        tables.insert(
            "en".to_string(),
            LanguageTable::with_rows("en", vec!["texto".into()], vec![vec![text("hola")]]),
        );
        tables
    }

    fn patterns(defs: Vec<PatternDefinition>) -> BTreeMap<String, PatternDefinition> {
        defs.into_iter().map(|d| (d.name.clone(), d)).collect()
    }

    #[test]
    fn test_evaluate_partition_keeps_source_order() {
        let compiled = crate::pattern::compile(
            &PatternDefinition::new("hola").with_column("texto", ["hola"]),
        );
        let all = tables();
        let record = evaluate_partition(&compiled, "es", &all["es"]);

        assert_eq!(record.status, PartitionStatus::Evaluated);
        assert_eq!(record.positions(), vec![0, 2, 3]);
        assert_eq!(record.columns, vec!["texto".to_string()]);
        assert_eq!(record.rows_examined, 4);
    }

    #[test]
    fn test_coercion_failure_isolated_to_row() {
        let compiled = crate::pattern::compile(
            &PatternDefinition::new("big").with_column("seguidores", [">15"]),
        );
        let all = tables();
        let record = evaluate_partition(&compiled, "es", &all["es"]);

        assert_eq!(record.positions(), vec![1, 3]);
        assert_eq!(record.warnings.len(), 1);
        assert_eq!(record.warnings[0].kind, WarningKind::Coercion);
        assert_eq!(record.warnings[0].row, Some(2));
    }

    #[test]
    fn test_missing_column_skips_only_that_language() {
        let defs = patterns(vec![
            PatternDefinition::new("big").with_column("seguidores", [">15"])
        ]);
        let results = Analyzer::new().run(&tables(), &defs).unwrap();

        let en = results.record("big", "en").unwrap();
        assert!(en.status.is_skipped());
        assert!(en.rows.is_empty());
        assert_eq!(en.warnings.len(), 1);
        assert_eq!(en.warnings[0].kind, WarningKind::SchemaMismatch);

        let es = results.record("big", "es").unwrap();
        assert!(!es.status.is_skipped());
        assert!(es.warnings.iter().all(|w| w.kind != WarningKind::SchemaMismatch));
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let defs = patterns(vec![
            PatternDefinition::new("hola").with_column("texto", ["hola"]),
            PatternDefinition::new("big").with_column("seguidores", [">15"]),
            PatternDefinition::new("all"),
        ]);
        let parallel = Analyzer::new().run(&tables(), &defs).unwrap();
        let sequential = Analyzer::new().parallel(false).run(&tables(), &defs).unwrap();

        assert_eq!(parallel.summary(), sequential.summary());
        assert_eq!(parallel.records(None), sequential.records(None));
    }

    #[test]
    fn test_name_mismatch_is_rejected() {
        let mut defs = BTreeMap::new();
        defs.insert("a".to_string(), PatternDefinition::new("b"));
        let err = Analyzer::new().run(&tables(), &defs).unwrap_err();
        assert!(matches!(err, EngineError::PatternNameMismatch { .. }));
    }

    #[test]
    fn test_reapplying_into_same_accumulator_fails() {
        let defs = patterns(vec![PatternDefinition::new("all")]);
        let mut acc = RunAccumulator::new();
        let analyzer = Analyzer::new();
        analyzer.apply_patterns(&tables(), &defs, &mut acc).unwrap();

        let err = analyzer.apply_patterns(&tables(), &defs, &mut acc).unwrap_err();
        assert!(matches!(err, EngineError::DuplicatePartition { .. }));
        assert_eq!(acc.cache().compilations(), 1);
    }

    #[test]
    fn test_empty_inputs_produce_empty_summary() {
        let results = Analyzer::new()
            .run(&BTreeMap::new(), &BTreeMap::new())
            .unwrap();
        assert_eq!(results.summary().total_patterns, 0);
        assert_eq!(results.summary().rows_examined, 0);
    }
}
