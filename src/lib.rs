//! Rowsift - pattern filtering for language-partitioned tables.
//!
//! Rowsift evaluates column patterns against tables that share a loose
//! schema across languages (one table per language code). A pattern maps
//! column names to candidate values; a row matches when every pattern column
//! has at least one satisfied candidate.
//!
//! # Architecture
//!
//! - `pattern`: pattern definitions, loading, and the rule compiler
//! - `table`: cells, language tables, and column-name normalization
//! - `engine`: row evaluation and per-(pattern, language) aggregation
//! - `view`: read-only results and the handoff to result sinks
//! - `source` / `sink`: JSON workbook input and JSON-lines output
//! - `config`, `logging`, `report`, `cli`: the command-line application
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use rowsift::{Analyzer, Cell, LanguageTable, PatternDefinition};
//!
//! let mut tables = BTreeMap::new();
//! tables.insert(
//!     "es".to_string(),
//!     LanguageTable::with_rows(
//!         "es",
//!         vec!["texto".into()],
//!         vec![vec![Cell::Text("Hola mundo".into())]],
//!     ),
//! );
//! let mut patterns = BTreeMap::new();
//! let def = PatternDefinition::new("saludo").with_column("texto", ["hola"]);
//! patterns.insert(def.name.clone(), def);
//!
//! let results = Analyzer::new().run(&tables, &patterns).unwrap();
//! assert_eq!(results.summary().matched("saludo", "es"), Some(1));
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod logging;
pub mod pattern;
pub mod report;
pub mod sink;
pub mod source;
pub mod table;
pub mod view;

pub use config::Config;
pub use engine::{
    evaluate_partition, matches, AnalysisSummary, Analyzer, EngineError, MatchRecord,
    RunAccumulator, Warning, WarningKind,
};
pub use pattern::{
    compile, CompiledPattern, FieldKind, FieldRule, LoadReport, PatternCache, PatternDefinition,
    PatternDirSource, PatternSource, RawValue,
};
pub use sink::JsonLinesSink;
pub use source::{DataSource, JsonWorkbookSource, SourceError};
pub use table::{Cell, LanguageTable, Row};
pub use view::{deliver, OutputColumns, ResultSink, RunResults, SinkBatch};
