//! Pattern matching engine: row evaluation and match aggregation.

mod aggregate;
mod evaluate;
mod types;

pub use aggregate::{evaluate_partition, Analyzer, EngineError, RunAccumulator};
pub use evaluate::{
    bind, coerce_bool, coerce_date, coerce_number, evaluate_row, matches, rule_matches,
    BoundPattern, CellIssue, CoercionError, RowOutcome,
};
pub use types::{
    AnalysisSummary, LanguageSummary, MatchRecord, MatchedRow, PartitionStatus, PartitionSummary,
    PatternSummary, Warning, WarningKind,
};
