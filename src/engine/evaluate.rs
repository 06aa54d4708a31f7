//! Row evaluation against compiled patterns.
//!
//! A row matches when, for every column in the pattern, at least one of the
//! column's conditions holds. Cells are coerced to the rule's kind by the
//! `coerce_*` functions; a failed coercion makes that column non-matching for
//! the row and is reported as a [`CoercionError`], never as a panic.
//!
//! Everything here is pure and reentrant.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use phf::phf_set;
use thiserror::Error;

use crate::pattern::{CompiledPattern, FieldKind, FieldRule};
use crate::table::{Cell, LanguageTable, Row};

static TRUTHY: phf::Set<&'static str> = phf_set! {
    "true", "1", "yes", "y", "si", "sí", "verdadero",
};

static FALSY: phf::Set<&'static str> = phf_set! {
    "false", "0", "no", "n", "falso",
};

/// Date-only text layouts, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Date-time text layouts without offset, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Twitter `created_at` layout, e.g. `Wed Oct 10 20:19:24 +0000 2018`.
const TWITTER_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// A cell that cannot be read as the kind its rule needs.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot read {cell_type} value {value:?} as {kind}")]
pub struct CoercionError {
    pub kind: FieldKind,
    pub cell_type: &'static str,
    pub value: String,
}

impl CoercionError {
    fn new(kind: FieldKind, cell: &Cell) -> Self {
        Self {
            kind,
            cell_type: cell.type_name(),
            value: cell.to_string(),
        }
    }
}

fn blank(cell: &Cell) -> bool {
    match cell {
        Cell::Null => true,
        Cell::Text(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Coerce a cell to a real number. `Ok(None)` means the cell is empty.
pub fn coerce_number(cell: &Cell) -> Result<Option<f64>, CoercionError> {
    if blank(cell) {
        return Ok(None);
    }
    let n = match cell {
        Cell::Number(n) => Some(*n),
        Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Cell::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n {
        Some(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(CoercionError::new(FieldKind::Numeric, cell)),
    }
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            DateTime::parse_from_str(s, TWITTER_FORMAT)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

/// Coerce a cell to a calendar date. `Ok(None)` means the cell is empty.
///
/// Day-first or month-first layouts like `01/02/2024` are ambiguous and are
/// rejected.
pub fn coerce_date(cell: &Cell) -> Result<Option<NaiveDate>, CoercionError> {
    if blank(cell) {
        return Ok(None);
    }
    let d = match cell {
        Cell::Date(d) => Some(*d),
        Cell::Text(s) => parse_date_text(s),
        _ => None,
    };
    d.map(Some)
        .ok_or_else(|| CoercionError::new(FieldKind::Date, cell))
}

/// Coerce a cell to a boolean. `Ok(None)` means the cell is empty.
pub fn coerce_bool(cell: &Cell) -> Result<Option<bool>, CoercionError> {
    if blank(cell) {
        return Ok(None);
    }
    let b = match cell {
        Cell::Bool(b) => Some(*b),
        Cell::Number(n) if *n == 1.0 => Some(true),
        Cell::Number(n) if *n == 0.0 => Some(false),
        Cell::Text(s) => {
            let key = s.trim().to_lowercase();
            if TRUTHY.contains(key.as_str()) {
                Some(true)
            } else if FALSY.contains(key.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    };
    b.map(Some)
        .ok_or_else(|| CoercionError::new(FieldKind::Boolean, cell))
}

/// Check one cell against one column rule (OR across the rule's conditions).
pub fn rule_matches(rule: &FieldRule, cell: &Cell) -> Result<bool, CoercionError> {
    if rule.is_empty() {
        return Ok(false);
    }
    let matched = match rule {
        FieldRule::String(needles) => {
            if cell.is_null() {
                return Ok(false);
            }
            let haystack = cell.to_string().to_lowercase();
            needles.iter().any(|n| haystack.contains(n.as_str()))
        }
        FieldRule::Numeric(conditions) => match coerce_number(cell)? {
            Some(n) => conditions.iter().any(|c| c.op.compare(&n, &c.value)),
            None => false,
        },
        FieldRule::Date(conditions) => match coerce_date(cell)? {
            Some(d) => conditions.iter().any(|c| c.op.compare(&d, &c.value)),
            None => false,
        },
        FieldRule::Boolean(values) => match coerce_bool(cell)? {
            Some(b) => values.contains(&b),
            None => false,
        },
    };
    Ok(matched)
}

/// A coercion failure tied to the column it happened in.
#[derive(Debug, Clone, PartialEq)]
pub struct CellIssue {
    /// Column name as written in the table.
    pub column: String,
    pub error: CoercionError,
}

/// Result of evaluating one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowOutcome {
    pub matched: bool,
    pub issues: Vec<CellIssue>,
}

/// Pattern columns resolved to a table's column indices.
#[derive(Debug)]
pub struct BoundPattern<'p> {
    pattern: &'p CompiledPattern,
    slots: Vec<Slot<'p>>,
}

#[derive(Debug)]
struct Slot<'p> {
    index: usize,
    table_column: String,
    rule: &'p FieldRule,
}

impl<'p> BoundPattern<'p> {
    pub fn pattern(&self) -> &'p CompiledPattern {
        self.pattern
    }

    /// Table column names the pattern touches, in pattern order, without
    /// duplicates.
    pub fn table_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            if !columns.contains(&slot.table_column) {
                columns.push(slot.table_column.clone());
            }
        }
        columns
    }

    /// Evaluate a row's cells (AND across columns, short-circuiting).
    pub fn evaluate(&self, cells: &[Cell]) -> RowOutcome {
        let mut outcome = RowOutcome {
            matched: true,
            issues: Vec::new(),
        };
        for slot in &self.slots {
            let cell = cells.get(slot.index).unwrap_or(&Cell::Null);
            match rule_matches(slot.rule, cell) {
                Ok(true) => {}
                Ok(false) => {
                    outcome.matched = false;
                    break;
                }
                Err(error) => {
                    outcome.issues.push(CellIssue {
                        column: slot.table_column.clone(),
                        error,
                    });
                    outcome.matched = false;
                    break;
                }
            }
        }
        outcome
    }
}

/// Resolve every pattern column in `table`.
///
/// Returns the pattern columns the table lacks when any are missing.
pub fn bind<'p>(
    pattern: &'p CompiledPattern,
    table: &LanguageTable,
) -> Result<BoundPattern<'p>, Vec<String>> {
    let mut slots = Vec::with_capacity(pattern.column_count());
    let mut missing = Vec::new();

    for (column, rule) in pattern.fields() {
        match table.column_index(column) {
            Some(index) => slots.push(Slot {
                index,
                table_column: table.columns()[index].clone(),
                rule,
            }),
            None => missing.push(column.to_string()),
        }
    }

    if missing.is_empty() {
        Ok(BoundPattern { pattern, slots })
    } else {
        Err(missing)
    }
}

/// Evaluate a row, failing if its table lacks a pattern column.
pub fn evaluate_row(row: &Row<'_>, pattern: &CompiledPattern) -> Result<RowOutcome, Vec<String>> {
    let bound = bind(pattern, row.table())?;
    Ok(bound.evaluate(row.cells()))
}

/// Whether `row` satisfies `pattern`.
///
/// Rows from tables missing a pattern column never match.
pub fn matches(row: &Row<'_>, pattern: &CompiledPattern) -> bool {
    evaluate_row(row, pattern)
        .map(|o| o.matched)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{compile, PatternDefinition};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn single(column: &str, cell: Cell, def: PatternDefinition) -> bool {
        let table = LanguageTable::with_rows("es", vec![column.to_string()], vec![vec![cell]]);
        let compiled = compile(&def);
        let row = table.row(0).unwrap();
        matches(&row, &compiled)
    }

    #[test]
    fn test_string_is_case_insensitive_substring() {
        let def = PatternDefinition::new("p").with_column("texto", ["hello"]);
        assert!(single("texto", text("Hello World"), def.clone()));
        assert!(!single("texto", text("Goodbye"), def.clone()));
        assert!(!single("texto", Cell::Null, def));
    }

    #[test]
    fn test_emoticon_keyword_keeps_text_column() {
        let def = PatternDefinition::new("p").with_column("mensaje", ["hola", "=)"]);
        assert!(single("mensaje", text("Hola amigos"), def.clone()));
        assert!(single("mensaje", text("gracias =)"), def.clone()));
        assert!(!single("mensaje", text("adios"), def));
    }

    #[test]
    fn test_string_stringifies_other_cells() {
        let def = PatternDefinition::new("p").with_column("id", ["150"]);
        assert!(single("id", Cell::Number(1500.0), def));
    }

    #[test]
    fn test_numeric_operators() {
        let gt = PatternDefinition::new("p").with_column("n", [">1000"]);
        assert!(single("n", Cell::Number(1500.0), gt.clone()));
        assert!(!single("n", Cell::Number(1000.0), gt.clone()));
        assert!(!single("n", Cell::Number(999.0), gt.clone()));
        assert!(single("n", text(" 1500 "), gt));

        let eq = PatternDefinition::new("p").with_column("n", ["=1000"]);
        assert!(single("n", Cell::Number(1000.0), eq.clone()));
        assert!(!single("n", Cell::Number(1000.5), eq));
    }

    #[test]
    fn test_date_operators() {
        let def = PatternDefinition::new("p").with_column("fecha", [">2024-01-01"]);
        assert!(single("fecha", Cell::Date(date(2024, 6, 15)), def.clone()));
        assert!(single("fecha", text("2024-06-15"), def.clone()));
        assert!(!single("fecha", text("2024-01-01"), def.clone()));
        assert!(!single("fecha", text("2023-12-31"), def.clone()));
        // time of day is ignored
        assert!(!single("fecha", text("2024-01-01T23:59:59Z"), def));
    }

    #[test]
    fn test_boolean_mapping() {
        let def = PatternDefinition::new("p").with_column("verificado", [true]);
        for cell in [text("true"), text("1"), text("YES"), Cell::Bool(true), Cell::Number(1.0)] {
            assert!(single("verificado", cell, def.clone()));
        }
        for cell in [text("false"), text("0"), text("no"), Cell::Bool(false)] {
            assert!(!single("verificado", cell, def.clone()));
        }
    }

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(&Cell::Number(2.0)), Ok(Some(2.0)));
        assert_eq!(coerce_number(&text("3.5")), Ok(Some(3.5)));
        assert_eq!(coerce_number(&Cell::Null), Ok(None));
        assert_eq!(coerce_number(&text("  ")), Ok(None));
        assert!(coerce_number(&text("abc")).is_err());
        assert!(coerce_number(&text("NaN")).is_err());
    }

    #[test]
    fn test_coerce_date_formats() {
        let expected = Ok(Some(date(2018, 10, 10)));
        assert_eq!(coerce_date(&text("2018-10-10")), expected);
        assert_eq!(coerce_date(&text("2018/10/10")), expected);
        assert_eq!(coerce_date(&text("2018-10-10 20:19:24")), expected);
        assert_eq!(coerce_date(&text("2018-10-10T20:19:24.000Z")), expected);
        assert_eq!(coerce_date(&text("Wed Oct 10 20:19:24 +0000 2018")), expected);
        assert!(coerce_date(&text("10/10/2018")).is_err());
        assert!(coerce_date(&Cell::Number(43000.0)).is_err());
    }

    #[test]
    fn test_coerce_bool() {
        assert_eq!(coerce_bool(&text("Sí")), Ok(Some(true)));
        assert_eq!(coerce_bool(&text("falso")), Ok(Some(false)));
        assert_eq!(coerce_bool(&Cell::Number(0.0)), Ok(Some(false)));
        assert!(coerce_bool(&Cell::Number(2.0)).is_err());
        assert!(coerce_bool(&text("maybe")).is_err());
    }

    #[test]
    fn test_coercion_failure_is_reported() {
        let table = LanguageTable::with_rows(
            "es",
            vec!["Seguidores".into()],
            vec![vec![text("lots")]],
        );
        let compiled = compile(&PatternDefinition::new("p").with_column("seguidores", [">1"]));
        let outcome = evaluate_row(&table.row(0).unwrap(), &compiled).unwrap();

        assert!(!outcome.matched);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].column, "Seguidores");
        assert_eq!(outcome.issues[0].error.kind, FieldKind::Numeric);
    }

    #[test]
    fn test_and_across_columns_or_within() {
        let table = LanguageTable::with_rows(
            "es",
            vec!["texto".into(), "n".into()],
            vec![
                vec![text("rojo"), Cell::Number(5.0)],
                vec![text("azul"), Cell::Number(50.0)],
                vec![text("verde"), Cell::Number(5.0)],
            ],
        );
        let compiled = compile(
            &PatternDefinition::new("p")
                .with_column("texto", ["rojo", "verde"])
                .with_column("n", ["<10"]),
        );
        let results: Vec<bool> = table.rows().map(|r| matches(&r, &compiled)).collect();
        assert_eq!(results, vec![true, false, true]);
    }

    #[test]
    fn test_missing_column_never_matches() {
        let table = LanguageTable::with_rows("en", vec!["texto".into()], vec![vec![text("x")]]);
        let compiled = compile(&PatternDefinition::new("p").with_column("seguidores", [">1"]));
        let row = table.row(0).unwrap();
        assert!(!matches(&row, &compiled));
        assert_eq!(
            evaluate_row(&row, &compiled).unwrap_err(),
            vec!["seguidores".to_string()]
        );
    }

    #[test]
    fn test_bind_reports_table_column_names() {
        let table = LanguageTable::new("es", vec!["Tweet ID".into(), "Texto".into()]);
        let compiled = compile(
            &PatternDefinition::new("p")
                .with_column("tweet_id", ["1"])
                .with_column("texto", ["a"])
                .with_column("TEXTO", ["b"]),
        );
        let bound = bind(&compiled, &table).unwrap();
        assert_eq!(bound.table_columns(), vec!["Tweet ID".to_string(), "Texto".to_string()]);
    }
}
