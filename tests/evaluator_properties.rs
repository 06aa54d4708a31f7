//! Property tests for the row evaluator.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use rowsift::{compile, matches, Cell, LanguageTable, PatternDefinition};

fn single_row(columns: &[&str], cells: Vec<Cell>) -> LanguageTable {
    LanguageTable::with_rows(
        "es",
        columns.iter().map(|c| c.to_string()).collect(),
        vec![cells],
    )
}

fn row_matches(table: &LanguageTable, def: &PatternDefinition) -> bool {
    let compiled = compile(def);
    let row = table.row(0).expect("table has a row");
    matches(&row, &compiled)
}

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date")
}

proptest! {
    #[test]
    fn empty_pattern_matches_any_row(
        cells in prop::collection::vec("[a-zA-Z0-9 ]{0,12}", 1..6usize),
    ) {
        let columns: Vec<String> = (0..cells.len()).map(|i| format!("c{}", i)).collect();
        let table = LanguageTable::with_rows(
            "es",
            columns,
            vec![cells.into_iter().map(Cell::Text).collect()],
        );
        prop_assert!(row_matches(&table, &PatternDefinition::new("todo")));
    }

    #[test]
    fn substring_match_ignores_case(
        prefix in "[a-z ]{0,6}",
        needle in "[a-z]{1,8}",
        suffix in "[a-z ]{0,6}",
    ) {
        let haystack = format!("{}{}{}", prefix, needle.to_uppercase(), suffix);
        let table = single_row(&["texto"], vec![Cell::Text(haystack)]);
        let def = PatternDefinition::new("p").with_column("texto", [needle.to_uppercase()]);
        prop_assert!(row_matches(&table, &def));
    }

    #[test]
    fn numeric_comparisons_are_strict(threshold in 0i64..100_000, value in 0i64..100_000) {
        let table = single_row(&["n"], vec![Cell::Number(value as f64)]);
        let greater = PatternDefinition::new("p").with_column("n", [format!(">{}", threshold)]);
        let less = PatternDefinition::new("p").with_column("n", [format!("<{}", threshold)]);
        let equal = PatternDefinition::new("p").with_column("n", [format!("={}", threshold)]);

        prop_assert_eq!(row_matches(&table, &greater), value > threshold);
        prop_assert_eq!(row_matches(&table, &less), value < threshold);
        prop_assert_eq!(row_matches(&table, &equal), value == threshold);
    }

    #[test]
    fn numeric_text_cells_coerce(value in 0i64..100_000) {
        let table = single_row(&["n"], vec![Cell::Text(format!(" {} ", value))]);
        let def = PatternDefinition::new("p").with_column("n", [format!("={}", value)]);
        prop_assert!(row_matches(&table, &def));
    }

    #[test]
    fn date_comparisons_are_strict(offset in -400i64..400) {
        let cell = base_date() + Duration::days(offset);
        let table = single_row(&["fecha"], vec![Cell::Text(cell.format("%Y-%m-%d").to_string())]);
        let def = PatternDefinition::new("p").with_column("fecha", [">2024-01-01"]);
        prop_assert_eq!(row_matches(&table, &def), offset > 0);
    }

    #[test]
    fn any_listed_word_is_enough(
        words in prop::collection::vec("[a-z]{3,8}", 1..6usize),
        pick in any::<prop::sample::Index>(),
    ) {
        let chosen = pick.get(&words).clone();
        let table = single_row(&["texto"], vec![Cell::Text(format!("dijo {}", chosen))]);
        let def = PatternDefinition::new("p").with_column("texto", words.iter().map(String::as_str));
        prop_assert!(row_matches(&table, &def));
    }

    #[test]
    fn one_failing_column_excludes_row(value in 0i64..1000) {
        let table = single_row(
            &["texto", "n"],
            vec![Cell::Text("hola".into()), Cell::Number(value as f64)],
        );
        let def = PatternDefinition::new("p")
            .with_column("texto", ["hola"])
            .with_column("n", [">1000"]);
        prop_assert!(!row_matches(&table, &def));
    }

    #[test]
    fn truthy_and_falsy_text(truthy in prop::sample::select(vec!["true", "1", "yes", "TRUE", "Yes"]),
                             falsy in prop::sample::select(vec!["false", "0", "no", "NO"])) {
        let def = PatternDefinition::new("p").with_column("verificado", [true]);
        let yes = single_row(&["verificado"], vec![Cell::Text(truthy.to_string())]);
        let no = single_row(&["verificado"], vec![Cell::Text(falsy.to_string())]);
        prop_assert!(row_matches(&yes, &def));
        prop_assert!(!row_matches(&no, &def));
    }
}
