//! Scenario tests for the matching engine over in-memory tables.

use std::collections::BTreeMap;

use rowsift::engine::PartitionStatus;
use rowsift::{Analyzer, Cell, LanguageTable, PatternDefinition, WarningKind};

fn text(s: &str) -> Cell {
    Cell::Text(s.to_string())
}

fn patterns(defs: Vec<PatternDefinition>) -> BTreeMap<String, PatternDefinition> {
    defs.into_iter().map(|d| (d.name.clone(), d)).collect()
}

fn high_followers() -> PatternDefinition {
    PatternDefinition::new("HighFollowers")
        .with_column("seguidores", [">1000"])
        .with_column("verificado", [true])
}

/// `es` has follower counts; `en` lacks the `seguidores` column.
fn tables() -> BTreeMap<String, LanguageTable> {
    let mut tables = BTreeMap::new();
    tables.insert(
        "es".to_string(),
        LanguageTable::with_rows(
            "es",
            vec!["seguidores".into(), "verificado".into()],
            vec![
                vec![Cell::Number(1500.0), Cell::Bool(true)],
                vec![Cell::Number(500.0), Cell::Bool(true)],
                vec![Cell::Number(2000.0), Cell::Bool(false)],
            ],
        ),
    );
    tables.insert(
        "en".to_string(),
        LanguageTable::with_rows(
            "en",
            vec!["texto".into(), "verificado".into()],
            vec![vec![text("hello"), Cell::Bool(true)]],
        ),
    );
    tables
}

#[test]
fn test_high_followers_scenario() {
    let results = Analyzer::new()
        .run(&tables(), &patterns(vec![high_followers()]))
        .expect("run should succeed");

    let es = results.record("HighFollowers", "es").expect("es record");
    assert_eq!(es.status, PartitionStatus::Evaluated);
    assert_eq!(es.positions(), vec![0]);
    assert_eq!(
        es.rows[0].cells,
        vec![Cell::Number(1500.0), Cell::Bool(true)]
    );
    assert_eq!(
        es.columns,
        vec!["seguidores".to_string(), "verificado".to_string()]
    );
}

#[test]
fn test_missing_column_isolation() {
    let results = Analyzer::new()
        .run(&tables(), &patterns(vec![high_followers()]))
        .unwrap();

    let en = results.record("HighFollowers", "en").unwrap();
    assert!(en.is_empty());
    assert!(en.status.is_skipped());
    assert_eq!(en.warnings.len(), 1);
    assert_eq!(en.warnings[0].kind, WarningKind::SchemaMismatch);
    assert_eq!(en.warnings[0].language.as_deref(), Some("en"));

    let es = results.record("HighFollowers", "es").unwrap();
    assert!(es.warnings.is_empty());
    assert_eq!(es.len(), 1);

    let summary = results.summary();
    assert_eq!(summary.skipped_pairs, 1);
    assert_eq!(summary.matched("HighFollowers", "en"), Some(0));
    assert_eq!(
        summary.patterns["HighFollowers"].languages["en"].status,
        "skipped"
    );
    assert_eq!(
        summary.patterns["HighFollowers"].languages["es"].status,
        "evaluated"
    );
}

#[test]
fn test_zero_matches_is_not_a_skip() {
    let def = PatternDefinition::new("Nadie").with_column("verificado", ["=5"]);
    let results = Analyzer::new().run(&tables(), &patterns(vec![def])).unwrap();

    let es = results.record("Nadie", "es").unwrap();
    assert!(es.is_empty());
    assert!(!es.status.is_skipped());
    assert_eq!(results.summary().skipped_pairs, 0);
}

#[test]
fn test_row_order_preserved() {
    let mut tables = BTreeMap::new();
    tables.insert(
        "es".to_string(),
        LanguageTable::with_rows(
            "es",
            vec!["texto".into()],
            vec![vec![text("hola uno")], vec![text("adios")], vec![text("HOLA dos")]],
        ),
    );
    let def = PatternDefinition::new("saludo").with_column("texto", ["hola"]);

    for parallel in [true, false] {
        let results = Analyzer::new()
            .parallel(parallel)
            .run(&tables, &patterns(vec![def.clone()]))
            .unwrap();
        let record = results.record("saludo", "es").unwrap();
        assert_eq!(record.positions(), vec![0, 2]);
        assert_eq!(record.rows[0].cells, vec![text("hola uno")]);
        assert_eq!(record.rows[1].cells, vec![text("HOLA dos")]);
    }
}

#[test]
fn test_and_across_or_within() {
    let mut tables = BTreeMap::new();
    tables.insert(
        "es".to_string(),
        LanguageTable::with_rows(
            "es",
            vec!["texto".into(), "seguidores".into()],
            vec![
                vec![text("hola"), Cell::Number(10.0)],
                vec![text("buenas"), Cell::Number(10.0)],
                vec![text("hola"), Cell::Number(99.0)],
                vec![text("chao"), Cell::Number(10.0)],
            ],
        ),
    );
    let def = PatternDefinition::new("p")
        .with_column("texto", ["hola", "buenas"])
        .with_column("seguidores", ["<50"]);

    let results = Analyzer::new().run(&tables, &patterns(vec![def])).unwrap();
    assert_eq!(results.record("p", "es").unwrap().positions(), vec![0, 1]);
}

#[test]
fn test_empty_pattern_matches_everything() {
    let results = Analyzer::new()
        .run(&tables(), &patterns(vec![PatternDefinition::new("todo")]))
        .unwrap();

    assert_eq!(results.record("todo", "es").unwrap().positions(), vec![0, 1, 2]);
    assert_eq!(results.record("todo", "en").unwrap().positions(), vec![0]);
    assert!(results.warnings().is_empty());
}

#[test]
fn test_coercion_failures_do_not_abort() {
    let mut tables = BTreeMap::new();
    tables.insert(
        "es".to_string(),
        LanguageTable::with_rows(
            "es",
            vec!["seguidores".into()],
            vec![
                vec![text("muchos")],
                vec![Cell::Number(5000.0)],
                vec![Cell::Null],
            ],
        ),
    );
    let def = PatternDefinition::new("p").with_column("seguidores", [">1000"]);
    let results = Analyzer::new().run(&tables, &patterns(vec![def])).unwrap();

    let record = results.record("p", "es").unwrap();
    assert_eq!(record.positions(), vec![1]);
    assert_eq!(record.warnings.len(), 1);
    assert_eq!(record.warnings[0].kind, WarningKind::Coercion);
    assert_eq!(record.warnings[0].row, Some(0));
    assert_eq!(record.warnings[0].column.as_deref(), Some("seguidores"));
}

#[test]
fn test_idempotent_and_parallel_equivalent() {
    let defs = patterns(vec![
        high_followers(),
        PatternDefinition::new("verificados").with_column("verificado", [true]),
        PatternDefinition::new("todo"),
    ]);
    let tables = tables();

    let first = Analyzer::new().run(&tables, &defs).unwrap();
    let second = Analyzer::new().run(&tables, &defs).unwrap();
    let sequential = Analyzer::new().parallel(false).run(&tables, &defs).unwrap();

    assert_eq!(first.records(None), second.records(None));
    assert_eq!(first.summary(), second.summary());
    assert_eq!(first.records(None), sequential.records(None));
    assert_eq!(first.summary(), sequential.summary());
}

#[test]
fn test_column_names_are_normalized() {
    let mut tables = BTreeMap::new();
    tables.insert(
        "es".to_string(),
        LanguageTable::with_rows(
            "es",
            vec!["Tweet ID".into(), "Usuario  Nombre".into()],
            vec![vec![Cell::Number(7.0), text("Ana")]],
        ),
    );
    let def = PatternDefinition::new("p")
        .with_column("tweet_id", ["=7"])
        .with_column("usuario_nombre", ["ana"]);

    let results = Analyzer::new().run(&tables, &patterns(vec![def])).unwrap();
    let record = results.record("p", "es").unwrap();
    assert_eq!(record.positions(), vec![0]);
    assert_eq!(
        record.columns,
        vec!["Tweet ID".to_string(), "Usuario  Nombre".to_string()]
    );
}
