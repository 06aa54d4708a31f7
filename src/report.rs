//! Output formatting for run results.
//!
//! - Pretty: colored terminal output for human readability
//! - JSON: structured output for programmatic consumption

use colored::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::engine::{AnalysisSummary, Warning, WarningKind};
use crate::pattern::{LoadReport, RejectedPattern};
use crate::view::RunResults;

/// Where a run read from and wrote to.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub patterns_dir: String,
    pub data_dir: String,
    pub outputs: Vec<PathBuf>,
    pub dry_run: bool,
}

// =============================================================================
// JSON Format
// =============================================================================

#[derive(Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub patterns_dir: String,
    pub data_dir: String,
    pub dry_run: bool,
    pub summary: AnalysisSummary,
    /// Pattern -> language -> matched table columns.
    pub column_mappings: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    pub warnings: Vec<Warning>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<JsonRejection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct JsonRejection {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub reason: String,
}

fn rejection_to_json(r: &RejectedPattern) -> JsonRejection {
    JsonRejection {
        file: r.file.clone(),
        index: r.index,
        reason: r.error.to_string(),
    }
}

/// Assemble the JSON report of a run.
pub fn build_json(ctx: &RunContext, loaded: &LoadReport, results: &RunResults) -> JsonReport {
    JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        patterns_dir: ctx.patterns_dir.clone(),
        data_dir: ctx.data_dir.clone(),
        dry_run: ctx.dry_run,
        summary: results.summary().clone(),
        column_mappings: results.column_mappings(),
        warnings: results.warnings().into_iter().cloned().collect(),
        rejected: loaded.rejected.iter().map(rejection_to_json).collect(),
        outputs: ctx
            .outputs
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect(),
    }
}

/// Write results in JSON format.
pub fn write_json(ctx: &RunContext, loaded: &LoadReport, results: &RunResults) -> anyhow::Result<()> {
    let report = build_json(ctx, loaded, results);
    let json = serde_json::to_string_pretty(&report)?;
    println!("{}", json);
    Ok(())
}

/// Write a pattern validation report in JSON format.
pub fn write_validation_json(dir: &str, loaded: &LoadReport) -> anyhow::Result<()> {
    #[derive(Serialize)]
    struct ValidationReport<'a> {
        patterns_dir: &'a str,
        files: usize,
        accepted: Vec<&'a str>,
        rejected: Vec<JsonRejection>,
    }

    let report = ValidationReport {
        patterns_dir: dir,
        files: loaded.files,
        accepted: loaded.patterns.keys().map(String::as_str).collect(),
        rejected: loaded.rejected.iter().map(rejection_to_json).collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

fn write_header(ctx: &RunContext) {
    println!();
    print!("  ");
    print!("{}", "rowsift".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", "Patterns: ".dimmed());
    println!("{}", ctx.patterns_dir);
    print!("  {}", "Data:     ".dimmed());
    println!("{}", ctx.data_dir);
    println!();
}

/// Write results in pretty (human-readable) format.
pub fn write_pretty(ctx: &RunContext, loaded: &LoadReport, results: &RunResults) {
    write_header(ctx);

    let summary = results.summary();
    write_totals(summary);
    println!();

    if !loaded.rejected.is_empty() {
        write_rejections(&loaded.rejected);
        println!();
    }

    for (name, pattern) in &summary.patterns {
        println!(
            "  {} {}",
            name.bold(),
            format!("({} matched of {} rows)", pattern.rows_matched, pattern.rows_examined).dimmed()
        );
        for (language, partition) in &pattern.languages {
            print!("    {:<8}", language.blue());
            if partition.status == "skipped" {
                println!("{}", "skipped (missing columns)".yellow());
            } else if partition.rows_matched == 0 {
                println!("{}", "0".dimmed());
            } else {
                println!("{}", partition.rows_matched.to_string().green());
            }
        }
    }
    if !summary.patterns.is_empty() {
        println!();
    }

    let warnings = results.warnings();
    if !warnings.is_empty() {
        write_warnings(&warnings);
        println!();
    }

    if ctx.dry_run {
        println!("  {}", "Dry run: no results written".dimmed());
    } else if ctx.outputs.is_empty() {
        println!("  {}", "No matches to write".dimmed());
    } else {
        println!("  {} ({}):", "Written".bold(), ctx.outputs.len());
        for path in &ctx.outputs {
            println!("    {}", path.display());
        }
    }
    println!();
}

fn write_totals(summary: &AnalysisSummary) {
    if summary.rows_matched > 0 {
        print!("  {}", format!("✓ {} rows matched", summary.rows_matched).green());
    } else {
        print!("  {}", "○ no rows matched".yellow());
    }
    print!(
        "  {}",
        format!(
            "{} patterns × {} languages, {} rows examined",
            summary.total_patterns, summary.total_languages, summary.rows_examined
        )
        .dimmed()
    );
    if summary.skipped_pairs > 0 {
        print!("  {}", format!("({} skipped)", summary.skipped_pairs).yellow());
    }
    println!();
}

fn write_kind_tag(kind: WarningKind) {
    match kind {
        WarningKind::SchemaMismatch => print!("    {} ", "SCHEMA  ".yellow()),
        WarningKind::Coercion => print!("    {} ", "COERCE  ".blue()),
        WarningKind::MalformedPatternValue => print!("    {} ", "PATTERN ".red()),
        WarningKind::EmptyFieldRule => print!("    {} ", "EMPTY   ".yellow()),
    }
}

/// Coercion warnings beyond this count are summarized.
const MAX_LISTED_WARNINGS: usize = 20;

fn write_warnings(warnings: &[&Warning]) {
    println!("  {} ({}):", "Warnings".bold(), warnings.len());
    for w in warnings.iter().take(MAX_LISTED_WARNINGS) {
        write_kind_tag(w.kind);
        print!("{}", w.pattern.dimmed());
        if let Some(language) = &w.language {
            print!("{}", format!("/{}", language).dimmed());
        }
        if let Some(column) = &w.column {
            print!("  {}", column.blue());
        }
        if let Some(row) = w.row {
            print!("{}", format!(" row {}", row).dimmed());
        }
        println!();
        println!("             {}", w.message);
    }
    if warnings.len() > MAX_LISTED_WARNINGS {
        println!(
            "    {}",
            format!("... and {} more", warnings.len() - MAX_LISTED_WARNINGS).dimmed()
        );
    }
}

fn write_rejections(rejected: &[RejectedPattern]) {
    println!("  {} ({}):", "Rejected patterns".bold(), rejected.len());
    for r in rejected {
        print!("    {} ", "ERROR".red());
        print!("{}", r.file.blue());
        if let Some(index) = r.index {
            print!("{}", format!("[{}]", index).dimmed());
        }
        println!();
        println!("            {}", r.error);
    }
}

/// Write a pattern validation report.
pub fn write_validation_pretty(dir: &str, loaded: &LoadReport) {
    println!();
    print!("  {}", "Patterns: ".dimmed());
    println!("{}", dir);
    println!();

    for name in loaded.patterns.keys() {
        println!("    {} {}", "OK   ".green(), name);
    }
    if !loaded.patterns.is_empty() {
        println!();
    }
    if !loaded.rejected.is_empty() {
        write_rejections(&loaded.rejected);
        println!();
    }

    let status = format!(
        "{} files, {} accepted, {} rejected",
        loaded.files,
        loaded.accepted(),
        loaded.rejected.len()
    );
    if loaded.has_rejections() {
        println!("  {}  {}", "✗ FAIL".red(), status);
    } else {
        println!("  {}  {}", "✓ PASS".green(), status);
    }
    println!();
}
