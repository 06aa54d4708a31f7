//! Command-line interface for rowsift.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::config::{self, Config, DEFAULT_CONFIG_NAMES};
use crate::engine::Analyzer;
use crate::logging;
use crate::pattern::{LoadReport, PatternDirSource, PatternSource};
use crate::report::{self, RunContext};
use crate::sink::JsonLinesSink;
use crate::source::{DataSource, JsonWorkbookSource};
use crate::view::{self, RunResults};

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Filter language-partitioned tables with column patterns.
///
/// Rowsift evaluates every pattern against every language table, keeps the
/// rows where each pattern column has at least one satisfied condition, and
/// writes the matches as JSON-lines files.
#[derive(Parser)]
#[command(name = "rowsift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every pattern against every language table
    Run(RunArgs),
    /// Check pattern files without running them
    Validate(ValidateArgs),
    /// Create a new pattern file from a template
    Init(InitArgs),
}

/// Arguments for the run command.
#[derive(Parser)]
pub struct RunArgs {
    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding pattern files
    #[arg(short, long)]
    pub patterns: Option<PathBuf>,

    /// Directory holding data workbooks
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Directory results are written under
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Evaluate partitions on the current thread
    #[arg(long)]
    pub sequential: bool,

    /// Run without writing results
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the validate command.
#[derive(Parser)]
pub struct ValidateArgs {
    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding pattern files
    #[arg(short, long)]
    pub patterns: Option<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "data/patterns/pattern.json")]
    pub output: PathBuf,

    /// Template to use
    #[arg(short, long, default_value = "minimal")]
    pub template: String,

    /// List available templates
    #[arg(short, long)]
    pub list: bool,
}

/// Available pattern templates.
struct Template {
    name: &'static str,
    description: &'static str,
    content: &'static str,
}

static TEMPLATES: &[Template] = &[
    Template {
        name: "minimal",
        description: "One text column with one keyword",
        content: include_str!("templates/minimal.json"),
    },
    Template {
        name: "high-followers",
        description: "Verified accounts with more than 1000 followers",
        content: include_str!("templates/high-followers.json"),
    },
    Template {
        name: "date-window",
        description: "Keyword mentions posted after a date",
        content: include_str!("templates/date-window.json"),
    },
];

fn check_format(format: &str) -> bool {
    if format != "pretty" && format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            format
        );
        return false;
    }
    true
}

/// Load and validate the config, reporting failures on stderr.
fn load_config(path: Option<&Path>) -> Option<(Config, Option<PathBuf>)> {
    let (config, found) = match Config::load(path, Path::new(".")) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return None;
        }
    };
    if let Err(e) = config::validate(&config) {
        eprintln!("Error: invalid config: {}", e);
        return None;
    }
    Some((config, found))
}

fn log_config_source(found: Option<&Path>) {
    match found {
        Some(p) => info!(config = %p.display(), "using config"),
        None => info!(
            "no config file found (looked for {}), using defaults",
            DEFAULT_CONFIG_NAMES.join(", ")
        ),
    }
}

fn spinner(enabled: bool) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// Everything a run produced.
pub struct RunOutcome {
    pub loaded: LoadReport,
    pub results: RunResults,
    pub outputs: Vec<PathBuf>,
}

/// Load patterns and tables, evaluate, and write matches.
///
/// Nothing is written when `dry_run` is set.
pub fn execute(
    config: &Config,
    dry_run: bool,
    progress: Option<&ProgressBar>,
) -> anyhow::Result<RunOutcome> {
    let step = |msg: &str| {
        if let Some(pb) = progress {
            pb.set_message(msg.to_string());
        }
    };

    step("Loading patterns...");
    let loaded = PatternDirSource::new(&config.patterns_dir)
        .exclude(&config.excluded_patterns)?
        .load()?;

    step("Loading tables...");
    let tables = JsonWorkbookSource::new(&config.data_dir)
        .languages(&config.languages)
        .load()?;

    step("Matching rows...");
    let results = Analyzer::new()
        .parallel(config.parallel)
        .run(&tables, &loaded.patterns)?;

    let outputs = if dry_run {
        Vec::new()
    } else {
        step("Writing results...");
        let mut sink = JsonLinesSink::new(&config.output_dir);
        view::deliver(
            &results,
            &mut sink,
            config.output_columns,
            &view::run_timestamp(),
        )?
    };

    Ok(RunOutcome {
        loaded,
        results,
        outputs,
    })
}

/// Run the run command.
pub fn run_run(args: &RunArgs, log_json: bool) -> anyhow::Result<i32> {
    if !check_format(&args.format) {
        return Ok(EXIT_ERROR);
    }

    let (mut config, found) = match load_config(args.config.as_deref()) {
        Some(loaded) => loaded,
        None => return Ok(EXIT_ERROR),
    };
    logging::init(&config.log_level, log_json);
    log_config_source(found.as_deref());

    if let Some(p) = &args.patterns {
        config.patterns_dir = p.clone();
    }
    if let Some(d) = &args.data {
        config.data_dir = d.clone();
    }
    if let Some(o) = &args.output {
        config.output_dir = o.clone();
    }
    if args.sequential {
        config.parallel = false;
    }

    let pb = spinner(args.format == "pretty");
    let outcome = execute(&config, args.dry_run, pb.as_ref());
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }
    let outcome = match outcome {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let ctx = RunContext {
        patterns_dir: config.patterns_dir.to_string_lossy().to_string(),
        data_dir: config.data_dir.to_string_lossy().to_string(),
        outputs: outcome.outputs,
        dry_run: args.dry_run,
    };
    match args.format.as_str() {
        "json" => report::write_json(&ctx, &outcome.loaded, &outcome.results)?,
        _ => report::write_pretty(&ctx, &outcome.loaded, &outcome.results),
    }

    Ok(EXIT_SUCCESS)
}

/// Run the validate command.
pub fn run_validate(args: &ValidateArgs, log_json: bool) -> anyhow::Result<i32> {
    if !check_format(&args.format) {
        return Ok(EXIT_ERROR);
    }

    let (config, found) = match load_config(args.config.as_deref()) {
        Some(loaded) => loaded,
        None => return Ok(EXIT_ERROR),
    };
    logging::init(&config.log_level, log_json);
    log_config_source(found.as_deref());

    let dir = args
        .patterns
        .clone()
        .unwrap_or_else(|| config.patterns_dir.clone());
    let loaded = match PatternDirSource::new(&dir)
        .exclude(&config.excluded_patterns)
        .and_then(|source| source.load())
    {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let dir_str = dir.to_string_lossy().to_string();
    match args.format.as_str() {
        "json" => report::write_validation_json(&dir_str, &loaded)?,
        _ => report::write_validation_pretty(&dir_str, &loaded),
    }

    if loaded.has_rejections() {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    if args.list {
        return list_templates();
    }

    let template = match TEMPLATES.iter().find(|t| t.name == args.template) {
        Some(t) => t,
        None => {
            eprintln!("Error: unknown template {:?}", args.template);
            eprintln!("Run 'rowsift init --list' to see available templates");
            return Ok(EXIT_ERROR);
        }
    };

    if args.output.exists() {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Remove it or use --output to specify a different path");
        return Ok(EXIT_ERROR);
    }

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error: failed to create directory: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    if let Err(e) = std::fs::write(&args.output, template.content) {
        eprintln!("Error: failed to write pattern: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {} from template '{}'", args.output.display(), template.name);
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to name your columns and values", args.output.display());
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        println!("  2. Run: rowsift validate --patterns {}", parent.display());
    } else {
        println!("  2. Run: rowsift validate --patterns .");
    }

    Ok(EXIT_SUCCESS)
}

fn list_templates() -> anyhow::Result<i32> {
    println!("Available templates:");
    println!();

    for template in TEMPLATES {
        let name = if template.name == "minimal" {
            format!("{} (default)", template.name)
        } else {
            template.name.to_string()
        };
        println!("  {:<20} {}", name, template.description);
    }

    println!();
    println!("Usage:");
    println!("  rowsift init --template <name>");

    Ok(EXIT_SUCCESS)
}
