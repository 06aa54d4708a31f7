//! Rowsift CLI entry point.

use clap::Parser;
use rowsift::cli::{self, Cli, Commands, EXIT_ERROR};

fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Run(args) => cli::run_run(args, cli.log_json),
        Commands::Validate(args) => cli::run_validate(args, cli.log_json),
        Commands::Init(args) => cli::run_init(args),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    };

    std::process::exit(exit_code);
}
