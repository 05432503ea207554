mod cli;
mod commands;
mod config;
mod engine;
mod host;
mod interrupt;
mod paths;
mod plan;
mod progress;
mod report;
mod resolver;
mod resource;
mod run_config;
mod schema;
mod secret;
mod sudo;
#[cfg(test)]
mod testing;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Exit code when parameters fail validation
const EXIT_VALIDATION: i32 = 2;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    interrupt::install();

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => exit_code_for(&err),
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        None => commands::apply::run(&ctx, cli.run),
        Some(Command::Apply(args)) => commands::apply::run(&ctx, args),
        Some(Command::Plan(args)) => commands::plan::run(&ctx, args),
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "provisio", &mut io::stdout());
            Ok(0)
        }
    }
}

/// Print a top-level error and pick the exit code
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(declarative::Error::Validation { problems }) = err.downcast_ref() {
        ui::verdict(ui::Tone::Bad, "Invalid parameters; nothing was changed");
        for problem in problems {
            eprintln!("    • {problem}");
        }
        return EXIT_VALIDATION;
    }

    ui::verdict(ui::Tone::Bad, &format!("{err:#}"));
    1
}
