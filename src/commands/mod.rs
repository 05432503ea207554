//! Command implementations
//!
//! `apply` and `plan` share the same front half: collect answers, resolve
//! them into a [`RunConfig`], read host facts, and build the step graph.
//! Nothing on the host is touched until that has succeeded.

pub mod apply;
pub mod plan;

use anyhow::Result;
use declarative::StepGraph;
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::cli::{ENV_DB_PASSWORD, RunArgs};
use crate::config;
use crate::host::{self, HostFacts};
use crate::paths;
use crate::resolver::{self, Answers, NoPrompt, TerminalPrompter};
use crate::run_config::RunConfig;

/// A validated run, ready to probe or apply
pub struct Prepared {
    pub config: RunConfig,
    pub graph: StepGraph,
}

/// Prompting is allowed only with a terminal on both ends
pub fn is_interactive(args: &RunArgs) -> bool {
    !args.non_interactive && std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

pub fn prepare(args: &RunArgs, interactive: bool) -> Result<Prepared> {
    let answers = collect_answers(args)?;

    let config = if interactive {
        resolver::resolve(&answers, &mut TerminalPrompter)?
    } else {
        resolver::resolve(&answers, &mut NoPrompt)?
    };
    log::info!(
        "Resolved {} feature(s) for user {}",
        config.features.len(),
        config.username
    );

    let host = host::detect()?;
    ensure_supported(&host)?;

    let graph = crate::plan::build(&config, &host)?;
    log::debug!("Built plan with {} steps", graph.len());

    Ok(Prepared { config, graph })
}

/// Flags and environment first, then the answers file
fn collect_answers(args: &RunArgs) -> Result<Answers> {
    let password = std::env::var(ENV_DB_PASSWORD).ok();
    let answers = args.params.clone().into_answers(password);

    match answers_file(args) {
        Some(path) => {
            log::info!("Reading answers from {}", path.display());
            Ok(answers.or(config::load_answers(&path)?))
        }
        None => Ok(answers),
    }
}

/// `--answers`, or the default file if it exists
fn answers_file(args: &RunArgs) -> Option<PathBuf> {
    match &args.answers {
        Some(path) => Some(paths::expand(&path.to_string_lossy())),
        None => paths::default_answers_file().ok().filter(|p| p.exists()),
    }
}

fn ensure_supported(host: &HostFacts) -> Result<()> {
    if host.is_ubuntu() {
        return Ok(());
    }
    let id = if host.id.is_empty() { "unknown" } else { &host.id };
    Err(declarative::Error::Validation {
        problems: vec![format!(
            "unsupported distribution '{id}'; provisio only provisions Ubuntu"
        )],
    }
    .into())
}
