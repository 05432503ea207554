//! Execution engine - provisio's executor with UI integration

use anyhow::{Result, bail};
use chrono::Utc;
use cmdkit::SystemRunner;
use colored::Colorize;
use declarative::{ApplyContext, StepGraph, compute_changes};

use crate::interrupt;
use crate::progress::StepProgress;
use crate::report::{self, Report};
use crate::resource::PUBLIC_IP_FACT;
use crate::run_config::RunConfig;
use crate::sudo::{Privilege, SudoContext};

use super::differ::display_changes;

/// Options for execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Skip the confirmation prompt
    pub yes: bool,
    /// A terminal is attached and prompting is allowed
    pub interactive: bool,
    /// Verbose output
    pub verbose: bool,
}

/// Probe, show, confirm, then converge the host
///
/// Returns `None` when the operator declines.
pub fn execute(graph: &StepGraph, config: &RunConfig, opts: &ExecuteOptions) -> Result<Option<Report>> {
    let privilege = Privilege::detect();
    let _sudo = SudoContext::acquire(privilege, "Inspect and provision this server")?;

    let runner = SystemRunner::new().with_sudo(privilege.uses_sudo());
    let secrets = config.secrets();
    let mut ctx = ApplyContext::new(&runner)
        .with_redactor(&secrets)
        .with_interrupt(interrupt::flag());

    // 1. Probe every step and show what will change
    let changes = compute_changes(graph, &ctx);
    display_changes(&changes);

    // 2. Confirm (unless --yes)
    if !opts.yes {
        if !opts.interactive {
            bail!("Refusing to change the host without confirmation; pass --yes for unattended runs");
        }
        if !confirm_proceed()? {
            println!();
            println!("  {} Aborted", "✗".red());
            return Ok(None);
        }
    }

    // 3. Converge
    println!();
    println!("  {} Applying {} steps...", "→".cyan(), graph.len());
    Ok(Some(converge(graph, config, &mut ctx, opts.verbose)))
}

/// Run every step and build the report
fn converge(
    graph: &StepGraph,
    config: &RunConfig,
    ctx: &mut ApplyContext,
    verbose: bool,
) -> Report {
    let started_at = Utc::now();
    let mut progress = StepProgress::new(verbose);
    let outcome = graph.run(ctx, &mut progress);

    let public_ip = ctx.fact(PUBLIC_IP_FACT).map(String::from);
    report::summarize(&outcome, config, public_ip.as_deref(), started_at)
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Apply these changes?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}
