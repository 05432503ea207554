//! `provisio plan`: probe every step and show what apply would change

use anyhow::{Context as AnyhowContext, Result};
use cmdkit::SystemRunner;
use declarative::{ApplyContext, compute_changes};
use std::fs;

use crate::Context;
use crate::cli::RunArgs;
use crate::engine;
use crate::sudo::{Privilege, SudoContext};
use crate::ui;

pub fn run(ctx: &Context, args: RunArgs) -> Result<i32> {
    let interactive = super::is_interactive(&args);
    let prepared = super::prepare(&args, interactive)?;

    let privilege = Privilege::detect();
    let _sudo = SudoContext::acquire(privilege, "Inspect this server")?;
    let runner = SystemRunner::new().with_sudo(privilege.uses_sudo());
    let secrets = prepared.config.secrets();
    let probe_ctx = ApplyContext::new(&runner).with_redactor(&secrets);

    let changes = compute_changes(&prepared.graph, &probe_ctx);
    engine::display_changes(&changes);

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&changes).context("Failed to serialize plan")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Plan written to {}", path.display());
    }

    if !changes.is_empty() && !ctx.quiet {
        println!();
        ui::hint("Run 'provisio apply' to make these changes");
    }

    Ok(0)
}
