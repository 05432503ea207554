//! `provisio apply`: converge the host and report

use anyhow::Result;

use crate::Context;
use crate::cli::RunArgs;
use crate::engine::{self, ExecuteOptions};
use crate::report;

pub fn run(ctx: &Context, args: RunArgs) -> Result<i32> {
    let interactive = super::is_interactive(&args);
    let prepared = super::prepare(&args, interactive)?;

    let opts = ExecuteOptions {
        yes: args.yes,
        interactive,
        verbose: ctx.verbose > 0,
    };
    let Some(report) = engine::execute(&prepared.graph, &prepared.config, &opts)? else {
        return Ok(0);
    };

    report::print(&report);
    if let Some(path) = &args.report {
        report::write_json(&report, path)?;
    }

    Ok(report.exit_code())
}
