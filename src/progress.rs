//! Terminal progress for a running step graph

use colored::Colorize;
use declarative::{Action, Outcome, ProgressCallback, RunSummary, StepResult};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// One bar for the whole run, with a line per step that changed something
pub struct StepProgress {
    bar: ProgressBar,
    verbose: bool,
}

impl StepProgress {
    pub fn new(verbose: bool) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            verbose,
        }
    }
}

impl ProgressCallback for StepProgress {
    fn on_run_start(&mut self, total: usize) {
        self.bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            self.bar.set_style(style.progress_chars("=>-"));
        }
    }

    fn on_step_start(&mut self, _index: usize, action: &Action) {
        self.bar.set_message(action.resource().description());
    }

    fn on_step_complete(&mut self, _index: usize, result: &StepResult) {
        let line = match &result.outcome {
            Outcome::Applied => Some(format!("  {} {}", "✓".green(), result.action)),
            Outcome::Failed { reason, .. } => {
                Some(format!("  {} {}: {}", "✗".red(), result.action, reason))
            }
            Outcome::Skipped { reason } if self.verbose => Some(format!(
                "  {} {} ({reason})",
                "○".dimmed(),
                result.action
            )),
            Outcome::Skipped { .. } => None,
        };
        if let Some(line) = line {
            self.bar.suspend(|| eprintln!("{line}"));
        }
        self.bar.inc(1);
    }

    fn on_run_complete(&mut self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}
