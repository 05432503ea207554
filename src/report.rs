//! Final run report: counts, failures, the audit trail, and what to do next

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use declarative::{
    ErrorKind, FailurePolicy, Halt, Outcome, RunOutcome, RunSummary, SkipReason, StepResult,
};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::plan;
use crate::resource::PUBLIC_IP_FACT;
use crate::run_config::RunConfig;
use crate::schema::Feature;
use crate::ui::{self, Tone};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    /// Finished, but soft steps failed
    Degraded,
    Failed,
    Interrupted,
}

#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub action: String,
    pub kind: ErrorKind,
    pub reason: String,
    pub policy: FailurePolicy,
}

/// Everything the operator needs after a run
///
/// Failure reasons and details were redacted when each step result was
/// recorded; the parameter view omits the database password.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub summary: RunSummary,
    pub failures: Vec<Failure>,
    pub steps: Vec<StepResult>,
    pub parameters: RunConfig,
    pub public_ip: Option<String>,
    pub next_steps: Vec<String>,
}

impl Report {
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Succeeded | RunStatus::Degraded => 0,
            RunStatus::Failed => 1,
            RunStatus::Interrupted => 130,
        }
    }
}

/// Build the report for a finished run
pub fn summarize(
    outcome: &RunOutcome,
    config: &RunConfig,
    public_ip: Option<&str>,
    started_at: DateTime<Utc>,
) -> Report {
    let summary = outcome.summary();
    let failures: Vec<Failure> = outcome
        .results
        .iter()
        .filter_map(|r| match &r.outcome {
            Outcome::Failed { kind, reason } => Some(Failure {
                action: r.action.clone(),
                kind: *kind,
                reason: reason.clone(),
                policy: r.policy,
            }),
            _ => None,
        })
        .collect();

    let status = match &outcome.halt {
        Some(Halt::Fatal { .. }) => RunStatus::Failed,
        Some(Halt::Interrupted { .. }) => RunStatus::Interrupted,
        None if failures.is_empty() => RunStatus::Succeeded,
        None => RunStatus::Degraded,
    };

    Report {
        started_at,
        finished_at: Utc::now(),
        status,
        summary,
        next_steps: next_steps(outcome, config, public_ip, &failures),
        failures,
        steps: outcome.results.clone(),
        parameters: config.clone(),
        public_ip: public_ip.map(String::from),
    }
}

fn succeeded(outcome: &RunOutcome, action: &str) -> bool {
    outcome
        .result(action)
        .is_some_and(|r| r.outcome.is_success())
}

/// Follow-up instructions in a fixed order
fn next_steps(
    outcome: &RunOutcome,
    config: &RunConfig,
    public_ip: Option<&str>,
    failures: &[Failure],
) -> Vec<String> {
    let mut steps = Vec::new();

    if let Some(Halt::Fatal { action }) = &outcome.halt {
        steps.push(format!(
            "Fix the failure in '{action}' and run provisio again; completed steps will be skipped"
        ));
    }
    let soft: Vec<&str> = failures
        .iter()
        .filter(|f| f.policy == FailurePolicy::Soft)
        .map(|f| f.action.as_str())
        .collect();
    if !soft.is_empty() {
        steps.push(format!(
            "Optional steps failed ({}); run provisio again to retry them",
            soft.join(", ")
        ));
    }

    if let Some(ssh) = &config.ssh {
        if succeeded(outcome, plan::SSHD_RESTART) {
            let host = public_ip.unwrap_or("<server-ip>");
            steps.push(format!(
                "Open a new terminal and reconnect with: ssh -p {} {}@{host}",
                ssh.port, config.username
            ));
        }
    }

    if succeeded(outcome, plan::SUDO_USER) {
        steps.push(format!(
            "Set a password with 'sudo passwd {0}' and confirm 'sudo -v' works as {0} before closing this session",
            config.username
        ));
    }

    if config.has(Feature::Composer) && succeeded(outcome, plan::COMPOSER_PATH) {
        steps.push("Run 'source ~/.bashrc' or log in again to put Composer's bin directory on PATH".into());
    }

    if let Some(db) = &config.db {
        if config.has(Feature::Postgres) && succeeded(outcome, plan::POSTGRES_DATABASE) {
            steps.push(format!(
                "Connect to PostgreSQL with: psql -h localhost -U {} {}",
                db.user, db.name
            ));
        }
        if config.has(Feature::Mysql) && succeeded(outcome, plan::MYSQL_USER) {
            steps.push(format!("Connect to MySQL with: mysql -u {} -p {}", db.user, db.name));
        }
    }

    if let Some(tls) = &config.tls {
        if succeeded(outcome, plan::CERTIFICATE) {
            steps.push(format!("HTTPS is live at https://{}", tls.domain));
        } else if outcome.result(plan::CERTIFICATE).is_some_and(|r| r.outcome.is_failure()) {
            steps.push(format!(
                "Point the DNS record for {} at this server, then run provisio again to issue the certificate",
                tls.domain
            ));
        }
    }

    if let Some(Halt::Interrupted { before }) = &outcome.halt {
        steps.push(format!(
            "The run was interrupted before '{before}'; run provisio again to finish"
        ));
    }

    steps
}

/// Print the report to the terminal
pub fn print(report: &Report) {
    ui::title("Provisioning report");

    for step in &report.steps {
        let (symbol, note) = match &step.outcome {
            Outcome::Applied => ("✓".green(), "applied".to_string()),
            Outcome::Skipped {
                reason: SkipReason::AlreadySatisfied,
            } => ("○".dimmed(), "already satisfied".to_string()),
            Outcome::Skipped { reason } => ("⊘".yellow(), reason.to_string()),
            Outcome::Failed { kind, reason } => ("✗".red(), format!("{kind}: {reason}")),
        };
        let detail = step
            .detail
            .as_deref()
            .map(|d| format!(" ({d})"))
            .unwrap_or_default();
        println!("  {symbol} {:<20} {}{}", step.action, note, detail.dimmed());
    }

    let s = &report.summary;
    println!();
    match report.status {
        RunStatus::Succeeded => ui::verdict(Tone::Good, "Provisioning complete"),
        RunStatus::Degraded => {
            ui::verdict(Tone::Caution, "Provisioning complete with optional failures")
        }
        RunStatus::Failed => ui::verdict(Tone::Bad, "Provisioning halted"),
        RunStatus::Interrupted => ui::verdict(Tone::Caution, "Provisioning interrupted"),
    }
    ui::tally("applied", s.applied);
    ui::tally("skipped", s.skipped - s.not_attempted);
    ui::tally("failed", s.failed);
    if s.not_attempted > 0 {
        ui::tally("not attempted", s.not_attempted);
    }

    if !report.next_steps.is_empty() {
        ui::subtitle("Next steps");
        for (i, step) in report.next_steps.iter().enumerate() {
            println!("  {}. {step}", i + 1);
        }
    }
}

/// Write the report as pretty JSON
pub fn write_json(report: &Report, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("Report written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{Answers, NoPrompt, resolve};
    use crate::schema::Param;
    use crate::testing::FakeHost;
    use declarative::{Action, ApplyContext, NoProgress, StepGraph};

    const PASSWORD: &str = "hunter2-Zq9";

    fn db_config() -> RunConfig {
        let mut answers = Answers::default();
        answers.features = Some([Feature::Ssh, Feature::Postgres].into());
        answers.set(Param::Username, "deploy");
        answers.set(Param::KeysFrom, "/root/.ssh/authorized_keys");
        answers.set(Param::DbUser, "app");
        answers.set(Param::DbPassword, PASSWORD);
        answers.set(Param::DbName, "appdb");
        resolve(&answers, &mut NoPrompt).unwrap()
    }

    fn run(config: &RunConfig, host: &FakeHost) -> RunOutcome {
        let graph = plan::build(config, &crate::host::HostFacts::default()).unwrap();
        let secrets = config.secrets();
        let mut ctx = ApplyContext::new(host).with_redactor(&secrets);
        graph.run(&mut ctx, &mut NoProgress)
    }

    #[test]
    fn test_report_never_contains_password() {
        let config = db_config();
        let host = FakeHost::ubuntu().failing(
            "psql -v ON_ERROR_STOP=1",
            1,
            &format!("ERROR: password \"{PASSWORD}\" rejected by policy"),
        );

        let outcome = run(&config, &host);
        let report = summarize(&outcome, &config, None, Utc::now());
        let json = serde_json::to_string(&report).unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert!(json.contains("postgres-role"));
        assert!(!json.contains(PASSWORD));
        assert!(!json.contains("db_password"));
        assert!(json.contains("\"user\":\"app\""));
    }

    #[test]
    fn test_next_steps_after_success() {
        let config = db_config();
        let host = FakeHost::ubuntu();

        let outcome = run(&config, &host);
        let report = summarize(&outcome, &config, Some("203.0.113.7"), Utc::now());

        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(
            report.next_steps,
            vec![
                "Open a new terminal and reconnect with: ssh -p 2222 deploy@203.0.113.7".to_string(),
                "Set a password with 'sudo passwd deploy' and confirm 'sudo -v' works as deploy before closing this session".to_string(),
                "Connect to PostgreSQL with: psql -h localhost -U app appdb".to_string(),
            ]
        );
    }

    #[test]
    fn test_halt_is_first_next_step() {
        let config = db_config();
        let host = FakeHost::ubuntu().failing("apt-get install", 100, "E: Broken packages");

        let outcome = run(&config, &host);
        let report = summarize(&outcome, &config, None, Utc::now());

        assert_eq!(report.exit_code(), 1);
        assert!(report.next_steps[0].starts_with("Fix the failure in 'base-packages'"));
        assert!(!report.next_steps.iter().any(|s| s.contains("ssh -p")));
        assert_eq!(report.summary.not_attempted, report.steps.len() - 1);
    }

    #[test]
    fn test_soft_failure_degrades_without_failing() {
        let config = db_config();
        let mut graph = StepGraph::new();
        graph
            .push(Action::new(plan::PUBLIC_IP, crate::resource::PublicIp::new()).soft())
            .unwrap();
        let host = FakeHost::new();
        let mut ctx = ApplyContext::new(&host);

        let outcome = graph.run(&mut ctx, &mut NoProgress);
        let report = summarize(&outcome, &config, None, Utc::now());

        assert_eq!(report.status, RunStatus::Degraded);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(
            report.next_steps[0],
            "Optional steps failed (public-ip); run provisio again to retry them"
        );
    }

    #[test]
    fn test_write_json() {
        let config = db_config();
        let outcome = run(&config, &FakeHost::ubuntu());
        let report = summarize(&outcome, &config, None, Utc::now());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        write_json(&report, &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["status"], "succeeded");
        assert_eq!(value["parameters"]["ssh"]["port"], 2222);
    }
}
