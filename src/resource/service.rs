//! systemd units: enabled and running, or restarted after a config change

use cmdkit::CommandSpec;
use declarative::{ApplyContext, Error, Resource, ResourceState, Result};

use super::{exec, query};

fn systemctl() -> CommandSpec {
    CommandSpec::new("systemctl")
}

fn is_active(ctx: &ApplyContext, unit: &str) -> Result<bool> {
    let spec = systemctl().unprivileged().arg("is-active").arg(unit);
    Ok(query(ctx, &spec)?.success())
}

/// Whether anything accepts TCP connections on `port`
fn is_listening(ctx: &ApplyContext, port: u16) -> Result<bool> {
    let spec = CommandSpec::new("ss")
        .unprivileged()
        .args(["-Hltn", "sport", "="])
        .arg(format!(":{port}"));
    Ok(!exec(ctx, &spec)?.stdout_trimmed().is_empty())
}

/// A unit that is enabled at boot and running now
#[derive(Debug, Clone)]
pub struct Service {
    unit: String,
}

impl Service {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }
}

impl Resource for Service {
    fn id(&self) -> String {
        self.unit.clone()
    }

    fn description(&self) -> String {
        format!("Enable and start {}", self.unit)
    }

    fn resource_type(&self) -> &'static str {
        "service"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let enabled = query(
            ctx,
            &systemctl().unprivileged().arg("is-enabled").arg(&self.unit),
        )?
        .success();
        let active = is_active(ctx, &self.unit)?;

        Ok(match (enabled, active) {
            (true, true) => ResourceState::present_with("enabled, active"),
            (true, false) => ResourceState::present_with("enabled, inactive"),
            (false, true) => ResourceState::present_with("disabled, active"),
            (false, false) => ResourceState::Absent,
        })
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present_with("enabled, active")
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        exec(ctx, &systemctl().args(["enable", "--now"]).arg(&self.unit))?;
        Ok(())
    }
}

/// Restart a unit when its configuration changed
///
/// Pending when one of the trigger actions was applied in this run, or,
/// with a listen port, when nothing listens there yet. The port check
/// catches edits from an earlier run that never reached the restart.
#[derive(Debug, Clone)]
pub struct ServiceRestart {
    unit: String,
    triggers: Vec<String>,
    config_test: Option<Vec<String>>,
    companions: Vec<String>,
    listen_port: Option<u16>,
}

impl ServiceRestart {
    pub fn new<I, S>(unit: impl Into<String>, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unit: unit.into(),
            triggers: triggers.into_iter().map(Into::into).collect(),
            config_test: None,
            companions: Vec::new(),
            listen_port: None,
        }
    }

    /// Command that must accept the new configuration before restarting
    pub fn with_config_test<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config_test = Some(argv.into_iter().map(Into::into).collect());
        self
    }

    /// Units restarted first if they are running (e.g. `ssh.socket`)
    pub fn with_companion(mut self, unit: impl Into<String>) -> Self {
        self.companions.push(unit.into());
        self
    }

    /// TCP port the restarted unit must be listening on
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    fn triggered(&self, ctx: &ApplyContext) -> bool {
        self.triggers.iter().any(|t| ctx.was_applied(t))
    }

    fn listening(&self, ctx: &ApplyContext) -> Result<bool> {
        match self.listen_port {
            Some(port) => is_listening(ctx, port),
            None => Ok(true),
        }
    }
}

impl Resource for ServiceRestart {
    fn id(&self) -> String {
        self.unit.clone()
    }

    fn description(&self) -> String {
        format!("Restart {}", self.unit)
    }

    fn resource_type(&self) -> &'static str {
        "service_restart"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        if self.triggered(ctx) {
            return Ok(ResourceState::Absent);
        }
        if !self.listening(ctx)? {
            log::info!(
                "{} is not listening on port {} yet",
                self.unit,
                self.listen_port.unwrap_or_default()
            );
            return Ok(ResourceState::Absent);
        }
        Ok(ResourceState::present_with("no configuration change"))
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        if let Some(argv) = &self.config_test {
            if let Some((program, args)) = argv.split_first() {
                let spec = CommandSpec::new(program.as_str()).args(args);
                let output = query(ctx, &spec)?;
                if !output.success() {
                    return Err(Error::system(format!(
                        "{} rejected the new configuration: {}",
                        spec.display(),
                        output.stderr.trim()
                    )));
                }
            }
        }

        exec(ctx, &systemctl().arg("daemon-reload"))?;
        for companion in &self.companions {
            let spec = systemctl().arg("try-restart").arg(companion);
            let output = query(ctx, &spec)?;
            if !output.success() {
                log::debug!("{} failed: {}", spec.display(), output.stderr.trim());
            }
        }
        exec(ctx, &systemctl().arg("restart").arg(&self.unit))?;
        Ok(())
    }

    fn verify(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(if is_active(ctx, &self.unit)? && self.listening(ctx)? {
            ResourceState::present_with("restarted, active")
        } else {
            ResourceState::Absent
        })
    }
}
