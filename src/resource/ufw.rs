//! Uncomplicated Firewall rules and activation

use cmdkit::CommandSpec;
use declarative::{ApplyContext, Resource, ResourceState, Result};

use super::sshd::configured_ports;
use super::{exec, query};

fn ufw() -> CommandSpec {
    CommandSpec::new("ufw")
}

/// Rules listed by `ufw show added`, as `ufw allow ...` lines
fn added_rules(ctx: &ApplyContext) -> Result<Vec<String>> {
    // `show added` lists user rules even while the firewall is inactive
    let output = exec(ctx, &ufw().args(["show", "added"]))?;
    Ok(output.stdout.lines().map(|l| l.trim().to_string()).collect())
}

/// An inbound allow rule such as `2222/tcp` or `80/tcp`
#[derive(Debug, Clone)]
pub struct UfwRule {
    rule: String,
}

impl UfwRule {
    pub fn allow(rule: impl Into<String>) -> Self {
        Self { rule: rule.into() }
    }

    fn added_line(&self) -> String {
        format!("ufw allow {}", self.rule)
    }
}

impl Resource for UfwRule {
    fn id(&self) -> String {
        self.rule.clone()
    }

    fn description(&self) -> String {
        format!("Allow {} through the firewall", self.rule)
    }

    fn resource_type(&self) -> &'static str {
        "ufw_rule"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let wanted = self.added_line();

        Ok(if added_rules(ctx)?.contains(&wanted) {
            ResourceState::present_with(wanted)
        } else {
            ResourceState::Absent
        })
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present_with(self.added_line())
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        exec(ctx, &ufw().arg("allow").arg(&self.rule))?;
        Ok(())
    }
}

/// Allow rules for whichever ports sshd is configured with
///
/// Used when this run does not manage SSH itself, so the port is read
/// from the host rather than assumed.
#[derive(Debug, Clone, Default)]
pub struct UfwSshAllowed;

impl UfwSshAllowed {
    fn missing(&self, ctx: &ApplyContext) -> Result<(Vec<u16>, Vec<u16>)> {
        let ports = configured_ports(ctx)?;
        let added = added_rules(ctx)?;
        let missing = ports
            .iter()
            .copied()
            .filter(|port| !added.contains(&format!("ufw allow {port}/tcp")))
            .collect();
        Ok((ports, missing))
    }
}

impl Resource for UfwSshAllowed {
    fn id(&self) -> String {
        "ssh".to_string()
    }

    fn description(&self) -> String {
        "Allow the current SSH port through the firewall".to_string()
    }

    fn resource_type(&self) -> &'static str {
        "ufw_rule"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let (ports, missing) = self.missing(ctx)?;
        if !missing.is_empty() {
            return Ok(ResourceState::Absent);
        }
        Ok(ResourceState::present_with(if ports.is_empty() {
            "sshd not installed".to_string()
        } else {
            let rules: Vec<String> = ports.iter().map(|p| format!("{p}/tcp")).collect();
            rules.join(", ")
        }))
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        let (_, missing) = self.missing(ctx)?;
        for port in missing {
            exec(ctx, &ufw().arg("allow").arg(format!("{port}/tcp")))?;
        }
        Ok(())
    }
}

/// The firewall itself, active and enabled at boot
#[derive(Debug, Clone, Default)]
pub struct UfwEnabled;

impl Resource for UfwEnabled {
    fn id(&self) -> String {
        "ufw".to_string()
    }

    fn description(&self) -> String {
        "Enable the firewall".to_string()
    }

    fn resource_type(&self) -> &'static str {
        "ufw"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let output = query(ctx, &ufw().arg("status"))?;
        Ok(if output.success() && output.stdout.starts_with("Status: active") {
            ResourceState::present_with("active")
        } else {
            ResourceState::Absent
        })
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present_with("active")
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        exec(ctx, &ufw().args(["--force", "enable"]))?;
        Ok(())
    }
}
