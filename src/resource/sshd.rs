//! The settings sshd will actually run with
//!
//! `sshd -T` resolves `Include`d drop-ins and defaults. Drop-ins are read
//! before the rest of `sshd_config` and the first value for a keyword wins,
//! so an edit to the main file can be silently shadowed.

use cmdkit::CommandSpec;
use declarative::{ApplyContext, Error, Resource, ResourceState, Result};
use std::path::Path;

use super::{exec, path_exists, query, read_file};

const SSHD_BINARY: &str = "/usr/sbin/sshd";
const DROP_IN_DIR: &str = "/etc/ssh/sshd_config.d";

/// Effective `keyword value` pairs, keywords lowercased
pub(crate) fn effective_config(ctx: &ApplyContext) -> Result<Vec<(String, String)>> {
    let output = exec(ctx, &CommandSpec::new("sshd").arg("-T"))?;
    Ok(output
        .stdout
        .lines()
        .filter_map(|line| line.trim().split_once(' '))
        .map(|(key, value)| (key.to_ascii_lowercase(), value.trim().to_string()))
        .collect())
}

/// Ports sshd is configured for; empty when sshd is not installed
pub(crate) fn configured_ports(ctx: &ApplyContext) -> Result<Vec<u16>> {
    if !path_exists(ctx, Path::new(SSHD_BINARY))? {
        return Ok(Vec::new());
    }
    Ok(effective_config(ctx)?
        .into_iter()
        .filter(|(key, _)| key == "port")
        .filter_map(|(_, value)| value.parse().ok())
        .collect())
}

/// Confirms sshd resolves each setting to the wanted value
///
/// Nothing to change when it does. Otherwise apply names the drop-ins
/// that set the keyword and fails, since rewriting another tool's file
/// (cloud-init's, usually) is not ours to do.
#[derive(Debug, Clone)]
pub struct SshdEffective {
    expected: Vec<(String, String)>,
}

impl SshdEffective {
    pub fn new<I, K, V>(expected: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            expected: expected
                .into_iter()
                .map(|(k, v)| (k.into().to_ascii_lowercase(), v.into()))
                .collect(),
        }
    }

    fn wanted(&self) -> String {
        self.expected
            .iter()
            .map(|(k, v)| format!("{k} {v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Expected settings sshd resolves differently, with what it has instead
    fn mismatches(&self, ctx: &ApplyContext) -> Result<Vec<(&str, &str, String)>> {
        let effective = effective_config(ctx)?;
        let mut wrong = Vec::new();
        for (key, value) in &self.expected {
            let mut actual = effective.iter().filter(|(k, _)| k == key).map(|(_, v)| v.as_str());
            if !actual.clone().any(|v| v.eq_ignore_ascii_case(value)) {
                let found = actual.next().unwrap_or("unset").to_string();
                wrong.push((key.as_str(), value.as_str(), found));
            }
        }
        Ok(wrong)
    }

    /// Drop-ins with a live line for `key`
    fn overriding_files(&self, ctx: &ApplyContext, key: &str) -> Result<Vec<String>> {
        let spec = CommandSpec::new("grep").args(["-rli", "--", key, DROP_IN_DIR]);
        let output = query(ctx, &spec)?;

        let mut files = Vec::new();
        for path in output.stdout.lines() {
            let Some(content) = read_file(ctx, Path::new(path), None)? else {
                continue;
            };
            let live = content.lines().any(|line| {
                line.split_whitespace()
                    .next()
                    .is_some_and(|word| word.eq_ignore_ascii_case(key))
            });
            if live {
                files.push(path.to_string());
            }
        }
        Ok(files)
    }
}

impl Resource for SshdEffective {
    fn id(&self) -> String {
        "sshd".to_string()
    }

    fn description(&self) -> String {
        format!("Check sshd resolves {}", self.wanted())
    }

    fn resource_type(&self) -> &'static str {
        "sshd_effective"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let wrong = self.mismatches(ctx)?;
        if wrong.is_empty() {
            return Ok(ResourceState::present_with(self.wanted()));
        }
        let found: Vec<String> = wrong
            .iter()
            .map(|(key, _, actual)| format!("{key} {actual}"))
            .collect();
        Ok(ResourceState::present_with(found.join(", ")))
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present_with(self.wanted())
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        let wrong = self.mismatches(ctx)?;
        let Some((key, value, actual)) = wrong.first() else {
            return Ok(());
        };

        let files = self.overriding_files(ctx, key)?;
        let source = if files.is_empty() {
            "by an Include or Match block".to_string()
        } else {
            format!("in {}", files.join(", "))
        };
        Err(Error::conflict(
            "sshd",
            format!("sshd resolves '{key} {actual}' instead of '{key} {value}'; it is set {source}"),
        ))
    }
}
