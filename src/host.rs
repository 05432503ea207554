//! Facts about the local host, read before planning

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

const OS_RELEASE: &str = "/etc/os-release";

/// Distribution identity from os-release
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostFacts {
    /// `ID`, e.g. "ubuntu"
    pub id: String,
    /// `VERSION_CODENAME`, e.g. "noble"
    pub codename: Option<String>,
}

impl HostFacts {
    pub fn is_ubuntu(&self) -> bool {
        self.id == "ubuntu"
    }
}

/// Read `/etc/os-release`
pub fn detect() -> Result<HostFacts> {
    detect_from(Path::new(OS_RELEASE))
}

pub fn detect_from(path: &Path) -> Result<HostFacts> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    Ok(parse_os_release(&content))
}

pub fn parse_os_release(content: &str) -> HostFacts {
    let mut facts = HostFacts::default();

    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        match key.trim() {
            "ID" => facts.id = value.to_string(),
            "VERSION_CODENAME" if !value.is_empty() => facts.codename = Some(value.to_string()),
            "UBUNTU_CODENAME" if facts.codename.is_none() && !value.is_empty() => {
                facts.codename = Some(value.to_string());
            }
            _ => {}
        }
    }

    facts
}
