//! Scoped sudo credentials for the apply phase
//!
//! Sudo is never held for the entire process:
//! 1. Parameters are resolved and validated without privileges
//! 2. Credentials are validated once, before the host is probed
//! 3. The timestamp is invalidated when the run ends, even on error

use anyhow::{Context, Result, bail};
use std::process::Command;

/// How privileged commands will be run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Already root; commands run directly
    Root,
    /// Commands are prefixed with sudo
    Sudo,
}

impl Privilege {
    pub fn detect() -> Self {
        if cmdkit::is_root() {
            Self::Root
        } else {
            Self::Sudo
        }
    }

    pub fn uses_sudo(self) -> bool {
        self == Self::Sudo
    }
}

/// Scoped sudo context - invalidates the timestamp on drop
pub struct SudoContext {
    validated: bool,
}

impl SudoContext {
    /// Validate sudo credentials, prompting with `reason` if a password is needed
    pub fn acquire(privilege: Privilege, reason: &str) -> Result<Self> {
        if !privilege.uses_sudo() {
            return Ok(Self { validated: false });
        }

        if !Self::is_valid() {
            eprintln!();
            eprintln!("  Sudo required: {reason}");
            eprintln!();
        }

        let status = Command::new("sudo")
            .arg("-v")
            .status()
            .context("Failed to execute sudo")?;

        if !status.success() {
            bail!("Failed to acquire sudo privileges");
        }

        log::debug!("sudo credentials validated");
        Ok(Self { validated: true })
    }

    /// Check if sudo is currently valid (without prompting)
    pub fn is_valid() -> bool {
        Command::new("sudo")
            .args(["-n", "true"])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Drop for SudoContext {
    fn drop(&mut self) {
        if self.validated {
            let _ = Command::new("sudo").arg("-k").status();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_needs_no_sudo() {
        assert!(!Privilege::Root.uses_sudo());
        assert!(Privilege::Sudo.uses_sudo());
    }

    #[test]
    fn test_root_context_runs_nothing() {
        let ctx = SudoContext::acquire(Privilege::Root, "install packages").unwrap();
        assert!(!ctx.validated);
    }
}
