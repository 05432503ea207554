//! Path resolution for provisio
//!
//! # Environment Variables
//!
//! - `PROVISIO_CONFIG_DIR` - Override config directory (where `answers.toml` lives)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `PROVISIO_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/provisio` (if set)
//! 3. `~/.config/provisio`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "PROVISIO_CONFIG_DIR";

/// File name of the answers file inside the config directory
pub const ANSWERS_FILE: &str = "answers.toml";

/// Get the provisio config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("provisio");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("provisio");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Default answers file location, whether or not it exists
pub fn default_answers_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(ANSWERS_FILE))
}

/// Expand `~` and environment variables in a path
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
