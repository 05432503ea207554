//! Answers file: the same parameters as the CLI, in TOML
//!
//! ```toml
//! features = ["ssh", "firewall", "php", "postgres"]
//! username = "deploy"
//! ssh_port = 2222
//! php_version = "8.2"
//! db_user = "app"
//! db_name = "app"
//! ```

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::resolver::Answers;
use crate::schema::{Feature, SCHEMA};

#[derive(Debug, Default, Deserialize)]
struct AnswersFile {
    features: Option<BTreeSet<Feature>>,
    #[serde(flatten)]
    values: BTreeMap<String, toml::Value>,
}

/// Load answers from a TOML file
pub fn load_answers(path: &Path) -> Result<Answers> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    parse_answers(&content).with_context(|| format!("Invalid answers file {}", path.display()))
}

/// Parse answers from TOML text
pub fn parse_answers(content: &str) -> Result<Answers> {
    let file: AnswersFile = toml::from_str(content)?;
    let mut answers = Answers::default();
    answers.features = file.features;

    for (key, value) in file.values {
        let Some(spec) = SCHEMA.iter().find(|s| s.key == key) else {
            log::warn!("Ignoring unknown key '{key}' in answers file");
            continue;
        };
        let value = match value {
            toml::Value::String(s) => s,
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => {
                bail!("'{key}' must be quoted; as a TOML number it reads as {f}")
            }
            other => bail!("'{key}' must be a string or integer, found {}", other.type_str()),
        };
        answers.set(spec.param, value);
    }

    Ok(answers)
}
