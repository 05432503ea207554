//! Resolve every parameter once, before anything touches the host
//!
//! Precedence: flag/env, answers file, interactive prompt, schema default.
//! All problems are collected and returned together as one validation
//! error, so a bad port is reported before any step runs.

use anyhow::{Context, Result};
use dialoguer::{Input, MultiSelect, Password};
use std::collections::{BTreeMap, BTreeSet};

use crate::paths;
use crate::run_config::{DbCredentials, RunConfig, SshSettings, TlsSettings};
use crate::schema::{self, Feature, Param, ParamSpec, SCHEMA};
use crate::secret::Secret;

/// Values supplied up front, before any prompt
#[derive(Debug, Default, Clone)]
pub struct Answers {
    pub features: Option<BTreeSet<Feature>>,
    values: BTreeMap<Param, String>,
}

impl Answers {
    pub fn get(&self, param: Param) -> Option<&str> {
        self.values.get(&param).map(String::as_str)
    }

    pub fn set(&mut self, param: Param, value: impl Into<String>) {
        self.values.insert(param, value.into());
    }

    /// Set a value if one was given
    pub fn set_opt(&mut self, param: Param, value: Option<String>) {
        if let Some(value) = value {
            self.set(param, value);
        }
    }

    /// Fill gaps from a lower-precedence source
    pub fn or(mut self, lower: Self) -> Self {
        if self.features.is_none() {
            self.features = lower.features;
        }
        for (param, value) in lower.values {
            self.values.entry(param).or_insert(value);
        }
        self
    }
}

/// Source of values the operator did not supply up front
pub trait Prompter {
    /// Pick features; `None` means no answer is available
    fn select_features(&mut self, preselected: &[Feature]) -> Result<Option<BTreeSet<Feature>>>;

    /// Ask for one parameter; `None` means no answer is available
    fn ask(&mut self, spec: &ParamSpec) -> Result<Option<String>>;
}

/// Prompter for unattended runs: never has an answer
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn select_features(&mut self, _preselected: &[Feature]) -> Result<Option<BTreeSet<Feature>>> {
        Ok(None)
    }

    fn ask(&mut self, _spec: &ParamSpec) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Interactive prompter; secrets are read without echo
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn select_features(&mut self, preselected: &[Feature]) -> Result<Option<BTreeSet<Feature>>> {
        let labels: Vec<&str> = Feature::ALL.iter().map(|f| f.label()).collect();
        let defaults: Vec<bool> = Feature::ALL
            .iter()
            .map(|f| preselected.contains(f))
            .collect();

        let picked = MultiSelect::new()
            .with_prompt("Select what to set up (space to toggle, enter to confirm)")
            .items(&labels)
            .defaults(&defaults)
            .interact()
            .context("Failed to read feature selection")?;

        Ok(Some(picked.into_iter().map(|i| Feature::ALL[i]).collect()))
    }

    fn ask(&mut self, spec: &ParamSpec) -> Result<Option<String>> {
        if spec.secret {
            let value = Password::new()
                .with_prompt(spec.prompt)
                .with_confirmation("Repeat to confirm", "Values do not match")
                .validate_with(|v: &String| spec.validate(v))
                .interact()
                .with_context(|| format!("Failed to read {}", spec.key))?;
            return Ok(Some(value));
        }

        let mut input = Input::<String>::new()
            .with_prompt(spec.prompt)
            .validate_with(|v: &String| spec.validate(v));
        if let Some(default) = spec.default {
            input = input.default(default.to_string());
        }
        let value = input
            .interact_text()
            .with_context(|| format!("Failed to read {}", spec.key))?;
        Ok(Some(value))
    }
}

/// Resolve the schema into a frozen [`RunConfig`]
///
/// Returns a [`declarative::Error::Validation`] listing every problem when
/// any value is missing or invalid.
pub fn resolve(answers: &Answers, prompter: &mut dyn Prompter) -> Result<RunConfig> {
    let features = match &answers.features {
        Some(features) => features.clone(),
        None => prompter
            .select_features(&Feature::DEFAULTS)?
            .unwrap_or_else(|| Feature::DEFAULTS.into_iter().collect()),
    };

    for key in unused_params(answers, &features) {
        log::warn!("Ignoring {key}: no selected feature uses it");
    }

    let mut values: BTreeMap<Param, String> = BTreeMap::new();
    let mut problems: Vec<String> = Vec::new();

    for spec in SCHEMA.iter().filter(|s| s.applies_to(&features)) {
        let value = match answers.get(spec.param) {
            Some(value) => Some(value.to_string()),
            None => prompter.ask(spec)?,
        };
        let Some(value) = value.or_else(|| spec.default.map(String::from)) else {
            let env = format!("PROVISIO_{}", spec.key.to_uppercase());
            problems.push(if spec.secret {
                format!("{}: missing; set {env}", spec.key)
            } else {
                format!(
                    "{}: missing; pass --{} or set {env}",
                    spec.key,
                    spec.key.replace('_', "-")
                )
            });
            continue;
        };

        match spec.validate(&value) {
            Ok(()) => {
                values.insert(spec.param, value);
            }
            Err(problem) => problems.push(problem),
        }
    }

    if !problems.is_empty() {
        log::debug!("Validation failed with {} problem(s)", problems.len());
        return Err(declarative::Error::Validation { problems }.into());
    }

    Ok(freeze(features, values))
}

/// Keys with a supplied value that the selected features never read
fn unused_params(answers: &Answers, features: &BTreeSet<Feature>) -> Vec<&'static str> {
    SCHEMA
        .iter()
        .filter(|spec| !spec.applies_to(features) && answers.get(spec.param).is_some())
        .map(|spec| spec.key)
        .collect()
}

fn freeze(features: BTreeSet<Feature>, mut values: BTreeMap<Param, String>) -> RunConfig {
    let mut take = |param: Param| values.remove(&param);

    let username = take(Param::Username).unwrap_or_default();
    let ssh = match (take(Param::SshPort), take(Param::KeysFrom)) {
        (Some(port), Some(keys_from)) => port.trim().parse().ok().map(|port| SshSettings {
            port,
            keys_from: paths::expand(&keys_from),
        }),
        _ => None,
    };
    let node_version = take(Param::NodeVersion);
    let php_version = take(Param::PhpVersion);
    let db = match (take(Param::DbUser), take(Param::DbPassword), take(Param::DbName)) {
        (Some(user), Some(password), Some(name)) => Some(DbCredentials {
            user,
            password: Secret::new(password),
            name,
        }),
        _ => None,
    };
    let tls = match (take(Param::Domain), take(Param::Email)) {
        (Some(domain), Some(email)) => Some(TlsSettings { domain, email }),
        _ => None,
    };

    debug_assert!(schema::needs_db_credentials(&features) == db.is_some());

    RunConfig {
        username,
        features,
        ssh,
        node_version,
        php_version,
        db,
        tls,
    }
}
