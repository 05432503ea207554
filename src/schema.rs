//! Parameter schema: the fixed list of values a run needs
//!
//! Each parameter has prompt text, an optional default, a validator, and
//! a secrecy flag. Some parameters only apply when a feature is selected.

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

/// Optional parts of a provisioning run
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    /// Move sshd to a custom port, disable root and password login
    Ssh,
    /// Allow SSH and web traffic with ufw, then enable it
    Firewall,
    /// Node.js from NodeSource
    Node,
    /// PHP from the ondrej PPA with common extensions
    Php,
    /// Composer, installed globally
    Composer,
    /// PostgreSQL server with an application role and database
    Postgres,
    /// MySQL server with an application user and database
    Mysql,
    /// MongoDB server
    Mongodb,
    /// nginx with a Let's Encrypt certificate
    Tls,
}

impl Feature {
    /// Every feature, in plan order
    pub const ALL: [Self; 9] = [
        Self::Ssh,
        Self::Firewall,
        Self::Node,
        Self::Php,
        Self::Composer,
        Self::Postgres,
        Self::Mysql,
        Self::Mongodb,
        Self::Tls,
    ];

    /// Features preselected in the interactive picker
    pub const DEFAULTS: [Self; 2] = [Self::Ssh, Self::Firewall];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::Firewall => "firewall",
            Self::Node => "node",
            Self::Php => "php",
            Self::Composer => "composer",
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Mongodb => "mongodb",
            Self::Tls => "tls",
        }
    }

    /// Label shown in the interactive picker
    pub fn label(self) -> &'static str {
        match self {
            Self::Ssh => "SSH hardening (custom port, no root or password login)",
            Self::Firewall => "Firewall (ufw)",
            Self::Node => "Node.js",
            Self::Php => "PHP",
            Self::Composer => "Composer",
            Self::Postgres => "PostgreSQL",
            Self::Mysql => "MySQL",
            Self::Mongodb => "MongoDB",
            Self::Tls => "nginx + Let's Encrypt certificate",
        }
    }

    /// Parse a comma separated list such as `ssh,php,postgres`
    pub fn parse_list(input: &str) -> Result<BTreeSet<Self>, String> {
        input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Self::from_str(s, true).map_err(|_| format!("unknown feature '{s}'")))
            .collect()
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether any database that needs credentials is selected
pub fn needs_db_credentials(features: &BTreeSet<Feature>) -> bool {
    features.contains(&Feature::Postgres) || features.contains(&Feature::Mysql)
}

/// Schema parameters, in resolution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Param {
    Username,
    SshPort,
    KeysFrom,
    NodeVersion,
    PhpVersion,
    DbUser,
    DbPassword,
    DbName,
    Domain,
    Email,
}

/// Static description of one parameter
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub param: Param,
    /// Key in the answers file and suffix of the `PROVISIO_*` variable
    pub key: &'static str,
    pub prompt: &'static str,
    pub default: Option<&'static str>,
    /// Read without echo; never displayed or serialized
    pub secret: bool,
    validator: fn(&str) -> Result<(), String>,
    applies: fn(&BTreeSet<Feature>) -> bool,
}

impl ParamSpec {
    /// Check a candidate value
    pub fn validate(&self, value: &str) -> Result<(), String> {
        (self.validator)(value).map_err(|problem| format!("{}: {problem}", self.key))
    }

    /// Whether this parameter is needed for the selected features
    pub fn applies_to(&self, features: &BTreeSet<Feature>) -> bool {
        (self.applies)(features)
    }
}

fn always(_: &BTreeSet<Feature>) -> bool {
    true
}

fn with_ssh(features: &BTreeSet<Feature>) -> bool {
    features.contains(&Feature::Ssh)
}

fn with_node(features: &BTreeSet<Feature>) -> bool {
    features.contains(&Feature::Node)
}

fn with_php(features: &BTreeSet<Feature>) -> bool {
    features.contains(&Feature::Php) || features.contains(&Feature::Composer)
}

fn with_tls(features: &BTreeSet<Feature>) -> bool {
    features.contains(&Feature::Tls)
}

/// The schema, in the order values are resolved and prompted
pub const SCHEMA: &[ParamSpec] = &[
    ParamSpec {
        param: Param::Username,
        key: "username",
        prompt: "Name of the sudo user to create",
        default: None,
        secret: false,
        validator: validate_username,
        applies: always,
    },
    ParamSpec {
        param: Param::SshPort,
        key: "ssh_port",
        prompt: "SSH port",
        default: Some("2222"),
        secret: false,
        validator: validate_port,
        applies: with_ssh,
    },
    ParamSpec {
        param: Param::KeysFrom,
        key: "keys_from",
        prompt: "authorized_keys file to copy to the new user",
        default: Some("~/.ssh/authorized_keys"),
        secret: false,
        validator: validate_non_empty,
        applies: with_ssh,
    },
    ParamSpec {
        param: Param::NodeVersion,
        key: "node_version",
        prompt: "Node.js major version",
        default: Some("20"),
        secret: false,
        validator: validate_node_version,
        applies: with_node,
    },
    ParamSpec {
        param: Param::PhpVersion,
        key: "php_version",
        prompt: "PHP version",
        default: Some("8.2"),
        secret: false,
        validator: validate_php_version,
        applies: with_php,
    },
    ParamSpec {
        param: Param::DbUser,
        key: "db_user",
        prompt: "Database user",
        default: None,
        secret: false,
        validator: validate_identifier,
        applies: needs_db_credentials,
    },
    ParamSpec {
        param: Param::DbPassword,
        key: "db_password",
        prompt: "Database password",
        default: None,
        secret: true,
        validator: validate_non_empty,
        applies: needs_db_credentials,
    },
    ParamSpec {
        param: Param::DbName,
        key: "db_name",
        prompt: "Database name",
        default: None,
        secret: false,
        validator: validate_identifier,
        applies: needs_db_credentials,
    },
    ParamSpec {
        param: Param::Domain,
        key: "domain",
        prompt: "Domain for the TLS certificate",
        default: None,
        secret: false,
        validator: validate_domain,
        applies: with_tls,
    },
    ParamSpec {
        param: Param::Email,
        key: "email",
        prompt: "Email for Let's Encrypt notices",
        default: None,
        secret: false,
        validator: validate_email,
        applies: with_tls,
    },
];

/// Look up a parameter's spec; `SCHEMA` is laid out in `Param` order
pub fn spec(param: Param) -> &'static ParamSpec {
    &SCHEMA[param as usize]
}

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").unwrap());
static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap());
static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,}$").unwrap()
});
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

fn validate_non_empty(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err("must not be empty".into())
    } else {
        Ok(())
    }
}

fn validate_username(value: &str) -> Result<(), String> {
    validate_non_empty(value)?;
    if value == "root" {
        return Err("must not be root".into());
    }
    if !USERNAME_RE.is_match(value) {
        return Err(format!(
            "'{value}' is not a valid login name (lowercase letters, digits, '_' or '-')"
        ));
    }
    Ok(())
}

fn validate_port(value: &str) -> Result<(), String> {
    let port: u32 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not an integer"))?;
    if (1024..=65535).contains(&port) {
        Ok(())
    } else {
        Err(format!("{port} is outside 1024-65535"))
    }
}

fn validate_node_version(value: &str) -> Result<(), String> {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(format!("'{value}' is not a major version such as 20"))
    }
}

fn validate_php_version(value: &str) -> Result<(), String> {
    match value.split_once('.') {
        Some((major, minor))
            if !major.is_empty()
                && !minor.is_empty()
                && major.chars().all(|c| c.is_ascii_digit())
                && minor.chars().all(|c| c.is_ascii_digit()) =>
        {
            Ok(())
        }
        _ => Err(format!("'{value}' is not a version such as 8.2")),
    }
}

fn validate_identifier(value: &str) -> Result<(), String> {
    validate_non_empty(value)?;
    if IDENTIFIER_RE.is_match(value) {
        Ok(())
    } else {
        Err(format!(
            "'{value}' must start with a letter or '_' and contain only letters, digits or '_'"
        ))
    }
}

fn validate_domain(value: &str) -> Result<(), String> {
    validate_non_empty(value)?;
    if DOMAIN_RE.is_match(value) {
        Ok(())
    } else {
        Err(format!("'{value}' is not a fully qualified domain name"))
    }
}

fn validate_email(value: &str) -> Result<(), String> {
    validate_non_empty(value)?;
    if EMAIL_RE.is_match(value) {
        Ok(())
    } else {
        Err(format!("'{value}' is not an email address"))
    }
}
