//! The frozen, validated parameters of one run

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::schema::Feature;
use crate::secret::{Secret, SecretSet};

/// SSH hardening parameters
#[derive(Debug, Clone, Serialize)]
pub struct SshSettings {
    pub port: u16,
    /// authorized_keys file copied to the new user
    pub keys_from: PathBuf,
}

/// Credentials for the application database
#[derive(Debug, Clone, Serialize)]
pub struct DbCredentials {
    pub user: String,
    #[serde(skip_serializing)]
    pub password: Secret,
    pub name: String,
}

/// Certificate parameters
#[derive(Debug, Clone, Serialize)]
pub struct TlsSettings {
    pub domain: String,
    pub email: String,
}

/// Every value here has passed its validator
///
/// Built once by the resolver and only read afterwards. Optional sections
/// are `Some` exactly when a selected feature needs them.
#[derive(Debug, Clone, Serialize)]
pub struct RunConfig {
    pub username: String,
    pub features: BTreeSet<Feature>,
    pub ssh: Option<SshSettings>,
    pub node_version: Option<String>,
    pub php_version: Option<String>,
    pub db: Option<DbCredentials>,
    pub tls: Option<TlsSettings>,
}

impl RunConfig {
    /// Whether a feature was selected
    pub fn has(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Secrets to scrub from command output and failure reasons
    pub fn secrets(&self) -> SecretSet {
        let mut set = SecretSet::new();
        if let Some(db) = &self.db {
            set.insert(&db.password);
        }
        set
    }

    /// The user's home directory, as created by adduser
    pub fn home_dir(&self) -> PathBuf {
        PathBuf::from("/home").join(&self.username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RunConfig {
        RunConfig {
            username: "deploy".into(),
            features: [Feature::Postgres].into(),
            ssh: None,
            node_version: None,
            php_version: None,
            db: Some(DbCredentials {
                user: "app".into(),
                password: Secret::new("s3cr3t-pw"),
                name: "appdb".into(),
            }),
            tls: None,
        }
    }

    #[test]
    fn test_serialization_omits_password() {
        let json = serde_json::to_string(&config()).unwrap();
        assert!(!json.contains("s3cr3t-pw"));
        assert!(!json.contains("password"));
        assert!(json.contains("\"user\":\"app\""));
    }

    #[test]
    fn test_debug_omits_password() {
        assert!(!format!("{:?}", config()).contains("s3cr3t-pw"));
    }

    #[test]
    fn test_secrets_include_db_password() {
        use declarative::Redact;
        let redacted = config().secrets().redact("auth failed for s3cr3t-pw");
        assert_eq!(redacted, "auth failed for ********");
    }
}
