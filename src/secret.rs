//! In-memory credentials that never reach logs, reports, or the terminal

use declarative::Redact;
use serde::{Serialize, Serializer};
use std::fmt;

/// Placeholder shown wherever a secret would appear
pub const REDACTED: &str = "********";

/// A credential held only for the duration of the run
///
/// `Debug`, `Display`, and `Serialize` all render the placeholder; the
/// value is reachable only through [`Secret::expose`].
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for building stdin payloads only
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({REDACTED})")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

/// Every secret of a run, used to scrub free text such as command stderr
#[derive(Debug, Default)]
pub struct SecretSet {
    secrets: Vec<Secret>,
}

impl SecretSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a secret; empty values are ignored
    pub fn insert(&mut self, secret: &Secret) {
        if !secret.is_empty() && !self.secrets.contains(secret) {
            self.secrets.push(secret.clone());
            // Longest first so a secret containing another is fully replaced
            self.secrets
                .sort_by(|a, b| b.expose().len().cmp(&a.expose().len()));
        }
    }
}

impl Redact for SecretSet {
    fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| {
                acc.replace(secret.expose(), REDACTED)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_never_formats_its_value() {
        let secret = Secret::new("hunter2");
        assert_eq!(secret.to_string(), REDACTED);
        assert!(!format!("{secret:?}").contains("hunter2"));
        assert_eq!(
            serde_json::to_string(&secret).unwrap(),
            format!("\"{REDACTED}\"")
        );
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_secret_set_scrubs_every_occurrence() {
        let mut set = SecretSet::new();
        set.insert(&Secret::new("pa55"));
        set.insert(&Secret::new("pa55word"));

        let scrubbed = set.redact("ERROR: role \"app\" password 'pa55word' rejected, hint pa55");

        assert!(!scrubbed.contains("pa55"));
        assert_eq!(scrubbed.matches(REDACTED).count(), 2);
    }

    #[test]
    fn test_empty_secret_is_not_tracked() {
        let mut set = SecretSet::new();
        set.insert(&Secret::new(""));
        assert_eq!(set.redact("unchanged"), "unchanged");
    }
}
