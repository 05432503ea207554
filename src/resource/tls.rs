//! Let's Encrypt certificates issued through certbot's nginx plugin

use cmdkit::CommandSpec;
use declarative::{ApplyContext, Resource, ResourceState, Result};
use std::path::PathBuf;

use super::{exec, path_arg, path_exists};

#[derive(Debug, Clone)]
pub struct Certificate {
    domain: String,
    email: String,
}

impl Certificate {
    pub fn new(domain: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            email: email.into(),
        }
    }

    fn fullchain(&self) -> PathBuf {
        PathBuf::from("/etc/letsencrypt/live")
            .join(&self.domain)
            .join("fullchain.pem")
    }
}

impl Resource for Certificate {
    fn id(&self) -> String {
        self.domain.clone()
    }

    fn description(&self) -> String {
        format!("Issue a certificate for {}", self.domain)
    }

    fn resource_type(&self) -> &'static str {
        "certificate"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let path = self.fullchain();
        Ok(if path_exists(ctx, &path)? {
            ResourceState::present_with(path_arg(&path))
        } else {
            ResourceState::Absent
        })
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        let spec = CommandSpec::new("certbot")
            .args(["--nginx", "-d"])
            .arg(&self.domain)
            .args(["--non-interactive", "--agree-tos", "-m"])
            .arg(&self.email)
            .arg("--redirect");
        exec(ctx, &spec)?;
        Ok(())
    }
}
