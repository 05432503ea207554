//! Login accounts and their SSH keys

use cmdkit::CommandSpec;
use declarative::{ApplyContext, Error, Resource, ResourceState, Result};
use std::path::{Path, PathBuf};

use super::{exec, path_arg, query, read_file, write_file};

const ADMIN_GROUP: &str = "sudo";

/// A user that exists and belongs to the sudo group
#[derive(Debug, Clone)]
pub struct UserAccount {
    name: String,
}

impl UserAccount {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn groups(&self, ctx: &ApplyContext) -> Result<Option<Vec<String>>> {
        let spec = CommandSpec::new("id")
            .unprivileged()
            .arg("-nG")
            .arg(&self.name);
        let output = query(ctx, &spec)?;
        if !output.success() {
            return Ok(None);
        }
        Ok(Some(
            output
                .stdout
                .split_whitespace()
                .map(String::from)
                .collect(),
        ))
    }
}

impl Resource for UserAccount {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        format!("Create user {} with sudo rights", self.name)
    }

    fn resource_type(&self) -> &'static str {
        "user"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(match self.groups(ctx)? {
            Some(groups) => ResourceState::present_with(groups.join(" ")),
            None => ResourceState::Absent,
        })
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present_with(format!("member of {ADMIN_GROUP}"))
    }

    fn is_satisfied(&self, state: &ResourceState) -> bool {
        state
            .value()
            .is_some_and(|groups| groups.split_whitespace().any(|g| g == ADMIN_GROUP))
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        if self.groups(ctx)?.is_none() {
            exec(
                ctx,
                &CommandSpec::new("adduser")
                    .args(["--disabled-password", "--gecos", ""])
                    .arg(&self.name),
            )?;
        }
        exec(
            ctx,
            &CommandSpec::new("usermod")
                .args(["-aG", ADMIN_GROUP])
                .arg(&self.name),
        )?;
        Ok(())
    }
}

/// Copy the operator's public keys into a user's authorized_keys
#[derive(Debug, Clone)]
pub struct AuthorizedKeys {
    user: String,
    source: PathBuf,
}

impl AuthorizedKeys {
    pub fn new(user: impl Into<String>, source: impl AsRef<Path>) -> Self {
        Self {
            user: user.into(),
            source: source.as_ref().to_path_buf(),
        }
    }

    fn ssh_dir(&self) -> PathBuf {
        PathBuf::from("/home").join(&self.user).join(".ssh")
    }

    fn target(&self) -> PathBuf {
        self.ssh_dir().join("authorized_keys")
    }

    fn source_keys(&self, ctx: &ApplyContext) -> Result<Vec<String>> {
        let content = read_file(ctx, &self.source, None)?.unwrap_or_default();
        let keys = keys_in(&content);
        if keys.is_empty() {
            return Err(Error::conflict(
                path_arg(&self.source),
                "no public keys to copy; disabling password login would lock everyone out",
            ));
        }
        Ok(keys)
    }
}

/// Key lines, without comments or blanks
fn keys_in(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

impl Resource for AuthorizedKeys {
    fn id(&self) -> String {
        path_arg(&self.target())
    }

    fn description(&self) -> String {
        format!(
            "Authorize keys from {} for {}",
            self.source.display(),
            self.user
        )
    }

    fn resource_type(&self) -> &'static str {
        "authorized_keys"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let wanted = self.source_keys(ctx)?;
        let Some(content) = read_file(ctx, &self.target(), None)? else {
            return Ok(ResourceState::Absent);
        };
        let present = keys_in(&content);

        if wanted.iter().all(|k| present.contains(k)) {
            Ok(ResourceState::present_with(format!("{} key(s)", present.len())))
        } else {
            Ok(ResourceState::Absent)
        }
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        let wanted = self.source_keys(ctx)?;
        let existing = read_file(ctx, &self.target(), None)?.unwrap_or_default();

        let mut content = existing.clone();
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        let present = keys_in(&existing);
        for key in wanted.iter().filter(|k| !present.contains(k)) {
            content.push_str(key);
            content.push('\n');
        }

        let owner = format!("{0}:{0}", self.user);
        let dir = path_arg(&self.ssh_dir());
        let target = path_arg(&self.target());

        exec(
            ctx,
            &CommandSpec::new("install")
                .args(["-d", "-m", "700", "-o", self.user.as_str(), "-g", self.user.as_str()])
                .arg(&dir),
        )?;
        write_file(ctx, &self.target(), &content, None)?;
        exec(ctx, &CommandSpec::new("chown").arg(&owner).arg(&target))?;
        exec(ctx, &CommandSpec::new("chmod").arg("600").arg(&target))?;
        Ok(())
    }
}
