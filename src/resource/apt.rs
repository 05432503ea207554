//! apt resources: packages, PPAs, and keyed third-party sources

use cmdkit::{CommandSpec, RetryConfig};
use declarative::{ApplyContext, Resource, ResourceState, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{exec, path_arg, query, read_file, write_file};

const SOURCES_DIR: &str = "/etc/apt/sources.list.d";
const KEYRINGS_DIR: &str = "/etc/apt/keyrings";

/// Set once the package index has been refreshed in this run
const INDEX_FRESH_FACT: &str = "apt_index_fresh";

fn apt_get() -> CommandSpec {
    CommandSpec::new("apt-get")
        .env("DEBIAN_FRONTEND", "noninteractive")
        .retry(RetryConfig::default())
}

fn apt_update(ctx: &mut ApplyContext) -> Result<()> {
    exec(ctx, &apt_get().arg("update"))?;
    ctx.set_fact(INDEX_FRESH_FACT, "true");
    Ok(())
}

/// Refresh the index before the first install of a run
fn ensure_index(ctx: &mut ApplyContext) -> Result<()> {
    if ctx.fact(INDEX_FRESH_FACT).is_some() {
        return Ok(());
    }
    apt_update(ctx)
}

/// One or more packages installed with apt-get
#[derive(Debug, Clone)]
pub struct AptPackage {
    packages: Vec<String>,
    version_prefix: Option<String>,
}

impl AptPackage {
    pub fn new<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            packages: packages.into_iter().map(Into::into).collect(),
            version_prefix: None,
        }
    }

    /// Require installed versions to start with `prefix` (e.g. "20." for nodejs)
    pub fn with_version_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.version_prefix = Some(prefix.into());
        self
    }

    /// Installed version of each package that dpkg reports as installed
    fn installed(&self, ctx: &ApplyContext) -> Result<BTreeMap<String, String>> {
        let spec = CommandSpec::new("dpkg-query")
            .unprivileged()
            .arg("-W")
            .arg("-f=${Package}\t${db:Status-Status}\t${Version}\n")
            .args(&self.packages);
        // Exit status 1 only means some names are unknown
        let output = query(ctx, &spec)?;

        Ok(output
            .stdout
            .lines()
            .filter_map(|line| {
                let mut fields = line.split('\t');
                let (name, status, version) = (fields.next()?, fields.next()?, fields.next()?);
                (status == "installed").then(|| (name.to_string(), version.to_string()))
            })
            .collect())
    }

    fn version_ok(&self, version: &str) -> bool {
        self.version_prefix
            .as_deref()
            .is_none_or(|prefix| version.starts_with(prefix))
    }
}

impl Resource for AptPackage {
    fn id(&self) -> String {
        self.packages.join(" ")
    }

    fn description(&self) -> String {
        format!("Install {}", self.packages.join(", "))
    }

    fn resource_type(&self) -> &'static str {
        "apt_package"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let installed = self.installed(ctx)?;
        let complete = self
            .packages
            .iter()
            .all(|p| installed.get(p).is_some_and(|v| self.version_ok(v)));

        if !complete {
            return Ok(ResourceState::Absent);
        }

        let versions: Vec<String> = self
            .packages
            .iter()
            .filter_map(|p| installed.get(p).map(|v| format!("{p} {v}")))
            .collect();
        Ok(ResourceState::present_with(versions.join(", ")))
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        ensure_index(ctx)?;
        let spec = apt_get()
            .arg("install")
            .arg("-y")
            .arg("--no-install-recommends")
            .args(&self.packages);
        exec(ctx, &spec)?;
        Ok(())
    }
}

/// A Launchpad PPA such as `ppa:ondrej/php`
#[derive(Debug, Clone)]
pub struct AptRepository {
    ppa: String,
}

impl AptRepository {
    pub fn ppa(ppa: impl Into<String>) -> Self {
        Self { ppa: ppa.into() }
    }

    /// Path fragment that appears in the source entry, in either list format
    fn needle(&self) -> String {
        let name = self.ppa.trim_start_matches("ppa:");
        format!("/{name}/ubuntu")
    }
}

impl Resource for AptRepository {
    fn id(&self) -> String {
        self.ppa.clone()
    }

    fn description(&self) -> String {
        format!("Add {}", self.ppa)
    }

    fn resource_type(&self) -> &'static str {
        "apt_repository"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let spec = CommandSpec::new("grep")
            .unprivileged()
            .args(["-rlsF", "--"])
            .arg(self.needle())
            .arg(SOURCES_DIR);
        let output = query(ctx, &spec)?;

        Ok(match output.stdout.lines().next() {
            Some(file) if output.success() => ResourceState::present_with(file),
            _ => ResourceState::Absent,
        })
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        let add = CommandSpec::new("add-apt-repository")
            .env("DEBIAN_FRONTEND", "noninteractive")
            .arg("-y")
            .arg(&self.ppa)
            .retry(RetryConfig::default());
        exec(ctx, &add)?;
        apt_update(ctx)
    }
}

/// A third-party repository signed with a downloaded key
#[derive(Debug, Clone)]
pub struct AptSource {
    name: String,
    key_url: String,
    line: String,
}

impl AptSource {
    /// `line` may use `{keyring}` for the keyring path
    pub fn new(name: impl Into<String>, key_url: impl Into<String>, line: &str) -> Self {
        let name = name.into();
        let keyring = Self::keyring_for(&name);
        Self {
            line: line.replace("{keyring}", &path_arg(&keyring)),
            key_url: key_url.into(),
            name,
        }
    }

    fn keyring_for(name: &str) -> PathBuf {
        PathBuf::from(KEYRINGS_DIR).join(format!("{name}.gpg"))
    }

    pub fn keyring(&self) -> PathBuf {
        Self::keyring_for(&self.name)
    }

    pub fn list_file(&self) -> PathBuf {
        PathBuf::from(SOURCES_DIR).join(format!("{}.list", self.name))
    }
}

impl Resource for AptSource {
    fn id(&self) -> String {
        path_arg(&self.list_file())
    }

    fn description(&self) -> String {
        format!("Add {} apt source", self.name)
    }

    fn resource_type(&self) -> &'static str {
        "apt_source"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let Some(content) = read_file(ctx, &self.list_file(), None)? else {
            return Ok(ResourceState::Absent);
        };
        if !content.lines().any(|l| l.trim() == self.line) {
            return Ok(ResourceState::Absent);
        }
        if !super::path_exists(ctx, &self.keyring())? {
            return Ok(ResourceState::Absent);
        }
        Ok(ResourceState::present_with(self.line.clone()))
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::present_with(self.line.clone())
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        let key = ctx.runner.fetch(&self.key_url, &RetryConfig::default())?;

        exec(
            ctx,
            &CommandSpec::new("install").args(["-d", "-m", "0755", KEYRINGS_DIR]),
        )?;
        exec(
            ctx,
            &CommandSpec::new("gpg")
                .args(["--dearmor", "--yes", "-o"])
                .arg(path_arg(&self.keyring()))
                .stdin(key),
        )?;
        write_file(ctx, &self.list_file(), &format!("{}\n", self.line), None)?;
        apt_update(ctx)
    }
}
