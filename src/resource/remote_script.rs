//! Installers distributed as a script at a URL

use cmdkit::{CommandSpec, RetryConfig};
use declarative::{ApplyContext, Resource, ResourceState, Result};
use std::path::{Path, PathBuf};

use super::{exec, path_arg, path_exists};

/// Download a script and run it through an interpreter
///
/// The script is piped to the interpreter's stdin and never touches disk.
/// `creates` is the file the installer leaves behind; its presence means
/// the install already happened.
#[derive(Debug, Clone)]
pub struct RemoteScript {
    url: String,
    interpreter: String,
    args: Vec<String>,
    creates: PathBuf,
}

impl RemoteScript {
    pub fn new(
        url: impl Into<String>,
        interpreter: impl Into<String>,
        creates: impl AsRef<Path>,
    ) -> Self {
        Self {
            url: url.into(),
            interpreter: interpreter.into(),
            args: Vec::new(),
            creates: creates.as_ref().to_path_buf(),
        }
    }

    /// Arguments passed to the script after `--`
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl Resource for RemoteScript {
    fn id(&self) -> String {
        path_arg(&self.creates)
    }

    fn description(&self) -> String {
        format!("Install {} from {}", self.creates.display(), self.url)
    }

    fn resource_type(&self) -> &'static str {
        "remote_script"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(if path_exists(ctx, &self.creates)? {
            ResourceState::present_with(path_arg(&self.creates))
        } else {
            ResourceState::Absent
        })
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        let script = ctx.runner.fetch(&self.url, &RetryConfig::default())?;
        let spec = CommandSpec::new(self.interpreter.as_str())
            .arg("--")
            .args(&self.args)
            .stdin(script);
        exec(ctx, &spec)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;
    use declarative::{Action, ErrorKind, Outcome};

    const INSTALLER: &str = "https://getcomposer.org/installer";

    fn composer() -> RemoteScript {
        RemoteScript::new(INSTALLER, "php", "/usr/local/bin/composer")
            .with_args(["--install-dir=/usr/local/bin", "--filename=composer"])
    }

    #[test]
    fn test_script_is_piped_to_interpreter() {
        let host = FakeHost::new().with_url(INSTALLER, "<?php // installer");
        let mut ctx = ApplyContext::new(&host);
        let action = Action::new("composer", composer());

        assert_eq!(action.run(&mut ctx).outcome, Outcome::Applied);
        assert!(host.file("/usr/local/bin/composer").is_some());

        let call = host
            .calls()
            .into_iter()
            .find(|c| c.command.starts_with("php"))
            .unwrap();
        assert_eq!(
            call.command,
            "php -- --install-dir=/usr/local/bin --filename=composer"
        );
        assert_eq!(call.stdin.as_deref(), Some("<?php // installer"));

        assert!(matches!(action.run(&mut ctx).outcome, Outcome::Skipped { .. }));
        assert_eq!(host.fetches().len(), 1);
    }

    #[test]
    fn test_download_failure_is_transient() {
        let host = FakeHost::new();
        let mut ctx = ApplyContext::new(&host);

        let result = Action::new("composer", composer()).run(&mut ctx);

        assert!(matches!(
            result.outcome,
            Outcome::Failed {
                kind: ErrorKind::Transient,
                ..
            }
        ));
        assert_eq!(host.count("php"), 0);
    }
}
