//! Ubuntu resources
//!
//! Every resource talks to the host only through the context's runner:
//! files are read with `cat` and written with `tee`, so the same code runs
//! as root or through sudo, and tests can swap in a simulated host.

mod apt;
mod database;
mod file_line;
mod public_ip;
mod remote_script;
mod service;
mod sshd;
mod tls;
mod ufw;
mod user;

pub use apt::{AptPackage, AptRepository, AptSource};
pub use database::{MysqlUser, PostgresDatabase, PostgresRole};
pub use file_line::FileLine;
pub use public_ip::{PUBLIC_IP_FACT, PublicIp};
pub use remote_script::RemoteScript;
pub use service::{Service, ServiceRestart};
pub use sshd::SshdEffective;
pub use tls::Certificate;
pub use ufw::{UfwEnabled, UfwRule, UfwSshAllowed};
pub use user::{AuthorizedKeys, UserAccount};

use cmdkit::{CommandOutput, CommandSpec};
use declarative::{ApplyContext, Result};
use std::path::Path;

/// Run a command that must succeed
pub(crate) fn exec(ctx: &ApplyContext, spec: &CommandSpec) -> Result<CommandOutput> {
    let output = ctx.runner.run(spec)?;
    Ok(output.ensure_success(spec)?)
}

/// Run a query; the exit code is left for the caller to interpret
pub(crate) fn query(ctx: &ApplyContext, spec: &CommandSpec) -> Result<CommandOutput> {
    Ok(ctx.runner.run(spec)?)
}

/// Whether a path exists on the host
pub(crate) fn path_exists(ctx: &ApplyContext, path: &Path) -> Result<bool> {
    let spec = CommandSpec::new("test").arg("-e").arg(path_arg(path));
    Ok(query(ctx, &spec)?.success())
}

/// Read a file, `None` when it does not exist
pub(crate) fn read_file(
    ctx: &ApplyContext,
    path: &Path,
    as_user: Option<&str>,
) -> Result<Option<String>> {
    let mut spec = CommandSpec::new("cat").arg("--").arg(path_arg(path));
    if let Some(user) = as_user {
        spec = spec.run_as(user);
    }

    let output = query(ctx, &spec)?;
    if output.success() {
        Ok(Some(output.stdout))
    } else if output.stderr.contains("No such file") {
        Ok(None)
    } else {
        Err(cmdkit::Error::from_output(&spec.display(), &output).into())
    }
}

/// Replace a file's content, keeping its owner and mode if it exists
pub(crate) fn write_file(
    ctx: &ApplyContext,
    path: &Path,
    content: &str,
    as_user: Option<&str>,
) -> Result<()> {
    let mut spec = CommandSpec::new("tee")
        .arg("--")
        .arg(path_arg(path))
        .stdin(content.as_bytes().to_vec());
    if let Some(user) = as_user {
        spec = spec.run_as(user);
    }
    exec(ctx, &spec)?;
    Ok(())
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Quote a value as an SQL string literal
///
/// MySQL treats backslash as an escape inside literals; PostgreSQL with
/// `standard_conforming_strings` does not.
pub(crate) fn sql_literal(value: &str, backslash_escapes: bool) -> String {
    let mut escaped = value.replace('\'', "''");
    if backslash_escapes {
        escaped = escaped.replace('\\', "\\\\");
    }
    format!("'{escaped}'")
}
