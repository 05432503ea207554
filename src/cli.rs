use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::resolver::Answers;
use crate::schema::{Feature, Param};

#[derive(Parser)]
#[command(name = "provisio")]
#[command(version)]
#[command(about = "Idempotent provisioning for fresh Ubuntu servers", long_about = None)]
#[command(propagate_version = true)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge the server to the selected features (default)
    Apply(RunArgs),

    /// Show what apply would change, without changing anything
    Plan(RunArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options shared by `apply` and `plan`
#[derive(Args, Clone, Debug, Default)]
pub struct RunArgs {
    /// Answers file (TOML) with the same keys as the flags below
    #[arg(long, value_name = "FILE", env = "PROVISIO_ANSWERS")]
    pub answers: Option<PathBuf>,

    /// Never prompt; missing values are an error
    #[arg(long)]
    pub non_interactive: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Write the JSON report to FILE
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub params: ParamArgs,
}

/// One flag per schema parameter
///
/// The database password has no flag so it never shows up in argv; it is
/// read from `PROVISIO_DB_PASSWORD`.
#[derive(Args, Clone, Debug, Default)]
pub struct ParamArgs {
    /// Comma-separated features: ssh, firewall, node, php, composer, postgres, mysql, mongodb, tls
    #[arg(long, env = "PROVISIO_FEATURES", value_parser = Feature::parse_list)]
    pub features: Option<BTreeSet<Feature>>,

    /// Sudo user to create
    #[arg(long, env = "PROVISIO_USERNAME")]
    pub username: Option<String>,

    /// Port sshd listens on
    #[arg(long, env = "PROVISIO_SSH_PORT")]
    pub ssh_port: Option<String>,

    /// authorized_keys file copied to the new user
    #[arg(long, value_name = "FILE", env = "PROVISIO_KEYS_FROM")]
    pub keys_from: Option<String>,

    /// Node.js major version
    #[arg(long, env = "PROVISIO_NODE_VERSION")]
    pub node_version: Option<String>,

    /// PHP version, e.g. 8.2
    #[arg(long, env = "PROVISIO_PHP_VERSION")]
    pub php_version: Option<String>,

    /// Database user
    #[arg(long, env = "PROVISIO_DB_USER")]
    pub db_user: Option<String>,

    /// Database name
    #[arg(long, env = "PROVISIO_DB_NAME")]
    pub db_name: Option<String>,

    /// Domain for the TLS certificate
    #[arg(long, env = "PROVISIO_DOMAIN")]
    pub domain: Option<String>,

    /// Contact email for Let's Encrypt
    #[arg(long, env = "PROVISIO_EMAIL")]
    pub email: Option<String>,
}

pub const ENV_DB_PASSWORD: &str = "PROVISIO_DB_PASSWORD";

impl ParamArgs {
    /// Values given on the command line or in the environment
    pub fn into_answers(self, db_password: Option<String>) -> Answers {
        let mut answers = Answers::default();
        answers.features = self.features;
        answers.set_opt(Param::Username, self.username);
        answers.set_opt(Param::SshPort, self.ssh_port);
        answers.set_opt(Param::KeysFrom, self.keys_from);
        answers.set_opt(Param::NodeVersion, self.node_version);
        answers.set_opt(Param::PhpVersion, self.php_version);
        answers.set_opt(Param::DbUser, self.db_user);
        answers.set_opt(Param::DbPassword, db_password.filter(|p| !p.is_empty()));
        answers.set_opt(Param::DbName, self.db_name);
        answers.set_opt(Param::Domain, self.domain);
        answers.set_opt(Param::Email, self.email);
        answers
    }
}
