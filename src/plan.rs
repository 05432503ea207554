//! The step list for a run, built from the frozen configuration
//!
//! Order matters: SSH is hardened and restarted before the firewall is
//! enabled, so a failed hardening step halts the run while the old port
//! is still reachable.

use anyhow::{Result, bail};
use declarative::{Action, StepGraph};
use regex::Regex;
use std::sync::LazyLock;

use crate::host::HostFacts;
use crate::resource::{
    AptPackage, AptRepository, AptSource, AuthorizedKeys, Certificate, FileLine, MysqlUser,
    PostgresDatabase, PostgresRole, PublicIp, RemoteScript, Service, ServiceRestart, SshdEffective,
    UfwEnabled, UfwRule, UfwSshAllowed, UserAccount,
};
use crate::run_config::RunConfig;
use crate::schema::Feature;

pub const BASE_PACKAGES: &str = "base-packages";
pub const SUDO_USER: &str = "sudo-user";
pub const AUTHORIZED_KEYS: &str = "authorized-keys";
pub const SSHD_PORT: &str = "sshd-port";
pub const SSHD_ROOT_LOGIN: &str = "sshd-root-login";
pub const SSHD_PASSWORD_AUTH: &str = "sshd-password-auth";
pub const SSHD_EFFECTIVE: &str = "sshd-effective";
pub const SSHD_RESTART: &str = "sshd-restart";
pub const UFW_ALLOW_SSH: &str = "ufw-allow-ssh";
pub const UFW_ALLOW_HTTP: &str = "ufw-allow-http";
pub const UFW_ALLOW_HTTPS: &str = "ufw-allow-https";
pub const UFW_ENABLE: &str = "ufw-enable";
pub const NODESOURCE_REPO: &str = "nodesource-repo";
pub const NODEJS: &str = "nodejs";
pub const PHP_PPA: &str = "php-ppa";
pub const PHP: &str = "php";
pub const PHP_EXTENSIONS: &str = "php-extensions";
pub const COMPOSER: &str = "composer";
pub const COMPOSER_PATH: &str = "composer-path";
pub const POSTGRES_SERVER: &str = "postgres-server";
pub const POSTGRES_SERVICE: &str = "postgres-service";
pub const POSTGRES_ROLE: &str = "postgres-role";
pub const POSTGRES_DATABASE: &str = "postgres-database";
pub const MYSQL_SERVER: &str = "mysql-server";
pub const MYSQL_SERVICE: &str = "mysql-service";
pub const MYSQL_USER: &str = "mysql-user";
pub const MONGODB_REPO: &str = "mongodb-repo";
pub const MONGODB_SERVER: &str = "mongodb-server";
pub const MONGODB_SERVICE: &str = "mongodb-service";
pub const NGINX: &str = "nginx";
pub const NGINX_SERVICE: &str = "nginx-service";
pub const CERTBOT: &str = "certbot";
pub const CERTIFICATE: &str = "certificate";
pub const PUBLIC_IP: &str = "public-ip";

const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";

const NODESOURCE_KEY: &str = "https://deb.nodesource.com/gpgkey/nodesource-repo.gpg.key";
const MONGODB_KEY: &str = "https://www.mongodb.org/static/pgp/server-8.0.asc";
const COMPOSER_INSTALLER: &str = "https://getcomposer.org/installer";
const COMPOSER_BIN_DIR: &str = "/usr/local/bin";
const COMPOSER_PATH_LINE: &str = r#"export PATH="$HOME/.config/composer/vendor/bin:$PATH""#;

const PHP_EXTENSION_NAMES: [&str; 7] = ["mbstring", "xml", "curl", "zip", "bcmath", "intl", "gd"];

static SSHD_PORT_ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#?\s*Port\s").unwrap());
static SSHD_ROOT_LOGIN_ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#?\s*PermitRootLogin\s").unwrap());
static SSHD_PASSWORD_AUTH_ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#?\s*PasswordAuthentication\s").unwrap());
static COMPOSER_PATH_ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*#?\s*export\s+PATH=.*composer").unwrap());

/// Build the ordered step list for `config`
pub fn build(config: &RunConfig, host: &HostFacts) -> Result<StepGraph> {
    let mut graph = StepGraph::new();

    base(&mut graph, config)?;
    if let Some(ssh) = &config.ssh {
        harden_ssh(&mut graph, config, ssh.port, &ssh.keys_from)?;
    }
    if config.has(Feature::Firewall) {
        firewall(&mut graph, config)?;
    }
    if let Some(version) = &config.node_version {
        node(&mut graph, version)?;
    }
    if let Some(version) = &config.php_version {
        php(&mut graph, config, version)?;
        if config.has(Feature::Composer) {
            composer(&mut graph, config)?;
        }
    }
    if let Some(db) = config.db.as_ref().filter(|_| config.has(Feature::Postgres)) {
        graph.push(Action::new(
            POSTGRES_SERVER,
            AptPackage::new(["postgresql", "postgresql-contrib"]),
        ))?;
        graph.push(Action::new(POSTGRES_SERVICE, Service::new("postgresql")).after([POSTGRES_SERVER]))?;
        graph.push(
            Action::new(POSTGRES_ROLE, PostgresRole::new(&db.user, db.password.clone()))
                .after([POSTGRES_SERVICE]),
        )?;
        graph.push(
            Action::new(POSTGRES_DATABASE, PostgresDatabase::new(&db.name, &db.user))
                .after([POSTGRES_ROLE]),
        )?;
    }
    if let Some(db) = config.db.as_ref().filter(|_| config.has(Feature::Mysql)) {
        graph.push(Action::new(MYSQL_SERVER, AptPackage::new(["mysql-server"])))?;
        graph.push(Action::new(MYSQL_SERVICE, Service::new("mysql")).after([MYSQL_SERVER]))?;
        graph.push(
            Action::new(
                MYSQL_USER,
                MysqlUser::new(&db.user, db.password.clone(), &db.name),
            )
            .after([MYSQL_SERVICE]),
        )?;
    }
    if config.has(Feature::Mongodb) {
        mongodb(&mut graph, host)?;
    }
    if let Some(tls) = &config.tls {
        graph.push(Action::new(NGINX, AptPackage::new(["nginx"])))?;
        graph.push(Action::new(NGINX_SERVICE, Service::new("nginx")).after([NGINX]))?;
        graph.push(Action::new(
            CERTBOT,
            AptPackage::new(["certbot", "python3-certbot-nginx"]),
        ))?;
        graph.push(
            Action::new(CERTIFICATE, Certificate::new(&tls.domain, &tls.email))
                .soft()
                .after([NGINX_SERVICE, CERTBOT]),
        )?;
    }

    graph.push(Action::new(PUBLIC_IP, PublicIp::new()).soft())?;

    Ok(graph)
}

fn base(graph: &mut StepGraph, config: &RunConfig) -> Result<()> {
    let mut packages = vec!["curl", "ca-certificates", "gnupg", "software-properties-common"];
    if config.has(Feature::Firewall) {
        packages.push("ufw");
    }
    graph.push(Action::new(BASE_PACKAGES, AptPackage::new(packages)))?;
    graph.push(Action::new(SUDO_USER, UserAccount::new(&config.username)))?;
    Ok(())
}

fn harden_ssh(
    graph: &mut StepGraph,
    config: &RunConfig,
    port: u16,
    keys_from: &std::path::Path,
) -> Result<()> {
    graph.push(
        Action::new(AUTHORIZED_KEYS, AuthorizedKeys::new(&config.username, keys_from))
            .after([SUDO_USER]),
    )?;

    let edits = [
        (SSHD_PORT, &*SSHD_PORT_ANCHOR, format!("Port {port}")),
        (SSHD_ROOT_LOGIN, &*SSHD_ROOT_LOGIN_ANCHOR, "PermitRootLogin no".to_string()),
        (
            SSHD_PASSWORD_AUTH,
            &*SSHD_PASSWORD_AUTH_ANCHOR,
            "PasswordAuthentication no".to_string(),
        ),
    ];
    for (name, anchor, line) in edits {
        graph.push(
            Action::new(name, FileLine::new(SSHD_CONFIG, anchor.clone(), line))
                .after([AUTHORIZED_KEYS]),
        )?;
    }

    let port_value = port.to_string();
    graph.push(
        Action::new(
            SSHD_EFFECTIVE,
            SshdEffective::new([
                ("Port", port_value.as_str()),
                ("PermitRootLogin", "no"),
                ("PasswordAuthentication", "no"),
            ]),
        )
        .after([SSHD_PORT, SSHD_ROOT_LOGIN, SSHD_PASSWORD_AUTH]),
    )?;

    graph.push(
        Action::new(
            SSHD_RESTART,
            ServiceRestart::new("ssh", [SSHD_PORT, SSHD_ROOT_LOGIN, SSHD_PASSWORD_AUTH])
                .with_config_test(["sshd", "-t"])
                .with_companion("ssh.socket")
                .with_listen_port(port),
        )
        .after([SSHD_EFFECTIVE]),
    )?;
    Ok(())
}

fn firewall(graph: &mut StepGraph, config: &RunConfig) -> Result<()> {
    let allow_ssh = match &config.ssh {
        Some(ssh) => Action::new(UFW_ALLOW_SSH, UfwRule::allow(format!("{}/tcp", ssh.port)))
            .after([BASE_PACKAGES, SSHD_RESTART]),
        None => Action::new(UFW_ALLOW_SSH, UfwSshAllowed).after([BASE_PACKAGES]),
    };
    graph.push(allow_ssh)?;

    if config.tls.is_some() {
        graph.push(Action::new(UFW_ALLOW_HTTP, UfwRule::allow("80/tcp")).after([BASE_PACKAGES]))?;
        graph.push(Action::new(UFW_ALLOW_HTTPS, UfwRule::allow("443/tcp")).after([BASE_PACKAGES]))?;
    }

    graph.push(Action::new(UFW_ENABLE, UfwEnabled).after([UFW_ALLOW_SSH]))?;
    Ok(())
}

fn node(graph: &mut StepGraph, version: &str) -> Result<()> {
    let line = format!(
        "deb [signed-by={{keyring}}] https://deb.nodesource.com/node_{version}.x nodistro main"
    );
    graph.push(Action::new(
        NODESOURCE_REPO,
        AptSource::new("nodesource", NODESOURCE_KEY, &line),
    ))?;
    graph.push(
        Action::new(
            NODEJS,
            AptPackage::new(["nodejs"]).with_version_prefix(format!("{version}.")),
        )
        .after([NODESOURCE_REPO]),
    )?;
    Ok(())
}

fn php(graph: &mut StepGraph, config: &RunConfig, version: &str) -> Result<()> {
    graph.push(Action::new(PHP_PPA, AptRepository::ppa("ppa:ondrej/php")))?;
    graph.push(
        Action::new(
            PHP,
            AptPackage::new([
                format!("php{version}"),
                format!("php{version}-cli"),
                format!("php{version}-common"),
            ]),
        )
        .after([PHP_PPA]),
    )?;

    let mut extensions: Vec<&str> = PHP_EXTENSION_NAMES.to_vec();
    if config.has(Feature::Postgres) {
        extensions.push("pgsql");
    }
    if config.has(Feature::Mysql) {
        extensions.push("mysql");
    }
    if config.has(Feature::Mongodb) {
        extensions.push("mongodb");
    }
    graph.push(
        Action::new(
            PHP_EXTENSIONS,
            AptPackage::new(extensions.iter().map(|ext| format!("php{version}-{ext}"))),
        )
        .after([PHP]),
    )?;
    Ok(())
}

fn composer(graph: &mut StepGraph, config: &RunConfig) -> Result<()> {
    graph.push(
        Action::new(
            COMPOSER,
            RemoteScript::new(
                COMPOSER_INSTALLER,
                "php",
                format!("{COMPOSER_BIN_DIR}/composer"),
            )
            .with_args([
                format!("--install-dir={COMPOSER_BIN_DIR}"),
                "--filename=composer".to_string(),
            ]),
        )
        .after([PHP]),
    )?;
    graph.push(
        Action::new(
            COMPOSER_PATH,
            FileLine::new(
                config.home_dir().join(".bashrc"),
                COMPOSER_PATH_ANCHOR.clone(),
                COMPOSER_PATH_LINE,
            )
            .create_if_missing()
            .owned_by(&config.username),
        )
        .after([SUDO_USER, COMPOSER]),
    )?;
    Ok(())
}

fn mongodb(graph: &mut StepGraph, host: &HostFacts) -> Result<()> {
    let Some(codename) = host.codename.as_deref() else {
        bail!("MongoDB needs the Ubuntu release codename, but /etc/os-release has none");
    };
    let line = format!(
        "deb [ arch=amd64,arm64 signed-by={{keyring}} ] https://repo.mongodb.org/apt/ubuntu {codename}/mongodb-org/8.0 multiverse"
    );
    graph.push(
        Action::new(
            MONGODB_REPO,
            AptSource::new("mongodb-org-8.0", MONGODB_KEY, &line),
        )
        .soft(),
    )?;
    graph.push(Action::new(MONGODB_SERVER, AptPackage::new(["mongodb-org"])).after([MONGODB_REPO]))?;
    graph.push(Action::new(MONGODB_SERVICE, Service::new("mongod")).after([MONGODB_SERVER]))?;
    Ok(())
}
