//! Simulated Ubuntu host for resource, plan, and run tests
//!
//! Understands the handful of commands the resources issue and keeps the
//! resulting host state in memory. Every command is recorded so tests can
//! assert on what ran, and any command can be made to fail by prefix.

use cmdkit::{CommandOutput, CommandSpec, RetryConfig, Runner};
use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unit {
    pub enabled: bool,
    pub active: bool,
}

#[derive(Debug, Default)]
pub struct HostState {
    pub packages: BTreeMap<String, String>,
    pub files: BTreeMap<String, String>,
    pub users: BTreeMap<String, BTreeSet<String>>,
    pub units: BTreeMap<String, Unit>,
    pub ufw_rules: Vec<String>,
    pub ufw_active: bool,
    pub pg_roles: BTreeSet<String>,
    pub pg_databases: BTreeSet<String>,
    pub mysql_users: BTreeSet<String>,
    pub mysql_databases: BTreeSet<String>,
    /// (user, database) schema-level grants
    pub mysql_grants: BTreeSet<(String, String)>,
    pub restarts: Vec<String>,
    /// TCP ports sshd is listening on
    pub listening: BTreeSet<u16>,
}

/// One recorded invocation
#[derive(Debug, Clone)]
pub struct Call {
    pub command: String,
    pub stdin: Option<String>,
    pub run_as: Option<String>,
}

#[derive(Default)]
pub struct FakeHost {
    state: RefCell<HostState>,
    calls: RefCell<Vec<Call>>,
    fetches: RefCell<Vec<String>>,
    failures: Vec<(String, CommandOutput)>,
    urls: BTreeMap<String, Vec<u8>>,
    versions: BTreeMap<String, String>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh Ubuntu server: root has keys, sshd runs with stock config
    pub fn ubuntu() -> Self {
        Self::new()
            .with_file("/etc/ssh/sshd_config", STOCK_SSHD_CONFIG)
            .with_file(
                "/root/.ssh/authorized_keys",
                "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOPS ops@laptop\n",
            )
            .with_file("/usr/sbin/sshd", "")
            .with_unit("ssh", true, true)
            .listening_on(22)
            .with_url("https://api.ipify.org", "203.0.113.7\n")
    }

    pub fn with_package(self, name: &str, version: &str) -> Self {
        self.state
            .borrow_mut()
            .packages
            .insert(name.into(), version.into());
        self
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.state
            .borrow_mut()
            .files
            .insert(path.into(), content.into());
        self
    }

    pub fn with_user(self, name: &str, groups: &[&str]) -> Self {
        let mut set: BTreeSet<String> = groups.iter().map(|g| (*g).to_string()).collect();
        set.insert(name.to_string());
        self.state.borrow_mut().users.insert(name.into(), set);
        self
    }

    pub fn with_unit(self, name: &str, enabled: bool, active: bool) -> Self {
        self.state
            .borrow_mut()
            .units
            .insert(name.into(), Unit { enabled, active });
        self
    }

    /// A MySQL user and database that exist, with no grant between them
    pub fn with_mysql_user(self, user: &str, database: &str) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.mysql_users.insert(user.into());
            state.mysql_databases.insert(database.into());
        }
        self
    }

    pub fn listening_on(self, port: u16) -> Self {
        self.state.borrow_mut().listening.insert(port);
        self
    }

    pub fn with_url(mut self, url: &str, body: &str) -> Self {
        self.urls.insert(url.into(), body.as_bytes().to_vec());
        self
    }

    /// Version apt-get installs for a package (default "1.0-1")
    pub fn with_candidate(mut self, name: &str, version: &str) -> Self {
        self.versions.insert(name.into(), version.into());
        self
    }

    /// Make every command whose display starts with `prefix` fail
    pub fn failing(mut self, prefix: &str, exit_code: i32, stderr: &str) -> Self {
        self.failures
            .push((prefix.into(), CommandOutput::failed(exit_code, stderr)));
        self
    }

    pub fn state(&self) -> Ref<'_, HostState> {
        self.state.borrow()
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.borrow().files.get(path).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Commands run so far, as displayed
    pub fn commands(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.command.clone()).collect()
    }

    /// Number of commands starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.command.starts_with(prefix))
            .count()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.borrow().clone()
    }

    fn handle(&self, spec: &CommandSpec) -> CommandOutput {
        let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
        let stdin = spec
            .stdin
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();
        let mut state = self.state.borrow_mut();

        match spec.program.as_str() {
            "dpkg-query" => {
                let mut stdout = String::new();
                let mut stderr = String::new();
                for name in args.iter().filter(|a| !a.starts_with('-')) {
                    match state.packages.get(*name) {
                        Some(version) => {
                            stdout.push_str(&format!("{name}\tinstalled\t{version}\n"));
                        }
                        None => stderr.push_str(&format!(
                            "dpkg-query: no packages found matching {name}\n"
                        )),
                    }
                }
                CommandOutput {
                    exit_code: i32::from(!stderr.is_empty()),
                    stdout,
                    stderr,
                }
            }
            "apt-get" => {
                if args.first() == Some(&"install") {
                    for name in args.iter().skip(1).filter(|a| !a.starts_with('-')) {
                        let version = self
                            .versions
                            .get(*name)
                            .cloned()
                            .unwrap_or_else(|| "1.0-1".into());
                        state.packages.insert((*name).to_string(), version);
                    }
                }
                CommandOutput::ok("")
            }
            "add-apt-repository" => {
                if let Some(ppa) = args.iter().find_map(|a| a.strip_prefix("ppa:")) {
                    let (owner, name) = ppa.split_once('/').unwrap_or((ppa, ppa));
                    state.files.insert(
                        format!("/etc/apt/sources.list.d/{owner}-ubuntu-{name}-noble.sources"),
                        format!("URIs: https://ppa.launchpadcontent.net/{owner}/{name}/ubuntu/\n"),
                    );
                }
                CommandOutput::ok("")
            }
            "grep" => {
                let needle = args.iter().rev().nth(1).copied().unwrap_or_default();
                let dir = args.last().copied().unwrap_or_default();
                let ignore_case = args
                    .iter()
                    .any(|a| a.starts_with('-') && !a.starts_with("--") && a.contains('i'));
                let matches = |content: &str| {
                    if ignore_case {
                        content.to_lowercase().contains(&needle.to_lowercase())
                    } else {
                        content.contains(needle)
                    }
                };
                let hits: Vec<&String> = state
                    .files
                    .iter()
                    .filter(|(path, content)| path.starts_with(dir) && matches(content))
                    .map(|(path, _)| path)
                    .collect();
                if hits.is_empty() {
                    CommandOutput::failed(1, "")
                } else {
                    CommandOutput::ok(hits.iter().map(|p| format!("{p}\n")).collect::<String>())
                }
            }
            "gpg" => {
                if let Some(pos) = args.iter().position(|a| *a == "-o") {
                    if let Some(path) = args.get(pos + 1) {
                        state
                            .files
                            .insert((*path).to_string(), format!("dearmored:{stdin}"));
                    }
                }
                CommandOutput::ok("")
            }
            "sshd" if args == ["-T"] => match effective_sshd(&state.files) {
                Some(settings) => CommandOutput::ok(
                    settings
                        .iter()
                        .map(|(k, v)| format!("{k} {v}\n"))
                        .collect::<String>(),
                ),
                None => CommandOutput::failed(
                    255,
                    "/etc/ssh/sshd_config: No such file or directory\n",
                ),
            },
            "ss" => {
                let port = args
                    .last()
                    .and_then(|a| a.strip_prefix(':'))
                    .and_then(|p| p.parse::<u16>().ok());
                match port.filter(|p| state.listening.contains(p)) {
                    Some(p) => CommandOutput::ok(format!("LISTEN 0 4096 0.0.0.0:{p} 0.0.0.0:*\n")),
                    None => CommandOutput::ok(""),
                }
            }
            "install" | "chown" | "chmod" | "sshd" => CommandOutput::ok(""),
            "cat" => {
                let path = args.last().copied().unwrap_or_default();
                match state.files.get(path) {
                    Some(content) => CommandOutput::ok(content.clone()),
                    None => CommandOutput::failed(
                        1,
                        format!("cat: {path}: No such file or directory\n"),
                    ),
                }
            }
            "tee" => {
                let path = args.last().copied().unwrap_or_default();
                state.files.insert(path.to_string(), stdin.clone());
                CommandOutput::ok(stdin)
            }
            "test" => {
                let path = args.last().copied().unwrap_or_default();
                let exists = state.files.contains_key(path)
                    || state.files.keys().any(|p| p.starts_with(&format!("{path}/")));
                CommandOutput {
                    exit_code: i32::from(!exists),
                    stdout: String::new(),
                    stderr: String::new(),
                }
            }
            "id" => {
                let user = args.last().copied().unwrap_or_default();
                match state.users.get(user) {
                    Some(groups) => {
                        // Primary group first, like the real tool
                        let mut names = vec![user.to_string()];
                        names.extend(groups.iter().filter(|g| *g != user).cloned());
                        CommandOutput::ok(format!("{}\n", names.join(" ")))
                    }
                    None => CommandOutput::failed(1, format!("id: '{user}': no such user\n")),
                }
            }
            "adduser" => {
                let user = args.last().copied().unwrap_or_default();
                if state.users.contains_key(user) {
                    CommandOutput::failed(1, format!("adduser: The user `{user}' already exists.\n"))
                } else {
                    state
                        .users
                        .insert(user.to_string(), [user.to_string()].into());
                    state.files.insert(
                        format!("/home/{user}/.bashrc"),
                        "# ~/.bashrc\nalias ll='ls -alF'\n".into(),
                    );
                    CommandOutput::ok("")
                }
            }
            "usermod" => {
                let group = args.get(1).copied().unwrap_or_default();
                let user = args.last().copied().unwrap_or_default();
                match state.users.get_mut(user) {
                    Some(groups) => {
                        groups.insert(group.to_string());
                        CommandOutput::ok("")
                    }
                    None => CommandOutput::failed(6, format!("usermod: user '{user}' does not exist\n")),
                }
            }
            "systemctl" => {
                let unit = args.last().copied().unwrap_or_default().to_string();
                match args.first().copied() {
                    Some("is-enabled") => match state.units.get(&unit) {
                        Some(u) if u.enabled => CommandOutput::ok("enabled\n"),
                        Some(_) => CommandOutput {
                            exit_code: 1,
                            stdout: "disabled\n".into(),
                            stderr: String::new(),
                        },
                        None => CommandOutput::failed(
                            1,
                            format!("Failed to get unit file state for {unit}.service: No such file or directory\n"),
                        ),
                    },
                    Some("is-active") => match state.units.get(&unit) {
                        Some(u) if u.active => CommandOutput::ok("active\n"),
                        _ => CommandOutput {
                            exit_code: 3,
                            stdout: "inactive\n".into(),
                            stderr: String::new(),
                        },
                    },
                    Some("enable") => {
                        state.units.insert(
                            unit,
                            Unit {
                                enabled: true,
                                active: true,
                            },
                        );
                        CommandOutput::ok("")
                    }
                    Some("restart") => {
                        if unit == "ssh" {
                            let ports = effective_sshd(&state.files)
                                .unwrap_or_default()
                                .into_iter()
                                .filter(|(k, _)| k == "port")
                                .filter_map(|(_, v)| v.parse().ok())
                                .collect();
                            state.listening = ports;
                        }
                        state.units.entry(unit.clone()).or_default().active = true;
                        state.restarts.push(unit);
                        CommandOutput::ok("")
                    }
                    Some("try-restart") => {
                        if state.units.get(&unit).is_some_and(|u| u.active) {
                            state.restarts.push(unit);
                        }
                        CommandOutput::ok("")
                    }
                    _ => CommandOutput::ok(""),
                }
            }
            "ufw" => match args.as_slice() {
                ["show", "added"] => {
                    let mut out =
                        String::from("Added user rules (see 'ufw status' for running firewall):\n");
                    for rule in &state.ufw_rules {
                        out.push_str(&format!("ufw allow {rule}\n"));
                    }
                    CommandOutput::ok(out)
                }
                ["allow", rule] => {
                    if !state.ufw_rules.iter().any(|r| r.as_str() == *rule) {
                        state.ufw_rules.push((*rule).to_string());
                    }
                    CommandOutput::ok("Rule added\n")
                }
                ["status"] => CommandOutput::ok(if state.ufw_active {
                    "Status: active\n"
                } else {
                    "Status: inactive\n"
                }),
                ["--force", "enable"] => {
                    state.ufw_active = true;
                    CommandOutput::ok("Firewall is active and enabled on system startup\n")
                }
                _ => CommandOutput::failed(1, "ERROR: Invalid syntax\n"),
            },
            "psql" => {
                if let Some(pos) = args.iter().position(|a| *a == "-tAc") {
                    let sql = args.get(pos + 1).copied().unwrap_or_default();
                    let found = if let Some(role) = quoted_after(sql, "rolname = '", '\'') {
                        state.pg_roles.contains(&role)
                    } else if let Some(db) = quoted_after(sql, "datname = '", '\'') {
                        state.pg_databases.contains(&db)
                    } else {
                        false
                    };
                    CommandOutput::ok(if found { "1\n" } else { "" })
                } else if let Some(role) = quoted_after(&stdin, "CREATE ROLE \"", '"') {
                    state.pg_roles.insert(role);
                    CommandOutput::ok("CREATE ROLE\n")
                } else {
                    CommandOutput::ok("")
                }
            }
            "createdb" => {
                let name = args.last().copied().unwrap_or_default();
                state.pg_databases.insert(name.to_string());
                CommandOutput::ok("")
            }
            "mysql" => {
                if let Some(pos) = args.iter().position(|a| *a == "-e") {
                    let sql = args.get(pos + 1).copied().unwrap_or_default();
                    let user = quoted_after(sql, "User = '", '\'').unwrap_or_default();
                    let db = quoted_after(sql, "SCHEMA_NAME = '", '\'').unwrap_or_default();
                    let granted = state.mysql_grants.contains(&(user.clone(), db.clone()));
                    CommandOutput::ok(format!(
                        "{}\t{}\t{}\n",
                        u8::from(state.mysql_users.contains(&user)),
                        u8::from(state.mysql_databases.contains(&db)),
                        u8::from(granted)
                    ))
                } else {
                    if let Some(db) = quoted_after(&stdin, "CREATE DATABASE IF NOT EXISTS `", '`') {
                        state.mysql_databases.insert(db);
                    }
                    if let Some(user) = quoted_after(&stdin, "CREATE USER IF NOT EXISTS '", '\'') {
                        state.mysql_users.insert(user);
                    }
                    let grant = quoted_after(&stdin, "GRANT ALL PRIVILEGES ON `", '`')
                        .zip(quoted_after(&stdin, "`.* TO '", '\''));
                    if let Some((db, user)) = grant {
                        state.mysql_grants.insert((user, db));
                    }
                    CommandOutput::ok("")
                }
            }
            "certbot" => {
                if let Some(pos) = args.iter().position(|a| *a == "-d") {
                    if let Some(domain) = args.get(pos + 1) {
                        state.files.insert(
                            format!("/etc/letsencrypt/live/{domain}/fullchain.pem"),
                            "-----BEGIN CERTIFICATE-----\n".into(),
                        );
                    }
                }
                CommandOutput::ok("Successfully deployed certificate\n")
            }
            "php" => {
                let dir = args
                    .iter()
                    .find_map(|a| a.strip_prefix("--install-dir="))
                    .unwrap_or("/usr/local/bin");
                let name = args
                    .iter()
                    .find_map(|a| a.strip_prefix("--filename="))
                    .unwrap_or("composer.phar");
                state
                    .files
                    .insert(format!("{dir}/{name}"), "#!/usr/bin/env php\n".into());
                CommandOutput::ok("Composer (version 2.7.7) successfully installed\n")
            }
            other => CommandOutput::failed(127, format!("{other}: command not found\n")),
        }
    }
}

impl Runner for FakeHost {
    fn run(&self, spec: &CommandSpec) -> cmdkit::Result<CommandOutput> {
        let command = spec.display();
        self.calls.borrow_mut().push(Call {
            command: command.clone(),
            stdin: spec
                .stdin
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).into_owned()),
            run_as: spec.run_as.clone(),
        });

        if let Some((_, output)) = self
            .failures
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
        {
            return Ok(output.clone());
        }

        Ok(self.handle(spec))
    }

    fn fetch(&self, url: &str, _retry: &RetryConfig) -> cmdkit::Result<Vec<u8>> {
        self.fetches.borrow_mut().push(url.to_string());
        self.urls
            .get(url)
            .cloned()
            .ok_or_else(|| cmdkit::Error::Network {
                message: format!("could not resolve host for {url}"),
            })
    }
}

/// Text between `marker` and the next `end` character
fn quoted_after(text: &str, marker: &str, end: char) -> Option<String> {
    let start = text.find(marker)? + marker.len();
    let rest = &text[start..];
    let stop = rest.find(end)?;
    Some(rest[..stop].to_string())
}

/// What `sshd -T` would print: drop-ins are read where the main file
/// includes them, the first value of a keyword wins, `Port` accumulates.
fn effective_sshd(files: &BTreeMap<String, String>) -> Option<Vec<(String, String)>> {
    let main = files.get("/etc/ssh/sshd_config")?;
    let mut lines: Vec<&str> = Vec::new();
    for line in main.lines() {
        if line.trim_start().starts_with("Include ") {
            lines.extend(
                files
                    .iter()
                    .filter(|(path, _)| {
                        path.starts_with("/etc/ssh/sshd_config.d/") && path.ends_with(".conf")
                    })
                    .flat_map(|(_, content)| content.lines()),
            );
        } else {
            lines.push(line);
        }
    }

    let mut ports = Vec::new();
    let mut settings: Vec<(String, String)> = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        let key = key.to_ascii_lowercase();
        let value = value.trim().to_string();
        if key == "port" {
            ports.push(value);
        } else if !settings.iter().any(|(k, _)| *k == key) {
            settings.push((key, value));
        }
    }
    if ports.is_empty() {
        ports.push("22".into());
    }
    for (key, default) in [
        ("permitrootlogin", "without-password"),
        ("passwordauthentication", "yes"),
    ] {
        if !settings.iter().any(|(k, _)| k == key) {
            settings.push((key.into(), default.into()));
        }
    }

    let mut out: Vec<(String, String)> = ports.into_iter().map(|p| ("port".into(), p)).collect();
    out.extend(settings);
    Some(out)
}

pub const STOCK_SSHD_CONFIG: &str = "\
Include /etc/ssh/sshd_config.d/*.conf

#Port 22
#AddressFamily any
#ListenAddress 0.0.0.0

#LoginGraceTime 2m
#PermitRootLogin prohibit-password
#StrictModes yes

#PubkeyAuthentication yes

# To disable tunneled clear text passwords, change to no here!
#PasswordAuthentication yes
#PermitEmptyPasswords no

KbdInteractiveAuthentication no
UsePAM yes
X11Forwarding yes
PrintMotd no
";
