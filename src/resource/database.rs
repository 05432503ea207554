//! Database roles, users, and schemas
//!
//! Passwords travel only in the stdin of `psql` and `mysql`, never on a
//! command line where `ps` or the audit trail would show them. Names reach
//! SQL only after identifier validation, and are quoted as identifiers.

use cmdkit::CommandSpec;
use declarative::{ApplyContext, Resource, ResourceState, Result};

use super::{exec, sql_literal};
use crate::secret::Secret;

const POSTGRES_USER: &str = "postgres";

fn psql() -> CommandSpec {
    CommandSpec::new("psql").run_as(POSTGRES_USER)
}

/// Whether a catalog query returns a row
fn pg_exists(ctx: &ApplyContext, sql: &str) -> Result<bool> {
    let output = exec(ctx, &psql().arg("-tAc").arg(sql))?;
    Ok(output.stdout_trimmed() == "1")
}

/// A PostgreSQL login role with a password
#[derive(Debug, Clone)]
pub struct PostgresRole {
    user: String,
    password: Secret,
}

impl PostgresRole {
    pub fn new(user: impl Into<String>, password: Secret) -> Self {
        Self {
            user: user.into(),
            password,
        }
    }
}

impl Resource for PostgresRole {
    fn id(&self) -> String {
        self.user.clone()
    }

    fn description(&self) -> String {
        format!("Create PostgreSQL role {}", self.user)
    }

    fn resource_type(&self) -> &'static str {
        "postgres_role"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let sql = format!(
            "SELECT 1 FROM pg_roles WHERE rolname = {}",
            sql_literal(&self.user, false)
        );
        Ok(if pg_exists(ctx, &sql)? {
            ResourceState::present_with(self.user.clone())
        } else {
            ResourceState::Absent
        })
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        let sql = format!(
            "CREATE ROLE \"{}\" LOGIN PASSWORD {};\n",
            self.user,
            sql_literal(self.password.expose(), false)
        );
        exec(
            ctx,
            &psql()
                .args(["-v", "ON_ERROR_STOP=1"])
                .stdin(sql.into_bytes()),
        )?;
        Ok(())
    }
}

/// A PostgreSQL database owned by a role
#[derive(Debug, Clone)]
pub struct PostgresDatabase {
    name: String,
    owner: String,
}

impl PostgresDatabase {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
        }
    }
}

impl Resource for PostgresDatabase {
    fn id(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        format!("Create PostgreSQL database {} owned by {}", self.name, self.owner)
    }

    fn resource_type(&self) -> &'static str {
        "postgres_database"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let sql = format!(
            "SELECT 1 FROM pg_database WHERE datname = {}",
            sql_literal(&self.name, false)
        );
        Ok(if pg_exists(ctx, &sql)? {
            ResourceState::present_with(self.name.clone())
        } else {
            ResourceState::Absent
        })
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        let spec = CommandSpec::new("createdb")
            .run_as(POSTGRES_USER)
            .arg("-O")
            .arg(&self.owner)
            .arg(&self.name);
        exec(ctx, &spec)?;
        Ok(())
    }
}

/// A MySQL user with full rights on its own database
#[derive(Debug, Clone)]
pub struct MysqlUser {
    user: String,
    password: Secret,
    database: String,
}

impl MysqlUser {
    pub fn new(user: impl Into<String>, password: Secret, database: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password,
            database: database.into(),
        }
    }
}

impl Resource for MysqlUser {
    fn id(&self) -> String {
        format!("{}@localhost", self.user)
    }

    fn description(&self) -> String {
        format!(
            "Create MySQL user {} with access to {}",
            self.user, self.database
        )
    }

    fn resource_type(&self) -> &'static str {
        "mysql_user"
    }

    fn probe(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        let user = sql_literal(&self.user, true);
        let db = sql_literal(&self.database, true);
        // User row, schema, and the schema-level grant from apply.
        let sql = format!(
            "SELECT (SELECT COUNT(*) FROM mysql.user WHERE User = {user} AND Host = 'localhost'), \
             (SELECT COUNT(*) FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = {db}), \
             (SELECT COUNT(*) FROM mysql.db WHERE User = {user} AND Host = 'localhost' AND Db = {db})"
        );
        let output = exec(ctx, &CommandSpec::new("mysql").args(["-N", "-B", "-e"]).arg(sql))?;

        let counts: Vec<&str> = output.stdout_trimmed().split('\t').collect();
        Ok(match counts.as_slice() {
            ["1", "1", "1"] => ResourceState::present_with(format!(
                "{}@localhost on {}",
                self.user, self.database
            )),
            _ => ResourceState::Absent,
        })
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<()> {
        let account = format!("{}@'localhost'", sql_literal(&self.user, true));
        let sql = format!(
            "CREATE DATABASE IF NOT EXISTS `{db}`;\n\
             CREATE USER IF NOT EXISTS {account} IDENTIFIED BY {password};\n\
             GRANT ALL PRIVILEGES ON `{db}`.* TO {account};\n\
             FLUSH PRIVILEGES;\n",
            db = self.database,
            password = sql_literal(self.password.expose(), true),
        );
        exec(ctx, &CommandSpec::new("mysql").stdin(sql.into_bytes()))?;
        Ok(())
    }
}
