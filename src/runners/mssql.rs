//! Microsoft SQL Server runner.
//!
//! Full database backups are taken with `BACKUP DATABASE ... TO DISK` into the
//! server's backup directory and then moved into the artifact store; restore
//! stages the artifact back and runs `RESTORE DATABASE ... WITH REPLACE`.
//! Statements are executed through a [`SqlExecutor`], by default the
//! `sqlcmd` command line client.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::info;

use crate::command::run_command;
use crate::config::{Target, keys};
use crate::connection_string::ConnectionString;
use crate::error::{Result, SnapError};
use crate::runner::{RunContext, TargetRunner};

/// Registry key of this runner.
pub const MSSQL_TYPE: &str = "mssql";
/// Artifact file extension.
pub const BACKUP_EXTENSION: &str = ".bkp";
/// Property naming the directory the server writes backups to.
pub const BACKUP_DIRECTORY_KEY: &str = "BackupDirectory";
/// Backup directory of the official SQL Server Linux images.
pub const DEFAULT_BACKUP_DIRECTORY: &str = "/var/opt/mssql/data";

/// Runs T-SQL against a server.
pub trait SqlExecutor {
    /// Execute `sql` in the context of `database`, returning the client output.
    fn execute(&self, connection: &ConnectionString, database: &str, sql: &str) -> Result<String>;
}

/// `sqlcmd` client. The password travels in `SQLCMDPASSWORD`, not argv.
#[derive(Debug, Clone)]
pub struct SqlCmd {
    binary: String,
}

impl Default for SqlCmd {
    fn default() -> Self {
        Self {
            binary: "sqlcmd".to_string(),
        }
    }
}

impl SqlExecutor for SqlCmd {
    fn execute(&self, connection: &ConnectionString, database: &str, sql: &str) -> Result<String> {
        let server = connection
            .data_source()
            .ok_or_else(|| SnapError::config("ConnectionString names no server"))?;

        let mut cmd = Command::new(&self.binary);
        cmd.args(["-S", server, "-d", database, "-b", "-C", "-Q", sql]);
        if connection.integrated_security() {
            cmd.arg("-E");
        } else if let Some(user) = connection.user_id() {
            cmd.args(["-U", user]);
            if let Some(password) = connection.password() {
                cmd.env("SQLCMDPASSWORD", password);
            }
        }

        let output = run_command(&mut cmd, None)?.ensure_success("sqlcmd")?;
        Ok(output.stdout_text())
    }
}

/// `name` as a bracket-quoted T-SQL identifier.
fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// `value` as an N'...' T-SQL string literal.
fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

fn backup_statement(database: &str, disk: &str) -> String {
    format!(
        "BACKUP DATABASE {db} TO DISK = {disk} WITH INIT, FORMAT, NAME = {name}, DESCRIPTION = {desc}",
        db = quote_identifier(database),
        disk = quote_literal(disk),
        name = quote_literal(&format!("{} Backup", database)),
        desc = quote_literal(&format!("Full backup of {}", database)),
    )
}

/// A failed restore still returns the database to multi-user mode before
/// the error is rethrown.
fn restore_statement(database: &str, disk: &str) -> String {
    format!(
        "IF DB_ID({lit}) IS NOT NULL ALTER DATABASE {db} SET SINGLE_USER WITH ROLLBACK IMMEDIATE; \
         BEGIN TRY \
         RESTORE DATABASE {db} FROM DISK = {disk} WITH REPLACE, RECOVERY; \
         END TRY \
         BEGIN CATCH \
         IF DB_ID({lit}) IS NOT NULL ALTER DATABASE {db} SET MULTI_USER; \
         THROW; \
         END CATCH; \
         ALTER DATABASE {db} SET MULTI_USER;",
        lit = quote_literal(database),
        db = quote_identifier(database),
        disk = quote_literal(disk),
    )
}

fn drop_statement(database: &str) -> String {
    format!(
        "IF DB_ID({lit}) IS NOT NULL BEGIN \
         ALTER DATABASE {db} SET SINGLE_USER WITH ROLLBACK IMMEDIATE; \
         DROP DATABASE {db}; END",
        lit = quote_literal(database),
        db = quote_identifier(database),
    )
}

/// Pack, restore and clean for SQL Server databases.
pub struct MssqlRunner {
    executor: Box<dyn SqlExecutor>,
}

impl Default for MssqlRunner {
    fn default() -> Self {
        Self::new(Box::new(SqlCmd::default()))
    }
}

struct Plan {
    connection: ConnectionString,
    database: String,
    file_name: String,
    native_path: PathBuf,
}

impl MssqlRunner {
    pub fn new(executor: Box<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    fn plan(&self, ctx: &RunContext<'_>, target: &Target) -> Result<Plan> {
        let raw = ctx.required_property(target, keys::CONNECTION_STRING)?;
        let connection = ConnectionString::parse(raw)?;
        let database = connection
            .initial_catalog()
            .ok_or_else(|| {
                SnapError::config(format!(
                    "ConnectionString of target {} names no database",
                    target.label()
                ))
            })?
            .to_string();

        let file_name = ctx.artifact_file_name(target, BACKUP_EXTENSION);
        let backup_dir = ctx
            .property(target, BACKUP_DIRECTORY_KEY)
            .unwrap_or(DEFAULT_BACKUP_DIRECTORY);
        let native_path = Path::new(backup_dir).join(&file_name);

        Ok(Plan {
            connection,
            database,
            file_name,
            native_path,
        })
    }

    fn execute(&self, target: &Target, plan: &Plan, sql: &str) -> Result<()> {
        self.executor
            .execute(&plan.connection, "master", sql)
            .map_err(|e| SnapError::backend(target.label(), &plan.file_name, e.to_string()))?;
        Ok(())
    }
}

impl TargetRunner for MssqlRunner {
    fn runner_type(&self) -> &str {
        MSSQL_TYPE
    }

    fn pack(&self, ctx: &RunContext<'_>, target: &Target) -> Result<()> {
        let plan = self.plan(ctx, target)?;
        info!("Backing up database {} to {}", plan.database, plan.file_name);

        let disk = plan.native_path.to_string_lossy();
        self.execute(target, &plan, &backup_statement(&plan.database, &disk))?;
        ctx.collect_artifact(target, &plan.native_path, &plan.file_name)
    }

    fn restore(&self, ctx: &RunContext<'_>, target: &Target) -> Result<()> {
        let plan = self.plan(ctx, target)?;
        info!("Restoring database {} from {}", plan.database, plan.file_name);

        ctx.stage_artifact(target, &plan.file_name, &plan.native_path)?;
        let disk = plan.native_path.to_string_lossy();
        self.execute(target, &plan, &restore_statement(&plan.database, &disk))
    }

    fn clean(&self, ctx: &RunContext<'_>, target: &Target) -> Result<()> {
        let plan = self.plan(ctx, target)?;
        info!("Dropping database {}", plan.database);
        self.execute(target, &plan, &drop_statement(&plan.database))
    }
}
