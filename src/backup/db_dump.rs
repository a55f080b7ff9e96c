// docbackup/src/backup/db_dump.rs
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::DatabaseConfig;
use crate::utils::find_executable;

/// Command-line arguments for a plain-format `pg_dump` of `database` into
/// `sql_path`.
pub fn pg_dump_args(database: &DatabaseConfig, sql_path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-U".into(),
        database.user.clone().into(),
        "-h".into(),
        database.host.clone().into(),
    ];
    if let Some(port) = database.port {
        args.push("-p".into());
        args.push(port.to_string().into());
    }
    args.push("-f".into());
    args.push(sql_path.as_os_str().to_owned());
    args.push(database.name.clone().into());
    args
}

/// Runs `pg_dump` for the configured database, writing plain SQL to
/// `sql_path`. The password comes from the configured pgpass file.
///
/// The child is killed if it outlives `dump_timeout`.
pub async fn dump_database(
    database: &DatabaseConfig,
    sql_path: &Path,
    dump_timeout: Duration,
) -> Result<()> {
    let pg_dump_path = find_executable("pg_dump")?;
    log::debug!(target: "backup::db_dump", "Found pg_dump executable at: {}", pg_dump_path.display());
    log::info!(
        target: "backup::db_dump",
        "Dumping database {} as {}@{} to {}",
        database.name,
        database.user,
        database.host,
        sql_path.display()
    );

    let mut command = Command::new(&pg_dump_path);
    command
        .args(pg_dump_args(database, sql_path))
        .env("PGPASSFILE", &database.pgpass_file)
        .kill_on_drop(true);

    let output = match timeout(dump_timeout, command.output()).await {
        Ok(result) => result
            .with_context(|| format!("Failed to execute pg_dump for database: {}", database.name))?,
        Err(_) => anyhow::bail!(
            "pg_dump for database {} timed out after {} seconds",
            database.name,
            dump_timeout.as_secs()
        ),
    };

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "pg_dump for database {} failed with status: {}\nStderr: {}",
            database.name,
            output.status,
            String::from_utf8_lossy(&output.stderr)
        ));
    }

    log::info!(target: "backup::db_dump", "Database {} dumped successfully", database.name);
    Ok(())
}
