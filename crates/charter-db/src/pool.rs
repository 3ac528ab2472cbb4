//! Connection setup for the charter store.
//!
//! Every service call runs in one short transaction, so a handful of
//! connections is plenty for the CLI and the tests alike.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::config::DbConfig;

/// Schema for `templates` and `template_sections`, embedded from
/// `crates/charter-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Tables owned by charter, reported by [`table_counts`].
pub const TABLES: [&str; 2] = ["templates", "template_sections"];

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Open a pool on the template store.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("cannot reach template store at {}", config.database_url))
}

/// Bring the template schema up to the newest embedded migration.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to migrate template schema")?;

    let latest = MIGRATOR.iter().map(|m| m.version).max();
    info!(?latest, "template schema up to date");
    Ok(())
}

/// Names that can be spliced into `CREATE DATABASE` unquoted.
fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Create the database named in `config` unless it is already there.
///
/// Goes through the server's `postgres` database, since the target cannot
/// be connected to yet. Returns whether the database was created.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<bool> {
    let db_name = config
        .database_name()
        .context("database URL does not name a database")?;
    if !is_plain_identifier(db_name) {
        anyhow::bail!("database name {db_name:?} may only contain letters, digits and '_'");
    }

    let maintenance_url = config.maintenance_url();
    let admin = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&maintenance_url)
        .await
        .with_context(|| format!("cannot reach postgres database at {maintenance_url}"))?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(db_name)
            .fetch_one(&admin)
            .await
            .context("failed to look up database in pg_database")?;

    if !exists {
        // No bind parameters in CREATE DATABASE.
        let stmt = format!("CREATE DATABASE {db_name}");
        admin
            .execute(stmt.as_str())
            .await
            .with_context(|| format!("failed to create database {db_name}"))?;
        info!(db = db_name, "template store created");
    }

    admin.close().await;
    Ok(!exists)
}

/// Row counts for [`TABLES`], in that order.
pub async fn table_counts(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let mut counts = Vec::with_capacity(TABLES.len());
    for table in TABLES {
        let query = format!("SELECT COUNT(*) FROM {table}");
        let (count,): (i64,) = sqlx::query_as(&query)
            .fetch_one(pool)
            .await
            .with_context(|| format!("failed to count rows in {table}"))?;
        counts.push((table.to_owned(), count));
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers() {
        assert!(is_plain_identifier("charter"));
        assert!(is_plain_identifier("charter_test_01"));
        assert!(!is_plain_identifier(""));
        assert!(!is_plain_identifier("charter; DROP TABLE templates"));
        assert!(!is_plain_identifier("char-ter"));
    }

    #[test]
    fn embedded_migrations_present() {
        assert!(MIGRATOR.iter().count() >= 1);
    }
}
