//! Pool bootstrap for the sqlx driver.
//!
//! # Responsibility
//! - Build a `SqlitePool` for the configured target.
//! - Apply the shared migration list through sqlx before handing the pool out.
//!
//! # Invariants
//! - In-memory pools hold exactly one connection that is never recycled, so
//!   the database outlives individual queries.
//! - Pool connections share the busy timeout of the rusqlite driver.

use super::migrations::{latest_version, pending_migrations};
use super::{DbError, DbResult, DbTarget, BUSY_TIMEOUT_SECS};
use log::{error, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::{Duration, Instant};

const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Pool sizing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Ignored for in-memory targets, which always use one connection.
    pub max_connections: u32,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// Connects a pool and applies all pending migrations.
///
/// # Side effects
/// - Creates the database file when missing.
/// - Emits `db_open` logging events with duration and status.
pub async fn connect_pool(target: &DbTarget, options: PoolOptions) -> DbResult<SqlitePool> {
    let started_at = Instant::now();
    let mode = target.mode();
    info!("event=db_open module=db driver=sqlx status=start mode={mode}");

    match build_pool(target, options).await {
        Ok(pool) => {
            info!(
                "event=db_open module=db driver=sqlx status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(pool)
        }
        Err(err) => {
            error!(
                "event=db_open module=db driver=sqlx status=error mode={mode} duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

async fn build_pool(target: &DbTarget, options: PoolOptions) -> DbResult<SqlitePool> {
    let (connect_options, max_connections) = match target {
        DbTarget::File(path) => (
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
            options.max_connections.max(1),
        ),
        DbTarget::Memory => (SqliteConnectOptions::from_str("sqlite::memory:")?, 1),
    };
    let connect_options = connect_options.busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(connect_options)
        .await?;

    apply_migrations(&pool).await?;
    Ok(pool)
}

async fn apply_migrations(pool: &SqlitePool) -> DbResult<()> {
    let mut tx = pool.begin().await?;

    let raw_version: i64 = sqlx::query_scalar("PRAGMA user_version;")
        .fetch_one(&mut *tx)
        .await?;
    let current_version = u32::try_from(raw_version).map_err(|_| {
        DbError::Sqlx(sqlx::Error::Decode(
            format!("negative user_version `{raw_version}`").into(),
        ))
    })?;

    let pending = pending_migrations(current_version)?;
    if pending.is_empty() {
        return Ok(());
    }

    for migration in pending {
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
        let bump = format!("PRAGMA user_version = {};", migration.version);
        sqlx::raw_sql(&bump).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    info!(
        "event=db_migrate module=db driver=sqlx status=ok from_version={} to_version={}",
        current_version,
        latest_version()
    );
    Ok(())
}
