//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure rusqlite connections and sqlx pools.
//! - Apply schema migrations in deterministic order for both drivers.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No adapter reads or writes `sepulkas` before migrations succeed.

use std::path::PathBuf;
use thiserror::Error;

pub mod migrations;
mod open;
mod pool;

pub use open::{open_db, open_db_in_memory, open_target};
pub use pool::{connect_pool, PoolOptions};

pub type DbResult<T> = Result<T, DbError>;

/// Busy timeout applied to every connection, both drivers.
pub const BUSY_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("failed to start storage runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("storage runtime already shut down")]
    RuntimeStopped,
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    #[error("database schema version {db_version} is behind expected {expected}; open it through db::open_* first")]
    SchemaNotMigrated { db_version: u32, expected: u32 },
}

/// Where the durable store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbTarget {
    File(PathBuf),
    Memory,
}

impl DbTarget {
    pub(crate) fn mode(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory => "memory",
        }
    }
}
