//! Adapter selection.
//!
//! Builds the one storage adapter a process uses, from the mapping mode read
//! at startup. Callers hold the returned box for the process lifetime.

use crate::config::MappingMode;
use crate::db::{open_target, DbTarget, PoolOptions};
use crate::repo::repository::SqlxSepulkaRepository;
use crate::repo::statement::SqliteSepulkaRepository;
use crate::repo::{RepoResult, SepulkaRepository};
use log::info;
use std::time::Instant;

/// Boxed port as handed to services.
pub type DynSepulkaRepository = Box<dyn SepulkaRepository + Send>;

/// Opens the adapter for `mode` against `target`.
///
/// `pool` only applies to [`MappingMode::Repository`].
pub fn open_repository(
    mode: MappingMode,
    target: &DbTarget,
    pool: PoolOptions,
) -> RepoResult<DynSepulkaRepository> {
    let started_at = Instant::now();
    let repository: DynSepulkaRepository = match mode {
        MappingMode::Statement => {
            let conn = open_target(target)?;
            Box::new(SqliteSepulkaRepository::try_new(conn)?)
        }
        MappingMode::Repository => Box::new(SqlxSepulkaRepository::connect(target, pool)?),
    };

    info!(
        "event=repo_select module=repo status=ok mapping={} protocol={} duration_ms={}",
        mode,
        target.mode(),
        started_at.elapsed().as_millis()
    );
    Ok(repository)
}
