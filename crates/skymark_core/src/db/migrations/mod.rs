//! Forward-only schema migrations for the local key-value table.
//!
//! Each step runs in the same transaction as the `user_version` bump that
//! records it, so a crash never leaves a half-applied step behind.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[Step] = &[Step {
    version: 1,
    name: "kv_entries",
    sql: include_str!("0001_kv_entries.sql"),
}];

/// Schema version this binary writes.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |step| step.version)
}

/// Schema version recorded in `conn`.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}

/// Brings `conn` up to `latest_version()`.
///
/// A database stamped by a newer binary is refused rather than downgraded.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let found = schema_version(conn)?;
    let supported = latest_version();
    if found > supported {
        return Err(DbError::UnsupportedSchemaVersion { found, supported });
    }

    let pending = STEPS.iter().filter(|step| step.version > found);
    let tx = conn.transaction()?;
    let mut applied = 0usize;
    for step in pending {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        debug!(
            "event=db_migrate module=db status=step version={} name={}",
            step.version, step.name
        );
        applied += 1;
    }
    tx.commit()?;

    if applied > 0 {
        info!(
            "event=db_migrate module=db status=ok from_version={found} to_version={supported} steps={applied}"
        );
    }
    Ok(())
}
