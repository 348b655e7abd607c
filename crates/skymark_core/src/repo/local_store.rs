//! Local bookmark store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist one serialized bookmark list per key, durable across restarts.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - `write` replaces the whole value in one statement; readers never see a
//!   partially written list.
//! - `read` of a missing key is an empty list, not an error.
//! - No validation happens here; that belongs to the synchronizer.

use crate::codec::{decode_list, encode_list, DecodedList, ListCodecError};
use crate::db::migrations::{latest_version, schema_version};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::bookmark::BookmarkList;
use log::{debug, error, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub type StoreResult<T> = Result<T, StoreError>;

/// Local store failures.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Codec(ListCodecError),
    /// Connection was handed over before migrations ran.
    SchemaNotReady { found: u32, required: u32 },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Codec(err) => write!(f, "{err}"),
            Self::SchemaNotReady { found, required } => write!(
                f,
                "local store schema version {found} is older than required {required}"
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Codec(err) => Some(err),
            Self::SchemaNotReady { .. } => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ListCodecError> for StoreError {
    fn from(value: ListCodecError) -> Self {
        Self::Codec(value)
    }
}

/// Durable keyed storage for bookmark lists.
pub trait LocalStore {
    /// Reads the list under `key`, reporting records that were skipped.
    fn read_decoded(&self, key: &str) -> StoreResult<DecodedList>;

    /// Replaces the whole list under `key`.
    fn write(&self, key: &str, list: &BookmarkList) -> StoreResult<()>;

    /// Removes `key` entirely.
    fn clear(&self, key: &str) -> StoreResult<()>;

    /// Reads the list under `key`, dropping undecodable records.
    fn read(&self, key: &str) -> StoreResult<BookmarkList> {
        Ok(self.read_decoded(key)?.bookmarks)
    }
}

/// SQLite-backed local store owning its connection.
pub struct SqliteLocalStore {
    conn: Connection,
}

impl SqliteLocalStore {
    /// Wraps a connection that already went through `open_db`.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        let found = schema_version(&conn)?;
        let required = latest_version();
        if found < required {
            return Err(StoreError::SchemaNotReady { found, required });
        }
        Ok(Self { conn })
    }

    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::try_new(open_db(path)?)
    }

    /// Opens a throwaway in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    /// Returns the raw stored blob, if any.
    pub fn read_raw(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let blob = self
            .conn
            .query_row(
                "SELECT value FROM kv_entries WHERE key = ?1;",
                [key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(blob)
    }

    /// Lists keys that currently hold a value.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv_entries ORDER BY key ASC;")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }
}

impl LocalStore for SqliteLocalStore {
    fn read_decoded(&self, key: &str) -> StoreResult<DecodedList> {
        let Some(blob) = self.read_raw(key)? else {
            return Ok(DecodedList::default());
        };

        let decoded = match decode_list(&blob) {
            Ok(decoded) => decoded,
            Err(err) => {
                // A corrupt blob reads as empty; the next write replaces it.
                error!(
                    "event=store_read module=store status=error key={key} bytes={} error_code=corrupt_blob error={err}",
                    blob.len()
                );
                return Ok(DecodedList::default());
            }
        };

        if !decoded.skipped.is_empty() {
            warn!(
                "event=store_read module=store status=partial key={key} kept={} skipped={}",
                decoded.bookmarks.len(),
                decoded.skipped.len()
            );
        }
        Ok(decoded)
    }

    fn write(&self, key: &str, list: &BookmarkList) -> StoreResult<()> {
        let blob = encode_list(list)?;
        self.conn.execute(
            "INSERT INTO kv_entries (key, value, updated_at)
             VALUES (?1, ?2, (strftime('%s', 'now') * 1000))
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at;",
            params![key, blob],
        )?;
        debug!(
            "event=store_write module=store status=ok key={key} count={}",
            list.len()
        );
        Ok(())
    }

    fn clear(&self, key: &str) -> StoreResult<()> {
        let removed = self
            .conn
            .execute("DELETE FROM kv_entries WHERE key = ?1;", [key])?;
        debug!("event=store_clear module=store status=ok key={key} removed={removed}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalStore, SqliteLocalStore, StoreError};
    use crate::model::bookmark::{Bookmark, BookmarkList};
    use rusqlite::Connection;

    #[test]
    fn missing_key_reads_as_empty() {
        let store = SqliteLocalStore::open_in_memory().unwrap();
        assert!(store.read("Bookmarks").unwrap().is_empty());
        assert!(store.read_raw("Bookmarks").unwrap().is_none());
    }

    #[test]
    fn write_replaces_and_clear_removes() {
        let store = SqliteLocalStore::open_in_memory().unwrap();
        let first: BookmarkList = vec![Bookmark::coordinate("a", 1.0, 2.0)].into();
        let second: BookmarkList = vec![Bookmark::solution("b", vec![1])].into();

        store.write("Bookmarks", &first).unwrap();
        store.write("Bookmarks", &second).unwrap();
        assert_eq!(store.read("Bookmarks").unwrap(), second);
        assert_eq!(store.keys().unwrap(), vec!["Bookmarks".to_string()]);

        store.clear("Bookmarks").unwrap();
        assert!(store.read_raw("Bookmarks").unwrap().is_none());
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn clear_of_missing_key_is_noop() {
        let store = SqliteLocalStore::open_in_memory().unwrap();
        store.clear("never-written").unwrap();
    }

    #[test]
    fn try_new_rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().unwrap();
        let err = SqliteLocalStore::try_new(conn).err().unwrap();
        assert!(matches!(
            err,
            StoreError::SchemaNotReady {
                found: 0,
                required: 1
            }
        ));
    }
}
