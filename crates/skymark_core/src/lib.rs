//! Core of Skymark: sky bookmarks kept in sync between a durable local store
//! and a replicated key-value service shared across a user's devices.

pub mod codec;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod sync;

pub use codec::{decode, decode_list, encode, encode_list, DecodeError, DecodedList, FieldMap};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel};
pub use model::bookmark::{
    Bookmark, BookmarkList, BookmarkTarget, BookmarkValidationError, Coordinate,
};
pub use repo::local_store::{LocalStore, SqliteLocalStore, StoreError, StoreResult};
pub use sync::config::{ConfigError, SyncConfig, DEFAULT_BOOKMARKS_KEY};
pub use sync::diagnostics::{DiagnosticLog, DiagnosticSink, LogOnlyDiagnostics, SyncDiagnostic};
pub use sync::memory_replica::{MemoryCloud, MemoryReplica};
pub use sync::replica_spi::RemoteReplica;
pub use sync::replica_types::{
    ChangeEvent, ChangeHandler, ChangeReason, ReplicaError, ReplicaResult, ReplicaStage,
    SubscriptionId,
};
pub use sync::synchronizer::{
    AppendOutcome, BookmarksObserver, ChangeOutcome, ObserverId, SyncError, SyncResult,
    Synchronizer,
};

/// Minimal health-check API for embedding hosts.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
