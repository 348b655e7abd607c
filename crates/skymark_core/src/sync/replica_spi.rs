//! Remote replica adapter contract.
//!
//! # Responsibility
//! - Describe the eventually-consistent key-value channel the synchronizer
//!   talks to, independent of the concrete cloud service.
//!
//! # Invariants
//! - `push` must not wait for other devices; it returns once the value is
//!   handed to the replication layer.
//! - Handlers registered through `subscribe` may run on any thread and must
//!   never be invoked while the adapter holds its own locks.

use crate::model::bookmark::BookmarkList;
use crate::sync::replica_types::{ChangeHandler, ReplicaResult, SubscriptionId};

/// Replica adapter implemented per backing service.
pub trait RemoteReplica: Send + Sync {
    /// Stable adapter id used in logs and error envelopes.
    fn replica_id(&self) -> &str;

    /// Last value the replication layer observed for `key`.
    ///
    /// `Ok(None)` means the key is absent or was cleared remotely.
    fn pull(&self, key: &str) -> ReplicaResult<Option<BookmarkList>>;

    /// Hands `list` to the replication layer for `key`.
    fn push(&self, key: &str, list: &BookmarkList) -> ReplicaResult<()>;

    /// Registers a change handler.
    fn subscribe(&self, handler: ChangeHandler) -> ReplicaResult<SubscriptionId>;

    /// Removes a handler; unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Requests an immediate reconciliation pass. Completion is not awaited.
    fn force_sync(&self) -> ReplicaResult<()>;
}
