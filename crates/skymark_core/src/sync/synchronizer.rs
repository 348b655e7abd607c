//! Bookmark synchronizer.
//!
//! # Responsibility
//! - Apply local appends to the local store, then hand them to the replica.
//! - React to replica change events by replacing or clearing the local list.
//! - Report quota and unknown-reason conditions through a diagnostic sink.
//!
//! # Invariants
//! - Every read-modify-write of the local store runs under one lock, and that
//!   lock is released before any replica call or diagnostic report.
//! - A refresh is a whole-list replace; an absent remote value clears the key.
//!   A pulled value is discarded when an append completed during the pull.
//! - Pushes leave in append order; a push is skipped once a later append has
//!   already been pushed, so the replica never regresses to an older list.
//! - Remote failures never surface as errors from `append`.
//!
//! # See also
//! - docs/architecture/bookmark-sync.md

use crate::model::bookmark::{
    Bookmark, BookmarkList, BookmarkTarget, BookmarkValidationError, Coordinate,
};
use crate::repo::local_store::{LocalStore, StoreError};
use crate::sync::config::{ConfigError, SyncConfig};
use crate::sync::diagnostics::{DiagnosticSink, LogOnlyDiagnostics, SyncDiagnostic};
use crate::sync::lock_unpoisoned;
use crate::sync::replica_spi::RemoteReplica;
use crate::sync::replica_types::{
    ChangeEvent, ChangeHandler, ChangeReason, ReplicaError, SubscriptionId,
};
use log::{debug, error, info, trace, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, Weak};
use uuid::Uuid;

pub type SyncResult<T> = Result<T, SyncError>;

/// Synchronizer errors. Remote failures are absorbed and never appear here
/// except from lifecycle calls.
#[derive(Debug)]
pub enum SyncError {
    InvalidConfig(ConfigError),
    Store(StoreError),
    Replica(ReplicaError),
    AlreadyStarted,
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfig(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Replica(err) => write!(f, "{err}"),
            Self::AlreadyStarted => write!(f, "synchronizer is already started"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidConfig(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Replica(err) => Some(err),
            Self::AlreadyStarted => None,
        }
    }
}

impl From<ConfigError> for SyncError {
    fn from(value: ConfigError) -> Self {
        Self::InvalidConfig(value)
    }
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<ReplicaError> for SyncError {
    fn from(value: ReplicaError) -> Self {
        Self::Replica(value)
    }
}

/// Result of `Synchronizer::append`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Stored locally; `len` is the new list length.
    Appended { len: usize },
    /// Input was blank or malformed and silently dropped.
    Ignored(BookmarkValidationError),
}

/// What a change event did to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Event did not name this synchronizer's key.
    NotAffected,
    Replaced { len: usize },
    Cleared,
    QuotaReported,
    UnrecognizedReported(i64),
    /// Pull failed; local state untouched.
    PullFailed,
    /// A local append landed while pulling; the pulled value was discarded.
    Superseded,
}

/// Callback receiving the full settled list after each local change.
pub type BookmarksObserver = Arc<dyn Fn(&BookmarkList) + Send + Sync>;

/// Registration token for `Synchronizer::add_observer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(Uuid);

struct StoreSlot<S> {
    store: S,
    /// Sequence number of the last local append.
    append_seq: u64,
}

struct SyncShared<S> {
    key: String,
    store: Mutex<StoreSlot<S>>,
    /// Sequence number of the last append handed to the replica.
    pushed_seq: Mutex<u64>,
    replica: Arc<dyn RemoteReplica>,
    diagnostics: Arc<dyn DiagnosticSink>,
    observers: Mutex<BTreeMap<ObserverId, BookmarksObserver>>,
}

/// Keeps one local store key and its replica counterpart converged.
///
/// Construct once per process, call `start()` to begin receiving remote
/// changes and `stop()` (or drop) to unregister.
pub struct Synchronizer<S: LocalStore + Send + 'static> {
    shared: Arc<SyncShared<S>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl<S: LocalStore + Send + 'static> Synchronizer<S> {
    pub fn new(store: S, replica: Arc<dyn RemoteReplica>, config: SyncConfig) -> SyncResult<Self> {
        Self::with_diagnostics(store, replica, config, Arc::new(LogOnlyDiagnostics))
    }

    pub fn with_diagnostics(
        store: S,
        replica: Arc<dyn RemoteReplica>,
        config: SyncConfig,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(SyncShared {
                key: config.key,
                store: Mutex::new(StoreSlot {
                    store,
                    append_seq: 0,
                }),
                pushed_seq: Mutex::new(0),
                replica,
                diagnostics,
                observers: Mutex::new(BTreeMap::new()),
            }),
            subscription: Mutex::new(None),
        })
    }

    pub fn key(&self) -> &str {
        &self.shared.key
    }

    pub fn is_started(&self) -> bool {
        lock_unpoisoned(&self.subscription).is_some()
    }

    /// Subscribes to replica changes, then asks the replica to sync.
    ///
    /// The handler is registered first so an event raised by `force_sync`
    /// itself is not missed. A failing `force_sync` is logged only.
    pub fn start(&self) -> SyncResult<()> {
        {
            let mut subscription = lock_unpoisoned(&self.subscription);
            if subscription.is_some() {
                return Err(SyncError::AlreadyStarted);
            }
            let weak: Weak<SyncShared<S>> = Arc::downgrade(&self.shared);
            let handler: ChangeHandler = Arc::new(move |event: &ChangeEvent| {
                if let Some(shared) = weak.upgrade() {
                    if let Err(err) = shared.handle_change_event(event) {
                        error!(
                            "event=sync_change module=sync status=error key={} reason={} error={err}",
                            shared.key,
                            event.reason.as_str()
                        );
                    }
                }
            });
            *subscription = Some(self.shared.replica.subscribe(handler)?);
        }

        let replica_id = self.shared.replica.replica_id().to_string();
        if let Err(err) = self.shared.replica.force_sync() {
            warn!(
                "event=sync_start module=sync status=degraded key={} replica={replica_id} error_code={} error={err}",
                self.shared.key, err.code
            );
        }
        match self.shared.replica.pull(&self.shared.key) {
            Ok(remote) => info!(
                "event=sync_start module=sync status=ok key={} replica={replica_id} remote_count={}",
                self.shared.key,
                remote.map_or(0, |list| list.len())
            ),
            Err(err) => warn!(
                "event=sync_start module=sync status=degraded key={} replica={replica_id} error_code={}",
                self.shared.key, err.code
            ),
        }
        Ok(())
    }

    /// Unregisters the change handler. Idempotent.
    pub fn stop(&self) {
        if let Some(id) = lock_unpoisoned(&self.subscription).take() {
            self.shared.replica.unsubscribe(id);
            info!(
                "event=sync_stop module=sync status=ok key={}",
                self.shared.key
            );
        }
    }

    /// Appends one bookmark locally and hands the new list to the replica.
    ///
    /// Blank names, empty payloads and non-finite coordinates are ignored
    /// without error. Replica failures are reported as diagnostics only.
    pub fn append(
        &self,
        name: impl Into<String>,
        target: BookmarkTarget,
    ) -> SyncResult<AppendOutcome> {
        let bookmark = Bookmark::new(name, target);
        if let Err(reason) = bookmark.validate() {
            debug!(
                "event=sync_append module=sync status=skip key={} reason={reason}",
                self.shared.key
            );
            return Ok(AppendOutcome::Ignored(reason));
        }

        let (updated, seq, dropped) = {
            let mut slot = lock_unpoisoned(&self.shared.store);
            let current = slot.store.read_decoded(&self.shared.key)?;
            let dropped = current.skipped.len();
            let updated = current.bookmarks.appended(bookmark);
            slot.store.write(&self.shared.key, &updated)?;
            slot.append_seq += 1;
            (updated, slot.append_seq, dropped)
        };

        if dropped > 0 {
            warn!(
                "event=sync_append module=sync status=degraded key={} dropped={dropped}",
                self.shared.key
            );
            self.shared.report(SyncDiagnostic::RecordsDropped {
                key: self.shared.key.clone(),
                count: dropped,
            });
        }

        debug!(
            "event=sync_append module=sync status=ok key={} count={}",
            self.shared.key,
            updated.len()
        );
        self.shared.push(seq, &updated);
        self.shared.notify_observers(&updated);
        Ok(AppendOutcome::Appended { len: updated.len() })
    }

    pub fn append_coordinate(
        &self,
        name: impl Into<String>,
        ra: f64,
        dec: f64,
    ) -> SyncResult<AppendOutcome> {
        self.append(name, BookmarkTarget::Coordinate(Coordinate::new(ra, dec)))
    }

    pub fn append_solution(
        &self,
        name: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> SyncResult<AppendOutcome> {
        self.append(name, BookmarkTarget::Solution(payload.into()))
    }

    /// Returns the settled local list.
    pub fn current_bookmarks(&self) -> SyncResult<BookmarkList> {
        let slot = lock_unpoisoned(&self.shared.store);
        Ok(slot.store.read(&self.shared.key)?)
    }

    /// Processes one replica change event.
    ///
    /// Normally invoked by the handler registered in `start()`.
    pub fn handle_change_event(&self, event: &ChangeEvent) -> SyncResult<ChangeOutcome> {
        self.shared.handle_change_event(event)
    }

    /// Registers a callback invoked with the full list after every local
    /// change. Callbacks run outside the store lock.
    pub fn add_observer(&self, observer: BookmarksObserver) -> ObserverId {
        let id = ObserverId(Uuid::new_v4());
        lock_unpoisoned(&self.shared.observers).insert(id, observer);
        id
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        lock_unpoisoned(&self.shared.observers)
            .remove(&id)
            .is_some()
    }
}

impl<S: LocalStore + Send + 'static> Drop for Synchronizer<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S: LocalStore> SyncShared<S> {
    fn handle_change_event(&self, event: &ChangeEvent) -> SyncResult<ChangeOutcome> {
        if !event.affects(&self.key) {
            trace!(
                "event=sync_change module=sync status=skip key={} reason={}",
                self.key,
                event.reason.as_str()
            );
            return Ok(ChangeOutcome::NotAffected);
        }

        match event.reason {
            reason if reason.requires_refresh() => self.refresh(reason),
            ChangeReason::QuotaViolation => {
                warn!(
                    "event=sync_change module=sync status=error key={} reason=quota_violation",
                    self.key
                );
                self.report(SyncDiagnostic::QuotaExceeded {
                    key: self.key.clone(),
                });
                Ok(ChangeOutcome::QuotaReported)
            }
            other => {
                let code = other.code();
                warn!(
                    "event=sync_change module=sync status=skip key={} reason=unrecognized code={code}",
                    self.key
                );
                self.report(SyncDiagnostic::UnrecognizedChangeReason {
                    key: self.key.clone(),
                    code,
                });
                Ok(ChangeOutcome::UnrecognizedReported(code))
            }
        }
    }

    fn refresh(&self, reason: ChangeReason) -> SyncResult<ChangeOutcome> {
        let seq_before_pull = lock_unpoisoned(&self.store).append_seq;
        let pulled = match self.replica.pull(&self.key) {
            Ok(pulled) => pulled,
            Err(err) => {
                warn!(
                    "event=sync_refresh module=sync status=error key={} reason={} error_code={} error={err}",
                    self.key,
                    reason.as_str(),
                    err.code
                );
                self.report(SyncDiagnostic::PullFailed {
                    key: self.key.clone(),
                    code: err.code,
                });
                return Ok(ChangeOutcome::PullFailed);
            }
        };

        let (settled, outcome) = {
            let slot = lock_unpoisoned(&self.store);
            // The append already handed its newer list to the replica.
            if slot.append_seq != seq_before_pull {
                debug!(
                    "event=sync_refresh module=sync status=skip key={} reason={} superseded_by_seq={}",
                    self.key,
                    reason.as_str(),
                    slot.append_seq
                );
                return Ok(ChangeOutcome::Superseded);
            }
            match pulled {
                Some(list) => {
                    slot.store.write(&self.key, &list)?;
                    let len = list.len();
                    (list, ChangeOutcome::Replaced { len })
                }
                None => {
                    slot.store.clear(&self.key)?;
                    (BookmarkList::new(), ChangeOutcome::Cleared)
                }
            }
        };

        info!(
            "event=sync_refresh module=sync status=ok key={} reason={} count={}",
            self.key,
            reason.as_str(),
            settled.len()
        );
        self.notify_observers(&settled);
        Ok(outcome)
    }

    fn push(&self, seq: u64, list: &BookmarkList) {
        let mut pushed_seq = lock_unpoisoned(&self.pushed_seq);
        if *pushed_seq > seq {
            debug!(
                "event=sync_push module=sync status=skip key={} seq={seq} superseded_by={}",
                self.key, *pushed_seq
            );
            return;
        }
        *pushed_seq = seq;

        match self.replica.push(&self.key, list) {
            Ok(()) => debug!(
                "event=sync_push module=sync status=ok key={} seq={seq} count={}",
                self.key,
                list.len()
            ),
            Err(err) => {
                warn!(
                    "event=sync_push module=sync status=error key={} seq={seq} error_code={} retryable={} error={err}",
                    self.key, err.code, err.retryable
                );
                self.report(SyncDiagnostic::PushFailed {
                    key: self.key.clone(),
                    code: err.code,
                });
            }
        }
    }

    fn notify_observers(&self, list: &BookmarkList) {
        let observers = lock_unpoisoned(&self.observers)
            .values()
            .cloned()
            .collect::<Vec<_>>();
        for observer in observers {
            observer(list);
        }
    }

    fn report(&self, diagnostic: SyncDiagnostic) {
        self.diagnostics.report(diagnostic);
    }
}
