//! Local/remote bookmark synchronization.
//!
//! # Responsibility
//! - Define the remote replica contract and its change notifications.
//! - Own the synchronizer that keeps the local store and replica converged.
//! - Provide an in-process replica for embedding hosts without a cloud
//!   backend and for tests.
//!
//! # Invariants
//! - Remote failures never leave the local store partially written.
//! - Replica callbacks never run while a store or replica lock is held.
//!
//! # See also
//! - docs/architecture/bookmark-sync.md

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod config;
pub mod diagnostics;
pub mod memory_replica;
pub mod replica_spi;
pub mod replica_types;
pub mod synchronizer;

/// Locks `mutex`, recovering the guard if a holder panicked.
///
/// Every guarded value in this module is replaced wholesale, so a poisoned
/// lock never exposes a half-applied update.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
