//! Advisory diagnostics raised by the synchronizer.
//!
//! Diagnostics never abort an operation; the local store is valid whenever
//! one is reported.

use crate::sync::lock_unpoisoned;
use std::fmt::{Display, Formatter};
use std::sync::Mutex;

/// Caller-visible advisory signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncDiagnostic {
    /// The replica refused to grow further; the local copy is still valid.
    QuotaExceeded { key: String },
    /// A change event carried a reason code this crate does not know.
    UnrecognizedChangeReason { key: String, code: i64 },
    /// A push was not accepted by the replica.
    PushFailed { key: String, code: String },
    /// A pull failed; local state was left untouched.
    PullFailed { key: String, code: String },
    /// Stored records that failed to decode and were dropped on rewrite.
    RecordsDropped { key: String, count: usize },
}

impl SyncDiagnostic {
    pub fn key(&self) -> &str {
        match self {
            Self::QuotaExceeded { key }
            | Self::UnrecognizedChangeReason { key, .. }
            | Self::PushFailed { key, .. }
            | Self::PullFailed { key, .. }
            | Self::RecordsDropped { key, .. } => key,
        }
    }
}

impl Display for SyncDiagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuotaExceeded { key } => {
                write!(f, "replica quota exceeded while syncing `{key}`")
            }
            Self::UnrecognizedChangeReason { key, code } => {
                write!(f, "unrecognized change reason {code} for `{key}`")
            }
            Self::PushFailed { key, code } => write!(f, "push of `{key}` failed ({code})"),
            Self::PullFailed { key, code } => write!(f, "pull of `{key}` failed ({code})"),
            Self::RecordsDropped { key, count } => {
                write!(f, "{count} undecodable record(s) dropped from `{key}`")
            }
        }
    }
}

/// Receiver of synchronizer diagnostics.
///
/// Called from whichever thread raised the condition, possibly a replica
/// callback thread.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: SyncDiagnostic);
}

/// Sink that drops everything; diagnostics are still logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOnlyDiagnostics;

impl DiagnosticSink for LogOnlyDiagnostics {
    fn report(&self, _diagnostic: SyncDiagnostic) {}
}

/// Sink that buffers diagnostics until the caller drains them.
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    entries: Mutex<Vec<SyncDiagnostic>>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<SyncDiagnostic> {
        lock_unpoisoned(&self.entries).clone()
    }

    pub fn drain(&self) -> Vec<SyncDiagnostic> {
        std::mem::take(&mut *lock_unpoisoned(&self.entries))
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for DiagnosticLog {
    fn report(&self, diagnostic: SyncDiagnostic) {
        lock_unpoisoned(&self.entries).push(diagnostic);
    }
}
