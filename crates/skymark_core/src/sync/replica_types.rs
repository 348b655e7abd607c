//! Shared data contracts for remote replica adapters.

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

pub type ReplicaResult<T> = Result<T, ReplicaError>;

/// Why the replica's local cache changed.
///
/// Numeric codes follow the platform key-value store convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeReason {
    ServerChange,
    InitialSync,
    QuotaViolation,
    AccountChange,
    Unrecognized(i64),
}

impl ChangeReason {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::ServerChange,
            1 => Self::InitialSync,
            2 => Self::QuotaViolation,
            3 => Self::AccountChange,
            other => Self::Unrecognized(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::ServerChange => 0,
            Self::InitialSync => 1,
            Self::QuotaViolation => 2,
            Self::AccountChange => 3,
            Self::Unrecognized(code) => code,
        }
    }

    /// Reasons after which the replica value should replace local state.
    pub fn requires_refresh(self) -> bool {
        matches!(
            self,
            Self::ServerChange | Self::InitialSync | Self::AccountChange
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServerChange => "server_change",
            Self::InitialSync => "initial_sync",
            Self::QuotaViolation => "quota_violation",
            Self::AccountChange => "account_change",
            Self::Unrecognized(_) => "unrecognized",
        }
    }
}

/// Out-of-band notification that replicated keys changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub affected_keys: BTreeSet<String>,
    pub reason: ChangeReason,
}

impl ChangeEvent {
    pub fn new<I, K>(keys: I, reason: ChangeReason) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            affected_keys: keys.into_iter().map(Into::into).collect(),
            reason,
        }
    }

    pub fn affects(&self, key: &str) -> bool {
        self.affected_keys.contains(key)
    }
}

/// Callback invoked by a replica whenever its cache changes.
pub type ChangeHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Registration token returned by `RemoteReplica::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replica operation in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaStage {
    Pull,
    Push,
    Subscribe,
    ForceSync,
}

impl ReplicaStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pull => "pull",
            Self::Push => "push",
            Self::Subscribe => "subscribe",
            Self::ForceSync => "force_sync",
        }
    }
}

/// Stable error envelope returned by replica adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaError {
    pub replica_id: String,
    pub stage: ReplicaStage,
    /// Machine-readable code, e.g. `offline`.
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ReplicaError {
    pub fn new(
        replica_id: impl Into<String>,
        stage: ReplicaStage,
        code: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            replica_id: replica_id.into(),
            stage,
            code: code.into(),
            message: message.into(),
            retryable,
        }
    }
}

impl Display for ReplicaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "replica `{}` {} failed ({}): {}",
            self.replica_id,
            self.stage.as_str(),
            self.code,
            self.message
        )
    }
}

impl Error for ReplicaError {}

#[cfg(test)]
mod tests {
    use super::{ChangeEvent, ChangeReason};

    #[test]
    fn reason_codes_map_both_ways() {
        for code in 0..=3 {
            assert_eq!(ChangeReason::from_code(code).code(), code);
        }
        assert_eq!(ChangeReason::from_code(42), ChangeReason::Unrecognized(42));
        assert_eq!(ChangeReason::from_code(-1).code(), -1);
    }

    #[test]
    fn only_data_reasons_require_refresh() {
        assert!(ChangeReason::ServerChange.requires_refresh());
        assert!(ChangeReason::InitialSync.requires_refresh());
        assert!(ChangeReason::AccountChange.requires_refresh());
        assert!(!ChangeReason::QuotaViolation.requires_refresh());
        assert!(!ChangeReason::Unrecognized(9).requires_refresh());
    }

    #[test]
    fn event_matches_exact_key_only() {
        let event = ChangeEvent::new(["Bookmarks", "Other"], ChangeReason::ServerChange);
        assert!(event.affects("Bookmarks"));
        assert!(!event.affects("bookmarks"));
    }
}
