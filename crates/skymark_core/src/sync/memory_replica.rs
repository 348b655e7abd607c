//! In-process replica adapter.
//!
//! # Responsibility
//! - Model an account-wide key-value cloud (`MemoryCloud`) shared by several
//!   device replicas (`MemoryReplica`), each with its own local cache.
//! - Emit the same change reasons a platform key-value store does: server
//!   changes, initial sync, account switches and quota violations.
//!
//! # Invariants
//! - Every cloud write gets a strictly increasing revision; a device cache
//!   never moves back to an older revision of a key.
//! - Handlers are invoked with no cloud or device lock held.
//! - Writes reach other devices through each device's delivery worker, never
//!   on the writer's thread; per-device delivery order is commit order.
//! - Lock order is device then cloud; the cloud never locks a device while
//!   holding its own lock.

use crate::codec::{decode_list, encode_list};
use crate::model::bookmark::BookmarkList;
use crate::sync::lock_unpoisoned;
use crate::sync::replica_spi::RemoteReplica;
use crate::sync::replica_types::{
    ChangeEvent, ChangeHandler, ChangeReason, ReplicaError, ReplicaResult, ReplicaStage,
    SubscriptionId,
};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use uuid::Uuid;

pub const MEMORY_REPLICA_ID: &str = "memory";

#[derive(Debug, Clone)]
struct CloudEntry {
    value: Option<Vec<u8>>,
    revision: u64,
}

struct CloudState {
    entries: BTreeMap<String, CloudEntry>,
    next_revision: u64,
    quota_bytes: Option<usize>,
    devices: Vec<Weak<DeviceInner>>,
}

struct CloudInner {
    account_id: Uuid,
    state: Mutex<CloudState>,
}

/// Account-wide replicated key-value space.
#[derive(Clone)]
pub struct MemoryCloud {
    inner: Arc<CloudInner>,
}

impl Default for MemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Cloud that refuses writes once stored keys plus values exceed `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self::build(Some(bytes))
    }

    fn build(quota_bytes: Option<usize>) -> Self {
        Self {
            inner: Arc::new(CloudInner {
                account_id: Uuid::new_v4(),
                state: Mutex::new(CloudState {
                    entries: BTreeMap::new(),
                    next_revision: 0,
                    quota_bytes,
                    devices: Vec::new(),
                }),
            }),
        }
    }

    pub fn account_id(&self) -> Uuid {
        self.inner.account_id
    }

    /// Creates a new device replica signed in to this cloud.
    ///
    /// The device cache starts empty until its first `force_sync`.
    pub fn attach(&self) -> MemoryReplica {
        let (outbox, inbox) = mpsc::channel();
        let device = Arc::new(DeviceInner {
            device_id: Uuid::new_v4(),
            state: Mutex::new(DeviceState {
                cloud: self.clone(),
                cache: BTreeMap::new(),
                seen: BTreeMap::new(),
                handlers: BTreeMap::new(),
                initial_sync_done: false,
                online: true,
            }),
            outbox: Mutex::new(Some(outbox)),
        });
        spawn_delivery(&device, inbox);
        self.register(&device);
        MemoryReplica { inner: device }
    }

    /// Blocks until every attached device has handled the deliveries queued
    /// for it so far. Must not be called from a change handler.
    pub fn flush(&self) {
        let devices = lock_unpoisoned(&self.inner.state)
            .devices
            .iter()
            .filter_map(Weak::upgrade)
            .collect::<Vec<_>>();
        for device in devices {
            device.flush();
        }
    }

    /// Decoded value currently held by the cloud for `key`.
    pub fn value(&self, key: &str) -> Option<BookmarkList> {
        let blob = {
            let state = lock_unpoisoned(&self.inner.state);
            state.entries.get(key).and_then(|entry| entry.value.clone())
        }?;
        decode_list(&blob).ok().map(|decoded| decoded.bookmarks)
    }

    /// Bytes counted against the quota.
    pub fn stored_bytes(&self) -> usize {
        let state = lock_unpoisoned(&self.inner.state);
        stored_bytes(&state.entries, None)
    }

    /// Writes `key` as if another, out-of-process device had pushed it.
    pub fn server_write(&self, key: &str, list: &BookmarkList) -> ReplicaResult<()> {
        let blob = encode_list(list).map_err(|err| {
            ReplicaError::new(
                MEMORY_REPLICA_ID,
                ReplicaStage::Push,
                "encode_failed",
                err.to_string(),
                false,
            )
        })?;
        match self.commit(key, Some(blob)) {
            Some((entry, devices)) => {
                fan_out(self.account_id(), key, &entry, &devices, None);
                Ok(())
            }
            None => Err(quota_error(ReplicaStage::Push)),
        }
    }

    /// Removes `key` as if another device had cleared it.
    pub fn server_remove(&self, key: &str) {
        if let Some((entry, devices)) = self.commit(key, None) {
            fan_out(self.account_id(), key, &entry, &devices, None);
        }
    }

    fn register(&self, device: &Arc<DeviceInner>) {
        let mut state = lock_unpoisoned(&self.inner.state);
        state.devices.retain(|weak| weak.strong_count() > 0);
        state.devices.push(Arc::downgrade(device));
    }

    /// Stores a new revision of `key`; `None` when the write breaks quota.
    fn commit(
        &self,
        key: &str,
        value: Option<Vec<u8>>,
    ) -> Option<(CloudEntry, Vec<Arc<DeviceInner>>)> {
        let mut state = lock_unpoisoned(&self.inner.state);
        if let (Some(quota), Some(blob)) = (state.quota_bytes, value.as_ref()) {
            let projected = stored_bytes(&state.entries, Some(key)) + key.len() + blob.len();
            if projected > quota {
                return None;
            }
        }

        state.next_revision += 1;
        let entry = CloudEntry {
            value,
            revision: state.next_revision,
        };
        state.entries.insert(key.to_string(), entry.clone());
        let devices = state.devices.iter().filter_map(Weak::upgrade).collect();
        Some((entry, devices))
    }

    fn snapshot(&self) -> BTreeMap<String, CloudEntry> {
        lock_unpoisoned(&self.inner.state).entries.clone()
    }
}

fn stored_bytes(entries: &BTreeMap<String, CloudEntry>, excluding: Option<&str>) -> usize {
    entries
        .iter()
        .filter(|(key, _)| Some(key.as_str()) != excluding)
        .filter_map(|(key, entry)| entry.value.as_ref().map(|blob| key.len() + blob.len()))
        .sum()
}

fn fan_out(
    account_id: Uuid,
    key: &str,
    entry: &CloudEntry,
    devices: &[Arc<DeviceInner>],
    origin: Option<Uuid>,
) {
    for device in devices {
        if Some(device.device_id) == origin {
            continue;
        }
        device.enqueue(Delivery::Remote {
            account_id,
            key: key.to_string(),
            entry: entry.clone(),
        });
    }
}

/// Starts the worker that runs `device`'s deliveries. Without a worker,
/// deliveries run inline on the enqueuing thread.
fn spawn_delivery(device: &Arc<DeviceInner>, inbox: Receiver<Delivery>) {
    let weak = Arc::downgrade(device);
    let spawned = thread::Builder::new()
        .name(format!("skymark-replica-{}", device.device_id))
        .spawn(move || {
            for delivery in inbox {
                let Some(device) = weak.upgrade() else {
                    break;
                };
                device.process(delivery);
            }
        });
    if let Err(err) = spawned {
        warn!(
            "event=replica_attach module=sync status=degraded device_id={} error={err}",
            device.device_id
        );
        lock_unpoisoned(&device.outbox).take();
    }
}

fn deliver(handlers: &[ChangeHandler], event: &ChangeEvent) {
    for handler in handlers {
        handler(event);
    }
}

fn quota_error(stage: ReplicaStage) -> ReplicaError {
    ReplicaError::new(
        MEMORY_REPLICA_ID,
        stage,
        "quota_exceeded",
        "cloud storage quota exceeded",
        false,
    )
}

struct DeviceState {
    cloud: MemoryCloud,
    cache: BTreeMap<String, Vec<u8>>,
    seen: BTreeMap<String, u64>,
    handlers: BTreeMap<SubscriptionId, ChangeHandler>,
    initial_sync_done: bool,
    online: bool,
}

impl DeviceState {
    fn handlers(&self) -> Vec<ChangeHandler> {
        self.handlers.values().cloned().collect()
    }

    /// Applies cloud entries newer than what this device has seen and
    /// returns the keys whose cached value changed.
    fn absorb(&mut self, entries: BTreeMap<String, CloudEntry>) -> BTreeSet<String> {
        let mut changed = BTreeSet::new();
        for (key, entry) in entries {
            if self.seen.get(&key).is_some_and(|seen| *seen >= entry.revision) {
                continue;
            }
            self.seen.insert(key.clone(), entry.revision);
            if self.cache.get(&key) == entry.value.as_ref() {
                continue;
            }
            match entry.value {
                Some(blob) => {
                    self.cache.insert(key.clone(), blob);
                }
                None => {
                    self.cache.remove(&key);
                }
            }
            changed.insert(key);
        }
        changed
    }
}

enum Delivery {
    Remote {
        account_id: Uuid,
        key: String,
        entry: CloudEntry,
    },
    Event(ChangeEvent),
    Flush(Sender<()>),
}

struct DeviceInner {
    device_id: Uuid,
    state: Mutex<DeviceState>,
    /// `None` when no delivery worker could be started.
    outbox: Mutex<Option<Sender<Delivery>>>,
}

impl DeviceInner {
    fn enqueue(&self, delivery: Delivery) {
        let rejected = match lock_unpoisoned(&self.outbox).as_ref() {
            Some(outbox) => outbox.send(delivery).err().map(|err| err.0),
            None => Some(delivery),
        };
        if let Some(delivery) = rejected {
            self.process(delivery);
        }
    }

    fn process(&self, delivery: Delivery) {
        match delivery {
            Delivery::Remote {
                account_id,
                key,
                entry,
            } => {
                if let Some(handlers) = self.apply_remote(account_id, &key, &entry) {
                    deliver(&handlers, &ChangeEvent::new([key], ChangeReason::ServerChange));
                }
            }
            Delivery::Event(event) => {
                let handlers = lock_unpoisoned(&self.state).handlers();
                deliver(&handlers, &event);
            }
            Delivery::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    fn flush(&self) {
        let (done, wait) = mpsc::channel();
        self.enqueue(Delivery::Flush(done));
        let _ = wait.recv();
    }

    fn apply_remote(
        &self,
        account_id: Uuid,
        key: &str,
        entry: &CloudEntry,
    ) -> Option<Vec<ChangeHandler>> {
        let mut state = lock_unpoisoned(&self.state);
        if state.cloud.account_id() != account_id || !state.online {
            return None;
        }
        let mut entries = BTreeMap::new();
        entries.insert(key.to_string(), entry.clone());
        if state.absorb(entries).is_empty() {
            return None;
        }
        Some(state.handlers())
    }
}

/// One device's view of a `MemoryCloud`.
#[derive(Clone)]
pub struct MemoryReplica {
    inner: Arc<DeviceInner>,
}

impl MemoryReplica {
    pub fn device_id(&self) -> Uuid {
        self.inner.device_id
    }

    pub fn account_id(&self) -> Uuid {
        lock_unpoisoned(&self.inner.state).cloud.account_id()
    }

    /// Toggles connectivity; offline devices keep serving their cache.
    pub fn set_online(&self, online: bool) {
        lock_unpoisoned(&self.inner.state).online = online;
    }

    pub fn is_online(&self) -> bool {
        lock_unpoisoned(&self.inner.state).online
    }

    /// Blocks until this device has handled every delivery queued so far.
    /// Must not be called from a change handler.
    pub fn flush(&self) {
        self.inner.flush();
    }

    /// Keys present in this device's cache.
    pub fn cached_keys(&self) -> Vec<String> {
        lock_unpoisoned(&self.inner.state)
            .cache
            .keys()
            .cloned()
            .collect()
    }

    /// Signs this device in to another account.
    ///
    /// The cache is replaced by the new cloud's contents and every key that
    /// existed on either side is reported as an account change.
    pub fn switch_account(&self, cloud: &MemoryCloud) {
        let previous_keys = {
            let mut state = lock_unpoisoned(&self.inner.state);
            state.cloud = cloud.clone();
            state.seen.clear();
            state.initial_sync_done = true;
            std::mem::take(&mut state.cache)
                .into_keys()
                .collect::<BTreeSet<_>>()
        };
        cloud.register(&self.inner);

        let entries = cloud.snapshot();
        let (mut affected, handlers) = {
            let mut state = lock_unpoisoned(&self.inner.state);
            (state.absorb(entries), state.handlers())
        };
        affected.extend(previous_keys);

        info!(
            "event=replica_account_change module=sync status=ok device_id={} keys={}",
            self.device_id(),
            affected.len()
        );
        if !affected.is_empty() {
            deliver(
                &handlers,
                &ChangeEvent {
                    affected_keys: affected,
                    reason: ChangeReason::AccountChange,
                },
            );
        }
    }

    /// Delivers an event with an arbitrary platform reason code.
    pub fn emit_raw<I, K>(&self, keys: I, code: i64)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let handlers = lock_unpoisoned(&self.inner.state).handlers();
        deliver(&handlers, &ChangeEvent::new(keys, ChangeReason::from_code(code)));
    }

    fn offline_error(&self, stage: ReplicaStage) -> ReplicaError {
        ReplicaError::new(
            MEMORY_REPLICA_ID,
            stage,
            "offline",
            format!("device {} is offline", self.device_id()),
            true,
        )
    }
}

impl RemoteReplica for MemoryReplica {
    fn replica_id(&self) -> &str {
        MEMORY_REPLICA_ID
    }

    fn pull(&self, key: &str) -> ReplicaResult<Option<BookmarkList>> {
        let Some(blob) = lock_unpoisoned(&self.inner.state).cache.get(key).cloned() else {
            return Ok(None);
        };
        let decoded = decode_list(&blob).map_err(|err| {
            ReplicaError::new(
                MEMORY_REPLICA_ID,
                ReplicaStage::Pull,
                "corrupt_value",
                err.to_string(),
                false,
            )
        })?;
        if !decoded.skipped.is_empty() {
            warn!(
                "event=replica_pull module=sync status=partial key={key} kept={} skipped={}",
                decoded.bookmarks.len(),
                decoded.skipped.len()
            );
        }
        Ok(Some(decoded.bookmarks))
    }

    fn push(&self, key: &str, list: &BookmarkList) -> ReplicaResult<()> {
        let blob = encode_list(list).map_err(|err| {
            ReplicaError::new(
                MEMORY_REPLICA_ID,
                ReplicaStage::Push,
                "encode_failed",
                err.to_string(),
                false,
            )
        })?;

        let cloud = {
            let mut state = lock_unpoisoned(&self.inner.state);
            if !state.online {
                return Err(self.offline_error(ReplicaStage::Push));
            }
            state.cache.insert(key.to_string(), blob.clone());
            state.cloud.clone()
        };

        let Some((entry, devices)) = cloud.commit(key, Some(blob)) else {
            // The cache keeps the value; the cloud never sees it.
            warn!(
                "event=replica_push module=sync status=error key={key} error_code=quota_exceeded"
            );
            self.inner
                .enqueue(Delivery::Event(ChangeEvent::new([key], ChangeReason::QuotaViolation)));
            return Ok(());
        };

        lock_unpoisoned(&self.inner.state)
            .seen
            .insert(key.to_string(), entry.revision);
        debug!(
            "event=replica_push module=sync status=ok key={key} revision={} count={}",
            entry.revision,
            list.len()
        );
        fan_out(
            cloud.account_id(),
            key,
            &entry,
            &devices,
            Some(self.device_id()),
        );
        Ok(())
    }

    fn subscribe(&self, handler: ChangeHandler) -> ReplicaResult<SubscriptionId> {
        let id = SubscriptionId::new();
        lock_unpoisoned(&self.inner.state)
            .handlers
            .insert(id, handler);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        lock_unpoisoned(&self.inner.state).handlers.remove(&id);
    }

    fn force_sync(&self) -> ReplicaResult<()> {
        let cloud = {
            let state = lock_unpoisoned(&self.inner.state);
            if !state.online {
                return Err(self.offline_error(ReplicaStage::ForceSync));
            }
            state.cloud.clone()
        };

        let entries = cloud.snapshot();
        let (changed, reason, handlers) = {
            let mut state = lock_unpoisoned(&self.inner.state);
            let changed = state.absorb(entries);
            let reason = if state.initial_sync_done {
                ChangeReason::ServerChange
            } else {
                ChangeReason::InitialSync
            };
            state.initial_sync_done = true;
            (changed, reason, state.handlers())
        };

        debug!(
            "event=replica_force_sync module=sync status=ok reason={} changed={}",
            reason.as_str(),
            changed.len()
        );
        if !changed.is_empty() {
            deliver(
                &handlers,
                &ChangeEvent {
                    affected_keys: changed,
                    reason,
                },
            );
        }
        Ok(())
    }
}
