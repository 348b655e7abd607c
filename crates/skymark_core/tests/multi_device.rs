use skymark_core::{
    Bookmark, BookmarkList, DiagnosticLog, MemoryCloud, MemoryReplica, RemoteReplica,
    SqliteLocalStore, SyncConfig, SyncDiagnostic, Synchronizer,
};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const KEY: &str = "Bookmarks";

struct Device {
    sync: Synchronizer<SqliteLocalStore>,
    replica: Arc<MemoryReplica>,
    diagnostics: Arc<DiagnosticLog>,
}

fn device(cloud: &MemoryCloud) -> Device {
    let replica = Arc::new(cloud.attach());
    let diagnostics = Arc::new(DiagnosticLog::new());
    let sync = Synchronizer::with_diagnostics(
        SqliteLocalStore::open_in_memory().unwrap(),
        replica.clone(),
        SyncConfig::default(),
        diagnostics.clone(),
    )
    .unwrap();
    sync.start().unwrap();
    Device {
        sync,
        replica,
        diagnostics,
    }
}

fn names(list: &BookmarkList) -> Vec<&str> {
    list.iter().map(|bookmark| bookmark.name.as_str()).collect()
}

#[test]
fn append_on_one_device_reaches_the_other() {
    let cloud = MemoryCloud::new();
    let laptop = device(&cloud);
    let desktop = device(&cloud);

    laptop.sync.append_coordinate("M31", 10.68, 41.27).unwrap();
    cloud.flush();
    desktop.sync.append_solution("IC 1805", vec![1, 2, 3]).unwrap();
    cloud.flush();

    let expected: BookmarkList = vec![
        Bookmark::coordinate("M31", 10.68, 41.27),
        Bookmark::solution("IC 1805", vec![1, 2, 3]),
    ]
    .into();
    assert_eq!(laptop.sync.current_bookmarks().unwrap(), expected);
    assert_eq!(desktop.sync.current_bookmarks().unwrap(), expected);
    assert_eq!(cloud.value(KEY), Some(expected));
}

#[test]
fn late_device_catches_up_through_initial_sync() {
    let cloud = MemoryCloud::new();
    let first = device(&cloud);
    first.sync.append_coordinate("M42", 83.82, -5.39).unwrap();
    first.sync.append_coordinate("M45", 56.75, 24.12).unwrap();

    let late = device(&cloud);

    assert_eq!(
        names(&late.sync.current_bookmarks().unwrap()),
        vec!["M42", "M45"]
    );
}

#[test]
fn server_side_removal_clears_every_device() {
    let cloud = MemoryCloud::new();
    let a = device(&cloud);
    let b = device(&cloud);
    a.sync.append_coordinate("gone soon", 1.0, 1.0).unwrap();
    cloud.flush();
    assert_eq!(b.sync.current_bookmarks().unwrap().len(), 1);

    cloud.server_remove(KEY);
    cloud.flush();

    assert!(a.sync.current_bookmarks().unwrap().is_empty());
    assert!(b.sync.current_bookmarks().unwrap().is_empty());
}

#[test]
fn quota_violation_keeps_local_copy_and_reports_once() {
    let cloud = MemoryCloud::with_quota(200);
    let a = device(&cloud);
    let b = device(&cloud);

    a.sync.append_coordinate("M31", 10.68, 41.27).unwrap();
    a.sync.append_solution("huge", vec![9u8; 500]).unwrap();
    cloud.flush();

    assert_eq!(a.sync.current_bookmarks().unwrap().len(), 2);
    assert_eq!(cloud.value(KEY).map(|list| list.len()), Some(1));
    assert_eq!(b.sync.current_bookmarks().unwrap().len(), 1);
    assert_eq!(
        a.diagnostics.drain(),
        vec![SyncDiagnostic::QuotaExceeded {
            key: KEY.to_string()
        }]
    );
    assert!(b.diagnostics.is_empty());
}

#[test]
fn account_switch_replaces_local_list() {
    let personal = MemoryCloud::new();
    let observatory = MemoryCloud::new();
    let remote: BookmarkList = vec![Bookmark::coordinate("NGC 7000", 314.75, 44.53)].into();
    observatory.server_write(KEY, &remote).unwrap();

    let a = device(&personal);
    a.sync.append_coordinate("personal", 1.0, 1.0).unwrap();

    a.replica.switch_account(&observatory);
    assert_eq!(a.replica.account_id(), observatory.account_id());
    assert_eq!(a.sync.current_bookmarks().unwrap(), remote);

    a.replica.switch_account(&MemoryCloud::new());
    assert!(a.sync.current_bookmarks().unwrap().is_empty());
}

#[test]
fn offline_push_is_absorbed_and_recovered_by_next_append() {
    let cloud = MemoryCloud::new();
    let a = device(&cloud);
    let b = device(&cloud);

    a.replica.set_online(false);
    a.sync.append_coordinate("offline", 1.0, 1.0).unwrap();
    assert_eq!(a.sync.current_bookmarks().unwrap().len(), 1);
    assert!(cloud.value(KEY).is_none());
    assert!(matches!(
        a.diagnostics.drain().as_slice(),
        [SyncDiagnostic::PushFailed { code, .. }] if code == "offline"
    ));

    a.replica.set_online(true);
    a.sync.append_coordinate("online", 2.0, 2.0).unwrap();
    cloud.flush();
    assert_eq!(
        names(&b.sync.current_bookmarks().unwrap()),
        vec!["offline", "online"]
    );
}

#[test]
fn offline_device_catches_up_on_force_sync() {
    let cloud = MemoryCloud::new();
    let a = device(&cloud);
    let b = device(&cloud);

    b.replica.set_online(false);
    a.sync.append_coordinate("while away", 1.0, 1.0).unwrap();
    cloud.flush();
    assert!(b.sync.current_bookmarks().unwrap().is_empty());

    b.replica.set_online(true);
    b.replica.force_sync().unwrap();
    assert_eq!(b.sync.current_bookmarks().unwrap().len(), 1);
}

#[test]
fn unknown_platform_reason_is_only_reported() {
    let cloud = MemoryCloud::new();
    let a = device(&cloud);
    a.sync.append_coordinate("stay", 1.0, 1.0).unwrap();

    a.replica.emit_raw([KEY], 42);

    assert_eq!(a.sync.current_bookmarks().unwrap().len(), 1);
    assert_eq!(
        a.diagnostics.drain(),
        vec![SyncDiagnostic::UnrecognizedChangeReason {
            key: KEY.to_string(),
            code: 42,
        }]
    );
}

#[test]
fn stopped_device_no_longer_follows_remote_changes() {
    let cloud = MemoryCloud::new();
    let a = device(&cloud);
    let b = device(&cloud);
    b.sync.stop();

    a.sync.append_coordinate("unseen", 1.0, 1.0).unwrap();
    cloud.flush();

    assert!(b.sync.current_bookmarks().unwrap().is_empty());
    assert_eq!(b.replica.cached_keys(), vec![KEY.to_string()]);
}

#[test]
fn append_does_not_wait_for_other_devices() {
    let cloud = MemoryCloud::new();
    let a = device(&cloud);
    let b = device(&cloud);

    let (release, gate) = mpsc::channel::<()>();
    let gate = Mutex::new(gate);
    let observer_thread = Arc::new(Mutex::new(None));
    let recorded = Arc::clone(&observer_thread);
    b.sync.add_observer(Arc::new(move |_: &BookmarkList| {
        *recorded.lock().unwrap() = Some(thread::current().id());
        let _ = gate.lock().unwrap().recv_timeout(Duration::from_secs(5));
    }));

    let started = Instant::now();
    a.sync.append_coordinate("M31", 10.68, 41.27).unwrap();
    let elapsed = started.elapsed();
    release.send(()).unwrap();
    cloud.flush();

    assert!(elapsed < Duration::from_secs(2), "append took {elapsed:?}");
    let handled_on = observer_thread.lock().unwrap().unwrap();
    assert_ne!(handled_on, thread::current().id());
    assert_eq!(b.sync.current_bookmarks().unwrap().len(), 1);
}
