// Several connections to one database file stand in for cooperating worker
// processes: each thread owns its own TaskStore.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use autotask_core::DatabaseConfig;
use autotask_store::{NewTask, TaskStatus, TaskStore};
use chrono::{TimeDelta, Utc};

fn config(dir: &tempfile::TempDir) -> DatabaseConfig {
    DatabaseConfig {
        path: dir.path().join("queue.db").to_string_lossy().into_owned(),
        busy_timeout_ms: 10_000,
    }
}

#[test]
fn concurrent_claimers_never_share_an_entry() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    let setup = TaskStore::open(&cfg).unwrap();
    let now = Utc::now();
    let mut created = HashSet::new();
    for i in 0..60 {
        let task = NewTask::one_shot(
            "contention",
            format!("job_{i}"),
            b"[]".to_vec(),
            now - TimeDelta::milliseconds(i),
            0,
            TimeDelta::seconds(60),
        );
        created.insert(setup.create(task).unwrap().id);
    }

    let workers = 6;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let cfg = cfg.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let store = TaskStore::open(&cfg).unwrap();
                barrier.wait();
                let mut claimed = Vec::new();
                while let Some(entry) = store.claim_next().unwrap() {
                    assert_eq!(entry.status, TaskStatus::Running);
                    claimed.push(entry.id);
                }
                claimed
            })
        })
        .collect();

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.join().unwrap() {
            total += 1;
            assert!(seen.insert(id), "entry claimed twice");
        }
    }
    assert_eq!(total, created.len());
    assert_eq!(seen, created);
    assert!(setup
        .list()
        .unwrap()
        .iter()
        .all(|e| e.status == TaskStatus::Running));
}

#[test]
fn exactly_one_concurrent_leader() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    // create the schema up front so every thread races on the marker only
    drop(TaskStore::open(&cfg).unwrap());

    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));
    let handles: Vec<_> = (0..contenders)
        .map(|_| {
            let cfg = cfg.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let store = TaskStore::open(&cfg).unwrap();
                barrier.wait();
                store.try_acquire_leader_marker().unwrap()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);

    let store = TaskStore::open(&cfg).unwrap();
    assert!(!store.try_acquire_leader_marker().unwrap());
    let markers = store
        .list()
        .unwrap()
        .into_iter()
        .filter(|e| e.is_leader_marker())
        .count();
    assert_eq!(markers, 1);
}

#[test]
fn reopening_keeps_entries() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    let id = {
        let store = TaskStore::open(&cfg).unwrap();
        store
            .create(NewTask::periodic(
                "reopen",
                "tick",
                b"[]".to_vec(),
                Utc::now(),
                TimeDelta::seconds(5),
            ))
            .unwrap()
            .id
    };
    let store = TaskStore::open(&cfg).unwrap();
    let entry = store.get(&id).unwrap().expect("persisted");
    assert_eq!(entry.interval, Some(TimeDelta::seconds(5)));
    assert!(store.find_periodic("reopen", "tick").unwrap());
}
