//! Two supervisors in separate "processes" (own connections) on one file.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autotask_core::DatabaseConfig;
use autotask_store::{TaskStatus, TaskStore};
use autotask_supervisor::{ProcessManager, Result, Supervisor};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct CountingManager {
    spawned: Arc<AtomicUsize>,
}

#[async_trait]
impl ProcessManager for CountingManager {
    type Process = ();

    async fn spawn(&self) -> Result<()> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_alive(&self, _: &mut ()) -> bool {
        true
    }

    async fn terminate(&self, _: &mut ()) {}
}

fn open(dir: &tempfile::TempDir) -> Arc<TaskStore> {
    let config = DatabaseConfig {
        path: dir.path().join("leader.db").to_string_lossy().into_owned(),
        ..Default::default()
    };
    Arc::new(TaskStore::open(&config).unwrap())
}

fn supervisor(store: Arc<TaskStore>, manager: &CountingManager) -> Supervisor<CountingManager> {
    Supervisor::new(
        store,
        manager.clone(),
        2,
        Duration::from_millis(10),
        Duration::from_secs(60),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn only_one_of_two_concurrent_supervisors_leads() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b) = (CountingManager::default(), CountingManager::default());
    let cancel = CancellationToken::new();

    let first = tokio::spawn(supervisor(open(&dir), &a).run(cancel.clone()));
    let second = tokio::spawn(supervisor(open(&dir), &b).run(cancel.clone()));

    // The loser returns on its own; the leader keeps running.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !(first.is_finished() || second.is_finished()) {
        assert!(tokio::time::Instant::now() < deadline, "no supervisor deferred");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let observer = open(&dir);
    let markers = observer
        .list()
        .unwrap()
        .into_iter()
        .filter(|e| e.status == TaskStatus::SupervisorActive)
        .count();
    assert_eq!(markers, 1);

    cancel.cancel();
    let results = [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
    assert_eq!(results.iter().filter(|led| **led).count(), 1);
    assert_eq!(a.spawned.load(Ordering::SeqCst) + b.spawned.load(Ordering::SeqCst), 2);

    // leader shutdown released the marker
    assert!(observer.list().unwrap().is_empty());
}
