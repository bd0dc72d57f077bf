use std::sync::Arc;
use std::time::Duration;

use autotask_store::TaskStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Queue cleaner: deletes expired one-shot entries every `interval` until
/// `cancel` fires.
pub async fn run_cleaner(store: Arc<TaskStore>, interval: Duration, cancel: CancellationToken) {
    info!("queue cleaner started (interval={interval:?})");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("queue cleaner stopped");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                debug!("queue cleaner sweep");
                match store.delete_expired_one_shot() {
                    Ok(0) => {}
                    Ok(n) => info!("queue cleaner: removed {n} expired tasks"),
                    Err(e) => error!("queue cleaner error: {e}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotask_store::{NewTask, TaskStatus};
    use chrono::{TimeDelta, Utc};

    #[tokio::test]
    async fn removes_expired_and_keeps_the_rest() {
        let store = Arc::new(TaskStore::open_in_memory().unwrap());
        let now = Utc::now();

        let mut expired = store
            .create(NewTask::one_shot("m", "old", vec![], now, 0, TimeDelta::zero()))
            .unwrap();
        expired.status = TaskStatus::Done;
        expired.expire_at = Some(now - TimeDelta::seconds(1));
        store.save(&expired).unwrap();

        let mut fresh = store
            .create(NewTask::one_shot("m", "new", vec![], now, 0, TimeDelta::hours(1)))
            .unwrap();
        fresh.status = TaskStatus::Done;
        fresh.expire_at = Some(now + TimeDelta::hours(1));
        store.save(&fresh).unwrap();

        let pending = store
            .create(NewTask::one_shot("m", "pending", vec![], now, 0, TimeDelta::zero()))
            .unwrap();

        let cancel = CancellationToken::new();
        let cleaner = tokio::spawn(run_cleaner(
            Arc::clone(&store),
            Duration::from_millis(10),
            cancel.clone(),
        ));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.get(&expired.id).unwrap().is_some() {
            assert!(tokio::time::Instant::now() < deadline, "expired entry not cleaned");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        cleaner.await.unwrap();

        assert!(store.get(&fresh.id).unwrap().is_some());
        assert!(store.get(&pending.id).unwrap().is_some());
    }
}
