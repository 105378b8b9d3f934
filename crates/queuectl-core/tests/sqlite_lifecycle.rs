#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use queuectl_core::impls::{ShellExecutor, SqliteJobStore, SqliteStoreOptions};
use queuectl_core::ports::JobStore;
use queuectl_core::{
    ClaimOutcome, ContentionBackoff, JobDefinition, JobId, JobQueue, JobState, PoolOptions,
    QueueConfig, QueueError, WorkerPool,
};
use tempfile::TempDir;

async fn open_store(dir: &TempDir) -> SqliteJobStore {
    SqliteJobStore::open_path(dir.path().join("queuectl.db"))
        .await
        .expect("Failed to open store")
}

async fn wait_for_state(queue: &JobQueue, id: &JobId, state: JobState) {
    for _ in 0..500 {
        if queue.get_job(id).await.unwrap().state == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached {state}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_command_goes_dead_and_can_be_requeued() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let queue = JobQueue::new(
        Arc::new(store),
        QueueConfig {
            // round(0.1^n) = 0 s: every retry is due immediately
            backoff_base: 0.1,
            ..QueueConfig::default()
        },
    )
    .unwrap();

    let definition = JobDefinition::from_json(r#"{"id":"j1","command":"exit 1","max_retries":1}"#)
        .unwrap();
    let id = queue.enqueue(definition).await.unwrap();

    let pool = WorkerPool::with_options(
        queue.clone(),
        Arc::new(ShellExecutor::new()),
        PoolOptions {
            idle_interval: Duration::from_millis(10),
        },
    );
    pool.start(1).unwrap();
    wait_for_state(&queue, &id, JobState::Dead).await;
    pool.stop().await.unwrap();

    let dead = queue.get_job(&id).await.unwrap();
    assert_eq!(dead.attempts, 2);
    assert_eq!(dead.next_retry_at, None);
    assert_eq!(queue.stats().await.unwrap().dead, 1);

    queue.requeue_dead(&id).await.unwrap();
    let requeued = queue.get_job(&id).await.unwrap();
    assert_eq!(requeued.state, JobState::Pending);
    assert_eq!(requeued.attempts, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn successful_commands_complete() {
    let dir = tempfile::tempdir().unwrap();
    let queue = JobQueue::new(Arc::new(open_store(&dir).await), QueueConfig::default()).unwrap();
    let pool = WorkerPool::with_options(
        queue.clone(),
        Arc::new(ShellExecutor::new()),
        PoolOptions {
            idle_interval: Duration::from_millis(10),
        },
    );

    let first = queue.enqueue(JobDefinition::new("first", "echo hello")).await.unwrap();
    let second = queue.enqueue(JobDefinition::new("second", "true")).await.unwrap();
    pool.start(2).unwrap();
    wait_for_state(&queue, &first, JobState::Completed).await;
    wait_for_state(&queue, &second, JobState::Completed).await;
    pool.stop().await.unwrap();

    let counts = queue.stats().await.unwrap();
    assert_eq!(counts.completed, 2);
    assert_eq!(counts.total(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_connections_never_claim_the_same_job() {
    let dir = tempfile::tempdir().unwrap();
    let seed = JobQueue::new(Arc::new(open_store(&dir).await), QueueConfig::default()).unwrap();
    for i in 0..10 {
        seed.enqueue(JobDefinition::new(format!("job-{i}"), "true"))
            .await
            .unwrap();
    }

    // One store per claimer, as if each were its own process.
    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = JobQueue::new(Arc::new(open_store(&dir).await), QueueConfig::default()).unwrap();
        handles.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            loop {
                match queue.claim_next_ready().await {
                    Ok(ClaimOutcome::Claimed(job)) => claimed.push(job.id),
                    Ok(ClaimOutcome::Empty) => {
                        if queue.stats().await.unwrap().pending == 0 {
                            break;
                        }
                    }
                    Err(e) if matches!(e, QueueError::ContentionExhausted { .. }) => continue,
                    Err(e) => panic!("claim failed: {e}"),
                }
            }
            claimed
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    let before = all.len();
    all.dedup();
    assert_eq!(before, 10);
    assert_eq!(all.len(), 10);
}

#[tokio::test]
async fn locked_database_is_reported_as_busy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queuectl.db");
    let store = SqliteJobStore::open(
        SqliteStoreOptions::new(&path).busy_timeout(Duration::from_millis(0)),
    )
    .await
    .unwrap();
    let queue = JobQueue::builder(Arc::new(store.clone()))
        .contention_backoff(ContentionBackoff::new(Duration::from_millis(1), 3))
        .build()
        .unwrap();
    queue.enqueue(JobDefinition::new("a", "true")).await.unwrap();

    // Another writer holds the write lock.
    let locker = open_store(&dir).await;
    let mut conn = locker.pool().acquire().await.unwrap();
    sqlx::query("begin immediate").execute(&mut *conn).await.unwrap();

    let err = store
        .apply_outcome(&JobId::new("a"), JobState::Completed, 0, None, chrono::Utc::now())
        .await
        .unwrap_err();
    assert!(err.is_busy(), "got {err:?}");

    let err = queue.claim_next_ready().await.unwrap_err();
    assert!(matches!(err, QueueError::ContentionExhausted { attempts: 3 }));

    sqlx::query("rollback").execute(&mut *conn).await.unwrap();
    drop(conn);

    let claimed = queue.claim_next_ready().await.unwrap();
    assert!(matches!(claimed, ClaimOutcome::Claimed(_)));
}
