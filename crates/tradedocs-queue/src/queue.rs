//! The queue itself: one worker task per queue, bounded retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use tradedocs_shared::constants::{JOB_ATTEMPTS, JOB_BACKOFF};

use crate::error::QueueError;
use crate::job::{JobId, JobRecord, JobState, JobStatus};

/// Work executed by a queue.
///
/// `run` is called once per attempt.  `on_exhausted` fires after the final
/// failed attempt so the owner can reflect the failure onto its own state
/// (the queue itself never touches documents).
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn run(&self, payload: Value) -> Result<Value, String>;

    async fn on_exhausted(&self, _payload: Value, _error: &str) {}
}

/// Retry budget for a queue's jobs.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: JOB_ATTEMPTS,
            backoff: JOB_BACKOFF,
        }
    }
}

/// A named job queue with one background worker.
#[derive(Clone)]
pub struct JobQueue {
    name: &'static str,
    jobs: Arc<Mutex<HashMap<JobId, JobRecord>>>,
    tx: mpsc::UnboundedSender<JobId>,
}

impl JobQueue {
    /// Create the queue and spawn its worker task.
    pub fn new(name: &'static str, handler: Arc<dyn JobHandler>, policy: RetryPolicy) -> Self {
        let jobs: Arc<Mutex<HashMap<JobId, JobRecord>>> = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = mpsc::unbounded_channel::<JobId>();

        let worker_jobs = jobs.clone();
        tokio::spawn(async move {
            while let Some(job_id) = rx.recv().await {
                process_job(name, &worker_jobs, handler.as_ref(), policy, job_id).await;
            }
            info!(queue = name, "queue worker shutting down");
        });

        Self { name, jobs, tx }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Submit a payload; returns the handle used for status polling.
    pub async fn enqueue(&self, payload: Value) -> Result<JobId, QueueError> {
        let id = JobId::new();
        self.jobs.lock().await.insert(id, JobRecord::new(id, payload));
        self.tx.send(id).map_err(|_| QueueError::Closed)?;
        info!(queue = self.name, job = %id, "job enqueued");
        Ok(id)
    }

    /// Current snapshot of a job.
    pub async fn status(&self, id: JobId) -> Result<JobStatus, QueueError> {
        self.jobs
            .lock()
            .await
            .get(&id)
            .map(|record| record.status.clone())
            .ok_or(QueueError::JobNotFound(id))
    }
}

async fn process_job(
    queue: &'static str,
    jobs: &Mutex<HashMap<JobId, JobRecord>>,
    handler: &dyn JobHandler,
    policy: RetryPolicy,
    id: JobId,
) {
    let Some(payload) = ({
        let mut guard = jobs.lock().await;
        guard.get_mut(&id).map(|record| {
            record.status.state = JobState::Active;
            record.payload.clone()
        })
    }) else {
        warn!(queue, job = %id, "job vanished before processing");
        return;
    };

    let mut last_error = String::new();
    for attempt in 1..=policy.attempts {
        {
            let mut guard = jobs.lock().await;
            if let Some(record) = guard.get_mut(&id) {
                record.status.attempts_made = attempt;
            }
        }

        match handler.run(payload.clone()).await {
            Ok(result) => {
                let mut guard = jobs.lock().await;
                if let Some(record) = guard.get_mut(&id) {
                    record.status.state = JobState::Completed;
                    record.status.progress = 100;
                    record.status.result = Some(result);
                }
                info!(queue, job = %id, attempt, "job completed");
                return;
            }
            Err(message) => {
                warn!(queue, job = %id, attempt, error = %message, "job attempt failed");
                last_error = message;
                if attempt < policy.attempts {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }

    {
        let mut guard = jobs.lock().await;
        if let Some(record) = guard.get_mut(&id) {
            record.status.state = JobState::Failed;
            record.status.error = Some(last_error.clone());
        }
    }
    error!(queue, job = %id, error = %last_error, "job failed, retry budget exhausted");
    handler.on_exhausted(payload, &last_error).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff: Duration::from_millis(5),
        }
    }

    async fn settled(queue: &JobQueue, id: JobId) -> JobStatus {
        crate::poll::poll_status(queue, id, Duration::from_secs(2))
            .await
            .expect("job should settle")
    }

    struct Succeeding;

    #[async_trait]
    impl JobHandler for Succeeding {
        async fn run(&self, payload: Value) -> Result<Value, String> {
            Ok(json!({"echo": payload}))
        }
    }

    struct FailingUntil {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl JobHandler for FailingUntil {
        async fn run(&self, _payload: Value) -> Result<Value, String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(format!("simulated failure {n}"))
            } else {
                Ok(json!({"ok": true}))
            }
        }
    }

    struct AlwaysFailing {
        exhausted: Arc<AtomicU32>,
    }

    #[async_trait]
    impl JobHandler for AlwaysFailing {
        async fn run(&self, _payload: Value) -> Result<Value, String> {
            Err("ledger unavailable".to_string())
        }

        async fn on_exhausted(&self, _payload: Value, error: &str) {
            assert_eq!(error, "ledger unavailable");
            self.exhausted.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn job_completes_with_result() {
        let queue = JobQueue::new("test", Arc::new(Succeeding), fast_policy(3));
        let id = queue.enqueue(json!({"a": 1})).await.unwrap();

        let status = settled(&queue, id).await;
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.attempts_made, 1);
        assert_eq!(status.result, Some(json!({"echo": {"a": 1}})));
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn job_retries_then_succeeds() {
        let handler = Arc::new(FailingUntil {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let queue = JobQueue::new("test", handler, fast_policy(3));
        let id = queue.enqueue(json!({})).await.unwrap();

        let status = settled(&queue, id).await;
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.attempts_made, 3);
    }

    #[tokio::test]
    async fn exhausted_job_reports_failure_and_fires_hook() {
        let exhausted = Arc::new(AtomicU32::new(0));
        let handler = Arc::new(AlwaysFailing {
            exhausted: exhausted.clone(),
        });
        let queue = JobQueue::new("test", handler, fast_policy(3));
        let id = queue.enqueue(json!({})).await.unwrap();

        let status = settled(&queue, id).await;
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.attempts_made, 3);
        assert_eq!(status.error.as_deref(), Some("ledger unavailable"));
        assert_eq!(exhausted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_job_status_is_an_error() {
        let queue = JobQueue::new("test", Arc::new(Succeeding), fast_policy(1));
        assert!(matches!(
            queue.status(JobId::new()).await,
            Err(QueueError::JobNotFound(_))
        ));
    }
}
