//! Bounded job polling.
//!
//! Unbounded client-side polling leaks resources; this helper caps the
//! total wait and backs off exponentially between polls.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::QueueError;
use crate::job::{JobId, JobStatus};
use crate::queue::JobQueue;

const INITIAL_POLL_DELAY: Duration = Duration::from_millis(50);
const MAX_POLL_DELAY: Duration = Duration::from_secs(2);

/// Poll until the job settles (Completed or Failed) or `timeout` elapses.
pub async fn poll_status(
    queue: &JobQueue,
    id: JobId,
    timeout: Duration,
) -> Result<JobStatus, QueueError> {
    let deadline = Instant::now() + timeout;
    let mut delay = INITIAL_POLL_DELAY;

    loop {
        let status = queue.status(id).await?;
        if status.state.is_settled() {
            return Ok(status);
        }

        if Instant::now() + delay > deadline {
            return Err(QueueError::PollTimeout(id));
        }

        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(MAX_POLL_DELAY);
    }
}
