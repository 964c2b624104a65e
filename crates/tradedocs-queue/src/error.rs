use thiserror::Error;

use crate::job::JobId;

/// Errors produced by the queue adapter.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Queue is shut down")]
    Closed,

    #[error("Timed out waiting for job {0} to settle")]
    PollTimeout(JobId),
}
