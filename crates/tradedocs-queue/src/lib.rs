//! # tradedocs-queue
//!
//! Asynchronous job queue for ledger work.
//!
//! Each [`JobQueue`] owns one worker task that executes a [`JobHandler`]
//! with a bounded retry budget (default 3 attempts, 5 s fixed backoff).
//! The queue only *reports* failure; moving a document to its `Error`
//! state is the handler owner's job, via the `on_exhausted` hook.
//!
//! Callers observe jobs by polling [`JobQueue::status`]; the
//! [`poll::poll_status`] helper bounds the total wait and backs off
//! exponentially between polls.

pub mod job;
pub mod poll;
pub mod queue;

mod error;

pub use error::QueueError;
pub use job::{JobId, JobState, JobStatus};
pub use poll::poll_status;
pub use queue::{JobHandler, JobQueue, RetryPolicy};
