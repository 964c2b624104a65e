//! Tuning constants shared across the workspace.

use std::time::Duration;

/// Ledger job retry budget (attempts, including the first).
pub const JOB_ATTEMPTS: u32 = 3;

/// Fixed delay between job retry attempts.
pub const JOB_BACKOFF: Duration = Duration::from_secs(5);

/// Interval between reconciler backfill scans.
pub const BACKFILL_INTERVAL: Duration = Duration::from_secs(15);

/// Delay before retrying a failed backfill scan.
pub const BACKFILL_ERROR_BACKOFF: Duration = Duration::from_secs(30);

/// Maximum block span fetched per backfill batch.
pub const BACKFILL_BATCH_BLOCKS: u64 = 1000;

/// How far behind the head the very first backfill scan starts.
pub const BACKFILL_INITIAL_LOOKBACK: u64 = 1000;

/// Gas price refresh period.
pub const GAS_PRICE_REFRESH: Duration = Duration::from_secs(10 * 60);

/// Safety multiplier applied to the observed gas price.
pub const GAS_PRICE_MARGIN: f64 = 1.1;

/// Safety multiplier applied to the gas estimate.
pub const GAS_LIMIT_MARGIN: f64 = 1.2;

/// Default document expiry horizon when the caller supplies none.
pub const DEFAULT_EXPIRY_DAYS: i64 = 30;
