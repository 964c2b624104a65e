//! Gas pricing policy.
//!
//! The observed network price is cached with a 1.1x margin and refreshed
//! every ten minutes; the per-transaction gas limit is the node's estimate
//! with a 1.2x margin.  The margins absorb estimation drift between the
//! estimate call and submission; they are not a guarantee against
//! out-of-gas failures under contention.

use std::sync::atomic::{AtomicU64, Ordering};

use tradedocs_shared::constants::{GAS_LIMIT_MARGIN, GAS_PRICE_MARGIN};

/// Fallback price (wei) used until the first successful refresh, matching
/// a 10 gwei default.
pub const DEFAULT_GAS_PRICE: u64 = 10_000_000_000;

/// Apply the price safety margin to an observed gas price.
pub fn price_with_margin(observed: u64) -> u64 {
    (observed as f64 * GAS_PRICE_MARGIN).floor() as u64
}

/// Apply the limit safety margin to a gas estimate.
pub fn limit_with_margin(estimate: u64) -> u64 {
    (estimate as f64 * GAS_LIMIT_MARGIN).floor() as u64
}

/// Lock-free cache for the current gas price.
#[derive(Debug)]
pub struct GasPriceCache {
    current: AtomicU64,
}

impl GasPriceCache {
    pub fn new() -> Self {
        Self {
            current: AtomicU64::new(DEFAULT_GAS_PRICE),
        }
    }

    pub fn get(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Store a freshly observed price, margin applied.
    pub fn update_observed(&self, observed: u64) {
        self.current
            .store(price_with_margin(observed), Ordering::Relaxed);
    }
}

impl Default for GasPriceCache {
    fn default() -> Self {
        Self::new()
    }
}
