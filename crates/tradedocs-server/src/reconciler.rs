//! Ledger event reconciliation.
//!
//! Two delivery paths feed the same dispatch function: a live subscription
//! for low latency, and a periodic backfill scan that re-reads recent block
//! ranges so events missed during downtime (or a dropped subscription) are
//! still applied.  Every write goes through the store's compare-and-swap
//! transitions, so a duplicate delivery from either path is a no-op.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tradedocs_ledger::{DocumentLedger, LedgerEvent};
use tradedocs_shared::constants::{
    BACKFILL_BATCH_BLOCKS, BACKFILL_ERROR_BACKOFF, BACKFILL_INITIAL_LOOKBACK, BACKFILL_INTERVAL,
};
use tradedocs_shared::{HistoryAction, UserId};
use tradedocs_store::StoreError;

use crate::state::SharedDb;

pub struct Reconciler {
    db: SharedDb,
    ledger: Arc<dyn DocumentLedger>,
    backfill_interval: Duration,
    error_backoff: Duration,
}

impl Reconciler {
    pub fn new(db: SharedDb, ledger: Arc<dyn DocumentLedger>) -> Self {
        Self {
            db,
            ledger,
            backfill_interval: BACKFILL_INTERVAL,
            error_backoff: BACKFILL_ERROR_BACKOFF,
        }
    }

    #[cfg(test)]
    fn with_timing(mut self, backfill_interval: Duration, error_backoff: Duration) -> Self {
        self.backfill_interval = backfill_interval;
        self.error_backoff = error_backoff;
        self
    }

    /// Spawn the live and backfill tasks.  They run until aborted.
    pub fn spawn(self) -> (JoinHandle<()>, JoinHandle<()>) {
        let live = tokio::spawn(live_loop(
            self.db.clone(),
            self.ledger.clone(),
            self.error_backoff,
        ));
        let backfill = tokio::spawn(backfill_loop(
            self.db,
            self.ledger,
            self.backfill_interval,
            self.error_backoff,
        ));
        (live, backfill)
    }
}

/// Keep a live subscription open, reopening it whenever it ends.
async fn live_loop(db: SharedDb, ledger: Arc<dyn DocumentLedger>, error_backoff: Duration) {
    loop {
        match ledger.subscribe().await {
            Ok(mut subscription) => {
                info!("live event subscription opened");
                while let Some(event) = subscription.recv().await {
                    if let Err(e) = apply_event(&db, &event).await {
                        warn!(event = event.name(), error = %e, "failed to apply live event");
                    }
                }
                warn!("live event subscription ended, reopening");
            }
            Err(e) => {
                warn!(error = %e, "failed to open event subscription");
            }
        }
        tokio::time::sleep(error_backoff).await;
    }
}

/// Periodically scan forward from the last processed block.
///
/// `last_processed` only advances past a batch once every event in it has
/// been fetched, so a failed scan is retried from the same position.
async fn backfill_loop(
    db: SharedDb,
    ledger: Arc<dyn DocumentLedger>,
    interval: Duration,
    error_backoff: Duration,
) {
    let mut last_processed = loop {
        match ledger.block_number().await {
            Ok(head) => break head.saturating_sub(BACKFILL_INITIAL_LOOKBACK),
            Err(e) => {
                warn!(error = %e, "failed to read chain head, retrying");
                tokio::time::sleep(error_backoff).await;
            }
        }
    };
    info!(from_block = last_processed + 1, "backfill starting");

    loop {
        tokio::time::sleep(interval).await;

        let head = match ledger.block_number().await {
            Ok(head) => head,
            Err(e) => {
                warn!(error = %e, "failed to read chain head");
                tokio::time::sleep(error_backoff).await;
                continue;
            }
        };

        while last_processed < head {
            let to = (last_processed + BACKFILL_BATCH_BLOCKS).min(head);
            let events = match ledger.events_in_range(last_processed + 1, to).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(
                        from = last_processed + 1,
                        to,
                        error = %e,
                        "backfill batch failed"
                    );
                    tokio::time::sleep(error_backoff).await;
                    break;
                }
            };

            if !events.is_empty() {
                debug!(from = last_processed + 1, to, count = events.len(), "backfill batch");
            }
            for event in &events {
                if let Err(e) = apply_event(&db, event).await {
                    warn!(event = event.name(), error = %e, "failed to apply backfill event");
                }
            }
            last_processed = to;
        }
    }
}

/// Apply one confirmed event to local state.
///
/// Events for unknown registry ids are logged and dropped: this instance
/// never created that document, so there is nothing to update.  A lost CAS
/// means another path (the job worker or the other delivery path) already
/// applied the transition, and the history append is skipped with it.
pub(crate) async fn apply_event(db: &SharedDb, event: &LedgerEvent) -> Result<(), StoreError> {
    let db = db.lock().await;

    let Some(doc) = db.get_document_by_blockchain_id(event.document_id())? else {
        debug!(
            event = event.name(),
            blockchain_id = event.document_id(),
            "event for unknown document dropped"
        );
        return Ok(());
    };

    match event {
        LedgerEvent::DocumentCreated {
            transaction_hash,
            block_number,
            ..
        } => {
            if db.mark_active_confirmed(doc.id, transaction_hash, *block_number as i64)? {
                db.append_history(
                    doc.id,
                    HistoryAction::Activate,
                    doc.creator,
                    Some(transaction_hash),
                    Some(json!({"status": "Active", "source": "event"})),
                )?;
                info!(document = %doc.id, "activation confirmed from event");
            }
        }

        LedgerEvent::DocumentVerified {
            verifier,
            transaction_hash,
            block_number,
            ..
        } => {
            let performed_by = resolve_actor(&db, verifier, doc.creator)?;
            let verified_at = Utc::now();
            if db.mark_verified(
                doc.id,
                transaction_hash,
                *block_number as i64,
                performed_by,
                verified_at,
            )? {
                db.append_history(
                    doc.id,
                    HistoryAction::Verify,
                    performed_by,
                    Some(transaction_hash),
                    Some(json!({"status": "Verified", "source": "event"})),
                )?;
                info!(document = %doc.id, "verification confirmed from event");
            }
        }

        LedgerEvent::DocumentTransferred {
            from,
            to,
            transaction_hash,
            block_number,
            ..
        } => {
            if db.mark_transferred(doc.id, transaction_hash, *block_number as i64)? {
                let performed_by = resolve_actor(&db, from, doc.creator)?;
                match db.find_user_by_wallet(to)? {
                    Some(holder) => {
                        db.append_endorsement(doc.id, holder.id)?;
                        db.append_history(
                            doc.id,
                            HistoryAction::Transfer,
                            performed_by,
                            Some(transaction_hash),
                            Some(json!({
                                "status": "Transferred",
                                "transferredTo": holder.id,
                                "source": "event",
                            })),
                        )?;
                    }
                    None => {
                        warn!(
                            document = %doc.id,
                            address = %to,
                            "no identity for destination address, endorsement chain unchanged"
                        );
                    }
                }
                info!(document = %doc.id, "transfer confirmed from event");
            }
        }

        LedgerEvent::DocumentRevoked {
            revoked_by,
            transaction_hash,
            block_number,
            ..
        } => {
            let actor = db.find_user_by_wallet(revoked_by)?.map(|u| u.id);
            let revoked_at = Utc::now();
            if db.mark_revoked(
                doc.id,
                transaction_hash,
                *block_number as i64,
                actor,
                revoked_at,
            )? {
                db.append_history(
                    doc.id,
                    HistoryAction::Revoke,
                    actor.unwrap_or(doc.creator),
                    Some(transaction_hash),
                    Some(json!({"status": "Revoked", "source": "event"})),
                )?;
                info!(document = %doc.id, "revocation applied from event");
            }
        }
    }

    Ok(())
}

/// Resolve an on-chain address to a local identity, falling back to the
/// document's creator when the address is unknown.
fn resolve_actor(
    db: &tradedocs_store::Database,
    address: &str,
    fallback: UserId,
) -> Result<UserId, StoreError> {
    Ok(db.find_user_by_wallet(address)?.map_or(fallback, |u| u.id))
}
