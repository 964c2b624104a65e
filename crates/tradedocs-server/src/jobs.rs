//! Ledger job handlers and queue wiring.
//!
//! One queue per operation kind, mirroring the three admission paths.
//! Each handler talks to the ledger (which blocks until confirmation) and
//! then applies the confirmed edge through the store's compare-and-swap
//! helpers.  When a job exhausts its retry budget, `on_exhausted` moves
//! the document to `Error` -- the queue itself only reports the failure.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use tradedocs_ledger::DocumentLedger;
use tradedocs_queue::{JobHandler, JobId, JobQueue, QueueError, RetryPolicy};
use tradedocs_shared::{DocumentId, HistoryAction, UserId};

use crate::state::SharedDb;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreationJob {
    pub document_id: DocumentId,
    pub category: u8,
    pub document_hash: String,
    /// Unix timestamp (seconds) submitted to the registry.
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationJob {
    pub document_id: DocumentId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferJob {
    pub document_id: DocumentId,
    pub new_holder: String,
    pub user_id: UserId,
}

/// The three operation queues.
#[derive(Clone)]
pub struct JobQueues {
    pub creation: JobQueue,
    pub verification: JobQueue,
    pub transfer: JobQueue,
}

impl JobQueues {
    /// Build the queues and spawn their workers.
    pub fn start(db: SharedDb, ledger: Arc<dyn DocumentLedger>) -> Self {
        Self {
            creation: JobQueue::new(
                "document-creation",
                Arc::new(CreationHandler {
                    db: db.clone(),
                    ledger: ledger.clone(),
                }),
                RetryPolicy::default(),
            ),
            verification: JobQueue::new(
                "document-verification",
                Arc::new(VerificationHandler {
                    db: db.clone(),
                    ledger: ledger.clone(),
                }),
                RetryPolicy::default(),
            ),
            transfer: JobQueue::new(
                "document-transfer",
                Arc::new(TransferHandler { db, ledger }),
                RetryPolicy::default(),
            ),
        }
    }

    #[cfg(test)]
    pub(crate) fn start_with_policy(
        db: SharedDb,
        ledger: Arc<dyn DocumentLedger>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            creation: JobQueue::new(
                "document-creation",
                Arc::new(CreationHandler {
                    db: db.clone(),
                    ledger: ledger.clone(),
                }),
                policy,
            ),
            verification: JobQueue::new(
                "document-verification",
                Arc::new(VerificationHandler {
                    db: db.clone(),
                    ledger: ledger.clone(),
                }),
                policy,
            ),
            transfer: JobQueue::new(
                "document-transfer",
                Arc::new(TransferHandler { db, ledger }),
                policy,
            ),
        }
    }

    /// Queue selector for the status endpoint's path segment.
    pub fn by_name(&self, name: &str) -> Option<&JobQueue> {
        match name {
            "creation" => Some(&self.creation),
            "verification" => Some(&self.verification),
            "transfer" => Some(&self.transfer),
            _ => None,
        }
    }

    pub async fn enqueue_creation(&self, job: CreationJob) -> Result<JobId, QueueError> {
        self.creation.enqueue(to_payload(&job)).await
    }

    pub async fn enqueue_verification(&self, job: VerificationJob) -> Result<JobId, QueueError> {
        self.verification.enqueue(to_payload(&job)).await
    }

    pub async fn enqueue_transfer(&self, job: TransferJob) -> Result<JobId, QueueError> {
        self.transfer.enqueue(to_payload(&job)).await
    }
}

fn to_payload<T: Serialize>(job: &T) -> Value {
    // Job structs serialize infallibly.
    serde_json::to_value(job).unwrap_or(Value::Null)
}

fn parse_payload<T: for<'de> Deserialize<'de>>(payload: Value) -> Result<T, String> {
    serde_json::from_value(payload).map_err(|e| format!("malformed job payload: {e}"))
}

/// Shared exhaustion path: reflect the terminal job failure onto the
/// document.
async fn document_to_error(db: &SharedDb, document_id: DocumentId, error: &str) {
    let db = db.lock().await;
    match db.mark_error(document_id, error) {
        Ok(true) => {
            warn!(document = %document_id, error, "document moved to Error after retry budget");
        }
        Ok(false) => {
            warn!(document = %document_id, "document already terminal, Error not applied");
        }
        Err(e) => {
            warn!(document = %document_id, error = %e, "failed to record document error");
        }
    }
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

struct CreationHandler {
    db: SharedDb,
    ledger: Arc<dyn DocumentLedger>,
}

#[async_trait]
impl JobHandler for CreationHandler {
    async fn run(&self, payload: Value) -> Result<Value, String> {
        let job: CreationJob = parse_payload(payload)?;

        let receipt = self
            .ledger
            .create_document(job.category, &job.document_hash, job.expires_at)
            .await
            .map_err(|e| e.to_string())?;

        let db = self.db.lock().await;
        let activated = db
            .mark_active(
                job.document_id,
                &receipt.document_id,
                &receipt.transaction_hash,
                receipt.block_number as i64,
            )
            .map_err(|e| e.to_string())?;

        if activated {
            let doc = db.get_document(job.document_id).map_err(|e| e.to_string())?;
            db.append_history(
                job.document_id,
                HistoryAction::Activate,
                doc.creator,
                Some(&receipt.transaction_hash),
                Some(json!({"status": "Active"})),
            )
            .map_err(|e| e.to_string())?;
            info!(
                document = %job.document_id,
                blockchain_id = %receipt.document_id,
                "document activated"
            );
        } else {
            // The reconciler beat us to it; the receipt still settles the job.
            info!(document = %job.document_id, "creation already confirmed elsewhere");
        }

        serde_json::to_value(&receipt).map_err(|e| e.to_string())
    }

    async fn on_exhausted(&self, payload: Value, error: &str) {
        if let Ok(job) = parse_payload::<CreationJob>(payload) {
            document_to_error(&self.db, job.document_id, error).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

struct VerificationHandler {
    db: SharedDb,
    ledger: Arc<dyn DocumentLedger>,
}

#[async_trait]
impl JobHandler for VerificationHandler {
    async fn run(&self, payload: Value) -> Result<Value, String> {
        let job: VerificationJob = parse_payload(payload)?;

        let (blockchain_id, document_hash) = {
            let db = self.db.lock().await;
            let doc = db.get_document(job.document_id).map_err(|e| e.to_string())?;
            let blockchain_id = doc
                .blockchain_id
                .ok_or_else(|| "document has no registry id yet".to_string())?;
            (blockchain_id, doc.document_hash)
        };

        let receipt = self
            .ledger
            .verify_document(&blockchain_id, &document_hash)
            .await
            .map_err(|e| e.to_string())?;

        let verified_at = Utc::now();
        let db = self.db.lock().await;
        let verified = db
            .mark_verified(
                job.document_id,
                &receipt.transaction_hash,
                receipt.block_number as i64,
                job.user_id,
                verified_at,
            )
            .map_err(|e| e.to_string())?;

        if verified {
            db.append_history(
                job.document_id,
                HistoryAction::Verify,
                job.user_id,
                Some(&receipt.transaction_hash),
                Some(json!({
                    "status": "Verified",
                    "verifiedBy": job.user_id,
                    "verifiedAt": verified_at,
                })),
            )
            .map_err(|e| e.to_string())?;
            info!(document = %job.document_id, "document verified");
        }

        serde_json::to_value(&receipt).map_err(|e| e.to_string())
    }

    async fn on_exhausted(&self, payload: Value, error: &str) {
        if let Ok(job) = parse_payload::<VerificationJob>(payload) {
            document_to_error(&self.db, job.document_id, error).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

struct TransferHandler {
    db: SharedDb,
    ledger: Arc<dyn DocumentLedger>,
}

#[async_trait]
impl JobHandler for TransferHandler {
    async fn run(&self, payload: Value) -> Result<Value, String> {
        let job: TransferJob = parse_payload(payload)?;

        let blockchain_id = {
            let db = self.db.lock().await;
            let doc = db.get_document(job.document_id).map_err(|e| e.to_string())?;
            doc.blockchain_id
                .ok_or_else(|| "document has no registry id yet".to_string())?
        };

        let receipt = self
            .ledger
            .transfer_document(&blockchain_id, &job.new_holder)
            .await
            .map_err(|e| e.to_string())?;

        let db = self.db.lock().await;
        let transferred = db
            .mark_transferred(
                job.document_id,
                &receipt.transaction_hash,
                receipt.block_number as i64,
            )
            .map_err(|e| e.to_string())?;

        if transferred {
            // Resolve the destination address to an internal identity.  An
            // unknown address still gets its provenance recorded; only the
            // endorsement chain update is skipped.
            let new_holder = db
                .find_user_by_wallet(&job.new_holder)
                .map_err(|e| e.to_string())?;
            match new_holder {
                Some(holder) => {
                    db.append_endorsement(job.document_id, holder.id)
                        .map_err(|e| e.to_string())?;
                    db.append_history(
                        job.document_id,
                        HistoryAction::Transfer,
                        job.user_id,
                        Some(&receipt.transaction_hash),
                        Some(json!({
                            "status": "Transferred",
                            "transferredBy": job.user_id,
                            "transferredTo": holder.id,
                        })),
                    )
                    .map_err(|e| e.to_string())?;
                }
                None => {
                    warn!(
                        document = %job.document_id,
                        address = %job.new_holder,
                        "no identity for destination address, endorsement chain unchanged"
                    );
                }
            }
            info!(document = %job.document_id, "document transferred");
        }

        serde_json::to_value(&receipt).map_err(|e| e.to_string())
    }

    async fn on_exhausted(&self, payload: Value, error: &str) {
        if let Ok(job) = parse_payload::<TransferJob>(payload) {
            document_to_error(&self.db, job.document_id, error).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::shared;
    use crate::testutil::{draft_document, MockLedger, Outcome};
    use std::time::Duration;
    use tradedocs_queue::{poll_status, JobState};
    use tradedocs_shared::DocumentStatus;
    use tradedocs_store::Database;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(5),
        }
    }

    const SETTLE: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn creation_job_activates_draft_document() {
        let db = shared(Database::open_in_memory().unwrap());
        let (_creator, doc) = draft_document(&db).await;
        let ledger = Arc::new(MockLedger::default());
        let queues = JobQueues::start_with_policy(db.clone(), ledger, fast_policy());

        let job_id = queues
            .enqueue_creation(CreationJob {
                document_id: doc.id,
                category: 0,
                document_hash: doc.document_hash.clone(),
                expires_at: 0,
            })
            .await
            .unwrap();

        let status = poll_status(&queues.creation, job_id, SETTLE).await.unwrap();
        assert_eq!(status.state, JobState::Completed);

        let guard = db.lock().await;
        let loaded = guard.get_document(doc.id).unwrap();
        assert_eq!(loaded.status, DocumentStatus::Active);
        assert_eq!(loaded.blockchain_id.as_deref(), Some("D1"));
        assert_eq!(loaded.transaction_hash.as_deref(), Some("0xabc"));
        assert_eq!(loaded.block_number, Some(100));
        assert_eq!(
            guard
                .history_action_count(doc.id, HistoryAction::Activate)
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn exhausted_creation_job_moves_document_to_error() {
        let db = shared(Database::open_in_memory().unwrap());
        let (_creator, doc) = draft_document(&db).await;
        let ledger = Arc::new(MockLedger {
            create: Outcome::Fail("gas estimation failed".into()),
            ..MockLedger::default()
        });
        let queues = JobQueues::start_with_policy(db.clone(), ledger, fast_policy());

        let job_id = queues
            .enqueue_creation(CreationJob {
                document_id: doc.id,
                category: 0,
                document_hash: doc.document_hash.clone(),
                expires_at: 0,
            })
            .await
            .unwrap();

        let status = poll_status(&queues.creation, job_id, SETTLE).await.unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.attempts_made, 3);
        assert!(status.error.as_deref().unwrap_or("").contains("gas"));

        // on_exhausted runs right after the job settles; give it a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let guard = db.lock().await;
        let loaded = guard.get_document(doc.id).unwrap();
        assert_eq!(loaded.status, DocumentStatus::Error);
        assert!(loaded.blockchain_error.is_some());
        assert!(!loaded.blockchain_error.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transfer_job_confirms_pending_transfer_and_extends_chain() {
        let db = shared(Database::open_in_memory().unwrap());
        let (_creator, doc) = draft_document(&db).await;
        let holder_id = {
            let guard = db.lock().await;
            guard.mark_active(doc.id, "D1", "0xabc", 100).unwrap();
            guard
                .set_status_if(doc.id, DocumentStatus::Active, DocumentStatus::PendingTransfer)
                .unwrap();
            let holder = guard.upsert_user_by_email("holder@example.com", "holder").unwrap();
            guard.set_wallet_address(holder.id, "0xNEW").unwrap();
            holder.id
        };

        let ledger = Arc::new(MockLedger::default());
        let queues = JobQueues::start_with_policy(db.clone(), ledger, fast_policy());

        let requester = {
            let guard = db.lock().await;
            guard.get_document(doc.id).unwrap().creator
        };
        let job_id = queues
            .enqueue_transfer(TransferJob {
                document_id: doc.id,
                new_holder: "0xNEW".into(),
                user_id: requester,
            })
            .await
            .unwrap();

        let status = poll_status(&queues.transfer, job_id, SETTLE).await.unwrap();
        assert_eq!(status.state, JobState::Completed);

        let guard = db.lock().await;
        let loaded = guard.get_document(doc.id).unwrap();
        assert_eq!(loaded.status, DocumentStatus::Transferred);
        assert_eq!(loaded.transfer_transaction_hash.as_deref(), Some("0xtrf"));
        assert_eq!(loaded.endorsement_chain, vec![holder_id]);
    }

    #[tokio::test]
    async fn verification_job_confirms_pending_verification() {
        let db = shared(Database::open_in_memory().unwrap());
        let (creator, doc) = draft_document(&db).await;
        {
            let guard = db.lock().await;
            guard.mark_active(doc.id, "D1", "0xabc", 100).unwrap();
            guard
                .set_status_if(
                    doc.id,
                    DocumentStatus::Active,
                    DocumentStatus::PendingVerification,
                )
                .unwrap();
        }

        let ledger = Arc::new(MockLedger::default());
        let queues = JobQueues::start_with_policy(db.clone(), ledger, fast_policy());

        let job_id = queues
            .enqueue_verification(VerificationJob {
                document_id: doc.id,
                user_id: creator,
            })
            .await
            .unwrap();

        let status = poll_status(&queues.verification, job_id, SETTLE)
            .await
            .unwrap();
        assert_eq!(status.state, JobState::Completed);

        let guard = db.lock().await;
        let loaded = guard.get_document(doc.id).unwrap();
        assert_eq!(loaded.status, DocumentStatus::Verified);
        assert_eq!(loaded.verified_by, Some(creator));
        assert_eq!(loaded.verification_transaction_hash.as_deref(), Some("0xver"));
        assert_eq!(
            guard
                .history_action_count(doc.id, HistoryAction::Verify)
                .unwrap(),
            1
        );
    }
}
