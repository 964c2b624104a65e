//! Shared fixtures for the server test modules.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};

use tradedocs_ledger::{
    CreateReceipt, DocumentLedger, EventSubscription, LedgerError, LedgerEvent, TxReceipt,
};
use tradedocs_shared::{hash_metadata, DocumentType, UserId};
use tradedocs_store::Document;

use crate::state::SharedDb;

/// What a mock ledger operation should do.
#[derive(Debug, Clone)]
pub enum Outcome {
    Ok,
    Fail(String),
}

impl Outcome {
    fn check(&self) -> Result<(), LedgerError> {
        match self {
            Outcome::Ok => Ok(()),
            Outcome::Fail(message) => Err(LedgerError::Rpc(message.clone())),
        }
    }
}

/// In-process [`DocumentLedger`] double.
///
/// Successful operations return fixed receipts (`D1` / `0xabc` / block 100
/// for creation, `0xver` / 200 for verification, `0xtrf` / 300 for
/// transfer).  Tests drive the event paths through [`push_event`] and
/// [`set_backfill`].
///
/// [`push_event`]: MockLedger::push_event
/// [`set_backfill`]: MockLedger::set_backfill
pub struct MockLedger {
    pub create: Outcome,
    pub verify: Outcome,
    pub transfer: Outcome,
    pub head: AtomicU64,
    pub(crate) backfill: Mutex<Vec<LedgerEvent>>,
    pub(crate) subscribers: Mutex<Vec<mpsc::Sender<LedgerEvent>>>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self {
            create: Outcome::Ok,
            verify: Outcome::Ok,
            transfer: Outcome::Ok,
            head: AtomicU64::new(1_000),
            backfill: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl MockLedger {
    /// Deliver an event to every live subscription.
    pub async fn push_event(&self, event: LedgerEvent) {
        let subscribers = self.subscribers.lock().await;
        for tx in subscribers.iter() {
            let _ = tx.send(event.clone()).await;
        }
    }

    /// Events returned by `events_in_range` (filtered to the queried range).
    pub async fn set_backfill(&self, events: Vec<LedgerEvent>) {
        *self.backfill.lock().await = events;
    }
}

#[async_trait]
impl DocumentLedger for MockLedger {
    async fn create_document(
        &self,
        _category: u8,
        _document_hash: &str,
        _expires_at: i64,
    ) -> Result<CreateReceipt, LedgerError> {
        self.create.check()?;
        Ok(CreateReceipt {
            document_id: "D1".to_string(),
            transaction_hash: "0xabc".to_string(),
            block_number: 100,
        })
    }

    async fn verify_document(
        &self,
        _document_id: &str,
        _document_hash: &str,
    ) -> Result<TxReceipt, LedgerError> {
        self.verify.check()?;
        Ok(TxReceipt {
            transaction_hash: "0xver".to_string(),
            block_number: 200,
        })
    }

    async fn transfer_document(
        &self,
        _document_id: &str,
        _new_holder: &str,
    ) -> Result<TxReceipt, LedgerError> {
        self.transfer.check()?;
        Ok(TxReceipt {
            transaction_hash: "0xtrf".to_string(),
            block_number: 300,
        })
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn events_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let backfill = self.backfill.lock().await;
        Ok(backfill
            .iter()
            .filter(|e| e.block_number() >= from && e.block_number() <= to)
            .cloned()
            .collect())
    }

    async fn subscribe(&self) -> Result<EventSubscription, LedgerError> {
        let (tx, rx) = mpsc::channel(64);
        self.subscribers.lock().await.push(tx);
        Ok(EventSubscription::from_channel(rx))
    }
}

/// Insert a user and a `Draft` transferable document they created.
pub async fn draft_document(db: &SharedDb) -> (UserId, Document) {
    let guard = db.lock().await;
    let user = guard
        .upsert_user_by_email("creator@example.com", "creator")
        .expect("user insert");
    let metadata = json!({"title": "Bill of Lading", "shipment": "SHIP-42"});
    let doc = Document::new_draft(
        DocumentType::Transferable,
        metadata.clone(),
        hash_metadata(&metadata),
        user.id,
        None,
    );
    guard.insert_document(&doc).expect("document insert");
    (user.id, doc)
}
