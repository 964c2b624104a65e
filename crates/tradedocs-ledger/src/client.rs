//! The ledger client trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::events::{EventSubscription, LedgerEvent};

/// Result of a confirmed creation transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateReceipt {
    /// The registry's id for the new document.
    pub document_id: String,
    pub transaction_hash: String,
    pub block_number: u64,
}

/// Result of a confirmed verification or transfer transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
}

/// Operations the core consumes from the external document registry.
///
/// The transaction methods block on network confirmation, which is
/// unbounded; callers must be asynchronous job workers.
#[async_trait]
pub trait DocumentLedger: Send + Sync {
    /// Register a document.  `expires_at` is a unix timestamp (seconds).
    async fn create_document(
        &self,
        category: u8,
        document_hash: &str,
        expires_at: i64,
    ) -> Result<CreateReceipt, LedgerError>;

    /// Verify a document that exists on-chain.
    async fn verify_document(
        &self,
        document_id: &str,
        document_hash: &str,
    ) -> Result<TxReceipt, LedgerError>;

    /// Transfer a document to a new holder address.
    async fn transfer_document(
        &self,
        document_id: &str,
        new_holder: &str,
    ) -> Result<TxReceipt, LedgerError>;

    /// Current chain head.
    async fn block_number(&self) -> Result<u64, LedgerError>;

    /// All document events confirmed in the inclusive block range.
    async fn events_in_range(&self, from: u64, to: u64)
        -> Result<Vec<LedgerEvent>, LedgerError>;

    /// Open a live event subscription.
    async fn subscribe(&self) -> Result<EventSubscription, LedgerError>;
}
