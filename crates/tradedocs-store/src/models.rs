//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` so it can be handed directly to the
//! HTTP layer as a JSON response body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use tradedocs_shared::{DocumentId, DocumentStatus, DocumentType, HistoryAction, UserId};

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A trade document record.
///
/// `blockchain_id` and the provenance fields start empty and are each
/// populated exactly once by the confirmation path (job completion or
/// event reconciliation).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    /// The external registry's document id.  Unique once assigned.
    pub blockchain_id: Option<String>,
    pub document_type: DocumentType,
    pub status: DocumentStatus,
    /// Hex SHA-256 of the canonical metadata JSON.  Immutable.
    pub document_hash: String,
    /// Open-ended, document-type-specific payload.  Immutable.
    pub metadata: Value,
    pub creator: UserId,
    /// Ordered list of holders; grows on each confirmed transfer.
    pub endorsement_chain: Vec<UserId>,
    /// Message attached when `status == Error`.
    pub blockchain_error: Option<String>,

    pub transaction_hash: Option<String>,
    pub block_number: Option<i64>,

    pub verification_transaction_hash: Option<String>,
    pub verification_block_number: Option<i64>,
    pub verified_by: Option<UserId>,
    pub verified_at: Option<DateTime<Utc>>,

    pub transfer_transaction_hash: Option<String>,
    pub transfer_block_number: Option<i64>,

    pub revocation_transaction_hash: Option<String>,
    pub revocation_block_number: Option<i64>,
    pub revoked_by: Option<UserId>,
    pub revoked_at: Option<DateTime<Utc>>,

    pub expiry_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A fresh `Draft` record, hash already committed, nothing on-chain yet.
    pub fn new_draft(
        document_type: DocumentType,
        metadata: Value,
        document_hash: String,
        creator: UserId,
        expiry_date: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::new(),
            blockchain_id: None,
            document_type,
            status: DocumentStatus::Draft,
            document_hash,
            metadata,
            creator,
            endorsement_chain: Vec::new(),
            blockchain_error: None,
            transaction_hash: None,
            block_number: None,
            verification_transaction_hash: None,
            verification_block_number: None,
            verified_by: None,
            verified_at: None,
            transfer_transaction_hash: None,
            transfer_block_number: None,
            revocation_transaction_hash: None,
            revocation_block_number: None,
            revoked_by: None,
            revoked_at: None,
            expiry_date,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derived: whether the document's expiry date has passed.
    pub fn is_expired(&self) -> bool {
        match self.expiry_date {
            Some(expiry) => Utc::now() > expiry,
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Document history
// ---------------------------------------------------------------------------

/// An immutable audit event.  Created alongside each lifecycle transition;
/// never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub document_id: DocumentId,
    pub action: HistoryAction,
    pub performed_by: UserId,
    pub transaction_hash: Option<String>,
    /// Snapshot of whatever context the transition carried.
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// An identity record.  Created on first login; mutated only on login and
/// wallet linkage.  No deletion path exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    /// Registry address linked to this user, if any.
    pub wallet_address: Option<String>,
    pub last_login: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Download log
// ---------------------------------------------------------------------------

/// One entry in a document's append-only download log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadEntry {
    pub user_id: UserId,
    pub downloaded_at: DateTime<Utc>,
}
