//! # tradedocs-shared
//!
//! Domain types shared by every tradedocs crate: document and user
//! identifiers, the document lifecycle state machine, the metadata hash
//! committer, and the constants that govern queue retries and ledger
//! reconciliation.

pub mod constants;
pub mod hash;
pub mod lifecycle;
pub mod types;

pub use hash::{canonical_json, hash_metadata, verify_hash};
pub use lifecycle::{admit_transfer, admit_verification, TransitionError};
pub use types::{DocumentId, DocumentStatus, DocumentType, HistoryAction, UserId};
