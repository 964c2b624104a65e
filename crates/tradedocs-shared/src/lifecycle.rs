//! Document lifecycle state machine.
//!
//! Admission control happens here, *before* any job is enqueued.  The job
//! handlers and the event reconciler only ever move a document forward
//! along edges that were already admitted, using compare-and-swap writes
//! in the store layer.
//!
//! Legal transitions:
//!
//! | from                 | event                   | to                  |
//! |----------------------|-------------------------|---------------------|
//! | Draft                | create confirmed        | Active              |
//! | Draft                | retries exhausted       | Error               |
//! | Active               | verify requested        | PendingVerification |
//! | PendingVerification  | verify confirmed        | Verified            |
//! | Active / Verified    | transfer requested      | PendingTransfer     |
//! | PendingTransfer      | transfer confirmed      | Transferred         |
//! | any non-terminal     | revoke confirmed        | Revoked             |

use thiserror::Error;

use crate::types::{DocumentStatus, DocumentType, UserId};

/// Rejection reasons for an illegal lifecycle request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Document is already verified")]
    AlreadyVerified,

    #[error("Document is not transferable")]
    NotTransferable,

    #[error("Requester is not the creator or an endorsement chain member")]
    Unauthorized,

    #[error("Operation not allowed while document is {0}")]
    InvalidTransition(DocumentStatus),
}

/// Admit a verification request.
///
/// Re-verifying an already-`Verified` document is rejected explicitly, not
/// silently accepted.  Draft and pending documents have work in flight and
/// are rejected as well.
pub fn admit_verification(status: DocumentStatus) -> Result<(), TransitionError> {
    match status {
        DocumentStatus::Verified => Err(TransitionError::AlreadyVerified),
        DocumentStatus::Active => Ok(()),
        other => Err(TransitionError::InvalidTransition(other)),
    }
}

/// Admit a transfer request.
///
/// Guard order matches the API contract: transferability first, then
/// requester authorization, then current status.
pub fn admit_transfer(
    document_type: DocumentType,
    status: DocumentStatus,
    requester: UserId,
    creator: UserId,
    endorsement_chain: &[UserId],
) -> Result<(), TransitionError> {
    if document_type != DocumentType::Transferable {
        return Err(TransitionError::NotTransferable);
    }
    if requester != creator && !endorsement_chain.contains(&requester) {
        return Err(TransitionError::Unauthorized);
    }
    match status {
        DocumentStatus::Active | DocumentStatus::Verified => Ok(()),
        other => Err(TransitionError::InvalidTransition(other)),
    }
}
