use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Internal document identifier, assigned by the database layer.  Distinct
// from the registry's own document id, which only exists once the creation
// transaction has been confirmed on-chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a document can change hands after creation.  Fixed at creation
/// time; transfer requests against `Verifiable` documents are rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentType {
    Transferable,
    Verifiable,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transferable => "Transferable",
            Self::Verifiable => "Verifiable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Transferable" => Some(Self::Transferable),
            "Verifiable" => Some(Self::Verifiable),
            _ => None,
        }
    }

    /// Numeric category submitted to the registry contract.
    pub fn registry_category(&self) -> u8 {
        match self {
            Self::Transferable => 0,
            Self::Verifiable => 1,
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document lifecycle status.
///
/// Forward-only: documents start in `Draft` and end in `Revoked` or
/// `Error`.  The pending states mark the window between admitting a job
/// and the ledger confirming it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentStatus {
    Draft,
    Active,
    PendingVerification,
    Verified,
    PendingTransfer,
    Transferred,
    Revoked,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Active => "Active",
            Self::PendingVerification => "PendingVerification",
            Self::Verified => "Verified",
            Self::PendingTransfer => "PendingTransfer",
            Self::Transferred => "Transferred",
            Self::Revoked => "Revoked",
            Self::Error => "Error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Draft" => Some(Self::Draft),
            "Active" => Some(Self::Active),
            "PendingVerification" => Some(Self::PendingVerification),
            "Verified" => Some(Self::Verified),
            "PendingTransfer" => Some(Self::PendingTransfer),
            "Transferred" => Some(Self::Transferred),
            "Revoked" => Some(Self::Revoked),
            "Error" => Some(Self::Error),
            _ => None,
        }
    }

    /// No legal transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked | Self::Error)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit action recorded in the document history log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HistoryAction {
    Create,
    Activate,
    Verify,
    Transfer,
    Revoke,
    Update,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Activate => "ACTIVATE",
            Self::Verify => "VERIFY",
            Self::Transfer => "TRANSFER",
            Self::Revoke => "REVOKE",
            Self::Update => "UPDATE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATE" => Some(Self::Create),
            "ACTIVATE" => Some(Self::Activate),
            "VERIFY" => Some(Self::Verify),
            "TRANSFER" => Some(Self::Transfer),
            "REVOKE" => Some(Self::Revoke),
            "UPDATE" => Some(Self::Update),
            _ => None,
        }
    }
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
