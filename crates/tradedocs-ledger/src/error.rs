use thiserror::Error;

/// Errors surfaced by the ledger client.
///
/// These never reach a request handler directly: they are recorded as job
/// failures and reflected onto the document as `status = Error` once the
/// retry budget is spent.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The destination address is not a well-formed registry address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// No signing account is configured on the registry node.
    #[error("No signing account available")]
    NoSigningAccount,

    /// Gas estimation failed before submission.
    #[error("Gas estimation failed: {0}")]
    GasEstimation(String),

    /// The transaction was submitted but reverted.
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// The registry node returned a JSON-RPC error.
    #[error("Registry RPC error: {0}")]
    Rpc(String),

    /// Transport-level failure talking to the registry node.
    #[error("Registry transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The node's response did not match the expected shape.
    #[error("Malformed registry response: {0}")]
    MalformedResponse(String),
}
