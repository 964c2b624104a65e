//! # tradedocs-ledger
//!
//! Client boundary to the external document registry.
//!
//! The [`DocumentLedger`] trait is what the rest of the system programs
//! against; [`RpcLedger`] implements it over the registry node's JSON-RPC
//! endpoint.  All three transaction operations block until the registry
//! confirms, so they must only ever be called from job workers or
//! reconciler tasks, never inline in a request handler.

pub mod address;
pub mod client;
pub mod events;
pub mod gas;
pub mod rpc;

mod error;

pub use client::{CreateReceipt, DocumentLedger, TxReceipt};
pub use error::LedgerError;
pub use events::{EventSubscription, LedgerEvent};
pub use rpc::RpcLedger;
