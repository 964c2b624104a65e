//! # tradedocs-store
//!
//! SQLite persistence for the document registry backend.
//!
//! Three collections are modeled: `documents` (with its endorsement chain
//! and download log side tables), `document_history` (append-only audit
//! trail), and `users`.  The crate exposes a synchronous [`Database`]
//! handle wrapping a `rusqlite::Connection` with typed CRUD helpers.
//!
//! Lifecycle transitions are single-statement compare-and-swap updates
//! (`UPDATE ... WHERE status = ?expected`).  Callers learn from the
//! affected-row count whether the transition actually happened, which is
//! what makes duplicate ledger-event delivery and racing jobs safe.

pub mod database;
pub mod documents;
pub mod history;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
