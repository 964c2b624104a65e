//! Shared database handle.
//!
//! The store is synchronous SQLite; the server serializes access through a
//! tokio mutex.  Statement execution is fast enough that this is not a
//! contention point at the request rates this service sees.

use std::sync::Arc;

use tokio::sync::Mutex;

use tradedocs_store::Database;

pub type SharedDb = Arc<Mutex<Database>>;

pub fn shared(db: Database) -> SharedDb {
    Arc::new(Mutex::new(db))
}
