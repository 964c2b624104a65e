//! v001 -- Initial schema creation.
//!
//! Creates the core tables: `users`, `documents`, `endorsement_chain`,
//! `download_history`, and `document_history`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id             TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    email          TEXT NOT NULL UNIQUE,       -- lowercased
    username       TEXT NOT NULL,
    wallet_address TEXT UNIQUE,                -- nullable; 0x-prefixed hex
    last_login     TEXT NOT NULL,              -- ISO-8601 / RFC-3339
    created_at     TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Documents
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS documents (
    id               TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    blockchain_id    TEXT UNIQUE,                -- registry document id; set once
    document_type    TEXT NOT NULL,              -- Transferable | Verifiable
    status           TEXT NOT NULL,
    document_hash    TEXT NOT NULL,              -- hex SHA-256 of canonical metadata
    metadata         TEXT NOT NULL,              -- JSON
    creator          TEXT NOT NULL,              -- FK -> users(id)
    blockchain_error TEXT,

    -- creation provenance
    transaction_hash TEXT,
    block_number     INTEGER,

    -- verification provenance
    verification_transaction_hash TEXT,
    verification_block_number     INTEGER,
    verified_by                   TEXT,
    verified_at                   TEXT,

    -- transfer provenance
    transfer_transaction_hash TEXT,
    transfer_block_number     INTEGER,

    -- revocation provenance
    revocation_transaction_hash TEXT,
    revocation_block_number     INTEGER,
    revoked_by                  TEXT,
    revoked_at                  TEXT,

    expiry_date TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,

    FOREIGN KEY (creator) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_documents_creator ON documents(creator);
CREATE INDEX IF NOT EXISTS idx_documents_blockchain_id ON documents(blockchain_id);

-- ----------------------------------------------------------------
-- Endorsement chain (ordered, append-only, one row per holder)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS endorsement_chain (
    document_id TEXT NOT NULL,                  -- FK -> documents(id)
    user_id     TEXT NOT NULL,                  -- FK -> users(id)
    seq         INTEGER NOT NULL,

    PRIMARY KEY (document_id, user_id),
    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

-- ----------------------------------------------------------------
-- Download log (append-only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS download_history (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id   TEXT NOT NULL,                -- FK -> documents(id)
    user_id       TEXT NOT NULL,                -- FK -> users(id)
    downloaded_at TEXT NOT NULL,

    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

-- ----------------------------------------------------------------
-- Document history (immutable audit trail)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS document_history (
    id               TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    document_id      TEXT NOT NULL,              -- FK -> documents(id)
    action           TEXT NOT NULL,              -- CREATE | ACTIVATE | VERIFY | TRANSFER | REVOKE | UPDATE
    performed_by     TEXT NOT NULL,              -- FK -> users(id)
    transaction_hash TEXT,
    metadata         TEXT,                       -- JSON snapshot
    created_at       TEXT NOT NULL,

    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE,
    FOREIGN KEY (performed_by) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_history_document_ts
    ON document_history(document_id, created_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
