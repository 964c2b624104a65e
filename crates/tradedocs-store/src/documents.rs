//! Document CRUD and lifecycle transition writes.
//!
//! Every status transition is a single `UPDATE ... WHERE status = ?` so
//! that concurrent writers (a retrying job and the reconciler, or the live
//! and backfill event paths) cannot both apply the same edge.  The `bool`
//! return tells the caller whether its write won.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use tradedocs_shared::{DocumentId, DocumentStatus, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Document, DownloadEntry};

const DOCUMENT_COLUMNS: &str = "id, blockchain_id, document_type, status, document_hash, \
     metadata, creator, blockchain_error, transaction_hash, block_number, \
     verification_transaction_hash, verification_block_number, verified_by, verified_at, \
     transfer_transaction_hash, transfer_block_number, \
     revocation_transaction_hash, revocation_block_number, revoked_by, revoked_at, \
     expiry_date, created_at, updated_at";

impl Database {
    pub fn insert_document(&self, doc: &Document) -> Result<()> {
        self.conn().execute(
            "INSERT INTO documents (id, blockchain_id, document_type, status, document_hash,
                 metadata, creator, blockchain_error, transaction_hash, block_number,
                 verification_transaction_hash, verification_block_number, verified_by, verified_at,
                 transfer_transaction_hash, transfer_block_number,
                 revocation_transaction_hash, revocation_block_number, revoked_by, revoked_at,
                 expiry_date, created_at, updated_at)
             VALUES (?1, NULL, ?2, ?3, ?4, ?5, ?6, NULL, NULL, NULL,
                 NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL, NULL,
                 ?7, ?8, ?9)",
            params![
                doc.id.0.to_string(),
                doc.document_type.as_str(),
                doc.status.as_str(),
                doc.document_hash,
                doc.metadata.to_string(),
                doc.creator.0.to_string(),
                doc.expiry_date.map(|d| d.to_rfc3339()),
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
            ],
        )?;

        for user in &doc.endorsement_chain {
            self.append_endorsement(doc.id, *user)?;
        }
        Ok(())
    }

    pub fn get_document(&self, id: DocumentId) -> Result<Document> {
        let mut doc = self
            .conn()
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
                params![id.0.to_string()],
                row_to_document,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;
        doc.endorsement_chain = self.endorsement_chain(doc.id)?;
        Ok(doc)
    }

    /// Look up by the external registry's document id.  Returns `None`
    /// rather than an error: events for unknown ids are expected and are
    /// the caller's decision to log and drop.
    pub fn get_document_by_blockchain_id(&self, blockchain_id: &str) -> Result<Option<Document>> {
        let doc = self
            .conn()
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE blockchain_id = ?1"),
                params![blockchain_id],
                row_to_document,
            )
            .optional()?;

        match doc {
            Some(mut doc) => {
                doc.endorsement_chain = self.endorsement_chain(doc.id)?;
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    /// Documents the user created or holds via the endorsement chain,
    /// newest first.
    pub fn documents_for_user(&self, user: UserId) -> Result<Vec<Document>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents
             WHERE creator = ?1
                OR id IN (SELECT document_id FROM endorsement_chain WHERE user_id = ?1)
             ORDER BY created_at DESC"
        ))?;

        let rows = stmt.query_map(params![user.0.to_string()], row_to_document)?;

        let mut documents = Vec::new();
        for row in rows {
            let mut doc = row?;
            doc.endorsement_chain = self.endorsement_chain(doc.id)?;
            documents.push(doc);
        }
        Ok(documents)
    }

    /// Compare-and-swap on `status` alone.  Used for the request-path
    /// admissions (Active -> PendingVerification / PendingTransfer).
    pub fn set_status_if(
        &self,
        id: DocumentId,
        expected: DocumentStatus,
        new: DocumentStatus,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE documents SET status = ?1, updated_at = ?2
             WHERE id = ?3 AND status = ?4",
            params![
                new.as_str(),
                Utc::now().to_rfc3339(),
                id.0.to_string(),
                expected.as_str(),
            ],
        )?;
        Ok(affected > 0)
    }

    /// Draft -> Active with creation provenance.  `blockchain_id` is
    /// assigned here and nowhere else; the `blockchain_id IS NULL` guard
    /// keeps it write-once.
    pub fn mark_active(
        &self,
        id: DocumentId,
        blockchain_id: &str,
        transaction_hash: &str,
        block_number: i64,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE documents
             SET status = 'Active', blockchain_id = ?1, transaction_hash = ?2,
                 block_number = ?3, updated_at = ?4
             WHERE id = ?5 AND status = 'Draft' AND blockchain_id IS NULL",
            params![
                blockchain_id,
                transaction_hash,
                block_number,
                Utc::now().to_rfc3339(),
                id.0.to_string(),
            ],
        )?;
        Ok(affected > 0)
    }

    /// Draft -> Active for a row whose `blockchain_id` is already recorded.
    /// `mark_active` assigns the id and the status in one statement, so by
    /// the time an event can be matched to a row this CAS finds it Active
    /// and loses; the reconciler keeps the call so a re-delivered
    /// DocumentCreated is an ordinary lost CAS rather than a special case.
    pub fn mark_active_confirmed(
        &self,
        id: DocumentId,
        transaction_hash: &str,
        block_number: i64,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE documents
             SET status = 'Active', transaction_hash = ?1, block_number = ?2, updated_at = ?3
             WHERE id = ?4 AND status = 'Draft'",
            params![
                transaction_hash,
                block_number,
                Utc::now().to_rfc3339(),
                id.0.to_string(),
            ],
        )?;
        Ok(affected > 0)
    }

    /// PendingVerification (or Active, when the verification was observed
    /// on-chain without a local request) -> Verified, write-once.
    pub fn mark_verified(
        &self,
        id: DocumentId,
        transaction_hash: &str,
        block_number: i64,
        verified_by: UserId,
        verified_at: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE documents
             SET status = 'Verified', verification_transaction_hash = ?1,
                 verification_block_number = ?2, verified_by = ?3, verified_at = ?4,
                 updated_at = ?5
             WHERE id = ?6
               AND status IN ('PendingVerification', 'Active')
               AND verification_transaction_hash IS NULL",
            params![
                transaction_hash,
                block_number,
                verified_by.0.to_string(),
                verified_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
                id.0.to_string(),
            ],
        )?;
        Ok(affected > 0)
    }

    /// PendingTransfer -> Transferred, write-once on the transfer
    /// provenance.  A duplicate event delivery or a racing retry sees zero
    /// affected rows.
    pub fn mark_transferred(
        &self,
        id: DocumentId,
        transaction_hash: &str,
        block_number: i64,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE documents
             SET status = 'Transferred', transfer_transaction_hash = ?1,
                 transfer_block_number = ?2, updated_at = ?3
             WHERE id = ?4 AND status = 'PendingTransfer'
               AND transfer_transaction_hash IS NULL",
            params![
                transaction_hash,
                block_number,
                Utc::now().to_rfc3339(),
                id.0.to_string(),
            ],
        )?;
        Ok(affected > 0)
    }

    /// Any non-terminal state -> Revoked.
    pub fn mark_revoked(
        &self,
        id: DocumentId,
        transaction_hash: &str,
        block_number: i64,
        revoked_by: Option<UserId>,
        revoked_at: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE documents
             SET status = 'Revoked', revocation_transaction_hash = ?1,
                 revocation_block_number = ?2, revoked_by = ?3, revoked_at = ?4,
                 updated_at = ?5
             WHERE id = ?6 AND status NOT IN ('Revoked', 'Error')",
            params![
                transaction_hash,
                block_number,
                revoked_by.map(|u| u.0.to_string()),
                revoked_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
                id.0.to_string(),
            ],
        )?;
        Ok(affected > 0)
    }

    /// Any non-terminal state -> Error, with the failure message attached.
    pub fn mark_error(&self, id: DocumentId, message: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE documents SET status = 'Error', blockchain_error = ?1, updated_at = ?2
             WHERE id = ?3 AND status NOT IN ('Revoked', 'Error')",
            params![message, Utc::now().to_rfc3339(), id.0.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Append a holder to the endorsement chain.  Returns `false` if the
    /// holder is already present (the chain is append-only and deduplicated).
    pub fn append_endorsement(&self, id: DocumentId, user: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO endorsement_chain (document_id, user_id, seq)
             VALUES (?1, ?2,
                 (SELECT COALESCE(MAX(seq), 0) + 1 FROM endorsement_chain WHERE document_id = ?1))",
            params![id.0.to_string(), user.0.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// The ordered holder list for a document.
    pub fn endorsement_chain(&self, id: DocumentId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM endorsement_chain WHERE document_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![id.0.to_string()], |row| {
            let user_str: String = row.get(0)?;
            Ok(user_str)
        })?;

        let mut chain = Vec::new();
        for row in rows {
            chain.push(UserId(Uuid::parse_str(&row?)?));
        }
        Ok(chain)
    }

    /// Append a (user, timestamp) pair to the download log.
    pub fn record_download(&self, id: DocumentId, user: UserId) -> Result<()> {
        self.conn().execute(
            "INSERT INTO download_history (document_id, user_id, downloaded_at)
             VALUES (?1, ?2, ?3)",
            params![
                id.0.to_string(),
                user.0.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn download_history(&self, id: DocumentId) -> Result<Vec<DownloadEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, downloaded_at FROM download_history
             WHERE document_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![id.0.to_string()], |row| {
            let user_str: String = row.get(0)?;
            let ts_str: String = row.get(1)?;
            Ok((user_str, ts_str))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (user_str, ts_str) = row?;
            entries.push(DownloadEntry {
                user_id: UserId(Uuid::parse_str(&user_str)?),
                downloaded_at: DateTime::parse_from_rfc3339(&ts_str)?.with_timezone(&Utc),
            });
        }
        Ok(entries)
    }
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    use tradedocs_shared::{DocumentStatus, DocumentType};

    let id = parse_uuid(row, 0)?;
    let blockchain_id: Option<String> = row.get(1)?;

    let type_str: String = row.get(2)?;
    let document_type = DocumentType::parse(&type_str)
        .ok_or_else(|| conversion_error(2, format!("unknown document type: {type_str}")))?;

    let status_str: String = row.get(3)?;
    let status = DocumentStatus::parse(&status_str)
        .ok_or_else(|| conversion_error(3, format!("unknown status: {status_str}")))?;

    let metadata_str: String = row.get(5)?;
    let metadata = serde_json::from_str(&metadata_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            Box::new(e),
        ))?;

    Ok(Document {
        id: DocumentId(id),
        blockchain_id,
        document_type,
        status,
        document_hash: row.get(4)?,
        metadata,
        creator: UserId(parse_uuid(row, 6)?),
        // Filled in by the caller from the side table.
        endorsement_chain: Vec::new(),
        blockchain_error: row.get(7)?,
        transaction_hash: row.get(8)?,
        block_number: row.get(9)?,
        verification_transaction_hash: row.get(10)?,
        verification_block_number: row.get(11)?,
        verified_by: parse_opt_uuid(row, 12)?.map(UserId),
        verified_at: parse_opt_datetime(row, 13)?,
        transfer_transaction_hash: row.get(14)?,
        transfer_block_number: row.get(15)?,
        revocation_transaction_hash: row.get(16)?,
        revocation_block_number: row.get(17)?,
        revoked_by: parse_opt_uuid(row, 18)?.map(UserId),
        revoked_at: parse_opt_datetime(row, 19)?,
        expiry_date: parse_opt_datetime(row, 20)?,
        created_at: parse_datetime(row, 21)?,
        updated_at: parse_datetime(row, 22)?,
    })
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

pub(crate) fn parse_uuid(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_opt_uuid(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(s) => Uuid::parse_str(&s).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
        None => Ok(None),
    }
}

pub(crate) fn parse_datetime(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_opt_datetime(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use serde_json::json;
    use tradedocs_shared::{hash_metadata, DocumentType};

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn make_user(db: &Database, email: &str) -> User {
        db.upsert_user_by_email(email, "tester").unwrap()
    }

    fn make_draft(db: &Database, creator: UserId) -> Document {
        let metadata = json!({"a": 1});
        let doc = Document::new_draft(
            DocumentType::Transferable,
            metadata.clone(),
            hash_metadata(&metadata),
            creator,
            None,
        );
        db.insert_document(&doc).unwrap();
        doc
    }

    #[test]
    fn insert_and_get_round_trip() {
        let db = test_db();
        let user = make_user(&db, "a@example.com");
        let doc = make_draft(&db, user.id);

        let loaded = db.get_document(doc.id).unwrap();
        assert_eq!(loaded.status, DocumentStatus::Draft);
        assert_eq!(loaded.metadata, json!({"a": 1}));
        assert_eq!(loaded.creator, user.id);
        assert!(loaded.blockchain_id.is_none());
        assert!(loaded.endorsement_chain.is_empty());
    }

    #[test]
    fn get_missing_document_is_not_found() {
        let db = test_db();
        assert!(matches!(
            db.get_document(DocumentId::new()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn mark_active_is_write_once() {
        let db = test_db();
        let user = make_user(&db, "a@example.com");
        let doc = make_draft(&db, user.id);

        assert!(db.mark_active(doc.id, "D1", "0xabc", 100).unwrap());
        // Second confirmation loses the CAS.
        assert!(!db.mark_active(doc.id, "D2", "0xdef", 101).unwrap());

        let loaded = db.get_document(doc.id).unwrap();
        assert_eq!(loaded.status, DocumentStatus::Active);
        assert_eq!(loaded.blockchain_id.as_deref(), Some("D1"));
        assert_eq!(loaded.transaction_hash.as_deref(), Some("0xabc"));
        assert_eq!(loaded.block_number, Some(100));
    }

    #[test]
    fn transfer_cas_refuses_second_confirmation() {
        let db = test_db();
        let user = make_user(&db, "a@example.com");
        let doc = make_draft(&db, user.id);
        db.mark_active(doc.id, "D1", "0xabc", 100).unwrap();
        assert!(db
            .set_status_if(doc.id, DocumentStatus::Active, DocumentStatus::PendingTransfer)
            .unwrap());

        assert!(db.mark_transferred(doc.id, "0xt1", 200).unwrap());
        assert!(!db.mark_transferred(doc.id, "0xt1", 200).unwrap());
        assert!(!db.mark_transferred(doc.id, "0xt2", 201).unwrap());

        let loaded = db.get_document(doc.id).unwrap();
        assert_eq!(loaded.status, DocumentStatus::Transferred);
        assert_eq!(loaded.transfer_transaction_hash.as_deref(), Some("0xt1"));
    }

    #[test]
    fn endorsement_chain_is_deduplicated_and_ordered() {
        let db = test_db();
        let creator = make_user(&db, "a@example.com");
        let holder1 = make_user(&db, "b@example.com");
        let holder2 = make_user(&db, "c@example.com");
        let doc = make_draft(&db, creator.id);

        assert!(db.append_endorsement(doc.id, holder1.id).unwrap());
        assert!(db.append_endorsement(doc.id, holder2.id).unwrap());
        assert!(!db.append_endorsement(doc.id, holder1.id).unwrap());

        let chain = db.endorsement_chain(doc.id).unwrap();
        assert_eq!(chain, vec![holder1.id, holder2.id]);
    }

    #[test]
    fn documents_for_user_includes_chain_membership() {
        let db = test_db();
        let creator = make_user(&db, "a@example.com");
        let holder = make_user(&db, "b@example.com");
        let doc = make_draft(&db, creator.id);
        db.append_endorsement(doc.id, holder.id).unwrap();

        assert_eq!(db.documents_for_user(creator.id).unwrap().len(), 1);
        assert_eq!(db.documents_for_user(holder.id).unwrap().len(), 1);

        let stranger = make_user(&db, "c@example.com");
        assert!(db.documents_for_user(stranger.id).unwrap().is_empty());
    }

    #[test]
    fn mark_error_skips_terminal_documents() {
        let db = test_db();
        let user = make_user(&db, "a@example.com");
        let doc = make_draft(&db, user.id);

        assert!(db.mark_error(doc.id, "gas estimation failed").unwrap());
        assert!(!db.mark_error(doc.id, "again").unwrap());

        let loaded = db.get_document(doc.id).unwrap();
        assert_eq!(loaded.status, DocumentStatus::Error);
        assert_eq!(
            loaded.blockchain_error.as_deref(),
            Some("gas estimation failed")
        );
    }

    #[test]
    fn download_log_appends_in_order() {
        let db = test_db();
        let user = make_user(&db, "a@example.com");
        let doc = make_draft(&db, user.id);

        db.record_download(doc.id, user.id).unwrap();
        db.record_download(doc.id, user.id).unwrap();

        let log = db.download_history(doc.id).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].user_id, user.id);
    }
}
