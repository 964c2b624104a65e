//! Append-only document history.
//!
//! One row per lifecycle transition, never updated or deleted, returned in
//! creation order.

use rusqlite::params;
use serde_json::Value;
use uuid::Uuid;

use tradedocs_shared::{DocumentId, HistoryAction, UserId};

use crate::database::Database;
use crate::documents::{parse_datetime, parse_uuid};
use crate::error::Result;
use crate::models::HistoryEntry;

impl Database {
    /// Record a lifecycle transition.  `metadata` is an arbitrary snapshot
    /// of the transition's context (new status, counterparty, reason).
    pub fn append_history(
        &self,
        document_id: DocumentId,
        action: HistoryAction,
        performed_by: UserId,
        transaction_hash: Option<&str>,
        metadata: Option<Value>,
    ) -> Result<HistoryEntry> {
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            document_id,
            action,
            performed_by,
            transaction_hash: transaction_hash.map(str::to_string),
            metadata,
            created_at: chrono::Utc::now(),
        };

        self.conn().execute(
            "INSERT INTO document_history
                 (id, document_id, action, performed_by, transaction_hash, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id.to_string(),
                entry.document_id.0.to_string(),
                entry.action.as_str(),
                entry.performed_by.0.to_string(),
                entry.transaction_hash,
                entry.metadata.as_ref().map(|m| m.to_string()),
                entry.created_at.to_rfc3339(),
            ],
        )?;

        Ok(entry)
    }

    /// The full audit trail for a document, oldest first.
    pub fn history_for_document(&self, document_id: DocumentId) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, document_id, action, performed_by, transaction_hash, metadata, created_at
             FROM document_history
             WHERE document_id = ?1
             ORDER BY created_at, id",
        )?;

        let rows = stmt.query_map(params![document_id.0.to_string()], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Count of history rows for a document with the given action.  Used by
    /// idempotency tests and admin diagnostics.
    pub fn history_action_count(
        &self,
        document_id: DocumentId,
        action: HistoryAction,
    ) -> Result<u32> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM document_history WHERE document_id = ?1 AND action = ?2",
            params![document_id.0.to_string(), action.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let action_str: String = row.get(2)?;
    let action = HistoryAction::parse(&action_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown history action: {action_str}").into(),
        )
    })?;

    let metadata_str: Option<String> = row.get(5)?;
    let metadata = match metadata_str {
        Some(s) => Some(serde_json::from_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?),
        None => None,
    };

    Ok(HistoryEntry {
        id: parse_uuid(row, 0)?,
        document_id: DocumentId(parse_uuid(row, 1)?),
        action,
        performed_by: UserId(parse_uuid(row, 3)?),
        transaction_hash: row.get(4)?,
        metadata,
        created_at: parse_datetime(row, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use serde_json::json;
    use tradedocs_shared::{hash_metadata, DocumentType};

    #[test]
    fn history_is_ordered_and_countable() {
        let db = Database::open_in_memory().unwrap();
        let user = db.upsert_user_by_email("a@example.com", "tester").unwrap();
        let metadata = json!({"a": 1});
        let doc = Document::new_draft(
            DocumentType::Verifiable,
            metadata.clone(),
            hash_metadata(&metadata),
            user.id,
            None,
        );
        db.insert_document(&doc).unwrap();

        db.append_history(doc.id, HistoryAction::Create, user.id, None, None)
            .unwrap();
        db.append_history(
            doc.id,
            HistoryAction::Activate,
            user.id,
            Some("0xabc"),
            Some(json!({"status": "Active"})),
        )
        .unwrap();

        let entries = db.history_for_document(doc.id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, HistoryAction::Create);
        assert_eq!(entries[1].action, HistoryAction::Activate);
        assert_eq!(entries[1].transaction_hash.as_deref(), Some("0xabc"));

        assert_eq!(
            db.history_action_count(doc.id, HistoryAction::Activate)
                .unwrap(),
            1
        );
        assert_eq!(
            db.history_action_count(doc.id, HistoryAction::Transfer)
                .unwrap(),
            0
        );
    }
}
