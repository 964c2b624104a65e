//! User identity records.
//!
//! Users are created on first login and only ever mutated by subsequent
//! logins (last_login, username) and wallet linkage.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use tradedocs_shared::UserId;

use crate::database::Database;
use crate::documents::{parse_datetime, parse_uuid};
use crate::error::{Result, StoreError};
use crate::models::User;

const USER_COLUMNS: &str = "id, email, username, wallet_address, last_login, created_at";

impl Database {
    /// Login path: create the user on first sight, otherwise refresh
    /// username and last_login.  Emails are compared lowercased.
    pub fn upsert_user_by_email(&self, email: &str, username: &str) -> Result<User> {
        let email = email.trim().to_lowercase();
        let now = Utc::now();

        if let Some(existing) = self.find_user_by_email(&email)? {
            self.conn().execute(
                "UPDATE users SET username = ?1, last_login = ?2 WHERE id = ?3",
                params![username, now.to_rfc3339(), existing.id.0.to_string()],
            )?;
            return self.get_user(existing.id);
        }

        let user = User {
            id: UserId::new(),
            email,
            username: username.to_string(),
            wallet_address: None,
            last_login: now,
            created_at: now,
        };

        self.conn().execute(
            "INSERT INTO users (id, email, username, wallet_address, last_login, created_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?5)",
            params![
                user.id.0.to_string(),
                user.email,
                user.username,
                user.last_login.to_rfc3339(),
                user.created_at.to_rfc3339(),
            ],
        )?;

        Ok(user)
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.0.to_string()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email.trim().to_lowercase()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Address -> identity lookup used by the transfer reconciler.
    pub fn find_user_by_wallet(&self, wallet_address: &str) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE wallet_address = ?1"),
                params![wallet_address],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Link a registry address to a user.
    pub fn set_wallet_address(&self, id: UserId, wallet_address: &str) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET wallet_address = ?1 WHERE id = ?2",
            params![wallet_address, id.0.to_string()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(parse_uuid(row, 0)?),
        email: row.get(1)?,
        username: row.get(2)?,
        wallet_address: row.get(3)?,
        last_login: parse_datetime(row, 4)?,
        created_at: parse_datetime(row, 5)?,
    })
}
