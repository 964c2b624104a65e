//! Requester identity.
//!
//! The hosted identity provider sits in front of this service; by the time
//! a request arrives, it carries the caller's user id in the `x-user-id`
//! header.  The extractor resolves that id against the users table so
//! handlers always work with a full [`User`] record.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use tradedocs_shared::UserId;
use tradedocs_store::{StoreError, User};

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::error::ServerError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated requester.
pub struct AuthedUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthedUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let id = user_id_from_headers(&parts.headers).ok_or(ServerError::Unauthenticated)?;

        let db = state.db.lock().await;
        match db.get_user(id) {
            Ok(user) => Ok(AuthedUser(user)),
            Err(StoreError::NotFound) => Err(ServerError::Unauthenticated),
            Err(e) => Err(e.into()),
        }
    }
}

pub fn user_id_from_headers(headers: &HeaderMap) -> Option<UserId> {
    let raw = headers.get(USER_ID_HEADER)?.to_str().ok()?;
    Uuid::parse_str(raw.trim()).ok().map(UserId)
}

/// Whether the request carries the configured admin bearer token.
///
/// Constant-time comparison to prevent timing attacks on the token.
pub fn is_admin(headers: &HeaderMap, config: &ServerConfig) -> bool {
    let Some(ref expected) = config.admin_token else {
        return false;
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    token_bytes.len() == expected_bytes.len()
        && token_bytes.ct_eq(expected_bytes).unwrap_u8() == 1
}
