//! HTTP API surface.
//!
//! Handlers never talk to the ledger directly.  A lifecycle request is
//! admitted against the state machine, flipped to its pending status with a
//! compare-and-swap, and handed to a job queue; the response carries the
//! job handle so the client can poll for the confirmation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use tradedocs_queue::JobId;
use tradedocs_shared::constants::DEFAULT_EXPIRY_DAYS;
use tradedocs_shared::{
    admit_transfer, admit_verification, verify_hash, DocumentId, DocumentStatus, DocumentType,
    HistoryAction, TransitionError, UserId,
};
use tradedocs_store::{Document, StoreError};

use crate::auth::{is_admin, AuthedUser};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::jobs::{CreationJob, JobQueues, TransferJob, VerificationJob};
use crate::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::state::SharedDb;

#[derive(Clone)]
pub struct AppState {
    pub db: SharedDb,
    pub queues: Arc<JobQueues>,
    pub config: Arc<ServerConfig>,
    pub rate_limiter: RateLimiter,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/login", post(login))
        .route("/auth/wallet", post(link_wallet))
        .route("/documents", post(create_document).get(list_documents))
        .route("/documents/job-status/:queue/:job_id", get(job_status))
        .route("/documents/:id", get(get_document))
        .route("/documents/:id/history", get(document_history))
        .route("/documents/:id/download", get(download_document))
        .route("/documents/:id/verify", post(verify_document))
        .route("/documents/:id/transfer", post(transfer_document))
        .route("/documents/:id/verify-hash", post(verify_document_hash))
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the task is aborted.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.http_addr;
    let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Health and identity
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "instance": state.config.instance_name,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    username: String,
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ServerError> {
    if body.email.trim().is_empty() || !body.email.contains('@') {
        return Err(ServerError::BadRequest("A valid email is required".into()));
    }
    if body.username.trim().is_empty() {
        return Err(ServerError::BadRequest("A username is required".into()));
    }

    let db = state.db.lock().await;
    let user = db.upsert_user_by_email(&body.email, body.username.trim())?;
    info!(user = %user.id, "user logged in");
    Ok(Json(json!({"user": user})))
}

#[derive(Debug, Deserialize)]
struct WalletRequest {
    wallet_address: String,
}

async fn link_wallet(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Json(body): Json<WalletRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let address = body.wallet_address.trim();
    if address.is_empty() {
        return Err(ServerError::BadRequest("A wallet address is required".into()));
    }

    let db = state.db.lock().await;
    db.set_wallet_address(user.id, address)?;
    let user = db.get_user(user.id)?;
    Ok(Json(json!({"user": user})))
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateDocumentRequest {
    document_type: String,
    metadata: Value,
    expires_at: Option<DateTime<Utc>>,
}

async fn create_document(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Json(body): Json<CreateDocumentRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let document_type = DocumentType::parse(&body.document_type).ok_or_else(|| {
        ServerError::BadRequest(format!("Unknown document type: {}", body.document_type))
    })?;
    if !body.metadata.is_object() {
        return Err(ServerError::BadRequest(
            "Document metadata must be a JSON object".into(),
        ));
    }

    let expires_at = body
        .expires_at
        .unwrap_or_else(|| Utc::now() + Duration::days(DEFAULT_EXPIRY_DAYS));

    let document_hash = tradedocs_shared::hash_metadata(&body.metadata);
    let doc = Document::new_draft(
        document_type,
        body.metadata,
        document_hash.clone(),
        user.id,
        Some(expires_at),
    );

    {
        let db = state.db.lock().await;
        db.insert_document(&doc)?;
        db.append_history(
            doc.id,
            HistoryAction::Create,
            user.id,
            None,
            Some(json!({"status": "Draft", "documentType": document_type})),
        )?;
    }

    let job_id = state
        .queues
        .enqueue_creation(CreationJob {
            document_id: doc.id,
            category: document_type.registry_category(),
            document_hash,
            expires_at: expires_at.timestamp(),
        })
        .await?;

    info!(document = %doc.id, job = %job_id, "document created, registration queued");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Document created; registry submission in progress",
            "document": doc,
            "job": job_handle("creation", job_id),
        })),
    ))
}

async fn list_documents(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
) -> Result<impl IntoResponse, ServerError> {
    let db = state.db.lock().await;
    let documents = db.documents_for_user(user.id)?;
    Ok(Json(json!({"documents": documents})))
}

async fn get_document(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServerError> {
    let db = state.db.lock().await;
    let doc = load_document(&db, id)?;
    ensure_party(&doc, user.id, is_admin(&headers, &state.config))?;
    Ok(Json(json!({"document": doc})))
}

async fn document_history(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServerError> {
    let db = state.db.lock().await;
    let doc = load_document(&db, id)?;
    ensure_party(&doc, user.id, is_admin(&headers, &state.config))?;
    let history = db.history_for_document(doc.id)?;
    Ok(Json(json!({"history": history})))
}

async fn download_document(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServerError> {
    let db = state.db.lock().await;
    let doc = load_document(&db, id)?;
    ensure_party(&doc, user.id, is_admin(&headers, &state.config))?;
    db.record_download(doc.id, user.id)?;
    Ok(Json(json!({"document": doc})))
}

async fn verify_document(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServerError> {
    let doc = {
        let db = state.db.lock().await;
        let doc = load_document(&db, id)?;
        admit_verification(doc.status)?;

        // Admission raced another request if this CAS loses.
        if !db.set_status_if(doc.id, DocumentStatus::Active, DocumentStatus::PendingVerification)? {
            let current = db.get_document(doc.id)?.status;
            return Err(TransitionError::InvalidTransition(current).into());
        }
        db.get_document(doc.id)?
    };

    let job_id = state
        .queues
        .enqueue_verification(VerificationJob {
            document_id: doc.id,
            user_id: user.id,
        })
        .await?;

    info!(document = %doc.id, job = %job_id, "verification queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Verification in progress",
            "document": doc,
            "job": job_handle("verification", job_id),
        })),
    ))
}

#[derive(Debug, Deserialize)]
struct TransferRequest {
    new_holder: Option<String>,
}

async fn transfer_document(
    State(state): State<AppState>,
    AuthedUser(user): AuthedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<TransferRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let new_holder = body
        .new_holder
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ServerError::MissingHolderAddress)?
        .to_string();

    let doc = {
        let db = state.db.lock().await;
        let doc = load_document(&db, id)?;
        admit_transfer(
            doc.document_type,
            doc.status,
            user.id,
            doc.creator,
            &doc.endorsement_chain,
        )?;

        // Admission proved status is Active or Verified; swap from whichever
        // it was.
        if !db.set_status_if(doc.id, doc.status, DocumentStatus::PendingTransfer)? {
            let current = db.get_document(doc.id)?.status;
            return Err(TransitionError::InvalidTransition(current).into());
        }
        db.get_document(doc.id)?
    };

    let job_id = state
        .queues
        .enqueue_transfer(TransferJob {
            document_id: doc.id,
            new_holder,
            user_id: user.id,
        })
        .await?;

    info!(document = %doc.id, job = %job_id, "transfer queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Transfer in progress",
            "document": doc,
            "job": job_handle("transfer", job_id),
        })),
    ))
}

#[derive(Debug, Deserialize)]
struct VerifyHashRequest {
    metadata: Value,
}

async fn verify_document_hash(
    State(state): State<AppState>,
    AuthedUser(_user): AuthedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<VerifyHashRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let db = state.db.lock().await;
    let doc = load_document(&db, id)?;
    let valid = verify_hash(&body.metadata, &doc.document_hash);
    Ok(Json(json!({
        "valid": valid,
        "document_hash": doc.document_hash,
    })))
}

// ---------------------------------------------------------------------------
// Job status
// ---------------------------------------------------------------------------

async fn job_status(
    State(state): State<AppState>,
    AuthedUser(_user): AuthedUser,
    Path((queue_name, job_id)): Path<(String, Uuid)>,
) -> Result<impl IntoResponse, ServerError> {
    let queue = state
        .queues
        .by_name(&queue_name)
        .ok_or(ServerError::InvalidQueue)?;

    let status = queue.status(JobId(job_id)).await?;
    Ok(Json(json!({
        "job_id": status.id,
        "status": status.state,
        "progress": status.progress,
        "result": status.result,
        "error": status.error,
        "attempts": status.attempts_made,
    })))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn job_handle(queue: &str, job_id: JobId) -> Value {
    json!({
        "id": job_id,
        "status_check_endpoint": format!("/documents/job-status/{queue}/{job_id}"),
    })
}

fn load_document(db: &tradedocs_store::Database, id: Uuid) -> Result<Document, ServerError> {
    match db.get_document(DocumentId(id)) {
        Ok(doc) => Ok(doc),
        Err(StoreError::NotFound) => Err(ServerError::DocumentNotFound),
        Err(e) => Err(e.into()),
    }
}

fn ensure_party(doc: &Document, user: UserId, admin: bool) -> Result<(), ServerError> {
    if admin || doc.creator == user || doc.endorsement_chain.contains(&user) {
        Ok(())
    } else {
        Err(ServerError::Forbidden(
            "Not a party to this document".into(),
        ))
    }
}
