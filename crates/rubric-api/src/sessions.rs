//! Handlers for `/sessions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/sessions` | Body: `{"template_id":...}`; binds the latest published snapshot |
//! | `GET`  | `/sessions` | Optional `?template_id`, `?status`, `?limit`, `?offset` |
//! | `GET`  | `/sessions/:id` | 404 if not found |
//! | `POST` | `/sessions/:id/complete` | Aggregates and writes the verdict |
//! | `POST` | `/sessions/:id/review` | Body: `{"reviewed_by":...,"notes":...}` |
//! | `POST` | `/sessions/:id/dispute` | Body: `{"reason":...}` |
//! | `POST` | `/sessions/:id/resolve` | Body: `{"resolution":...}` |
//! | `POST` | `/sessions/:id/cancel` | Terminal |
//! | `POST` | `/sessions/:id/reopen` | Clears aggregate fields |
//! | `GET`  | `/sessions/:id/audit` | Transition history, oldest first |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use rubric_core::{
  error::HasErrorKind,
  session::{AuditEntry, Session, SessionStatus},
  store::{EvaluationStore, SessionFilter},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub template_id: Uuid,
}

/// `POST /sessions` — returns 201 + the new pending session.
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let session = store
    .create_session(body.template_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(session)))
}

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub template_id: Option<Uuid>,
  pub status:      Option<SessionStatus>,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

/// `GET /sessions[?template_id=...][&status=...][&limit=...][&offset=...]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Session>>, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let filter = SessionFilter {
    template_id: params.template_id,
    status:      params.status,
    limit:       params.limit,
    offset:      params.offset,
  };
  let sessions = store
    .list_sessions(&filter)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(sessions))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /sessions/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Session>, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let session = store
    .get_session(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("session {id} not found")))?;
  Ok(Json(session))
}

// ─── Lifecycle transitions ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CompleteBody {
  pub actor: Option<String>,
  pub notes: Option<String>,
}

/// `POST /sessions/:id/complete`
pub async fn complete<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CompleteBody>,
) -> Result<Json<Session>, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let session = store
    .complete_session(id, body.actor, body.notes)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
  pub reviewed_by: String,
  pub notes:       Option<String>,
}

/// `POST /sessions/:id/review`
pub async fn review<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ReviewBody>,
) -> Result<Json<Session>, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let session = store
    .review_session(id, body.reviewed_by, body.notes)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct DisputeBody {
  pub actor:  Option<String>,
  pub reason: String,
}

/// `POST /sessions/:id/dispute`
pub async fn dispute<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<DisputeBody>,
) -> Result<Json<Session>, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let session = store
    .dispute_session(id, body.actor, body.reason)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
  pub actor:      Option<String>,
  pub resolution: String,
}

/// `POST /sessions/:id/resolve`
pub async fn resolve<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ResolveBody>,
) -> Result<Json<Session>, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let session = store
    .resolve_dispute(id, body.actor, body.resolution)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(session))
}

#[derive(Debug, Default, Deserialize)]
pub struct ActorBody {
  pub actor: Option<String>,
}

/// `POST /sessions/:id/cancel`
pub async fn cancel<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ActorBody>,
) -> Result<Json<Session>, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let session = store
    .cancel_session(id, body.actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(session))
}

/// `POST /sessions/:id/reopen`
pub async fn reopen<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ActorBody>,
) -> Result<Json<Session>, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let session = store
    .reopen_session(id, body.actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(session))
}

// ─── Audit ───────────────────────────────────────────────────────────────────

/// `GET /sessions/:id/audit`
pub async fn audit_log<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<AuditEntry>>, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let entries = store
    .get_audit_log(id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(entries))
}
