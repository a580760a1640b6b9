//! Handlers for `/templates` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/templates` | Body: [`rubric_core::template::NewTemplate`]; returns 201 |
//! | `GET`  | `/templates/:id` | 404 if not found |
//! | `PUT`  | `/templates/:id/criteria` | Replace the live groups and criteria |
//! | `POST` | `/templates/:id/publish` | Allocates the next immutable version |
//! | `GET`  | `/templates/:id/versions` | All published versions, oldest first |
//! | `GET`  | `/templates/:id/versions/:n` | One published version |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use rubric_core::{
  criterion::Criterion,
  error::HasErrorKind,
  store::EvaluationStore,
  template::{CriteriaGroup, NewTemplate, Template, TemplateVersion},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /templates` — returns 201 + the stored draft template.
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewTemplate>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let template = store
    .create_template(body)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(template)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /templates/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Template>, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let template = store
    .get_template(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("template {id} not found")))?;
  Ok(Json(template))
}

// ─── Update criteria ─────────────────────────────────────────────────────────

/// JSON body accepted by `PUT /templates/:id/criteria`.
#[derive(Debug, Deserialize)]
pub struct CriteriaBody {
  #[serde(default)]
  pub groups:   Vec<CriteriaGroup>,
  pub criteria: Vec<Criterion>,
}

/// `PUT /templates/:id/criteria` — replaces the live (draft-next) groups
/// and criteria. Published versions are unaffected.
pub async fn update_criteria<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CriteriaBody>,
) -> Result<StatusCode, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  store
    .update_template_criteria(id, body.groups, body.criteria)
    .await
    .map_err(ApiError::from_store)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Publish ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct PublishBody {
  pub change_summary: Option<String>,
}

/// `POST /templates/:id/publish` — returns 201 + the new version record.
pub async fn publish<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<PublishBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let version = store
    .publish_template(id, body.change_summary)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(version)))
}

// ─── Versions ────────────────────────────────────────────────────────────────

/// `GET /templates/:id/versions`
pub async fn list_versions<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<TemplateVersion>>, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let versions = store
    .list_template_versions(id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(versions))
}

/// `GET /templates/:id/versions/:n`
pub async fn get_version<S>(
  State(store): State<Arc<S>>,
  Path((id, number)): Path<(Uuid, u32)>,
) -> Result<Json<TemplateVersion>, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let version = store
    .get_template_version(id, number)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| {
      ApiError::NotFound(format!("template {id} has no version {number}"))
    })?;
  Ok(Json(version))
}
