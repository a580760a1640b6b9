//! Handlers for `/sessions/:id/scores` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/sessions/:id/scores` | Batch submit; per-entry accept/reject results |
//! | `GET`  | `/sessions/:id/scores` | All persisted scores for the session |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use rubric_core::{
  error::HasErrorKind,
  score::{NewScore, Score, ScoreSubmission},
  store::EvaluationStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

/// JSON body accepted by `POST /sessions/:id/scores`.
#[derive(Debug, Deserialize)]
pub struct SubmitBody {
  pub scores: Vec<NewScore>,
  pub actor:  Option<String>,
}

/// `POST /sessions/:id/scores` — returns the per-entry submission result.
/// Invalid entries land in `rejected` with a reason; they never abort
/// the rest of the batch.
pub async fn submit<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<SubmitBody>,
) -> Result<Json<ScoreSubmission>, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let submission = store
    .submit_scores(id, body.scores, body.actor)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(submission))
}

/// `GET /sessions/:id/scores`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Score>>, ApiError>
where
  S: EvaluationStore,
  S::Error: HasErrorKind,
{
  let scores = store
    .get_scores(id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(scores))
}
