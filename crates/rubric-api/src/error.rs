//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use rubric_core::error::{ErrorKind, HasErrorKind};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("store error: {source}")]
  Store {
    kind:   ErrorKind,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

impl ApiError {
  /// Wrap a store error, capturing its classification so the response
  /// status can be picked without knowing the concrete backend type.
  pub fn from_store<E>(e: E) -> Self
  where
    E: std::error::Error + HasErrorKind + Send + Sync + 'static,
  {
    Self::Store { kind: e.kind(), source: Box::new(e) }
  }
}

fn status_for(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::NotFound => StatusCode::NOT_FOUND,
    ErrorKind::Validation | ErrorKind::Precondition => {
      StatusCode::UNPROCESSABLE_ENTITY
    }
    ErrorKind::State | ErrorKind::Conflict => StatusCode::CONFLICT,
    ErrorKind::Integrity | ErrorKind::Internal => {
      StatusCode::INTERNAL_SERVER_ERROR
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Store { kind, source } => {
        (status_for(*kind), source.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
