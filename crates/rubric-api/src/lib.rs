//! JSON REST API for Rubric.
//!
//! Exposes an axum [`Router`] backed by any
//! [`rubric_core::store::EvaluationStore`]. Auth, TLS, and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", rubric_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod scores;
pub mod sessions;
pub mod templates;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use rubric_core::{error::HasErrorKind, store::EvaluationStore};

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router
/// regardless of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: EvaluationStore + Clone + Send + Sync + 'static,
  S::Error: HasErrorKind,
{
  Router::new()
    // Templates
    .route("/templates", post(templates::create::<S>))
    .route("/templates/{id}", get(templates::get_one::<S>))
    .route("/templates/{id}/criteria", put(templates::update_criteria::<S>))
    .route("/templates/{id}/publish", post(templates::publish::<S>))
    .route("/templates/{id}/versions", get(templates::list_versions::<S>))
    .route("/templates/{id}/versions/{n}", get(templates::get_version::<S>))
    // Sessions
    .route(
      "/sessions",
      get(sessions::list::<S>).post(sessions::create::<S>),
    )
    .route("/sessions/{id}", get(sessions::get_one::<S>))
    .route(
      "/sessions/{id}/scores",
      get(scores::list::<S>).post(scores::submit::<S>),
    )
    .route("/sessions/{id}/complete", post(sessions::complete::<S>))
    .route("/sessions/{id}/review", post(sessions::review::<S>))
    .route("/sessions/{id}/dispute", post(sessions::dispute::<S>))
    .route("/sessions/{id}/resolve", post(sessions::resolve::<S>))
    .route("/sessions/{id}/cancel", post(sessions::cancel::<S>))
    .route("/sessions/{id}/reopen", post(sessions::reopen::<S>))
    .route("/sessions/{id}/audit", get(sessions::audit_log::<S>))
    .with_state(store)
}

// ─── Integration tests ───────────────────────────────────────────────────────
