//! The `EvaluationStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `rubric-store-sqlite`). Higher layers (`rubric-api`,
//! `rubric-server`) depend on this abstraction, not on any concrete
//! backend.
//!
//! Concurrency expectations (honored by implementations, not callers):
//! score rows are keyed `(session_id, criteria_id)` with last-write-wins
//! semantics; the `complete` transition and template publish must be
//! serialized per session / per template so that a losing concurrent
//! writer receives a conflict error instead of double-committing.

use std::future::Future;

use uuid::Uuid;

use crate::{
  score::{NewScore, Score, ScoreSubmission},
  session::{AuditEntry, Session, SessionStatus},
  template::{CriteriaGroup, NewTemplate, Template, TemplateVersion},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`EvaluationStore::list_sessions`].
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
  pub template_id: Option<Uuid>,
  pub status:      Option<SessionStatus>,
  /// Maximum rows to return. When unset, backends apply a default cap
  /// (100 for the SQLite store) rather than listing unbounded.
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an evaluation store backend.
///
/// Published template versions are append-only; sessions mutate only
/// through lifecycle transitions, each of which appends an audit entry.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait EvaluationStore: Send + Sync {
  type Error: std::error::Error
    + crate::error::HasErrorKind
    + Send
    + Sync
    + 'static;

  // ── Templates ─────────────────────────────────────────────────────────

  /// Create a draft template with its initial groups and criteria.
  fn create_template(
    &self,
    input: NewTemplate,
  ) -> impl Future<Output = Result<Template, Self::Error>> + Send + '_;

  /// Retrieve a template by id. Returns `None` if not found.
  fn get_template(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Template>, Self::Error>> + Send + '_;

  /// Replace the live (draft-next) groups and criteria of a template.
  /// Prior published snapshots are untouched.
  fn update_template_criteria(
    &self,
    template_id: Uuid,
    groups: Vec<CriteriaGroup>,
    criteria: Vec<crate::criterion::Criterion>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Publish the template: allocate the next version number, deep-copy
  /// template + groups + criteria into an immutable snapshot, and mark
  /// the live template active.
  ///
  /// Concurrent publishes of the same template are serialized; the
  /// loser receives a conflict error.
  fn publish_template(
    &self,
    template_id: Uuid,
    change_summary: Option<String>,
  ) -> impl Future<Output = Result<TemplateVersion, Self::Error>> + Send + '_;

  /// Fetch one published version. Returns `None` if not found.
  fn get_template_version(
    &self,
    template_id: Uuid,
    version_number: u32,
  ) -> impl Future<Output = Result<Option<TemplateVersion>, Self::Error>> + Send + '_;

  /// List all published versions of a template, oldest first.
  fn list_template_versions(
    &self,
    template_id: Uuid,
  ) -> impl Future<Output = Result<Vec<TemplateVersion>, Self::Error>> + Send + '_;

  // ── Sessions ──────────────────────────────────────────────────────────

  /// Create a session bound to the template's current published
  /// snapshot. Fails if the template has never been published.
  fn create_session(
    &self,
    template_id: Uuid,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  /// Retrieve a session by id. Returns `None` if not found.
  fn get_session(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + '_;

  /// List sessions matching `filter`.
  fn list_sessions<'a>(
    &'a self,
    filter: &'a SessionFilter,
  ) -> impl Future<Output = Result<Vec<Session>, Self::Error>> + Send + 'a;

  // ── Scores ────────────────────────────────────────────────────────────

  /// Batch score submission. Validates each entry against the session's
  /// bound snapshot, computes derived scores, and upserts accepted rows
  /// (last write wins per criterion). Invalid entries are reported in
  /// the result, never silently dropped. Submitting to a `pending`
  /// session moves it to `in_progress`.
  fn submit_scores(
    &self,
    session_id: Uuid,
    entries: Vec<NewScore>,
    actor: Option<String>,
  ) -> impl Future<Output = Result<ScoreSubmission, Self::Error>> + Send + '_;

  /// All persisted scores for a session.
  fn get_scores(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Score>, Self::Error>> + Send + '_;

  // ── Lifecycle transitions ─────────────────────────────────────────────

  /// Complete the session: verify required criteria are scored, run the
  /// aggregator, write the aggregate fields, stamp `completed_at`.
  /// Serialized per session — a concurrent completion loses with a
  /// conflict error.
  fn complete_session(
    &self,
    session_id: Uuid,
    actor: Option<String>,
    notes: Option<String>,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  /// Mark a completed session reviewed. Does not recompute scores.
  fn review_session(
    &self,
    session_id: Uuid,
    reviewed_by: String,
    notes: Option<String>,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  /// Flag a completed or reviewed session as disputed.
  fn dispute_session(
    &self,
    session_id: Uuid,
    actor: Option<String>,
    reason: String,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  /// Resolve a dispute back to `reviewed`.
  fn resolve_dispute(
    &self,
    session_id: Uuid,
    actor: Option<String>,
    resolution: String,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  /// Cancel a pending or in-progress session (terminal).
  fn cancel_session(
    &self,
    session_id: Uuid,
    actor: Option<String>,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  /// Administrative escape hatch: reopen a completed or reviewed
  /// session, clearing its aggregate fields. Explicitly logged.
  fn reopen_session(
    &self,
    session_id: Uuid,
    actor: Option<String>,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  // ── Audit ─────────────────────────────────────────────────────────────

  /// The append-only audit log for a session, oldest first.
  fn get_audit_log(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AuditEntry>, Self::Error>> + Send + '_;
}
