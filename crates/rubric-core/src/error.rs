//! Error types for `rubric-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::session::{SessionAction, SessionStatus};

/// Coarse classification of an error, used by transport layers to pick a
/// status code without matching on a concrete backend error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  NotFound,
  /// A submitted value fails its criterion's config constraints.
  Validation,
  /// An operation's preconditions are unmet (e.g. unscored required
  /// criteria at completion).
  Precondition,
  /// The session is in a state that does not permit the operation.
  State,
  /// A concurrent writer won; the caller must re-read before retrying.
  Conflict,
  /// Snapshot/criteria drift — a data-modeling invariant violation.
  Integrity,
  Internal,
}

/// Implemented by store error types so the API layer can classify them.
pub trait HasErrorKind {
  fn kind(&self) -> ErrorKind;
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("template not found: {0}")]
  TemplateNotFound(Uuid),

  #[error("template {0} has no published version")]
  TemplateNotPublished(Uuid),

  #[error("template {0} is archived and cannot be edited")]
  TemplateArchived(Uuid),

  #[error("session not found: {0}")]
  SessionNotFound(Uuid),

  #[error("invalid value for criterion {criteria_id}: {reason}")]
  InvalidValue { criteria_id: Uuid, reason: String },

  #[error(
    "value type {got:?} does not match criterion type {expected:?} for \
     criterion {criteria_id}"
  )]
  ValueTypeMismatch {
    criteria_id: Uuid,
    expected:    &'static str,
    got:         &'static str,
  },

  #[error("action {action:?} is not legal in session state {from:?}")]
  IllegalTransition {
    from:   SessionStatus,
    action: SessionAction,
  },

  #[error("required criteria are unscored: {0:?}")]
  MissingRequiredScores(Vec<Uuid>),

  #[error("partial submission not allowed; unscored criteria: {0:?}")]
  PartialSubmission(Vec<Uuid>),

  #[error("concurrent update lost: {0}")]
  Conflict(String),

  #[error("score references criterion {criteria_id} absent from the session snapshot")]
  SnapshotDrift { criteria_id: Uuid },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl HasErrorKind for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::TemplateNotFound(_) | Error::SessionNotFound(_) => {
        ErrorKind::NotFound
      }
      Error::InvalidValue { .. } | Error::ValueTypeMismatch { .. } => {
        ErrorKind::Validation
      }
      Error::MissingRequiredScores(_) | Error::PartialSubmission(_) => {
        ErrorKind::Precondition
      }
      Error::IllegalTransition { .. }
      | Error::TemplateNotPublished(_)
      | Error::TemplateArchived(_) => ErrorKind::State,
      Error::Conflict(_) => ErrorKind::Conflict,
      Error::SnapshotDrift { .. } => ErrorKind::Integrity,
      Error::Serialization(_) => ErrorKind::Internal,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
