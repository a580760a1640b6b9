//! Session lifecycle — the state machine governing one evaluation.
//!
//! Every external operation routes through [`transition`], a single
//! `(state, action) -> state` table, so illegal transitions are
//! structurally rejected rather than guarded ad hoc at call sites.
//! Each committed transition appends an [`AuditEntry`] — write-only
//! history, never read back into scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Result,
  aggregate::PassStatus,
  error::Error,
  template::TemplateSnapshot,
};

// ─── Status and actions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
  Pending,
  InProgress,
  Completed,
  Reviewed,
  Disputed,
  /// Terminal. Scores are retained for audit; the session is excluded
  /// from analytics.
  Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionAction {
  SubmitScores,
  Complete,
  Review,
  Dispute,
  Resolve,
  Cancel,
  Reopen,
}

/// The transition table. Submitting scores while `pending` auto-moves
/// the session to `in_progress`; reopening a completed or reviewed
/// session is the administrative escape hatch back to `in_progress`.
pub fn transition(
  status: SessionStatus,
  action: SessionAction,
) -> Result<SessionStatus> {
  use SessionAction as A;
  use SessionStatus as S;

  match (status, action) {
    (S::Pending | S::InProgress, A::SubmitScores) => Ok(S::InProgress),
    (S::InProgress, A::Complete) => Ok(S::Completed),
    (S::Completed, A::Review) => Ok(S::Reviewed),
    (S::Completed | S::Reviewed, A::Dispute) => Ok(S::Disputed),
    (S::Disputed, A::Resolve) => Ok(S::Reviewed),
    (S::Pending | S::InProgress, A::Cancel) => Ok(S::Cancelled),
    (S::Completed | S::Reviewed, A::Reopen) => Ok(S::InProgress),
    (from, action) => Err(Error::IllegalTransition { from, action }),
  }
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// One evaluation instance of a call against a template snapshot.
///
/// `snapshot` is captured once at creation and never mutated, even if
/// the live template changes later — the central reproducibility
/// invariant. Aggregate fields stay `None` until completion and are
/// cleared again on reopen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
  pub session_id:             Uuid,
  pub template_id:            Uuid,
  /// Pointer to the bound [`crate::template::TemplateVersion`].
  pub template_version:       u32,
  pub snapshot:               TemplateSnapshot,
  pub status:                 SessionStatus,

  // Aggregate fields, written by the `complete` transition.
  pub total_score:            Option<f64>,
  pub total_possible:         Option<f64>,
  pub percentage_score:       Option<f64>,
  pub pass_status:            PassStatus,
  pub has_auto_fail:          bool,
  pub auto_fail_criteria_ids: Vec<Uuid>,

  pub created_at:             DateTime<Utc>,
  pub completed_at:           Option<DateTime<Utc>>,
  pub reviewed_by:            Option<String>,
  pub reviewed_at:            Option<DateTime<Utc>>,
  pub review_notes:           Option<String>,
  pub dispute_reason:         Option<String>,
  pub disputed_at:            Option<DateTime<Utc>>,
  pub dispute_resolution:     Option<String>,
}

// ─── Audit log ───────────────────────────────────────────────────────────────

/// One append-only audit record for a session transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
  pub audit_id:    Uuid,
  pub session_id:  Uuid,
  pub action:      SessionAction,
  pub actor:       Option<String>,
  pub note:        Option<String>,
  pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  use SessionAction as A;
  use SessionStatus as S;

  #[test]
  fn happy_path() {
    assert_eq!(transition(S::Pending, A::SubmitScores).unwrap(), S::InProgress);
    assert_eq!(
      transition(S::InProgress, A::SubmitScores).unwrap(),
      S::InProgress
    );
    assert_eq!(transition(S::InProgress, A::Complete).unwrap(), S::Completed);
    assert_eq!(transition(S::Completed, A::Review).unwrap(), S::Reviewed);
  }

  #[test]
  fn dispute_cycle_resolves_to_reviewed() {
    assert_eq!(transition(S::Completed, A::Dispute).unwrap(), S::Disputed);
    assert_eq!(transition(S::Reviewed, A::Dispute).unwrap(), S::Disputed);
    assert_eq!(transition(S::Disputed, A::Resolve).unwrap(), S::Reviewed);
  }

  #[test]
  fn cancel_only_before_completion() {
    assert_eq!(transition(S::Pending, A::Cancel).unwrap(), S::Cancelled);
    assert_eq!(transition(S::InProgress, A::Cancel).unwrap(), S::Cancelled);
    assert!(transition(S::Completed, A::Cancel).is_err());
    assert!(transition(S::Reviewed, A::Cancel).is_err());
  }

  #[test]
  fn cancelled_is_terminal() {
    for action in [
      A::SubmitScores,
      A::Complete,
      A::Review,
      A::Dispute,
      A::Resolve,
      A::Cancel,
      A::Reopen,
    ] {
      assert!(transition(S::Cancelled, action).is_err());
    }
  }

  #[test]
  fn reopen_returns_to_in_progress() {
    assert_eq!(transition(S::Completed, A::Reopen).unwrap(), S::InProgress);
    assert_eq!(transition(S::Reviewed, A::Reopen).unwrap(), S::InProgress);
    assert!(transition(S::Pending, A::Reopen).is_err());
    assert!(transition(S::Disputed, A::Reopen).is_err());
  }

  #[test]
  fn cannot_complete_pending_or_score_completed() {
    assert!(matches!(
      transition(S::Pending, A::Complete),
      Err(Error::IllegalTransition { from: S::Pending, action: A::Complete })
    ));
    assert!(transition(S::Completed, A::SubmitScores).is_err());
  }
}
