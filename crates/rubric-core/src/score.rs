//! Score types — one submitted answer for one criterion within one
//! session.
//!
//! Scores are keyed `(session_id, criteria_id)`; resubmission is
//! last-write-wins with a server-assigned timestamp. Derived fields
//! (`raw_score`, `normalized_score`, `weighted_score`,
//! `is_auto_fail_triggered`) are computed by the store at submission
//! time against the session's bound snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::criterion::{CriterionConfig, ScoreValue};

/// A persisted criterion answer. Immutable once the session is
/// completed, except through an explicit reopen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
  pub score_id:               Uuid,
  pub session_id:             Uuid,
  pub criteria_id:            Uuid,
  /// `None` only when `is_na` is set.
  pub value:                  Option<ScoreValue>,
  /// Excludes the criterion from aggregation entirely.
  pub is_na:                  bool,
  pub raw_score:              Option<f64>,
  pub normalized_score:       Option<f64>,
  pub weighted_score:         Option<f64>,
  pub is_auto_fail_triggered: bool,
  pub comment:                Option<String>,
  /// Frozen copy of the config this score was normalized against.
  pub criteria_snapshot:      CriterionConfig,
  /// Server-assigned; last write wins on resubmission.
  pub recorded_at:            DateTime<Utc>,
}

/// One entry of a batch submission.
#[derive(Debug, Clone, Deserialize)]
pub struct NewScore {
  pub criteria_id: Uuid,
  pub value:       Option<ScoreValue>,
  #[serde(default)]
  pub is_na:       bool,
  pub comment:     Option<String>,
}

/// A batch entry the store refused to persist, with the reason.
/// Rejections never silently drop an entry.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedScore {
  pub criteria_id: Uuid,
  pub reason:      String,
}

/// Result of a batch submission: per-entry accept/reject.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreSubmission {
  pub accepted: Vec<Score>,
  pub rejected: Vec<RejectedScore>,
}
