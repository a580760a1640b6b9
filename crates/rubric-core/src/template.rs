//! Template types — versioned rubrics and their immutable snapshots.
//!
//! A template is mutable while `draft`. Publishing deep-copies the
//! template, its groups, and its criteria into a [`TemplateSnapshot`]
//! held by an append-only [`TemplateVersion`] record. Sessions bind to
//! a snapshot, never a live template, so historical scoring stays
//! re-derivable after the live template is edited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{aggregate::ScoringMethod, criterion::Criterion};

// ─── Settings ────────────────────────────────────────────────────────────────

/// Per-template behavioral flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateSettings {
  /// Allow answers to be marked not-applicable (excluded from
  /// aggregation entirely).
  #[serde(default)]
  pub allow_na: bool,
  /// Allow batch submissions that leave snapshot criteria unscored.
  #[serde(default)]
  pub allow_partial_submission: bool,
  /// If set, scores normalizing below this value should carry a comment.
  /// Advisory — enforced by graders' tooling, not by the engine.
  #[serde(default)]
  pub require_comment_below: Option<f64>,
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateStatus {
  Draft,
  Active,
  Archived,
}

// ─── Template ────────────────────────────────────────────────────────────────

/// A rubric definition. `version` tracks the latest published version
/// number (0 before first publish).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
  pub template_id:     Uuid,
  pub name:            String,
  pub description:     Option<String>,
  pub scoring_method:  ScoringMethod,
  /// Inclusive: a percentage score exactly at the threshold passes.
  pub pass_threshold:  f64,
  pub max_total_score: f64,
  pub settings:        TemplateSettings,
  pub status:          TemplateStatus,
  pub version:         u32,
  pub created_at:      DateTime<Utc>,
  pub activated_at:    Option<DateTime<Utc>>,
}

/// Named grouping of criteria within a template. Purely organizational;
/// the group weight is presentation metadata and plays no role in
/// aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaGroup {
  pub group_id:   Uuid,
  pub name:       String,
  pub weight:     Option<f64>,
  pub sort_order: i64,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// A deep copy of a template plus its ordered groups and criteria,
/// captured at publish time. A value type with structural equality —
/// never a shared reference that could be mutated after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSnapshot {
  pub template: Template,
  pub groups:   Vec<CriteriaGroup>,
  pub criteria: Vec<Criterion>,
}

impl TemplateSnapshot {
  /// Look up a criterion by id within this snapshot.
  pub fn criterion(&self, criteria_id: Uuid) -> Option<&Criterion> {
    self.criteria.iter().find(|c| c.criteria_id == criteria_id)
  }
}

// ─── TemplateVersion ─────────────────────────────────────────────────────────

/// An immutable published version record. Created only by a publish
/// action; never updated or deleted. `version_number` is strictly
/// increasing per template, starting at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateVersion {
  pub template_id:    Uuid,
  pub version_number: u32,
  pub snapshot:       TemplateSnapshot,
  pub change_summary: Option<String>,
  pub created_at:     DateTime<Utc>,
}

// ─── NewTemplate ─────────────────────────────────────────────────────────────

/// Input to [`crate::store::EvaluationStore::create_template`].
/// Server-assigned fields (id, status, version, timestamps) are not
/// accepted from callers.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTemplate {
  pub name:            String,
  pub description:     Option<String>,
  pub scoring_method:  ScoringMethod,
  pub pass_threshold:  f64,
  pub max_total_score: f64,
  #[serde(default)]
  pub settings:        TemplateSettings,
  #[serde(default)]
  pub groups:          Vec<CriteriaGroup>,
  #[serde(default)]
  pub criteria:        Vec<Criterion>,
}
