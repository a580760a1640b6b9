//! Criterion types — the gradable items of a rubric template.
//!
//! A criterion's answer shape is determined by its type-specific
//! [`CriterionConfig`]; submitted answers arrive as the matching
//! [`ScoreValue`] variant. Both are closed tagged unions so the
//! normalizer can match exhaustively, and a value whose tag does not
//! match its criterion's declared type is rejected at the boundary
//! rather than trusted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Config sub-types ────────────────────────────────────────────────────────

/// One tickable item of a checklist criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
  pub id:     String,
  pub label:  String,
  pub points: f64,
}

/// One selectable option of a dropdown or multi-select criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredOption {
  pub value: String,
  pub label: Option<String>,
  pub score: f64,
}

/// A presentation band for percentage criteria (e.g. red below 50,
/// green above 80). Metadata only — never used in score computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentageThreshold {
  pub label: String,
  pub min:   f64,
}

// ─── CriterionConfig ─────────────────────────────────────────────────────────

/// Type-specific configuration for a criterion. The variant name serves
/// as the `criteria_type` discriminant stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum CriterionConfig {
  /// Numeric scale graded between `min` and `max`.
  Scale { min: f64, max: f64, step: f64 },
  /// Binary outcome with configurable point values for each side.
  PassFail { pass_value: f64, fail_value: f64 },
  /// A set of tickable items. `require_all` switches from summed points
  /// to all-or-nothing grading.
  Checklist {
    items:       Vec<ChecklistItem>,
    #[serde(default)]
    require_all: bool,
  },
  /// Exactly one option selected.
  Dropdown { options: Vec<ScoredOption> },
  /// Any subset of options selected; scores are summed.
  MultiSelect { options: Vec<ScoredOption> },
  /// Star rating out of `max_stars`, optionally in half-star steps.
  RatingStars { max_stars: u8, allow_half: bool },
  /// Direct 0–100 entry. Thresholds are presentation metadata only.
  Percentage {
    #[serde(default)]
    thresholds: Option<Vec<PercentageThreshold>>,
  },
  /// Free-text response; scored on presence, not content.
  Text {},
}

impl CriterionConfig {
  /// The discriminant string stored in the `criteria_type` column.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Scale { .. } => "scale",
      Self::PassFail { .. } => "pass_fail",
      Self::Checklist { .. } => "checklist",
      Self::Dropdown { .. } => "dropdown",
      Self::MultiSelect { .. } => "multi_select",
      Self::RatingStars { .. } => "rating_stars",
      Self::Percentage { .. } => "percentage",
      Self::Text {} => "text",
    }
  }

  /// Serialise the inner payload (without the type tag) for the
  /// `config_json` database column.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("config").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Deserialise from the discriminant string and JSON payload stored in
  /// the database.
  pub fn from_parts(
    discriminant: &str,
    config: serde_json::Value,
  ) -> Result<Self> {
    let wrapped = serde_json::json!({ "type": discriminant, "config": config });
    Ok(serde_json::from_value(wrapped)?)
  }
}

// ─── ScoreValue ──────────────────────────────────────────────────────────────

/// A submitted raw answer. Tags mirror [`CriterionConfig`] exactly; a
/// value is only valid against a config with the same discriminant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ScoreValue {
  Scale { value: f64 },
  PassFail { passed: bool },
  Checklist { checked: Vec<String> },
  Dropdown { selected: String },
  MultiSelect { selected: Vec<String> },
  RatingStars { stars: f64 },
  Percentage { value: f64 },
  Text { response: String },
}

impl ScoreValue {
  /// The discriminant string stored in the `value_type` column.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Scale { .. } => "scale",
      Self::PassFail { .. } => "pass_fail",
      Self::Checklist { .. } => "checklist",
      Self::Dropdown { .. } => "dropdown",
      Self::MultiSelect { .. } => "multi_select",
      Self::RatingStars { .. } => "rating_stars",
      Self::Percentage { .. } => "percentage",
      Self::Text { .. } => "text",
    }
  }

  /// Serialise the inner payload (without the type tag) for the
  /// `value_json` database column.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("value").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Deserialise from the discriminant string and JSON payload stored in
  /// the database.
  pub fn from_parts(
    discriminant: &str,
    value: serde_json::Value,
  ) -> Result<Self> {
    let wrapped = serde_json::json!({ "type": discriminant, "value": value });
    Ok(serde_json::from_value(wrapped)?)
  }
}

// ─── Criterion ───────────────────────────────────────────────────────────────

/// One gradable item within a template. Immutable once referenced by a
/// published snapshot; draft templates may edit freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
  pub criteria_id:         Uuid,
  pub group_id:            Option<Uuid>,
  pub name:                String,
  pub description:         Option<String>,
  pub config:              CriterionConfig,
  /// Meaning depends on the template's scoring method; ignored by
  /// `simple_average`, denominator contribution under `weighted`.
  pub weight:              f64,
  /// Maximum attainable raw score; used by the `points` method.
  pub max_score:           f64,
  pub is_required:         bool,
  pub is_auto_fail:        bool,
  /// Normalized-score percentage below which the session is force-failed.
  /// Strict comparison: a score exactly at the threshold does not trigger.
  pub auto_fail_threshold: Option<f64>,
  pub sort_order:          i64,
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// Validate a submitted value against its criterion's config.
///
/// Rejections block persistence of that score; they are reported
/// per-entry by batch submission rather than aborting the whole batch.
pub fn validate_value(criterion: &Criterion, value: &ScoreValue) -> Result<()> {
  let config = &criterion.config;
  if config.discriminant() != value.discriminant() {
    return Err(Error::ValueTypeMismatch {
      criteria_id: criterion.criteria_id,
      expected:    config.discriminant(),
      got:         value.discriminant(),
    });
  }

  let invalid = |reason: String| Error::InvalidValue {
    criteria_id: criterion.criteria_id,
    reason,
  };

  match (config, value) {
    (CriterionConfig::Scale { min, max, .. }, ScoreValue::Scale { value }) => {
      if !value.is_finite() {
        return Err(invalid(format!("scale value {value} is not finite")));
      }
      if value < min || value > max {
        return Err(invalid(format!(
          "scale value {value} outside [{min}, {max}]"
        )));
      }
    }
    (CriterionConfig::Checklist { items, .. }, ScoreValue::Checklist { checked }) => {
      for id in checked {
        if !items.iter().any(|item| item.id == *id) {
          return Err(invalid(format!("unknown checklist item id {id:?}")));
        }
      }
    }
    (CriterionConfig::Dropdown { options }, ScoreValue::Dropdown { selected }) => {
      if !options.iter().any(|o| o.value == *selected) {
        return Err(invalid(format!("unknown option {selected:?}")));
      }
    }
    (CriterionConfig::MultiSelect { options }, ScoreValue::MultiSelect { selected }) => {
      for v in selected {
        if !options.iter().any(|o| o.value == *v) {
          return Err(invalid(format!("unknown option {v:?}")));
        }
      }
    }
    (
      CriterionConfig::RatingStars { max_stars, allow_half },
      ScoreValue::RatingStars { stars },
    ) => {
      if !stars.is_finite() || *stars < 0.0 || *stars > f64::from(*max_stars) {
        return Err(invalid(format!(
          "stars {stars} outside [0, {max_stars}]"
        )));
      }
      let steps = stars * 2.0;
      if *allow_half {
        if steps.fract() != 0.0 {
          return Err(invalid(format!(
            "stars {stars} is not a half-star increment"
          )));
        }
      } else if stars.fract() != 0.0 {
        return Err(invalid(format!(
          "half stars are not allowed: {stars}"
        )));
      }
    }
    (CriterionConfig::Percentage { .. }, ScoreValue::Percentage { value }) => {
      if !value.is_finite() {
        return Err(invalid(format!("percentage {value} is not finite")));
      }
    }
    // pass_fail and text accept any well-typed value.
    (CriterionConfig::PassFail { .. }, ScoreValue::PassFail { .. })
    | (CriterionConfig::Text {}, ScoreValue::Text { .. }) => {}
    // Discriminants already matched above; any other pairing is unreachable.
    _ => unreachable!("discriminant mismatch slipped past the tag check"),
  }

  Ok(())
}
