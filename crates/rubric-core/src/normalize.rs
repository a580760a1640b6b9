//! The criterion normalizer — converts one raw answer into comparable
//! scores on a common 0–100 scale.
//!
//! [`normalize`] is a pure function: no side effects, deterministic, and
//! total over config-valid inputs. Callers are expected to have run
//! [`crate::criterion::validate_value`] first; normalization still never
//! produces NaN or values outside [0, 100] even on degenerate configs
//! (zero-point checklists, all-zero dropdowns).

use serde::{Deserialize, Serialize};

use crate::{
  Result,
  criterion::{Criterion, CriterionConfig, ScoreValue},
  error::Error,
};

/// The derived scores for one answered criterion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
  /// The answer in its native units (scale value, summed points, stars…).
  pub raw_score:        f64,
  /// The answer on the common 0–100 scale. Always within [0, 100].
  pub normalized_score: f64,
  /// `normalized_score * weight / 100`.
  pub weighted_score:   f64,
}

/// Ratio-to-percentage with a zero-denominator guard. Degenerate configs
/// normalize to 0, never NaN.
fn pct(numerator: f64, denominator: f64) -> f64 {
  if denominator > 0.0 {
    numerator / denominator * 100.0
  } else {
    0.0
  }
}

/// Normalize one raw answer against its criterion.
///
/// Returns [`Error::ValueTypeMismatch`] if the value's tag does not
/// match the criterion's config tag.
pub fn normalize(
  criterion: &Criterion,
  value: &ScoreValue,
) -> Result<CriterionResult> {
  let (raw, normalized) = match (&criterion.config, value) {
    (CriterionConfig::Scale { min, max, .. }, ScoreValue::Scale { value }) => {
      (*value, pct(value - min, max - min))
    }

    (
      CriterionConfig::PassFail { pass_value, fail_value },
      ScoreValue::PassFail { passed },
    ) => {
      let raw = if *passed { *pass_value } else { *fail_value };
      (raw, raw)
    }

    (
      CriterionConfig::Checklist { items, require_all },
      ScoreValue::Checklist { checked },
    ) => {
      let raw: f64 = items
        .iter()
        .filter(|item| checked.contains(&item.id))
        .map(|item| item.points)
        .sum();
      let normalized = if *require_all {
        let all = items.iter().all(|item| checked.contains(&item.id));
        if all { 100.0 } else { 0.0 }
      } else {
        let total: f64 = items.iter().map(|item| item.points).sum();
        pct(raw, total)
      };
      (raw, normalized)
    }

    (CriterionConfig::Dropdown { options }, ScoreValue::Dropdown { selected }) => {
      let raw = options
        .iter()
        .find(|o| o.value == *selected)
        .map(|o| o.score)
        .unwrap_or(0.0);
      let best = options.iter().map(|o| o.score).fold(0.0, f64::max);
      (raw, pct(raw, best))
    }

    (
      CriterionConfig::MultiSelect { options },
      ScoreValue::MultiSelect { selected },
    ) => {
      let raw: f64 = options
        .iter()
        .filter(|o| selected.contains(&o.value))
        .map(|o| o.score)
        .sum();
      let total: f64 = options.iter().map(|o| o.score).sum();
      (raw, pct(raw, total))
    }

    (
      CriterionConfig::RatingStars { max_stars, .. },
      ScoreValue::RatingStars { stars },
    ) => (*stars, pct(*stars, f64::from(*max_stars))),

    (CriterionConfig::Percentage { .. }, ScoreValue::Percentage { value }) => {
      (*value, *value)
    }

    (CriterionConfig::Text {}, ScoreValue::Text { response }) => {
      let raw = if response.trim().is_empty() { 0.0 } else { 100.0 };
      (raw, raw)
    }

    _ => {
      return Err(Error::ValueTypeMismatch {
        criteria_id: criterion.criteria_id,
        expected:    criterion.config.discriminant(),
        got:         value.discriminant(),
      });
    }
  };

  let normalized = normalized.clamp(0.0, 100.0);
  Ok(CriterionResult {
    raw_score:        raw,
    normalized_score: normalized,
    weighted_score:   normalized * criterion.weight / 100.0,
  })
}
