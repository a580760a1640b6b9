//! The session score aggregator — combines normalized criterion results
//! into a session-level verdict under one of five scoring methods, with
//! the auto-fail override applied on top.
//!
//! Pure and deterministic: [`aggregate`] only reads its inputs, so
//! re-running it on the same persisted scores yields identical results.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  criterion::Criterion,
  score::Score,
  template::Template,
};

// ─── Scoring method ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
  /// `Σ weighted_score / Σ weight * 100`. Zero-weight criteria
  /// contribute to neither side.
  Weighted,
  /// Arithmetic mean of normalized scores; weights ignored entirely.
  SimpleAverage,
  /// Every criterion must normalize to 100 for the session to score 100;
  /// otherwise the session scores 0.
  PassFail,
  /// `Σ raw_score / Σ max_score * 100`.
  Points,
  /// Extension point — delegates to an installed [`CustomFormula`],
  /// falling back to `weighted` when none is configured.
  CustomFormula,
}

// ─── Verdict ─────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
  Pass,
  Fail,
  /// Not enough information to judge (no scoreable criteria yet).
  #[default]
  Pending,
}

/// Session-level aggregate result, written at the `complete` transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
  pub total_score:            f64,
  pub total_possible:         f64,
  pub percentage_score:       f64,
  pub pass_status:            PassStatus,
  pub has_auto_fail:          bool,
  pub auto_fail_criteria_ids: Vec<Uuid>,
}

// ─── Custom formula hook ─────────────────────────────────────────────────────

/// One scoreable (non-N/A) criterion joined with its derived scores, as
/// seen by a [`CustomFormula`].
pub struct ScoredRow<'a> {
  pub criterion:        &'a Criterion,
  pub raw_score:        f64,
  pub normalized_score: f64,
  pub weighted_score:   f64,
}

/// Pluggable percentage computation for the `custom_formula` method.
/// The returned value is clamped to [0, 100] by the aggregator.
pub trait CustomFormula: Send + Sync {
  fn percentage(&self, rows: &[ScoredRow<'_>]) -> f64;
}

// ─── Aggregation ─────────────────────────────────────────────────────────────

fn ratio_pct(numerator: f64, denominator: f64) -> f64 {
  if denominator > 0.0 {
    numerator / denominator * 100.0
  } else {
    0.0
  }
}

/// Combine all persisted scores for a session into a session outcome.
///
/// N/A scores are excluded from every method (their weight and
/// max_score do not count toward the denominator). Scores referencing a
/// criterion absent from `criteria` indicate snapshot drift: they are
/// logged loudly and excluded rather than failing the computation.
pub fn aggregate(
  template: &Template,
  criteria: &[Criterion],
  scores: &[Score],
  formula: Option<&dyn CustomFormula>,
) -> SessionOutcome {
  let mut rows: Vec<ScoredRow<'_>> = Vec::with_capacity(scores.len());

  for score in scores {
    if score.is_na {
      continue;
    }
    let Some(criterion) =
      criteria.iter().find(|c| c.criteria_id == score.criteria_id)
    else {
      tracing::error!(
        criteria_id = %score.criteria_id,
        session_id = %score.session_id,
        "score references a criterion absent from the bound snapshot; \
         excluding it from aggregation"
      );
      continue;
    };
    let (Some(raw), Some(normalized), Some(weighted)) =
      (score.raw_score, score.normalized_score, score.weighted_score)
    else {
      continue;
    };
    rows.push(ScoredRow {
      criterion,
      raw_score: raw,
      normalized_score: normalized,
      weighted_score: weighted,
    });
  }

  if rows.is_empty() {
    // All N/A (or nothing scored): not enough information to judge.
    return SessionOutcome {
      total_score:            0.0,
      total_possible:         0.0,
      percentage_score:       0.0,
      pass_status:            PassStatus::Pending,
      has_auto_fail:          false,
      auto_fail_criteria_ids: Vec::new(),
    };
  }

  let weighted_totals = |rows: &[ScoredRow<'_>]| {
    let total: f64 = rows.iter().map(|r| r.weighted_score).sum();
    let possible: f64 = rows.iter().map(|r| r.criterion.weight).sum();
    (total, possible, ratio_pct(total, possible))
  };

  let (total_score, total_possible, percentage_score) =
    match template.scoring_method {
      ScoringMethod::Weighted => weighted_totals(&rows),

      ScoringMethod::SimpleAverage => {
        let sum: f64 = rows.iter().map(|r| r.normalized_score).sum();
        let count = rows.len() as f64;
        (sum, count * 100.0, sum / count)
      }

      ScoringMethod::PassFail => {
        let passing =
          rows.iter().filter(|r| r.normalized_score >= 100.0).count();
        let all_pass = passing == rows.len();
        (
          passing as f64,
          rows.len() as f64,
          if all_pass { 100.0 } else { 0.0 },
        )
      }

      ScoringMethod::Points => {
        let total: f64 = rows.iter().map(|r| r.raw_score).sum();
        let possible: f64 =
          rows.iter().map(|r| r.criterion.max_score).sum();
        (total, possible, ratio_pct(total, possible))
      }

      ScoringMethod::CustomFormula => match formula {
        Some(hook) => {
          let (total, possible, _) = weighted_totals(&rows);
          (total, possible, hook.percentage(&rows).clamp(0.0, 100.0))
        }
        None => weighted_totals(&rows),
      },
    };

  // Auto-fail override: strict inequality, N/A rows already excluded.
  let auto_fail_criteria_ids: Vec<Uuid> = rows
    .iter()
    .filter(|r| r.criterion.is_auto_fail)
    .filter(|r| {
      r.criterion
        .auto_fail_threshold
        .is_some_and(|t| r.normalized_score < t)
    })
    .map(|r| r.criterion.criteria_id)
    .collect();
  let has_auto_fail = !auto_fail_criteria_ids.is_empty();

  let pass_status = if has_auto_fail {
    PassStatus::Fail
  } else if percentage_score >= template.pass_threshold {
    PassStatus::Pass
  } else {
    PassStatus::Fail
  };

  SessionOutcome {
    total_score,
    total_possible,
    percentage_score,
    pass_status,
    has_auto_fail,
    auto_fail_criteria_ids,
  }
}
