//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Polymorphic payloads
//! (criterion config, score value) are stored as a discriminant column
//! plus a JSON payload column; composite structures (settings,
//! snapshots, auto-fail id lists) are stored as compact JSON. UUIDs are
//! stored as hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use rubric_core::{
  aggregate::{PassStatus, ScoringMethod},
  criterion::{Criterion, CriterionConfig, ScoreValue},
  score::Score,
  session::{AuditEntry, Session, SessionAction, SessionStatus},
  template::{
    CriteriaGroup, Template, TemplateSettings, TemplateSnapshot,
    TemplateStatus, TemplateVersion,
  },
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_dt_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── ScoringMethod ───────────────────────────────────────────────────────────

pub fn encode_scoring_method(m: ScoringMethod) -> &'static str {
  match m {
    ScoringMethod::Weighted => "weighted",
    ScoringMethod::SimpleAverage => "simple_average",
    ScoringMethod::PassFail => "pass_fail",
    ScoringMethod::Points => "points",
    ScoringMethod::CustomFormula => "custom_formula",
  }
}

pub fn decode_scoring_method(s: &str) -> Result<ScoringMethod> {
  match s {
    "weighted" => Ok(ScoringMethod::Weighted),
    "simple_average" => Ok(ScoringMethod::SimpleAverage),
    "pass_fail" => Ok(ScoringMethod::PassFail),
    "points" => Ok(ScoringMethod::Points),
    "custom_formula" => Ok(ScoringMethod::CustomFormula),
    other => Err(Error::Decode(format!("unknown scoring method: {other:?}"))),
  }
}

// ─── TemplateStatus ──────────────────────────────────────────────────────────

pub fn encode_template_status(s: TemplateStatus) -> &'static str {
  match s {
    TemplateStatus::Draft => "draft",
    TemplateStatus::Active => "active",
    TemplateStatus::Archived => "archived",
  }
}

pub fn decode_template_status(s: &str) -> Result<TemplateStatus> {
  match s {
    "draft" => Ok(TemplateStatus::Draft),
    "active" => Ok(TemplateStatus::Active),
    "archived" => Ok(TemplateStatus::Archived),
    other => Err(Error::Decode(format!("unknown template status: {other:?}"))),
  }
}

// ─── SessionStatus ───────────────────────────────────────────────────────────

pub fn encode_session_status(s: SessionStatus) -> &'static str {
  match s {
    SessionStatus::Pending => "pending",
    SessionStatus::InProgress => "in_progress",
    SessionStatus::Completed => "completed",
    SessionStatus::Reviewed => "reviewed",
    SessionStatus::Disputed => "disputed",
    SessionStatus::Cancelled => "cancelled",
  }
}

pub fn decode_session_status(s: &str) -> Result<SessionStatus> {
  match s {
    "pending" => Ok(SessionStatus::Pending),
    "in_progress" => Ok(SessionStatus::InProgress),
    "completed" => Ok(SessionStatus::Completed),
    "reviewed" => Ok(SessionStatus::Reviewed),
    "disputed" => Ok(SessionStatus::Disputed),
    "cancelled" => Ok(SessionStatus::Cancelled),
    other => Err(Error::Decode(format!("unknown session status: {other:?}"))),
  }
}

// ─── PassStatus ──────────────────────────────────────────────────────────────

pub fn encode_pass_status(s: PassStatus) -> &'static str {
  match s {
    PassStatus::Pass => "pass",
    PassStatus::Fail => "fail",
    PassStatus::Pending => "pending",
  }
}

pub fn decode_pass_status(s: &str) -> Result<PassStatus> {
  match s {
    "pass" => Ok(PassStatus::Pass),
    "fail" => Ok(PassStatus::Fail),
    "pending" => Ok(PassStatus::Pending),
    other => Err(Error::Decode(format!("unknown pass status: {other:?}"))),
  }
}

// ─── SessionAction ───────────────────────────────────────────────────────────

pub fn encode_session_action(a: SessionAction) -> &'static str {
  match a {
    SessionAction::SubmitScores => "submit_scores",
    SessionAction::Complete => "complete",
    SessionAction::Review => "review",
    SessionAction::Dispute => "dispute",
    SessionAction::Resolve => "resolve",
    SessionAction::Cancel => "cancel",
    SessionAction::Reopen => "reopen",
  }
}

pub fn decode_session_action(s: &str) -> Result<SessionAction> {
  match s {
    "submit_scores" => Ok(SessionAction::SubmitScores),
    "complete" => Ok(SessionAction::Complete),
    "review" => Ok(SessionAction::Review),
    "dispute" => Ok(SessionAction::Dispute),
    "resolve" => Ok(SessionAction::Resolve),
    "cancel" => Ok(SessionAction::Cancel),
    "reopen" => Ok(SessionAction::Reopen),
    other => Err(Error::Decode(format!("unknown session action: {other:?}"))),
  }
}

// ─── JSON blobs ──────────────────────────────────────────────────────────────

pub fn encode_settings(s: &TemplateSettings) -> Result<String> {
  Ok(serde_json::to_string(s)?)
}

pub fn decode_settings(s: &str) -> Result<TemplateSettings> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_snapshot(s: &TemplateSnapshot) -> Result<String> {
  Ok(serde_json::to_string(s)?)
}

pub fn decode_snapshot(s: &str) -> Result<TemplateSnapshot> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_uuid_list(ids: &[Uuid]) -> Result<String> {
  Ok(serde_json::to_string(ids)?)
}

pub fn decode_uuid_list(s: &str) -> Result<Vec<Uuid>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `templates` row.
pub struct RawTemplate {
  pub template_id:     String,
  pub name:            String,
  pub description:     Option<String>,
  pub scoring_method:  String,
  pub pass_threshold:  f64,
  pub max_total_score: f64,
  pub settings_json:   String,
  pub status:          String,
  pub version:         i64,
  pub created_at:      String,
  pub activated_at:    Option<String>,
}

impl RawTemplate {
  pub fn into_template(self) -> Result<Template> {
    Ok(Template {
      template_id:     decode_uuid(&self.template_id)?,
      name:            self.name,
      description:     self.description,
      scoring_method:  decode_scoring_method(&self.scoring_method)?,
      pass_threshold:  self.pass_threshold,
      max_total_score: self.max_total_score,
      settings:        decode_settings(&self.settings_json)?,
      status:          decode_template_status(&self.status)?,
      version:         self.version as u32,
      created_at:      decode_dt(&self.created_at)?,
      activated_at:    decode_dt_opt(self.activated_at.as_deref())?,
    })
  }
}

/// Raw strings read directly from a `criteria_groups` row.
pub struct RawGroup {
  pub group_id:   String,
  pub name:       String,
  pub weight:     Option<f64>,
  pub sort_order: i64,
}

impl RawGroup {
  pub fn into_group(self) -> Result<CriteriaGroup> {
    Ok(CriteriaGroup {
      group_id:   decode_uuid(&self.group_id)?,
      name:       self.name,
      weight:     self.weight,
      sort_order: self.sort_order,
    })
  }
}

/// Raw strings read directly from a `criteria` row.
pub struct RawCriterion {
  pub criteria_id:         String,
  pub group_id:            Option<String>,
  pub name:                String,
  pub description:         Option<String>,
  pub criteria_type:       String,
  pub config_json:         String,
  pub weight:              f64,
  pub max_score:           f64,
  pub is_required:         bool,
  pub is_auto_fail:        bool,
  pub auto_fail_threshold: Option<f64>,
  pub sort_order:          i64,
}

impl RawCriterion {
  pub fn into_criterion(self) -> Result<Criterion> {
    let config_json: serde_json::Value =
      serde_json::from_str(&self.config_json)?;
    let config =
      CriterionConfig::from_parts(&self.criteria_type, config_json)?;

    Ok(Criterion {
      criteria_id: decode_uuid(&self.criteria_id)?,
      group_id: self.group_id.as_deref().map(decode_uuid).transpose()?,
      name: self.name,
      description: self.description,
      config,
      weight: self.weight,
      max_score: self.max_score,
      is_required: self.is_required,
      is_auto_fail: self.is_auto_fail,
      auto_fail_threshold: self.auto_fail_threshold,
      sort_order: self.sort_order,
    })
  }
}

/// Raw strings read directly from a `template_versions` row.
pub struct RawTemplateVersion {
  pub template_id:    String,
  pub version_number: i64,
  pub snapshot_json:  String,
  pub change_summary: Option<String>,
  pub created_at:     String,
}

impl RawTemplateVersion {
  pub fn into_version(self) -> Result<TemplateVersion> {
    Ok(TemplateVersion {
      template_id:    decode_uuid(&self.template_id)?,
      version_number: self.version_number as u32,
      snapshot:       decode_snapshot(&self.snapshot_json)?,
      change_summary: self.change_summary,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `sessions` row.
pub struct RawSession {
  pub session_id:         String,
  pub template_id:        String,
  pub template_version:   i64,
  pub snapshot_json:      String,
  pub status:             String,
  pub total_score:        Option<f64>,
  pub total_possible:     Option<f64>,
  pub percentage_score:   Option<f64>,
  pub pass_status:        String,
  pub has_auto_fail:      bool,
  pub auto_fail_ids_json: String,
  pub created_at:         String,
  pub completed_at:       Option<String>,
  pub reviewed_by:        Option<String>,
  pub reviewed_at:        Option<String>,
  pub review_notes:       Option<String>,
  pub dispute_reason:     Option<String>,
  pub disputed_at:        Option<String>,
  pub dispute_resolution: Option<String>,
}

impl RawSession {
  pub fn into_session(self) -> Result<Session> {
    Ok(Session {
      session_id:             decode_uuid(&self.session_id)?,
      template_id:            decode_uuid(&self.template_id)?,
      template_version:       self.template_version as u32,
      snapshot:               decode_snapshot(&self.snapshot_json)?,
      status:                 decode_session_status(&self.status)?,
      total_score:            self.total_score,
      total_possible:         self.total_possible,
      percentage_score:       self.percentage_score,
      pass_status:            decode_pass_status(&self.pass_status)?,
      has_auto_fail:          self.has_auto_fail,
      auto_fail_criteria_ids: decode_uuid_list(&self.auto_fail_ids_json)?,
      created_at:             decode_dt(&self.created_at)?,
      completed_at:           decode_dt_opt(self.completed_at.as_deref())?,
      reviewed_by:            self.reviewed_by,
      reviewed_at:            decode_dt_opt(self.reviewed_at.as_deref())?,
      review_notes:           self.review_notes,
      dispute_reason:         self.dispute_reason,
      disputed_at:            decode_dt_opt(self.disputed_at.as_deref())?,
      dispute_resolution:     self.dispute_resolution,
    })
  }
}

/// Raw strings read directly from a `scores` row.
pub struct RawScore {
  pub score_id:               String,
  pub session_id:             String,
  pub criteria_id:            String,
  pub value_type:             Option<String>,
  pub value_json:             Option<String>,
  pub is_na:                  bool,
  pub raw_score:              Option<f64>,
  pub normalized_score:       Option<f64>,
  pub weighted_score:         Option<f64>,
  pub is_auto_fail_triggered: bool,
  pub comment:                Option<String>,
  pub criteria_snapshot_json: String,
  pub recorded_at:            String,
}

impl RawScore {
  pub fn into_score(self) -> Result<Score> {
    let value = match (self.value_type.as_deref(), self.value_json.as_deref())
    {
      (Some(ty), Some(json)) => {
        let payload: serde_json::Value = serde_json::from_str(json)?;
        Some(ScoreValue::from_parts(ty, payload)?)
      }
      _ => None,
    };

    Ok(Score {
      score_id: decode_uuid(&self.score_id)?,
      session_id: decode_uuid(&self.session_id)?,
      criteria_id: decode_uuid(&self.criteria_id)?,
      value,
      is_na: self.is_na,
      raw_score: self.raw_score,
      normalized_score: self.normalized_score,
      weighted_score: self.weighted_score,
      is_auto_fail_triggered: self.is_auto_fail_triggered,
      comment: self.comment,
      criteria_snapshot: serde_json::from_str(&self.criteria_snapshot_json)?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw strings read directly from a `session_audit` row.
pub struct RawAudit {
  pub audit_id:    String,
  pub session_id:  String,
  pub action:      String,
  pub actor:       Option<String>,
  pub note:        Option<String>,
  pub recorded_at: String,
}

impl RawAudit {
  pub fn into_entry(self) -> Result<AuditEntry> {
    Ok(AuditEntry {
      audit_id:    decode_uuid(&self.audit_id)?,
      session_id:  decode_uuid(&self.session_id)?,
      action:      decode_session_action(&self.action)?,
      actor:       self.actor,
      note:        self.note,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
