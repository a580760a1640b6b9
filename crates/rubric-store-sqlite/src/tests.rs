//! Integration tests for `SqliteStore` against an in-memory database.

use rubric_core::{
  aggregate::{PassStatus, ScoringMethod},
  criterion::{Criterion, CriterionConfig, ScoreValue},
  error::Error as CoreError,
  score::NewScore,
  session::{SessionAction, SessionStatus},
  store::{EvaluationStore, SessionFilter},
  template::{NewTemplate, TemplateSettings, TemplateStatus},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn percentage_criterion(name: &str, weight: f64) -> Criterion {
  Criterion {
    criteria_id:         Uuid::new_v4(),
    group_id:            None,
    name:                name.into(),
    description:         None,
    config:              CriterionConfig::Percentage { thresholds: None },
    weight,
    max_score:           100.0,
    is_required:         false,
    is_auto_fail:        false,
    auto_fail_threshold: None,
    sort_order:          0,
  }
}

fn scale_criterion(name: &str, max: f64) -> Criterion {
  Criterion {
    criteria_id:         Uuid::new_v4(),
    group_id:            None,
    name:                name.into(),
    description:         None,
    config:              CriterionConfig::Scale { min: 0.0, max, step: 1.0 },
    weight:              1.0,
    max_score:           max,
    is_required:         false,
    is_auto_fail:        false,
    auto_fail_threshold: None,
    sort_order:          0,
  }
}

fn weighted_template(criteria: Vec<Criterion>) -> NewTemplate {
  NewTemplate {
    name:            "Call quality".into(),
    description:     Some("Outbound call QA rubric".into()),
    scoring_method:  ScoringMethod::Weighted,
    pass_threshold:  70.0,
    max_total_score: 100.0,
    settings:        TemplateSettings::default(),
    groups:          vec![],
    criteria,
  }
}

fn pct(criteria_id: Uuid, value: f64) -> NewScore {
  NewScore {
    criteria_id,
    value: Some(ScoreValue::Percentage { value }),
    is_na: false,
    comment: None,
  }
}

fn na(criteria_id: Uuid) -> NewScore {
  NewScore { criteria_id, value: None, is_na: true, comment: None }
}

fn approx(a: f64, b: f64) {
  assert!((a - b).abs() < 1e-9, "{a} != {b}");
}

// ─── Templates ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_template_starts_as_draft() {
  let s = store().await;

  let template = s
    .create_template(weighted_template(vec![percentage_criterion("c1", 1.0)]))
    .await
    .unwrap();
  assert_eq!(template.status, TemplateStatus::Draft);
  assert_eq!(template.version, 0);
  assert!(template.activated_at.is_none());

  let fetched = s.get_template(template.template_id).await.unwrap().unwrap();
  assert_eq!(fetched.template_id, template.template_id);
  assert_eq!(fetched.name, "Call quality");
  assert_eq!(fetched.scoring_method, ScoringMethod::Weighted);
  approx(fetched.pass_threshold, 70.0);
}

#[tokio::test]
async fn get_template_missing_returns_none() {
  let s = store().await;
  assert!(s.get_template(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn publish_allocates_sequential_versions() {
  let s = store().await;
  let template = s
    .create_template(weighted_template(vec![percentage_criterion("c1", 1.0)]))
    .await
    .unwrap();

  let v1 = s
    .publish_template(template.template_id, Some("initial".into()))
    .await
    .unwrap();
  let v2 = s.publish_template(template.template_id, None).await.unwrap();
  let v3 = s.publish_template(template.template_id, None).await.unwrap();

  assert_eq!(v1.version_number, 1);
  assert_eq!(v2.version_number, 2);
  assert_eq!(v3.version_number, 3);

  let versions = s.list_template_versions(template.template_id).await.unwrap();
  assert_eq!(
    versions.iter().map(|v| v.version_number).collect::<Vec<_>>(),
    vec![1, 2, 3]
  );
  assert_eq!(versions[0].change_summary.as_deref(), Some("initial"));

  let fetched = s.get_template(template.template_id).await.unwrap().unwrap();
  assert_eq!(fetched.version, 3);
  assert_eq!(fetched.status, TemplateStatus::Active);
  assert!(fetched.activated_at.is_some());
}

#[tokio::test]
async fn publish_losing_the_version_race_conflicts() {
  let s = store().await;
  let template = s
    .create_template(weighted_template(vec![percentage_criterion("c1", 1.0)]))
    .await
    .unwrap();
  s.publish_template(template.template_id, None).await.unwrap();

  // Plant the version row a concurrent publisher would have committed
  // between this publisher's template read and its insert.
  let id_str = template.template_id.to_string();
  s.raw_connection()
    .call(move |conn| {
      conn.execute(
        "INSERT INTO template_versions
           (template_id, version_number, snapshot_json, change_summary, created_at)
         VALUES (?1, 2, '{}', NULL, '2026-01-01T00:00:00Z')",
        rusqlite::params![id_str],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let err =
    s.publish_template(template.template_id, None).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::Conflict(_))));
}

#[tokio::test]
async fn publish_missing_template_errors() {
  let s = store().await;
  let err = s.publish_template(Uuid::new_v4(), None).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::TemplateNotFound(_))));
}

#[tokio::test]
async fn get_template_version_roundtrips_snapshot() {
  let s = store().await;
  let c1 = percentage_criterion("greeting", 2.0);
  let template = s
    .create_template(weighted_template(vec![c1.clone()]))
    .await
    .unwrap();
  s.publish_template(template.template_id, None).await.unwrap();

  let version = s
    .get_template_version(template.template_id, 1)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(version.snapshot.criteria.len(), 1);
  assert_eq!(version.snapshot.criteria[0].criteria_id, c1.criteria_id);
  approx(version.snapshot.criteria[0].weight, 2.0);

  assert!(
    s.get_template_version(template.template_id, 99)
      .await
      .unwrap()
      .is_none()
  );
}

// ─── Snapshot immutability ───────────────────────────────────────────────────

#[tokio::test]
async fn editing_template_does_not_touch_existing_sessions() {
  let s = store().await;
  let old_criterion = percentage_criterion("old", 1.0);
  let template = s
    .create_template(weighted_template(vec![old_criterion.clone()]))
    .await
    .unwrap();
  s.publish_template(template.template_id, None).await.unwrap();

  let session_a = s.create_session(template.template_id).await.unwrap();

  // Edit the live criteria, then publish v2.
  let new_criterion = percentage_criterion("new", 3.0);
  s.update_template_criteria(
    template.template_id,
    vec![],
    vec![new_criterion.clone()],
  )
  .await
  .unwrap();
  s.publish_template(template.template_id, Some("reworked".into()))
    .await
    .unwrap();

  // Session A still sees the version-1 snapshot.
  let reloaded = s.get_session(session_a.session_id).await.unwrap().unwrap();
  assert_eq!(reloaded.template_version, 1);
  assert_eq!(reloaded.snapshot.criteria.len(), 1);
  assert_eq!(
    reloaded.snapshot.criteria[0].criteria_id,
    old_criterion.criteria_id
  );

  // A fresh session binds to version 2.
  let session_b = s.create_session(template.template_id).await.unwrap();
  assert_eq!(session_b.template_version, 2);
  assert_eq!(
    session_b.snapshot.criteria[0].criteria_id,
    new_criterion.criteria_id
  );
}

#[tokio::test]
async fn create_session_requires_published_version() {
  let s = store().await;
  let template = s
    .create_template(weighted_template(vec![percentage_criterion("c1", 1.0)]))
    .await
    .unwrap();

  let err = s.create_session(template.template_id).await.unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::TemplateNotPublished(_))));
}

// ─── Sessions ────────────────────────────────────────────────────────────────

async fn published_session(
  s: &SqliteStore,
  criteria: Vec<Criterion>,
) -> rubric_core::session::Session {
  published_session_with(s, criteria, TemplateSettings::default()).await
}

async fn published_session_with(
  s: &SqliteStore,
  criteria: Vec<Criterion>,
  settings: TemplateSettings,
) -> rubric_core::session::Session {
  let mut input = weighted_template(criteria);
  input.settings = settings;
  let template = s.create_template(input).await.unwrap();
  s.publish_template(template.template_id, None).await.unwrap();
  s.create_session(template.template_id).await.unwrap()
}

#[tokio::test]
async fn new_session_is_pending_with_no_aggregates() {
  let s = store().await;
  let session =
    published_session(&s, vec![percentage_criterion("c1", 1.0)]).await;

  assert_eq!(session.status, SessionStatus::Pending);
  assert_eq!(session.pass_status, PassStatus::Pending);
  assert!(session.total_score.is_none());
  assert!(session.completed_at.is_none());
}

#[tokio::test]
async fn list_sessions_filters_by_status() {
  let s = store().await;
  let c = percentage_criterion("c1", 1.0);
  let template = s
    .create_template(weighted_template(vec![c.clone()]))
    .await
    .unwrap();
  s.publish_template(template.template_id, None).await.unwrap();

  let a = s.create_session(template.template_id).await.unwrap();
  s.create_session(template.template_id).await.unwrap();
  s.cancel_session(a.session_id, None).await.unwrap();

  let all = s
    .list_sessions(&SessionFilter {
      template_id: Some(template.template_id),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(all.len(), 2);

  let cancelled = s
    .list_sessions(&SessionFilter {
      status: Some(SessionStatus::Cancelled),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(cancelled.len(), 1);
  assert_eq!(cancelled[0].session_id, a.session_id);
}

#[tokio::test]
async fn list_sessions_caps_unlimited_queries() {
  let s = store().await;
  let template = s
    .create_template(weighted_template(vec![percentage_criterion("c1", 1.0)]))
    .await
    .unwrap();
  s.publish_template(template.template_id, None).await.unwrap();
  for _ in 0..101 {
    s.create_session(template.template_id).await.unwrap();
  }

  // No explicit limit: the default cap of 100 rows applies.
  let capped = s.list_sessions(&SessionFilter::default()).await.unwrap();
  assert_eq!(capped.len(), 100);

  let all = s
    .list_sessions(&SessionFilter {
      limit: Some(200),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(all.len(), 101);
}

// ─── Score submission ────────────────────────────────────────────────────────

#[tokio::test]
async fn submit_scores_computes_derived_fields() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 2.0);
  let session = published_session(&s, vec![c1.clone()]).await;

  let result = s
    .submit_scores(
      session.session_id,
      vec![pct(c1.criteria_id, 80.0)],
      Some("grader-1".into()),
    )
    .await
    .unwrap();
  assert_eq!(result.accepted.len(), 1);
  assert!(result.rejected.is_empty());

  let scores = s.get_scores(session.session_id).await.unwrap();
  assert_eq!(scores.len(), 1);
  approx(scores[0].raw_score.unwrap(), 80.0);
  approx(scores[0].normalized_score.unwrap(), 80.0);
  approx(scores[0].weighted_score.unwrap(), 1.6);

  // First submission moves pending -> in_progress.
  let reloaded = s.get_session(session.session_id).await.unwrap().unwrap();
  assert_eq!(reloaded.status, SessionStatus::InProgress);
}

#[tokio::test]
async fn resubmission_upserts_last_write_wins() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let session = published_session(&s, vec![c1.clone()]).await;

  s.submit_scores(session.session_id, vec![pct(c1.criteria_id, 40.0)], None)
    .await
    .unwrap();
  s.submit_scores(session.session_id, vec![pct(c1.criteria_id, 90.0)], None)
    .await
    .unwrap();

  let scores = s.get_scores(session.session_id).await.unwrap();
  assert_eq!(scores.len(), 1);
  approx(scores[0].normalized_score.unwrap(), 90.0);
}

#[tokio::test]
async fn invalid_value_is_rejected_per_entry() {
  let s = store().await;
  let c1 = scale_criterion("c1", 10.0);
  let c2 = scale_criterion("c2", 10.0);
  let settings = TemplateSettings {
    allow_partial_submission: true,
    ..Default::default()
  };
  let session =
    published_session_with(&s, vec![c1.clone(), c2.clone()], settings).await;

  let result = s
    .submit_scores(
      session.session_id,
      vec![
        NewScore {
          criteria_id: c1.criteria_id,
          value:       Some(ScoreValue::Scale { value: 7.0 }),
          is_na:       false,
          comment:     None,
        },
        // Out of range: rejected without aborting the batch.
        NewScore {
          criteria_id: c2.criteria_id,
          value:       Some(ScoreValue::Scale { value: 42.0 }),
          is_na:       false,
          comment:     None,
        },
      ],
      None,
    )
    .await
    .unwrap();

  assert_eq!(result.accepted.len(), 1);
  assert_eq!(result.rejected.len(), 1);
  assert_eq!(result.rejected[0].criteria_id, c2.criteria_id);

  let scores = s.get_scores(session.session_id).await.unwrap();
  assert_eq!(scores.len(), 1);
  assert_eq!(scores[0].criteria_id, c1.criteria_id);
}

#[tokio::test]
async fn unknown_criterion_is_rejected() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let session = published_session(&s, vec![c1.clone()]).await;

  let ghost = Uuid::new_v4();
  let result = s
    .submit_scores(
      session.session_id,
      vec![pct(c1.criteria_id, 50.0), pct(ghost, 50.0)],
      None,
    )
    .await
    .unwrap();

  assert_eq!(result.accepted.len(), 1);
  assert_eq!(result.rejected.len(), 1);
  assert_eq!(result.rejected[0].criteria_id, ghost);
}

#[tokio::test]
async fn partial_submission_rejected_when_disallowed() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let c2 = percentage_criterion("c2", 1.0);
  let session = published_session(&s, vec![c1.clone(), c2.clone()]).await;

  let err = s
    .submit_scores(session.session_id, vec![pct(c1.criteria_id, 80.0)], None)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(CoreError::PartialSubmission(ref missing))
      if missing == &vec![c2.criteria_id]
  ));

  // Nothing was persisted.
  assert!(s.get_scores(session.session_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn partial_submission_allowed_when_enabled() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let c2 = percentage_criterion("c2", 1.0);
  let settings = TemplateSettings {
    allow_partial_submission: true,
    ..Default::default()
  };
  let session =
    published_session_with(&s, vec![c1.clone(), c2.clone()], settings).await;

  s.submit_scores(session.session_id, vec![pct(c1.criteria_id, 80.0)], None)
    .await
    .unwrap();
  s.submit_scores(session.session_id, vec![pct(c2.criteria_id, 60.0)], None)
    .await
    .unwrap();

  assert_eq!(s.get_scores(session.session_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn na_requires_template_opt_in() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let session = published_session(&s, vec![c1.clone()]).await;

  let result = s
    .submit_scores(session.session_id, vec![na(c1.criteria_id)], None)
    .await
    .unwrap();
  assert!(result.accepted.is_empty());
  assert_eq!(result.rejected.len(), 1);
}

#[tokio::test]
async fn all_rejected_batch_leaves_session_untouched() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let session = published_session(&s, vec![c1.clone()]).await;

  let result = s
    .submit_scores(session.session_id, vec![na(c1.criteria_id)], None)
    .await
    .unwrap();
  assert!(result.accepted.is_empty());
  assert_eq!(result.rejected.len(), 1);

  // Nothing persisted: no rows, no pending -> in_progress move, no
  // audit entry.
  let reloaded = s.get_session(session.session_id).await.unwrap().unwrap();
  assert_eq!(reloaded.status, SessionStatus::Pending);
  assert!(s.get_scores(session.session_id).await.unwrap().is_empty());
  assert!(s.get_audit_log(session.session_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn na_scores_are_excluded_from_aggregation() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let c2 = percentage_criterion("c2", 1.0);
  let settings = TemplateSettings { allow_na: true, ..Default::default() };
  let session =
    published_session_with(&s, vec![c1.clone(), c2.clone()], settings).await;

  s.submit_scores(
    session.session_id,
    vec![pct(c1.criteria_id, 80.0), na(c2.criteria_id)],
    None,
  )
  .await
  .unwrap();

  let completed =
    s.complete_session(session.session_id, None, None).await.unwrap();
  // Only c1 counts: 0.8 / 1.0 = 80%.
  approx(completed.percentage_score.unwrap(), 80.0);
  assert_eq!(completed.pass_status, PassStatus::Pass);
}

#[tokio::test]
async fn submit_to_cancelled_session_is_state_error() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let session = published_session(&s, vec![c1.clone()]).await;
  s.cancel_session(session.session_id, None).await.unwrap();

  let err = s
    .submit_scores(session.session_id, vec![pct(c1.criteria_id, 50.0)], None)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(CoreError::IllegalTransition {
      from: SessionStatus::Cancelled,
      action: SessionAction::SubmitScores,
    })
  ));
}

#[tokio::test]
async fn submit_racing_a_complete_conflicts_and_persists_nothing() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let session = published_session(&s, vec![c1.clone()]).await;
  s.submit_scores(session.session_id, vec![pct(c1.criteria_id, 80.0)], None)
    .await
    .unwrap();

  // Hold the resubmission open just before its write transaction,
  // complete the session in the gap, then let it resume.
  let (reached, resume) = s.arm_write_gate().await;
  let racer = s.clone();
  let session_id = session.session_id;
  let criteria_id = c1.criteria_id;
  let handle = tokio::spawn(async move {
    racer
      .submit_scores(session_id, vec![pct(criteria_id, 10.0)], None)
      .await
  });
  reached.await.unwrap();

  s.complete_session(session_id, None, None).await.unwrap();
  resume.send(()).unwrap();

  let err = handle.await.unwrap().unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::Conflict(_))));

  // The completed session keeps the score its aggregate was built from.
  let scores = s.get_scores(session_id).await.unwrap();
  assert_eq!(scores.len(), 1);
  approx(scores[0].normalized_score.unwrap(), 80.0);
}

// ─── Completion ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn complete_writes_aggregates_and_pass_status() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let c2 = percentage_criterion("c2", 1.0);
  let session = published_session(&s, vec![c1.clone(), c2.clone()]).await;

  s.submit_scores(
    session.session_id,
    vec![pct(c1.criteria_id, 80.0), pct(c2.criteria_id, 60.0)],
    None,
  )
  .await
  .unwrap();

  let completed = s
    .complete_session(session.session_id, Some("grader-1".into()), None)
    .await
    .unwrap();

  assert_eq!(completed.status, SessionStatus::Completed);
  approx(completed.total_score.unwrap(), 1.4);
  approx(completed.total_possible.unwrap(), 2.0);
  approx(completed.percentage_score.unwrap(), 70.0);
  // Inclusive threshold: exactly 70 passes.
  assert_eq!(completed.pass_status, PassStatus::Pass);
  assert!(completed.completed_at.is_some());
}

#[tokio::test]
async fn complete_requires_required_criteria_scored() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let mut c2 = percentage_criterion("c2", 1.0);
  c2.is_required = true;
  let settings = TemplateSettings {
    allow_partial_submission: true,
    ..Default::default()
  };
  let session =
    published_session_with(&s, vec![c1.clone(), c2.clone()], settings).await;

  s.submit_scores(session.session_id, vec![pct(c1.criteria_id, 90.0)], None)
    .await
    .unwrap();

  let err = s
    .complete_session(session.session_id, None, None)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(CoreError::MissingRequiredScores(ref missing))
      if missing == &vec![c2.criteria_id]
  ));
}

#[tokio::test]
async fn double_complete_is_illegal() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let session = published_session(&s, vec![c1.clone()]).await;

  s.submit_scores(session.session_id, vec![pct(c1.criteria_id, 80.0)], None)
    .await
    .unwrap();
  s.complete_session(session.session_id, None, None).await.unwrap();

  let err = s
    .complete_session(session.session_id, None, None)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(CoreError::IllegalTransition {
      from: SessionStatus::Completed,
      action: SessionAction::Complete,
    })
  ));
}

#[tokio::test]
async fn concurrent_completes_serialize_to_one_winner() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let session = published_session(&s, vec![c1.clone()]).await;
  s.submit_scores(session.session_id, vec![pct(c1.criteria_id, 80.0)], None)
    .await
    .unwrap();

  // Both completions pass the transition check; the one held at the
  // gate finds zero matching rows once the other has committed.
  let (reached, resume) = s.arm_write_gate().await;
  let racer = s.clone();
  let session_id = session.session_id;
  let handle = tokio::spawn(async move {
    racer.complete_session(session_id, None, None).await
  });
  reached.await.unwrap();

  s.complete_session(session_id, None, None).await.unwrap();
  resume.send(()).unwrap();

  let err = handle.await.unwrap().unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::Conflict(_))));

  let reloaded = s.get_session(session_id).await.unwrap().unwrap();
  assert_eq!(reloaded.status, SessionStatus::Completed);
  approx(reloaded.percentage_score.unwrap(), 80.0);

  // Only the winner left an audit record.
  let log = s.get_audit_log(session_id).await.unwrap();
  let completes = log
    .iter()
    .filter(|e| e.action == SessionAction::Complete)
    .count();
  assert_eq!(completes, 1);
}

#[tokio::test]
async fn auto_fail_persists_through_completion() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let mut c2 = percentage_criterion("c2", 1.0);
  c2.is_auto_fail = true;
  c2.auto_fail_threshold = Some(50.0);
  let session = published_session(&s, vec![c1.clone(), c2.clone()]).await;

  s.submit_scores(
    session.session_id,
    vec![pct(c1.criteria_id, 100.0), pct(c2.criteria_id, 25.0)],
    None,
  )
  .await
  .unwrap();

  let scores = s.get_scores(session.session_id).await.unwrap();
  let triggered = scores
    .iter()
    .find(|sc| sc.criteria_id == c2.criteria_id)
    .unwrap();
  assert!(triggered.is_auto_fail_triggered);

  let completed =
    s.complete_session(session.session_id, None, None).await.unwrap();
  assert!(completed.has_auto_fail);
  assert_eq!(completed.auto_fail_criteria_ids, vec![c2.criteria_id]);
  assert_eq!(completed.pass_status, PassStatus::Fail);
}

// ─── Review, dispute, reopen ─────────────────────────────────────────────────

async fn completed_session(s: &SqliteStore) -> rubric_core::session::Session {
  let c1 = percentage_criterion("c1", 1.0);
  let session = published_session(s, vec![c1.clone()]).await;
  s.submit_scores(session.session_id, vec![pct(c1.criteria_id, 80.0)], None)
    .await
    .unwrap();
  s.complete_session(session.session_id, None, None).await.unwrap()
}

#[tokio::test]
async fn review_dispute_resolve_flow() {
  let s = store().await;
  let session = completed_session(&s).await;

  let reviewed = s
    .review_session(
      session.session_id,
      "supervisor-1".into(),
      Some("spot-checked".into()),
    )
    .await
    .unwrap();
  assert_eq!(reviewed.status, SessionStatus::Reviewed);
  assert_eq!(reviewed.reviewed_by.as_deref(), Some("supervisor-1"));
  assert_eq!(reviewed.review_notes.as_deref(), Some("spot-checked"));

  let disputed = s
    .dispute_session(
      session.session_id,
      Some("agent-7".into()),
      "score for greeting is wrong".into(),
    )
    .await
    .unwrap();
  assert_eq!(disputed.status, SessionStatus::Disputed);
  assert!(disputed.disputed_at.is_some());

  let resolved = s
    .resolve_dispute(
      session.session_id,
      Some("supervisor-1".into()),
      "upheld original score".into(),
    )
    .await
    .unwrap();
  assert_eq!(resolved.status, SessionStatus::Reviewed);
  assert_eq!(
    resolved.dispute_resolution.as_deref(),
    Some("upheld original score")
  );
}

#[tokio::test]
async fn reopen_clears_aggregates_but_keeps_scores() {
  let s = store().await;
  let session = completed_session(&s).await;

  let reopened = s
    .reopen_session(session.session_id, Some("supervisor-1".into()))
    .await
    .unwrap();
  assert_eq!(reopened.status, SessionStatus::InProgress);
  assert!(reopened.total_score.is_none());
  assert!(reopened.percentage_score.is_none());
  assert_eq!(reopened.pass_status, PassStatus::Pending);
  assert!(reopened.completed_at.is_none());

  // Individual scores survive the reopen and feed the next completion.
  assert_eq!(s.get_scores(session.session_id).await.unwrap().len(), 1);
  let recompleted =
    s.complete_session(session.session_id, None, None).await.unwrap();
  approx(recompleted.percentage_score.unwrap(), 80.0);
}

#[tokio::test]
async fn cancel_is_terminal() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let session = published_session(&s, vec![c1]).await;

  let cancelled = s.cancel_session(session.session_id, None).await.unwrap();
  assert_eq!(cancelled.status, SessionStatus::Cancelled);

  let err = s
    .cancel_session(session.session_id, None)
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(CoreError::IllegalTransition { .. })
  ));
}

// ─── Audit ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn audit_log_records_transitions_in_order() {
  let s = store().await;
  let c1 = percentage_criterion("c1", 1.0);
  let session = published_session(&s, vec![c1.clone()]).await;

  s.submit_scores(
    session.session_id,
    vec![pct(c1.criteria_id, 80.0)],
    Some("grader-1".into()),
  )
  .await
  .unwrap();
  s.complete_session(session.session_id, Some("grader-1".into()), None)
    .await
    .unwrap();
  s.review_session(session.session_id, "supervisor-1".into(), None)
    .await
    .unwrap();

  let log = s.get_audit_log(session.session_id).await.unwrap();
  assert_eq!(
    log.iter().map(|e| e.action).collect::<Vec<_>>(),
    vec![
      SessionAction::SubmitScores,
      SessionAction::Complete,
      SessionAction::Review,
    ]
  );
  assert_eq!(log[0].actor.as_deref(), Some("grader-1"));
  assert_eq!(log[0].note.as_deref(), Some("1 accepted, 0 rejected"));
}
