//! [`SqliteStore`] — the SQLite implementation of [`EvaluationStore`].
//!
//! Transition serialization uses optimistic status-guarded UPDATEs: a
//! lifecycle write only succeeds if the session row is still in the
//! expected state, so a concurrent writer loses with a conflict error
//! instead of double-committing. Score upserts re-check the session
//! status inside their write transaction, so a submit racing a
//! completion cannot land rows in a completed session. Publish
//! serialization rides on the `(template_id, version_number)` primary
//! key.

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use std::path::Path;
use uuid::Uuid;

use rubric_core::{
  aggregate::{PassStatus, aggregate},
  criterion::{Criterion, validate_value},
  error::Error as CoreError,
  normalize::normalize,
  score::{NewScore, RejectedScore, Score, ScoreSubmission},
  session::{
    AuditEntry, Session, SessionAction, SessionStatus, transition,
  },
  store::{EvaluationStore, SessionFilter},
  template::{
    CriteriaGroup, NewTemplate, Template, TemplateSnapshot, TemplateStatus,
    TemplateVersion,
  },
};

use crate::{
  Error, Result,
  encode::{
    RawAudit, RawCriterion, RawGroup, RawScore, RawSession, RawTemplate,
    RawTemplateVersion, encode_dt, encode_pass_status, encode_scoring_method,
    encode_session_action, encode_session_status, encode_settings,
    encode_snapshot, encode_template_status, encode_uuid, encode_uuid_list,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Rubric evaluation store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:       tokio_rusqlite::Connection,
  #[cfg(test)]
  write_gate: WriteGate,
}

/// Interleaving hook for concurrency tests: when armed, the next
/// lifecycle write parks between its status check and its database
/// write, signals the test, and waits to be released.
#[cfg(test)]
type WriteGate = std::sync::Arc<
  tokio::sync::Mutex<
    Option<(
      tokio::sync::oneshot::Sender<()>,
      tokio::sync::oneshot::Receiver<()>,
    )>,
  >,
>;

/// Row cap for `list_sessions` when the filter carries no explicit
/// limit.
const DEFAULT_LIST_LIMIT: usize = 100;

/// True when an INSERT lost against a uniqueness constraint — used to
/// turn publish/version races into conflict errors.
fn is_constraint_violation(err: &tokio_rusqlite::Error) -> bool {
  matches!(
    err,
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
      if e.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self {
      conn,
      #[cfg(test)]
      write_gate: WriteGate::default(),
    };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self {
      conn,
      #[cfg(test)]
      write_gate: WriteGate::default(),
    };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Internal helpers ──────────────────────────────────────────────────────

  async fn require_session(&self, session_id: Uuid) -> Result<Session> {
    self
      .get_session(session_id)
      .await?
      .ok_or(Error::Core(CoreError::SessionNotFound(session_id)))
  }

  async fn require_template(&self, template_id: Uuid) -> Result<Template> {
    self
      .get_template(template_id)
      .await?
      .ok_or(Error::Core(CoreError::TemplateNotFound(template_id)))
  }

  /// Append one audit entry. Write-only history; failures here are real
  /// errors — a transition without its audit record is not acceptable.
  async fn insert_audit(
    &self,
    session_id: Uuid,
    action: SessionAction,
    actor: Option<String>,
    note: Option<String>,
  ) -> Result<()> {
    let audit_id_str   = encode_uuid(Uuid::new_v4());
    let session_id_str = encode_uuid(session_id);
    let action_str     = encode_session_action(action).to_owned();
    let at_str         = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO session_audit (audit_id, session_id, action, actor, note, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            audit_id_str,
            session_id_str,
            action_str,
            actor,
            note,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a status-guarded session UPDATE. `sql` must contain a
  /// `WHERE session_id = :sid AND status IN (...)` guard and is executed
  /// with the given named params; zero affected rows means a concurrent
  /// writer got there first.
  async fn guarded_update(
    &self,
    sql: &'static str,
    params: Vec<(&'static str, Box<dyn rusqlite::ToSql + Send>)>,
  ) -> Result<usize> {
    let affected = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(sql)?;
        let named: Vec<(&str, &dyn rusqlite::ToSql)> = params
          .iter()
          .map(|(name, value)| (*name, value.as_ref() as &dyn rusqlite::ToSql))
          .collect();
        Ok(stmt.execute(named.as_slice())?)
      })
      .await?;
    Ok(affected)
  }

  /// Arm the interleaving gate: the next lifecycle write on any clone
  /// of this store pauses before touching the database, fires the
  /// returned receiver, and resumes once the returned sender is used.
  #[cfg(test)]
  pub(crate) async fn arm_write_gate(
    &self,
  ) -> (
    tokio::sync::oneshot::Receiver<()>,
    tokio::sync::oneshot::Sender<()>,
  ) {
    let (reached_tx, reached_rx) = tokio::sync::oneshot::channel();
    let (resume_tx, resume_rx) = tokio::sync::oneshot::channel();
    *self.write_gate.lock().await = Some((reached_tx, resume_rx));
    (reached_rx, resume_tx)
  }

  #[cfg(test)]
  async fn pause_at_write_gate(&self) {
    let armed = self.write_gate.lock().await.take();
    if let Some((reached, resume)) = armed {
      let _ = reached.send(());
      let _ = resume.await;
    }
  }

  /// Direct access to the underlying connection, for tests that need to
  /// plant rows a concurrent writer would have committed.
  #[cfg(test)]
  pub(crate) fn raw_connection(&self) -> &tokio_rusqlite::Connection {
    &self.conn
  }

  /// Live (draft-next) groups and criteria for a template, in sort order.
  async fn load_live_criteria(
    &self,
    template_id: Uuid,
  ) -> Result<(Vec<CriteriaGroup>, Vec<Criterion>)> {
    let id_str = encode_uuid(template_id);

    let (raw_groups, raw_criteria): (Vec<RawGroup>, Vec<RawCriterion>) = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT group_id, name, weight, sort_order
           FROM criteria_groups WHERE template_id = ?1 ORDER BY sort_order",
        )?;
        let groups = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawGroup {
              group_id:   row.get(0)?,
              name:       row.get(1)?,
              weight:     row.get(2)?,
              sort_order: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
          "SELECT criteria_id, group_id, name, description, criteria_type,
                  config_json, weight, max_score, is_required, is_auto_fail,
                  auto_fail_threshold, sort_order
           FROM criteria WHERE template_id = ?1 ORDER BY sort_order",
        )?;
        let criteria = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawCriterion {
              criteria_id:         row.get(0)?,
              group_id:            row.get(1)?,
              name:                row.get(2)?,
              description:         row.get(3)?,
              criteria_type:       row.get(4)?,
              config_json:         row.get(5)?,
              weight:              row.get(6)?,
              max_score:           row.get(7)?,
              is_required:         row.get(8)?,
              is_auto_fail:        row.get(9)?,
              auto_fail_threshold: row.get(10)?,
              sort_order:          row.get(11)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((groups, criteria))
      })
      .await?;

    let groups = raw_groups
      .into_iter()
      .map(RawGroup::into_group)
      .collect::<Result<Vec<_>>>()?;
    let criteria = raw_criteria
      .into_iter()
      .map(RawCriterion::into_criterion)
      .collect::<Result<Vec<_>>>()?;

    Ok((groups, criteria))
  }

  /// Insert a batch of groups and criteria for a template.
  async fn insert_live_criteria(
    &self,
    template_id: Uuid,
    groups: &[CriteriaGroup],
    criteria: &[Criterion],
    replace: bool,
  ) -> Result<()> {
    let template_id_str = encode_uuid(template_id);

    let group_rows: Vec<(String, String, Option<f64>, i64)> = groups
      .iter()
      .map(|g| {
        (encode_uuid(g.group_id), g.name.clone(), g.weight, g.sort_order)
      })
      .collect();

    let criterion_rows: Result<Vec<_>> = criteria
      .iter()
      .map(|c| {
        Ok((
          encode_uuid(c.criteria_id),
          c.group_id.map(encode_uuid),
          c.name.clone(),
          c.description.clone(),
          c.config.discriminant().to_owned(),
          c.config.to_json().map_err(Error::Core)?.to_string(),
          c.weight,
          c.max_score,
          c.is_required,
          c.is_auto_fail,
          c.auto_fail_threshold,
          c.sort_order,
        ))
      })
      .collect();
    let criterion_rows = criterion_rows?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if replace {
          tx.execute(
            "DELETE FROM criteria WHERE template_id = ?1",
            rusqlite::params![template_id_str],
          )?;
          tx.execute(
            "DELETE FROM criteria_groups WHERE template_id = ?1",
            rusqlite::params![template_id_str],
          )?;
        }

        for (group_id, name, weight, sort_order) in &group_rows {
          tx.execute(
            "INSERT INTO criteria_groups (group_id, template_id, name, weight, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![group_id, template_id_str, name, weight, sort_order],
          )?;
        }

        for (
          criteria_id,
          group_id,
          name,
          description,
          criteria_type,
          config_json,
          weight,
          max_score,
          is_required,
          is_auto_fail,
          auto_fail_threshold,
          sort_order,
        ) in &criterion_rows
        {
          tx.execute(
            "INSERT INTO criteria (
               criteria_id, template_id, group_id, name, description,
               criteria_type, config_json, weight, max_score,
               is_required, is_auto_fail, auto_fail_threshold, sort_order
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            rusqlite::params![
              criteria_id,
              template_id_str,
              group_id,
              name,
              description,
              criteria_type,
              config_json,
              weight,
              max_score,
              is_required,
              is_auto_fail,
              auto_fail_threshold,
              sort_order,
            ],
          )?;
        }

        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Latest published version for a template, if any.
  async fn latest_version(
    &self,
    template_id: Uuid,
  ) -> Result<Option<TemplateVersion>> {
    let id_str = encode_uuid(template_id);

    let raw: Option<RawTemplateVersion> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT template_id, version_number, snapshot_json, change_summary, created_at
               FROM template_versions WHERE template_id = ?1
               ORDER BY version_number DESC LIMIT 1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawTemplateVersion {
                  template_id:    row.get(0)?,
                  version_number: row.get(1)?,
                  snapshot_json:  row.get(2)?,
                  change_summary: row.get(3)?,
                  created_at:     row.get(4)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTemplateVersion::into_version).transpose()
  }
}

// ─── Row selection helpers ───────────────────────────────────────────────────

const SESSION_COLUMNS: &str =
  "session_id, template_id, template_version, snapshot_json, status,
   total_score, total_possible, percentage_score, pass_status,
   has_auto_fail, auto_fail_ids_json, created_at, completed_at,
   reviewed_by, reviewed_at, review_notes, dispute_reason, disputed_at,
   dispute_resolution";

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSession> {
  Ok(RawSession {
    session_id:         row.get(0)?,
    template_id:        row.get(1)?,
    template_version:   row.get(2)?,
    snapshot_json:      row.get(3)?,
    status:             row.get(4)?,
    total_score:        row.get(5)?,
    total_possible:     row.get(6)?,
    percentage_score:   row.get(7)?,
    pass_status:        row.get(8)?,
    has_auto_fail:      row.get(9)?,
    auto_fail_ids_json: row.get(10)?,
    created_at:         row.get(11)?,
    completed_at:       row.get(12)?,
    reviewed_by:        row.get(13)?,
    reviewed_at:        row.get(14)?,
    review_notes:       row.get(15)?,
    dispute_reason:     row.get(16)?,
    disputed_at:        row.get(17)?,
    dispute_resolution: row.get(18)?,
  })
}

const SCORE_COLUMNS: &str =
  "score_id, session_id, criteria_id, value_type, value_json, is_na,
   raw_score, normalized_score, weighted_score, is_auto_fail_triggered,
   comment, criteria_snapshot_json, recorded_at";

fn score_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawScore> {
  Ok(RawScore {
    score_id:               row.get(0)?,
    session_id:             row.get(1)?,
    criteria_id:            row.get(2)?,
    value_type:             row.get(3)?,
    value_json:             row.get(4)?,
    is_na:                  row.get(5)?,
    raw_score:              row.get(6)?,
    normalized_score:       row.get(7)?,
    weighted_score:         row.get(8)?,
    is_auto_fail_triggered: row.get(9)?,
    comment:                row.get(10)?,
    criteria_snapshot_json: row.get(11)?,
    recorded_at:            row.get(12)?,
  })
}

// ─── EvaluationStore impl ────────────────────────────────────────────────────

impl EvaluationStore for SqliteStore {
  type Error = Error;

  // ── Templates ─────────────────────────────────────────────────────────────

  async fn create_template(&self, input: NewTemplate) -> Result<Template> {
    let template = Template {
      template_id:     Uuid::new_v4(),
      name:            input.name,
      description:     input.description,
      scoring_method:  input.scoring_method,
      pass_threshold:  input.pass_threshold,
      max_total_score: input.max_total_score,
      settings:        input.settings,
      status:          TemplateStatus::Draft,
      version:         0,
      created_at:      Utc::now(),
      activated_at:    None,
    };

    let id_str       = encode_uuid(template.template_id);
    let name         = template.name.clone();
    let description  = template.description.clone();
    let method_str   = encode_scoring_method(template.scoring_method).to_owned();
    let pass_threshold  = template.pass_threshold;
    let max_total_score = template.max_total_score;
    let settings_str = encode_settings(&template.settings)?;
    let status_str   = encode_template_status(template.status).to_owned();
    let created_str  = encode_dt(template.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO templates (
             template_id, name, description, scoring_method, pass_threshold,
             max_total_score, settings_json, status, version, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
          rusqlite::params![
            id_str,
            name,
            description,
            method_str,
            pass_threshold,
            max_total_score,
            settings_str,
            status_str,
            created_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    self
      .insert_live_criteria(
        template.template_id,
        &input.groups,
        &input.criteria,
        false,
      )
      .await?;

    Ok(template)
  }

  async fn get_template(&self, id: Uuid) -> Result<Option<Template>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawTemplate> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT template_id, name, description, scoring_method,
                      pass_threshold, max_total_score, settings_json, status,
                      version, created_at, activated_at
               FROM templates WHERE template_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawTemplate {
                  template_id:     row.get(0)?,
                  name:            row.get(1)?,
                  description:     row.get(2)?,
                  scoring_method:  row.get(3)?,
                  pass_threshold:  row.get(4)?,
                  max_total_score: row.get(5)?,
                  settings_json:   row.get(6)?,
                  status:          row.get(7)?,
                  version:         row.get(8)?,
                  created_at:      row.get(9)?,
                  activated_at:    row.get(10)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTemplate::into_template).transpose()
  }

  async fn update_template_criteria(
    &self,
    template_id: Uuid,
    groups: Vec<CriteriaGroup>,
    criteria: Vec<Criterion>,
  ) -> Result<()> {
    let template = self.require_template(template_id).await?;
    if template.status == TemplateStatus::Archived {
      return Err(Error::Core(CoreError::TemplateArchived(template_id)));
    }

    // Only the live tables change; published snapshots are untouched.
    self
      .insert_live_criteria(template_id, &groups, &criteria, true)
      .await
  }

  async fn publish_template(
    &self,
    template_id: Uuid,
    change_summary: Option<String>,
  ) -> Result<TemplateVersion> {
    let template = self.require_template(template_id).await?;
    let (groups, criteria) = self.load_live_criteria(template_id).await?;

    let next_version = template.version + 1;
    let published_at = Utc::now();

    let mut published = template;
    published.version = next_version;
    published.status = TemplateStatus::Active;
    published.activated_at = Some(published_at);

    let version = TemplateVersion {
      template_id,
      version_number: next_version,
      snapshot: TemplateSnapshot { template: published, groups, criteria },
      change_summary,
      created_at: published_at,
    };

    let id_str        = encode_uuid(template_id);
    let version_i64   = i64::from(next_version);
    let prev_i64      = i64::from(next_version - 1);
    let snapshot_str  = encode_snapshot(&version.snapshot)?;
    let summary       = version.change_summary.clone();
    let at_str        = encode_dt(published_at);
    let status_str    = encode_template_status(TemplateStatus::Active).to_owned();

    let result = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // The composite primary key makes this insert the arbiter of
        // concurrent publishes: the loser hits a constraint violation.
        tx.execute(
          "INSERT INTO template_versions
             (template_id, version_number, snapshot_json, change_summary, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, version_i64, snapshot_str, summary, at_str],
        )?;

        tx.execute(
          "UPDATE templates
           SET version = ?2, status = ?3, activated_at = ?4
           WHERE template_id = ?1 AND version = ?5",
          rusqlite::params![id_str, version_i64, status_str, at_str, prev_i64],
        )?;

        tx.commit()?;
        Ok(())
      })
      .await;

    match result {
      Ok(()) => Ok(version),
      Err(e) if is_constraint_violation(&e) => {
        Err(Error::Core(CoreError::Conflict(format!(
          "template {template_id} version {next_version} was published concurrently"
        ))))
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn get_template_version(
    &self,
    template_id: Uuid,
    version_number: u32,
  ) -> Result<Option<TemplateVersion>> {
    let id_str      = encode_uuid(template_id);
    let version_i64 = i64::from(version_number);

    let raw: Option<RawTemplateVersion> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT template_id, version_number, snapshot_json, change_summary, created_at
               FROM template_versions
               WHERE template_id = ?1 AND version_number = ?2",
              rusqlite::params![id_str, version_i64],
              |row| {
                Ok(RawTemplateVersion {
                  template_id:    row.get(0)?,
                  version_number: row.get(1)?,
                  snapshot_json:  row.get(2)?,
                  change_summary: row.get(3)?,
                  created_at:     row.get(4)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTemplateVersion::into_version).transpose()
  }

  async fn list_template_versions(
    &self,
    template_id: Uuid,
  ) -> Result<Vec<TemplateVersion>> {
    let id_str = encode_uuid(template_id);

    let raws: Vec<RawTemplateVersion> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT template_id, version_number, snapshot_json, change_summary, created_at
           FROM template_versions WHERE template_id = ?1
           ORDER BY version_number",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawTemplateVersion {
              template_id:    row.get(0)?,
              version_number: row.get(1)?,
              snapshot_json:  row.get(2)?,
              change_summary: row.get(3)?,
              created_at:     row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawTemplateVersion::into_version)
      .collect()
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  async fn create_session(&self, template_id: Uuid) -> Result<Session> {
    // Sessions always bind to the current published snapshot, never the
    // live template.
    self.require_template(template_id).await?;
    let version = self
      .latest_version(template_id)
      .await?
      .ok_or(Error::Core(CoreError::TemplateNotPublished(template_id)))?;

    let session = Session {
      session_id:             Uuid::new_v4(),
      template_id,
      template_version:       version.version_number,
      snapshot:               version.snapshot,
      status:                 SessionStatus::Pending,
      total_score:            None,
      total_possible:         None,
      percentage_score:       None,
      pass_status:            PassStatus::Pending,
      has_auto_fail:          false,
      auto_fail_criteria_ids: Vec::new(),
      created_at:             Utc::now(),
      completed_at:           None,
      reviewed_by:            None,
      reviewed_at:            None,
      review_notes:           None,
      dispute_reason:         None,
      disputed_at:            None,
      dispute_resolution:     None,
    };

    let session_id_str  = encode_uuid(session.session_id);
    let template_id_str = encode_uuid(template_id);
    let version_i64     = i64::from(session.template_version);
    let snapshot_str    = encode_snapshot(&session.snapshot)?;
    let status_str      = encode_session_status(session.status).to_owned();
    let pass_str        = encode_pass_status(session.pass_status).to_owned();
    let created_str     = encode_dt(session.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sessions (
             session_id, template_id, template_version, snapshot_json,
             status, pass_status, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            session_id_str,
            template_id_str,
            version_i64,
            snapshot_str,
            status_str,
            pass_str,
            created_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(session)
  }

  async fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawSession> = self
      .conn
      .call(move |conn| {
        let sql =
          format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?1");
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], session_from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSession::into_session).transpose()
  }

  async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
    let template_str = filter.template_id.map(encode_uuid);
    let status_str =
      filter.status.map(encode_session_status).map(str::to_owned);
    let limit_val  = filter.limit.unwrap_or(DEFAULT_LIST_LIMIT) as i64;
    let offset_val = filter.offset.unwrap_or(0) as i64;

    let raws: Vec<RawSession> = self
      .conn
      .call(move |conn| {
        let mut conds: Vec<&'static str> = vec![];
        if template_str.is_some() {
          conds.push("template_id = ?1");
        }
        if status_str.is_some() {
          conds.push("status = ?2");
        }

        let where_clause = if conds.is_empty() {
          String::new()
        } else {
          format!("WHERE {}", conds.join(" AND "))
        };

        let sql = format!(
          "SELECT {SESSION_COLUMNS} FROM sessions
           {where_clause}
           ORDER BY created_at DESC
           LIMIT ?3 OFFSET ?4"
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              template_str.as_deref(),
              status_str.as_deref(),
              limit_val,
              offset_val,
            ],
            session_from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSession::into_session).collect()
  }

  // ── Scores ────────────────────────────────────────────────────────────────

  async fn submit_scores(
    &self,
    session_id: Uuid,
    entries: Vec<NewScore>,
    actor: Option<String>,
  ) -> Result<ScoreSubmission> {
    let session = self.require_session(session_id).await?;

    // Structural legality first: scoring a completed/cancelled session
    // is a state error, not a validation error.
    transition(session.status, SessionAction::SubmitScores)
      .map_err(Error::Core)?;

    let settings = session.snapshot.template.settings.clone();

    // Partial-submission guard: with the flag off, every snapshot
    // criterion must be covered by an existing score or a batch entry.
    if !settings.allow_partial_submission {
      let existing = self.get_scores(session_id).await?;
      let missing: Vec<Uuid> = session
        .snapshot
        .criteria
        .iter()
        .map(|c| c.criteria_id)
        .filter(|id| {
          !existing.iter().any(|s| s.criteria_id == *id)
            && !entries.iter().any(|e| e.criteria_id == *id)
        })
        .collect();
      if !missing.is_empty() {
        return Err(Error::Core(CoreError::PartialSubmission(missing)));
      }
    }

    let now = Utc::now();
    let mut accepted: Vec<Score> = Vec::new();
    let mut rejected: Vec<RejectedScore> = Vec::new();

    for entry in entries {
      let Some(criterion) = session.snapshot.criterion(entry.criteria_id)
      else {
        rejected.push(RejectedScore {
          criteria_id: entry.criteria_id,
          reason:      format!(
            "criterion {} is not part of the session's snapshot",
            entry.criteria_id
          ),
        });
        continue;
      };

      if entry.is_na {
        if !settings.allow_na {
          rejected.push(RejectedScore {
            criteria_id: entry.criteria_id,
            reason:      "template does not allow N/A answers".to_owned(),
          });
          continue;
        }
        accepted.push(Score {
          score_id:               Uuid::new_v4(),
          session_id,
          criteria_id:            entry.criteria_id,
          value:                  None,
          is_na:                  true,
          raw_score:              None,
          normalized_score:       None,
          weighted_score:         None,
          is_auto_fail_triggered: false,
          comment:                entry.comment,
          criteria_snapshot:      criterion.config.clone(),
          recorded_at:            now,
        });
        continue;
      }

      let Some(value) = entry.value else {
        rejected.push(RejectedScore {
          criteria_id: entry.criteria_id,
          reason:      "missing value for non-N/A score".to_owned(),
        });
        continue;
      };

      if let Err(e) = validate_value(criterion, &value) {
        rejected.push(RejectedScore {
          criteria_id: entry.criteria_id,
          reason:      e.to_string(),
        });
        continue;
      }

      let result = normalize(criterion, &value).map_err(Error::Core)?;
      let triggered = criterion.is_auto_fail
        && criterion
          .auto_fail_threshold
          .is_some_and(|t| result.normalized_score < t);

      accepted.push(Score {
        score_id:               Uuid::new_v4(),
        session_id,
        criteria_id:            entry.criteria_id,
        value:                  Some(value),
        is_na:                  false,
        raw_score:              Some(result.raw_score),
        normalized_score:       Some(result.normalized_score),
        weighted_score:         Some(result.weighted_score),
        is_auto_fail_triggered: triggered,
        comment:                entry.comment,
        criteria_snapshot:      criterion.config.clone(),
        recorded_at:            now,
      });
    }

    // Persist accepted rows: one row per (session, criterion), last
    // write wins.
    let upsert_rows: Result<Vec<_>> = accepted
      .iter()
      .map(|s| {
        let (value_type, value_json) = match &s.value {
          Some(v) => (
            Some(v.discriminant().to_owned()),
            Some(v.to_json().map_err(Error::Core)?.to_string()),
          ),
          None => (None, None),
        };
        Ok((
          encode_uuid(s.score_id),
          encode_uuid(s.session_id),
          encode_uuid(s.criteria_id),
          value_type,
          value_json,
          s.is_na,
          s.raw_score,
          s.normalized_score,
          s.weighted_score,
          s.is_auto_fail_triggered,
          s.comment.clone(),
          serde_json::to_string(&s.criteria_snapshot)?,
          encode_dt(s.recorded_at),
        ))
      })
      .collect();
    let upsert_rows = upsert_rows?;

    // An all-rejected batch has no side effects: no rows, no
    // pending -> in_progress move, no audit entry.
    if accepted.is_empty() {
      return Ok(ScoreSubmission { accepted, rejected });
    }

    #[cfg(test)]
    self.pause_at_write_gate().await;

    let sid_str = encode_uuid(session_id);
    let committed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Re-check inside the write transaction: a completion committed
        // after the transition check above must win, not be scored over.
        let status: String = tx.query_row(
          "SELECT status FROM sessions WHERE session_id = ?1",
          rusqlite::params![sid_str],
          |row| row.get(0),
        )?;
        let scorable = [
          encode_session_status(SessionStatus::Pending),
          encode_session_status(SessionStatus::InProgress),
        ];
        if !scorable.contains(&status.as_str()) {
          return Ok(false);
        }

        for (
          score_id,
          session_id,
          criteria_id,
          value_type,
          value_json,
          is_na,
          raw_score,
          normalized_score,
          weighted_score,
          is_auto_fail_triggered,
          comment,
          criteria_snapshot_json,
          recorded_at,
        ) in &upsert_rows
        {
          tx.execute(
            "INSERT INTO scores (
               score_id, session_id, criteria_id, value_type, value_json,
               is_na, raw_score, normalized_score, weighted_score,
               is_auto_fail_triggered, comment, criteria_snapshot_json,
               recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT (session_id, criteria_id) DO UPDATE SET
               value_type             = excluded.value_type,
               value_json             = excluded.value_json,
               is_na                  = excluded.is_na,
               raw_score              = excluded.raw_score,
               normalized_score       = excluded.normalized_score,
               weighted_score         = excluded.weighted_score,
               is_auto_fail_triggered = excluded.is_auto_fail_triggered,
               comment                = excluded.comment,
               criteria_snapshot_json = excluded.criteria_snapshot_json,
               recorded_at            = excluded.recorded_at",
            rusqlite::params![
              score_id,
              session_id,
              criteria_id,
              value_type,
              value_json,
              is_na,
              raw_score,
              normalized_score,
              weighted_score,
              is_auto_fail_triggered,
              comment,
              criteria_snapshot_json,
              recorded_at,
            ],
          )?;
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !committed {
      return Err(Error::Core(CoreError::Conflict(format!(
        "session {session_id} left its scorable state concurrently"
      ))));
    }

    // First submission moves a pending session to in_progress. The
    // guard makes the write a no-op if another submitter already did.
    if session.status == SessionStatus::Pending {
      let in_progress =
        encode_session_status(SessionStatus::InProgress).to_owned();
      self
        .guarded_update(
          "UPDATE sessions SET status = :status
           WHERE session_id = :sid AND status = 'pending'",
          vec![
            (":status", Box::new(in_progress)),
            (":sid", Box::new(encode_uuid(session_id))),
          ],
        )
        .await?;
    }

    self
      .insert_audit(
        session_id,
        SessionAction::SubmitScores,
        actor,
        Some(format!(
          "{} accepted, {} rejected",
          accepted.len(),
          rejected.len()
        )),
      )
      .await?;

    Ok(ScoreSubmission { accepted, rejected })
  }

  async fn get_scores(&self, session_id: Uuid) -> Result<Vec<Score>> {
    let id_str = encode_uuid(session_id);

    let raws: Vec<RawScore> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {SCORE_COLUMNS} FROM scores
           WHERE session_id = ?1 ORDER BY criteria_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], score_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawScore::into_score).collect()
  }

  // ── Lifecycle transitions ─────────────────────────────────────────────────

  async fn complete_session(
    &self,
    session_id: Uuid,
    actor: Option<String>,
    notes: Option<String>,
  ) -> Result<Session> {
    let session = self.require_session(session_id).await?;
    transition(session.status, SessionAction::Complete).map_err(Error::Core)?;

    let scores = self.get_scores(session_id).await?;
    let settings = &session.snapshot.template.settings;

    // Every required criterion needs a score; an N/A score satisfies the
    // requirement only when the template allows N/A.
    let missing: Vec<Uuid> = session
      .snapshot
      .criteria
      .iter()
      .filter(|c| c.is_required)
      .filter(|c| {
        match scores.iter().find(|s| s.criteria_id == c.criteria_id) {
          None => true,
          Some(s) => s.is_na && !settings.allow_na,
        }
      })
      .map(|c| c.criteria_id)
      .collect();
    if !missing.is_empty() {
      return Err(Error::Core(CoreError::MissingRequiredScores(missing)));
    }

    let outcome = aggregate(
      &session.snapshot.template,
      &session.snapshot.criteria,
      &scores,
      None,
    );

    #[cfg(test)]
    self.pause_at_write_gate().await;

    let completed_at = Utc::now();
    let affected = self
      .guarded_update(
        "UPDATE sessions SET
           status = 'completed',
           total_score = :total,
           total_possible = :possible,
           percentage_score = :pct,
           pass_status = :pass,
           has_auto_fail = :af,
           auto_fail_ids_json = :af_ids,
           completed_at = :at
         WHERE session_id = :sid AND status = 'in_progress'",
        vec![
          (":total", Box::new(outcome.total_score)),
          (":possible", Box::new(outcome.total_possible)),
          (":pct", Box::new(outcome.percentage_score)),
          (
            ":pass",
            Box::new(encode_pass_status(outcome.pass_status).to_owned()),
          ),
          (":af", Box::new(outcome.has_auto_fail)),
          (
            ":af_ids",
            Box::new(encode_uuid_list(&outcome.auto_fail_criteria_ids)?),
          ),
          (":at", Box::new(encode_dt(completed_at))),
          (":sid", Box::new(encode_uuid(session_id))),
        ],
      )
      .await?;

    if affected == 0 {
      return Err(Error::Core(CoreError::Conflict(format!(
        "session {session_id} was completed or moved concurrently"
      ))));
    }

    self
      .insert_audit(session_id, SessionAction::Complete, actor, notes)
      .await?;

    self.require_session(session_id).await
  }

  async fn review_session(
    &self,
    session_id: Uuid,
    reviewed_by: String,
    notes: Option<String>,
  ) -> Result<Session> {
    let session = self.require_session(session_id).await?;
    transition(session.status, SessionAction::Review).map_err(Error::Core)?;

    let affected = self
      .guarded_update(
        "UPDATE sessions SET
           status = 'reviewed',
           reviewed_by = :by,
           reviewed_at = :at,
           review_notes = :notes
         WHERE session_id = :sid AND status = 'completed'",
        vec![
          (":by", Box::new(reviewed_by)),
          (":at", Box::new(encode_dt(Utc::now()))),
          (":notes", Box::new(notes.clone())),
          (":sid", Box::new(encode_uuid(session_id))),
        ],
      )
      .await?;

    if affected == 0 {
      return Err(Error::Core(CoreError::Conflict(format!(
        "session {session_id} changed state concurrently"
      ))));
    }

    self
      .insert_audit(session_id, SessionAction::Review, None, notes)
      .await?;
    self.require_session(session_id).await
  }

  async fn dispute_session(
    &self,
    session_id: Uuid,
    actor: Option<String>,
    reason: String,
  ) -> Result<Session> {
    let session = self.require_session(session_id).await?;
    transition(session.status, SessionAction::Dispute).map_err(Error::Core)?;

    let affected = self
      .guarded_update(
        "UPDATE sessions SET
           status = 'disputed',
           dispute_reason = :reason,
           disputed_at = :at
         WHERE session_id = :sid AND status IN ('completed', 'reviewed')",
        vec![
          (":reason", Box::new(reason.clone())),
          (":at", Box::new(encode_dt(Utc::now()))),
          (":sid", Box::new(encode_uuid(session_id))),
        ],
      )
      .await?;

    if affected == 0 {
      return Err(Error::Core(CoreError::Conflict(format!(
        "session {session_id} changed state concurrently"
      ))));
    }

    self
      .insert_audit(session_id, SessionAction::Dispute, actor, Some(reason))
      .await?;
    self.require_session(session_id).await
  }

  async fn resolve_dispute(
    &self,
    session_id: Uuid,
    actor: Option<String>,
    resolution: String,
  ) -> Result<Session> {
    let session = self.require_session(session_id).await?;
    transition(session.status, SessionAction::Resolve).map_err(Error::Core)?;

    let affected = self
      .guarded_update(
        "UPDATE sessions SET
           status = 'reviewed',
           dispute_resolution = :resolution
         WHERE session_id = :sid AND status = 'disputed'",
        vec![
          (":resolution", Box::new(resolution.clone())),
          (":sid", Box::new(encode_uuid(session_id))),
        ],
      )
      .await?;

    if affected == 0 {
      return Err(Error::Core(CoreError::Conflict(format!(
        "session {session_id} changed state concurrently"
      ))));
    }

    self
      .insert_audit(session_id, SessionAction::Resolve, actor, Some(resolution))
      .await?;
    self.require_session(session_id).await
  }

  async fn cancel_session(
    &self,
    session_id: Uuid,
    actor: Option<String>,
  ) -> Result<Session> {
    let session = self.require_session(session_id).await?;
    transition(session.status, SessionAction::Cancel).map_err(Error::Core)?;

    let affected = self
      .guarded_update(
        "UPDATE sessions SET status = 'cancelled'
         WHERE session_id = :sid AND status IN ('pending', 'in_progress')",
        vec![(":sid", Box::new(encode_uuid(session_id)))],
      )
      .await?;

    if affected == 0 {
      return Err(Error::Core(CoreError::Conflict(format!(
        "session {session_id} changed state concurrently"
      ))));
    }

    self
      .insert_audit(session_id, SessionAction::Cancel, actor, None)
      .await?;
    self.require_session(session_id).await
  }

  async fn reopen_session(
    &self,
    session_id: Uuid,
    actor: Option<String>,
  ) -> Result<Session> {
    let session = self.require_session(session_id).await?;
    transition(session.status, SessionAction::Reopen).map_err(Error::Core)?;

    tracing::info!(
      session_id = %session_id,
      from = ?session.status,
      "reopening session; aggregate fields will be cleared"
    );

    let affected = self
      .guarded_update(
        "UPDATE sessions SET
           status = 'in_progress',
           total_score = NULL,
           total_possible = NULL,
           percentage_score = NULL,
           pass_status = 'pending',
           has_auto_fail = 0,
           auto_fail_ids_json = '[]',
           completed_at = NULL,
           reviewed_by = NULL,
           reviewed_at = NULL,
           review_notes = NULL
         WHERE session_id = :sid AND status IN ('completed', 'reviewed')",
        vec![(":sid", Box::new(encode_uuid(session_id)))],
      )
      .await?;

    if affected == 0 {
      return Err(Error::Core(CoreError::Conflict(format!(
        "session {session_id} changed state concurrently"
      ))));
    }

    self
      .insert_audit(
        session_id,
        SessionAction::Reopen,
        actor,
        Some("aggregate fields cleared".to_owned()),
      )
      .await?;
    self.require_session(session_id).await
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  async fn get_audit_log(&self, session_id: Uuid) -> Result<Vec<AuditEntry>> {
    let id_str = encode_uuid(session_id);

    let raws: Vec<RawAudit> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT audit_id, session_id, action, actor, note, recorded_at
           FROM session_audit WHERE session_id = ?1
           ORDER BY recorded_at, audit_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawAudit {
              audit_id:    row.get(0)?,
              session_id:  row.get(1)?,
              action:      row.get(2)?,
              actor:       row.get(3)?,
              note:        row.get(4)?,
              recorded_at: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAudit::into_entry).collect()
  }
}
