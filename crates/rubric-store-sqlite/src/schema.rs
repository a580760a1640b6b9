//! SQL schema for the Rubric SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated
//! on `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS templates (
    template_id     TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    description     TEXT,
    scoring_method  TEXT NOT NULL,   -- discriminant of ScoringMethod
    pass_threshold  REAL NOT NULL,
    max_total_score REAL NOT NULL,
    settings_json   TEXT NOT NULL DEFAULT '{}',
    status          TEXT NOT NULL DEFAULT 'draft',
    version         INTEGER NOT NULL DEFAULT 0,  -- latest published version
    created_at      TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    activated_at    TEXT
);

-- Live (draft-next) groups and criteria. Published copies live only
-- inside template_versions.snapshot_json and are never touched by
-- edits to these tables.
CREATE TABLE IF NOT EXISTS criteria_groups (
    group_id    TEXT PRIMARY KEY,
    template_id TEXT NOT NULL REFERENCES templates(template_id),
    name        TEXT NOT NULL,
    weight      REAL,
    sort_order  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS criteria (
    criteria_id         TEXT PRIMARY KEY,
    template_id         TEXT NOT NULL REFERENCES templates(template_id),
    group_id            TEXT,
    name                TEXT NOT NULL,
    description         TEXT,
    criteria_type       TEXT NOT NULL,   -- discriminant of CriterionConfig
    config_json         TEXT NOT NULL,   -- JSON payload (inner config only)
    weight              REAL NOT NULL DEFAULT 1,
    max_score           REAL NOT NULL DEFAULT 100,
    is_required         INTEGER NOT NULL DEFAULT 0,
    is_auto_fail        INTEGER NOT NULL DEFAULT 0,
    auto_fail_threshold REAL,
    sort_order          INTEGER NOT NULL DEFAULT 0
);

-- Published versions are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table. The composite
-- primary key serializes concurrent publishes of the same template.
CREATE TABLE IF NOT EXISTS template_versions (
    template_id    TEXT NOT NULL REFERENCES templates(template_id),
    version_number INTEGER NOT NULL,
    snapshot_json  TEXT NOT NULL,   -- deep copy of template + groups + criteria
    change_summary TEXT,
    created_at     TEXT NOT NULL,
    PRIMARY KEY (template_id, version_number)
);

-- snapshot_json is written once at session creation and never updated.
CREATE TABLE IF NOT EXISTS sessions (
    session_id         TEXT PRIMARY KEY,
    template_id        TEXT NOT NULL REFERENCES templates(template_id),
    template_version   INTEGER NOT NULL,
    snapshot_json      TEXT NOT NULL,
    status             TEXT NOT NULL DEFAULT 'pending',
    total_score        REAL,
    total_possible     REAL,
    percentage_score   REAL,
    pass_status        TEXT NOT NULL DEFAULT 'pending',
    has_auto_fail      INTEGER NOT NULL DEFAULT 0,
    auto_fail_ids_json TEXT NOT NULL DEFAULT '[]',
    created_at         TEXT NOT NULL,
    completed_at       TEXT,
    reviewed_by        TEXT,
    reviewed_at        TEXT,
    review_notes       TEXT,
    dispute_reason     TEXT,
    disputed_at        TEXT,
    dispute_resolution TEXT
);

-- One row per (session, criterion); resubmission upserts (last write
-- wins, server-assigned recorded_at).
CREATE TABLE IF NOT EXISTS scores (
    score_id               TEXT PRIMARY KEY,
    session_id             TEXT NOT NULL REFERENCES sessions(session_id),
    criteria_id            TEXT NOT NULL,
    value_type             TEXT,            -- discriminant of ScoreValue; NULL when N/A
    value_json             TEXT,            -- JSON payload (inner value only)
    is_na                  INTEGER NOT NULL DEFAULT 0,
    raw_score              REAL,
    normalized_score       REAL,
    weighted_score         REAL,
    is_auto_fail_triggered INTEGER NOT NULL DEFAULT 0,
    comment                TEXT,
    criteria_snapshot_json TEXT NOT NULL,   -- frozen CriterionConfig (tagged)
    recorded_at            TEXT NOT NULL,
    UNIQUE (session_id, criteria_id)
);

-- Write-only transition history; never read back into scoring.
CREATE TABLE IF NOT EXISTS session_audit (
    audit_id    TEXT PRIMARY KEY,
    session_id  TEXT NOT NULL REFERENCES sessions(session_id),
    action      TEXT NOT NULL,
    actor       TEXT,
    note        TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS criteria_template_idx  ON criteria(template_id);
CREATE INDEX IF NOT EXISTS groups_template_idx    ON criteria_groups(template_id);
CREATE INDEX IF NOT EXISTS sessions_template_idx  ON sessions(template_id);
CREATE INDEX IF NOT EXISTS sessions_status_idx    ON sessions(status);
CREATE INDEX IF NOT EXISTS scores_session_idx     ON scores(session_id);
CREATE INDEX IF NOT EXISTS audit_session_idx      ON session_audit(session_id);

PRAGMA user_version = 1;
";
