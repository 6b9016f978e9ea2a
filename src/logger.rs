use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::rotator::UserId;

// ------------------ EVENTS ------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    LoginSuccess,
    LoginFailure,
    RotationStarted,
    PasswordRotated,
    RotationFailed,
    RotationRejected,
    RotationCompleted,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::LoginSuccess => "LOGIN_SUCCESS",
            AuditEvent::LoginFailure => "LOGIN_FAILURE",
            AuditEvent::RotationStarted => "ROTATION_STARTED",
            AuditEvent::PasswordRotated => "PASSWORD_ROTATED",
            AuditEvent::RotationFailed => "ROTATION_FAILED",
            AuditEvent::RotationRejected => "ROTATION_REJECTED",
            AuditEvent::RotationCompleted => "ROTATION_COMPLETED",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "LOGIN_SUCCESS" => AuditEvent::LoginSuccess,
            "LOGIN_FAILURE" => AuditEvent::LoginFailure,
            "ROTATION_STARTED" => AuditEvent::RotationStarted,
            "PASSWORD_ROTATED" => AuditEvent::PasswordRotated,
            "ROTATION_FAILED" => AuditEvent::RotationFailed,
            "ROTATION_REJECTED" => AuditEvent::RotationRejected,
            "ROTATION_COMPLETED" => AuditEvent::RotationCompleted,
            _ => return None,
        })
    }
}

/// One audit line. Never carries a password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub event: AuditEvent,
    pub run_id: Option<String>,
    pub actor: Option<UserId>,
    pub target: Option<UserId>,
    pub detail: Option<String>,
}

// ------------------ HELPERS ------------------

// Current timestamp in Eastern Time (EST/EDT)
fn now_est() -> DateTime<chrono_tz::Tz> {
    New_York.from_utc_datetime(&Utc::now().naive_utc())
}

// ------------------ AUDIT LOG ------------------

/// Audit trail: a `rotation_log` table plus an optional JSON-lines file.
pub struct AuditLog {
    conn: Connection,
    file: Option<PathBuf>,
}

impl AuditLog {
    pub fn open(db_path: &Path, file: Option<&Path>) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open {}", db_path.display()))?;
        Self::init(conn, file.map(Path::to_path_buf))
    }

    /// In-memory table, no file. Used by tests and dry runs.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, file: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS rotation_log (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id    TEXT,
                actor     INTEGER,
                target    INTEGER,
                event     TEXT CHECK(event IN (
                    'LOGIN_SUCCESS','LOGIN_FAILURE','ROTATION_STARTED','PASSWORD_ROTATED',
                    'ROTATION_FAILED','ROTATION_REJECTED','ROTATION_COMPLETED')) NOT NULL,
                detail    TEXT,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS ix_rotation_log_run ON rotation_log(run_id);
            "#,
        )
        .context("Failed to initialize audit log")?;
        Ok(Self { conn, file })
    }

    // Log event to both DB and file
    pub fn log_event(
        &self,
        event: AuditEvent,
        run_id: Option<Uuid>,
        actor: Option<UserId>,
        target: Option<UserId>,
        detail: Option<&str>,
    ) -> Result<()> {
        let record = AuditRecord {
            timestamp: now_est().to_rfc3339(),
            event,
            run_id: run_id.map(|id| id.to_string()),
            actor,
            target,
            detail: detail.map(str::to_string),
        };

        self.conn
            .execute(
                "INSERT INTO rotation_log (run_id, actor, target, event, detail, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.run_id,
                    record.actor,
                    record.target,
                    record.event.as_str(),
                    record.detail,
                    record.timestamp
                ],
            )
            .context("Failed to record audit event")?;

        if let Some(path) = &self.file {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let line = serde_json::to_string(&record).context("Failed to encode audit record")?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    pub fn events_for_run(&self, run_id: &Uuid) -> Result<Vec<AuditRecord>> {
        self.query(
            "SELECT timestamp, event, run_id, actor, target, detail FROM rotation_log
             WHERE run_id = ?1 ORDER BY id ASC",
            params![run_id.to_string()],
        )
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        self.query(
            "SELECT timestamp, event, run_id, actor, target, detail FROM rotation_log
             ORDER BY id DESC LIMIT ?1",
            params![limit as i64],
        )
    }

    fn query(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<AuditRecord>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare audit query")?;
        let rows = stmt.query_map(args, |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, Option<UserId>>(3)?,
                r.get::<_, Option<UserId>>(4)?,
                r.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (timestamp, event, run_id, actor, target, detail) = row?;
            // The CHECK constraint keeps unknown names out.
            let Some(event) = AuditEvent::parse(&event) else { continue };
            records.push(AuditRecord { timestamp, event, run_id, actor, target, detail });
        }
        Ok(records)
    }
}
