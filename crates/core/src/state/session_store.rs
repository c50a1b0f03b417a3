//! # Session Store
//!
//! Append-only log and state persistence for pipeline sessions. Every call
//! runs in one SQLite transaction under the connection mutex and is committed
//! before it returns, so concurrent pollers only ever see whole transitions.

use super::db::PaperflowDb;
use super::session::{
    LogEntry, LogLevel, PaperReport, Session, SessionError, SessionSummary, StageOutput,
    StatusView,
};
use crate::orchestrator::pipeline::{SessionStatus, Stage};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors raised by the session store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("invalid transition for session {session_id}: {from} cannot move to {target}")]
    InvalidTransition {
        session_id: String,
        from: SessionStatus,
        target: String,
    },
    #[error("session {session_id} is already {status}")]
    AlreadyTerminal {
        session_id: String,
        status: SessionStatus,
    },
    #[error("corrupt session record {session_id}: {reason}")]
    Corrupt { session_id: String, reason: String },
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session store lock poisoned")]
    Poisoned,
}

/// Status and stage outputs, the part of a row every transition needs
struct Header {
    status: SessionStatus,
    stage_outputs: BTreeMap<Stage, StageOutput>,
}

/// Manager for session storage in SQLite
pub struct SessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SessionStore {
    /// Create a new SessionStore from a PaperflowDb
    pub fn new(db: &PaperflowDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Store backed by a private in-memory database
    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(&PaperflowDb::open_in_memory()?))
    }

    /// Allocate a new PENDING session
    pub fn create(&self, title: &str) -> Result<String, StoreError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = stamp(Utc::now());

        let entry = self.with_tx(|tx| {
            tx.execute(
                r#"
                INSERT INTO sessions (id, title, status, stage_outputs_json, created_at, updated_at)
                VALUES (?1, ?2, ?3, '{}', ?4, ?4)
                "#,
                params![session_id, title, SessionStatus::Pending.as_str(), now],
            )?;
            push_log(
                tx,
                &session_id,
                LogLevel::Info,
                &format!("Session created for title: {}", title),
            )
        })?;

        trace_entry(&session_id, &entry);
        Ok(session_id)
    }

    /// Append one line to a non-terminal session's log
    pub fn append_log(
        &self,
        session_id: &str,
        level: LogLevel,
        message: &str,
    ) -> Result<LogEntry, StoreError> {
        let entry = self.with_tx(|tx| {
            let header = load_header(tx, session_id)?;
            ensure_open(session_id, header.status)?;
            touch(tx, session_id, header.status)?;
            push_log(tx, session_id, level, message)
        })?;

        trace_entry(session_id, &entry);
        Ok(entry)
    }

    /// PENDING → RUNNING
    pub fn mark_running(&self, session_id: &str) -> Result<(), StoreError> {
        let entry = self.with_tx(|tx| {
            let header = load_header(tx, session_id)?;
            ensure_open(session_id, header.status)?;
            if header.status != SessionStatus::Pending {
                return Err(StoreError::InvalidTransition {
                    session_id: session_id.to_string(),
                    from: header.status,
                    target: SessionStatus::Running.to_string(),
                });
            }
            touch(tx, session_id, SessionStatus::Running)?;
            push_log(tx, session_id, LogLevel::Info, "Pipeline running")
        })?;

        trace_entry(session_id, &entry);
        Ok(())
    }

    /// Record a stage's output; `stage` must be the next stage in canonical order
    pub fn advance(
        &self,
        session_id: &str,
        stage: Stage,
        output: StageOutput,
    ) -> Result<SessionStatus, StoreError> {
        let (status, entry) = self.with_tx(|tx| {
            let mut header = load_header(tx, session_id)?;
            ensure_open(session_id, header.status)?;
            if header.status.next_stage() != Some(stage) || header.stage_outputs.contains_key(&stage)
            {
                return Err(StoreError::InvalidTransition {
                    session_id: session_id.to_string(),
                    from: header.status,
                    target: stage.completed_status().to_string(),
                });
            }

            let message = format!(
                "Stage {} completed in {} ms ({} attempt{}{})",
                stage,
                output.duration_ms,
                output.attempts,
                if output.attempts == 1 { "" } else { "s" },
                if output.fallback { ", offline fallback" } else { "" }
            );
            let status = stage.completed_status();
            header.stage_outputs.insert(stage, output);

            tx.execute(
                "UPDATE sessions SET status = ?1, stage_outputs_json = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    status.as_str(),
                    serde_json::to_string(&header.stage_outputs)?,
                    stamp(Utc::now()),
                    session_id
                ],
            )?;
            let entry = push_log(tx, session_id, LogLevel::Info, &message)?;
            Ok((status, entry))
        })?;

        trace_entry(session_id, &entry);
        Ok(status)
    }

    /// Terminal success; every stage must be persisted
    pub fn complete(&self, session_id: &str, result: &PaperReport) -> Result<(), StoreError> {
        let entry = self.with_tx(|tx| {
            let header = load_header(tx, session_id)?;
            ensure_open(session_id, header.status)?;
            if !header.status.ready_to_complete() {
                return Err(StoreError::InvalidTransition {
                    session_id: session_id.to_string(),
                    from: header.status,
                    target: SessionStatus::Completed.to_string(),
                });
            }

            tx.execute(
                "UPDATE sessions SET status = ?1, result_json = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    SessionStatus::Completed.as_str(),
                    serde_json::to_string(result)?,
                    stamp(Utc::now()),
                    session_id
                ],
            )?;
            push_log(
                tx,
                session_id,
                LogLevel::Info,
                &format!(
                    "Session completed; similarity {:.3} ({})",
                    result.plagiarism.score, result.plagiarism.level
                ),
            )
        })?;

        trace_entry(session_id, &entry);
        Ok(())
    }

    /// Terminal failure from any non-terminal state
    pub fn fail(&self, session_id: &str, stage: &str, message: &str) -> Result<(), StoreError> {
        let error = SessionError {
            stage: stage.to_string(),
            message: message.to_string(),
        };

        let entry = self.with_tx(|tx| {
            let header = load_header(tx, session_id)?;
            ensure_open(session_id, header.status)?;

            tx.execute(
                "UPDATE sessions SET status = ?1, error_json = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    SessionStatus::Failed.as_str(),
                    serde_json::to_string(&error)?,
                    stamp(Utc::now()),
                    session_id
                ],
            )?;
            push_log(
                tx,
                session_id,
                LogLevel::Error,
                &format!("Session failed at {}: {}", stage, message),
            )
        })?;

        trace_entry(session_id, &entry);
        Ok(())
    }

    /// Load a full session record
    pub fn get(&self, session_id: &str) -> Result<Session, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        // Header and log are read from one snapshot
        let tx = conn.unchecked_transaction()?;

        let row = tx
            .query_row(
                r#"
                SELECT title, status, stage_outputs_json, result_json, error_json, created_at, updated_at
                FROM sessions WHERE id = ?1
                "#,
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        let (title, status, outputs, result, error, created_at, updated_at) = row;

        let raw_log = tx
            .prepare(
                "SELECT seq, timestamp, level, message FROM session_log WHERE session_id = ?1 ORDER BY seq",
            )?
            .query_map(params![session_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        tx.commit()?;

        let log = raw_log
            .into_iter()
            .map(|(seq, timestamp, level, message)| {
                Ok(LogEntry {
                    seq: seq as u64,
                    timestamp: parse_time(session_id, &timestamp)?,
                    level: LogLevel::parse(&level),
                    message,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(Session {
            session_id: session_id.to_string(),
            title,
            status: parse_status(session_id, &status)?,
            log,
            stage_outputs: serde_json::from_str(&outputs)?,
            result: result.as_deref().map(serde_json::from_str).transpose()?,
            error: error.as_deref().map(serde_json::from_str).transpose()?,
            created_at: parse_time(session_id, &created_at)?,
            updated_at: parse_time(session_id, &updated_at)?,
        })
    }

    /// Polling view: status, last `tail` log lines, result or error
    pub fn status(&self, session_id: &str, tail: usize) -> Result<StatusView, StoreError> {
        Ok(StatusView::from_session(&self.get(session_id)?, tail))
    }

    /// Last `n` log entries, oldest first
    pub fn log_tail(&self, session_id: &str, n: usize) -> Result<Vec<LogEntry>, StoreError> {
        let session = self.get(session_id)?;
        Ok(session.log_tail(n).to_vec())
    }

    /// Sessions, newest first
    pub fn list(&self, limit: usize) -> Result<Vec<SessionSummary>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, title, status, created_at, updated_at
            FROM sessions
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, title, status, created_at, updated_at)| {
                Ok(SessionSummary {
                    status: parse_status(&id, &status)?,
                    created_at: parse_time(&id, &created_at)?,
                    updated_at: parse_time(&id, &updated_at)?,
                    session_id: id,
                    title,
                })
            })
            .collect()
    }

    /// Ids of sessions that never reached a terminal state, oldest first
    pub fn list_resumable(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id FROM sessions
            WHERE status NOT IN ('COMPLETED', 'FAILED')
            ORDER BY created_at, rowid
            "#,
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Write the session record to `<dir>/<session_id>.json`
    pub fn export_json(&self, session_id: &str, dir: &Path) -> Result<PathBuf, StoreError> {
        let session = self.get(session_id)?;
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", session_id));
        std::fs::write(&path, serde_json::to_string_pretty(&session)?)?;
        tracing::info!("Exported session {} to {}", session_id, path.display());
        Ok(path)
    }

    fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

fn load_header(tx: &Transaction<'_>, session_id: &str) -> Result<Header, StoreError> {
    let (status, outputs): (String, String) = tx
        .query_row(
            "SELECT status, stage_outputs_json FROM sessions WHERE id = ?1",
            params![session_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;

    Ok(Header {
        status: parse_status(session_id, &status)?,
        stage_outputs: serde_json::from_str(&outputs)?,
    })
}

fn ensure_open(session_id: &str, status: SessionStatus) -> Result<(), StoreError> {
    if status.is_terminal() {
        return Err(StoreError::AlreadyTerminal {
            session_id: session_id.to_string(),
            status,
        });
    }
    Ok(())
}

fn touch(tx: &Transaction<'_>, session_id: &str, status: SessionStatus) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), stamp(Utc::now()), session_id],
    )?;
    Ok(())
}

fn push_log(
    tx: &Transaction<'_>,
    session_id: &str,
    level: LogLevel,
    message: &str,
) -> Result<LogEntry, StoreError> {
    let seq: i64 = tx.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM session_log WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;
    let timestamp = Utc::now();

    tx.execute(
        r#"
        INSERT INTO session_log (session_id, seq, timestamp, level, message)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![session_id, seq, stamp(timestamp), level.as_str(), message],
    )?;

    Ok(LogEntry {
        seq: seq as u64,
        timestamp,
        level,
        message: message.to_string(),
    })
}

fn trace_entry(session_id: &str, entry: &LogEntry) {
    match entry.level {
        LogLevel::Info => tracing::info!(session = session_id, "{}", entry.message),
        LogLevel::Warn => tracing::warn!(session = session_id, "{}", entry.message),
        LogLevel::Error => tracing::error!(session = session_id, "{}", entry.message),
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering
fn stamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_status(session_id: &str, raw: &str) -> Result<SessionStatus, StoreError> {
    SessionStatus::parse(raw).ok_or_else(|| StoreError::Corrupt {
        session_id: session_id.to_string(),
        reason: format!("unknown status '{}'", raw),
    })
}

fn parse_time(session_id: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            session_id: session_id.to_string(),
            reason: format!("bad timestamp '{}': {}", raw, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::plagiarism_skill::{PlagiarismReport, DISCLAIMER};
    use crate::state::session::RunMetrics;
    use crate::tools::SimilarityLevel;

    fn output(text: &str) -> StageOutput {
        StageOutput {
            text: text.to_string(),
            notes: Vec::new(),
            duration_ms: 1,
            attempts: 1,
            fallback: false,
            completed_at: Utc::now(),
            plagiarism: None,
        }
    }

    fn report() -> PaperReport {
        PaperReport {
            title: "Title".to_string(),
            research: "- finding".to_string(),
            draft: "draft".to_string(),
            edited: "edited".to_string(),
            edit_summary: vec!["No changes".to_string()],
            plagiarism: PlagiarismReport {
                score: 0.12,
                mean_score: 0.1,
                baseline: 1.0,
                level: SimilarityLevel::Low,
                references: 1,
                rationale: "little overlap".to_string(),
                disclaimer: DISCLAIMER.to_string(),
            },
            metrics: RunMetrics::default(),
        }
    }

    fn run_all_stages(store: &SessionStore, id: &str) {
        store.mark_running(id).unwrap();
        for stage in Stage::ALL {
            store.advance(id, stage, output(stage.as_str())).unwrap();
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = SessionStore::in_memory().unwrap();
        let id = store.create("Graph Neural Networks").unwrap();

        let session = store.get(&id).unwrap();
        assert_eq!(session.title, "Graph Neural Networks");
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(session.log.len(), 1);
        assert!(session.stage_outputs.is_empty());
        assert!(session.result.is_none() && session.error.is_none());
    }

    #[test]
    fn test_unknown_session_is_not_found() {
        let store = SessionStore::in_memory().unwrap();
        assert!(matches!(store.get("nope"), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.append_log("nope", LogLevel::Info, "x"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_log_is_ordered_and_append_only() {
        let store = SessionStore::in_memory().unwrap();
        let id = store.create("t").unwrap();
        store.append_log(&id, LogLevel::Info, "one").unwrap();
        let entry = store.append_log(&id, LogLevel::Warn, "two").unwrap();
        assert_eq!(entry.seq, 3);

        let log = store.get(&id).unwrap().log;
        let seqs: Vec<u64> = log.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(log[2].level, LogLevel::Warn);

        let tail = store.log_tail(&id, 2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[1].message, "two");
    }

    #[test]
    fn test_advance_enforces_canonical_order() {
        let store = SessionStore::in_memory().unwrap();
        let id = store.create("t").unwrap();

        // Not running yet
        let err = store.advance(&id, Stage::Research, output("r")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        store.mark_running(&id).unwrap();
        let err = store.advance(&id, Stage::Writer, output("w")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        let status = store.advance(&id, Stage::Research, output("r")).unwrap();
        assert_eq!(status, SessionStatus::StageResearch);

        // A stage is written at most once
        let err = store.advance(&id, Stage::Research, output("r2")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(store.get(&id).unwrap().output(Stage::Research).unwrap().text, "r");
    }

    #[test]
    fn test_complete_requires_all_stages() {
        let store = SessionStore::in_memory().unwrap();
        let id = store.create("t").unwrap();
        store.mark_running(&id).unwrap();
        store.advance(&id, Stage::Research, output("r")).unwrap();

        let err = store.complete(&id, &report()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn test_complete_then_terminal_is_immutable() {
        let store = SessionStore::in_memory().unwrap();
        let id = store.create("t").unwrap();
        run_all_stages(&store, &id);
        store.complete(&id, &report()).unwrap();

        let session = store.get(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.result, Some(report()));
        assert!(session.error.is_none());

        assert!(matches!(
            store.fail(&id, "pipeline", "late"),
            Err(StoreError::AlreadyTerminal { .. })
        ));
        assert!(matches!(
            store.complete(&id, &report()),
            Err(StoreError::AlreadyTerminal { .. })
        ));
        assert!(matches!(
            store.append_log(&id, LogLevel::Info, "late"),
            Err(StoreError::AlreadyTerminal { .. })
        ));
    }

    #[test]
    fn test_fail_from_any_open_state() {
        let store = SessionStore::in_memory().unwrap();
        let id = store.create("t").unwrap();
        store.fail(&id, "pipeline", "cancelled").unwrap();

        let session = store.get(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert!(session.result.is_none());
        let error = session.error.unwrap();
        assert_eq!(error.stage, "pipeline");
        assert_eq!(error.message, "cancelled");
        assert_eq!(session.log.last().unwrap().level, LogLevel::Error);
    }

    #[test]
    fn test_status_view_is_stable_for_terminal_sessions() {
        let store = SessionStore::in_memory().unwrap();
        let id = store.create("t").unwrap();
        run_all_stages(&store, &id);
        store.complete(&id, &report()).unwrap();

        let first = serde_json::to_string(&store.status(&id, 5).unwrap()).unwrap();
        let second = serde_json::to_string(&store.status(&id, 5).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_list_and_resumable() {
        let store = SessionStore::in_memory().unwrap();
        let done = store.create("done").unwrap();
        let open = store.create("open").unwrap();
        run_all_stages(&store, &done);
        store.complete(&done, &report()).unwrap();

        assert_eq!(store.list(10).unwrap().len(), 2);
        assert_eq!(store.list(1).unwrap().len(), 1);
        assert_eq!(store.list_resumable().unwrap(), vec![open]);
    }

    #[test]
    fn test_export_json_layout() {
        let store = SessionStore::in_memory().unwrap();
        let id = store.create("Exported").unwrap();
        let dir = tempfile::tempdir().unwrap();

        let path = store.export_json(&id, dir.path()).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["session_id"], id.as_str());
        assert_eq!(json["title"], "Exported");
        assert_eq!(json["status"], "PENDING");
        assert!(json["log"].is_array());
        assert!(json["stage_outputs"].is_object());
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paperflow.db");

        let id = {
            let store = SessionStore::new(&PaperflowDb::open_at(&path).unwrap());
            let id = store.create("durable").unwrap();
            store.mark_running(&id).unwrap();
            store.advance(&id, Stage::Research, output("- kept")).unwrap();
            id
        };

        let store = SessionStore::new(&PaperflowDb::open_at(&path).unwrap());
        let session = store.get(&id).unwrap();
        assert_eq!(session.status, SessionStatus::StageResearch);
        assert_eq!(session.output(Stage::Research).unwrap().text, "- kept");
    }

    #[test]
    fn test_concurrent_appends_keep_contiguous_sequence() {
        let store = Arc::new(SessionStore::in_memory().unwrap());
        let id = store.create("busy").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        store
                            .append_log(&id, LogLevel::Info, &format!("w{worker}-{i}"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let seqs: Vec<u64> = store.get(&id).unwrap().log.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (1..=41).collect::<Vec<u64>>());
    }

    #[test]
    fn test_reader_on_second_connection_sees_whole_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paperflow.db");
        let writer = SessionStore::new(&PaperflowDb::open_at(&path).unwrap());
        let reader = SessionStore::new(&PaperflowDb::open_at(&path).unwrap());

        let ids: Vec<String> = (0..20).map(|i| writer.create(&format!("t{i}")).unwrap()).collect();
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let handle = {
            let ids = ids.clone();
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                for id in &ids {
                    run_all_stages(&writer, id);
                }
                done.store(true, std::sync::atomic::Ordering::SeqCst);
            })
        };

        while !done.load(std::sync::atomic::Ordering::SeqCst) {
            for id in &ids {
                let session = reader.get(id).unwrap();
                let logged = session
                    .log
                    .iter()
                    .filter(|e| e.message.starts_with("Stage ") && e.message.contains(" completed in "))
                    .count();
                assert_eq!(logged, session.stage_outputs.len());
                let expected = match session.status {
                    SessionStatus::Pending | SessionStatus::Running => 0,
                    SessionStatus::StageResearch => 1,
                    SessionStatus::StageWriter => 2,
                    SessionStatus::StageEditor => 3,
                    _ => 4,
                };
                assert_eq!(session.stage_outputs.len(), expected);
            }
        }
        handle.join().unwrap();
    }
}
