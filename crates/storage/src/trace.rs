use chrono::{DateTime, Utc};
use conductor_core::{Error, NewSpan, Outcome, Result, Span, TaskStats};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// Window of recent spans used when computing per-task stats.
const STATS_WINDOW: usize = 50;

/// Append-only log of execution spans and their reward outcomes.
///
/// Narrow seam so the ranker and workflow machine never reach into
/// process-wide state; a test double that returns errors exercises the
/// degrade-gracefully path.
pub trait TraceStore: Send + Sync {
    /// Append a span, returning its assigned id.
    fn append(&self, span: NewSpan) -> Result<String>;

    fn get(&self, span_id: &str) -> Result<Option<Span>>;

    /// Record the reward for a span. Set exactly once; a second call is
    /// a validation error.
    fn set_reward(&self, span_id: &str, reward: f64, metadata: serde_json::Value) -> Result<()>;

    /// Rewarded spans for a task type with `reward >= min_reward`,
    /// ranked by reward then recency.
    fn query(&self, task_type: &str, min_reward: f64, limit: usize) -> Result<Vec<Span>>;

    /// Most recent spans for a task type regardless of reward.
    fn recent(&self, task_type: &str, limit: usize) -> Result<Vec<Span>>;

    /// Success/failure rates over the most recent spans for a task type.
    /// Superseded spans are excluded.
    fn stats(&self, task_type: &str) -> Result<TaskStats>;
}

/// SQLite-backed trace store.
#[derive(Clone)]
pub struct SqliteTraceStore {
    inner: Arc<Mutex<Connection>>,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteTraceStore {
    /// Open (or create) the trace database at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create db directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| Error::Storage(format!("Failed to open trace db: {}", e)))?;

        // WAL for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();

        let store = Self {
            inner: Arc::new(Mutex::new(conn)),
            db_path: db_path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS spans (
                span_id TEXT PRIMARY KEY,
                task_type TEXT NOT NULL,
                query_text TEXT NOT NULL,
                selected_capabilities TEXT NOT NULL,
                outcome TEXT NOT NULL,
                reward REAL,
                reward_metadata TEXT,
                timestamp TEXT NOT NULL,
                context_snapshot TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_spans_task_reward
                ON spans(task_type, reward);
            CREATE INDEX IF NOT EXISTS idx_spans_task_time
                ON spans(task_type, timestamp);",
        )
        .map_err(|e| Error::Storage(format!("Failed to init trace schema: {}", e)))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.inner
            .lock()
            .map_err(|e| Error::Storage(format!("Lock error: {}", e)))
    }
}

fn row_to_span(row: &rusqlite::Row<'_>) -> rusqlite::Result<Span> {
    let caps_json: String = row.get("selected_capabilities")?;
    let outcome_str: String = row.get("outcome")?;
    let ts_str: String = row.get("timestamp")?;
    let ctx_json: String = row.get("context_snapshot")?;

    Ok(Span {
        span_id: row.get("span_id")?,
        task_type: row.get("task_type")?,
        query_text: row.get("query_text")?,
        selected_capabilities: serde_json::from_str(&caps_json).unwrap_or_default(),
        outcome: Outcome::parse(&outcome_str).unwrap_or(Outcome::Failure),
        reward: row.get("reward")?,
        timestamp: DateTime::parse_from_rfc3339(&ts_str)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        context_snapshot: serde_json::from_str(&ctx_json).unwrap_or(serde_json::Value::Null),
    })
}

impl TraceStore for SqliteTraceStore {
    fn append(&self, span: NewSpan) -> Result<String> {
        if let Some(r) = span.reward {
            if !(0.0..=1.0).contains(&r) {
                return Err(Error::Validation(format!("Reward out of range: {}", r)));
            }
        }
        let span_id = Uuid::new_v4().to_string();
        let timestamp = span.timestamp.unwrap_or_else(Utc::now);
        let caps_json = serde_json::to_string(&span.selected_capabilities)?;
        let ctx_json = serde_json::to_string(&span.context_snapshot)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO spans (span_id, task_type, query_text, selected_capabilities,
                                outcome, reward, reward_metadata, timestamp, context_snapshot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8)",
            params![
                span_id,
                span.task_type,
                span.query_text,
                caps_json,
                span.outcome.as_str(),
                span.reward,
                timestamp.to_rfc3339(),
                ctx_json,
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to append span: {}", e)))?;

        debug!(span_id = %span_id, task_type = %span.task_type, outcome = %span.outcome, "Span appended");
        Ok(span_id)
    }

    fn get(&self, span_id: &str) -> Result<Option<Span>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM spans WHERE span_id = ?1",
            params![span_id],
            row_to_span,
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Failed to read span: {}", e)))
    }

    fn set_reward(&self, span_id: &str, reward: f64, metadata: serde_json::Value) -> Result<()> {
        if !(0.0..=1.0).contains(&reward) {
            return Err(Error::Validation(format!("Reward out of range: {}", reward)));
        }
        let conn = self.lock()?;
        let existing: Option<Option<f64>> = conn
            .query_row(
                "SELECT reward FROM spans WHERE span_id = ?1",
                params![span_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Storage(format!("Failed to read span: {}", e)))?;

        match existing {
            None => return Err(Error::NotFound(format!("Span {}", span_id))),
            Some(Some(_)) => {
                return Err(Error::Validation(format!(
                    "Reward already recorded for span {}",
                    span_id
                )))
            }
            Some(None) => {}
        }

        let meta_json = serde_json::to_string(&metadata)?;
        conn.execute(
            "UPDATE spans SET reward = ?1, reward_metadata = ?2 WHERE span_id = ?3",
            params![reward, meta_json, span_id],
        )
        .map_err(|e| Error::Storage(format!("Failed to set reward: {}", e)))?;
        debug!(span_id = %span_id, reward, "Reward recorded");
        Ok(())
    }

    fn query(&self, task_type: &str, min_reward: f64, limit: usize) -> Result<Vec<Span>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM spans
                 WHERE task_type = ?1 AND reward IS NOT NULL AND reward >= ?2
                 ORDER BY reward DESC, timestamp DESC
                 LIMIT ?3",
            )
            .map_err(|e| Error::Storage(format!("Query prepare failed: {}", e)))?;
        let rows = stmt
            .query_map(params![task_type, min_reward, limit as i64], row_to_span)
            .map_err(|e| Error::Storage(format!("Query failed: {}", e)))?;

        let mut spans = Vec::new();
        for row in rows {
            match row {
                Ok(span) => spans.push(span),
                Err(e) => warn!(error = %e, "Skipping unreadable span row"),
            }
        }
        Ok(spans)
    }

    fn recent(&self, task_type: &str, limit: usize) -> Result<Vec<Span>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM spans
                 WHERE task_type = ?1
                 ORDER BY timestamp DESC
                 LIMIT ?2",
            )
            .map_err(|e| Error::Storage(format!("Query prepare failed: {}", e)))?;
        let rows = stmt
            .query_map(params![task_type, limit as i64], row_to_span)
            .map_err(|e| Error::Storage(format!("Query failed: {}", e)))?;

        let mut spans = Vec::new();
        for row in rows {
            match row {
                Ok(span) => spans.push(span),
                Err(e) => warn!(error = %e, "Skipping unreadable span row"),
            }
        }
        Ok(spans)
    }

    fn stats(&self, task_type: &str) -> Result<TaskStats> {
        let recent = self.recent(task_type, STATS_WINDOW)?;
        let counted: Vec<&Span> = recent
            .iter()
            .filter(|s| s.outcome != Outcome::Superseded)
            .collect();
        if counted.is_empty() {
            return Ok(TaskStats::default());
        }
        let total = counted.len();
        let successes = counted
            .iter()
            .filter(|s| s.outcome == Outcome::Success)
            .count();
        Ok(TaskStats {
            total,
            success_rate: successes as f64 / total as f64,
            failure_rate: (total - successes) as f64 / total as f64,
        })
    }
}
