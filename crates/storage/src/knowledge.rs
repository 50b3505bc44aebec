use chrono::{DateTime, Utc};
use conductor_core::{Error, KnowledgeItem, KnowledgeProposal, ProposalStatus, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

/// Curated topic -> content store.
///
/// All writes go through the proposal path: `propose_write` stages an
/// item and nothing touches the curated table until `confirm`.
pub trait KnowledgeStore: Send + Sync {
    fn read(&self, topic: &str) -> Result<Option<KnowledgeItem>>;

    /// Stage a write for external confirmation; returns the proposal id.
    fn propose_write(&self, item: KnowledgeItem) -> Result<String>;

    /// Apply a pending proposal to the curated table. An existing
    /// `best_practice = true` flag is never cleared by a confirmation.
    fn confirm(&self, proposal_id: &str) -> Result<KnowledgeItem>;

    fn reject(&self, proposal_id: &str) -> Result<()>;

    fn pending_proposals(&self) -> Result<Vec<KnowledgeProposal>>;
}

/// SQLite-backed knowledge store.
#[derive(Clone)]
pub struct SqliteKnowledgeStore {
    inner: Arc<Mutex<Connection>>,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteKnowledgeStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create db directory: {}", e)))?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| Error::Storage(format!("Failed to open knowledge db: {}", e)))?;
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
            "CREATE TABLE IF NOT EXISTS knowledge (
                topic TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                linked_spans TEXT NOT NULL,
                best_practice INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS proposals (
                proposal_id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                content TEXT NOT NULL,
                linked_spans TEXT NOT NULL,
                best_practice INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )
        .map_err(|e| Error::Storage(format!("Failed to init knowledge schema: {}", e)))?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.inner
            .lock()
            .map_err(|e| Error::Storage(format!("Lock error: {}", e)))
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeItem> {
    let spans_json: String = row.get("linked_spans")?;
    Ok(KnowledgeItem {
        topic: row.get("topic")?,
        content: row.get("content")?,
        linked_spans: serde_json::from_str(&spans_json).unwrap_or_default(),
        best_practice: row.get::<_, i64>("best_practice")? != 0,
    })
}

fn row_to_proposal(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeProposal> {
    let spans_json: String = row.get("linked_spans")?;
    let status_str: String = row.get("status")?;
    let created_str: String = row.get("created_at")?;
    Ok(KnowledgeProposal {
        proposal_id: row.get("proposal_id")?,
        item: KnowledgeItem {
            topic: row.get("topic")?,
            content: row.get("content")?,
            linked_spans: serde_json::from_str(&spans_json).unwrap_or_default(),
            best_practice: row.get::<_, i64>("best_practice")? != 0,
        },
        status: ProposalStatus::parse(&status_str).unwrap_or(ProposalStatus::Pending),
        created_at: DateTime::parse_from_rfc3339(&created_str)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

impl KnowledgeStore for SqliteKnowledgeStore {
    fn read(&self, topic: &str) -> Result<Option<KnowledgeItem>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM knowledge WHERE topic = ?1",
            params![topic],
            row_to_item,
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Failed to read topic: {}", e)))
    }

    fn propose_write(&self, item: KnowledgeItem) -> Result<String> {
        let proposal_id = Uuid::new_v4().to_string();
        let spans_json = serde_json::to_string(&item.linked_spans)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO proposals (proposal_id, topic, content, linked_spans,
                                    best_practice, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                proposal_id,
                item.topic,
                item.content,
                spans_json,
                item.best_practice as i64,
                ProposalStatus::Pending.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to stage proposal: {}", e)))?;
        debug!(proposal_id = %proposal_id, topic = %item.topic, "Knowledge write proposed");
        Ok(proposal_id)
    }

    fn confirm(&self, proposal_id: &str) -> Result<KnowledgeItem> {
        let conn = self.lock()?;
        let proposal = conn
            .query_row(
                "SELECT * FROM proposals WHERE proposal_id = ?1",
                params![proposal_id],
                row_to_proposal,
            )
            .optional()
            .map_err(|e| Error::Storage(format!("Failed to read proposal: {}", e)))?
            .ok_or_else(|| Error::NotFound(format!("Proposal {}", proposal_id)))?;

        if proposal.status != ProposalStatus::Pending {
            return Err(Error::Validation(format!(
                "Proposal {} is already {}",
                proposal_id,
                proposal.status.as_str()
            )));
        }

        // best_practice is sticky: once true it survives later writes
        let existing_best: Option<i64> = conn
            .query_row(
                "SELECT best_practice FROM knowledge WHERE topic = ?1",
                params![proposal.item.topic],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Storage(format!("Failed to read topic: {}", e)))?;
        let best_practice = proposal.item.best_practice || existing_best.unwrap_or(0) != 0;

        let spans_json = serde_json::to_string(&proposal.item.linked_spans)?;
        conn.execute(
            "INSERT INTO knowledge (topic, content, linked_spans, best_practice, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(topic) DO UPDATE SET
                content = excluded.content,
                linked_spans = excluded.linked_spans,
                best_practice = excluded.best_practice,
                updated_at = excluded.updated_at",
            params![
                proposal.item.topic,
                proposal.item.content,
                spans_json,
                best_practice as i64,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to apply proposal: {}", e)))?;

        conn.execute(
            "UPDATE proposals SET status = ?1 WHERE proposal_id = ?2",
            params![ProposalStatus::Confirmed.as_str(), proposal_id],
        )
        .map_err(|e| Error::Storage(format!("Failed to mark proposal: {}", e)))?;

        info!(topic = %proposal.item.topic, best_practice, "Knowledge proposal confirmed");
        Ok(KnowledgeItem {
            best_practice,
            ..proposal.item
        })
    }

    fn reject(&self, proposal_id: &str) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE proposals SET status = ?1 WHERE proposal_id = ?2 AND status = ?3",
                params![
                    ProposalStatus::Rejected.as_str(),
                    proposal_id,
                    ProposalStatus::Pending.as_str()
                ],
            )
            .map_err(|e| Error::Storage(format!("Failed to reject proposal: {}", e)))?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Pending proposal {}", proposal_id)));
        }
        Ok(())
    }

    fn pending_proposals(&self) -> Result<Vec<KnowledgeProposal>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM proposals WHERE status = ?1 ORDER BY created_at")
            .map_err(|e| Error::Storage(format!("Query prepare failed: {}", e)))?;
        let rows = stmt
            .query_map(params![ProposalStatus::Pending.as_str()], row_to_proposal)
            .map_err(|e| Error::Storage(format!("Query failed: {}", e)))?;
        let mut proposals = Vec::new();
        for row in rows {
            proposals.push(row.map_err(|e| Error::Storage(format!("Row error: {}", e)))?);
        }
        Ok(proposals)
    }
}
