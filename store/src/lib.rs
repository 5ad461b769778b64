//! SQLite-backed storage for Scribe.
//!
//! Holds the conversation log, long-term memory facts and the idea bank.
//! Every statement runs through one async mutex - a single-writer
//! discipline that trades read throughput for write ordering per session
//! and crash consistency. `close()` empties the connection slot; later
//! calls fail with [`StoreError::Closed`] instead of touching a dead
//! handle.

use std::path::Path;

use rusqlite::{params, Connection};
use thiserror::Error;
use tokio::sync::Mutex;

use scribe_types::{
    ChatMessage, IdeaSource, IdeaStatus, MemoryFact, MemoryKind, MemoryUpdate, MessageKind,
    NewIdea, Role,
};

/// Storage operation failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store is closed")]
    Closed,
    #[error("failed to prepare database path: {0}")]
    Path(#[from] std::io::Error),
}

/// A stored idea with its metadata.
#[derive(Debug, Clone)]
pub struct Idea {
    pub id: i64,
    pub content: String,
    pub status: IdeaStatus,
    pub source: IdeaSource,
    pub created_at: String,
}

/// Persistent store shared by all message units.
pub struct Store {
    conn: Mutex<Option<Connection>>,
}

impl Store {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS conversations (
            id INTEGER PRIMARY KEY,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            message_type TEXT NOT NULL DEFAULT 'text',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_session
        ON conversations(session_id, id);

        CREATE TABLE IF NOT EXISTS memory (
            id INTEGER PRIMARY KEY,
            kind TEXT NOT NULL,
            content TEXT NOT NULL,
            importance INTEGER NOT NULL DEFAULT 5,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_memory_importance
        ON memory(importance);

        CREATE TABLE IF NOT EXISTS ideas (
            id INTEGER PRIMARY KEY,
            content TEXT NOT NULL,
            source TEXT NOT NULL DEFAULT 'manual',
            tags TEXT,
            status TEXT NOT NULL DEFAULT 'new',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT,
            deleted_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_ideas_status
        ON ideas(status);
    ";

    /// Open or create the database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self::initialize(conn)?;
        tracing::info!(path = %path.display(), "database opened");
        Ok(store)
    }

    /// Open an in-memory store (tests).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;
        conn.execute_batch(Self::SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Close the connection. Later operations fail with `Closed`.
    pub async fn close(&self) {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.take() {
            if let Err((_conn, error)) = conn.close() {
                tracing::error!(error = %error, "database close failed");
            } else {
                tracing::info!("database closed");
            }
        }
    }

    /// Last `limit` turns of a session, oldest first.
    pub async fn fetch_recent_turns(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        let mut stmt = conn.prepare(
            "SELECT role, content FROM conversations
             WHERE session_id = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id, limit as i64], |row| {
            let role: String = row.get(0)?;
            let content: String = row.get(1)?;
            Ok((role, content))
        })?;

        let mut turns = Vec::new();
        for row in rows {
            let (role, content) = row?;
            let Ok(role) = Role::parse(&role) else {
                continue;
            };
            turns.push(ChatMessage { role, content });
        }
        turns.reverse();
        Ok(turns)
    }

    /// Facts at or above `min_importance`, most important first.
    pub async fn fetch_high_importance_facts(
        &self,
        min_importance: i64,
        limit: usize,
    ) -> Result<Vec<MemoryFact>, StoreError> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        let mut stmt = conn.prepare(
            "SELECT kind, content, importance FROM memory
             WHERE importance >= ?1
             ORDER BY importance DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![min_importance, limit as i64], |row| {
            let kind: String = row.get(0)?;
            let content: String = row.get(1)?;
            let importance: i64 = row.get(2)?;
            Ok((kind, content, importance))
        })?;

        let mut facts = Vec::new();
        for row in rows {
            let (kind, content, importance) = row?;
            let Ok(kind) = MemoryKind::parse(&kind) else {
                continue;
            };
            facts.push(MemoryFact {
                kind,
                content,
                importance,
            });
        }
        Ok(facts)
    }

    /// Append one conversation turn.
    pub async fn append_turn(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        message_type: MessageKind,
    ) -> Result<i64, StoreError> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        conn.execute(
            "INSERT INTO conversations (session_id, role, content, message_type)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, role.as_str(), content, message_type.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Persist one memory fact requested by a skill.
    pub async fn record_memory(&self, update: &MemoryUpdate) -> Result<i64, StoreError> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        conn.execute(
            "INSERT INTO memory (kind, content, importance) VALUES (?1, ?2, ?3)",
            params![update.kind.as_str(), update.content, update.importance],
        )?;
        tracing::debug!(kind = update.kind.as_str(), importance = update.importance, "memory updated");
        Ok(conn.last_insert_rowid())
    }

    /// Add a new idea to the bank.
    pub async fn add_idea(&self, idea: &NewIdea) -> Result<i64, StoreError> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        let tags = if idea.tags.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&idea.tags).unwrap_or_default())
        };
        conn.execute(
            "INSERT INTO ideas (content, source, tags) VALUES (?1, ?2, ?3)",
            params![idea.content, idea.source.as_str(), tags],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List ideas, newest first, optionally filtered by status.
    /// Soft-deleted ideas are excluded.
    pub async fn list_ideas(
        &self,
        status: Option<IdeaStatus>,
        limit: usize,
    ) -> Result<Vec<Idea>, StoreError> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        let mut stmt = conn.prepare(
            "SELECT id, content, status, source, created_at FROM ideas
             WHERE deleted_at IS NULL AND (?1 IS NULL OR status = ?1)
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            params![status.map(IdeaStatus::as_str), limit as i64],
            idea_from_row,
        )?;

        collect_ideas(rows)
    }

    /// Search idea contents, newest first.
    pub async fn search_ideas(&self, query: &str, limit: usize) -> Result<Vec<Idea>, StoreError> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        let pattern = format!("%{query}%");
        let mut stmt = conn.prepare(
            "SELECT id, content, status, source, created_at FROM ideas
             WHERE deleted_at IS NULL AND content LIKE ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![pattern, limit as i64], idea_from_row)?;

        collect_ideas(rows)
    }

    /// Move an idea through its lifecycle. Returns false for missing or
    /// soft-deleted ids.
    pub async fn set_idea_status(&self, id: i64, status: IdeaStatus) -> Result<bool, StoreError> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        let updated = conn.execute(
            "UPDATE ideas SET status = ?1, updated_at = datetime('now')
             WHERE id = ?2 AND deleted_at IS NULL",
            params![status.as_str(), id],
        )?;
        Ok(updated > 0)
    }

    /// Soft-delete an idea.
    pub async fn delete_idea(&self, id: i64) -> Result<bool, StoreError> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;

        let updated = conn.execute(
            "UPDATE ideas SET deleted_at = datetime('now') WHERE id = ?1 AND deleted_at IS NULL",
            params![id],
        )?;
        Ok(updated > 0)
    }
}

type IdeaRow = (i64, String, String, String, String);

fn idea_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IdeaRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn collect_ideas(
    rows: impl Iterator<Item = rusqlite::Result<IdeaRow>>,
) -> Result<Vec<Idea>, StoreError> {
    let mut ideas = Vec::new();
    for row in rows {
        let (id, content, status, source, created_at) = row?;
        let Ok(status) = IdeaStatus::parse(&status) else {
            continue;
        };
        let source = match source.as_str() {
            "voice" => IdeaSource::Voice,
            "screenshot" => IdeaSource::Screenshot,
            "generated" => IdeaSource::Generated,
            _ => IdeaSource::Manual,
        };
        ideas.push(Idea {
            id,
            content,
            status,
            source,
            created_at,
        });
    }
    Ok(ideas)
}
