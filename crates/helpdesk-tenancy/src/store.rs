//! Per-tenant SQLite store.
//!
//! Each tenant owns exactly one database file. The connection sits behind a
//! mutex, so every read and write against a tenant store is serialized;
//! concurrent requests for the same tenant queue up instead of interleaving.

use chrono::Utc;
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::{Article, ChatMessage, KnowledgeEntry, KnowledgeSource, Role};
use rusqlite::{Connection, OptionalExtension, Params, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Tenant data store: knowledge, help-center articles, livechat history, settings.
pub struct TenantStore {
    conn: Mutex<Connection>,
}

fn store_err(context: &str, e: impl std::fmt::Display) -> HelpdeskError {
    HelpdeskError::Store(format!("{context}: {e}"))
}

const ENTRY_SELECT: &str =
    "SELECT id,title,content,source,active,created_at,updated_at FROM knowledge_entries";

fn row_to_entry(row: &Row) -> rusqlite::Result<KnowledgeEntry> {
    Ok(KnowledgeEntry {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        source: KnowledgeSource::parse(&row.get::<_, String>(3)?),
        active: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const ARTICLE_SELECT: &str =
    "SELECT id,title,slug,excerpt,body,published,created_at FROM articles";

fn row_to_article(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        excerpt: row.get(3)?,
        body: row.get(4)?,
        published: row.get::<_, i64>(5)? != 0,
        created_at: row.get(6)?,
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<ChatMessage> {
    let role: String = row.get(2)?;
    Ok(ChatMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: Role::parse(&role).unwrap_or(Role::User),
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl TenantStore {
    /// Open or create a tenant store. Creates the file on first access.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| store_err("Tenant store open error", e))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| store_err("Tenant store pragma error", e))?;

        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| store_err("Tenant store lock poisoned", e))
    }

    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS knowledge_entries (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                source TEXT DEFAULT 'text',
                active INTEGER DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS articles (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                slug TEXT UNIQUE NOT NULL,
                excerpt TEXT DEFAULT '',
                body TEXT DEFAULT '',
                published INTEGER DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chat_conversation ON chat_messages(conversation_id);

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT DEFAULT '',
                updated_at TEXT NOT NULL
            );
        ",
            )
            .map_err(|e| store_err("Migration error", e))
    }

    // ── Query primitives ────────────────────────────────────

    /// Fetch at most one row.
    pub fn query_one<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.lock()?
            .query_row(sql, params, f)
            .optional()
            .map_err(|e| store_err("Query one", e))
    }

    /// Fetch all matching rows. Rows that fail to map are an error, not skipped.
    pub fn query_many<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(|e| store_err("Prepare", e))?;
        let rows = stmt
            .query_map(params, f)
            .map_err(|e| store_err("Query many", e))?;
        rows.collect::<rusqlite::Result<Vec<T>>>()
            .map_err(|e| store_err("Row mapping", e))
    }

    /// Execute a statement, returning the number of affected rows.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.lock()?
            .execute(sql, params)
            .map_err(|e| store_err("Execute", e))
    }

    // ── Knowledge entries ────────────────────────────────────

    pub fn create_entry(
        &self,
        title: &str,
        content: &str,
        source: KnowledgeSource,
    ) -> Result<KnowledgeEntry> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.execute(
            "INSERT INTO knowledge_entries (id, title, content, source, active, created_at, updated_at) VALUES (?1,?2,?3,?4,1,?5,?5)",
            params![id, title, content, source.as_str(), now],
        )?;
        self.get_entry(&id)?
            .ok_or_else(|| HelpdeskError::NotFound(format!("knowledge entry {id}")))
    }

    pub fn get_entry(&self, id: &str) -> Result<Option<KnowledgeEntry>> {
        self.query_one(&format!("{ENTRY_SELECT} WHERE id=?1"), params![id], row_to_entry)
    }

    /// All entries in insertion order.
    pub fn list_entries(&self) -> Result<Vec<KnowledgeEntry>> {
        self.query_many(&format!("{ENTRY_SELECT} ORDER BY created_at, rowid"), [], row_to_entry)
    }

    /// Entries eligible for retrieval.
    pub fn list_active_entries(&self) -> Result<Vec<KnowledgeEntry>> {
        self.query_many(
            &format!("{ENTRY_SELECT} WHERE active=1 ORDER BY created_at, rowid"),
            [],
            row_to_entry,
        )
    }

    /// Returns false when no entry has that id.
    pub fn update_entry(&self, id: &str, title: &str, content: &str) -> Result<bool> {
        let n = self.execute(
            "UPDATE knowledge_entries SET title=?1, content=?2, updated_at=?3 WHERE id=?4",
            params![title, content, Utc::now().to_rfc3339(), id],
        )?;
        Ok(n > 0)
    }

    /// Flip the active flag, returning the new state.
    pub fn toggle_entry(&self, id: &str) -> Result<Option<bool>> {
        let n = self.execute(
            "UPDATE knowledge_entries SET active = 1 - active, updated_at=?1 WHERE id=?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        if n == 0 {
            return Ok(None);
        }
        Ok(self.get_entry(id)?.map(|e| e.active))
    }

    pub fn delete_entry(&self, id: &str) -> Result<bool> {
        Ok(self.execute("DELETE FROM knowledge_entries WHERE id=?1", params![id])? > 0)
    }

    pub fn count_entries(&self) -> Result<usize> {
        let n = self
            .query_one("SELECT COUNT(*) FROM knowledge_entries", [], |r| r.get::<_, i64>(0))?
            .unwrap_or(0);
        Ok(n as usize)
    }

    // ── Help-center articles ────────────────────────────────────

    pub fn create_article(
        &self,
        title: &str,
        slug: &str,
        excerpt: &str,
        body: &str,
        published: bool,
    ) -> Result<Article> {
        let id = uuid::Uuid::new_v4().to_string();
        self.execute(
            "INSERT INTO articles (id, title, slug, excerpt, body, published, created_at) VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![id, title, slug, excerpt, body, published as i64, Utc::now().to_rfc3339()],
        )?;
        self.query_one(&format!("{ARTICLE_SELECT} WHERE id=?1"), params![id], row_to_article)?
            .ok_or_else(|| HelpdeskError::NotFound(format!("article {id}")))
    }

    pub fn list_articles(&self) -> Result<Vec<Article>> {
        self.query_many(&format!("{ARTICLE_SELECT} ORDER BY created_at, rowid"), [], row_to_article)
    }

    pub fn list_published_articles(&self) -> Result<Vec<Article>> {
        self.query_many(
            &format!("{ARTICLE_SELECT} WHERE published=1 ORDER BY created_at, rowid"),
            [],
            row_to_article,
        )
    }

    pub fn set_article_published(&self, id: &str, published: bool) -> Result<bool> {
        let n = self.execute(
            "UPDATE articles SET published=?1 WHERE id=?2",
            params![published as i64, id],
        )?;
        Ok(n > 0)
    }

    // ── Livechat history ────────────────────────────────────

    pub fn append_message(&self, conversation_id: &str, role: Role, content: &str) -> Result<ChatMessage> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO chat_messages (conversation_id, role, content, created_at) VALUES (?1,?2,?3,?4)",
            params![conversation_id, role.as_str(), content, now],
        )
        .map_err(|e| store_err("Append message", e))?;
        Ok(ChatMessage {
            id: conn.last_insert_rowid(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: now,
        })
    }

    /// The last `limit` messages of a conversation, oldest first.
    pub fn history(&self, conversation_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let mut messages = self.query_many(
            "SELECT id,conversation_id,role,content,created_at FROM chat_messages WHERE conversation_id=?1 ORDER BY id DESC LIMIT ?2",
            params![conversation_id, limit as i64],
            row_to_message,
        )?;
        messages.reverse();
        Ok(messages)
    }

    // ── Settings ────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.query_one("SELECT value FROM settings WHERE key=?1", params![key], |r| r.get(0))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1,?2,?3) ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
