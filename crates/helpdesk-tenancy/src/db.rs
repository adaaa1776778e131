//! Platform database: SQLite registry of tenants, staff users and audit events.
//!
//! Tenant *data* never lives here: each tenant owns its own store file
//! (see [`crate::store::TenantStore`]). This database only answers
//! "which tenants exist, are they active, and who may log into them".

use chrono::{DateTime, Utc};
use helpdesk_core::error::{HelpdeskError, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

/// Platform database manager.
pub struct PlatformDb {
    conn: Mutex<Connection>,
}

/// Tenant record.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub plan: String,
    pub active: bool,
    /// RFC 3339 end of the trial period, if the tenant is on trial.
    pub trial_ends_at: Option<String>,
    pub created_at: String,
}

impl Tenant {
    /// Deactivated tenants and tenants past their trial end are degraded:
    /// still readable, but flagged so the UI can offer an upgrade path.
    pub fn is_trial_expired(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return true;
        }
        self.trial_ends_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .is_some_and(|end| end.with_timezone(&Utc) < now)
    }
}

/// Staff user record.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: String,
    pub tenant_id: Option<String>,
    pub created_at: String,
}

/// Audit log entry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub event_type: String,
    pub actor_id: String,
    pub details: Option<String>,
    pub created_at: String,
}

/// Shared SELECT column list for tenant queries.
const TENANT_SELECT: &str =
    "SELECT id,name,slug,plan,active,trial_ends_at,created_at FROM tenants";

fn row_to_tenant(row: &rusqlite::Row) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        plan: row.get(3)?,
        active: row.get::<_, i64>(4)? != 0,
        trial_ends_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const USER_SELECT: &str = "SELECT id,email,role,tenant_id,created_at FROM users";

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        role: row.get(2)?,
        tenant_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn store_err(context: &str, e: impl std::fmt::Display) -> HelpdeskError {
    HelpdeskError::Store(format!("{context}: {e}"))
}

impl PlatformDb {
    /// Open or create the platform database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| store_err("Platform DB open error", e))?;

        // WAL lets readers proceed while a writer holds the lock.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| store_err("Platform DB pragma error", e))?;

        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| store_err("Platform DB lock poisoned", e))
    }

    /// Run schema migrations.
    fn migrate(&self) -> Result<()> {
        self.lock()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT UNIQUE NOT NULL,
                plan TEXT DEFAULT 'trial',
                active INTEGER DEFAULT 1,
                trial_ends_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT DEFAULT 'agent',
                tenant_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                details TEXT,
                created_at TEXT NOT NULL
            );
        ",
            )
            .map_err(|e| store_err("Migration error", e))
    }

    // ── Tenant CRUD ────────────────────────────────────

    /// Create a new tenant. `trial_days` starts a trial ending that many days from now.
    pub fn create_tenant(
        &self,
        name: &str,
        slug: &str,
        plan: &str,
        trial_days: Option<i64>,
    ) -> Result<Tenant> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let trial_ends_at = trial_days.map(|d| (now + chrono::Duration::days(d)).to_rfc3339());

        self.lock()?
            .execute(
                "INSERT INTO tenants (id, name, slug, plan, active, trial_ends_at, created_at) VALUES (?1,?2,?3,?4,1,?5,?6)",
                params![id, name, slug, plan, trial_ends_at, now.to_rfc3339()],
            )
            .map_err(|e| store_err("Insert tenant", e))?;

        self.get_tenant(&id)?
            .ok_or_else(|| HelpdeskError::TenantNotFound(id.clone()))
    }

    /// Get a tenant by ID.
    pub fn get_tenant(&self, id: &str) -> Result<Option<Tenant>> {
        self.lock()?
            .query_row(&format!("{TENANT_SELECT} WHERE id=?1"), params![id], row_to_tenant)
            .optional()
            .map_err(|e| store_err("Get tenant", e))
    }

    /// Get a tenant by its public slug.
    pub fn get_tenant_by_slug(&self, slug: &str) -> Result<Option<Tenant>> {
        self.lock()?
            .query_row(&format!("{TENANT_SELECT} WHERE slug=?1"), params![slug], row_to_tenant)
            .optional()
            .map_err(|e| store_err("Get tenant by slug", e))
    }

    /// List all tenants, newest first.
    pub fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{TENANT_SELECT} ORDER BY created_at DESC"))
            .map_err(|e| store_err("Prepare", e))?;
        let tenants = stmt
            .query_map([], row_to_tenant)
            .map_err(|e| store_err("Query", e))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(tenants)
    }

    /// Check if a slug is already taken.
    pub fn is_slug_taken(&self, slug: &str) -> bool {
        self.lock()
            .ok()
            .and_then(|conn| {
                conn.query_row("SELECT count(*) FROM tenants WHERE slug=?1", params![slug], |row| {
                    row.get::<_, i64>(0)
                })
                .ok()
            })
            .unwrap_or(0)
            > 0
    }

    /// Soft (de)activation. Tenants are never hard-deleted by normal flow.
    pub fn set_tenant_active(&self, id: &str, active: bool) -> Result<()> {
        let changed = self
            .lock()?
            .execute(
                "UPDATE tenants SET active=?1 WHERE id=?2",
                params![active as i64, id],
            )
            .map_err(|e| store_err("Update tenant", e))?;
        if changed == 0 {
            return Err(HelpdeskError::TenantNotFound(id.to_string()));
        }
        Ok(())
    }

    // ── Users ────────────────────────────────────

    pub fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        tenant_id: Option<&str>,
        role: &str,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.lock()?
            .execute(
                "INSERT INTO users (id, email, password_hash, role, tenant_id, created_at) VALUES (?1,?2,?3,?4,?5,?6)",
                params![id, email, password_hash, role, tenant_id, Utc::now().to_rfc3339()],
            )
            .map_err(|e| store_err("Insert user", e))?;
        Ok(id)
    }

    /// Look up a user and their password hash by email.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<(User, String)>> {
        self.lock()?
            .query_row(
                "SELECT id,email,role,tenant_id,created_at,password_hash FROM users WHERE email=?1",
                params![email],
                |row| Ok((row_to_user(row)?, row.get::<_, String>(5)?)),
            )
            .optional()
            .map_err(|e| store_err("Get user", e))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        self.lock()?
            .query_row(&format!("{USER_SELECT} WHERE id=?1"), params![id], row_to_user)
            .optional()
            .map_err(|e| store_err("Get user", e))
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{USER_SELECT} ORDER BY created_at"))
            .map_err(|e| store_err("Prepare", e))?;
        let users = stmt
            .query_map([], row_to_user)
            .map_err(|e| store_err("Query", e))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(users)
    }

    // ── Audit ────────────────────────────────────

    pub fn log_event(&self, event_type: &str, actor_id: &str, details: Option<&str>) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO audit_log (event_type, actor_id, details, created_at) VALUES (?1,?2,?3,?4)",
                params![event_type, actor_id, details, Utc::now().to_rfc3339()],
            )
            .map_err(|e| store_err("Log event", e))?;
        Ok(())
    }

    /// Most recent events first.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id,event_type,actor_id,details,created_at FROM audit_log ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| store_err("Prepare", e))?;
        let events = stmt
            .query_map(params![limit as i64], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    event_type: row.get(1)?,
                    actor_id: row.get(2)?,
                    details: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .map_err(|e| store_err("Query", e))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_db() -> PlatformDb {
        PlatformDb::open(&PathBuf::from(":memory:")).unwrap()
    }

    #[test]
    fn test_create_and_list_tenants() {
        let db = temp_db();
        let t = db.create_tenant("Acme", "acme", "pro", None).unwrap();
        assert_eq!(t.slug, "acme");
        assert!(t.active);
        assert!(t.trial_ends_at.is_none());

        db.create_tenant("Globex", "globex", "trial", Some(14)).unwrap();
        let tenants = db.list_tenants().unwrap();
        assert_eq!(tenants.len(), 2);
        assert!(db.is_slug_taken("globex"));
        assert!(!db.is_slug_taken("initech"));
    }

    #[test]
    fn test_duplicate_slug_rejected() {
        let db = temp_db();
        db.create_tenant("Acme", "acme", "pro", None).unwrap();
        assert!(db.create_tenant("Acme 2", "acme", "pro", None).is_err());
    }

    #[test]
    fn test_lookup_by_slug_and_missing() {
        let db = temp_db();
        let t = db.create_tenant("Acme", "acme", "pro", None).unwrap();
        assert_eq!(db.get_tenant_by_slug("acme").unwrap().unwrap().id, t.id);
        assert!(db.get_tenant("nope").unwrap().is_none());
        assert!(db.get_tenant_by_slug("nope").unwrap().is_none());
    }

    #[test]
    fn test_soft_deactivation() {
        let db = temp_db();
        let t = db.create_tenant("Acme", "acme", "pro", None).unwrap();
        db.set_tenant_active(&t.id, false).unwrap();
        let t = db.get_tenant(&t.id).unwrap().unwrap();
        assert!(!t.active);
        assert!(t.is_trial_expired(Utc::now()));
        assert!(db.set_tenant_active("missing", false).is_err());
    }

    #[test]
    fn test_trial_expiry() {
        let db = temp_db();
        let t = db.create_tenant("Trial", "trial", "trial", Some(7)).unwrap();
        assert!(!t.is_trial_expired(Utc::now()));
        assert!(t.is_trial_expired(Utc::now() + chrono::Duration::days(8)));
    }

    #[test]
    fn test_user_crud() {
        let db = temp_db();
        let t = db.create_tenant("Acme", "acme", "pro", None).unwrap();
        let id = db
            .create_user("agent@acme.test", "salt$hash", Some(&t.id), "agent")
            .unwrap();

        let (user, hash) = db.get_user_by_email("agent@acme.test").unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.tenant_id.as_deref(), Some(t.id.as_str()));
        assert_eq!(hash, "salt$hash");

        assert_eq!(db.get_user_by_id(&id).unwrap().unwrap().email, "agent@acme.test");
        assert!(db.get_user_by_email("nobody@acme.test").unwrap().is_none());
        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_audit_log() {
        let db = temp_db();
        db.log_event("tenant_created", "system", Some("slug=acme")).unwrap();
        db.log_event("tenant_deactivated", "admin", None).unwrap();

        let events = db.recent_events(10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "tenant_deactivated"); // most recent first
    }
}
