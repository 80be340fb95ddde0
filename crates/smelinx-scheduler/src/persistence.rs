//! SQLite-backed notification store.
//!
//! One connection behind a mutex. Every store operation holds the lock for
//! its whole read-check-write sequence, so per-record updates are atomic
//! with respect to other users of the same `NotifyDb`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use smelinx_core::error::{Result, SmelinxError};

use crate::notification::{DueNotification, Notification, NotificationKind, NotificationStatus};
use crate::store::{DEFAULT_DUE_LIMIT, NotificationStore};

const NOTIFICATION_COLUMNS: &str = "id, api_id, version_id, type, scheduled_at, status, attempts, \
     retry_after, last_error, created_at";

/// Input for [`NotifyDb::create_api`].
#[derive(Debug, Clone, Default)]
pub struct NewApi {
    pub org_id: String,
    pub name: String,
    pub description: String,
    pub base_url: Option<String>,
    pub docs_url: Option<String>,
    pub contact_email: Option<String>,
    pub owner_team: Option<String>,
}

pub struct NotifyDb {
    conn: Mutex<Connection>,
}

impl NotifyDb {
    /// Open or create the database at `path` (`:memory:` for an ephemeral one).
    pub fn open(path: &Path) -> Result<Self> {
        if path != Path::new(":memory:") {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(db_err("DB open"))?;
        Self::from_connection(conn)
    }

    /// Wrap an existing connection and bring its schema up to date.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        // WAL is unavailable for in-memory databases; not fatal.
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(db_err("Enable foreign keys"))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SmelinxError::Store(format!("Lock: {e}")))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS organizations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS apis (
                id TEXT PRIMARY KEY,
                org_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                deleted_at TEXT
            );

            CREATE TABLE IF NOT EXISTS api_versions (
                id TEXT PRIMARY KEY,
                api_id TEXT NOT NULL REFERENCES apis(id) ON DELETE CASCADE,
                version TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                sunset_date TEXT,
                created_at TEXT NOT NULL,
                deleted_at TEXT,
                UNIQUE(api_id, version)
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                api_id TEXT NOT NULL REFERENCES apis(id) ON DELETE CASCADE,
                version_id TEXT NOT NULL REFERENCES api_versions(id) ON DELETE CASCADE,
                type TEXT NOT NULL CHECK (type IN ('deprecate', 'sunset')),
                scheduled_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'sent', 'canceled')),
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(db_err("Migration"))?;

        // Columns added after the first release; older databases lack them.
        add_column_if_missing(&conn, "apis", "base_url", "TEXT")?;
        add_column_if_missing(&conn, "apis", "docs_url", "TEXT")?;
        add_column_if_missing(&conn, "apis", "contact_email", "TEXT")?;
        add_column_if_missing(&conn, "apis", "owner_team", "TEXT")?;
        add_column_if_missing(&conn, "notifications", "attempts", "INTEGER NOT NULL DEFAULT 0")?;
        add_column_if_missing(&conn, "notifications", "retry_after", "TEXT")?;
        add_column_if_missing(&conn, "notifications", "last_error", "TEXT")?;

        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_notifications_status_sched
                 ON notifications(status, scheduled_at);
             CREATE INDEX IF NOT EXISTS idx_notifications_api ON notifications(api_id);",
        )
        .map_err(db_err("Migration indexes"))?;
        Ok(())
    }

    // ─── Catalog seeding ──────────────────────────────────────

    pub fn create_organization(&self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SmelinxError::Invalid("organization name is required".into()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.conn()?
            .execute(
                "INSERT INTO organizations (id, name, created_at) VALUES (?1, ?2, ?3)",
                params![id, name, ts(Utc::now())],
            )
            .map_err(db_err("Create organization"))?;
        Ok(id)
    }

    pub fn create_api(&self, api: &NewApi) -> Result<String> {
        let name = api.name.trim();
        if name.is_empty() {
            return Err(SmelinxError::Invalid("api name is required".into()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.conn()?
            .execute(
                "INSERT INTO apis (id, org_id, name, description, base_url, docs_url,
                                   contact_email, owner_team, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    api.org_id,
                    name,
                    api.description,
                    api.base_url,
                    api.docs_url,
                    api.contact_email,
                    api.owner_team,
                    ts(Utc::now()),
                ],
            )
            .map_err(db_err("Create api"))?;
        Ok(id)
    }

    pub fn create_version(&self, api_id: &str, version: &str) -> Result<String> {
        let version = version.trim();
        if version.is_empty() {
            return Err(SmelinxError::Invalid("version label is required".into()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let res = self.conn()?.execute(
            "INSERT INTO api_versions (id, api_id, version, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, api_id, version, ts(Utc::now())],
        );
        match res {
            Ok(_) => Ok(id),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(SmelinxError::Invalid(format!(
                    "version '{version}' already exists or api {api_id} is unknown"
                )))
            }
            Err(e) => Err(SmelinxError::Store(format!("Create version: {e}"))),
        }
    }

    pub fn soft_delete_api(&self, api_id: &str) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE apis SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                params![ts(Utc::now()), api_id],
            )
            .map_err(db_err("Delete api"))?;
        if changed == 0 {
            return Err(SmelinxError::NotFound(format!("api {api_id}")));
        }
        Ok(())
    }

    pub fn soft_delete_version(&self, version_id: &str) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE api_versions SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                params![ts(Utc::now()), version_id],
            )
            .map_err(db_err("Delete version"))?;
        if changed == 0 {
            return Err(SmelinxError::NotFound(format!("version {version_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for NotifyDb {
    async fn create(
        &self,
        api_id: &str,
        version_id: &str,
        kind: NotificationKind,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Notification> {
        let conn = self.conn()?;
        let live: Option<String> = conn
            .query_row(
                "SELECT v.id FROM api_versions v
                 JOIN apis a ON a.id = v.api_id
                 WHERE v.id = ?1 AND v.api_id = ?2
                   AND v.deleted_at IS NULL AND a.deleted_at IS NULL",
                params![version_id, api_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("Lookup version"))?;
        if live.is_none() {
            return Err(SmelinxError::NotFound(format!(
                "version {version_id} of api {api_id}"
            )));
        }

        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            api_id: api_id.to_string(),
            version_id: version_id.to_string(),
            kind,
            scheduled_at: scheduled_at.trunc_subsecs(3),
            status: NotificationStatus::Pending,
            attempts: 0,
            retry_after: None,
            last_error: None,
            created_at: Utc::now().trunc_subsecs(3),
        };
        conn.execute(
            "INSERT INTO notifications (id, api_id, version_id, type, scheduled_at, status,
                                        attempts, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, ?6)",
            params![
                notification.id,
                notification.api_id,
                notification.version_id,
                kind.as_str(),
                ts(notification.scheduled_at),
                ts(notification.created_at),
            ],
        )
        .map_err(db_err("Create notification"))?;

        tracing::info!(
            "📅 Notice {} scheduled: {} for version {} at {}",
            notification.id,
            kind,
            version_id,
            ts(notification.scheduled_at)
        );
        Ok(notification)
    }

    async fn get_by_id(&self, id: &str) -> Result<Notification> {
        fetch(&*self.conn()?, id)
    }

    async fn list_for_api(&self, api_id: &str) -> Result<Vec<Notification>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE api_id = ?1
                 ORDER BY julianday(scheduled_at) ASC, julianday(created_at) DESC, id ASC"
            ))
            .map_err(db_err("Prepare"))?;
        let rows = stmt
            .query_map(params![api_id], row_to_notification)
            .map_err(db_err("Query"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read notification"))
    }

    async fn list_due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<DueNotification>> {
        let limit = if limit == 0 { DEFAULT_DUE_LIMIT } else { limit };
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT n.id, n.api_id, n.version_id, n.type, n.scheduled_at, n.attempts,
                        a.name, v.version,
                        NULLIF(TRIM(a.contact_email), ''),
                        NULLIF(TRIM(a.base_url), ''),
                        NULLIF(TRIM(a.docs_url), '')
                 FROM notifications n
                 JOIN apis a ON a.id = n.api_id
                 JOIN api_versions v ON v.id = n.version_id AND v.api_id = n.api_id
                 WHERE n.status = 'pending'
                   AND julianday(n.scheduled_at) <= julianday(?1)
                   AND (n.retry_after IS NULL OR julianday(n.retry_after) <= julianday(?1))
                   AND a.deleted_at IS NULL
                   AND v.deleted_at IS NULL
                 ORDER BY julianday(n.scheduled_at) ASC, n.id ASC
                 LIMIT ?2",
            )
            .map_err(db_err("Prepare"))?;
        let rows = stmt
            .query_map(params![ts(now), limit], |row| {
                Ok(DueNotification {
                    id: row.get(0)?,
                    api_id: row.get(1)?,
                    version_id: row.get(2)?,
                    kind: parse_col(row, 3)?,
                    scheduled_at: ts_col(row, 4)?,
                    attempts: row.get(5)?,
                    api_name: row.get(6)?,
                    version: row.get(7)?,
                    contact_email: row.get(8)?,
                    base_url: row.get(9)?,
                    docs_url: row.get(10)?,
                })
            })
            .map_err(db_err("Query due"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read due notice"))
    }

    async fn mark_sent(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE notifications SET status = 'sent', retry_after = NULL
                 WHERE id = ?1 AND status = 'pending'",
                params![id],
            )
            .map_err(db_err("Mark sent"))?;
        if changed == 0 {
            let current = fetch(&conn, id)?;
            tracing::debug!("mark_sent ignored: {id} is already {}", current.status);
            return Ok(false);
        }
        Ok(true)
    }

    async fn schedule_retry(
        &self,
        id: &str,
        retry_after: DateTime<Utc>,
        attempts: u32,
        last_error: &str,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE notifications SET attempts = ?1, retry_after = ?2, last_error = ?3
                 WHERE id = ?4 AND status = 'pending' AND attempts < ?1",
                params![attempts, ts(retry_after), last_error, id],
            )
            .map_err(db_err("Schedule retry"))?;
        if changed == 0 {
            let current = fetch(&conn, id)?;
            if current.status.is_terminal() {
                tracing::debug!("schedule_retry ignored: {id} is already {}", current.status);
                return Ok(false);
            }
            return Err(SmelinxError::InvalidTransition(format!(
                "{id}: attempts must increase (stored {}, got {attempts})",
                current.attempts
            )));
        }
        Ok(true)
    }

    async fn auto_cancel(&self, id: &str, attempts: u32, reason: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE notifications
                 SET status = 'canceled', attempts = MAX(attempts, ?1),
                     retry_after = NULL, last_error = ?2
                 WHERE id = ?3 AND status = 'pending'",
                params![attempts, reason, id],
            )
            .map_err(db_err("Auto cancel"))?;
        if changed == 0 {
            let current = fetch(&conn, id)?;
            tracing::debug!("auto_cancel ignored: {id} is already {}", current.status);
            return Ok(false);
        }
        Ok(true)
    }

    async fn set_status(&self, id: &str, status: NotificationStatus) -> Result<Notification> {
        let conn = self.conn()?;
        let current = fetch(&conn, id)?;
        if current.status == status {
            return Ok(current);
        }
        if !current.status.can_transition_to(status) {
            return Err(SmelinxError::InvalidTransition(format!(
                "{id}: {} -> {status}",
                current.status
            )));
        }
        conn.execute(
            "UPDATE notifications SET status = ?1, retry_after = NULL WHERE id = ?2",
            params![status.as_str(), id],
        )
        .map_err(db_err("Set status"))?;
        tracing::info!("✏️ Notice {id}: {} -> {status}", current.status);
        fetch(&conn, id)
    }

    async fn cancel(&self, id: &str, reason: Option<&str>) -> Result<Notification> {
        let conn = self.conn()?;
        let current = fetch(&conn, id)?;
        match current.status {
            NotificationStatus::Canceled => return Ok(current),
            NotificationStatus::Sent => {
                return Err(SmelinxError::InvalidTransition(format!(
                    "{id}: already sent, cannot cancel"
                )));
            }
            NotificationStatus::Pending => {}
        }
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        conn.execute(
            "UPDATE notifications
             SET status = 'canceled', retry_after = NULL, last_error = COALESCE(?1, last_error)
             WHERE id = ?2 AND status = 'pending'",
            params![reason, id],
        )
        .map_err(db_err("Cancel"))?;
        tracing::info!("🛑 Notice {id} canceled by user");
        fetch(&conn, id)
    }
}

fn fetch(conn: &Connection, id: &str) -> Result<Notification> {
    conn.query_row(
        &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
        params![id],
        row_to_notification,
    )
    .optional()
    .map_err(db_err("Get notification"))?
    .ok_or_else(|| SmelinxError::NotFound(format!("notification {id}")))
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let retry_after: Option<String> = row.get(7)?;
    Ok(Notification {
        id: row.get(0)?,
        api_id: row.get(1)?,
        version_id: row.get(2)?,
        kind: parse_col(row, 3)?,
        scheduled_at: ts_col(row, 4)?,
        status: parse_col(row, 5)?,
        attempts: row.get(6)?,
        retry_after: retry_after
            .as_deref()
            .map(parse_ts)
            .transpose()
            .map_err(|e| conversion_err(7, e))?,
        last_error: row.get(8)?,
        created_at: ts_col(row, 9)?,
    })
}

fn add_column_if_missing(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
            params![table, column],
            |row| row.get(0),
        )
        .map_err(db_err("Inspect columns"))?;
    if count == 0 {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"))
            .map_err(db_err("Add column"))?;
        tracing::info!("🗄️ Added column {table}.{column}");
    }
    Ok(())
}

/// Stored timestamp form: RFC 3339, UTC, millisecond precision.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts RFC 3339 and SQLite's `YYYY-MM-DD HH:MM:SS` (legacy rows).
fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|t| t.and_utc())
        .map_err(|e| SmelinxError::Store(format!("bad timestamp '{s}': {e}")))
}

fn ts_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).map_err(|e| conversion_err(idx, e))
}

fn parse_col<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = SmelinxError>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_err(idx, e))
}

fn conversion_err(idx: usize, e: SmelinxError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn db_err(ctx: &'static str) -> impl Fn(rusqlite::Error) -> SmelinxError {
    move |e| SmelinxError::Store(format!("{ctx}: {e}"))
}
