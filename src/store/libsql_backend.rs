//! libSQL backend — async `ApplicationStore` implementation.
//!
//! Application writes go through a single create-or-merge path that mirrors
//! how the rest of the system thinks about records: partial patches layered
//! over whatever is already stored. Document URLs merge slot-by-slot via
//! `json_patch`, so a concurrent autosave can never blank out an upload that
//! landed in between.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Branding;
use crate::error::StoreError;
use crate::model::{
    ActivityEntry, ActivityKind, Application, ApplicationDetails, ApplicationStatus,
    ChecklistItem, DocumentKind, DocumentSet, LicensedDetails, Message, MessageSender,
    UnlicensedProgress,
};
use crate::store::migrations;
use crate::store::traits::{ApplicationPatch, ApplicationStore};
use crate::store::watch::{ChangeEvent, WatchHandle, WATCH_CHANNEL_CAPACITY};

/// libSQL store backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    events: broadcast::Sender<ChangeEvent>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Database opened");

        let (events, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Ok(Self {
            db: Arc::new(db),
            conn,
            events,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;

        let (events, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Ok(Self {
            db: Arc::new(db),
            conn,
            events,
        })
    }

    /// Get the connection. Exposed to the backfill runner, which needs raw
    /// access to legacy columns the trait does not surface.
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    fn emit(&self, event: ChangeEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn opt_int(n: Option<i64>) -> libsql::Value {
    match n {
        Some(n) => libsql::Value::Integer(n),
        None => libsql::Value::Null,
    }
}

/// Read a nullable TEXT column.
fn opt_text_col(
    row: &libsql::Row,
    idx: i32,
    name: &str,
) -> Result<Option<String>, StoreError> {
    match row
        .get_value(idx)
        .map_err(|e| StoreError::Query(format!("column {name}: {e}")))?
    {
        libsql::Value::Null => Ok(None),
        libsql::Value::Text(s) => Ok(Some(s)),
        other => Err(StoreError::Query(format!(
            "column {name}: unexpected value {other:?}"
        ))),
    }
}

/// Read a nullable INTEGER column.
fn opt_int_col(row: &libsql::Row, idx: i32, name: &str) -> Result<Option<i64>, StoreError> {
    match row
        .get_value(idx)
        .map_err(|e| StoreError::Query(format!("column {name}: {e}")))?
    {
        libsql::Value::Null => Ok(None),
        libsql::Value::Integer(n) => Ok(Some(n)),
        other => Err(StoreError::Query(format!(
            "column {name}: unexpected value {other:?}"
        ))),
    }
}

const APPLICATION_COLUMNS: &str = "id, first_name, last_name, email, phone, area, details, \
     is_licensed_driver, documents, status, is_partial, current_step, created_at, updated_at";

/// Decode one `applications` row.
///
/// Legacy rows (written before the record format settled) may carry NULLs:
/// a missing `details` blob falls back to the old `is_licensed_driver` flag,
/// a missing `is_partial` is treated as partial so the row stays hidden from
/// staff listings until the backfill runs.
fn row_to_application(row: &libsql::Row) -> Result<Application, StoreError> {
    let id: String = row
        .get(0)
        .map_err(|e| StoreError::Query(format!("column id: {e}")))?;

    let get_text = |idx: i32, name: &str| -> Result<String, StoreError> {
        row.get::<String>(idx)
            .map_err(|e| StoreError::Query(format!("column {name}: {e}")))
    };
    let details = match opt_text_col(row, 6, "details")? {
        Some(json) => serde_json::from_str::<ApplicationDetails>(&json).map_err(|e| {
            StoreError::Serialization(format!("application {id} details: {e}"))
        })?,
        None => {
            let licensed = opt_int_col(row, 7, "is_licensed_driver")?;
            match licensed {
                Some(n) if n != 0 => ApplicationDetails::Licensed(LicensedDetails::default()),
                _ => ApplicationDetails::Unlicensed(UnlicensedProgress::default()),
            }
        }
    };

    let documents: DocumentSet = serde_json::from_str(&get_text(8, "documents")?)
        .map_err(|e| StoreError::Serialization(format!("application {id} documents: {e}")))?;

    let status = opt_text_col(row, 9, "status")?
        .map(|s| ApplicationStatus::from_str_lossy(&s))
        .unwrap_or(ApplicationStatus::Submitted);

    let is_partial = opt_int_col(row, 10, "is_partial")?
        .map(|n| n != 0)
        .unwrap_or(true);

    let current_step = opt_int_col(row, 11, "current_step")?.map(|n| n as u8);

    let created_at = opt_text_col(row, 12, "created_at")?
        .map(|s| parse_datetime(&s))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let updated_at = opt_text_col(row, 13, "updated_at")?
        .map(|s| parse_datetime(&s))
        .unwrap_or(created_at);

    Ok(Application {
        id,
        first_name: get_text(1, "first_name")?,
        last_name: get_text(2, "last_name")?,
        email: get_text(3, "email")?,
        phone: get_text(4, "phone")?,
        area: get_text(5, "area")?,
        details,
        documents,
        status,
        is_partial,
        current_step,
        created_at,
        updated_at,
    })
}

const MESSAGE_COLUMNS: &str = "id, application_id, sender, sender_name, content, read, created_at";

fn row_to_message(row: &libsql::Row) -> Result<Message, StoreError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| StoreError::Query(format!("column id: {e}")))?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| StoreError::Serialization(format!("message id {id_str}: {e}")))?;

    let sender: String = row
        .get(2)
        .map_err(|e| StoreError::Query(format!("column sender: {e}")))?;
    let created_str: String = row
        .get(6)
        .map_err(|e| StoreError::Query(format!("column created_at: {e}")))?;

    Ok(Message {
        id,
        application_id: row
            .get(1)
            .map_err(|e| StoreError::Query(format!("column application_id: {e}")))?,
        sender: MessageSender::from_str_lossy(&sender),
        sender_name: row
            .get(3)
            .map_err(|e| StoreError::Query(format!("column sender_name: {e}")))?,
        content: row
            .get(4)
            .map_err(|e| StoreError::Query(format!("column content: {e}")))?,
        read: row
            .get::<i64>(5)
            .map_err(|e| StoreError::Query(format!("column read: {e}")))?
            != 0,
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_activity(row: &libsql::Row) -> Result<ActivityEntry, StoreError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| StoreError::Query(format!("column id: {e}")))?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| StoreError::Serialization(format!("activity id {id_str}: {e}")))?;

    let kind: String = row
        .get(2)
        .map_err(|e| StoreError::Query(format!("column kind: {e}")))?;
    let created_str: String = row
        .get(4)
        .map_err(|e| StoreError::Query(format!("column created_at: {e}")))?;

    Ok(ActivityEntry {
        id,
        application_id: row
            .get(1)
            .map_err(|e| StoreError::Query(format!("column application_id: {e}")))?,
        kind: ActivityKind::from_str_lossy(&kind),
        detail: row
            .get(3)
            .map_err(|e| StoreError::Query(format!("column detail: {e}")))?,
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ApplicationStore for LibSqlBackend {
    async fn get(&self, id: &str) -> Result<Option<Application>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_application(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get: {e}"))),
        }
    }

    async fn merge(&self, id: &str, patch: ApplicationPatch) -> Result<Application, StoreError> {
        let before = self.get(id).await?;
        let now = Utc::now().to_rfc3339();

        if before.is_none() {
            self.conn()
                .execute(
                    "INSERT OR IGNORE INTO applications (id, created_at, updated_at)
                     VALUES (?1, ?2, ?2)",
                    params![id, now.clone()],
                )
                .await
                .map_err(|e| StoreError::Query(format!("merge insert: {e}")))?;
        }

        let details_json = patch
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let documents_json = patch
            .documents
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        // One statement, COALESCE per scalar; documents merge by key so
        // absent slots keep their stored URLs.
        self.conn()
            .execute(
                "UPDATE applications SET
                    first_name = COALESCE(?2, first_name),
                    last_name = COALESCE(?3, last_name),
                    email = COALESCE(?4, email),
                    phone = COALESCE(?5, phone),
                    area = COALESCE(?6, area),
                    details = COALESCE(?7, details),
                    documents = CASE WHEN ?8 IS NULL THEN documents
                                ELSE json_patch(COALESCE(documents, '{}'), ?8) END,
                    status = COALESCE(?9, status),
                    is_partial = COALESCE(?10, is_partial),
                    current_step = COALESCE(?11, current_step),
                    updated_at = ?12
                 WHERE id = ?1",
                params![
                    id,
                    opt_text_owned(patch.first_name),
                    opt_text_owned(patch.last_name),
                    opt_text_owned(patch.email),
                    opt_text_owned(patch.phone),
                    opt_text_owned(patch.area),
                    opt_text_owned(details_json),
                    opt_text_owned(documents_json),
                    opt_text_owned(patch.status.map(|s| s.as_str().to_string())),
                    opt_int(patch.is_partial.map(i64::from)),
                    opt_int(patch.current_step.map(i64::from)),
                    now,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("merge update: {e}")))?;

        let after = self
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        debug!(application_id = %id, created = before.is_none(), "Application merged");
        self.emit(ChangeEvent::ApplicationWritten {
            before,
            after: after.clone(),
        });
        Ok(after)
    }

    async fn list_complete(&self) -> Result<Vec<Application>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {APPLICATION_COLUMNS} FROM applications
                     WHERE is_partial = 0 ORDER BY created_at DESC"
                ),
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_complete: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("list_complete: {e}")))?
        {
            out.push(row_to_application(&row)?);
        }
        Ok(out)
    }

    async fn list_all(&self) -> Result<Vec<Application>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {APPLICATION_COLUMNS} FROM applications ORDER BY created_at DESC"),
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_all: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("list_all: {e}")))?
        {
            out.push(row_to_application(&row)?);
        }
        Ok(out)
    }

    async fn set_status(
        &self,
        id: &str,
        status: ApplicationStatus,
    ) -> Result<Application, StoreError> {
        if self.get(id).await?.is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.merge(
            id,
            ApplicationPatch {
                status: Some(status),
                ..Default::default()
            },
        )
        .await
    }

    async fn set_document(
        &self,
        id: &str,
        kind: DocumentKind,
        url: &str,
    ) -> Result<Application, StoreError> {
        if self.get(id).await?.is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let mut documents = DocumentSet::default();
        documents.set(kind, url);
        self.merge(
            id,
            ApplicationPatch {
                documents: Some(documents),
                ..Default::default()
            },
        )
        .await
    }

    async fn set_checklist_item(
        &self,
        id: &str,
        item: ChecklistItem,
        value: bool,
    ) -> Result<Application, StoreError> {
        let app = self
            .get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut progress = match app.details.as_unlicensed() {
            Some(p) => p.clone(),
            None => {
                return Err(StoreError::Constraint(format!(
                    "application {id} is on the licensed path"
                )));
            }
        };
        progress.set(item, value);

        self.merge(
            id,
            ApplicationPatch {
                details: Some(ApplicationDetails::Unlicensed(progress)),
                ..Default::default()
            },
        )
        .await
    }

    // ── Conversations ───────────────────────────────────────────────

    async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO messages (id, application_id, sender, sender_name, content, read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    message.id.to_string(),
                    message.application_id.clone(),
                    message.sender.as_str(),
                    message.sender_name.clone(),
                    message.content.clone(),
                    i64::from(message.read),
                    message.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("append_message: {e}")))?;

        self.emit(ChangeEvent::MessageAppended {
            message: message.clone(),
        });
        Ok(())
    }

    async fn list_messages(&self, application_id: &str) -> Result<Vec<Message>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE application_id = ?1 ORDER BY created_at ASC"
                ),
                params![application_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_messages: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("list_messages: {e}")))?
        {
            out.push(row_to_message(&row)?);
        }
        Ok(out)
    }

    async fn mark_conversation_read(
        &self,
        application_id: &str,
        reader: MessageSender,
    ) -> Result<usize, StoreError> {
        // Messages *to* the reader are the ones the other party sent
        let author = match reader {
            MessageSender::Applicant => MessageSender::Staff,
            MessageSender::Staff => MessageSender::Applicant,
        };
        let affected = self
            .conn()
            .execute(
                "UPDATE messages SET read = 1
                 WHERE application_id = ?1 AND sender = ?2 AND read = 0",
                params![application_id, author.as_str()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("mark_conversation_read: {e}")))?;
        Ok(affected as usize)
    }

    async fn unread_count(
        &self,
        application_id: &str,
        reader: MessageSender,
    ) -> Result<usize, StoreError> {
        let author = match reader {
            MessageSender::Applicant => MessageSender::Staff,
            MessageSender::Staff => MessageSender::Applicant,
        };
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM messages
                 WHERE application_id = ?1 AND sender = ?2 AND read = 0",
                params![application_id, author.as_str()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("unread_count: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("unread_count: {e}")))?
        {
            Some(row) => {
                let n: i64 = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("unread_count: {e}")))?;
                Ok(n as usize)
            }
            None => Ok(0),
        }
    }

    // ── Activity log ────────────────────────────────────────────────

    async fn append_activity(&self, entry: &ActivityEntry) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO activity_log (id, application_id, kind, detail, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.id.to_string(),
                    entry.application_id.clone(),
                    entry.kind.as_str(),
                    entry.detail.clone(),
                    entry.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("append_activity: {e}")))?;
        Ok(())
    }

    async fn list_activity(&self, application_id: &str) -> Result<Vec<ActivityEntry>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, application_id, kind, detail, created_at FROM activity_log
                 WHERE application_id = ?1 ORDER BY created_at DESC",
                params![application_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("list_activity: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("list_activity: {e}")))?
        {
            out.push(row_to_activity(&row)?);
        }
        Ok(out)
    }

    // ── Push tokens & branding ──────────────────────────────────────

    async fn set_push_token(&self, account_id: &str, token: &str) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO push_tokens (account_id, token, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(account_id) DO UPDATE SET
                    token = excluded.token, updated_at = excluded.updated_at",
                params![account_id, token, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("set_push_token: {e}")))?;
        Ok(())
    }

    async fn get_push_token(&self, account_id: &str) -> Result<Option<String>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT token FROM push_tokens WHERE account_id = ?1",
                params![account_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_push_token: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_push_token: {e}")))?
        {
            Some(row) => Ok(Some(
                row.get(0)
                    .map_err(|e| StoreError::Query(format!("get_push_token: {e}")))?,
            )),
            None => Ok(None),
        }
    }

    async fn get_branding(&self) -> Result<Branding, StoreError> {
        let mut rows = self
            .conn()
            .query("SELECT value FROM settings WHERE key = 'branding'", ())
            .await
            .map_err(|e| StoreError::Query(format!("get_branding: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_branding: {e}")))?
        {
            Some(row) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("get_branding: {e}")))?;
                Ok(serde_json::from_str(&json)?)
            }
            None => Ok(Branding::default()),
        }
    }

    async fn set_branding(&self, branding: &Branding) -> Result<(), StoreError> {
        let json = serde_json::to_string(branding)?;
        self.conn()
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES ('branding', ?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value, updated_at = excluded.updated_at",
                params![json, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("set_branding: {e}")))?;
        Ok(())
    }

    // ── Subscriptions ───────────────────────────────────────────────

    fn watch(&self, application_id: &str) -> WatchHandle {
        WatchHandle::new(self.events.subscribe(), Some(application_id.to_string()))
    }

    fn watch_all(&self) -> WatchHandle {
        WatchHandle::new(self.events.subscribe(), None)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn backend() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn licensed_patch() -> ApplicationPatch {
        ApplicationPatch {
            first_name: Some("Amara".into()),
            last_name: Some("Okafor".into()),
            email: Some("amara@example.com".into()),
            phone: Some("07911123456".into()),
            area: Some("Leeds".into()),
            details: Some(ApplicationDetails::Licensed(LicensedDetails {
                badge_number: "B-1234".into(),
                has_own_vehicle: true,
                ..Default::default()
            })),
            is_partial: Some(true),
            current_step: Some(2),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn merge_creates_then_layers() {
        let store = backend().await;
        assert!(store.get("uid-1").await.unwrap().is_none());

        let app = store.merge("uid-1", licensed_patch()).await.unwrap();
        assert_eq!(app.first_name, "Amara");
        assert!(app.is_partial);
        assert_eq!(app.current_step, Some(2));

        // A later patch touches only the phone; everything else survives
        let app = store
            .merge(
                "uid-1",
                ApplicationPatch {
                    phone: Some("07999000111".into()),
                    current_step: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(app.phone, "07999000111");
        assert_eq!(app.first_name, "Amara");
        assert_eq!(app.email, "amara@example.com");
        assert_eq!(app.current_step, Some(3));
        assert!(app.is_licensed_driver());
    }

    #[tokio::test]
    async fn document_slots_merge_monotonically() {
        let store = backend().await;
        store.merge("uid-1", licensed_patch()).await.unwrap();

        let mut docs = DocumentSet::default();
        docs.set(DocumentKind::Badge, "https://docs/badge.pdf");
        store
            .merge(
                "uid-1",
                ApplicationPatch {
                    documents: Some(docs),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Second patch carries only the insurance slot; badge must survive
        let mut docs = DocumentSet::default();
        docs.set(DocumentKind::Insurance, "https://docs/ins.pdf");
        let app = store
            .merge(
                "uid-1",
                ApplicationPatch {
                    documents: Some(docs),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(
            app.documents.get(DocumentKind::Badge),
            Some("https://docs/badge.pdf")
        );
        assert_eq!(
            app.documents.get(DocumentKind::Insurance),
            Some("https://docs/ins.pdf")
        );
    }

    #[tokio::test]
    async fn complete_listing_excludes_partials() {
        let store = backend().await;
        store.merge("uid-partial", licensed_patch()).await.unwrap();

        let mut complete = licensed_patch();
        complete.is_partial = Some(false);
        complete.status = Some(ApplicationStatus::Submitted);
        store.merge("uid-complete", complete).await.unwrap();

        let listed = store.list_complete().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "uid-complete");

        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn set_status_requires_existing_record() {
        let store = backend().await;
        let err = store
            .set_status("nope", ApplicationStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        store.merge("uid-1", licensed_patch()).await.unwrap();
        let app = store
            .set_status("uid-1", ApplicationStatus::UnderReview)
            .await
            .unwrap();
        assert_eq!(app.status, ApplicationStatus::UnderReview);
    }

    #[tokio::test]
    async fn checklist_updates_reject_licensed_path() {
        let store = backend().await;
        store.merge("uid-1", licensed_patch()).await.unwrap();
        let err = store
            .set_checklist_item("uid-1", ChecklistItem::DbsApplied, true)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));

        store
            .merge(
                "uid-2",
                ApplicationPatch {
                    details: Some(ApplicationDetails::Unlicensed(UnlicensedProgress::default())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let app = store
            .set_checklist_item("uid-2", ChecklistItem::DbsApplied, true)
            .await
            .unwrap();
        assert!(app.details.as_unlicensed().unwrap().dbs_applied);
        assert_eq!(app.details.as_unlicensed().unwrap().completed_steps(), 1);
    }

    #[tokio::test]
    async fn conversation_roundtrip_and_read_marking() {
        let store = backend().await;
        store.merge("uid-1", licensed_patch()).await.unwrap();
        let mut feed = store.watch("uid-1");

        let m1 = Message::new("uid-1", MessageSender::Applicant, "Amara", "hello");
        let m2 = Message::new("uid-1", MessageSender::Staff, "Recruitment", "hi there");
        store.append_message(&m1).await.unwrap();
        store.append_message(&m2).await.unwrap();

        // Appends fan out on the change feed for live conversation views
        match feed.recv().await.unwrap() {
            ChangeEvent::MessageAppended { message } => assert_eq!(message.content, "hello"),
            other => panic!("unexpected event: {other:?}"),
        }

        let listed = store.list_messages("uid-1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].content, "hello");

        // One staff message awaits the applicant
        assert_eq!(
            store
                .unread_count("uid-1", MessageSender::Applicant)
                .await
                .unwrap(),
            1
        );
        let flipped = store
            .mark_conversation_read("uid-1", MessageSender::Applicant)
            .await
            .unwrap();
        assert_eq!(flipped, 1);
        assert_eq!(
            store
                .unread_count("uid-1", MessageSender::Applicant)
                .await
                .unwrap(),
            0
        );
        // The applicant's own message is still unread for staff
        assert_eq!(
            store
                .unread_count("uid-1", MessageSender::Staff)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn activity_log_newest_first() {
        let store = backend().await;
        let mut first = ActivityEntry::new("uid-1", ActivityKind::Submitted, "Application submitted");
        let mut second = ActivityEntry::new(
            "uid-1",
            ActivityKind::StatusChanged,
            "Submitted -> Under Review",
        );
        first.created_at = Utc::now() - chrono::Duration::seconds(10);
        second.created_at = Utc::now();
        store.append_activity(&first).await.unwrap();
        store.append_activity(&second).await.unwrap();

        let listed = store.list_activity("uid-1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].kind, ActivityKind::StatusChanged);
    }

    #[tokio::test]
    async fn push_token_upsert() {
        let store = backend().await;
        assert!(store.get_push_token("uid-1").await.unwrap().is_none());
        store.set_push_token("uid-1", "tok-a").await.unwrap();
        store.set_push_token("uid-1", "tok-b").await.unwrap();
        assert_eq!(
            store.get_push_token("uid-1").await.unwrap().as_deref(),
            Some("tok-b")
        );
    }

    #[tokio::test]
    async fn branding_defaults_until_set() {
        let store = backend().await;
        assert_eq!(store.get_branding().await.unwrap(), Branding::default());

        let custom = Branding {
            company_name: "Acme Cars".into(),
            logo_url: "https://acme.example/logo.png".into(),
            tagline: Some("Drive with us".into()),
        };
        store.set_branding(&custom).await.unwrap();
        assert_eq!(store.get_branding().await.unwrap(), custom);
    }

    #[tokio::test]
    async fn watch_delivers_filtered_changes() {
        let store = backend().await;
        let mut handle = store.watch("uid-2");
        let mut all = store.watch_all();

        store.merge("uid-1", licensed_patch()).await.unwrap();
        store
            .merge(
                "uid-2",
                ApplicationPatch {
                    first_name: Some("Bea".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // The filtered handle skips uid-1 and yields the uid-2 creation
        match handle.recv().await.unwrap() {
            ChangeEvent::ApplicationWritten { before, after } => {
                assert!(before.is_none());
                assert_eq!(after.id, "uid-2");
                assert_eq!(after.first_name, "Bea");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // The unfiltered handle sees both writes in order
        assert_eq!(all.recv().await.unwrap().application_id(), "uid-1");
        assert_eq!(all.recv().await.unwrap().application_id(), "uid-2");

        handle.close();
        assert!(handle.recv().await.is_none());
    }

    #[tokio::test]
    async fn status_change_event_carries_before_and_after() {
        let store = backend().await;
        let mut complete = licensed_patch();
        complete.is_partial = Some(false);
        complete.status = Some(ApplicationStatus::Submitted);
        store.merge("uid-1", complete).await.unwrap();

        let mut handle = store.watch("uid-1");
        store
            .set_status("uid-1", ApplicationStatus::Contacted)
            .await
            .unwrap();

        match handle.recv().await.unwrap() {
            ChangeEvent::ApplicationWritten { before, after } => {
                assert_eq!(before.unwrap().status, ApplicationStatus::Submitted);
                assert_eq!(after.status, ApplicationStatus::Contacted);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
