//! libSQL backend implementing the event log and session registry.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::session::{Event, EventRecord, SessionId};
use crate::store::migrations;
use crate::store::traits::{EventLog, SessionRecord, SessionRegistry};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    /// Serializes writes so a batch transaction never interleaves with
    /// another statement on the shared connection.
    writes: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            writes: Mutex::new(()),
        };
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
            writes: Mutex::new(()),
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Fixed-width RFC 3339, so stored timestamps sort as text.
fn fmt_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

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

fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn opt_real(v: Option<f64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Real(v),
        None => libsql::Value::Null,
    }
}

fn opt_integer(v: Option<u32>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(i64::from(v)),
        None => libsql::Value::Null,
    }
}

fn serialization(what: &str, e: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::Serialization(format!("{what}: {e}"))
}

const EVENT_COLUMNS: &str =
    "id, session_id, sequence, event_type, role, content, ordinal, score, category, metadata, created_at";

fn row_to_event(row: &libsql::Row) -> Result<Event, DatabaseError> {
    let get_text = |i: i32| -> Result<String, DatabaseError> {
        row.get::<String>(i)
            .map_err(|e| DatabaseError::Query(format!("event column {i}: {e}")))
    };

    let id = Uuid::parse_str(&get_text(0)?).map_err(|e| serialization("event id", e))?;
    let sequence: i64 = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("event sequence: {e}")))?;
    let metadata = match row.get::<String>(9).ok() {
        Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| serialization("event metadata", e))?),
        None => None,
    };

    Ok(Event {
        id,
        sequence,
        record: EventRecord {
            session_id: SessionId::from(get_text(1)?),
            event_type: get_text(3)?.parse().map_err(|e: String| serialization("event_type", e))?,
            role: get_text(4)?.parse().map_err(|e: String| serialization("role", e))?,
            content: get_text(5)?,
            ordinal: row
                .get::<i64>(6)
                .ok()
                .map(|o| u32::try_from(o).map_err(|e| serialization("event ordinal", e)))
                .transpose()?,
            score: row.get::<f64>(7).ok(),
            category: row.get::<String>(8).ok(),
            metadata,
            created_at: parse_datetime(&get_text(10)?),
        },
    })
}

const SESSION_COLUMNS: &str = "id, owner_id, kind, status, context, total_score, aggregate_score, created_at, updated_at, completed_at";

fn row_to_record(row: &libsql::Row) -> Result<SessionRecord, DatabaseError> {
    let get_text = |i: i32| -> Result<String, DatabaseError> {
        row.get::<String>(i)
            .map_err(|e| DatabaseError::Query(format!("session column {i}: {e}")))
    };

    Ok(SessionRecord {
        id: SessionId::from(get_text(0)?),
        owner_id: get_text(1)?,
        kind: get_text(2)?.parse().map_err(|e: String| serialization("kind", e))?,
        status: get_text(3)?.parse().map_err(|e: String| serialization("status", e))?,
        context: serde_json::from_str(&get_text(4)?).map_err(|e| serialization("context", e))?,
        total_score: row.get::<f64>(5).ok(),
        aggregate_score: row.get::<f64>(6).ok(),
        created_at: parse_datetime(&get_text(7)?),
        updated_at: parse_datetime(&get_text(8)?),
        completed_at: row.get::<String>(9).ok().map(|s| parse_datetime(&s)),
    })
}

/// Insert one event on `conn`, assigning the next sequence for its session.
async fn insert_event(conn: &Connection, record: &EventRecord) -> Result<Event, DatabaseError> {
    let id = Uuid::new_v4();
    let metadata = record
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| serialization("event metadata", e))?;

    // The sequence is computed inside the insert so it is strictly
    // increasing per session regardless of clock resolution.
    let mut rows = conn
        .query(
            "INSERT INTO session_events
                (id, session_id, sequence, event_type, role, content, ordinal, score, category, metadata, created_at)
             VALUES (?1, ?2,
                (SELECT COALESCE(MAX(sequence), 0) + 1 FROM session_events WHERE session_id = ?2),
                ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             RETURNING sequence",
            params![
                id.to_string(),
                record.session_id.as_str(),
                record.event_type.as_str(),
                record.role.as_str(),
                record.content.as_str(),
                opt_integer(record.ordinal),
                opt_real(record.score),
                opt_text_owned(record.category.clone()),
                opt_text_owned(metadata),
                fmt_datetime(record.created_at),
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("append_event: {e}")))?;

    let sequence: i64 = match rows.next().await {
        Ok(Some(row)) => row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("append_event sequence: {e}")))?,
        Ok(None) => {
            return Err(DatabaseError::Query(
                "append_event: no sequence returned".to_string(),
            ));
        }
        Err(e) => return Err(DatabaseError::Query(format!("append_event: {e}"))),
    };

    debug!(
        session_id = %record.session_id,
        event_type = %record.event_type,
        sequence,
        "Event appended"
    );
    Ok(Event {
        id,
        sequence,
        record: record.clone(),
    })
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl EventLog for LibSqlBackend {
    async fn append(&self, record: &EventRecord) -> Result<Event, DatabaseError> {
        let _writes = self.writes.lock().await;
        insert_event(self.conn(), record).await
    }

    async fn append_all(&self, records: &[EventRecord]) -> Result<Vec<Event>, DatabaseError> {
        let Some(first) = records.first() else {
            return Ok(Vec::new());
        };
        let _writes = self.writes.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("append_all begin: {e}")))?;

        let mut events = Vec::with_capacity(records.len());
        let mut failure = None;
        for record in records {
            if record.session_id != first.session_id {
                failure = Some(DatabaseError::Constraint(format!(
                    "event batch mixes sessions {} and {}",
                    first.session_id, record.session_id
                )));
                break;
            }
            match insert_event(&tx, record).await {
                Ok(event) => events.push(event),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(session_id = %first.session_id, "Rollback failed: {rollback}");
            }
            return Err(e);
        }
        tx.commit()
            .await
            .map_err(|e| DatabaseError::Query(format!("append_all commit: {e}")))?;
        Ok(events)
    }

    async fn list_by_session(&self, session_id: &SessionId) -> Result<Vec<Event>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM session_events WHERE session_id = ?1 ORDER BY sequence ASC"
                ),
                params![session_id.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_events: {e}")))?;

        let mut events = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => events.push(row_to_event(&row)?),
                Ok(None) => break,
                Err(e) => return Err(DatabaseError::Query(format!("list_events: {e}"))),
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl SessionRegistry for LibSqlBackend {
    async fn create(&self, record: &SessionRecord) -> Result<(), DatabaseError> {
        let context =
            serde_json::to_string(&record.context).map_err(|e| serialization("context", e))?;
        let _writes = self.writes.lock().await;
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO sessions ({SESSION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    record.id.as_str(),
                    record.owner_id.as_str(),
                    record.kind.as_str(),
                    record.status.as_str(),
                    context,
                    opt_real(record.total_score),
                    opt_real(record.aggregate_score),
                    fmt_datetime(record.created_at),
                    fmt_datetime(record.updated_at),
                    opt_text_owned(record.completed_at.map(fmt_datetime)),
                ],
            )
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE") {
                    DatabaseError::Constraint(format!("session {} already exists", record.id))
                } else {
                    DatabaseError::Query(format!("create_session: {msg}"))
                }
            })?;

        debug!(session_id = %record.id, kind = %record.kind, "Session registered");
        Ok(())
    }

    async fn update(&self, record: &SessionRecord) -> Result<(), DatabaseError> {
        let _writes = self.writes.lock().await;
        let affected = self
            .conn()
            .execute(
                "UPDATE sessions
                 SET status = ?2, total_score = ?3, aggregate_score = ?4,
                     updated_at = ?5, completed_at = ?6
                 WHERE id = ?1",
                params![
                    record.id.as_str(),
                    record.status.as_str(),
                    opt_real(record.total_score),
                    opt_real(record.aggregate_score),
                    fmt_datetime(record.updated_at),
                    opt_text_owned(record.completed_at.map(fmt_datetime)),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_session: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "session".to_string(),
                id: record.id.to_string(),
            });
        }
        debug!(session_id = %record.id, status = %record.status, "Session record updated");
        Ok(())
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![session_id.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_session: {e}"))),
        }
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<SessionRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE owner_id = ?1
                     ORDER BY created_at DESC, rowid DESC"
                ),
                params![owner_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_sessions: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_record(&row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!("Skipping session row: {e}");
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{
        EventType, Session, SessionContext, SessionKind, SessionStatus, SystemMarker,
    };

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_record(id: &str, owner: &str) -> SessionRecord {
        let session = Session::new(
            SessionId::from(id),
            owner,
            SessionKind::Interview,
            SessionContext::interview("Data Engineer", "Globex"),
            Utc::now(),
        );
        SessionRecord::from(&session)
    }

    #[tokio::test]
    async fn append_assigns_increasing_sequence() {
        let db = test_db().await;
        let id = SessionId::from("s1");
        db.create(&make_record("s1", "o")).await.unwrap();

        let e1 = db
            .append(&EventRecord::system(&id, SystemMarker::Started, "started"))
            .await
            .unwrap();
        let e2 = db.append(&EventRecord::question(&id, 1, "Q1")).await.unwrap();
        let e3 = db.append(&EventRecord::question(&id, 2, "Q2")).await.unwrap();
        assert_eq!((e1.sequence, e2.sequence, e3.sequence), (1, 2, 3));

        let events = db.list_by_session(&id).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].record.marker(), Some(SystemMarker::Started));
        assert_eq!(events[2].record.ordinal, Some(2));
        assert_eq!(events[2].record.event_type, EventType::Question);
    }

    #[tokio::test]
    async fn sequences_are_per_session() {
        let db = test_db().await;
        db.create(&make_record("a", "o")).await.unwrap();
        db.create(&make_record("b", "o")).await.unwrap();
        let a = SessionId::from("a");
        let b = SessionId::from("b");
        db.append(&EventRecord::question(&a, 1, "x")).await.unwrap();
        db.append(&EventRecord::question(&a, 2, "y")).await.unwrap();
        let first_b = db.append(&EventRecord::question(&b, 1, "z")).await.unwrap();
        assert_eq!(first_b.sequence, 1);
    }

    #[tokio::test]
    async fn event_round_trips_optional_columns() {
        let db = test_db().await;
        db.create(&make_record("s1", "o")).await.unwrap();
        let id = SessionId::from("s1");
        let record = EventRecord::question(&id, 1, "Preferred sector?")
            .with_category("interests")
            .with_metadata(serde_json::json!({"options": [{"value": "v", "label": "l"}]}));
        db.append(&record).await.unwrap();
        db.append(&EventRecord::feedback(&id, 1, "ok", 7)).await.unwrap();

        let events = db.list_by_session(&id).await.unwrap();
        assert_eq!(events[0].record.category.as_deref(), Some("interests"));
        assert_eq!(events[0].record.metadata, record.metadata);
        assert_eq!(events[1].record.score, Some(7.0));
        assert!(events[1].record.metadata.is_none());
    }

    #[tokio::test]
    async fn registry_create_get_update() {
        let db = test_db().await;
        let mut record = make_record("s1", "owner-1");
        db.create(&record).await.unwrap();

        let fetched = db.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.context.role.as_deref(), Some("Data Engineer"));
        assert_eq!(fetched.status, SessionStatus::Started);
        assert!(fetched.completed_at.is_none());

        record.status = SessionStatus::Completed;
        record.total_score = Some(21.0);
        record.aggregate_score = Some(7.0);
        record.completed_at = Some(Utc::now());
        db.update(&record).await.unwrap();

        let fetched = db.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, SessionStatus::Completed);
        assert_eq!(fetched.aggregate_score, Some(7.0));
        assert!(fetched.completed_at.is_some());
    }

    #[tokio::test]
    async fn duplicate_create_is_constraint_error() {
        let db = test_db().await;
        db.create(&make_record("s1", "o")).await.unwrap();
        assert!(matches!(
            db.create(&make_record("s1", "o")).await,
            Err(DatabaseError::Constraint(_))
        ));
    }

    #[tokio::test]
    async fn update_missing_session_is_not_found() {
        let db = test_db().await;
        assert!(matches!(
            db.update(&make_record("ghost", "o")).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn get_missing_session_is_none() {
        let db = test_db().await;
        assert!(db.get(&SessionId::from("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_by_owner_newest_first() {
        let db = test_db().await;
        let mut older = make_record("older", "me");
        older.created_at = Utc::now() - chrono::Duration::hours(1);
        db.create(&older).await.unwrap();
        db.create(&make_record("newer", "me")).await.unwrap();
        db.create(&make_record("theirs", "someone-else")).await.unwrap();

        let mine = db.list_by_owner("me").await.unwrap();
        let ids: Vec<_> = mine.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["newer", "older"]);
    }

    #[tokio::test]
    async fn append_all_assigns_consecutive_sequences() {
        let db = test_db().await;
        db.create(&make_record("s1", "o")).await.unwrap();
        let id = SessionId::from("s1");
        db.append(&EventRecord::system(&id, SystemMarker::Started, "started"))
            .await
            .unwrap();

        let batch = vec![
            EventRecord::question(&id, 1, "Q1"),
            EventRecord::question(&id, 2, "Q2"),
            EventRecord::question(&id, 3, "Q3"),
        ];
        let events = db.append_all(&batch).await.unwrap();
        let sequences: Vec<i64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![2, 3, 4]);
        assert_eq!(db.list_by_session(&id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn append_all_empty_batch_is_noop() {
        let db = test_db().await;
        assert!(db.append_all(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_batch_leaves_no_events() {
        let db = test_db().await;
        db.create(&make_record("a", "o")).await.unwrap();
        let a = SessionId::from("a");
        let b = SessionId::from("b");

        let batch = vec![
            EventRecord::question(&a, 1, "Q1"),
            EventRecord::question(&a, 2, "Q2"),
            EventRecord::question(&b, 1, "stray"),
        ];
        let result = db.append_all(&batch).await;
        assert!(matches!(result, Err(DatabaseError::Constraint(_))));
        assert!(db.list_by_session(&a).await.unwrap().is_empty());

        // The connection is usable again after the rollback
        let next = db.append(&EventRecord::question(&a, 1, "Q1")).await.unwrap();
        assert_eq!(next.sequence, 1);
    }

    #[tokio::test]
    async fn out_of_range_ordinal_is_serialization_error() {
        let db = test_db().await;
        db.create(&make_record("s1", "o")).await.unwrap();
        db.conn()
            .execute(
                "INSERT INTO session_events (id, session_id, sequence, event_type, role, content, ordinal, created_at)
                 VALUES (?1, 's1', 1, 'question', 'generator', 'Q', 5000000000, '2026-01-01T00:00:00.000000000Z')",
                libsql::params![Uuid::new_v4().to_string()],
            )
            .await
            .unwrap();

        let result = db.list_by_session(&SessionId::from("s1")).await;
        assert!(matches!(result, Err(DatabaseError::Serialization(_))));
    }
}
