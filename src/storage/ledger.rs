//! Normalized, deduplicated entity tables in SQLite.
//!
//! One table per entity kind, keyed by `uid`. Each row keeps the normalized
//! columns next to the verbatim payload it came from. A `collections` table
//! logs every resource a run attempted.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{ConflictPolicy, EntityKind, LedgerRecord, normalize};

/// Default row limit for [`Ledger::collection_history`].
pub const HISTORY_LIMIT: usize = 100;

/// Outcome recorded for one resource of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Ok,
    Truncated,
    Failed,
}

impl CollectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionStatus::Ok => "ok",
            CollectionStatus::Truncated => "truncated",
            CollectionStatus::Failed => "failed",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "ok" => CollectionStatus::Ok,
            "truncated" => CollectionStatus::Truncated,
            _ => CollectionStatus::Failed,
        }
    }
}

/// A row of the collection log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionEntry {
    pub source_id: String,
    pub resource: String,
    pub collected_at: DateTime<Utc>,
    pub total_items: usize,
    pub status: CollectionStatus,
}

/// SQLite-backed upsert ledger.
///
/// Single-writer: concurrent runs against the same file may lose updates.
pub struct Ledger {
    conn: Mutex<Connection>,
}

impl Ledger {
    /// Open (or create) the ledger database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        for entity in EntityKind::ALL {
            conn.execute_batch(&entity_table_sql(entity))?;
        }
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              source_id TEXT NOT NULL,
              resource TEXT NOT NULL,
              collected_at TEXT NOT NULL,
              total_items INTEGER NOT NULL,
              status TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_collections_source ON collections(source_id, collected_at);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::storage("ledger", "connection lock poisoned"))
    }

    /// Normalize and upsert `records`; returns the rows inserted or changed.
    ///
    /// All records of one call are applied in a single transaction.
    pub fn upsert(
        &self,
        entity: EntityKind,
        source_id: &str,
        records: &[Value],
        observed_at: DateTime<Utc>,
        policy: ConflictPolicy,
    ) -> Result<usize> {
        let sql = upsert_sql(entity, policy);
        let observed = observed_at.to_rfc3339();

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut affected = 0;
        {
            let mut stmt = tx.prepare_cached(&sql)?;
            for raw in records {
                let record = normalize(entity, source_id, raw);
                let payload = serde_json::to_string(raw)?;

                let mut values: Vec<Option<String>> = Vec::with_capacity(record.fields.len() + 5);
                values.push(Some(record.uid));
                values.push(Some(source_id.to_string()));
                values.extend(record.fields.into_iter().map(|(_, value)| value));
                values.push(Some(payload));
                values.push(Some(observed.clone()));
                values.push(Some(observed.clone()));

                affected += stmt.execute(params_from_iter(values.iter()))?;
            }
        }
        tx.commit()?;

        log::debug!(
            "Ledger {} ({}): {} of {} records written",
            entity.table(),
            policy,
            affected,
            records.len()
        );
        Ok(affected)
    }

    /// Append a row to the collection log.
    pub fn record_collection(
        &self,
        source_id: &str,
        resource: &str,
        collected_at: DateTime<Utc>,
        total_items: usize,
        status: CollectionStatus,
    ) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO collections (source_id, resource, collected_at, total_items, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                source_id,
                resource,
                collected_at.to_rfc3339(),
                total_items as i64,
                status.as_str()
            ],
        )?;
        Ok(())
    }

    /// Most recent collection log entries for a source, newest first.
    pub fn collection_history(&self, source_id: &str, limit: usize) -> Result<Vec<CollectionEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_id, resource, collected_at, total_items, status
             FROM collections WHERE source_id = ?1
             ORDER BY collected_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![source_id, limit as i64], |row| {
            Ok(CollectionEntry {
                source_id: row.get(0)?,
                resource: row.get(1)?,
                collected_at: parse_timestamp(row, 2)?,
                total_items: row.get::<_, i64>(3)? as usize,
                status: CollectionStatus::parse(&row.get::<_, String>(4)?),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// All rows of `entity` for a source, ordered by `uid`.
    pub fn records(&self, entity: EntityKind, source_id: &str) -> Result<Vec<LedgerRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM {} WHERE source_id = ?1 ORDER BY uid",
            select_columns(entity),
            entity.table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![source_id], |row| read_record(entity, row))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// One row by `uid`.
    pub fn get(&self, entity: EntityKind, uid: &str) -> Result<Option<LedgerRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM {} WHERE uid = ?1",
            select_columns(entity),
            entity.table()
        );
        Ok(conn
            .query_row(&sql, params![uid], |row| read_record(entity, row))
            .optional()?)
    }

    /// Number of rows of `entity`.
    pub fn count(&self, entity: EntityKind) -> Result<usize> {
        let conn = self.conn()?;
        let sql = format!("SELECT COUNT(*) FROM {}", entity.table());
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn entity_table_sql(entity: EntityKind) -> String {
    let schema = entity.schema();
    let columns: String = schema
        .fields
        .iter()
        .map(|f| format!("  {} TEXT,\n", f.column))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n  uid TEXT PRIMARY KEY,\n  source_id TEXT NOT NULL,\n{columns}  raw_payload TEXT NOT NULL,\n  first_seen TEXT NOT NULL,\n  last_updated TEXT NOT NULL\n);\nCREATE INDEX IF NOT EXISTS idx_{table}_source ON {table}(source_id);",
        table = schema.table,
    )
}

fn upsert_sql(entity: EntityKind, policy: ConflictPolicy) -> String {
    let schema = entity.schema();
    let mut columns = vec!["uid", "source_id"];
    columns.extend(schema.fields.iter().map(|f| f.column));
    columns.extend(["raw_payload", "first_seen", "last_updated"]);

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.table,
        columns.join(", "),
        placeholders.join(", ")
    );

    match policy {
        ConflictPolicy::InsertIfAbsent => format!("{insert} ON CONFLICT(uid) DO NOTHING"),
        ConflictPolicy::Replace => {
            // first_seen is never overwritten.
            let mut updates: Vec<String> = vec!["source_id = excluded.source_id".into()];
            updates.extend(
                schema
                    .fields
                    .iter()
                    .map(|f| format!("{0} = excluded.{0}", f.column)),
            );
            updates.push("raw_payload = excluded.raw_payload".into());
            updates.push("last_updated = excluded.last_updated".into());
            format!("{insert} ON CONFLICT(uid) DO UPDATE SET {}", updates.join(", "))
        }
    }
}

fn select_columns(entity: EntityKind) -> String {
    let mut columns = vec!["uid", "source_id"];
    columns.extend(entity.schema().fields.iter().map(|f| f.column));
    columns.extend(["raw_payload", "first_seen", "last_updated"]);
    columns.join(", ")
}

fn read_record(entity: EntityKind, row: &Row<'_>) -> rusqlite::Result<LedgerRecord> {
    let fields = entity.schema().fields;
    let mut values = std::collections::BTreeMap::new();
    for (i, field) in fields.iter().enumerate() {
        values.insert(field.column.to_string(), row.get::<_, Option<String>>(i + 2)?);
    }

    let base = fields.len() + 2;
    let payload: String = row.get(base)?;
    let raw_payload = serde_json::from_str(&payload).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(base, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(LedgerRecord {
        uid: row.get(0)?,
        source_id: row.get(1)?,
        fields: values,
        raw_payload,
        first_seen: parse_timestamp(row, base + 1)?,
        last_updated: parse_timestamp(row, base + 2)?,
    })
}

fn parse_timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        "2024-01-01T10:00:00Z".parse().unwrap()
    }

    fn members() -> Vec<Value> {
        vec![
            json!({"id": 1, "nome": "Ana", "partido": "PT"}),
            json!({"id": 2, "nomeVereador": "Bia", "siglaPartido": "PSD"}),
        ]
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let ledger = Ledger::open_in_memory().unwrap();

        ledger
            .upsert(EntityKind::Member, "floripa", &members(), t0(), ConflictPolicy::Replace)
            .unwrap();
        let first = ledger.records(EntityKind::Member, "floripa").unwrap();

        ledger
            .upsert(EntityKind::Member, "floripa", &members(), t0(), ConflictPolicy::Replace)
            .unwrap();
        let second = ledger.records(EntityKind::Member, "floripa").unwrap();

        assert_eq!(ledger.count(EntityKind::Member).unwrap(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_replace_keeps_first_seen() {
        let ledger = Ledger::open_in_memory().unwrap();
        let later = t0() + Duration::days(3);

        ledger
            .upsert(EntityKind::Member, "floripa", &members(), t0(), ConflictPolicy::Replace)
            .unwrap();
        let changed = vec![json!({"id": 1, "nome": "Ana", "partido": "PSOL"})];
        let affected = ledger
            .upsert(EntityKind::Member, "floripa", &changed, later, ConflictPolicy::Replace)
            .unwrap();

        assert_eq!(affected, 1);
        let row = ledger.get(EntityKind::Member, "floripa_1").unwrap().unwrap();
        assert_eq!(row.field("party"), Some("PSOL"));
        assert_eq!(row.first_seen, t0());
        assert_eq!(row.last_updated, later);
        assert_eq!(row.raw_payload, changed[0]);
        assert_eq!(ledger.count(EntityKind::Member).unwrap(), 2);
    }

    #[test]
    fn test_party_change_updates_member_without_id() {
        let ledger = Ledger::open_in_memory().unwrap();
        let later = t0() + Duration::days(30);

        ledger
            .upsert(EntityKind::Member, "s", &[json!({"nome": "Ana", "partido": "PT"})], t0(), ConflictPolicy::Replace)
            .unwrap();
        ledger
            .upsert(EntityKind::Member, "s", &[json!({"nome": "Ana", "partido": "PSOL"})], later, ConflictPolicy::Replace)
            .unwrap();

        assert_eq!(ledger.count(EntityKind::Member).unwrap(), 1);
        let rows = ledger.records(EntityKind::Member, "s").unwrap();
        assert_eq!(rows[0].field("party"), Some("PSOL"));
        assert_eq!(rows[0].first_seen, t0());
        assert_eq!(rows[0].last_updated, later);
    }

    #[test]
    fn test_insert_if_absent_keeps_first_write() {
        let ledger = Ledger::open_in_memory().unwrap();
        let item = json!({"data": "2024-03-01", "titulo": "Ordem do dia", "descricao": "original"});
        let edited = json!({"data": "2024-03-01", "titulo": "Ordem do dia", "descricao": "edited"});

        let first = ledger
            .upsert(EntityKind::AgendaItem, "floripa", &[item.clone()], t0(), ConflictPolicy::InsertIfAbsent)
            .unwrap();
        let second = ledger
            .upsert(
                EntityKind::AgendaItem,
                "floripa",
                &[edited],
                t0() + Duration::days(1),
                ConflictPolicy::InsertIfAbsent,
            )
            .unwrap();

        assert_eq!((first, second), (1, 0));
        let rows = ledger.records(EntityKind::AgendaItem, "floripa").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].field("description"), Some("original"));
        assert_eq!(rows[0].raw_payload, item);
        assert_eq!(rows[0].last_updated, t0());
    }

    #[test]
    fn test_missing_fields_are_null() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger
            .upsert(EntityKind::Proposal, "camara", &[json!({"id": 9, "ementa": "x"})], t0(), ConflictPolicy::Replace)
            .unwrap();

        let row = ledger.get(EntityKind::Proposal, "camara_9").unwrap().unwrap();
        assert_eq!(row.field("summary"), Some("x"));
        assert_eq!(row.field("author"), None);
        assert!(ledger.get(EntityKind::Proposal, "camara_10").unwrap().is_none());
    }

    #[test]
    fn test_collection_history_newest_first() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger
            .record_collection("floripa", "pautas", t0(), 10, CollectionStatus::Ok)
            .unwrap();
        ledger
            .record_collection("floripa", "noticias", t0() + Duration::hours(1), 500, CollectionStatus::Truncated)
            .unwrap();
        ledger
            .record_collection("camara", "eventos", t0(), 1, CollectionStatus::Failed)
            .unwrap();

        let history = ledger.collection_history("floripa", HISTORY_LIMIT).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].resource, "noticias");
        assert_eq!(history[0].status, CollectionStatus::Truncated);
        assert_eq!(history[1].total_items, 10);

        assert_eq!(ledger.collection_history("floripa", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_open_creates_file_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/ledger.db");

        {
            let ledger = Ledger::open(&path).unwrap();
            ledger
                .upsert(EntityKind::News, "floripa", &[json!({"link": "https://n/1", "titulo": "A"})], t0(), ConflictPolicy::InsertIfAbsent)
                .unwrap();
        }

        let reopened = Ledger::open(&path).unwrap();
        assert_eq!(reopened.count(EntityKind::News).unwrap(), 1);
        assert!(reopened.get(EntityKind::News, "floripa_https://n/1").unwrap().is_some());
    }
}
