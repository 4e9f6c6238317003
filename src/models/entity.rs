//! Canonical entity shapes for the ledger.
//!
//! Sources disagree on field names (`nome` vs `nomeVereador`, `tipo` vs
//! `siglaTipo`, ...). Each entity declares its normalized columns with an
//! ordered list of source fields to try, and how its `uid` is derived.
//! Normalization runs once, at ingestion.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::hash::content_hash;

/// What happens when an upserted `uid` already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Overwrite mutable fields and `last_updated`, keep `first_seen`
    Replace,
    /// Leave the existing row untouched
    InsertIfAbsent,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Replace => f.write_str("replace"),
            ConflictPolicy::InsertIfAbsent => f.write_str("insert-if-absent"),
        }
    }
}

/// A normalized column and the source fields that may carry it.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub column: &'static str,
    pub sources: &'static [&'static str],
}

const fn field(column: &'static str, sources: &'static [&'static str]) -> FieldSpec {
    FieldSpec { column, sources }
}

/// How a record's `uid` is derived.
#[derive(Debug, Clone, Copy)]
pub enum UidStrategy {
    /// `<source>_<id>` from the first present key, content hash otherwise
    SourceKey {
        keys: &'static [&'static str],
        hash_columns: &'static [&'static str],
    },
    /// Always a hash of the listed normalized columns
    ContentHash { hash_columns: &'static [&'static str] },
}

/// Table layout and identity rules for one entity.
#[derive(Debug, Clone, Copy)]
pub struct EntitySchema {
    pub table: &'static str,
    pub fields: &'static [FieldSpec],
    pub uid: UidStrategy,
}

const MEMBER: EntitySchema = EntitySchema {
    table: "members",
    fields: &[
        field("name", &["nome", "nomeVereador", "nomeCivil", "nomeParlamentar"]),
        field("party", &["partido", "siglaPartido"]),
        field("region", &["uf", "siglaUf"]),
        field("legislature", &["legislatura", "idLegislatura"]),
        field("email", &["email"]),
        field("photo_url", &["foto", "urlFoto"]),
    ],
    uid: UidStrategy::SourceKey {
        keys: &["id", "codigo", "idVereador"],
        hash_columns: &["name", "region"],
    },
};

const PROPOSAL: EntitySchema = EntitySchema {
    table: "proposals",
    fields: &[
        field("kind", &["siglaTipo", "tipo"]),
        field("number", &["numero"]),
        field("year", &["ano"]),
        field("summary", &["ementa"]),
        field("author", &["autor", "autores"]),
        field("presented_at", &["dataApresentacao", "data_apre", "data"]),
        field("district", &["bairro"]),
        field("status", &["status", "situacao", "descricaoSituacao"]),
    ],
    uid: UidStrategy::SourceKey {
        keys: &["id", "codigo", "idProposicao"],
        hash_columns: &["kind", "number", "year"],
    },
};

const AGENDA_ITEM: EntitySchema = EntitySchema {
    table: "agenda_items",
    fields: &[
        field("session_date", &["data", "dataSessao", "dataHoraInicio"]),
        field("session_type", &["tipo", "tipoSessao", "descricaoTipo"]),
        field("title", &["titulo", "descricaoTipo"]),
        field("description", &["descricao", "ementa"]),
    ],
    uid: UidStrategy::ContentHash {
        hash_columns: &["session_date", "title", "session_type"],
    },
};

const NEWS: EntitySchema = EntitySchema {
    table: "news",
    fields: &[
        field("title", &["titulo", "title"]),
        field("published_at", &["data", "dataPublicacao"]),
        field("link", &["link", "url"]),
        field("summary", &["resumo", "descricao"]),
    ],
    uid: UidStrategy::SourceKey {
        keys: &["id", "link", "url"],
        hash_columns: &["title", "published_at"],
    },
};

/// Entity types kept in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Member,
    Proposal,
    AgendaItem,
    News,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Member,
        EntityKind::Proposal,
        EntityKind::AgendaItem,
        EntityKind::News,
    ];

    pub fn schema(&self) -> &'static EntitySchema {
        match self {
            EntityKind::Member => &MEMBER,
            EntityKind::Proposal => &PROPOSAL,
            EntityKind::AgendaItem => &AGENDA_ITEM,
            EntityKind::News => &NEWS,
        }
    }

    /// People and proposals change over time; agenda items and news do not.
    pub fn default_policy(&self) -> ConflictPolicy {
        match self {
            EntityKind::Member | EntityKind::Proposal => ConflictPolicy::Replace,
            EntityKind::AgendaItem | EntityKind::News => ConflictPolicy::InsertIfAbsent,
        }
    }

    pub fn table(&self) -> &'static str {
        self.schema().table
    }
}

/// A record reduced to its canonical shape, ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub uid: String,
    /// Normalized values in schema column order
    pub fields: Vec<(&'static str, Option<String>)>,
}

impl NormalizedRecord {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| *name == column)
            .and_then(|(_, value)| value.as_deref())
    }
}

/// Reduce a raw source record to its canonical shape.
pub fn normalize(entity: EntityKind, source_id: &str, raw: &Value) -> NormalizedRecord {
    let schema = entity.schema();
    let fields: Vec<(&'static str, Option<String>)> = schema
        .fields
        .iter()
        .map(|spec| (spec.column, first_text(raw, spec.sources)))
        .collect();

    let hashed = |columns: &[&str]| -> String {
        let parts: Vec<String> = columns
            .iter()
            .filter_map(|column| {
                fields
                    .iter()
                    .find(|(name, _)| name == column)
                    .and_then(|(_, value)| value.as_ref())
                    .map(|value| format!("{column}={value}"))
            })
            .collect();

        let digest = if parts.is_empty() {
            // Nothing canonical to go on; the whole payload is the identity.
            content_hash(&[source_id, &canonical_text(raw)])
        } else {
            let mut input: Vec<&str> = vec![source_id];
            input.extend(parts.iter().map(String::as_str));
            content_hash(&input)
        };
        format!("{source_id}_{digest}")
    };

    let uid = match schema.uid {
        UidStrategy::SourceKey { keys, hash_columns } => match first_text(raw, keys) {
            Some(id) => format!("{source_id}_{id}"),
            None => hashed(hash_columns),
        },
        UidStrategy::ContentHash { hash_columns } => hashed(hash_columns),
    };

    NormalizedRecord { uid, fields }
}

/// JSON text with object keys sorted, so key order never changes a hash.
fn canonical_text(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body: Vec<String> = entries
                .into_iter()
                .map(|(key, value)| format!("{}:{}", Value::from(key.as_str()), canonical_text(value)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_text).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

/// First non-empty value among `keys`, rendered as text.
pub fn first_text(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find_map(value_text)
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) if items.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// A ledger row as read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerRecord {
    pub uid: String,
    pub source_id: String,
    pub fields: BTreeMap<String, Option<String>>,
    /// Payload exactly as received
    pub raw_payload: Value,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl LedgerRecord {
    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields.get(column).and_then(|v| v.as_deref())
    }
}
