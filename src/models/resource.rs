//! Collected resources and their on-disk snapshot format.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::models::entity::{ConflictPolicy, EntityKind};

/// Snapshot layout version written into every file.
pub const SCHEMA_VERSION: &str = "1.0";

/// The kinds of resource a legislature source can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Sitting members (vereadores / deputados)
    Members,
    /// Legislative proposals (proposições)
    Proposals,
    /// Session agenda items (pautas / eventos)
    Agenda,
    /// Chamber news
    News,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Members,
        ResourceKind::Agenda,
        ResourceKind::News,
        ResourceKind::Proposals,
    ];

    /// Name used in snapshot paths and run summaries.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Members => "vereadores",
            ResourceKind::Proposals => "proposicoes",
            ResourceKind::Agenda => "pautas",
            ResourceKind::News => "noticias",
        }
    }

    /// Ledger entity the records normalize into.
    pub fn entity(&self) -> EntityKind {
        match self {
            ResourceKind::Members => EntityKind::Member,
            ResourceKind::Proposals => EntityKind::Proposal,
            ResourceKind::Agenda => EntityKind::AgendaItem,
            ResourceKind::News => EntityKind::News,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vereadores" | "members" | "deputados" => Ok(ResourceKind::Members),
            "proposicoes" | "proposals" => Ok(ResourceKind::Proposals),
            "pautas" | "agenda" | "eventos" => Ok(ResourceKind::Agenda),
            "noticias" | "news" => Ok(ResourceKind::News),
            other => Err(AppError::validation(format!("unknown resource '{other}'"))),
        }
    }
}

/// One entry of a collection run: what to fetch and how to store it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    /// Walk pages, or fetch a single response
    pub paginated: bool,
    /// Ledger policy; `None` skips the ledger for this resource
    pub policy: Option<ConflictPolicy>,
}

impl ResourceSpec {
    pub fn paginated(kind: ResourceKind) -> Self {
        Self {
            kind,
            paginated: true,
            policy: Some(kind.entity().default_policy()),
        }
    }

    pub fn single(kind: ResourceKind) -> Self {
        Self {
            kind,
            paginated: false,
            policy: Some(kind.entity().default_policy()),
        }
    }

    pub fn with_policy(mut self, policy: Option<ConflictPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// The full result of collecting one resource in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedResource {
    pub resource: String,
    pub source: String,
    pub region: Option<String>,
    pub collected_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub pages: usize,
    /// Pagination stopped at the page cap
    pub truncated: bool,
    pub total_hint: Option<u64>,
    pub records: Vec<Value>,
}

impl CollectedResource {
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

/// Header of a snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotMetadata {
    pub resource: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub collected_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub record_count: usize,
    pub schema_version: String,
    #[serde(default)]
    pub pages: usize,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_hint: Option<u64>,
}

/// `{metadata: {...}, data: [...]}` as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotFile {
    pub metadata: SnapshotMetadata,
    pub data: Vec<Value>,
}

impl From<&CollectedResource> for SnapshotFile {
    fn from(collected: &CollectedResource) -> Self {
        Self {
            metadata: SnapshotMetadata {
                resource: collected.resource.clone(),
                source: collected.source.clone(),
                region: collected.region.clone(),
                collected_at: collected.collected_at,
                duration_ms: collected.duration_ms,
                record_count: collected.record_count(),
                schema_version: SCHEMA_VERSION.to_string(),
                pages: collected.pages,
                truncated: collected.truncated,
                total_hint: collected.total_hint,
            },
            data: collected.records.clone(),
        }
    }
}

impl From<SnapshotFile> for CollectedResource {
    fn from(file: SnapshotFile) -> Self {
        let meta = file.metadata;
        Self {
            resource: meta.resource,
            source: meta.source,
            region: meta.region,
            collected_at: meta.collected_at,
            duration_ms: meta.duration_ms,
            pages: meta.pages,
            truncated: meta.truncated,
            total_hint: meta.total_hint,
            records: file.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_kind_parse() {
        assert_eq!("pautas".parse::<ResourceKind>().unwrap(), ResourceKind::Agenda);
        assert_eq!("Members".parse::<ResourceKind>().unwrap(), ResourceKind::Members);
        assert!("orcamento".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_snapshot_file_layout() {
        let collected = CollectedResource {
            resource: "pautas".into(),
            source: "florianopolis".into(),
            region: Some("SC".into()),
            collected_at: "2024-01-01T12:00:00Z".parse().unwrap(),
            duration_ms: 420,
            pages: 3,
            truncated: true,
            total_hint: None,
            records: vec![json!({"titulo": "Sessão ordinária"})],
        };

        let value = serde_json::to_value(SnapshotFile::from(&collected)).unwrap();
        assert_eq!(value["metadata"]["record_count"], 1);
        assert_eq!(value["metadata"]["schema_version"], "1.0");
        assert_eq!(value["metadata"]["truncated"], true);
        assert_eq!(value["data"][0]["titulo"], "Sessão ordinária");
        assert!(value["metadata"].get("total_hint").is_none());
    }
}
