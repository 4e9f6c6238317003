// src/models/mod.rs

//! Domain models for the collector.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod entity;
mod page;
mod resource;

// Re-export all public types
pub use config::{
    Config, FederalConfig, HttpConfig, LoggingConfig, MonitorConfig, MunicipalConfig,
    PaginationConfig, PathsConfig, split_keywords,
};
pub use entity::{
    ConflictPolicy, EntityKind, EntitySchema, FieldSpec, LedgerRecord, NormalizedRecord,
    UidStrategy, first_text, normalize,
};
pub use page::{Continuation, PageCursor, ResourcePage};
pub use resource::{
    CollectedResource, ResourceKind, ResourceSpec, SCHEMA_VERSION, SnapshotFile, SnapshotMetadata,
};
