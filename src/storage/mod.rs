//! Persistence for collected data.
//!
//! - Snapshots: `{snapshots_dir}/{source}/{resource}/YYYYMMDD.json`, one
//!   immutable copy per resource and day (`SnapshotStore`)
//! - Ledger: normalized, deduplicated entity tables in SQLite (`Ledger`)
//! - Cursor: `{"last_id": n}` high-water mark for the monitor (`CursorTracker`)

pub mod cursor;
pub mod ledger;
pub mod snapshot;

pub use cursor::CursorTracker;
pub use ledger::{CollectionEntry, CollectionStatus, HISTORY_LIMIT, Ledger};
pub use snapshot::{LocalSnapshotStore, SnapshotStore, parse_date};
