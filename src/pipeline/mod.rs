//! Pipeline entry points for collector operations.
//!
//! - `Collector`: Fetch, snapshot and upsert a source's resources
//! - `run_monitor_once` / `run_monitor_loop`: Alert on new proposals
//! - `rank_expenses`: Rank deputies by yearly expenses

pub mod collect;
pub mod fanout;
pub mod monitor;
pub mod ranking;

pub use collect::{CollectOptions, Collector, ResourceOutcome, ResourceReport, RunSummary};
pub use fanout::fan_out;
pub use monitor::{MonitorQuery, MonitorReport, run_monitor_loop, run_monitor_once};
pub use ranking::{ExpenseRanking, rank_expenses};
