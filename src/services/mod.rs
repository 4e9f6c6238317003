//! Service layer for the collector.
//!
//! This module contains the network-facing pieces:
//! - Retrying HTTP client (`HttpRetryClient`)
//! - Pagination driver (`Paginator`)
//! - Chamber APIs (`sources`)
//! - Alert delivery (`notifier`)

pub mod http;
pub mod notifier;
pub mod paginator;
pub mod sources;

#[cfg(test)]
pub(crate) mod testing;

pub use http::{HttpRetryClient, RetryPolicy, Transport};
pub use notifier::{ConsoleNotifier, Notifier, TelegramNotifier};
pub use paginator::{PageStop, Pagination, Paginator};
pub use sources::{DataSource, FederalChamber, FetchResult, MunicipalChamber};
