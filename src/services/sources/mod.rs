//! Legislature data sources.
//!
//! Every chamber publishes the same kinds of resources through a different
//! API. [`DataSource`] is the capability each one implements; the collection
//! pipeline only talks to this trait.

mod federal;
mod municipal;

use async_trait::async_trait;

use crate::error::FetchFailure;
use crate::models::{Continuation, PageCursor, ResourceKind, ResourcePage, ResourceSpec};

pub use federal::FederalChamber;
pub use municipal::MunicipalChamber;

/// Outcome of a single page request.
pub type FetchResult = std::result::Result<ResourcePage, FetchFailure>;

/// A chamber's public API.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Identifier used in snapshot paths and ledger uids.
    fn source_id(&self) -> &str;

    /// State abbreviation, when the source is regional.
    fn region(&self) -> Option<&str> {
        None
    }

    /// How this API's paginated endpoints continue.
    fn continuation(&self) -> Continuation;

    /// Resources collected by a default run, in order.
    fn resources(&self) -> Vec<ResourceSpec>;

    /// Sitting members; served in a single response.
    async fn fetch_members(&self) -> FetchResult;

    async fn fetch_proposals(&self, cursor: PageCursor) -> FetchResult;

    async fn fetch_agenda(&self, cursor: PageCursor) -> FetchResult;

    /// Sources without a news feed report no records.
    async fn fetch_news(&self, _cursor: PageCursor) -> FetchResult {
        Ok(ResourcePage::empty())
    }

    /// Dispatch a page request by resource kind.
    async fn fetch(&self, kind: ResourceKind, cursor: PageCursor) -> FetchResult {
        match kind {
            ResourceKind::Members => self.fetch_members().await,
            ResourceKind::Proposals => self.fetch_proposals(cursor).await,
            ResourceKind::Agenda => self.fetch_agenda(cursor).await,
            ResourceKind::News => self.fetch_news(cursor).await,
        }
    }
}
