// src/services/paginator.rs

//! Walks a paginated endpoint until the data runs out.
//!
//! Termination, in priority order:
//! 1. an empty page (or, for link-style APIs, a page without a `next` link)
//! 2. the configured page cap, reported as [`PageStop::Truncated`]
//! 3. a [`FetchFailure`], reported as [`PageStop::Failed`] with whatever was
//!    accumulated before it

use std::future::Future;
use std::time::Duration;

use serde_json::Value;

use crate::error::FetchFailure;
use crate::models::{Continuation, PageCursor, PaginationConfig, ResourcePage};

/// Why pagination stopped.
#[derive(Debug, Clone)]
pub enum PageStop {
    /// The source ran out of data
    Exhausted,
    /// The page cap was hit while pages were still coming
    Truncated { max_pages: usize },
    /// A page request failed
    Failed(FetchFailure),
}

/// Accumulated records of one pagination run, in page order.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub records: Vec<Value>,
    /// Non-empty pages folded into `records`
    pub pages: usize,
    /// Total announced by the first page that carried one
    pub total_hint: Option<u64>,
    pub stop: PageStop,
}

impl Pagination {
    pub fn is_truncated(&self) -> bool {
        matches!(self.stop, PageStop::Truncated { .. })
    }

    pub fn failure(&self) -> Option<&FetchFailure> {
        match &self.stop {
            PageStop::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Page-walking driver with an explicit safety cap.
#[derive(Debug, Clone)]
pub struct Paginator {
    max_pages: usize,
    page_delay: Duration,
}

impl Paginator {
    pub fn new(max_pages: usize, page_delay: Duration) -> Self {
        Self {
            max_pages: max_pages.max(1),
            page_delay,
        }
    }

    pub fn from_config(config: &PaginationConfig) -> Self {
        Self::new(config.max_pages, Duration::from_millis(config.page_delay_ms))
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Fetch pages until one of the termination conditions holds.
    ///
    /// `fetch` receives the cursor of the page to load: page numbers count
    /// from 1, links come from the previous page's `next` entry.
    pub async fn fetch_all<F, Fut>(&self, continuation: Continuation, mut fetch: F) -> Pagination
    where
        F: FnMut(PageCursor) -> Fut,
        Fut: Future<Output = Result<ResourcePage, FetchFailure>>,
    {
        let mut records = Vec::new();
        let mut pages = 0;
        let mut total_hint = None;
        let mut cursor = PageCursor::first();

        let stop = loop {
            let page = match fetch(cursor.clone()).await {
                Ok(page) => page,
                Err(failure) => {
                    log::warn!(
                        "Pagination aborted at page {} ({} records kept): {}",
                        pages + 1,
                        records.len(),
                        failure
                    );
                    break PageStop::Failed(failure);
                }
            };

            if page.is_empty() {
                break PageStop::Exhausted;
            }

            pages += 1;
            total_hint = total_hint.or(page.total_hint);
            log::debug!("Page {}: {} records", pages, page.len());
            records.extend(page.records);

            let next = match continuation {
                Continuation::PageNumber => PageCursor::Number(pages as u32 + 1),
                Continuation::NextLink => match page.next_link {
                    Some(link) => PageCursor::Link(link),
                    None => break PageStop::Exhausted,
                },
            };

            if pages >= self.max_pages {
                log::warn!(
                    "Page cap of {} reached with more data pending; result is truncated",
                    self.max_pages
                );
                break PageStop::Truncated {
                    max_pages: self.max_pages,
                };
            }

            cursor = next;
            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        };

        Pagination {
            records,
            pages,
            total_hint,
            stop,
        }
    }

    /// Single request for resources that are not paginated.
    pub async fn fetch_one<F, Fut>(&self, fetch: F) -> Pagination
    where
        F: FnOnce(PageCursor) -> Fut,
        Fut: Future<Output = Result<ResourcePage, FetchFailure>>,
    {
        match fetch(PageCursor::first()).await {
            Ok(page) => Pagination {
                pages: usize::from(!page.is_empty()),
                total_hint: page.total_hint,
                records: page.records,
                stop: PageStop::Exhausted,
            },
            Err(failure) => Pagination {
                records: Vec::new(),
                pages: 0,
                total_hint: None,
                stop: PageStop::Failed(failure),
            },
        }
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::from_config(&PaginationConfig::default())
    }
}
