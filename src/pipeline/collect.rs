// src/pipeline/collect.rs

//! Collection runs.
//!
//! Each resource is fetched, wrapped as a [`CollectedResource`], written as a
//! dated snapshot and upserted into the ledger, one resource after the other.
//! A failing resource is logged and reported; the run moves on to the next.

use std::time::Instant;

use chrono::{NaiveDate, Utc};

use crate::error::{AppError, Result};
use crate::models::{CollectedResource, ResourceSpec};
use crate::services::{DataSource, PageStop, Pagination, Paginator};
use crate::storage::{CollectionStatus, Ledger, SnapshotStore};
use crate::utils::console;

/// Run-wide switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectOptions {
    /// Fetch everything, persist nothing
    pub dry_run: bool,
}

/// What happened to one resource.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceOutcome {
    Success {
        records: usize,
        pages: usize,
        /// Stopped at the page cap
        truncated: bool,
        /// Rows inserted or changed in the ledger
        upserted: usize,
    },
    Failure {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceReport {
    pub resource: String,
    pub outcome: ResourceOutcome,
}

impl ResourceReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ResourceOutcome::Success { .. })
    }
}

/// Per-resource results of one run, in run order.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub source_id: String,
    pub date: NaiveDate,
    pub dry_run: bool,
    pub reports: Vec<ResourceReport>,
}

impl RunSummary {
    /// `Some(true)` for success, `Some(false)` for failure, `None` if the
    /// resource was not part of the run.
    pub fn status(&self, resource: &str) -> Option<bool> {
        self.reports
            .iter()
            .find(|r| r.resource == resource)
            .map(ResourceReport::is_success)
    }

    pub fn succeeded(&self) -> usize {
        self.reports.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.len() - self.succeeded()
    }

    /// Print the run result to the console.
    pub fn print(&self) {
        console::header(&format!("Collection result: {} ({})", self.source_id, self.date));
        for report in &self.reports {
            match &report.outcome {
                ResourceOutcome::Success {
                    records,
                    pages,
                    truncated,
                    upserted,
                } => {
                    let mut line = format!(
                        "{}: {} records, {} page(s), {} ledger rows",
                        report.resource, records, pages, upserted
                    );
                    if *truncated {
                        line.push_str(" [TRUNCATED]");
                    }
                    console::success(&line);
                }
                ResourceOutcome::Failure { reason } => {
                    console::failure(&format!("{}: {}", report.resource, reason));
                }
            }
        }
        console::summary(
            "Collection",
            &[
                ("Source", self.source_id.clone()),
                ("Succeeded", self.succeeded().to_string()),
                ("Failed", self.failed().to_string()),
                ("Dry run", self.dry_run.to_string()),
            ],
        );
    }
}

/// Composes a data source, the paginator and the stores into a run.
pub struct Collector<'a> {
    source: &'a dyn DataSource,
    paginator: Paginator,
    snapshots: Option<&'a dyn SnapshotStore>,
    ledger: Option<&'a Ledger>,
    options: CollectOptions,
}

impl<'a> Collector<'a> {
    pub fn new(source: &'a dyn DataSource, paginator: Paginator) -> Self {
        Self {
            source,
            paginator,
            snapshots: None,
            ledger: None,
            options: CollectOptions::default(),
        }
    }

    pub fn with_snapshots(mut self, store: &'a dyn SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn with_ledger(mut self, ledger: &'a Ledger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_options(mut self, options: CollectOptions) -> Self {
        self.options = options;
        self
    }

    /// Collect every resource; never fails as a whole.
    pub async fn run(&self, resources: &[ResourceSpec]) -> RunSummary {
        let date = Utc::now().date_naive();
        let source_id = self.source.source_id();
        let total = resources.len();
        let mut reports = Vec::with_capacity(total);

        for (i, spec) in resources.iter().enumerate() {
            console::step(i + 1, total, &format!("[{}] Collecting {}", source_id, spec.name()));

            let outcome = match self.collect_resource(spec, date).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("[{}] Resource '{}' failed: {}", source_id, spec.name(), e);
                    self.log_collection(spec, 0, CollectionStatus::Failed);
                    ResourceOutcome::Failure {
                        reason: e.to_string(),
                    }
                }
            };

            reports.push(ResourceReport {
                resource: spec.name().to_string(),
                outcome,
            });
        }

        RunSummary {
            source_id: source_id.to_string(),
            date,
            dry_run: self.options.dry_run,
            reports,
        }
    }

    async fn fetch(&self, spec: &ResourceSpec) -> Pagination {
        let kind = spec.kind;
        if spec.paginated {
            self.paginator
                .fetch_all(self.source.continuation(), |cursor| self.source.fetch(kind, cursor))
                .await
        } else {
            self.paginator
                .fetch_one(|cursor| self.source.fetch(kind, cursor))
                .await
        }
    }

    async fn collect_resource(&self, spec: &ResourceSpec, date: NaiveDate) -> Result<ResourceOutcome> {
        let collected_at = Utc::now();
        let started = Instant::now();

        let pagination = self.fetch(spec).await;
        let truncated = match pagination.stop {
            PageStop::Failed(failure) => {
                // Partial pages are dropped rather than committed as complete.
                return Err(AppError::Fetch(failure));
            }
            PageStop::Truncated { .. } => true,
            PageStop::Exhausted => false,
        };

        let collected = CollectedResource {
            resource: spec.name().to_string(),
            source: self.source.source_id().to_string(),
            region: self.source.region().map(str::to_string),
            collected_at,
            duration_ms: started.elapsed().as_millis() as u64,
            pages: pagination.pages,
            truncated,
            total_hint: pagination.total_hint,
            records: pagination.records,
        };

        let records = collected.record_count();
        if self.options.dry_run {
            log::info!("[DRY-RUN] {}: {} records (not saved)", spec.name(), records);
            return Ok(ResourceOutcome::Success {
                records,
                pages: collected.pages,
                truncated,
                upserted: 0,
            });
        }

        if let Some(store) = self.snapshots {
            store.write(spec.name(), date, &collected).await?;
        }

        let mut upserted = 0;
        if let (Some(ledger), Some(policy)) = (self.ledger, spec.policy) {
            upserted = ledger.upsert(
                spec.kind.entity(),
                &collected.source,
                &collected.records,
                collected_at,
                policy,
            )?;
        }

        let status = if truncated {
            CollectionStatus::Truncated
        } else {
            CollectionStatus::Ok
        };
        self.log_collection(spec, records, status);

        log::info!(
            "[{}] {}: {} records in {} ms{}",
            collected.source,
            spec.name(),
            records,
            collected.duration_ms,
            if truncated { " (truncated)" } else { "" }
        );

        Ok(ResourceOutcome::Success {
            records,
            pages: collected.pages,
            truncated,
            upserted,
        })
    }

    fn log_collection(&self, spec: &ResourceSpec, total_items: usize, status: CollectionStatus) {
        if self.options.dry_run {
            return;
        }
        if let Some(ledger) = self.ledger {
            if let Err(e) = ledger.record_collection(
                self.source.source_id(),
                spec.name(),
                Utc::now(),
                total_items,
                status,
            ) {
                log::warn!("Cannot record collection of {}: {}", spec.name(), e);
            }
        }
    }
}
