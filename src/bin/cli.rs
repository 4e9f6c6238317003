//! Collector CLI
//!
//! Local execution entry point, suitable for cron. Commands exit with code 0
//! once they complete, even if individual resources failed; failures are
//! reported in the output.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use collector::{
    error::{AppError, Result},
    models::{Config, EntityKind, ResourceKind, ResourceSpec, split_keywords},
    pipeline::{self, CollectOptions, Collector, MonitorQuery},
    services::{DataSource, FederalChamber, HttpRetryClient, MunicipalChamber, Paginator, notifier},
    storage::{CursorTracker, HISTORY_LIMIT, Ledger, LocalSnapshotStore, SnapshotStore, parse_date},
    utils::console,
};

/// Collector - Brazilian legislature open data
#[derive(Parser, Debug)]
#[command(
    name = "collector",
    version,
    about = "Collects legislature open data into dated snapshots and a normalized ledger"
)]
struct Cli {
    /// Data directory (snapshots, ledger, cursor, config.toml)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (default: {data_dir}/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum SourceArg {
    /// Municipal chamber JSON-web API
    Municipal,
    /// Chamber of Deputies open-data API
    Federal,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch resources, write today's snapshots and update the ledger
    Collect {
        #[arg(long, value_enum, default_value = "municipal")]
        source: SourceArg,

        /// Restrict the run to these resources (repeatable)
        #[arg(long = "resource")]
        resources: Vec<String>,

        /// Fetch everything but persist nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Alert on new proposals matching the monitored keywords
    Monitor {
        /// Run a single check instead of looping
        #[arg(long)]
        once: bool,

        /// Reset the cursor before checking
        #[arg(long)]
        reset: bool,

        /// Comma-separated keywords (overrides configuration)
        #[arg(long)]
        keywords: Option<String>,
    },

    /// Reset the monitor cursor to 0
    ResetCursor,

    /// Inspect stored snapshots
    Snapshots {
        #[command(subcommand)]
        action: SnapshotAction,
    },

    /// Show recent collection runs from the ledger
    History {
        #[arg(long, value_enum, default_value = "municipal")]
        source: SourceArg,

        #[arg(long, default_value_t = HISTORY_LIMIT)]
        limit: usize,
    },

    /// Rank deputies by net expenses for a year
    RankExpenses {
        #[arg(long)]
        year: i32,

        /// Rows to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Validate configuration
    Validate,
}

#[derive(Subcommand, Debug)]
enum SnapshotAction {
    /// List snapshot dates of a resource
    List {
        #[arg(long, value_enum, default_value = "municipal")]
        source: SourceArg,

        #[arg(long)]
        resource: String,
    },

    /// Show one snapshot (latest by default)
    Show {
        #[arg(long, value_enum, default_value = "municipal")]
        source: SourceArg,

        #[arg(long)]
        resource: String,

        /// YYYYMMDD or YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,

        /// Records to print
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn load_config(cli: &Cli) -> Config {
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| Config::default().paths.data_dir);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join("config.toml"));

    let mut config = if config_path.exists() {
        Config::load_or_default(&config_path)
    } else {
        log::debug!("No config at {}, using defaults", config_path.display());
        Config::default()
    };
    config.apply_env();
    if let Some(dir) = &cli.data_dir {
        config.paths.data_dir = dir.clone();
    }
    config
}

fn source_id(config: &Config, source: SourceArg) -> &str {
    match source {
        SourceArg::Municipal => &config.municipal.source_id,
        SourceArg::Federal => &config.federal.source_id,
    }
}

fn build_source(config: &Config, client: HttpRetryClient, source: SourceArg) -> Box<dyn DataSource> {
    match source {
        SourceArg::Municipal => Box::new(MunicipalChamber::new(client, config.municipal.clone())),
        SourceArg::Federal => Box::new(FederalChamber::new(
            client,
            config.federal.clone(),
            config.pagination.page_size,
        )),
    }
}

/// Resource specs for `--resource` names, in the source's default order.
fn select_resources(source: &dyn DataSource, names: &[String]) -> Result<Vec<ResourceSpec>> {
    let available = source.resources();
    if names.is_empty() {
        return Ok(available);
    }

    let wanted = names
        .iter()
        .map(|n| n.parse::<ResourceKind>())
        .collect::<Result<Vec<_>>>()?;
    for kind in &wanted {
        if !available.iter().any(|spec| spec.kind == *kind) {
            return Err(AppError::validation(format!(
                "resource '{}' is not published by {}",
                kind,
                source.source_id()
            )));
        }
    }
    Ok(available
        .into_iter()
        .filter(|spec| wanted.contains(&spec.kind))
        .collect())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli);
    console::init(if cli.verbose { "debug" } else { config.logging.level.as_str() });
    log::info!("Data directory: {}", config.paths.data_dir.display());

    match cli.command {
        Command::Collect {
            source,
            resources,
            dry_run,
        } => {
            config.validate()?;
            let client = HttpRetryClient::new(&config.http)?;
            let source = build_source(&config, client, source);
            let specs = select_resources(source.as_ref(), &resources)?;

            let store = LocalSnapshotStore::for_source(config.paths.snapshots(), source.source_id());
            let ledger = if dry_run {
                None
            } else {
                Some(Ledger::open(config.paths.ledger())?)
            };

            console::header(&format!("Collecting {}", source.source_id()));
            let mut collector = Collector::new(source.as_ref(), Paginator::from_config(&config.pagination))
                .with_snapshots(&store)
                .with_options(CollectOptions { dry_run });
            if let Some(ledger) = &ledger {
                collector = collector.with_ledger(ledger);
            }

            let summary = collector.run(&specs).await;
            summary.print();
        }

        Command::Monitor {
            once,
            reset,
            keywords,
        } => {
            config.validate()?;
            let client = HttpRetryClient::new(&config.http)?;
            let chamber = FederalChamber::new(client, config.federal.clone(), config.pagination.page_size);
            let cursor = CursorTracker::new(config.paths.cursor());
            let notifier = notifier::from_config(&config.http, &config.monitor)?;

            if reset {
                cursor.reset().await?;
            }

            let keywords = keywords
                .map(|raw| split_keywords(&raw))
                .filter(|k| !k.is_empty())
                .unwrap_or_else(|| config.monitor.keywords.clone());
            let query = MonitorQuery {
                keywords,
                type_code: config.monitor.type_code.clone(),
                max_results: config.monitor.max_results,
            };

            console::header("Proposal monitor");
            if once {
                let report = pipeline::run_monitor_once(&chamber, &cursor, notifier.as_ref(), &query).await?;
                console::summary(
                    "Monitor",
                    &[
                        ("New proposals", report.found.to_string()),
                        ("Delivered", report.delivered.to_string()),
                        ("Cursor", cursor.load().await.to_string()),
                    ],
                );
            } else {
                let interval = Duration::from_secs(config.monitor.interval_secs.max(1));
                console::info("Monitoring continuously, press Ctrl+C to stop");
                tokio::select! {
                    result = pipeline::run_monitor_loop(&chamber, &cursor, notifier.as_ref(), &query, interval) => result?,
                    _ = tokio::signal::ctrl_c() => console::info("Monitor stopped"),
                }
            }
        }

        Command::ResetCursor => {
            let cursor = CursorTracker::new(config.paths.cursor());
            cursor.reset().await?;
            console::success(&format!("Cursor reset ({})", cursor.path().display()));
        }

        Command::Snapshots { action } => match action {
            SnapshotAction::List { source, resource } => {
                let store = LocalSnapshotStore::for_source(config.paths.snapshots(), source_id(&config, source));
                let resource = resource.parse::<ResourceKind>()?;
                let dates = store.list_dates(resource.name()).await?;
                if dates.is_empty() {
                    console::info(&format!("No snapshots of {}", resource));
                }
                for date in dates {
                    console::sub_item(&date.format("%Y%m%d").to_string());
                }
            }
            SnapshotAction::Show {
                source,
                resource,
                date,
                limit,
            } => {
                let store = LocalSnapshotStore::for_source(config.paths.snapshots(), source_id(&config, source));
                let resource = resource.parse::<ResourceKind>()?;
                let date = date.as_deref().map(parse_date).transpose()?;

                match store.read(resource.name(), date).await {
                    Ok(snapshot) => {
                        console::summary(
                            &format!("{} / {}", snapshot.source, snapshot.resource),
                            &[
                                ("Collected at", snapshot.collected_at.to_rfc3339()),
                                ("Records", snapshot.record_count().to_string()),
                                ("Pages", snapshot.pages.to_string()),
                                ("Truncated", snapshot.truncated.to_string()),
                                ("Duration (ms)", snapshot.duration_ms.to_string()),
                            ],
                        );
                        for record in snapshot.records.iter().take(limit) {
                            console::sub_item(&record.to_string());
                        }
                    }
                    Err(AppError::NotFound { what }) => console::warn(&format!("Not found: {}", what)),
                    Err(e) => return Err(e),
                }
            }
        },

        Command::History { source, limit } => {
            let ledger = Ledger::open(config.paths.ledger())?;
            let id = source_id(&config, source);
            let history = ledger.collection_history(id, limit)?;
            console::header(&format!("Collection history: {}", id));
            for entry in &history {
                console::sub_item(&format!(
                    "{}  {:<12} {:>6} items  {}",
                    entry.collected_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.resource,
                    entry.total_items,
                    entry.status.as_str()
                ));
            }
            let totals: Vec<(&str, String)> = EntityKind::ALL
                .iter()
                .map(|entity| -> Result<(&str, String)> {
                    Ok((entity.table(), ledger.count(*entity)?.to_string()))
                })
                .collect::<Result<_>>()?;
            console::summary("Ledger rows", &totals);
        }

        Command::RankExpenses { year, limit } => {
            config.validate()?;
            let client = HttpRetryClient::new(&config.http)?;
            let chamber = FederalChamber::new(client, config.federal.clone(), config.pagination.page_size);
            let paginator = Paginator::from_config(&config.pagination);

            let ranking =
                pipeline::rank_expenses(&chamber, &paginator, year, config.http.max_concurrent).await?;
            ranking.print(limit);
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            console::success("Config OK");
            if config.municipal.token.is_empty() {
                console::warn("municipal.token is empty (set CMF_KEYSOFT)");
            }
        }
    }

    Ok(())
}
