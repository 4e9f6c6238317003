//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client and retry behavior
    #[serde(default)]
    pub http: HttpConfig,

    /// Pagination limits
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// On-disk layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// Municipal chamber JSON-web API
    #[serde(default)]
    pub municipal: MunicipalConfig,

    /// Chamber of Deputies open-data API
    #[serde(default)]
    pub federal: FederalConfig,

    /// New-proposal monitor
    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply environment overrides for secrets and per-deployment values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("CMF_KEYSOFT") {
            self.municipal.token = token;
        }
        if let Some(token) = lookup("TELEGRAM_TOKEN") {
            self.monitor.telegram_token = Some(token);
        }
        if let Some(chat_id) = lookup("TELEGRAM_CHAT_ID") {
            self.monitor.telegram_chat_id = Some(chat_id);
        }
        if let Some(keywords) = lookup("MONITOR_KEYWORDS") {
            let parsed = split_keywords(&keywords);
            if !parsed.is_empty() {
                self.monitor.keywords = parsed;
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.http.max_attempts == 0 {
            return Err(AppError::validation("http.max_attempts must be > 0"));
        }
        if self.http.backoff_max_ms < self.http.backoff_base_ms {
            return Err(AppError::validation(
                "http.backoff_max_ms must be >= http.backoff_base_ms",
            ));
        }
        if self.http.max_concurrent == 0 {
            return Err(AppError::validation("http.max_concurrent must be > 0"));
        }
        if self.pagination.max_pages == 0 {
            return Err(AppError::validation("pagination.max_pages must be > 0"));
        }
        if self.pagination.page_size == 0 {
            return Err(AppError::validation("pagination.page_size must be > 0"));
        }
        if self.municipal.source_id.trim().is_empty() {
            return Err(AppError::validation("municipal.source_id is empty"));
        }
        if self.federal.source_id.trim().is_empty() {
            return Err(AppError::validation("federal.source_id is empty"));
        }
        url::Url::parse(&self.municipal.base_url)
            .map_err(|e| AppError::validation(format!("municipal.base_url: {e}")))?;
        url::Url::parse(&self.federal.base_url)
            .map_err(|e| AppError::validation(format!("federal.base_url: {e}")))?;
        if self.monitor.keywords.is_empty() {
            return Err(AppError::validation("monitor.keywords is empty"));
        }
        if self.monitor.max_results == 0 {
            return Err(AppError::validation("monitor.max_results must be > 0"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            pagination: PaginationConfig::default(),
            paths: PathsConfig::default(),
            municipal: MunicipalConfig::default(),
            federal: FederalConfig::default(),
            monitor: MonitorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Split a comma-separated keyword list, dropping blanks.
pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// HTTP client and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Total attempts per request, the first one included
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubled on each further retry
    #[serde(default = "defaults::backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound for computed backoff
    #[serde(default = "defaults::backoff_max")]
    pub backoff_max_ms: u64,

    /// Upper bound for a server-supplied Retry-After
    #[serde(default = "defaults::retry_after_cap")]
    pub retry_after_cap_secs: u64,

    /// Maximum concurrent requests during fan-out
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_attempts: defaults::max_attempts(),
            backoff_base_ms: defaults::backoff_base(),
            backoff_max_ms: defaults::backoff_max(),
            retry_after_cap_secs: defaults::retry_after_cap(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Pagination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Hard cap on pages fetched per resource
    #[serde(default = "defaults::max_pages")]
    pub max_pages: usize,

    /// Items requested per page where the API lets us choose
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// Pause between consecutive pages
    #[serde(default = "defaults::page_delay")]
    pub page_delay_ms: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_pages: defaults::max_pages(),
            page_size: defaults::page_size(),
            page_delay_ms: defaults::page_delay(),
        }
    }
}

/// Filesystem layout, relative paths resolve against `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,

    /// Root of `<source>/<resource>/<YYYYMMDD>.json` snapshots
    #[serde(default = "defaults::snapshots_dir")]
    pub snapshots_dir: PathBuf,

    /// SQLite ledger database
    #[serde(default = "defaults::ledger_file")]
    pub ledger_file: PathBuf,

    /// Monitor cursor file
    #[serde(default = "defaults::cursor_file")]
    pub cursor_file: PathBuf,
}

impl PathsConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn snapshots(&self) -> PathBuf {
        self.resolve(&self.snapshots_dir)
    }

    pub fn ledger(&self) -> PathBuf {
        self.resolve(&self.ledger_file)
    }

    pub fn cursor(&self) -> PathBuf {
        self.resolve(&self.cursor_file)
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
            snapshots_dir: defaults::snapshots_dir(),
            ledger_file: defaults::ledger_file(),
            cursor_file: defaults::cursor_file(),
        }
    }
}

/// Municipal chamber JSON-web API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MunicipalConfig {
    /// Source identifier used in snapshot paths and ledger uids
    #[serde(default = "defaults::municipal_source_id")]
    pub source_id: String,

    /// State abbreviation
    #[serde(default = "defaults::municipal_region")]
    pub region: String,

    #[serde(default = "defaults::municipal_base_url")]
    pub base_url: String,

    /// Access token sent as `keysoft`; usually supplied through `CMF_KEYSOFT`
    #[serde(default)]
    pub token: String,
}

impl Default for MunicipalConfig {
    fn default() -> Self {
        Self {
            source_id: defaults::municipal_source_id(),
            region: defaults::municipal_region(),
            base_url: defaults::municipal_base_url(),
            token: String::new(),
        }
    }
}

/// Chamber of Deputies open-data API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederalConfig {
    #[serde(default = "defaults::federal_source_id")]
    pub source_id: String,

    #[serde(default = "defaults::federal_base_url")]
    pub base_url: String,
}

impl Default for FederalConfig {
    fn default() -> Self {
        Self {
            source_id: defaults::federal_source_id(),
            base_url: defaults::federal_base_url(),
        }
    }
}

/// New-proposal monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Keywords matched against proposal summaries
    #[serde(default = "defaults::keywords")]
    pub keywords: Vec<String>,

    /// Proposal type code (e.g. "PL", "PEC"); empty means any type
    #[serde(default = "defaults::type_code")]
    pub type_code: String,

    /// Proposals fetched per keyword
    #[serde(default = "defaults::max_results")]
    pub max_results: usize,

    /// Seconds between checks in loop mode
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    #[serde(default, skip_serializing)]
    pub telegram_token: Option<String>,

    #[serde(default, skip_serializing)]
    pub telegram_chat_id: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            keywords: defaults::keywords(),
            type_code: defaults::type_code(),
            max_results: defaults::max_results(),
            interval_secs: defaults::interval(),
            telegram_token: None,
            telegram_chat_id: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; camara-collector/1.0)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_attempts() -> u32 {
        4
    }
    pub fn backoff_base() -> u64 {
        1_000
    }
    pub fn backoff_max() -> u64 {
        30_000
    }
    pub fn retry_after_cap() -> u64 {
        120
    }
    pub fn max_concurrent() -> usize {
        5
    }

    // Pagination defaults
    pub fn max_pages() -> usize {
        50
    }
    pub fn page_size() -> usize {
        100
    }
    pub fn page_delay() -> u64 {
        300
    }

    // Path defaults
    pub fn data_dir() -> PathBuf {
        PathBuf::from("data")
    }
    pub fn snapshots_dir() -> PathBuf {
        PathBuf::from("raw")
    }
    pub fn ledger_file() -> PathBuf {
        PathBuf::from("civic_transparency.db")
    }
    pub fn cursor_file() -> PathBuf {
        PathBuf::from("last_id.json")
    }

    // Source defaults
    pub fn municipal_source_id() -> String {
        "florianopolis".into()
    }
    pub fn municipal_region() -> String {
        "SC".into()
    }
    pub fn municipal_base_url() -> String {
        "https://www.cmf.sc.gov.br/jsonweb/web-aplicativo.php".into()
    }
    pub fn federal_source_id() -> String {
        "camara".into()
    }
    pub fn federal_base_url() -> String {
        "https://dadosabertos.camara.leg.br/api/v2".into()
    }

    // Monitor defaults
    pub fn keywords() -> Vec<String> {
        vec![
            "educação".into(),
            "saúde".into(),
            "meio ambiente".into(),
            "segurança pública".into(),
        ]
    }
    pub fn type_code() -> String {
        "PL".into()
    }
    pub fn max_results() -> usize {
        20
    }
    pub fn interval() -> u64 {
        1_800
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
