/// Console configuration resolved from environment variables
///
/// Every value has a default so the console starts against a local API
/// without any setup.
use crate::error::ConfigError;
use crate::types::DataKind;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_RECORD_LIMIT: usize = 100;
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-kind poll intervals. Executions and signals refresh faster than
/// health and equity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollIntervals {
    pub status: Duration,
    pub signals: Duration,
    pub executions: Duration,
    pub health: Duration,
    pub equity: Duration,
    pub logs: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            status: Duration::from_secs(10),
            signals: Duration::from_secs(5),
            executions: Duration::from_secs(5),
            health: Duration::from_secs(30),
            equity: Duration::from_secs(30),
            logs: Duration::from_secs(15),
        }
    }
}

impl PollIntervals {
    pub fn for_kind(&self, kind: DataKind) -> Duration {
        match kind {
            DataKind::Status => self.status,
            DataKind::Signals => self.signals,
            DataKind::Executions => self.executions,
            DataKind::Health => self.health,
            DataKind::Equity => self.equity,
            DataKind::Logs | DataKind::LogTypes | DataKind::LogDates => self.logs,
        }
    }

    /// Every interval must be non-zero; errors name the variable that sets it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (var, interval) in self.by_var() {
            if interval.is_zero() {
                return Err(ConfigError::ZeroInterval(var.to_string()));
            }
        }
        Ok(())
    }

    fn by_var(&self) -> [(&'static str, Duration); 6] {
        [
            ("POLL_STATUS_SECS", self.status),
            ("POLL_SIGNALS_SECS", self.signals),
            ("POLL_EXECUTIONS_SECS", self.executions),
            ("POLL_HEALTH_SECS", self.health),
            ("POLL_EQUITY_SECS", self.equity),
            ("POLL_LOGS_SECS", self.logs),
        ]
    }
}

/// Console configuration
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Base URL of the bot API
    pub api_url: Url,
    /// `limit` query parameter for record endpoints
    pub record_limit: usize,
    /// Per-request timeout
    pub http_timeout: Duration,
    /// Poll cadence per data kind
    pub intervals: PollIntervals,
    /// Optional `bot_version` selector forwarded to log endpoints
    pub bot_version: Option<String>,
    /// Directory exports are written to
    pub export_dir: PathBuf,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("default api url is valid"),
            record_limit: DEFAULT_RECORD_LIMIT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            intervals: PollIntervals::default(),
            bot_version: None,
            export_dir: PathBuf::from("."),
        }
    }
}

impl ConsoleConfig {
    /// Create a configuration with a custom API base URL
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_base_url(api_url)?,
            ..Default::default()
        })
    }

    /// Resolve configuration from `BOT_API_URL`, `BOT_RECORD_LIMIT`,
    /// `BOT_HTTP_TIMEOUT_SECS`, `POLL_*_SECS`, `BOT_VERSION` and `BOT_EXPORT_DIR`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`ConsoleConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("BOT_API_URL") {
            config.api_url = parse_base_url(&url)?;
        }
        if let Some(limit) = parse_var::<usize>(&lookup, "BOT_RECORD_LIMIT")? {
            config.record_limit = limit;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "BOT_HTTP_TIMEOUT_SECS")? {
            config.http_timeout = checked_timeout(Duration::from_secs(secs))?;
        }

        let intervals = &mut config.intervals;
        for (var, slot) in [
            ("POLL_STATUS_SECS", &mut intervals.status),
            ("POLL_SIGNALS_SECS", &mut intervals.signals),
            ("POLL_EXECUTIONS_SECS", &mut intervals.executions),
            ("POLL_HEALTH_SECS", &mut intervals.health),
            ("POLL_EQUITY_SECS", &mut intervals.equity),
            ("POLL_LOGS_SECS", &mut intervals.logs),
        ] {
            if let Some(secs) = parse_var::<u64>(&lookup, var)? {
                *slot = Duration::from_secs(secs);
            }
        }
        config.intervals.validate()?;

        config.bot_version = lookup("BOT_VERSION").filter(|v| !v.trim().is_empty());
        if let Some(dir) = lookup("BOT_EXPORT_DIR") {
            config.export_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Set record limit
    pub fn with_record_limit(mut self, limit: usize) -> Self {
        self.record_limit = limit;
        self
    }

    /// Set HTTP timeout, rejecting zero
    pub fn with_http_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        self.http_timeout = checked_timeout(timeout)?;
        Ok(self)
    }

    /// Set poll intervals, rejecting any zero interval
    pub fn with_intervals(mut self, intervals: PollIntervals) -> Result<Self, ConfigError> {
        intervals.validate()?;
        self.intervals = intervals;
        Ok(self)
    }

    /// Set bot version selector
    pub fn with_bot_version(mut self, version: impl Into<String>) -> Self {
        self.bot_version = Some(version.into());
        self
    }

    /// Set export directory
    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = dir.into();
        self
    }
}

/// Parse the base URL, forcing a trailing slash so relative joins keep any
/// path prefix (e.g. `https://host/api/`).
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };

    let url = Url::parse(&with_slash).map_err(|e| ConfigError::BaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if url.cannot_be_a_base() {
        return Err(ConfigError::BaseUrl {
            url: raw.to_string(),
            reason: "url cannot be a base".to_string(),
        });
    }

    Ok(url)
}

fn checked_timeout(timeout: Duration) -> Result<Duration, ConfigError> {
    if timeout.is_zero() {
        Err(ConfigError::ZeroTimeout)
    } else {
        Ok(timeout)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}
