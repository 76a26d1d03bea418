/// Core identities, data kinds and scoping keys shared by every component
///
/// These types mirror the upstream bot API surface: four trading bots, one per
/// timeframe, each exposing the same family of per-kind endpoints.
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Trading bot identity, one per timeframe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Display,
)]
pub enum BotIdentity {
    #[display("5m")]
    #[serde(rename = "5m")]
    FiveMinute,
    #[display("1h")]
    #[serde(rename = "1h")]
    OneHour,
    #[display("12h")]
    #[serde(rename = "12h")]
    TwelveHour,
    #[display("24h")]
    #[serde(rename = "24h")]
    TwentyFourHour,
}

impl BotIdentity {
    /// Fixed registry order used by every status view.
    pub const ALL: [BotIdentity; 4] = [
        BotIdentity::FiveMinute,
        BotIdentity::OneHour,
        BotIdentity::TwelveHour,
        BotIdentity::TwentyFourHour,
    ];

    /// Path segment used by the upstream API (`/bots/{identity}/...`).
    pub fn as_str(&self) -> &'static str {
        match self {
            BotIdentity::FiveMinute => "5m",
            BotIdentity::OneHour => "1h",
            BotIdentity::TwelveHour => "12h",
            BotIdentity::TwentyFourHour => "24h",
        }
    }

    /// Lenient parse of upstream keys such as `"5m"`, `"5M"`, `"bot_5m"`, `"5min"`.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase();
        let key = key
            .strip_prefix("bot_")
            .or_else(|| key.strip_prefix("bot-"))
            .unwrap_or(&key);

        match key {
            "5m" | "5min" | "5" | "m5" => Some(BotIdentity::FiveMinute),
            "1h" | "60m" | "1hr" | "h1" => Some(BotIdentity::OneHour),
            "12h" | "12hr" | "h12" => Some(BotIdentity::TwelveHour),
            "24h" | "1d" | "24hr" | "h24" => Some(BotIdentity::TwentyFourHour),
            _ => None,
        }
    }
}

impl FromStr for BotIdentity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s).ok_or_else(|| format!("unknown bot identity: {s}"))
    }
}

/// Navigation target: one of the trading bots, the fleet summary, or the
/// synthetic logs view which has no bot of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum NavTab {
    #[display("Summary")]
    Summary,
    #[display("{_0}")]
    Bot(BotIdentity),
    #[display("Logs")]
    Logs,
}

impl NavTab {
    pub const ALL: [NavTab; 6] = [
        NavTab::Summary,
        NavTab::Bot(BotIdentity::FiveMinute),
        NavTab::Bot(BotIdentity::OneHour),
        NavTab::Bot(BotIdentity::TwelveHour),
        NavTab::Bot(BotIdentity::TwentyFourHour),
        NavTab::Logs,
    ];

    pub fn bot(&self) -> Option<BotIdentity> {
        match self {
            NavTab::Bot(identity) => Some(*identity),
            _ => None,
        }
    }
}

/// Bot process status as reported by the summary endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    #[display("running")]
    Running,
    #[display("stopped")]
    Stopped,
    #[default]
    #[display("unknown")]
    Unknown,
}

impl BotStatus {
    /// Map the free-form upstream status string onto the closed set.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" | "active" | "online" | "up" | "live" | "ok" => BotStatus::Running,
            "stopped" | "inactive" | "offline" | "down" | "halted" | "paused" => {
                BotStatus::Stopped
            }
            _ => BotStatus::Unknown,
        }
    }
}

/// Per-bot status card, replaced wholesale on every successful status poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotSnapshot {
    pub identity: BotIdentity,
    pub equity: f64,
    pub signals_count: u64,
    pub status: BotStatus,
    pub has_data: bool,
}

impl BotSnapshot {
    /// Placeholder card for a bot the upstream summary did not mention.
    pub fn synthesized(identity: BotIdentity) -> Self {
        Self {
            identity,
            equity: 0.0,
            signals_count: 0,
            status: BotStatus::Unknown,
            has_data: false,
        }
    }
}

/// Kind of upstream data a source polls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display)]
pub enum DataKind {
    #[display("status")]
    Status,
    #[display("signals")]
    Signals,
    #[display("executions")]
    Executions,
    #[display("health")]
    Health,
    #[display("equity")]
    Equity,
    #[display("logs")]
    Logs,
    #[display("log_types")]
    LogTypes,
    #[display("log_dates")]
    LogDates,
}

impl DataKind {
    /// Kinds served from `/bots/{identity}/{kind}`.
    pub fn is_bot_scoped(&self) -> bool {
        matches!(
            self,
            DataKind::Signals | DataKind::Executions | DataKind::Health | DataKind::Equity
        )
    }
}

/// Selector a source is currently fetching for (bot, log type, date, bot version).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Scope {
    pub bot: Option<BotIdentity>,
    pub log_type: Option<String>,
    pub date: Option<String>,
    pub bot_version: Option<String>,
}

impl Scope {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn bot(identity: BotIdentity) -> Self {
        Self {
            bot: Some(identity),
            ..Self::default()
        }
    }

    pub fn log(log_type: impl Into<String>) -> Self {
        Self {
            log_type: Some(log_type.into()),
            ..Self::default()
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_bot_version(mut self, version: impl Into<String>) -> Self {
        self.bot_version = Some(version.into());
        self
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = [
            self.bot.map(|b| format!("bot={b}")),
            self.log_type.as_ref().map(|t| format!("type={t}")),
            self.date.as_ref().map(|d| format!("date={d}")),
            self.bot_version.as_ref().map(|v| format!("version={v}")),
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            write!(f, "global")
        } else {
            write!(f, "{}", parts.join(","))
        }
    }
}

/// Address of one snapshot in the view store: (data kind, scope).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ScopeKey {
    pub kind: DataKind,
    pub scope: Scope,
}

impl ScopeKey {
    pub fn new(kind: DataKind, scope: Scope) -> Self {
        Self { kind, scope }
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.kind, self.scope)
    }
}
