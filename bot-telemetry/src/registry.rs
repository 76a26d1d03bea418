//! Bot registry normalizer.
//!
//! The status panel always renders exactly four bot cards. Whatever subset the
//! summary endpoint reports is folded into a complete registry here, once, so
//! no consumer has to null-check.

use crate::reconcile::{
    BOT_EQUITY_ALIASES, BOT_SIGNALS_ALIASES, BOT_STATUS_ALIASES, resolve_named,
};
use crate::record::MetricValue;
use crate::types::{BotIdentity, BotSnapshot, BotStatus};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Complete set of bot cards in [`BotIdentity::ALL`] order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotRegistry {
    bots: [BotSnapshot; 4],
}

impl Default for BotRegistry {
    fn default() -> Self {
        Self {
            bots: BotIdentity::ALL.map(BotSnapshot::synthesized),
        }
    }
}

impl BotRegistry {
    pub fn get(&self, identity: BotIdentity) -> &BotSnapshot {
        // ALL order and array order are the same by construction
        &self.bots[identity as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &BotSnapshot> {
        self.bots.iter()
    }

    /// Number of bots the upstream actually reported.
    pub fn reported(&self) -> usize {
        self.bots.iter().filter(|bot| bot.has_data).count()
    }

    pub fn total_equity(&self) -> f64 {
        self.bots.iter().map(|bot| bot.equity).sum()
    }

    pub fn total_signals(&self) -> u64 {
        self.bots.iter().map(|bot| bot.signals_count).sum()
    }
}

/// Fleet summary: registry plus upstream totals.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StatusView {
    pub registry: BotRegistry,
    /// Upstream `total_equity`, or the registry sum when upstream omits it.
    pub total_equity: MetricValue,
    /// Upstream `total_signals`, or the registry sum when upstream omits it.
    pub total_signals: MetricValue,
    pub last_update: Option<String>,
}

/// Fold a possibly-partial `bots` object into a complete registry.
///
/// Entries are matched to identities leniently (`"5M"`, `"bot_5m"`); unknown
/// keys are ignored. Non-object payloads yield an all-synthesized registry.
pub fn normalize_registry(bots: Option<&Value>) -> BotRegistry {
    let mut registry = BotRegistry::default();

    let Some(entries) = bots.and_then(Value::as_object) else {
        return registry;
    };

    for (key, entry) in entries {
        let Some(identity) = BotIdentity::parse_lenient(key) else {
            debug!(key = %key, "ignoring unknown bot identity in status payload");
            continue;
        };

        let snapshot = match entry.as_object() {
            Some(entry) => bot_snapshot(identity, entry),
            None => continue,
        };
        registry.bots[identity as usize] = snapshot;
    }

    registry
}

/// Build the full status view from the `/dashboard/summary` payload.
pub fn normalize_status(summary: &Value) -> StatusView {
    let registry = normalize_registry(summary.get("bots"));
    let empty = Map::new();
    let object = summary.as_object().unwrap_or(&empty);

    let total_equity = match resolve_named(object, "total_equity", &["totalEquity", "equity"]) {
        MetricValue::Missing => MetricValue::Number(registry.total_equity()),
        value => value,
    };
    let total_signals = match resolve_named(object, "total_signals", &["totalSignals", "signals"])
    {
        MetricValue::Missing => MetricValue::Number(registry.total_signals() as f64),
        value => value,
    };
    let last_update = match resolve_named(object, "last_update", &["lastUpdate", "updated_at"]) {
        MetricValue::Missing => None,
        value => Some(value.display()),
    };

    StatusView {
        registry,
        total_equity,
        total_signals,
        last_update,
    }
}

fn bot_snapshot(identity: BotIdentity, entry: &Map<String, Value>) -> BotSnapshot {
    let equity = resolve_named(entry, "equity", BOT_EQUITY_ALIASES)
        .as_f64()
        .filter(|equity| *equity >= 0.0)
        .unwrap_or(0.0);

    let signals_count = resolve_named(entry, "signals_count", BOT_SIGNALS_ALIASES)
        .as_u64()
        .unwrap_or(0);

    let status = match resolve_named(entry, "status", BOT_STATUS_ALIASES) {
        MetricValue::Text(text) => BotStatus::parse_lenient(&text),
        MetricValue::Flag(true) => BotStatus::Running,
        MetricValue::Flag(false) => BotStatus::Stopped,
        _ => BotStatus::Unknown,
    };

    BotSnapshot {
        identity,
        equity,
        signals_count,
        status,
        has_data: true,
    }
}
