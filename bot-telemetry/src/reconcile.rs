//! Field reconciler: resolves a canonical key to a value inside an
//! arbitrarily-shaped upstream record.
//!
//! Resolution order, first hit wins:
//! 1. exact key
//! 2. case-insensitive key
//! 3. alias table, each alias exact then case-insensitive
//! 4. punctuation variants of the canonical name (`_` removed, `_` -> ` `,
//!    `_` -> `-`), each exact then case-insensitive
//!
//! A key holding JSON `null` counts as absent. `0` and `""` do not.

use crate::record::{CanonicalKey, MetricValue};
use itertools::Itertools;
use serde_json::{Map, Value};

/// Historically used upstream names per canonical key, in precedence order.
///
/// Precedence between semantically different fields (price vs mid price, pnl
/// vs unrealized pnl) is provisional until confirmed against live payloads.
pub static ALIASES: &[(CanonicalKey, &[&str])] = &[
    (
        CanonicalKey::Timestamp,
        &["time", "ts", "datetime", "date", "created_at", "time_label", "timestamp_utc"],
    ),
    (
        CanonicalKey::Side,
        &["action", "order_side", "trade_side", "direction", "type"],
    ),
    (
        CanonicalKey::Size,
        &["qty", "quantity", "amount", "position_size", "contracts", "volume"],
    ),
    (
        CanonicalKey::Price,
        &["fill_price", "exec_price", "avg_price", "entry_price", "mid_price", "mid", "close"],
    ),
    (
        CanonicalKey::Notional,
        &["notional_usd", "usd_value", "value_usd", "cost", "value"],
    ),
    (
        CanonicalKey::Pnl,
        &["realized_pnl", "profit", "pnl_usd", "net_pnl", "unrealized_pnl"],
    ),
    (
        CanonicalKey::SignalDirection,
        &["signal", "direction", "prediction", "pred", "position", "side"],
    ),
    (
        CanonicalKey::Score,
        &["signal_score", "raw_score", "strength", "signal_strength"],
    ),
    (
        CanonicalKey::Confidence,
        &["conf", "probability", "prob", "model_confidence"],
    ),
    (
        CanonicalKey::EquityValue,
        &["equity", "total_equity", "portfolio_value", "balance", "nav", "account_value"],
    ),
    (
        CanonicalKey::Realized,
        &["realized_pnl", "realised_pnl", "realised", "closed_pnl"],
    ),
    (
        CanonicalKey::Unrealized,
        &["unrealized_pnl", "unrealised_pnl", "unrealised", "open_pnl"],
    ),
    (
        CanonicalKey::DrawdownPct,
        &["drawdown", "dd_pct", "dd", "drawdown_percent", "current_drawdown"],
    ),
    (
        CanonicalKey::RollingReturn,
        &["rolling_return_pct", "return_rolling", "rolling_ret", "window_return"],
    ),
    (
        CanonicalKey::RollingVolatility,
        &["rolling_vol", "rolling_volatility_pct", "volatility", "window_volatility"],
    ),
    (
        CanonicalKey::Level,
        &["log_level", "severity", "levelname", "lvl"],
    ),
    (
        CanonicalKey::Message,
        &["msg", "text", "log", "event", "detail"],
    ),
    (
        CanonicalKey::Status,
        &["state", "health", "health_status", "ok"],
    ),
    (
        CanonicalKey::LatencyMs,
        &["latency", "latency_ms_avg", "response_time_ms", "rtt_ms", "ping_ms"],
    ),
];

/// Summary-endpoint per-bot fields.
pub static BOT_EQUITY_ALIASES: &[&str] = &["total_equity", "balance", "portfolio_value", "nav"];
pub static BOT_SIGNALS_ALIASES: &[&str] = &["signalsCount", "signals", "signal_count", "num_signals"];
pub static BOT_STATUS_ALIASES: &[&str] = &["state", "bot_status", "running"];

/// Aggregate ratios on the equity endpoint's `metrics` object.
pub static RATIO_ALIASES: &[(&str, &[&str])] = &[
    ("sharpe", &["sharpe_ratio", "sharpeRatio"]),
    ("win_rate", &["winrate", "win_pct", "hit_rate"]),
    ("max_drawdown", &["max_dd", "max_drawdown_pct", "maxDrawdown"]),
    ("volatility", &["vol", "annualized_volatility", "volatility_pct"]),
    ("correlation", &["corr", "benchmark_correlation", "btc_correlation"]),
];

/// Alias list for a canonical key, empty when the key has none.
pub fn aliases_for(key: CanonicalKey) -> &'static [&'static str] {
    ALIASES
        .iter()
        .find(|(candidate, _)| *candidate == key)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}

/// Resolve a canonical key against a raw record.
pub fn resolve(key: CanonicalKey, record: &Map<String, Value>) -> MetricValue {
    resolve_named(record, key.name(), aliases_for(key))
}

/// Resolve an arbitrary field name with its own alias list, using the same
/// ordered strategy as [`resolve`].
pub fn resolve_named(record: &Map<String, Value>, name: &str, aliases: &[&str]) -> MetricValue {
    lookup(record, name)
        .or_else(|| aliases.iter().find_map(|alias| lookup(record, alias)))
        .or_else(|| {
            punctuation_variants(name)
                .iter()
                .find_map(|variant| lookup(record, variant))
        })
        .map(MetricValue::from_json)
        .unwrap_or_default()
}

/// Exact then case-insensitive lookup, ignoring keys that hold `null`.
fn lookup<'a>(record: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    record
        .get(name)
        .filter(|value| !value.is_null())
        .or_else(|| {
            record
                .iter()
                .find(|(key, value)| key.eq_ignore_ascii_case(name) && !value.is_null())
                .map(|(_, value)| value)
        })
}

fn punctuation_variants(name: &str) -> Vec<String> {
    if !name.contains('_') {
        return Vec::new();
    }

    [
        name.replace('_', ""),
        name.replace('_', " "),
        name.replace('_', "-"),
    ]
    .into_iter()
    .unique()
    .collect()
}
