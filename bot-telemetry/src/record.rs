/// Canonical record model produced by the field reconciler
use crate::reconcile::resolve;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Placeholder rendered for a field that could not be resolved.
pub const MISSING_PLACEHOLDER: &str = "--";

/// Domain key independent of how any particular bot version labels it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CanonicalKey {
    Timestamp,
    Side,
    Size,
    Price,
    Notional,
    Pnl,
    SignalDirection,
    Score,
    Confidence,
    EquityValue,
    Realized,
    Unrealized,
    DrawdownPct,
    RollingReturn,
    RollingVolatility,
    Level,
    Message,
    Status,
    LatencyMs,
}

impl CanonicalKey {
    /// Canonical snake_case name; the punctuation-normalized lookups derive from it.
    pub fn name(&self) -> &'static str {
        match self {
            CanonicalKey::Timestamp => "timestamp",
            CanonicalKey::Side => "side",
            CanonicalKey::Size => "size",
            CanonicalKey::Price => "price",
            CanonicalKey::Notional => "notional",
            CanonicalKey::Pnl => "pnl",
            CanonicalKey::SignalDirection => "signal_direction",
            CanonicalKey::Score => "score",
            CanonicalKey::Confidence => "confidence",
            CanonicalKey::EquityValue => "equity_value",
            CanonicalKey::Realized => "realized",
            CanonicalKey::Unrealized => "unrealized",
            CanonicalKey::DrawdownPct => "drawdown_pct",
            CanonicalKey::RollingReturn => "rolling_return",
            CanonicalKey::RollingVolatility => "rolling_volatility",
            CanonicalKey::Level => "level",
            CanonicalKey::Message => "message",
            CanonicalKey::Status => "status",
            CanonicalKey::LatencyMs => "latency_ms",
        }
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for CanonicalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Result of resolving one canonical key against a raw record.
///
/// `Number(0.0)` and `Text("")` are present values. Only `Missing` means the
/// field could not be found.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MetricValue {
    Number(f64),
    Text(String),
    Flag(bool),
    /// Nested array or object, carried through untouched.
    Structured(Value),
    #[default]
    Missing,
}

impl MetricValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => MetricValue::Missing,
            Value::Bool(flag) => MetricValue::Flag(*flag),
            Value::Number(number) => number
                .as_f64()
                .map(MetricValue::Number)
                .unwrap_or_else(|| MetricValue::Text(number.to_string())),
            Value::String(text) => MetricValue::Text(text.clone()),
            other => MetricValue::Structured(other.clone()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, MetricValue::Missing)
    }

    pub fn is_present(&self) -> bool {
        !self.is_missing()
    }

    /// Numeric view; numeric strings such as `"12.5"` are accepted since CSV
    /// sourced bots emit everything as text.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            MetricValue::Number(value) => Some(*value),
            MetricValue::Text(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        value.filter(|value| value.is_finite())
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_f64()
            .filter(|value| *value >= 0.0)
            .map(|value| value.round() as u64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Display text; `Missing` renders as [`MISSING_PLACEHOLDER`], never as `0`.
    pub fn display(&self) -> String {
        match self {
            MetricValue::Number(value) => format_number(*value),
            MetricValue::Text(text) => text.clone(),
            MetricValue::Flag(flag) => flag.to_string(),
            MetricValue::Structured(value) => value.to_string(),
            MetricValue::Missing => MISSING_PLACEHOLDER.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            MetricValue::Number(value) => serde_json::Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            MetricValue::Text(text) => Value::String(text.clone()),
            MetricValue::Flag(flag) => Value::Bool(*flag),
            MetricValue::Structured(value) => value.clone(),
            MetricValue::Missing => Value::Null,
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Integers print bare; fractions get four decimals, widened below `1e-4`
/// so the leading significant digits survive.
fn format_number(value: f64) -> String {
    let magnitude = value.abs();
    if value.fract() == 0.0 && magnitude < 1e15 {
        return format!("{}", value as i64);
    }
    if magnitude < 1e-10 {
        return format!("{value:.2e}");
    }

    let decimals = if magnitude < 1e-4 {
        (-magnitude.log10()).floor() as usize + 3
    } else {
        4
    };
    format!("{value:.decimals$}")
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// One normalized upstream item: resolved canonical fields plus the raw
/// object it was built from. The raw object is never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    fields: IndexMap<CanonicalKey, MetricValue>,
    raw: Value,
}

impl CanonicalRecord {
    /// Resolve every key of `keys` against `raw`. Non-object items still
    /// produce a record, with every field `Missing`.
    pub fn build(keys: &[CanonicalKey], raw: Value) -> Self {
        let fields = match raw.as_object() {
            Some(object) => keys
                .iter()
                .filter_map(|key| {
                    let value = resolve(*key, object);
                    value.is_present().then_some((*key, value))
                })
                .collect(),
            None => IndexMap::new(),
        };

        Self { fields, raw }
    }

    pub fn get(&self, key: CanonicalKey) -> &MetricValue {
        static MISSING: MetricValue = MetricValue::Missing;
        self.fields.get(&key).unwrap_or(&MISSING)
    }

    pub fn number(&self, key: CanonicalKey) -> Option<f64> {
        self.get(key).as_f64()
    }

    pub fn display(&self, key: CanonicalKey) -> String {
        self.get(key).display()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&CanonicalKey, &MetricValue)> {
        self.fields.iter()
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}
