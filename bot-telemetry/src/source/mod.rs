//! Source adapters: fetch one upstream endpoint and normalize its payload.
//!
//! An adapter never returns `Err` and never panics. Every failure is folded
//! into [`Outcome::Error`] with an empty payload so the caller can keep the
//! previous snapshot on screen.

pub mod http;

use crate::error::FetchError;
use crate::metrics::{EquityView, UpstreamRatios};
use crate::record::{CanonicalKey, CanonicalRecord, MetricValue};
use crate::reconcile::resolve_named;
use crate::registry::{StatusView, normalize_status};
use crate::types::{DataKind, Scope, ScopeKey};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

pub use http::{HttpFetch, ReqwestFetcher};

const SIGNAL_KEYS: &[CanonicalKey] = &[
    CanonicalKey::Timestamp,
    CanonicalKey::SignalDirection,
    CanonicalKey::Score,
    CanonicalKey::Confidence,
    CanonicalKey::Price,
];

const EXECUTION_KEYS: &[CanonicalKey] = &[
    CanonicalKey::Timestamp,
    CanonicalKey::Side,
    CanonicalKey::Size,
    CanonicalKey::Price,
    CanonicalKey::Notional,
    CanonicalKey::Pnl,
];

const HEALTH_KEYS: &[CanonicalKey] = &[
    CanonicalKey::Timestamp,
    CanonicalKey::Status,
    CanonicalKey::LatencyMs,
    CanonicalKey::Message,
];

const EQUITY_KEYS: &[CanonicalKey] = &[
    CanonicalKey::Timestamp,
    CanonicalKey::EquityValue,
    CanonicalKey::Realized,
    CanonicalKey::Unrealized,
    CanonicalKey::DrawdownPct,
    CanonicalKey::RollingReturn,
    CanonicalKey::RollingVolatility,
];

const LOG_KEYS: &[CanonicalKey] = &[
    CanonicalKey::Timestamp,
    CanonicalKey::Level,
    CanonicalKey::Message,
];

/// Envelope keys that may carry the item array, in precedence order.
const ITEM_KEYS: &[&str] = &["data", "items", "records", "logs", "rows"];

/// Canonical key set resolved for each record of `kind`.
pub fn canonical_keys(kind: DataKind) -> &'static [CanonicalKey] {
    match kind {
        DataKind::Signals => SIGNAL_KEYS,
        DataKind::Executions => EXECUTION_KEYS,
        DataKind::Health => HEALTH_KEYS,
        DataKind::Equity => EQUITY_KEYS,
        DataKind::Logs => LOG_KEYS,
        DataKind::Status | DataKind::LogTypes | DataKind::LogDates => &[],
    }
}

/// What a source fetches: kind, scope and result-count limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceSpec {
    pub kind: DataKind,
    pub scope: Scope,
    pub limit: usize,
}

impl SourceSpec {
    pub fn new(kind: DataKind, scope: Scope, limit: usize) -> Self {
        Self { kind, scope, limit }
    }

    /// Store address this spec's results are applied to.
    pub fn key(&self) -> ScopeKey {
        ScopeKey::new(self.kind, self.scope.clone())
    }

    pub fn with_scope(&self, scope: Scope) -> Self {
        Self {
            scope,
            ..self.clone()
        }
    }
}

/// Normalized snapshot content, one variant per payload shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Status(StatusView),
    Records(Vec<CanonicalRecord>),
    Equity(EquityView),
    Catalog(Vec<String>),
}

impl Payload {
    /// Safe default for a kind: never undefined, always renderable.
    pub fn empty(kind: DataKind) -> Self {
        match kind {
            DataKind::Status => Payload::Status(StatusView::default()),
            DataKind::Equity => Payload::Equity(EquityView::default()),
            DataKind::LogTypes | DataKind::LogDates => Payload::Catalog(Vec::new()),
            DataKind::Signals | DataKind::Executions | DataKind::Health | DataKind::Logs => {
                Payload::Records(Vec::new())
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Status(view) => view.registry.reported(),
            Payload::Records(records) => records.len(),
            Payload::Equity(view) => view.series.len(),
            Payload::Catalog(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical records carried by this payload, for tables and export.
    pub fn records(&self) -> &[CanonicalRecord] {
        match self {
            Payload::Records(records) => records,
            Payload::Equity(view) => &view.records,
            Payload::Status(_) | Payload::Catalog(_) => &[],
        }
    }

    pub fn as_status(&self) -> Option<&StatusView> {
        match self {
            Payload::Status(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_equity(&self) -> Option<&EquityView> {
        match self {
            Payload::Equity(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_catalog(&self) -> &[String] {
        match self {
            Payload::Catalog(entries) => entries,
            _ => &[],
        }
    }
}

/// Fetch outcome as seen by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success,
    /// Upstream answered with zero records: "no data yet", not broken.
    Empty,
    Error(FetchError),
}

/// Result of one adapter fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub outcome: Outcome,
    pub payload: Payload,
}

impl FetchResult {
    pub fn error(kind: DataKind, error: FetchError) -> Self {
        Self {
            outcome: Outcome::Error(error),
            payload: Payload::empty(kind),
        }
    }

    fn from_payload(payload: Payload) -> Self {
        let outcome = if payload.is_empty() {
            Outcome::Empty
        } else {
            Outcome::Success
        };
        Self { outcome, payload }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }
}

/// Fetches and normalizes every data kind against one API base URL.
#[derive(Debug)]
pub struct SourceAdapter<F> {
    fetcher: F,
    base_url: Url,
}

impl<F> SourceAdapter<F>
where
    F: HttpFetch,
{
    pub fn new(fetcher: F, base_url: Url) -> Self {
        Self { fetcher, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the request URL for `spec`.
    pub fn request_url(&self, spec: &SourceSpec) -> Result<Url, FetchError> {
        let scope = &spec.scope;
        let limit = spec.limit.to_string();

        let (segments, query): (Vec<&str>, Vec<(&str, &str)>) = match spec.kind {
            DataKind::Status => (vec!["dashboard", "summary"], vec![]),
            kind @ (DataKind::Signals
            | DataKind::Executions
            | DataKind::Health
            | DataKind::Equity) => {
                let bot = scope.bot.ok_or_else(|| {
                    FetchError::InvalidUrl(format!("{kind} source requires a bot identity"))
                })?;
                let endpoint = match kind {
                    DataKind::Signals => "signals",
                    DataKind::Executions => "executions",
                    DataKind::Health => "health",
                    _ => "equity",
                };
                (vec!["bots", bot.as_str(), endpoint], vec![("limit", limit.as_str())])
            }
            DataKind::LogTypes => (vec!["logs", "types"], vec![]),
            DataKind::LogDates => (vec!["logs", require_log_type(scope)?, "dates"], vec![]),
            DataKind::Logs => {
                let mut query = Vec::new();
                if let Some(date) = scope.date.as_deref() {
                    query.push(("date", date));
                }
                query.push(("limit", limit.as_str()));
                (vec!["logs", require_log_type(scope)?], query)
            }
        };

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);

        let version = matches!(
            spec.kind,
            DataKind::Logs | DataKind::LogTypes | DataKind::LogDates
        )
        .then_some(scope.bot_version.as_deref())
        .flatten();

        if !query.is_empty() || version.is_some() {
            let mut pairs = url.query_pairs_mut();
            pairs.extend_pairs(query);
            if let Some(version) = version {
                pairs.append_pair("bot_version", version);
            }
        }

        Ok(url)
    }

    /// Fetch and normalize one source. Never fails; see [`Outcome`].
    pub async fn fetch(&self, spec: &SourceSpec) -> FetchResult {
        let url = match self.request_url(spec) {
            Ok(url) => url,
            Err(error) => {
                warn!(kind = %spec.kind, scope = %spec.scope, %error, "cannot build request");
                return FetchResult::error(spec.kind, error);
            }
        };

        match self.fetcher.get_json(&url).await {
            Ok(body) => {
                let result = normalize(spec.kind, body);
                match &result.outcome {
                    Outcome::Error(error) => {
                        warn!(kind = %spec.kind, scope = %spec.scope, %error, "malformed payload")
                    }
                    outcome => debug!(
                        kind = %spec.kind,
                        scope = %spec.scope,
                        ?outcome,
                        records = result.payload.len(),
                        "fetched"
                    ),
                }
                result
            }
            Err(error) => {
                warn!(kind = %spec.kind, scope = %spec.scope, %error, "fetch failed");
                FetchResult::error(spec.kind, error)
            }
        }
    }
}

fn require_log_type(scope: &Scope) -> Result<&str, FetchError> {
    scope
        .log_type
        .as_deref()
        .filter(|log_type| !log_type.is_empty())
        .ok_or_else(|| FetchError::InvalidUrl("log source requires a log type".to_string()))
}

/// Normalize a decoded response body for `kind`.
pub fn normalize(kind: DataKind, body: Value) -> FetchResult {
    match kind {
        DataKind::Status => {
            if !body.is_object() {
                return FetchResult::error(kind, decode_error("summary is not an object"));
            }
            FetchResult::from_payload(Payload::Status(normalize_status(&body)))
        }
        DataKind::Equity => {
            let upstream = UpstreamRatios::from_metrics(body.get("metrics"));
            match extract_items(body) {
                Some(items) => {
                    let records = build_records(kind, items);
                    FetchResult::from_payload(Payload::Equity(EquityView::new(records, upstream)))
                }
                None => FetchResult::error(kind, decode_error("no record array in payload")),
            }
        }
        DataKind::Signals | DataKind::Executions | DataKind::Health | DataKind::Logs => {
            match extract_items(body) {
                Some(items) => FetchResult::from_payload(Payload::Records(build_records(kind, items))),
                None => FetchResult::error(kind, decode_error("no record array in payload")),
            }
        }
        DataKind::LogTypes | DataKind::LogDates => {
            let catalog_key = if kind == DataKind::LogTypes { "types" } else { "dates" };
            let items = match body {
                Value::Object(mut object) => match object.remove(catalog_key) {
                    Some(Value::Array(items)) => Some(items),
                    _ => extract_items(Value::Object(object)),
                },
                other => extract_items(other),
            };
            match items {
                Some(items) => FetchResult::from_payload(Payload::Catalog(
                    items.iter().filter_map(catalog_entry).collect(),
                )),
                None => FetchResult::error(kind, decode_error("no catalog array in payload")),
            }
        }
    }
}

fn build_records(kind: DataKind, items: Vec<Value>) -> Vec<CanonicalRecord> {
    let keys = canonical_keys(kind);
    items
        .into_iter()
        .map(|item| CanonicalRecord::build(keys, item))
        .collect()
}

/// Pull the item array out of a response: a bare array, or the first
/// envelope key holding one. An envelope key holding `null` means no items.
fn extract_items(body: Value) -> Option<Vec<Value>> {
    match body {
        Value::Array(items) => Some(items),
        Value::Object(mut object) => ITEM_KEYS.iter().find_map(|key| match object.remove(*key) {
            Some(Value::Array(items)) => Some(items),
            Some(Value::Null) => Some(Vec::new()),
            _ => None,
        }),
        Value::Null => Some(Vec::new()),
        _ => None,
    }
}

/// Catalog entries are usually strings; objects are reduced to their name.
fn catalog_entry(item: &Value) -> Option<String> {
    match item {
        Value::String(name) => Some(name.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Object(object) => match resolve_named(object, "name", &["type", "date", "id", "value"]) {
            MetricValue::Missing => None,
            value => Some(value.display()),
        },
        _ => None,
    }
}

fn decode_error(reason: &str) -> FetchError {
    FetchError::Decode(reason.to_string())
}


#[cfg(test)]
mod tests {
    use super::fake::{FakeFetcher, FakeResponse};
    use super::*;
    use crate::types::BotIdentity;
    use serde_json::json;

    fn adapter(fetcher: FakeFetcher) -> SourceAdapter<FakeFetcher> {
        SourceAdapter::new(fetcher, Url::parse("http://bots.local/api/").unwrap())
    }

    #[test]
    fn test_request_url() {
        struct TestCase {
            spec: SourceSpec,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: summary
                spec: SourceSpec::new(DataKind::Status, Scope::global(), 50),
                expected: "http://bots.local/api/dashboard/summary",
            },
            TestCase {
                // TC1: bot scoped kind with limit
                spec: SourceSpec::new(DataKind::Executions, Scope::bot(BotIdentity::OneHour), 25),
                expected: "http://bots.local/api/bots/1h/executions?limit=25",
            },
            TestCase {
                // TC2: equity
                spec: SourceSpec::new(DataKind::Equity, Scope::bot(BotIdentity::TwentyFourHour), 500),
                expected: "http://bots.local/api/bots/24h/equity?limit=500",
            },
            TestCase {
                // TC3: log types with bot version
                spec: SourceSpec::new(
                    DataKind::LogTypes,
                    Scope::global().with_bot_version("v2"),
                    10,
                ),
                expected: "http://bots.local/api/logs/types?bot_version=v2",
            },
            TestCase {
                // TC4: log dates
                spec: SourceSpec::new(DataKind::LogDates, Scope::log("trades"), 10),
                expected: "http://bots.local/api/logs/trades/dates",
            },
            TestCase {
                // TC5: logs with date, limit and version
                spec: SourceSpec::new(
                    DataKind::Logs,
                    Scope::log("errors").with_date("2024-05-01").with_bot_version("v1"),
                    200,
                ),
                expected: "http://bots.local/api/logs/errors?date=2024-05-01&limit=200&bot_version=v1",
            },
            TestCase {
                // TC6: path segments are escaped
                spec: SourceSpec::new(DataKind::Logs, Scope::log("model output"), 5),
                expected: "http://bots.local/api/logs/model%20output?limit=5",
            },
        ];

        let adapter = adapter(FakeFetcher::new());
        for (index, test) in tests.into_iter().enumerate() {
            let actual = adapter.request_url(&test.spec).unwrap();
            assert_eq!(actual.as_str(), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_request_url_requires_scope() {
        let adapter = adapter(FakeFetcher::new());

        let no_bot = SourceSpec::new(DataKind::Signals, Scope::global(), 10);
        assert!(matches!(
            adapter.request_url(&no_bot),
            Err(FetchError::InvalidUrl(_))
        ));

        let no_type = SourceSpec::new(DataKind::Logs, Scope::global(), 10);
        assert!(matches!(
            adapter.request_url(&no_type),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_signals_preserves_order_and_zero() {
        let fetcher = FakeFetcher::new().route(
            "/api/bots/5m/signals",
            vec![FakeResponse::ok(json!({
                "data": [
                    {"timestamp": "t2", "signal": "long", "score": 0, "confidence": 0.7},
                    {"time": "t1", "Direction": "short", "signal_score": -0.4},
                    {"timestamp": "t3"}
                ],
                "count": 3,
                "version": "v2"
            }))],
        );
        let spec = SourceSpec::new(DataKind::Signals, Scope::bot(BotIdentity::FiveMinute), 3);

        let result = adapter(fetcher).fetch(&spec).await;
        assert_eq!(result.outcome, Outcome::Success);

        let records = result.payload.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].display(CanonicalKey::Timestamp), "t2");
        assert_eq!(records[0].get(CanonicalKey::Score), &MetricValue::Number(0.0));
        assert_eq!(records[1].display(CanonicalKey::SignalDirection), "short");
        assert_eq!(records[1].number(CanonicalKey::Score), Some(-0.4));
        assert!(records[2].get(CanonicalKey::Score).is_missing());
        assert_eq!(records[2].display(CanonicalKey::Score), "--");
    }

    #[tokio::test]
    async fn test_fetch_outcomes() {
        let fetcher = FakeFetcher::new()
            .route("/api/bots/1h/health", vec![FakeResponse::ok(json!({"data": [], "count": 0}))])
            .route("/api/bots/12h/health", vec![FakeResponse::status(500)])
            .route("/api/bots/24h/health", vec![FakeResponse::ok(json!("maintenance"))])
            .route("/api/bots/5m/health", vec![FakeResponse::ok(json!({"data": null}))]);
        let adapter = adapter(fetcher);

        let fetch = |identity| {
            let spec = SourceSpec::new(DataKind::Health, Scope::bot(identity), 10);
            let adapter = &adapter;
            async move { adapter.fetch(&spec).await }
        };

        assert_eq!(fetch(BotIdentity::OneHour).await.outcome, Outcome::Empty);
        assert_eq!(fetch(BotIdentity::FiveMinute).await.outcome, Outcome::Empty);
        assert_eq!(
            fetch(BotIdentity::TwelveHour).await.outcome,
            Outcome::Error(FetchError::Status { status: 500 })
        );

        let malformed = fetch(BotIdentity::TwentyFourHour).await;
        assert!(matches!(malformed.outcome, Outcome::Error(FetchError::Decode(_))));
        assert!(malformed.payload.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_without_bot_is_error_not_request() {
        let fetcher = std::sync::Arc::new(FakeFetcher::new());
        let adapter = SourceAdapter::new(
            std::sync::Arc::clone(&fetcher),
            Url::parse("http://bots.local/").unwrap(),
        );

        let result = adapter
            .fetch(&SourceSpec::new(DataKind::Equity, Scope::global(), 10))
            .await;
        assert!(result.is_error());
        assert_eq!(fetcher.calls(), 0);
    }

    #[test]
    fn test_normalize_equity() {
        let body = json!({
            "data": [
                {"timestamp": "09:00", "equity": 1000.0, "drawdown_pct": 0},
                {"timestamp": "10:00", "equity": "bad"},
                {"timestamp": "11:00", "equity": 980.0, "drawdown_pct": -2.0}
            ],
            "metrics": {"sharpe": 1.1, "win_rate": 0.55}
        });

        let result = normalize(DataKind::Equity, body);
        assert_eq!(result.outcome, Outcome::Success);

        let view = result.payload.as_equity().unwrap();
        assert_eq!(view.series.len(), 2);
        assert_eq!(view.records.len(), 2);
        assert_eq!(view.upstream.sharpe, MetricValue::Number(1.1));
        assert_eq!(view.derived.total_return, -20.0);
        assert_eq!(view.derived.drawdown_periods.len(), 1);
    }

    #[test]
    fn test_normalize_equity_all_invalid_is_empty() {
        let result = normalize(
            DataKind::Equity,
            json!({"data": [{"equity": 0}, {"equity": null}]}),
        );
        assert_eq!(result.outcome, Outcome::Empty);
    }

    #[test]
    fn test_normalize_status() {
        let partial = normalize(
            DataKind::Status,
            json!({"bots": {"5m": {"equity": 10.0, "signals_count": 1, "status": "running"}}}),
        );
        assert_eq!(partial.outcome, Outcome::Success);
        assert_eq!(partial.payload.as_status().unwrap().registry.iter().count(), 4);

        let empty = normalize(DataKind::Status, json!({"bots": {}}));
        assert_eq!(empty.outcome, Outcome::Empty);
        assert_eq!(empty.payload.as_status().unwrap().registry.iter().count(), 4);

        let malformed = normalize(DataKind::Status, json!([1, 2]));
        assert!(malformed.is_error());
    }

    #[test]
    fn test_normalize_catalog() {
        struct TestCase {
            kind: DataKind,
            body: Value,
            expected: Vec<&'static str>,
        }

        let tests = vec![
            TestCase {
                // TC0: bare array
                kind: DataKind::LogTypes,
                body: json!(["trades", "errors"]),
                expected: vec!["trades", "errors"],
            },
            TestCase {
                // TC1: named envelope
                kind: DataKind::LogTypes,
                body: json!({"types": ["signals"], "count": 1}),
                expected: vec!["signals"],
            },
            TestCase {
                // TC2: generic envelope with objects
                kind: DataKind::LogDates,
                body: json!({"data": [{"date": "2024-05-01"}, {"date": "2024-05-02"}, 7]}),
                expected: vec!["2024-05-01", "2024-05-02", "7"],
            },
            TestCase {
                // TC3: dates envelope
                kind: DataKind::LogDates,
                body: json!({"dates": []}),
                expected: vec![],
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let result = normalize(test.kind, test.body);
            assert_eq!(result.payload.as_catalog(), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_normalize_logs_bare_array() {
        let result = normalize(
            DataKind::Logs,
            json!([{"ts": "12:00:01", "severity": "WARN", "msg": "slow fill"}, "plain line"]),
        );

        let records = result.payload.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].display(CanonicalKey::Level), "WARN");
        assert_eq!(records[0].display(CanonicalKey::Message), "slow fill");
        assert!(records[1].get(CanonicalKey::Message).is_missing());
        assert_eq!(records[1].raw(), &json!("plain line"));
    }
}
