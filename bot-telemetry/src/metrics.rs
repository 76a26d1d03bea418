//! Derived metrics over equity time series.
//!
//! Everything here is a pure function of the series passed in. Nothing is
//! carried between calls: the series may be replaced wholesale on a scope
//! change, and stale drawdown boundaries would misrepresent the new one.

use crate::reconcile::{RATIO_ALIASES, resolve_named};
use crate::record::{CanonicalKey, CanonicalRecord, MetricValue};
use serde::Serialize;
use serde_json::Value;

/// Drawdown percentage at or below which a point counts as in drawdown.
pub const DRAWDOWN_THRESHOLD_PCT: f64 = -1.0;

/// One accepted equity observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub label: String,
    pub equity: f64,
    pub realized: Option<f64>,
    pub unrealized: Option<f64>,
    pub drawdown_pct: Option<f64>,
    pub rolling_return: Option<f64>,
    pub rolling_volatility: Option<f64>,
}

impl EquityPoint {
    /// Convert a canonical equity record, rejecting non-numeric or
    /// non-positive equity.
    pub fn from_record(index: usize, record: &CanonicalRecord) -> Option<Self> {
        let equity = record
            .number(CanonicalKey::EquityValue)
            .filter(|equity| *equity > 0.0)?;

        let label = match record.get(CanonicalKey::Timestamp) {
            MetricValue::Missing => format!("#{index}"),
            value => value.display(),
        };

        Some(Self {
            label,
            equity,
            realized: record.number(CanonicalKey::Realized),
            unrealized: record.number(CanonicalKey::Unrealized),
            drawdown_pct: record.number(CanonicalKey::DrawdownPct),
            rolling_return: record.number(CanonicalKey::RollingReturn),
            rolling_volatility: record.number(CanonicalKey::RollingVolatility),
        })
    }

    fn in_drawdown(&self) -> bool {
        self.drawdown_pct
            .is_some_and(|pct| pct <= DRAWDOWN_THRESHOLD_PCT)
    }
}

/// Equity points in upstream arrival order (never re-sorted).
pub type EquitySeries = Vec<EquityPoint>;

/// Contiguous run of points in drawdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawdownPeriod {
    pub start_index: usize,
    pub end_index: usize,
    pub start_label: String,
    pub end_label: String,
    /// Deepest drawdown percentage inside the period.
    pub trough_pct: f64,
    /// Still in drawdown at the last point of the series.
    pub open: bool,
}

impl DrawdownPeriod {
    /// Number of points inside the period.
    pub fn points(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

/// Analytics summary for one equity series.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DerivedMetrics {
    pub latest_equity: Option<f64>,
    pub first_equity: Option<f64>,
    pub total_return: f64,
    /// Percent of first equity; 0 when the first equity is 0.
    pub total_return_pct: f64,
    pub realized: Option<f64>,
    pub unrealized: Option<f64>,
    /// `realized + unrealized` of the latest point; missing sides count as 0
    /// only when at least one side is present.
    pub total_pnl: Option<f64>,
    pub rolling_return: Option<f64>,
    pub rolling_volatility: Option<f64>,
    pub max_drawdown_pct: Option<f64>,
    pub drawdown_periods: Vec<DrawdownPeriod>,
}

impl DerivedMetrics {
    pub fn compute(series: &[EquityPoint]) -> Self {
        let (Some(first), Some(latest)) = (series.first(), series.last()) else {
            return Self::default();
        };

        let total_return = latest.equity - first.equity;
        let total_return_pct = if first.equity == 0.0 {
            0.0
        } else {
            total_return / first.equity * 100.0
        };

        let total_pnl = match (latest.realized, latest.unrealized) {
            (None, None) => None,
            (realized, unrealized) => Some(realized.unwrap_or(0.0) + unrealized.unwrap_or(0.0)),
        };

        let max_drawdown_pct = series
            .iter()
            .filter_map(|point| point.drawdown_pct)
            .fold(None, |deepest: Option<f64>, pct| {
                Some(deepest.map_or(pct, |d| d.min(pct)))
            });

        Self {
            latest_equity: Some(latest.equity),
            first_equity: Some(first.equity),
            total_return,
            total_return_pct,
            realized: latest.realized,
            unrealized: latest.unrealized,
            total_pnl,
            rolling_return: latest_present(series, |point| point.rolling_return),
            rolling_volatility: latest_present(series, |point| point.rolling_volatility),
            max_drawdown_pct,
            drawdown_periods: detect_drawdown_periods(series),
        }
    }
}

/// Single linear scan for contiguous drawdown runs.
pub fn detect_drawdown_periods(series: &[EquityPoint]) -> Vec<DrawdownPeriod> {
    let mut periods = Vec::new();
    let mut pending_start: Option<usize> = None;

    for (index, point) in series.iter().enumerate() {
        match (pending_start, point.in_drawdown()) {
            (None, true) => pending_start = Some(index),
            (Some(start), false) => {
                periods.push(close_period(series, start, index - 1, false));
                pending_start = None;
            }
            _ => {}
        }
    }

    if let Some(start) = pending_start {
        periods.push(close_period(series, start, series.len() - 1, true));
    }

    periods
}

fn close_period(series: &[EquityPoint], start: usize, end: usize, open: bool) -> DrawdownPeriod {
    let trough_pct = series[start..=end]
        .iter()
        .filter_map(|point| point.drawdown_pct)
        .fold(0.0_f64, f64::min);

    DrawdownPeriod {
        start_index: start,
        end_index: end,
        start_label: series[start].label.clone(),
        end_label: series[end].label.clone(),
        trough_pct,
        open,
    }
}

fn latest_present(series: &[EquityPoint], field: impl Fn(&EquityPoint) -> Option<f64>) -> Option<f64> {
    series.iter().rev().find_map(field)
}

/// Aggregate ratios computed upstream, passed through unmodified.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct UpstreamRatios {
    pub sharpe: MetricValue,
    pub win_rate: MetricValue,
    pub max_drawdown: MetricValue,
    pub volatility: MetricValue,
    pub correlation: MetricValue,
    /// The `metrics` object exactly as received.
    pub raw: Option<Value>,
}

impl UpstreamRatios {
    pub fn from_metrics(metrics: Option<&Value>) -> Self {
        let Some(object) = metrics.and_then(Value::as_object) else {
            return Self {
                raw: metrics.cloned(),
                ..Self::default()
            };
        };

        let ratio = |name: &str| -> MetricValue {
            let aliases = RATIO_ALIASES
                .iter()
                .find(|(candidate, _)| *candidate == name)
                .map(|(_, aliases)| *aliases)
                .unwrap_or(&[]);
            resolve_named(object, name, aliases)
        };

        Self {
            sharpe: ratio("sharpe"),
            win_rate: ratio("win_rate"),
            max_drawdown: ratio("max_drawdown"),
            volatility: ratio("volatility"),
            correlation: ratio("correlation"),
            raw: Some(Value::Object(object.clone())),
        }
    }
}

/// Published equity snapshot: validated series, upstream ratios, and the
/// derived summary recomputed from the series on construction.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EquityView {
    pub records: Vec<CanonicalRecord>,
    pub series: EquitySeries,
    pub upstream: UpstreamRatios,
    pub derived: DerivedMetrics,
}

impl EquityView {
    /// Drop invalid equity rows (record and point together) and compute the
    /// derived summary.
    pub fn new(records: Vec<CanonicalRecord>, upstream: UpstreamRatios) -> Self {
        let (records, series): (Vec<_>, Vec<_>) = records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| {
                EquityPoint::from_record(index, &record).map(|point| (record, point))
            })
            .unzip();

        let derived = DerivedMetrics::compute(&series);

        Self {
            records,
            series,
            upstream,
            derived,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
