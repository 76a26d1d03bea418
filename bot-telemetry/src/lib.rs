//! Bot Telemetry - client-side aggregation core for trading bot consoles.
//!
//! Pulls per-bot data from independent, unreliable, schema-drifting HTTP
//! endpoints and turns it into a stable view model:
//! - Field reconciliation of drifting upstream keys into canonical records
//! - Source adapters per data kind (status, signals, executions, health, equity, logs)
//! - Poll scheduler with one independent timer per source
//! - View model store keyed by (kind, scope) with stale-response discard
//! - Bot registry normalization to the fixed set of four identities
//! - Derived equity metrics and drawdown period detection
//! - CSV / JSON export of raw records
pub mod config;
pub mod error;
pub mod export;
pub mod metrics;
pub mod reconcile;
pub mod record;
pub mod registry;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{ConsoleConfig, PollIntervals};
pub use error::{ConfigError, ExportError, FetchError};
pub use export::{ExportFile, ExportFormat, export};
pub use metrics::{DerivedMetrics, DrawdownPeriod, EquityPoint, EquityView, UpstreamRatios};
pub use record::{CanonicalKey, CanonicalRecord, MISSING_PLACEHOLDER, MetricValue};
pub use registry::{BotRegistry, StatusView};
pub use scheduler::{PollScheduler, PollState};
pub use source::{
    FetchResult, HttpFetch, Outcome, Payload, ReqwestFetcher, SourceAdapter, SourceSpec,
};
pub use store::{ApplyOutcome, Slot, SlotStatus, SourceId, ViewStore};
pub use types::{BotIdentity, BotSnapshot, BotStatus, DataKind, NavTab, Scope, ScopeKey};
