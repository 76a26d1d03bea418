//! Console state: selected tab, bot, log selectors and export focus, plus the
//! pollers that feed them.
//!
//! One source is registered per [`DataKind`], keyed by the kind's name.
//! Bot-scoped sources follow the last selected bot tab; switching to Summary
//! or Logs leaves them on that bot so returning is instant.

use bot_telemetry::{
    BotIdentity, ConsoleConfig, DataKind, ExportError, ExportFormat, HttpFetch, NavTab,
    PollScheduler, PollState, Scope, ScopeKey, Slot, SourceAdapter, SourceSpec, ViewStore, export,
};
use chrono::{DateTime, Utc};
use crossterm::event::KeyCode;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Panels of a bot tab, in focus order.
pub const BOT_PANELS: [DataKind; 4] = [
    DataKind::Equity,
    DataKind::Signals,
    DataKind::Executions,
    DataKind::Health,
];

pub struct App<F> {
    config: ConsoleConfig,
    scheduler: PollScheduler<F>,
    tab: NavTab,
    bot: BotIdentity,
    focus: DataKind,
    log_type: Option<String>,
    log_date: Option<String>,
    notice: Option<String>,
    should_quit: bool,
}

impl<F> App<F>
where
    F: HttpFetch + 'static,
{
    pub fn new(config: ConsoleConfig, fetcher: F) -> Self {
        let adapter = Arc::new(SourceAdapter::new(fetcher, config.api_url.clone()));
        let scheduler = PollScheduler::new(adapter, Arc::new(ViewStore::new()));

        Self {
            config,
            scheduler,
            tab: NavTab::Summary,
            bot: BotIdentity::FiveMinute,
            focus: DataKind::Equity,
            log_type: None,
            log_date: None,
            notice: None,
            should_quit: false,
        }
    }

    /// Register the always-on sources. Log sources follow once a log type is
    /// known (see [`App::sync`]).
    pub fn start(&mut self) {
        info!(api = %self.config.api_url, bot = %self.bot, "starting pollers");

        self.register(DataKind::Status, Scope::global());
        for kind in BOT_PANELS {
            self.register(kind, Scope::bot(self.bot));
        }
        self.register(DataKind::LogTypes, self.versioned(Scope::global()));
    }

    pub fn shutdown(&mut self) {
        info!("stopping pollers");
        self.scheduler.shutdown();
    }

    pub fn store(&self) -> &Arc<ViewStore> {
        self.scheduler.store()
    }

    pub fn tab(&self) -> NavTab {
        self.tab
    }

    pub fn bot(&self) -> BotIdentity {
        self.bot
    }

    pub fn focus(&self) -> DataKind {
        self.focus
    }

    pub fn log_type(&self) -> Option<&str> {
        self.log_type.as_deref()
    }

    pub fn log_date(&self) -> Option<&str> {
        self.log_date.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn poll_state(&self, kind: DataKind) -> Option<PollState> {
        self.scheduler.poll_state(&kind.to_string())
    }

    /// Scope the console currently shows for `kind`. Log kinds have none
    /// until a log type is selected.
    pub fn scope_for(&self, kind: DataKind) -> Option<Scope> {
        match kind {
            DataKind::Status => Some(Scope::global()),
            DataKind::Signals | DataKind::Executions | DataKind::Health | DataKind::Equity => {
                Some(Scope::bot(self.bot))
            }
            DataKind::LogTypes => Some(self.versioned(Scope::global())),
            DataKind::LogDates => self
                .log_type
                .as_ref()
                .map(|log_type| self.versioned(Scope::log(log_type.clone()))),
            DataKind::Logs => self.log_type.as_ref().map(|log_type| {
                let scope = Scope::log(log_type.clone());
                let scope = match &self.log_date {
                    Some(date) => scope.with_date(date.clone()),
                    None => scope,
                };
                self.versioned(scope)
            }),
        }
    }

    /// Snapshot shown for `kind` under the current selection.
    pub fn slot(&self, kind: DataKind) -> Slot {
        let scope = self.scope_for(kind).unwrap_or_default();
        self.store().get(&ScopeKey::new(kind, scope))
    }

    /// Reconcile selections with freshly fetched catalogs. Called once per UI
    /// loop iteration.
    pub fn sync(&mut self) {
        let types = self.catalog(DataKind::LogTypes);
        let keep = match &self.log_type {
            Some(current) => types.is_empty() || types.contains(current),
            None => types.is_empty(),
        };

        if !keep {
            if let Some(first) = types.into_iter().next() {
                self.set_log_type(first);
            }
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Right => self.step_tab(1),
            KeyCode::Left => self.step_tab(NavTab::ALL.len() - 1),
            KeyCode::Char(digit @ '1'..='6') => {
                let index = (digit as u8 - b'1') as usize;
                self.select_tab(NavTab::ALL[index]);
            }
            KeyCode::Tab => self.cycle_focus(),
            KeyCode::Char('t') => self.cycle_log_type(),
            KeyCode::Char('d') => self.cycle_log_date(),
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('e') => self.export_and_report(ExportFormat::Csv),
            KeyCode::Char('j') => self.export_and_report(ExportFormat::Json),
            _ => {}
        }
    }

    pub fn select_tab(&mut self, tab: NavTab) {
        if tab == self.tab {
            return;
        }
        debug!(%tab, "tab selected");
        self.tab = tab;
        self.notice = None;

        if let Some(bot) = tab.bot() {
            if bot != self.bot {
                self.bot = bot;
                for kind in BOT_PANELS {
                    self.scheduler.rescope(&kind.to_string(), Scope::bot(bot));
                }
            }
        }
    }

    fn step_tab(&mut self, step: usize) {
        let current = NavTab::ALL
            .iter()
            .position(|tab| *tab == self.tab)
            .unwrap_or(0);
        self.select_tab(NavTab::ALL[(current + step) % NavTab::ALL.len()]);
    }

    pub fn cycle_focus(&mut self) {
        let current = BOT_PANELS
            .iter()
            .position(|kind| *kind == self.focus)
            .unwrap_or(0);
        self.focus = BOT_PANELS[(current + 1) % BOT_PANELS.len()];
    }

    pub fn cycle_log_type(&mut self) {
        let types = self.catalog(DataKind::LogTypes);
        match cycle(&types, self.log_type.as_deref()) {
            Some(next) => self.set_log_type(next),
            None => self.notice = Some("no log types available".to_string()),
        }
    }

    /// Latest, then each listed date in catalog order, then back to latest.
    pub fn cycle_log_date(&mut self) {
        if self.log_type.is_none() {
            self.notice = Some("select a log type first".to_string());
            return;
        }

        let dates = self.catalog(DataKind::LogDates);
        self.log_date = match self.log_date.as_deref() {
            None => dates.first().cloned(),
            Some(current) => dates
                .iter()
                .position(|date| date == current)
                .and_then(|index| dates.get(index + 1))
                .cloned(),
        };
        self.apply_log_scopes();
    }

    /// Fetch every source behind the current tab now.
    pub fn refresh(&mut self) {
        let kinds: &[DataKind] = match self.tab {
            NavTab::Summary => &[DataKind::Status],
            NavTab::Bot(_) => &BOT_PANELS,
            NavTab::Logs => &[DataKind::LogTypes, DataKind::LogDates, DataKind::Logs],
        };
        for kind in kinds {
            self.scheduler.refresh(&kind.to_string());
        }
    }

    /// Export the raw records behind the focused panel into the export dir.
    pub fn export_focused(&mut self, format: ExportFormat) -> Result<Option<PathBuf>, ExportError> {
        let kind = match self.tab {
            NavTab::Bot(_) => self.focus,
            NavTab::Logs => DataKind::Logs,
            NavTab::Summary => {
                self.notice = Some("nothing to export on Summary".to_string());
                return Ok(None);
            }
        };

        let slot = self.slot(kind);
        let records = slot.payload.records();
        if records.is_empty() {
            self.notice = Some(format!("no {kind} records to export"));
            return Ok(None);
        }

        let file = export(records, &self.export_stem(kind, Utc::now()), format)?;
        let path = file.write_to(&self.config.export_dir)?;

        self.notice = Some(format!(
            "exported {} {kind} records to {}",
            records.len(),
            path.display()
        ));
        Ok(Some(path))
    }

    fn export_and_report(&mut self, format: ExportFormat) {
        if let Err(error) = self.export_focused(format) {
            warn!(%error, %format, "export failed");
            self.notice = Some(format!("export failed: {error}"));
        }
    }

    fn export_stem(&self, kind: DataKind, now: DateTime<Utc>) -> String {
        let stamp = now.format("%Y%m%d_%H%M%S");
        match kind {
            DataKind::Logs => format!(
                "logs_{}_{}_{stamp}",
                self.log_type.as_deref().unwrap_or("all"),
                self.log_date.as_deref().unwrap_or("latest")
            ),
            _ => format!("{}_{kind}_{stamp}", self.bot),
        }
    }

    fn set_log_type(&mut self, log_type: String) {
        info!(%log_type, "log type selected");
        self.log_type = Some(log_type);
        self.log_date = None;
        self.apply_log_scopes();
    }

    fn apply_log_scopes(&mut self) {
        for kind in [DataKind::LogDates, DataKind::Logs] {
            let Some(scope) = self.scope_for(kind) else {
                continue;
            };
            let id = kind.to_string();
            if self.scheduler.spec(&id).is_some() {
                self.scheduler.rescope(&id, scope);
            } else {
                self.register(kind, scope);
            }
        }
    }

    fn register(&mut self, kind: DataKind, scope: Scope) {
        let spec = SourceSpec::new(kind, scope, self.config.record_limit);
        let every = self.config.intervals.for_kind(kind);
        if let Err(error) = self.scheduler.register(kind.to_string(), spec, every) {
            warn!(%kind, %error, "source not started");
            self.notice = Some(error.to_string());
        }
    }

    fn versioned(&self, scope: Scope) -> Scope {
        match &self.config.bot_version {
            Some(version) => scope.with_bot_version(version.clone()),
            None => scope,
        }
    }

    fn catalog(&self, kind: DataKind) -> Vec<String> {
        self.slot(kind).payload.as_catalog().to_vec()
    }
}

/// Entry after `current`, wrapping; the first entry when `current` is unset
/// or no longer listed.
fn cycle(items: &[String], current: Option<&str>) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let next = current
        .and_then(|current| items.iter().position(|item| item == current))
        .map_or(0, |index| (index + 1) % items.len());
    Some(items[next].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bot_telemetry::{FetchError, SlotStatus};
    use chrono::TimeZone;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use url::Url;

    #[derive(Debug, Default)]
    struct StaticFetcher {
        routes: HashMap<String, Value>,
        requests: Mutex<Vec<Url>>,
    }

    impl StaticFetcher {
        fn route(mut self, path: &str, body: Value) -> Self {
            self.routes.insert(path.to_string(), body);
            self
        }
    }

    #[async_trait]
    impl HttpFetch for StaticFetcher {
        async fn get_json(&self, url: &Url) -> Result<Value, FetchError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(url.clone());
            }
            self.routes
                .get(url.path())
                .cloned()
                .ok_or(FetchError::Status { status: 404 })
        }
    }

    fn fetcher() -> Arc<StaticFetcher> {
        Arc::new(
            StaticFetcher::default()
                .route(
                    "/dashboard/summary",
                    json!({"bots": {"5m": {"equity": 1000.0, "status": "running"}}}),
                )
                .route(
                    "/bots/5m/equity",
                    json!({"data": [{"timestamp": "t0", "equity": 1000.0}]}),
                )
                .route(
                    "/bots/1h/equity",
                    json!({"data": [{"timestamp": "t0", "equity": 2000.0}, {"timestamp": "t1", "equity": 2100.0}]}),
                )
                .route("/bots/1h/signals", json!({"data": []}))
                .route("/logs/types", json!({"types": ["trades", "errors"]}))
                .route("/logs/trades/dates", json!({"dates": ["2026-10-17", "2026-10-16"]}))
                .route(
                    "/logs/trades",
                    json!({"logs": [{"time": "10:00", "level": "INFO", "msg": "filled"}]}),
                ),
        )
    }

    fn config(export_dir: &std::path::Path) -> ConsoleConfig {
        ConsoleConfig::new("http://bots.local/")
            .unwrap()
            .with_export_dir(export_dir)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    async fn started(fetcher: Arc<StaticFetcher>, export_dir: &std::path::Path) -> App<Arc<StaticFetcher>> {
        let mut app = App::new(config(export_dir), fetcher);
        app.start();
        settle().await;
        app.sync();
        settle().await;
        app
    }

    #[test]
    fn test_cycle() {
        struct TestCase {
            items: Vec<String>,
            current: Option<&'static str>,
            expected: Option<&'static str>,
        }

        let items = || vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let tests = vec![
            TestCase {
                // TC0: unset starts at the first entry
                items: items(),
                current: None,
                expected: Some("a"),
            },
            TestCase {
                // TC1: advances
                items: items(),
                current: Some("a"),
                expected: Some("b"),
            },
            TestCase {
                // TC2: wraps
                items: items(),
                current: Some("c"),
                expected: Some("a"),
            },
            TestCase {
                // TC3: unknown current restarts
                items: items(),
                current: Some("z"),
                expected: Some("a"),
            },
            TestCase {
                // TC4: empty catalog
                items: vec![],
                current: Some("a"),
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = cycle(&test.items, test.current);
            assert_eq!(actual.as_deref(), test.expected, "TC{} failed", index);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tab_switch_rescopes_bot_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = started(fetcher(), dir.path()).await;

        assert_eq!(app.slot(DataKind::Equity).payload.len(), 1);

        app.handle_key(KeyCode::Char('3'));
        assert_eq!(app.tab(), NavTab::Bot(BotIdentity::OneHour));
        settle().await;

        let equity = app.slot(DataKind::Equity);
        assert_eq!(equity.status, SlotStatus::Ready);
        assert_eq!(equity.payload.as_equity().unwrap().derived.latest_equity, Some(2100.0));
        assert_eq!(app.slot(DataKind::Signals).status, SlotStatus::Empty);

        // previous bot stays cached
        let cached = app.store().get(&ScopeKey::new(
            DataKind::Equity,
            Scope::bot(BotIdentity::FiveMinute),
        ));
        assert_eq!(cached.payload.len(), 1);

        // Summary keeps the bot sources on 1h
        app.handle_key(KeyCode::Char('1'));
        assert_eq!(app.bot(), BotIdentity::OneHour);
        assert_eq!(
            app.poll_state(DataKind::Equity).unwrap().spec.scope,
            Scope::bot(BotIdentity::OneHour)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_arrow_keys_wrap() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::new(config(dir.path()), fetcher());

        app.handle_key(KeyCode::Left);
        assert_eq!(app.tab(), NavTab::Logs);
        app.handle_key(KeyCode::Right);
        assert_eq!(app.tab(), NavTab::Summary);
        app.handle_key(KeyCode::Right);
        assert_eq!(app.tab(), NavTab::Bot(BotIdentity::FiveMinute));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_source_not_started() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.intervals.health = Duration::ZERO;

        let mut app = App::new(config, fetcher());
        app.start();
        settle().await;

        assert!(app.poll_state(DataKind::Health).is_none());
        assert_eq!(
            app.notice(),
            Some("poll interval for health must be greater than zero")
        );
        assert_eq!(app.slot(DataKind::Equity).status, SlotStatus::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_type_and_date_selection() {
        let fetcher = fetcher();
        let dir = tempfile::tempdir().unwrap();
        let mut app = started(Arc::clone(&fetcher), dir.path()).await;

        assert_eq!(app.log_type(), Some("trades"));
        assert_eq!(app.log_date(), None);
        assert_eq!(app.slot(DataKind::Logs).payload.len(), 1);
        assert_eq!(
            app.slot(DataKind::LogDates).payload.as_catalog(),
            &["2026-10-17".to_string(), "2026-10-16".to_string()]
        );

        app.handle_key(KeyCode::Char('d'));
        assert_eq!(app.log_date(), Some("2026-10-17"));
        settle().await;
        let last = fetcher.requests.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.path(), "/logs/trades");
        assert_eq!(last.query(), Some("date=2026-10-17&limit=100"));

        app.handle_key(KeyCode::Char('d'));
        assert_eq!(app.log_date(), Some("2026-10-16"));
        app.handle_key(KeyCode::Char('d'));
        assert_eq!(app.log_date(), None);

        app.handle_key(KeyCode::Char('t'));
        assert_eq!(app.log_type(), Some("errors"));
        settle().await;
        // unknown route: stale with nothing cached
        assert_eq!(app.slot(DataKind::Logs).status, SlotStatus::Stale);

        app.handle_key(KeyCode::Char('t'));
        assert_eq!(app.log_type(), Some("trades"));
        assert_eq!(app.slot(DataKind::Logs).payload.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_focused_panel() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = started(fetcher(), dir.path()).await;

        app.handle_key(KeyCode::Char('e'));
        assert_eq!(app.notice(), Some("nothing to export on Summary"));

        app.handle_key(KeyCode::Char('2'));
        let path = app.export_focused(ExportFormat::Json).unwrap().unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("5m_equity_"));
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!([{"timestamp": "t0", "equity": 1000.0}]));

        app.cycle_focus();
        assert_eq!(app.focus(), DataKind::Signals);
        assert_eq!(app.export_focused(ExportFormat::Csv).unwrap(), None);
        assert_eq!(app.notice(), Some("no signals records to export"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_stem() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = started(fetcher(), dir.path()).await;
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 5).unwrap();

        assert_eq!(app.export_stem(DataKind::Executions, now), "5m_executions_20261018_093005");
        app.handle_key(KeyCode::Char('d'));
        assert_eq!(
            app.export_stem(DataKind::Logs, now),
            "logs_trades_2026-10-17_20261018_093005"
        );
    }

    #[test]
    fn test_quit_keys() {
        struct TestCase {
            key: KeyCode,
            expected: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: q
                key: KeyCode::Char('q'),
                expected: true,
            },
            TestCase {
                // TC1: Esc
                key: KeyCode::Esc,
                expected: true,
            },
            TestCase {
                // TC2: unrelated key
                key: KeyCode::Char('x'),
                expected: false,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let dir = tempfile::tempdir().unwrap();
            let mut app = App::new(config(dir.path()), fetcher());
            app.handle_key(test.key);
            assert_eq!(app.should_quit(), test.expected, "TC{} failed", index);
        }
    }
}
