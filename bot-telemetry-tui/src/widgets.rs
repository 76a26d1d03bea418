//! Ratatui rendering for the console tabs.
//!
//! Widgets only read snapshots; every empty or failed state has an explicit
//! marker so the operator can tell "loading", "no data" and "stale" apart.

use crate::app::{App, BOT_PANELS};
use bot_telemetry::{
    BotStatus, CanonicalKey, DataKind, DerivedMetrics, EquityView, HttpFetch, MISSING_PLACEHOLDER,
    MetricValue, NavTab, Slot, SlotStatus, StatusView,
};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Tabs},
};

const C_UP: Color = Color::Rgb(100, 220, 100);
const C_DOWN: Color = Color::Rgb(220, 100, 100);
const C_WARN: Color = Color::Rgb(180, 180, 100);
const C_DIM: Color = Color::Rgb(120, 120, 120);
const C_BRIGHT: Color = Color::Rgb(220, 220, 220);
const C_ACCENT: Color = Color::Rgb(100, 180, 220);

const SIGNAL_COLUMNS: &[CanonicalKey] = &[
    CanonicalKey::Timestamp,
    CanonicalKey::SignalDirection,
    CanonicalKey::Score,
    CanonicalKey::Confidence,
    CanonicalKey::Price,
];
const EXECUTION_COLUMNS: &[CanonicalKey] = &[
    CanonicalKey::Timestamp,
    CanonicalKey::Side,
    CanonicalKey::Size,
    CanonicalKey::Price,
    CanonicalKey::Notional,
    CanonicalKey::Pnl,
];
const HEALTH_COLUMNS: &[CanonicalKey] = &[
    CanonicalKey::Timestamp,
    CanonicalKey::Status,
    CanonicalKey::LatencyMs,
    CanonicalKey::Message,
];
const LOG_COLUMNS: &[CanonicalKey] = &[
    CanonicalKey::Timestamp,
    CanonicalKey::Level,
    CanonicalKey::Message,
];

pub fn render<F>(f: &mut Frame, app: &App<F>)
where
    F: HttpFetch + 'static,
{
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(2),
        ])
        .split(f.area());

    render_tabs(f, chunks[0], app.tab());
    match app.tab() {
        NavTab::Summary => render_summary(f, chunks[1], &app.slot(DataKind::Status)),
        NavTab::Bot(_) => render_bot(f, chunks[1], app),
        NavTab::Logs => render_logs(f, chunks[1], app),
    }
    render_footer(f, chunks[2], app.notice());
}

fn render_tabs(f: &mut Frame, area: Rect, selected: NavTab) {
    let titles: Vec<Line> = NavTab::ALL
        .iter()
        .enumerate()
        .map(|(index, tab)| Line::from(format!("{} {}", index + 1, tab)))
        .collect();
    let index = NavTab::ALL.iter().position(|tab| *tab == selected).unwrap_or(0);

    let tabs = Tabs::new(titles)
        .select(index)
        .style(Style::default().fg(C_DIM))
        .highlight_style(Style::default().fg(C_BRIGHT).add_modifier(Modifier::BOLD))
        .block(
            Block::default()
                .title(" BOT CONSOLE ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(C_ACCENT)),
        );
    f.render_widget(tabs, area);
}

fn render_summary(f: &mut Frame, area: Rect, slot: &Slot) {
    let block = panel(" FLEET ", slot, false);
    let Some(view) = slot.payload.as_status() else {
        f.render_widget(Paragraph::new(placeholder(slot)).block(block), area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(6), Constraint::Length(4)])
        .split(block.inner(area));
    f.render_widget(block, area);

    let header = Row::new(["BOT", "STATUS", "EQUITY", "SIGNALS", "DATA"])
        .style(Style::default().fg(C_DIM).add_modifier(Modifier::BOLD));
    let rows = view.registry.iter().map(|bot| {
        let (status, color) = match bot.status {
            BotStatus::Running => ("RUNNING", C_UP),
            BotStatus::Stopped => ("STOPPED", C_DOWN),
            BotStatus::Unknown => ("UNKNOWN", C_WARN),
        };
        Row::new([
            Cell::from(bot.identity.to_string()).style(Style::default().add_modifier(Modifier::BOLD)),
            Cell::from(status).style(Style::default().fg(color)),
            Cell::from(format!("{:.2}", bot.equity)),
            Cell::from(bot.signals_count.to_string()),
            Cell::from(if bot.has_data { "yes" } else { MISSING_PLACEHOLDER }),
        ])
    });
    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(9),
            Constraint::Length(16),
            Constraint::Length(9),
            Constraint::Length(6),
        ],
    )
    .header(header);
    f.render_widget(table, chunks[0]);

    f.render_widget(Paragraph::new(totals_lines(view)), chunks[1]);
}

fn totals_lines(view: &StatusView) -> Vec<Line<'static>> {
    vec![
        Line::from(vec![
            Span::styled("Total equity   ", Style::default().fg(C_DIM)),
            Span::styled(
                view.total_equity.display(),
                Style::default().fg(C_BRIGHT).add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::styled("Total signals  ", Style::default().fg(C_DIM)),
            Span::styled(view.total_signals.display(), Style::default().fg(C_BRIGHT)),
        ]),
        Line::from(vec![
            Span::styled("Last update    ", Style::default().fg(C_DIM)),
            Span::raw(
                view.last_update
                    .clone()
                    .unwrap_or_else(|| MISSING_PLACEHOLDER.to_string()),
            ),
        ]),
    ]
}

fn render_bot<F>(f: &mut Frame, area: Rect, app: &App<F>)
where
    F: HttpFetch + 'static,
{
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(10), Constraint::Min(0)])
        .split(area);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(34),
            Constraint::Percentage(33),
            Constraint::Percentage(33),
        ])
        .split(rows[1]);

    let focused = |kind: DataKind| app.focus() == kind;
    render_equity(f, rows[0], &app.slot(DataKind::Equity), focused(DataKind::Equity));

    for (kind, area) in BOT_PANELS[1..].iter().zip(columns.iter()) {
        let columns = match kind {
            DataKind::Signals => SIGNAL_COLUMNS,
            DataKind::Executions => EXECUTION_COLUMNS,
            _ => HEALTH_COLUMNS,
        };
        let title = format!(" {} {} ", app.bot(), kind.to_string().to_uppercase());
        render_records(f, *area, &title, &app.slot(*kind), columns, focused(*kind));
    }
}

fn render_equity(f: &mut Frame, area: Rect, slot: &Slot, focused: bool) {
    let block = panel(" EQUITY ", slot, focused);
    let view = match slot.payload.as_equity() {
        Some(view) if !view.is_empty() => view,
        _ => {
            f.render_widget(Paragraph::new(placeholder(slot)).block(block), area);
            return;
        }
    };

    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(block.inner(area));
    f.render_widget(block, area);

    f.render_widget(Paragraph::new(derived_lines(&view.derived)), halves[0]);
    f.render_widget(Paragraph::new(upstream_lines(view)), halves[1]);
}

fn derived_lines(derived: &DerivedMetrics) -> Vec<Line<'static>> {
    let return_color = if derived.total_return >= 0.0 { C_UP } else { C_DOWN };

    vec![
        metric_line("Equity", fmt_opt(derived.latest_equity, 2), C_BRIGHT),
        metric_line(
            "Return",
            format!("{:+.2} ({:+.2}%)", derived.total_return, derived.total_return_pct),
            return_color,
        ),
        metric_line("Realized", fmt_opt(derived.realized, 2), signed_color(derived.realized)),
        metric_line("Unrealized", fmt_opt(derived.unrealized, 2), signed_color(derived.unrealized)),
        metric_line("Total PnL", fmt_opt(derived.total_pnl, 2), signed_color(derived.total_pnl)),
        metric_line("Max DD", fmt_pct(derived.max_drawdown_pct), C_DOWN),
        metric_line("DD periods", drawdown_summary(derived), C_WARN),
        metric_line(
            "Rolling",
            format!(
                "ret {}  vol {}",
                fmt_opt(derived.rolling_return, 4),
                fmt_opt(derived.rolling_volatility, 4)
            ),
            C_BRIGHT,
        ),
    ]
}

fn upstream_lines(view: &EquityView) -> Vec<Line<'static>> {
    let ratios = &view.upstream;
    let mut lines = vec![
        Line::from(Span::styled("UPSTREAM", Style::default().fg(C_DIM))),
        metric_line("Sharpe", ratios.sharpe.display(), C_BRIGHT),
        metric_line("Win rate", ratios.win_rate.display(), C_BRIGHT),
        metric_line("Max DD", ratios.max_drawdown.display(), C_BRIGHT),
        metric_line("Volatility", ratios.volatility.display(), C_BRIGHT),
        metric_line("Correlation", ratios.correlation.display(), C_BRIGHT),
    ];
    if let Some(last) = view.series.last() {
        lines.push(metric_line("As of", last.label.clone(), C_DIM));
    }
    lines
}

fn drawdown_summary(derived: &DerivedMetrics) -> String {
    match derived.drawdown_periods.last() {
        None => "none".to_string(),
        Some(last) => {
            let state = if last.open { "open" } else { "closed" };
            format!(
                "{} (last {}..{} {:.2}% {state})",
                derived.drawdown_periods.len(),
                last.start_label,
                last.end_label,
                last.trough_pct
            )
        }
    }
}

fn render_records(
    f: &mut Frame,
    area: Rect,
    title: &str,
    slot: &Slot,
    columns: &[CanonicalKey],
    focused: bool,
) {
    let block = panel(title, slot, focused);
    let records = slot.payload.records();
    if records.is_empty() {
        f.render_widget(Paragraph::new(placeholder(slot)).block(block), area);
        return;
    }

    let header = Row::new(columns.iter().map(|key| key.name().to_uppercase()))
        .style(Style::default().fg(C_DIM).add_modifier(Modifier::BOLD));
    // newest first
    let visible = area.height.saturating_sub(3) as usize;
    let rows = records.iter().rev().take(visible).map(|record| {
        Row::new(columns.iter().map(|key| {
            let value = record.get(*key);
            Cell::from(record.display(*key)).style(value_style(*key, value))
        }))
    });
    let widths = vec![Constraint::Fill(1); columns.len()];

    f.render_widget(Table::new(rows, widths).header(header).block(block), area);
}

fn render_logs<F>(f: &mut Frame, area: Rect, app: &App<F>)
where
    F: HttpFetch + 'static,
{
    let title = format!(
        " LOGS {} @ {} ",
        app.log_type().unwrap_or(MISSING_PLACEHOLDER),
        app.log_date().unwrap_or("latest")
    );

    if app.log_type().is_none() {
        let types = app.slot(DataKind::LogTypes);
        let block = panel(&title, &types, true);
        f.render_widget(Paragraph::new(placeholder(&types)).block(block), area);
        return;
    }

    render_records(f, area, &title, &app.slot(DataKind::Logs), LOG_COLUMNS, true);
}

fn render_footer(f: &mut Frame, area: Rect, notice: Option<&str>) {
    let keys = Line::from(Span::styled(
        "←/→ 1-6 tab  Tab focus  t type  d date  r refresh  e csv  j json  q quit",
        Style::default().fg(C_DIM),
    ));
    let notice = Line::from(Span::styled(
        notice.unwrap_or_default().to_string(),
        Style::default().fg(C_ACCENT),
    ));
    f.render_widget(Paragraph::new(vec![keys, notice]), area);
}

/// Bordered block whose title carries the slot's freshness marker.
fn panel(title: &str, slot: &Slot, focused: bool) -> Block<'static> {
    let mut spans = vec![Span::styled(
        title.to_string(),
        Style::default().fg(C_BRIGHT).add_modifier(Modifier::BOLD),
    )];
    if let Some(marker) = status_marker(slot) {
        spans.push(marker);
        spans.push(Span::raw(" "));
    }

    Block::default()
        .title(Line::from(spans))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(slot, focused)))
}

/// Stale wins over focus.
fn border_color(slot: &Slot, focused: bool) -> Color {
    if slot.is_stale() {
        C_DOWN
    } else if focused {
        C_ACCENT
    } else {
        C_DIM
    }
}

fn status_marker(slot: &Slot) -> Option<Span<'static>> {
    match slot.status {
        SlotStatus::Ready => None,
        SlotStatus::Loading => Some(Span::styled("[loading]", Style::default().fg(C_DIM))),
        SlotStatus::Empty => Some(Span::styled("[no data]", Style::default().fg(C_DIM))),
        SlotStatus::Stale => {
            let reason = slot
                .last_error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "fetch failed".to_string());
            Some(Span::styled(format!("[stale: {reason}]"), Style::default().fg(C_DOWN)))
        }
    }
}

fn placeholder(slot: &Slot) -> Line<'static> {
    let text = match slot.status {
        SlotStatus::Loading => "Loading...",
        SlotStatus::Empty | SlotStatus::Ready => "No data yet",
        SlotStatus::Stale => "No data (last fetch failed)",
    };
    Line::from(Span::styled(text, Style::default().fg(C_DIM)))
}

fn metric_line(label: &str, value: String, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label:<12}"), Style::default().fg(C_DIM)),
        Span::styled(value, Style::default().fg(color)),
    ])
}

fn value_style(key: CanonicalKey, value: &MetricValue) -> Style {
    match key {
        CanonicalKey::Pnl => Style::default().fg(signed_color(value.as_f64())),
        CanonicalKey::Side | CanonicalKey::SignalDirection => {
            match value.as_str().map(str::to_ascii_lowercase).as_deref() {
                Some("buy" | "long") => Style::default().fg(C_UP),
                Some("sell" | "short") => Style::default().fg(C_DOWN),
                _ => Style::default(),
            }
        }
        CanonicalKey::Level => match value.as_str().map(str::to_ascii_uppercase).as_deref() {
            Some("ERROR" | "CRITICAL") => Style::default().fg(C_DOWN),
            Some("WARN" | "WARNING") => Style::default().fg(C_WARN),
            _ => Style::default(),
        },
        _ if value.is_missing() => Style::default().fg(C_DIM),
        _ => Style::default(),
    }
}

fn signed_color(value: Option<f64>) -> Color {
    match value {
        Some(value) if value > 0.0 => C_UP,
        Some(value) if value < 0.0 => C_DOWN,
        _ => C_BRIGHT,
    }
}

fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|value| format!("{value:.decimals$}"))
        .unwrap_or_else(|| MISSING_PLACEHOLDER.to_string())
}

fn fmt_pct(value: Option<f64>) -> String {
    value
        .map(|value| format!("{value:.2}%"))
        .unwrap_or_else(|| MISSING_PLACEHOLDER.to_string())
}
