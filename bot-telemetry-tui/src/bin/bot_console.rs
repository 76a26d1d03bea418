/// Bot Console
///
/// Polls the bot API for fleet status, per-bot signals, executions, health,
/// equity and logs, and renders them as a tabbed terminal UI.
use std::{
    error::Error,
    fs::OpenOptions,
    io::{self, Write},
    sync::Mutex,
    time::Duration,
};

use bot_telemetry::{ConsoleConfig, ReqwestFetcher};
use bot_telemetry_tui::{App, AuthError, AuthGate, widgets};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::info;

const MAX_ATTEMPTS: usize = 3;

/// Get log file path from BOT_CONSOLE_LOG env var (default: bot-console.log)
fn get_log_path() -> String {
    std::env::var("BOT_CONSOLE_LOG").unwrap_or_else(|_| "bot-console.log".to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging()?;

    let config = ConsoleConfig::from_env()?;
    let gate = AuthGate::from_env()?;
    if !gate.is_configured() {
        return Err(AuthError::NotConfigured.into());
    }
    if !gate.is_open() {
        authenticate(&gate)?;
    }

    // Setup panic hook to restore terminal on crash
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic_info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let fetcher = ReqwestFetcher::new(config.http_timeout);
    let mut app = App::new(config, fetcher);
    app.start();

    let tick_rate = Duration::from_millis(250);
    loop {
        app.sync();
        terminal.draw(|f| widgets::render(f, &app))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    break;
                }
                app.handle_key(key.code);
            }
        }

        if app.should_quit() {
            break;
        }
    }

    app.shutdown();
    info!("console closed");

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Prompt until the gate opens, giving up after [`MAX_ATTEMPTS`] wrong passwords.
fn authenticate(gate: &AuthGate) -> Result<(), Box<dyn Error>> {
    for attempt in 1..=MAX_ATTEMPTS {
        let Some(password) = prompt_password()? else {
            return Err("authentication cancelled".into());
        };

        match gate.unlock(&password) {
            Ok(()) => return Ok(()),
            Err(AuthError::Rejected) => eprintln!("Wrong password ({attempt}/{MAX_ATTEMPTS})"),
            Err(error) => return Err(error.into()),
        }
    }
    Err(AuthError::Rejected.into())
}

/// Read a password without echo. `None` when the operator cancels.
fn prompt_password() -> io::Result<Option<String>> {
    print!("Console password: ");
    io::stdout().flush()?;

    enable_raw_mode()?;
    let mut password = String::new();
    let result = loop {
        let key = match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => key,
            Ok(_) => continue,
            Err(error) => break Err(error),
        };

        match key.code {
            KeyCode::Enter => break Ok(Some(password)),
            KeyCode::Esc => break Ok(None),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break Ok(None),
            KeyCode::Backspace => {
                password.pop();
            }
            KeyCode::Char(c) => password.push(c),
            _ => {}
        }
    };
    disable_raw_mode()?;
    println!();

    result
}

fn init_logging() -> io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(get_log_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}
