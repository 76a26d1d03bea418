/// Bot Console - terminal front end for bot telemetry
///
/// The library holds everything the `bot-console` binary needs:
/// - Password gate with a 24h unlock window
/// - Console state, tab navigation and key handling
/// - Ratatui widgets for the summary, per-bot and logs tabs
pub mod app;
pub mod auth;
pub mod widgets;

pub use app::{App, BOT_PANELS};
pub use auth::{AuthError, AuthGate, password_digest};
