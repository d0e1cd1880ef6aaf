mod app;
mod events;
mod persist;
mod strings;
mod terminal;
mod theme;
mod ui;

use anyhow::{Context, Result};
use terminal::TerminalGuard;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Logs go to a file; stdout belongs to the terminal UI.
    let _log_guard = persist::data_dir().map(|dir| {
        let log_dir = dir.join("logs");
        std::fs::create_dir_all(&log_dir).ok();
        let appender = tracing_appender::rolling::daily(log_dir, "localchat.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_env("LOCALCHAT_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(writer)
            .with_ansi(false)
            .init();
        guard
    });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("start async runtime")?;
    tracing::info!(target: "tui", "starting localchat");

    let mut app = app::App::new(runtime.handle().clone());
    let mut term = TerminalGuard::new()?;
    events::run(&mut term.terminal, &mut app)
}
