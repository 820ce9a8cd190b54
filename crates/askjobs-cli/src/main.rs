//! askjobs - a terminal client for the ASK 2.0 jobs and community platform.
//!
//! Browse job postings and community questions, apply, post, and talk to the
//! career assistant. The access token lives only in memory for the lifetime
//! of the process; an expired token is reissued from the refresh cookie
//! without interrupting the command that hit it.

mod app;
mod commands;

use std::io;

use anyhow::Result;
use askjobs_core::Config;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;

/// Log file name inside the cache directory
const LOG_FILE: &str = "askjobs.log";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to a file in the cache directory so they do not interleave with
/// the prompt; stderr is the fallback when no cache directory is usable. The
/// returned guard flushes the file writer on drop.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = config
        .cache_dir()
        .ok()
        .filter(|dir| std::fs::create_dir_all(dir).is_ok());

    let (file_layer, stderr_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), None, Some(guard))
        }
        None => (None, Some(fmt::layer().with_writer(io::stderr)), None),
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing(&Config::default());
    info!("askjobs starting");

    let config = Config::load()?;
    let mut app = App::new(config)?;

    if std::env::args().nth(1).as_deref() == Some("--login") {
        if let Err(e) = app.login_interactive().await {
            eprintln!("Login failed: {}", e);
        }
    }

    let result = app.run().await;

    if let Err(ref e) = result {
        eprintln!("Error: {:#}", e);
    }

    info!("askjobs shutting down");
    result
}
