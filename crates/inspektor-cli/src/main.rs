//! Inspektor CLI - a command-line console for the Inspektor control plane.
//!
//! Logs in, follows SSO handoffs, and shows which datasources the current
//! user can reach. Admin commands manage datasources, users and grants.

mod cli;
mod commands;
mod output;

use std::io;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use inspektor_core::{ApiError, Config, Console, ConsoleError, OpenOptions};
use tracing::{debug, error};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g. RUST_LOG=inspektor_core=debug).
/// Besides stderr, logs go to a daily file under `log_dir` when it is usable.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file = log_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("inspektor")
            .filename_suffix("log")
            .build(dir)
            .ok()
    });
    let (file_layer, guard) = match file {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();
    guard
}

/// User-facing message for a failed command.
fn describe(e: &anyhow::Error) -> String {
    let auth_failure = e
        .downcast_ref::<ConsoleError>()
        .map(ConsoleError::is_auth_failure)
        .or_else(|| e.downcast_ref::<ApiError>().map(ApiError::is_auth_failure))
        .unwrap_or(false);
    if auth_failure {
        "Your session is no longer valid. Run `inspektor login` again.".to_string()
    } else {
        format!("{:#}", e)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: ignoring unreadable config: {:#}", e);
            Config::default()
        }
    };
    if let Some(url) = cli.base_url.clone() {
        config.base_url = Some(url);
    }

    let log_dir = config.log_dir().ok();
    let _log_guard = init_tracing(log_dir.as_deref());
    debug!(?config, "Config loaded");

    let options = OpenOptions {
        handoff: cli.handoff.clone(),
        ephemeral: cli.ephemeral,
    };
    let result = match Console::open(&config, options) {
        Ok(console) => commands::run(cli.command, &console, &mut config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Command failed");
            eprintln!("Error: {}", describe(&e));
            ExitCode::FAILURE
        }
    }
}
