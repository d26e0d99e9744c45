//! Workpass CLI - sign in to the Workpass backend and keep the session alive.
//!
//! This binary drives the same session core the mobile shell uses, which
//! makes it handy for support staff and for checking a device's stored
//! session from a terminal.

mod commands;

use std::io;
use std::path::Path;

use anyhow::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use workpass_core::Config;

const USAGE: &str = "\
Usage: workpass <command>

Commands:
  login [email]            Sign in with email and password
  signup <email> <name>    Create an account
  logout                   Sign out and forget the stored session
  status [--json]          Show the stored session and check it remotely
  watch                    Keep the session alive until Ctrl-C
  help                     Show this message

Environment:
  WORKPASS_SUPABASE_URL, WORKPASS_SUPABASE_ANON_KEY, WORKPASS_SESSION_PASSPHRASE
  RUST_LOG (default: warn)";

/// Initialize the tracing subscriber for logging.
/// When `log_dir` is given, logs also go to a daily rolling file there;
/// the returned guard must be kept alive to flush it.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "workpass.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("help");

    let mut config = Config::load()?;

    let log_dir = match command {
        "watch" => config.cache_dir().ok().map(|d| d.join("logs")),
        _ => None,
    };
    let _guard = init_tracing(log_dir.as_deref());
    info!(command, "Workpass CLI starting");

    match command {
        "login" => commands::login(&mut config, args.get(1).map(String::as_str)).await,
        "signup" => match (args.get(1), args.get(2..)) {
            (Some(email), Some(name)) if !name.is_empty() => {
                commands::signup(&mut config, email, &name.join(" ")).await
            }
            _ => {
                eprintln!("{}", USAGE);
                std::process::exit(2);
            }
        },
        "logout" => commands::logout(&config).await,
        "status" => commands::status(&config, args.iter().any(|a| a == "--json")).await,
        "watch" => commands::watch(&config).await,
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}
