//! Implementations of the CLI commands.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use workpass_core::auth::{SessionErrorKind, SessionManager, SessionStatus, StartupOutcome};
use workpass_core::{Config, SessionRecord, SupabaseClient, SystemClock};

/// Build the session manager for the configured backend and store
fn build_manager(config: &Config) -> Result<SessionManager> {
    let (url, key) = config.backend()?;
    let client = Arc::new(SupabaseClient::new(url, key).context("Failed to build HTTP client")?);
    let store = config.session_store(config.cache_dir()?)?;
    Ok(SessionManager::new(
        store,
        client.clone(),
        client,
        Arc::new(SystemClock),
        config.session_settings(),
    ))
}

fn prompt(label: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(d) => print!("{} [{}]: ", label, d),
        None => print!("{}: ", label),
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let value = line.trim();
    match (value.is_empty(), default) {
        (true, Some(d)) => Ok(d.to_string()),
        (true, None) => bail!("{} is required", label),
        (false, _) => Ok(value.to_string()),
    }
}

fn describe(record: &SessionRecord) -> String {
    format!(
        "{} ({} minutes left)",
        record.user.display_name(),
        record.minutes_until_expiry(Utc::now())
    )
}

fn remember_email(config: &mut Config, email: &str) {
    config.last_email = Some(email.to_string());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
}

pub async fn login(config: &mut Config, email: Option<&str>) -> Result<()> {
    let manager = build_manager(config)?;
    let email = match email {
        Some(e) => e.to_string(),
        None => prompt("Email", config.last_email.as_deref())?,
    };
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;

    let record = manager.sign_in(&email, &password).await?;
    remember_email(config, &email);
    println!("Signed in as {}", describe(&record));
    Ok(())
}

pub async fn signup(config: &mut Config, email: &str, full_name: &str) -> Result<()> {
    let manager = build_manager(config)?;
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
    let confirm = rpassword::prompt_password("Repeat password: ").context("Failed to read password")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    match manager.sign_up(email, &password, full_name).await? {
        Some(record) => println!("Account created, signed in as {}", describe(&record)),
        None => println!("Account created. Confirm your email, then run `workpass login`."),
    }
    remember_email(config, email);
    Ok(())
}

pub async fn logout(config: &Config) -> Result<()> {
    let manager = build_manager(config)?;
    manager.sign_out().await?;
    println!("Signed out");
    Ok(())
}

/// Shell-facing status for a stored record and its validation result.
/// Having no record at all is being signed out, not losing a session.
fn session_status(record: Option<&SessionRecord>, error: Option<SessionErrorKind>) -> SessionStatus {
    match (record, error) {
        (None, _) | (_, Some(SessionErrorKind::NoSession)) => SessionStatus::SignedOut,
        (Some(_), Some(reason)) => SessionStatus::Lost { reason },
        (Some(r), None) => SessionStatus::Active {
            expires_at: r.expires_at,
        },
    }
}

pub async fn status(config: &Config, json: bool) -> Result<()> {
    let manager = build_manager(config)?;
    let record = manager.current()?;
    let validation = manager.check().await?;

    if json {
        let status = session_status(record.as_ref(), validation.error);
        let out = serde_json::json!({
            "session": status,
            "needs_refresh": validation.needs_refresh,
            "user": record.as_ref().map(|r| &r.user),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match record {
        None => println!("Not signed in"),
        Some(record) => {
            println!("User:       {}", record.user.display_name());
            if let Some(role) = &record.user.role {
                println!("Role:       {}", role);
            }
            println!("Expires at: {}", record.expires_at.to_rfc3339());
            println!("Saved at:   {}", record.saved_at.to_rfc3339());
            match validation.error {
                None if validation.needs_refresh => println!("State:      valid, refresh due"),
                None => println!("State:      valid"),
                Some(kind) => println!("State:      {}", kind),
            }
        }
    }
    Ok(())
}

pub async fn watch(config: &Config) -> Result<()> {
    let manager = build_manager(config)?;

    match manager.restore().await? {
        StartupOutcome::Resumed(record) => println!("Session resumed for {}", describe(&record)),
        StartupOutcome::Refreshed(record) => println!("Session refreshed for {}", describe(&record)),
        StartupOutcome::SignInRequired(kind) => {
            bail!("{} - run `workpass login` first", kind)
        }
    }

    let mut status = manager.subscribe();
    manager.monitor().start();
    println!(
        "Watching session, checking every {} minutes (Ctrl-C to stop)",
        manager.monitor().interval().as_secs() / 60
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                manager.monitor().stop();
                info!("Interrupted, stopping session monitor");
                return Ok(());
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *status.borrow_and_update();
                match current {
                    SessionStatus::Active { expires_at } => {
                        println!("Session refreshed, valid until {}", expires_at.to_rfc3339());
                    }
                    SessionStatus::Lost { reason } => {
                        bail!("Session lost: {} - run `workpass login` again", reason);
                    }
                    SessionStatus::SignedOut => {
                        println!("Signed out");
                        return Ok(());
                    }
                }
            }
        }
    }
}
