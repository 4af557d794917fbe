//! sessionward - an interactive shell over a self-renewing API session.
//!
//! Signs in (or silently restores a session from the server's renewal
//! cookie), then issues requests through the authorized client while the
//! session renews itself in the background.

mod shell;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sessionward_core::auth::{activity_channel, ActivitySender};
use sessionward_core::utils::{format_countdown, format_expiry};
use sessionward_core::{
    ActivityKind, ActivityMonitor, ApiClient, AuthorizedClient, Config, Credentials,
    ExpiryNotifier, ExpiryStatus, Navigator, SessionError, SessionManager, SessionState,
};

use shell::{Command, HELP};

type InputLines = Lines<BufReader<Stdin>>;

/// Navigation target for a forced logout: tell the user to sign in again.
struct LoginPrompt;

impl Navigator for LoginPrompt {
    fn navigate_to_login(&self) {
        println!("\nSession ended. Type 'login' to sign in again.");
    }
}

/// Initialize the tracing subscriber, writing to a daily log file so the
/// shell output stays clean. Use RUST_LOG to control the level.
fn init_tracing(config: &Config) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = config.log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let appender = tracing_appender::rolling::daily(log_dir, "sessionward.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .with(filter)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("Usage: sessionward [--demo]\n\n{}", HELP);
        return Ok(());
    }

    let mut config = Config::load()?;
    if args.iter().any(|a| a == "--demo") {
        config.demo_mode = true;
    }

    let _log_guard = init_tracing(&config)?;
    info!(api = %config.api_base_url, demo = config.demo_mode, "sessionward starting");

    let api = ApiClient::from_config(&config)?;
    let session = SessionManager::new(
        Arc::new(api.clone()),
        Arc::new(LoginPrompt),
        config.session.clone(),
        config.demo_mode,
    );
    let client = AuthorizedClient::new(api, session.clone());
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    println!("sessionward - {}{}", config.api_base_url, if config.demo_mode { " (demo)" } else { "" });
    match session.init().await {
        SessionState::Authenticated(user) => {
            println!("Session restored for {} ({})", user.subject, user.role.display_name());
        }
        SessionState::Anonymous => {
            if let Err(e) = login(&session, &mut config, &mut input).await {
                eprintln!("Login failed: {}", e);
            }
        }
    }

    let (activity, activity_source) = activity_channel();
    let _monitor = ActivityMonitor::spawn(session.clone(), activity_source);
    let notifier = ExpiryNotifier::spawn(session.clone());
    let reporter = tokio::spawn(report_expiry(notifier.subscribe()));

    let result = run_shell(&client, &mut config, &mut input, &activity).await;

    reporter.abort();
    session.shutdown();
    info!("sessionward shutting down");
    result
}

async fn run_shell(
    client: &AuthorizedClient,
    config: &mut Config,
    input: &mut InputLines,
    activity: &ActivitySender,
) -> Result<()> {
    println!("Type 'help' for commands.");
    loop {
        prompt("> ")?;
        let Some(line) = input.next_line().await? else {
            break;
        };
        // A closed monitor only means no more activity renewals.
        let _ = activity.unbounded_send(ActivityKind::KeyPress);

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        match command {
            Command::Empty => {}
            Command::Quit => break,
            Command::Help => println!("{}", HELP),
            Command::Status => print_status(client.session()),
            Command::Get(path) => print_result(client.get_json::<Value>(&path).await),
            Command::Post { path, body } => {
                print_result(client.post_json::<Value, _>(&path, &body).await)
            }
            Command::Delete(path) => match client.delete(&path).await {
                Ok(()) => println!("Deleted {}", path),
                Err(e) => eprintln!("Error: {}", e),
            },
            Command::Renew => match client.session().renew().await {
                Ok(user) => println!(
                    "Renewed for {} - expires in {}",
                    user.subject,
                    format_countdown(client.session().time_until_expiration())
                ),
                Err(e) => eprintln!("Renewal failed: {}", e),
            },
            Command::Login => {
                if let Err(e) = login(client.session(), config, input).await {
                    eprintln!("Login failed: {}", e);
                }
            }
            Command::Logout => {
                client.session().logout().await;
                println!("Logged out.");
            }
        }
    }
    Ok(())
}

/// Prompt for credentials and sign in, remembering the username on success.
async fn login(session: &SessionManager, config: &mut Config, input: &mut InputLines) -> Result<()> {
    let username = match config.last_username.as_deref() {
        Some(last) => {
            prompt(&format!("Username [{}]: ", last))?;
            let entered = input.next_line().await?.unwrap_or_default();
            let entered = entered.trim();
            if entered.is_empty() { last.to_string() } else { entered.to_string() }
        }
        None => {
            prompt("Username: ")?;
            input.next_line().await?.unwrap_or_default().trim().to_string()
        }
    };
    if username.is_empty() {
        anyhow::bail!("No username given");
    }

    let password = tokio::task::spawn_blocking(|| rpassword::prompt_password("Password: "))
        .await
        .context("Password prompt failed")?
        .context("Failed to read password")?;

    match session.login(&Credentials::new(username.clone(), password)).await {
        Ok(user) => {
            println!("Signed in as {} ({})", user.subject, user.role.display_name());
            config.last_username = Some(username);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
            Ok(())
        }
        Err(SessionError::InvalidCredentials) => anyhow::bail!("Invalid username or password"),
        Err(e) => Err(e.into()),
    }
}

/// Print a line when the session enters the warning window or lapses.
async fn report_expiry(mut status: watch::Receiver<ExpiryStatus>) {
    let mut last = *status.borrow();
    while status.changed().await.is_ok() {
        let current = *status.borrow_and_update();
        if !current.same_phase(&last) {
            match current {
                ExpiryStatus::Warning { remaining } => {
                    println!("\nSession expires in {}.", format_countdown(remaining));
                }
                ExpiryStatus::Expired => println!("\nSession credential has expired."),
                _ => {}
            }
        }
        last = current;
    }
}

fn print_status(session: &SessionManager) {
    match session.state() {
        SessionState::Anonymous => println!("Not signed in."),
        SessionState::Authenticated(user) => {
            let remaining = session.time_until_expiration();
            let expires = session
                .credentials()
                .expires_at_utc()
                .map(format_expiry)
                .unwrap_or_else(|| "-".to_string());
            println!("Signed in as {} ({})", user.subject, user.role.display_name());
            println!("Expires in {} (at {})", format_countdown(remaining), expires);
            if session.is_refreshing() {
                println!("Renewal in progress.");
            } else if session.has_scheduled_renewal() {
                println!("Renewal scheduled.");
            }
        }
    }
}

fn print_result(result: Result<Value, sessionward_core::ApiError>) {
    match result {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(pretty) => println!("{}", pretty),
            Err(_) => println!("{}", value),
        },
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn prompt(text: &str) -> Result<()> {
    print!("{}", text);
    io::stdout().flush()?;
    Ok(())
}
