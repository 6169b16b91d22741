// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use inquire::{Password, Text};
use tokio::io::{AsyncBufReadExt, BufReader};

use tokenwatch::{
    check_access, format_error, format_simple_error, redirect_path, AccessDecision, AuthApi,
    Config, HttpAuthClient, SessionManager, SessionNotice, UserRole, WarningPrompt,
};

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// Success - operation completed successfully
    pub const SUCCESS: i32 = 0;
    /// General error - unspecified error
    pub const ERROR: i32 = 1;
    /// Permission denied - signed in, but the role is not allowed
    pub const FORBIDDEN: i32 = 77;
}

/// Spinner helpers for consistent progress indicators
mod spinner {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Duration;

    /// Create a spinner with consistent styling
    pub fn create(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }
}

#[derive(Parser)]
#[command(
    name = "tokenwatch",
    version,
    about = "Session keep-alive companion for the device compliance portal"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate the current credential and print session status
    Status {
        /// Require one of these roles (comma separated); exit non-zero otherwise
        #[arg(long, value_delimiter = ',')]
        require_role: Vec<String>,
    },
    /// Hold a session open interactively, answering expiry warnings
    Watch,
    /// Sign in and print where the portal would land you
    Login,
    /// Invalidate the current credential server-side
    Logout,
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the active configuration
    Show,
    /// Set a config key (portal-url, request-timeout-secs)
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", format_simple_error(&err.to_string()));
            exit_codes::ERROR
        }
    };
    std::process::exit(code);
}

fn init_tracing() {
    // Audit lines go to RUST_LOG consumers; the interactive UI stays clean
    // by default.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tokenwatch=warn")),
        )
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Status { require_role } => cmd_status(require_role).await,
        Command::Watch => cmd_watch().await.map(|_| exit_codes::SUCCESS),
        Command::Login => cmd_login().await,
        Command::Logout => cmd_logout().await,
        Command::Config { action } => cmd_config(action).map(|_| exit_codes::SUCCESS),
    }
}

fn build_client(config: &Config) -> Result<Arc<HttpAuthClient>> {
    Ok(Arc::new(HttpAuthClient::new(
        config.portal_url.as_str(),
        Duration::from_secs(config.request_timeout_secs),
    )?))
}

fn print_status(manager: &SessionManager) {
    let snapshot = manager.snapshot();
    match &snapshot.user {
        Some(user) => println!(
            "{} {} <{}> role={} expiry-timer={}",
            "[OK]".green(),
            user.name,
            user.email,
            user.role,
            manager.expiry_state()
        ),
        None => println!("{} not signed in", "[--]".yellow()),
    }
}

async fn cmd_status(require_role: Vec<String>) -> Result<i32> {
    let config = Config::load()?;
    let client = build_client(&config)?;
    let manager = SessionManager::new(client as Arc<dyn AuthApi>);

    let spin = spinner::create("Checking session...");
    manager.fetch_session().await;
    spin.finish_and_clear();

    print_status(&manager);

    let allowed: Vec<UserRole> = require_role.iter().map(|r| UserRole::normalize(r)).collect();
    let decision = check_access(&manager.snapshot(), &allowed);
    if !allowed.is_empty() {
        println!("  access: {}", decision);
    }

    // A one-shot check leaves no timer behind.
    manager.shutdown();

    Ok(match decision {
        AccessDecision::Granted => exit_codes::SUCCESS,
        AccessDecision::Forbidden => exit_codes::FORBIDDEN,
        AccessDecision::SignInRequired | AccessDecision::Loading => exit_codes::ERROR,
    })
}

async fn cmd_watch() -> Result<()> {
    let config = Config::load()?;
    let client = build_client(&config)?;
    let manager = SessionManager::new(Arc::clone(&client) as Arc<dyn AuthApi>);
    let Some(mut notices) = manager.take_notices() else {
        bail!("notice channel already taken");
    };

    let spin = spinner::create("Checking session...");
    manager.fetch_session().await;
    spin.finish_and_clear();

    if !manager.is_authenticated() {
        println!("{}", "Not signed in.".yellow());
        let email = Text::new("Email:").prompt().context("sign-in aborted")?;
        let password = Password::new("Password:")
            .without_confirmation()
            .prompt()
            .context("sign-in aborted")?;

        let spin = spinner::create("Signing in...");
        let login = client.login(email.trim(), &password).await;
        spin.finish_and_clear();

        match login {
            Ok(response) if response.success => {}
            Ok(response) => bail!("Sign-in rejected: {}", response.message),
            Err(err) => bail!("Could not sign in: {}", err),
        }

        manager.fetch_session().await;
        if !manager.is_authenticated() {
            bail!("Signed in, but the portal did not validate the new credential");
        }
    }

    print_status(&manager);
    println!(
        "{}",
        "Commands: e = extend (when warned)  l = sign out  s = status  q = quit".dimmed()
    );

    let mut pending: Option<WarningPrompt> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            notice = notices.recv() => {
                match notice {
                    Some(SessionNotice::ExpiryWarning(prompt)) => {
                        eprintln!("\n{}", "⚠ Your sign-in is about to expire.".yellow().bold());
                        eprintln!(
                            "{}",
                            format!(
                                "  Press 'e' then ENTER within {}s to extend, or 'l' to sign out now.",
                                prompt.remaining().as_secs()
                            )
                            .yellow()
                        );
                        pending = Some(prompt);
                    }
                    Some(SessionNotice::SessionExtended { remaining }) => {
                        pending = None;
                        println!(
                            "{} Session extended — {} more minutes",
                            "[OK]".green(),
                            remaining.as_secs() / 60
                        );
                    }
                    Some(SessionNotice::ExtendFailed) => {
                        pending = None;
                        eprintln!(
                            "{}",
                            "✗ Could not extend the session. Please sign in again.".red().bold()
                        );
                    }
                    Some(SessionNotice::SessionEnded { reason }) => {
                        pending = None;
                        println!("Signed out ({}).", reason);
                        break;
                    }
                    None => break,
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) | Err(_) => {
                        manager.shutdown();
                        break;
                    }
                };
                match line.trim() {
                    "e" => match &pending {
                        Some(prompt) => {
                            if !prompt.extend() {
                                println!("Too late — that warning already closed.");
                            }
                        }
                        None => println!("No expiry warning is open."),
                    },
                    "l" => manager.logout().await,
                    "s" => print_status(&manager),
                    "q" => {
                        manager.shutdown();
                        println!("Detached — the session is left as-is.");
                        break;
                    }
                    "" => {}
                    other => println!("Unknown command: {other}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                manager.shutdown();
                println!("\nDetached — the session is left as-is.");
                break;
            }
        }
    }

    Ok(())
}

async fn cmd_login() -> Result<i32> {
    let config = Config::load()?;
    let client = build_client(&config)?;

    println!("Signing in to {}", config.portal_url.as_str().cyan());
    let email = Text::new("Email:").prompt().context("sign-in aborted")?;
    let password = Password::new("Password:")
        .without_confirmation()
        .prompt()
        .context("sign-in aborted")?;

    let spin = spinner::create("Signing in...");
    let result = client.login(email.trim(), &password).await;
    spin.finish_and_clear();

    match result {
        Ok(response) if response.success => {
            match response.session_user() {
                Some(user) => {
                    println!("{} Signed in as {} ({})", "[OK]".green(), user.name, user.role);
                    println!("  portal home: {}", redirect_path(user.role));
                }
                None => println!("{} Signed in", "[OK]".green()),
            }
            println!(
                "{}",
                "  The credential cookie lives inside one process only — use `tokenwatch watch` to hold a session open."
                    .dimmed()
            );
            Ok(exit_codes::SUCCESS)
        }
        Ok(response) => {
            eprintln!(
                "{}",
                format_simple_error(&format!("Sign-in rejected: {}", response.message))
            );
            Ok(exit_codes::ERROR)
        }
        Err(err) => {
            eprintln!(
                "{}",
                format_error(
                    "Could not sign in",
                    &[
                        "Portal not reachable",
                        "Wrong portal URL in config",
                        "Invalid email or password",
                    ],
                    &[
                        "Check the portal URL: tokenwatch config show",
                        "Verify credentials and try again",
                    ],
                )
            );
            eprintln!("  ({})", err);
            Ok(exit_codes::ERROR)
        }
    }
}

async fn cmd_logout() -> Result<i32> {
    let config = Config::load()?;
    let client = build_client(&config)?;

    let spin = spinner::create("Signing out...");
    let result = client.logout().await;
    spin.finish_and_clear();

    match result {
        Ok(()) => {
            println!("{} Signed out", "[OK]".green());
            Ok(exit_codes::SUCCESS)
        }
        Err(err) => {
            eprintln!(
                "{}",
                format_simple_error(&format!("Sign-out failed: {}", err))
            );
            Ok(exit_codes::ERROR)
        }
    }
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!(
                "{}",
                format!("# file: {}", tokenwatch::config::config_path()?.display()).dimmed()
            );
            Ok(())
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            match key.as_str() {
                "portal-url" | "portal_url" => config.portal_url = value,
                "request-timeout-secs" | "request_timeout_secs" => {
                    config.request_timeout_secs =
                        value.parse().context("timeout must be a number of seconds")?;
                }
                other => bail!(
                    "Unknown config key: {other} (known: portal-url, request-timeout-secs)"
                ),
            }
            config.save()?;
            println!("{} Config updated", "[OK]".green());
            Ok(())
        }
    }
}
