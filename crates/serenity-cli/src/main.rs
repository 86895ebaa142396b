//! Serenity CLI - log in to the Serenity API once and stay logged in.
//!
//! The session is persisted between runs, so `serenity login` followed by
//! any number of `serenity get ...` calls reuses the same credential until
//! `serenity logout`.

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serenity_core::{
    AuthError, Config, LoginRequest, RegisterRequest, SessionManager, StorageBackend,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USERNAME_ENV: &str = "SERENITY_USERNAME";
const PASSWORD_ENV: &str = "SERENITY_PASSWORD";

#[derive(Parser)]
#[command(name = "serenity", version, about = "Command line client for the Serenity API")]
struct Cli {
    /// API base URL (overrides config and SERENITY_API_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Where to keep the session between runs
    #[arg(long, global = true, value_enum)]
    storage: Option<StorageArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum StorageArg {
    File,
    Keyring,
    Memory,
}

impl From<StorageArg> for StorageBackend {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::File => StorageBackend::File,
            StorageArg::Keyring => StorageBackend::Keyring,
            StorageArg::Memory => StorageBackend::Memory,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Log in and persist the session
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Create a patient account and log into it
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        date_of_birth: Option<String>,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
    /// Drop the persisted session
    Logout,
    /// Show the logged in user
    Whoami {
        /// Ask the server instead of trusting the stored record
        #[arg(long)]
        remote: bool,
    },
    /// Exit non-zero unless a session is stored
    Status,
    /// Authenticated GET, printing the JSON response
    Get { path: String },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _guard = init_tracing();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(url) = cli.base_url {
        config.api_base_url = url;
    }
    if let Some(storage) = cli.storage {
        config.storage = storage.into();
    }

    let cache = config.open_credential_cache()?;
    let manager = SessionManager::from_config(&config, cache).context("Failed to create API client")?;
    info!(base_url = %manager.api().base_url(), "Serenity CLI starting");

    match cli.command {
        Command::Login { username } => login(&manager, &mut config, username).await,
        Command::Register {
            username,
            email,
            first_name,
            last_name,
            phone,
            date_of_birth,
            gender,
            address,
        } => {
            let password = prompt_new_password()?;
            let request = RegisterRequest {
                username,
                email,
                password,
                first_name,
                last_name,
                phone,
                date_of_birth,
                gender,
                address,
            };
            manager
                .register(&request)
                .await
                .map_err(|e| explain(e, "Registration failed"))?;
            print_logged_in(&manager);
            Ok(())
        }
        Command::Logout => {
            manager.logout().await;
            println!("Logged out");
            Ok(())
        }
        Command::Whoami { remote } => whoami(&manager, remote).await,
        Command::Status => status(&manager),
        Command::Get { path } => {
            let value: serde_json::Value = manager.api().get(&path).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
    }
}

async fn login(manager: &SessionManager, config: &mut Config, username: Option<String>) -> Result<()> {
    let username = match username
        .or_else(|| std::env::var(USERNAME_ENV).ok())
        .filter(|u| !u.trim().is_empty())
    {
        Some(u) => u,
        None => prompt_username(config.last_username.as_deref())?,
    };
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(p) if !p.is_empty() => p,
        _ => rpassword::prompt_password("Password: ")?,
    };

    manager
        .login(&LoginRequest::new(username.trim(), password))
        .await
        .map_err(|e| explain(e, "Login failed"))?;

    config.last_username = Some(username.trim().to_string());
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }

    print_logged_in(manager);
    Ok(())
}

/// Errors when logged out, so the process exits non-zero after `main`
/// has unwound and flushed the log writer.
fn status(manager: &SessionManager) -> Result<()> {
    if !manager.store().is_authenticated() {
        anyhow::bail!("Not logged in");
    }
    print_logged_in(manager);
    Ok(())
}

async fn whoami(manager: &SessionManager, remote: bool) -> Result<()> {
    let user = if remote {
        manager.refresh_user().await?
    } else {
        manager
            .store()
            .current_user()
            .ok_or_else(|| anyhow::anyhow!("Not logged in"))?
    };
    println!("{}", serde_json::to_string_pretty(user.as_value())?);
    Ok(())
}

fn print_logged_in(manager: &SessionManager) {
    match manager.store().current_user() {
        Some(user) => match user.role() {
            Some(role) => println!("Logged in as {} ({})", user.display_name(), role),
            None => println!("Logged in as {}", user.display_name()),
        },
        None => println!("Not logged in"),
    }
}

/// Swap the technical error for the message a person should see.
fn explain(err: AuthError, fallback: &str) -> anyhow::Error {
    let message = err.user_message(fallback);
    anyhow::Error::new(err).context(message)
}

fn prompt_username(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Username [{}]: ", last),
        None => print!("Username: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    match (input.is_empty(), last) {
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => Err(anyhow::anyhow!("Username required")),
        (false, _) => Ok(input.to_string()),
    }
}

fn prompt_new_password() -> Result<String> {
    if let Ok(p) = std::env::var(PASSWORD_ENV) {
        if !p.is_empty() {
            return Ok(p);
        }
    }
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        return Err(anyhow::anyhow!("Passwords do not match"));
    }
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_get_with_global_flags() {
        let cli = Cli::try_parse_from([
            "serenity",
            "get",
            "/patient/appointments",
            "--storage",
            "memory",
            "--base-url",
            "http://localhost:5000/api",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Get { ref path } if path == "/patient/appointments"));
        assert!(matches!(cli.storage, Some(StorageArg::Memory)));
        assert_eq!(cli.base_url.as_deref(), Some("http://localhost:5000/api"));
    }

    #[test]
    fn test_status_fails_without_session() {
        let config = Config {
            storage: StorageBackend::Memory,
            ..Config::default()
        };
        let manager = SessionManager::from_config(&config, config.open_credential_cache().unwrap()).unwrap();

        let err = status(&manager).unwrap_err();
        assert_eq!(err.to_string(), "Not logged in");
    }

    #[test]
    fn test_explain_uses_fallback() {
        let err = explain(AuthError::MissingToken, "Login failed");
        assert_eq!(err.to_string(), "Login failed");
    }
}
