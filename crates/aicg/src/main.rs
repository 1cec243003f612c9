//! AICG pipeline core binary.
//!
//! Operational entry points: the HTTP controller, task workers, the
//! polling sweeper, schema migrations and a one-shot assembly command
//! for debugging.

use clap::Parser;
use tracing::{error, info};

mod cli;
mod commands;

use cli::{Cli, Commands};

/// Process exit codes.
const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_CONFIG: i32 = 2;
const EXIT_DEPENDENCY: i32 = 3;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Serve { port } => commands::serve(port).await,
        Commands::Worker { kinds, concurrency } => commands::worker(kinds, concurrency).await,
        Commands::Sweeper => commands::sweeper().await,
        Commands::Migrate => commands::migrate().await,
        Commands::Compose { chapter, api_key } => commands::compose(chapter, api_key).await,
    };

    match result {
        Ok(()) => std::process::exit(EXIT_OK),
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("aicg={log_level},warn")));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("aicg starting");
}

/// Command failure with its process exit code.
#[derive(Debug)]
pub struct CommandError {
    message: String,
    exit_code: i32,
}

impl CommandError {
    pub fn failure(message: impl Into<String>) -> Self {
        Self { message: message.into(), exit_code: EXIT_FAILURE }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self { message: message.into(), exit_code: EXIT_CONFIG }
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        Self { message: message.into(), exit_code: EXIT_DEPENDENCY }
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CommandError {}
