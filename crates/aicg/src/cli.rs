//! Command-line interface.

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "aicg", about = "AICG production pipeline core", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the HTTP controller.
    Serve {
        /// Port to listen on (overrides API_PORT).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a task worker process.
    Worker {
        /// Comma-separated task kinds to consume
        /// (text,image,tts,video_submit,assembly); default: all.
        #[arg(long, value_delimiter = ',')]
        kinds: Vec<String>,
        /// Flat concurrency cap overriding the per-kind defaults.
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Run the provider polling sweeper.
    Sweeper,
    /// Apply schema migrations.
    Migrate,
    /// One-shot assembly for a chapter (debugging).
    Compose {
        /// Chapter id to assemble.
        #[arg(long)]
        chapter: String,
        /// Credential id recorded on the job (assembly itself makes no
        /// provider calls).
        #[arg(long, default_value = "debug")]
        api_key: String,
    },
}
