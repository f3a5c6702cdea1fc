//! Sieve CLI: the main entry point.
//!
//! Commands:
//! - `scan`: Split model output into display text and directives
//! - `extract`: Pull a structured record out of finished output
//! - `sanitize`: Show how raw directive parameters are typed
//! - `replay`: Drive the iteration controller from a scripted model

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "sieve",
    about = "Sieve: interpret tool directives and structured payloads in model output",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.sieve/config.toml)
    #[arg(short, long, global = true, env = "SIEVE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan text for directives, as if it arrived in chunks
    Scan {
        /// Input file, or `-` for stdin
        file: String,

        /// Feed the scanner this many characters at a time (0 = all at once)
        #[arg(long, default_value_t = 0)]
        chunk_size: usize,

        /// Print segments and issues as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract a structured record from text
    Extract {
        /// Input file, or `-` for stdin
        file: String,

        /// Field that marks the preferred candidate
        #[arg(long)]
        required_field: Option<String>,
    },

    /// Sanitize a raw parameter body
    Sanitize {
        /// The text between `[TOOL_CALL:<name>:` and `]`
        raw: String,
    },

    /// Replay a scripted conversation through the controller
    Replay {
        /// Script file (TOML), or `-` for stdin
        script: String,

        /// The user prompt that starts the conversation
        #[arg(short, long, default_value = "Write the article.")]
        prompt: String,

        /// Print every controller event as a JSON line
        #[arg(long)]
        events: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing on stderr so stdout stays machine-readable
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan {
            file,
            chunk_size,
            json,
        } => commands::scan::run(&config, &file, chunk_size, json)?,
        Commands::Extract {
            file,
            required_field,
        } => commands::extract::run(&config, &file, required_field)?,
        Commands::Sanitize { raw } => commands::sanitize::run(&config, &raw)?,
        Commands::Replay {
            script,
            prompt,
            events,
        } => commands::replay::run(&config, &script, &prompt, events).await?,
    }

    Ok(())
}
