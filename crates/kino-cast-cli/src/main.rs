//! Kino Cast CLI - Cast session simulator
//!
//! Features:
//! - Scripted cast scenarios against a simulated receiver
//! - Configuration validation
//! - Load request preview
//! - Error code classification table

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

use commands::{Scenario, SimulateOptions};

/// Kino Cast CLI - Remote playback toolkit
#[derive(Parser)]
#[command(name = "kino-cast")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Cast session simulation and diagnostics", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Cast configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a cast scenario against the simulated receiver
    Simulate {
        /// Scenario to run
        #[arg(value_enum)]
        scenario: Scenario,

        /// Local playback position when casting starts (seconds)
        #[arg(short, long, default_value = "42")]
        position: f64,

        /// Start with the local player paused
        #[arg(long)]
        paused: bool,

        /// SDK error code for failure scenarios
        #[arg(short, long, default_value = "receiver_unavailable")]
        error_code: String,

        /// Media source URL
        #[arg(long, default_value = "https://cdn.example.com/kino/master.m3u8")]
        src: String,

        /// Media MIME type
        #[arg(long, default_value = "application/x-mpegURL")]
        mime_type: String,
    },

    /// Validate and print the effective configuration
    Config {
        /// Override the receiver application id
        #[arg(long)]
        app_id: Option<String>,
    },

    /// Preview the load request sent to a receiver
    Request {
        /// Media source URL
        src: String,

        /// Media MIME type
        mime_type: String,

        /// Start offset in seconds
        #[arg(short, long, default_value = "0")]
        offset: f64,

        /// Do not autoplay on the receiver
        #[arg(long)]
        no_autoplay: bool,
    },

    /// List SDK error codes and how they are handled
    Codes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    kino_cast::init();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate {
            scenario,
            position,
            paused,
            error_code,
            src,
            mime_type,
        } => {
            let options = SimulateOptions {
                position,
                playing: !paused,
                error_code,
                src,
                mime_type,
            };
            commands::simulate(scenario, options, config, &cli.format).await?;
        }
        Commands::Config { app_id } => {
            commands::config(config, app_id, &cli.format)?;
        }
        Commands::Request {
            src,
            mime_type,
            offset,
            no_autoplay,
        } => {
            commands::request(&src, &mime_type, offset, !no_autoplay, &cli.format)?;
        }
        Commands::Codes => {
            commands::codes(&cli.format);
        }
    }

    Ok(())
}
