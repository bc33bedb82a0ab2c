//! Stream Processor Tier advisor CLI
//!
//! Recommends a processing tier for stream processors, either statically from
//! a pipeline definition or by profiling the running processor.

mod client;
mod commands;
mod config;
mod output;
mod registry;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{advise, profile, CommandContext};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Stream Processor Tier advisor
#[derive(Parser)]
#[command(name = "spt")]
#[command(author, version, about = "Stream Processor Tier advisor", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ~/.config/spt/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory of `<processor>.json` pipeline definitions
    #[arg(long, global = true, env = "SPT_REGISTRY_DIR")]
    pub registry: Option<PathBuf>,

    /// API endpoint URL
    #[arg(long, global = true, env = "SPT_API_URL")]
    pub api_url: Option<String>,

    /// Project (group) id
    #[arg(long, global = true, env = "SPT_PROJECT_ID")]
    pub project: Option<String>,

    /// Stream processing workspace name
    #[arg(long, global = true, env = "SPT_WORKSPACE")]
    pub workspace: Option<String>,

    /// API bearer token
    #[arg(long, global = true, env = "SPT_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Recommend a tier from pipeline definitions
    TierAdvise {
        /// Registered processor names
        processors: Vec<String>,

        /// Pipeline definition file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Profile running processors and recommend tiers
    Profile {
        /// Processor names to profile concurrently
        #[arg(required = true)]
        processors: Vec<String>,

        /// Pipeline definition file (single processor only)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Seconds between polls
        #[arg(long)]
        interval: Option<u64>,

        /// Session length in seconds
        #[arg(long, conflicts_with = "continuous")]
        duration: Option<u64>,

        /// Sample until interrupted
        #[arg(long)]
        continuous: bool,

        /// Write Prometheus text metrics to this file when done
        #[arg(long)]
        metrics_out: Option<PathBuf>,
    },
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let mut settings = config::Settings::load(cli.config.as_deref())?;
    if cli.api_url.is_some() {
        settings.api_url = cli.api_url;
    }
    if cli.project.is_some() {
        settings.project_id = cli.project;
    }
    if cli.workspace.is_some() {
        settings.workspace = cli.workspace;
    }
    if cli.token.is_some() {
        settings.api_token = cli.token;
    }
    if cli.registry.is_some() {
        settings.registry_dir = cli.registry;
    }

    let ctx = CommandContext::new(settings, cli.format);

    // Execute command
    let ok = match cli.command {
        Commands::TierAdvise { processors, file } => {
            advise::tier_advise(&ctx, &processors, file.as_deref())?
        }
        Commands::Profile {
            processors,
            file,
            interval,
            duration,
            continuous,
            metrics_out,
        } => {
            let options = profile::ProfileOptions {
                processors,
                file,
                interval_secs: interval,
                duration_secs: duration,
                continuous,
                metrics_out,
            };
            profile::profile(&ctx, options).await?
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
