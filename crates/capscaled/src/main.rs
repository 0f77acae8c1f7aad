//! capscaled: the capscale daemon and operator CLI.
//!
//! Assembles the capacity control loop from configuration:
//! - Load source (metrics API or OpenMetrics file)
//! - Control plane (ops API or local redb store)
//! - State store for checkpoints and run history
//! - Evaluator and scheduled change runner
//!
//! # Usage
//!
//! ```text
//! capscaled --config capscale.toml run
//! capscaled evaluate --dry-run --format json
//! capscaled change --tenant prod.acct --units 4 --revert-after 2h
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use capscale_core::CapscaleConfig;

mod backend;
mod commands;

const DEFAULT_FILTER: &str = "info,capscale=debug,capscaled=debug";

#[derive(Parser)]
#[command(
    name = "capscaled",
    about = "Capscale: capacity autoscaling for provisioned throughput",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to capscale.toml. A missing file means all defaults.
    #[arg(short, long, global = true, default_value = "capscale.toml")]
    config: PathBuf,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AnalyzeFormat {
    Text,
    Json,
    Prometheus,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate every managed tenant on the configured interval until ctrl-c.
    Run {
        /// Log intended actions without touching the control plane.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run one evaluation batch and print the result.
    Evaluate {
        #[arg(long)]
        dry_run: bool,

        /// Continue an interrupted batch from its saved checkpoint.
        #[arg(long)]
        resume: bool,

        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// Print recommendations without applying anything.
    Analyze {
        #[arg(short, long, value_enum, default_value_t = AnalyzeFormat::Text)]
        format: AnalyzeFormat,
    },
    /// Provision a tenant at a fixed unit count, optionally reverting later.
    Change {
        #[arg(long)]
        tenant: String,

        /// Provisioned units (at least 2).
        #[arg(long)]
        units: u32,

        /// Revert to on-demand after this long (e.g. "2h").
        #[arg(long, conflicts_with = "until")]
        revert_after: Option<String>,

        /// Revert to on-demand at this RFC 3339 time.
        #[arg(long)]
        until: Option<String>,

        /// Wait between a write and its verification.
        #[arg(long, default_value = "2m")]
        verify_delay: String,

        #[arg(long)]
        dry_run: bool,

        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// Configuration helpers.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the default configuration as TOML.
    Init,
    /// Print the effective configuration after file and environment overrides.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Init => commands::config::init(),
            ConfigAction::Show => commands::config::show(&load_config(&cli.config)?),
        },
        Command::Run { dry_run } => {
            let config = with_dry_run(load_config(&cli.config)?, dry_run);
            commands::run::run(config).await
        }
        Command::Evaluate {
            dry_run,
            resume,
            format,
        } => {
            let config = with_dry_run(load_config(&cli.config)?, dry_run);
            commands::evaluate::evaluate(config, resume, format).await
        }
        Command::Analyze { format } => {
            commands::analyze::analyze(load_config(&cli.config)?, format).await
        }
        Command::Change {
            tenant,
            units,
            revert_after,
            until,
            verify_delay,
            dry_run,
            format,
        } => {
            let config = with_dry_run(load_config(&cli.config)?, dry_run);
            let request = commands::change::ChangeRequest {
                tenant,
                units,
                revert_after,
                until,
                verify_delay,
            };
            commands::change::change(config, request, format).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    // Logs go to stderr so stdout carries only command output.
    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

/// Read the config file if present, then apply environment overrides.
fn load_config(path: &Path) -> anyhow::Result<CapscaleConfig> {
    let mut config = if path.is_file() {
        let config = CapscaleConfig::from_file(path)?;
        info!(path = %path.display(), "configuration loaded");
        config
    } else {
        info!(path = %path.display(), "no configuration file, using defaults");
        CapscaleConfig::default()
    };
    config.apply_process_env()?;
    Ok(config)
}

fn with_dry_run(mut config: CapscaleConfig, dry_run: bool) -> CapscaleConfig {
    config.run.dry_run |= dry_run;
    config
}
