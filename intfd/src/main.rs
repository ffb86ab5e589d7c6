//! intfd - interface event coordinator
//!
//! CLI entry point for simulating scenarios and inspecting configuration.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info};

use intfd::cli::{Cli, Command, OutputFormat};
use intfd::config::Config;
use intfd::domain::PortEvent;
use intfd::simulate::{self, Scenario};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("intfd")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(log_dir.join("intfd.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Simulate { scenario, format } => cmd_simulate(config, &scenario, format).await,
        Command::Config => cmd_config(&config),
        Command::Events => cmd_events(),
    }
}

async fn cmd_simulate(config: Config, path: &Path, format: OutputFormat) -> Result<()> {
    debug!(path = %path.display(), %format, "cmd_simulate: called");
    let scenario = Scenario::load(path)?;
    let report = simulate::run(config, scenario).await?;

    match format {
        OutputFormat::Text => print!("{}", simulate::render_text(&report)),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialize report")?);
        }
    }

    if report.steps.iter().any(|s| !s.ok) {
        info!("Scenario finished with failed steps");
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    debug!("cmd_config: called");
    print!("{}", config.to_yaml()?);
    Ok(())
}

fn cmd_events() -> Result<()> {
    debug!("cmd_events: called");
    for event in PortEvent::ALL {
        println!("{:>2}  {:<24} {:#010x}", event as u8, event.as_str(), event.bit());
    }
    Ok(())
}
