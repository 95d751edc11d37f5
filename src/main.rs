//! CLI Entry Point for scpi-instruments
//!
//! Drives instruments declared in a configuration file.
//!
//! # Usage
//!
//! ```bash
//! scpi-instruments list
//! scpi-instruments identify vna
//! scpi-instruments get vna start_frequency
//! scpi-instruments set meter frequency 1e9 --channel 2
//! scpi-instruments scan vna --margin 5s
//! scpi-instruments data vna --json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scpi_instruments::attribute::Attribute;
use scpi_instruments::config::Settings;
use scpi_instruments::drivers::Driver;
use scpi_instruments::logging;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "scpi-instruments")]
#[command(about = "Control SCPI network analyzers and power meters", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, default_value = "config/instruments.toml")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured instruments, or the attributes of one
    List {
        instrument: Option<String>,
    },

    /// Print the identity of an instrument
    Identify {
        instrument: String,
    },

    /// Read an attribute
    Get {
        instrument: String,
        attribute: String,
        /// Sensor channel (power meters)
        #[arg(long)]
        channel: Option<u8>,
    },

    /// Write an attribute
    Set {
        instrument: String,
        attribute: String,
        value: String,
        #[arg(long)]
        channel: Option<u8>,
    },

    /// Reset an instrument to its power-on state
    Reset {
        instrument: String,
    },

    /// Trigger a sweep and wait for it to finish
    Scan {
        instrument: String,
        /// Added to the sweep time when computing the deadline
        #[arg(long, value_parser = parse_duration)]
        margin: Option<Duration>,
    },

    /// Fetch the complex data of the last sweep
    Data {
        instrument: String,
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,
        /// Print JSON instead of one `re im` pair per line
        #[arg(long)]
        json: bool,
    },
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }
    settings.validate().map_err(anyhow::Error::msg)?;
    logging::init_from_settings(&settings).map_err(anyhow::Error::msg)?;
    debug!(config = %cli.config.display(), "Configuration loaded");

    let id = match &cli.command {
        Commands::List { instrument: None } => {
            for (id, instrument) in &settings.instruments {
                let state = if instrument.enabled { "" } else { " (disabled)" };
                println!("{id}\t{}{state}", instrument.driver);
            }
            return Ok(());
        }
        Commands::List {
            instrument: Some(id),
        }
        | Commands::Identify { instrument: id }
        | Commands::Get { instrument: id, .. }
        | Commands::Set { instrument: id, .. }
        | Commands::Reset { instrument: id }
        | Commands::Scan { instrument: id, .. }
        | Commands::Data { instrument: id, .. } => id.clone(),
    };

    let config = settings.instrument(&id)?;
    if !config.enabled {
        anyhow::bail!("Instrument '{id}' is disabled in {}", cli.config.display());
    }

    let mut driver = Driver::from_config(config)
        .await
        .with_context(|| format!("Failed to open instrument '{id}'"))?;
    let result = run(&mut driver, cli.command).await;
    driver.close().await?;
    result
}

async fn run(driver: &mut Driver, command: Commands) -> Result<()> {
    match command {
        Commands::List { .. } => {
            for attribute in driver.attributes() {
                print_attribute(attribute);
            }
        }
        Commands::Identify { .. } => {
            let identity = driver.identity().await?;
            println!("{}", serde_json::to_string_pretty(&identity)?);
        }
        Commands::Get {
            attribute, channel, ..
        } => {
            println!("{}", driver.get(&attribute, channel).await?);
        }
        Commands::Set {
            attribute,
            value,
            channel,
            ..
        } => {
            driver.set(&attribute, &value, channel).await?;
            info!(attribute = %attribute, value = %value, "Attribute written");
        }
        Commands::Reset { .. } => {
            driver.reset().await?;
            info!(instrument = %driver.name(), "Reset complete");
        }
        Commands::Scan { margin, .. } => {
            driver.scan(margin).await?;
            println!("Sweep complete");
        }
        Commands::Data { timeout, json, .. } => {
            let data = driver.data(timeout).await?;
            if json {
                let pairs: Vec<[f64; 2]> = data.iter().map(|c| [c.re, c.im]).collect();
                println!("{}", serde_json::to_string(&pairs)?);
            } else {
                for point in data {
                    println!("{:e}\t{:e}", point.re, point.im);
                }
            }
        }
    }
    Ok(())
}

fn print_attribute(attribute: &dyn Attribute) {
    println!(
        "{:<24} {:<10} {}",
        attribute.name(),
        attribute.access().to_string(),
        attribute.domain()
    );
}
