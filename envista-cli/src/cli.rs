use std::{fmt, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use envista_core::{
    Channel, Config, StationClient, StationConfig, StationEntities, StationId,
    client::client_from_config, setup, validate_conditions,
};
use inquire::{CustomType, MultiSelect, Password};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "envista", version, about = "IMS Envista weather station poller")]
pub struct Cli {
    /// Log level override: trace, debug, info, warn or error.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure the API token and add or replace a station.
    Configure,

    /// Refresh once and print every configured station.
    Show {
        /// Only show this station.
        #[arg(long)]
        station: Option<StationId>,
    },

    /// Keep refreshing on the configured interval and print each update.
    Watch,

    /// Refresh once and dump the coordinator data as JSON.
    Debug,

    /// Remove a station from the configuration.
    Remove {
        station: StationId,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = Config::load()?;
        init_logging(self.log_level.as_deref().or(config.log_level.as_deref()));

        match self.command {
            Command::Configure => configure(&mut config).await?,
            Command::Show { station } => {
                if let Some(id) = station {
                    config.stations.retain(|s| s.station_id == id);
                    anyhow::ensure!(!config.stations.is_empty(), "Station {id} is not configured");
                }
                let setup = start(&config).await?;
                for station in &setup.stations {
                    print_station(station);
                }
            }
            Command::Watch => watch(&config).await?,
            Command::Debug => {
                let setup = start(&config).await?;
                let dump = setup.coordinator.diagnostics()?;
                println!("{}", serde_json::to_string_pretty(&dump)?);
            }
            Command::Remove { station } => {
                let removed = config.remove_station(station);
                anyhow::ensure!(removed, "Station {station} is not configured");
                config.save()?;
                println!("Removed station {station}");
            }
        }

        Ok(())
    }
}

async fn start(config: &Config) -> anyhow::Result<envista_core::Setup> {
    let client = client_from_config(config)?;
    setup(client, config).await.context("Failed to set up IMS Envista stations")
}

async fn watch(config: &Config) -> anyhow::Result<()> {
    let setup = start(config).await?;
    for station in &setup.stations {
        print_station(station);
    }

    let mut updates = setup.coordinator.watch();
    let coordinator = Arc::clone(&setup.coordinator);
    let refresher = coordinator.spawn(config.refresh_interval())?;
    tracing::info!(interval = ?config.refresh_interval(), "watching stations");

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("--- update at {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
                for station in &setup.stations {
                    print_station(station);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, stopping");
                break;
            }
        }
    }

    refresher.abort();
    Ok(())
}

async fn configure(config: &mut Config) -> anyhow::Result<()> {
    let token = Password::new("IMS API token (leave empty to keep the current one):")
        .without_confirmation()
        .prompt()?;
    if !token.trim().is_empty() {
        config.api_token = Some(token.trim().to_string());
    }

    let station_id = CustomType::<StationId>::new("Station id:")
        .with_error_message("Please enter a numeric station id")
        .prompt()?;

    let client = client_from_config(config)?;
    let info = client
        .fetch_station_info(station_id)
        .await
        .with_context(|| format!("Could not verify station {station_id}"))?;
    println!("Found station: {} ({} monitors)", info.display_name(), info.monitors.len());

    let options: Vec<ChannelOption> = Channel::available_for(&info)
        .into_iter()
        .map(ChannelOption)
        .collect();
    let selected = MultiSelect::new("Conditions to expose:", options).prompt()?;

    let conditions: Vec<String> = selected
        .iter()
        .map(|o| o.0.as_str().to_string())
        .collect();
    validate_conditions(&info, &conditions)?;

    config.upsert_station(StationConfig {
        station_id,
        conditions,
    });
    config.validate()?;
    config.save()?;

    println!("Saved configuration to {}", Config::config_file_path()?.display());
    Ok(())
}

struct ChannelOption(Channel);

impl fmt::Display for ChannelOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let descriptor = self.0.descriptor();
        match descriptor.unit {
            Some(unit) => write!(f, "{} - {} ({unit})", self.0, descriptor.name),
            None => write!(f, "{} - {}", self.0, descriptor.name),
        }
    }
}

fn print_station(station: &StationEntities) {
    let weather = station.weather.state();
    println!("{} [{}]: {}", station.station_name, station.station_id, weather.condition);

    for sensor in &station.sensors {
        let descriptor = sensor.descriptor();
        let value = sensor
            .native_value()
            .map(|v| v.display_with_precision(descriptor.precision))
            .unwrap_or_else(|| "unavailable".to_string());
        let unit = descriptor.unit.map(|u| format!(" {u}")).unwrap_or_default();
        println!("  {:<18} {value}{unit}", descriptor.name);
    }

    for condition in &station.skipped {
        println!("  {condition:<18} skipped (unknown condition)");
    }
}

fn init_logging(level: Option<&str>) {
    tracing_subscriber::fmt()
        .with_max_level(parse_log_level(level.unwrap_or("info")))
        .with_writer(std::io::stderr)
        .init();
}

fn parse_log_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
