//! Wiring from configuration to a running coordinator and its entities.

use std::sync::Arc;

use crate::{
    channel::Channel,
    client::StationClient,
    config::{Config, StationConfig},
    coordinator::UpdateCoordinator,
    entity::SensorEntity,
    error::EnvistaError,
    model::StationId,
    weather::WeatherEntity,
};

/// Entities built for one configured station.
#[derive(Debug, Clone)]
pub struct StationEntities {
    pub station_id: StationId,
    pub station_name: String,
    pub sensors: Vec<SensorEntity>,
    pub weather: WeatherEntity,
    /// Configured condition names with no matching channel.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Setup {
    pub coordinator: Arc<UpdateCoordinator>,
    pub stations: Vec<StationEntities>,
}

/// Register every configured station, run the first refresh and build the
/// entities. Unknown stations abort setup; unknown condition names are
/// skipped with a warning.
pub async fn setup(
    client: Arc<dyn StationClient>,
    config: &Config,
) -> Result<Setup, EnvistaError> {
    if config.stations.is_empty() {
        return Err(EnvistaError::InvalidConfiguration("no stations configured".into()));
    }
    config.check_timing()?;

    let coordinator = UpdateCoordinator::new(client).with_fetch_timeout(config.fetch_timeout());
    let coordinator = Arc::new(coordinator);

    for station in &config.stations {
        coordinator.register_station(station.station_id).await?;
    }

    let report = coordinator.first_refresh().await?;
    for (station_id, err) in &report.failed {
        tracing::warn!(station_id, error = %err, "station has no data yet");
    }

    let stations = config
        .stations
        .iter()
        .map(|station| build_entities(&coordinator, station))
        .collect();

    Ok(Setup {
        coordinator,
        stations,
    })
}

pub fn build_entities(
    coordinator: &Arc<UpdateCoordinator>,
    station: &StationConfig,
) -> StationEntities {
    let station_id = station.station_id;
    let station_name = coordinator
        .cached_station_info(station_id)
        .map(|info| info.display_name())
        .unwrap_or_else(|| format!("Station {station_id}"));

    let mut sensors = Vec::new();
    let mut skipped = Vec::new();
    for condition in &station.conditions {
        match Channel::from_key(condition) {
            Some(channel) => {
                sensors.push(SensorEntity::new(station_id, channel, Arc::clone(coordinator)))
            }
            None => {
                tracing::warn!(
                    station_id,
                    condition = %condition,
                    "condition has no matching channel, skipping"
                );
                skipped.push(condition.clone());
            }
        }
    }

    let weather = WeatherEntity::new(station_id, station_name.clone(), Arc::clone(coordinator));

    StationEntities {
        station_id,
        station_name,
        sensors,
        weather,
        skipped,
    }
}
