//! Composite weather entity and the condition derived from rain and time of day.

use std::{fmt, sync::Arc};

use chrono::Timelike;
use serde::Serialize;

use crate::{
    channel::Unit,
    coordinator::UpdateCoordinator,
    model::{StationId, StationReading},
};

/// Below this much rain (mm) the sky counts as clear.
pub const CLEAR_RAIN_MM: f64 = 1.0;
/// Above this much rain (mm) it is pouring.
pub const POURING_RAIN_MM: f64 = 5.0;
/// Hours after this one are night.
pub const NIGHT_AFTER_HOUR: u32 = 20;
/// Hours before this one are night.
pub const DAY_FROM_HOUR: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeatherCondition {
    Sunny,
    ClearNight,
    Rainy,
    Pouring,
    Unknown,
}

impl WeatherCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherCondition::Sunny => "sunny",
            WeatherCondition::ClearNight => "clear-night",
            WeatherCondition::Rainy => "rainy",
            WeatherCondition::Pouring => "pouring",
            WeatherCondition::Unknown => "unknown",
        }
    }
}

impl fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Night is after 20:00 or before 07:00 in the reading's own local time.
/// A reading without timestamp counts as day.
pub fn is_night(reading: &StationReading) -> bool {
    reading
        .datetime
        .map(|dt| dt.hour() > NIGHT_AFTER_HOUR || dt.hour() < DAY_FROM_HOUR)
        .unwrap_or(false)
}

pub fn derive_condition(reading: Option<&StationReading>) -> WeatherCondition {
    let Some(reading) = reading else {
        return WeatherCondition::Unknown;
    };
    let Some(rain) = reading.rain else {
        return WeatherCondition::Unknown;
    };

    if rain < CLEAR_RAIN_MM {
        if is_night(reading) { WeatherCondition::ClearNight } else { WeatherCondition::Sunny }
    } else if rain > POURING_RAIN_MM {
        WeatherCondition::Pouring
    } else if rain >= CLEAR_RAIN_MM {
        WeatherCondition::Rainy
    } else {
        // NaN
        WeatherCondition::Unknown
    }
}

/// Everything the weather entity exposes, read at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherState {
    pub condition: WeatherCondition,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_bearing: Option<f64>,
    pub pressure: Option<f64>,
    pub precipitation: Option<f64>,
}

impl WeatherState {
    pub fn from_reading(reading: Option<&StationReading>) -> Self {
        Self {
            condition: derive_condition(reading),
            temperature: reading.and_then(|r| r.td),
            humidity: reading.and_then(|r| r.rh),
            wind_speed: reading.and_then(|r| r.ws),
            wind_bearing: reading.and_then(|r| r.wd),
            pressure: reading.and_then(|r| r.bp),
            precipitation: reading.and_then(|r| r.rain),
        }
    }
}

/// Weather entity for one station. Reads through the coordinator on demand.
#[derive(Debug, Clone)]
pub struct WeatherEntity {
    station_id: StationId,
    station_name: String,
    coordinator: Arc<UpdateCoordinator>,
}

impl WeatherEntity {
    pub const TEMPERATURE_UNIT: Unit = Unit::Celsius;
    pub const WIND_SPEED_UNIT: Unit = Unit::MetersPerSecond;
    pub const PRESSURE_UNIT: Unit = Unit::Hectopascal;
    pub const PRECIPITATION_UNIT: Unit = Unit::Millimeters;

    pub fn new(
        station_id: StationId,
        station_name: String,
        coordinator: Arc<UpdateCoordinator>,
    ) -> Self {
        Self {
            station_id,
            station_name,
            coordinator,
        }
    }

    pub fn unique_id(&self) -> String {
        format!("ims_envista_station_{}_weather", self.station_id)
    }

    pub fn station_id(&self) -> StationId {
        self.station_id
    }

    pub fn station_name(&self) -> &str {
        &self.station_name
    }

    pub fn state(&self) -> WeatherState {
        let data = self.coordinator.get_latest(self.station_id);
        WeatherState::from_reading(data.as_ref().and_then(|d| d.latest.as_ref()))
    }

    pub fn condition(&self) -> WeatherCondition {
        self.state().condition
    }
}
