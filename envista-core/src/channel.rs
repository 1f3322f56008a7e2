//! Static mapping from channel keys to display descriptors.
//!
//! Each [`Channel`] knows how to present itself (name, unit, icon, precision)
//! and how to pull its value out of either the station metadata or the latest
//! snapshot. Extraction never fails: a missing field is `None`.

use std::{convert::TryFrom, fmt};

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};

use crate::{
    error::EnvistaError,
    model::{ChannelValue, StationData, StationInfo, StationReading},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    StationName,
    LastUpdated,
    Rain,
    WsMax,
    WdMax,
    Ws,
    Wd,
    StdWd,
    Td,
    TdMax,
    TdMin,
    Rh,
    Tg,
    Ws1mm,
    Ws10mm,
    Bp,
    DiffR,
    Grad,
    Nip,
    Time,
    Rain1Min,
    Tw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Millimeters,
    MetersPerSecond,
    Degrees,
    Celsius,
    Percent,
    Hectopascal,
    WattsPerSquareMeter,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Millimeters => "mm",
            Unit::MetersPerSecond => "m/s",
            Unit::Degrees => "°",
            Unit::Celsius => "°C",
            Unit::Percent => "%",
            Unit::Hectopascal => "hPa",
            Unit::WattsPerSquareMeter => "W/m²",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Timestamp,
    Precipitation,
    WindSpeed,
    Temperature,
    Humidity,
    Pressure,
    Irradiance,
}

/// Where a channel reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Station metadata, fetched once.
    Static,
    /// The latest snapshot, replaced on every refresh.
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub channel: Channel,
    pub name: &'static str,
    pub icon: &'static str,
    pub unit: Option<Unit>,
    pub precision: Option<u8>,
    pub device_class: Option<DeviceClass>,
    pub source: Source,
}

const fn dynamic(
    channel: Channel,
    name: &'static str,
    icon: &'static str,
    unit: Option<Unit>,
    precision: Option<u8>,
    device_class: Option<DeviceClass>,
) -> Descriptor {
    Descriptor {
        channel,
        name,
        icon,
        unit,
        precision,
        device_class,
        source: Source::Dynamic,
    }
}

use self::DeviceClass as D;
use self::Unit as U;

static DESCRIPTORS: [Descriptor; 22] = [
    Descriptor {
        channel: Channel::StationName,
        name: "Station Name",
        icon: "mdi:home-city",
        unit: None,
        precision: None,
        device_class: None,
        source: Source::Static,
    },
    dynamic(
        Channel::LastUpdated,
        "Last Update Time",
        "mdi:sun-clock",
        None,
        None,
        Some(D::Timestamp),
    ),
    dynamic(
        Channel::Rain,
        "Rain",
        "mdi:weather-pouring",
        Some(U::Millimeters),
        Some(1),
        Some(D::Precipitation),
    ),
    dynamic(
        Channel::WsMax,
        "WS Max",
        "mdi:weather-windy",
        Some(U::MetersPerSecond),
        Some(1),
        Some(D::WindSpeed),
    ),
    dynamic(
        Channel::WdMax,
        "WD Max",
        "mdi:compass",
        Some(U::Degrees),
        Some(0),
        None,
    ),
    dynamic(
        Channel::Ws,
        "WS",
        "mdi:weather-windy",
        Some(U::MetersPerSecond),
        Some(1),
        Some(D::WindSpeed),
    ),
    dynamic(
        Channel::Wd,
        "WD",
        "mdi:compass",
        Some(U::Degrees),
        Some(0),
        None,
    ),
    dynamic(
        Channel::StdWd,
        "Std WD",
        "mdi:compass",
        Some(U::Degrees),
        Some(1),
        None,
    ),
    dynamic(
        Channel::Td,
        "TD",
        "mdi:thermometer",
        Some(U::Celsius),
        Some(1),
        Some(D::Temperature),
    ),
    dynamic(
        Channel::TdMax,
        "TD max",
        "mdi:thermometer-chevron-up",
        Some(U::Celsius),
        Some(1),
        Some(D::Temperature),
    ),
    dynamic(
        Channel::TdMin,
        "TD Min",
        "mdi:thermometer-chevron-down",
        Some(U::Celsius),
        Some(1),
        Some(D::Temperature),
    ),
    dynamic(
        Channel::Rh,
        "RH",
        "mdi:cloud-percent",
        Some(U::Percent),
        Some(0),
        Some(D::Humidity),
    ),
    dynamic(
        Channel::Tg,
        "TG",
        "mdi:thermometer",
        Some(U::Celsius),
        Some(1),
        Some(D::Temperature),
    ),
    dynamic(
        Channel::Ws1mm,
        "WS 1mm",
        "mdi:weather-windy",
        Some(U::MetersPerSecond),
        Some(1),
        Some(D::WindSpeed),
    ),
    dynamic(
        Channel::Ws10mm,
        "WS 10mm",
        "mdi:weather-windy",
        Some(U::MetersPerSecond),
        Some(1),
        Some(D::WindSpeed),
    ),
    dynamic(
        Channel::Bp,
        "BP",
        "mdi:car-brake-low-pressure",
        Some(U::Hectopascal),
        Some(1),
        Some(D::Pressure),
    ),
    dynamic(
        Channel::DiffR,
        "DiffR",
        "mdi:radioactive",
        Some(U::WattsPerSquareMeter),
        Some(1),
        Some(D::Irradiance),
    ),
    dynamic(
        Channel::Grad,
        "Grad",
        "mdi:radioactive-circle-outline",
        Some(U::WattsPerSquareMeter),
        Some(1),
        Some(D::Irradiance),
    ),
    dynamic(
        Channel::Nip,
        "NIP",
        "mdi:radioactive-circle",
        Some(U::WattsPerSquareMeter),
        Some(1),
        Some(D::Irradiance),
    ),
    dynamic(
        Channel::Time,
        "Time",
        "mdi:timer-settings",
        None,
        None,
        Some(D::Timestamp),
    ),
    dynamic(
        Channel::Rain1Min,
        "Rain 1 Min",
        "mdi:water",
        Some(U::Millimeters),
        Some(1),
        Some(D::Precipitation),
    ),
    dynamic(
        Channel::Tw,
        "TW",
        "mdi:thermometer",
        Some(U::Celsius),
        Some(1),
        Some(D::Temperature),
    ),
];

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::StationName => "station_name",
            Channel::LastUpdated => "last_updated",
            Channel::Rain => "rain",
            Channel::WsMax => "ws_max",
            Channel::WdMax => "wd_max",
            Channel::Ws => "ws",
            Channel::Wd => "wd",
            Channel::StdWd => "std_wd",
            Channel::Td => "td",
            Channel::TdMax => "td_max",
            Channel::TdMin => "td_min",
            Channel::Rh => "rh",
            Channel::Tg => "tg",
            Channel::Ws1mm => "ws_1mm",
            Channel::Ws10mm => "ws_10mm",
            Channel::Bp => "bp",
            Channel::DiffR => "diff_r",
            Channel::Grad => "grad",
            Channel::Nip => "nip",
            Channel::Time => "time",
            Channel::Rain1Min => "rain_1_min",
            Channel::Tw => "tw",
        }
    }

    pub fn all() -> impl Iterator<Item = Channel> {
        DESCRIPTORS.iter().map(|d| d.channel)
    }

    pub fn descriptor(&self) -> &'static Descriptor {
        // The table is ordered like the enum.
        &DESCRIPTORS[*self as usize]
    }

    pub fn is_static(&self) -> bool {
        self.descriptor().source == Source::Static
    }

    /// Look up a channel by key, `None` when the key is unknown.
    pub fn from_key(key: &str) -> Option<Channel> {
        let key = key.trim().to_lowercase();
        Channel::all().find(|c| c.as_str() == key)
    }

    /// Map an Envista monitor or data-channel name ("TDmax", "Rain_1_min")
    /// onto its channel.
    pub fn from_monitor_name(name: &str) -> Option<Channel> {
        let channel = match name.trim().to_lowercase().as_str() {
            "rain" => Channel::Rain,
            "wsmax" => Channel::WsMax,
            "wdmax" => Channel::WdMax,
            "ws" => Channel::Ws,
            "wd" => Channel::Wd,
            "stdwd" => Channel::StdWd,
            "td" => Channel::Td,
            "tdmax" => Channel::TdMax,
            "tdmin" => Channel::TdMin,
            "rh" => Channel::Rh,
            "tg" => Channel::Tg,
            "ws1mm" => Channel::Ws1mm,
            "ws10mm" => Channel::Ws10mm,
            "bp" => Channel::Bp,
            "diffr" => Channel::DiffR,
            "grad" => Channel::Grad,
            "nip" => Channel::Nip,
            "time" => Channel::Time,
            "rain_1_min" => Channel::Rain1Min,
            "tw" => Channel::Tw,
            _ => return None,
        };
        Some(channel)
    }

    /// Channels a station can actually serve: the ones every station has plus
    /// one per active monitor, in table order.
    pub fn available_for(info: &StationInfo) -> Vec<Channel> {
        let monitored: Vec<Channel> = info
            .monitors
            .iter()
            .filter(|m| m.active)
            .filter_map(|m| Channel::from_monitor_name(&m.name))
            .collect();

        Channel::all()
            .filter(|c| {
                matches!(c, Channel::StationName | Channel::LastUpdated) || monitored.contains(c)
            })
            .collect()
    }

    /// Numeric field of a reading backing this channel.
    pub(crate) fn reading_slot<'a>(
        &self,
        r: &'a mut StationReading,
    ) -> Option<&'a mut Option<f64>> {
        let slot = match self {
            Channel::StationName | Channel::LastUpdated | Channel::Time => return None,
            Channel::Rain => &mut r.rain,
            Channel::WsMax => &mut r.ws_max,
            Channel::WdMax => &mut r.wd_max,
            Channel::Ws => &mut r.ws,
            Channel::Wd => &mut r.wd,
            Channel::StdWd => &mut r.std_wd,
            Channel::Td => &mut r.td,
            Channel::TdMax => &mut r.td_max,
            Channel::TdMin => &mut r.td_min,
            Channel::Rh => &mut r.rh,
            Channel::Tg => &mut r.tg,
            Channel::Ws1mm => &mut r.ws_1mm,
            Channel::Ws10mm => &mut r.ws_10mm,
            Channel::Bp => &mut r.bp,
            Channel::DiffR => &mut r.diff_r,
            Channel::Grad => &mut r.grad,
            Channel::Nip => &mut r.nip,
            Channel::Rain1Min => &mut r.rain_1_min,
            Channel::Tw => &mut r.tw,
        };
        Some(slot)
    }

    /// Value of a static channel from station metadata.
    pub fn extract_static(&self, info: &StationInfo) -> Option<ChannelValue> {
        match self {
            Channel::StationName => Some(ChannelValue::Text(info.display_name())),
            _ => None,
        }
    }

    /// Value of a dynamic channel from the latest snapshot, if any.
    pub fn extract(&self, data: Option<&StationData>) -> Option<ChannelValue> {
        let latest = data?.latest.as_ref()?;
        self.extract_reading(latest)
    }

    fn extract_reading(&self, r: &StationReading) -> Option<ChannelValue> {
        let number = match self {
            Channel::StationName => return None,
            Channel::LastUpdated => return r.datetime.map(ChannelValue::Timestamp),
            Channel::Time => return combine_date_time(r).map(ChannelValue::Timestamp),
            Channel::Rain => r.rain,
            Channel::WsMax => r.ws_max,
            Channel::WdMax => r.wd_max,
            Channel::Ws => r.ws,
            Channel::Wd => r.wd,
            Channel::StdWd => r.std_wd,
            Channel::Td => r.td,
            Channel::TdMax => r.td_max,
            Channel::TdMin => r.td_min,
            Channel::Rh => r.rh,
            Channel::Tg => r.tg,
            Channel::Ws1mm => r.ws_1mm,
            Channel::Ws10mm => r.ws_10mm,
            Channel::Bp => r.bp,
            Channel::DiffR => r.diff_r,
            Channel::Grad => r.grad,
            Channel::Nip => r.nip,
            Channel::Rain1Min => r.rain_1_min,
            Channel::Tw => r.tw,
        };
        number.map(ChannelValue::Number)
    }
}

/// The reading's date with its `time` channel as time of day, in the
/// reading's own offset.
fn combine_date_time(r: &StationReading) -> Option<DateTime<FixedOffset>> {
    let datetime = r.datetime?;
    let time = r.time?;
    let naive = NaiveDateTime::new(datetime.date_naive(), time);
    datetime.offset().from_local_datetime(&naive).single()
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Channel {
    type Error = EnvistaError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Channel::from_key(value).ok_or_else(|| {
            EnvistaError::InvalidConfiguration(format!(
                "Unknown condition '{value}'. Supported conditions: {}.",
                Channel::all().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
            ))
        })
    }
}

/// Parse the configured condition names for a station, rejecting names that
/// are unknown or that the station has no active monitor for.
pub fn validate_conditions(
    info: &StationInfo,
    conditions: &[String],
) -> Result<Vec<Channel>, EnvistaError> {
    let available = Channel::available_for(info);
    conditions
        .iter()
        .map(|condition| {
            let channel = Channel::try_from(condition.as_str())?;
            if !available.contains(&channel) {
                return Err(EnvistaError::InvalidConfiguration(format!(
                    "station {} does not report condition '{channel}'",
                    info.station_id
                )));
            }
            Ok(channel)
        })
        .collect()
}
