use std::{collections::HashMap, fmt};

use chrono::{DateTime, FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};

/// Numeric identifier of an IMS station.
pub type StationId = u32;

/// Latest snapshot per registered station, as held by the coordinator.
pub type CoordinatorData = HashMap<StationId, StationData>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// One channel a station reports on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub channel_id: u32,
    pub name: String,
    pub units: Option<String>,
    pub active: bool,
}

/// Static station metadata. Fetched once and cached by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationInfo {
    pub station_id: StationId,
    pub name: String,
    pub short_name: Option<String>,
    pub location: Option<Location>,
    pub active: bool,
    pub monitors: Vec<Monitor>,
}

impl StationInfo {
    /// Station name in title case ("TEL AVIV COAST" -> "Tel Aviv Coast").
    pub fn display_name(&self) -> String {
        title_case(&self.name)
    }
}

/// One timestamped set of channel readings.
///
/// Every channel is optional: stations only report what they have sensors for,
/// and the API drops readings flagged invalid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationReading {
    /// Station-local time of the reading.
    pub datetime: Option<DateTime<FixedOffset>>,
    pub rain: Option<f64>,
    pub ws_max: Option<f64>,
    pub wd_max: Option<f64>,
    pub ws: Option<f64>,
    pub wd: Option<f64>,
    pub std_wd: Option<f64>,
    pub td: Option<f64>,
    pub td_max: Option<f64>,
    pub td_min: Option<f64>,
    pub rh: Option<f64>,
    pub tg: Option<f64>,
    pub ws_1mm: Option<f64>,
    pub ws_10mm: Option<f64>,
    pub bp: Option<f64>,
    pub diff_r: Option<f64>,
    pub grad: Option<f64>,
    pub nip: Option<f64>,
    pub rain_1_min: Option<f64>,
    pub tw: Option<f64>,
    pub time: Option<NaiveTime>,
}

/// Snapshot of a station returned by one `fetch_latest` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationData {
    pub station_id: StationId,
    pub latest: Option<StationReading>,
}

/// A value read off a snapshot or off station metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChannelValue {
    Number(f64),
    Text(String),
    Timestamp(DateTime<FixedOffset>),
}

impl ChannelValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ChannelValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Render with the given number of decimals for numeric values.
    pub fn display_with_precision(&self, precision: Option<u8>) -> String {
        match (self, precision) {
            (ChannelValue::Number(v), Some(p)) => format!("{v:.*}", usize::from(p)),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelValue::Number(v) => write!(f, "{v}"),
            ChannelValue::Text(s) => f.write_str(s),
            ChannelValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

pub(crate) fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut start_of_word = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if start_of_word {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start_of_word = false;
        } else {
            out.push(c);
            start_of_word = true;
        }
    }
    out
}
