use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveTime};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::{
    channel::Channel,
    error::EnvistaError,
    model::{Location, Monitor, StationData, StationId, StationInfo, StationReading},
};

use super::StationClient;

pub const DEFAULT_BASE_URL: &str = "https://api.ims.gov.il/v1/envista";

/// HTTP adapter for the two IMS Envista endpoints the coordinator needs.
#[derive(Debug, Clone)]
pub struct EnvistaClient {
    token: String,
    base_url: String,
    http: Client,
}

impl EnvistaClient {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(token: String, base_url: String) -> Self {
        Self {
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    async fn get(&self, station_id: StationId, path: &str) -> Result<String, EnvistaError> {
        let url = format!("{}/stations/{station_id}{path}", self.base_url);
        tracing::debug!(%url, "requesting IMS Envista");

        let transient = |message: String| EnvistaError::TransientFetch {
            station_id,
            message,
        };

        let res = self
            .http
            .get(&url)
            .header("Authorization", format!("ApiToken {}", self.token))
            .send()
            .await
            .map_err(|e| transient(format!("request failed: {e}")))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| transient(format!("failed to read response body: {e}")))?;

        match status {
            s if s.is_success() => Ok(body),
            StatusCode::NOT_FOUND => Err(EnvistaError::InvalidStation(station_id)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(EnvistaError::InvalidConfiguration(format!(
                    "IMS API token was rejected with status {status}"
                )))
            }
            _ => Err(transient(format!(
                "request failed with status {status}: {}",
                truncate_body(&body)
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvLocation {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvMonitor {
    channel_id: u32,
    name: String,
    units: Option<String>,
    #[serde(default)]
    active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvStation {
    station_id: StationId,
    name: String,
    short_name: Option<String>,
    location: Option<EvLocation>,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    monitors: Vec<EvMonitor>,
}

#[derive(Debug, Deserialize)]
struct EvChannel {
    name: String,
    value: Option<f64>,
    #[serde(default = "default_valid")]
    valid: bool,
}

#[derive(Debug, Deserialize)]
struct EvDataEntry {
    datetime: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    channels: Vec<EvChannel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvLatestResponse {
    station_id: Option<StationId>,
    #[serde(default)]
    data: Vec<EvDataEntry>,
}

fn default_valid() -> bool {
    true
}

pub(crate) fn parse_station_info(body: &str) -> Result<StationInfo, serde_json::Error> {
    let parsed: EvStation = serde_json::from_str(body)?;

    let location = parsed.location.and_then(|l| match (l.latitude, l.longitude) {
        (Some(latitude), Some(longitude)) => Some(Location {
            latitude,
            longitude,
        }),
        _ => None,
    });

    Ok(StationInfo {
        station_id: parsed.station_id,
        name: parsed.name,
        short_name: parsed.short_name,
        location,
        active: parsed.active,
        monitors: parsed
            .monitors
            .into_iter()
            .map(|m| Monitor {
                channel_id: m.channel_id,
                name: m.name,
                units: m.units,
                active: m.active,
            })
            .collect(),
    })
}

/// Map the latest-data payload onto a snapshot. An empty body means the
/// station has nothing to report yet.
pub(crate) fn parse_latest(
    station_id: StationId,
    body: &str,
) -> Result<StationData, serde_json::Error> {
    if body.trim().is_empty() {
        return Ok(StationData {
            station_id,
            latest: None,
        });
    }

    let parsed: EvLatestResponse = serde_json::from_str(body)?;
    let latest = parsed.data.into_iter().next().map(reading_from_entry);

    Ok(StationData {
        station_id: parsed.station_id.unwrap_or(station_id),
        latest,
    })
}

fn reading_from_entry(entry: EvDataEntry) -> StationReading {
    let mut reading = StationReading {
        datetime: entry.datetime,
        ..Default::default()
    };

    for channel in entry.channels.into_iter().filter(|c| c.valid) {
        let Some(value) = channel.value else { continue };
        match Channel::from_monitor_name(&channel.name) {
            Some(Channel::Time) => reading.time = hhmm_to_time(value),
            Some(mapped) => {
                if let Some(slot) = mapped.reading_slot(&mut reading) {
                    *slot = Some(value);
                }
            }
            None => tracing::trace!(channel = %channel.name, "ignoring unmapped channel"),
        }
    }

    reading
}

/// The `Time` channel carries the time of day as an `hhmm` number.
fn hhmm_to_time(value: f64) -> Option<NaiveTime> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let hhmm = value.round() as u32;
    NaiveTime::from_hms_opt(hhmm / 100, hhmm % 100, 0)
}

#[async_trait]
impl StationClient for EnvistaClient {
    async fn fetch_latest(&self, station_id: StationId) -> Result<StationData, EnvistaError> {
        let body = self.get(station_id, "/data/latest").await?;
        parse_latest(station_id, &body).map_err(|e| EnvistaError::TransientFetch {
            station_id,
            message: format!("failed to parse latest data JSON: {e}"),
        })
    }

    async fn fetch_station_info(
        &self,
        station_id: StationId,
    ) -> Result<StationInfo, EnvistaError> {
        let body = self.get(station_id, "").await?;
        parse_station_info(&body).map_err(|e| EnvistaError::TransientFetch {
            station_id,
            message: format!("failed to parse station JSON: {e}"),
        })
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATION_JSON: &str = r#"{
        "stationId": 178,
        "name": "TEL AVIV COAST",
        "shortName": "TA COAST",
        "stationsTag": "(None)",
        "location": { "latitude": 32.0576, "longitude": 34.7588 },
        "timebase": 10,
        "active": true,
        "owner": "ims",
        "regionId": 7,
        "monitors": [
            { "channelId": 1, "name": "Rain", "alias": null, "active": true, "typeId": 1,
              "pollutantId": 1, "units": "mm", "description": null },
            { "channelId": 7, "name": "TD", "alias": null, "active": true, "typeId": 1,
              "pollutantId": 7, "units": "degC", "description": null }
        ]
    }"#;

    const LATEST_JSON: &str = r#"{
        "stationId": 178,
        "data": [{
            "datetime": "2024-01-15T22:50:00+02:00",
            "channels": [
                { "id": 1, "name": "Rain", "alias": null, "value": 0.0, "status": 1, "valid": true, "description": null },
                { "id": 4, "name": "WS", "alias": null, "value": 3.2, "status": 1, "valid": true, "description": null },
                { "id": 6, "name": "WD", "alias": null, "value": 270.0, "status": 1, "valid": true, "description": null },
                { "id": 7, "name": "TD", "alias": null, "value": 14.1, "status": 1, "valid": true, "description": null },
                { "id": 8, "name": "RH", "alias": null, "value": 77.0, "status": 1, "valid": false, "description": null },
                { "id": 10, "name": "Ws10mm", "alias": null, "value": 2.9, "status": 1, "valid": true, "description": null },
                { "id": 11, "name": "Time", "alias": null, "value": 2247.0, "status": 1, "valid": true, "description": null },
                { "id": 12, "name": "BP", "alias": null, "value": 1014.6, "status": 1, "valid": true, "description": null },
                { "id": 13, "name": "Rain_1_min", "alias": null, "value": 0.0, "status": 1, "valid": true, "description": null },
                { "id": 14, "name": "TDmax", "alias": null, "value": 15.2, "status": 1, "valid": true, "description": null },
                { "id": 99, "name": "Mystery", "alias": null, "value": 1.0, "status": 1, "valid": true, "description": null }
            ]
        }]
    }"#;

    #[test]
    fn parses_station_info() {
        let info = parse_station_info(STATION_JSON).expect("station JSON should parse");
        assert_eq!(info.station_id, 178);
        assert_eq!(info.display_name(), "Tel Aviv Coast");
        assert_eq!(info.short_name.as_deref(), Some("TA COAST"));
        assert_eq!(info.monitors.len(), 2);
        assert_eq!(info.monitors[1].name, "TD");
        assert!(info.location.is_some());
    }

    #[test]
    fn parses_latest_reading() {
        let data = parse_latest(178, LATEST_JSON).expect("latest JSON should parse");
        let latest = data.latest.expect("latest reading should be present");

        assert_eq!(latest.rain, Some(0.0));
        assert_eq!(latest.ws, Some(3.2));
        assert_eq!(latest.wd, Some(270.0));
        assert_eq!(latest.td, Some(14.1));
        assert_eq!(latest.ws_10mm, Some(2.9));
        assert_eq!(latest.bp, Some(1014.6));
        assert_eq!(latest.rain_1_min, Some(0.0));
        assert_eq!(latest.td_max, Some(15.2));
        assert_eq!(latest.time, NaiveTime::from_hms_opt(22, 47, 0));
        let datetime = latest.datetime.map(|d| d.to_rfc3339());
        assert_eq!(datetime.as_deref(), Some("2024-01-15T22:50:00+02:00"));
    }

    #[test]
    fn invalid_channels_are_dropped() {
        let data = parse_latest(178, LATEST_JSON).expect("latest JSON should parse");
        assert_eq!(data.latest.and_then(|l| l.rh), None);
    }

    #[test]
    fn empty_body_means_no_reading() {
        let data = parse_latest(42, "  ").expect("empty body is not an error");
        let expected = StationData {
            station_id: 42,
            latest: None,
        };
        assert_eq!(data, expected);

        let data = parse_latest(42, r#"{"stationId": 42, "data": []}"#).expect("should parse");
        assert!(data.latest.is_none());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_latest(1, "{not json").is_err());
        assert!(parse_station_info("[]").is_err());
    }

    #[test]
    fn hhmm_conversion() {
        assert_eq!(hhmm_to_time(0.0), NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(hhmm_to_time(905.0), NaiveTime::from_hms_opt(9, 5, 0));
        assert_eq!(hhmm_to_time(2575.0), None);
        assert_eq!(hhmm_to_time(-1.0), None);
    }

    #[test]
    fn truncate_body_limits_length() {
        let long = "x".repeat(500);
        assert_eq!(truncate_body(&long).len(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
