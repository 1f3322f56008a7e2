use std::time::Duration;

use thiserror::Error;

use crate::model::StationId;

/// Errors surfaced by the station client, the coordinator and setup.
///
/// Missing channel values are not errors; extraction yields `None` instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvistaError {
    /// Bad token, unknown condition name or otherwise unusable settings.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Station {0} is not known to the IMS Envista API")]
    InvalidStation(StationId),

    /// Network or upstream failure for a single station.
    #[error("Failed to fetch data for station {station_id}: {message}")]
    TransientFetch {
        station_id: StationId,
        message: String,
    },

    #[error("Fetch for station {station_id} timed out after {after:?}")]
    Timeout {
        station_id: StationId,
        after: Duration,
    },

    #[error("No registered station returned data during the first refresh")]
    NotReady,
}

impl EnvistaError {
    /// True for failures that only affect the current refresh cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFetch { .. } | Self::Timeout { .. })
    }
}
