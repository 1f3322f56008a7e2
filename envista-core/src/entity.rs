use std::sync::Arc;

use serde::Serialize;

use crate::{
    channel::{Channel, Descriptor},
    coordinator::UpdateCoordinator,
    model::{ChannelValue, StationId},
};

/// One exposed channel of one station.
#[derive(Debug, Clone)]
pub struct SensorEntity {
    station_id: StationId,
    channel: Channel,
    coordinator: Arc<UpdateCoordinator>,
}

/// What a sensor shows at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub unique_id: String,
    pub name: &'static str,
    pub value: Option<ChannelValue>,
    pub unit: Option<&'static str>,
}

impl SensorEntity {
    pub fn new(
        station_id: StationId,
        channel: Channel,
        coordinator: Arc<UpdateCoordinator>,
    ) -> Self {
        Self {
            station_id,
            channel,
            coordinator,
        }
    }

    pub fn unique_id(&self) -> String {
        format!("ims_envista_station_{}_{}", self.station_id, self.channel)
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn descriptor(&self) -> &'static Descriptor {
        self.channel.descriptor()
    }

    /// Current value; static channels read the cached station metadata,
    /// everything else the latest snapshot.
    pub fn native_value(&self) -> Option<ChannelValue> {
        if self.channel.is_static() {
            let info = self.coordinator.cached_station_info(self.station_id)?;
            return self.channel.extract_static(&info);
        }
        let data = self.coordinator.get_latest(self.station_id);
        self.channel.extract(data.as_ref())
    }

    pub fn reading(&self) -> SensorReading {
        let descriptor = self.descriptor();
        SensorReading {
            unique_id: self.unique_id(),
            name: descriptor.name,
            value: self.native_value(),
            unit: descriptor.unit.map(|u| u.symbol()),
        }
    }
}
