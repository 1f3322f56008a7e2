//! Core library for the `envista` station poller.
//!
//! This crate defines:
//! - Configuration handling
//! - The IMS Envista station client and its trait seam
//! - The update coordinator owning the periodic refresh cycle
//! - The channel mapping table, sensor entities and the derived weather entity
//!
//! It is used by `envista-cli`, but can also be embedded in other services.

pub mod channel;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod model;
pub mod setup;
pub mod weather;

pub use channel::{Channel, Descriptor, Unit, validate_conditions};
pub use client::StationClient;
pub use config::{Config, StationConfig};
pub use coordinator::{RefreshOutcome, RefreshReport, UpdateCoordinator};
pub use entity::SensorEntity;
pub use error::EnvistaError;
pub use model::{ChannelValue, CoordinatorData, StationData, StationId, StationInfo, StationReading};
pub use setup::{Setup, StationEntities, setup};
pub use weather::{WeatherCondition, WeatherEntity, WeatherState, derive_condition};
