use crate::{
    Config,
    client::envista::EnvistaClient,
    error::EnvistaError,
    model::{StationData, StationId, StationInfo},
};
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

pub mod envista;

/// Source of station readings and metadata.
#[async_trait]
pub trait StationClient: Send + Sync + Debug {
    /// Latest snapshot for a station.
    async fn fetch_latest(&self, station_id: StationId) -> Result<StationData, EnvistaError>;

    /// Static metadata for a station. Fails with
    /// [`EnvistaError::InvalidStation`] when the id is unknown.
    async fn fetch_station_info(&self, station_id: StationId) -> Result<StationInfo, EnvistaError>;
}

/// Construct the HTTP client from config.
pub fn client_from_config(config: &Config) -> anyhow::Result<Arc<dyn StationClient>> {
    let token = config.api_token().ok_or_else(|| {
        anyhow::anyhow!(
            "No API token configured.\n\
                 Hint: run `envista configure` and enter your IMS API token."
        )
    })?;

    let client: Arc<dyn StationClient> = match config.api_url.as_deref() {
        Some(url) => Arc::new(EnvistaClient::with_base_url(token.to_owned(), url.to_owned())),
        None => Arc::new(EnvistaClient::new(token.to_owned())),
    };

    Ok(client)
}
