use anyhow::Result;
use log::info;

use super::config::Config;
use crate::runtime::Runtime;

/// Checks API liveness; fails when the API is unreachable.
#[tracing::instrument(skip(config))]
pub async fn health<R: Runtime>(config: &Config<R>) -> Result<()> {
    info!("Checking health of {}...", config.client.base_url());
    if config.client.health_check().await {
        println!("healthy");
        Ok(())
    } else {
        anyhow::bail!("API at {} is unreachable", config.client.base_url())
    }
}
