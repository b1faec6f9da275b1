use std::time::Duration;

use anyhow::{Context, Result};
use shoppo_catalog::{CatalogClient, CatalogClientConfig};
use tracing::debug;

use crate::config::Config;

pub fn init_catalog_client(config: &Config) -> Result<CatalogClient> {
    let client_config = CatalogClientConfig {
        user_agent: config.user_agent.clone(),
        connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        request_timeout: Duration::from_secs(config.request_timeout_secs),
        cache_capacity_bytes: config.cache_capacity_bytes,
        ..CatalogClientConfig::new(&config.catalog_url)
    };

    debug!(catalog_url = %config.catalog_url, "using catalog client");
    CatalogClient::new(client_config).context("could not create catalog client")
}
