use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::{env, fs};

use anyhow::{Context, Result};
use config::{Config as HierarchicalConfig, Environment};
use serde::{Deserialize, Serialize};
use shoppo_catalog::{DEFAULT_CACHE_CAPACITY_BYTES, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use shoppo_sdk::models::search::DEFAULT_MAX_HISTORY;
use tracing::debug;

/// Name of shoppo managed directories (config, data)
const SHOPPO_DIR_NAME: &str = "shoppo";
const SHOPPO_CONFIG_DIR_VAR: &str = "SHOPPO_CONFIG_DIR";
const SHOPPO_ENV_PREFIX: &str = "SHOPPO_";
pub const SHOPPO_CONFIG_FILE: &str = "shoppo.toml";
pub const DEFAULT_CATALOG_URL: &str = "https://www.shoppo.co.nz/app/";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the catalog API
    pub catalog_url: String,
    /// Bound of the in-memory response cache in bytes
    pub cache_capacity_bytes: usize,
    /// How many previous searches `back` can return to
    pub max_history: usize,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// `User-Agent` sent to the catalog
    pub user_agent: Option<String>,
    /// Directory where favorites and preferences are stored (default:
    /// `$DATA_DIR/shoppo`)
    pub data_dir: PathBuf,
    /// Directory the configuration file is read from (default:
    /// `$CONFIG_DIR/shoppo`)
    pub config_dir: PathBuf,
}

impl Config {
    /// Creates a [Config] from defaults, the config file and `SHOPPO_*` variables
    pub fn parse() -> Result<Config> {
        let config_dir = match env::var(SHOPPO_CONFIG_DIR_VAR) {
            Ok(v) => {
                debug!("`${SHOPPO_CONFIG_DIR_VAR}` set: {v}");
                PathBuf::from(v)
            },
            Err(_) => dirs::config_dir()
                .context("Could not determine config directory")?
                .join(SHOPPO_DIR_NAME),
        };
        let data_dir = dirs::data_dir()
            .context("Could not determine data directory")?
            .join(SHOPPO_DIR_NAME);

        Self::parse_in(&config_dir, &data_dir, env::vars())
    }

    fn parse_in(
        config_dir: &Path,
        default_data_dir: &Path,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Config> {
        fs::create_dir_all(config_dir)
            .with_context(|| format!("Could not create config directory: {config_dir:?}"))?;

        let builder = HierarchicalConfig::builder()
            .set_default("catalog_url", DEFAULT_CATALOG_URL)?
            .set_default("cache_capacity_bytes", DEFAULT_CACHE_CAPACITY_BYTES as u64)?
            .set_default("max_history", DEFAULT_MAX_HISTORY as u64)?
            .set_default("connect_timeout_secs", DEFAULT_CONNECT_TIMEOUT.as_secs())?
            .set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT.as_secs())?
            .set_default("data_dir", default_data_dir.to_string_lossy().as_ref())?
            // the config file cannot change the config dir
            .set_override("config_dir", config_dir.to_string_lossy().as_ref())?
            .add_source(
                config::File::from(config_dir.join(SHOPPO_CONFIG_FILE))
                    .format(config::FileFormat::Toml)
                    .required(false),
            );

        // override via env variables
        let shoppo_envs = vars
            .into_iter()
            .filter(|(k, _)| k != SHOPPO_CONFIG_DIR_VAR)
            .filter_map(|(k, v)| {
                k.strip_prefix(SHOPPO_ENV_PREFIX)
                    .map(|k| (k.to_lowercase(), v))
            })
            .collect::<HashMap<_, _>>();

        let config = builder
            .add_source(
                Environment::default()
                    .source(Some(shoppo_envs))
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
            .context("Could not parse config")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let config = Config::parse_in(dir.path(), &data_dir, vec![]).unwrap();

        assert_eq!(config.catalog_url, DEFAULT_CATALOG_URL);
        assert_eq!(config.cache_capacity_bytes, 50 * 1024 * 1024);
        assert_eq!(config.max_history, 50);
        assert_eq!(config.connect_timeout_secs, 15);
        assert_eq!(config.request_timeout_secs, 60);
        assert_eq!(config.user_agent, None);
        assert_eq!(config.data_dir, data_dir);
    }

    #[test]
    fn file_overrides_defaults_and_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(SHOPPO_CONFIG_FILE),
            indoc::indoc! {r#"
                catalog_url = "http://localhost:8080/app/"
                max_history = 10
                user_agent = "shoppo-test"
            "#},
        )
        .unwrap();

        let config = Config::parse_in(
            dir.path(),
            dir.path(),
            vars(&[("SHOPPO_MAX_HISTORY", "3"), ("OTHER_MAX_HISTORY", "99")]),
        )
        .unwrap();

        assert_eq!(config.catalog_url, "http://localhost:8080/app/");
        assert_eq!(config.user_agent.as_deref(), Some("shoppo-test"));
        assert_eq!(config.max_history, 3);
    }

    #[test]
    fn config_dir_cannot_be_overridden() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SHOPPO_CONFIG_FILE), "config_dir = \"/elsewhere\"\n").unwrap();

        let config = Config::parse_in(dir.path(), dir.path(), vec![]).unwrap();
        assert_eq!(config.config_dir, dir.path());
    }

    #[test]
    fn invalid_values_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::parse_in(
            dir.path(),
            dir.path(),
            vars(&[("SHOPPO_MAX_HISTORY", "lots")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn config_dir_is_read_from_environment() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SHOPPO_CONFIG_FILE), "max_history = 4\n").unwrap();

        temp_env::with_vars(
            [
                (SHOPPO_CONFIG_DIR_VAR, Some(dir.path().as_os_str())),
                ("SHOPPO_MAX_HISTORY", None),
            ],
            || {
                let config = Config::parse().unwrap();
                assert_eq!(config.config_dir, dir.path());
                assert_eq!(config.max_history, 4);
            },
        );
    }
}
