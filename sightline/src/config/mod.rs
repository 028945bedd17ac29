//! Configuration management for sightline
//!
//! Default config location: ~/.sightline/config.toml

mod logging;

pub use logging::{LogFormat, LoggingConfig};

use serde::{Deserialize, Serialize};
use sightline_store::{ElasticsearchConfig, ElasticsearchStore, StoreClient};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::codec::EntryCodec;
use crate::error::{Error, Result};
use crate::index::{IndexManager, IndexSettings, Rotation};
use crate::repository::{EntryRepository, RepositorySettings};

pub const ENV_ES_URL: &str = "SIGHTLINE_ES_URL";
pub const ENV_ES_USERNAME: &str = "SIGHTLINE_ES_USERNAME";
pub const ENV_ES_PASSWORD: &str = "SIGHTLINE_ES_PASSWORD";
pub const ENV_ES_API_KEY: &str = "SIGHTLINE_ES_API_KEY";

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub index: IndexSettings,
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `~/.sightline/config.toml`, or `./.sightline/config.toml` without a home directory.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sightline")
        .join("config.toml")
}

/// Expand tilde in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Load config from default location (~/.sightline/config.toml)
    pub fn load() -> Result<Self> {
        Self::load_from(&default_config_path())
    }

    /// Load config from a file; defaults when the file does not exist.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_path = expand_tilde(config_path)?;
        let mut config = if config_path.exists() {
            Self::parse(&fs::read_to_string(&config_path)?)?
        } else {
            Config::default()
        };
        config.finish(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load config, writing the defaults first if the file does not exist.
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        let config_path = expand_tilde(config_path)?;
        if !config_path.exists() {
            Config::default().save(&config_path)?;
        }
        Self::load_from(&config_path)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides, expand paths and validate.
    pub fn finish(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        self.apply_env_overrides(env);
        self.expand_paths()?;
        self.validate()
    }

    /// Override connection settings from `SIGHTLINE_ES_*` variables.
    pub fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        let es = &mut self.elasticsearch;
        if let Some(url) = env(ENV_ES_URL) {
            es.url = url;
        }
        if let Some(username) = env(ENV_ES_USERNAME) {
            es.username = Some(username);
        }
        if let Some(password) = env(ENV_ES_PASSWORD) {
            es.password = Some(password);
        }
        if let Some(api_key) = env(ENV_ES_API_KEY) {
            es.api_key = Some(api_key);
        }
    }

    fn expand_paths(&mut self) -> Result<()> {
        if let Some(ref f) = self.logging.file {
            self.logging.file = Some(expand_tilde(f)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.elasticsearch.validate()?;

        if self.index.alias.is_empty() || self.index.prefix.is_empty() {
            return Err(Error::Config(
                "index.alias and index.prefix must not be empty".to_string(),
            ));
        }
        if self.index.rotation == Rotation::None && self.index.alias == self.index.prefix {
            return Err(Error::Config(format!(
                "index.alias and index.prefix are both '{}'; an alias cannot share its index's name",
                self.index.alias
            )));
        }
        if self.repository.default_limit == 0 || self.repository.occurrence_scan_limit == 0 {
            return Err(Error::Config(
                "repository limits must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Elasticsearch client for the configured cluster.
    pub fn create_store(&self) -> Result<Arc<dyn StoreClient>> {
        Ok(Arc::new(ElasticsearchStore::new(&self.elasticsearch)?))
    }

    pub fn index_manager(&self, store: Arc<dyn StoreClient>) -> IndexManager {
        IndexManager::new(store, self.index.clone())
    }

    /// Repository wired to `store` with the configured index and limits.
    pub fn repository(&self, store: Arc<dyn StoreClient>) -> EntryRepository {
        let indices = Arc::new(self.index_manager(store.clone()));
        EntryRepository::new(store, indices, EntryCodec::new())
            .with_settings(self.repository.clone())
    }
}
