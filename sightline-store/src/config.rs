//! Elasticsearch connection configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, StoreError};

/// When writes become visible to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Return as soon as the write is accepted
    False,
    /// Force a refresh of the affected shards
    True,
    /// Block until the next scheduled refresh makes the write visible
    #[default]
    WaitFor,
}

impl RefreshPolicy {
    /// Value of the `refresh` query parameter.
    pub fn as_param(&self) -> &'static str {
        match self {
            RefreshPolicy::False => "false",
            RefreshPolicy::True => "true",
            RefreshPolicy::WaitFor => "wait_for",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ElasticsearchConfig {
    /// Base URL of the cluster, e.g. `http://localhost:9200`
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Base64 `id:key` API key; takes precedence over basic auth
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Retries for transient failures, with exponential backoff
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub refresh: RefreshPolicy,
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            api_key: None,
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_retries: default_max_retries(),
            refresh: RefreshPolicy::default(),
        }
    }
}

impl ElasticsearchConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Check that the URL parses and uses http or https.
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.url)
            .map_err(|e| StoreError::Config(format!("invalid url {}: {}", self.url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(StoreError::Config(format!(
                "invalid url {}: scheme must be http or https",
                self.url
            )));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(StoreError::Config(
                "password is set without a username".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ElasticsearchConfig::default();
        assert_eq!(config.url, "http://localhost:9200");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.refresh, RefreshPolicy::WaitFor);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        assert!(ElasticsearchConfig::new("not a url").validate().is_err());
        assert!(ElasticsearchConfig::new("ftp://es:21").validate().is_err());
        assert!(ElasticsearchConfig::new("https://es.internal:9243")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_password_requires_username() {
        let mut config = ElasticsearchConfig::default();
        config.password = Some("secret".to_string());
        assert!(config.validate().is_err());
        config.username = Some("elastic".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_refresh_policy_param() {
        assert_eq!(RefreshPolicy::False.as_param(), "false");
        assert_eq!(RefreshPolicy::WaitFor.as_param(), "wait_for");
        let parsed: RefreshPolicy = serde_json::from_str("\"true\"").unwrap();
        assert_eq!(parsed, RefreshPolicy::True);
    }
}
