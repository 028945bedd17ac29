//! Index Manager: concrete indices behind a stable alias.
//!
//! Entries are written through an alias that points at one write index
//! (`{prefix}-YYYY.MM.DD` under daily rotation) and at every older concrete
//! index as read targets, so rotation never hides historical data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sightline_store::{AliasAction, StoreClient, StoreError};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::codec::ENGINE_DATE_FORMAT;
use crate::error::Result;

/// How concrete index names are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    /// One concrete index per calendar day (UTC)
    #[default]
    Daily,
    /// A single concrete index named by the prefix
    None,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IndexSettings {
    /// Alias every read and write goes through
    #[serde(default = "default_alias")]
    pub alias: String,
    /// Concrete index name prefix
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default)]
    pub shards: Option<u32>,
    #[serde(default)]
    pub replicas: Option<u32>,
}

fn default_alias() -> String {
    "sightline".to_string()
}

fn default_prefix() -> String {
    "sightline_entries".to_string()
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            alias: default_alias(),
            prefix: default_prefix(),
            rotation: Rotation::default(),
            shards: None,
            replicas: None,
        }
    }
}

/// Fixed entry mapping.
pub fn entry_mapping() -> Value {
    json!({
        "_source": {"enabled": true},
        "properties": {
            "uuid": {"type": "keyword"},
            "batch_id": {"type": "keyword"},
            "family_hash": {"type": "keyword"},
            "should_display_on_index": {"type": "boolean", "null_value": true},
            "type": {"type": "keyword"},
            "content": {"type": "object", "dynamic": false},
            "tags": {
                "type": "nested",
                "dynamic": false,
                "properties": {
                    "raw": {"type": "keyword"},
                    "name": {"type": "keyword"},
                    "value": {"type": "keyword"}
                }
            },
            "created_at": {"type": "date", "format": ENGINE_DATE_FORMAT},
            "@timestamp": {"type": "date"}
        }
    })
}

/// Outcome of [`IndexManager::rotate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationResult {
    /// The alias's write index after rotation
    pub write_index: String,
    /// Whether the write index had to be created
    pub created: bool,
    /// Older indices kept bound as read targets
    pub read_indices: Vec<String>,
}

/// Owns index creation, alias bindings and deletion.
pub struct IndexManager {
    store: Arc<dyn StoreClient>,
    settings: IndexSettings,
}

impl std::fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl IndexManager {
    pub fn new(store: Arc<dyn StoreClient>, settings: IndexSettings) -> Self {
        Self { store, settings }
    }

    pub fn alias(&self) -> &str {
        &self.settings.alias
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// Concrete index name for writes made at `at`.
    pub fn index_name_at(&self, at: DateTime<Utc>) -> String {
        match self.settings.rotation {
            Rotation::Daily => format!("{}-{}", self.settings.prefix, at.format("%Y.%m.%d")),
            Rotation::None => self.settings.prefix.clone(),
        }
    }

    pub fn current_index(&self) -> String {
        self.index_name_at(Utc::now())
    }

    /// Create body: optional shard settings plus the entry mapping.
    pub fn index_body(&self) -> Value {
        let mut body = Map::new();
        let mut index = Map::new();
        if let Some(shards) = self.settings.shards {
            index.insert("number_of_shards".to_string(), json!(shards));
        }
        if let Some(replicas) = self.settings.replicas {
            index.insert("number_of_replicas".to_string(), json!(replicas));
        }
        if !index.is_empty() {
            body.insert("settings".to_string(), json!({ "index": index }));
        }
        body.insert("mappings".to_string(), entry_mapping());
        Value::Object(body)
    }

    /// Create the current index bound as write index, unless the alias exists.
    pub async fn ensure_exists(&self) -> Result<()> {
        self.ensure_exists_at(Utc::now()).await
    }

    #[instrument(skip(self), fields(alias = %self.settings.alias))]
    pub async fn ensure_exists_at(&self, now: DateTime<Utc>) -> Result<()> {
        if self.store.index_exists(&self.settings.alias).await? {
            debug!("alias already present");
            return Ok(());
        }

        let index = self.index_name_at(now);
        let mut body = self.index_body();
        if let Some(obj) = body.as_object_mut() {
            let mut aliases = Map::new();
            aliases.insert(
                self.settings.alias.clone(),
                json!({"is_write_index": true}),
            );
            obj.insert("aliases".to_string(), Value::Object(aliases));
        }

        match self.store.create_index(&index, &body).await {
            Ok(()) => {
                info!(index = %index, "created entry index");
                Ok(())
            }
            Err(StoreError::IndexAlreadyExists(_)) => {
                // Created concurrently, or left unbound; bind it either way.
                debug!(index = %index, "index already exists, binding alias");
                self.store
                    .update_aliases(&[AliasAction::add(
                        &index,
                        &self.settings.alias,
                        Some(true),
                    )])
                    .await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ensure the alias exists and return the write index name.
    #[instrument(skip(self))]
    pub async fn install(&self) -> Result<String> {
        self.ensure_exists().await?;
        let targets = self.targets().await?;
        let current = self.current_index();
        Ok(if targets.contains(&current) {
            current
        } else {
            targets.last().cloned().unwrap_or(current)
        })
    }

    /// Detach and drop every index bound to the alias.
    ///
    /// Returns the dropped index names; empty when nothing was bound.
    #[instrument(skip(self), fields(alias = %self.settings.alias))]
    pub async fn uninstall(&self) -> Result<Vec<String>> {
        let targets = self.targets().await?;
        for index in &targets {
            self.delete_alias_binding(&self.settings.alias, index).await?;
            self.drop_index(index).await?;
        }
        info!(dropped = targets.len(), "uninstalled entry indices");
        Ok(targets)
    }

    pub async fn rotate(&self) -> Result<RotationResult> {
        self.rotate_at(Utc::now()).await
    }

    /// Make the index for `now` the write index, keeping older ones as read targets.
    #[instrument(skip(self), fields(alias = %self.settings.alias))]
    pub async fn rotate_at(&self, now: DateTime<Utc>) -> Result<RotationResult> {
        let write_index = self.index_name_at(now);
        let existing = self.targets().await?;

        let created = match self.store.create_index(&write_index, &self.index_body()).await {
            Ok(()) => true,
            Err(StoreError::IndexAlreadyExists(_)) => false,
            Err(e) => return Err(e.into()),
        };

        let read_indices: Vec<String> = existing
            .into_iter()
            .filter(|index| *index != write_index)
            .collect();

        let mut actions = vec![AliasAction::add(
            &write_index,
            &self.settings.alias,
            Some(true),
        )];
        actions.extend(
            read_indices
                .iter()
                .map(|index| AliasAction::add(index, &self.settings.alias, Some(false))),
        );
        self.store.update_aliases(&actions).await?;

        info!(
            write_index = %write_index,
            created,
            read_indices = read_indices.len(),
            "rotated entry index"
        );

        Ok(RotationResult {
            write_index,
            created,
            read_indices,
        })
    }

    /// Concrete indices bound to the alias, sorted.
    pub async fn targets(&self) -> Result<Vec<String>> {
        let mut targets = self.store.alias_targets(&self.settings.alias).await?;
        targets.sort();
        Ok(targets)
    }

    /// Delete one concrete index; `IndexNotFound` if it does not exist.
    #[instrument(skip(self))]
    pub async fn drop_index(&self, index: &str) -> Result<()> {
        self.store.delete_index(index).await?;
        info!(index = %index, "dropped index");
        Ok(())
    }

    /// Detach `index` from `alias`.
    #[instrument(skip(self))]
    pub async fn delete_alias_binding(&self, alias: &str, index: &str) -> Result<()> {
        self.store
            .update_aliases(&[AliasAction::remove(index, alias)])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sightline_store::MemoryStore;

    fn manager(settings: IndexSettings) -> IndexManager {
        IndexManager::new(Arc::new(MemoryStore::new()), settings)
    }

    #[test]
    fn test_index_names() {
        let at = Utc.with_ymd_and_hms(2024, 2, 9, 23, 59, 59).unwrap();
        let daily = manager(IndexSettings::default());
        assert_eq!(daily.index_name_at(at), "sightline_entries-2024.02.09");

        let single = manager(IndexSettings {
            rotation: Rotation::None,
            ..IndexSettings::default()
        });
        assert_eq!(single.index_name_at(at), "sightline_entries");
    }

    #[test]
    fn test_index_body_settings() {
        let plain = manager(IndexSettings::default()).index_body();
        assert!(plain.get("settings").is_none());
        assert_eq!(
            plain["mappings"]["properties"]["tags"]["type"],
            json!("nested")
        );
        assert_eq!(
            plain["mappings"]["properties"]["created_at"]["format"],
            json!("yyyy-MM-dd HH:mm:ss")
        );

        let sized = manager(IndexSettings {
            shards: Some(3),
            replicas: Some(0),
            ..IndexSettings::default()
        })
        .index_body();
        assert_eq!(sized["settings"]["index"]["number_of_shards"], json!(3));
        assert_eq!(sized["settings"]["index"]["number_of_replicas"], json!(0));
    }

    #[test]
    fn test_rotation_deserialize() {
        let settings: IndexSettings = toml::from_str("rotation = \"none\"").unwrap();
        assert_eq!(settings.rotation, Rotation::None);
        assert_eq!(settings.alias, "sightline");
    }
}
