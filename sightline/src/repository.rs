//! Entry Repository: the storage contract the profiler talks to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sightline_store::{BulkDocument, EsQuery, Hit, StoreClient, StoreError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::codec::EntryCodec;
use crate::entry::{Entry, EntryType, EntryUpdate, QueryOptions};
use crate::error::{Error, Result};
use crate::index::IndexManager;
use crate::monitoring::{MonitoringSource, NoMonitoring};
use crate::query::{self, DEFAULT_OCCURRENCE_SCAN_LIMIT};

/// Storage operations for captured entries.
#[async_trait]
pub trait EntriesRepository: Send + Sync {
    /// Entry with the given uuid; `EntryNotFound` if absent.
    async fn find(&self, uuid: &str) -> Result<Entry>;

    /// Newest-first entries matching `options`, optionally of one type.
    async fn list(&self, entry_type: Option<EntryType>, options: &QueryOptions)
        -> Result<Vec<Entry>>;

    /// Write a batch, counting and hiding earlier exception occurrences.
    async fn store(&self, entries: Vec<Entry>) -> Result<()>;

    /// Apply post-hoc updates; updates for unknown entries are skipped.
    async fn update(&self, updates: Vec<EntryUpdate>) -> Result<()>;

    async fn is_monitoring(&self, tags: &[String]) -> bool;

    async fn monitor(&self, tags: &[String]) -> Result<()>;

    async fn stop_monitoring(&self, tags: &[String]) -> Result<()>;

    async fn monitoring(&self) -> Vec<String>;

    /// Delete entries created strictly before `before`; returns the count.
    async fn prune(&self, before: DateTime<Utc>) -> Result<u64>;

    /// Delete every entry.
    async fn clear(&self) -> Result<()>;

    /// End of a lifecycle: forget cached monitoring state.
    async fn terminate(&self);
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RepositorySettings {
    /// Page size when callers do not pick one
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Cap on prior occurrences read per exception family
    #[serde(default = "default_occurrence_scan_limit")]
    pub occurrence_scan_limit: usize,
}

fn default_limit() -> usize {
    crate::entry::DEFAULT_LIMIT
}

fn default_occurrence_scan_limit() -> usize {
    DEFAULT_OCCURRENCE_SCAN_LIMIT
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            occurrence_scan_limit: default_occurrence_scan_limit(),
        }
    }
}

/// Prior occurrences of one exception family.
struct FamilyScan {
    total: u64,
    hits: Vec<Hit>,
}

/// [`EntriesRepository`] backed by a [`StoreClient`].
///
/// One instance serves one logical lifecycle; the monitored-tag cache is
/// instance-local.
pub struct EntryRepository {
    store: Arc<dyn StoreClient>,
    indices: Arc<IndexManager>,
    codec: EntryCodec,
    monitoring_source: Arc<dyn MonitoringSource>,
    settings: RepositorySettings,
    index_ready: AtomicBool,
    monitored: RwLock<Option<Vec<String>>>,
}

impl std::fmt::Debug for EntryRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryRepository")
            .field("alias", &self.indices.alias())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl EntryRepository {
    pub fn new(store: Arc<dyn StoreClient>, indices: Arc<IndexManager>, codec: EntryCodec) -> Self {
        Self {
            store,
            indices,
            codec,
            monitoring_source: Arc::new(NoMonitoring),
            settings: RepositorySettings::default(),
            index_ready: AtomicBool::new(false),
            monitored: RwLock::new(None),
        }
    }

    pub fn with_monitoring_source(mut self, source: Arc<dyn MonitoringSource>) -> Self {
        self.monitoring_source = source;
        self
    }

    pub fn with_settings(mut self, settings: RepositorySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &RepositorySettings {
        &self.settings
    }

    /// Listing options with the configured default page size.
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions::new().limit(self.settings.default_limit)
    }

    fn alias(&self) -> &str {
        self.indices.alias()
    }

    /// Document for a new entry, written through the alias.
    fn new_document(&self, entry: &Entry) -> Result<BulkDocument> {
        Ok(BulkDocument {
            index: self.alias().to_string(),
            id: entry.uuid.clone(),
            source: self.codec.to_source(entry)?,
            require_alias: true,
        })
    }

    /// Document rewriting an existing entry in the index it was read from.
    ///
    /// Entries in the current write index go through the alias, so a dropped
    /// index is recreated with its mapping rather than auto-created.
    fn rewrite_document(&self, index: &str, entry: &Entry) -> Result<BulkDocument> {
        if index == self.indices.current_index() {
            return self.new_document(entry);
        }
        Ok(BulkDocument {
            index: index.to_string(),
            id: entry.uuid.clone(),
            source: self.codec.to_source(entry)?,
            require_alias: false,
        })
    }

    /// Prior exceptions of `family`; `None` when the scan fails.
    async fn scan_family(&self, family: &str) -> Option<FamilyScan> {
        let request = query::occurrence_request(family, self.settings.occurrence_scan_limit);
        match self.store.search(self.alias(), &request).await {
            Ok(response) => Some(FamilyScan {
                total: response.total(),
                hits: response.hits.hits,
            }),
            Err(StoreError::IndexNotFound(_)) => Some(FamilyScan {
                total: 0,
                hits: Vec::new(),
            }),
            Err(e) => {
                warn!(family_hash = %family, error = %e, "occurrence scan failed; storing without count");
                None
            }
        }
    }

    /// Count occurrences for each exception and stage hidden rewrites of priors.
    async fn stage_exceptions(&self, exceptions: &mut [Entry]) -> Result<Vec<BulkDocument>> {
        let batch_uuids: HashSet<String> = exceptions.iter().map(|e| e.uuid.clone()).collect();
        let mut scans: HashMap<String, Option<FamilyScan>> = HashMap::new();
        let mut earlier: HashMap<String, Vec<usize>> = HashMap::new();
        let mut staged_priors: HashSet<(String, String)> = HashSet::new();
        let mut rewrites = Vec::new();

        for i in 0..exceptions.len() {
            let Some(family) = exceptions[i].family().map(str::to_string) else {
                continue;
            };

            if !scans.contains_key(&family) {
                let scan = self.scan_family(&family).await;
                scans.insert(family.clone(), scan);
            }
            let in_batch = earlier.get(&family).map(Vec::len).unwrap_or(0);

            if let Some(Some(scan)) = scans.get(&family) {
                let mut prior_total = scan.total;
                for hit in &scan.hits {
                    if batch_uuids.contains(&hit.id) {
                        prior_total = prior_total.saturating_sub(1);
                        continue;
                    }
                    if !staged_priors.insert((hit.index.clone(), hit.id.clone())) {
                        continue;
                    }
                    let mut prior = match self.codec.decode(hit) {
                        Ok(prior) => prior,
                        Err(e) => {
                            warn!(id = %hit.id, error = %e, "skipping malformed prior occurrence");
                            continue;
                        }
                    };
                    if !prior.should_display_on_index {
                        continue;
                    }
                    prior.should_display_on_index = false;
                    rewrites.push(self.rewrite_document(&hit.index, &prior)?);
                }

                let occurrences = prior_total + in_batch as u64 + 1;
                match exceptions[i].content.as_object_mut() {
                    Some(content) => {
                        content.insert("occurrences".to_string(), Value::from(occurrences));
                    }
                    None => warn!(uuid = %exceptions[i].uuid, "exception content is not an object; occurrences not recorded"),
                }
                metrics::counter!("sightline_exception_occurrences_total").increment(1);
                debug!(family_hash = %family, occurrences, "counted exception occurrences");
            }

            let earlier_indices = earlier.entry(family).or_default();
            for &j in earlier_indices.iter() {
                exceptions[j].should_display_on_index = false;
            }
            earlier_indices.push(i);
        }

        Ok(rewrites)
    }

    /// Submit one bulk request, creating the index on first use or when missing.
    async fn write(&self, documents: Vec<BulkDocument>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        if !self.index_ready.load(Ordering::Acquire) {
            self.indices.ensure_exists().await?;
            self.index_ready.store(true, Ordering::Release);
        }

        let rewrites: HashSet<(String, String)> = documents
            .iter()
            .filter(|doc| !doc.require_alias)
            .map(|doc| (doc.index.clone(), doc.id.clone()))
            .collect();

        let response = match self.store.bulk(documents.clone()).await {
            Ok(response) => response,
            Err(StoreError::IndexNotFound(index)) => {
                warn!(index = %index, "index missing during write; recreating and retrying");
                self.indices.ensure_exists().await?;
                self.store.bulk(documents).await?
            }
            Err(e) => return Err(e.into()),
        };

        let failed = response.failed_items().count();
        if failed > 0 {
            warn!(failed, total = response.items.len(), "bulk write had item failures");
        }

        for item in response.items.iter().filter_map(|item| item.result()) {
            if item.result.as_deref() == Some("created")
                && rewrites.contains(&(item.index.clone(), item.id.clone()))
            {
                warn!(
                    index = %item.index,
                    uuid = %item.id,
                    "rewrite created its document; the index was dropped and recreated without the entry mapping"
                );
            }
        }
        Ok(())
    }

    async fn monitored_tags(&self) -> Vec<String> {
        let cached = self.monitored.read().clone();
        if let Some(tags) = cached {
            return tags;
        }

        let loaded = match self.monitoring_source.load().await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(error = %e, "failed to load monitored tags");
                Vec::new()
            }
        };
        *self.monitored.write() = Some(loaded.clone());
        loaded
    }

    fn invalidate_monitoring(&self) {
        *self.monitored.write() = None;
    }
}

fn unique(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

fn merge_content(content: &mut Value, changes: &Map<String, Value>) {
    if changes.is_empty() {
        return;
    }
    match content.as_object_mut() {
        Some(object) => {
            for (key, value) in changes {
                object.insert(key.clone(), value.clone());
            }
        }
        None => *content = Value::Object(changes.clone()),
    }
}

#[async_trait]
impl EntriesRepository for EntryRepository {
    #[instrument(skip(self))]
    async fn find(&self, uuid: &str) -> Result<Entry> {
        let response = match self.store.search(self.alias(), &query::find_request(uuid)).await {
            Ok(response) => response,
            Err(StoreError::IndexNotFound(_)) => return Err(Error::EntryNotFound(uuid.to_string())),
            Err(e) => return Err(e.into()),
        };
        let hit = response
            .hits
            .hits
            .first()
            .ok_or_else(|| Error::EntryNotFound(uuid.to_string()))?;
        self.codec.decode(hit)
    }

    #[instrument(skip(self, options), fields(limit = options.limit))]
    async fn list(
        &self,
        entry_type: Option<EntryType>,
        options: &QueryOptions,
    ) -> Result<Vec<Entry>> {
        let request = query::list_request(entry_type, options);
        let response = match self.store.search(self.alias(), &request).await {
            Ok(response) => response,
            Err(StoreError::IndexNotFound(_)) => {
                debug!("index missing; empty listing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let entries = response
            .hits
            .hits
            .iter()
            .filter_map(|hit| match self.codec.decode(hit) {
                Ok(entry) if entry.content.is_object() => Some(entry),
                Ok(entry) => {
                    debug!(uuid = %entry.uuid, "skipping entry with non-object content");
                    None
                }
                Err(e) => {
                    warn!(id = %hit.id, error = %e, "skipping malformed document");
                    None
                }
            })
            .collect();
        Ok(entries)
    }

    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn store(&self, entries: Vec<Entry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let (mut exceptions, plain): (Vec<Entry>, Vec<Entry>) =
            entries.into_iter().partition(Entry::is_exception);

        let rewrites = self.stage_exceptions(&mut exceptions).await?;

        let mut documents = Vec::with_capacity(plain.len() + exceptions.len() + rewrites.len());
        for entry in plain.iter().chain(exceptions.iter()) {
            documents.push(self.new_document(entry)?);
        }
        let stored = documents.len();
        let hidden = rewrites.len();
        documents.extend(rewrites);

        self.write(documents).await?;

        metrics::counter!("sightline_entries_stored_total").increment(stored as u64);
        debug!(stored, hidden, "stored entries");
        Ok(())
    }

    #[instrument(skip(self, updates), fields(count = updates.len()))]
    async fn update(&self, updates: Vec<EntryUpdate>) -> Result<()> {
        // Later updates to the same entry apply on top of earlier ones.
        let mut staged: Vec<(String, Entry)> = Vec::new();
        let mut positions: HashMap<(String, EntryType), usize> = HashMap::new();

        for update in updates {
            let key = (update.uuid.clone(), update.entry_type);
            let position = match positions.get(&key) {
                Some(&position) => position,
                None => {
                    let request = query::lookup_request(&update.uuid, update.entry_type);
                    let response = match self.store.search(self.alias(), &request).await {
                        Ok(response) => response,
                        Err(StoreError::IndexNotFound(_)) => {
                            debug!("index missing; nothing to update");
                            return Ok(());
                        }
                        Err(e) => return Err(e.into()),
                    };

                    let Some(hit) = response.hits.hits.first() else {
                        debug!(uuid = %update.uuid, "update target not found; skipping");
                        continue;
                    };

                    let entry = match self.codec.decode(hit) {
                        Ok(entry) => entry,
                        Err(e) => {
                            warn!(uuid = %update.uuid, error = %e, "update target is malformed; skipping");
                            continue;
                        }
                    };

                    staged.push((hit.index.clone(), entry));
                    positions.insert(key, staged.len() - 1);
                    staged.len() - 1
                }
            };

            let (_, entry) = &mut staged[position];
            merge_content(&mut entry.content, &update.changes);
            update.tags_changes.apply(&mut entry.tags);
        }

        let documents = staged
            .iter()
            .map(|(index, entry)| self.rewrite_document(index, entry))
            .collect::<Result<Vec<_>>>()?;

        let updated = documents.len();
        self.write(documents).await?;
        metrics::counter!("sightline_entries_updated_total").increment(updated as u64);
        Ok(())
    }

    async fn is_monitoring(&self, tags: &[String]) -> bool {
        if tags.is_empty() {
            return false;
        }
        self.monitored_tags()
            .await
            .iter()
            .any(|watched| tags.contains(watched))
    }

    #[instrument(skip(self))]
    async fn monitor(&self, tags: &[String]) -> Result<()> {
        let current = self.monitored_tags().await;
        let added = unique(tags.iter().filter(|t| !current.contains(t)).cloned());
        if added.is_empty() {
            return Ok(());
        }
        self.monitoring_source.add(&added).await?;
        self.invalidate_monitoring();
        info!(tags = ?added, "monitoring tags");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop_monitoring(&self, tags: &[String]) -> Result<()> {
        let current = self.monitored_tags().await;
        let removed = unique(tags.iter().filter(|t| current.contains(t)).cloned());
        if removed.is_empty() {
            return Ok(());
        }
        self.monitoring_source.remove(&removed).await?;
        self.invalidate_monitoring();
        info!(tags = ?removed, "stopped monitoring tags");
        Ok(())
    }

    async fn monitoring(&self) -> Vec<String> {
        self.monitored_tags().await
    }

    #[instrument(skip(self))]
    async fn prune(&self, before: DateTime<Utc>) -> Result<u64> {
        let query = query::created_before(&before);
        let deleted = match self.store.delete_by_query(self.alias(), &query).await {
            Ok(response) => response.deleted_count(),
            Err(StoreError::IndexNotFound(_)) => 0,
            Err(e) => return Err(e.into()),
        };
        metrics::counter!("sightline_entries_pruned_total").increment(deleted);
        info!(deleted, "pruned entries");
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        match self
            .store
            .delete_by_query(self.alias(), &EsQuery::match_all())
            .await
        {
            Ok(response) => {
                info!(deleted = response.deleted_count(), "cleared entries");
            }
            Err(StoreError::IndexNotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        self.store.flush(self.alias()).await?;
        Ok(())
    }

    async fn terminate(&self) {
        self.invalidate_monitoring();
    }
}
