//! Entry model: captured events, post-hoc updates and listing options.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// Default page size for listings.
pub const DEFAULT_LIMIT: usize = 50;

/// Kind of captured event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Request,
    Query,
    Exception,
    Job,
    Log,
    Cache,
    Command,
    Dump,
    Event,
    Mail,
    Model,
    Notification,
    Redis,
    Schedule,
    Gate,
    View,
    ClientRequest,
    Batch,
}

impl EntryType {
    pub const ALL: [EntryType; 18] = [
        EntryType::Request,
        EntryType::Query,
        EntryType::Exception,
        EntryType::Job,
        EntryType::Log,
        EntryType::Cache,
        EntryType::Command,
        EntryType::Dump,
        EntryType::Event,
        EntryType::Mail,
        EntryType::Model,
        EntryType::Notification,
        EntryType::Redis,
        EntryType::Schedule,
        EntryType::Gate,
        EntryType::View,
        EntryType::ClientRequest,
        EntryType::Batch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Request => "request",
            EntryType::Query => "query",
            EntryType::Exception => "exception",
            EntryType::Job => "job",
            EntryType::Log => "log",
            EntryType::Cache => "cache",
            EntryType::Command => "command",
            EntryType::Dump => "dump",
            EntryType::Event => "event",
            EntryType::Mail => "mail",
            EntryType::Model => "model",
            EntryType::Notification => "notification",
            EntryType::Redis => "redis",
            EntryType::Schedule => "schedule",
            EntryType::Gate => "gate",
            EntryType::View => "view",
            EntryType::ClientRequest => "client_request",
            EntryType::Batch => "batch",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::MalformedDocument(format!("unknown entry type: {}", s)))
    }
}

/// One captured event.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub uuid: String,
    pub batch_id: String,
    pub entry_type: EntryType,
    pub family_hash: Option<String>,
    /// Opaque payload; shape depends on `entry_type`
    pub content: Value,
    pub tags: Vec<String>,
    /// Second precision
    pub created_at: DateTime<Utc>,
    /// False marks a superseded exception occurrence
    pub should_display_on_index: bool,
    /// Promoted from `content.user` on decode
    pub user: Option<Value>,
}

impl Entry {
    /// New entry with a fresh v4 uuid, created now.
    pub fn new(entry_type: EntryType, content: Value) -> Self {
        Self {
            uuid: Uuid::new_v4().to_string(),
            batch_id: String::new(),
            entry_type,
            family_hash: None,
            content,
            tags: Vec::new(),
            created_at: Utc::now().trunc_subsecs(0),
            should_display_on_index: true,
            user: None,
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    pub fn with_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = batch_id.into();
        self
    }

    pub fn with_family_hash(mut self, family_hash: impl Into<String>) -> Self {
        self.family_hash = Some(family_hash.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at.trunc_subsecs(0);
        self
    }

    pub fn is_exception(&self) -> bool {
        self.entry_type == EntryType::Exception
    }

    /// Family hash, if present and non-empty.
    pub fn family(&self) -> Option<&str> {
        self.family_hash.as_deref().filter(|h| !h.is_empty())
    }

    pub fn content_object(&self) -> Option<&Map<String, Value>> {
        self.content.as_object()
    }
}

/// Tags to add to and remove from an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagsChanges {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl TagsChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Union `added` into `tags` keeping order, then drop every `removed` tag.
    pub fn apply(&self, tags: &mut Vec<String>) {
        for tag in &self.added {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        tags.retain(|tag| !self.removed.contains(tag));
    }
}

/// Delta applied to an existing entry, located by `(uuid, entry_type)`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryUpdate {
    pub uuid: String,
    pub entry_type: EntryType,
    /// Shallow overwrite of top-level content keys
    pub changes: Map<String, Value>,
    pub tags_changes: TagsChanges,
}

impl EntryUpdate {
    pub fn new(uuid: impl Into<String>, entry_type: EntryType) -> Self {
        Self {
            uuid: uuid.into(),
            entry_type,
            changes: Map::new(),
            tags_changes: TagsChanges::default(),
        }
    }

    pub fn change(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.changes.insert(key.into(), value.into());
        self
    }

    pub fn add_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags_changes.added.push(tag.into());
        self
    }

    pub fn remove_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags_changes.removed.push(tag.into());
        self
    }
}

/// Filters and paging for a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub batch_id: Option<String>,
    pub family_hash: Option<String>,
    pub tag: Option<String>,
    pub uuids: Vec<String>,
    /// Only entries created strictly before this instant
    pub before: Option<DateTime<Utc>>,
    pub limit: usize,
    /// Hide superseded exception occurrences in unfiltered listings
    pub display_only: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            batch_id: None,
            family_hash: None,
            tag: None,
            uuids: Vec::new(),
            before: None,
            limit: DEFAULT_LIMIT,
            display_only: false,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    pub fn for_family(mut self, family_hash: impl Into<String>) -> Self {
        self.family_hash = Some(family_hash.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_uuids<I, S>(mut self, uuids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uuids = uuids.into_iter().map(Into::into).collect();
        self
    }

    pub fn before(mut self, before: DateTime<Utc>) -> Self {
        self.before = Some(before);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn display_only(mut self) -> Self {
        self.display_only = true;
        self
    }
}
