//! Entry Codec: entries to index documents and back.
//!
//! Document shape:
//!
//! ```text
//! uuid, batch_id, family_hash, type      keyword
//! should_display_on_index                boolean (null_value: true)
//! content                                object, dynamic: false
//! tags                                   nested { raw, name, value } keywords
//! created_at                             date "yyyy-MM-dd HH:mm:ss"
//! @timestamp                             date (ingestion time)
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sightline_store::Hit;

use crate::entry::{Entry, EntryType};
use crate::error::{Error, Result};

/// chrono rendering of `created_at`.
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Engine-side date format of `created_at`, used in the mapping and in range queries.
pub const ENGINE_DATE_FORMAT: &str = "yyyy-MM-dd HH:mm:ss";

/// One nested tag sub-document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDocument {
    pub raw: String,
    pub name: String,
    pub value: Option<String>,
}

/// Split a tag on its first `:` into name and value.
///
/// ```
/// use sightline::codec::format_tag;
///
/// let tag = format_tag("status:500");
/// assert_eq!(tag.name, "status");
/// assert_eq!(tag.value.as_deref(), Some("500"));
///
/// let tag = format_tag("slow");
/// assert_eq!(tag.name, "slow");
/// assert_eq!(tag.value, None);
/// ```
pub fn format_tag(raw: &str) -> TagDocument {
    match raw.split_once(':') {
        Some((name, value)) => TagDocument {
            raw: raw.to_string(),
            name: name.to_string(),
            value: Some(value.to_string()),
        },
        None => TagDocument {
            raw: raw.to_string(),
            name: raw.to_string(),
            value: None,
        },
    }
}

/// Stored form of an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDocument {
    pub uuid: String,
    pub batch_id: String,
    pub family_hash: Option<String>,
    pub should_display_on_index: bool,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub content: Value,
    pub tags: Vec<TagDocument>,
    pub created_at: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
}

pub fn format_created_at(at: &DateTime<Utc>) -> String {
    at.format(CREATED_AT_FORMAT).to_string()
}

fn parse_created_at(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, CREATED_AT_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::MalformedDocument(format!("invalid created_at {:?}: {}", raw, e)))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::MalformedDocument(format!("invalid @timestamp {:?}: {}", raw, e)))
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn required<'a>(source: &'a Map<String, Value>, field: &str) -> Result<&'a Value> {
    source
        .get(field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| Error::MalformedDocument(format!("missing required field `{}`", field)))
}

fn required_str<'a>(source: &'a Map<String, Value>, field: &str) -> Result<&'a str> {
    required(source, field)?
        .as_str()
        .ok_or_else(|| Error::MalformedDocument(format!("field `{}` is not a string", field)))
}

/// Converts between [`Entry`] and [`EntryDocument`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryCodec;

impl EntryCodec {
    pub fn new() -> Self {
        Self
    }

    /// Encode, stamping `@timestamp` with the current time.
    pub fn encode(&self, entry: &Entry) -> EntryDocument {
        self.encode_at(entry, Utc::now())
    }

    pub fn encode_at(&self, entry: &Entry, ingested_at: DateTime<Utc>) -> EntryDocument {
        EntryDocument {
            uuid: entry.uuid.clone(),
            batch_id: entry.batch_id.clone(),
            family_hash: entry.family_hash.clone(),
            should_display_on_index: entry.should_display_on_index,
            entry_type: entry.entry_type.as_str().to_string(),
            content: entry.content.clone(),
            tags: entry.tags.iter().map(|t| format_tag(t)).collect(),
            created_at: format_created_at(&entry.created_at),
            timestamp: ingested_at.to_rfc3339(),
        }
    }

    /// Encode straight to a JSON `_source`.
    pub fn to_source(&self, entry: &Entry) -> Result<Value> {
        Ok(serde_json::to_value(self.encode(entry))?)
    }

    pub fn decode(&self, hit: &Hit) -> Result<Entry> {
        self.decode_source(&hit.source)
    }

    pub fn decode_source(&self, source: &Map<String, Value>) -> Result<Entry> {
        let uuid = required_str(source, "uuid")?.to_string();
        let entry_type: EntryType = required_str(source, "type")?.parse()?;
        let content = required(source, "content")?.clone();

        let batch_id = source
            .get("batch_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let family_hash = source
            .get("family_hash")
            .and_then(Value::as_str)
            .map(str::to_string);

        let tags = source
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|tag| match tag {
                        Value::Object(t) => t.get("raw").and_then(Value::as_str),
                        Value::String(s) => Some(s.as_str()),
                        _ => None,
                    })
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let created_at = match source.get("created_at").and_then(Value::as_str) {
            Some(raw) => parse_created_at(raw)?,
            None => match source.get("@timestamp").and_then(Value::as_str) {
                Some(raw) => parse_timestamp(raw)?,
                None => {
                    return Err(Error::MalformedDocument(
                        "missing `created_at` and `@timestamp`".to_string(),
                    ))
                }
            },
        };

        let should_display_on_index = source
            .get("should_display_on_index")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let user = content
            .get("user")
            .filter(|u| !is_empty_value(u))
            .cloned();

        Ok(Entry {
            uuid,
            batch_id,
            entry_type,
            family_hash,
            content,
            tags,
            created_at,
            should_display_on_index,
            user,
        })
    }
}
