//! Response types returned by the engine
//!
//! Fields are defaulted where engine versions disagree (hit totals were a
//! bare number before 7.x and an object after).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// ES search response format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub hits: HitsResponse,
}

impl SearchResponse {
    /// Total number of matching documents, falling back to the returned
    /// page length when the engine omits the total.
    pub fn total(&self) -> u64 {
        match &self.hits.total {
            Some(total) => total.value(),
            None => self.hits.hits.len() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HitsResponse {
    #[serde(default)]
    pub total: Option<TotalHits>,
    #[serde(default)]
    pub max_score: Option<f32>,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    Object { value: u64, relation: String },
    Count(u64),
}

impl TotalHits {
    pub fn exact(value: u64) -> Self {
        TotalHits::Object {
            value,
            relation: "eq".to_string(),
        }
    }

    pub fn value(&self) -> u64 {
        match self {
            TotalHits::Object { value, .. } => *value,
            TotalHits::Count(value) => *value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f32>,
    #[serde(rename = "_source", default)]
    pub source: Map<String, Value>,
}

/// ES bulk response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItemResponse>,
}

impl BulkResponse {
    /// Item results that carry an error.
    pub fn failed_items(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items
            .iter()
            .filter_map(|item| item.result())
            .filter(|result| result.error.is_some())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkItemResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<BulkItemResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<BulkItemResult>,
}

impl BulkItemResponse {
    pub fn result(&self) -> Option<&BulkItemResult> {
        self.index.as_ref().or(self.create.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemResult {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EsError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsError {
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Error body returned with a non-2xx status
#[derive(Debug, Clone, Deserialize)]
pub struct EsErrorResponse {
    pub error: EsErrorBody,
    #[serde(default)]
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EsErrorBody {
    Detailed(EsError),
    Message(String),
}

impl EsErrorBody {
    pub fn error_type(&self) -> Option<&str> {
        match self {
            EsErrorBody::Detailed(e) => Some(e.error_type.as_str()),
            EsErrorBody::Message(_) => None,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            EsErrorBody::Detailed(e) => e
                .reason
                .clone()
                .unwrap_or_else(|| e.error_type.clone()),
            EsErrorBody::Message(m) => m.clone(),
        }
    }
}

/// `_delete_by_query` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteByQueryResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub deleted: Option<u64>,
    #[serde(default)]
    pub failures: Vec<Value>,
}

impl DeleteByQueryResponse {
    /// Documents the engine reports as deleted; 0 when it reports nothing.
    pub fn deleted_count(&self) -> u64 {
        self.deleted.or(self.total).unwrap_or(0)
    }
}
