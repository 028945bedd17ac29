//! Elasticsearch Query DSL types
//!
//! These types represent the subset of the ES Query DSL, alias API and bulk
//! API that Sightline issues. They serialize to the exact JSON the engine
//! expects and deserialize back, so the in-memory store can evaluate the
//! same requests the HTTP client sends.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Root ES search request body
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SearchRequest {
    /// The query to execute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<EsQuery>,

    /// Starting offset (default 0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<usize>,

    /// Maximum number of results (default 10)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,

    /// Sort order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<SortClause>>,

    /// Track total hits exactly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_total_hits: Option<TrackTotalHits>,
}

impl SearchRequest {
    pub fn new(query: EsQuery) -> Self {
        Self {
            query: Some(query),
            ..Self::default()
        }
    }

    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Append a descending sort on `field`.
    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sort
            .get_or_insert_with(Vec::new)
            .push(SortClause::desc(field));
        self
    }

    /// Ask for an exact total instead of the engine's default lower bound.
    pub fn exact_total(mut self) -> Self {
        self.track_total_hits = Some(TrackTotalHits::Bool(true));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TrackTotalHits {
    Bool(bool),
    Count(usize),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SortClause {
    Field(String),
    Object(HashMap<String, SortOrder>),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SortOrder {
    Simple(String),
    Object { order: String },
}

impl SortClause {
    pub fn desc(field: impl Into<String>) -> Self {
        let mut map = HashMap::new();
        map.insert(
            field.into(),
            SortOrder::Object {
                order: "desc".to_string(),
            },
        );
        SortClause::Object(map)
    }

    /// Field name and whether the order is descending.
    ///
    /// A bare field name sorts ascending, as in ES.
    pub fn field_and_direction(&self) -> Option<(&str, bool)> {
        match self {
            SortClause::Field(field) => Some((field.as_str(), false)),
            SortClause::Object(map) => map.iter().next().map(|(field, order)| {
                let order = match order {
                    SortOrder::Simple(o) => o.as_str(),
                    SortOrder::Object { order } => order.as_str(),
                };
                (field.as_str(), order.eq_ignore_ascii_case("desc"))
            }),
        }
    }
}

/// ES Query types
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EsQuery {
    /// Match all documents
    MatchAll(MatchAllQuery),

    /// Term query (exact match, not analyzed)
    Term(HashMap<String, TermValue>),

    /// Terms query (multiple exact matches)
    Terms(HashMap<String, Vec<Value>>),

    /// Match phrase query
    MatchPhrase(HashMap<String, MatchPhraseQuery>),

    /// Range query
    Range(HashMap<String, RangeParams>),

    /// Bool query (must, should, must_not, filter)
    Bool(BoolQuery),

    /// Query scoped to a nested object field
    Nested(NestedQuery),

    /// Exists query
    Exists(ExistsQuery),
}

impl EsQuery {
    pub fn match_all() -> Self {
        EsQuery::MatchAll(MatchAllQuery { boost: None })
    }

    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut map = HashMap::new();
        map.insert(field.into(), TermValue::Simple(value.into()));
        EsQuery::Term(map)
    }

    pub fn terms(field: impl Into<String>, values: Vec<Value>) -> Self {
        let mut map = HashMap::new();
        map.insert(field.into(), values);
        EsQuery::Terms(map)
    }

    pub fn match_phrase(field: impl Into<String>, query: impl Into<String>) -> Self {
        let mut map = HashMap::new();
        map.insert(field.into(), MatchPhraseQuery::Simple(query.into()));
        EsQuery::MatchPhrase(map)
    }

    pub fn range(field: impl Into<String>, params: RangeParams) -> Self {
        let mut map = HashMap::new();
        map.insert(field.into(), params);
        EsQuery::Range(map)
    }

    pub fn nested(path: impl Into<String>, query: EsQuery) -> Self {
        EsQuery::Nested(NestedQuery {
            path: path.into(),
            query: Box::new(query),
            score_mode: None,
        })
    }

    /// Conjunction of non-scoring clauses.
    pub fn filter(clauses: Vec<EsQuery>) -> Self {
        EsQuery::Bool(BoolQuery {
            filter: Some(QueryList::Multiple(clauses)),
            ..BoolQuery::default()
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MatchAllQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MatchPhraseQuery {
    Simple(String),
    Object {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slop: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        boost: Option<f32>,
    },
}

impl MatchPhraseQuery {
    pub fn text(&self) -> &str {
        match self {
            MatchPhraseQuery::Simple(q) => q,
            MatchPhraseQuery::Object { query, .. } => query,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TermValue {
    Object {
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        boost: Option<f32>,
    },
    Simple(Value),
}

impl TermValue {
    pub fn value(&self) -> &Value {
        match self {
            TermValue::Simple(v) => v,
            TermValue::Object { value, .. } => value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RangeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl RangeParams {
    /// Strictly-less-than bound.
    pub fn lt(value: impl Into<Value>) -> Self {
        Self {
            lt: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BoolQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must: Option<QueryList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should: Option<QueryList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_not: Option<QueryList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<QueryList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_should_match: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum QueryList {
    Single(Box<EsQuery>),
    Multiple(Vec<EsQuery>),
}

impl QueryList {
    pub fn as_slice(&self) -> &[EsQuery] {
        match self {
            QueryList::Single(q) => std::slice::from_ref(q.as_ref()),
            QueryList::Multiple(v) => v,
        }
    }

    pub fn into_vec(self) -> Vec<EsQuery> {
        match self {
            QueryList::Single(q) => vec![*q],
            QueryList::Multiple(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NestedQuery {
    pub path: String,
    pub query: Box<EsQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExistsQuery {
    pub field: String,
}

/// One entry of an `_aliases` request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasAction {
    Add(AliasBinding),
    Remove(AliasBinding),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AliasBinding {
    pub index: String,
    pub alias: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_write_index: Option<bool>,
}

impl AliasAction {
    pub fn add(index: impl Into<String>, alias: impl Into<String>, write: Option<bool>) -> Self {
        AliasAction::Add(AliasBinding {
            index: index.into(),
            alias: alias.into(),
            is_write_index: write,
        })
    }

    pub fn remove(index: impl Into<String>, alias: impl Into<String>) -> Self {
        AliasAction::Remove(AliasBinding {
            index: index.into(),
            alias: alias.into(),
            is_write_index: None,
        })
    }
}

/// A full-document upsert keyed by `_id`
#[derive(Debug, Clone, PartialEq)]
pub struct BulkDocument {
    /// Target index or alias
    pub index: String,
    pub id: String,
    pub source: Value,
    /// Reject the write unless `index` names an alias, so the engine never
    /// auto-creates an unmapped index under the alias name.
    pub require_alias: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BulkActionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<BulkMeta>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BulkMeta {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub require_alias: bool,
}

/// Render bulk documents as the NDJSON body of a `_bulk` request.
///
/// Every line, including the last, is newline-terminated.
pub fn to_ndjson(documents: &[BulkDocument]) -> Result<String, serde_json::Error> {
    let mut body = String::new();
    for doc in documents {
        let meta = BulkActionMeta {
            index: Some(BulkMeta {
                index: doc.index.clone(),
                id: doc.id.clone(),
                require_alias: doc.require_alias,
            }),
        };
        body.push_str(&serde_json::to_string(&meta)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&doc.source)?);
        body.push('\n');
    }
    Ok(body)
}
