//! In-memory store.
//!
//! Evaluates the same Query DSL the HTTP client sends, with the alias and
//! bulk semantics of a real cluster: write index resolution,
//! `require_alias`, and not-found / already-exists errors.
//!
//! Field analysis is approximated: `match_phrase` is exact on fields mapped
//! as `keyword` and a lowercase token-sequence match everywhere else.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::dsl::{
    AliasAction, BoolQuery, BulkDocument, EsQuery, QueryList, RangeParams, SearchRequest,
    SortClause,
};
use crate::error::{Result, StoreError};
use crate::response::{
    BulkItemResponse, BulkItemResult, BulkResponse, DeleteByQueryResponse, EsError, Hit,
    HitsResponse, SearchResponse, TotalHits,
};
use crate::traits::StoreClient;

const DEFAULT_SIZE: usize = 10;

#[derive(Debug, Clone)]
struct StoredDoc {
    seq: u64,
    source: Value,
}

#[derive(Debug, Clone, Default)]
struct IndexState {
    body: Value,
    docs: HashMap<String, StoredDoc>,
}

#[derive(Debug, Default)]
struct Inner {
    indices: BTreeMap<String, IndexState>,
    /// alias -> (index -> is_write_index)
    aliases: BTreeMap<String, BTreeMap<String, Option<bool>>>,
    seq: u64,
    unavailable: bool,
}

/// `StoreClient` that keeps every index in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.write().unavailable = unavailable;
    }

    /// Concrete index names, sorted.
    pub fn indices(&self) -> Vec<String> {
        self.inner.read().indices.keys().cloned().collect()
    }

    /// Body the index was created with.
    pub fn index_body(&self, index: &str) -> Option<Value> {
        self.inner.read().indices.get(index).map(|s| s.body.clone())
    }

    /// Stored source of a document in a concrete index.
    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.inner
            .read()
            .indices
            .get(index)
            .and_then(|s| s.docs.get(id))
            .map(|d| d.source.clone())
    }

    /// Number of documents in a concrete index.
    pub fn doc_count(&self, index: &str) -> usize {
        self.inner
            .read()
            .indices
            .get(index)
            .map(|s| s.docs.len())
            .unwrap_or(0)
    }

    /// Index that writes through `alias` would land in.
    pub fn write_index(&self, alias: &str) -> Option<String> {
        let inner = self.inner.read();
        inner
            .aliases
            .get(alias)
            .and_then(|targets| resolve_write_index(targets))
    }

    fn check_available(inner: &Inner) -> Result<()> {
        if inner.unavailable {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(())
    }
}

fn resolve_write_index(targets: &BTreeMap<String, Option<bool>>) -> Option<String> {
    if targets.len() == 1 {
        return targets
            .iter()
            .find(|(_, write)| **write != Some(false))
            .map(|(index, _)| index.clone());
    }
    targets
        .iter()
        .find(|(_, write)| **write == Some(true))
        .map(|(index, _)| index.clone())
}

impl Inner {
    /// Concrete indices behind an index or alias name.
    fn resolve_read(&self, name: &str) -> Result<Vec<String>> {
        if self.indices.contains_key(name) {
            return Ok(vec![name.to_string()]);
        }
        match self.aliases.get(name) {
            Some(targets) if !targets.is_empty() => Ok(targets.keys().cloned().collect()),
            _ => Err(StoreError::IndexNotFound(name.to_string())),
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn mapping_of(&self, index: &str) -> Option<&Value> {
        self.indices.get(index).and_then(|s| s.body.get("mappings"))
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse> {
        let inner = self.inner.read();
        Self::check_available(&inner)?;
        let targets = inner.resolve_read(index)?;

        let match_all = EsQuery::match_all();
        let query = request.query.as_ref().unwrap_or(&match_all);

        let mut matched: Vec<(&str, &str, &StoredDoc)> = Vec::new();
        for target in &targets {
            let Some(state) = inner.indices.get(target) else {
                continue;
            };
            let mapping = inner.mapping_of(target);
            for (id, doc) in &state.docs {
                if matches(query, &doc.source, mapping) {
                    matched.push((target.as_str(), id.as_str(), doc));
                }
            }
        }

        let sort = request.sort.as_deref().unwrap_or(&[]);
        matched.sort_by(|a, b| compare_docs(sort, a.2, b.2));

        let total = matched.len() as u64;
        let from = request.from.unwrap_or(0);
        let size = request.size.unwrap_or(DEFAULT_SIZE);

        let hits = matched
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(index, id, doc)| Hit {
                index: index.to_string(),
                id: id.to_string(),
                score: None,
                source: doc.source.as_object().cloned().unwrap_or_default(),
            })
            .collect();

        debug!(index = %index, total, "memory search");

        Ok(SearchResponse {
            took: 0,
            timed_out: false,
            hits: HitsResponse {
                total: Some(TotalHits::exact(total)),
                max_score: None,
                hits,
            },
        })
    }

    async fn bulk(&self, documents: Vec<BulkDocument>) -> Result<BulkResponse> {
        let mut inner = self.inner.write();
        Self::check_available(&inner)?;

        let mut items = Vec::with_capacity(documents.len());
        let mut missing: Option<String> = None;

        for doc in documents {
            let target = if let Some(targets) = inner.aliases.get(&doc.index) {
                match resolve_write_index(targets) {
                    Some(index) => Ok(index),
                    None => Err(EsError {
                        error_type: "illegal_argument_exception".to_string(),
                        reason: Some(format!(
                            "no write index is defined for alias [{}]",
                            doc.index
                        )),
                    }),
                }
            } else if doc.require_alias {
                Err(EsError {
                    error_type: "index_not_found_exception".to_string(),
                    reason: Some(format!(
                        "no such index [{}] and [require_alias] request flag is [true] and [{}] is not an alias",
                        doc.index, doc.index
                    )),
                })
            } else {
                Ok(doc.index.clone())
            };

            let item = match target {
                Ok(index) => {
                    let seq = inner.next_seq();
                    let state = inner.indices.entry(index.clone()).or_default();
                    let previous = state.docs.insert(
                        doc.id.clone(),
                        StoredDoc {
                            seq,
                            source: doc.source,
                        },
                    );
                    let created = previous.is_none();
                    // Replacing keeps the original insertion position.
                    if let Some(previous) = previous {
                        if let Some(stored) = state.docs.get_mut(&doc.id) {
                            stored.seq = previous.seq;
                        }
                    }
                    BulkItemResult {
                        index,
                        id: doc.id,
                        result: Some(if created { "created" } else { "updated" }.to_string()),
                        status: if created { 201 } else { 200 },
                        error: None,
                    }
                }
                Err(error) => {
                    let status = if error.error_type == "index_not_found_exception" {
                        if missing.is_none() {
                            missing = Some(doc.index.clone());
                        }
                        404
                    } else {
                        400
                    };
                    BulkItemResult {
                        index: doc.index,
                        id: doc.id,
                        result: None,
                        status,
                        error: Some(error),
                    }
                }
            };

            items.push(BulkItemResponse {
                index: Some(item),
                create: None,
            });
        }

        if let Some(index) = missing {
            return Err(StoreError::IndexNotFound(index));
        }

        let errors = items
            .iter()
            .any(|i| i.result().is_some_and(|r| r.error.is_some()));

        Ok(BulkResponse {
            took: 0,
            errors,
            items,
        })
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let inner = self.inner.read();
        Self::check_available(&inner)?;
        Ok(inner.indices.contains_key(index)
            || inner.aliases.get(index).is_some_and(|t| !t.is_empty()))
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        let mut inner = self.inner.write();
        Self::check_available(&inner)?;

        if inner.indices.contains_key(index) || inner.aliases.contains_key(index) {
            return Err(StoreError::IndexAlreadyExists(index.to_string()));
        }

        let mut stored = body.clone();
        let aliases = stored
            .as_object_mut()
            .and_then(|o| o.remove("aliases"))
            .and_then(|a| a.as_object().cloned())
            .unwrap_or_default();

        inner.indices.insert(
            index.to_string(),
            IndexState {
                body: stored,
                docs: HashMap::new(),
            },
        );

        for (alias, settings) in aliases {
            let write = settings.get("is_write_index").and_then(Value::as_bool);
            inner
                .aliases
                .entry(alias)
                .or_default()
                .insert(index.to_string(), write);
        }

        debug!(index = %index, "memory index created");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let mut inner = self.inner.write();
        Self::check_available(&inner)?;

        if inner.indices.remove(index).is_none() {
            return Err(StoreError::IndexNotFound(index.to_string()));
        }
        for targets in inner.aliases.values_mut() {
            targets.remove(index);
        }
        inner.aliases.retain(|_, targets| !targets.is_empty());
        Ok(())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<()> {
        let mut inner = self.inner.write();
        Self::check_available(&inner)?;

        let mut aliases = inner.aliases.clone();
        for action in actions {
            match action {
                AliasAction::Add(binding) => {
                    if !inner.indices.contains_key(&binding.index) {
                        return Err(StoreError::IndexNotFound(binding.index.clone()));
                    }
                    aliases
                        .entry(binding.alias.clone())
                        .or_default()
                        .insert(binding.index.clone(), binding.is_write_index);
                }
                AliasAction::Remove(binding) => {
                    let removed = aliases
                        .get_mut(&binding.alias)
                        .and_then(|targets| targets.remove(&binding.index));
                    if removed.is_none() {
                        return Err(StoreError::IndexNotFound(binding.alias.clone()));
                    }
                }
            }
        }
        aliases.retain(|_, targets| !targets.is_empty());

        for (alias, targets) in &aliases {
            let writers = targets.values().filter(|w| **w == Some(true)).count();
            if writers > 1 {
                return Err(StoreError::Http {
                    status: 400,
                    reason: format!("alias [{}] has more than one write index", alias),
                });
            }
        }

        inner.aliases = aliases;
        Ok(())
    }

    async fn alias_targets(&self, alias: &str) -> Result<Vec<String>> {
        let inner = self.inner.read();
        Self::check_available(&inner)?;
        Ok(inner
            .aliases
            .get(alias)
            .map(|targets| targets.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_by_query(&self, index: &str, query: &EsQuery) -> Result<DeleteByQueryResponse> {
        let mut inner = self.inner.write();
        Self::check_available(&inner)?;
        let targets = inner.resolve_read(index)?;

        let mut deleted = 0u64;
        for target in targets {
            let mapping = inner.mapping_of(&target).cloned();
            if let Some(state) = inner.indices.get_mut(&target) {
                let before = state.docs.len();
                state
                    .docs
                    .retain(|_, doc| !matches(query, &doc.source, mapping.as_ref()));
                deleted += (before - state.docs.len()) as u64;
            }
        }

        Ok(DeleteByQueryResponse {
            took: 0,
            total: Some(deleted),
            deleted: Some(deleted),
            failures: Vec::new(),
        })
    }

    async fn flush(&self, index: &str) -> Result<()> {
        let inner = self.inner.read();
        Self::check_available(&inner)?;
        inner.resolve_read(index).map(|_| ())
    }
}

/// Values reachable at a dotted path, flattening arrays at every step.
fn values_at<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            collect_field(value, segment, &mut next);
        }
        current = next;
    }
    let mut flat = Vec::new();
    for value in current {
        flatten(value, &mut flat);
    }
    flat
}

fn collect_field<'a>(value: &'a Value, segment: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if let Some(v) = map.get(segment) {
                out.push(v);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_field(item, segment, out);
            }
        }
        _ => {}
    }
}

fn flatten<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|i| flatten(i, out)),
        Value::Null => {}
        other => out.push(other),
    }
}

/// Mapped type of a dotted field path, if any.
fn field_type<'a>(mapping: Option<&'a Value>, path: &str) -> Option<&'a str> {
    let mut node = mapping?;
    for segment in path.split('.') {
        node = node.get("properties")?.get(segment)?;
    }
    node.get("type").and_then(Value::as_str)
}

fn term_eq(stored: &Value, wanted: &Value) -> bool {
    match (stored, wanted) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::Number(b)) => a.parse::<f64>().ok() == b.as_f64(),
        (Value::Number(a), Value::String(b)) => b.parse::<f64>().ok() == a.as_f64(),
        (Value::Bool(a), Value::String(b)) => b.parse::<bool>().ok() == Some(*a),
        _ => stored == wanted,
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn phrase_matches(stored: &Value, phrase: &str, keyword: bool) -> bool {
    let Some(text) = stored.as_str() else {
        return false;
    };
    if keyword {
        return text == phrase;
    }
    let haystack = tokens(text);
    let needle = tokens(phrase);
    if needle.is_empty() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle.as_slice())
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::String(y)) => x.as_f64()?.partial_cmp(&y.parse::<f64>().ok()?),
        (Value::String(x), Value::Number(y)) => x.parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        _ => None,
    }
}

fn in_range(value: &Value, params: &RangeParams) -> bool {
    let check = |bound: &Option<Value>, ok: fn(Ordering) -> bool| match bound {
        None => true,
        Some(bound) => compare_values(value, bound).is_some_and(ok),
    };
    check(&params.gte, |o| o != Ordering::Less)
        && check(&params.gt, |o| o == Ordering::Greater)
        && check(&params.lte, |o| o != Ordering::Greater)
        && check(&params.lt, |o| o == Ordering::Less)
}

fn clauses(list: &Option<QueryList>) -> &[EsQuery] {
    list.as_ref().map(QueryList::as_slice).unwrap_or(&[])
}

fn bool_matches(query: &BoolQuery, doc: &Value, mapping: Option<&Value>) -> bool {
    let must = clauses(&query.must);
    let filter = clauses(&query.filter);
    let must_not = clauses(&query.must_not);
    let should = clauses(&query.should);

    if !must.iter().chain(filter).all(|q| matches(q, doc, mapping)) {
        return false;
    }
    if must_not.iter().any(|q| matches(q, doc, mapping)) {
        return false;
    }
    if should.is_empty() {
        return true;
    }

    let required = match query.minimum_should_match {
        Some(n) => n.max(0) as usize,
        None if must.is_empty() && filter.is_empty() => 1,
        None => 0,
    };
    should.iter().filter(|q| matches(q, doc, mapping)).count() >= required
}

/// Wrap `value` so it sits at `path` again, for evaluating nested clauses
/// that use full field paths.
fn rooted(path: &str, value: &Value) -> Value {
    path.rsplit('.').fold(value.clone(), |inner, segment| {
        let mut map = Map::new();
        map.insert(segment.to_string(), inner);
        Value::Object(map)
    })
}

/// Evaluate a query against one document source.
fn matches(query: &EsQuery, doc: &Value, mapping: Option<&Value>) -> bool {
    match query {
        EsQuery::MatchAll(_) => true,
        EsQuery::Term(fields) => fields.iter().all(|(field, term)| {
            values_at(doc, field)
                .into_iter()
                .any(|v| term_eq(v, term.value()))
        }),
        EsQuery::Terms(fields) => fields.iter().all(|(field, wanted)| {
            values_at(doc, field)
                .into_iter()
                .any(|v| wanted.iter().any(|w| term_eq(v, w)))
        }),
        EsQuery::MatchPhrase(fields) => fields.iter().all(|(field, phrase)| {
            let keyword = field_type(mapping, field) == Some("keyword");
            values_at(doc, field)
                .into_iter()
                .any(|v| phrase_matches(v, phrase.text(), keyword))
        }),
        EsQuery::Range(fields) => fields.iter().all(|(field, params)| {
            values_at(doc, field)
                .into_iter()
                .any(|v| in_range(v, params))
        }),
        EsQuery::Bool(b) => bool_matches(b, doc, mapping),
        EsQuery::Nested(nested) => values_at(doc, &nested.path)
            .into_iter()
            .any(|object| matches(&nested.query, &rooted(&nested.path, object), mapping)),
        EsQuery::Exists(exists) => !values_at(doc, &exists.field).is_empty(),
    }
}

fn sort_key<'a>(doc: &'a StoredDoc, field: &str) -> Option<&'a Value> {
    values_at(&doc.source, field).into_iter().next()
}

/// Order by the sort clauses, missing values last, then by insertion.
fn compare_docs(sort: &[SortClause], a: &StoredDoc, b: &StoredDoc) -> Ordering {
    for clause in sort {
        let Some((field, descending)) = clause.field_and_direction() else {
            continue;
        };
        let ordering = match (sort_key(a, field), sort_key(b, field)) {
            (Some(x), Some(y)) => {
                let o = compare_values(x, y).unwrap_or(Ordering::Equal);
                if descending {
                    o.reverse()
                } else {
                    o
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.seq.cmp(&b.seq)
}
