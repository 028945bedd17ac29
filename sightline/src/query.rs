//! Query Builder: listing options to engine queries.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sightline_store::{EsQuery, RangeParams, SearchRequest};

use crate::codec::{format_created_at, ENGINE_DATE_FORMAT};
use crate::entry::{EntryType, QueryOptions};

/// Cap on the prior-occurrence scan for one exception family.
pub const DEFAULT_OCCURRENCE_SCAN_LIMIT: usize = 1000;

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Scope a tag match to the nested `tags` documents.
pub fn tag_filter(tag: &str) -> EsQuery {
    EsQuery::nested("tags", EsQuery::match_phrase("tags.raw", tag))
}

/// `created_at < before`.
pub fn created_before(before: &DateTime<Utc>) -> EsQuery {
    EsQuery::range(
        "created_at",
        RangeParams::lt(format_created_at(before)).with_format(ENGINE_DATE_FORMAT),
    )
}

/// Conjunction of every filter `options` sets; `match_all` when none is set.
pub fn build_query(entry_type: Option<EntryType>, options: &QueryOptions) -> EsQuery {
    let mut filters = Vec::new();

    if let Some(t) = entry_type {
        filters.push(EsQuery::term("type", t.as_str()));
    }
    if let Some(batch_id) = non_empty(&options.batch_id) {
        filters.push(EsQuery::term("batch_id", batch_id));
    }
    if let Some(family_hash) = non_empty(&options.family_hash) {
        filters.push(EsQuery::term("family_hash", family_hash));
    }
    if let Some(tag) = non_empty(&options.tag) {
        filters.push(tag_filter(tag));
    }
    if !options.uuids.is_empty() {
        filters.push(EsQuery::terms(
            "uuid",
            options.uuids.iter().cloned().map(Value::String).collect(),
        ));
    }
    if let Some(before) = &options.before {
        filters.push(created_before(before));
    }

    let scoped = non_empty(&options.batch_id).is_some()
        || non_empty(&options.family_hash).is_some()
        || non_empty(&options.tag).is_some();
    if options.display_only && !scoped {
        filters.push(EsQuery::term("should_display_on_index", true));
    }

    if filters.is_empty() {
        EsQuery::match_all()
    } else {
        EsQuery::filter(filters)
    }
}

/// Listing request: filters, newest first, `options.limit` hits.
pub fn list_request(entry_type: Option<EntryType>, options: &QueryOptions) -> SearchRequest {
    SearchRequest::new(build_query(entry_type, options))
        .size(options.limit)
        .sort_desc("created_at")
}

/// Single entry by uuid.
pub fn find_request(uuid: &str) -> SearchRequest {
    SearchRequest::new(EsQuery::filter(vec![EsQuery::term("uuid", uuid)])).size(1)
}

/// Single entry by its `(uuid, type)` key.
pub fn lookup_request(uuid: &str, entry_type: EntryType) -> SearchRequest {
    SearchRequest::new(EsQuery::filter(vec![
        EsQuery::term("uuid", uuid),
        EsQuery::term("type", entry_type.as_str()),
    ]))
    .size(1)
}

/// Prior exceptions of one family, with an exact total.
pub fn occurrence_request(family_hash: &str, limit: usize) -> SearchRequest {
    SearchRequest::new(EsQuery::filter(vec![
        EsQuery::term("family_hash", family_hash),
        EsQuery::term("type", EntryType::Exception.as_str()),
    ]))
    .size(limit)
    .sort_desc("created_at")
    .exact_total()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn to_json(request: &SearchRequest) -> Value {
        serde_json::to_value(request).unwrap()
    }

    #[test]
    fn test_no_filters_is_match_all() {
        let v = to_json(&list_request(None, &QueryOptions::default()));
        assert_eq!(v["query"], json!({"match_all": {}}));
        assert_eq!(v["size"], json!(50));
        assert_eq!(v["sort"], json!([{"created_at": {"order": "desc"}}]));
    }

    #[test]
    fn test_empty_strings_are_ignored() {
        let opts = QueryOptions {
            batch_id: Some(String::new()),
            tag: Some(String::new()),
            ..QueryOptions::default()
        };
        assert_eq!(build_query(None, &opts), EsQuery::match_all());
    }

    #[test]
    fn test_filters_are_a_conjunction() {
        let opts = QueryOptions::new()
            .for_batch("B1")
            .for_family("F")
            .with_tag("status:500")
            .limit(5);
        let v = to_json(&list_request(Some(EntryType::Request), &opts));
        assert_eq!(
            v["query"],
            json!({"bool": {"filter": [
                {"term": {"type": "request"}},
                {"term": {"batch_id": "B1"}},
                {"term": {"family_hash": "F"}},
                {"nested": {"path": "tags", "query": {"match_phrase": {"tags.raw": "status:500"}}}}
            ]}})
        );
        assert_eq!(v["size"], json!(5));
        assert!(v["query"]["bool"].get("should").is_none());
    }

    #[test]
    fn test_before_cursor_is_exclusive() {
        let before = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let v = to_json(&list_request(None, &QueryOptions::new().before(before)));
        assert_eq!(
            v["query"]["bool"]["filter"][0],
            json!({"range": {"created_at": {"lt": "2024-01-02 03:04:05", "format": "yyyy-MM-dd HH:mm:ss"}}})
        );
    }

    #[test]
    fn test_uuids_filter() {
        let v = to_json(&list_request(None, &QueryOptions::new().with_uuids(["a", "b"])));
        assert_eq!(
            v["query"]["bool"]["filter"][0],
            json!({"terms": {"uuid": ["a", "b"]}})
        );
    }

    #[test]
    fn test_display_only_applies_to_unscoped_listings() {
        let v = to_json(&list_request(
            Some(EntryType::Exception),
            &QueryOptions::new().display_only(),
        ));
        assert_eq!(
            v["query"]["bool"]["filter"][1],
            json!({"term": {"should_display_on_index": true}})
        );

        let v = to_json(&list_request(
            Some(EntryType::Exception),
            &QueryOptions::new().display_only().for_family("F"),
        ));
        assert_eq!(v["query"]["bool"]["filter"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_occurrence_request_is_capped_and_exact() {
        let v = to_json(&occurrence_request("H", DEFAULT_OCCURRENCE_SCAN_LIMIT));
        assert_eq!(v["size"], json!(1000));
        assert_eq!(v["track_total_hits"], json!(true));
        assert_eq!(
            v["query"]["bool"]["filter"],
            json!([{"term": {"family_hash": "H"}}, {"term": {"type": "exception"}}])
        );
    }

    #[test]
    fn test_lookup_request() {
        let v = to_json(&lookup_request("u1", EntryType::Request));
        assert_eq!(v["size"], json!(1));
        assert_eq!(v["query"]["bool"]["filter"][1], json!({"term": {"type": "request"}}));
    }
}
