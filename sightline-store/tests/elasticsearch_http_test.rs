//! HTTP tests for `ElasticsearchStore`.
//!
//! Each test starts a fake engine (an Axum server on a random port) that
//! records every request and answers with canned Elasticsearch responses.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::{json, Value};
use sightline_store::{
    AliasAction, BulkDocument, ElasticsearchConfig, ElasticsearchStore, EsQuery, RangeParams,
    SearchRequest, StoreClient, StoreError,
};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    authorization: Option<String>,
    content_type: Option<String>,
    body: String,
}

#[derive(Clone, Default)]
struct Fake {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Fake {
    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn last(&self) -> Recorded {
        self.requests().pop().expect("no request recorded")
    }
}

fn reply(status: StatusCode, body: Value) -> Response {
    (status, body.to_string()).into_response()
}

async fn handle(
    State(fake): State<Fake>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default();
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let body = String::from_utf8_lossy(&body).to_string();

    fake.requests.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: path.clone(),
        authorization: header("authorization"),
        content_type: header("content-type"),
        body: body.clone(),
    });

    match (method.as_str(), uri.path()) {
        ("POST", "/sightline/_search") => reply(
            StatusCode::OK,
            json!({
                "took": 2,
                "timed_out": false,
                "hits": {
                    "total": {"value": 1, "relation": "eq"},
                    "hits": [{
                        "_index": "sightline-2024.01.01",
                        "_id": "u1",
                        "_score": null,
                        "_source": {"uuid": "u1", "type": "request"}
                    }]
                }
            }),
        ),
        ("POST", "/broken/_search") => {
            reply(StatusCode::SERVICE_UNAVAILABLE, json!({"error": "cluster blocked", "status": 503}))
        }
        ("POST", "/absent/_search") => reply(
            StatusCode::NOT_FOUND,
            json!({"error": {"type": "index_not_found_exception", "reason": "no such index [absent]"}, "status": 404}),
        ),
        ("POST", "/_bulk") => {
            if body.contains("\"missing\"") {
                reply(
                    StatusCode::OK,
                    json!({"took": 1, "errors": true, "items": [{"index": {
                        "_index": "missing", "_id": "a", "status": 404,
                        "error": {"type": "index_not_found_exception", "reason": "no such index [missing]"}
                    }}]}),
                )
            } else if body.contains("\"rejected\"") {
                reply(
                    StatusCode::OK,
                    json!({"took": 1, "errors": true, "items": [{"index": {
                        "_index": "sightline-2024.01.01", "_id": "rejected", "status": 400,
                        "error": {"type": "mapper_parsing_exception", "reason": "failed to parse"}
                    }}]}),
                )
            } else {
                reply(
                    StatusCode::OK,
                    json!({"took": 1, "errors": false, "items": [{"index": {
                        "_index": "sightline-2024.01.01", "_id": "a", "status": 201, "result": "created"
                    }}]}),
                )
            }
        }
        ("HEAD", "/sightline") => StatusCode::OK.into_response(),
        ("HEAD", _) => StatusCode::NOT_FOUND.into_response(),
        ("PUT", "/taken") => reply(
            StatusCode::BAD_REQUEST,
            json!({"error": {"type": "resource_already_exists_exception", "reason": "index [taken/x] already exists"}, "status": 400}),
        ),
        ("PUT", _) => reply(StatusCode::OK, json!({"acknowledged": true})),
        ("DELETE", "/gone") => reply(
            StatusCode::NOT_FOUND,
            json!({"error": {"type": "index_not_found_exception", "reason": "no such index [gone]"}, "status": 404}),
        ),
        ("DELETE", _) => reply(StatusCode::OK, json!({"acknowledged": true})),
        ("POST", "/_aliases") => reply(StatusCode::OK, json!({"acknowledged": true})),
        ("GET", "/_alias/sightline") => reply(
            StatusCode::OK,
            json!({
                "sightline-2024.01.02": {"aliases": {"sightline": {"is_write_index": true}}},
                "sightline-2024.01.01": {"aliases": {"sightline": {"is_write_index": false}}}
            }),
        ),
        ("GET", _) => reply(
            StatusCode::NOT_FOUND,
            json!({"error": "alias [other] missing", "status": 404}),
        ),
        ("POST", "/sightline/_delete_by_query") => {
            reply(StatusCode::OK, json!({"took": 5, "total": 4, "deleted": 3, "failures": []}))
        }
        ("POST", "/sightline/_flush") => {
            reply(StatusCode::OK, json!({"_shards": {"total": 1, "successful": 1, "failed": 0}}))
        }
        _ => reply(
            StatusCode::BAD_REQUEST,
            json!({"error": {"type": "parsing_exception", "reason": format!("unexpected {} {}", method, path)}, "status": 400}),
        ),
    }
}

/// Start the fake engine on a random port and return a client pointed at it.
async fn start_fake(config: impl FnOnce(&mut ElasticsearchConfig)) -> (Fake, ElasticsearchStore) {
    let fake = Fake::default();
    let router = Router::new().fallback(handle).with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let mut es = ElasticsearchConfig::new(format!("http://{}", addr));
    es.max_retries = 0;
    config(&mut es);
    let store = ElasticsearchStore::new(&es).unwrap();
    (fake, store)
}

fn bulk_doc(index: &str, id: &str) -> BulkDocument {
    BulkDocument {
        index: index.to_string(),
        id: id.to_string(),
        source: json!({"uuid": id}),
        require_alias: true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_search_posts_query_body() {
    let (fake, store) = start_fake(|_| {}).await;

    let request = SearchRequest::new(EsQuery::filter(vec![EsQuery::term("type", "request")]))
        .size(5)
        .sort_desc("created_at");
    let response = store.search("sightline", &request).await.unwrap();

    assert_eq!(response.total(), 1);
    assert_eq!(response.hits.hits[0].index, "sightline-2024.01.01");
    assert_eq!(response.hits.hits[0].source["uuid"], json!("u1"));

    let recorded = fake.last();
    assert_eq!(recorded.method, Method::POST);
    assert_eq!(recorded.path, "/sightline/_search");
    assert_eq!(recorded.content_type.as_deref(), Some("application/json"));
    let body: Value = serde_json::from_str(&recorded.body).unwrap();
    assert_eq!(body["size"], json!(5));
    assert_eq!(body["query"]["bool"]["filter"][0], json!({"term": {"type": "request"}}));
}

#[tokio::test]
async fn test_search_error_mapping() {
    let (_fake, store) = start_fake(|_| {}).await;
    let request = SearchRequest::new(EsQuery::match_all());

    let err = store.search("absent", &request).await.unwrap_err();
    assert!(matches!(err, StoreError::IndexNotFound(ref i) if i == "absent"));

    let err = store.search("broken", &request).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
}

#[tokio::test]
async fn test_bulk_sends_ndjson_with_refresh() {
    let (fake, store) = start_fake(|_| {}).await;

    let response = store.bulk(vec![bulk_doc("sightline", "a")]).await.unwrap();
    assert!(!response.errors);

    let recorded = fake.last();
    assert_eq!(recorded.path, "/_bulk?refresh=wait_for");
    assert_eq!(recorded.content_type.as_deref(), Some("application/x-ndjson"));
    let lines: Vec<&str> = recorded.body.lines().collect();
    assert_eq!(lines.len(), 2);
    let meta: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(
        meta,
        json!({"index": {"_index": "sightline", "_id": "a", "require_alias": true}})
    );
}

#[tokio::test]
async fn test_bulk_empty_sends_nothing() {
    let (fake, store) = start_fake(|_| {}).await;
    let response = store.bulk(Vec::new()).await.unwrap();
    assert!(response.items.is_empty());
    assert!(fake.requests().is_empty());
}

#[tokio::test]
async fn test_bulk_item_index_missing_is_an_error() {
    let (_fake, store) = start_fake(|_| {}).await;
    let err = store.bulk(vec![bulk_doc("missing", "a")]).await.unwrap_err();
    assert!(matches!(err, StoreError::IndexNotFound(ref i) if i == "missing"));
}

#[tokio::test]
async fn test_bulk_other_item_failures_are_returned() {
    let (_fake, store) = start_fake(|_| {}).await;
    let response = store.bulk(vec![bulk_doc("sightline", "rejected")]).await.unwrap();
    assert!(response.errors);
    assert_eq!(response.failed_items().count(), 1);
}

#[tokio::test]
async fn test_index_lifecycle_calls() {
    let (fake, store) = start_fake(|_| {}).await;

    assert!(store.index_exists("sightline").await.unwrap());
    assert!(!store.index_exists("nothing").await.unwrap());

    store
        .create_index("sightline-2024.01.03", &json!({"mappings": {}}))
        .await
        .unwrap();
    let err = store.create_index("taken", &json!({})).await.unwrap_err();
    assert!(err.is_already_exists());

    store.delete_index("sightline-2024.01.01").await.unwrap();
    let err = store.delete_index("gone").await.unwrap_err();
    assert!(err.is_not_found());

    let methods: Vec<_> = fake
        .requests()
        .iter()
        .map(|r| format!("{} {}", r.method, r.path))
        .collect();
    assert_eq!(
        methods,
        vec![
            "HEAD /sightline",
            "HEAD /nothing",
            "PUT /sightline-2024.01.03",
            "PUT /taken",
            "DELETE /sightline-2024.01.01",
            "DELETE /gone",
        ]
    );
}

#[tokio::test]
async fn test_alias_calls() {
    let (fake, store) = start_fake(|_| {}).await;

    store
        .update_aliases(&[
            AliasAction::add("sightline-2024.01.02", "sightline", Some(true)),
            AliasAction::add("sightline-2024.01.01", "sightline", Some(false)),
        ])
        .await
        .unwrap();
    let body: Value = serde_json::from_str(&fake.last().body).unwrap();
    assert_eq!(body["actions"].as_array().unwrap().len(), 2);
    assert_eq!(body["actions"][0]["add"]["is_write_index"], json!(true));

    let targets = store.alias_targets("sightline").await.unwrap();
    assert_eq!(targets, vec!["sightline-2024.01.01", "sightline-2024.01.02"]);

    assert!(store.alias_targets("other").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_by_query_and_flush() {
    let (fake, store) = start_fake(|_| {}).await;

    let query = EsQuery::range(
        "created_at",
        RangeParams::lt("2024-01-01 00:00:00").with_format("yyyy-MM-dd HH:mm:ss"),
    );
    let response = store.delete_by_query("sightline", &query).await.unwrap();
    assert_eq!(response.deleted_count(), 3);

    let recorded = fake.last();
    assert_eq!(
        recorded.path,
        "/sightline/_delete_by_query?refresh=true&conflicts=proceed"
    );
    let body: Value = serde_json::from_str(&recorded.body).unwrap();
    assert_eq!(body["query"]["range"]["created_at"]["lt"], json!("2024-01-01 00:00:00"));

    store.flush("sightline").await.unwrap();
    assert_eq!(fake.last().path, "/sightline/_flush");
}

#[tokio::test]
async fn test_basic_auth_header() {
    let (fake, store) = start_fake(|c| {
        c.username = Some("elastic".to_string());
        c.password = Some("changeme".to_string());
    })
    .await;

    store.index_exists("sightline").await.unwrap();
    // base64("elastic:changeme")
    assert_eq!(
        fake.last().authorization.as_deref(),
        Some("Basic ZWxhc3RpYzpjaGFuZ2VtZQ==")
    );
}

#[tokio::test]
async fn test_api_key_takes_precedence() {
    let (fake, store) = start_fake(|c| {
        c.username = Some("elastic".to_string());
        c.api_key = Some("a2V5OnNlY3JldA==".to_string());
    })
    .await;

    store.index_exists("sightline").await.unwrap();
    assert_eq!(
        fake.last().authorization.as_deref(),
        Some("ApiKey a2V5OnNlY3JldA==")
    );
}

#[tokio::test]
async fn test_unreachable_engine_is_unavailable() {
    let mut config = ElasticsearchConfig::new("http://127.0.0.1:1");
    config.max_retries = 0;
    config.connect_timeout_secs = 1;
    let store = ElasticsearchStore::new(&config).unwrap();

    let err = store.index_exists("sightline").await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
}
