//! Elasticsearch REST client.
//!
//! Talks to a single cluster endpoint over HTTP with `reqwest`, retrying
//! transient failures with exponential backoff.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ElasticsearchConfig, RefreshPolicy};
use crate::dsl::{to_ndjson, AliasAction, BulkDocument, EsQuery, SearchRequest};
use crate::error::{Result, StoreError};
use crate::response::{BulkResponse, DeleteByQueryResponse, EsErrorResponse, SearchResponse};
use crate::traits::StoreClient;

const INDEX_NOT_FOUND: &str = "index_not_found_exception";
const ALREADY_EXISTS: &str = "resource_already_exists_exception";

#[derive(Clone)]
enum Auth {
    None,
    Basic {
        username: String,
        password: Option<String>,
    },
    ApiKey(String),
}

/// `StoreClient` backed by the Elasticsearch REST API.
#[derive(Clone)]
pub struct ElasticsearchStore {
    client: ClientWithMiddleware,
    base_url: String,
    auth: Auth,
    refresh: RefreshPolicy,
}

impl std::fmt::Debug for ElasticsearchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchStore")
            .field("base_url", &self.base_url)
            .field("refresh", &self.refresh)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchStore {
    /// Build a client from configuration. No request is sent.
    pub fn new(config: &ElasticsearchConfig) -> Result<Self> {
        config.validate()?;

        let base_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| StoreError::Config(format!("failed to build HTTP client: {}", e)))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);

        let client = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let auth = match (&config.api_key, &config.username) {
            (Some(key), _) => Auth::ApiKey(key.clone()),
            (None, Some(username)) => Auth::Basic {
                username: username.clone(),
                password: config.password.clone(),
            },
            (None, None) => Auth::None,
        };

        info!(url = %config.url, refresh = config.refresh.as_param(), "Elasticsearch client configured");

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            auth,
            refresh: config.refresh,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.auth {
            Auth::None => builder,
            Auth::Basic { username, password } => builder.basic_auth(username, password.as_ref()),
            Auth::ApiKey(key) => builder.header(AUTHORIZATION, format!("ApiKey {}", key)),
        }
    }

    fn json_request(&self, method: Method, path: &str, body: &impl serde::Serialize) -> Result<RequestBuilder> {
        let body = serde_json::to_vec(body)?;
        Ok(self
            .request(method, path)
            .header(CONTENT_TYPE, "application/json")
            .body(body))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<(StatusCode, String)> {
        let response = builder.send().await.map_err(|e| {
            error!(error = %e, "Elasticsearch request failed");
            StoreError::Unavailable(e.to_string())
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!(error = %e, "failed to read Elasticsearch response body");
            StoreError::Unavailable(e.to_string())
        })?;
        Ok((status, body))
    }

    /// Send and decode a JSON body, mapping non-2xx statuses to errors.
    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, target: &str) -> Result<T> {
        let (status, body) = self.send(builder).await?;
        if !status.is_success() {
            return Err(Self::error_from_status(status, &body, target));
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Send and discard the body, mapping non-2xx statuses to errors.
    async fn send_unit(&self, builder: RequestBuilder, target: &str) -> Result<()> {
        let (status, body) = self.send(builder).await?;
        if !status.is_success() {
            return Err(Self::error_from_status(status, &body, target));
        }
        Ok(())
    }

    /// Convert an error status and body into a `StoreError`.
    pub(crate) fn error_from_status(status: StatusCode, body: &str, target: &str) -> StoreError {
        let parsed: Option<EsErrorResponse> = serde_json::from_str(body).ok();
        let error_type = parsed
            .as_ref()
            .and_then(|p| p.error.error_type())
            .unwrap_or_default()
            .to_string();
        let reason = parsed
            .as_ref()
            .map(|p| p.error.reason())
            .unwrap_or_else(|| body.to_string());

        if error_type == ALREADY_EXISTS {
            return StoreError::IndexAlreadyExists(target.to_string());
        }

        if error_type == INDEX_NOT_FOUND
            || (status == StatusCode::NOT_FOUND && error_type.is_empty())
        {
            return StoreError::IndexNotFound(target.to_string());
        }

        if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            error!(status = status.as_u16(), reason = %reason, "Elasticsearch unavailable");
            return StoreError::Unavailable(format!("status {}: {}", status.as_u16(), reason));
        }

        if status == StatusCode::NOT_FOUND {
            return StoreError::IndexNotFound(target.to_string());
        }

        StoreError::Http {
            status: status.as_u16(),
            reason,
        }
    }
}

#[async_trait]
impl StoreClient for ElasticsearchStore {
    #[instrument(skip(self, request), fields(index = %index))]
    async fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse> {
        debug!(body = %serde_json::to_string(request)?, "search");
        let builder = self.json_request(Method::POST, &format!("{}/_search", index), request)?;
        self.send_json(builder, index).await
    }

    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn bulk(&self, documents: Vec<BulkDocument>) -> Result<BulkResponse> {
        if documents.is_empty() {
            return Ok(BulkResponse::default());
        }

        let body = to_ndjson(&documents)?;
        let builder = self
            .request(
                Method::POST,
                &format!("_bulk?refresh={}", self.refresh.as_param()),
            )
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);

        let response: BulkResponse = self.send_json(builder, "_bulk").await?;

        if response.errors {
            let failed: Vec<_> = response.failed_items().collect();
            if let Some(missing) = failed.iter().find(|item| {
                item.error
                    .as_ref()
                    .is_some_and(|e| e.error_type == INDEX_NOT_FOUND)
            }) {
                return Err(StoreError::IndexNotFound(missing.index.clone()));
            }
            warn!(failed = failed.len(), "bulk request had item failures");
        }

        debug!(took = response.took, "bulk complete");
        Ok(response)
    }

    #[instrument(skip(self))]
    async fn index_exists(&self, index: &str) -> Result<bool> {
        let (status, body) = self.send(self.request(Method::HEAD, index)).await?;
        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(Self::error_from_status(s, &body, index)),
        }
    }

    #[instrument(skip(self, body))]
    async fn create_index(&self, index: &str, body: &Value) -> Result<()> {
        let builder = self.json_request(Method::PUT, index, body)?;
        self.send_unit(builder, index).await?;
        info!(index = %index, "created index");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_index(&self, index: &str) -> Result<()> {
        self.send_unit(self.request(Method::DELETE, index), index)
            .await?;
        info!(index = %index, "deleted index");
        Ok(())
    }

    #[instrument(skip(self, actions), fields(count = actions.len()))]
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<()> {
        let body = json!({ "actions": actions });
        let builder = self.json_request(Method::POST, "_aliases", &body)?;
        self.send_unit(builder, "_aliases").await
    }

    #[instrument(skip(self))]
    async fn alias_targets(&self, alias: &str) -> Result<Vec<String>> {
        let (status, body) = self
            .send(self.request(Method::GET, &format!("_alias/{}", alias)))
            .await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(Self::error_from_status(status, &body, alias));
        }
        let indices: Map<String, Value> = serde_json::from_str(&body)?;
        let mut targets: Vec<String> = indices.keys().cloned().collect();
        targets.sort();
        Ok(targets)
    }

    #[instrument(skip(self, query), fields(index = %index))]
    async fn delete_by_query(
        &self,
        index: &str,
        query: &EsQuery,
    ) -> Result<DeleteByQueryResponse> {
        let body = json!({ "query": query });
        let builder = self.json_request(
            Method::POST,
            &format!("{}/_delete_by_query?refresh=true&conflicts=proceed", index),
            &body,
        )?;
        let response: DeleteByQueryResponse = self.send_json(builder, index).await?;
        if !response.failures.is_empty() {
            warn!(failures = response.failures.len(), "delete by query reported failures");
        }
        Ok(response)
    }

    #[instrument(skip(self))]
    async fn flush(&self, index: &str) -> Result<()> {
        self.send_unit(self.request(Method::POST, &format!("{}/_flush", index)), index)
            .await
    }
}
