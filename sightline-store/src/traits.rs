//! Core store trait definition.
//!
//! `StoreClient` exposes exactly the engine operations Sightline issues,
//! one method per operation, so both the HTTP client and the in-memory
//! store can stand behind the same seam.

use async_trait::async_trait;
use serde_json::Value;

use crate::dsl::{AliasAction, BulkDocument, EsQuery, SearchRequest};
use crate::error::Result;
use crate::response::{BulkResponse, DeleteByQueryResponse, SearchResponse};

/// Search engine operations used by the index manager and entry repository.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one client is shared by every
/// repository instance through an `Arc`.
///
/// # Error Handling
///
/// A missing index or alias is always reported as
/// `StoreError::IndexNotFound`, and creating an index that already exists as
/// `StoreError::IndexAlreadyExists`, whatever the transport.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Run a search against an index or alias.
    async fn search(&self, index: &str, request: &SearchRequest) -> Result<SearchResponse>;

    /// Upsert documents in one bulk request.
    ///
    /// Item-level failures are returned in the response, except that an
    /// item rejected because its target index is missing fails the whole
    /// call with `IndexNotFound`.
    async fn bulk(&self, documents: Vec<BulkDocument>) -> Result<BulkResponse>;

    /// Check whether an index or alias exists.
    async fn index_exists(&self, index: &str) -> Result<bool>;

    /// Create a concrete index with the given settings/mappings body.
    async fn create_index(&self, index: &str, body: &Value) -> Result<()>;

    /// Delete a concrete index.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::IndexNotFound` if the index does not exist.
    async fn delete_index(&self, index: &str) -> Result<()>;

    /// Apply alias actions atomically.
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<()>;

    /// Concrete indices an alias points at; empty when the alias is absent.
    async fn alias_targets(&self, alias: &str) -> Result<Vec<String>>;

    /// Delete every document matching `query`.
    async fn delete_by_query(&self, index: &str, query: &EsQuery)
        -> Result<DeleteByQueryResponse>;

    /// Flush an index to durable storage.
    async fn flush(&self, index: &str) -> Result<()>;
}
