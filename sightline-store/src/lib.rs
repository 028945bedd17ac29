//! Search engine client seam for Sightline.
//!
//! This crate defines the `StoreClient` trait that the entry repository and
//! index manager talk to, the Query DSL and response types they exchange,
//! and two implementations:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  sightline (IndexManager, EntryRepository)   │
//! └──────────────────────┬───────────────────────┘
//!                        ▼
//!              ┌──────────────────┐
//!              │   StoreClient    │  ← one method per engine operation
//!              └────────┬─────────┘
//!             ┌─────────┴──────────┐
//!             ▼                    ▼
//!   ┌────────────────────┐  ┌─────────────┐
//!   │ ElasticsearchStore │  │ MemoryStore │
//!   └────────────────────┘  └─────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use sightline_store::{ElasticsearchConfig, ElasticsearchStore, EsQuery, SearchRequest, StoreClient};
//!
//! # async fn example() -> sightline_store::Result<()> {
//! let store = ElasticsearchStore::new(&ElasticsearchConfig::new("http://localhost:9200"))?;
//!
//! let request = SearchRequest::new(EsQuery::term("type", "exception"))
//!     .size(10)
//!     .sort_desc("created_at");
//! let response = store.search("sightline", &request).await?;
//! println!("{} hits", response.total());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dsl;
mod elasticsearch;
mod error;
mod memory;
pub mod response;
mod traits;

pub use config::{ElasticsearchConfig, RefreshPolicy};
pub use dsl::{AliasAction, BulkDocument, EsQuery, RangeParams, SearchRequest};
pub use elasticsearch::ElasticsearchStore;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use response::{BulkResponse, DeleteByQueryResponse, Hit, SearchResponse};
pub use traits::StoreClient;
