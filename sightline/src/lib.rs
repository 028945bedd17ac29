//! Structured entry store for profiler events on top of Elasticsearch.
//!
//! Captured entries (requests, queries, exceptions, jobs, ...) are written
//! as documents through an alias that fronts one or more concrete indices,
//! and read back as typed [`Entry`] values.
//!
//! ```text
//! caller ──► EntryRepository ──► query ──► StoreClient ──► EntryCodec   (reads)
//!                    │
//!                    └─────────► EntryCodec ──► StoreClient::bulk        (writes)
//!                    │
//!                    └─ IndexManager (created lazily on first write)
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use serde_json::json;
//! use sightline::{Config, EntriesRepository, Entry, EntryType, QueryOptions};
//!
//! # async fn example() -> sightline::Result<()> {
//! let config = Config::load()?;
//! let store = config.create_store()?;
//! let repository = config.repository(store);
//!
//! let entry = Entry::new(EntryType::Request, json!({"uri": "/orders", "response_status": 200}))
//!     .with_batch_id("b-1")
//!     .with_tags(["status:200"]);
//! repository.store(vec![entry]).await?;
//!
//! let recent = repository
//!     .list(Some(EntryType::Request), &QueryOptions::new().for_batch("b-1"))
//!     .await?;
//! println!("{} requests", recent.len());
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod entry;
pub mod error;
pub mod index;
pub mod monitoring;
pub mod query;
pub mod repository;

pub use codec::{format_tag, EntryCodec, EntryDocument, TagDocument};
pub use config::Config;
pub use entry::{Entry, EntryType, EntryUpdate, QueryOptions, TagsChanges};
pub use error::{Error, Result};
pub use index::{IndexManager, IndexSettings, Rotation, RotationResult};
pub use monitoring::{MemoryMonitoring, MonitoringSource, NoMonitoring};
pub use repository::{EntriesRepository, EntryRepository, RepositorySettings};
