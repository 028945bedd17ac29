//! Sources of the monitored-tag watch-list.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;

/// Backing store for monitored tags.
///
/// The repository loads the list once per lifecycle and persists only the
/// tags that actually change.
#[async_trait]
pub trait MonitoringSource: Send + Sync {
    async fn load(&self) -> Result<Vec<String>>;

    async fn add(&self, tags: &[String]) -> Result<()>;

    async fn remove(&self, tags: &[String]) -> Result<()>;
}

/// Empty watch-list; persistence is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMonitoring;

#[async_trait]
impl MonitoringSource for NoMonitoring {
    async fn load(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn add(&self, _tags: &[String]) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _tags: &[String]) -> Result<()> {
        Ok(())
    }
}

/// Process-local watch-list that counts loads.
#[derive(Debug, Default)]
pub struct MemoryMonitoring {
    tags: RwLock<Vec<String>>,
    loads: AtomicUsize,
}

impl MemoryMonitoring {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: RwLock::new(tags.into_iter().map(Into::into).collect()),
            loads: AtomicUsize::new(0),
        }
    }

    /// Number of times `load` was called.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags.read().clone()
    }
}

#[async_trait]
impl MonitoringSource for MemoryMonitoring {
    async fn load(&self) -> Result<Vec<String>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.tags.read().clone())
    }

    async fn add(&self, tags: &[String]) -> Result<()> {
        let mut current = self.tags.write();
        for tag in tags {
            if !current.contains(tag) {
                current.push(tag.clone());
            }
        }
        Ok(())
    }

    async fn remove(&self, tags: &[String]) -> Result<()> {
        self.tags.write().retain(|t| !tags.contains(t));
        Ok(())
    }
}
