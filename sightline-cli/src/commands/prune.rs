//! Prune command: delete entries older than a cutoff.

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use sightline::{EntriesRepository, EntryRepository};

pub async fn run_prune(repository: &EntryRepository, hours: i64) -> Result<()> {
    if hours < 0 {
        bail!("--hours must not be negative (got {})", hours);
    }

    let before = Duration::try_hours(hours)
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .with_context(|| format!("--hours {} is out of range", hours))?;
    tracing::info!(%before, hours, "Pruning entries");

    let deleted = repository.prune(before).await.context("Prune failed")?;
    println!("Pruned {} entries created before {}", deleted, before.format("%Y-%m-%d %H:%M:%S"));

    Ok(())
}
