use anyhow::{Context, Result};
use sightline::{EntriesRepository, EntryRepository};

pub async fn run_clear(repository: &EntryRepository) -> Result<()> {
    repository.clear().await.context("Clear failed")?;
    println!("Cleared all entries.");
    Ok(())
}
