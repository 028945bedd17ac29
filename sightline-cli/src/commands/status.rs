//! Status command: report what the alias currently points at.

use anyhow::{Context, Result};
use sightline::IndexManager;

pub async fn run_status(indices: &IndexManager) -> Result<()> {
    let targets = indices.targets().await.context("Failed to read alias")?;
    let current = indices.current_index();

    println!("Alias: {}", indices.alias());
    if targets.is_empty() {
        println!("  not installed (run `sightline install`)");
        return Ok(());
    }

    for index in &targets {
        let marker = if *index == current { " (current)" } else { "" };
        println!("  {}{}", index, marker);
    }
    if !targets.contains(&current) {
        println!("  {} missing, run `sightline rotate`", current);
    }

    Ok(())
}
