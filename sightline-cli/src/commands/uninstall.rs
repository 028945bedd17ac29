use anyhow::{Context, Result};
use sightline::IndexManager;

pub async fn run_uninstall(indices: &IndexManager) -> Result<()> {
    let dropped = indices.uninstall().await.context("Uninstall failed")?;

    if dropped.is_empty() {
        println!("Nothing bound to alias '{}'.", indices.alias());
        return Ok(());
    }

    for index in &dropped {
        println!("Dropped {}", index);
    }
    println!("Removed {} index(es).", dropped.len());

    Ok(())
}
