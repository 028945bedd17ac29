//! Install command: create the write index behind the alias.

use anyhow::{Context, Result};
use sightline::IndexManager;

pub async fn run_install(indices: &IndexManager, force: bool) -> Result<()> {
    if force {
        let dropped = indices
            .uninstall()
            .await
            .context("Failed to remove existing indices")?;
        for index in &dropped {
            println!("Dropped {}", index);
        }
    }

    let index = indices.install().await.context("Install failed")?;

    println!("Installed.");
    println!("  Alias: {}", indices.alias());
    println!("  Write index: {}", index);

    Ok(())
}
