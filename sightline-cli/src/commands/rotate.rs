//! Rotate command: move writes to the index for the current period.

use anyhow::{Context, Result};
use sightline::IndexManager;

pub async fn run_rotate(indices: &IndexManager) -> Result<()> {
    let result = indices.rotate().await.context("Rotation failed")?;

    if result.created {
        println!("Created {}", result.write_index);
    } else {
        println!("Write index {} already current", result.write_index);
    }
    for index in &result.read_indices {
        println!("  read-only: {}", index);
    }

    Ok(())
}
