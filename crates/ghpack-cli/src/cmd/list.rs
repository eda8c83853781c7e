use anyhow::{Context, Result};
use ghpack_core::{Config, catalog};

/// Print the catalog of packaged artifacts as JSON
pub async fn list(config: &Config) -> Result<()> {
    let entries = catalog::list(&config.storage_dir, config)
        .await
        .context("Failed to read the storage directory")?;

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
