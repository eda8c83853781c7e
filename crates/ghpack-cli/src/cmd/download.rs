use anyhow::{Context, Result};
use ghpack_core::{Config, Pipeline};

/// Fetch `owner/name`, repackage it as a zip and print the artifact path.
///
/// Ctrl-C cancels the run.
pub async fn download(config: &Config, owner: &str, name: &str) -> Result<()> {
    let pipeline = Pipeline::http(config.clone()).context("Failed to build HTTP client")?;

    let cancel = pipeline.cancel_token().clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling download");
            cancel.cancel();
        }
    });

    let result = pipeline.retrieve_and_package(owner, name).await;
    interrupt.abort();

    let packaged = result.map_err(|e| {
        let kind = e.kind();
        anyhow::Error::new(e).context(format!("Failed to download {owner}/{name} ({kind:?})"))
    })?;

    println!("{}", packaged.path.display());
    Ok(())
}
