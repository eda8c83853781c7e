use anyhow::{Context, Result};
use ghpack_core::forge::{ApiResponse, GitHubClient};
use ghpack_core::{Config, export};

/// Export label for user listings.
const USERS_LABEL: &str = "users";
/// Export label for organization listings.
const ORGS_LABEL: &str = "orgs";

/// List a user's repositories
pub async fn user_repos(config: &Config, user: &str) -> Result<()> {
    let response = client(config)?
        .user_repos(user)
        .await
        .with_context(|| format!("Failed to fetch repositories for user '{user}'"))?;
    export_and_print(config, &response, user, USERS_LABEL)
}

/// List an organization's repositories
pub async fn org_repos(config: &Config, org: &str) -> Result<()> {
    if config.token.is_none() {
        tracing::warn!("GH_TOKEN is not set; private organization repositories will be missing");
    }
    let response = client(config)?
        .org_repos(org)
        .await
        .with_context(|| format!("Failed to fetch repositories for organization '{org}'"))?;
    export_and_print(config, &response, org, ORGS_LABEL)
}

/// Show a single repository
pub async fn repo(config: &Config, owner: &str, name: &str) -> Result<()> {
    let response = client(config)?
        .repo(owner, name)
        .await
        .with_context(|| format!("Failed to fetch repository '{owner}/{name}'"))?;
    export_and_print(config, &response, owner, name)
}

fn client(config: &Config) -> Result<GitHubClient> {
    GitHubClient::from_config(config).context("Failed to build HTTP client")
}

fn export_and_print(
    config: &Config,
    response: &ApiResponse,
    namespace: &str,
    resource: &str,
) -> Result<()> {
    let path = export::write_csv(&config.export_dir, &response.body, namespace, resource)
        .context("Failed to export CSV")?;
    tracing::info!(path = %path.display(), records = response.payload.len(), "Exported");

    println!("{}", serde_json::to_string_pretty(&response.payload)?);
    Ok(())
}
