//! ghpack - GitHub repository export and repackaging CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ghpack_cli::cmd;
use ghpack_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.global.into_config();
    tracing::debug!(?config, "Configuration loaded");

    match cli.command {
        Commands::UserRepos { user } => cmd::repos::user_repos(&config, &user).await,
        Commands::OrgRepos { org } => cmd::repos::org_repos(&config, &org).await,
        Commands::Repo { owner, name } => cmd::repos::repo(&config, &owner, &name).await,
        Commands::Download { owner, name } => {
            cmd::download::download(&config, &owner, &name).await
        }
        Commands::List => cmd::list::list(&config).await,
    }
}
