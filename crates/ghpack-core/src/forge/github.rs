//! GitHub REST client for repository metadata.

use bytes::Bytes;
use ghpack_schema::RepoPayload;
use reqwest::Client;
use thiserror::Error;

use crate::Config;
use crate::io::source::GITHUB_ACCEPT;

/// Errors returned by the metadata API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport failure or unreadable body.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API rejected request: HTTP {status}")]
    Rejected {
        /// Status code returned by the API.
        status: u16,
    },

    /// The body is not a repository record or array of records.
    #[error("failed to decode repository payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// A decoded API answer that keeps the raw body for export.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Body exactly as received.
    pub body: Bytes,
    /// Decoded records.
    pub payload: RepoPayload,
}

/// Client for the repository endpoints of the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    /// Create a client against `api_url`.
    pub fn new(client: Client, api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Create a client from the process configuration.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        Ok(Self::new(
            config.http_client()?,
            config.api_url.clone(),
            config.token.clone(),
        ))
    }

    /// Repositories of `user`, most recently updated first.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn user_repos(&self, user: &str) -> Result<ApiResponse, ApiError> {
        self.get(&format!("/users/{user}/repos?sort=updated")).await
    }

    /// Repositories of organization `org`, most recently updated first.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn org_repos(&self, org: &str) -> Result<ApiResponse, ApiError> {
        self.get(&format!("/orgs/{org}/repos?sort=updated")).await
    }

    /// A single repository.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn repo(&self, owner: &str, name: &str) -> Result<ApiResponse, ApiError> {
        self.get(&format!("/repos/{owner}/{name}")).await
    }

    async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{path}", self.api_url);
        tracing::debug!(%url, "GitHub API request");

        let mut request = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%url, status = status.as_u16(), "GitHub API rejected request");
            return Err(ApiError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let payload = RepoPayload::from_slice(&body)?;
        tracing::debug!(%url, records = payload.len(), "GitHub API response decoded");

        Ok(ApiResponse { body, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const REPO: &str = r#"{"id": 1, "name": "hello", "url": "https://api.github.com/repos/octocat/hello", "description": null, "fork": false}"#;

    #[tokio::test]
    async fn test_user_repos_sorted_by_update() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/users/octocat/repos")
            .match_query(Matcher::UrlEncoded("sort".into(), "updated".into()))
            .match_header("accept", GITHUB_ACCEPT)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!("[{REPO}]"))
            .create_async()
            .await;

        let client = GitHubClient::new(Client::new(), server.url(), None);
        let response = client.user_repos("octocat").await.unwrap();

        m.assert_async().await;
        assert_eq!(response.payload.len(), 1);
        assert_eq!(response.body, format!("[{REPO}]").as_bytes());
    }

    #[tokio::test]
    async fn test_org_repos_sends_token() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", "/orgs/rust-lang/repos")
            .match_query(Matcher::UrlEncoded("sort".into(), "updated".into()))
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = GitHubClient::new(Client::new(), server.url(), Some("tok".to_string()));
        let response = client.org_repos("rust-lang").await.unwrap();

        m.assert_async().await;
        assert!(response.payload.is_empty());
    }

    #[tokio::test]
    async fn test_single_repo() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/octocat/hello")
            .with_status(200)
            .with_body(REPO)
            .create_async()
            .await;

        let client = GitHubClient::new(Client::new(), format!("{}/", server.url()), None);
        let response = client.repo("octocat", "hello").await.unwrap();
        assert!(matches!(response.payload, RepoPayload::One(_)));
        assert_eq!(response.payload.into_records()[0].name, "hello");
    }

    #[tokio::test]
    async fn test_rejected_status() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/octocat/nope")
            .with_status(404)
            .with_body(r#"{"message": "Not Found"}"#)
            .create_async()
            .await;

        let client = GitHubClient::new(Client::new(), server.url(), None);
        let err = client.repo("octocat", "nope").await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected { status: 404 }));
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/octocat/odd")
            .with_status(200)
            .with_body("<html></html>")
            .create_async()
            .await;

        let client = GitHubClient::new(Client::new(), server.url(), None);
        let err = client.repo("octocat", "odd").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
