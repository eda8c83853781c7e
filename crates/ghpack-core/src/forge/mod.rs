//! Hosting API clients.

pub mod github;

pub use github::{ApiError, ApiResponse, GitHubClient};
