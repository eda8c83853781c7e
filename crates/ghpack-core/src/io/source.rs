//! Byte-stream sources for remote archives.
//!
//! A [`StreamSource`] turns an [`ArchiveTarget`] into a sequential byte
//! stream. The pipeline only sees the trait, so HTTP and local files are
//! interchangeable.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use futures::TryStreamExt;
use ghpack_schema::ArchiveTarget;
use reqwest::Client;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

/// An open archive byte stream. Dropping it closes the underlying handle.
pub type ArchiveStream = Box<dyn AsyncRead + Send + Unpin>;

/// Accept header sent to the hosting service.
pub const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// Failure to open an archive stream.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Transport-level failure: DNS, connect, TLS, missing local file root.
    #[error("source unreachable: {0}")]
    Unreachable(String),

    /// The remote answered with a non-success status.
    #[error("upstream rejected request: HTTP {status}")]
    Rejected {
        /// Status code returned by the remote.
        status: u16,
    },
}

/// Something that can open a byte stream for an archive target.
///
/// One attempt per call; retry policy belongs to the caller.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Open the archive for sequential reading.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unreachable`] on transport failure and
    /// [`SourceError::Rejected`] when the remote refuses the request.
    async fn open(&self, target: &ArchiveTarget) -> Result<ArchiveStream, SourceError>;
}

/// Fetches archives over HTTP(S) from `target.source_url()`.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    token: Option<String>,
}

impl HttpSource {
    /// Create a source using `client`, authenticating with `token` when set.
    pub fn new(client: Client, token: Option<String>) -> Self {
        Self { client, token }
    }
}

#[async_trait]
impl StreamSource for HttpSource {
    async fn open(&self, target: &ArchiveTarget) -> Result<ArchiveStream, SourceError> {
        let mut request = self
            .client
            .get(target.source_url())
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SourceError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Rejected {
                status: status.as_u16(),
            });
        }

        tracing::debug!(
            archive = %target,
            length = ?response.content_length(),
            "Archive response accepted"
        );

        // Body errors become ConnectionAborted so the extractor can tell a
        // dropped connection apart from a local disk failure.
        let body = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::ConnectionAborted, e));

        Ok(Box::new(StreamReader::new(Box::pin(body))))
    }
}

/// Serves archives from `<root>/<owner>/<name>.tar.gz` on local disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    /// Create a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Location of the archive for `target`.
    pub fn path_for(&self, target: &ArchiveTarget) -> PathBuf {
        self.root
            .join(target.owner())
            .join(format!("{}.tar.gz", target.name()))
    }
}

#[async_trait]
impl StreamSource for FileSource {
    async fn open(&self, target: &ArchiveTarget) -> Result<ArchiveStream, SourceError> {
        let path = self.path_for(target);
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(SourceError::Rejected { status: 404 })
            }
            Err(e) => Err(SourceError::Unreachable(format!(
                "{}: {e}",
                path.display()
            ))),
        }
    }
}
