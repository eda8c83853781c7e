//! Fetch → extract → package orchestration.
//!
//! One [`Pipeline::run`] moves a target through `Fetching`, `Extracting` and
//! `Packaging`. Each stage either hands its output to the next or fails the
//! run with a [`PipelineError`] naming the target and the stage. Nothing is
//! retried and nothing is rolled back: a failed packaging step leaves the
//! extraction directory in place.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use ghpack_schema::{ArchiveTarget, TargetError};
use thiserror::Error;
use tokio_util::io::{ReaderStream, StreamReader, SyncIoBridge};
use tokio_util::sync::CancellationToken;

use crate::Config;
use crate::catalog::{self, CatalogEntry, CatalogError};
use crate::io::extract::{self, ExtractError};
use crate::io::package::{self, PackageError, PackagedArchive};
use crate::io::source::{ArchiveStream, HttpSource, SourceError, StreamSource};
use crate::lock::TargetLocks;

/// Pipeline stage a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Validating the target and opening the source stream.
    Fetching,
    /// Unpacking the stream into the extraction directory.
    Extracting,
    /// Writing the zip artifact.
    Packaging,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Packaging => "packaging",
        })
    }
}

/// Flat classification of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Owner or name is not usable as a path component.
    InvalidTarget,
    /// The source could not be reached, or the stream broke off.
    UnreachableSource,
    /// The source answered with a non-success status.
    UpstreamRejected,
    /// The stream is not valid gzip/tar data.
    CorruptCompression,
    /// An archive entry tried to leave the extraction root.
    UnsafePath,
    /// Writing the extracted tree failed.
    ExtractionIOFailure,
    /// Writing the zip artifact failed.
    PackagingIOFailure,
    /// The run was cancelled.
    Cancelled,
}

/// The underlying error of a failed stage.
#[derive(Error, Debug)]
pub enum StageError {
    /// Target validation failed.
    #[error(transparent)]
    Target(#[from] TargetError),

    /// Opening the source failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Extraction failed.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Packaging failed.
    #[error(transparent)]
    Package(#[from] PackageError),

    /// Preparing the storage layout failed.
    #[error("failed to prepare {}: {source}", path.display())]
    Storage {
        /// Directory being prepared.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A blocking worker panicked or was aborted.
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    /// The cancellation token was raised.
    #[error("cancelled")]
    Cancelled,
}

/// A failed run: which target, which stage, and why.
#[derive(Error, Debug)]
#[error("{target}: {stage} failed: {source}")]
pub struct PipelineError {
    /// `owner/name` of the target.
    pub target: String,
    /// Stage that failed.
    pub stage: Stage,
    /// Cause.
    #[source]
    pub source: StageError,
}

impl PipelineError {
    fn new(target: impl fmt::Display, stage: Stage, source: impl Into<StageError>) -> Self {
        Self {
            target: target.to_string(),
            stage,
            source: source.into(),
        }
    }

    /// Classify the failure.
    pub fn kind(&self) -> FailureKind {
        match &self.source {
            StageError::Target(_) => FailureKind::InvalidTarget,
            StageError::Source(SourceError::Unreachable(_))
            | StageError::Extract(ExtractError::SourceInterrupted(_)) => {
                FailureKind::UnreachableSource
            }
            StageError::Source(SourceError::Rejected { .. }) => FailureKind::UpstreamRejected,
            StageError::Extract(
                ExtractError::CorruptCompression(_) | ExtractError::MalformedArchive(_),
            ) => FailureKind::CorruptCompression,
            StageError::Extract(ExtractError::UnsafePath { .. }) => FailureKind::UnsafePath,
            StageError::Extract(ExtractError::Io { .. }) => FailureKind::ExtractionIOFailure,
            StageError::Package(PackageError::Io { .. } | PackageError::Zip(_)) => {
                FailureKind::PackagingIOFailure
            }
            StageError::Extract(ExtractError::Cancelled)
            | StageError::Package(PackageError::Cancelled)
            | StageError::Cancelled => FailureKind::Cancelled,
            StageError::Storage { .. } | StageError::Worker(_) => match self.stage {
                Stage::Packaging => FailureKind::PackagingIOFailure,
                Stage::Fetching | Stage::Extracting => FailureKind::ExtractionIOFailure,
            },
        }
    }
}

/// Runs targets through the fetch/extract/package stages.
pub struct Pipeline {
    config: Config,
    source: Arc<dyn StreamSource>,
    locks: TargetLocks,
    cancel: CancellationToken,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Create a pipeline reading archives from `source`.
    pub fn new(config: Config, source: Arc<dyn StreamSource>) -> Self {
        Self {
            config,
            source,
            locks: TargetLocks::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Create a pipeline that fetches archives over HTTP.
    ///
    /// # Errors
    ///
    /// Returns the client builder error if the HTTP client cannot be built.
    pub fn http(config: Config) -> reqwest::Result<Self> {
        let source = HttpSource::new(config.http_client()?, config.token.clone());
        Ok(Self::new(config, Arc::new(source)))
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Root token; cancelling it aborts every run started through
    /// [`Pipeline::retrieve_and_package`].
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fetch `owner/name` at the configured branch and package it as
    /// `<storage>/<name>.zip`.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run`]; invalid names fail before any I/O.
    pub async fn retrieve_and_package(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<PackagedArchive, PipelineError> {
        let target = self
            .config
            .target(owner, name)
            .map_err(|e| PipelineError::new(format_args!("{owner}/{name}"), Stage::Fetching, e))?;
        self.run(&target, &self.cancel.child_token()).await
    }

    /// List packaged artifacts in the storage directory.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the storage directory cannot be read.
    pub async fn list_catalog(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        catalog::list(&self.config.storage_dir, &self.config).await
    }

    /// Run one target through all stages.
    ///
    /// Runs for the same resource name are serialized; the second waits for
    /// the first and then does its own full run.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] tagged with the failing stage.
    pub async fn run(
        &self,
        target: &ArchiveTarget,
        cancel: &CancellationToken,
    ) -> Result<PackagedArchive, PipelineError> {
        let fail = |stage: Stage, source: StageError| PipelineError::new(target, stage, source);

        let _guard = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(fail(Stage::Fetching, StageError::Cancelled)),
            guard = self.locks.acquire(target.name()) => guard,
        };

        // Fetching
        tracing::debug!(archive = %target, url = target.source_url(), "Fetching archive");
        let stream = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(fail(Stage::Fetching, StageError::Cancelled)),
            opened = self.source.open(target) => {
                opened.map_err(|e| fail(Stage::Fetching, e.into()))?
            }
        };

        // Extracting
        let extract_dir = self.config.storage_dir.join(target.name());
        prepare_extract_dir(&extract_dir)
            .await
            .map_err(|e| fail(Stage::Extracting, e))?;

        tracing::debug!(archive = %target, dir = %extract_dir.display(), "Extracting archive");
        let reader = SyncIoBridge::new(cancellable(stream, cancel));
        let tree = {
            let dir = extract_dir;
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || extract::extract_tar_gz(reader, &dir, &cancel))
                .await
                .map_err(|e| fail(Stage::Extracting, e.into()))?
        }
        .map_err(|e| fail(Stage::Extracting, cancelled_or(cancel, e)))?;

        tracing::info!(
            archive = %target,
            files = tree.files,
            directories = tree.directories,
            skipped = tree.skipped,
            bytes = tree.bytes,
            "Extracted"
        );

        // Packaging
        let packaged = {
            let output = self.config.storage_dir.join(target.zip_file_name());
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || package::package(&tree, &output, &cancel))
                .await
                .map_err(|e| fail(Stage::Packaging, e.into()))?
        }
        .map_err(|e| fail(Stage::Packaging, cancelled_or(cancel, e)))?;

        tracing::info!(
            archive = %target,
            path = %packaged.path.display(),
            entries = packaged.entries,
            "Packaged"
        );

        Ok(packaged)
    }
}

/// Wrap `stream` so it ends as soon as `cancel` is raised, unblocking the
/// extractor's read.
fn cancellable(
    stream: ArchiveStream,
    cancel: &CancellationToken,
) -> impl tokio::io::AsyncRead + Send + Unpin + 'static {
    let chunks = ReaderStream::new(stream).take_until(cancel.clone().cancelled_owned());
    StreamReader::new(Box::pin(chunks))
}

/// Report a stage failure as cancellation when the token was raised, since
/// the stage error is then only a side effect of the cut stream.
fn cancelled_or(cancel: &CancellationToken, e: impl Into<StageError>) -> StageError {
    if cancel.is_cancelled() {
        StageError::Cancelled
    } else {
        e.into()
    }
}

/// Remove whatever sits at `dir` and make sure its parent exists.
async fn prepare_extract_dir(dir: &Path) -> Result<(), StageError> {
    let storage = |source| StageError::Storage {
        path: dir.to_path_buf(),
        source,
    };

    match tokio::fs::symlink_metadata(dir).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(dir).await.map_err(storage)?,
        Ok(_) => tokio::fs::remove_file(dir).await.map_err(storage)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(storage(e)),
    }

    if let Some(parent) = dir.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(storage)?;
    }
    Ok(())
}
