//! Listing of materialized artifacts.
//!
//! The storage directory is the catalog: every visible child (packaged zip or
//! extraction directory) is one entry.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use ghpack_schema::RESERVED_PREFIX;

use crate::Config;

/// Errors produced while reading the catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The storage root could not be created or read.
    #[error("failed to read catalog at {}: {source}", path.display())]
    Io {
        /// Storage root.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// One artifact in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    /// File or directory name under the storage root.
    pub name: String,
    /// Retrieval link derived from the name.
    pub url: String,
}

/// List the immediate children of `storage_root`, sorted by name.
///
/// The root is created if it does not exist yet. Names starting with
/// [`RESERVED_PREFIX`] are in-flight packager temporaries and are left out.
///
/// # Errors
///
/// Returns [`CatalogError::Io`] if the root cannot be created or read.
pub async fn list(storage_root: &Path, config: &Config) -> Result<Vec<CatalogEntry>, CatalogError> {
    let io_err = |source| CatalogError::Io {
        path: storage_root.to_path_buf(),
        source,
    };

    tokio::fs::create_dir_all(storage_root)
        .await
        .map_err(io_err)?;

    let mut dir = tokio::fs::read_dir(storage_root).await.map_err(io_err)?;
    let mut entries = Vec::new();

    while let Some(child) = dir.next_entry().await.map_err(io_err)? {
        let name = child.file_name().to_string_lossy().into_owned();
        if name.starts_with(RESERVED_PREFIX) {
            continue;
        }
        entries.push(CatalogEntry {
            url: config.catalog_url(&name),
            name,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::debug!(root = %storage_root.display(), count = entries.len(), "Catalog listed");

    Ok(entries)
}
