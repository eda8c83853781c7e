//! CSV export of repository records.
//!
//! One file per call at `<export_dir>/<namespace>_<resource>.csv` with the
//! columns `ID,Name,URL,Description`. Fields are quoted per RFC 4180 only when
//! they need it.

use std::io;
use std::path::{Path, PathBuf};

use ghpack_schema::{RepoPayload, Repository, TargetError, validate_component};
use thiserror::Error;

const HEADER: [&str; 4] = ["ID", "Name", "URL", "Description"];

/// Errors produced while exporting records.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Namespace or resource label cannot be used in a file name.
    #[error("invalid export label: {0}")]
    InvalidLabel(#[from] TargetError),

    /// The body is not a repository record or array of records.
    #[error("failed to decode repository payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Writing the file failed.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        /// Export file or directory.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// Decode `body` and write it as CSV for `namespace`/`resource`.
///
/// Creates `export_dir` if needed and overwrites an existing file.
///
/// # Errors
///
/// See [`ExportError`].
pub fn write_csv(
    export_dir: &Path,
    body: &[u8],
    namespace: &str,
    resource: &str,
) -> Result<PathBuf, ExportError> {
    let payload = RepoPayload::from_slice(body)?;
    write_records(export_dir, &payload.into_records(), namespace, resource)
}

/// Write already decoded records as CSV.
///
/// # Errors
///
/// See [`ExportError`].
pub fn write_records(
    export_dir: &Path,
    records: &[Repository],
    namespace: &str,
    resource: &str,
) -> Result<PathBuf, ExportError> {
    validate_component("namespace", namespace)?;
    validate_component("resource", resource)?;

    std::fs::create_dir_all(export_dir).map_err(|source| ExportError::Io {
        path: export_dir.to_path_buf(),
        source,
    })?;

    let path = export_dir.join(format!("{namespace}_{resource}.csv"));
    std::fs::write(&path, render(records)).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;

    tracing::info!(path = %path.display(), records = records.len(), "CSV exported");
    Ok(path)
}

/// Render records as CSV text, header included.
pub fn render(records: &[Repository]) -> String {
    let mut out = String::new();
    push_row(&mut out, HEADER);
    for repo in records {
        push_row(
            &mut out,
            [
                repo.id.to_string().as_str(),
                repo.name.as_str(),
                repo.url.as_str(),
                repo.description_or_empty(),
            ],
        );
    }
    out
}

fn push_row<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\r', '\n']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}
