//! Streaming tar.gz extraction.
//!
//! Entries are read one at a time from the decompressed stream and written
//! straight to disk; the archive is never buffered in full. Every entry path
//! is normalized and checked against the destination root before anything is
//! written for it.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufReader, Cursor, Read, Write};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const COPY_BUF_SIZE: usize = 64 * 1024;

/// Errors produced while extracting a tar.gz stream.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The stream is not gzip, or the deflate data is damaged or truncated.
    #[error("corrupt gzip stream: {0}")]
    CorruptCompression(#[source] io::Error),

    /// The decompressed data is not a readable tar archive.
    #[error("malformed tar archive: {0}")]
    MalformedArchive(#[source] io::Error),

    /// An entry path is absolute, empty, or escapes the destination root.
    #[error("unsafe path in archive entry: {path}")]
    UnsafePath {
        /// The entry path as stored in the archive.
        path: String,
    },

    /// Writing to the destination failed (disk full, permissions, ...).
    #[error("failed to write {}: {source}", path.display())]
    Io {
        /// File or directory being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The byte stream feeding the extractor broke off.
    #[error("archive stream interrupted: {0}")]
    SourceInterrupted(#[source] io::Error),

    /// The cancellation token was raised.
    #[error("extraction cancelled")]
    Cancelled,
}

/// Kind of a tar entry the extractor acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Directory; created idempotently.
    Directory,
    /// Regular file; payload copied to disk.
    RegularFile,
}

/// A directory tree produced by extraction.
///
/// Every path under `root` came from a validated entry path and lies inside
/// `root`. The tree is handed to the packager as-is.
#[derive(Debug, Clone)]
pub struct ExtractedTree {
    root: PathBuf,
    /// Regular files written.
    pub files: u64,
    /// Directory entries processed.
    pub directories: u64,
    /// Entries skipped because of their kind (symlinks, devices, ...).
    pub skipped: u64,
    /// Payload bytes written.
    pub bytes: u64,
}

impl ExtractedTree {
    fn new(root: PathBuf) -> Self {
        Self {
            root,
            files: 0,
            directories: 0,
            skipped: 0,
            bytes: 0,
        }
    }

    /// Destination root of the extraction.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Decompress and unpack a tar.gz stream into `dest_dir`.
///
/// Blocking; run it on a blocking thread when the reader is fed from async
/// code. On error the destination may be partially populated and should not
/// be reused.
///
/// # Errors
///
/// See [`ExtractError`]; the first failing entry aborts extraction.
pub fn extract_tar_gz<R: Read>(
    mut reader: R,
    dest_dir: &Path,
    cancel: &CancellationToken,
) -> Result<ExtractedTree, ExtractError> {
    let mut magic = [0u8; 2];
    reader.read_exact(&mut magic).map_err(classify_read)?;
    if magic != GZIP_MAGIC {
        return Err(ExtractError::CorruptCompression(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid gzip header: {:02x}{:02x}", magic[0], magic[1]),
        )));
    }

    // Put the magic back in front of the rest of the stream.
    let stream = Cursor::new(magic).chain(reader);
    let decoder = flate2::bufread::GzDecoder::new(BufReader::new(stream));

    extract_tar(decoder, dest_dir, cancel)
}

/// Unpack an uncompressed tar stream into `dest_dir`.
///
/// # Errors
///
/// See [`ExtractError`].
pub fn extract_tar<R: Read>(
    reader: R,
    dest_dir: &Path,
    cancel: &CancellationToken,
) -> Result<ExtractedTree, ExtractError> {
    fs::create_dir_all(dest_dir).map_err(|e| write_error(dest_dir, e))?;
    let root = dest_dir
        .canonicalize()
        .map_err(|e| write_error(dest_dir, e))?;

    let mut tree = ExtractedTree::new(dest_dir.to_path_buf());
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries().map_err(classify_read)? {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let mut entry = entry.map_err(classify_read)?;
        let raw_path = entry.path().map_err(classify_read)?.into_owned();
        let entry_type = entry.header().entry_type();

        let kind = if entry_type.is_dir() {
            EntryKind::Directory
        } else if entry_type.is_file() || entry_type.is_contiguous() {
            EntryKind::RegularFile
        } else {
            tracing::debug!(
                path = %raw_path.display(),
                entry_type = ?entry_type,
                "Skipping unsupported tar entry"
            );
            tree.skipped += 1;
            continue;
        };

        if kind == EntryKind::Directory && names_root(&raw_path) {
            continue;
        }

        let relative = sanitize_entry_path(&raw_path)?;
        let target = root.join(&relative);

        match kind {
            EntryKind::Directory => {
                create_dirs_within(&root, &relative, &raw_path)?;
                tree.directories += 1;
            }
            EntryKind::RegularFile => {
                let parent = relative.parent().unwrap_or_else(|| Path::new(""));
                create_dirs_within(&root, parent, &raw_path)?;

                if fs::symlink_metadata(&target).is_ok_and(|m| m.file_type().is_symlink()) {
                    return Err(unsafe_path(&raw_path));
                }

                let declared = entry.size();
                let mut out = File::create(&target).map_err(|e| write_error(&target, e))?;
                let written = copy_payload(&mut entry, &mut out, &target, declared, cancel)?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    // Owner keeps read/write so the tree can be packaged.
                    if let Ok(mode) = entry.header().mode() {
                        let perms = fs::Permissions::from_mode((mode & 0o777) | 0o600);
                        fs::set_permissions(&target, perms).map_err(|e| write_error(&target, e))?;
                    }
                }

                tracing::trace!(path = %relative.display(), bytes = written, "Extracted file");
                tree.files += 1;
                tree.bytes += written;
            }
        }
    }

    tracing::debug!(
        root = %tree.root.display(),
        files = tree.files,
        directories = tree.directories,
        skipped = tree.skipped,
        "Extraction complete"
    );

    Ok(tree)
}

/// Normalize an archive entry path into a path relative to the extraction root.
///
/// `.` segments are dropped and `..` segments cancel the preceding segment.
///
/// # Errors
///
/// Returns [`ExtractError::UnsafePath`] if the path is absolute, normalizes
/// to nothing, or climbs above the root.
pub fn sanitize_entry_path(path: &Path) -> Result<PathBuf, ExtractError> {
    let mut parts: Vec<&OsStr> = Vec::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(unsafe_path(path));
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(unsafe_path(path)),
        }
    }

    if parts.is_empty() {
        return Err(unsafe_path(path));
    }

    Ok(parts.iter().collect())
}

/// True for `.`-only paths such as `./`, which name the root itself.
fn names_root(path: &Path) -> bool {
    let mut components = path.components().peekable();
    components.peek().is_some() && components.all(|c| c == Component::CurDir)
}

/// Create the directories of `relative` under `root` one component at a time.
///
/// Each existing component is inspected without following links, so a
/// symlink already present in the destination is refused before anything is
/// created beyond it.
fn create_dirs_within(
    root: &Path,
    relative: &Path,
    entry_path: &Path,
) -> Result<(), ExtractError> {
    let mut dir = root.to_path_buf();
    for component in relative.components() {
        dir.push(component);
        match fs::symlink_metadata(&dir) {
            Ok(meta) if meta.file_type().is_symlink() => return Err(unsafe_path(entry_path)),
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(write_error(
                    &dir,
                    io::Error::new(io::ErrorKind::NotADirectory, "a file is in the way"),
                ));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir(&dir).map_err(|e| write_error(&dir, e))?;
            }
            Err(e) => return Err(write_error(&dir, e)),
        }
    }
    Ok(())
}

fn copy_payload<R: Read>(
    entry: &mut R,
    out: &mut File,
    path: &Path,
    declared: u64,
    cancel: &CancellationToken,
) -> Result<u64, ExtractError> {
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut written = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        let n = match entry.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(classify_read(e)),
        };
        out.write_all(&buf[..n]).map_err(|e| write_error(path, e))?;
        written += n as u64;
    }

    if written != declared {
        return Err(ExtractError::MalformedArchive(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "entry {} truncated: expected {declared} bytes, got {written}",
                path.display()
            ),
        )));
    }

    Ok(written)
}

/// Map a read-side error to the stage that produced it.
fn classify_read(e: io::Error) -> ExtractError {
    match e.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::TimedOut => ExtractError::SourceInterrupted(e),
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            ExtractError::CorruptCompression(e)
        }
        _ => ExtractError::MalformedArchive(e),
    }
}

fn write_error(path: &Path, source: io::Error) -> ExtractError {
    ExtractError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn unsafe_path(path: &Path) -> ExtractError {
    ExtractError::UnsafePath {
        path: path.to_string_lossy().into_owned(),
    }
}
