//! Zip packaging of an extracted tree.

use std::borrow::Cow;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use ghpack_schema::RESERVED_PREFIX;

use super::extract::ExtractedTree;

/// Errors produced while writing a zip archive.
#[derive(Error, Debug)]
pub enum PackageError {
    /// Reading the tree or writing the output failed.
    #[error("failed to package {}: {source}", path.display())]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The zip encoder rejected an entry.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The cancellation token was raised.
    #[error("packaging cancelled")]
    Cancelled,
}

/// A finished zip archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArchive {
    /// Final location of the archive.
    pub path: PathBuf,
    /// Number of entries (files and directories) written.
    pub entries: u64,
}

/// Package an extracted tree into a zip at `output`.
///
/// # Errors
///
/// See [`package_dir`].
pub fn package(
    tree: &ExtractedTree,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<PackagedArchive, PackageError> {
    package_dir(tree.root(), output, cancel)
}

/// Package every file and directory below `root` into a zip at `output`.
///
/// Entries are visited in file-name order, so an unchanged tree always yields
/// the same archive layout. The archive is assembled in a temporary file
/// beside `output`, named with [`RESERVED_PREFIX`], and renamed into place once complete; on failure the
/// temporary file is removed and `output` is left untouched.
///
/// # Errors
///
/// Returns [`PackageError::Io`] if a source cannot be read or the output
/// cannot be created, and [`PackageError::Cancelled`] if `cancel` is raised.
pub fn package_dir(
    root: &Path,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<PackagedArchive, PackageError> {
    let out_dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = output
        .file_name()
        .map_or(Cow::Borrowed("archive.zip"), |n| n.to_string_lossy());

    let tmp = tempfile::Builder::new()
        .prefix(&format!("{RESERVED_PREFIX}{file_name}."))
        .tempfile_in(out_dir)
        .map_err(|e| io_error(output, e))?;

    let mut zip = ZipWriter::new(tmp);
    let mut entries = 0u64;

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        if cancel.is_cancelled() {
            return Err(PackageError::Cancelled);
        }

        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            io_error(&path, e.into())
        })?;
        let path = entry.path();
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            tracing::warn!(path = %path.display(), "Skipping symlink while packaging");
            continue;
        }

        let name = entry_name(root, path);
        let options = entry_options(&entry)?;

        if file_type.is_dir() {
            zip.add_directory(format!("{name}/"), options)?;
        } else {
            zip.start_file(name.as_str(), options)?;
            let mut src = File::open(path).map_err(|e| io_error(path, e))?;
            io::copy(&mut src, &mut zip).map_err(|e| io_error(path, e))?;
        }

        tracing::trace!(entry = %name, "Packaged entry");
        entries += 1;
    }

    let tmp = zip.finish()?;
    tmp.persist(output).map_err(|e| io_error(output, e.error))?;

    tracing::debug!(path = %output.display(), entries, "Zip archive written");

    Ok(PackagedArchive {
        path: output.to_path_buf(),
        entries,
    })
}

/// Root-relative entry name with `/` separators.
fn entry_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn entry_options(entry: &walkdir::DirEntry) -> Result<SimpleFileOptions, PackageError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    #[cfg(unix)]
    let options = {
        use std::os::unix::fs::PermissionsExt;
        let meta = entry
            .metadata()
            .map_err(|e| io_error(entry.path(), e.into()))?;
        options.unix_permissions(meta.permissions().mode() & 0o777)
    };

    #[cfg(not(unix))]
    let _ = entry;

    Ok(options)
}

fn io_error(path: &Path, source: io::Error) -> PackageError {
    PackageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;

    fn read_zip(path: &Path) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut out = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            out.push((file.name().to_string(), data));
        }
        out
    }

    #[test]
    fn test_packages_tree_in_name_order() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("dir")).unwrap();
        fs::write(src.path().join("dir/b.txt"), b"world").unwrap();
        fs::write(src.path().join("dir/a.txt"), b"hello").unwrap();

        let out = tempfile::tempdir().unwrap();
        let zip_path = out.path().join("hello.zip");
        let packaged = package_dir(src.path(), &zip_path, &CancellationToken::new()).unwrap();

        assert_eq!(packaged.entries, 3);
        assert_eq!(packaged.path, zip_path);
        let entries = read_zip(&zip_path);
        let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["dir/", "dir/a.txt", "dir/b.txt"]);
        assert_eq!(entries[1].1, b"hello");
        assert_eq!(entries[2].1, b"world");
    }

    #[test]
    fn test_directory_markers_are_empty() {
        let src = tempfile::tempdir().unwrap();
        fs::create_dir_all(src.path().join("a/b/c")).unwrap();

        let out = tempfile::tempdir().unwrap();
        let zip_path = out.path().join("dirs.zip");
        package_dir(src.path(), &zip_path, &CancellationToken::new()).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 3);
        for i in 0..archive.len() {
            let file = archive.by_index(i).unwrap();
            assert!(file.is_dir());
            assert!(file.name().ends_with('/'));
            assert_eq!(file.size(), 0);
        }
    }

    #[test]
    fn test_empty_tree_produces_empty_archive() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let zip_path = out.path().join("empty.zip");

        let packaged = package_dir(src.path(), &zip_path, &CancellationToken::new()).unwrap();
        assert_eq!(packaged.entries, 0);
        assert!(read_zip(&zip_path).is_empty());
    }

    #[test]
    fn test_replaces_previous_archive() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("new.txt"), b"new").unwrap();
        let out = tempfile::tempdir().unwrap();
        let zip_path = out.path().join("r.zip");
        fs::write(&zip_path, b"stale bytes, not a zip").unwrap();

        package_dir(src.path(), &zip_path, &CancellationToken::new()).unwrap();
        let entries = read_zip(&zip_path);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "new.txt");
    }

    #[test]
    fn test_output_failure_leaves_no_temp_file() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"a").unwrap();

        let out = tempfile::tempdir().unwrap();
        let blocked = out.path().join("blocked.zip");
        fs::create_dir_all(blocked.join("occupied")).unwrap();

        let err = package_dir(src.path(), &blocked, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, PackageError::Io { .. }));

        let leftovers: Vec<_> = fs::read_dir(out.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, ["blocked.zip"]);
    }

    #[test]
    fn test_missing_output_dir_fails() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let zip_path = out.path().join("nope/x.zip");

        let err = package_dir(src.path(), &zip_path, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, PackageError::Io { .. }));
    }

    #[test]
    fn test_cancelled() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"a").unwrap();
        let out = tempfile::tempdir().unwrap();
        let zip_path = out.path().join("c.zip");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = package_dir(src.path(), &zip_path, &cancel).unwrap_err();
        assert!(matches!(err, PackageError::Cancelled));
        assert!(!zip_path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_skips_symlinks() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.txt"), b"a").unwrap();
        std::os::unix::fs::symlink("/etc/passwd", src.path().join("link")).unwrap();

        let out = tempfile::tempdir().unwrap();
        let zip_path = out.path().join("s.zip");
        let packaged = package_dir(src.path(), &zip_path, &CancellationToken::new()).unwrap();
        assert_eq!(packaged.entries, 1);
    }
}
