//! Archive fixtures shared by unit tests.

use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

/// One entry of a synthetic tarball.
#[derive(Debug, Clone)]
pub(crate) struct TarEntry {
    name: String,
    kind: tar::EntryType,
    data: Vec<u8>,
    link: Option<String>,
}

impl TarEntry {
    pub(crate) fn dir(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: tar::EntryType::Directory,
            data: Vec::new(),
            link: None,
        }
    }

    pub(crate) fn file(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            kind: tar::EntryType::Regular,
            data: data.to_vec(),
            link: None,
        }
    }

    pub(crate) fn symlink(name: &str, target: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: tar::EntryType::Symlink,
            data: Vec::new(),
            link: Some(target.to_string()),
        }
    }
}

fn copy_raw(dst: &mut [u8], src: &str) {
    let bytes = src.as_bytes();
    assert!(bytes.len() < dst.len(), "fixture name too long: {src}");
    dst[..bytes.len()].copy_from_slice(bytes);
}

/// Build a gzip-compressed tarball.
///
/// Names are written into the header verbatim, so `..` and absolute paths
/// survive; `tar::Header::set_path` would refuse them.
pub(crate) fn tar_gz(entries: &[TarEntry]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in entries {
        let mut header = tar::Header::new_old();
        copy_raw(&mut header.as_old_mut().name, &entry.name);
        if let Some(link) = &entry.link {
            copy_raw(&mut header.as_old_mut().linkname, link);
        }
        header.set_entry_type(entry.kind);
        header.set_size(entry.data.len() as u64);
        header.set_mode(if entry.kind.is_dir() { 0o755 } else { 0o644 });
        header.set_mtime(0);
        header.set_cksum();
        builder.append(&header, entry.data.as_slice()).unwrap();
    }

    let mut encoder = builder.into_inner().unwrap();
    encoder.flush().unwrap();
    encoder.finish().unwrap()
}
