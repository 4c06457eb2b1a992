//! Packing a directory tree into a zip buffer.

use crate::{ArchiveError, IgnoreList, Result};
use std::io::{Cursor, Write};
use std::path::Path;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Packs every file and directory under `root` into a zip buffer.
///
/// Entries are stored below `prefix/` (no prefix when empty). Any path
/// component named in `ignore` is skipped together with its subtree.
/// Symbolic links are not followed and not stored.
pub fn pack(root: &Path, prefix: &str, ignore: &IgnoreList) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut buffer);

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry
                .file_name()
                .to_str()
                .map_or(true, |name| !ignore.is_ignored(name))
        });

    let mut files = 0usize;
    for entry in walker {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| ArchiveError::UnsafePath(entry.path().display().to_string()))?;
        let name = archive_name(prefix, relative)?;

        let file_type = entry.file_type();
        if file_type.is_dir() {
            zip.add_directory(name, options)?;
        } else if file_type.is_file() {
            let content = std::fs::read(entry.path())?;
            let file_options = options.unix_permissions(file_mode(&entry.metadata()?));
            zip.start_file(name, file_options)?;
            zip.write_all(&content)?;
            files += 1;
        } else {
            tracing::debug!(path = %entry.path().display(), "Skipping non-regular file");
        }
    }

    zip.finish()?;
    tracing::debug!(root = %root.display(), files, bytes = buffer.get_ref().len(), "Packed directory");

    Ok(buffer.into_inner())
}

/// Joins `prefix` and a relative path with forward slashes.
fn archive_name(prefix: &str, relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    if !prefix.is_empty() {
        parts.push(prefix.trim_matches('/').to_string());
    }
    for component in relative.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| ArchiveError::UnsafePath(relative.display().to_string()))?;
        parts.push(part.to_string());
    }
    Ok(parts.join("/"))
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o111 != 0 {
        0o755
    } else {
        0o644
    }
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}
