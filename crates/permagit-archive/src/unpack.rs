//! Unpacking a zip buffer into a fresh directory.

use crate::{ArchiveError, Result};
use std::io::Cursor;
use std::path::Path;
use zip::ZipArchive;

/// Unpacks `data` into `dest`, which must not exist yet.
///
/// On failure everything written below `dest` is removed before the error
/// is returned.
pub fn unpack(data: &[u8], dest: &Path) -> Result<()> {
    if dest.exists() {
        return Err(ArchiveError::DestinationExists(dest.to_path_buf()));
    }

    std::fs::create_dir_all(dest)?;
    match extract(data, dest) {
        Ok(entries) => {
            tracing::debug!(dest = %dest.display(), entries, "Unpacked archive");
            Ok(())
        }
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_dir_all(dest) {
                tracing::warn!(
                    dest = %dest.display(),
                    error = %cleanup,
                    "Failed to remove partially unpacked archive"
                );
            }
            Err(e)
        }
    }
}

fn extract(data: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let relative = file
            .enclosed_name()
            .ok_or_else(|| ArchiveError::UnsafePath(file.name().to_string()))?;
        let target = dest.join(relative);

        if file.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&target)?;
        std::io::copy(&mut file, &mut out)?;
        set_mode(&target, file.unix_mode())?;
    }

    Ok(archive.len())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        let mode = if mode & 0o111 != 0 { 0o755 } else { 0o644 };
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pack, IgnoreList};

    #[test]
    fn test_unpack_restores_tree() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join(".git/objects")).unwrap();
        std::fs::write(src.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(src.path().join("main.rs"), "fn main() {}").unwrap();
        let data = pack(src.path(), "hello", &IgnoreList::default()).unwrap();

        let work = tempfile::tempdir().unwrap();
        let dest = work.path().join("staging");
        unpack(&data, &dest).unwrap();

        let root = dest.join("hello");
        assert_eq!(
            std::fs::read_to_string(root.join("main.rs")).unwrap(),
            "fn main() {}"
        );
        assert!(root.join(".git/objects").is_dir());
    }

    #[test]
    fn test_corrupt_archive_leaves_nothing() {
        let work = tempfile::tempdir().unwrap();
        let dest = work.path().join("staging");

        let err = unpack(b"definitely not a zip", &dest).unwrap_err();
        assert!(matches!(err, ArchiveError::Zip(_)));
        assert!(!dest.exists());
    }

    #[test]
    fn test_existing_destination_rejected() {
        let work = tempfile::tempdir().unwrap();
        let err = unpack(b"", work.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::DestinationExists(_)));
        assert!(work.path().exists());
    }
}
