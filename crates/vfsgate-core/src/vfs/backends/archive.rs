//! Zip compress/extract on real paths.
//!
//! Blocking; callers run these on `spawn_blocking`.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::vfs::error::{VfsError, VfsResult};

/// `<first>.zip` next to the first selected entry.
pub(crate) fn archive_path(first: &Path) -> PathBuf {
    let mut name = first.as_os_str().to_owned();
    name.push(".zip");
    PathBuf::from(name)
}

/// Zip `selection` into `<first>.zip`. Entries are named relative to each
/// selected entry's parent directory. A partial archive is removed on failure.
pub(crate) fn compress(selection: &[PathBuf]) -> VfsResult<PathBuf> {
    let first = selection
        .first()
        .ok_or_else(|| VfsError::bad_request("empty archive selection"))?;
    let target = archive_path(first);

    let file = File::create(&target)?;
    if let Err(e) = write_entries(file, selection) {
        let _ = std::fs::remove_file(&target);
        return Err(e);
    }
    Ok(target)
}

fn write_entries(file: File, selection: &[PathBuf]) -> VfsResult<()> {
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for selected in selection {
        let base = selected.parent().unwrap_or(Path::new("/"));

        for entry in WalkDir::new(selected).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(base)
                .map_err(|_| {
                    VfsError::other(format!("{} escaped archive base", entry.path().display()))
                })?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if entry.file_type().is_symlink() {
                tracing::debug!(path = %entry.path().display(), "skipping symlink in archive");
            } else if entry.file_type().is_dir() {
                writer.add_directory(format!("{name}/"), options)?;
            } else {
                writer.start_file(name, options)?;
                let mut source = File::open(entry.path())?;
                io::copy(&mut source, &mut writer)?;
            }
        }
    }

    writer.finish()?;
    Ok(())
}

/// Extract `archive` (`x.zip`) into the sibling directory `x`.
///
/// Symlink entries and names that would land outside `x` are skipped.
pub(crate) fn extract(archive: &Path) -> VfsResult<PathBuf> {
    let name = archive.to_string_lossy();
    let stem = name
        .strip_suffix(".zip")
        .or_else(|| name.strip_suffix(".ZIP"))
        .filter(|s| !s.is_empty() && !s.ends_with('/'))
        .ok_or_else(|| VfsError::bad_request(format!("not a zip archive: {name}")))?;
    let target = PathBuf::from(stem);

    let mut zip = ZipArchive::new(File::open(archive)?)?;
    std::fs::create_dir_all(&target)?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        if entry.is_symlink() {
            tracing::warn!(
                archive = %archive.display(),
                entry = entry.name(),
                "skipping symlink entry"
            );
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(
                archive = %archive.display(),
                entry = entry.name(),
                "skipping unsafe entry name"
            );
            continue;
        };

        let out = target.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&out)?;
        io::copy(&mut entry, &mut file)?;
    }
    Ok(target)
}
