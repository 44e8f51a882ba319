//! Local filesystem adapter.
//!
//! Maps addresses onto real paths below the mount's expanded root, with a
//! containment check so symlinks cannot lead out of it.

use async_trait::async_trait;
use globset::Glob;
use notify::event::{CreateKind, RemoveKind};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use regex::Regex;
use std::collections::BTreeMap;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use walkdir::WalkDir;

use super::archive;
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::mime::MimeResolver;
use crate::vfs::mount::Mountpoint;
use crate::vfs::ops::{AdapterContext, VfsAdapter, WatchCallback, WatchHandle, describe};
use crate::vfs::path;
use crate::vfs::segments::SegmentTable;
use crate::vfs::types::{
    ArchiveAction, Capabilities, FileAttr, FileDescriptor, FileType, VfsReader, WatchChange,
    WatchKind, epoch_millis,
};

/// Local filesystem adapter, registered as `system`.
#[derive(Debug, Clone)]
pub struct SystemAdapter {
    segments: Arc<SegmentTable>,
    mime: Arc<MimeResolver>,
}

impl SystemAdapter {
    pub fn new(segments: Arc<SegmentTable>, mime: Arc<MimeResolver>) -> Self {
        Self { segments, mime }
    }

    /// Resolve an address to a real path inside the mount root.
    ///
    /// The deepest ancestor present on disk (symlinks included, dangling or
    /// not) is canonicalized and must stay under the canonical root. A
    /// dangling symlink cannot be canonicalized and is rejected. A root that
    /// does not exist yet is not checked.
    fn resolve(&self, ctx: &AdapterContext<'_>, address: &str) -> VfsResult<PathBuf> {
        let full = self.segments.real_path(ctx.mount, ctx.session, address)?;
        let root = self.segments.mount_root(ctx.mount, ctx.session)?;

        let Ok(canonical_root) = dunce::canonicalize(&root) else {
            return Ok(full);
        };
        if let Some(existing) = full.ancestors().find(|p| p.symlink_metadata().is_ok()) {
            let canonical = match dunce::canonicalize(existing) {
                Ok(canonical) => canonical,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!(
                        address,
                        path = %existing.display(),
                        "dangling symlink in mount"
                    );
                    return Err(VfsError::path_escapes_root(address));
                }
                Err(e) => return Err(e.into()),
            };
            if !canonical.starts_with(&canonical_root) {
                return Err(VfsError::path_escapes_root(address));
            }
        }
        Ok(full)
    }

    /// Convert std::fs::Metadata to FileAttr.
    fn metadata_to_attr(meta: &std::fs::Metadata) -> FileAttr {
        let kind = if meta.is_dir() {
            FileType::Directory
        } else if meta.file_type().is_symlink() {
            FileType::Symlink
        } else {
            FileType::File
        };

        FileAttr {
            size: meta.len(),
            kind,
            mode: meta.permissions().mode(),
            mtime_ms: meta.modified().map(epoch_millis).unwrap_or(0),
            atime_ms: meta.accessed().ok().map(epoch_millis),
            birthtime_ms: meta.created().ok().map(epoch_millis),
            nlink: meta.nlink(),
            uid: Some(meta.uid()),
            gid: Some(meta.gid()),
        }
    }

    fn descriptor(&self, address: &str, meta: &std::fs::Metadata) -> FileDescriptor {
        describe(address, Self::metadata_to_attr(meta), &self.mime)
    }

    async fn ensure_parent(path: &Path) -> VfsResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

/// Copy a directory tree. `to` must not lie inside `from`.
async fn copy_tree(from: &Path, to: &Path) -> VfsResult<()> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];

    while let Some((src, dest)) = pending.pop() {
        fs::create_dir_all(&dest).await?;
        let mut dir = fs::read_dir(&src).await?;
        while let Some(entry) = dir.next_entry().await? {
            let target = dest.join(entry.file_name());
            let file_type = entry.file_type().await?;
            if file_type.is_symlink() {
                tracing::debug!(path = %entry.path().display(), "skipping symlink in copy");
            } else if file_type.is_dir() {
                pending.push((entry.path(), target));
            } else {
                fs::copy(entry.path(), &target).await?;
            }
        }
    }
    Ok(())
}

fn watch_kind(kind: &EventKind) -> Option<WatchKind> {
    match kind {
        EventKind::Create(CreateKind::Folder) => Some(WatchKind::AddDir),
        EventKind::Create(_) => Some(WatchKind::Add),
        EventKind::Remove(RemoveKind::Folder) => Some(WatchKind::UnlinkDir),
        EventKind::Remove(_) => Some(WatchKind::Unlink),
        _ => None,
    }
}

/// Map a changed real path back onto the mount it belongs to.
fn match_change(
    pattern: &Regex,
    names: &[String],
    mount: &str,
    real: &Path,
    kind: WatchKind,
) -> Option<WatchChange> {
    let real = real.to_string_lossy();
    let caps = pattern.captures(&real)?;

    let segments: BTreeMap<String, String> = names
        .iter()
        .enumerate()
        .filter_map(|(i, name)| Some((name.clone(), caps.get(i + 1)?.as_str().to_string())))
        .collect();
    let relative = caps.get(names.len() + 1)?.as_str().to_string();

    Some(WatchChange {
        mount: mount.to_string(),
        segments,
        target: format!("{mount}:/{relative}"),
        path: relative,
        kind,
    })
}

/// Directory to hand to the OS watcher: the wildcard root cut back to its
/// last fully static component.
fn static_prefix(wildcard: &str) -> PathBuf {
    match wildcard.find('*') {
        Some(star) => {
            let head = &wildcard[..star];
            match head.rfind('/') {
                Some(0) => PathBuf::from("/"),
                Some(slash) => PathBuf::from(&head[..slash]),
                None => PathBuf::from("."),
            }
        }
        None => PathBuf::from(wildcard),
    }
}

#[async_trait]
impl VfsAdapter for SystemAdapter {
    async fn capabilities(
        &self,
        _ctx: &AdapterContext<'_>,
        _address: &str,
    ) -> VfsResult<Capabilities> {
        Ok(Capabilities::default())
    }

    async fn realpath(&self, ctx: &AdapterContext<'_>, address: &str) -> VfsResult<String> {
        let full = self.resolve(ctx, address)?;
        Ok(full.to_string_lossy().into_owned())
    }

    async fn exists(&self, ctx: &AdapterContext<'_>, address: &str) -> VfsResult<bool> {
        let Ok(full) = self.resolve(ctx, address) else {
            return Ok(false);
        };
        Ok(fs::try_exists(&full).await.unwrap_or(false))
    }

    async fn stat(&self, ctx: &AdapterContext<'_>, address: &str) -> VfsResult<FileDescriptor> {
        let full = self.resolve(ctx, address)?;
        let meta = fs::metadata(&full).await?;
        Ok(self.descriptor(address, &meta))
    }

    async fn readdir(
        &self,
        ctx: &AdapterContext<'_>,
        address: &str,
    ) -> VfsResult<Vec<FileDescriptor>> {
        let full = self.resolve(ctx, address)?;
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&full).await?;

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            // Follow symlinks for the listing; fall back to the link itself.
            let meta = match fs::metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(_) => entry.metadata().await?,
            };
            entries.push(self.descriptor(&path::join(address, &name), &meta));
        }

        entries.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(entries)
    }

    async fn search(
        &self,
        ctx: &AdapterContext<'_>,
        root: &str,
        pattern: &str,
    ) -> VfsResult<Vec<FileDescriptor>> {
        let matcher = match Glob::new(pattern) {
            Ok(glob) => glob.compile_matcher(),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "invalid search pattern");
                return Ok(Vec::new());
            }
        };
        let full = match self.resolve(ctx, root) {
            Ok(full) => full,
            Err(e) => {
                tracing::warn!(root, error = %e, "cannot resolve search root");
                return Ok(Vec::new());
            }
        };

        let walk_root = full.clone();
        let found = tokio::task::spawn_blocking(move || {
            WalkDir::new(&walk_root)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file() && matcher.is_match(entry.file_name()))
                .filter_map(|entry| {
                    let meta = entry.metadata().ok()?;
                    let relative = entry.path().strip_prefix(&walk_root).ok()?.to_path_buf();
                    Some((relative, meta))
                })
                .collect::<Vec<_>>()
        })
        .await;

        let found = match found {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(root, error = %e, "search task failed");
                return Ok(Vec::new());
            }
        };

        let base = root.trim_end_matches('/');
        Ok(found
            .into_iter()
            .map(|(relative, meta)| {
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                self.descriptor(&path::join(base, &relative), &meta)
            })
            .collect())
    }

    async fn readfile(
        &self,
        ctx: &AdapterContext<'_>,
        address: &str,
        range: Option<(u64, u64)>,
    ) -> VfsResult<Option<VfsReader>> {
        let full = self.resolve(ctx, address)?;
        if fs::metadata(&full).await?.is_dir() {
            return Ok(None);
        }

        let mut file = fs::File::open(&full).await?;
        match range {
            Some((start, end)) => {
                file.seek(std::io::SeekFrom::Start(start)).await?;
                Ok(Some(Box::new(file.take(end - start + 1))))
            }
            None => Ok(Some(Box::new(file))),
        }
    }

    async fn writefile(
        &self,
        ctx: &AdapterContext<'_>,
        address: &str,
        mut data: VfsReader,
    ) -> VfsResult<Option<u64>> {
        let full = self.resolve(ctx, address)?;
        match fs::metadata(&full).await {
            Ok(meta) if meta.is_dir() => return Ok(None),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::ensure_parent(&full).await?,
            Err(e) => return Err(e.into()),
        }

        let mut file = fs::File::create(&full).await?;
        let written = tokio::io::copy(&mut data, &mut file).await?;
        file.flush().await?;
        Ok(Some(written))
    }

    async fn mkdir(
        &self,
        ctx: &AdapterContext<'_>,
        address: &str,
        ensure: bool,
    ) -> VfsResult<bool> {
        let full = self.resolve(ctx, address)?;
        if ensure {
            fs::create_dir_all(&full).await?;
        } else {
            fs::create_dir(&full).await?;
        }
        Ok(true)
    }

    async fn unlink(&self, ctx: &AdapterContext<'_>, address: &str) -> VfsResult<bool> {
        let full = self.resolve(ctx, address)?;
        let meta = match fs::symlink_metadata(&full).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        if meta.is_dir() {
            fs::remove_dir_all(&full).await?;
        } else {
            fs::remove_file(&full).await?;
        }
        Ok(true)
    }

    async fn touch(&self, ctx: &AdapterContext<'_>, address: &str) -> VfsResult<bool> {
        let full = self.resolve(ctx, address)?;
        Self::ensure_parent(&full).await?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .await?;
        Ok(true)
    }

    async fn copy(
        &self,
        from_ctx: &AdapterContext<'_>,
        from: &str,
        to_ctx: &AdapterContext<'_>,
        to: &str,
    ) -> VfsResult<bool> {
        let src = self.resolve(from_ctx, from)?;
        let dest = self.resolve(to_ctx, to)?;

        if fs::metadata(&src).await?.is_dir() {
            if dest.starts_with(&src) {
                return Err(VfsError::bad_request(format!("cannot copy '{from}' into itself")));
            }
            copy_tree(&src, &dest).await?;
        } else {
            Self::ensure_parent(&dest).await?;
            fs::copy(&src, &dest).await?;
        }
        Ok(true)
    }

    async fn rename(
        &self,
        from_ctx: &AdapterContext<'_>,
        from: &str,
        to_ctx: &AdapterContext<'_>,
        to: &str,
    ) -> VfsResult<bool> {
        let src = self.resolve(from_ctx, from)?;
        let dest = self.resolve(to_ctx, to)?;
        Self::ensure_parent(&dest).await?;
        fs::rename(&src, &dest).await?;
        Ok(true)
    }

    async fn archive(
        &self,
        ctx: &AdapterContext<'_>,
        selection: &[String],
        action: ArchiveAction,
    ) -> VfsResult<()> {
        let paths = selection
            .iter()
            .map(|address| self.resolve(ctx, address))
            .collect::<VfsResult<Vec<_>>>()?;

        // `<first>.zip` of the mount root would land outside the mount.
        let root = self.segments.mount_root(ctx.mount, ctx.session)?;
        if action == ArchiveAction::Compress && paths.first() == Some(&root) {
            return Err(VfsError::bad_request(format!(
                "cannot compress the root of mountpoint '{}'",
                ctx.mount.name
            )));
        }

        let result = tokio::task::spawn_blocking(move || match action {
            ArchiveAction::Compress => archive::compress(&paths).map(|zip| vec![zip]),
            ArchiveAction::Extract => paths.iter().map(|p| archive::extract(p)).collect(),
        })
        .await
        .map_err(|e| VfsError::other(format!("archive task failed: {e}")))??;

        tracing::debug!(?action, outputs = ?result, "archive complete");
        Ok(())
    }

    fn watch(&self, mount: &Mountpoint, callback: WatchCallback) -> VfsResult<WatchHandle> {
        let template = mount.root_template();
        let watch_root = static_prefix(&self.segments.expand_wildcard(&template));
        let (pattern, names) = self.segments.watch_pattern(&template);
        let pattern = Regex::new(&pattern).map_err(|e| VfsError::other(e.to_string()))?;
        let mount_name = mount.name.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let Some(kind) = watch_kind(&event.kind) else {
                    return;
                };
                for real in &event.paths {
                    if let Some(change) = match_change(&pattern, &names, &mount_name, real, kind) {
                        callback(change);
                    }
                }
            }
            Err(e) => tracing::warn!(mount = %mount_name, error = %e, "watch error"),
        })?;

        std::fs::create_dir_all(&watch_root)?;
        watcher.watch(&watch_root, RecursiveMode::Recursive)?;
        tracing::info!(mount = %mount.name, root = %watch_root.display(), "watching mountpoint");

        Ok(WatchHandle::new(mount.name.clone(), watcher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::vfs::mount::MountAttributes;
    use tempfile::TempDir;

    struct Fixture {
        adapter: SystemAdapter,
        mount: Mountpoint,
        session: Session,
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let segments = Arc::new(SegmentTable::new(dir.path(), dir.path().join("vfs")));
            let adapter = SystemAdapter::new(segments, Arc::new(MimeResolver::default()));
            let mount = Mountpoint {
                name: "home".into(),
                label: None,
                adapter: None,
                attributes: MountAttributes {
                    root: Some("{vfs}/{username}".into()),
                    ..Default::default()
                },
            };
            Self {
                adapter,
                mount,
                session: Session::new("amy", ["users"]),
                dir,
            }
        }

        fn ctx(&self) -> AdapterContext<'_> {
            AdapterContext {
                mount: &self.mount,
                session: &self.session,
            }
        }

        fn home(&self) -> PathBuf {
            self.dir.path().join("vfs/amy")
        }

        async fn write(&self, address: &str, data: &'static [u8]) {
            let reader: VfsReader = Box::new(data);
            self.adapter.writefile(&self.ctx(), address, reader).await.unwrap();
        }

        async fn read(&self, address: &str, range: Option<(u64, u64)>) -> Vec<u8> {
            let mut reader = self
                .adapter
                .readfile(&self.ctx(), address, range)
                .await
                .unwrap()
                .unwrap();
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).await.unwrap();
            buf
        }
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let fx = Fixture::new();
        fx.write("home:/docs/hello.txt", b"hello world").await;

        assert_eq!(fx.read("home:/docs/hello.txt", None).await, b"hello world");
        assert_eq!(
            std::fs::read(fx.home().join("docs/hello.txt")).unwrap(),
            b"hello world"
        );
    }

    #[tokio::test]
    async fn test_range_read() {
        let fx = Fixture::new();
        fx.write("home:/a.txt", b"hello world").await;
        assert_eq!(fx.read("home:/a.txt", Some((6, 10))).await, b"world");
    }

    #[tokio::test]
    async fn test_readfile_directory_is_none() {
        let fx = Fixture::new();
        fx.adapter.mkdir(&fx.ctx(), "home:/dir", true).await.unwrap();
        assert!(fx.adapter.readfile(&fx.ctx(), "home:/dir", None).await.unwrap().is_none());
        let reader: VfsReader = Box::new(&b"x"[..]);
        assert_eq!(fx.adapter.writefile(&fx.ctx(), "home:/dir", reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stat_and_readdir_sorted() {
        let fx = Fixture::new();
        fx.write("home:/b.txt", b"bb").await;
        fx.write("home:/a.txt", b"a").await;
        fx.adapter.mkdir(&fx.ctx(), "home:/c", false).await.unwrap();

        let stat = fx.adapter.stat(&fx.ctx(), "home:/b.txt").await.unwrap();
        assert_eq!(stat.size, 2);
        assert_eq!(stat.filename, "b.txt");
        assert_eq!(stat.mime.as_deref(), Some("text/plain"));

        let entries = fx.adapter.readdir(&fx.ctx(), "home:/").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt", "c"]);
        assert_eq!(entries[0].path, "home:/a.txt");
        assert!(entries[2].is_directory);
    }

    #[tokio::test]
    async fn test_mkdir_ensure() {
        let fx = Fixture::new();
        fx.adapter.mkdir(&fx.ctx(), "home:/d", false).await.unwrap();
        assert!(fx.adapter.mkdir(&fx.ctx(), "home:/d", false).await.is_err());
        assert!(fx.adapter.mkdir(&fx.ctx(), "home:/d", true).await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_unlink_touch() {
        let fx = Fixture::new();
        assert!(!fx.adapter.exists(&fx.ctx(), "home:/t/new.txt").await.unwrap());
        fx.adapter.touch(&fx.ctx(), "home:/t/new.txt").await.unwrap();
        assert!(fx.adapter.exists(&fx.ctx(), "home:/t/new.txt").await.unwrap());

        fx.adapter.unlink(&fx.ctx(), "home:/t").await.unwrap();
        assert!(!fx.adapter.exists(&fx.ctx(), "home:/t").await.unwrap());
        // Missing entries unlink cleanly.
        assert!(fx.adapter.unlink(&fx.ctx(), "home:/t").await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_and_rename() {
        let fx = Fixture::new();
        fx.write("home:/src/a.txt", b"a").await;
        fx.write("home:/src/deep/b.txt", b"b").await;

        fx.adapter.copy(&fx.ctx(), "home:/src", &fx.ctx(), "home:/dup").await.unwrap();
        assert_eq!(fx.read("home:/dup/deep/b.txt", None).await, b"b");

        fx.adapter
            .rename(&fx.ctx(), "home:/dup/a.txt", &fx.ctx(), "home:/moved/a.txt")
            .await
            .unwrap();
        assert!(!fx.adapter.exists(&fx.ctx(), "home:/dup/a.txt").await.unwrap());
        assert_eq!(fx.read("home:/moved/a.txt", None).await, b"a");

        let err = fx.adapter.copy(&fx.ctx(), "home:/src", &fx.ctx(), "home:/src/inner").await;
        assert!(matches!(err, Err(VfsError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_search() {
        let fx = Fixture::new();
        fx.write("home:/a.txt", b"a").await;
        fx.write("home:/notes/b.txt", b"b").await;
        fx.write("home:/notes/c.md", b"c").await;

        let found = fx.adapter.search(&fx.ctx(), "home:/", "*.txt").await.unwrap();
        let paths: Vec<_> = found.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, ["home:/a.txt", "home:/notes/b.txt"]);

        let bad = fx.adapter.search(&fx.ctx(), "home:/", "a[").await.unwrap();
        assert!(bad.is_empty());
    }

    #[tokio::test]
    async fn test_archive_round_trip() {
        let fx = Fixture::new();
        fx.write("home:/docs/a.txt", b"alpha").await;

        fx.adapter
            .archive(&fx.ctx(), &["home:/docs".to_string()], ArchiveAction::Compress)
            .await
            .unwrap();
        assert!(fx.adapter.exists(&fx.ctx(), "home:/docs.zip").await.unwrap());

        fx.adapter.unlink(&fx.ctx(), "home:/docs").await.unwrap();
        fx.adapter
            .archive(&fx.ctx(), &["home:/docs.zip".to_string()], ArchiveAction::Extract)
            .await
            .unwrap();
        assert_eq!(fx.read("home:/docs/docs/a.txt", None).await, b"alpha");
    }

    #[tokio::test]
    async fn test_archive_single_file_round_trip() {
        let fx = Fixture::new();
        fx.write("home:/note.txt", b"remember").await;

        fx.adapter
            .archive(&fx.ctx(), &["home:/note.txt".to_string()], ArchiveAction::Compress)
            .await
            .unwrap();
        fx.adapter.unlink(&fx.ctx(), "home:/note.txt").await.unwrap();
        fx.adapter
            .archive(&fx.ctx(), &["home:/note.txt.zip".to_string()], ArchiveAction::Extract)
            .await
            .unwrap();
        assert_eq!(fx.read("home:/note.txt/note.txt", None).await, b"remember");
    }

    #[tokio::test]
    async fn test_compress_mount_root_rejected() {
        let fx = Fixture::new();
        fx.write("home:/a.txt", b"a").await;

        let result = fx
            .adapter
            .archive(&fx.ctx(), &["home:/".to_string()], ArchiveAction::Compress)
            .await;
        assert!(matches!(result, Err(VfsError::BadRequest(_))));
        assert!(!fx.dir.path().join("vfs/amy.zip").exists());
    }

    #[tokio::test]
    async fn test_dangling_symlink_write_blocked() {
        let fx = Fixture::new();
        let outside = TempDir::new().unwrap();
        let planted = outside.path().join("planted.txt");
        std::fs::create_dir_all(fx.home()).unwrap();
        std::os::unix::fs::symlink(&planted, fx.home().join("link.txt")).unwrap();

        let reader: VfsReader = Box::new(&b"owned"[..]);
        let result = fx.adapter.writefile(&fx.ctx(), "home:/link.txt", reader).await;
        assert!(matches!(result, Err(VfsError::PathEscapesRoot(_))));
        assert!(!planted.exists());
    }

    #[tokio::test]
    async fn test_extracted_symlink_cannot_be_written_through() {
        let fx = Fixture::new();
        let outside = TempDir::new().unwrap();
        let planted = outside.path().join("planted.txt");

        std::fs::create_dir_all(fx.home()).unwrap();
        let mut writer =
            zip::ZipWriter::new(std::fs::File::create(fx.home().join("evil.zip")).unwrap());
        writer
            .add_symlink(
                "evil/link.txt",
                planted.to_string_lossy().to_string(),
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        writer.finish().unwrap();

        fx.adapter
            .archive(&fx.ctx(), &["home:/evil.zip".to_string()], ArchiveAction::Extract)
            .await
            .unwrap();

        let reader: VfsReader = Box::new(&b"owned"[..]);
        fx.adapter
            .writefile(&fx.ctx(), "home:/evil/evil/link.txt", reader)
            .await
            .unwrap();
        assert!(!planted.exists());
        let written = fx.home().join("evil/evil/link.txt");
        assert!(!written.symlink_metadata().unwrap().file_type().is_symlink());
    }

    #[tokio::test]
    async fn test_search_outside_root_is_empty() {
        let fx = Fixture::new();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("hit.txt"), b"x").unwrap();
        std::fs::create_dir_all(fx.home()).unwrap();
        std::os::unix::fs::symlink(outside.path(), fx.home().join("out")).unwrap();

        let found = fx.adapter.search(&fx.ctx(), "home:/out", "*.txt").await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_symlink_escape_blocked() {
        let fx = Fixture::new();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret"), b"s").unwrap();
        std::fs::create_dir_all(fx.home()).unwrap();
        std::os::unix::fs::symlink(outside.path(), fx.home().join("link")).unwrap();

        let result = fx.adapter.readfile(&fx.ctx(), "home:/link/secret", None).await;
        assert!(matches!(result, Err(VfsError::PathEscapesRoot(_))));
    }

    #[tokio::test]
    async fn test_realpath() {
        let fx = Fixture::new();
        let real = fx.adapter.realpath(&fx.ctx(), "home:/x/y.txt").await.unwrap();
        assert_eq!(PathBuf::from(real), fx.home().join("x/y.txt"));
    }

    #[test]
    fn test_static_prefix() {
        assert_eq!(static_prefix("/srv/vfs/*"), PathBuf::from("/srv/vfs"));
        assert_eq!(static_prefix("/srv/vfs/*/docs"), PathBuf::from("/srv/vfs"));
        assert_eq!(static_prefix("/srv/app/dist"), PathBuf::from("/srv/app/dist"));
    }

    #[test]
    fn test_match_change() {
        let segments = SegmentTable::new("/srv/app", "/srv/vfs");
        let (pattern, names) = segments.watch_pattern("{vfs}/{username}");
        let pattern = Regex::new(&pattern).unwrap();

        let change = match_change(
            &pattern,
            &names,
            "home",
            Path::new("/srv/vfs/amy/docs/a.txt"),
            WatchKind::Add,
        )
        .unwrap();
        assert_eq!(change.segments["username"], "amy");
        assert_eq!(change.path, "docs/a.txt");
        assert_eq!(change.target, "home:/docs/a.txt");
    }

    #[tokio::test]
    async fn test_watch_reports_new_file() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.home()).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        let _handle = fx
            .adapter
            .watch(
                &fx.mount,
                Arc::new(move |change: WatchChange| {
                    let _ = tx.lock().unwrap().send(change);
                }),
            )
            .unwrap();

        std::fs::write(fx.home().join("fresh.txt"), b"new").unwrap();

        let change = tokio::task::spawn_blocking(move || {
            loop {
                let change = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
                if change.kind == WatchKind::Add {
                    return change;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(change.target, "home:/fresh.txt");
        assert_eq!(change.segments["username"], "amy");
    }
}
