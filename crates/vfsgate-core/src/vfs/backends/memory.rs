//! In-memory adapter.
//!
//! Used for scratch mounts and testing. All data is ephemeral. Entries are
//! keyed by the same real paths the system adapter would use, so templated
//! roots like `{vfs}/{username}` keep users apart here too.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::mime::MimeResolver;
use crate::vfs::ops::{AdapterContext, VfsAdapter, describe};
use crate::vfs::path;
use crate::vfs::segments::SegmentTable;
use crate::vfs::types::{Capabilities, FileAttr, FileDescriptor, VfsReader};

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, attr: FileAttr },
    Directory { attr: FileAttr },
}

impl Entry {
    fn attr(&self) -> &FileAttr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr } => attr,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory { .. })
    }
}

/// In-memory adapter, registered as `memory`.
///
/// Thread-safe via internal `RwLock`; the lock is never held across an await.
#[derive(Debug)]
pub struct MemoryAdapter {
    segments: Arc<SegmentTable>,
    mime: Arc<MimeResolver>,
    entries: RwLock<HashMap<PathBuf, Entry>>,
}

/// A resolved location: the mount root and the entry path under it.
struct Location {
    root: PathBuf,
    path: PathBuf,
}

impl Location {
    fn is_root(&self) -> bool {
        self.path == self.root
    }
}

impl MemoryAdapter {
    pub fn new(segments: Arc<SegmentTable>, mime: Arc<MimeResolver>) -> Self {
        Self {
            segments,
            mime,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn locate(&self, ctx: &AdapterContext<'_>, address: &str) -> VfsResult<Location> {
        Ok(Location {
            root: self.segments.mount_root(ctx.mount, ctx.session)?,
            path: self.segments.real_path(ctx.mount, ctx.session, address)?,
        })
    }

    /// Attributes of an entry; mount roots always exist as directories.
    fn lookup(entries: &HashMap<PathBuf, Entry>, loc: &Location) -> Option<FileAttr> {
        if loc.is_root() {
            return Some(
                entries
                    .get(&loc.path)
                    .map(|e| e.attr().clone())
                    .unwrap_or_else(FileAttr::directory),
            );
        }
        entries.get(&loc.path).map(|e| e.attr().clone())
    }

    /// Create missing directories between the root and `path`.
    fn ensure_parents(
        entries: &mut HashMap<PathBuf, Entry>,
        root: &Path,
        path: &Path,
        address: &str,
    ) -> VfsResult<()> {
        let mut missing = Vec::new();
        for ancestor in path.ancestors().skip(1) {
            if ancestor == root || !ancestor.starts_with(root) {
                break;
            }
            match entries.get(ancestor) {
                Some(Entry::Directory { .. }) => break,
                Some(Entry::File { .. }) => return Err(VfsError::not_a_directory(address)),
                None => missing.push(ancestor.to_path_buf()),
            }
        }
        for dir in missing {
            entries.insert(dir, Entry::Directory { attr: FileAttr::directory() });
        }
        Ok(())
    }

    /// `path` and everything below it.
    fn subtree(entries: &HashMap<PathBuf, Entry>, path: &Path) -> Vec<(PathBuf, Entry)> {
        entries
            .iter()
            .filter(|(p, _)| p.starts_with(path))
            .map(|(p, e)| (p.clone(), e.clone()))
            .collect()
    }

    /// Copy (or move) a subtree between locations.
    fn transfer(
        &self,
        from: &Location,
        from_addr: &str,
        to: &Location,
        remove: bool,
    ) -> VfsResult<bool> {
        let mut entries = self.entries.write();

        if Self::lookup(&entries, from).is_none() {
            return Err(VfsError::not_found(from_addr));
        }
        if from.is_root() {
            return Err(VfsError::permission_denied(format!(
                "cannot move mount root '{from_addr}'"
            )));
        }
        if to.path.starts_with(&from.path) {
            return Err(VfsError::bad_request(format!("cannot copy '{from_addr}' into itself")));
        }
        Self::ensure_parents(&mut entries, &to.root, &to.path, from_addr)?;

        for (path, entry) in Self::subtree(&entries, &from.path) {
            if remove {
                entries.remove(&path);
            }
            let Ok(rest) = path.strip_prefix(&from.path) else {
                continue;
            };
            let target = if rest.as_os_str().is_empty() {
                to.path.clone()
            } else {
                to.path.join(rest)
            };
            entries.insert(target, entry);
        }
        Ok(true)
    }
}

#[async_trait]
impl VfsAdapter for MemoryAdapter {
    async fn capabilities(
        &self,
        _ctx: &AdapterContext<'_>,
        _address: &str,
    ) -> VfsResult<Capabilities> {
        Ok(Capabilities::default())
    }

    async fn realpath(&self, ctx: &AdapterContext<'_>, address: &str) -> VfsResult<String> {
        Ok(format!("memory:{}", self.locate(ctx, address)?.path.display()))
    }

    async fn exists(&self, ctx: &AdapterContext<'_>, address: &str) -> VfsResult<bool> {
        let Ok(loc) = self.locate(ctx, address) else {
            return Ok(false);
        };
        Ok(Self::lookup(&self.entries.read(), &loc).is_some())
    }

    async fn stat(&self, ctx: &AdapterContext<'_>, address: &str) -> VfsResult<FileDescriptor> {
        let loc = self.locate(ctx, address)?;
        let attr = Self::lookup(&self.entries.read(), &loc)
            .ok_or_else(|| VfsError::not_found(address))?;
        Ok(describe(address, attr, &self.mime))
    }

    async fn readdir(
        &self,
        ctx: &AdapterContext<'_>,
        address: &str,
    ) -> VfsResult<Vec<FileDescriptor>> {
        let loc = self.locate(ctx, address)?;
        let entries = self.entries.read();

        match Self::lookup(&entries, &loc) {
            None => return Err(VfsError::not_found(address)),
            Some(attr) if !attr.is_dir() => return Err(VfsError::not_a_directory(address)),
            Some(_) => {}
        }

        let mut listing: Vec<FileDescriptor> = entries
            .iter()
            .filter(|(p, _)| p.parent() == Some(loc.path.as_path()))
            .filter_map(|(p, e)| {
                let name = p.file_name()?.to_string_lossy();
                Some(describe(&path::join(address, &name), e.attr().clone(), &self.mime))
            })
            .collect();
        listing.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(listing)
    }

    async fn readfile(
        &self,
        ctx: &AdapterContext<'_>,
        address: &str,
        range: Option<(u64, u64)>,
    ) -> VfsResult<Option<VfsReader>> {
        let loc = self.locate(ctx, address)?;
        let entries = self.entries.read();

        let data = match entries.get(&loc.path) {
            Some(Entry::File { data, .. }) => data,
            Some(Entry::Directory { .. }) => return Ok(None),
            None if loc.is_root() => return Ok(None),
            None => return Err(VfsError::not_found(address)),
        };

        let bytes = match range {
            Some((start, end)) => {
                let start = (start as usize).min(data.len());
                let end = (end as usize).saturating_add(1).min(data.len());
                data[start..end.max(start)].to_vec()
            }
            None => data.clone(),
        };
        Ok(Some(Box::new(std::io::Cursor::new(bytes))))
    }

    async fn writefile(
        &self,
        ctx: &AdapterContext<'_>,
        address: &str,
        mut data: VfsReader,
    ) -> VfsResult<Option<u64>> {
        let loc = self.locate(ctx, address)?;
        if Self::lookup(&self.entries.read(), &loc).is_some_and(|a| a.is_dir()) {
            return Ok(None);
        }

        let mut buf = Vec::new();
        data.read_to_end(&mut buf).await?;
        let size = buf.len() as u64;

        let mut entries = self.entries.write();
        if entries.get(&loc.path).is_some_and(Entry::is_dir) {
            return Ok(None);
        }
        Self::ensure_parents(&mut entries, &loc.root, &loc.path, address)?;
        entries.insert(
            loc.path,
            Entry::File {
                data: buf,
                attr: FileAttr::file(size),
            },
        );
        Ok(Some(size))
    }

    async fn mkdir(
        &self,
        ctx: &AdapterContext<'_>,
        address: &str,
        ensure: bool,
    ) -> VfsResult<bool> {
        let loc = self.locate(ctx, address)?;
        let mut entries = self.entries.write();

        match Self::lookup(&entries, &loc) {
            Some(attr) if attr.is_dir() && ensure => return Ok(true),
            Some(_) => return Err(VfsError::already_exists(address)),
            None => {}
        }

        if ensure {
            Self::ensure_parents(&mut entries, &loc.root, &loc.path, address)?;
        } else if let Some(parent) = loc.path.parent() {
            let parent = Location {
                root: loc.root.clone(),
                path: parent.to_path_buf(),
            };
            match Self::lookup(&entries, &parent) {
                Some(attr) if attr.is_dir() => {}
                Some(_) => return Err(VfsError::not_a_directory(address)),
                None => return Err(VfsError::not_found(path::parent(address))),
            }
        }
        entries.insert(loc.path, Entry::Directory { attr: FileAttr::directory() });
        Ok(true)
    }

    async fn unlink(&self, ctx: &AdapterContext<'_>, address: &str) -> VfsResult<bool> {
        let loc = self.locate(ctx, address)?;
        if loc.is_root() {
            return Err(VfsError::permission_denied(format!(
                "cannot remove mount root '{address}'"
            )));
        }
        self.entries.write().retain(|p, _| !p.starts_with(&loc.path));
        Ok(true)
    }

    async fn touch(&self, ctx: &AdapterContext<'_>, address: &str) -> VfsResult<bool> {
        let loc = self.locate(ctx, address)?;
        let mut entries = self.entries.write();

        if Self::lookup(&entries, &loc).is_none() {
            Self::ensure_parents(&mut entries, &loc.root, &loc.path, address)?;
            entries.insert(
                loc.path,
                Entry::File {
                    data: Vec::new(),
                    attr: FileAttr::file(0),
                },
            );
        }
        Ok(true)
    }

    async fn copy(
        &self,
        from_ctx: &AdapterContext<'_>,
        from: &str,
        to_ctx: &AdapterContext<'_>,
        to: &str,
    ) -> VfsResult<bool> {
        let src = self.locate(from_ctx, from)?;
        let dest = self.locate(to_ctx, to)?;
        self.transfer(&src, from, &dest, false)
    }

    async fn rename(
        &self,
        from_ctx: &AdapterContext<'_>,
        from: &str,
        to_ctx: &AdapterContext<'_>,
        to: &str,
    ) -> VfsResult<bool> {
        let src = self.locate(from_ctx, from)?;
        let dest = self.locate(to_ctx, to)?;
        self.transfer(&src, from, &dest, true)
    }
}
