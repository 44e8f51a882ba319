//! Storage adapter trait.
//!
//! Adapters receive sanitized VFS addresses (`home:/docs/a.txt`) plus the
//! mountpoint and session they run under, and map them to their backend
//! through the [`SegmentTable`](super::SegmentTable). The permission gate has
//! already run by the time an adapter is called.

use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;

use super::error::{VfsError, VfsResult};
use super::mime::MimeResolver;
use super::mount::Mountpoint;
use super::path;
use super::types::{
    ArchiveAction, Capabilities, FileAttr, FileDescriptor, VfsMethod, VfsReader, WatchChange,
};
use crate::session::Session;

/// The mountpoint and caller an adapter call runs under.
#[derive(Debug, Clone, Copy)]
pub struct AdapterContext<'a> {
    pub mount: &'a Mountpoint,
    pub session: &'a Session,
}

/// Receives changes from a mount watcher.
pub type WatchCallback = Arc<dyn Fn(WatchChange) + Send + Sync>;

/// Keeps a watcher alive; dropping it stops the watch.
pub struct WatchHandle {
    mount: String,
    _guard: Box<dyn Any + Send>,
}

impl WatchHandle {
    pub fn new(mount: impl Into<String>, guard: impl Any + Send) -> Self {
        Self {
            mount: mount.into(),
            _guard: Box::new(guard),
        }
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle").field("mount", &self.mount).finish()
    }
}

fn unsupported<T>(method: VfsMethod) -> VfsResult<T> {
    Err(VfsError::unsupported(method.as_ref()))
}

/// A storage backend behind one or more mountpoints.
///
/// Every method defaults to [`VfsError::Unsupported`]; adapters override what
/// their backend can do.
#[async_trait]
pub trait VfsAdapter: Send + Sync {
    // ========================================================================
    // Metadata
    // ========================================================================

    async fn capabilities(
        &self,
        _ctx: &AdapterContext<'_>,
        _address: &str,
    ) -> VfsResult<Capabilities> {
        unsupported(VfsMethod::Capabilities)
    }

    /// Backend-native location of `address`.
    async fn realpath(&self, _ctx: &AdapterContext<'_>, _address: &str) -> VfsResult<String> {
        unsupported(VfsMethod::Realpath)
    }

    /// Whether the entry exists. Lookup failures report `false`.
    async fn exists(&self, _ctx: &AdapterContext<'_>, _address: &str) -> VfsResult<bool> {
        unsupported(VfsMethod::Exists)
    }

    async fn stat(&self, _ctx: &AdapterContext<'_>, _address: &str) -> VfsResult<FileDescriptor> {
        unsupported(VfsMethod::Stat)
    }

    /// Directory listing, sorted by filename.
    async fn readdir(
        &self,
        _ctx: &AdapterContext<'_>,
        _address: &str,
    ) -> VfsResult<Vec<FileDescriptor>> {
        unsupported(VfsMethod::Readdir)
    }

    /// Glob `pattern` against file names below `root`.
    async fn search(
        &self,
        _ctx: &AdapterContext<'_>,
        _root: &str,
        _pattern: &str,
    ) -> VfsResult<Vec<FileDescriptor>> {
        unsupported(VfsMethod::Search)
    }

    // ========================================================================
    // Content
    // ========================================================================

    /// Stream a file, optionally limited to an inclusive byte range.
    ///
    /// Returns `None` for directories.
    async fn readfile(
        &self,
        _ctx: &AdapterContext<'_>,
        _address: &str,
        _range: Option<(u64, u64)>,
    ) -> VfsResult<Option<VfsReader>> {
        unsupported(VfsMethod::Readfile)
    }

    /// Replace a file with the contents of `data`.
    ///
    /// Returns the bytes written, or `None` if the target is a directory.
    async fn writefile(
        &self,
        _ctx: &AdapterContext<'_>,
        _address: &str,
        _data: VfsReader,
    ) -> VfsResult<Option<u64>> {
        unsupported(VfsMethod::Writefile)
    }

    // ========================================================================
    // Structure
    // ========================================================================

    /// Create a directory. With `ensure`, an existing directory is success.
    async fn mkdir(
        &self,
        _ctx: &AdapterContext<'_>,
        _address: &str,
        _ensure: bool,
    ) -> VfsResult<bool> {
        unsupported(VfsMethod::Mkdir)
    }

    /// Remove a file or directory tree. A missing entry is success.
    async fn unlink(&self, _ctx: &AdapterContext<'_>, _address: &str) -> VfsResult<bool> {
        unsupported(VfsMethod::Unlink)
    }

    /// Create an empty file (and missing parents) if absent.
    async fn touch(&self, _ctx: &AdapterContext<'_>, _address: &str) -> VfsResult<bool> {
        unsupported(VfsMethod::Touch)
    }

    /// Copy within this adapter. Both contexts belong to mounts served by it.
    async fn copy(
        &self,
        _from_ctx: &AdapterContext<'_>,
        _from: &str,
        _to_ctx: &AdapterContext<'_>,
        _to: &str,
    ) -> VfsResult<bool> {
        unsupported(VfsMethod::Copy)
    }

    /// Move within this adapter. Both contexts belong to mounts served by it.
    async fn rename(
        &self,
        _from_ctx: &AdapterContext<'_>,
        _from: &str,
        _to_ctx: &AdapterContext<'_>,
        _to: &str,
    ) -> VfsResult<bool> {
        unsupported(VfsMethod::Rename)
    }

    /// Compress the selection into `<first>.zip`, or extract each selected
    /// zip into a sibling directory.
    async fn archive(
        &self,
        _ctx: &AdapterContext<'_>,
        _selection: &[String],
        _action: ArchiveAction,
    ) -> VfsResult<()> {
        unsupported(VfsMethod::Archive)
    }

    // ========================================================================
    // Watching
    // ========================================================================

    /// Watch every instance of `mount` (all users) for changes.
    fn watch(&self, _mount: &Mountpoint, _callback: WatchCallback) -> VfsResult<WatchHandle> {
        Err(VfsError::unsupported("watch"))
    }
}

/// Build a descriptor for `address` from backend attributes.
pub(crate) fn describe(address: &str, stat: FileAttr, mime: &MimeResolver) -> FileDescriptor {
    let filename = path::basename(address).to_string();
    let is_directory = stat.is_dir();
    FileDescriptor {
        is_directory,
        is_file: stat.is_file(),
        mime: (!is_directory).then(|| mime.resolve(&filename)),
        size: stat.size,
        path: address.to_string(),
        filename,
        stat,
    }
}
