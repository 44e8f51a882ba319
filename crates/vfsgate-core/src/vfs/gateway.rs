//! The VFS gateway.
//!
//! Every operation runs the same pipeline: sanitize the address, resolve its
//! mountpoint, pass the permission gate, then call the adapter. `readfile`
//! additionally shapes the response (status, range and download headers).

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use super::backends::{MemoryAdapter, SystemAdapter};
use super::error::{VfsError, VfsResult};
use super::mime::MimeResolver;
use super::mount::{MEMORY_ADAPTER, MountTable, ResolvedTarget, SYSTEM_ADAPTER};
use super::ops::{VfsAdapter, WatchCallback, WatchHandle};
use super::path;
use super::permission::{ReadOnlyCheck, check_permission};
use super::segments::SegmentTable;
use super::types::{
    ArchiveAction, ByteRange, Capabilities, FileDescriptor, VfsMethod, VfsOptions, VfsReader,
};
use crate::config::VfsConfig;
use crate::session::Session;

/// Characters `encodeURIComponent` leaves alone.
const FILENAME_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A shaped `readfile` result, ready to become an HTTP response.
pub struct ReadfileResponse {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: VfsReader,
}

impl ReadfileResponse {
    fn empty() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: Box::new(tokio::io::empty()),
        }
    }

    /// First header value with this name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Debug for ReadfileResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadfileResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Permission-checked entry point to every mounted adapter.
#[derive(Debug)]
pub struct Gateway {
    mounts: MountTable,
    watch: bool,
}

impl Gateway {
    /// Build from config with the built-in `system` and `memory` adapters,
    /// resolving `{root}` against the working directory.
    pub fn new(config: &VfsConfig) -> VfsResult<Self> {
        let segments = SegmentTable::from_config(config)?;
        Self::with_segments(config, segments)
    }

    /// Build with explicit segment values and the built-in adapters.
    pub fn with_segments(config: &VfsConfig, segments: SegmentTable) -> VfsResult<Self> {
        let segments = Arc::new(segments);
        let mime = Arc::new(MimeResolver::new(&config.mime));

        let mut adapters: HashMap<String, Arc<dyn VfsAdapter>> = HashMap::new();
        adapters.insert(
            SYSTEM_ADAPTER.to_string(),
            Arc::new(SystemAdapter::new(Arc::clone(&segments), Arc::clone(&mime))),
        );
        adapters.insert(
            MEMORY_ADAPTER.to_string(),
            Arc::new(MemoryAdapter::new(segments, mime)),
        );
        Self::with_adapters(config, adapters)
    }

    /// Build with a caller-supplied adapter registry.
    pub fn with_adapters(
        config: &VfsConfig,
        adapters: HashMap<String, Arc<dyn VfsAdapter>>,
    ) -> VfsResult<Self> {
        let mounts = MountTable::new(config.mountpoints.iter().cloned(), adapters)?;
        tracing::info!(mounts = ?mounts, "vfs gateway ready");
        Ok(Self {
            mounts,
            watch: config.watch,
        })
    }

    /// Sanitize, resolve and authorize a single-address call.
    fn prepare(
        &self,
        session: &Session,
        address: &str,
        method: VfsMethod,
        read_only: ReadOnlyCheck,
    ) -> VfsResult<(ResolvedTarget, String)> {
        let address = path::sanitize(address)?;
        let target = self.mounts.resolve(&address)?;
        let strict = target.mount.attributes.strict_groups;
        check_permission(session, method, read_only, strict)(&target)?;
        tracing::debug!(%method, %address, mount = %target.mount.name, "vfs call");
        Ok((target, address))
    }

    fn prepare_simple(
        &self,
        session: &Session,
        address: &str,
        method: VfsMethod,
    ) -> VfsResult<(ResolvedTarget, String)> {
        self.prepare(session, address, method, ReadOnlyCheck::for_method(method))
    }

    #[tracing::instrument(skip(self, session), fields(user = %session.username), name = "vfs.capabilities")]
    pub async fn capabilities(&self, session: &Session, address: &str) -> VfsResult<Capabilities> {
        let (target, address) = self.prepare_simple(session, address, VfsMethod::Capabilities)?;
        target.adapter.capabilities(&target.context(session), &address).await
    }

    #[tracing::instrument(skip(self, session), fields(user = %session.username), name = "vfs.realpath")]
    pub async fn realpath(&self, session: &Session, address: &str) -> VfsResult<String> {
        let (target, address) = self.prepare_simple(session, address, VfsMethod::Realpath)?;
        target.adapter.realpath(&target.context(session), &address).await
    }

    #[tracing::instrument(skip(self, session), fields(user = %session.username), name = "vfs.exists")]
    pub async fn exists(&self, session: &Session, address: &str) -> VfsResult<bool> {
        let (target, address) = self.prepare_simple(session, address, VfsMethod::Exists)?;
        target.adapter.exists(&target.context(session), &address).await
    }

    #[tracing::instrument(skip(self, session), fields(user = %session.username), name = "vfs.stat")]
    pub async fn stat(&self, session: &Session, address: &str) -> VfsResult<FileDescriptor> {
        let (target, address) = self.prepare_simple(session, address, VfsMethod::Stat)?;
        target.adapter.stat(&target.context(session), &address).await
    }

    #[tracing::instrument(skip(self, session), fields(user = %session.username), name = "vfs.readdir")]
    pub async fn readdir(
        &self,
        session: &Session,
        address: &str,
    ) -> VfsResult<Vec<FileDescriptor>> {
        let (target, address) = self.prepare_simple(session, address, VfsMethod::Readdir)?;
        target.adapter.readdir(&target.context(session), &address).await
    }

    /// Read a file and shape the response.
    ///
    /// A satisfiable `range` on a mount with ranges enabled yields a 206 with
    /// `Content-Range`; an unsatisfiable one falls back to the whole file.
    /// Directories yield an empty 200.
    #[tracing::instrument(skip(self, session, options), fields(user = %session.username), name = "vfs.readfile")]
    pub async fn readfile(
        &self,
        session: &Session,
        address: &str,
        range: Option<ByteRange>,
        options: &VfsOptions,
    ) -> VfsResult<ReadfileResponse> {
        let (target, address) = self.prepare_simple(session, address, VfsMethod::Readfile)?;
        let ctx = target.context(session);

        let stat = match target.adapter.stat(&ctx, &address).await {
            Ok(stat) => Some(stat),
            Err(e) => {
                tracing::debug!(error = %e, "stat before readfile failed");
                None
            }
        };

        let ranged = match (range, &stat) {
            (Some(range), Some(stat)) if target.mount.ranges_enabled() => {
                let resolved = range.resolve(stat.size);
                if resolved.is_none() {
                    tracing::warn!(
                        ?range,
                        size = stat.size,
                        "unsatisfiable range, serving whole file"
                    );
                }
                resolved
            }
            _ => None,
        };

        let Some(body) = target.adapter.readfile(&ctx, &address, ranged).await? else {
            return Ok(ReadfileResponse::empty());
        };

        let mime = stat.as_ref().and_then(|s| s.mime.clone());
        let mut headers = Vec::new();
        let status = match (ranged, &stat) {
            (Some((start, end)), Some(stat)) => {
                headers.push(("Accept-Ranges", "bytes".to_string()));
                headers.push(("Content-Length", (end - start + 1).to_string()));
                headers.push(("Content-Range", format!("bytes {start}-{end}/{}", stat.size)));
                206
            }
            _ => 200,
        };
        if let Some(mime) = mime {
            headers.push(("Content-Type", mime));
        }
        if options.download {
            let filename = utf8_percent_encode(path::basename(&address), FILENAME_ESCAPE);
            headers.push((
                "Content-Disposition",
                format!("attachment; filename*=utf-8''{filename}"),
            ));
        }

        Ok(ReadfileResponse {
            status,
            headers,
            body,
        })
    }

    /// Write a file; returns the bytes written, or -1 if the target is a
    /// directory.
    #[tracing::instrument(skip(self, session, data), fields(user = %session.username), name = "vfs.writefile")]
    pub async fn writefile(
        &self,
        session: &Session,
        address: &str,
        data: VfsReader,
    ) -> VfsResult<i64> {
        let (target, address) = self.prepare_simple(session, address, VfsMethod::Writefile)?;
        let written = target
            .adapter
            .writefile(&target.context(session), &address, data)
            .await?;
        Ok(written.map_or(-1, |n| n as i64))
    }

    #[tracing::instrument(skip(self, session, options), fields(user = %session.username), name = "vfs.mkdir")]
    pub async fn mkdir(
        &self,
        session: &Session,
        address: &str,
        options: &VfsOptions,
    ) -> VfsResult<bool> {
        let (target, address) = self.prepare_simple(session, address, VfsMethod::Mkdir)?;
        target
            .adapter
            .mkdir(&target.context(session), &address, options.ensure)
            .await
    }

    #[tracing::instrument(skip(self, session), fields(user = %session.username), name = "vfs.unlink")]
    pub async fn unlink(&self, session: &Session, address: &str) -> VfsResult<bool> {
        let (target, address) = self.prepare_simple(session, address, VfsMethod::Unlink)?;
        target.adapter.unlink(&target.context(session), &address).await
    }

    #[tracing::instrument(skip(self, session), fields(user = %session.username), name = "vfs.touch")]
    pub async fn touch(&self, session: &Session, address: &str) -> VfsResult<bool> {
        let (target, address) = self.prepare_simple(session, address, VfsMethod::Touch)?;
        target.adapter.touch(&target.context(session), &address).await
    }

    /// Search below `root`. Mounts with `searchable = false` yield nothing.
    #[tracing::instrument(skip(self, session), fields(user = %session.username), name = "vfs.search")]
    pub async fn search(
        &self,
        session: &Session,
        root: &str,
        pattern: &str,
    ) -> VfsResult<Vec<FileDescriptor>> {
        let sanitized = path::sanitize(root)?;
        if !self.mounts.resolve(&sanitized)?.mount.attributes.searchable {
            return Ok(Vec::new());
        }

        let (target, root) = self.prepare_simple(session, &sanitized, VfsMethod::Search)?;
        target
            .adapter
            .search(&target.context(session), &root, pattern)
            .await
    }

    /// Compress or extract a selection. All entries must share the first
    /// entry's mountpoint.
    #[tracing::instrument(skip(self, session), fields(user = %session.username), name = "vfs.archive")]
    pub async fn archive(
        &self,
        session: &Session,
        selection: &[String],
        action: &str,
    ) -> VfsResult<()> {
        let selection = path::sanitize_all(selection)?;
        let Some(first) = selection.first() else {
            return Err(VfsError::bad_request("archive selection is empty"));
        };
        let prefix = path::get_prefix(first);
        if let Some(stray) = selection.iter().find(|a| path::get_prefix(a) != prefix) {
            return Err(VfsError::bad_request(format!(
                "archive selection must share one mountpoint, '{stray}' is not on '{prefix}'"
            )));
        }

        let (target, _) = self.prepare(
            session,
            first,
            VfsMethod::Archive,
            ReadOnlyCheck::Target(first.clone()),
        )?;
        let action = ArchiveAction::from_str(action)
            .map_err(|_| VfsError::UnknownAction(action.to_string()))?;

        target
            .adapter
            .archive(&target.context(session), &selection, action)
            .await
    }

    #[tracing::instrument(skip(self, session), fields(user = %session.username), name = "vfs.copy")]
    pub async fn copy(&self, session: &Session, from: &str, to: &str) -> VfsResult<bool> {
        self.transfer(session, from, to, VfsMethod::Copy).await
    }

    #[tracing::instrument(skip(self, session), fields(user = %session.username), name = "vfs.rename")]
    pub async fn rename(&self, session: &Session, from: &str, to: &str) -> VfsResult<bool> {
        self.transfer(session, from, to, VfsMethod::Rename).await
    }

    /// Copy or rename between two addresses.
    ///
    /// The source is checked as a read and the destination as a write. Within
    /// one adapter the native operation runs; across adapters the file is
    /// streamed over, and a rename unlinks the source only after the write
    /// succeeded. Directories cannot cross adapters.
    async fn transfer(
        &self,
        session: &Session,
        from: &str,
        to: &str,
        method: VfsMethod,
    ) -> VfsResult<bool> {
        let (src, from) = self.prepare(session, from, VfsMethod::Readfile, ReadOnlyCheck::Skip)?;
        let (dest, to) = self.prepare(session, to, VfsMethod::Writefile, ReadOnlyCheck::Enforce)?;
        let src_ctx = src.context(session);
        let dest_ctx = dest.context(session);

        if src.same_adapter(&dest) {
            return match method {
                VfsMethod::Rename => src.adapter.rename(&src_ctx, &from, &dest_ctx, &to).await,
                _ => src.adapter.copy(&src_ctx, &from, &dest_ctx, &to).await,
            };
        }

        let Some(data) = src.adapter.readfile(&src_ctx, &from, None).await? else {
            tracing::debug!(%from, "directory cannot cross adapters");
            return Ok(false);
        };
        if dest.adapter.writefile(&dest_ctx, &to, data).await?.is_none() {
            return Ok(false);
        }
        if method == VfsMethod::Rename {
            src.adapter.unlink(&src_ctx, &from).await?;
        }
        Ok(true)
    }

    /// Start watchers for every mount that allows it. Returns nothing when
    /// watching is disabled in config. Mounts whose adapter cannot watch are
    /// skipped.
    pub fn watch(&self, callback: WatchCallback) -> Vec<WatchHandle> {
        if !self.watch {
            return Vec::new();
        }

        let mut handles = Vec::new();
        for mount in self.mounts.list_mounts() {
            if !mount.attributes.watch {
                continue;
            }
            let target = match self.mounts.resolve(&mount.root()) {
                Ok(target) => target,
                Err(e) => {
                    tracing::warn!(
                        mount = %mount.name,
                        error = %e,
                        "cannot resolve mount for watching"
                    );
                    continue;
                }
            };
            match target.adapter.watch(&mount, Arc::clone(&callback)) {
                Ok(handle) => handles.push(handle),
                Err(VfsError::Unsupported(_)) => {
                    tracing::debug!(mount = %mount.name, "adapter does not watch");
                }
                Err(e) => {
                    tracing::warn!(mount = %mount.name, error = %e, "failed to watch mountpoint")
                }
            }
        }
        handles
    }
}
