//! Core VFS types.
//!
//! Descriptors and stats serialize in camelCase because browser clients
//! consume them directly as JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use strum::{AsRefStr, Display, EnumString};
use tokio::io::AsyncRead;

/// Byte stream produced by `readfile` and consumed by `writefile`.
pub type VfsReader = Box<dyn AsyncRead + Send + Unpin>;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Returns true if this is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        matches!(self, FileType::Symlink)
    }
}

/// Raw backend stat, carried inside every [`FileDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttr {
    /// Size in bytes.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Unix mode bits (e.g., 0o644).
    pub mode: u32,
    /// Last modification time, epoch milliseconds.
    pub mtime_ms: i64,
    /// Last access time, epoch milliseconds.
    pub atime_ms: Option<i64>,
    /// Creation time, epoch milliseconds.
    pub birthtime_ms: Option<i64>,
    /// Number of hard links.
    pub nlink: u64,
    /// User ID (local fs only).
    pub uid: Option<u32>,
    /// Group ID (local fs only).
    pub gid: Option<u32>,
}

impl FileAttr {
    /// Attributes for a file created now.
    pub fn file(size: u64) -> Self {
        let now = epoch_millis(SystemTime::now());
        Self {
            size,
            kind: FileType::File,
            mode: 0o644,
            mtime_ms: now,
            atime_ms: Some(now),
            birthtime_ms: Some(now),
            nlink: 1,
            uid: None,
            gid: None,
        }
    }

    /// Attributes for a directory created now.
    pub fn directory() -> Self {
        let now = epoch_millis(SystemTime::now());
        Self {
            size: 0,
            kind: FileType::Directory,
            mode: 0o755,
            mtime_ms: now,
            atime_ms: Some(now),
            birthtime_ms: Some(now),
            nlink: 2, // . and ..
            uid: None,
            gid: None,
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Milliseconds since the Unix epoch; negative for times before it.
pub(crate) fn epoch_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

/// Metadata record returned for every listed or stat'ed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub is_directory: bool,
    pub is_file: bool,
    /// `None` for directories.
    pub mime: Option<String>,
    pub size: u64,
    /// VFS address of the entry.
    pub path: String,
    pub filename: String,
    pub stat: FileAttr,
}

/// Static backend capability flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Listing can be sorted server-side.
    pub sort: bool,
    /// Listing can be paginated server-side.
    pub pagination: bool,
}

/// A single range from a `Range: bytes=...` header.
///
/// `start: None` is the suffix form (`bytes=-500`, the last 500 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Parse a `Range` header value. Only the first range of a multi-range
    /// request is kept.
    pub fn parse(header: &str) -> Option<Self> {
        let spec = header.trim().strip_prefix("bytes=")?;
        let first = spec.split(',').next()?.trim();
        let (start, end) = first.split_once('-')?;
        let parse = |s: &str| -> Option<Option<u64>> {
            let s = s.trim();
            if s.is_empty() {
                Some(None)
            } else {
                s.parse().ok().map(Some)
            }
        };
        let range = Self {
            start: parse(start)?,
            end: parse(end)?,
        };
        if range.start.is_none() && range.end.is_none() {
            return None;
        }
        Some(range)
    }

    /// Inclusive `(start, end)` offsets within a file of `size` bytes, or
    /// `None` when the range cannot be satisfied.
    pub fn resolve(&self, size: u64) -> Option<(u64, u64)> {
        if size == 0 {
            return None;
        }
        let last = size - 1;
        match (self.start, self.end) {
            (Some(start), Some(end)) if start <= end && start <= last => {
                Some((start, end.min(last)))
            }
            (Some(start), None) if start <= last => Some((start, last)),
            (None, Some(suffix)) if suffix > 0 => Some((size - suffix.min(size), last)),
            _ => None,
        }
    }
}

/// Archive operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ArchiveAction {
    /// Zip the selection into a sibling of its first entry.
    Compress,
    /// Unpack each selected zip into a sibling directory.
    Extract,
}

/// Gateway operations, named as they appear in routes and group maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum VfsMethod {
    Capabilities,
    Exists,
    Stat,
    Readdir,
    Readfile,
    Writefile,
    Rename,
    Copy,
    Mkdir,
    Unlink,
    Touch,
    Search,
    Archive,
    Realpath,
}

impl VfsMethod {
    /// Returns true if the method changes backend state.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::Writefile
                | Self::Rename
                | Self::Copy
                | Self::Mkdir
                | Self::Unlink
                | Self::Touch
                | Self::Archive
        )
    }
}

/// Per-request options sent by clients as a JSON object or JSON string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VfsOptions {
    /// Serve `readfile` as an attachment.
    pub download: bool,
    /// `mkdir` succeeds when the directory already exists.
    pub ensure: bool,
}

impl VfsOptions {
    /// Parse options from a JSON value. Strings are parsed as JSON; anything
    /// malformed falls back to the defaults.
    pub fn from_value(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(raw) => Self::parse(raw),
            serde_json::Value::Object(_) => {
                serde_json::from_value(value.clone()).unwrap_or_default()
            }
            _ => Self::default(),
        }
    }

    /// Parse options from a raw JSON string, defaulting on malformed input.
    pub fn parse(raw: &str) -> Self {
        serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .filter(|v| v.is_object())
            .map(|v| Self::from_value(&v))
            .unwrap_or_default()
    }
}

/// Kind of change reported by a mount watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum WatchKind {
    Add,
    AddDir,
    Unlink,
    UnlinkDir,
}

/// A filesystem change observed under a watched mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchChange {
    /// Mountpoint name.
    pub mount: String,
    /// Dynamic segment values extracted from the changed path
    /// (e.g. `username`).
    pub segments: BTreeMap<String, String>,
    /// Path relative to the expanded mount root.
    pub path: String,
    /// VFS address of the changed entry.
    pub target: String,
    pub kind: WatchKind,
}
