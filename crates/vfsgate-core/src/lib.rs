//! # vfsgate-core
//!
//! Permission-checked virtual filesystem gateway.
//!
//! Callers address files as `mount:/path/to/file`. The gateway:
//! - Sanitizes the address and finds the mountpoint named by its prefix
//! - Expands the mount's root template (`{vfs}/{username}`) into a real location
//! - Checks the session's groups and the mount's read-only flag
//! - Dispatches to the mount's storage adapter (`system`, `memory`)
//! - Shapes the result (byte ranges, content type, download disposition)
//!
//! Copy and rename across different adapters fall back to read + write
//! (+ unlink), which is not atomic.

pub mod config;
pub mod session;
pub mod vfs;

pub use config::{MimeConfig, VfsConfig};
pub use session::Session;
pub use vfs::{
    AdapterContext, ArchiveAction, ByteRange, Capabilities, FileAttr, FileDescriptor, FileType,
    Gateway, GroupRule, MemoryAdapter, MimeResolver, MountAttributes, MountTable, Mountpoint,
    ReadOnlyCheck, ReadfileResponse, ResolvedTarget, SegmentTable, SystemAdapter, VfsAdapter,
    VfsError, VfsMethod, VfsOptions, VfsReader, VfsResult, WatchCallback, WatchChange, WatchHandle,
    WatchKind,
};
