//! Virtual Filesystem gateway.
//!
//! Key components:
//!
//! - [`path`] - Address sanitizing and prefix extraction
//! - [`MountTable`] - Immutable registry resolving `prefix:` to a mount + adapter
//! - [`SegmentTable`] - Expands `{root}`, `{vfs}`, `{username}` in mount roots
//! - [`permission`] - Group and read-only policy, checked before any adapter call
//! - [`VfsAdapter`] - Storage backend trait ([`SystemAdapter`], [`MemoryAdapter`])
//! - [`Gateway`] - Orchestrates resolve → authorize → execute → shape
//!
//! ## Design Decisions
//!
//! - **Prefix routing**: a mount is matched by exact name, not by path prefix.
//! - **Resolved per call**: targets are recomputed on every operation so
//!   session-dependent segments always reflect the caller.
//! - **Typed unsupported**: adapters only implement what their backend can do;
//!   everything else is [`VfsError::Unsupported`].

pub mod backends;
mod error;
mod gateway;
mod mime;
mod mount;
mod ops;
pub mod path;
pub mod permission;
mod segments;
mod types;

pub use backends::{MemoryAdapter, SystemAdapter};
pub use error::{VfsError, VfsResult};
pub use gateway::{Gateway, ReadfileResponse};
pub use mime::MimeResolver;
pub use mount::{
    GroupRule, MEMORY_ADAPTER, MountAttributes, MountTable, Mountpoint, ResolvedTarget,
    SYSTEM_ADAPTER,
};
pub use ops::{AdapterContext, VfsAdapter, WatchCallback, WatchHandle};
pub use permission::ReadOnlyCheck;
pub use segments::{Segment, SegmentTable};
pub use types::{
    ArchiveAction, ByteRange, Capabilities, FileAttr, FileDescriptor, FileType, VfsMethod,
    VfsOptions, VfsReader, WatchChange, WatchKind,
};
