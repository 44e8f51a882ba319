//! VFS error types.

use std::io;
use thiserror::Error;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Caller is not authenticated, or the backend refused access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Group policy rejected the caller.
    #[error("{0}")]
    Forbidden(String),

    /// Mutation attempted on a read-only mountpoint.
    #[error("Mountpoint '{0}' is read-only")]
    ReadOnly(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Path escapes the mount root.
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Invalid address or path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// No mountpoint is registered for the address prefix.
    #[error("Mountpoint not found for '{0}'")]
    NoMountPoint(String),

    /// The mount's adapter does not implement the method.
    #[error("Adapter does not support {0}")]
    Unsupported(String),

    /// Archive action other than compress/extract.
    #[error("Unknown archive action: {0}")]
    UnknownAction(String),

    /// Malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Zip read/write failure.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Filesystem watcher failure.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a Forbidden error.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create a PathEscapesRoot error.
    pub fn path_escapes_root(path: impl Into<String>) -> Self {
        Self::PathEscapesRoot(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create a NoMountPoint error.
    pub fn no_mount_point(path: impl Into<String>) -> Self {
        Self::NoMountPoint(path.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(method: impl Into<String>) -> Self {
        Self::Unsupported(method.into())
    }

    /// Create a BadRequest error.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// HTTP-style status for this error.
    ///
    /// `ENOENT` → 404, `EACCES` → 401, policy rejections → 403, anything
    /// uncategorized → 400.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::PermissionDenied(_) => 401,
            Self::Forbidden(_)
            | Self::ReadOnly(_)
            | Self::NoMountPoint(_)
            | Self::PathEscapesRoot(_) => 403,
            Self::Io(e) => match e.kind() {
                io::ErrorKind::NotFound => 404,
                io::ErrorKind::PermissionDenied => 401,
                _ => 400,
            },
            _ => 400,
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
