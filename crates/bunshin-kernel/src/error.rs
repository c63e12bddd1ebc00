//! Backend error types.

use std::io;
use thiserror::Error;

/// Backend error type.
///
/// Every storage engine reports failures through this one enum so callers
/// can reason about outcomes without knowing which backend answered.
#[derive(Debug, Error)]
pub enum BackendError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists (non-overwriting write).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Edit target matched more than once without disambiguation.
    #[error("ambiguous edit: {0}")]
    AmbiguousEdit(String),

    /// Edit target string not present in the file.
    #[error("pattern not found: {0}")]
    PatternNotFound(String),

    /// Path escape or symlink defense tripped.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Write exceeds the configured size ceiling.
    #[error("size limit exceeded: {0}")]
    SizeLimitExceeded(String),

    /// Optional operation not implemented by this backend.
    #[error("capability not supported: {0}")]
    CapabilityUnsupported(String),

    /// Transport or remote-execution failure, distinct from NotFound.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Two routes claimed the same exact prefix at registration.
    #[error("route conflict: {0}")]
    RouteConflict(String),

    /// Delegated task cancelled before completion.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Malformed virtual path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Expected a file, found a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create an AmbiguousEdit error.
    pub fn ambiguous_edit(msg: impl Into<String>) -> Self {
        Self::AmbiguousEdit(msg.into())
    }

    /// Create a PatternNotFound error.
    pub fn pattern_not_found(msg: impl Into<String>) -> Self {
        Self::PatternNotFound(msg.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create a SizeLimitExceeded error.
    pub fn size_limit(msg: impl Into<String>) -> Self {
        Self::SizeLimitExceeded(msg.into())
    }

    /// Create a CapabilityUnsupported error.
    pub fn unsupported(op: impl Into<String>) -> Self {
        Self::CapabilityUnsupported(op.into())
    }

    /// Create a BackendUnavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Create a RouteConflict error.
    pub fn route_conflict(prefix: impl Into<String>) -> Self {
        Self::RouteConflict(prefix.into())
    }

    /// Create a Cancelled error.
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Stable machine-readable kind name for the tool error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::AmbiguousEdit(_) => "ambiguous_edit",
            Self::PatternNotFound(_) => "pattern_not_found",
            Self::PermissionDenied(_) => "permission_denied",
            Self::SizeLimitExceeded(_) => "size_limit_exceeded",
            Self::CapabilityUnsupported(_) => "capability_unsupported",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::RouteConflict(_) => "route_conflict",
            Self::Cancelled(_) => "cancelled",
            Self::InvalidPath(_) => "invalid_path",
            Self::IsADirectory(_) => "is_a_directory",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}

/// Map raw I/O failures onto domain error kinds where the kind is clear.
pub(crate) fn io_to_backend(err: io::Error, path: &str) -> BackendError {
    match err.kind() {
        io::ErrorKind::NotFound => BackendError::not_found(path),
        io::ErrorKind::AlreadyExists => BackendError::already_exists(path),
        io::ErrorKind::PermissionDenied => BackendError::permission_denied(path),
        _ => BackendError::Io(err),
    }
}

/// Backend result type.
pub type BackendResult<T> = Result<T, BackendError>;
