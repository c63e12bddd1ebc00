//! bunshin-glob: Glob matching and async file walking.
//!
//! Provides:
//! - **glob_match**: Shell-style glob pattern matching with brace expansion
//! - **GlobPath**: Path-aware glob matching with `**` (globstar) support
//! - **FileWalker**: Async recursive directory walker, generic over `WalkerFs`
//!
//! The walker is generic over `WalkerFs`, a minimal read-only filesystem trait.
//! Consumers implement `WalkerFs` to adapt their own storage backend.

pub mod glob;
mod path;
mod walker;

pub use glob::{contains_glob, expand_braces, glob_match};
pub use path::{GlobPath, PatternError};
pub use walker::{EntryTypes, FileWalker, WalkOptions};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from filesystem operations within the walker.
#[derive(Debug, Error)]
pub enum WalkerError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Minimal read-only filesystem abstraction for the walker.
///
/// Implement this trait to adapt a storage backend (in-memory table,
/// real disk, key-value store) to `FileWalker`.
#[async_trait]
pub trait WalkerFs: Send + Sync {
    /// The directory entry type returned by `list_dir`.
    type DirEntry: WalkerDirEntry;

    /// List the entries in a directory.
    async fn list_dir(&self, path: &Path) -> Result<Vec<Self::DirEntry>, WalkerError>;

    /// Check if a path is a directory.
    async fn is_dir(&self, path: &Path) -> bool;

    /// Check if a path exists.
    async fn exists(&self, path: &Path) -> bool;
}

/// A single entry returned by `WalkerFs::list_dir`.
pub trait WalkerDirEntry: Send {
    /// The entry name (file or directory name, not full path).
    fn name(&self) -> &str;

    /// True if this entry is a directory.
    fn is_dir(&self) -> bool;

    /// True if this entry is a regular file.
    fn is_file(&self) -> bool;

    /// True if this entry is a symbolic link.
    fn is_symlink(&self) -> bool;
}
