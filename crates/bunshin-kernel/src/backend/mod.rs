//! Storage backends behind a single async trait.
//!
//! Paths at this layer are virtual: absolute, forward-slash strings that a
//! [`CompositeBackend`](composite::CompositeBackend) routes by prefix before
//! a concrete backend ever sees them.

pub mod composite;
pub mod local;
pub mod memory;
pub mod sandbox;
pub mod store;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BackendError, BackendResult};
use crate::text::ReplaceMode;
use crate::types::{EditResult, ExecOutput, FileContent, FileInfo, GrepMatch, WriteResult};

/// The operation contract every backend implements.
///
/// `execute` is opt-in: backends that cannot run commands keep the default,
/// which reports `CapabilityUnsupported`, and callers can probe ahead of
/// time with [`supports_execute`](FileBackend::supports_execute).
#[async_trait]
pub trait FileBackend: Send + Sync {
    /// Short identifier used in logs and route listings.
    fn name(&self) -> &str;

    /// List the entries directly under `path`.
    async fn list(&self, path: &str) -> BackendResult<Vec<FileInfo>>;

    /// Read a file's full contents.
    async fn read(&self, path: &str) -> BackendResult<FileContent>;

    /// Write `content` to `path`, creating parent directories as needed.
    ///
    /// With `overwrite` false an existing file is an `AlreadyExists` error.
    async fn write(&self, path: &str, content: &str, overwrite: bool) -> BackendResult<WriteResult>;

    /// Replace `old` with `new` in the file at `path`.
    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        mode: ReplaceMode,
    ) -> BackendResult<EditResult>;

    /// Find files matching a glob pattern, rooted at `path`.
    async fn glob(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>>;

    /// Search file contents for a regex pattern under `path`.
    ///
    /// `glob` restricts the search to files whose path matches the pattern.
    async fn grep(
        &self,
        pattern: &str,
        path: &str,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>>;

    /// Whether this backend can run commands.
    fn supports_execute(&self) -> bool {
        false
    }

    /// Run a shell command and capture its output.
    async fn execute(&self, command: &str) -> BackendResult<ExecOutput> {
        let _ = command;
        Err(BackendError::unsupported(format!(
            "backend '{}' does not support command execution",
            self.name()
        )))
    }

    /// Whether a file exists at `path`.
    async fn exists(&self, path: &str) -> BackendResult<bool> {
        match self.read(path).await {
            Ok(_) => Ok(true),
            Err(BackendError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// A view of another backend narrowed to one subtree.
///
/// Callers address paths relative to the scope root; the adapter joins
/// the prefix on the way in and strips it from results on the way out.
/// Delegated tasks with a scoping prefix see the parent through this.
pub struct ScopedBackend {
    name: String,
    inner: Arc<dyn FileBackend>,
    /// Bare form, e.g. `/docs`.
    prefix: String,
}

impl ScopedBackend {
    pub fn new(inner: Arc<dyn FileBackend>, prefix: impl AsRef<str>) -> BackendResult<Self> {
        let trimmed = prefix.as_ref().trim_matches('/');
        if trimmed.is_empty() {
            return Err(BackendError::invalid_path(
                "scope prefix must name at least one path segment",
            ));
        }
        Ok(Self {
            name: format!("{}:{}", inner.name(), trimmed),
            inner,
            prefix: format!("/{trimmed}"),
        })
    }

    fn outer(&self, path: &str) -> BackendResult<String> {
        validate_virtual_path(path)?;
        if path == "/" {
            Ok(self.prefix.clone())
        } else {
            Ok(format!("{}{}", self.prefix, path))
        }
    }

    fn unscope(&self, outer: &str) -> String {
        match outer.strip_prefix(&self.prefix) {
            Some("") | None => "/".to_string(),
            Some(rest) => rest.to_string(),
        }
    }
}

#[async_trait]
impl FileBackend for ScopedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        let mut entries = self.inner.list(&self.outer(path)?).await?;
        for e in &mut entries {
            e.path = self.unscope(&e.path);
        }
        Ok(entries)
    }

    async fn read(&self, path: &str) -> BackendResult<FileContent> {
        self.inner.read(&self.outer(path)?).await
    }

    async fn write(&self, path: &str, content: &str, overwrite: bool) -> BackendResult<WriteResult> {
        let mut result = self.inner.write(&self.outer(path)?, content, overwrite).await?;
        result.path = path.to_string();
        Ok(result)
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        mode: ReplaceMode,
    ) -> BackendResult<EditResult> {
        let mut result = self.inner.edit(&self.outer(path)?, old, new, mode).await?;
        result.path = path.to_string();
        Ok(result)
    }

    async fn glob(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>> {
        let mut hits = self.inner.glob(pattern, &self.outer(path)?).await?;
        for e in &mut hits {
            e.path = self.unscope(&e.path);
        }
        Ok(hits)
    }

    async fn grep(
        &self,
        pattern: &str,
        path: &str,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>> {
        let mut hits = self.inner.grep(pattern, &self.outer(path)?, glob).await?;
        for m in &mut hits {
            m.path = self.unscope(&m.path);
        }
        Ok(hits)
    }

    fn supports_execute(&self) -> bool {
        self.inner.supports_execute()
    }

    async fn execute(&self, command: &str) -> BackendResult<ExecOutput> {
        self.inner.execute(command).await
    }
}

/// Reject relative or empty virtual paths before they reach a backend.
pub(crate) fn validate_virtual_path(path: &str) -> BackendResult<()> {
    if path.is_empty() {
        return Err(BackendError::invalid_path("path must not be empty"));
    }
    if !path.starts_with('/') {
        return Err(BackendError::invalid_path(format!(
            "path must be absolute: {path}"
        )));
    }
    Ok(())
}
