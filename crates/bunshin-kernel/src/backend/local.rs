//! Local filesystem backend.
//!
//! Operations are confined to a root directory. Virtual paths are resolved
//! against the root and canonicalized, so `..` components and symlinks that
//! point outside the root are both rejected.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::memory::compile_grep_pattern;
use super::{validate_virtual_path, FileBackend};
use crate::error::{io_to_backend, BackendError, BackendResult};
use crate::text::{self, ReplaceMode};
use crate::types::{EditResult, FileContent, FileInfo, GrepMatch, WriteResult};

/// Default ceiling on file sizes for reads, writes, and content search.
const DEFAULT_MAX_FILE_SIZE: u64 = 5_000_000;

const GREP_MAX_MATCHES: usize = 200;

/// Backend over a real directory tree.
///
/// The root is canonicalized at construction time to handle symlinks
/// (e.g. macOS `/tmp` resolving to `/private/tmp`).
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
    max_file_size: u64,
}

impl LocalBackend {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self {
            name: name.into(),
            root,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a virtual path to a real path under the root.
    ///
    /// The result is canonicalized (or its parent is, for paths that do
    /// not exist yet) and checked against the root, which rejects both
    /// `..` traversal and symlinks escaping the tree.
    fn resolve(&self, path: &str) -> BackendResult<PathBuf> {
        validate_virtual_path(path)?;
        let rel = path.trim_start_matches('/');
        if rel.starts_with('~') {
            return Err(BackendError::permission_denied(format!(
                "home-relative paths are not allowed: {path}"
            )));
        }
        if rel.is_empty() {
            return Ok(self.root.clone());
        }

        let rel_path = Path::new(rel);
        if rel_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(BackendError::permission_denied(format!(
                "path escapes root: {path}"
            )));
        }

        let full = self.root.join(rel_path);
        let canonical = if full.exists() {
            dunce::canonicalize(&full).map_err(|e| io_to_backend(e, path))?
        } else if let Some(parent) = full.parent() {
            if parent.exists() {
                dunce::canonicalize(parent)
                    .map_err(|e| io_to_backend(e, path))?
                    .join(full.file_name().unwrap_or_default())
            } else {
                full.clone()
            }
        } else {
            full.clone()
        };

        if !canonical.starts_with(&self.root) {
            return Err(BackendError::permission_denied(format!(
                "path escapes root: {path}"
            )));
        }
        Ok(canonical)
    }

    /// Open for reading without following a symlink at the final
    /// component. The resolved path was already validated, so a symlink
    /// appearing here means it was swapped in after resolution.
    async fn open_nofollow_read(&self, full: &Path, path: &str) -> BackendResult<fs::File> {
        let mut options = fs::OpenOptions::new();
        options.read(true);
        #[cfg(unix)]
        options.custom_flags(rustix::fs::OFlags::NOFOLLOW.bits() as i32);
        options
            .open(full)
            .await
            .map_err(|e| nofollow_error(e, path))
    }

    async fn open_nofollow_write(&self, full: &Path, path: &str) -> BackendResult<fs::File> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.custom_flags(rustix::fs::OFlags::NOFOLLOW.bits() as i32);
        options
            .open(full)
            .await
            .map_err(|e| nofollow_error(e, path))
    }

    /// Turn a real path back into the virtual form callers use.
    fn virtual_path(&self, full: &Path) -> String {
        let rel = full.strip_prefix(&self.root).unwrap_or(full);
        let joined = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        format!("/{joined}")
    }

    async fn info_for(&self, full: &Path) -> BackendResult<FileInfo> {
        let meta = fs::symlink_metadata(full)
            .await
            .map_err(|e| io_to_backend(e, &full.display().to_string()))?;
        if meta.is_dir() {
            Ok(FileInfo::dir(self.virtual_path(full)))
        } else {
            Ok(FileInfo::file(
                self.virtual_path(full),
                meta.len(),
                meta.modified().ok(),
            ))
        }
    }

    /// Content search via ripgrep's JSON event stream.
    ///
    /// Returns `None` when ripgrep is not installed so the caller can fall
    /// back to an in-process scan.
    async fn grep_ripgrep(
        &self,
        pattern: &str,
        root: &Path,
        glob: Option<&str>,
    ) -> BackendResult<Option<Vec<GrepMatch>>> {
        let mut cmd = Command::new("rg");
        cmd.arg("--json").arg("--no-messages");
        if let Some(g) = glob {
            cmd.arg("--glob").arg(g);
        }
        cmd.arg("--max-filesize")
            .arg(self.max_file_size.to_string())
            .arg("--regexp")
            .arg(pattern)
            .arg(root);

        let output = match cmd.output().await {
            Ok(out) => out,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::Io(e)),
        };

        // Exit code 1 means no matches, which is not an error.
        let mut matches = Vec::new();
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            let Ok(event) = serde_json::from_str::<serde_json::Value>(line) else {
                continue;
            };
            if event["type"] != "match" {
                continue;
            }
            let data = &event["data"];
            let Some(path) = data["path"]["text"].as_str() else {
                continue;
            };
            let line_number = data["line_number"].as_u64().unwrap_or(0);
            let line_text = data["lines"]["text"]
                .as_str()
                .unwrap_or("")
                .trim_end_matches('\n');
            matches.push(GrepMatch::new(
                self.virtual_path(Path::new(path)),
                line_number,
                line_text,
            ));
            if matches.len() >= GREP_MAX_MATCHES {
                break;
            }
        }
        matches.sort_by(|a, b| a.path.cmp(&b.path).then(a.line.cmp(&b.line)));
        Ok(Some(matches))
    }

    /// In-process content search used when ripgrep is unavailable.
    async fn grep_scan(
        &self,
        pattern: &str,
        root: &Path,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>> {
        let re = compile_grep_pattern(pattern)?;
        let compiled = glob
            .map(bunshin_glob::GlobPath::new)
            .transpose()
            .map_err(|e| BackendError::invalid_path(format!("bad glob pattern: {e}")))?;

        let fs_adapter = TokioWalkerFs;
        let mut walker = bunshin_glob::FileWalker::new(&fs_adapter, root);
        if let Some(g) = compiled {
            walker = walker.with_pattern(g);
        }
        let files = walker
            .collect()
            .await
            .map_err(|e| BackendError::other(format!("walk failed: {e}")))?;

        // Match shape is kept identical to the ripgrep path: no context
        // lines, sorted by path then line, same match cap.
        let mut matches = Vec::new();
        'files: for file in files {
            let Ok(meta) = fs::symlink_metadata(&file).await else {
                continue;
            };
            if meta.len() > self.max_file_size {
                continue;
            }
            let Ok(bytes) = fs::read(&file).await else {
                continue;
            };
            let content = String::from_utf8_lossy(&bytes);
            let vpath = self.virtual_path(&file);
            for (i, line) in content.lines().enumerate() {
                if re.is_match(line) {
                    matches.push(GrepMatch::new(vpath.as_str(), (i + 1) as u64, line));
                    if matches.len() >= GREP_MAX_MATCHES {
                        break 'files;
                    }
                }
            }
        }
        matches.sort_by(|a, b| a.path.cmp(&b.path).then(a.line.cmp(&b.line)));
        Ok(matches)
    }
}

fn nofollow_error(e: std::io::Error, path: &str) -> BackendError {
    #[cfg(unix)]
    if e.raw_os_error() == Some(rustix::io::Errno::LOOP.raw_os_error()) {
        return BackendError::permission_denied(format!("refusing to follow symlink: {path}"));
    }
    io_to_backend(e, path)
}

#[async_trait]
impl FileBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        let full = self.resolve(path)?;
        let mut dir = fs::read_dir(&full).await.map_err(|e| io_to_backend(e, path))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| io_to_backend(e, path))?
        {
            entries.push(self.info_for(&entry.path()).await?);
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read(&self, path: &str) -> BackendResult<FileContent> {
        let full = self.resolve(path)?;
        let meta = fs::symlink_metadata(&full)
            .await
            .map_err(|e| io_to_backend(e, path))?;
        if meta.is_dir() {
            return Err(BackendError::is_a_directory(path));
        }

        let mut file = self.open_nofollow_read(&full, path).await?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .await
            .map_err(|e| io_to_backend(e, path))?;
        if bytes.len() as u64 > self.max_file_size {
            let head = String::from_utf8_lossy(&bytes[..self.max_file_size as usize]).into_owned();
            return Ok(FileContent::truncated(head, bytes.len() as u64));
        }
        Ok(FileContent::full(String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn write(&self, path: &str, content: &str, overwrite: bool) -> BackendResult<WriteResult> {
        if content.len() as u64 > self.max_file_size {
            return Err(BackendError::size_limit(format!(
                "write of {} bytes exceeds limit of {}",
                content.len(),
                self.max_file_size
            )));
        }

        let full = self.resolve(path)?;
        let existed = full.exists();
        if existed && !overwrite {
            return Err(BackendError::already_exists(path));
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_to_backend(e, path))?;
        }
        let mut file = self.open_nofollow_write(&full, path).await?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| io_to_backend(e, path))?;
        file.flush().await.map_err(|e| io_to_backend(e, path))?;
        Ok(WriteResult {
            path: path.to_string(),
            bytes: content.len() as u64,
            created: !existed,
        })
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        mode: ReplaceMode,
    ) -> BackendResult<EditResult> {
        let content = self.read(path).await?;
        if content.truncated {
            return Err(BackendError::size_limit(format!(
                "file too large to edit: {path}"
            )));
        }
        let (updated, replacements) = text::replace_string(&content.text, old, new, mode)?;
        let written = self.write(path, &updated, true).await?;
        Ok(EditResult {
            path: path.to_string(),
            replacements,
            new_size: written.bytes,
        })
    }

    async fn glob(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>> {
        let full = self.resolve(path)?;
        let compiled = bunshin_glob::GlobPath::new(pattern)
            .map_err(|e| BackendError::invalid_path(format!("bad glob pattern: {e}")))?;

        let fs_adapter = TokioWalkerFs;
        let files = bunshin_glob::FileWalker::new(&fs_adapter, &full)
            .with_pattern(compiled)
            .collect()
            .await
            .map_err(|e| BackendError::other(format!("walk failed: {e}")))?;

        let mut infos = Vec::with_capacity(files.len());
        for file in files {
            infos.push(self.info_for(&file).await?);
        }
        // The walker yields a directory's files before descending, which
        // is not lexicographic across levels.
        infos.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(infos)
    }

    async fn grep(
        &self,
        pattern: &str,
        path: &str,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>> {
        let full = self.resolve(path)?;
        if let Some(matches) = self.grep_ripgrep(pattern, &full, glob).await? {
            return Ok(matches);
        }
        self.grep_scan(pattern, &full, glob).await
    }
}

/// `WalkerFs` over the real filesystem via tokio.
struct TokioWalkerFs;

struct TokioDirEntry {
    name: String,
    is_dir: bool,
    is_file: bool,
    is_symlink: bool,
}

impl bunshin_glob::WalkerDirEntry for TokioDirEntry {
    fn name(&self) -> &str {
        &self.name
    }
    fn is_dir(&self) -> bool {
        self.is_dir
    }
    fn is_file(&self) -> bool {
        self.is_file
    }
    fn is_symlink(&self) -> bool {
        self.is_symlink
    }
}

#[async_trait]
impl bunshin_glob::WalkerFs for TokioWalkerFs {
    type DirEntry = TokioDirEntry;

    async fn list_dir(&self, path: &Path) -> Result<Vec<TokioDirEntry>, bunshin_glob::WalkerError> {
        let mut dir = fs::read_dir(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                bunshin_glob::WalkerError::NotFound(path.display().to_string())
            }
            std::io::ErrorKind::PermissionDenied => {
                bunshin_glob::WalkerError::PermissionDenied(path.display().to_string())
            }
            _ => bunshin_glob::WalkerError::Io(e.to_string()),
        })?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| bunshin_glob::WalkerError::Io(e.to_string()))?
        {
            // symlink_metadata so link-to-dir entries are reported as
            // symlinks and never recursed.
            let meta = match entry.path().symlink_metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            let resolved_dir = entry.path().is_dir();
            entries.push(TokioDirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: resolved_dir,
                is_file: meta.is_file(),
                is_symlink: meta.file_type().is_symlink(),
            });
        }
        Ok(entries)
    }

    async fn is_dir(&self, path: &Path) -> bool {
        fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
    }

    async fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).await.is_ok()
    }
}
