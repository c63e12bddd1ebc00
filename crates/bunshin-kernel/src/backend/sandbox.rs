//! Remote sandbox backend.
//!
//! File operations are translated into POSIX shell commands and sent over
//! an [`Executor`] transport. There is no filesystem API on the far side,
//! only a shell, so results are recovered by parsing command output and
//! classifying stderr.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use super::{validate_virtual_path, FileBackend};
use crate::error::{BackendError, BackendResult};
use crate::text::{self, ReplaceMode};
use crate::types::{EditResult, ExecOutput, FileContent, FileInfo, GrepMatch, WriteResult};

/// Exit code the write script uses to signal an existing file.
const EXIT_ALREADY_EXISTS: i32 = 17;

const GREP_MAX_MATCHES: usize = 200;

/// Something that can run a shell command and report its output.
///
/// Implementations wrap whatever transport reaches the sandbox: a local
/// process, an SSH session, a container exec API.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, command: &str) -> BackendResult<ExecOutput>;
}

/// Executor that runs commands through the local `sh`.
#[derive(Debug, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn execute(&self, command: &str) -> BackendResult<ExecOutput> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| BackendError::unavailable(format!("shell spawn failed: {e}")))?;
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

pub struct SandboxBackend<E: Executor> {
    name: String,
    executor: E,
    root: Option<PathBuf>,
}

impl<E: Executor> SandboxBackend<E> {
    pub fn new(name: impl Into<String>, executor: E) -> Self {
        Self {
            name: name.into(),
            executor,
            root: None,
        }
    }

    /// Map virtual paths under a directory inside the sandbox instead of
    /// using them as absolute paths directly.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    fn real_path(&self, path: &str) -> BackendResult<String> {
        validate_virtual_path(path)?;
        match &self.root {
            Some(root) => Ok(format!(
                "{}{}",
                root.display(),
                if path == "/" { "" } else { path }
            )),
            None => Ok(path.to_string()),
        }
    }

    fn virtual_path(&self, real: &str) -> String {
        match &self.root {
            Some(root) => {
                let root = root.display().to_string();
                match real.strip_prefix(&root) {
                    Some("") => "/".to_string(),
                    Some(rest) => rest.to_string(),
                    None => real.to_string(),
                }
            }
            None => real.to_string(),
        }
    }

    async fn run(&self, command: &str) -> BackendResult<ExecOutput> {
        self.executor.execute(command).await
    }

    /// Map a failed command to a domain error from its stderr.
    fn classify_failure(path: &str, output: &ExecOutput) -> BackendError {
        let stderr = output.stderr.to_lowercase();
        if stderr.contains("no such file") {
            BackendError::not_found(path)
        } else if stderr.contains("permission denied") {
            BackendError::permission_denied(path)
        } else {
            BackendError::unavailable(format!(
                "sandbox command failed with exit {}: {}",
                output.exit_code,
                output.stderr.trim()
            ))
        }
    }
}

/// Quote a string for safe interpolation into a POSIX shell command.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[async_trait]
impl<E: Executor> FileBackend for SandboxBackend<E> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        let real = self.real_path(path)?;
        let cmd = format!(
            "find {} -mindepth 1 -maxdepth 1 -printf '%y %s %T@ %p\\n'",
            shell_quote(&real)
        );
        let output = self.run(&cmd).await?;
        if output.exit_code != 0 {
            return Err(Self::classify_failure(path, &output));
        }

        let mut entries = Vec::new();
        for line in output.stdout.lines() {
            let mut parts = line.splitn(4, ' ');
            let (Some(kind), Some(size), Some(mtime), Some(real_path)) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            let vpath = self.virtual_path(real_path);
            if kind == "d" {
                entries.push(FileInfo::dir(vpath));
            } else {
                let size = size.parse().unwrap_or(0);
                let secs = mtime.split('.').next().and_then(|s| s.parse().ok());
                let modified = secs.map(|s: u64| {
                    std::time::UNIX_EPOCH + std::time::Duration::from_secs(s)
                });
                entries.push(FileInfo::file(vpath, size, modified));
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read(&self, path: &str) -> BackendResult<FileContent> {
        let real = self.real_path(path)?;
        let output = self.run(&format!("cat {}", shell_quote(&real))).await?;
        if output.exit_code != 0 {
            return Err(Self::classify_failure(path, &output));
        }
        Ok(FileContent::full(output.stdout))
    }

    async fn write(&self, path: &str, content: &str, overwrite: bool) -> BackendResult<WriteResult> {
        let real = self.real_path(path)?;
        let quoted = shell_quote(&real);
        let guard = if overwrite {
            String::new()
        } else {
            format!("[ -e {quoted} ] && exit {EXIT_ALREADY_EXISTS}; ")
        };
        let cmd = format!(
            "existed=0; [ -e {quoted} ] && existed=1; {guard}mkdir -p \"$(dirname {quoted})\" && \
             printf '%s' {} > {quoted} && echo \"$existed\"",
            shell_quote(content)
        );
        let output = self.run(&cmd).await?;
        if output.exit_code == EXIT_ALREADY_EXISTS {
            return Err(BackendError::already_exists(path));
        }
        if output.exit_code != 0 {
            return Err(Self::classify_failure(path, &output));
        }
        Ok(WriteResult {
            path: path.to_string(),
            bytes: content.len() as u64,
            created: output.stdout.trim() == "0",
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
        let (updated, replacements) = text::replace_string(&content.text, old, new, mode)?;
        let written = self.write(path, &updated, true).await?;
        Ok(EditResult {
            path: path.to_string(),
            replacements,
            new_size: written.bytes,
        })
    }

    async fn glob(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>> {
        let compiled = bunshin_glob::GlobPath::new(pattern)
            .map_err(|e| BackendError::invalid_path(format!("bad glob pattern: {e}")))?;
        let real = self.real_path(path)?;
        let cmd = format!(
            "find {} -type f -printf '%s %T@ %p\\n' | sort -k3",
            shell_quote(&real)
        );
        let output = self.run(&cmd).await?;
        if output.exit_code != 0 {
            return Err(Self::classify_failure(path, &output));
        }

        let base = if real.ends_with('/') {
            real.clone()
        } else {
            format!("{real}/")
        };
        let mut hits = Vec::new();
        for line in output.stdout.lines() {
            let mut parts = line.splitn(3, ' ');
            let (Some(size), Some(mtime), Some(real_path)) =
                (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            let Some(rel) = real_path.strip_prefix(&base) else {
                continue;
            };
            if !compiled.matches_str(rel) {
                continue;
            }
            let size = size.parse().unwrap_or(0);
            let secs = mtime.split('.').next().and_then(|s| s.parse().ok());
            let modified =
                secs.map(|s: u64| std::time::UNIX_EPOCH + std::time::Duration::from_secs(s));
            hits.push(FileInfo::file(self.virtual_path(real_path), size, modified));
        }
        hits.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(hits)
    }

    async fn grep(
        &self,
        pattern: &str,
        path: &str,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>> {
        let real = self.real_path(path)?;
        let include = match glob {
            Some(g) => format!(" --include={}", shell_quote(g)),
            None => String::new(),
        };
        // An inline (?i) prefix is the cross-backend spelling for case
        // folding; POSIX grep wants a flag instead.
        let (pattern, fold) = match pattern.strip_prefix("(?i)") {
            Some(rest) => (rest, "i"),
            None => (pattern, ""),
        };
        let cmd = format!(
            "grep -rn{fold}{include} -e {} {}",
            shell_quote(pattern),
            shell_quote(&real)
        );
        let output = self.run(&cmd).await?;
        // grep exits 1 when nothing matched.
        if output.exit_code > 1 {
            return Err(Self::classify_failure(path, &output));
        }

        let mut matches = Vec::new();
        for line in output.stdout.lines() {
            let mut parts = line.splitn(3, ':');
            let (Some(real_path), Some(line_no), Some(text)) =
                (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            let Ok(line_no) = line_no.parse() else {
                continue;
            };
            matches.push(GrepMatch::new(self.virtual_path(real_path), line_no, text));
            if matches.len() >= GREP_MAX_MATCHES {
                break;
            }
        }
        Ok(matches)
    }

    fn supports_execute(&self) -> bool {
        true
    }

    async fn execute(&self, command: &str) -> BackendResult<ExecOutput> {
        let command = match &self.root {
            Some(root) => format!("cd {} && {command}", shell_quote(&root.display().to_string())),
            None => command.to_string(),
        };
        self.run(&command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (SandboxBackend<ShellExecutor>, TempDir) {
        let dir = TempDir::new().unwrap();
        let backend = SandboxBackend::new("sbx", ShellExecutor::new()).with_root(dir.path());
        (backend, dir)
    }

    #[test]
    fn quoting_survives_embedded_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn write_and_read_round_trip() {
        let (backend, _dir) = setup();
        backend
            .write("/deep/nested/file.txt", "sandbox content", true)
            .await
            .unwrap();
        let content = backend.read("/deep/nested/file.txt").await.unwrap();
        assert_eq!(content.text, "sandbox content");
    }

    #[tokio::test]
    async fn write_preserves_awkward_characters() {
        let (backend, _dir) = setup();
        let tricky = "line with 'quotes' and $VARS and `ticks`";
        backend.write("/tricky.txt", tricky, true).await.unwrap();
        assert_eq!(backend.read("/tricky.txt").await.unwrap().text, tricky);
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let (backend, _dir) = setup();
        let err = backend.read("/absent.txt").await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn write_no_overwrite_rejects_existing() {
        let (backend, _dir) = setup();
        backend.write("/f", "one", true).await.unwrap();
        let err = backend.write("/f", "two", false).await.unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists(_)));
        assert_eq!(backend.read("/f").await.unwrap().text, "one");
    }

    #[tokio::test]
    async fn list_reports_types_and_sorts() {
        let (backend, _dir) = setup();
        backend.write("/b.txt", "x", true).await.unwrap();
        backend.write("/sub/a.txt", "y", true).await.unwrap();

        let entries = backend.list("/").await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/b.txt", "/sub"]);
        assert!(!entries[0].is_dir);
        assert!(entries[1].is_dir);
    }

    #[tokio::test]
    async fn glob_filters_with_pattern() {
        let (backend, _dir) = setup();
        backend.write("/docs/a.md", "", true).await.unwrap();
        backend.write("/docs/deep/b.md", "", true).await.unwrap();
        backend.write("/docs/c.txt", "", true).await.unwrap();

        let hits = backend.glob("**/*.md", "/").await.unwrap();
        let paths: Vec<&str> = hits.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/docs/a.md", "/docs/deep/b.md"]);
    }

    #[tokio::test]
    async fn grep_parses_matches_and_handles_none() {
        let (backend, _dir) = setup();
        backend
            .write("/src/lib.rs", "fn alpha() {}\nstruct Needle;", true)
            .await
            .unwrap();

        let hits = backend.grep("Needle", "/", None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/src/lib.rs");
        assert_eq!(hits[0].line, 2);

        let none = backend.grep("zzz_not_here", "/", None).await.unwrap();
        assert!(none.is_empty());

        let folded = backend.grep("(?i)NEEDLE", "/", None).await.unwrap();
        assert_eq!(folded.len(), 1);
    }

    #[tokio::test]
    async fn edit_round_trip() {
        let (backend, _dir) = setup();
        backend.write("/f", "foo bar", true).await.unwrap();
        backend
            .edit("/f", "bar", "baz", ReplaceMode::Unique)
            .await
            .unwrap();
        assert_eq!(backend.read("/f").await.unwrap().text, "foo baz");
    }

    #[tokio::test]
    async fn execute_runs_in_root() {
        let (backend, _dir) = setup();
        backend.write("/hello.txt", "hi", true).await.unwrap();
        assert!(backend.supports_execute());

        let out = backend.execute("ls").await.unwrap();
        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.contains("hello.txt"));
    }
}
