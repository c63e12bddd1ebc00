//! SQLite-backed persistent backend.
//!
//! Files live in a single `files` table keyed by `(namespace, path)`.
//! Backends sharing one connection but holding different namespaces see
//! fully disjoint trees, which is how per-session persistence works.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::memory::{compile_grep_pattern, grep_match_with_context, MemoryBackend};
use super::{validate_virtual_path, FileBackend};
use crate::error::{BackendError, BackendResult};
use crate::text::{self, ReplaceMode};
use crate::types::{EditResult, FileContent, FileInfo, GrepMatch, WriteResult};

const GREP_MAX_MATCHES: usize = 200;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS files (
    namespace   TEXT NOT NULL,
    path        TEXT NOT NULL,
    content     TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    modified_at INTEGER NOT NULL,
    PRIMARY KEY (namespace, path)
);
";

pub struct StoreBackend {
    name: String,
    namespace: String,
    conn: Arc<Mutex<Connection>>,
}

impl StoreBackend {
    /// Open (or create) a store at the given database path.
    pub fn open(
        name: impl Into<String>,
        db_path: impl AsRef<std::path::Path>,
        namespace: impl Into<String>,
    ) -> BackendResult<Self> {
        let conn = Connection::open(db_path).map_err(db_err)?;
        Self::with_connection(name, conn, namespace)
    }

    /// In-memory store, used by tests and throwaway sessions.
    pub fn in_memory(name: impl Into<String>, namespace: impl Into<String>) -> BackendResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(name, conn, namespace)
    }

    fn with_connection(
        name: impl Into<String>,
        conn: Connection,
        namespace: impl Into<String>,
    ) -> BackendResult<Self> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            name: name.into(),
            namespace: namespace.into(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// A sibling backend over the same database but a different namespace.
    pub fn with_namespace(&self, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            conn: Arc::clone(&self.conn),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Copy the namespace into an in-memory backend.
    ///
    /// Delegation uses this as the forkable view of persistent state;
    /// later rows written to the store are not reflected in the copy.
    pub async fn snapshot(&self, name: impl Into<String>) -> BackendResult<MemoryBackend> {
        let mem = MemoryBackend::new(name);
        for (path, content, _) in self.rows()? {
            mem.write(&path, &content, true).await?;
        }
        Ok(mem)
    }

    fn rows(&self) -> BackendResult<Vec<(String, String, u64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT path, content, modified_at FROM files WHERE namespace = ?1")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![self.namespace], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? as u64))
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    fn get(&self, path: &str) -> BackendResult<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT content FROM files WHERE namespace = ?1 AND path = ?2",
            params![self.namespace, path],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)
    }

    fn put(&self, path: &str, content: &str) -> BackendResult<bool> {
        let now = unix_now();
        let conn = self.conn.lock();
        let existed: bool = conn
            .query_row(
                "SELECT 1 FROM files WHERE namespace = ?1 AND path = ?2",
                params![self.namespace, path],
                |_| Ok(()),
            )
            .optional()
            .map_err(db_err)?
            .is_some();
        conn.execute(
            "INSERT INTO files (namespace, path, content, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (namespace, path) DO UPDATE
             SET content = excluded.content, modified_at = excluded.modified_at",
            params![self.namespace, path, content, now],
        )
        .map_err(db_err)?;
        Ok(!existed)
    }

    fn dir_prefix(path: &str) -> String {
        if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        }
    }
}

fn db_err(e: rusqlite::Error) -> BackendError {
    BackendError::unavailable(format!("store error: {e}"))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn modified_time(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}

#[async_trait]
impl FileBackend for StoreBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        validate_virtual_path(path)?;
        let prefix = Self::dir_prefix(path);

        let mut files = Vec::new();
        let mut dirs = std::collections::BTreeSet::new();
        let mut seen_any = false;
        for (key, content, modified) in self.rows()? {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            seen_any = true;
            match rest.split_once('/') {
                None => files.push(FileInfo::file(
                    key.clone(),
                    content.len() as u64,
                    Some(modified_time(modified)),
                )),
                Some((dir, _)) => {
                    dirs.insert(format!("{prefix}{dir}"));
                }
            }
        }

        if !seen_any && prefix != "/" {
            return Err(BackendError::not_found(path));
        }

        let mut entries: Vec<FileInfo> = dirs.into_iter().map(FileInfo::dir).collect();
        entries.extend(files);
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read(&self, path: &str) -> BackendResult<FileContent> {
        validate_virtual_path(path)?;
        let content = self
            .get(path)?
            .ok_or_else(|| BackendError::not_found(path))?;
        Ok(FileContent::full(content))
    }

    async fn write(&self, path: &str, content: &str, overwrite: bool) -> BackendResult<WriteResult> {
        validate_virtual_path(path)?;
        if !overwrite && self.get(path)?.is_some() {
            return Err(BackendError::already_exists(path));
        }
        let created = self.put(path, content)?;
        Ok(WriteResult {
            path: path.to_string(),
            bytes: content.len() as u64,
            created,
        })
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        mode: ReplaceMode,
    ) -> BackendResult<EditResult> {
        validate_virtual_path(path)?;
        let content = self
            .get(path)?
            .ok_or_else(|| BackendError::not_found(path))?;
        let (updated, replacements) = text::replace_string(&content, old, new, mode)?;
        let new_size = updated.len() as u64;
        self.put(path, &updated)?;
        Ok(EditResult {
            path: path.to_string(),
            replacements,
            new_size,
        })
    }

    async fn glob(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>> {
        validate_virtual_path(path)?;
        let compiled = bunshin_glob::GlobPath::new(pattern)
            .map_err(|e| BackendError::invalid_path(format!("bad glob pattern: {e}")))?;
        let prefix = Self::dir_prefix(path);

        let mut out: Vec<FileInfo> = self
            .rows()?
            .into_iter()
            .filter_map(|(key, content, modified)| {
                let rest = key.strip_prefix(&prefix)?;
                compiled.matches_str(rest).then(|| {
                    FileInfo::file(
                        key.clone(),
                        content.len() as u64,
                        Some(modified_time(modified)),
                    )
                })
            })
            .collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    async fn grep(
        &self,
        pattern: &str,
        path: &str,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>> {
        validate_virtual_path(path)?;
        let re = compile_grep_pattern(pattern)?;
        let path_filter = glob
            .map(bunshin_glob::GlobPath::new)
            .transpose()
            .map_err(|e| BackendError::invalid_path(format!("bad glob pattern: {e}")))?;
        let prefix = Self::dir_prefix(path);

        let mut rows = self.rows()?;
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        let mut matches = Vec::new();
        'files: for (key, content, _) in rows {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            if let Some(g) = &path_filter
                && !g.matches_str(rest)
            {
                continue;
            }
            let lines: Vec<&str> = content.lines().collect();
            for (i, line) in lines.iter().enumerate() {
                if re.is_match(line) {
                    matches.push(grep_match_with_context(&key, &lines, i));
                    if matches.len() >= GREP_MAX_MATCHES {
                        break 'files;
                    }
                }
            }
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persists_across_backend_instances() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("store.db");

        {
            let be = StoreBackend::open("store", &db, "session-1").unwrap();
            be.write("/notes.md", "persisted", true).await.unwrap();
        }

        let be = StoreBackend::open("store", &db, "session-1").unwrap();
        assert_eq!(be.read("/notes.md").await.unwrap().text, "persisted");
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let a = StoreBackend::in_memory("store", "ns-a").unwrap();
        let b = a.with_namespace("store", "ns-b");

        a.write("/shared.txt", "from a", true).await.unwrap();
        b.write("/shared.txt", "from b", true).await.unwrap();
        a.write("/only-a.txt", "x", true).await.unwrap();

        assert_eq!(a.read("/shared.txt").await.unwrap().text, "from a");
        assert_eq!(b.read("/shared.txt").await.unwrap().text, "from b");
        assert!(matches!(
            b.read("/only-a.txt").await.unwrap_err(),
            BackendError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn list_and_glob() {
        let be = StoreBackend::in_memory("store", "ns").unwrap();
        be.write("/docs/a.md", "", true).await.unwrap();
        be.write("/docs/deep/b.md", "", true).await.unwrap();
        be.write("/top.txt", "", true).await.unwrap();

        let root = be.list("/").await.unwrap();
        let paths: Vec<&str> = root.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/docs", "/top.txt"]);

        let hits = be.glob("**/*.md", "/").await.unwrap();
        let paths: Vec<&str> = hits.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/docs/a.md", "/docs/deep/b.md"]);
    }

    #[tokio::test]
    async fn edit_and_grep() {
        let be = StoreBackend::in_memory("store", "ns").unwrap();
        be.write("/f.txt", "alpha\nbeta\ngamma", true).await.unwrap();

        be.edit("/f.txt", "beta", "delta", ReplaceMode::Unique)
            .await
            .unwrap();

        let hits = be.grep("delta", "/", None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line, 2);
    }

    #[tokio::test]
    async fn snapshot_copies_namespace_into_memory() {
        let be = StoreBackend::in_memory("store", "ns").unwrap();
        be.write("/keep.txt", "original", true).await.unwrap();

        let snap = be.snapshot("snap").await.unwrap();
        assert_eq!(snap.read("/keep.txt").await.unwrap().text, "original");

        // The copy is detached in both directions.
        snap.write("/keep.txt", "changed", true).await.unwrap();
        be.write("/later.txt", "x", true).await.unwrap();
        assert_eq!(be.read("/keep.txt").await.unwrap().text, "original");
        assert!(matches!(
            snap.read("/later.txt").await.unwrap_err(),
            BackendError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn write_no_overwrite_rejects_existing() {
        let be = StoreBackend::in_memory("store", "ns").unwrap();
        be.write("/f", "one", true).await.unwrap();
        let err = be.write("/f", "two", false).await.unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists(_)));
    }
}
