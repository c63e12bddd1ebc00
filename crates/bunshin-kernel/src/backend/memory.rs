//! In-memory backend with copy-on-fork isolation.
//!
//! Directories are implicit: they exist exactly when a file path passes
//! through them. Forked copies record every write in a journal so a parent
//! can merge the changes back after a task finishes.

use std::collections::{BTreeSet, HashMap};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{validate_virtual_path, FileBackend};
use crate::error::{BackendError, BackendResult};
use crate::text::{self, ReplaceMode};
use crate::types::{EditResult, FileContent, FileInfo, GrepMatch, WriteResult};

const GREP_MAX_MATCHES: usize = 200;
const GREP_CONTEXT_LINES: usize = 2;

#[derive(Debug, Clone)]
pub(crate) struct FileRecord {
    pub content: String,
    pub created_at: SystemTime,
    pub modified_at: SystemTime,
}

/// A journaled write carried from a fork back to its parent.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub path: String,
    pub content: String,
}

#[derive(Default)]
struct State {
    files: HashMap<String, FileRecord>,
    journal: BTreeSet<String>,
}

pub struct MemoryBackend {
    name: String,
    state: RwLock<State>,
}

impl MemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(State::default()),
        }
    }

    /// Deep-copy the current contents into a new backend with a clean
    /// journal. Writes to the fork never touch `self`.
    pub fn fork(&self, name: impl Into<String>) -> MemoryBackend {
        let state = self.state.read();
        MemoryBackend {
            name: name.into(),
            state: RwLock::new(State {
                files: state.files.clone(),
                journal: BTreeSet::new(),
            }),
        }
    }

    /// Snapshot the journaled writes, pairing each touched path with its
    /// current content.
    pub fn take_journal(&self) -> Vec<JournalEntry> {
        let mut state = self.state.write();
        let paths = std::mem::take(&mut state.journal);
        paths
            .into_iter()
            .filter_map(|path| {
                let content = state.files.get(&path)?.content.clone();
                Some(JournalEntry { path, content })
            })
            .collect()
    }

    /// Apply journal entries from a fork, overwriting on collision.
    pub fn apply_journal(&self, entries: &[JournalEntry]) {
        let now = SystemTime::now();
        let mut state = self.state.write();
        for entry in entries {
            let record = state
                .files
                .entry(entry.path.clone())
                .or_insert_with(|| FileRecord {
                    content: String::new(),
                    created_at: now,
                    modified_at: now,
                });
            record.content = entry.content.clone();
            record.modified_at = now;
        }
    }

    fn put(&self, path: &str, content: &str) -> (u64, bool) {
        let now = SystemTime::now();
        let mut state = self.state.write();
        let created = !state.files.contains_key(path);
        let record = state
            .files
            .entry(path.to_string())
            .or_insert_with(|| FileRecord {
                content: String::new(),
                created_at: now,
                modified_at: now,
            });
        record.content = content.to_string();
        record.modified_at = now;
        state.journal.insert(path.to_string());
        (content.len() as u64, created)
    }

    fn dir_prefix(path: &str) -> String {
        if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        }
    }
}

#[async_trait]
impl FileBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        validate_virtual_path(path)?;
        let prefix = Self::dir_prefix(path);
        let state = self.state.read();

        let mut files = Vec::new();
        let mut dirs = BTreeSet::new();
        let mut seen_any = false;
        for (key, record) in &state.files {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            seen_any = true;
            match rest.split_once('/') {
                None => files.push(FileInfo::file(
                    key.clone(),
                    record.content.len() as u64,
                    Some(record.modified_at),
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
        let state = self.state.read();
        let record = state
            .files
            .get(path)
            .ok_or_else(|| BackendError::not_found(path))?;
        Ok(FileContent::full(record.content.clone()))
    }

    async fn write(&self, path: &str, content: &str, overwrite: bool) -> BackendResult<WriteResult> {
        validate_virtual_path(path)?;
        if !overwrite && self.state.read().files.contains_key(path) {
            return Err(BackendError::already_exists(path));
        }
        let (bytes, created) = self.put(path, content);
        Ok(WriteResult {
            path: path.to_string(),
            bytes,
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
        let content = self.read(path).await?.text;
        let (updated, replacements) = text::replace_string(&content, old, new, mode)?;
        let (bytes, _) = self.put(path, &updated);
        Ok(EditResult {
            path: path.to_string(),
            replacements,
            new_size: bytes,
        })
    }

    async fn glob(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>> {
        validate_virtual_path(path)?;
        let compiled = bunshin_glob::GlobPath::new(pattern)
            .map_err(|e| BackendError::invalid_path(format!("bad glob pattern: {e}")))?;
        let prefix = Self::dir_prefix(path);
        let state = self.state.read();

        let mut out: Vec<FileInfo> = state
            .files
            .iter()
            .filter_map(|(key, record)| {
                let rest = key.strip_prefix(&prefix)?;
                compiled.matches_str(rest).then(|| {
                    FileInfo::file(
                        key.clone(),
                        record.content.len() as u64,
                        Some(record.modified_at),
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
        let state = self.state.read();
        let mut keys: Vec<&String> = state
            .files
            .keys()
            .filter(|k| {
                let Some(rest) = k.strip_prefix(&prefix) else {
                    return false;
                };
                path_filter.as_ref().is_none_or(|g| g.matches_str(rest))
            })
            .collect();
        keys.sort();

        let mut matches = Vec::new();
        'files: for key in keys {
            let content = &state.files[key.as_str()].content;
            let lines: Vec<&str> = content.lines().collect();
            for (i, line) in lines.iter().enumerate() {
                if re.is_match(line) {
                    matches.push(grep_match_with_context(key, &lines, i));
                    if matches.len() >= GREP_MAX_MATCHES {
                        break 'files;
                    }
                }
            }
        }
        Ok(matches)
    }
}

/// Compile a grep pattern, falling back to a literal search when the
/// pattern is not valid regex syntax.
pub(crate) fn compile_grep_pattern(pattern: &str) -> BackendResult<regex::Regex> {
    match regex::Regex::new(pattern) {
        Ok(re) => Ok(re),
        Err(_) => regex::Regex::new(&regex::escape(pattern))
            .map_err(|e| BackendError::other(format!("bad search pattern: {e}"))),
    }
}

pub(crate) fn grep_match_with_context(path: &str, lines: &[&str], idx: usize) -> GrepMatch {
    let start = idx.saturating_sub(GREP_CONTEXT_LINES);
    let end = (idx + GREP_CONTEXT_LINES + 1).min(lines.len());
    let mut m = GrepMatch::new(path, (idx + 1) as u64, lines[idx]);
    m.context_before = lines[start..idx].iter().map(|s| s.to_string()).collect();
    m.context_after = lines[idx + 1..end].iter().map(|s| s.to_string()).collect();
    m
}
