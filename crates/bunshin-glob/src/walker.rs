//! Async recursive directory walker, generic over `WalkerFs`.

use std::path::{Path, PathBuf};

use crate::path::GlobPath;
use crate::{WalkerDirEntry, WalkerError, WalkerFs};

/// Types of entries to include in walk results.
#[derive(Debug, Clone, Copy)]
pub struct EntryTypes {
    /// Include regular files.
    pub files: bool,
    /// Include directories.
    pub dirs: bool,
}

impl EntryTypes {
    /// Include only files.
    pub fn files_only() -> Self {
        Self {
            files: true,
            dirs: false,
        }
    }

    /// Include both files and directories.
    pub fn all() -> Self {
        Self {
            files: true,
            dirs: true,
        }
    }
}

impl Default for EntryTypes {
    fn default() -> Self {
        Self::files_only()
    }
}

/// Options for file walking.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Maximum depth to recurse (None = unlimited).
    pub max_depth: Option<usize>,
    /// Types of entries to include.
    pub entry_types: EntryTypes,
    /// Include hidden files (starting with `.`).
    pub include_hidden: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: None,
            entry_types: EntryTypes::files_only(),
            include_hidden: false,
        }
    }
}

/// Async file walker over any `WalkerFs` implementation.
///
/// Traversal is depth-first with entries visited in name order, so the
/// result list is deterministic and lexicographic for a given tree.
/// Symlinked directories are never recursed into; they are yielded as
/// plain entries.
///
/// # Examples
/// ```ignore
/// let files = FileWalker::new(&fs, "/project")
///     .with_pattern(GlobPath::new("**/*.rs")?)
///     .collect()
///     .await?;
/// ```
pub struct FileWalker<'a, F: WalkerFs> {
    fs: &'a F,
    root: PathBuf,
    pattern: Option<GlobPath>,
    options: WalkOptions,
}

impl<'a, F: WalkerFs> FileWalker<'a, F> {
    /// Create a new file walker starting at the given root.
    pub fn new(fs: &'a F, root: impl AsRef<Path>) -> Self {
        Self {
            fs,
            root: root.as_ref().to_path_buf(),
            pattern: None,
            options: WalkOptions::default(),
        }
    }

    /// Set a glob pattern to filter results.
    pub fn with_pattern(mut self, pattern: GlobPath) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Set walk options.
    pub fn with_options(mut self, options: WalkOptions) -> Self {
        self.options = options;
        self
    }

    /// Collect all matching paths.
    ///
    /// Unreadable directories are skipped rather than aborting the walk.
    pub async fn collect(self) -> Result<Vec<PathBuf>, WalkerError> {
        let mut results = Vec::new();
        let mut stack = vec![(self.root.clone(), 0usize)];

        while let Some((dir, depth)) = stack.pop() {
            if let Some(max) = self.options.max_depth
                && depth > max
            {
                continue;
            }

            let Ok(entries) = self.fs.list_dir(&dir).await else {
                continue;
            };

            let mut entries: Vec<_> = entries
                .into_iter()
                .map(|e| (e.name().to_string(), e.is_dir(), e.is_symlink()))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            // Subdirectories are pushed in reverse so the alphabetically
            // first one comes off the LIFO stack first.
            let mut dirs_to_push = Vec::new();

            for (name, is_dir, is_symlink) in entries {
                if !self.options.include_hidden && name.starts_with('.') {
                    continue;
                }
                let full_path = dir.join(&name);

                if is_dir && !is_symlink {
                    if self.should_recurse(depth) {
                        dirs_to_push.push((full_path.clone(), depth + 1));
                    }
                    if self.options.entry_types.dirs && self.matches(&full_path) {
                        results.push(full_path);
                    }
                } else if self.options.entry_types.files && self.matches(&full_path) {
                    results.push(full_path);
                }
            }

            dirs_to_push.reverse();
            stack.extend(dirs_to_push);
        }

        Ok(results)
    }

    fn should_recurse(&self, depth: usize) -> bool {
        match &self.pattern {
            None => true,
            Some(pat) => match pat.fixed_depth() {
                // Globstar-free patterns bound how deep a match can live.
                Some(fixed) => depth + 1 < fixed,
                None => true,
            },
        }
    }

    fn relative(&self, full_path: &Path) -> PathBuf {
        full_path
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| full_path.to_path_buf())
    }

    fn matches(&self, path: &Path) -> bool {
        match &self.pattern {
            Some(pattern) => pattern.matches(&self.relative(path)),
            None => true,
        }
    }
}
