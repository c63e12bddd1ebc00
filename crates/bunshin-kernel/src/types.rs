//! Core backend result types.
//!
//! These types are path-based and serde-friendly so they can cross any
//! serialization boundary a caller puts in front of the backends.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Metadata for one file or directory, as produced by listing and search.
///
/// Returned by value; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Virtual path, absolute within the answering namespace.
    pub path: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Whether this entry is a directory.
    pub is_dir: bool,
    /// Last modification time, when the medium records one.
    pub modified_at: Option<SystemTime>,
}

impl FileInfo {
    /// Metadata for a regular file.
    pub fn file(path: impl Into<String>, size: u64, modified_at: Option<SystemTime>) -> Self {
        Self {
            path: path.into(),
            size,
            is_dir: false,
            modified_at,
        }
    }

    /// Metadata for a directory.
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            is_dir: true,
            modified_at: None,
        }
    }
}

/// A point-in-time snapshot of file content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileContent {
    /// The text payload. May be a truncated head of the real content.
    pub text: String,
    /// Size in bytes of the authoritative copy.
    pub size: u64,
    /// True when `text` is a head-truncated view of a larger file.
    pub truncated: bool,
}

impl FileContent {
    /// Full, untruncated content.
    pub fn full(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            size: text.len() as u64,
            truncated: false,
            text,
        }
    }

    /// A head-truncated view of a file with the given real size.
    pub fn truncated(text: impl Into<String>, size: u64) -> Self {
        Self {
            text: text.into(),
            size,
            truncated: true,
        }
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    /// Path that was written.
    pub path: String,
    /// Bytes written.
    pub bytes: u64,
    /// True if the write created the file, false if it replaced one.
    pub created: bool,
}

/// Outcome of a successful edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditResult {
    /// Path that was edited.
    pub path: String,
    /// Number of replacements applied.
    pub replacements: usize,
    /// Length in bytes of the file after the edit.
    pub new_size: u64,
}

/// One content-search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrepMatch {
    /// Path of the matching file.
    pub path: String,
    /// 1-based line number of the match.
    pub line: u64,
    /// The matching line text, without trailing newline.
    pub text: String,
    /// Surrounding lines, present only when context was requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_before: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_after: Vec<String>,
}

impl GrepMatch {
    /// A match with no context lines.
    pub fn new(path: impl Into<String>, line: u64, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line,
            text: text.into(),
            context_before: Vec::new(),
            context_after: Vec::new(),
        }
    }
}

/// Output of a remote or sandboxed command execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code (0 = success).
    pub exit_code: i32,
}

impl ExecOutput {
    /// True when the command exited zero.
    pub fn ok(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_content_constructors() {
        let full = FileContent::full("hello");
        assert_eq!(full.size, 5);
        assert!(!full.truncated);

        let cut = FileContent::truncated("he", 5);
        assert_eq!(cut.size, 5);
        assert!(cut.truncated);
        assert_eq!(cut.text, "he");
    }

    #[test]
    fn exec_output_ok_tracks_exit_code() {
        let out = ExecOutput {
            stdout: "x".into(),
            stderr: String::new(),
            exit_code: 0,
        };
        assert!(out.ok());
        assert!(!ExecOutput { exit_code: 1, ..out }.ok());
    }

    #[test]
    fn grep_match_serialization_omits_empty_context() {
        let m = GrepMatch::new("/a.txt", 3, "hit");
        let json = serde_json::to_string(&m).unwrap();
        assert!(!json.contains("context_before"));

        let with_ctx = GrepMatch {
            context_before: vec!["before".into()],
            ..m
        };
        let json = serde_json::to_string(&with_ctx).unwrap();
        assert!(json.contains("context_before"));
    }
}
