//! Path-aware glob patterns with `**` (globstar) support.
//!
//! A `GlobPath` is a slash-separated pattern where each segment is an
//! ordinary glob and `**` matches any number of intermediate directories.
//! Matching is always against slash-separated relative paths.

use std::path::Path;

use thiserror::Error;

use crate::glob::{contains_glob, expand_braces, glob_match};

/// Errors from parsing a path pattern.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("empty glob pattern")]
    Empty,
}

/// One segment of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// `**`: matches zero or more path segments.
    Globstar,
    /// A single-segment glob, matched with [`glob_match`].
    Glob(String),
}

/// A compiled path pattern.
///
/// Brace groups are expanded at compile time, so a `GlobPath` holds one
/// segment list per alternative. Leading slashes are ignored; matching is
/// relative.
///
/// # Examples
/// ```
/// use bunshin_glob::GlobPath;
///
/// let pat = GlobPath::new("**/*.md").unwrap();
/// assert!(pat.matches_str("docs/guide/intro.md"));
/// assert!(pat.matches_str("README.md"));
/// assert!(!pat.matches_str("src/main.rs"));
/// ```
#[derive(Debug, Clone)]
pub struct GlobPath {
    raw: String,
    alternatives: Vec<Vec<Segment>>,
}

impl GlobPath {
    /// Compile a pattern. Fails only on an empty pattern.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let trimmed = pattern.trim_start_matches('/').trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(PatternError::Empty);
        }

        let alternatives = expand_braces(trimmed)
            .into_iter()
            .map(|pat| {
                pat.split('/')
                    .filter(|s| !s.is_empty())
                    .map(|seg| {
                        if seg == "**" {
                            Segment::Globstar
                        } else {
                            Segment::Glob(seg.to_string())
                        }
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            raw: pattern.to_string(),
            alternatives,
        })
    }

    /// The original pattern text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True if any alternative contains a `**` segment.
    pub fn has_globstar(&self) -> bool {
        self.alternatives
            .iter()
            .any(|segs| segs.contains(&Segment::Globstar))
    }

    /// If every alternative is globstar-free and has the same segment
    /// count, the depth a walk needs to reach. `None` means unbounded.
    pub fn fixed_depth(&self) -> Option<usize> {
        if self.has_globstar() {
            return None;
        }
        let mut depths = self.alternatives.iter().map(Vec::len);
        let first = depths.next()?;
        depths.all(|d| d == first).then_some(first)
    }

    /// Leading literal segments shared by every alternative, joined with
    /// slashes. A walk can start below this prefix instead of the root.
    pub fn static_prefix(&self) -> String {
        let mut prefix: Vec<String> = Vec::new();
        for (i, segs) in self.alternatives.iter().enumerate() {
            let literal: Vec<String> = segs
                .iter()
                .map_while(|seg| match seg {
                    Segment::Glob(s) if !contains_glob(s) => Some(s.clone()),
                    _ => None,
                })
                .collect();
            if i == 0 {
                prefix = literal;
            } else {
                let common = prefix
                    .iter()
                    .zip(&literal)
                    .take_while(|(a, b)| a == b)
                    .count();
                prefix.truncate(common);
            }
            if prefix.is_empty() {
                break;
            }
        }
        prefix.join("/")
    }

    /// Match a relative path.
    pub fn matches(&self, path: &Path) -> bool {
        let parts: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        self.alternatives
            .iter()
            .any(|segs| match_segments(segs, &parts))
    }

    /// Match a slash-separated relative path string.
    pub fn matches_str(&self, path: &str) -> bool {
        self.matches(Path::new(path.trim_start_matches('/')))
    }
}

fn match_segments(segments: &[Segment], parts: &[String]) -> bool {
    match segments.first() {
        None => parts.is_empty(),
        Some(Segment::Globstar) => {
            // Globstar absorbs zero or more leading path segments.
            (0..=parts.len()).any(|skip| match_segments(&segments[1..], &parts[skip..]))
        }
        Some(Segment::Glob(pat)) => match parts.first() {
            Some(part) => glob_match(pat, part) && match_segments(&segments[1..], &parts[1..]),
            None => false,
        },
    }
}
