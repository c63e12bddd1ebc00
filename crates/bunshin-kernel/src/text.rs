//! Shared text primitives: line numbering, truncation, string replacement.
//!
//! Every backend's read path goes through the same formatting helpers so
//! output is backend-agnostic.

use crate::error::{BackendError, BackendResult};

/// Maximum characters per rendered line before continuation chunking.
pub const MAX_LINE_LENGTH: usize = 10_000;

/// Width of the line-number gutter.
const LINE_NUMBER_WIDTH: usize = 6;

/// Ceiling on a single tool result, in characters.
pub const TOOL_OUTPUT_LIMIT: usize = 80_000;

/// Appended when a result was cut at [`TOOL_OUTPUT_LIMIT`].
pub const TRUNCATION_NOTICE: &str =
    "... [results truncated, try being more specific with your parameters]";

/// Returned instead of nothing when a file exists but holds no content.
pub const EMPTY_CONTENT_WARNING: &str = "System reminder: File exists but has empty contents";

/// Render content in `cat -n` style with a tab after the gutter.
///
/// Lines longer than [`MAX_LINE_LENGTH`] are split into chunks; the first
/// chunk keeps the line number and continuations are marked `N.1`, `N.2`.
pub fn format_with_line_numbers(content: &str, start_line: u64) -> String {
    let mut lines: Vec<&str> = content.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }

    let mut out = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let line_num = start_line + i as u64;
        if line.chars().count() <= MAX_LINE_LENGTH {
            out.push(format!("{line_num:>LINE_NUMBER_WIDTH$}\t{line}"));
        } else {
            let chars: Vec<char> = line.chars().collect();
            for (chunk_idx, chunk) in chars.chunks(MAX_LINE_LENGTH).enumerate() {
                let chunk: String = chunk.iter().collect();
                if chunk_idx == 0 {
                    out.push(format!("{line_num:>LINE_NUMBER_WIDTH$}\t{chunk}"));
                } else {
                    let marker = format!("{line_num}.{chunk_idx}");
                    out.push(format!("{marker:>LINE_NUMBER_WIDTH$}\t{chunk}"));
                }
            }
        }
    }
    out.join("\n")
}

/// Return the empty-file reminder when content has nothing to show.
pub fn check_empty_content(content: &str) -> Option<&'static str> {
    if content.trim().is_empty() {
        Some(EMPTY_CONTENT_WARNING)
    } else {
        None
    }
}

/// Cut an oversized result at [`TOOL_OUTPUT_LIMIT`], keeping the head.
pub fn truncate_output(result: String) -> String {
    if result.chars().count() <= TOOL_OUTPUT_LIMIT {
        return result;
    }
    let head: String = result.chars().take(TOOL_OUTPUT_LIMIT).collect();
    format!("{head}\n{TRUNCATION_NOTICE}")
}

/// How a string-replacement edit resolves multiple matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplaceMode {
    /// The old string must occur exactly once; anything else is an error.
    #[default]
    Unique,
    /// Replace every occurrence.
    All,
    /// Replace only the nth occurrence (1-based).
    Occurrence(usize),
}

/// Apply a string-replacement edit under the exactness rule.
///
/// Returns the new content and the number of replacements. Zero matches
/// is `PatternNotFound`; multiple matches under `Unique` is
/// `AmbiguousEdit`, so an edit never silently lands in several places.
pub fn replace_string(
    content: &str,
    old: &str,
    new: &str,
    mode: ReplaceMode,
) -> BackendResult<(String, usize)> {
    if old.is_empty() {
        return Err(BackendError::pattern_not_found(
            "old string must not be empty",
        ));
    }

    let occurrences: Vec<usize> = content.match_indices(old).map(|(i, _)| i).collect();
    if occurrences.is_empty() {
        return Err(BackendError::pattern_not_found(format!(
            "string not found in file: '{old}'"
        )));
    }

    match mode {
        ReplaceMode::Unique => {
            if occurrences.len() > 1 {
                return Err(BackendError::ambiguous_edit(format!(
                    "string '{}' appears {} times; use replace_all or an occurrence \
                     index, or provide more surrounding context",
                    old,
                    occurrences.len()
                )));
            }
            Ok((content.replacen(old, new, 1), 1))
        }
        ReplaceMode::All => {
            let count = occurrences.len();
            Ok((content.replace(old, new), count))
        }
        ReplaceMode::Occurrence(n) => {
            if n == 0 || n > occurrences.len() {
                return Err(BackendError::pattern_not_found(format!(
                    "occurrence {} out of range: '{}' appears {} times",
                    n,
                    old,
                    occurrences.len()
                )));
            }
            let pos = occurrences[n - 1];
            let mut result = String::with_capacity(content.len());
            result.push_str(&content[..pos]);
            result.push_str(new);
            result.push_str(&content[pos + old.len()..]);
            Ok((result, 1))
        }
    }
}
