//! GrepEngine: search file contents, with selectable output modes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::backend::FileBackend;
use crate::types::GrepMatch;

use super::{check_path, parse_params, ToolEngine, ToolResponse};

pub struct GrepEngine {
    backend: Arc<dyn FileBackend>,
}

impl GrepEngine {
    pub fn new(backend: Arc<dyn FileBackend>) -> Self {
        Self { backend }
    }
}

fn default_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum OutputMode {
    #[default]
    FilesWithMatches,
    Content,
    Count,
}

#[derive(Deserialize)]
struct GrepParams {
    pattern: String,
    #[serde(default = "default_path")]
    path: String,
    glob: Option<String>,
    #[serde(default)]
    output_mode: OutputMode,
    #[serde(default)]
    case_insensitive: bool,
}

fn render_files(matches: &[GrepMatch]) -> String {
    let mut paths: Vec<&str> = Vec::new();
    for m in matches {
        if paths.last() != Some(&m.path.as_str()) && !paths.contains(&m.path.as_str()) {
            paths.push(&m.path);
        }
    }
    paths.join("\n")
}

fn render_content(matches: &[GrepMatch]) -> String {
    matches
        .iter()
        .map(|m| format!("{}:{}:{}", m.path, m.line, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_counts(matches: &[GrepMatch]) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for m in matches {
        match counts.iter_mut().find(|(p, _)| *p == m.path) {
            Some((_, n)) => *n += 1,
            None => counts.push((&m.path, 1)),
        }
    }
    counts
        .iter()
        .map(|(p, n)| format!("{p}:{n}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ToolEngine for GrepEngine {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents for a regex pattern"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex to search for. Invalid regex falls back to a literal search."
                },
                "path": {
                    "type": "string",
                    "description": "Absolute directory to search under. Defaults to /."
                },
                "glob": {
                    "type": "string",
                    "description": "Only search files whose path matches this glob, e.g. *.rs"
                },
                "output_mode": {
                    "type": "string",
                    "enum": ["files_with_matches", "content", "count"],
                    "description": "How to render results. Defaults to files_with_matches."
                },
                "case_insensitive": {
                    "type": "boolean",
                    "description": "Ignore case when matching. Defaults to false."
                }
            },
            "required": ["pattern"]
        })
    }

    #[tracing::instrument(skip(self, params), name = "engine.grep")]
    async fn invoke(&self, params: &str) -> ToolResponse {
        let p: GrepParams = match parse_params(params) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        if p.pattern.is_empty() {
            return ToolResponse::invalid_params("pattern must not be empty");
        }
        if let Err(resp) = check_path(&p.path) {
            return resp;
        }

        // Case folding rides on the pattern so every backend honors it.
        let pattern = if p.case_insensitive {
            format!("(?i){}", p.pattern)
        } else {
            p.pattern.clone()
        };
        let matches = match self
            .backend
            .grep(&pattern, &p.path, p.glob.as_deref())
            .await
        {
            Ok(m) => m,
            Err(e) => return ToolResponse::failure(e),
        };
        if matches.is_empty() {
            return ToolResponse::success("No matches found");
        }

        let output = match p.output_mode {
            OutputMode::FilesWithMatches => render_files(&matches),
            OutputMode::Content => render_content(&matches),
            OutputMode::Count => render_counts(&matches),
        };
        ToolResponse::success(output)
    }
}
