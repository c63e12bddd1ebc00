//! ReadEngine: read file content with line numbers and windowing.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::backend::FileBackend;
use crate::text;

use super::{check_path, parse_params, ToolEngine, ToolResponse};

/// Lines returned when no limit is given.
const DEFAULT_LINE_LIMIT: usize = 2000;

pub struct ReadEngine {
    backend: Arc<dyn FileBackend>,
}

impl ReadEngine {
    pub fn new(backend: Arc<dyn FileBackend>) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
struct ReadParams {
    path: String,
    /// Start line, 0-indexed.
    offset: Option<usize>,
    limit: Option<usize>,
}

#[async_trait]
impl ToolEngine for ReadEngine {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read a file with line numbers, optionally windowed by offset and limit"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute file path to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "Start line (0-indexed). Omit to read from the beginning."
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return. Defaults to 2000."
                }
            },
            "required": ["path"]
        })
    }

    #[tracing::instrument(skip(self, params), name = "engine.read")]
    async fn invoke(&self, params: &str) -> ToolResponse {
        let p: ReadParams = match parse_params(params) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        if let Err(resp) = check_path(&p.path) {
            return resp;
        }

        let content = match self.backend.read(&p.path).await {
            Ok(c) => c,
            Err(e) => return ToolResponse::failure(e),
        };
        if let Some(warning) = text::check_empty_content(&content.text) {
            return ToolResponse::success(warning);
        }

        let offset = p.offset.unwrap_or(0);
        let limit = p.limit.unwrap_or(DEFAULT_LINE_LIMIT);
        let window: Vec<&str> = content.text.lines().skip(offset).take(limit).collect();
        if window.is_empty() {
            return ToolResponse::invalid_params(format!(
                "offset {} is past the end of the file",
                offset
            ));
        }

        ToolResponse::success(text::format_with_line_numbers(
            &window.join("\n"),
            offset as u64 + 1,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    async fn engine_with(path: &str, content: &str) -> ReadEngine {
        let backend = MemoryBackend::new("mem");
        backend.write(path, content, true).await.unwrap();
        ReadEngine::new(Arc::new(backend))
    }

    #[tokio::test]
    async fn reads_with_line_numbers() {
        let engine = engine_with("/f.txt", "alpha\nbeta").await;
        let resp = engine.invoke(r#"{"path": "/f.txt"}"#).await;
        assert!(resp.ok);
        assert_eq!(resp.output, "     1\talpha\n     2\tbeta");
    }

    #[tokio::test]
    async fn windows_by_offset_and_limit() {
        let engine = engine_with("/f.txt", "a\nb\nc\nd\ne").await;
        let resp = engine
            .invoke(r#"{"path": "/f.txt", "offset": 2, "limit": 2}"#)
            .await;
        assert!(resp.ok);
        assert_eq!(resp.output, "     3\tc\n     4\td");
    }

    #[tokio::test]
    async fn empty_file_returns_reminder() {
        let engine = engine_with("/empty.txt", "").await;
        let resp = engine.invoke(r#"{"path": "/empty.txt"}"#).await;
        assert!(resp.ok);
        assert_eq!(resp.output, text::EMPTY_CONTENT_WARNING);
    }

    #[tokio::test]
    async fn offset_past_end_is_invalid() {
        let engine = engine_with("/f.txt", "one line").await;
        let resp = engine.invoke(r#"{"path": "/f.txt", "offset": 10}"#).await;
        assert!(!resp.ok);
        assert_eq!(resp.error.unwrap().kind, "invalid_params");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let engine = engine_with("/f.txt", "x").await;
        let resp = engine.invoke(r#"{"path": "/nope.txt"}"#).await;
        assert!(!resp.ok);
        assert_eq!(resp.error.unwrap().kind, "not_found");
    }
}
