//! GlobEngine: find files by glob pattern.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::backend::FileBackend;

use super::{check_path, parse_params, ToolEngine, ToolResponse};

pub struct GlobEngine {
    backend: Arc<dyn FileBackend>,
}

impl GlobEngine {
    pub fn new(backend: Arc<dyn FileBackend>) -> Self {
        Self { backend }
    }
}

fn default_path() -> String {
    "/".to_string()
}

#[derive(Deserialize)]
struct GlobParams {
    pattern: String,
    #[serde(default = "default_path")]
    path: String,
}

#[async_trait]
impl ToolEngine for GlobEngine {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files whose paths match a glob pattern, searched recursively"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern, e.g. **/*.rs or docs/{a,b}/*.md"
                },
                "path": {
                    "type": "string",
                    "description": "Absolute directory to search from. Defaults to /."
                }
            },
            "required": ["pattern"]
        })
    }

    #[tracing::instrument(skip(self, params), name = "engine.glob")]
    async fn invoke(&self, params: &str) -> ToolResponse {
        let p: GlobParams = match parse_params(params) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        if p.pattern.is_empty() {
            return ToolResponse::invalid_params("pattern must not be empty");
        }
        if let Err(resp) = check_path(&p.path) {
            return resp;
        }

        match self.backend.glob(&p.pattern, &p.path).await {
            Ok(hits) => {
                if hits.is_empty() {
                    return ToolResponse::success("No files found");
                }
                let lines: Vec<&str> = hits.iter().map(|e| e.path.as_str()).collect();
                ToolResponse::success(lines.join("\n"))
            }
            Err(e) => ToolResponse::failure(e),
        }
    }
}
