//! WriteEngine: create or overwrite a file.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::backend::FileBackend;

use super::{check_path, parse_params, ToolEngine, ToolResponse};

pub struct WriteEngine {
    backend: Arc<dyn FileBackend>,
}

impl WriteEngine {
    pub fn new(backend: Arc<dyn FileBackend>) -> Self {
        Self { backend }
    }
}

fn default_overwrite() -> bool {
    true
}

#[derive(Deserialize)]
struct WriteParams {
    path: String,
    content: String,
    #[serde(default = "default_overwrite")]
    overwrite: bool,
}

#[async_trait]
impl ToolEngine for WriteEngine {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute file path to write"
                },
                "content": {
                    "type": "string",
                    "description": "Full content for the file"
                },
                "overwrite": {
                    "type": "boolean",
                    "description": "Replace an existing file. Defaults to true."
                }
            },
            "required": ["path", "content"]
        })
    }

    #[tracing::instrument(skip(self, params), name = "engine.write")]
    async fn invoke(&self, params: &str) -> ToolResponse {
        let p: WriteParams = match parse_params(params) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        if let Err(resp) = check_path(&p.path) {
            return resp;
        }

        match self.backend.write(&p.path, &p.content, p.overwrite).await {
            Ok(result) => {
                let verb = if result.created { "Created" } else { "Updated" };
                ToolResponse::success(format!("{verb} {} ({} bytes)", result.path, result.bytes))
            }
            Err(e) => ToolResponse::failure(e),
        }
    }
}
