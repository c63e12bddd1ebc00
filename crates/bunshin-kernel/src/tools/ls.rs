//! LsEngine: list directory entries.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::backend::FileBackend;

use super::{check_path, parse_params, ToolEngine, ToolResponse};

pub struct LsEngine {
    backend: Arc<dyn FileBackend>,
}

impl LsEngine {
    pub fn new(backend: Arc<dyn FileBackend>) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
struct LsParams {
    path: String,
}

#[async_trait]
impl ToolEngine for LsEngine {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "List the files and directories directly under a path"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute directory path to list"
                }
            },
            "required": ["path"]
        })
    }

    #[tracing::instrument(skip(self, params), name = "engine.ls")]
    async fn invoke(&self, params: &str) -> ToolResponse {
        let p: LsParams = match parse_params(params) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        if let Err(resp) = check_path(&p.path) {
            return resp;
        }

        match self.backend.list(&p.path).await {
            Ok(entries) => {
                let lines: Vec<String> = entries
                    .iter()
                    .map(|e| {
                        if e.is_dir {
                            format!("{}/", e.path)
                        } else {
                            e.path.clone()
                        }
                    })
                    .collect();
                ToolResponse::success(lines.join("\n"))
            }
            Err(e) => ToolResponse::failure(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    async fn engine_with_files() -> LsEngine {
        let backend = MemoryBackend::new("mem");
        backend.write("/src/main.rs", "", true).await.unwrap();
        backend.write("/readme.md", "", true).await.unwrap();
        LsEngine::new(Arc::new(backend))
    }

    #[tokio::test]
    async fn lists_with_dir_markers() {
        let engine = engine_with_files().await;
        let resp = engine.invoke(r#"{"path": "/"}"#).await;
        assert!(resp.ok);
        assert_eq!(resp.output, "/readme.md\n/src/");
    }

    #[tokio::test]
    async fn missing_dir_is_not_found() {
        let engine = engine_with_files().await;
        let resp = engine.invoke(r#"{"path": "/nope"}"#).await;
        assert!(!resp.ok);
        assert_eq!(resp.error.unwrap().kind, "not_found");
    }

    #[tokio::test]
    async fn relative_path_is_invalid() {
        let engine = engine_with_files().await;
        let resp = engine.invoke(r#"{"path": "src"}"#).await;
        assert!(!resp.ok);
        assert_eq!(resp.error.unwrap().kind, "invalid_params");
    }
}
