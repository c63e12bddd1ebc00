//! ExecEngine: run a shell command on an execute-capable backend.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::backend::FileBackend;
use crate::error::BackendError;

use super::{parse_params, ToolEngine, ToolError, ToolResponse};

pub struct ExecEngine {
    backend: Arc<dyn FileBackend>,
}

impl ExecEngine {
    pub fn new(backend: Arc<dyn FileBackend>) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
struct ExecParams {
    command: String,
}

#[async_trait]
impl ToolEngine for ExecEngine {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its output"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to run"
                }
            },
            "required": ["command"]
        })
    }

    #[tracing::instrument(skip(self, params), name = "engine.exec")]
    async fn invoke(&self, params: &str) -> ToolResponse {
        let p: ExecParams = match parse_params(params) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        if p.command.trim().is_empty() {
            return ToolResponse::invalid_params("command must not be empty");
        }
        if !self.backend.supports_execute() {
            return ToolResponse::failure(BackendError::unsupported(format!(
                "backend '{}' does not support command execution",
                self.backend.name()
            )));
        }

        match self.backend.execute(&p.command).await {
            Ok(out) if out.ok() => {
                let mut output = out.stdout;
                if !out.stderr.is_empty() {
                    output.push_str("\n[stderr]\n");
                    output.push_str(&out.stderr);
                }
                ToolResponse::success(output)
            }
            Ok(out) => ToolResponse {
                ok: false,
                output: crate::text::truncate_output(out.stdout),
                error: Some(ToolError::new(
                    "exec_failed",
                    format!("exit code {}: {}", out.exit_code, out.stderr.trim()),
                )),
            },
            Err(e) => ToolResponse::failure(e),
        }
    }
}
