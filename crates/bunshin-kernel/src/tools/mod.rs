//! Tool engines over a file backend.
//!
//! Each engine wraps one backend operation behind a JSON-parameter
//! interface, renders output as text a model can consume, and reports
//! failures as a structured error envelope instead of Err.

pub mod edit;
pub mod exec;
pub mod glob;
pub mod grep;
pub mod ls;
pub mod read;
pub mod write;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

pub use edit::EditEngine;
pub use exec::ExecEngine;
pub use glob::GlobEngine;
pub use grep::GrepEngine;
pub use ls::LsEngine;
pub use read::ReadEngine;
pub use write::WriteEngine;

/// Structured error carried in a failed tool response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    /// Stable machine-readable kind, e.g. `not_found`.
    pub kind: String,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<BackendError> for ToolError {
    fn from(err: BackendError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Result of invoking a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub ok: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResponse {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            ok: true,
            output: crate::text::truncate_output(output.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<ToolError>) -> Self {
        Self {
            ok: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::failure(ToolError::new("invalid_params", message))
    }
}

/// A single tool: named, described, schema'd, invokable with JSON params.
#[async_trait]
pub trait ToolEngine: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the tool's input parameters.
    fn schema(&self) -> serde_json::Value;

    async fn invoke(&self, params: &str) -> ToolResponse;
}

/// Registry of tool engines keyed by name.
#[derive(Default)]
pub struct ToolSet {
    engines: HashMap<String, Arc<dyn ToolEngine>>,
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet")
            .field("engines", &self.engines.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, engine: Arc<dyn ToolEngine>) {
        self.engines.insert(engine.name().to_string(), engine);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolEngine>> {
        self.engines.get(name).cloned()
    }

    /// Names of all registered tools, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Invoke a tool by name.
    pub async fn invoke(&self, name: &str, params: &str) -> ToolResponse {
        match self.engines.get(name) {
            Some(engine) => engine.invoke(params).await,
            None => ToolResponse::failure(ToolError::new(
                "unknown_tool",
                format!("no tool registered under '{name}'"),
            )),
        }
    }
}

/// Parse JSON params into a typed struct or produce the standard
/// invalid-params response.
pub(crate) fn parse_params<T: for<'de> Deserialize<'de>>(params: &str) -> Result<T, ToolResponse> {
    serde_json::from_str(params).map_err(|e| ToolResponse::invalid_params(format!("{e}")))
}

/// Reject paths that are not absolute or that try to climb out of the
/// namespace before they reach a backend.
pub(crate) fn check_path(path: &str) -> Result<(), ToolResponse> {
    if path.is_empty() || !path.starts_with('/') {
        return Err(ToolResponse::invalid_params(format!(
            "path must be absolute: '{path}'"
        )));
    }
    if path.split('/').any(|seg| seg == "..") {
        return Err(ToolResponse::invalid_params(format!(
            "path must not contain '..': '{path}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoEngine;

    #[async_trait]
    impl ToolEngine for EchoEngine {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo params back"
        }
        fn schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn invoke(&self, params: &str) -> ToolResponse {
            ToolResponse::success(params)
        }
    }

    #[tokio::test]
    async fn registry_dispatches_by_name() {
        let mut tools = ToolSet::new();
        tools.register(Arc::new(EchoEngine));
        assert_eq!(tools.names(), vec!["echo"]);

        let resp = tools.invoke("echo", "{}").await;
        assert!(resp.ok);
        assert_eq!(resp.output, "{}");
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_envelope() {
        let tools = ToolSet::new();
        let resp = tools.invoke("nope", "{}").await;
        assert!(!resp.ok);
        assert_eq!(resp.error.unwrap().kind, "unknown_tool");
    }

    #[test]
    fn check_path_rejects_traversal() {
        assert!(check_path("/ok/file.txt").is_ok());
        assert!(check_path("/../etc/passwd").is_err());
        assert!(check_path("/a/../b").is_err());
        assert!(check_path("relative").is_err());
    }

    #[test]
    fn backend_error_maps_to_tool_error_kind() {
        let err = ToolError::from(BackendError::not_found("/x"));
        assert_eq!(err.kind, "not_found");
    }

    #[test]
    fn success_output_is_capped() {
        let resp = ToolResponse::success("y".repeat(crate::text::TOOL_OUTPUT_LIMIT + 50));
        assert!(resp.output.ends_with(crate::text::TRUNCATION_NOTICE));
    }
}
