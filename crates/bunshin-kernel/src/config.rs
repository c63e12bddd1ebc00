//! Workspace assembly.
//!
//! A [`WorkspaceConfig`] collects a default backend and any routed
//! backends, then builds a [`Workspace`]: the composite router plus a
//! tool set wired to it. The exec tool is only registered when the
//! default backend can actually run commands.

use std::sync::Arc;

use crate::backend::composite::CompositeBackend;
use crate::backend::FileBackend;
use crate::error::BackendResult;
use crate::tools::{
    EditEngine, ExecEngine, GlobEngine, GrepEngine, LsEngine, ReadEngine, ToolSet, WriteEngine,
};

pub struct WorkspaceConfig {
    name: String,
    default: Arc<dyn FileBackend>,
    routes: Vec<(String, Arc<dyn FileBackend>)>,
}

impl WorkspaceConfig {
    pub fn new(name: impl Into<String>, default: Arc<dyn FileBackend>) -> Self {
        Self {
            name: name.into(),
            default,
            routes: Vec::new(),
        }
    }

    /// Mount a backend under a path prefix.
    pub fn route(mut self, prefix: impl Into<String>, backend: Arc<dyn FileBackend>) -> Self {
        self.routes.push((prefix.into(), backend));
        self
    }

    pub fn build(self) -> BackendResult<Workspace> {
        let mut composite = CompositeBackend::new(self.name, self.default);
        for (prefix, backend) in self.routes {
            composite.register(&prefix, backend)?;
        }
        let backend = Arc::new(composite);

        let mut tools = ToolSet::new();
        let b = Arc::clone(&backend) as Arc<dyn FileBackend>;
        tools.register(Arc::new(LsEngine::new(Arc::clone(&b))));
        tools.register(Arc::new(ReadEngine::new(Arc::clone(&b))));
        tools.register(Arc::new(WriteEngine::new(Arc::clone(&b))));
        tools.register(Arc::new(EditEngine::new(Arc::clone(&b))));
        tools.register(Arc::new(GlobEngine::new(Arc::clone(&b))));
        tools.register(Arc::new(GrepEngine::new(Arc::clone(&b))));
        if backend.supports_execute() {
            tools.register(Arc::new(ExecEngine::new(b)));
        }

        Ok(Workspace { backend, tools })
    }
}

/// A routed backend with its tool surface.
pub struct Workspace {
    backend: Arc<CompositeBackend>,
    tools: ToolSet,
}

impl Workspace {
    pub fn backend(&self) -> &Arc<CompositeBackend> {
        &self.backend
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::backend::sandbox::{SandboxBackend, ShellExecutor};
    use crate::error::BackendError;

    #[tokio::test]
    async fn builds_routed_workspace_with_tools() {
        let ws = WorkspaceConfig::new("ws", Arc::new(MemoryBackend::new("default")))
            .route("/memories", Arc::new(MemoryBackend::new("memories")))
            .build()
            .unwrap();

        assert_eq!(
            ws.tools().names(),
            vec!["edit", "glob", "grep", "ls", "read", "write"]
        );

        let resp = ws
            .tools()
            .invoke(
                "write",
                r#"{"path": "/memories/fact.md", "content": "remembered"}"#,
            )
            .await;
        assert!(resp.ok);

        let resp = ws
            .tools()
            .invoke("read", r#"{"path": "/memories/fact.md"}"#)
            .await;
        assert!(resp.ok);
        assert!(resp.output.contains("remembered"));
    }

    #[tokio::test]
    async fn exec_tool_requires_capable_backend() {
        let dir = tempfile::TempDir::new().unwrap();
        let sandbox = SandboxBackend::new("sbx", ShellExecutor::new()).with_root(dir.path());

        let ws = WorkspaceConfig::new("ws", Arc::new(sandbox)).build().unwrap();
        assert!(ws.tools().names().contains(&"exec"));

        let ws = WorkspaceConfig::new("ws", Arc::new(MemoryBackend::new("mem")))
            .build()
            .unwrap();
        assert!(!ws.tools().names().contains(&"exec"));
    }

    #[tokio::test]
    async fn duplicate_route_fails_to_build() {
        let result = WorkspaceConfig::new("ws", Arc::new(MemoryBackend::new("default")))
            .route("/m", Arc::new(MemoryBackend::new("a")))
            .route("/m", Arc::new(MemoryBackend::new("b")))
            .build();
        assert!(matches!(result, Err(BackendError::RouteConflict(_))));
    }
}
