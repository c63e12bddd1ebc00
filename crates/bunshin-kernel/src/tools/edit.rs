//! EditEngine: exact string replacement within a file.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::backend::FileBackend;
use crate::text::ReplaceMode;

use super::{check_path, parse_params, ToolEngine, ToolResponse};

pub struct EditEngine {
    backend: Arc<dyn FileBackend>,
}

impl EditEngine {
    pub fn new(backend: Arc<dyn FileBackend>) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
struct EditParams {
    path: String,
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
    /// 1-based index selecting a single occurrence.
    occurrence: Option<usize>,
}

#[async_trait]
impl ToolEngine for EditEngine {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replace an exact string in a file; the string must match uniquely \
         unless replace_all or occurrence is given"
    }

    fn schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute file path to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to find"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence. Defaults to false."
                },
                "occurrence": {
                    "type": "integer",
                    "description": "Replace only the nth occurrence (1-based)."
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    #[tracing::instrument(skip(self, params), name = "engine.edit")]
    async fn invoke(&self, params: &str) -> ToolResponse {
        let p: EditParams = match parse_params(params) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        if let Err(resp) = check_path(&p.path) {
            return resp;
        }

        let mode = match (p.replace_all, p.occurrence) {
            (true, Some(_)) => {
                return ToolResponse::invalid_params(
                    "replace_all and occurrence are mutually exclusive",
                )
            }
            (true, None) => ReplaceMode::All,
            (false, Some(n)) => ReplaceMode::Occurrence(n),
            (false, None) => ReplaceMode::Unique,
        };

        match self
            .backend
            .edit(&p.path, &p.old_string, &p.new_string, mode)
            .await
        {
            Ok(result) => {
                let noun = if result.replacements == 1 {
                    "occurrence"
                } else {
                    "occurrences"
                };
                ToolResponse::success(format!(
                    "Replaced {} {noun} in {}",
                    result.replacements, result.path
                ))
            }
            Err(e) => ToolResponse::failure(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    async fn setup(content: &str) -> (EditEngine, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new("mem"));
        backend.write("/f.txt", content, true).await.unwrap();
        (EditEngine::new(Arc::clone(&backend) as _), backend)
    }

    #[tokio::test]
    async fn unique_replacement() {
        let (engine, backend) = setup("hello world").await;
        let resp = engine
            .invoke(r#"{"path": "/f.txt", "old_string": "world", "new_string": "rust"}"#)
            .await;
        assert!(resp.ok);
        assert_eq!(resp.output, "Replaced 1 occurrence in /f.txt");
        assert_eq!(backend.read("/f.txt").await.unwrap().text, "hello rust");
    }

    #[tokio::test]
    async fn ambiguous_without_disambiguator() {
        let (engine, _) = setup("aa bb aa").await;
        let resp = engine
            .invoke(r#"{"path": "/f.txt", "old_string": "aa", "new_string": "x"}"#)
            .await;
        assert!(!resp.ok);
        assert_eq!(resp.error.unwrap().kind, "ambiguous_edit");
    }

    #[tokio::test]
    async fn replace_all_counts_occurrences() {
        let (engine, backend) = setup("aa bb aa").await;
        let resp = engine
            .invoke(
                r#"{"path": "/f.txt", "old_string": "aa", "new_string": "x", "replace_all": true}"#,
            )
            .await;
        assert!(resp.ok);
        assert_eq!(resp.output, "Replaced 2 occurrences in /f.txt");
        assert_eq!(backend.read("/f.txt").await.unwrap().text, "x bb x");
    }

    #[tokio::test]
    async fn occurrence_selects_one_match() {
        let (engine, backend) = setup("aa bb aa").await;
        let resp = engine
            .invoke(
                r#"{"path": "/f.txt", "old_string": "aa", "new_string": "x", "occurrence": 2}"#,
            )
            .await;
        assert!(resp.ok);
        assert_eq!(backend.read("/f.txt").await.unwrap().text, "aa bb x");
    }

    #[tokio::test]
    async fn replace_all_with_occurrence_is_invalid() {
        let (engine, _) = setup("aa").await;
        let resp = engine
            .invoke(
                r#"{"path": "/f.txt", "old_string": "aa", "new_string": "x",
                    "replace_all": true, "occurrence": 1}"#,
            )
            .await;
        assert!(!resp.ok);
        assert_eq!(resp.error.unwrap().kind, "invalid_params");
    }

    #[tokio::test]
    async fn missing_string_is_pattern_not_found() {
        let (engine, _) = setup("content").await;
        let resp = engine
            .invoke(r#"{"path": "/f.txt", "old_string": "zzz", "new_string": "x"}"#)
            .await;
        assert!(!resp.ok);
        assert_eq!(resp.error.unwrap().kind, "pattern_not_found");
    }
}
