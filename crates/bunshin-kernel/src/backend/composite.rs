//! Prefix-routed composite backend.
//!
//! A composite owns a default backend plus named routes. Paths under a
//! route prefix are stripped and forwarded to that route's backend; every
//! other path goes to the default. Longest prefix wins, so `/a/b/` shadows
//! `/a/` for paths beneath it.

use std::sync::Arc;

use async_trait::async_trait;

use super::{validate_virtual_path, FileBackend};
use crate::error::{BackendError, BackendResult};
use crate::text::ReplaceMode;
use crate::types::{EditResult, ExecOutput, FileContent, FileInfo, GrepMatch, WriteResult};

struct Route {
    /// Normalized to the form `/name/` (possibly multi-segment).
    prefix: String,
    backend: Arc<dyn FileBackend>,
}

pub struct CompositeBackend {
    name: String,
    default: Arc<dyn FileBackend>,
    routes: Vec<Route>,
}

impl CompositeBackend {
    pub fn new(name: impl Into<String>, default: Arc<dyn FileBackend>) -> Self {
        Self {
            name: name.into(),
            default,
            routes: Vec::new(),
        }
    }

    /// Register a backend under a path prefix.
    ///
    /// Registering the same prefix twice is an error rather than a silent
    /// replacement.
    pub fn register(
        &mut self,
        prefix: impl AsRef<str>,
        backend: Arc<dyn FileBackend>,
    ) -> BackendResult<()> {
        let trimmed = prefix.as_ref().trim_matches('/');
        if trimmed.is_empty() {
            return Err(BackendError::invalid_path(
                "route prefix must name at least one path segment",
            ));
        }
        let normalized = format!("/{trimmed}/");
        if self.routes.iter().any(|r| r.prefix == normalized) {
            return Err(BackendError::route_conflict(format!(
                "route already registered: {normalized}"
            )));
        }
        self.routes.push(Route {
            prefix: normalized,
            backend,
        });
        Ok(())
    }

    pub fn route_prefixes(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.prefix.as_str()).collect()
    }

    /// Pick the backend for a path and rewrite the path into that
    /// backend's own namespace. The longest matching prefix wins.
    ///
    /// Returns the backend, the mount prefix without its trailing slash
    /// (empty for the default), and the rewritten path.
    fn dispatch(&self, path: &str) -> (&Arc<dyn FileBackend>, &str, String) {
        let mut best: Option<&Route> = None;
        for route in &self.routes {
            let bare = route.prefix.trim_end_matches('/');
            if (path == bare || path.starts_with(route.prefix.as_str()))
                && best.is_none_or(|b| route.prefix.len() > b.prefix.len())
            {
                best = Some(route);
            }
        }
        match best {
            Some(route) => {
                let suffix = path
                    .strip_prefix(route.prefix.as_str())
                    .unwrap_or("")
                    .to_string();
                let inner = if suffix.is_empty() {
                    "/".to_string()
                } else {
                    format!("/{suffix}")
                };
                (&route.backend, route.prefix.trim_end_matches('/'), inner)
            }
            None => (&self.default, "", path.to_string()),
        }
    }

    /// Rewrite a route-local path back into the composite namespace.
    fn reprefix(prefix: &str, inner: &str) -> String {
        format!("{}{}", prefix.trim_end_matches('/'), inner)
    }

    /// Routes mounted strictly below `scope`, excluding the dispatch
    /// target itself. Listings and searches fan out to these so files
    /// behind a nested mount stay reachable from an ancestor scope.
    fn descendant_routes(&self, scope: &str, mount: &str) -> Vec<&Route> {
        let scope_dir = if scope == "/" {
            "/".to_string()
        } else {
            format!("{scope}/")
        };
        self.routes
            .iter()
            .filter(|r| {
                let bare = r.prefix.trim_end_matches('/');
                bare != mount && bare.starts_with(scope_dir.as_str())
            })
            .collect()
    }
}

#[async_trait]
impl FileBackend for CompositeBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list(&self, path: &str) -> BackendResult<Vec<FileInfo>> {
        validate_virtual_path(path)?;
        let (backend, mount, inner) = self.dispatch(path);
        let descendants = self.descendant_routes(path, mount);

        // A scope that exists only as a mount point still lists.
        let listed = match backend.list(&inner).await {
            Ok(e) => e,
            Err(BackendError::NotFound(_)) if path == "/" || !descendants.is_empty() => Vec::new(),
            Err(e) => return Err(e),
        };
        let mut entries: Vec<FileInfo> = listed
            .into_iter()
            .map(|mut e| {
                if !mount.is_empty() {
                    e.path = format!("{mount}{}", e.path);
                }
                e
            })
            .collect();

        // One synthetic directory per mount directly below the scope.
        let scope_dir = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        for route in descendants {
            let bare = route.prefix.trim_end_matches('/');
            let seg = bare[scope_dir.len()..].split('/').next().unwrap_or("");
            if seg.is_empty() {
                continue;
            }
            let child = format!("{scope_dir}{seg}");
            if !entries.iter().any(|e| e.path == child) {
                entries.push(FileInfo::dir(child));
            }
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn read(&self, path: &str) -> BackendResult<FileContent> {
        validate_virtual_path(path)?;
        let (backend, _, inner) = self.dispatch(path);
        backend.read(&inner).await
    }

    async fn write(&self, path: &str, content: &str, overwrite: bool) -> BackendResult<WriteResult> {
        validate_virtual_path(path)?;
        let (backend, _, inner) = self.dispatch(path);
        let mut result = backend.write(&inner, content, overwrite).await?;
        result.path = path.to_string();
        Ok(result)
    }

    async fn edit(
        &self,
        path: &str,
        old: &str,
        new: &str,
        mode: ReplaceMode,
    ) -> BackendResult<EditResult> {
        validate_virtual_path(path)?;
        let (backend, _, inner) = self.dispatch(path);
        let mut result = backend.edit(&inner, old, new, mode).await?;
        result.path = path.to_string();
        Ok(result)
    }

    async fn glob(&self, pattern: &str, path: &str) -> BackendResult<Vec<FileInfo>> {
        validate_virtual_path(path)?;
        let (backend, mount, inner) = self.dispatch(path);
        let descendants = self.descendant_routes(path, mount);

        // Search the dispatch target, then fan out to every mount below
        // the scope, first hit winning on a path collision.
        let mut out: Vec<FileInfo> = match backend.glob(pattern, &inner).await {
            Ok(hits) => hits
                .into_iter()
                .map(|mut e| {
                    if !mount.is_empty() {
                        e.path = format!("{mount}{}", e.path);
                    }
                    e
                })
                .collect(),
            Err(e) if path == "/" || !descendants.is_empty() => {
                tracing::warn!(error = %e, "glob fan-out skipped scope backend");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        for route in descendants {
            match route.backend.glob(pattern, "/").await {
                Ok(hits) => {
                    for mut hit in hits {
                        hit.path = Self::reprefix(&route.prefix, &hit.path);
                        if !out.iter().any(|e| e.path == hit.path) {
                            out.push(hit);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(route = %route.prefix, error = %e, "glob fan-out skipped route");
                }
            }
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    async fn grep(
        &self,
        pattern: &str,
        path: &str,
        glob: Option<&str>,
    ) -> BackendResult<Vec<GrepMatch>> {
        validate_virtual_path(path)?;
        let (backend, mount, inner) = self.dispatch(path);
        let descendants = self.descendant_routes(path, mount);

        let mut out: Vec<GrepMatch> = match backend.grep(pattern, &inner, glob).await {
            Ok(hits) => hits
                .into_iter()
                .map(|mut m| {
                    if !mount.is_empty() {
                        m.path = format!("{mount}{}", m.path);
                    }
                    m
                })
                .collect(),
            Err(e) if path == "/" || !descendants.is_empty() => {
                tracing::warn!(error = %e, "grep fan-out skipped scope backend");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        for route in descendants {
            match route.backend.grep(pattern, "/", glob).await {
                Ok(hits) => {
                    for mut hit in hits {
                        hit.path = Self::reprefix(&route.prefix, &hit.path);
                        if !out.iter().any(|m| m.path == hit.path && m.line == hit.line) {
                            out.push(hit);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(route = %route.prefix, error = %e, "grep fan-out skipped route");
                }
            }
        }
        Ok(out)
    }

    fn supports_execute(&self) -> bool {
        self.default.supports_execute()
    }

    async fn execute(&self, command: &str) -> BackendResult<ExecOutput> {
        self.default.execute(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    fn composite_with_routes() -> CompositeBackend {
        let default = Arc::new(MemoryBackend::new("default"));
        let mut composite = CompositeBackend::new("vfs", default);
        composite
            .register("/memories", Arc::new(MemoryBackend::new("memories")))
            .unwrap();
        composite
            .register("/skills", Arc::new(MemoryBackend::new("skills")))
            .unwrap();
        composite
    }

    #[tokio::test]
    async fn routes_by_prefix_and_strips_it() {
        let composite = composite_with_routes();
        composite
            .write("/memories/fact.md", "routed", true)
            .await
            .unwrap();
        composite.write("/scratch.md", "default", true).await.unwrap();

        assert_eq!(
            composite.read("/memories/fact.md").await.unwrap().text,
            "routed"
        );
        assert_eq!(composite.read("/scratch.md").await.unwrap().text, "default");

        // The routed file must not leak into the default tree.
        assert!(matches!(
            composite.read("/fact.md").await.unwrap_err(),
            BackendError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let default = Arc::new(MemoryBackend::new("default"));
        let mut composite = CompositeBackend::new("vfs", default);
        let outer = Arc::new(MemoryBackend::new("outer"));
        let inner = Arc::new(MemoryBackend::new("inner"));
        composite.register("/a", Arc::clone(&outer) as _).unwrap();
        composite.register("/a/b", Arc::clone(&inner) as _).unwrap();

        composite.write("/a/b/f.txt", "deep", true).await.unwrap();
        composite.write("/a/g.txt", "shallow", true).await.unwrap();

        assert_eq!(inner.read("/f.txt").await.unwrap().text, "deep");
        assert_eq!(outer.read("/g.txt").await.unwrap().text, "shallow");
        assert!(matches!(
            outer.read("/b/f.txt").await.unwrap_err(),
            BackendError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn duplicate_route_is_a_conflict() {
        let mut composite = composite_with_routes();
        let err = composite
            .register("/memories/", Arc::new(MemoryBackend::new("dup")))
            .unwrap_err();
        assert!(matches!(err, BackendError::RouteConflict(_)));
    }

    #[tokio::test]
    async fn root_listing_includes_route_dirs() {
        let composite = composite_with_routes();
        composite.write("/readme.md", "", true).await.unwrap();

        let entries = composite.list("/").await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/memories", "/readme.md", "/skills"]);
        assert!(entries[0].is_dir);
    }

    #[tokio::test]
    async fn listing_a_route_reprefixes_paths() {
        let composite = composite_with_routes();
        composite
            .write("/memories/fact.md", "x", true)
            .await
            .unwrap();

        let entries = composite.list("/memories").await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/memories/fact.md"]);
    }

    #[tokio::test]
    async fn root_glob_fans_out_across_routes() {
        let composite = composite_with_routes();
        composite.write("/notes.md", "", true).await.unwrap();
        composite.write("/memories/fact.md", "", true).await.unwrap();
        composite.write("/skills/howto.md", "", true).await.unwrap();
        composite.write("/skills/data.json", "", true).await.unwrap();

        let hits = composite.glob("**/*.md", "/").await.unwrap();
        let paths: Vec<&str> = hits.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/memories/fact.md", "/notes.md", "/skills/howto.md"]
        );
    }

    #[tokio::test]
    async fn root_grep_fans_out_across_routes() {
        let composite = composite_with_routes();
        composite.write("/a.txt", "needle in default", true).await.unwrap();
        composite
            .write("/memories/b.txt", "needle in route", true)
            .await
            .unwrap();

        let hits = composite.grep("needle", "/", None).await.unwrap();
        let mut paths: Vec<&str> = hits.iter().map(|m| m.path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["/a.txt", "/memories/b.txt"]);
    }

    fn nested_composite() -> CompositeBackend {
        let mut composite =
            CompositeBackend::new("vfs", Arc::new(MemoryBackend::new("default")));
        composite
            .register("/a", Arc::new(MemoryBackend::new("outer")))
            .unwrap();
        composite
            .register("/a/b", Arc::new(MemoryBackend::new("inner")))
            .unwrap();
        composite
    }

    #[tokio::test]
    async fn ancestor_scope_reaches_nested_routes() {
        let composite = nested_composite();
        composite.write("/a/top.md", "", true).await.unwrap();
        composite.write("/a/b/deep.md", "", true).await.unwrap();

        let hits = composite.glob("**/*.md", "/a").await.unwrap();
        let paths: Vec<&str> = hits.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/a/b/deep.md", "/a/top.md"]);

        composite
            .write("/a/b/hit.txt", "needle below", true)
            .await
            .unwrap();
        let hits = composite.grep("needle", "/a", None).await.unwrap();
        assert!(hits.iter().any(|m| m.path == "/a/b/hit.txt"));
    }

    #[tokio::test]
    async fn listing_a_scope_shows_nested_mounts() {
        let composite = nested_composite();
        composite.write("/a/top.md", "", true).await.unwrap();

        let entries = composite.list("/a").await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/a/b", "/a/top.md"]);
        assert!(entries[0].is_dir);

        // A scope that exists only as a mount point still lists.
        let mut composite =
            CompositeBackend::new("vfs", Arc::new(MemoryBackend::new("default")));
        composite
            .register("/deep/nest", Arc::new(MemoryBackend::new("nested")))
            .unwrap();
        let entries = composite.list("/deep").await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/deep/nest"]);
    }

    #[tokio::test]
    async fn scoped_glob_stays_in_route() {
        let composite = composite_with_routes();
        composite.write("/notes.md", "", true).await.unwrap();
        composite.write("/skills/howto.md", "", true).await.unwrap();

        let hits = composite.glob("**/*.md", "/skills").await.unwrap();
        let paths: Vec<&str> = hits.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/skills/howto.md"]);
    }
}
