//! bunshin-kernel: a virtual filesystem for agent workspaces.
//!
//! One `FileBackend` contract covers every storage flavor: ephemeral
//! in-memory trees, a real directory on disk, a SQLite store, a remote
//! shell sandbox, and a prefix-routed composite of any of them. On top
//! sit tool engines (ls, read, write, edit, glob, grep, exec) that speak
//! JSON parameters, and a delegation layer that fans tasks out over
//! isolated forks and merges their writes back.

pub mod backend;
pub mod config;
pub mod delegate;
pub mod error;
pub mod text;
pub mod tools;
pub mod types;

pub use backend::composite::CompositeBackend;
pub use backend::local::LocalBackend;
pub use backend::memory::{JournalEntry, MemoryBackend};
pub use backend::sandbox::{Executor, SandboxBackend, ShellExecutor};
pub use backend::store::StoreBackend;
pub use backend::{FileBackend, ScopedBackend};
pub use config::{Workspace, WorkspaceConfig};
pub use delegate::{
    DelegationReport, Delegator, IsolationPolicy, MergeConflict, TaskOutcome, TaskReport,
    TaskRunner, TaskSpec,
};
pub use error::{BackendError, BackendResult};
pub use text::ReplaceMode;
pub use tools::{ToolEngine, ToolError, ToolResponse, ToolSet};
pub use types::{EditResult, ExecOutput, FileContent, FileInfo, GrepMatch, WriteResult};
