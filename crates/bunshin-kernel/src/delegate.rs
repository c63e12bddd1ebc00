//! Task delegation with bounded concurrency and isolated views.
//!
//! A [`Delegator`] fans a batch of tasks out to a [`TaskRunner`], each task
//! seeing either the shared backend or its own fork. Results come back in
//! submission order regardless of completion order. Forked writes are
//! journaled and merged into the parent afterwards; a path written by more
//! than one task is a conflict and is not applied.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::backend::memory::{JournalEntry, MemoryBackend};
use crate::backend::{FileBackend, ScopedBackend};
use crate::error::BackendError;

/// A unit of work handed to the runner.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Short name used in reports and log lines.
    pub name: String,
    pub instruction: String,
    /// Optional subtree the task is confined to. Paths the runner uses
    /// are relative to this prefix.
    pub scope: Option<String>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instruction: instruction.into(),
            scope: None,
        }
    }

    pub fn with_scope(mut self, prefix: impl Into<String>) -> Self {
        self.scope = Some(prefix.into());
        self
    }
}

/// What each task sees of the parent's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationPolicy {
    /// Every task gets a fork; writes merge back when the batch finishes.
    Isolated,
    /// Tasks share the parent backend directly.
    Shared,
}

/// Terminal state of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed { output: String },
    Failed { error: String },
    Cancelled,
}

/// One task's entry in the final report.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task: String,
    pub outcome: TaskOutcome,
}

/// A path written by more than one isolated task in the same batch.
#[derive(Debug, Clone)]
pub struct MergeConflict {
    pub path: String,
    pub tasks: Vec<String>,
}

/// Result of a delegated batch, in submission order.
#[derive(Debug, Clone, Default)]
pub struct DelegationReport {
    pub reports: Vec<TaskReport>,
    pub merge_conflicts: Vec<MergeConflict>,
}

impl DelegationReport {
    pub fn completed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, TaskOutcome::Completed { .. }))
            .count()
    }
}

/// Executes a single task against the view it was given.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &TaskSpec, view: Arc<dyn FileBackend>) -> anyhow::Result<String>;
}

pub struct Delegator {
    runner: Arc<dyn TaskRunner>,
    max_concurrency: usize,
    task_timeout: Option<Duration>,
}

impl Delegator {
    pub fn new(runner: Arc<dyn TaskRunner>, max_concurrency: usize) -> Self {
        Self {
            runner,
            max_concurrency: max_concurrency.max(1),
            task_timeout: None,
        }
    }

    /// Fail any single task that runs longer than this.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    /// Run a batch to completion over a forkable parent.
    pub async fn delegate(
        &self,
        base: &Arc<MemoryBackend>,
        tasks: Vec<TaskSpec>,
        policy: IsolationPolicy,
    ) -> DelegationReport {
        self.delegate_with_cancel(base, tasks, policy, CancellationToken::new())
            .await
    }

    /// Run a batch, stopping early when `cancel` fires. Tasks already
    /// finished keep their results; running and queued tasks report
    /// `Cancelled`.
    pub async fn delegate_with_cancel(
        &self,
        base: &Arc<MemoryBackend>,
        tasks: Vec<TaskSpec>,
        policy: IsolationPolicy,
        cancel: CancellationToken,
    ) -> DelegationReport {
        let items = tasks
            .into_iter()
            .map(|task| {
                let fork = match policy {
                    IsolationPolicy::Isolated => Some(Arc::new(
                        base.fork(format!("{}:{}", base.name(), task.name)),
                    )),
                    IsolationPolicy::Shared => None,
                };
                let view: Arc<dyn FileBackend> = match &fork {
                    Some(f) => Arc::clone(f) as _,
                    None => Arc::clone(base) as _,
                };
                (task, fork, view)
            })
            .collect();

        let (reports, journals) = self.run_batch(items, cancel).await;
        let merge_conflicts = merge_journals(base, journals);
        DelegationReport {
            reports,
            merge_conflicts,
        }
    }

    /// Run a batch directly over any backend: a composite namespace, the
    /// local filesystem, or anything else behind the trait. Tasks share
    /// the view, so there is no fork and nothing to merge back.
    pub async fn delegate_shared(
        &self,
        view: Arc<dyn FileBackend>,
        tasks: Vec<TaskSpec>,
    ) -> DelegationReport {
        self.delegate_shared_with_cancel(view, tasks, CancellationToken::new())
            .await
    }

    pub async fn delegate_shared_with_cancel(
        &self,
        view: Arc<dyn FileBackend>,
        tasks: Vec<TaskSpec>,
        cancel: CancellationToken,
    ) -> DelegationReport {
        let items = tasks
            .into_iter()
            .map(|task| (task, None, Arc::clone(&view)))
            .collect();
        let (reports, _) = self.run_batch(items, cancel).await;
        DelegationReport {
            reports,
            merge_conflicts: Vec::new(),
        }
    }

    /// Spawn every task and collect outcomes in submission order.
    async fn run_batch(
        &self,
        items: Vec<(TaskSpec, Option<Arc<MemoryBackend>>, Arc<dyn FileBackend>)>,
        cancel: CancellationToken,
    ) -> (Vec<TaskReport>, Vec<(String, Vec<JournalEntry>)>) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(items.len());

        for (task, fork, view) in items {
            let view: Arc<dyn FileBackend> = if let Some(prefix) = task.scope.clone() {
                match ScopedBackend::new(view, &prefix) {
                    Ok(scoped) => Arc::new(scoped),
                    Err(e) => {
                        let name = task.name;
                        handles.push(tokio::spawn(async move {
                            (
                                name,
                                TaskOutcome::Failed {
                                    error: format!("invalid scope: {e}"),
                                },
                                None::<Vec<JournalEntry>>,
                            )
                        }));
                        continue;
                    }
                }
            } else {
                view
            };

            let runner = Arc::clone(&self.runner);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let task_timeout = self.task_timeout;
            let name = task.name.clone();

            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return (name, TaskOutcome::Cancelled, None),
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(p) => p,
                        Err(_) => {
                            return (
                                name,
                                TaskOutcome::Failed {
                                    error: BackendError::cancelled("scheduler shut down")
                                        .to_string(),
                                },
                                None,
                            )
                        }
                    },
                };
                if cancel.is_cancelled() {
                    return (name, TaskOutcome::Cancelled, None);
                }

                tracing::debug!(task = %name, "task starting");
                let work = runner.run(&task, view);
                let result = tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!(task = %name, "task cancelled");
                        return (name, TaskOutcome::Cancelled, None);
                    }
                    result = async {
                        match task_timeout {
                            Some(t) => match tokio::time::timeout(t, work).await {
                                Ok(r) => r,
                                Err(_) => Err(BackendError::cancelled(format!(
                                    "task timed out after {t:?}"
                                ))
                                .into()),
                            },
                            None => work.await,
                        }
                    } => result,
                };

                match result {
                    Ok(output) => {
                        let journal = fork.map(|f| f.take_journal());
                        (name, TaskOutcome::Completed { output }, journal)
                    }
                    Err(e) => {
                        tracing::warn!(task = %name, error = %e, "task failed");
                        (name, TaskOutcome::Failed { error: e.to_string() }, None)
                    }
                }
            });
            handles.push(handle);
        }

        // Collect in submission order so the report is stable no matter
        // which task finished first.
        let mut reports = Vec::with_capacity(handles.len());
        let mut journals: Vec<(String, Vec<JournalEntry>)> = Vec::new();
        for handle in handles {
            match handle.await {
                Ok((name, outcome, journal)) => {
                    if let Some(entries) = journal {
                        journals.push((name.clone(), entries));
                    }
                    reports.push(TaskReport {
                        task: name,
                        outcome,
                    });
                }
                Err(e) => reports.push(TaskReport {
                    task: "<unknown>".to_string(),
                    outcome: TaskOutcome::Failed {
                        error: format!("task panicked: {e}"),
                    },
                }),
            }
        }

        (reports, journals)
    }
}

/// Apply journaled writes to the parent in submission order, withholding
/// any path touched by more than one task.
fn merge_journals(
    base: &Arc<MemoryBackend>,
    journals: Vec<(String, Vec<JournalEntry>)>,
) -> Vec<MergeConflict> {
    let mut writers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (task, entries) in &journals {
        for entry in entries {
            writers.entry(&entry.path).or_default().push(task);
        }
    }

    let mut conflicts = Vec::new();
    for (path, tasks) in &writers {
        if tasks.len() > 1 {
            conflicts.push(MergeConflict {
                path: path.to_string(),
                tasks: tasks.iter().map(|t| t.to_string()).collect(),
            });
        }
    }

    for (_, entries) in &journals {
        let clean: Vec<JournalEntry> = entries
            .iter()
            .filter(|e| writers.get(e.path.as_str()).map(Vec::len) == Some(1))
            .cloned()
            .collect();
        base.apply_journal(&clean);
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::composite::CompositeBackend;

    /// Runner that writes its instruction to a per-task file, failing or
    /// stalling when the name asks it to.
    struct ScriptedRunner;

    #[async_trait]
    impl TaskRunner for ScriptedRunner {
        async fn run(&self, task: &TaskSpec, view: Arc<dyn FileBackend>) -> anyhow::Result<String> {
            if task.name.starts_with("fail") {
                anyhow::bail!("scripted failure in {}", task.name);
            }
            if task.name.starts_with("stall") {
                std::future::pending::<()>().await;
            }
            view.write(
                &format!("/out/{}.txt", task.name),
                &task.instruction,
                true,
            )
            .await?;
            Ok(format!("done: {}", task.name))
        }
    }

    fn delegator() -> Delegator {
        Delegator::new(Arc::new(ScriptedRunner), 4)
    }

    #[tokio::test]
    async fn results_come_back_in_submission_order() {
        let base = Arc::new(MemoryBackend::new("parent"));
        let tasks: Vec<TaskSpec> = (1..=5)
            .map(|i| {
                let name = if i == 3 {
                    format!("fail-{i}")
                } else {
                    format!("task-{i}")
                };
                TaskSpec::new(name, format!("work {i}"))
            })
            .collect();

        let report = delegator()
            .delegate(&base, tasks, IsolationPolicy::Isolated)
            .await;

        assert_eq!(report.reports.len(), 5);
        assert_eq!(report.completed(), 4);
        let names: Vec<&str> = report.reports.iter().map(|r| r.task.as_str()).collect();
        assert_eq!(
            names,
            vec!["task-1", "task-2", "fail-3", "task-4", "task-5"]
        );
        match &report.reports[2].outcome {
            TaskOutcome::Failed { error } => assert!(error.contains("scripted failure")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn isolated_writes_merge_back() {
        let base = Arc::new(MemoryBackend::new("parent"));
        let tasks = vec![
            TaskSpec::new("alpha", "first"),
            TaskSpec::new("beta", "second"),
        ];

        let report = delegator()
            .delegate(&base, tasks, IsolationPolicy::Isolated)
            .await;

        assert!(report.merge_conflicts.is_empty());
        assert_eq!(base.read("/out/alpha.txt").await.unwrap().text, "first");
        assert_eq!(base.read("/out/beta.txt").await.unwrap().text, "second");
    }

    #[tokio::test]
    async fn failed_task_writes_are_discarded() {
        let base = Arc::new(MemoryBackend::new("parent"));
        let tasks = vec![TaskSpec::new("fail-1", "never lands")];

        let report = delegator()
            .delegate(&base, tasks, IsolationPolicy::Isolated)
            .await;

        assert_eq!(report.completed(), 0);
        assert!(matches!(
            base.read("/out/fail-1.txt").await.unwrap_err(),
            BackendError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn same_path_from_two_tasks_is_a_conflict() {
        struct CollidingRunner;

        #[async_trait]
        impl TaskRunner for CollidingRunner {
            async fn run(
                &self,
                task: &TaskSpec,
                view: Arc<dyn FileBackend>,
            ) -> anyhow::Result<String> {
                view.write("/shared.txt", &task.instruction, true).await?;
                view.write(&format!("/{}.txt", task.name), "own", true)
                    .await?;
                Ok("ok".to_string())
            }
        }

        let base = Arc::new(MemoryBackend::new("parent"));
        let delegator = Delegator::new(Arc::new(CollidingRunner), 2);
        let tasks = vec![TaskSpec::new("a", "from a"), TaskSpec::new("b", "from b")];

        let report = delegator
            .delegate(&base, tasks, IsolationPolicy::Isolated)
            .await;

        assert_eq!(report.merge_conflicts.len(), 1);
        assert_eq!(report.merge_conflicts[0].path, "/shared.txt");
        assert_eq!(report.merge_conflicts[0].tasks, vec!["a", "b"]);

        // The contested path is withheld; per-task files still land.
        assert!(matches!(
            base.read("/shared.txt").await.unwrap_err(),
            BackendError::NotFound(_)
        ));
        assert_eq!(base.read("/a.txt").await.unwrap().text, "own");
        assert_eq!(base.read("/b.txt").await.unwrap().text, "own");
    }

    #[tokio::test]
    async fn shared_policy_writes_directly() {
        let base = Arc::new(MemoryBackend::new("parent"));
        let tasks = vec![TaskSpec::new("alpha", "direct")];

        let report = delegator()
            .delegate(&base, tasks, IsolationPolicy::Shared)
            .await;

        assert_eq!(report.completed(), 1);
        assert!(report.merge_conflicts.is_empty());
        assert_eq!(base.read("/out/alpha.txt").await.unwrap().text, "direct");
    }

    #[tokio::test]
    async fn scoped_task_writes_land_under_its_prefix() {
        let base = Arc::new(MemoryBackend::new("parent"));
        base.write("/research/notes.txt", "prior", true).await.unwrap();
        let tasks = vec![
            TaskSpec::new("alpha", "scoped work").with_scope("/research"),
            TaskSpec::new("beta", "unscoped work"),
        ];

        let report = delegator()
            .delegate(&base, tasks, IsolationPolicy::Isolated)
            .await;

        assert_eq!(report.completed(), 2);
        assert!(report.merge_conflicts.is_empty());
        assert_eq!(
            base.read("/research/out/alpha.txt").await.unwrap().text,
            "scoped work"
        );
        assert_eq!(base.read("/out/beta.txt").await.unwrap().text, "unscoped work");
    }

    #[tokio::test]
    async fn invalid_scope_fails_the_task_up_front() {
        let base = Arc::new(MemoryBackend::new("parent"));
        let tasks = vec![TaskSpec::new("alpha", "x").with_scope("//")];

        let report = delegator()
            .delegate(&base, tasks, IsolationPolicy::Isolated)
            .await;

        assert_eq!(report.completed(), 0);
        match &report.reports[0].outcome {
            TaskOutcome::Failed { error } => assert!(error.contains("invalid scope")),
            other => panic!("expected scope failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_stops_running_and_queued_tasks() {
        let base = Arc::new(MemoryBackend::new("parent"));
        let cancel = CancellationToken::new();
        let tasks = vec![
            TaskSpec::new("task-1", "x"),
            TaskSpec::new("task-2", "x"),
            TaskSpec::new("stall-3", "x"),
            TaskSpec::new("stall-4", "x"),
            TaskSpec::new("stall-5", "x"),
        ];

        let delegator = Delegator::new(Arc::new(ScriptedRunner), 5);
        let batch = {
            let base = Arc::clone(&base);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                delegator
                    .delegate_with_cancel(&base, tasks, IsolationPolicy::Isolated, cancel)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        let report = batch.await.unwrap();

        assert_eq!(report.completed(), 2);
        let cancelled = report
            .reports
            .iter()
            .filter(|r| r.outcome == TaskOutcome::Cancelled)
            .count();
        assert_eq!(cancelled, 3);
        assert_eq!(base.read("/out/task-1.txt").await.unwrap().text, "x");
    }

    #[tokio::test]
    async fn task_timeout_fails_the_task() {
        let base = Arc::new(MemoryBackend::new("parent"));
        let delegator = Delegator::new(Arc::new(ScriptedRunner), 2)
            .with_task_timeout(Duration::from_millis(50));
        let tasks = vec![
            TaskSpec::new("task-1", "quick"),
            TaskSpec::new("stall-2", "never"),
        ];

        let report = delegator
            .delegate(&base, tasks, IsolationPolicy::Isolated)
            .await;

        assert_eq!(report.completed(), 1);
        match &report.reports[1].outcome {
            TaskOutcome::Failed { error } => {
                assert!(error.contains("cancelled"));
                assert!(error.contains("timed out"));
            }
            other => panic!("expected timeout failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shared_delegation_runs_over_a_composite() {
        let mut composite =
            CompositeBackend::new("vfs", Arc::new(MemoryBackend::new("default")));
        composite
            .register("/memories", Arc::new(MemoryBackend::new("memories")))
            .unwrap();
        let view: Arc<dyn FileBackend> = Arc::new(composite);

        let tasks = vec![
            TaskSpec::new("alpha", "routed").with_scope("/memories"),
            TaskSpec::new("beta", "direct"),
        ];
        let report = delegator().delegate_shared(Arc::clone(&view), tasks).await;

        assert_eq!(report.completed(), 2);
        assert!(report.merge_conflicts.is_empty());
        assert_eq!(
            view.read("/memories/out/alpha.txt").await.unwrap().text,
            "routed"
        );
        assert_eq!(view.read("/out/beta.txt").await.unwrap().text, "direct");
    }
}
