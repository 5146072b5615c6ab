//! Sequential task runner.
//!
//! Tasks run one at a time in registration order. A task that errors,
//! panics or overruns the configured timeout does not stop the workflow:
//! its failure becomes a report line of its own and forces the reports to
//! be sent.

mod task;

pub use task::{ApiFactory, DeployCheckTask, HealthPolicy, Task};

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};

use crate::errors::WatchdogError;

/// Reports collected by one [`Workflow::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowRun {
    /// Non-empty task reports, in task order.
    pub reports: Vec<String>,
    /// Whether any task asked for the reports to be sent.
    pub need_report: bool,
}

impl WorkflowRun {
    /// All reports joined into one message.
    #[must_use]
    pub fn message(&self) -> String {
        self.reports.join("\n")
    }
}

/// Ordered list of tasks.
#[derive(Default)]
pub struct Workflow {
    tasks: Vec<Box<dyn Task>>,
    task_timeout: Option<Duration>,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.tasks.iter().map(|t| t.name()).collect();
        f.debug_struct("Workflow")
            .field("tasks", &names)
            .field("task_timeout", &self.task_timeout)
            .finish()
    }
}

impl Workflow {
    /// Creates an empty workflow.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds every task run by `timeout`.
    #[must_use]
    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Appends a task.
    pub fn register_task(&mut self, task: Box<dyn Task>) {
        self.tasks.push(task);
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no task is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs every task in order.
    pub async fn run(&mut self) -> WorkflowRun {
        let mut run = WorkflowRun::default();

        for task in &mut self.tasks {
            let name = task.name().to_string();
            let span = info_span!("task", task = %name);

            let report = match run_guarded(task.as_mut(), &name, self.task_timeout)
                .instrument(span)
                .await
            {
                Ok(report) => {
                    if task.needs_report() {
                        run.need_report = true;
                    }
                    report
                }
                Err(err) => {
                    warn!(task = %name, error = %err, "Task failed");
                    run.need_report = true;
                    format!("Run task {name} error: {err}")
                }
            };

            if !report.is_empty() {
                run.reports.push(report);
            }
        }

        info!(
            tasks = self.tasks.len(),
            reports = run.reports.len(),
            need_report = run.need_report,
            "Workflow finished"
        );
        run
    }
}

async fn run_guarded(
    task: &mut dyn Task,
    name: &str,
    timeout: Option<Duration>,
) -> crate::errors::Result<String> {
    let guarded = AssertUnwindSafe(task.run()).catch_unwind();

    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, guarded)
            .await
            .map_err(|_| WatchdogError::task(name, format!("timed out after {}s", limit.as_secs_f64())))?,
        None => guarded.await,
    };

    outcome.unwrap_or_else(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(WatchdogError::task(name, format!("panicked: {message}")))
    })
}
