//! Wires the workflow to the notifier.

use tracing::{info, info_span, Instrument};

use crate::config::WatchdogConfig;
use crate::errors::Result;
use crate::notify::{Notifier, WebhookNotifier};
use crate::workflow::{DeployCheckTask, Workflow, WorkflowRun};

/// One scheduled watchdog invocation.
pub struct WatchDog {
    workflow: Workflow,
    notifier: Box<dyn Notifier>,
}

impl std::fmt::Debug for WatchDog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchDog")
            .field("workflow", &self.workflow)
            .finish_non_exhaustive()
    }
}

impl WatchDog {
    /// Creates a watchdog from parts.
    pub fn new(workflow: Workflow, notifier: Box<dyn Notifier>) -> Self {
        Self { workflow, notifier }
    }

    /// Builds the production watchdog: the DX check task and the WeChat
    /// webhook.
    pub fn from_config(config: &WatchdogConfig) -> Result<Self> {
        let notifier = WebhookNotifier::new(&config.notifier, &config.http)?;

        let mut workflow = Workflow::new().with_task_timeout(config.task_timeout());
        workflow.register_task(Box::new(DeployCheckTask::from_config(config)));

        Ok(Self::new(workflow, Box::new(notifier)))
    }

    /// Runs the workflow and sends the joined reports if any task asked
    /// for it.
    ///
    /// Only a notifier failure is an error; failed checks are reported, not
    /// returned.
    pub async fn run(&mut self) -> Result<WorkflowRun> {
        let run = self
            .workflow
            .run()
            .instrument(info_span!("watchdog"))
            .await;

        if run.need_report {
            self.notifier.send_markdown(&run.message()).await?;
        } else {
            info!(reports = run.reports.len(), "Nothing to report");
        }
        Ok(run)
    }
}
