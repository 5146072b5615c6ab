//! End-to-end delivery check against the DX platform.
//!
//! A check runs five dependent stages in order:
//!
//! 1. **login**: issue a token and attach it to the session
//! 2. **commit trigger**: rewrite `deploy.yaml` and derive the commit id
//! 3. **build**: the newest pipeline job belongs to the commit and succeeds
//! 4. **artifact**: a release tagged with the commit id was published
//! 5. **deploy**: the instance deployed that release
//!
//! Every stage returns a [`StageOutcome`]; nothing a stage does can abort
//! the run. The readiness flags are derived from the outcomes afterwards.

mod api;
mod models;
mod stage;

pub use api::{HttpPlatformApi, PlatformApi};
#[cfg(test)]
pub use api::MockPlatformApi;
pub use models::{
    AccessToken, ActionDiff, ArtifactRelease, DeployAction, FileUpsert, JobId, MicroService,
    PipelineJob, derive_commit_id,
};
pub use stage::{CheckRun, StageName, StageOutcome, StageStatus, readiness};

use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{CheckerConfig, Credentials};
use crate::policy::{poll_until, PollOutcome, PollStep, Sleeper};

/// Prefix of every error line the checker records.
pub const ERROR_PREFIX: &str = "checker error";

const STATUS_SUCCEED: &str = "succeed";
const STATUS_RUNNING: &str = "running";
const STATUS_USER_FAILED: &str = "user_failed";

type StageResult<T = ()> = std::result::Result<T, String>;

/// Terminal state of a polled job or deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Finished successfully.
    Succeeded,
    /// Finished with the given status.
    Failed(String),
}

/// Maps a pipeline job status to a poll step.
///
/// `succeed` passes, `running` keeps polling, anything else fails.
#[must_use]
pub fn classify_job_status(status: &str) -> PollStep<Verdict> {
    match status {
        STATUS_SUCCEED => PollStep::Done(Verdict::Succeeded),
        STATUS_RUNNING => PollStep::Pending,
        other => PollStep::Done(Verdict::Failed(other.to_string())),
    }
}

/// Maps the newest deployment action to a poll step.
///
/// Only an action releasing `commit_id` can resolve the poll: `succeed`
/// passes, `user_failed` fails, anything else keeps polling. Actions without
/// a release name never reach here; the deploy probe rejects them.
#[must_use]
pub fn classify_deploy_action(action: &DeployAction, commit_id: &str) -> PollStep<Verdict> {
    if action.release_name() != Some(commit_id) {
        return PollStep::Pending;
    }
    match action.status.as_str() {
        STATUS_SUCCEED => PollStep::Done(Verdict::Succeeded),
        STATUS_USER_FAILED => PollStep::Done(Verdict::Failed(STATUS_USER_FAILED.to_string())),
        _ => PollStep::Pending,
    }
}

/// Runs the delivery check.
#[derive(Debug)]
pub struct DeployChecker<A> {
    api: A,
    credentials: Credentials,
    config: CheckerConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl<A: PlatformApi> DeployChecker<A> {
    /// Creates a checker.
    pub fn new(
        api: A,
        credentials: Credentials,
        config: CheckerConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            api,
            credentials,
            config,
            sleeper,
        }
    }

    /// Runs every stage and returns the collected outcomes.
    ///
    /// Never fails: errors and panics inside a stage become a failed
    /// outcome for that stage and the run continues.
    pub async fn check(&self) -> CheckRun {
        let run_id = Uuid::new_v4();
        let span = info_span!("check", %run_id);

        async {
            let (login, _) = self.run_stage(StageName::Login, self.login()).await;
            let (commit, commit_id) = self
                .run_stage(StageName::CommitTrigger, self.commit())
                .await;
            let commit_ref = commit_id.as_deref();

            let (build, _) = self
                .run_stage(StageName::Build, self.check_build(commit_ref))
                .await;

            let artifact = if build.is_success() {
                self.run_stage(StageName::Artifact, self.check_artifact(commit_ref))
                    .await
                    .0
            } else {
                StageOutcome::skipped(StageName::Artifact, "build did not pass")
            };

            let (deploy, _) = self
                .run_stage(StageName::Deploy, self.check_deploy(commit_ref))
                .await;

            let run = CheckRun {
                run_id,
                outcomes: vec![login, commit, build, artifact, deploy],
                commit_id,
            };

            let flags = run.flags();
            info!(
                login = flags.login,
                commit_trigger = flags.commit_trigger,
                build = flags.build,
                auto_deploy = flags.auto_deploy,
                deploy = flags.deploy,
                errors = run.errors().len(),
                "Check finished"
            );
            run
        }
        .instrument(span)
        .await
    }

    async fn run_stage<T, F>(&self, stage: StageName, fut: F) -> (StageOutcome, Option<T>)
    where
        F: Future<Output = StageResult<T>>,
    {
        let started_at = Utc::now();

        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(value)) => {
                info!(stage = %stage, "Stage passed");
                (StageOutcome::passed(stage, started_at), Some(value))
            }
            Ok(Err(error)) => {
                warn!(stage = %stage, error = %error, "Stage failed");
                (StageOutcome::failed(stage, started_at, error), None)
            }
            Err(panic) => {
                let error = format!(
                    "{ERROR_PREFIX}: {stage} stage panicked: {}",
                    panic_message(panic.as_ref())
                );
                warn!(stage = %stage, error = %error, "Stage panicked");
                (StageOutcome::failed(stage, started_at, error), None)
            }
        }
    }

    async fn login(&self) -> StageResult {
        let response = self
            .api
            .issue_token(&self.credentials.username, &self.credentials.password)
            .await
            .map_err(|e| format!("{ERROR_PREFIX}: {e}"))?;

        let token = response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| format!("{ERROR_PREFIX}: login error no access_token in response"))?;

        self.api
            .authorize(&token, &self.credentials.namespace)
            .map_err(|e| format!("{ERROR_PREFIX}: {e}"))
    }

    async fn commit(&self) -> StageResult<String> {
        // The trailing space guarantees the upsert is a real change.
        let content = format!("{} ", self.config.manifest);
        let upsert = self
            .api
            .upsert_manifest(&content)
            .await
            .map_err(|e| format!("{ERROR_PREFIX}: commit error {e}"))?;

        let file_path = upsert.file_path.unwrap_or_default();
        let commit_id = derive_commit_id(&file_path).ok_or_else(|| {
            format!("{ERROR_PREFIX}: commit error unexpected file_path {file_path:?}")
        })?;
        info!(commit_id = %commit_id, "Manifest committed");
        Ok(commit_id)
    }

    async fn check_build(&self, commit_id: Option<&str>) -> StageResult {
        let build_error = |e: crate::errors::WatchdogError| format!("{ERROR_PREFIX}: build error {e}");

        self.sleeper.sleep(self.config.settle_delay()).await;
        let job = self
            .api
            .pipeline_jobs()
            .await
            .map_err(build_error)?
            .into_iter()
            .next()
            .ok_or_else(|| format!("{ERROR_PREFIX}: build error pipeline has no jobs"))?;

        if let (Some(got), Some(expected)) = (job.commit_marker(), commit_id) {
            if got != expected {
                return Err(format!(
                    "{ERROR_PREFIX}: pipeline commit_id error expected {expected}, got {got}"
                ));
            }
        }

        if job.status == STATUS_SUCCEED {
            return Ok(());
        }

        let job_id = job.id.to_string();
        let api = &self.api;
        let outcome = poll_until(&self.config.build_poll, self.sleeper.as_ref(), |_| {
            let job_id = job_id.as_str();
            async move { api.job_status(job_id).await.map(|status| classify_job_status(&status)) }
        })
        .await
        .map_err(build_error)?;

        match outcome {
            PollOutcome::Resolved {
                value: Verdict::Succeeded,
                ..
            } => Ok(()),
            PollOutcome::Resolved {
                value: Verdict::Failed(status),
                ..
            } => Err(format!(
                "{ERROR_PREFIX}: build error job {job_id} finished with status {status}"
            )),
            PollOutcome::Exhausted { attempts } => Err(format!(
                "{ERROR_PREFIX}: build error job {job_id} still running after {attempts} polls"
            )),
        }
    }

    async fn check_artifact(&self, commit_id: Option<&str>) -> StageResult {
        let expected = commit_id
            .ok_or_else(|| format!("{ERROR_PREFIX}: artifact error no commit id to look for"))?;

        self.sleeper.sleep(self.config.settle_delay()).await;
        let releases = self
            .api
            .artifact_releases()
            .await
            .map_err(|e| format!("{ERROR_PREFIX}: artifact error {e}"))?;

        if releases
            .iter()
            .any(|release| release.tag.as_deref() == Some(expected))
        {
            Ok(())
        } else {
            Err(format!("{ERROR_PREFIX}: artifact error expected {expected}"))
        }
    }

    async fn check_deploy(&self, commit_id: Option<&str>) -> StageResult {
        let expected = commit_id
            .ok_or_else(|| format!("{ERROR_PREFIX}: deploy error no commit id to wait for"))?;

        let api = &self.api;
        let outcome = poll_until(&self.config.deploy_poll, self.sleeper.as_ref(), |_| async move {
            let actions = api.deploy_actions().await?;
            let latest = actions.first().ok_or_else(|| {
                crate::errors::WatchdogError::decode("instance has no deployment actions")
            })?;
            if latest.release_name().is_none() {
                return Err(crate::errors::WatchdogError::decode(
                    "newest deployment action names no released micro service",
                ));
            }
            Ok::<_, crate::errors::WatchdogError>(classify_deploy_action(latest, expected))
        })
        .await
        .map_err(|e| format!("{ERROR_PREFIX}: deploy error {e}"))?;

        match outcome {
            PollOutcome::Resolved {
                value: Verdict::Succeeded,
                ..
            } => Ok(()),
            PollOutcome::Resolved {
                value: Verdict::Failed(status),
                ..
            } => Err(format!("{ERROR_PREFIX}: deploy error {status}")),
            PollOutcome::Exhausted { .. } => Err(format!(
                "{ERROR_PREFIX}: none deploy error expect artifact_version={expected}"
            )),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod checker_tests;
