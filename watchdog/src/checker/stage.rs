//! Stage outcomes and readiness gating.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::report::{ReadinessFlags, Report};

/// The checker stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Token issuance.
    Login,
    /// Manifest rewrite that should trigger a build.
    CommitTrigger,
    /// Pipeline job for the commit.
    Build,
    /// Published artifact for the commit.
    Artifact,
    /// Automatic deployment of the artifact.
    Deploy,
}

impl StageName {
    /// All stages in execution order.
    pub const ALL: [Self; 5] = [
        Self::Login,
        Self::CommitTrigger,
        Self::Build,
        Self::Artifact,
        Self::Deploy,
    ];
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => write!(f, "login"),
            Self::CommitTrigger => write!(f, "commit_trigger"),
            Self::Build => write!(f, "build"),
            Self::Artifact => write!(f, "artifact"),
            Self::Deploy => write!(f, "deploy"),
        }
    }
}

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// The stage verified its part of the chain.
    Passed,
    /// The stage ran and found a problem.
    Failed,
    /// The stage did not run because an earlier stage failed.
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Stage name.
    pub stage: StageName,
    /// Stage status.
    pub status: StageStatus,
    /// Error line for failed stages, skip reason for skipped ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub ended_at: DateTime<Utc>,
}

impl StageOutcome {
    /// Creates a passed outcome.
    #[must_use]
    pub fn passed(stage: StageName, started_at: DateTime<Utc>) -> Self {
        Self {
            stage,
            status: StageStatus::Passed,
            detail: None,
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(stage: StageName, started_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            detail: Some(error.into()),
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// Creates a skipped outcome.
    #[must_use]
    pub fn skipped(stage: StageName, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            stage,
            status: StageStatus::Skipped,
            detail: Some(reason.into()),
            started_at: now,
            ended_at: now,
        }
    }

    /// Returns true if the stage passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Passed
    }

    /// Error line, if the stage failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self.status {
            StageStatus::Failed => self.detail.as_deref(),
            StageStatus::Passed | StageStatus::Skipped => None,
        }
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

/// Derives the readiness flags from stage outcomes.
///
/// login = login; commit trigger = commit AND build; build = build AND
/// artifact; auto-deploy = deploy = deploy. Missing stages count as not
/// passed.
#[must_use]
pub fn readiness(outcomes: &[StageOutcome]) -> ReadinessFlags {
    let passed = |stage: StageName| {
        outcomes
            .iter()
            .any(|outcome| outcome.stage == stage && outcome.is_success())
    };

    ReadinessFlags {
        login: passed(StageName::Login),
        commit_trigger: passed(StageName::CommitTrigger) && passed(StageName::Build),
        build: passed(StageName::Build) && passed(StageName::Artifact),
        auto_deploy: passed(StageName::Deploy),
        deploy: passed(StageName::Deploy),
    }
}

/// Everything one check run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRun {
    /// Run id, also attached to the log span.
    pub run_id: Uuid,
    /// Stage outcomes in execution order.
    pub outcomes: Vec<StageOutcome>,
    /// Commit id derived by the commit-trigger stage.
    pub commit_id: Option<String>,
}

impl CheckRun {
    /// Outcome of `stage`, if it was recorded.
    #[must_use]
    pub fn outcome(&self, stage: StageName) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|outcome| outcome.stage == stage)
    }

    /// Readiness flags for this run.
    #[must_use]
    pub fn flags(&self) -> ReadinessFlags {
        readiness(&self.outcomes)
    }

    /// Error lines in stage order.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(StageOutcome::error)
            .map(str::to_string)
            .collect()
    }

    /// Returns true when every readiness flag is set.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.flags().all_ready()
    }

    /// Converts the run into a renderable report.
    #[must_use]
    pub fn report(&self) -> Report {
        Report::new(self.flags(), self.errors())
    }
}
