//! Wire models for the DX platform endpoints the checker calls.
//!
//! Only the fields the checker reads are modelled; everything else in the
//! upstream payloads is ignored.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Body of the token issuance call.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    /// Username or email.
    pub username_or_email: &'a str,
    /// Password.
    pub password: &'a str,
}

/// Token issuance response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccessToken {
    /// Token to send as the `Authorization` header.
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Body of the file content upsert call.
#[derive(Debug, Clone, Serialize)]
pub struct FileContent<'a> {
    /// New file content.
    pub file: &'a str,
}

/// File content upsert response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FileUpsert {
    /// Path of the stored blob, ending in the commit hash.
    #[serde(default)]
    pub file_path: Option<String>,
}

/// Job identifiers come back as numbers or strings depending on the endpoint version.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum JobId {
    /// Numeric id.
    Number(u64),
    /// String id.
    Text(String),
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Pipeline job list response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobList {
    /// Jobs, newest first.
    #[serde(default)]
    pub jobs: Vec<PipelineJob>,
}

/// A pipeline job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineJob {
    /// Job id.
    pub id: JobId,
    /// Display id, `"<commit id> <message>"` for commit-triggered jobs.
    #[serde(default)]
    pub show_id: Option<String>,
    /// Job status (`succeed`, `running`, `failed`, ...).
    #[serde(default)]
    pub status: String,
}

impl PipelineJob {
    /// Commit id the job was triggered by: the first space-separated token of `show_id`.
    #[must_use]
    pub fn commit_marker(&self) -> Option<&str> {
        self.show_id
            .as_deref()
            .filter(|show_id| !show_id.is_empty())
            .and_then(|show_id| show_id.split(' ').next())
    }
}

/// Single pipeline job response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobDetail {
    /// Job status.
    #[serde(default)]
    pub status: String,
}

/// Artifact release page response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReleasePage {
    /// Releases, newest first.
    #[serde(default)]
    pub result: Vec<ArtifactRelease>,
}

/// A published artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ArtifactRelease {
    /// Image tag.
    #[serde(default)]
    pub tag: Option<String>,
}

impl ArtifactRelease {
    /// Creates a release with a tag.
    #[must_use]
    pub fn tagged(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
        }
    }
}

/// Deployment action list response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionList {
    /// Actions, newest first.
    #[serde(default)]
    pub results: Vec<DeployAction>,
}

/// A deployment action on an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeployAction {
    /// Action status (`succeed`, `user_failed`, ...).
    #[serde(default)]
    pub status: String,
    /// What the action changed.
    #[serde(default)]
    pub diff: Option<ActionDiff>,
}

impl DeployAction {
    /// Creates an action releasing `release_name` with `status`.
    #[must_use]
    pub fn releasing(release_name: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            diff: Some(ActionDiff {
                micro_services: vec![MicroService {
                    release_name: Some(release_name.into()),
                }],
            }),
        }
    }

    /// Release name of the first micro service in the diff.
    #[must_use]
    pub fn release_name(&self) -> Option<&str> {
        self.diff
            .as_ref()
            .and_then(|diff| diff.micro_services.first())
            .and_then(|service| service.release_name.as_deref())
    }
}

/// Diff of a deployment action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ActionDiff {
    /// Micro services touched by the action.
    #[serde(default)]
    pub micro_services: Vec<MicroService>,
}

/// A micro service release inside an action diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MicroService {
    /// Release (artifact version) name.
    #[serde(default)]
    pub release_name: Option<String>,
}

/// Derives the commit id from an upserted file path.
///
/// `".../abcdef1234567.yaml"` becomes `"master-abcdef1"`.
#[must_use]
pub fn derive_commit_id(file_path: &str) -> Option<String> {
    let segment = file_path.rsplit('/').next()?;
    if segment.is_empty() {
        return None;
    }
    let short: String = segment.chars().take(7).collect();
    Some(format!("master-{short}"))
}
