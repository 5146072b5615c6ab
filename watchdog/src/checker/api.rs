//! The upstream calls the checker depends on.

use async_trait::async_trait;
use tracing::debug;

use super::models::{
    AccessToken, ActionList, ArtifactRelease, DeployAction, FileContent, FileUpsert, JobDetail,
    JobList, LoginRequest, PipelineJob, ReleasePage,
};
use crate::config::PlatformResources;
use crate::errors::Result;
use crate::http::{HttpClient, HttpOptions};

/// DX platform operations used by the checker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Issues an access token for the given credentials.
    async fn issue_token(&self, username: &str, password: &str) -> Result<AccessToken>;

    /// Attaches the token and tenant headers to every later call.
    fn authorize(&self, token: &str, namespace: &str) -> Result<()>;

    /// Rewrites the deployment manifest of the watched project.
    async fn upsert_manifest(&self, content: &str) -> Result<FileUpsert>;

    /// Lists the most recent pipeline jobs, newest first.
    async fn pipeline_jobs(&self) -> Result<Vec<PipelineJob>>;

    /// Fetches the status of a single pipeline job.
    async fn job_status(&self, job_id: &str) -> Result<String>;

    /// Lists the most recent artifact releases, newest first.
    async fn artifact_releases(&self) -> Result<Vec<ArtifactRelease>>;

    /// Lists the most recent deployment actions, newest first.
    async fn deploy_actions(&self) -> Result<Vec<DeployAction>>;
}

/// [`PlatformApi`] over HTTP.
#[derive(Debug)]
pub struct HttpPlatformApi {
    client: HttpClient,
    resources: PlatformResources,
}

impl HttpPlatformApi {
    /// Creates an API client for `base_url`.
    pub fn new(base_url: &str, resources: PlatformResources, options: &HttpOptions) -> Result<Self> {
        Ok(Self {
            client: HttpClient::with_options(base_url, &[], options)?,
            resources,
        })
    }

    /// Returns the underlying HTTP session.
    #[must_use]
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    fn jobs_path(&self) -> String {
        format!("/api/keel/v1/pipelines/{}/jobs", self.resources.pipeline_id)
    }
}

#[async_trait]
impl PlatformApi for HttpPlatformApi {
    async fn issue_token(&self, username: &str, password: &str) -> Result<AccessToken> {
        let body = LoginRequest {
            username_or_email: username,
            password,
        };
        let response = self.client.post_json("/api/crew/v2/access-token", &body).await?;
        HttpClient::json_or_error(response).await
    }

    fn authorize(&self, token: &str, namespace: &str) -> Result<()> {
        self.client.set_header("Authorization", token)?;
        self.client.set_header("UserNameSpace", namespace)?;
        debug!(namespace = %namespace, "Session authorized");
        Ok(())
    }

    async fn upsert_manifest(&self, content: &str) -> Result<FileUpsert> {
        let path = format!(
            "/api/keel/v1/projects/{}/file/content?ref=master&path=deploy.yaml",
            self.resources.project_id
        );
        let response = self.client.put_json(&path, &FileContent { file: content }).await?;
        HttpClient::json_or_error(response).await
    }

    async fn pipeline_jobs(&self) -> Result<Vec<PipelineJob>> {
        let path = format!("{}?offset=0&limit=10", self.jobs_path());
        let list: JobList = self.client.get_json(&path).await?;
        Ok(list.jobs)
    }

    async fn job_status(&self, job_id: &str) -> Result<String> {
        let path = format!("{}/{job_id}", self.jobs_path());
        let detail: JobDetail = self.client.get_json(&path).await?;
        Ok(detail.status)
    }

    async fn artifact_releases(&self) -> Result<Vec<ArtifactRelease>> {
        let path = format!(
            "/api/cargo/artifact/{}/release?page=1&size=10",
            self.resources.artifact_id
        );
        let page: ReleasePage = self.client.get_json(&path).await?;
        Ok(page.result)
    }

    async fn deploy_actions(&self) -> Result<Vec<DeployAction>> {
        let path = format!(
            "/api/sail/v2/instances/{}/actions?offset=0&limit=10&size=-1",
            self.resources.instance_id
        );
        let list: ActionList = self.client.get_json(&path).await?;
        Ok(list.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_sets_session_headers() {
        let api = HttpPlatformApi::new(
            "https://dx.example.com",
            PlatformResources::default(),
            &HttpOptions::default(),
        )
        .unwrap();

        api.authorize("tok-123", "owen").unwrap();

        assert_eq!(api.client().header("authorization").as_deref(), Some("tok-123"));
        assert_eq!(api.client().header("usernamespace").as_deref(), Some("owen"));
    }

    #[test]
    fn test_jobs_path_uses_pipeline_id() {
        let resources = PlatformResources {
            pipeline_id: "pipe-1".to_string(),
            ..PlatformResources::default()
        };
        let api =
            HttpPlatformApi::new("https://dx.example.com", resources, &HttpOptions::default())
                .unwrap();
        assert_eq!(api.jobs_path(), "/api/keel/v1/pipelines/pipe-1/jobs");
    }
}
