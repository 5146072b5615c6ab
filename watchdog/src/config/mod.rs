//! Runtime configuration.
//!
//! Everything is read once at startup from `WATCHDOG_*` environment
//! variables and never changes afterwards.

mod env;

pub use env::{EnvironmentProvider, MockEnvironment, SystemEnvironment};

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{Result, WatchdogError};
use crate::http::HttpOptions;
use crate::policy::PollPolicy;
use crate::report::ReportLocale;
use crate::workflow::HealthPolicy;

/// Deployment manifest pushed by the commit-trigger stage.
pub const DEFAULT_MANIFEST: &str = r#"apiVersion: apps/v1beta1
kind: Deployment
metadata:
  name: {{ instance_name }}-flasky-ci
  labels:
    app: {{ instance_name }}-flasky-ci
spec:
  hostAliases:
  - ip: "10.18.1.56"
    hostnames:
    - "registry.dx.io"
  selector:
    matchLabels:
      app: {{ instance_name }}-flasky-ci
  template:
    metadata:
      name: {{ instance_name }}-flasky-ci
      labels:
        app: {{ instance_name }}-flasky-ci
    spec:
      containers:
      - name: {{ instance_name }}-flasky-ci
        image: {{ flasky-ci.image }}
        ports:
        - containerPort: 5000 # 容器端口
        resources:
          limits:
            cpu: "1" # cpu 限制
            memory: "1000Mi" # 内存限制
          requests:
            cpu: "1" # cpu 预留（与限制值一致）
            memory: "1000Mi" # 内存预留（与限制值一致）
---
apiVersion: v1
kind: Service
metadata:
  name: {{ instance_name }}-flasky-ci
spec:
  type: NodePort
  ports:
  - port: 5000 # 服务端口
  selector:
    app: {{ instance_name }}-flasky-ci
"#;

/// Login credentials and tenant for the DX platform.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Username or email.
    pub username: String,
    /// Password.
    pub password: String,
    /// Value of the `UserNameSpace` header sent after login.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("namespace", &self.namespace)
            .finish()
    }
}

fn default_namespace() -> String {
    "owen".to_string()
}

/// Identifiers of the upstream resources the checker exercises.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformResources {
    /// Project whose `deploy.yaml` is rewritten to trigger a build.
    #[serde(default = "default_project_id")]
    pub project_id: String,
    /// Pipeline that builds the project.
    #[serde(default = "default_pipeline_id")]
    pub pipeline_id: String,
    /// Artifact repository the pipeline publishes to.
    #[serde(default = "default_artifact_id")]
    pub artifact_id: String,
    /// Instance that auto-deploys new artifacts.
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
}

fn default_project_id() -> String {
    "23eff061-d909-4fcb-9ee5-3a1d59403f10".to_string()
}

fn default_pipeline_id() -> String {
    "2e1ab1c1-874b-437a-8198-434276679b2d".to_string()
}

fn default_artifact_id() -> String {
    "694690d0-1875-4e27-a5d2-39b7e7ae80ee".to_string()
}

fn default_instance_id() -> String {
    "57a5dc10-3321-4fe5-a2e3-46638de83ce3".to_string()
}

impl Default for PlatformResources {
    fn default() -> Self {
        Self {
            project_id: default_project_id(),
            pipeline_id: default_pipeline_id(),
            artifact_id: default_artifact_id(),
            instance_id: default_instance_id(),
        }
    }
}

/// Timing of the checker stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Wait before the build and artifact fetches, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Polling of a running pipeline job.
    #[serde(default = "default_build_poll")]
    pub build_poll: PollPolicy,
    /// Polling of the deployment action list.
    #[serde(default = "default_deploy_poll")]
    pub deploy_poll: PollPolicy,
    /// Manifest pushed by the commit-trigger stage.
    #[serde(default = "default_manifest")]
    pub manifest: String,
}

fn default_settle_delay_ms() -> u64 {
    10_000
}

fn default_build_poll() -> PollPolicy {
    PollPolicy::fixed(20, Duration::from_secs(30))
}

fn default_deploy_poll() -> PollPolicy {
    PollPolicy::fixed(200, Duration::from_secs(3))
}

fn default_manifest() -> String {
    DEFAULT_MANIFEST.to_string()
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            build_poll: default_build_poll(),
            deploy_poll: default_deploy_poll(),
            manifest: default_manifest(),
        }
    }
}

impl CheckerConfig {
    /// Settle delay as a `Duration`.
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Chat webhook settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Webhook base URL.
    #[serde(default = "default_webhook_base_url")]
    pub base_url: String,
    /// Webhook key passed as the `key` query parameter.
    pub key: String,
}

impl std::fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierConfig")
            .field("base_url", &self.base_url)
            .field("key", &"***")
            .finish()
    }
}

fn default_webhook_base_url() -> String {
    "https://qyapi.weixin.qq.com".to_string()
}

/// Top-level watchdog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// DX platform base URL.
    pub base_url: String,
    /// Login credentials.
    pub credentials: Credentials,
    /// Upstream resource identifiers.
    #[serde(default)]
    pub resources: PlatformResources,
    /// Stage timing.
    #[serde(default)]
    pub checker: CheckerConfig,
    /// Chat webhook.
    pub notifier: NotifierConfig,
    /// HTTP transport options.
    #[serde(default)]
    pub http: HttpOptions,
    /// When a finished check asks to be reported.
    #[serde(default)]
    pub health_policy: HealthPolicy,
    /// Report language.
    #[serde(default)]
    pub locale: ReportLocale,
    /// Upper bound on one task run, in seconds.
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,
}

impl WatchdogConfig {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_provider(&SystemEnvironment)
    }

    /// Loads the configuration from an environment provider.
    ///
    /// Required: `WATCHDOG_DX_BASE_URL`, `WATCHDOG_USERNAME`,
    /// `WATCHDOG_PASSWORD`, `WATCHDOG_WECHAT_KEY`.
    pub fn from_provider(env: &dyn EnvironmentProvider) -> Result<Self> {
        let defaults = PlatformResources::default();
        let mut checker = CheckerConfig::default();
        if let Some(ms) = parse_var::<u64>(env, "WATCHDOG_SETTLE_DELAY_MS")? {
            checker.settle_delay_ms = ms;
        }
        if let Some(n) = parse_var::<usize>(env, "WATCHDOG_BUILD_POLL_ATTEMPTS")? {
            checker.build_poll.max_attempts = n;
        }
        if let Some(ms) = parse_var::<u64>(env, "WATCHDOG_BUILD_POLL_INTERVAL_MS")? {
            checker.build_poll.interval_ms = ms;
        }
        if let Some(n) = parse_var::<usize>(env, "WATCHDOG_DEPLOY_POLL_ATTEMPTS")? {
            checker.deploy_poll.max_attempts = n;
        }
        if let Some(ms) = parse_var::<u64>(env, "WATCHDOG_DEPLOY_POLL_INTERVAL_MS")? {
            checker.deploy_poll.interval_ms = ms;
        }

        let mut http = HttpOptions::default();
        if let Some(verify) = parse_var::<bool>(env, "WATCHDOG_VERIFY_TLS")? {
            http.verify_tls = verify;
        }
        if let Some(secs) = parse_var::<u64>(env, "WATCHDOG_HTTP_TIMEOUT_SECS")? {
            http.timeout_secs = secs;
        }

        Ok(Self {
            base_url: required(env, "WATCHDOG_DX_BASE_URL")?,
            credentials: Credentials {
                username: required(env, "WATCHDOG_USERNAME")?,
                password: required(env, "WATCHDOG_PASSWORD")?,
                namespace: env
                    .var("WATCHDOG_NAMESPACE")
                    .unwrap_or_else(default_namespace),
            },
            resources: PlatformResources {
                project_id: env.var("WATCHDOG_PROJECT_ID").unwrap_or(defaults.project_id),
                pipeline_id: env.var("WATCHDOG_PIPELINE_ID").unwrap_or(defaults.pipeline_id),
                artifact_id: env.var("WATCHDOG_ARTIFACT_ID").unwrap_or(defaults.artifact_id),
                instance_id: env.var("WATCHDOG_INSTANCE_ID").unwrap_or(defaults.instance_id),
            },
            checker,
            notifier: NotifierConfig {
                base_url: env
                    .var("WATCHDOG_WECHAT_BASE_URL")
                    .unwrap_or_else(default_webhook_base_url),
                key: required(env, "WATCHDOG_WECHAT_KEY")?,
            },
            http,
            health_policy: parse_var(env, "WATCHDOG_HEALTH_POLICY")?.unwrap_or_default(),
            locale: parse_var(env, "WATCHDOG_REPORT_LOCALE")?.unwrap_or_default(),
            task_timeout_secs: parse_var(env, "WATCHDOG_TASK_TIMEOUT_SECS")?,
        })
    }

    /// Task timeout as a `Duration`.
    #[must_use]
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }
}

fn required(env: &dyn EnvironmentProvider, key: &str) -> Result<String> {
    match env.var(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(WatchdogError::config(format!("{key} is not set"))),
    }
}

fn parse_var<T>(env: &dyn EnvironmentProvider, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env.var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| WatchdogError::config(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}
