//! Units of work the workflow runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::checker::{DeployChecker, HttpPlatformApi, PlatformApi};
use crate::config::{CheckerConfig, Credentials, WatchdogConfig};
use crate::errors::Result;
use crate::policy::{Sleeper, TokioSleeper};
use crate::report::ReportLocale;

/// A unit of work producing a report.
#[async_trait]
pub trait Task: Send {
    /// Name used in logs and in synthetic error reports.
    fn name(&self) -> &str;

    /// Runs the task and returns its report text.
    async fn run(&mut self) -> Result<String>;

    /// Whether the last run asked for its report to be sent.
    fn needs_report(&self) -> bool;
}

/// When a finished deploy check asks to be reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthPolicy {
    /// Report after every run.
    #[default]
    AlwaysReport,
    /// Report only when some readiness flag is down.
    OnFailure,
}

impl HealthPolicy {
    /// Returns true if a run with the given health should be reported.
    #[must_use]
    pub fn should_report(self, healthy: bool) -> bool {
        match self {
            Self::AlwaysReport => true,
            Self::OnFailure => !healthy,
        }
    }
}

impl fmt::Display for HealthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlwaysReport => write!(f, "always"),
            Self::OnFailure => write!(f, "on_failure"),
        }
    }
}

impl FromStr for HealthPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "always" | "always_report" => Ok(Self::AlwaysReport),
            "on_failure" | "failure" => Ok(Self::OnFailure),
            other => Err(format!("unknown health policy: {other}")),
        }
    }
}

/// Builds the platform API for one check run.
pub type ApiFactory<A> = Box<dyn Fn() -> Result<A> + Send + Sync>;

/// Runs the DX delivery check and renders its report.
///
/// Every run gets a fresh API session and checker, so no token or commit
/// id leaks from one run into the next.
pub struct DeployCheckTask<A> {
    factory: ApiFactory<A>,
    credentials: Credentials,
    checker: CheckerConfig,
    sleeper: Arc<dyn Sleeper>,
    policy: HealthPolicy,
    locale: ReportLocale,
    needs_report: bool,
}

impl<A> fmt::Debug for DeployCheckTask<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployCheckTask")
            .field("credentials", &self.credentials)
            .field("policy", &self.policy)
            .field("locale", &self.locale)
            .field("needs_report", &self.needs_report)
            .finish_non_exhaustive()
    }
}

impl DeployCheckTask<HttpPlatformApi> {
    /// Creates the task against the configured DX platform.
    #[must_use]
    pub fn from_config(config: &WatchdogConfig) -> Self {
        let base_url = config.base_url.clone();
        let resources = config.resources.clone();
        let http = config.http.clone();
        let factory: ApiFactory<HttpPlatformApi> =
            Box::new(move || HttpPlatformApi::new(&base_url, resources.clone(), &http));

        Self::new(
            factory,
            config.credentials.clone(),
            config.checker.clone(),
            Arc::new(TokioSleeper),
        )
        .with_policy(config.health_policy)
        .with_locale(config.locale)
    }
}

impl<A: PlatformApi + 'static> DeployCheckTask<A> {
    /// Creates a task with the default policy and locale.
    pub fn new(
        factory: ApiFactory<A>,
        credentials: Credentials,
        checker: CheckerConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            factory,
            credentials,
            checker,
            sleeper,
            policy: HealthPolicy::default(),
            locale: ReportLocale::default(),
            needs_report: false,
        }
    }

    /// Sets the health policy.
    #[must_use]
    pub fn with_policy(mut self, policy: HealthPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the report locale.
    #[must_use]
    pub fn with_locale(mut self, locale: ReportLocale) -> Self {
        self.locale = locale;
        self
    }
}

#[async_trait]
impl<A: PlatformApi + 'static> Task for DeployCheckTask<A> {
    fn name(&self) -> &str {
        "dx_check"
    }

    async fn run(&mut self) -> Result<String> {
        self.needs_report = false;
        let api = (self.factory)()?;
        let checker = DeployChecker::new(
            api,
            self.credentials.clone(),
            self.checker.clone(),
            Arc::clone(&self.sleeper),
        );

        let run = checker.check().await;
        let healthy = run.is_healthy();
        self.needs_report = self.policy.should_report(healthy);
        info!(
            healthy,
            policy = %self.policy,
            needs_report = self.needs_report,
            "Deploy check finished"
        );

        Ok(run.report().render(self.locale))
    }

    fn needs_report(&self) -> bool {
        self.needs_report
    }
}
