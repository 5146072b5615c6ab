//! # Watchdog
//!
//! Scheduled end-to-end health check for the DX deployment platform.
//!
//! One run walks the whole delivery chain the way a developer would:
//!
//! - **Login**: issue an access token for the watchdog account
//! - **Commit trigger**: rewrite `deploy.yaml` so the platform builds it
//! - **Build**: wait for the pipeline job of that commit to succeed
//! - **Artifact**: find the release tagged with the commit
//! - **Deploy**: wait for the instance to roll the release out
//!
//! The outcome is rendered as a markdown report and posted to a WeChat
//! Work group robot.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use watchdog::prelude::*;
//!
//! let config = WatchdogConfig::from_env()?;
//! let mut watchdog = WatchDog::from_config(&config)?;
//! let run = watchdog.run().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod checker;
pub mod config;
pub mod errors;
pub mod http;
pub mod notify;
pub mod policy;
pub mod report;
pub mod watchdog;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::checker::{
        CheckRun, DeployChecker, HttpPlatformApi, PlatformApi, StageName, StageOutcome,
        StageStatus,
    };
    pub use crate::config::{EnvironmentProvider, WatchdogConfig};
    pub use crate::errors::{Result, WatchdogError};
    pub use crate::http::{HttpClient, HttpOptions};
    pub use crate::notify::{Notifier, WebhookNotifier};
    pub use crate::policy::{PollPolicy, Sleeper, TokioSleeper};
    pub use crate::report::{ReadinessFlags, Report, ReportLocale};
    pub use crate::watchdog::WatchDog;
    pub use crate::workflow::{DeployCheckTask, HealthPolicy, Task, Workflow, WorkflowRun};
}
