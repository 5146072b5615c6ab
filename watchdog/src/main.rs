use anyhow::Context;
use tracing::{error, info};

use watchdog::config::WatchdogConfig;
use watchdog::watchdog::WatchDog;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("watchdog=info".parse()?),
        )
        .init();

    let config = WatchdogConfig::from_env().context("loading configuration")?;
    info!(
        base_url = %config.base_url,
        health_policy = %config.health_policy,
        locale = %config.locale,
        "Starting DX health check"
    );

    let mut watchdog = WatchDog::from_config(&config).context("building watchdog")?;
    match watchdog.run().await {
        Ok(run) => {
            info!(
                reports = run.reports.len(),
                notified = run.need_report,
                "Health check done"
            );
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "Failed to deliver report");
            Err(err).context("sending report")
        }
    }
}
