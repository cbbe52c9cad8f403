use std::sync::Arc;
use std::time::Duration;

use tokio::{task::JoinHandle, time::sleep};
use tracing::debug;

use crate::observability::metrics::Metrics;
use crate::scheduler::jobs::JobRegistry;

/// Spawn the background task that reaps expired jobs from the registry.
///
/// A job that is no longer polled simply ages out of the retention window;
/// there is no mid-pipeline cancellation to coordinate with.
pub fn spawn_retention_sweeper(
    jobs: Arc<JobRegistry>,
    metrics: Arc<Metrics>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            let swept = jobs.sweep_expired().await;
            if swept > 0 {
                metrics.jobs_swept.inc_by(swept as f64);
                debug!(swept, "reaped expired analysis jobs");
            }
        }
    })
}
