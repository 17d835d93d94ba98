pub mod connection;
pub mod control;
pub mod registry;
pub mod socket;

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use connection::{ConnectionHandle, Outbound};
pub use registry::{BroadcastFilter, BroadcastReport, ConnectionRegistry, LivenessReport};

/// Run `liveness_check` every `period` until `shutdown` fires.
pub async fn run_liveness_sweep(
    registry: ConnectionRegistry,
    period: Duration,
    shutdown: CancellationToken,
) {
    info!("Liveness sweep every {}s", period.as_secs());
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so new sessions get a full period.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let report = registry.liveness_check();
                debug!(
                    "Liveness sweep probed {} and dropped {} connections",
                    report.probed,
                    report.dropped.len()
                );
            }
        }
    }
    info!("Liveness sweep stopped");
}
