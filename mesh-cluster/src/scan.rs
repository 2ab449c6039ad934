//! Periodic trust-chain scan task
//!
//! Drives [`ClusterManager::scan_trust_chain`] on a fixed interval. Ticks
//! are awaited sequentially, so the scan never overlaps itself from this
//! task; the manager's own guard additionally protects against manual
//! invocations racing the schedule.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::manager::ClusterManager;

/// Handle for stopping the scan task
pub struct ScanHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScanHandle {
    /// Stop the task and wait for the current tick to finish
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

/// Spawn the periodic trust-chain scan
pub fn spawn_trust_chain_scan(
    manager: Arc<ClusterManager>,
    period: Duration,
    initial_delay: Duration,
) -> ScanHandle {
    let (stop, mut stopped) = watch::channel(false);

    let task = tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(initial_delay) => {}
            _ = stopped.changed() => {
                return;
            }
        }

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(period_ms = period.as_millis() as u64, "Trust chain scan running");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let emitted = manager.scan_trust_chain().await;
                    if emitted > 0 {
                        tracing::debug!(emitted, "Scan tick finished");
                    }
                }
                _ = stopped.changed() => {
                    tracing::info!("Trust chain scan stopped");
                    break;
                }
            }
        }
    });

    ScanHandle { stop, task }
}
