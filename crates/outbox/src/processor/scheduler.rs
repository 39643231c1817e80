//! Fixed-period tick scheduler
//!
//! The scheduler only decides how often `tick` is attempted; the processor's
//! own throttle decides whether a tick does work.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::runner::OutboxProcessor;

/// Handle to a running scheduler loop
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for the in-flight tick to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            error!("Scheduler loop panicked: {}", e);
        }
        info!("Outbox scheduler stopped");
    }

    /// Check if the loop has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Call `tick` every `period` until shut down
///
/// Must be called from within a tokio runtime.
pub fn spawn_scheduler(processor: Arc<OutboxProcessor>, period: Duration) -> SchedulerHandle {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let period = period.max(Duration::from_millis(1));

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(period_ms = period.as_millis() as u64, "Outbox scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = processor.tick().await {
                        error!("Outbox tick failed: {}", e);
                    }
                }
                _ = shutdown_rx.changed() => {
                    debug!("Scheduler loop: shutdown requested");
                    break;
                }
            }
        }

        debug!("Scheduler loop exited");
    });

    SchedulerHandle {
        shutdown_tx,
        handle,
    }
}
