// ============================================================================
// Expiry Scheduler
// Periodic DAY-order expiry on a tokio runtime
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::OrderLifecycleManager;

/// Background task running `cancel_expired_now` on a fixed interval
pub struct ExpirySweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ExpirySweeper {
    /// Spawn the sweeper on the current runtime.
    ///
    /// Each sweep runs on the blocking pool since it takes book locks.
    /// Errors are logged and the next tick tries again.
    pub fn spawn(lifecycle: Arc<OrderLifecycleManager>, interval: Duration) -> Self {
        let (shutdown, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {},
                    _ = stopped.changed() => break,
                }

                let lifecycle = Arc::clone(&lifecycle);
                match tokio::task::spawn_blocking(move || lifecycle.cancel_expired_now()).await {
                    Ok(Ok(count)) if count > 0 => {
                        tracing::debug!(count, "expiry sweep cancelled orders");
                    },
                    Ok(Ok(_)) => {},
                    Ok(Err(err)) => tracing::warn!(error = %err, "expiry sweep failed"),
                    Err(err) => tracing::error!(error = %err, "expiry sweep task panicked"),
                }
            }
            tracing::info!("expiry sweeper stopped");
        });

        Self { shutdown, handle }
    }

    /// Spawn with the engine's configured sweep interval
    pub fn spawn_default(lifecycle: Arc<OrderLifecycleManager>) -> Self {
        let interval = lifecycle.engine().config().sweep_interval;
        Self::spawn(lifecycle, interval)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop after the sweep in progress, if any
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            tracing::error!(error = %err, "expiry sweeper join failed");
        }
    }
}
