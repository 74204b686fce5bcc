//! Background drain loop

use crate::engine::SyncEngine;
use crate::error::SyncError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Drains the queue on a timer and on demand until shut down
///
/// Must be started from within a tokio runtime.
pub struct SyncScheduler {
    trigger: Arc<Notify>,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl SyncScheduler {
    /// Spawns the loop; the first drain starts immediately
    pub fn start(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        let trigger = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(run_loop(
            engine,
            interval,
            Arc::clone(&trigger),
            shutdown.clone(),
        ));

        log::info!("Sync scheduler started (every {:?})", interval);
        Self {
            trigger,
            shutdown,
            handle,
        }
    }

    /// Requests a drain now (network became available, app came to the foreground)
    ///
    /// A trigger arriving mid-drain schedules one more drain afterwards.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stops the loop, letting an in-flight task finish first
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            log::error!("Sync scheduler task ended abnormally: {}", e);
        }
        log::info!("Sync scheduler stopped");
    }
}

async fn run_loop(
    engine: Arc<SyncEngine>,
    interval: Duration,
    trigger: Arc<Notify>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = trigger.notified() => log::debug!("Sync drain triggered"),
            _ = ticker.tick() => {}
        }

        let cancel = match engine.drain_token() {
            Ok(token) => token.child_token(),
            Err(e) => {
                log::error!("Cannot start sync drain: {}", e);
                continue;
            }
        };

        let drain = engine.drain_with(&cancel);
        tokio::pin!(drain);

        let finished = tokio::select! {
            result = &mut drain => Some(result),
            _ = shutdown.cancelled() => None,
        };
        let result = match finished {
            Some(result) => result,
            None => {
                cancel.cancel();
                drain.await
            }
        };

        match result {
            Ok(_) => {}
            Err(SyncError::AlreadyRunning) => log::debug!("Drain skipped, another is running"),
            Err(e) => log::error!("Sync drain failed: {}", e),
        }
    }
}
