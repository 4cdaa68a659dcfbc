//! Periodic job broadcast
//!
//! One tokio task owns the ticker and awaits [`JobManager::broadcast`]
//! inline, so two broadcasts never run at once. The first tick fires as soon
//! as the task is spawned. A tick that overruns the period delays the
//! following ones rather than triggering a burst
//! ([`MissedTickBehavior::Delay`]).
//!
//! Cancellation is checked before waiting and again before every broadcast,
//! so no broadcast begins once [`BroadcastTimer::stop`] was called. A
//! broadcast already in flight gets the grace period to finish and is
//! aborted after that.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::JobManager;

pub struct BroadcastTimer {
    period: Duration,
    cancel: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BroadcastTimer {
    /// Starts ticking immediately. `period` must be non-zero.
    pub fn spawn(jobs: Arc<dyn JobManager>, period: Duration) -> Self {
        let (cancel, mut cancelled) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.changed() => break,
                    _ = ticker.tick() => {}
                }
                if *cancelled.borrow() {
                    break;
                }

                if let Err(e) = jobs.broadcast().await {
                    warn!("Job broadcast failed: {}", e);
                }
            }
            debug!("Broadcast timer exited");
        });

        info!("Job broadcast scheduled every {:?}", period);
        Self {
            period,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map_or(false, |task| !task.is_finished())
    }

    /// Cancels the timer, waiting up to `grace` for an in-flight broadcast.
    pub async fn stop(&self, grace: Duration) {
        let _ = self.cancel.send(true);

        let task = self.task.lock().take();
        let Some(mut task) = task else {
            return;
        };
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            warn!("Job broadcast still running after {:?}, aborting", grace);
            task.abort();
        }
    }
}

impl Drop for BroadcastTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
