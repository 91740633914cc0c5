//! Periodic pass scheduling
//!
//! Starts an optional immediate pass, then one pass per interval. Passes run
//! on the lifecycle's task tracker, so a slow pass never delays the next tick
//! and shutdown can wait for all of them.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::core::dispatcher::Dispatcher;
use crate::core::target::{Target, TargetRegistry};

/// Fixed-interval pass scheduler
#[derive(Debug)]
pub struct Scheduler {
    interval: Duration,
    initial_pass: bool,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<TargetRegistry>,
}

impl Scheduler {
    pub fn new(
        interval: Duration,
        initial_pass: bool,
        dispatcher: Arc<Dispatcher>,
        registry: Arc<TargetRegistry>,
    ) -> Self {
        Self {
            interval,
            initial_pass,
            dispatcher,
            registry,
        }
    }

    /// Schedule passes until `stop` is cancelled
    ///
    /// Returns the number of passes started. Running passes are left to the
    /// tracker's owner to await.
    pub async fn run(&self, stop: CancellationToken, tracker: &TaskTracker) -> u64 {
        let mut started = 0;
        if self.initial_pass && !stop.is_cancelled() {
            let targets = self.registry.initial_pass();
            tracing::info!("starting initial pass");
            self.spawn_pass(targets, &stop, tracker);
            started += 1;
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("next pass in {:?}", self.interval);

        loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                _ = ticker.tick() => {
                    self.spawn_pass(self.registry.dispatch_order(), &stop, tracker);
                    started += 1;
                }
            }
        }
        tracing::info!("scheduler stopped after {started} pass(es)");
        started
    }

    fn spawn_pass(
        &self,
        targets: Vec<Arc<Target>>,
        stop: &CancellationToken,
        tracker: &TaskTracker,
    ) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let stop = stop.clone();
        tracker.spawn(async move {
            dispatcher.dispatch(&targets, &stop).await;
        });
    }
}
