use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::core::classifier::Classifier;
use crate::core::composer::ResponseComposer;
use crate::core::dedupe::DedupeTracker;
use crate::core::poller::TimelinePoller;
use crate::core::poster::Poster;
use crate::error::PipelineError;
use crate::models::{Item, PostedRecord, ResponseAction};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub accepted: usize,
    pub replied: usize,
    pub ignored: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle was still running.
    Skipped,
}

struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Poll, classify, compose and post, one item at a time.
pub struct InteractionOrchestrator {
    poller: TimelinePoller,
    classifier: Classifier,
    composer: ResponseComposer,
    poster: Poster,
    dedupe: Arc<DedupeTracker>,
    running: AtomicBool,
}

impl InteractionOrchestrator {
    pub fn new(
        poller: TimelinePoller,
        classifier: Classifier,
        composer: ResponseComposer,
        poster: Poster,
        dedupe: Arc<DedupeTracker>,
    ) -> Self {
        InteractionOrchestrator {
            poller,
            classifier,
            composer,
            poster,
            dedupe,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one cycle unless one is already in flight.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return CycleOutcome::Skipped;
        }
        let _guard = CycleGuard(&self.running);

        let items = self.poller.poll().await;
        let mut report = CycleReport {
            accepted: items.len(),
            ..CycleReport::default()
        };

        for item in &items {
            match AssertUnwindSafe(self.handle_item(item)).catch_unwind().await {
                Ok(Ok(Some(_))) => report.replied += 1,
                Ok(Ok(None)) => report.ignored += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    error!(item_id = %item.id, author = %item.author_handle, error = %e, "Failed to handle item");
                }
                Err(_) => {
                    report.failed += 1;
                    error!(item_id = %item.id, author = %item.author_handle, "Handling item panicked");
                }
            }
            self.dedupe.mark_processed(item);
        }

        if report.accepted > 0 {
            info!(
                accepted = report.accepted,
                replied = report.replied,
                ignored = report.ignored,
                failed = report.failed,
                "Cycle finished"
            );
        }
        CycleOutcome::Completed(report)
    }

    async fn handle_item(&self, item: &Item) -> Result<Option<PostedRecord>, PipelineError> {
        let plan = self.classifier.classify(item);
        if plan.action == ResponseAction::Ignore {
            debug!(item_id = %item.id, "Ignoring item");
            return Ok(None);
        }

        info!(item_id = %item.id, author = %item.author_handle, action = ?plan.action, "Responding to item");
        let outbound = self.composer.compose(&plan).await?;
        let record = self.poster.post(&outbound).await?;
        Ok(Some(record))
    }

    /// Ticks forever. Each tick spawns a cycle; a tick that lands while the
    /// previous cycle is still running does nothing.
    pub async fn run_periodically(self: Arc<Self>, interval: Duration) {
        info!(interval = ?interval, "Starting interaction loop");
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            if self.is_running() {
                debug!("Previous cycle still running, skipping tick");
                continue;
            }
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                this.run_cycle().await;
            });
        }
    }
}
