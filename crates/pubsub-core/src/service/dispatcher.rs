//! # Dispatcher
//!
//! Runs one lane task per (partition, subscription). A lane reads its
//! partition queue in sequence order, invokes the subscription's handler
//! and records the outcome with the ack tracker.
//!
//! ```text
//!            ┌────────────── lane loop ───────────────┐
//!            │                                        │
//!  next = cursor + 1                                  │
//!            │                                        │
//!      queue.get(next) ──Pending──→ wait (tail / shutdown / cancel)
//!            │ Ready                                  │
//!            ↓                                        │
//!   [InFlight] handler ──Ok──→ ack ──→ release ──→ next + 1
//!            │ Err / timeout / panic
//!            ↓
//!   attempts left? ──yes──→ backoff ──→ [InFlight] (same message)
//!            │ no
//!            ↓
//!   dead-letter once ──→ ack ──→ release ──→ next + 1
//! ```
//!
//! A lane never moves past a message until it is acked or dead-lettered,
//! which is what keeps per-key delivery ordered.
//!
//! ## Shutdown
//!
//! Each `start` creates a fresh shutdown channel. `stop` flips it, lets
//! in-flight callbacks finish, interrupts idle waits and backoff sleeps,
//! then aborts whatever is still running once the grace period elapses.
//! Lanes left over from a previous run see their channel closed and exit.
//!
//! A lane owns its (partition, subscription) slot from before it reads the
//! cursor until it exits. A `start` racing an unfinished `stop` spawns lanes
//! that queue on the slot, so two lanes never deliver for the same pair.

use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::ack_tracker::AckTracker;
use super::registry::{Subscription, Topic};
use super::stats::DispatcherStats;
use crate::domain::{
    AckOutcome, CursorKey, Delivery, DeliveryMetadata, FailedDelivery, HandlerError, Message,
    PartitionQueue, PubSubError, Sequence, Slot,
};
use crate::ports::{DeadLetterSink, MessageHandler};

/// Collaborators every lane needs.
#[derive(Clone)]
pub(crate) struct DeliveryServices {
    pub(crate) tracker: Arc<AckTracker>,
    pub(crate) dead_letters: Arc<dyn DeadLetterSink>,
    pub(crate) stats: Arc<DispatcherStats>,
}

struct LaneSet {
    shutdown: watch::Sender<bool>,
    tasks: JoinSet<()>,
}

/// Owns lane tasks and the shutdown signal.
pub(crate) struct Dispatcher {
    services: DeliveryServices,
    lanes: Mutex<LaneSet>,
    running: AtomicBool,
    epoch: AtomicU64,
}

impl Dispatcher {
    pub(crate) fn new(services: DeliveryServices) -> Self {
        let (shutdown, _) = watch::channel(true);
        Self {
            services,
            lanes: Mutex::new(LaneSet {
                shutdown,
                tasks: JoinSet::new(),
            }),
            running: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn lanes for every subscription of `topics`. Returns `false` if
    /// already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn start(&self, topics: &[Arc<Topic>]) -> bool {
        let mut lanes = self.lanes.lock();
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        // Dropping the previous sender closes every receiver a stale lane holds.
        let (shutdown, _) = watch::channel(false);
        lanes.shutdown = shutdown;
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        let mut spawned = 0;
        for topic in topics {
            for subscription in topic.subscriptions() {
                spawned += self.spawn_locked(&mut lanes, epoch, topic, &subscription);
            }
        }
        info!(epoch, lanes = spawned, "Dispatcher started");
        true
    }

    /// Spawn lanes for a subscription added while running. No-op when
    /// stopped or when the lanes already exist.
    pub(crate) fn spawn_lanes(&self, topic: &Arc<Topic>, subscription: &Arc<Subscription>) {
        let mut lanes = self.lanes.lock();
        if !self.is_running() {
            return;
        }
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.spawn_locked(&mut lanes, epoch, topic, subscription);
    }

    fn spawn_locked(
        &self,
        lanes: &mut LaneSet,
        epoch: u64,
        topic: &Arc<Topic>,
        subscription: &Arc<Subscription>,
    ) -> usize {
        if subscription.is_cancelled() || !subscription.claim_epoch(epoch) {
            return 0;
        }
        // Reap finished lanes so the set does not grow across subscribe/unsubscribe churn.
        while lanes.tasks.try_join_next().is_some() {}

        for queue in topic.queues() {
            let lane = Lane {
                services: self.services.clone(),
                queue: Arc::clone(queue),
                topic: Arc::clone(topic),
                subscription: Arc::clone(subscription),
                key: subscription.cursor_key(queue.partition()),
                shutdown: lanes.shutdown.subscribe(),
                cancel: subscription.cancelled(),
            };
            let span = info_span!(
                "lane",
                topic = %topic.name(),
                partition = queue.partition(),
                subscriber = %subscription.subscriber(),
            );
            lanes.tasks.spawn(lane.run().instrument(span));
        }
        debug!(
            topic = %topic.name(),
            subscriber = %subscription.subscriber(),
            lanes = topic.queues().len(),
            "Spawned lanes"
        );
        topic.queues().len()
    }

    /// Signal shutdown and wait up to `grace` for lanes to exit.
    pub(crate) async fn stop(&self, grace: Duration) {
        let mut tasks = {
            let mut lanes = self.lanes.lock();
            if !self.running.swap(false, Ordering::SeqCst) {
                return;
            }
            lanes.shutdown.send_replace(true);
            std::mem::take(&mut lanes.tasks)
        };

        let total = tasks.len();
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!(error = %e, "Lane task panicked");
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = tasks.len(),
                grace_ms = grace.as_millis() as u64,
                "Shutdown grace elapsed, aborting lanes"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
        info!(lanes = total, "Dispatcher stopped");
    }
}

// =============================================================================
// LANE
// =============================================================================

enum Outcome {
    /// Handler succeeded.
    Acked,
    /// Attempts exhausted; the sink has the message.
    DeadLettered,
    /// Interrupted by shutdown or unsubscribe; the message stays unacked.
    Abandoned,
}

struct Lane {
    services: DeliveryServices,
    queue: Arc<PartitionQueue>,
    topic: Arc<Topic>,
    subscription: Arc<Subscription>,
    key: CursorKey,
    shutdown: watch::Receiver<bool>,
    cancel: watch::Receiver<bool>,
}

impl Lane {
    async fn run(mut self) {
        let partition = self.queue.partition();
        let Some(slot) = self.subscription.lane_slot(partition) else {
            error!(partition, "No lane slot for partition, lane not started");
            return;
        };
        // A lane from the previous run may still be finishing its callback;
        // the cursor is only read once it has exited.
        let _owner = tokio::select! {
            owner = slot.lock_owned() => owner,
            _ = signalled(&mut self.shutdown) => return,
            _ = signalled(&mut self.cancel) => return,
        };

        let mut next = match self.services.tracker.current_cursor(&self.key) {
            Ok(cursor) => cursor + 1,
            Err(e) => {
                error!(error = %e, "Failed to load cursor, lane not started");
                return;
            }
        };
        debug!(start = next, "Lane started");

        while !self.stopping() {
            match self.queue.get(next) {
                Slot::Ready(message) => {
                    let sequence = message.sequence();
                    match self.deliver(message).await {
                        Outcome::Acked | Outcome::DeadLettered => match self.acknowledge(sequence) {
                            Some(resume) => next = resume,
                            None => break,
                        },
                        Outcome::Abandoned => break,
                    }
                }
                Slot::Released { first } => {
                    debug!(from = next, to = first, "Skipping released entries");
                    next = first;
                }
                Slot::Pending => {
                    tokio::select! {
                        _ = self.queue.wait_for(next) => {}
                        _ = signalled(&mut self.shutdown) => break,
                        _ = signalled(&mut self.cancel) => break,
                    }
                }
            }
        }
        debug!(next, "Lane exited");
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
            || self.shutdown.has_changed().is_err()
            || self.subscription.is_cancelled()
    }

    async fn deliver(&mut self, message: Arc<Message>) -> Outcome {
        let policy = self.subscription.policy().clone();
        let sequence = message.sequence();
        let mut in_flight =
            Delivery::new(message, self.subscription.subscriber().clone()).dispatch();

        loop {
            let attempt = in_flight.attempt();
            let result = invoke(
                self.subscription.handler(),
                in_flight.metadata(),
                policy.callback_timeout,
            )
            .await;

            let error = match result {
                Ok(()) => {
                    let acked = in_flight.ack();
                    self.services.stats.record_delivered();
                    debug!(sequence, attempt = acked.attempt(), "Delivered");
                    return Outcome::Acked;
                }
                Err(error) => error,
            };
            self.services.stats.record_failure();

            match in_flight.fail(error, &policy) {
                FailedDelivery::Retry(retrying) => {
                    if self.subscription.is_cancelled() {
                        return Outcome::Abandoned;
                    }
                    let delay = retrying.backoff(&policy);
                    warn!(
                        sequence,
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = ?retrying.last_error(),
                        "Delivery failed, retrying"
                    );
                    self.services.stats.record_retry();
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = signalled(&mut self.shutdown) => return Outcome::Abandoned,
                        _ = signalled(&mut self.cancel) => return Outcome::Abandoned,
                    }
                    in_flight = retrying.redispatch();
                }
                FailedDelivery::Exhausted(dead) => {
                    let letter = dead.into_dead_letter();
                    warn!(
                        sequence,
                        attempts = letter.attempts,
                        error = %letter.error,
                        "Delivery attempts exhausted, dead-lettering"
                    );
                    self.services.dead_letters.dead_letter(letter).await;
                    self.services.stats.record_dead_letter();
                    return Outcome::DeadLettered;
                }
            }
        }
    }

    /// Advance the cursor past `sequence` and free queue space. Returns the
    /// next sequence to read, or `None` if the subscription is gone.
    fn acknowledge(&self, sequence: Sequence) -> Option<Sequence> {
        let subscription = &self.subscription;
        let resume = match self
            .services
            .tracker
            .record_ack_unless(&self.key, sequence, || subscription.is_cancelled())
        {
            Ok(None) => return None,
            Ok(Some(AckOutcome::Advanced { to, .. })) => to + 1,
            Ok(Some(AckOutcome::Duplicate { cursor })) => {
                debug!(sequence, cursor, "Duplicate ack ignored");
                cursor.max(sequence) + 1
            }
            Err(PubSubError::OutOfOrder { cursor, .. }) => {
                // Cursor moved ahead of this lane (operator reset); follow it.
                self.services.stats.record_out_of_order();
                warn!(sequence, cursor, "Out-of-order ack ignored, resyncing lane");
                cursor + 1
            }
            Err(e) => {
                error!(sequence, error = %e, "Failed to record ack");
                return Some(sequence + 1);
            }
        };

        if let Err(e) = self
            .topic
            .release_partition(self.queue.partition(), &self.services.tracker)
        {
            warn!(error = %e, "Failed to release partition entries");
        }
        Some(resume)
    }
}

/// Resolves once the flag is set or its sender is gone.
async fn signalled(flag: &mut watch::Receiver<bool>) {
    let _ = flag.wait_for(|set| *set).await;
}

/// Run the handler with the policy timeout, converting panics into failures.
async fn invoke(
    handler: &Arc<dyn MessageHandler>,
    metadata: DeliveryMetadata,
    timeout: Duration,
) -> Result<(), HandlerError> {
    let payload = metadata.message().payload().clone();
    let call = AssertUnwindSafe(handler.handle(payload, metadata)).catch_unwind();
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
        Err(_) => Err(HandlerError::TimedOut(timeout)),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
