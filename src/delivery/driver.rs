//! Delivery driver - drains the queue over the uplink once per cycle

use probe_shared::{
    state_machine::is_valid_transition, CycleEvent, DeliveryOutcome, DeliveryState,
    DeliveryStateMachine, Record, TransitionResult,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::indicator::{Indicator, Signal};
use crate::queue::{SharedQueue, StorageError};
use crate::uplink::{Connectivity, Liveness, Uplink};

/// How a delivery cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEnd {
    /// Collector not reachable, queue untouched
    Unreachable,
    /// Nothing pending
    QueueEmpty,
    /// Queue rewritten with the failed subset
    Reconciled,
    /// Queue could not be read or rewritten, pre-cycle contents kept
    StorageFailed,
}

/// Summary of one delivery cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub end: CycleEnd,
    pub drained: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl CycleReport {
    fn ended(end: CycleEnd) -> Self {
        Self {
            end,
            drained: 0,
            delivered: 0,
            failed: 0,
        }
    }
}

/// Runs store-and-forward delivery cycles against an uplink
pub struct DeliveryDriver<U> {
    uplink: U,
    queue: SharedQueue,
    indicator: Arc<dyn Indicator>,
    fsm: DeliveryStateMachine,
    liveness_probe: bool,
}

impl<U: Uplink> DeliveryDriver<U> {
    /// Create a new delivery driver
    pub fn new(uplink: U, queue: SharedQueue, indicator: Arc<dyn Indicator>) -> Self {
        Self {
            uplink,
            queue,
            indicator,
            fsm: DeliveryStateMachine::new(),
            liveness_probe: true,
        }
    }

    /// Enable or disable the liveness probe before each bulk send
    pub fn with_liveness_probe(mut self, enabled: bool) -> Self {
        self.liveness_probe = enabled;
        self
    }

    /// Current state of the cycle state machine
    pub fn state(&self) -> DeliveryState {
        self.fsm.state()
    }

    /// Number of cycles run to completion, whatever their outcome
    pub fn completed_cycles(&self) -> u64 {
        self.fsm.completed_cycles()
    }

    #[cfg(test)]
    fn uplink(&self) -> &U {
        &self.uplink
    }

    /// Run one full cycle: connect, drain, deliver, reconcile
    ///
    /// Always returns to `Idle`. Records are only removed from the queue once
    /// the collector acknowledged them and the rewrite hit storage. The queue
    /// lock is only held while reading and rewriting the store, never across
    /// network calls.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.transition(CycleEvent::Triggered);

        // Connecting
        self.indicator.signal(Signal::Connecting);
        if self.uplink.connect().await == Connectivity::Unreachable {
            warn!("[DELIVERY] Collector unreachable, keeping queue for later");
            self.transition(CycleEvent::Unreachable);
            return CycleReport::ended(CycleEnd::Unreachable);
        }
        self.transition(CycleEvent::Connected);

        // Draining
        let drained_result = self.queue.lock().await.drain_all();
        let records = match drained_result {
            Ok(records) => records,
            Err(e) => {
                error!("[DELIVERY] Could not read queue: {}", e);
                self.transition(CycleEvent::StorageFailed);
                return CycleReport::ended(CycleEnd::StorageFailed);
            }
        };
        if records.is_empty() {
            debug!("[DELIVERY] Queue empty, nothing to send");
            self.transition(CycleEvent::QueueEmpty);
            return CycleReport::ended(CycleEnd::QueueEmpty);
        }
        let drained = records.len();
        self.transition(CycleEvent::Drained { count: drained });

        if self.liveness_probe {
            self.probe_liveness().await;
        }

        // Delivering
        let (delivered, failed) = self.deliver_all(records).await;
        self.transition(CycleEvent::DeliveryComplete {
            delivered,
            failed: failed.len(),
        });

        // Reconciling
        let end = match self.reconcile(drained, &failed).await {
            Ok(()) => {
                self.transition(CycleEvent::Reconciled);
                CycleEnd::Reconciled
            }
            Err(e) => {
                error!(
                    "[DELIVERY] Could not rewrite queue, {} delivered record(s) will be resent: {}",
                    delivered, e
                );
                self.transition(CycleEvent::StorageFailed);
                CycleEnd::StorageFailed
            }
        };

        info!(
            drained,
            delivered,
            failed = failed.len(),
            "[DELIVERY] Cycle finished: {:?}",
            end
        );

        CycleReport {
            end,
            drained,
            delivered,
            failed: failed.len(),
        }
    }

    /// Rewrite the queue with the failed records plus whatever the sampler
    /// appended while the lock was released
    ///
    /// Appends only extend the store, so every record past the drained prefix
    /// arrived during delivery.
    async fn reconcile(&self, drained: usize, failed: &[Record]) -> Result<(), StorageError> {
        let mut queue = self.queue.lock().await;
        let current = queue.drain_all()?;

        let mut keep = failed.to_vec();
        let appended = current.len().saturating_sub(drained);
        if appended > 0 {
            debug!(appended, "[DELIVERY] Keeping records appended during delivery");
        }
        keep.extend(current.into_iter().skip(drained));
        queue.replace(&keep)
    }

    /// Deliver each record in order, returning the delivered count and the
    /// records to keep
    async fn deliver_all(&self, records: Vec<Record>) -> (usize, Vec<Record>) {
        let mut delivered = 0;
        let mut failed = Vec::new();

        for record in records {
            match self.uplink.deliver(&record).await {
                DeliveryOutcome::Delivered => {
                    info!(measure_id = record.measure_id, "[DELIVERY] Sent");
                    self.indicator.signal(Signal::Delivered);
                    delivered += 1;
                }
                outcome @ (DeliveryOutcome::Rejected(_) | DeliveryOutcome::Unreachable) => {
                    warn!(
                        measure_id = record.measure_id,
                        %outcome,
                        "[DELIVERY] Not delivered, keeping for next cycle"
                    );
                    self.indicator.signal(Signal::Failed);
                    failed.push(record);
                }
            }
        }

        (delivered, failed)
    }

    async fn probe_liveness(&self) {
        match self.uplink.fetch_latest().await {
            Ok(Liveness { status, body }) => debug!(
                status,
                bytes = body.len(),
                "[DELIVERY] Liveness probe answered"
            ),
            Err(e) => warn!("[DELIVERY] Liveness probe failed: {}", e),
        }
    }

    fn transition(&mut self, event: CycleEvent) {
        let from = self.fsm.state();
        match self.fsm.process_event(event) {
            TransitionResult::Success(to) => {
                debug_assert!(is_valid_transition(from, to));
                debug!("[DELIVERY] {:?} -> {:?}", from, to);
            }
            TransitionResult::Invalid { from, event } => {
                error!("[DELIVERY] Invalid transition from {:?} on {:?}", from, event);
            }
        }
    }
}
