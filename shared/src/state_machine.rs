//! Delivery Cycle State Machine
//!
//! Defines the valid transitions of one store-and-forward delivery cycle:
//! `Idle → Connecting → Draining → Delivering → Reconciling → Idle`.

/// States of a delivery cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryState {
    /// Waiting for the next trigger
    #[default]
    Idle,
    /// Establishing reachability to the collector
    Connecting,
    /// Reading every pending record from the queue
    Draining,
    /// Posting drained records one by one
    Delivering,
    /// Rewriting the queue with the failed subset
    Reconciling,
}

/// Events that drive a delivery cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleEvent {
    /// Delivery trigger fired
    Triggered,
    /// Collector reachable
    Connected,
    /// Collector unreachable after all connect attempts
    Unreachable,
    /// Queue drained with at least one record
    Drained { count: usize },
    /// Queue had nothing to deliver
    QueueEmpty,
    /// Every drained record has an outcome
    DeliveryComplete { delivered: usize, failed: usize },
    /// Queue rewritten with the failed subset
    Reconciled,
    /// Queue could not be read or rewritten, contents left as they were
    StorageFailed,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    /// Transition was valid and state changed
    Success(DeliveryState),
    /// Transition was invalid from current state
    Invalid { from: DeliveryState, event: CycleEvent },
}

/// State machine for one device's delivery cycles
#[derive(Debug, Default)]
pub struct DeliveryStateMachine {
    current_state: DeliveryState,
    completed_cycles: u64,
}

impl DeliveryStateMachine {
    /// Create a new state machine in Idle state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current state
    pub fn state(&self) -> DeliveryState {
        self.current_state
    }

    /// Number of cycles that made it back to Idle
    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles
    }

    /// Process an event and return the transition result
    pub fn process_event(&mut self, event: CycleEvent) -> TransitionResult {
        match self.get_next_state(&event) {
            Some(state) => {
                if state == DeliveryState::Idle && self.current_state != DeliveryState::Idle {
                    self.completed_cycles += 1;
                }
                self.current_state = state;
                TransitionResult::Success(state)
            }
            None => TransitionResult::Invalid {
                from: self.current_state,
                event,
            },
        }
    }

    /// Get the next state for a given event, if the transition is valid
    fn get_next_state(&self, event: &CycleEvent) -> Option<DeliveryState> {
        use CycleEvent::*;
        use DeliveryState::*;

        match (self.current_state, event) {
            (Idle, Triggered) => Some(Connecting),

            (Connecting, Connected) => Some(Draining),
            // Nothing drained, nothing to lose
            (Connecting, Unreachable) => Some(Idle),

            (Draining, Drained { count }) if *count > 0 => Some(Delivering),
            (Draining, QueueEmpty) => Some(Idle),
            (Draining, StorageFailed) => Some(Idle),

            (Delivering, DeliveryComplete { .. }) => Some(Reconciling),

            (Reconciling, Reconciled) => Some(Idle),
            (Reconciling, StorageFailed) => Some(Idle),

            _ => None,
        }
    }
}

/// Check if a transition from one state to another is generally valid
pub fn is_valid_transition(from: DeliveryState, to: DeliveryState) -> bool {
    use DeliveryState::*;

    matches!(
        (from, to),
        (Idle, Connecting)
            | (Connecting, Draining)
            | (Connecting, Idle)
            | (Draining, Delivering)
            | (Draining, Idle)
            | (Delivering, Reconciling)
            | (Reconciling, Idle)
    )
}
