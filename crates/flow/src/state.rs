//! Per-identifier flow state

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::queue::FifoQueue;
use crate::step::{DynStep, StepError};

/// Mutable record of one identifier's flow
///
/// Holds the pending steps, the pending events, the two flags that
/// coordinate the scheduler and the result threaded between steps. It has
/// no behaviour of its own beyond accessors and state transitions; the
/// [`FlowRegistry`](crate::FlowRegistry) decides when to call them.
pub struct FlowState<E, R> {
    events: FifoQueue<E>,
    actions: FifoQueue<DynStep<E, R>>,

    /// A drain loop is running for this identifier
    executing: bool,

    /// Registration is closed until the current batch drains or is cleared
    locked: bool,

    previous_result: Option<Arc<R>>,

    /// Bumped on every reset; a drain loop started under an older
    /// generation must not touch the state again
    generation: u64,

    last_error: Option<StepError>,
    last_activity: Instant,
}

impl<E, R> FlowState<E, R> {
    /// Create an idle state with empty queues
    pub fn new() -> Self {
        Self {
            events: FifoQueue::new(),
            actions: FifoQueue::new(),
            executing: false,
            locked: false,
            previous_result: None,
            generation: 0,
            last_error: None,
            last_activity: Instant::now(),
        }
    }

    // =========================================================================
    // Events queue
    // =========================================================================

    /// Append an event
    pub fn enqueue_event(&mut self, event: E) {
        self.events.enqueue(event);
    }

    /// Remove and return the oldest event
    pub fn dequeue_event(&mut self) -> Option<E> {
        self.events.dequeue()
    }

    /// Borrow the oldest event
    pub fn peek_first_event(&self) -> Option<&E> {
        self.events.peek_first()
    }

    /// Number of pending events
    pub fn events_len(&self) -> usize {
        self.events.len()
    }

    /// Drop every pending event
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Iterate over pending events, oldest first
    pub fn events(&self) -> impl Iterator<Item = &E> {
        self.events.iter()
    }

    // =========================================================================
    // Actions queue
    // =========================================================================

    /// Append a step
    pub fn enqueue_action(&mut self, step: DynStep<E, R>) {
        self.actions.enqueue(step);
    }

    /// Append a batch of steps in order
    pub fn extend_actions(&mut self, steps: impl IntoIterator<Item = DynStep<E, R>>) {
        self.actions.extend(steps);
    }

    /// Remove and return the head step
    pub fn dequeue_action(&mut self) -> Option<DynStep<E, R>> {
        self.actions.dequeue()
    }

    /// Borrow the head step
    pub fn peek_first_action(&self) -> Option<&DynStep<E, R>> {
        self.actions.peek_first()
    }

    /// Number of pending steps
    pub fn actions_len(&self) -> usize {
        self.actions.len()
    }

    /// Drop every pending step
    pub fn clear_actions(&mut self) {
        self.actions.clear();
    }

    /// Iterate over pending steps, next to run first
    pub fn actions(&self) -> impl Iterator<Item = &DynStep<E, R>> {
        self.actions.iter()
    }

    // =========================================================================
    // Flags and results
    // =========================================================================

    /// Check if a drain loop is running
    pub fn is_executing(&self) -> bool {
        self.executing
    }

    /// Mark the drain loop as running or stopped
    pub fn set_executing(&mut self, executing: bool) {
        self.executing = executing;
    }

    /// Check if registration is closed
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Open or close registration
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// Result of the most recently completed step
    pub fn previous_result(&self) -> Option<Arc<R>> {
        self.previous_result.clone()
    }

    /// Replace the threaded result
    pub fn set_previous_result(&mut self, result: Option<Arc<R>>) {
        self.previous_result = result;
    }

    /// Current reset generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The failure that stalled this flow, if any
    pub fn last_error(&self) -> Option<&StepError> {
        self.last_error.as_ref()
    }

    /// Remember the failure that stalled this flow
    pub fn record_failure(&mut self, error: StepError) {
        self.last_error = Some(error);
    }

    /// Return to idle: empty both queues, open registration, stop executing
    /// and forget the threaded result
    pub fn reset(&mut self) {
        self.events.clear();
        self.actions.clear();
        self.locked = false;
        self.executing = false;
        self.previous_result = None;
        self.last_error = None;
        self.generation = self.generation.wrapping_add(1);
        self.touch();
    }

    // =========================================================================
    // Idle tracking
    // =========================================================================

    /// Record activity on this flow
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since the last recorded activity
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Check if nothing is queued, running or locked
    pub fn is_idle(&self) -> bool {
        !self.executing && !self.locked && self.actions.is_empty() && self.events.is_empty()
    }

    /// Serializable view of the counters and flags
    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            actions_queued: self.actions.len(),
            events_queued: self.events.len(),
            executing: self.executing,
            locked: self.locked,
            has_previous_result: self.previous_result.is_some(),
            last_error: self.last_error.clone(),
            idle_ms: self.idle_for().as_millis() as u64,
        }
    }
}

impl<E, R> Default for FlowState<E, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, R> fmt::Debug for FlowState<E, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowState")
            .field("actions", &self.actions.len())
            .field("events", &self.events.len())
            .field("executing", &self.executing)
            .field("locked", &self.locked)
            .field("generation", &self.generation)
            .field("last_error", &self.last_error)
            .finish()
    }
}

/// Point-in-time view of a flow, for inspection and status output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowSnapshot {
    /// Steps still to run
    pub actions_queued: usize,

    /// Events not yet consumed
    pub events_queued: usize,

    /// Whether a drain loop is running (or stalled on a failed step)
    pub executing: bool,

    /// Whether registration is closed
    pub locked: bool,

    /// Whether a step has completed in the current batch
    pub has_previous_result: bool,

    /// The failure that stalled the flow
    pub last_error: Option<StepError>,

    /// Milliseconds since the last activity
    pub idle_ms: u64,
}

impl FlowSnapshot {
    /// Check if the flow is stalled on a failed step
    pub fn is_stalled(&self) -> bool {
        self.last_error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{from_fn, StepOutcome};

    fn noop() -> DynStep<&'static str, u32> {
        from_fn(|_| Ok(StepOutcome::advance(0)))
    }

    #[test]
    fn test_new_state_is_idle() {
        let state: FlowState<&str, u32> = FlowState::new();

        assert!(state.is_idle());
        assert!(!state.is_executing());
        assert!(!state.is_locked());
        assert!(state.previous_result().is_none());
        assert_eq!(state.generation(), 0);
    }

    #[test]
    fn test_queues_are_independent() {
        let mut state = FlowState::new();
        state.enqueue_action(noop());
        state.enqueue_action(noop());
        state.enqueue_event("x");

        assert_eq!(state.actions_len(), 2);
        assert_eq!(state.events_len(), 1);
        assert_eq!(state.peek_first_event(), Some(&"x"));

        state.clear_events();
        assert_eq!(state.events_len(), 0);
        assert_eq!(state.actions_len(), 2);

        assert!(state.dequeue_action().is_some());
        assert_eq!(state.actions().count(), 1);
    }

    #[test]
    fn test_flags() {
        let mut state: FlowState<&str, u32> = FlowState::new();

        state.set_locked(true);
        state.set_executing(true);
        assert!(state.is_locked());
        assert!(state.is_executing());
        assert!(!state.is_idle());

        state.set_executing(false);
        assert!(!state.is_executing());
        assert!(state.is_locked());
    }

    #[test]
    fn test_reset() {
        let mut state = FlowState::new();
        state.extend_actions([noop(), noop()]);
        state.enqueue_event("a");
        state.enqueue_event("b");
        state.set_locked(true);
        state.set_executing(true);
        state.set_previous_result(Some(Arc::new(7)));
        state.record_failure(StepError::new("boom"));

        state.reset();

        assert!(state.is_idle());
        assert!(state.previous_result().is_none());
        assert!(state.last_error().is_none());
        assert_eq!(state.generation(), 1);
        assert_eq!(state.events().count(), 0);
    }

    #[test]
    fn test_snapshot() {
        let mut state = FlowState::new();
        state.enqueue_action(noop());
        state.enqueue_event("x");
        state.set_locked(true);
        state.record_failure(StepError::new("send failed"));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.actions_queued, 1);
        assert_eq!(snapshot.events_queued, 1);
        assert!(snapshot.locked);
        assert!(!snapshot.executing);
        assert!(!snapshot.has_previous_result);
        assert!(snapshot.is_stalled());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["actions_queued"], 1);
        assert_eq!(json["last_error"]["message"], "send failed");
    }

    #[test]
    fn test_snapshot_equality_covers_error_details() {
        let mut state: FlowState<&str, u32> = FlowState::new();
        state.record_failure(
            StepError::new("send failed").with_details(serde_json::json!({ "attempt": 1 })),
        );

        let snapshot = state.snapshot();
        assert_eq!(snapshot, snapshot.clone());

        let mut other = snapshot.clone();
        other.last_error = Some(
            StepError::new("send failed").with_details(serde_json::json!({ "attempt": 2 })),
        );
        assert_ne!(snapshot, other);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_tracking() {
        let mut state: FlowState<&str, u32> = FlowState::new();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(state.idle_for() >= Duration::from_secs(30));

        state.touch();
        assert!(state.idle_for() < Duration::from_secs(1));
    }
}
