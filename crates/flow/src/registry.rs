//! Flow registry and drain loop
//!
//! The `FlowRegistry` maps identifiers to their [`FlowState`] and is the only
//! thing that mutates it. It is responsible for:
//! - Accepting step batches (and rejecting them while a batch is in flight)
//! - Feeding events to the head step, one at a time, in arrival order
//! - Threading each step's result into the next one
//! - Resetting a flow once its batch has drained

use std::any::Any;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::RegistryConfig;
use crate::error::FlowError;
use crate::state::{FlowSnapshot, FlowState};
use crate::step::{DynStep, StepContext, StepError, StepOutcome};

type SharedState<E, R> = Arc<Mutex<FlowState<E, R>>>;

/// Result of a [`FlowRegistry::register`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The steps were appended and registration is now locked
    Accepted {
        /// Steps pending for the identifier after this call
        queued: usize,
    },

    /// A batch is still in flight; the steps were dropped
    Rejected,
}

impl Registration {
    /// Check if the steps were queued
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Result of a [`FlowRegistry::execute`] call
#[derive(Debug)]
pub enum Dispatch {
    /// No steps are pending for the identifier; the event was discarded
    Ignored,

    /// A drain loop is already running and will consume the event
    Queued,

    /// A new drain loop was started
    Started(DrainHandle),
}

impl Dispatch {
    /// Check if the event was accepted
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Self::Ignored)
    }

    /// Take the handle of a newly started drain loop
    pub fn into_handle(self) -> Option<DrainHandle> {
        match self {
            Self::Started(handle) => Some(handle),
            Self::Ignored | Self::Queued => None,
        }
    }
}

/// Why a drain loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum DrainExit {
    /// Every step advanced; the flow was reset to idle
    Completed,

    /// The events queue ran dry; the next `execute` resumes the flow
    AwaitingEvent,

    /// The flow was cleared while a step was running
    Cleared,

    /// A step returned an error or panicked; the flow is stalled until
    /// cleared
    Failed(StepError),

    /// The drain task was cancelled, e.g. by runtime shutdown
    Aborted,
}

/// Handle to a running drain loop
///
/// Dropping the handle detaches the loop; it keeps running.
#[derive(Debug)]
pub struct DrainHandle {
    handle: JoinHandle<DrainExit>,
}

impl DrainHandle {
    /// Wait for the drain loop to stop
    pub async fn join(self) -> DrainExit {
        match self.handle.await {
            Ok(exit) => exit,
            Err(e) => {
                error!(error = %e, "drain loop aborted");
                DrainExit::Aborted
            }
        }
    }

    /// Check if the drain loop has stopped
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Per-identifier sequential step scheduler
///
/// Cloning is cheap and yields a handle to the same registry, so one
/// instance can be shared by every collaborator that routes events.
///
/// # Example
///
/// ```
/// use chatflow::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), FlowError> {
/// let registry: FlowRegistry<u64, String, String> = FlowRegistry::new();
///
/// let first_name: DynStep<String, String> =
///     from_fn(|ctx: StepContext<String, String>| Ok(StepOutcome::advance(ctx.event)));
/// let full_name: DynStep<String, String> = from_fn(|ctx: StepContext<String, String>| {
///     let first = ctx.previous().cloned().unwrap_or_default();
///     Ok(StepOutcome::advance(format!("{} {}", first, ctx.event)))
/// });
///
/// registry.register(7, vec![first_name, full_name])?;
///
/// if let Some(handle) = registry.execute(&7, "Ada".to_string()).into_handle() {
///     assert_eq!(handle.join().await, DrainExit::AwaitingEvent);
/// }
/// assert_eq!(registry.actions_queue_len(&7), 1);
/// # Ok(())
/// # }
/// ```
pub struct FlowRegistry<K, E, R> {
    inner: Arc<Inner<K, E, R>>,
}

struct Inner<K, E, R> {
    flows: DashMap<K, SharedState<E, R>>,
    config: RegistryConfig,
}

impl<K, E, R> Clone for FlowRegistry<K, E, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, E, R> Default for FlowRegistry<K, E, R>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    E: Send + 'static,
    R: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E, R> FlowRegistry<K, E, R>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    E: Send + 'static,
    R: Send + Sync + 'static,
{
    /// Create a registry with the default configuration
    pub fn new() -> Self {
        Self::build(RegistryConfig::default())
    }

    /// Create a registry with a custom configuration
    pub fn with_config(config: RegistryConfig) -> Result<Self, FlowError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: RegistryConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                flows: DashMap::new(),
                config,
            }),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Queue a batch of steps under `id`
    ///
    /// The first accepted batch locks registration for the identifier until
    /// every step has advanced or the flow is cleared. While locked, further
    /// batches are dropped and [`Registration::Rejected`] is returned;
    /// callers that care should check [`has_in_queue`](Self::has_in_queue)
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidArgument`] for an empty batch, which
    /// would otherwise lock the identifier with nothing to run.
    pub fn register(
        &self,
        id: K,
        steps: impl IntoIterator<Item = DynStep<E, R>>,
    ) -> Result<Registration, FlowError> {
        let steps: Vec<_> = steps.into_iter().collect();
        if steps.is_empty() {
            return Err(FlowError::InvalidArgument(
                "register requires at least one step".into(),
            ));
        }

        let entry = self
            .inner
            .flows
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(FlowState::new())));
        let mut state = entry.value().lock();

        if state.is_locked() {
            warn!(
                registry = %self.inner.config.name,
                flow_id = ?entry.key(),
                dropped = steps.len(),
                "flow is locked, registration dropped"
            );
            return Ok(Registration::Rejected);
        }

        let added = steps.len();
        state.extend_actions(steps);
        state.set_locked(true);
        state.touch();
        let queued = state.actions_len();

        debug!(
            registry = %self.inner.config.name,
            flow_id = ?entry.key(),
            added,
            queued,
            "registered steps"
        );

        Ok(Registration::Accepted { queued })
    }

    /// Feed one event to the flow of `id`
    ///
    /// Does nothing if no steps are pending. Otherwise the event is queued
    /// and, unless a drain loop is already running for `id`, a new one is
    /// spawned on the current tokio runtime. The caller is never blocked.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime while a drain loop has to
    /// be started.
    pub fn execute(&self, id: &K, event: E) -> Dispatch {
        let Some(entry) = self.inner.flows.get(id) else {
            return Dispatch::Ignored;
        };
        let shared = Arc::clone(entry.value());
        let generation = {
            let mut state = shared.lock();

            if state.actions_len() == 0 {
                return Dispatch::Ignored;
            }

            state.enqueue_event(event);
            state.touch();

            if state.is_executing() {
                debug!(
                    flow_id = ?id,
                    events = state.events_len(),
                    "drain loop running, event queued"
                );
                return Dispatch::Queued;
            }

            state.set_executing(true);
            state.generation()
        };
        drop(entry);

        let registry = self.clone();
        let id = id.clone();
        let handle = tokio::spawn(async move { registry.drain(id, shared, generation).await });

        Dispatch::Started(DrainHandle { handle })
    }

    /// Reset the flow of `id` to idle
    ///
    /// Empties both queues, opens registration and stops the flow. A step
    /// that is suspended mid-invocation is not interrupted, but its outcome
    /// is discarded and its drain loop stops when it returns. Safe to call
    /// on unknown identifiers and to call repeatedly.
    pub fn clear(&self, id: &K) {
        if let Some(entry) = self.inner.flows.get(id) {
            let mut state = entry.value().lock();
            let was_busy = !state.is_idle();
            state.reset();

            if was_busy {
                info!(registry = %self.inner.config.name, flow_id = ?id, "flow cleared");
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Check if steps are pending for `id`
    pub fn has_in_queue(&self, id: &K) -> bool {
        self.actions_queue_len(id) != 0
    }

    /// Number of pending steps for `id` (0 for unknown identifiers)
    pub fn actions_queue_len(&self, id: &K) -> usize {
        self.read(id, |state| state.actions_len()).unwrap_or(0)
    }

    /// Number of unconsumed events for `id` (0 for unknown identifiers)
    pub fn events_queue_len(&self, id: &K) -> usize {
        self.read(id, |state| state.events_len()).unwrap_or(0)
    }

    /// Check if a drain loop is running for `id`
    pub fn is_executing(&self, id: &K) -> bool {
        self.read(id, |state| state.is_executing()).unwrap_or(false)
    }

    /// Check if registration is closed for `id`
    pub fn is_locked(&self, id: &K) -> bool {
        self.read(id, |state| state.is_locked()).unwrap_or(false)
    }

    /// Result of the most recently completed step of `id`
    pub fn previous_result(&self, id: &K) -> Option<Arc<R>> {
        self.read(id, |state| state.previous_result()).flatten()
    }

    /// Point-in-time view of the flow of `id`
    pub fn snapshot(&self, id: &K) -> Option<FlowSnapshot> {
        self.read(id, |state| state.snapshot())
    }

    /// Check if the registry holds state for `id`
    pub fn contains(&self, id: &K) -> bool {
        self.inner.flows.contains_key(id)
    }

    /// Number of identifiers with state in the registry
    pub fn flow_count(&self) -> usize {
        self.inner.flows.len()
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Drop the state of flows that have been idle longer than the
    /// configured `idle_ttl`, returning how many were removed
    ///
    /// Only fully idle flows are eligible: nothing queued, not executing,
    /// not locked. Does nothing when eviction is disabled.
    pub fn evict_idle(&self) -> usize {
        let Some(ttl) = self.inner.config.idle_ttl else {
            return 0;
        };

        let before = self.inner.flows.len();
        self.inner.flows.retain(|_, shared| {
            let state = shared.lock();
            !(state.is_idle() && state.idle_for() >= ttl)
        });
        let evicted = before.saturating_sub(self.inner.flows.len());

        if evicted > 0 {
            info!(registry = %self.inner.config.name, evicted, "evicted idle flows");
        }
        evicted
    }

    /// Drop the state of an idle flow
    ///
    /// Returns `Ok(false)` for unknown identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::FlowBusy`] if the flow has pending work; clear it
    /// first.
    pub fn remove(&self, id: &K) -> Result<bool, FlowError> {
        if self
            .inner
            .flows
            .remove_if(id, |_, shared| shared.lock().is_idle())
            .is_some()
        {
            debug!(flow_id = ?id, "flow removed");
            return Ok(true);
        }

        if self.inner.flows.contains_key(id) {
            warn!(flow_id = ?id, "refusing to remove busy flow");
            return Err(FlowError::FlowBusy(format!("{:?}", id)));
        }
        Ok(false)
    }

    // =========================================================================
    // Internal Methods
    // =========================================================================

    fn read<T>(&self, id: &K, f: impl FnOnce(&FlowState<E, R>) -> T) -> Option<T> {
        self.inner
            .flows
            .get(id)
            .map(|entry| f(&entry.value().lock()))
    }

    /// Run steps against queued events until the batch drains, the events
    /// run out, a step fails or the flow is cleared
    #[instrument(skip(self, shared), fields(registry = %self.inner.config.name))]
    async fn drain(self, id: K, shared: SharedState<E, R>, generation: u64) -> DrainExit {
        loop {
            let (step, ctx) = {
                let mut state = shared.lock();

                if state.generation() != generation {
                    return DrainExit::Cleared;
                }

                let Some(step) = state.peek_first_action().cloned() else {
                    state.reset();
                    info!("flow completed");
                    return DrainExit::Completed;
                };

                let Some(event) = state.dequeue_event() else {
                    state.set_executing(false);
                    debug!(pending = state.actions_len(), "waiting for next event");
                    return DrainExit::AwaitingEvent;
                };

                (step, StepContext::new(event, state.previous_result()))
            };

            let outcome = match AssertUnwindSafe(step.run(ctx)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Err(StepError::new(panic_message(payload.as_ref()))
                    .with_kind("PANIC")),
            };

            let mut state = shared.lock();

            if state.generation() != generation {
                debug!("flow cleared while step was running, outcome discarded");
                return DrainExit::Cleared;
            }
            state.touch();

            match outcome {
                Ok(StepOutcome::Repeat) => {
                    debug!(events = state.events_len(), "step asked to repeat");
                }
                Ok(StepOutcome::Advance(result)) => {
                    state.dequeue_action();
                    state.set_previous_result(Some(Arc::new(result)));
                    debug!(pending = state.actions_len(), "step advanced");
                }
                Err(e) => {
                    error!(error = %e, "step failed, flow stalled until cleared");
                    state.record_failure(e.clone());
                    return DrainExit::Failed(e);
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("step panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("step panicked: {}", message)
    } else {
        "step panicked".to_string()
    }
}

impl<K, E, R> Debug for FlowRegistry<K, E, R>
where
    K: Debug + Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRegistry")
            .field("name", &self.inner.config.name)
            .field("flows", &self.inner.flows.len())
            .finish()
    }
}
