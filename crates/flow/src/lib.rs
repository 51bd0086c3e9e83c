//! # Chatflow
//!
//! A per-identifier sequential step scheduler for conversational flows.
//!
//! Callers register an ordered batch of asynchronous steps under an
//! identifier (a chat user, a session) and then feed it external events one
//! at a time. The registry guarantees that, for each identifier, steps run
//! one at a time in registration order, each consuming the next event in
//! arrival order together with the result of the previous step. A step that
//! rejects its event returns [`StepOutcome::Repeat`] and is re-run with the
//! next one instead of advancing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       FlowRegistry                           │
//! │  (register / execute / clear / queries, spawns drain loops)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  one per identifier
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        FlowState                             │
//! │  (actions queue, events queue, executing, locked, result)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      FifoQueue<T>                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Different identifiers drain on independent tokio tasks. For a single
//! identifier the `executing` flag guarantees at most one drain loop.
//!
//! ## Example
//!
//! ```
//! use chatflow::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), FlowError> {
//! let registry: FlowRegistry<&str, String, u32> = FlowRegistry::new();
//!
//! let width: DynStep<String, u32> =
//!     from_fn(|ctx: StepContext<String, u32>| Ok(ctx.event.trim().parse::<u32>().ok().into()));
//! registry.register("u1", vec![width])?;
//!
//! // Rejected: the step repeats and waits for the next event
//! let handle = registry.execute(&"u1", "wide".into()).into_handle().unwrap();
//! assert_eq!(handle.join().await, DrainExit::AwaitingEvent);
//!
//! let handle = registry.execute(&"u1", "640".into()).into_handle().unwrap();
//! assert_eq!(handle.join().await, DrainExit::Completed);
//! assert!(!registry.has_in_queue(&"u1"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod queue;
pub mod registry;
pub mod state;
pub mod step;

pub use async_trait::async_trait;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::RegistryConfig;
    pub use crate::error::FlowError;
    pub use crate::registry::{Dispatch, DrainExit, DrainHandle, FlowRegistry, Registration};
    pub use crate::state::FlowSnapshot;
    pub use crate::step::{
        from_async_fn, from_fn, step, DynStep, Step, StepContext, StepError, StepOutcome,
    };
    pub use async_trait::async_trait;
}

// Re-export key types at crate root
pub use config::RegistryConfig;
pub use error::FlowError;
pub use queue::FifoQueue;
pub use registry::{Dispatch, DrainExit, DrainHandle, FlowRegistry, Registration};
pub use state::{FlowSnapshot, FlowState};
pub use step::{
    from_async_fn, from_fn, step, DynStep, Step, StepContext, StepError, StepOutcome, SyncStep,
};
