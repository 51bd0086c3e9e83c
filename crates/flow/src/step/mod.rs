//! Step abstractions
//!
//! This module contains the building blocks a flow is made of:
//! - [`Step`] trait for the unit of work run against one event
//! - [`StepOutcome`] enum telling the scheduler to advance or repeat
//! - [`StepContext`] passed into every invocation
//! - [`StepError`] for failures outside the repeat protocol

mod context;
mod definition;
mod outcome;

pub use context::StepContext;
pub use definition::{from_async_fn, from_fn, step, DynStep, Step, StepError, SyncStep};
pub use outcome::StepOutcome;
