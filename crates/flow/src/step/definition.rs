//! Step trait definition

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{StepContext, StepOutcome};

/// Error type for step failures
///
/// Rejecting an event is not a failure: a step that does not like its input
/// returns [`StepOutcome::Repeat`]. `StepError` is reserved for faults the
/// step cannot handle itself. A failed step stalls its flow until the flow
/// is cleared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepError {
    /// Error message
    pub message: String,

    /// Error kind/code for programmatic handling
    pub kind: Option<String>,

    /// Additional error details (for debugging)
    pub details: Option<serde_json::Value>,
}

impl StepError {
    /// Create a new error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
            details: None,
        }
    }

    /// Set the error kind
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Add error details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            Some(kind) => write!(f, "{}: {}", kind, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for StepError {}

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{:#}", err))
    }
}

/// A step is one unit of work in a flow
///
/// Steps run strictly one at a time per identifier. Each invocation
/// receives the next event and the result of the previous completed step,
/// and answers with a [`StepOutcome`]. A step may await freely: only its
/// own flow is suspended while it does.
///
/// Async closures taking a [`StepContext`] implement this trait directly;
/// see [`from_fn`] for synchronous ones.
///
/// # Example
///
/// ```
/// use chatflow::prelude::*;
///
/// struct ParseWidth;
///
/// #[async_trait]
/// impl Step<String, u32> for ParseWidth {
///     async fn run(&self, ctx: StepContext<String, u32>) -> Result<StepOutcome<u32>, StepError> {
///         Ok(ctx.event.trim().parse::<u32>().ok().into())
///     }
/// }
/// ```
#[async_trait]
pub trait Step<E, R>: Send + Sync + 'static
where
    E: Send + 'static,
    R: Send + Sync + 'static,
{
    /// Run the step against one event
    ///
    /// # Errors
    ///
    /// Return `Ok(StepOutcome::Repeat)` for input the step rejects; return
    /// `Err` only for faults, which stall the flow.
    async fn run(&self, ctx: StepContext<E, R>) -> Result<StepOutcome<R>, StepError>;
}

#[async_trait]
impl<E, R, F, Fut> Step<E, R> for F
where
    E: Send + 'static,
    R: Send + Sync + 'static,
    F: Fn(StepContext<E, R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepOutcome<R>, StepError>> + Send + 'static,
{
    async fn run(&self, ctx: StepContext<E, R>) -> Result<StepOutcome<R>, StepError> {
        (self)(ctx).await
    }
}

/// Type-erased, shareable step
pub type DynStep<E, R> = Arc<dyn Step<E, R>>;

/// Adapter running a synchronous closure as a step
pub struct SyncStep<F> {
    f: F,
}

#[async_trait]
impl<E, R, F> Step<E, R> for SyncStep<F>
where
    E: Send + 'static,
    R: Send + Sync + 'static,
    F: Fn(StepContext<E, R>) -> Result<StepOutcome<R>, StepError> + Send + Sync + 'static,
{
    async fn run(&self, ctx: StepContext<E, R>) -> Result<StepOutcome<R>, StepError> {
        (self.f)(ctx)
    }
}

/// Erase a step into a [`DynStep`]
pub fn step<E, R>(s: impl Step<E, R>) -> DynStep<E, R>
where
    E: Send + 'static,
    R: Send + Sync + 'static,
{
    Arc::new(s)
}

/// Build a step from a synchronous closure
///
/// # Example
///
/// ```
/// use chatflow::prelude::*;
///
/// let echo: DynStep<String, String> =
///     from_fn(|ctx: StepContext<String, String>| Ok(StepOutcome::advance(ctx.event)));
/// ```
pub fn from_fn<E, R, F>(f: F) -> DynStep<E, R>
where
    E: Send + 'static,
    R: Send + Sync + 'static,
    F: Fn(StepContext<E, R>) -> Result<StepOutcome<R>, StepError> + Send + Sync + 'static,
{
    Arc::new(SyncStep { f })
}

/// Build a step from an async closure
///
/// Equivalent to [`step`], but lets the compiler infer the closure's
/// argument type.
pub fn from_async_fn<E, R, F, Fut>(f: F) -> DynStep<E, R>
where
    E: Send + 'static,
    R: Send + Sync + 'static,
    F: Fn(StepContext<E, R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepOutcome<R>, StepError>> + Send + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_display() {
        let error = StepError::new("connection refused");
        assert_eq!(error.to_string(), "connection refused");

        let error = error.with_kind("SEND_FAILED");
        assert_eq!(error.to_string(), "SEND_FAILED: connection refused");
    }

    #[test]
    fn test_step_error_from_anyhow() {
        let err = anyhow::anyhow!("disk full").context("writing image");
        let error: StepError = err.into();

        assert_eq!(error.message, "writing image: disk full");
        assert!(error.kind.is_none());
    }

    #[test]
    fn test_step_error_serialization() {
        let error = StepError::new("boom")
            .with_kind("TEST")
            .with_details(serde_json::json!({"attempt": 2}));

        let json = serde_json::to_string(&error).unwrap();
        let parsed: StepError = serde_json::from_str(&json).unwrap();

        assert_eq!(error, parsed);
    }

    #[tokio::test]
    async fn test_sync_step() {
        let double: DynStep<u32, u32> = from_fn(|ctx| Ok(StepOutcome::advance(ctx.event * 2)));

        let outcome = double.run(StepContext::new(21, None)).await.unwrap();
        assert_eq!(outcome, StepOutcome::Advance(42));
    }

    #[tokio::test]
    async fn test_async_closure_step() {
        let accumulate: DynStep<u32, u32> = from_async_fn(|ctx| async move {
            let previous = ctx.previous().copied().unwrap_or(0);
            Ok(StepOutcome::advance(previous + ctx.event))
        });

        let outcome = accumulate
            .run(StepContext::new(2, Some(Arc::new(40))))
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::Advance(42));
    }

    #[tokio::test]
    async fn test_struct_step() {
        struct RejectEmpty;

        #[async_trait]
        impl Step<String, String> for RejectEmpty {
            async fn run(
                &self,
                ctx: StepContext<String, String>,
            ) -> Result<StepOutcome<String>, StepError> {
                if ctx.event.is_empty() {
                    Ok(StepOutcome::repeat())
                } else {
                    Ok(StepOutcome::advance(ctx.event))
                }
            }
        }

        let s = step(RejectEmpty);
        let outcome = s.run(StepContext::new(String::new(), None)).await.unwrap();
        assert!(outcome.is_repeat());
    }
}
