//! Errors surfaced by the scheduler

/// Errors from registry operations
///
/// Expected steady-state situations (registering against a locked flow,
/// executing against a flow with nothing queued) are not errors; they are
/// reported through [`Registration`](crate::Registration) and
/// [`Dispatch`](crate::Dispatch). Failures of the steps themselves are
/// [`StepError`](crate::StepError)s.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// A caller passed an argument the scheduler cannot act on
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Registry configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The flow still has queued work or a running drain loop
    #[error("flow {0} is busy")]
    FlowBusy(String),
}
