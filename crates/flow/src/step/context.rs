//! Step invocation context

use std::sync::Arc;

/// Input of a single step invocation
///
/// `previous_result` is the value returned by the most recently completed
/// step of the same flow, shared by `Arc` so the next step sees the very
/// same allocation. It is `None` for the first step of a batch.
#[derive(Debug)]
pub struct StepContext<E, R> {
    /// The event consumed by this invocation
    pub event: E,

    /// Result of the previous completed step
    pub previous_result: Option<Arc<R>>,
}

impl<E, R> StepContext<E, R> {
    /// Create a new context
    pub fn new(event: E, previous_result: Option<Arc<R>>) -> Self {
        Self {
            event,
            previous_result,
        }
    }

    /// Borrow the previous result
    pub fn previous(&self) -> Option<&R> {
        self.previous_result.as_deref()
    }

    /// Split into event and previous result
    pub fn into_parts(self) -> (E, Option<Arc<R>>) {
        (self.event, self.previous_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_previous_borrows_shared_result() {
        let shared = Arc::new(vec![1, 2]);
        let ctx = StepContext::new("event", Some(shared.clone()));

        assert_eq!(ctx.previous(), Some(&vec![1, 2]));

        let (event, previous) = ctx.into_parts();
        assert_eq!(event, "event");
        assert!(Arc::ptr_eq(&previous.unwrap(), &shared));
    }

    #[test]
    fn test_first_step_has_no_previous() {
        let ctx: StepContext<&str, u32> = StepContext::new("x", None);
        assert!(ctx.previous().is_none());
    }
}
