//! Step outcomes

/// What a step asks the scheduler to do after it returns
///
/// `Advance` consumes the step and makes its value the `previous_result`
/// of the next one. `Repeat` keeps the step at the head of the queue and
/// re-runs it, unchanged, with the next event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome<R> {
    /// The step is satisfied; thread the value forward
    Advance(R),

    /// The event was not acceptable; wait for the next one
    Repeat,
}

impl<R> StepOutcome<R> {
    /// Create an advancing outcome
    pub fn advance(result: R) -> Self {
        Self::Advance(result)
    }

    /// Create a repeat outcome
    pub fn repeat() -> Self {
        Self::Repeat
    }

    /// Check if this outcome keeps the step at the head of the queue
    pub fn is_repeat(&self) -> bool {
        matches!(self, Self::Repeat)
    }

    /// Check if this outcome consumes the step
    pub fn is_advance(&self) -> bool {
        matches!(self, Self::Advance(_))
    }

    /// Get the advancing value, if any
    pub fn into_result(self) -> Option<R> {
        match self {
            Self::Advance(result) => Some(result),
            Self::Repeat => None,
        }
    }

    /// Map the advancing value
    pub fn map<U>(self, f: impl FnOnce(R) -> U) -> StepOutcome<U> {
        match self {
            Self::Advance(result) => StepOutcome::Advance(f(result)),
            Self::Repeat => StepOutcome::Repeat,
        }
    }
}

impl<R> From<Option<R>> for StepOutcome<R> {
    /// `Some` advances, `None` repeats
    fn from(value: Option<R>) -> Self {
        match value {
            Some(result) => Self::Advance(result),
            None => Self::Repeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(StepOutcome::advance(1).is_advance());
        assert!(!StepOutcome::advance(1).is_repeat());
        assert!(StepOutcome::<i32>::repeat().is_repeat());
    }

    #[test]
    fn test_into_result() {
        assert_eq!(StepOutcome::advance("w").into_result(), Some("w"));
        assert_eq!(StepOutcome::<&str>::Repeat.into_result(), None);
    }

    #[test]
    fn test_map_keeps_repeat() {
        let doubled = StepOutcome::advance(21).map(|n| n * 2);
        assert_eq!(doubled, StepOutcome::Advance(42));

        let repeat = StepOutcome::<i32>::Repeat.map(|n| n * 2);
        assert_eq!(repeat, StepOutcome::Repeat);
    }

    #[test]
    fn test_from_option() {
        let parsed: StepOutcome<u32> = "640".parse::<u32>().ok().into();
        assert_eq!(parsed, StepOutcome::Advance(640));

        let rejected: StepOutcome<u32> = "wide".parse::<u32>().ok().into();
        assert!(rejected.is_repeat());
    }
}
