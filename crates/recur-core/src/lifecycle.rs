//! Series status state machine.
//!
//! ```text
//! active ──pause──▶ paused ──resume──▶ active
//! active | paused ──complete──▶ completed
//! active | paused ──cancel──▶ cancelled   (terminal)
//! ```

use crate::error::CoreError;
use crate::models::{RecurrencePattern, SeriesStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Pause,
    Resume,
    Complete,
    Cancel,
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Pause => write!(f, "pause"),
            Transition::Resume => write!(f, "resume"),
            Transition::Complete => write!(f, "complete"),
            Transition::Cancel => write!(f, "cancel"),
        }
    }
}

impl Transition {
    /// Status reached by applying this transition to `from`.
    pub fn apply(self, from: SeriesStatus) -> Result<SeriesStatus, CoreError> {
        use crate::models::SeriesStatus::*;

        let to = match (self, from) {
            (Transition::Pause, Active) => Paused,
            (Transition::Resume, Paused) => Active,
            (Transition::Complete, Active | Paused) => Completed,
            (Transition::Cancel, Active | Paused) => Cancelled,
            (transition, status) => {
                return Err(CoreError::IllegalState(format!(
                    "cannot {} a {} series",
                    transition, status
                )))
            }
        };
        Ok(to)
    }
}

/// Fails with `IllegalState` when the series is cancelled.
pub fn ensure_not_cancelled(pattern: &RecurrencePattern) -> Result<(), CoreError> {
    if pattern.is_cancelled() {
        return Err(CoreError::IllegalState(format!(
            "series {} is cancelled",
            pattern.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use crate::models::SeriesStatus::*;

    #[rstest]
    #[case(Transition::Pause, Active, Paused)]
    #[case(Transition::Resume, Paused, Active)]
    #[case(Transition::Complete, Active, Completed)]
    #[case(Transition::Complete, Paused, Completed)]
    #[case(Transition::Cancel, Active, Cancelled)]
    #[case(Transition::Cancel, Paused, Cancelled)]
    fn test_allowed(#[case] transition: Transition, #[case] from: SeriesStatus, #[case] to: SeriesStatus) {
        assert_eq!(transition.apply(from).unwrap(), to);
    }

    #[rstest]
    #[case(Transition::Pause, Paused)]
    #[case(Transition::Resume, Active)]
    #[case(Transition::Complete, Completed)]
    #[case(Transition::Cancel, Completed)]
    #[case(Transition::Pause, Cancelled)]
    #[case(Transition::Resume, Cancelled)]
    #[case(Transition::Complete, Cancelled)]
    #[case(Transition::Cancel, Cancelled)]
    fn test_rejected(#[case] transition: Transition, #[case] from: SeriesStatus) {
        assert!(matches!(transition.apply(from), Err(CoreError::IllegalState(_))));
    }
}
