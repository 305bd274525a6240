//! Migration engine states
//!
//! ```text
//! Idle -> Validating -> Validated | Rejected
//! Validated -> IndexesDisabled -> BulkCopying -> IndexesRebuilt -> AggregatesRefreshed -> Done
//! Idle -> Done                      (already migrated)
//! any non-terminal -> Aborted
//! ```

use serde::Serialize;

use crate::error::{MigrateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MigrationState {
    Idle,
    Validating,
    Validated,
    Rejected,
    IndexesDisabled,
    BulkCopying,
    IndexesRebuilt,
    AggregatesRefreshed,
    Done,
    Aborted,
}

impl MigrationState {
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationState::Idle => "idle",
            MigrationState::Validating => "validating",
            MigrationState::Validated => "validated",
            MigrationState::Rejected => "rejected",
            MigrationState::IndexesDisabled => "indexes_disabled",
            MigrationState::BulkCopying => "bulk_copying",
            MigrationState::IndexesRebuilt => "indexes_rebuilt",
            MigrationState::AggregatesRefreshed => "aggregates_refreshed",
            MigrationState::Done => "done",
            MigrationState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MigrationState::Rejected | MigrationState::Done | MigrationState::Aborted
        )
    }

    pub fn can_transition_to(self, next: MigrationState) -> bool {
        use MigrationState::*;

        if next == Aborted {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Idle, Validating)
                | (Idle, Done)
                | (Validating, Validated)
                | (Validating, Rejected)
                | (Validated, IndexesDisabled)
                | (IndexesDisabled, BulkCopying)
                | (BulkCopying, IndexesRebuilt)
                | (IndexesRebuilt, AggregatesRefreshed)
                | (AggregatesRefreshed, Done)
        )
    }

    /// Move to `next`, refusing transitions outside the graph above
    pub fn advance(&mut self, next: MigrationState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(MigrateError::InvalidTransition {
                from: *self,
                to: next,
            });
        }
        tracing::debug!(from = %self, to = %next, "Migration state change");
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use MigrationState::*;

    #[test]
    fn test_happy_path() {
        let mut state = Idle;
        for next in [
            Validating,
            Validated,
            IndexesDisabled,
            BulkCopying,
            IndexesRebuilt,
            AggregatesRefreshed,
            Done,
        ] {
            state.advance(next).unwrap();
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn test_rejection_is_terminal() {
        let mut state = Idle;
        state.advance(Validating).unwrap();
        state.advance(Rejected).unwrap();
        assert!(state.advance(Aborted).is_err());
        assert!(state.advance(IndexesDisabled).is_err());
    }

    #[test]
    fn test_abort_from_any_running_state() {
        for from in [Idle, Validating, Validated, IndexesDisabled, BulkCopying, IndexesRebuilt] {
            assert!(from.can_transition_to(Aborted), "{from} -> aborted");
        }
        assert!(!Done.can_transition_to(Aborted));
    }

    #[test]
    fn test_skipping_steps_is_refused() {
        assert!(!Idle.can_transition_to(BulkCopying));
        assert!(!Validated.can_transition_to(BulkCopying));
        assert!(!BulkCopying.can_transition_to(AggregatesRefreshed));

        let mut state = Validating;
        let err = state.advance(Done).unwrap_err();
        assert_eq!(state, Validating);
        assert!(err.to_string().contains("validating"));
    }
}
