//! Queue status transition table.
//!
//! The legal transitions are:
//! `pending -> processing`, `processing -> processed`,
//! `processing -> failed`, and `failed(temporary) -> pending` (requeue).
//! Manual operator requeue additionally allows `failed(permanent) -> pending`.

use crate::errors::{CoreError, Result};
use crate::queue::{FailureKind, MutationStatus};

impl MutationStatus {
    /// Whether the automatic lifecycle allows moving from `self` to `to`.
    pub fn can_transition(self, to: MutationStatus, failure_kind: Option<FailureKind>) -> bool {
        use MutationStatus::*;
        match (self, to) {
            (Pending, Processing) => true,
            (Processing, Processed) => true,
            (Processing, Failed) => true,
            (Failed, Pending) => failure_kind == Some(FailureKind::Temporary),
            _ => false,
        }
    }

    /// Guarded transition used by the repository; `InvalidTransition`
    /// for anything outside the table.
    pub fn transition(self, to: MutationStatus, failure_kind: Option<FailureKind>) -> Result<()> {
        if self.can_transition(to, failure_kind) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition { from: self, to })
        }
    }

    /// Remove is only legal once an item has settled.
    pub fn is_removable(self) -> bool {
        matches!(self, MutationStatus::Failed | MutationStatus::Processed)
    }

    /// Active items hold their idempotency key: a second enqueue with the
    /// same key must be rejected while one of these exists.
    pub fn is_active(self) -> bool {
        !matches!(self, MutationStatus::Processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MutationStatus::*;

    #[test]
    fn legal_transitions_accepted() {
        assert!(Pending.can_transition(Processing, None));
        assert!(Processing.can_transition(Processed, None));
        assert!(Processing.can_transition(Failed, Some(FailureKind::Temporary)));
        assert!(Failed.can_transition(Pending, Some(FailureKind::Temporary)));
    }

    #[test]
    fn illegal_transitions_rejected() {
        assert!(!Pending.can_transition(Processed, None));
        assert!(!Processed.can_transition(Pending, None));
        assert!(!Processed.can_transition(Processing, None));
        assert!(!Failed.can_transition(Processing, Some(FailureKind::Temporary)));
    }

    #[test]
    fn permanent_failure_does_not_requeue_automatically() {
        assert!(!Failed.can_transition(Pending, Some(FailureKind::Permanent)));
        assert!(!Failed.can_transition(Pending, None));
    }

    #[test]
    fn transition_error_carries_endpoints() {
        let err = Processed.transition(Pending, None).unwrap_err();
        match err {
            CoreError::InvalidTransition { from, to } => {
                assert_eq!(from, Processed);
                assert_eq!(to, Pending);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn removable_only_when_settled() {
        assert!(Failed.is_removable());
        assert!(Processed.is_removable());
        assert!(!Pending.is_removable());
        assert!(!Processing.is_removable());
    }
}
