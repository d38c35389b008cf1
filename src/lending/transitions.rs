use crate::errors::{LedgerError, Result};
use crate::types::{LoanAction, LoanStatus};

/// status a loan moves to when `action` is applied, or None when illegal
pub fn next_status(status: LoanStatus, action: LoanAction) -> Option<LoanStatus> {
    use LoanAction as A;
    use LoanStatus as S;

    match (status, action) {
        (S::Applied, A::Review) => Some(S::Pending),
        (S::Applied | S::Pending, A::Approve) => Some(S::Approved),
        (S::Applied | S::Pending, A::Reject) => Some(S::Rejected),
        (S::Approved, A::Disburse) => Some(S::Disbursed),
        (S::Disbursed, A::Activate) => Some(S::Active),
        (S::Active | S::Overdue, A::Repay) => Some(status),
        (S::Active | S::Overdue, A::AssessFee) => Some(status),
        (S::Active, A::MarkOverdue) => Some(S::Overdue),
        (S::Overdue, A::Cure) => Some(S::Active),
        (S::Active | S::Overdue, A::Close) => Some(S::Closed),
        (S::Overdue, A::Default) => Some(S::Defaulted),
        (S::Overdue | S::Defaulted, A::WriteOff) => Some(S::WrittenOff),
        _ => None,
    }
}

/// like `next_status`, failing with InvalidTransition
pub fn ensure_transition(status: LoanStatus, action: LoanAction) -> Result<LoanStatus> {
    next_status(status, action).ok_or(LedgerError::InvalidTransition { status, action })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [LoanStatus; 10] = [
        LoanStatus::Applied,
        LoanStatus::Pending,
        LoanStatus::Approved,
        LoanStatus::Rejected,
        LoanStatus::Disbursed,
        LoanStatus::Active,
        LoanStatus::Overdue,
        LoanStatus::Defaulted,
        LoanStatus::Closed,
        LoanStatus::WrittenOff,
    ];

    const ALL_ACTIONS: [LoanAction; 12] = [
        LoanAction::Review,
        LoanAction::Approve,
        LoanAction::Reject,
        LoanAction::Disburse,
        LoanAction::Activate,
        LoanAction::Repay,
        LoanAction::MarkOverdue,
        LoanAction::Cure,
        LoanAction::Close,
        LoanAction::Default,
        LoanAction::WriteOff,
        LoanAction::AssessFee,
    ];

    #[test]
    fn test_terminal_states_are_sinks() {
        for status in ALL_STATUSES.iter().filter(|s| s.is_terminal()) {
            for action in ALL_ACTIONS {
                assert_eq!(next_status(*status, action), None, "{:?} + {:?}", status, action);
            }
        }
    }

    #[test]
    fn test_happy_path() {
        let mut status = LoanStatus::Applied;
        for action in [LoanAction::Review, LoanAction::Approve, LoanAction::Disburse, LoanAction::Activate, LoanAction::Close] {
            status = ensure_transition(status, action).unwrap();
        }
        assert_eq!(status, LoanStatus::Closed);
    }

    #[test]
    fn test_write_off_only_from_overdue_or_defaulted() {
        for status in ALL_STATUSES {
            let allowed = next_status(status, LoanAction::WriteOff).is_some();
            assert_eq!(allowed, matches!(status, LoanStatus::Overdue | LoanStatus::Defaulted));
        }
    }

    #[test]
    fn test_repayment_only_when_performing_or_overdue() {
        for status in ALL_STATUSES {
            assert_eq!(next_status(status, LoanAction::Repay).is_some(), status.accepts_repayment());
        }
    }

    #[test]
    fn test_approve_and_reject_from_applied_or_pending() {
        for status in ALL_STATUSES {
            let expected = matches!(status, LoanStatus::Applied | LoanStatus::Pending);
            assert_eq!(next_status(status, LoanAction::Approve).is_some(), expected);
            assert_eq!(next_status(status, LoanAction::Reject).is_some(), expected);
        }
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = ensure_transition(LoanStatus::Approved, LoanAction::Repay).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InvalidTransition {
                status: LoanStatus::Approved,
                action: LoanAction::Repay
            }
        );
    }
}
