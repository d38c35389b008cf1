use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::lending::Loan;
use crate::types::{PaymentApplication, ScheduleStatus};

use super::RepaymentScheduleEntry;

/// portion of a payment that landed on one installment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentAllocation {
    pub installment_number: u32,
    pub to_fees: Money,
    pub to_interest: Money,
    pub to_principal: Money,
    pub status_after: ScheduleStatus,
}

impl InstallmentAllocation {
    pub fn total(&self) -> Money {
        self.to_fees + self.to_interest + self.to_principal
    }
}

/// result of allocating one payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub amount: Money,
    pub application: PaymentApplication,
    pub installments: Vec<InstallmentAllocation>,
    pub remaining_outstanding: Money,
    pub paid_at: DateTime<Utc>,
}

/// applies payments to a loan's schedule oldest installment first
#[derive(Debug, Clone, Copy, Default)]
pub struct RepaymentAllocator;

impl RepaymentAllocator {
    pub fn new() -> Self {
        Self
    }

    /// allocate a payment across the schedule and re-derive loan aggregates;
    /// on error the loan is left untouched
    pub fn allocate(
        &self,
        loan: &mut Loan,
        amount: Money,
        paid_at: DateTime<Utc>,
    ) -> Result<AllocationResult> {
        validate_payment(amount)?;

        let outstanding: Money = loan
            .schedule
            .iter()
            .filter(|e| e.status.is_eligible())
            .map(|e| e.remaining_due())
            .sum();

        if amount > outstanding {
            return Err(LedgerError::OverpaymentExceedsOutstanding {
                payment: amount,
                outstanding,
            });
        }

        let mut schedule = loan.schedule.clone();
        let mut installments = Vec::new();
        apply_in_order(&mut schedule, amount, paid_at, &mut installments);

        let application = installments.iter().fold(PaymentApplication::default(), |mut acc, a| {
            acc.to_fees += a.to_fees;
            acc.to_interest += a.to_interest;
            acc.to_principal += a.to_principal;
            acc
        });
        if application.total_applied() != amount {
            return Err(LedgerError::ScheduleMismatch {
                message: format!(
                    "{} allocated {} of a {} payment",
                    loan.loan_number,
                    application.total_applied(),
                    amount
                ),
            });
        }

        loan.schedule = schedule;
        loan.recompute_aggregates();

        debug!(
            loan = %loan.loan_number,
            %amount,
            to_principal = %application.to_principal,
            to_interest = %application.to_interest,
            to_fees = %application.to_fees,
            installments = installments.len(),
            "payment allocated"
        );

        Ok(AllocationResult {
            amount,
            application,
            installments,
            remaining_outstanding: loan.outstanding_total,
            paid_at,
        })
    }
}

/// payments must be positive and expressed in minor units
pub fn validate_payment(amount: Money) -> Result<()> {
    if !amount.is_positive() || Money::from_decimal_exact(amount.as_decimal()).is_none() {
        return Err(LedgerError::InvalidAmount {
            amount: amount.as_decimal().to_string(),
        });
    }
    Ok(())
}

/// apply to the earliest eligible installment, carrying any excess to the next
fn apply_in_order(
    schedule: &mut [RepaymentScheduleEntry],
    available: Money,
    paid_at: DateTime<Utc>,
    allocations: &mut Vec<InstallmentAllocation>,
) {
    if !available.is_positive() {
        return;
    }

    let next = schedule
        .iter_mut()
        .filter(|e| e.status.is_eligible() && !e.is_settled())
        .min_by_key(|e| e.installment_number);

    let Some(entry) = next else {
        return;
    };

    let allocation = apply_to_entry(entry, available, paid_at);
    let carried = available - allocation.total();
    allocations.push(allocation);

    apply_in_order(schedule, carried, paid_at, allocations);
}

/// fees first, then principal and interest pro-rated by the entry's own ratio
fn apply_to_entry(
    entry: &mut RepaymentScheduleEntry,
    available: Money,
    paid_at: DateTime<Utc>,
) -> InstallmentAllocation {
    let to_fees = available.min(entry.remaining_fees());
    let left = available - to_fees;

    let remaining_principal = entry.remaining_principal();
    let remaining_interest = entry.remaining_interest();
    let applied = left.min(remaining_principal + remaining_interest);

    let (to_interest, to_principal) = if applied == remaining_principal + remaining_interest {
        // full payment zeroes both remainders exactly
        (remaining_interest, remaining_principal)
    } else {
        let interest_share = applied
            .pro_rata(entry.interest_due, entry.principal_due + entry.interest_due)
            .min(remaining_interest);
        let to_principal = (applied - interest_share).min(remaining_principal);
        (applied - to_principal, to_principal)
    };

    entry.fees_paid += to_fees;
    entry.interest_paid += to_interest;
    entry.principal_paid += to_principal;
    entry.total_paid = entry.fees_paid + entry.interest_paid + entry.principal_paid;
    entry.settle_status(paid_at);

    InstallmentAllocation {
        installment_number: entry.installment_number,
        to_fees,
        to_interest,
        to_principal,
        status_after: entry.status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use crate::decimal::Rate;
    use crate::lending::LoanApplication;
    use crate::payments::AmortizationCalculator;
    use crate::types::{AccountId, InterestType, LoanNumber};

    fn flat_loan(principal: i64, rate: u32, tenure: u32) -> Loan {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let principal = Money::from_major(principal);
        let rate = Rate::from_percentage(rate);
        let schedule = AmortizationCalculator::new(InterestType::Flat)
            .generate_schedule(principal, rate, tenure, start)
            .unwrap();
        Loan::from_application(
            LoanApplication {
                loan_number: LoanNumber::new("LN-T"),
                customer_id: "C".to_string(),
                account_id: AccountId::new("ACC"),
                principal,
                tenure_months: tenure,
                schedule_start: Some(start),
                purpose: None,
            },
            "PL".to_string(),
            rate,
            InterestType::Flat,
            Money::ZERO,
            schedule,
            Utc::now(),
        )
    }

    #[test]
    fn test_partial_payment_pro_rated() {
        // 1000 principal + 100 interest per installment
        let mut loan = flat_loan(10_000, 1, 10);
        let result = RepaymentAllocator::new()
            .allocate(&mut loan, Money::from_major(550), Utc::now())
            .unwrap();

        assert_eq!(result.installments.len(), 1);
        assert_eq!(result.application.to_principal, Money::from_major(500));
        assert_eq!(result.application.to_interest, Money::from_major(50));
        assert_eq!(loan.schedule[0].status, ScheduleStatus::Partial);
        assert_eq!(loan.total_paid, Money::from_major(550));
        assert!(loan.verify_aggregates().is_ok());
    }

    #[test]
    fn test_excess_carries_to_next_installment() {
        let mut loan = flat_loan(10_000, 1, 10);
        let result = RepaymentAllocator::new()
            .allocate(&mut loan, Money::from_major(2_750), Utc::now())
            .unwrap();

        let numbers: Vec<u32> = result.installments.iter().map(|a| a.installment_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(result.application.total_applied(), Money::from_major(2_750));
        assert_eq!(loan.schedule[0].status, ScheduleStatus::Paid);
        assert_eq!(loan.schedule[1].status, ScheduleStatus::Paid);
        assert_eq!(loan.schedule[2].status, ScheduleStatus::Partial);
        assert_eq!(loan.schedule[2].total_paid, Money::from_major(550));
        assert_eq!(loan.outstanding_total, Money::from_major(8_250));
    }

    #[test]
    fn test_full_payment_zeroes_both_remainders() {
        let mut loan = flat_loan(10_000, 7, 3);
        let allocator = RepaymentAllocator::new();
        // uneven partials first, then the rest of installment 1
        allocator.allocate(&mut loan, Money::from_decimal(dec!(333.33)), Utc::now()).unwrap();
        allocator.allocate(&mut loan, Money::from_decimal(dec!(1000.01)), Utc::now()).unwrap();
        let rest = loan.schedule[0].remaining_due();
        allocator.allocate(&mut loan, rest, Utc::now()).unwrap();

        let first = &loan.schedule[0];
        assert_eq!(first.status, ScheduleStatus::Paid);
        assert_eq!(first.remaining_principal(), Money::ZERO);
        assert_eq!(first.remaining_interest(), Money::ZERO);
        assert!(loan.verify_aggregates().is_ok());
    }

    #[test]
    fn test_overpayment_rejected_without_change() {
        let mut loan = flat_loan(10_000, 1, 10);
        let before = loan.clone();
        let too_much = loan.outstanding_total + Money::MINOR_UNIT;

        let err = RepaymentAllocator::new()
            .allocate(&mut loan, too_much, Utc::now())
            .unwrap_err();
        assert!(matches!(err, LedgerError::OverpaymentExceedsOutstanding { .. }));
        assert_eq!(loan, before);
    }

    #[test]
    fn test_invalid_amounts() {
        let mut loan = flat_loan(10_000, 1, 10);
        let allocator = RepaymentAllocator::new();
        assert!(allocator.allocate(&mut loan, Money::ZERO, Utc::now()).is_err());
        assert!(allocator.allocate(&mut loan, Money::from_major(-5), Utc::now()).is_err());
    }

    #[test]
    fn test_fees_paid_before_interest_and_principal() {
        let mut loan = flat_loan(10_000, 1, 10);
        loan.schedule[0].add_fee(Money::from_major(40));
        loan.recompute_aggregates();

        let result = RepaymentAllocator::new()
            .allocate(&mut loan, Money::from_major(150), Utc::now())
            .unwrap();
        assert_eq!(result.application.to_fees, Money::from_major(40));
        assert_eq!(result.application.to_principal, Money::from_major(100));
        assert_eq!(result.application.to_interest, Money::from_major(10));
        assert_eq!(loan.fees_paid, Money::from_major(40));
    }

    #[test]
    fn test_exact_total_pays_everything() {
        let mut loan = flat_loan(50_000, 10, 5);
        let total = loan.total_amount;
        RepaymentAllocator::new().allocate(&mut loan, total, Utc::now()).unwrap();

        assert!(loan.is_fully_paid());
        assert_eq!(loan.outstanding_total, Money::ZERO);
        assert!(loan.schedule.iter().all(|e| e.status == ScheduleStatus::Paid));
    }

    #[test]
    fn test_waived_entries_are_skipped() {
        let mut loan = flat_loan(10_000, 1, 10);
        loan.schedule[0].status = ScheduleStatus::Waived;
        loan.recompute_aggregates();

        let result = RepaymentAllocator::new()
            .allocate(&mut loan, Money::from_major(100), Utc::now())
            .unwrap();
        assert_eq!(result.installments[0].installment_number, 2);
    }
}
