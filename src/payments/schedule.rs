use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::ScheduleStatus;

/// one installment of a loan's repayment plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepaymentScheduleEntry {
    pub installment_number: u32,
    pub due_date: NaiveDate,
    pub principal_due: Money,
    pub interest_due: Money,
    /// late fees assessed against this installment
    pub fee_due: Money,
    pub total_due: Money,
    pub principal_paid: Money,
    pub interest_paid: Money,
    pub fees_paid: Money,
    pub total_paid: Money,
    /// principal still owed once this installment is paid
    pub outstanding_balance: Money,
    pub status: ScheduleStatus,
    pub paid_date: Option<DateTime<Utc>>,
}

impl RepaymentScheduleEntry {
    pub fn new(
        installment_number: u32,
        due_date: NaiveDate,
        principal_due: Money,
        interest_due: Money,
        outstanding_balance: Money,
    ) -> Self {
        Self {
            installment_number,
            due_date,
            principal_due,
            interest_due,
            fee_due: Money::ZERO,
            total_due: principal_due + interest_due,
            principal_paid: Money::ZERO,
            interest_paid: Money::ZERO,
            fees_paid: Money::ZERO,
            total_paid: Money::ZERO,
            outstanding_balance,
            status: ScheduleStatus::Pending,
            paid_date: None,
        }
    }

    pub fn remaining_principal(&self) -> Money {
        (self.principal_due - self.principal_paid).max(Money::ZERO)
    }

    pub fn remaining_interest(&self) -> Money {
        (self.interest_due - self.interest_paid).max(Money::ZERO)
    }

    pub fn remaining_fees(&self) -> Money {
        (self.fee_due - self.fees_paid).max(Money::ZERO)
    }

    pub fn remaining_due(&self) -> Money {
        (self.total_due - self.total_paid).max(Money::ZERO)
    }

    /// paid within one minor unit of tolerance
    pub fn is_settled(&self) -> bool {
        self.remaining_due() < Money::MINOR_UNIT
    }

    /// due date has passed without full payment
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.status != ScheduleStatus::Waived && !self.is_settled() && self.due_date < today
    }

    /// add a late fee, keeping total_due consistent
    pub fn add_fee(&mut self, fee: Money) {
        self.fee_due += fee;
        self.total_due += fee;
    }

    /// status after a payment lands
    pub(crate) fn settle_status(&mut self, paid_at: DateTime<Utc>) {
        if self.is_settled() {
            self.status = ScheduleStatus::Paid;
            self.paid_date = Some(paid_at);
        } else if self.total_paid.is_positive() {
            self.status = ScheduleStatus::Partial;
        }
    }

    /// re-derive the overdue flag against today's date
    pub(crate) fn refresh_overdue(&mut self, today: NaiveDate) -> bool {
        if !self.status.is_eligible() {
            return false;
        }
        if self.is_past_due(today) {
            self.status = ScheduleStatus::Overdue;
            true
        } else {
            self.status = if self.total_paid.is_positive() {
                ScheduleStatus::Partial
            } else {
                ScheduleStatus::Pending
            };
            false
        }
    }

    /// days since the due date, zero when not past due
    pub fn days_past_due(&self, today: NaiveDate) -> u32 {
        if self.is_past_due(today) {
            (today - self.due_date).num_days().max(0) as u32
        } else {
            0
        }
    }
}
