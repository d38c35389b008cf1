use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::payments::RepaymentScheduleEntry;
use crate::types::{AccountId, InterestType, LoanId, LoanNumber, LoanStatus, ScheduleStatus};

/// inputs captured when a customer applies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub loan_number: LoanNumber,
    pub customer_id: String,
    /// ledger account the loan is disbursed through and repaid into
    pub account_id: AccountId,
    pub principal: Money,
    pub tenure_months: u32,
    /// first installment falls one month after this date; defaults to the application date
    pub schedule_start: Option<NaiveDate>,
    pub purpose: Option<String>,
}

/// loan aggregate: terms, derived figures and its schedule, saved as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    // identification
    pub id: LoanId,
    pub loan_number: LoanNumber,
    pub customer_id: String,
    pub account_id: AccountId,
    pub product_code: String,
    pub purpose: Option<String>,

    // terms
    pub principal: Money,
    pub interest_rate: Rate,
    pub interest_type: InterestType,
    pub tenure_months: u32,
    pub total_interest: Money,
    pub total_amount: Money,
    pub processing_fee: Money,
    pub disbursed_amount: Option<Money>,

    // derived from the schedule, never incremented directly
    pub principal_paid: Money,
    pub interest_paid: Money,
    pub fees_paid: Money,
    pub total_paid: Money,
    pub outstanding_principal: Money,
    pub outstanding_interest: Money,
    pub outstanding_fees: Money,
    pub outstanding_total: Money,
    pub waived_amount: Money,

    // delinquency
    pub days_overdue: u32,
    pub overdue_amount: Money,

    // status
    pub status: LoanStatus,
    pub approved_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub write_off_reason: Option<String>,
    pub written_off_amount: Option<Money>,

    // dates
    pub application_date: DateTime<Utc>,
    pub approval_date: Option<DateTime<Utc>>,
    pub disbursement_date: Option<DateTime<Utc>>,
    pub maturity_date: Option<NaiveDate>,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub last_status_change: DateTime<Utc>,

    pub schedule: Vec<RepaymentScheduleEntry>,
}

impl Loan {
    /// assemble a freshly applied loan around a generated schedule
    pub(crate) fn from_application(
        application: LoanApplication,
        product_code: String,
        interest_rate: Rate,
        interest_type: InterestType,
        processing_fee: Money,
        schedule: Vec<RepaymentScheduleEntry>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut loan = Self {
            id: Uuid::new_v4(),
            loan_number: application.loan_number,
            customer_id: application.customer_id,
            account_id: application.account_id,
            product_code,
            purpose: application.purpose,
            principal: application.principal,
            interest_rate,
            interest_type,
            tenure_months: application.tenure_months,
            total_interest: Money::ZERO,
            total_amount: Money::ZERO,
            processing_fee,
            disbursed_amount: None,
            principal_paid: Money::ZERO,
            interest_paid: Money::ZERO,
            fees_paid: Money::ZERO,
            total_paid: Money::ZERO,
            outstanding_principal: Money::ZERO,
            outstanding_interest: Money::ZERO,
            outstanding_fees: Money::ZERO,
            outstanding_total: Money::ZERO,
            waived_amount: Money::ZERO,
            days_overdue: 0,
            overdue_amount: Money::ZERO,
            status: LoanStatus::Applied,
            approved_by: None,
            rejection_reason: None,
            write_off_reason: None,
            written_off_amount: None,
            application_date: now,
            approval_date: None,
            disbursement_date: None,
            maturity_date: None,
            last_payment_date: None,
            last_status_change: now,
            schedule,
        };
        loan.recompute_aggregates();
        loan
    }

    /// re-derive every loan-level figure as a sum over the schedule
    pub fn recompute_aggregates(&mut self) {
        let mut totals = ScheduleTotals::default();
        for entry in &self.schedule {
            totals.absorb(entry);
        }

        self.total_interest = totals.interest_due;
        self.total_amount = totals.total_due;
        self.principal_paid = totals.principal_paid;
        self.interest_paid = totals.interest_paid;
        self.fees_paid = totals.fees_paid;
        self.total_paid = totals.principal_paid + totals.interest_paid + totals.fees_paid;
        self.outstanding_principal = totals.outstanding_principal;
        self.outstanding_interest = totals.outstanding_interest;
        self.outstanding_fees = totals.outstanding_fees;
        self.outstanding_total =
            totals.outstanding_principal + totals.outstanding_interest + totals.outstanding_fees;
        self.waived_amount = totals.waived;
    }

    /// fail with ScheduleMismatch if stored aggregates drifted from the schedule
    pub fn verify_aggregates(&self) -> Result<()> {
        let mut derived = self.clone();
        derived.recompute_aggregates();

        let checks = [
            ("total_amount", self.total_amount, derived.total_amount),
            ("total_paid", self.total_paid, derived.total_paid),
            ("principal_paid", self.principal_paid, derived.principal_paid),
            ("interest_paid", self.interest_paid, derived.interest_paid),
            ("fees_paid", self.fees_paid, derived.fees_paid),
            ("outstanding_total", self.outstanding_total, derived.outstanding_total),
        ];
        for (field, stored, expected) in checks {
            if stored != expected {
                return Err(LedgerError::ScheduleMismatch {
                    message: format!("{} is {} but schedule gives {}", field, stored, expected),
                });
            }
        }

        let identity = self.total_amount - self.total_paid - self.waived_amount;
        if self.outstanding_total != identity {
            return Err(LedgerError::ScheduleMismatch {
                message: format!(
                    "outstanding_total {} != total_amount - total_paid - waived {}",
                    self.outstanding_total, identity
                ),
            });
        }
        Ok(())
    }

    /// earliest installment still accepting payment
    pub fn next_due(&self) -> Option<&RepaymentScheduleEntry> {
        self.schedule
            .iter()
            .filter(|e| e.status.is_eligible())
            .min_by_key(|e| e.installment_number)
    }

    pub fn installment(&self, number: u32) -> Option<&RepaymentScheduleEntry> {
        self.schedule.iter().find(|e| e.installment_number == number)
    }

    pub(crate) fn installment_mut(&mut self, number: u32) -> Option<&mut RepaymentScheduleEntry> {
        self.schedule.iter_mut().find(|e| e.installment_number == number)
    }

    pub fn is_fully_paid(&self) -> bool {
        self.outstanding_total.is_zero()
            && self
                .schedule
                .iter()
                .all(|e| matches!(e.status, ScheduleStatus::Paid | ScheduleStatus::Waived))
    }

    /// aggregate name used by the store for conflicts and locking
    pub fn aggregate_key(&self) -> String {
        format!("loan:{}", self.loan_number)
    }

    pub(crate) fn update_status(&mut self, new_status: LoanStatus, timestamp: DateTime<Utc>) {
        self.status = new_status;
        self.last_status_change = timestamp;
    }

    /// get json representation for audit snapshots
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("JSON error: {}", e))
    }
}

#[derive(Default)]
struct ScheduleTotals {
    interest_due: Money,
    total_due: Money,
    principal_paid: Money,
    interest_paid: Money,
    fees_paid: Money,
    outstanding_principal: Money,
    outstanding_interest: Money,
    outstanding_fees: Money,
    waived: Money,
}

impl ScheduleTotals {
    fn absorb(&mut self, entry: &RepaymentScheduleEntry) {
        self.interest_due += entry.interest_due;
        self.total_due += entry.total_due;
        self.principal_paid += entry.principal_paid;
        self.interest_paid += entry.interest_paid;
        self.fees_paid += entry.fees_paid;

        if entry.status == ScheduleStatus::Waived {
            self.waived += entry.remaining_due();
        } else {
            self.outstanding_principal += entry.remaining_principal();
            self.outstanding_interest += entry.remaining_interest();
            self.outstanding_fees += entry.remaining_fees();
        }
    }
}
