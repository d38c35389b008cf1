use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::types::InterestType;

use super::RepaymentScheduleEntry;

/// figures of a prospective loan, without creating one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanQuote {
    pub installment_amount: Money,
    pub total_interest: Money,
    pub total_amount: Money,
    pub processing_fee: Money,
    pub net_disbursement: Money,
}

/// amortization calculator
#[derive(Debug, Clone, Copy)]
pub struct AmortizationCalculator {
    interest_type: InterestType,
}

impl AmortizationCalculator {
    pub fn new(interest_type: InterestType) -> Self {
        Self { interest_type }
    }

    /// generate the full schedule; identical inputs always give an identical schedule
    pub fn generate_schedule(
        &self,
        principal: Money,
        annual_rate: Rate,
        tenure_months: u32,
        start_date: NaiveDate,
    ) -> Result<Vec<RepaymentScheduleEntry>> {
        if !principal.is_positive() {
            return Err(LedgerError::InvalidAmount {
                amount: principal.to_string(),
            });
        }
        if tenure_months == 0 || annual_rate.is_negative() {
            return Err(LedgerError::InvalidConfiguration {
                message: format!(
                    "cannot amortize over {} months at {}",
                    tenure_months, annual_rate
                ),
            });
        }

        match self.interest_type {
            InterestType::Flat | InterestType::Fixed => {
                self.linear_schedule(principal, annual_rate, tenure_months, start_date)
            }
            InterestType::Reducing => {
                self.reducing_schedule(principal, annual_rate, tenure_months, start_date)
            }
        }
    }

    /// installment, interest and fee figures for a prospective loan
    pub fn quote(
        &self,
        principal: Money,
        annual_rate: Rate,
        tenure_months: u32,
        processing_fee_percentage: Decimal,
        start_date: NaiveDate,
    ) -> Result<LoanQuote> {
        let schedule = self.generate_schedule(principal, annual_rate, tenure_months, start_date)?;
        let total_interest: Money = schedule.iter().map(|e| e.interest_due).sum();
        let processing_fee = compute_processing_fee(principal, processing_fee_percentage);

        Ok(LoanQuote {
            installment_amount: schedule[0].total_due,
            total_interest,
            total_amount: principal + total_interest,
            processing_fee,
            net_disbursement: principal - processing_fee,
        })
    }

    /// flat and fixed: interest on original principal, both parts split evenly
    fn linear_schedule(
        &self,
        principal: Money,
        annual_rate: Rate,
        tenure_months: u32,
        start_date: NaiveDate,
    ) -> Result<Vec<RepaymentScheduleEntry>> {
        let periods = Decimal::from(tenure_months);
        let total_interest = principal
            .as_decimal()
            .checked_mul(annual_rate.as_percent())
            .and_then(|d| d.checked_mul(periods))
            .map(|d| Money::from_decimal(d / Decimal::ONE_HUNDRED))
            .ok_or_else(|| overflow_error(principal, annual_rate, tenure_months))?;
        let principal_each = principal / periods;
        let interest_each = total_interest / periods;

        let mut entries = Vec::with_capacity(tenure_months as usize);
        let mut principal_left = principal;
        let mut interest_left = total_interest;

        for i in 1..=tenure_months {
            let (principal_due, interest_due) = if i == tenure_months {
                // final installment absorbs rounding residue
                (principal_left, interest_left)
            } else {
                (principal_each.min(principal_left), interest_each.min(interest_left))
            };
            principal_left -= principal_due;
            interest_left -= interest_due;

            entries.push(RepaymentScheduleEntry::new(
                i,
                due_date(start_date, i)?,
                principal_due,
                interest_due,
                principal_left,
            ));
        }

        Ok(entries)
    }

    /// reducing balance: interest on the declining balance, fixed installment
    fn reducing_schedule(
        &self,
        principal: Money,
        annual_rate: Rate,
        tenure_months: u32,
        start_date: NaiveDate,
    ) -> Result<Vec<RepaymentScheduleEntry>> {
        let monthly_rate = annual_rate.monthly_fraction();
        let installment = compute_installment_amount(principal, annual_rate, tenure_months)?;

        let mut entries = Vec::with_capacity(tenure_months as usize);
        let mut balance = principal;

        for i in 1..=tenure_months {
            let interest_due = balance * monthly_rate;
            let principal_due = if i == tenure_months {
                balance
            } else {
                (installment - interest_due).max(Money::ZERO).min(balance)
            };
            balance = (balance - principal_due).max(Money::ZERO);

            entries.push(RepaymentScheduleEntry::new(
                i,
                due_date(start_date, i)?,
                principal_due,
                interest_due,
                balance,
            ));
        }

        Ok(entries)
    }
}

/// equal installment for principal at an annual percent rate over tenure months;
/// fails with InvalidConfiguration when the compounded figures leave decimal range
pub fn compute_installment_amount(
    principal: Money,
    annual_rate: Rate,
    tenure_months: u32,
) -> Result<Money> {
    if tenure_months == 0 {
        return Ok(principal);
    }

    let r = annual_rate.monthly_fraction();

    if r.is_zero() {
        return Ok(principal / Decimal::from(tenure_months));
    }

    // P * r * (1 + r)^n / ((1 + r)^n - 1)
    let overflow = || overflow_error(principal, annual_rate, tenure_months);
    let base = Decimal::ONE + r;
    let mut compound = Decimal::ONE;
    for _ in 0..tenure_months {
        compound = compound.checked_mul(base).ok_or_else(overflow)?;
    }

    let numerator = principal
        .as_decimal()
        .checked_mul(r)
        .and_then(|pr| pr.checked_mul(compound))
        .ok_or_else(overflow)?;
    let denominator = compound - Decimal::ONE;
    let installment = numerator.checked_div(denominator).ok_or_else(overflow)?;

    Ok(Money::from_decimal(installment))
}

fn overflow_error(principal: Money, annual_rate: Rate, tenure_months: u32) -> LedgerError {
    LedgerError::InvalidConfiguration {
        message: format!(
            "{} at {} over {} months exceeds representable amounts",
            principal, annual_rate, tenure_months
        ),
    }
}

/// interest implied by paying the installment every month
pub fn compute_total_interest(principal: Money, installment: Money, tenure_months: u32) -> Money {
    (installment * Decimal::from(tenure_months) - principal).max(Money::ZERO)
}

pub fn compute_processing_fee(principal: Money, fee_percentage: Decimal) -> Money {
    principal.percentage(fee_percentage)
}

/// start date advanced by whole calendar months, clamped to month end
fn due_date(start: NaiveDate, months: u32) -> Result<NaiveDate> {
    start
        .checked_add_months(Months::new(months))
        .ok_or_else(|| LedgerError::InvalidConfiguration {
            message: format!("due date overflow: {} + {} months", start, months),
        })
}
