use chrono::{DateTime, Months, NaiveDate, Utc};
use hourglass_rs::SafeTimeProvider;
use tracing::{info, warn};

use crate::config::LoanProduct;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::{AccountBook, PostingDetails, Transaction, TransactionJournal, TransferRequest};
use crate::payments::{compute_processing_fee, AllocationResult, AmortizationCalculator, RepaymentAllocator};
use crate::types::{LoanAction, LoanStatus, ScheduleStatus, TransactionType};

use super::transitions::{ensure_transition, next_status};
use super::{Loan, LoanApplication};

/// drives loans through their status machine and the postings each step implies
#[derive(Debug, Default)]
pub struct LoanLifecycle {
    journal: TransactionJournal,
    allocator: RepaymentAllocator,
    events: EventStore,
}

impl LoanLifecycle {
    pub fn new() -> Self {
        Self {
            journal: TransactionJournal::new(),
            allocator: RepaymentAllocator::new(),
            events: EventStore::new(),
        }
    }

    /// capture an application with its full schedule
    pub fn apply(
        &mut self,
        application: LoanApplication,
        product: &LoanProduct,
        time: &SafeTimeProvider,
    ) -> Result<Loan> {
        product.validate()?;
        if let Err(e) = product.check_bounds(application.principal, application.tenure_months) {
            warn!(loan = %application.loan_number, product = %product.code, error = %e, "application rejected");
            return Err(e);
        }

        let now = time.now();
        let start = application.schedule_start.unwrap_or_else(|| now.date_naive());
        let schedule = AmortizationCalculator::new(product.interest_type).generate_schedule(
            application.principal,
            product.interest_rate,
            application.tenure_months,
            start,
        )?;
        let processing_fee =
            compute_processing_fee(application.principal, product.processing_fee_percentage);

        let loan = Loan::from_application(
            application,
            product.code.clone(),
            product.interest_rate,
            product.interest_type,
            processing_fee,
            schedule,
            now,
        );

        info!(
            loan = %loan.loan_number,
            principal = %loan.principal,
            total_amount = %loan.total_amount,
            installments = loan.schedule.len(),
            "loan applied"
        );
        self.events.emit(Event::LoanApplied {
            loan_id: loan.id,
            loan_number: loan.loan_number.clone(),
            principal: loan.principal,
            total_amount: loan.total_amount,
            timestamp: now,
        });
        Ok(loan)
    }

    pub fn submit_for_review(&mut self, loan: &mut Loan, time: &SafeTimeProvider) -> Result<()> {
        let next = guard(loan, LoanAction::Review)?;
        self.change_status(loan, next, "submitted for review", time.now());
        Ok(())
    }

    pub fn approve(&mut self, loan: &mut Loan, approver: &str, time: &SafeTimeProvider) -> Result<()> {
        let next = guard(loan, LoanAction::Approve)?;
        let now = time.now();

        loan.approved_by = Some(approver.to_string());
        loan.approval_date = Some(now);
        self.change_status(loan, next, &format!("approved by {}", approver), now);
        self.events.emit(Event::LoanApproved {
            loan_id: loan.id,
            approver: approver.to_string(),
            timestamp: now,
        });
        Ok(())
    }

    pub fn reject(&mut self, loan: &mut Loan, reason: &str, time: &SafeTimeProvider) -> Result<()> {
        let next = guard(loan, LoanAction::Reject)?;
        let now = time.now();

        loan.rejection_reason = Some(reason.to_string());
        self.change_status(loan, next, reason, now);
        self.events.emit(Event::LoanRejected {
            loan_id: loan.id,
            reason: reason.to_string(),
            timestamp: now,
        });
        Ok(())
    }

    /// credit the net amount to the loan's account and start repayment
    pub fn disburse(
        &mut self,
        loan: &mut Loan,
        loan_book: &mut AccountBook,
        time: &SafeTimeProvider,
    ) -> Result<Transaction> {
        let disbursed = guard(loan, LoanAction::Disburse)?;
        let active = ensure_transition(disbursed, LoanAction::Activate)?;
        ensure_loan_account(loan, loan_book)?;

        let now = time.now();
        let maturity_date = add_months(now.date_naive(), loan.tenure_months)?;
        let net_amount = loan.principal - loan.processing_fee;

        let posting = self.journal.post(
            loan_book,
            TransactionType::LoanDisbursement,
            net_amount,
            PostingDetails::new(loan.loan_number.as_str())
                .loan(loan.id)
                .narration(format!("disbursement of {}", loan.loan_number)),
            time,
        );
        self.drain_journal();
        let posting = posting?;

        loan.disbursed_amount = Some(net_amount);
        loan.disbursement_date = Some(now);
        loan.maturity_date = Some(maturity_date);
        self.change_status(loan, disbursed, "funds disbursed", now);
        self.change_status(loan, active, "repayment started", now);

        info!(
            loan = %loan.loan_number,
            account = %loan.account_id,
            %net_amount,
            processing_fee = %loan.processing_fee,
            %maturity_date,
            "loan disbursed"
        );
        self.events.emit(Event::LoanDisbursed {
            loan_id: loan.id,
            account_id: loan.account_id.clone(),
            net_amount,
            processing_fee: loan.processing_fee,
            maturity_date,
            timestamp: now,
        });
        Ok(posting)
    }

    /// allocate a payment, move the money, then close or re-derive delinquency
    pub fn record_repayment(
        &mut self,
        loan: &mut Loan,
        amount: Money,
        payer: &mut AccountBook,
        loan_book: &mut AccountBook,
        reference: &str,
        time: &SafeTimeProvider,
    ) -> Result<AllocationResult> {
        guard(loan, LoanAction::Repay)?;
        ensure_loan_account(loan, loan_book)?;
        let now = time.now();
        let flagged = overdue_installments(loan);

        let mut working = loan.clone();
        let allocation = self.allocator.allocate(&mut working, amount, now).map_err(|e| {
            warn!(loan = %loan.loan_number, %amount, error = %e, "repayment rejected");
            e
        })?;

        let transfer = self.journal.transfer(
            payer,
            loan_book,
            TransferRequest::loan_repayment(
                amount,
                loan.id,
                reference,
                format!("repayment of {}", loan.loan_number),
            ),
            time,
        );
        self.drain_journal();
        transfer?;

        working.last_payment_date = Some(now);
        *loan = working;

        info!(
            loan = %loan.loan_number,
            %amount,
            outstanding = %loan.outstanding_total,
            "repayment recorded"
        );
        self.events.emit(Event::RepaymentAllocated {
            loan_id: loan.id,
            amount,
            applied_to_fees: allocation.application.to_fees,
            applied_to_interest: allocation.application.to_interest,
            applied_to_principal: allocation.application.to_principal,
            installments_touched: allocation.installments.iter().map(|a| a.installment_number).collect(),
            timestamp: now,
        });

        if loan.is_fully_paid() {
            let closed = ensure_transition(loan.status, LoanAction::Close)?;
            loan.days_overdue = 0;
            loan.overdue_amount = Money::ZERO;
            self.change_status(loan, closed, "fully repaid", now);
            self.events.emit(Event::LoanClosed {
                loan_id: loan.id,
                total_paid: loan.total_paid,
                timestamp: now,
            });
        } else {
            self.update_delinquency(loan, &flagged, now);
        }

        Ok(allocation)
    }

    /// lazily re-derive overdue flags and the active/overdue status; no postings
    pub fn refresh_overdue(&mut self, loan: &mut Loan, time: &SafeTimeProvider) -> bool {
        if !loan.status.accepts_repayment() {
            return false;
        }
        let flagged = overdue_installments(loan);
        self.update_delinquency(loan, &flagged, time.now())
    }

    /// overdue loans only
    pub fn mark_defaulted(&mut self, loan: &mut Loan, reason: &str, time: &SafeTimeProvider) -> Result<()> {
        let next = guard(loan, LoanAction::Default)?;
        let now = time.now();

        self.change_status(loan, next, reason, now);
        self.events.emit(Event::LoanDefaulted {
            loan_id: loan.id,
            outstanding: loan.outstanding_total,
            reason: reason.to_string(),
            timestamp: now,
        });
        Ok(())
    }

    /// charge the product's late fee on an installment once its grace period has run out
    pub fn assess_late_fee(
        &mut self,
        loan: &mut Loan,
        installment_number: u32,
        product: &LoanProduct,
        time: &SafeTimeProvider,
    ) -> Result<Money> {
        guard(loan, LoanAction::AssessFee)?;
        if product.code != loan.product_code {
            return Err(LedgerError::InvalidConfiguration {
                message: format!("loan {} is not on product {}", loan.loan_number, product.code),
            });
        }
        let fee = product.late_fee.ok_or_else(|| LedgerError::InvalidConfiguration {
            message: format!("product {} has no late fee", product.code),
        })?;

        let now = time.now();
        let today = now.date_naive();
        let mut working = loan.clone();
        let entry = working
            .installment_mut(installment_number)
            .ok_or_else(|| LedgerError::ScheduleMismatch {
                message: format!("loan {} has no installment {}", loan.loan_number, installment_number),
            })?;

        let days_overdue = entry.days_past_due(today);
        if days_overdue <= product.grace_period_days || !entry.fee_due.is_zero() {
            warn!(
                loan = %loan.loan_number,
                installment = installment_number,
                days_overdue,
                "late fee not applicable"
            );
            return Err(LedgerError::InvalidTransition {
                status: loan.status,
                action: LoanAction::AssessFee,
            });
        }
        entry.add_fee(fee);
        working.recompute_aggregates();
        let flagged = overdue_installments(loan);
        *loan = working;

        info!(loan = %loan.loan_number, installment = installment_number, %fee, days_overdue, "late fee assessed");
        self.events.emit(Event::LateFeeAssessed {
            loan_id: loan.id,
            installment_number,
            fee_amount: fee,
            days_overdue,
            timestamp: now,
        });
        self.update_delinquency(loan, &flagged, now);
        Ok(fee)
    }

    /// waive every unpaid installment; paid history is kept
    pub fn write_off(&mut self, loan: &mut Loan, reason: &str, time: &SafeTimeProvider) -> Result<Money> {
        let next = guard(loan, LoanAction::WriteOff)?;
        let now = time.now();

        for entry in loan.schedule.iter_mut().filter(|e| e.status.is_eligible()) {
            entry.status = ScheduleStatus::Waived;
        }
        loan.recompute_aggregates();
        let loss_amount = loan.waived_amount;

        loan.written_off_amount = Some(loss_amount);
        loan.write_off_reason = Some(reason.to_string());
        loan.days_overdue = 0;
        loan.overdue_amount = Money::ZERO;
        self.change_status(loan, next, reason, now);

        info!(loan = %loan.loan_number, %loss_amount, reason, "loan written off");
        self.events.emit(Event::LoanWrittenOff {
            loan_id: loan.id,
            loss_amount,
            reason: reason.to_string(),
            timestamp: now,
        });
        Ok(loss_amount)
    }

    /// journal used for postings made on behalf of loans
    pub fn journal_mut(&mut self) -> &mut TransactionJournal {
        &mut self.journal
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        self.drain_journal();
        self.events.take_events()
    }

    fn drain_journal(&mut self) {
        let posted = self.journal.take_events();
        self.events.extend(posted);
    }

    fn change_status(&mut self, loan: &mut Loan, new_status: LoanStatus, reason: &str, now: DateTime<Utc>) {
        let old_status = loan.status;
        if old_status == new_status {
            return;
        }
        loan.update_status(new_status, now);

        info!(loan = %loan.loan_number, ?old_status, ?new_status, reason, "loan status changed");
        self.events.emit(Event::StatusChanged {
            loan_id: loan.id,
            old_status,
            new_status,
            reason: reason.to_string(),
            timestamp: now,
        });
    }

    /// returns whether any installment is overdue; `flagged` lists installments
    /// already reported overdue
    fn update_delinquency(&mut self, loan: &mut Loan, flagged: &[u32], now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        let loan_id = loan.id;
        let mut newly_overdue = Vec::new();

        for entry in loan.schedule.iter_mut() {
            if entry.refresh_overdue(today) && !flagged.contains(&entry.installment_number) {
                newly_overdue.push(Event::InstallmentOverdue {
                    loan_id,
                    installment_number: entry.installment_number,
                    due_date: entry.due_date,
                    amount_due: entry.remaining_due(),
                });
            }
        }

        let overdue: Vec<_> = loan
            .schedule
            .iter()
            .filter(|e| e.status == ScheduleStatus::Overdue)
            .collect();
        loan.days_overdue = overdue.iter().map(|e| e.days_past_due(today)).max().unwrap_or(0);
        loan.overdue_amount = overdue.iter().map(|e| e.remaining_due()).sum();
        let is_overdue = !overdue.is_empty();

        self.events.extend(newly_overdue);

        let action = if is_overdue { LoanAction::MarkOverdue } else { LoanAction::Cure };
        if let Some(next) = next_status(loan.status, action) {
            let reason = if is_overdue {
                format!("{} days past due", loan.days_overdue)
            } else {
                "arrears cleared".to_string()
            };
            self.change_status(loan, next, &reason, now);
        }
        is_overdue
    }
}

fn overdue_installments(loan: &Loan) -> Vec<u32> {
    loan.schedule
        .iter()
        .filter(|e| e.status == ScheduleStatus::Overdue)
        .map(|e| e.installment_number)
        .collect()
}

fn guard(loan: &Loan, action: LoanAction) -> Result<LoanStatus> {
    ensure_transition(loan.status, action).map_err(|e| {
        warn!(loan = %loan.loan_number, status = ?loan.status, ?action, "transition rejected");
        e
    })
}

fn ensure_loan_account(loan: &Loan, book: &AccountBook) -> Result<()> {
    if book.account.id != loan.account_id {
        return Err(LedgerError::InvalidConfiguration {
            message: format!(
                "loan {} is booked on {}, not {}",
                loan.loan_number, loan.account_id, book.account.id
            ),
        });
    }
    Ok(())
}

fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| LedgerError::InvalidConfiguration {
            message: format!("{} + {} months is out of range", date, months),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;

    use crate::config::AccountConfig;
    use crate::decimal::Rate;
    use crate::ledger::LedgerAccount;
    use crate::types::{AccountId, LoanNumber};

    struct Fixture {
        time: SafeTimeProvider,
        lifecycle: LoanLifecycle,
        product: LoanProduct,
        loan_book: AccountBook,
        payer: AccountBook,
    }

    fn fixture(product: LoanProduct) -> Fixture {
        let time = SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let loan_book = AccountBook::new(LedgerAccount::open(
            AccountId::new("LOAN-ACC-1"),
            Some("CUST-1".to_string()),
            AccountConfig::loan_account("KES"),
            time.now(),
        ));
        let mut payer = AccountBook::new(LedgerAccount::open(
            AccountId::new("SAV-1"),
            Some("CUST-1".to_string()),
            AccountConfig::savings("KES"),
            time.now(),
        ));
        let mut lifecycle = LoanLifecycle::new();
        lifecycle
            .journal_mut()
            .post(&mut payer, TransactionType::Deposit, Money::from_major(5_000_000), PostingDetails::new("SEED"), &time)
            .unwrap();
        lifecycle.take_events();
        Fixture { time, lifecycle, product, loan_book, payer }
    }

    fn application(principal: i64, tenure: u32) -> LoanApplication {
        LoanApplication {
            loan_number: LoanNumber::new("LN-100"),
            customer_id: "CUST-1".to_string(),
            account_id: AccountId::new("LOAN-ACC-1"),
            principal: Money::from_major(principal),
            tenure_months: tenure,
            schedule_start: None,
            purpose: Some("stock".to_string()),
        }
    }

    fn active_loan(f: &mut Fixture, principal: i64, tenure: u32) -> Loan {
        let mut loan = f.lifecycle.apply(application(principal, tenure), &f.product, &f.time).unwrap();
        f.lifecycle.approve(&mut loan, "officer-1", &f.time).unwrap();
        f.lifecycle.disburse(&mut loan, &mut f.loan_book, &f.time).unwrap();
        loan
    }

    #[test]
    fn test_apply_checks_product_range() {
        let mut f = fixture(LoanProduct::personal(Rate::from_percentage(10)));
        let err = f.lifecycle.apply(application(1_000, 5), &f.product, &f.time).unwrap_err();
        assert!(matches!(err, LedgerError::OutOfProductRange { field: "principal", .. }));
        let err = f.lifecycle.apply(application(50_000, 48), &f.product, &f.time).unwrap_err();
        assert!(matches!(err, LedgerError::OutOfProductRange { field: "tenure_months", .. }));
        assert!(f.lifecycle.events().is_empty());
    }

    #[test]
    fn test_apply_builds_schedule_and_fee() {
        let mut f = fixture(LoanProduct::personal(Rate::from_percentage(10)));
        let loan = f.lifecycle.apply(application(50_000, 5), &f.product, &f.time).unwrap();

        assert_eq!(loan.status, LoanStatus::Applied);
        assert_eq!(loan.schedule.len(), 5);
        assert_eq!(loan.processing_fee, Money::from_major(1_000));
        assert_eq!(loan.schedule[0].due_date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert!(loan.verify_aggregates().is_ok());
    }

    #[test]
    fn test_disburse_posts_net_amount() {
        let mut f = fixture(LoanProduct::personal(Rate::from_percentage(10)));
        let loan = active_loan(&mut f, 50_000, 5);

        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.disbursed_amount, Some(Money::from_major(49_000)));
        assert_eq!(loan.maturity_date, NaiveDate::from_ymd_opt(2024, 6, 1));
        assert_eq!(f.loan_book.account.balance, Money::from_major(49_000));
        assert_eq!(f.loan_book.postings[0].transaction_type, TransactionType::LoanDisbursement);
        assert_eq!(f.loan_book.postings[0].loan_id, Some(loan.id));

        let statuses: Vec<_> = f
            .lifecycle
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                Event::StatusChanged { new_status, .. } => Some(new_status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![LoanStatus::Approved, LoanStatus::Disbursed, LoanStatus::Active]);
    }

    #[test]
    fn test_disburse_requires_approval() {
        let mut f = fixture(LoanProduct::personal(Rate::from_percentage(10)));
        let mut loan = f.lifecycle.apply(application(50_000, 5), &f.product, &f.time).unwrap();
        let before = loan.clone();

        let err = f.lifecycle.disburse(&mut loan, &mut f.loan_book, &f.time).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
        assert_eq!(loan, before);
        assert!(f.loan_book.postings.is_empty());
    }

    #[test]
    fn test_review_then_reject_is_terminal() {
        let mut f = fixture(LoanProduct::personal(Rate::from_percentage(10)));
        let mut loan = f.lifecycle.apply(application(50_000, 5), &f.product, &f.time).unwrap();
        f.lifecycle.submit_for_review(&mut loan, &f.time).unwrap();
        assert_eq!(loan.status, LoanStatus::Pending);
        f.lifecycle.reject(&mut loan, "insufficient history", &f.time).unwrap();
        assert_eq!(loan.status, LoanStatus::Rejected);
        assert_eq!(loan.rejection_reason.as_deref(), Some("insufficient history"));

        let before = loan.clone();
        assert!(f.lifecycle.approve(&mut loan, "officer", &f.time).is_err());
        assert!(f.lifecycle.write_off(&mut loan, "x", &f.time).is_err());
        assert_eq!(loan, before);
    }

    #[test]
    fn test_repayment_moves_money_and_closes() {
        let mut f = fixture(LoanProduct::personal(Rate::from_percentage(10)));
        let mut loan = active_loan(&mut f, 50_000, 5);
        let total = loan.total_amount;

        f.lifecycle
            .record_repayment(&mut loan, total, &mut f.payer, &mut f.loan_book, "RCPT-1", &f.time)
            .unwrap();

        assert_eq!(loan.status, LoanStatus::Closed);
        assert_eq!(loan.outstanding_total, Money::ZERO);
        assert!(loan.schedule.iter().all(|e| e.status == ScheduleStatus::Paid));
        assert_eq!(f.payer.account.balance, Money::from_major(5_000_000) - total);
        let credit = f.loan_book.postings.last().unwrap();
        assert_eq!(credit.transaction_type, TransactionType::TransferIn);
        assert_eq!(credit.amount, total);
        assert!(f.payer.reconcile().is_ok());

        let before = loan.clone();
        assert!(f
            .lifecycle
            .record_repayment(&mut loan, Money::from_major(1), &mut f.payer, &mut f.loan_book, "RCPT-2", &f.time)
            .is_err());
        assert_eq!(loan, before);
    }

    #[test]
    fn test_failed_transfer_leaves_loan_unchanged() {
        let mut f = fixture(LoanProduct::personal(Rate::from_percentage(10)));
        let mut loan = active_loan(&mut f, 50_000, 5);
        f.payer.account.freeze().unwrap();
        let (loan_before, book_before) = (loan.clone(), f.loan_book.clone());

        let err = f
            .lifecycle
            .record_repayment(&mut loan, Money::from_major(100), &mut f.payer, &mut f.loan_book, "R", &f.time)
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountInactive { .. }));
        assert_eq!(loan, loan_before);
        assert_eq!(f.loan_book, book_before);
    }

    #[test]
    fn test_overdue_detected_lazily_and_cured() {
        let mut f = fixture(LoanProduct::personal(Rate::from_percentage(10)));
        let mut loan = active_loan(&mut f, 50_000, 5);
        let control = f.time.test_control().unwrap();

        // first installment due 2024-02-01
        control.advance(Duration::days(40));
        assert_eq!(loan.status, LoanStatus::Active);
        assert!(f.lifecycle.refresh_overdue(&mut loan, &f.time));
        assert_eq!(loan.status, LoanStatus::Overdue);
        assert_eq!(loan.days_overdue, 9);
        assert_eq!(loan.overdue_amount, Money::from_major(15_000));

        f.lifecycle
            .record_repayment(&mut loan, Money::from_major(15_000), &mut f.payer, &mut f.loan_book, "R-1", &f.time)
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.days_overdue, 0);
        assert_eq!(loan.overdue_amount, Money::ZERO);
        assert!(loan.last_payment_date.is_some());
    }

    #[test]
    fn test_partial_payment_stays_overdue() {
        let mut f = fixture(LoanProduct::personal(Rate::from_percentage(10)));
        let mut loan = active_loan(&mut f, 50_000, 5);
        f.time.test_control().unwrap().advance(Duration::days(40));

        f.lifecycle
            .record_repayment(&mut loan, Money::from_major(5_000), &mut f.payer, &mut f.loan_book, "R-1", &f.time)
            .unwrap();
        assert_eq!(loan.status, LoanStatus::Overdue);
        assert_eq!(loan.schedule[0].status, ScheduleStatus::Overdue);
        assert_eq!(loan.overdue_amount, Money::from_major(10_000));
    }

    #[test]
    fn test_late_fee_after_grace() {
        let mut f = fixture(LoanProduct::personal(Rate::from_percentage(10)));
        let mut loan = active_loan(&mut f, 50_000, 5);
        let control = f.time.test_control().unwrap();

        // 3 days late, inside the 5 day grace period
        control.advance(Duration::days(34));
        assert!(f.lifecycle.assess_late_fee(&mut loan, 1, &f.product, &f.time).is_err());

        control.advance(Duration::days(5));
        let total_before = loan.total_amount;
        let fee = f.lifecycle.assess_late_fee(&mut loan, 1, &f.product, &f.time).unwrap();
        assert_eq!(fee, Money::from_major(250));
        assert_eq!(loan.total_amount, total_before + fee);
        assert_eq!(loan.outstanding_fees, fee);
        assert_eq!(loan.status, LoanStatus::Overdue);
        assert!(loan.verify_aggregates().is_ok());

        // only once per installment
        assert!(f.lifecycle.assess_late_fee(&mut loan, 1, &f.product, &f.time).is_err());

        let result = f
            .lifecycle
            .record_repayment(&mut loan, Money::from_major(300), &mut f.payer, &mut f.loan_book, "R", &f.time)
            .unwrap();
        assert_eq!(result.application.to_fees, fee);
    }

    #[test]
    fn test_default_then_write_off() {
        let mut f = fixture(LoanProduct::personal(Rate::from_percentage(10)));
        let mut loan = active_loan(&mut f, 50_000, 5);

        assert!(f.lifecycle.mark_defaulted(&mut loan, "no contact", &f.time).is_err());
        assert!(f.lifecycle.write_off(&mut loan, "loss", &f.time).is_err());

        f.lifecycle
            .record_repayment(&mut loan, Money::from_major(15_000), &mut f.payer, &mut f.loan_book, "R", &f.time)
            .unwrap();
        f.time.test_control().unwrap().advance(Duration::days(70));
        f.lifecycle.refresh_overdue(&mut loan, &f.time);
        f.lifecycle.mark_defaulted(&mut loan, "no contact", &f.time).unwrap();
        assert_eq!(loan.status, LoanStatus::Defaulted);

        let loss = f.lifecycle.write_off(&mut loan, "uncollectable", &f.time).unwrap();
        assert_eq!(loss, Money::from_major(60_000));
        assert_eq!(loan.status, LoanStatus::WrittenOff);
        assert_eq!(loan.outstanding_total, Money::ZERO);
        assert_eq!(loan.total_paid, Money::from_major(15_000));
        assert_eq!(loan.written_off_amount, Some(loss));
        assert_eq!(loan.schedule[0].status, ScheduleStatus::Paid);
        assert!(loan.schedule[1..].iter().all(|e| e.status == ScheduleStatus::Waived));
        assert!(loan.verify_aggregates().is_ok());
    }

    #[test]
    fn test_reducing_loan_schedule() {
        let mut f = fixture(LoanProduct::micro_business(Rate::from_percentage(12)));
        let loan = active_loan(&mut f, 1_200_000, 12);

        assert_eq!(loan.schedule[0].interest_due, Money::from_major(12_000));
        assert_eq!(loan.schedule[0].total_due, Money::from_decimal(dec!(106618.55)));
        assert_eq!(loan.schedule.last().unwrap().outstanding_balance, Money::ZERO);
        assert_eq!(f.loan_book.account.balance, Money::from_major(1_188_000));
    }

    #[test]
    fn test_apply_with_unrepresentable_schedule_fails_cleanly() {
        let mut product = LoanProduct::micro_business(Rate::from_percentage(400));
        product.max_tenure_months = 360;
        assert!(product.validate().is_ok());

        let mut f = fixture(product);
        let err = f.lifecycle.apply(application(10_000, 300), &f.product, &f.time).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidConfiguration { .. }));
        assert!(f.lifecycle.events().is_empty());
    }
}
