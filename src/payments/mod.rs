pub mod allocation;
pub mod amortization;
pub mod schedule;

pub use allocation::{validate_payment, AllocationResult, InstallmentAllocation, RepaymentAllocator};
pub use amortization::{
    compute_installment_amount, compute_processing_fee, compute_total_interest,
    AmortizationCalculator, LoanQuote,
};
pub use schedule::RepaymentScheduleEntry;
