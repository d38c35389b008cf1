pub mod lifecycle;
pub mod loan;
pub mod transitions;

pub use lifecycle::LoanLifecycle;
pub use loan::{Loan, LoanApplication};
pub use transitions::{ensure_transition, next_status};
