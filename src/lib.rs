pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod lending;
pub mod payments;
pub mod service;
pub mod store;
pub mod types;

// re-export key types
pub use config::{AccountConfig, LoanProduct};
pub use decimal::{Money, Rate};
pub use errors::{LedgerError, Result};
pub use events::{Event, EventStore};
pub use ledger::{AccountBook, LedgerAccount, PostingDetails, Transaction, TransactionJournal, TransferRequest};
pub use lending::{Loan, LoanApplication, LoanLifecycle};
pub use payments::{
    AllocationResult, AmortizationCalculator, InstallmentAllocation, LoanQuote, RepaymentAllocator,
    RepaymentScheduleEntry,
};
pub use service::LendingDesk;
pub use store::{AccountRepository, Changeset, InMemoryStore, LedgerStore, LoanRepository, Versioned};
pub use types::{
    AccountId, AccountKind, AccountStatus, Direction, InterestType, LoanAction, LoanId, LoanNumber,
    LoanStatus, PaymentApplication, ScheduleStatus, TransactionId, TransactionStatus, TransactionType,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
