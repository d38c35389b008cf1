pub mod account;
pub mod journal;
pub mod transaction;

pub use account::LedgerAccount;
pub use journal::{AccountBook, TransactionJournal};
pub use transaction::{PostingDetails, Transaction, TransferRequest};
