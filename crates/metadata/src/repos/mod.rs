//! Repository traits for the delete log tables.
//!
//! Every method takes the connection to run on, so callers can compose log
//! writes and entity marker writes into one store transaction.

pub mod deletion_log;
pub mod transactions;

pub use deletion_log::DeletionLogRepo;
pub use transactions::TransactionRepo;
