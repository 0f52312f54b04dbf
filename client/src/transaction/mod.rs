//! Transactions: the retrying read-write runner, its per-attempt context and
//! the read-only variants.

mod backoff;
mod context;
mod read_only;
mod runner;

pub use backoff::Backoff;
pub use context::TransactionContext;
pub use read_only::{ReadOnlyTransaction, SingleUse};
pub use runner::{Phase, TransactionRunner};
