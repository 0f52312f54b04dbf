//! Deterministic store double for testing the client.
//!
//! This module provides an in-process implementation of the `Rpc` trait with:
//! - Canned results keyed by statement
//! - Seeded, reproducible abort injection
//! - Per-method latency and forced errors
//! - Session and transaction bookkeeping with real status codes
//!
//! # Design Principles
//!
//! 1. All state is owned by one `MockStore` instance; nothing is global
//! 2. All randomness is seeded for reproducibility
//! 3. Injected latency uses tokio time, so tests can pause the clock
//! 4. Faults can be injected at every RPC boundary
//!
//! # Usage
//!
//! ```
//! use client::simulation::{MockStore, StatementResult};
//! use client::Statement;
//!
//! let store = MockStore::with_seed(12345);
//! store.put_statement_result(StatementResult::update(
//!     Statement::of("UPDATE FOO SET BAR=1 WHERE BAZ=2"),
//!     1,
//! ));
//! store.set_abort_probability(0.0);
//! ```

mod execution_time;
mod results;
mod store;

pub use execution_time::SimulatedExecutionTime;
pub use results::{StatementOutcome, StatementResult};
pub use store::MockStore;
