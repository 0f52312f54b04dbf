//! End-to-end tests through `DatabaseClient` against the mock store.
//!
//! Each test file covers a specific scenario, using a seeded store so that
//! every run sees the same aborts and the same session names.

#![cfg(test)]

mod helpers;

mod test_abort_ceiling;
mod test_concurrent_transactions;
mod test_deadline;
mod test_invalid_update;
mod test_pool_lifecycle;
mod test_random_aborts;
mod test_read_only_transaction;
mod test_read_then_write;
mod test_session_not_found;
mod test_single_use_select1;
mod test_update_count;
