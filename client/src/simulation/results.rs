//! Canned statement outcomes served by the mock store.

use crate::result_set::{EncodedResultSet, ResultSetData};
use crate::statement::Statement;
use crate::status::Status;

/// What the store returns for one registered statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementOutcome {
    /// DML affecting exactly this many rows.
    UpdateCount(i64),
    /// A query result.
    Query(ResultSetData),
    /// A failure with this status.
    Error(Status),
}

/// A statement paired with the outcome it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementResult {
    pub statement: Statement,
    pub outcome: StatementOutcome,
}

impl StatementResult {
    #[must_use]
    pub const fn update(statement: Statement, row_count: i64) -> Self {
        Self {
            statement,
            outcome: StatementOutcome::UpdateCount(row_count),
        }
    }

    #[must_use]
    pub const fn query(statement: Statement, data: ResultSetData) -> Self {
        Self {
            statement,
            outcome: StatementOutcome::Query(data),
        }
    }

    #[must_use]
    pub const fn error(statement: Statement, status: Status) -> Self {
        Self {
            statement,
            outcome: StatementOutcome::Error(status),
        }
    }
}

impl StatementOutcome {
    pub(crate) fn respond(&self) -> Result<EncodedResultSet, Status> {
        match self {
            Self::UpdateCount(count) => Ok(ResultSetData::update_count(*count).encode()),
            Self::Query(data) => Ok(data.encode()),
            Self::Error(status) => Err(status.clone()),
        }
    }
}
