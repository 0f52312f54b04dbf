//! Sessions and the pool that owns them.
//!
//! A session is a server-side conversational context bound to one database.
//! The client only tracks its name and when it was last used. Sessions are
//! owned by the [`SessionPool`] and lent out through [`PooledSession`]
//! guards, which put the session back when dropped.

mod maintainer;
mod pool;

use tokio::time::Instant;

pub use pool::{PoolStats, PooledSession, SessionPool};

use crate::rpc::SessionName;

/// A live session as tracked by the pool.
#[derive(Debug, Clone)]
pub struct Session {
    name: SessionName,
    created_at: Instant,
    last_used: Instant,
}

impl Session {
    pub(crate) fn new(name: SessionName) -> Self {
        let now = Instant::now();
        Self {
            name,
            created_at: now,
            last_used: now,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &SessionName {
        &self.name
    }

    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub const fn last_used(&self) -> Instant {
        self.last_used
    }

    pub(crate) fn touch(&mut self) {
        self.last_used = Instant::now();
    }
}
