//! Background maintenance for the session pool.
//!
//! The task holds a `Weak<PoolInner>` so it never keeps a pool alive:
//! - The `SessionPool` handles own the pool state
//! - Each tick upgrades the weak reference, runs `maintain`, and lets go
//! - When the last handle is dropped, or the pool is closed, the task exits

use std::sync::Weak;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::pool::{PoolInner, SessionPool};

/// Spawn a task that runs pool maintenance every `interval`.
///
/// # Invariants
/// - Uses a `Weak` reference to prevent keeping the pool alive
/// - Exits cleanly when the pool is dropped or closed
pub(crate) fn spawn_maintenance_task(
    pool: Weak<PoolInner>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        maintenance_loop(pool, interval).await;
    })
}

async fn maintenance_loop(pool: Weak<PoolInner>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the pool was just warmed.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let Some(inner) = pool.upgrade() else {
            tracing::debug!("session pool dropped, maintenance task exiting");
            break;
        };
        if inner.is_closed() {
            tracing::debug!("session pool closed, maintenance task exiting");
            break;
        }

        SessionPool::from_inner(inner).maintain().await;
    }
}
