//! Daemon liveness tracking on the tracker.
//!
//! Each heartbeat overwrites the sender's timestamp; a sweeper drops every
//! host that has been silent past the liveness window and purges its records.
//! The 1 s send / 3 s sweep-and-expire cadence is part of the protocol
//! contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::context::ServerContext;

/// Interval between heartbeats sent by a non-tracker daemon.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);
/// Interval between sweeper scans, also the liveness window.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(3);

#[derive(Default)]
pub struct Membership {
    last_seen: Mutex<HashMap<String, Instant>>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a host's timestamp on heartbeat receipt.
    pub async fn record(&self, host_name: &str) {
        let mut map = self.last_seen.lock().await;
        map.insert(host_name.to_string(), Instant::now());
        tracing::debug!(host = host_name, "heartbeat recorded");
    }

    /// Removes and returns every host silent for longer than `window`.
    pub async fn expire(&self, window: Duration) -> Vec<String> {
        let mut map = self.last_seen.lock().await;
        let now = Instant::now();
        let stale: Vec<String> = map
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) > window)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &stale {
            map.remove(name);
        }
        stale
    }

    pub async fn contains(&self, host_name: &str) -> bool {
        self.last_seen.lock().await.contains_key(host_name)
    }
}

/// Eviction sweeper task run by the tracker.
pub struct Sweeper;

impl Sweeper {
    pub fn spawn(ctx: Arc<ServerContext>) -> JoinHandle<()> {
        tokio::spawn(Self::run(ctx))
    }

    async fn run(ctx: Arc<ServerContext>) {
        let mut ticker = tokio::time::interval(SWEEP_PERIOD);
        ticker.tick().await; // first tick fires immediately
        loop {
            ticker.tick().await;
            let stale = ctx.membership.expire(SWEEP_PERIOD).await;
            for name in stale {
                match ctx.store() {
                    Some(store) => match store.evict_host(&name).await {
                        Ok(()) => tracing::info!(host = %name, "unmounted dead host"),
                        Err(e) => tracing::warn!(host = %name, error = %e, "eviction failed"),
                    },
                    None => tracing::warn!(host = %name, "no store to evict from"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expire_only_removes_silent_hosts() {
        let membership = Membership::new();
        membership.record("h1").await;
        let stale = membership.expire(Duration::from_secs(3)).await;
        assert!(stale.is_empty());
        assert!(membership.contains("h1").await);

        // zero window: anything already recorded is stale
        tokio::time::sleep(Duration::from_millis(5)).await;
        let stale = membership.expire(Duration::ZERO).await;
        assert_eq!(stale, vec!["h1".to_string()]);
        assert!(!membership.contains("h1").await);
    }
}
