//! Blocked-IP throttle.
//!
//! Admission checks run on the connection accept path and must not
//! await, so blocks live in an in-memory cache keyed by IP with the
//! expiry instant as the value. A durable [`BlockedIpStore`] mirrors
//! the cache so blocks survive restarts; it is read once at startup
//! and written on every block/unblock, never on the check path.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;
use tracing::{info, warn};

/// Durable-store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store rejected or failed the operation.
    #[error("blocked-ip store failure: {0}")]
    Backend(String),
}

/// One persisted block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpBlock {
    /// The blocked address.
    pub ip: String,
    /// Wall-clock expiry, for persistence across restarts.
    pub blocked_until: DateTime<Utc>,
    /// Why the block was placed.
    pub reason: String,
}

/// Durable persistence for IP blocks.
///
/// Implementations are injected; the relay ships an in-memory one and
/// the deployment may substitute a database-backed store.
#[async_trait]
pub trait BlockedIpStore: Send + Sync {
    /// All blocks that have not yet expired.
    async fn load_active(&self) -> Result<Vec<IpBlock>, StoreError>;
    /// Insert or refresh a block.
    async fn upsert(&self, block: IpBlock) -> Result<(), StoreError>;
    /// Remove a block.
    async fn remove(&self, ip: &str) -> Result<(), StoreError>;
}

/// In-memory [`BlockedIpStore`].
#[derive(Debug, Default)]
pub struct MemoryBlockedIpStore {
    blocks: Mutex<HashMap<String, IpBlock>>,
}

#[async_trait]
impl BlockedIpStore for MemoryBlockedIpStore {
    async fn load_active(&self) -> Result<Vec<IpBlock>, StoreError> {
        let now = Utc::now();
        let blocks = self
            .blocks
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(blocks
            .values()
            .filter(|b| b.blocked_until > now)
            .cloned()
            .collect())
    }

    async fn upsert(&self, block: IpBlock) -> Result<(), StoreError> {
        let mut blocks = self
            .blocks
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        blocks.insert(block.ip.clone(), block);
        Ok(())
    }

    async fn remove(&self, ip: &str) -> Result<(), StoreError> {
        let mut blocks = self
            .blocks
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        blocks.remove(ip);
        Ok(())
    }
}

/// Lockout thresholds.
#[derive(Debug, Clone, Copy)]
pub struct LockoutConfig {
    /// Failed authentications before the IP is blocked.
    pub failed_auth_before_block: u32,
    /// How long the resulting block lasts.
    pub block_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            failed_auth_before_block: 5,
            block_duration: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug)]
struct FailureWindow {
    count: u32,
}

/// Cached blocklist with failed-auth escalation.
pub struct IpThrottle {
    cache: DashMap<String, Instant>,
    failures: DashMap<String, FailureWindow>,
    store: Box<dyn BlockedIpStore>,
    config: LockoutConfig,
}

impl IpThrottle {
    /// Construct over a durable store. Call [`Self::load`] before
    /// serving connections.
    #[must_use]
    pub fn new(store: Box<dyn BlockedIpStore>, config: LockoutConfig) -> Self {
        Self {
            cache: DashMap::new(),
            failures: DashMap::new(),
            store,
            config,
        }
    }

    /// Populate the cache from durable storage.
    ///
    /// # Errors
    ///
    /// Propagates the store failure; the caller decides whether to
    /// start with an empty cache.
    pub async fn load(&self) -> Result<usize, StoreError> {
        let active = self.store.load_active().await?;
        let now = Instant::now();
        let loaded = active.len();
        for block in active {
            let remaining = (block.blocked_until - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            if remaining > Duration::ZERO {
                self.cache.insert(block.ip, now + remaining);
            }
        }
        if loaded > 0 {
            info!(count = loaded, "loaded persisted IP blocks");
        }
        Ok(loaded)
    }

    /// Synchronous admission check. Never touches durable storage.
    #[must_use]
    pub fn is_blocked_sync(&self, ip: &str) -> bool {
        self.is_blocked_at(ip, Instant::now())
    }

    pub(crate) fn is_blocked_at(&self, ip: &str, now: Instant) -> bool {
        if let Some(until) = self.cache.get(ip) {
            if *until > now {
                return true;
            }
        }
        // Expired entries are dropped lazily on the next check.
        self.cache.remove_if(ip, |_, until| *until <= now);
        false
    }

    /// Record one failed authentication from `ip`.
    ///
    /// Returns the block placed when the failure count crosses the
    /// threshold, so the caller can audit it.
    pub async fn record_auth_failure(&self, ip: &str) -> Option<IpBlock> {
        let count = {
            let mut entry = self
                .failures
                .entry(ip.to_owned())
                .or_insert(FailureWindow { count: 0 });
            entry.count += 1;
            entry.count
        };
        if count < self.config.failed_auth_before_block {
            return None;
        }
        self.failures.remove(ip);
        warn!(ip, failures = count, "blocking IP after repeated auth failures");
        Some(
            self.block_ip(ip, self.config.block_duration, "repeated authentication failures")
                .await,
        )
    }

    /// Reset the failure counter after a successful authentication.
    pub fn clear_failures(&self, ip: &str) {
        self.failures.remove(ip);
    }

    /// Place a block: cache first, then durable store.
    pub async fn block_ip(&self, ip: &str, duration: Duration, reason: &str) -> IpBlock {
        self.cache.insert(ip.to_owned(), Instant::now() + duration);
        let block = IpBlock {
            ip: ip.to_owned(),
            blocked_until: Utc::now()
                + chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero()),
            reason: reason.to_owned(),
        };
        if let Err(e) = self.store.upsert(block.clone()).await {
            warn!(ip, error = %e, "failed to persist IP block");
        }
        block
    }

    /// Lift a block from both layers.
    pub async fn unblock_ip(&self, ip: &str) {
        self.cache.remove(ip);
        self.failures.remove(ip);
        if let Err(e) = self.store.remove(ip).await {
            warn!(ip, error = %e, "failed to remove persisted IP block");
        }
    }
}

impl std::fmt::Debug for IpThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpThrottle")
            .field("cached_blocks", &self.cache.len())
            .field("tracked_ips", &self.failures.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle() -> IpThrottle {
        IpThrottle::new(Box::new(MemoryBlockedIpStore::default()), LockoutConfig::default())
    }

    #[tokio::test]
    async fn block_is_visible_synchronously() {
        let throttle = throttle();
        assert!(!throttle.is_blocked_sync("203.0.113.1"));
        throttle
            .block_ip("203.0.113.1", Duration::from_secs(60), "test")
            .await;
        assert!(throttle.is_blocked_sync("203.0.113.1"));
    }

    #[tokio::test]
    async fn block_expires() {
        let throttle = throttle();
        throttle
            .block_ip("203.0.113.1", Duration::from_secs(60), "test")
            .await;
        let now = Instant::now();
        assert!(throttle.is_blocked_at("203.0.113.1", now));
        assert!(!throttle.is_blocked_at("203.0.113.1", now + Duration::from_secs(61)));
        // The expired entry was dropped from the cache.
        assert!(!throttle.is_blocked_at("203.0.113.1", now));
    }

    #[tokio::test]
    async fn failures_escalate_to_block() {
        let throttle = throttle();
        for _ in 0..4 {
            assert!(throttle.record_auth_failure("203.0.113.2").await.is_none());
        }
        let block = throttle.record_auth_failure("203.0.113.2").await;
        assert!(block.is_some());
        assert!(throttle.is_blocked_sync("203.0.113.2"));
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let throttle = throttle();
        for _ in 0..4 {
            throttle.record_auth_failure("203.0.113.3").await;
        }
        throttle.clear_failures("203.0.113.3");
        for _ in 0..4 {
            assert!(throttle.record_auth_failure("203.0.113.3").await.is_none());
        }
    }

    #[tokio::test]
    async fn unblock_lifts_from_both_layers() {
        let store = MemoryBlockedIpStore::default();
        let throttle = IpThrottle::new(Box::new(store), LockoutConfig::default());
        throttle
            .block_ip("203.0.113.4", Duration::from_secs(600), "test")
            .await;
        throttle.unblock_ip("203.0.113.4").await;
        assert!(!throttle.is_blocked_sync("203.0.113.4"));
    }

    #[tokio::test]
    async fn load_restores_active_blocks() {
        let store = MemoryBlockedIpStore::default();
        store
            .upsert(IpBlock {
                ip: "203.0.113.5".to_owned(),
                blocked_until: Utc::now() + chrono::Duration::minutes(10),
                reason: "persisted".to_owned(),
            })
            .await
            .unwrap();
        store
            .upsert(IpBlock {
                ip: "203.0.113.6".to_owned(),
                blocked_until: Utc::now() - chrono::Duration::minutes(1),
                reason: "expired".to_owned(),
            })
            .await
            .unwrap();

        let throttle = IpThrottle::new(Box::new(store), LockoutConfig::default());
        throttle.load().await.unwrap();
        assert!(throttle.is_blocked_sync("203.0.113.5"));
        assert!(!throttle.is_blocked_sync("203.0.113.6"));
    }
}
