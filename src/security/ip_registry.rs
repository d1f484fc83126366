use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::error::Result;
use crate::models::BlockedIp;
use crate::store::IpBlockStore;

/// Registry of blocked source addresses
///
/// A block's `duration_secs` is advisory metadata: nothing here unblocks on
/// a timer. Deployments that want expiry run `sweep_expired` periodically.
#[derive(Clone)]
pub struct IpBlockRegistry {
    store: Arc<dyn IpBlockStore>,
}

impl IpBlockRegistry {
    pub fn new(store: Arc<dyn IpBlockStore>) -> Self {
        Self { store }
    }

    /// True iff an active block row exists for this address
    pub async fn is_blocked(&self, ip_address: &str) -> Result<bool> {
        Ok(self
            .store
            .get_block(ip_address)
            .await?
            .map_or(false, |b| b.active))
    }

    /// Insert or reactivate a block for this address
    pub async fn block(
        &self,
        ip_address: &str,
        reason: &str,
        duration_secs: Option<u64>,
    ) -> Result<BlockedIp> {
        let block = BlockedIp::new(ip_address, reason, duration_secs);
        self.store.upsert_block(block.clone()).await?;

        metrics::counter!("ip_blocks_total", 1);
        tracing::info!(ip_address, reason, "IP blocked");
        Ok(block)
    }

    /// Deactivate any block for this address; unblocking an unblocked IP is
    /// a no-op
    pub async fn unblock(&self, ip_address: &str) -> Result<()> {
        self.store.set_block_active(ip_address, false).await?;
        tracing::info!(ip_address, "IP unblocked");
        Ok(())
    }

    /// All currently active blocks
    pub async fn active_blocks(&self) -> Result<Vec<BlockedIp>> {
        self.store.list_blocks(true).await
    }

    /// Deactivate blocks whose advisory duration elapsed before `now`.
    /// Returns how many were deactivated.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut swept = 0;
        for block in self.store.list_blocks(true).await? {
            if let Some(duration_secs) = block.duration_secs {
                let expires_at = block.created_at + Duration::seconds(duration_secs as i64);
                if expires_at <= now {
                    self.store.set_block_active(&block.ip_address, false).await?;
                    swept += 1;
                }
            }
        }

        if swept > 0 {
            tracing::info!(swept, "expired IP blocks deactivated");
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> IpBlockRegistry {
        IpBlockRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_block_then_unblock() {
        let registry = registry();

        assert!(!registry.is_blocked("1.2.3.4").await.unwrap());

        registry.block("1.2.3.4", "brute force", None).await.unwrap();
        assert!(registry.is_blocked("1.2.3.4").await.unwrap());

        registry.unblock("1.2.3.4").await.unwrap();
        assert!(!registry.is_blocked("1.2.3.4").await.unwrap());

        // Idempotent: unblocking again is a no-op, not an error
        registry.unblock("1.2.3.4").await.unwrap();
        registry.unblock("9.9.9.9").await.unwrap();
    }

    #[tokio::test]
    async fn test_duration_does_not_auto_expire() {
        let registry = registry();
        registry.block("1.2.3.4", "bot", Some(1)).await.unwrap();

        // Still blocked no matter how much later we ask; only the sweep
        // deactivates
        assert!(registry.is_blocked("1.2.3.4").await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let registry = registry();
        registry.block("1.1.1.1", "bot", Some(60)).await.unwrap();
        registry.block("2.2.2.2", "bot", Some(3600)).await.unwrap();
        registry.block("3.3.3.3", "manual", None).await.unwrap();

        let swept = registry
            .sweep_expired(Utc::now() + Duration::seconds(120))
            .await
            .unwrap();
        assert_eq!(swept, 1);

        assert!(!registry.is_blocked("1.1.1.1").await.unwrap());
        assert!(registry.is_blocked("2.2.2.2").await.unwrap());
        // Blocks without a duration never expire
        assert!(registry.is_blocked("3.3.3.3").await.unwrap());
    }
}
