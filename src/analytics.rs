use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{keys, SecurityConfig};
use crate::error::Result;
use crate::models::{QueueStatus, ReportStatus, Severity, ThreatStatus};
use crate::store::{
    IpBlockStore, ModerationStore, QueueFilter, RecordFilter, ReportFilter, ReportStore,
    ThreatFilter, ThreatStore,
};

/// Rollup over moderation records, reports and the review queue
#[derive(Clone, Debug, Serialize)]
pub struct ModerationStats {
    pub total_records: usize,
    pub total_reports: usize,
    pub reports_by_status: HashMap<ReportStatus, usize>,
    pub reports_by_category: HashMap<String, usize>,
    /// Records decided without requiring a human
    pub auto_moderated: usize,
    /// auto_moderated / total_records, 0 when nothing was recorded
    pub auto_moderation_rate: f64,
    /// Share of reports that reached a terminal status
    pub resolution_efficiency: f64,
    pub pending_queue: usize,
}

/// Health band derived from the security score
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityHealth {
    Healthy,
    Degraded,
    AtRisk,
}

/// Rollup over threats, alerts and IP blocks
#[derive(Clone, Debug, Serialize)]
pub struct SecurityOverview {
    pub total_threats: usize,
    pub active_threats: usize,
    pub threats_by_severity: HashMap<Severity, usize>,
    pub blocked_ips: usize,
    /// round((threat_score + block_score) / 2); see `security_score`
    pub security_score: u32,
    pub health: SecurityHealth,
}

/// Score component: starts at 100, each threat costs 2 points
fn threat_score(total_threats: usize) -> f64 {
    (100.0 - 2.0 * total_threats as f64).max(0.0)
}

/// Score component: each active block earns 5 points, capped at 100
fn block_score(blocked_ips: usize) -> f64 {
    (5.0 * blocked_ips as f64).min(100.0)
}

/// Combined security score in [0, 100]
pub fn security_score(total_threats: usize, blocked_ips: usize) -> u32 {
    ((threat_score(total_threats) + block_score(blocked_ips)) / 2.0).round() as u32
}

/// Read-only rollups over the engine's collections
///
/// Never writes; tolerates eventually-consistent reads, so numbers may lag
/// the hot paths slightly.
#[derive(Clone)]
pub struct AnalyticsAggregator {
    moderation: Arc<dyn ModerationStore>,
    reports: Arc<dyn ReportStore>,
    threats: Arc<dyn ThreatStore>,
    blocks: Arc<dyn IpBlockStore>,
    config: Arc<SecurityConfig>,
}

impl AnalyticsAggregator {
    pub fn new(
        moderation: Arc<dyn ModerationStore>,
        reports: Arc<dyn ReportStore>,
        threats: Arc<dyn ThreatStore>,
        blocks: Arc<dyn IpBlockStore>,
        config: Arc<SecurityConfig>,
    ) -> Self {
        Self {
            moderation,
            reports,
            threats,
            blocks,
            config,
        }
    }

    pub async fn moderation_stats(&self) -> Result<ModerationStats> {
        let records = self.moderation.list_records(&RecordFilter::default()).await?;
        let reports = self.reports.list_reports(&ReportFilter::default()).await?;
        let pending = self
            .moderation
            .list_queue(&QueueFilter {
                status: Some(QueueStatus::Pending),
                ..QueueFilter::default()
            })
            .await?;

        let mut reports_by_status: HashMap<ReportStatus, usize> = HashMap::new();
        let mut reports_by_category: HashMap<String, usize> = HashMap::new();
        let mut closed_reports = 0usize;
        for report in &reports {
            *reports_by_status.entry(report.status).or_default() += 1;
            *reports_by_category.entry(report.category.clone()).or_default() += 1;
            if matches!(
                report.status,
                ReportStatus::Resolved | ReportStatus::Rejected | ReportStatus::Dismissed
            ) {
                closed_reports += 1;
            }
        }

        let auto_moderated = records.iter().filter(|r| !r.manual_review_required).count();
        let auto_moderation_rate = if records.is_empty() {
            0.0
        } else {
            auto_moderated as f64 / records.len() as f64
        };
        let resolution_efficiency = if reports.is_empty() {
            0.0
        } else {
            closed_reports as f64 / reports.len() as f64
        };

        Ok(ModerationStats {
            total_records: records.len(),
            total_reports: reports.len(),
            reports_by_status,
            reports_by_category,
            auto_moderated,
            auto_moderation_rate,
            resolution_efficiency,
            pending_queue: pending.len(),
        })
    }

    pub async fn security_overview(&self) -> Result<SecurityOverview> {
        let threats = self.threats.list_threats(&ThreatFilter::default()).await?;
        let blocked = self.blocks.list_blocks(true).await?;

        let mut threats_by_severity: HashMap<Severity, usize> = HashMap::new();
        let mut active_threats = 0usize;
        for threat in &threats {
            *threats_by_severity.entry(threat.severity).or_default() += 1;
            if threat.status == ThreatStatus::Active {
                active_threats += 1;
            }
        }

        let score = security_score(threats.len(), blocked.len());
        let healthy = self.config.get_u64(keys::ANALYTICS_HEALTHY_SCORE, 80) as u32;
        let degraded = self.config.get_u64(keys::ANALYTICS_DEGRADED_SCORE, 60) as u32;
        let health = if score >= healthy {
            SecurityHealth::Healthy
        } else if score >= degraded {
            SecurityHealth::Degraded
        } else {
            SecurityHealth::AtRisk
        };

        Ok(SecurityOverview {
            total_threats: threats.len(),
            active_threats,
            threats_by_severity,
            blocked_ips: blocked.len(),
            security_score: score,
            health,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ContentReport, ContentType, ModerationRecord, ModerationStatus, SecurityThreat, ThreatType,
    };
    use crate::store::MemoryStore;

    fn aggregator(store: Arc<MemoryStore>) -> AnalyticsAggregator {
        AnalyticsAggregator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            Arc::new(SecurityConfig::new()),
        )
    }

    #[test]
    fn test_security_score_formula() {
        // No data: threat side 100, block side 0
        assert_eq!(security_score(0, 0), 50);
        // 10 threats -> 80; 4 blocks -> 20; mean 50
        assert_eq!(security_score(10, 4), 50);
        // Threat side floors at 0
        assert_eq!(security_score(60, 0), 0);
        // Block side caps at 100
        assert_eq!(security_score(0, 40), 100);
    }

    #[tokio::test]
    async fn test_moderation_stats_rates() {
        let store = Arc::new(MemoryStore::new());

        for (id, review) in [("c1", false), ("c2", false), ("c3", true), ("c4", true)] {
            ModerationStore::insert_record(
                store.as_ref(),
                ModerationRecord::new(
                    id,
                    ContentType::Post,
                    "u1",
                    ModerationStatus::Pending,
                    vec![],
                    0.5,
                    review,
                ),
            )
            .await
            .unwrap();
        }

        let mut resolved = ContentReport::draft("u2", "c1", ContentType::Post, "spam");
        resolved.status = ReportStatus::Resolved;
        let mut open = ContentReport::draft("u3", "c2", ContentType::Post, "harassment");
        open.status = ReportStatus::Submitted;
        ReportStore::insert_report(store.as_ref(), resolved).await.unwrap();
        ReportStore::insert_report(store.as_ref(), open).await.unwrap();

        let stats = aggregator(store).moderation_stats().await.unwrap();
        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.auto_moderated, 2);
        assert!((stats.auto_moderation_rate - 0.5).abs() < 1e-9);
        assert_eq!(stats.total_reports, 2);
        assert!((stats.resolution_efficiency - 0.5).abs() < 1e-9);
        assert_eq!(stats.reports_by_category.get("spam"), Some(&1));
    }

    #[tokio::test]
    async fn test_security_overview_bands() {
        let store = Arc::new(MemoryStore::new());

        for _ in 0..5 {
            ThreatStore::insert_threat(
                store.as_ref(),
                SecurityThreat::new(ThreatType::Bot, Severity::Medium, "1.1.1.1", "bot"),
            )
            .await
            .unwrap();
        }
        for i in 0..20 {
            IpBlockStore::upsert_block(
                store.as_ref(),
                crate::models::BlockedIp::new(format!("10.0.0.{i}"), "swept up", None),
            )
            .await
            .unwrap();
        }

        let overview = aggregator(store).security_overview().await.unwrap();
        assert_eq!(overview.total_threats, 5);
        assert_eq!(overview.active_threats, 5);
        assert_eq!(overview.blocked_ips, 20);
        // threat side 90, block side 100 -> 95
        assert_eq!(overview.security_score, 95);
        assert_eq!(overview.health, SecurityHealth::Healthy);
        assert_eq!(overview.threats_by_severity.get(&Severity::Medium), Some(&5));
    }

    #[tokio::test]
    async fn test_empty_stores_report_zeroes() {
        let store = Arc::new(MemoryStore::new());
        let stats = aggregator(store.clone()).moderation_stats().await.unwrap();
        assert_eq!(stats.total_records, 0);
        assert_eq!(stats.auto_moderation_rate, 0.0);
        assert_eq!(stats.resolution_efficiency, 0.0);

        let overview = aggregator(store).security_overview().await.unwrap();
        assert_eq!(overview.security_score, 50);
        assert_eq!(overview.health, SecurityHealth::AtRisk);
    }
}
