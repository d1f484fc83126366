use super::*;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// In-memory reference implementation of every store trait
///
/// Per-key atomicity comes from DashMap entry locking: all read-modify-write
/// paths (queue versions, user-status versions, rate windows) hold the shard
/// lock for the key they touch and nothing else. Suitable for tests and for
/// single-process deployments.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, ModerationRecord>,
    queue: DashMap<String, ModerationQueueEntry>,
    actions: DashMap<String, ModerationAction>,
    user_status: DashMap<String, UserModerationStatus>,
    reports: DashMap<String, ContentReport>,
    appeals: DashMap<String, AppealRequest>,
    events: DashMap<String, Vec<SecurityEvent>>,
    threats: DashMap<String, SecurityThreat>,
    alerts: DashMap<String, SecurityAlert>,
    blocks: DashMap<String, BlockedIp>,
    rate_hits: DashMap<(String, String), Vec<DateTime<Utc>>>,
}

/// Events older than this are pruned on insert
const EVENT_RETENTION_HOURS: i64 = 24;

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModerationStore for MemoryStore {
    async fn insert_record(&self, record: ModerationRecord) -> Result<()> {
        // First write wins; a record is created once per content_id
        self.records.entry(record.content_id.clone()).or_insert(record);
        Ok(())
    }

    async fn get_record(&self, content_id: &str) -> Result<Option<ModerationRecord>> {
        Ok(self.records.get(content_id).map(|r| r.clone()))
    }

    async fn set_record_status(&self, content_id: &str, status: ModerationStatus) -> Result<()> {
        match self.records.get_mut(content_id) {
            Some(mut record) => {
                record.status = status;
                record.updated_at = Utc::now();
                Ok(())
            }
            None => Err(crate::error::EngineError::NotFound(format!(
                "moderation record for content {content_id}"
            ))),
        }
    }

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<ModerationRecord>> {
        let mut out: Vec<ModerationRecord> = self
            .records
            .iter()
            .filter(|r| {
                filter.status.map_or(true, |s| r.status == s)
                    && filter.content_type.map_or(true, |t| r.content_type == t)
                    && filter.user_id.as_deref().map_or(true, |u| r.user_id == u)
                    && filter.since.map_or(true, |s| r.created_at >= s)
                    && filter.until.map_or(true, |u| r.created_at <= u)
            })
            .map(|r| r.clone())
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn insert_queue_entry(&self, entry: ModerationQueueEntry) -> Result<QueueInsert> {
        match self.queue.entry(entry.content_id.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_open() {
                    Ok(QueueInsert::AlreadyOpen(occupied.get().clone()))
                } else {
                    occupied.insert(entry.clone());
                    Ok(QueueInsert::Inserted(entry))
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry.clone());
                Ok(QueueInsert::Inserted(entry))
            }
        }
    }

    async fn get_open_queue_entry(&self, content_id: &str) -> Result<Option<ModerationQueueEntry>> {
        Ok(self
            .queue
            .get(content_id)
            .filter(|e| e.is_open())
            .map(|e| e.clone()))
    }

    async fn update_queue_entry(&self, mut entry: ModerationQueueEntry, expected_version: u64) -> Result<bool> {
        match self.queue.entry(entry.content_id.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().version != expected_version {
                    return Ok(false);
                }
                entry.version = expected_version + 1;
                occupied.insert(entry);
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn list_queue(&self, filter: &QueueFilter) -> Result<Vec<ModerationQueueEntry>> {
        let mut out: Vec<ModerationQueueEntry> = self
            .queue
            .iter()
            .filter(|e| {
                filter.status.map_or(true, |s| e.status == s)
                    && filter.priority.map_or(true, |p| e.priority == p)
                    && filter.content_type.map_or(true, |t| e.content_type == t)
                    && filter
                        .assigned_to
                        .as_deref()
                        .map_or(true, |m| e.assigned_to.as_deref() == Some(m))
            })
            .map(|e| e.clone())
            .collect();
        // Most urgent first, oldest first within a tier
        out.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(out)
    }

    async fn append_action(&self, action: ModerationAction) -> Result<()> {
        self.actions.insert(action.id.clone(), action);
        Ok(())
    }

    async fn get_action(&self, action_id: &str) -> Result<Option<ModerationAction>> {
        Ok(self.actions.get(action_id).map(|a| a.clone()))
    }

    async fn list_actions(&self, filter: &ActionFilter) -> Result<Vec<ModerationAction>> {
        let mut out: Vec<ModerationAction> = self
            .actions
            .iter()
            .filter(|a| {
                filter.user_id.as_deref().map_or(true, |u| a.user_id == u)
                    && filter.moderator_id.as_deref().map_or(true, |m| a.moderator_id == m)
                    && filter.content_id.as_deref().map_or(true, |c| a.content_id == c)
                    && filter.since.map_or(true, |s| a.created_at >= s)
                    && filter.until.map_or(true, |u| a.created_at <= u)
            })
            .map(|a| a.clone())
            .collect();
        out.sort_by_key(|a| a.created_at);
        Ok(out)
    }
}

#[async_trait]
impl UserStatusStore for MemoryStore {
    async fn get_user_status(&self, user_id: &str) -> Result<Option<UserModerationStatus>> {
        Ok(self.user_status.get(user_id).map(|s| s.clone()))
    }

    async fn put_user_status(&self, mut status: UserModerationStatus, expected_version: u64) -> Result<bool> {
        match self.user_status.entry(status.user_id.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().version != expected_version {
                    return Ok(false);
                }
                status.version = expected_version + 1;
                occupied.insert(status);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                if expected_version != 0 {
                    return Ok(false);
                }
                status.version = 1;
                vacant.insert(status);
                Ok(true)
            }
        }
    }

    async fn list_user_statuses(&self, status: Option<UserStatus>) -> Result<Vec<UserModerationStatus>> {
        Ok(self
            .user_status
            .iter()
            .filter(|s| status.map_or(true, |wanted| s.status == wanted))
            .map(|s| s.clone())
            .collect())
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn insert_report(&self, report: ContentReport) -> Result<()> {
        self.reports.insert(report.id.clone(), report);
        Ok(())
    }

    async fn get_report(&self, report_id: &str) -> Result<Option<ContentReport>> {
        Ok(self.reports.get(report_id).map(|r| r.clone()))
    }

    async fn set_report_status(&self, report_id: &str, status: ReportStatus) -> Result<()> {
        match self.reports.get_mut(report_id) {
            Some(mut report) => {
                report.status = status;
                report.updated_at = Utc::now();
                Ok(())
            }
            None => Err(crate::error::EngineError::NotFound(format!("report {report_id}"))),
        }
    }

    async fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<ContentReport>> {
        let mut out: Vec<ContentReport> = self
            .reports
            .iter()
            .filter(|r| {
                filter.status.map_or(true, |s| r.status == s)
                    && filter.reporter_id.as_deref().map_or(true, |id| r.reporter_id == id)
                    && filter.category.as_deref().map_or(true, |c| r.category == c)
            })
            .map(|r| r.clone())
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }
}

#[async_trait]
impl AppealStore for MemoryStore {
    async fn insert_appeal(&self, appeal: AppealRequest) -> Result<()> {
        self.appeals.insert(appeal.id.clone(), appeal);
        Ok(())
    }

    async fn get_appeal(&self, appeal_id: &str) -> Result<Option<AppealRequest>> {
        Ok(self.appeals.get(appeal_id).map(|a| a.clone()))
    }

    async fn update_appeal(&self, appeal: AppealRequest, expected_status: AppealStatus) -> Result<bool> {
        match self.appeals.entry(appeal.id.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().status != expected_status {
                    return Ok(false);
                }
                occupied.insert(appeal);
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn list_appeals(&self, user_id: Option<&str>, status: Option<AppealStatus>) -> Result<Vec<AppealRequest>> {
        let mut out: Vec<AppealRequest> = self
            .appeals
            .iter()
            .filter(|a| {
                user_id.map_or(true, |u| a.user_id == u) && status.map_or(true, |s| a.status == s)
            })
            .map(|a| a.clone())
            .collect();
        out.sort_by_key(|a| a.created_at);
        Ok(out)
    }
}

#[async_trait]
impl SecurityEventStore for MemoryStore {
    async fn record_event(&self, event: SecurityEvent) -> Result<()> {
        let cutoff = Utc::now() - chrono::Duration::hours(EVENT_RETENTION_HOURS);
        let mut bucket = self.events.entry(event.ip_address.clone()).or_default();
        bucket.retain(|e| e.created_at >= cutoff);
        bucket.push(event);
        Ok(())
    }

    async fn count_events(
        &self,
        ip_address: &str,
        event_type: SecurityEventType,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(self.events.get(ip_address).map_or(0, |bucket| {
            bucket
                .iter()
                .filter(|e| e.event_type == event_type && e.created_at >= since)
                .count() as u64
        }))
    }

    async fn recent_events(&self, ip_address: &str, since: DateTime<Utc>) -> Result<Vec<SecurityEvent>> {
        Ok(self.events.get(ip_address).map_or_else(Vec::new, |bucket| {
            bucket.iter().filter(|e| e.created_at >= since).cloned().collect()
        }))
    }
}

#[async_trait]
impl ThreatStore for MemoryStore {
    async fn insert_threat(&self, threat: SecurityThreat) -> Result<()> {
        self.threats.insert(threat.id.clone(), threat);
        Ok(())
    }

    async fn set_threat_status(&self, threat_id: &str, status: ThreatStatus) -> Result<()> {
        match self.threats.get_mut(threat_id) {
            Some(mut threat) => {
                threat.status = status;
                threat.updated_at = Utc::now();
                Ok(())
            }
            None => Err(crate::error::EngineError::NotFound(format!("threat {threat_id}"))),
        }
    }

    async fn list_threats(&self, filter: &ThreatFilter) -> Result<Vec<SecurityThreat>> {
        let mut out: Vec<SecurityThreat> = self
            .threats
            .iter()
            .filter(|t| {
                filter.status.map_or(true, |s| t.status == s)
                    && filter.severity.map_or(true, |s| t.severity == s)
                    && filter.threat_type.map_or(true, |k| t.threat_type == k)
            })
            .map(|t| t.clone())
            .collect();
        out.sort_by_key(|t| t.created_at);
        Ok(out)
    }

    async fn insert_alert(&self, alert: SecurityAlert) -> Result<()> {
        self.alerts.insert(alert.id.clone(), alert);
        Ok(())
    }

    async fn set_alert_status(&self, alert_id: &str, status: AlertStatus) -> Result<()> {
        match self.alerts.get_mut(alert_id) {
            Some(mut alert) => {
                alert.status = status;
                Ok(())
            }
            None => Err(crate::error::EngineError::NotFound(format!("alert {alert_id}"))),
        }
    }

    async fn list_alerts(&self, status: Option<AlertStatus>) -> Result<Vec<SecurityAlert>> {
        let mut out: Vec<SecurityAlert> = self
            .alerts
            .iter()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .map(|a| a.clone())
            .collect();
        out.sort_by_key(|a| a.created_at);
        Ok(out)
    }
}

#[async_trait]
impl IpBlockStore for MemoryStore {
    async fn upsert_block(&self, block: BlockedIp) -> Result<()> {
        self.blocks.insert(block.ip_address.clone(), block);
        Ok(())
    }

    async fn get_block(&self, ip_address: &str) -> Result<Option<BlockedIp>> {
        Ok(self.blocks.get(ip_address).map(|b| b.clone()))
    }

    async fn set_block_active(&self, ip_address: &str, active: bool) -> Result<()> {
        if let Some(mut block) = self.blocks.get_mut(ip_address) {
            if block.active != active {
                block.active = active;
                block.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn list_blocks(&self, active_only: bool) -> Result<Vec<BlockedIp>> {
        Ok(self
            .blocks
            .iter()
            .filter(|b| !active_only || b.active)
            .map(|b| b.clone())
            .collect())
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn count_hits(
        &self,
        identifier: &str,
        action: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64> {
        let key = (identifier.to_string(), action.to_string());
        Ok(self.rate_hits.get(&key).map_or(0, |hits| {
            hits.iter().filter(|t| **t >= from && **t <= to).count() as u64
        }))
    }

    async fn record_hit(&self, identifier: &str, action: &str, at: DateTime<Utc>) -> Result<()> {
        let key = (identifier.to_string(), action.to_string());
        let cutoff = at - chrono::Duration::hours(EVENT_RETENTION_HOURS);
        let mut hits = self.rate_hits.entry(key).or_default();
        hits.retain(|t| *t >= cutoff);
        hits.push(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_user_status_versioned_write() {
        let store = MemoryStore::new();
        let fresh = UserModerationStatus::baseline("u1");

        assert!(store.put_user_status(fresh.clone(), 0).await.unwrap());
        // A second insert with expected_version 0 loses
        assert!(!store.put_user_status(fresh.clone(), 0).await.unwrap());

        let stored = store.get_user_status("u1").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);

        // Stale version is rejected, matching version goes through
        assert!(!store.put_user_status(stored.clone(), 0).await.unwrap());
        assert!(store.put_user_status(stored.clone(), 1).await.unwrap());
        assert_eq!(store.get_user_status("u1").await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_queue_insert_if_absent() {
        let store = MemoryStore::new();
        let entry = ModerationQueueEntry::new("c1", ContentType::Post, "u1", QueuePriority::High, 0.8, true);

        match store.insert_queue_entry(entry.clone()).await.unwrap() {
            QueueInsert::Inserted(_) => {}
            QueueInsert::AlreadyOpen(_) => panic!("first insert must succeed"),
        }

        // Second insert for the same content returns the existing open entry
        let dup = ModerationQueueEntry::new("c1", ContentType::Post, "u1", QueuePriority::Low, 0.1, true);
        match store.insert_queue_entry(dup).await.unwrap() {
            QueueInsert::AlreadyOpen(existing) => assert_eq!(existing.id, entry.id),
            QueueInsert::Inserted(_) => panic!("duplicate open entry created"),
        }
    }

    #[tokio::test]
    async fn test_rate_hits_window_count() {
        let store = MemoryStore::new();
        let now = Utc::now();

        for i in 0..3 {
            store
                .record_hit("user", "post", now - chrono::Duration::seconds(i * 10))
                .await
                .unwrap();
        }
        store
            .record_hit("user", "post", now - chrono::Duration::seconds(120))
            .await
            .unwrap();

        let count = store
            .count_hits("user", "post", now - chrono::Duration::seconds(60), now)
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_event_counts_by_type_and_ip() {
        let store = MemoryStore::new();
        let since = Utc::now() - chrono::Duration::minutes(15);

        for _ in 0..4 {
            store
                .record_event(SecurityEvent::new("1.2.3.4", "ua", SecurityEventType::FailedLogin, Severity::Medium))
                .await
                .unwrap();
        }
        store
            .record_event(SecurityEvent::new("1.2.3.4", "ua", SecurityEventType::Login, Severity::Low))
            .await
            .unwrap();
        store
            .record_event(SecurityEvent::new("5.6.7.8", "ua", SecurityEventType::FailedLogin, Severity::Medium))
            .await
            .unwrap();

        let count = store
            .count_events("1.2.3.4", SecurityEventType::FailedLogin, since)
            .await
            .unwrap();
        assert_eq!(count, 4);
    }
}
