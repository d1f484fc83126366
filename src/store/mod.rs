pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::{RedisSecurityStore, RedisStoreConfig};

use crate::error::Result;
use crate::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Outcome of an insert-if-absent on the review queue
#[derive(Clone, Debug)]
pub enum QueueInsert {
    /// No open entry existed; the new entry was stored
    Inserted(ModerationQueueEntry),
    /// An open entry already exists for this content_id; nothing was written
    AlreadyOpen(ModerationQueueEntry),
}

/// Filter for listing moderation records
#[derive(Clone, Debug, Default)]
pub struct RecordFilter {
    pub status: Option<ModerationStatus>,
    pub content_type: Option<ContentType>,
    pub user_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Filter for listing queue entries
#[derive(Clone, Debug, Default)]
pub struct QueueFilter {
    pub status: Option<QueueStatus>,
    pub priority: Option<QueuePriority>,
    pub content_type: Option<ContentType>,
    pub assigned_to: Option<String>,
}

/// Filter for listing moderation actions
#[derive(Clone, Debug, Default)]
pub struct ActionFilter {
    pub user_id: Option<String>,
    pub moderator_id: Option<String>,
    pub content_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Filter for listing content reports
#[derive(Clone, Debug, Default)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub reporter_id: Option<String>,
    pub category: Option<String>,
}

/// Filter for listing threats
#[derive(Clone, Debug, Default)]
pub struct ThreatFilter {
    pub status: Option<ThreatStatus>,
    pub severity: Option<Severity>,
    pub threat_type: Option<ThreatType>,
}

/// Moderation records, the review queue and the action log
///
/// Queue writes are conditional: `update_queue_entry` succeeds only when the
/// stored version matches, so racing automatic and manual paths cannot
/// silently overwrite each other.
#[async_trait]
pub trait ModerationStore: Send + Sync {
    async fn insert_record(&self, record: ModerationRecord) -> Result<()>;
    async fn get_record(&self, content_id: &str) -> Result<Option<ModerationRecord>>;
    async fn set_record_status(&self, content_id: &str, status: ModerationStatus) -> Result<()>;
    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<ModerationRecord>>;

    /// Insert a queue entry unless an open one already exists for the same
    /// content_id. Atomic per content_id.
    async fn insert_queue_entry(&self, entry: ModerationQueueEntry) -> Result<QueueInsert>;
    async fn get_open_queue_entry(&self, content_id: &str) -> Result<Option<ModerationQueueEntry>>;
    /// Conditional write; returns false when the stored version differs
    async fn update_queue_entry(&self, entry: ModerationQueueEntry, expected_version: u64) -> Result<bool>;
    async fn list_queue(&self, filter: &QueueFilter) -> Result<Vec<ModerationQueueEntry>>;

    async fn append_action(&self, action: ModerationAction) -> Result<()>;
    async fn get_action(&self, action_id: &str) -> Result<Option<ModerationAction>>;
    async fn list_actions(&self, filter: &ActionFilter) -> Result<Vec<ModerationAction>>;
}

/// Per-user moderation state with versioned writes
#[async_trait]
pub trait UserStatusStore: Send + Sync {
    async fn get_user_status(&self, user_id: &str) -> Result<Option<UserModerationStatus>>;
    /// Conditional write. `expected_version` 0 means the row must not exist
    /// yet; otherwise the stored version must match. Returns false on
    /// conflict, leaving the row untouched.
    async fn put_user_status(&self, status: UserModerationStatus, expected_version: u64) -> Result<bool>;
    async fn list_user_statuses(&self, status: Option<UserStatus>) -> Result<Vec<UserModerationStatus>>;
}

/// Content reports
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn insert_report(&self, report: ContentReport) -> Result<()>;
    async fn get_report(&self, report_id: &str) -> Result<Option<ContentReport>>;
    async fn set_report_status(&self, report_id: &str, status: ReportStatus) -> Result<()>;
    async fn list_reports(&self, filter: &ReportFilter) -> Result<Vec<ContentReport>>;
}

/// Appeals, with status-conditional updates
#[async_trait]
pub trait AppealStore: Send + Sync {
    async fn insert_appeal(&self, appeal: AppealRequest) -> Result<()>;
    async fn get_appeal(&self, appeal_id: &str) -> Result<Option<AppealRequest>>;
    /// Replace the appeal only if its stored status equals `expected_status`;
    /// returns false otherwise.
    async fn update_appeal(&self, appeal: AppealRequest, expected_status: AppealStatus) -> Result<bool>;
    async fn list_appeals(&self, user_id: Option<&str>, status: Option<AppealStatus>) -> Result<Vec<AppealRequest>>;
}

/// Security event history consumed by the threat detector
#[async_trait]
pub trait SecurityEventStore: Send + Sync {
    async fn record_event(&self, event: SecurityEvent) -> Result<()>;
    /// Count events of one type from one IP since the given instant
    async fn count_events(
        &self,
        ip_address: &str,
        event_type: SecurityEventType,
        since: DateTime<Utc>,
    ) -> Result<u64>;
    async fn recent_events(&self, ip_address: &str, since: DateTime<Utc>) -> Result<Vec<SecurityEvent>>;
}

/// Detected threats and their derived alerts
#[async_trait]
pub trait ThreatStore: Send + Sync {
    async fn insert_threat(&self, threat: SecurityThreat) -> Result<()>;
    async fn set_threat_status(&self, threat_id: &str, status: ThreatStatus) -> Result<()>;
    async fn list_threats(&self, filter: &ThreatFilter) -> Result<Vec<SecurityThreat>>;

    async fn insert_alert(&self, alert: SecurityAlert) -> Result<()>;
    async fn set_alert_status(&self, alert_id: &str, status: AlertStatus) -> Result<()>;
    async fn list_alerts(&self, status: Option<AlertStatus>) -> Result<Vec<SecurityAlert>>;
}

/// Blocked-IP rows keyed by address
#[async_trait]
pub trait IpBlockStore: Send + Sync {
    /// Insert or replace the row for this address
    async fn upsert_block(&self, block: BlockedIp) -> Result<()>;
    async fn get_block(&self, ip_address: &str) -> Result<Option<BlockedIp>>;
    /// Flip the active flag; no-op when the row is absent or already there
    async fn set_block_active(&self, ip_address: &str, active: bool) -> Result<()>;
    async fn list_blocks(&self, active_only: bool) -> Result<Vec<BlockedIp>>;
}

/// Sliding-window hit counts keyed by (identifier, action)
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Number of hits recorded in `[from, to]`
    async fn count_hits(
        &self,
        identifier: &str,
        action: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64>;
    /// Record one hit at the given instant
    async fn record_hit(&self, identifier: &str, action: &str, at: DateTime<Utc>) -> Result<()>;
}
