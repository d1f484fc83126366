use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Kind of user content being moderated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Post,
    Comment,
    Message,
    Profile,
    Media,
}

/// A piece of user content handed to the engine for classification
///
/// Transient input; the engine persists a ModerationRecord, not the item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub content_type: ContentType,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ContentItem {
    pub fn new(id: impl Into<String>, content_type: ContentType, user_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content_type,
            user_id: user_id.into(),
            text: None,
            image_urls: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_images(mut self, urls: Vec<String>) -> Self {
        self.image_urls = urls;
        self
    }
}

/// Lifecycle status of a moderation record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
    Flagged,
}

/// Persistent record of one classified content item
///
/// Created once per content_id. Later status changes come only from
/// moderation actions; re-submitting the same content never re-scores it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModerationRecord {
    pub id: String,
    pub content_id: String,
    pub content_type: ContentType,
    pub user_id: String,
    pub status: ModerationStatus,
    pub flagged_reasons: Vec<String>,
    pub auto_moderation_score: f64,
    pub manual_review_required: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModerationRecord {
    pub fn new(
        content_id: impl Into<String>,
        content_type: ContentType,
        user_id: impl Into<String>,
        status: ModerationStatus,
        flagged_reasons: Vec<String>,
        auto_moderation_score: f64,
        manual_review_required: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_id: content_id.into(),
            content_type,
            user_id: user_id.into(),
            status,
            flagged_reasons,
            auto_moderation_score,
            manual_review_required,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Review urgency tier for queued content
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePriority {
    Low,
    Medium,
    High,
    Urgent,
}

/// Lifecycle status of a queue entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    InReview,
    Resolved,
}

/// One entry in the human-review queue
///
/// At most one open (non-resolved) entry exists per content_id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModerationQueueEntry {
    pub id: String,
    pub content_id: String,
    pub content_type: ContentType,
    pub user_id: String,
    pub priority: QueuePriority,
    pub status: QueueStatus,
    pub auto_score: f64,
    pub manual_review_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every conditional write; used for optimistic concurrency
    pub version: u64,
}

impl ModerationQueueEntry {
    pub fn new(
        content_id: impl Into<String>,
        content_type: ContentType,
        user_id: impl Into<String>,
        priority: QueuePriority,
        auto_score: f64,
        manual_review_required: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_id: content_id.into(),
            content_type,
            user_id: user_id.into(),
            priority,
            status: QueueStatus::Pending,
            auto_score,
            manual_review_required,
            assigned_to: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status != QueueStatus::Resolved
    }
}

/// What a moderator (or the system) did about a piece of content
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Approve,
    Flag,
    Remove,
    Warn,
    Suspend,
    Ban,
}

/// Severity attached to actions, events, threats and alerts
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Moderator identifier used for automatic actions
pub const SYSTEM_MODERATOR: &str = "system";

/// Append-only log entry for a moderation decision
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModerationAction {
    pub id: String,
    /// "system" when the engine acted on its own
    pub moderator_id: String,
    pub content_id: String,
    pub content_type: ContentType,
    pub user_id: String,
    pub action_type: ActionType,
    pub reason: String,
    /// Advisory duration in hours for suspend-style actions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<u32>,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

impl ModerationAction {
    pub fn new(
        moderator_id: impl Into<String>,
        content_id: impl Into<String>,
        content_type: ContentType,
        user_id: impl Into<String>,
        action_type: ActionType,
        reason: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            moderator_id: moderator_id.into(),
            content_id: content_id.into(),
            content_type,
            user_id: user_id.into(),
            action_type,
            reason: reason.into(),
            duration_hours: None,
            severity,
            created_at: Utc::now(),
        }
    }

    pub fn with_duration_hours(mut self, hours: u32) -> Self {
        self.duration_hours = Some(hours);
        self
    }
}

/// Account-level moderation standing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Warned,
    Suspended,
    Banned,
    Restricted,
}

/// Appeal standing mirrored onto the user row
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAppealStatus {
    None,
    Pending,
    Approved,
    Denied,
}

/// Restriction tag that removes all capabilities
pub const RESTRICTION_ALL: &str = "all";
/// Restriction tag that removes posting capability
pub const RESTRICTION_POSTING: &str = "posting";

/// Per-user moderation state, 1:1 with user_id
///
/// Mutated only through the state machine; writes are versioned.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserModerationStatus {
    pub user_id: String,
    pub status: UserStatus,
    pub warnings: u32,
    pub violations: u32,
    pub restrictions: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_violation: Option<DateTime<Utc>>,
    pub appeal_status: UserAppealStatus,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every conditional write; used for optimistic concurrency
    pub version: u64,
}

impl UserModerationStatus {
    /// Fresh row for a user with no prior moderation history
    pub fn baseline(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            status: UserStatus::Active,
            warnings: 0,
            violations: 0,
            restrictions: BTreeSet::new(),
            last_violation: None,
            appeal_status: UserAppealStatus::None,
            updated_at: Utc::now(),
            version: 0,
        }
    }
}

/// Lifecycle status of a content report
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Draft,
    Submitted,
    UnderReview,
    Resolved,
    Rejected,
    Dismissed,
}

/// A user-filed report against a piece of content
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentReport {
    pub id: String,
    pub reporter_id: String,
    pub content_id: String,
    pub content_type: ContentType,
    /// Report template / category reference
    pub category: String,
    /// Free-form answers keyed by template question id
    #[serde(default)]
    pub answers: std::collections::HashMap<String, String>,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentReport {
    pub fn draft(
        reporter_id: impl Into<String>,
        content_id: impl Into<String>,
        content_type: ContentType,
        category: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            reporter_id: reporter_id.into(),
            content_id: content_id.into(),
            content_type,
            category: category.into(),
            answers: std::collections::HashMap::new(),
            status: ReportStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lifecycle status of an appeal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppealStatus {
    Pending,
    UnderReview,
    Approved,
    Denied,
}

/// A user request to reverse a prior moderation action
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppealRequest {
    pub id: String,
    pub user_id: String,
    /// The ModerationAction being appealed
    pub action_id: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    pub status: AppealStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderator_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppealRequest {
    pub fn new(
        user_id: impl Into<String>,
        action_id: impl Into<String>,
        reason: impl Into<String>,
        evidence: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            action_id: action_id.into(),
            reason: reason.into(),
            evidence,
            status: AppealStatus::Pending,
            moderator_notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Kind of request-level event fed to the threat detector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    Login,
    Logout,
    FailedLogin,
    SuspiciousActivity,
    DataAccess,
    ContentCreation,
}

/// One observed request event; transient input to the threat detector
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: String,
    pub ip_address: String,
    pub user_agent: String,
    pub event_type: SecurityEventType,
    pub severity: Severity,
    #[serde(default)]
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(
        ip_address: impl Into<String>,
        user_agent: impl Into<String>,
        event_type: SecurityEventType,
        severity: Severity,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
            event_type,
            severity,
            details: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }
}

/// Classified threat kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    Spam,
    Bot,
    Malware,
    Phishing,
    Ddos,
    BruteForce,
    SuspiciousActivity,
}

/// Investigation status of a detected threat
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatStatus {
    Active,
    Investigating,
    Resolved,
    FalsePositive,
}

/// A detected security threat
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityThreat {
    pub id: String,
    pub threat_type: ThreatType,
    pub severity: Severity,
    /// Source IP the threat was observed from
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub description: String,
    pub status: ThreatStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SecurityThreat {
    pub fn new(
        threat_type: ThreatType,
        severity: Severity,
        source: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            threat_type,
            severity,
            source: source.into(),
            target: None,
            description: description.into(),
            status: ThreatStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Triage status of an alert
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Dismissed,
}

/// Human-triage alert derived 1:1 from a threat
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: String,
    pub threat_id: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}

impl SecurityAlert {
    pub fn for_threat(threat: &SecurityThreat) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            threat_id: threat.id.clone(),
            title: format!("{:?} threat from {}", threat.threat_type, threat.source),
            message: threat.description.clone(),
            severity: threat.severity,
            status: AlertStatus::Active,
            created_at: Utc::now(),
        }
    }
}

/// One recorded hit inside a rate-limit window
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub identifier: String,
    pub action: String,
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

/// An IP block row
///
/// `duration_secs` is advisory metadata; nothing expires a block
/// automatically. Expiry, when wanted, runs as a separate sweep.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockedIp {
    pub id: String,
    pub ip_address: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BlockedIp {
    pub fn new(ip_address: impl Into<String>, reason: impl Into<String>, duration_secs: Option<u64>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            ip_address: ip_address.into(),
            reason: reason.into(),
            duration_secs,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
