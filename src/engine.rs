use std::sync::Arc;

use crate::analytics::AnalyticsAggregator;
use crate::config::SecurityConfig;
use crate::error::Result;
use crate::models::{
    ActionType, ContentItem, ModerationAction, ModerationQueueEntry, ModerationRecord,
    ModerationStatus, SecurityEvent, SecurityThreat, UserModerationStatus,
};
use crate::moderation::queue::{manual_review_required, ModerationQueueManager};
use crate::moderation::{AppealWorkflow, ReportManager, UserStatusMachine};
use crate::notify::NotificationDispatcher;
use crate::security::classifier::{FilterResult, PatternClassifier, UserBehaviorSnapshot};
use crate::security::{IpBlockRegistry, RateLimiter, ThreatDetector};
use crate::store::{
    AppealStore, IpBlockStore, ModerationStore, RateLimitStore, ReportStore, SecurityEventStore,
    ThreatStore, UserStatusStore,
};

/// What came out of classifying one content item
#[derive(Clone, Debug)]
pub struct ModerationOutcome {
    pub record: ModerationRecord,
    /// The classifier verdict; absent when the content was already on file
    /// and nothing was re-scored
    pub filter: Option<FilterResult>,
    /// Open queue entry, when the item needs (or was already awaiting) review
    pub queue_entry: Option<ModerationQueueEntry>,
    /// False when an existing record was returned untouched
    pub fresh: bool,
}

/// The assembled decision engine
///
/// One explicitly constructed instance owns every component; callers pass it
/// by reference. There are no process-wide singletons, and the engine talks
/// to persistence only through the store traits handed to `new`.
#[derive(Clone)]
pub struct ModerationEngine {
    pub config: Arc<SecurityConfig>,
    pub classifier: PatternClassifier,
    pub queue: ModerationQueueManager,
    pub users: UserStatusMachine,
    pub threats: ThreatDetector,
    pub rate_limiter: RateLimiter,
    pub ip_registry: IpBlockRegistry,
    pub appeals: AppealWorkflow,
    pub reports: ReportManager,
    pub analytics: AnalyticsAggregator,
    moderation_store: Arc<dyn ModerationStore>,
}

impl ModerationEngine {
    pub fn new<S>(store: Arc<S>, dispatcher: Arc<dyn NotificationDispatcher>, config: SecurityConfig) -> Self
    where
        S: ModerationStore
            + UserStatusStore
            + ReportStore
            + AppealStore
            + SecurityEventStore
            + ThreatStore
            + IpBlockStore
            + RateLimitStore
            + 'static,
    {
        let config = Arc::new(config);

        let moderation_store: Arc<dyn ModerationStore> = store.clone();
        let user_store: Arc<dyn UserStatusStore> = store.clone();
        let report_store: Arc<dyn ReportStore> = store.clone();
        let appeal_store: Arc<dyn AppealStore> = store.clone();
        let event_store: Arc<dyn SecurityEventStore> = store.clone();
        let threat_store: Arc<dyn ThreatStore> = store.clone();
        let block_store: Arc<dyn IpBlockStore> = store.clone();
        let rate_store: Arc<dyn RateLimitStore> = store;

        let classifier = PatternClassifier::from_config(&config);
        let queue = ModerationQueueManager::new(moderation_store.clone(), &config);
        let users = UserStatusMachine::new(user_store, dispatcher.clone());
        let ip_registry = IpBlockRegistry::new(block_store.clone());
        let threats = ThreatDetector::new(
            event_store,
            threat_store.clone(),
            ip_registry.clone(),
            config.clone(),
        );
        let rate_limiter = RateLimiter::new(rate_store, config.clone());
        let appeals = AppealWorkflow::new(appeal_store, users.clone(), dispatcher.clone());
        let reports = ReportManager::new(report_store.clone(), dispatcher);
        let analytics = AnalyticsAggregator::new(
            moderation_store.clone(),
            report_store,
            threat_store,
            block_store,
            config.clone(),
        );

        Self {
            config,
            classifier,
            queue,
            users,
            threats,
            rate_limiter,
            ip_registry,
            appeals,
            reports,
            analytics,
            moderation_store,
        }
    }

    /// Swap in the enabled custom filter set
    pub fn set_custom_filters(&mut self, filters: Vec<crate::security::CustomFilter>) {
        self.classifier.set_custom_filters(filters);
    }

    /// Classify a content item, persist its record and queue it for review
    /// when needed
    ///
    /// Content already on file is returned as-is: a record is created once
    /// per content_id and never re-scored.
    pub async fn moderate_content(&self, item: &ContentItem) -> Result<ModerationOutcome> {
        self.moderate_content_with_behavior(item, None).await
    }

    /// Same as `moderate_content`, folding in the caller's behavior snapshot
    pub async fn moderate_content_with_behavior(
        &self,
        item: &ContentItem,
        behavior: Option<&UserBehaviorSnapshot>,
    ) -> Result<ModerationOutcome> {
        if let Some(existing) = self.moderation_store.get_record(&item.id).await? {
            let queue_entry = self.moderation_store.get_open_queue_entry(&item.id).await?;
            return Ok(ModerationOutcome {
                record: existing,
                filter: None,
                queue_entry,
                fresh: false,
            });
        }

        let filter = self.classifier.classify_with_behavior(item, behavior);
        let review = manual_review_required(filter.score, &filter.reasons, self.queue.thresholds());
        let status = if filter.blocked {
            ModerationStatus::Rejected
        } else if filter.flagged {
            ModerationStatus::Flagged
        } else {
            ModerationStatus::Approved
        };

        let record = ModerationRecord::new(
            item.id.clone(),
            item.content_type,
            item.user_id.clone(),
            status,
            filter.reasons.clone(),
            filter.score,
            review,
        );
        self.moderation_store.insert_record(record.clone()).await?;
        // The store keeps the first write on a create-once race; read back
        // whichever record actually landed
        let record = self
            .moderation_store
            .get_record(&item.id)
            .await?
            .unwrap_or(record);

        let queue_entry = self.queue.enqueue_if_needed(&record).await?;
        metrics::counter!("content_items_classified_total", 1);

        Ok(ModerationOutcome {
            record,
            filter: Some(filter),
            queue_entry,
            fresh: true,
        })
    }

    /// Apply a moderation action: log it, update the content record, close
    /// any open queue entry and drive the user state machine
    pub async fn apply_action(&self, action: ModerationAction) -> Result<UserModerationStatus> {
        self.moderation_store.append_action(action.clone()).await?;

        let record_status = match action.action_type {
            ActionType::Approve => Some(ModerationStatus::Approved),
            ActionType::Flag => Some(ModerationStatus::Flagged),
            ActionType::Remove => Some(ModerationStatus::Rejected),
            // User-level sanctions leave the content record alone
            ActionType::Warn | ActionType::Suspend | ActionType::Ban => None,
        };
        if let Some(status) = record_status {
            if self.moderation_store.get_record(&action.content_id).await?.is_some() {
                self.moderation_store
                    .set_record_status(&action.content_id, status)
                    .await?;
            }
        }

        // Every action except a bare flag settles the review
        if action.action_type != ActionType::Flag {
            self.queue.resolve(&action.content_id).await?;
        }

        self.users.apply_action(&action).await
    }

    /// Feed one security event through the threat detector
    pub async fn record_security_event(&self, event: SecurityEvent) -> Result<Vec<SecurityThreat>> {
        self.threats.process_event(event).await
    }

    /// Rate-limit check for (identifier, action); never errors, fails open
    pub async fn check_rate_limit(&self, identifier: &str, action: &str) -> crate::security::RateLimitDecision {
        self.rate_limiter.check(identifier, action).await
    }

    /// File an appeal against a logged moderation action
    ///
    /// Validates the action reference before handing off to the workflow:
    /// the action must exist and must target the appealing user.
    pub async fn submit_appeal(
        &self,
        user_id: &str,
        action_id: &str,
        reason: &str,
        evidence: Option<String>,
    ) -> Result<crate::models::AppealRequest> {
        let action = self
            .moderation_store
            .get_action(action_id)
            .await?
            .ok_or_else(|| crate::error::EngineError::NotFound(format!("action {action_id}")))?;
        if action.user_id != user_id {
            return Err(crate::error::EngineError::InvalidTransition(format!(
                "action {action_id} does not target user {user_id}"
            )));
        }

        self.appeals.submit(user_id, action_id, reason, evidence).await
    }

    /// The action log for one piece of content, oldest first
    pub async fn actions_for_content(&self, content_id: &str) -> Result<Vec<ModerationAction>> {
        self.moderation_store
            .list_actions(&crate::store::ActionFilter {
                content_id: Some(content_id.to_string()),
                ..crate::store::ActionFilter::default()
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AppealStatus, ContentType, QueuePriority, QueueStatus, Severity, UserStatus,
        SYSTEM_MODERATOR,
    };
    use crate::moderation::AppealDecision;
    use crate::notify::BufferingDispatcher;
    use crate::security::{CustomFilter, FilterAction};
    use crate::store::MemoryStore;

    fn engine() -> ModerationEngine {
        ModerationEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(BufferingDispatcher::new()),
            SecurityConfig::new(),
        )
    }

    fn item(id: &str, text: &str) -> ContentItem {
        ContentItem::new(id, ContentType::Post, "author-1").with_text(text)
    }

    #[tokio::test]
    async fn test_clean_content_is_approved_without_queue() {
        let engine = engine();
        let outcome = engine
            .moderate_content(&item("c1", "lovely weather on the trail today"))
            .await
            .unwrap();

        assert!(outcome.fresh);
        assert_eq!(outcome.record.status, ModerationStatus::Approved);
        assert!(!outcome.record.manual_review_required);
        assert!(outcome.queue_entry.is_none());
    }

    #[tokio::test]
    async fn test_blocked_content_is_rejected_and_queued_urgent() {
        let mut engine = engine();
        engine.set_custom_filters(vec![CustomFilter::new(
            "zero-tolerance",
            r"(?i)\bcontraband\b",
            Severity::Critical,
            FilterAction::Block,
        )]);

        let outcome = engine
            .moderate_content(&item("c1", "fresh contraband for sale"))
            .await
            .unwrap();

        assert_eq!(outcome.record.status, ModerationStatus::Rejected);
        assert!(outcome.record.manual_review_required);
        let entry = outcome.queue_entry.unwrap();
        assert_eq!(entry.priority, QueuePriority::Urgent);
        assert_eq!(entry.status, QueueStatus::Pending);
    }

    #[tokio::test]
    async fn test_resubmission_never_rescores() {
        let mut engine = engine();
        let first = engine
            .moderate_content(&item("c1", "nothing wrong here"))
            .await
            .unwrap();
        assert!(first.fresh);
        assert_eq!(first.record.auto_moderation_score, 0.0);

        // Even with a harsher filter set, the stored record stands
        engine.set_custom_filters(vec![CustomFilter::new(
            "late-filter",
            "nothing",
            Severity::Critical,
            FilterAction::Block,
        )]);
        let second = engine
            .moderate_content(&item("c1", "nothing wrong here"))
            .await
            .unwrap();

        assert!(!second.fresh);
        assert!(second.filter.is_none());
        assert_eq!(second.record.id, first.record.id);
        assert_eq!(second.record.status, ModerationStatus::Approved);
        assert_eq!(second.record.auto_moderation_score, 0.0);
    }

    #[tokio::test]
    async fn test_action_resolves_queue_and_sanctions_user() {
        let mut engine = engine();
        engine.set_custom_filters(vec![CustomFilter::new(
            "bad",
            "badword",
            Severity::High,
            FilterAction::Flag,
        )]);

        let outcome = engine
            .moderate_content(&item("c1", "badword in the open"))
            .await
            .unwrap();
        assert!(outcome.queue_entry.is_some());

        let action = ModerationAction::new(
            "mod-3",
            "c1",
            ContentType::Post,
            "author-1",
            ActionType::Ban,
            "repeat offender",
            Severity::High,
        );
        let status = engine.apply_action(action).await.unwrap();
        assert_eq!(status.status, UserStatus::Banned);

        assert!(engine.queue.pending().await.unwrap().is_empty());
        let log = engine.actions_for_content("c1").await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action_type, ActionType::Ban);
    }

    #[tokio::test]
    async fn test_approve_action_updates_record_status() {
        let mut engine = engine();
        engine.set_custom_filters(vec![CustomFilter::new(
            "bad",
            "badword",
            Severity::Medium,
            FilterAction::Flag,
        )]);

        engine
            .moderate_content(&item("c1", "badword again"))
            .await
            .unwrap();

        let action = ModerationAction::new(
            "mod-3",
            "c1",
            ContentType::Post,
            "author-1",
            ActionType::Approve,
            "false positive",
            Severity::Low,
        );
        engine.apply_action(action).await.unwrap();

        let record = engine
            .moderation_store
            .get_record("c1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, ModerationStatus::Approved);
    }

    #[tokio::test]
    async fn test_full_appeal_round_trip() {
        let engine = engine();

        let ban = ModerationAction::new(
            SYSTEM_MODERATOR,
            "c1",
            ContentType::Post,
            "author-1",
            ActionType::Ban,
            "spam",
            Severity::High,
        );
        engine.apply_action(ban.clone()).await.unwrap();
        assert_eq!(
            engine.users.status_of("author-1").await.unwrap().status,
            UserStatus::Banned
        );

        let appeal = engine
            .submit_appeal("author-1", &ban.id, "account was compromised", None)
            .await
            .unwrap();
        let decided = engine
            .appeals
            .review(&appeal.id, AppealDecision::Approved, Some("checks out".into()))
            .await
            .unwrap();
        assert_eq!(decided.status, AppealStatus::Approved);

        let status = engine.users.status_of("author-1").await.unwrap();
        assert_eq!(status.status, UserStatus::Active);
        assert!(status.restrictions.is_empty());
    }

    #[tokio::test]
    async fn test_appeal_requires_a_matching_action() {
        let engine = engine();

        let err = engine
            .submit_appeal("author-1", "no-such-action", "why", None)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::EngineError::NotFound(_)));

        let ban = ModerationAction::new(
            SYSTEM_MODERATOR,
            "c1",
            ContentType::Post,
            "author-1",
            ActionType::Ban,
            "spam",
            Severity::High,
        );
        engine.apply_action(ban.clone()).await.unwrap();

        // Only the sanctioned user can appeal the action
        let err = engine
            .submit_appeal("someone-else", &ban.id, "why", None)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::EngineError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_security_event_to_analytics_flow() {
        let engine = engine();

        for _ in 0..6 {
            engine
                .record_security_event(SecurityEvent::new(
                    "6.6.6.6",
                    "Mozilla/5.0 Firefox/118.0",
                    crate::models::SecurityEventType::FailedLogin,
                    Severity::Medium,
                ))
                .await
                .unwrap();
        }

        assert!(engine.ip_registry.is_blocked("6.6.6.6").await.unwrap());

        let overview = engine.analytics.security_overview().await.unwrap();
        assert_eq!(overview.total_threats, 1);
        assert_eq!(overview.blocked_ips, 1);
    }

    #[tokio::test]
    async fn test_rate_limit_through_engine() {
        use crate::config::ConfigValue;

        let mut config = SecurityConfig::new();
        config.set("rate_limit.comment.limit", ConfigValue::Int(3), "rate_limit", "");

        let engine = ModerationEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(BufferingDispatcher::new()),
            config,
        );

        for _ in 0..3 {
            assert!(engine.check_rate_limit("u1", "comment").await.allowed);
        }
        assert!(!engine.check_rate_limit("u1", "comment").await.allowed);
    }
}
