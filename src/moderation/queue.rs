use std::sync::Arc;

use crate::config::{keys, SecurityConfig};
use crate::error::{EngineError, Result};
use crate::models::{
    ModerationQueueEntry, ModerationRecord, QueuePriority, QueueStatus,
};
use crate::store::{ModerationStore, QueueFilter, QueueInsert};

/// Reason tags that force the urgent tier regardless of score
const SEVERE_REASONS: &[&str] = &["violence", "hate_speech"];

/// Conditional writes retry this many times before giving up
const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Score cutoffs for queue decisions, sourced from SecurityConfig
#[derive(Clone, Debug)]
pub struct QueueThresholds {
    pub review_score: f64,
    pub urgent_score: f64,
    pub high_score: f64,
    pub medium_score: f64,
}

impl QueueThresholds {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            review_score: config.get_f64(keys::QUEUE_REVIEW_SCORE, 0.7),
            urgent_score: config.get_f64(keys::QUEUE_URGENT_SCORE, 0.8),
            high_score: config.get_f64(keys::QUEUE_HIGH_SCORE, 0.6),
            medium_score: config.get_f64(keys::QUEUE_MEDIUM_SCORE, 0.4),
        }
    }
}

impl Default for QueueThresholds {
    fn default() -> Self {
        Self::from_config(&SecurityConfig::new())
    }
}

/// Whether a classified item needs a human decision
pub fn manual_review_required(score: f64, reasons: &[String], thresholds: &QueueThresholds) -> bool {
    score > thresholds.review_score || !reasons.is_empty()
}

/// Queue tier for a score and its reason tags
pub fn priority_for(score: f64, reasons: &[String], thresholds: &QueueThresholds) -> QueuePriority {
    let severe = reasons
        .iter()
        .any(|r| SEVERE_REASONS.contains(&r.as_str()));

    if score > thresholds.urgent_score || severe {
        QueuePriority::Urgent
    } else if score > thresholds.high_score || reasons.len() > 2 {
        QueuePriority::High
    } else if score > thresholds.medium_score || !reasons.is_empty() {
        QueuePriority::Medium
    } else {
        QueuePriority::Low
    }
}

/// Creates and drives entries in the human-review queue
///
/// The store guarantees at most one open entry per content_id; transitions
/// go through versioned writes so an automatic resolve racing a moderator's
/// assignment cannot clobber it.
#[derive(Clone)]
pub struct ModerationQueueManager {
    store: Arc<dyn ModerationStore>,
    thresholds: QueueThresholds,
}

impl ModerationQueueManager {
    pub fn new(store: Arc<dyn ModerationStore>, config: &SecurityConfig) -> Self {
        Self {
            store,
            thresholds: QueueThresholds::from_config(config),
        }
    }

    pub fn thresholds(&self) -> &QueueThresholds {
        &self.thresholds
    }

    /// Queue the record for review when it needs one. Returns the open entry
    /// (new or pre-existing), or None when no review is required.
    pub async fn enqueue_if_needed(&self, record: &ModerationRecord) -> Result<Option<ModerationQueueEntry>> {
        if !record.manual_review_required {
            return Ok(None);
        }

        let priority = priority_for(
            record.auto_moderation_score,
            &record.flagged_reasons,
            &self.thresholds,
        );
        let entry = ModerationQueueEntry::new(
            record.content_id.clone(),
            record.content_type,
            record.user_id.clone(),
            priority,
            record.auto_moderation_score,
            true,
        );

        match self.store.insert_queue_entry(entry).await? {
            QueueInsert::Inserted(stored) => {
                metrics::counter!("moderation_queue_entries_total", 1);
                Ok(Some(stored))
            }
            QueueInsert::AlreadyOpen(existing) => Ok(Some(existing)),
        }
    }

    /// Hand the open entry for this content to a moderator
    pub async fn assign(&self, content_id: &str, moderator_id: &str) -> Result<ModerationQueueEntry> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(mut entry) = self.store.get_open_queue_entry(content_id).await? else {
                return Err(EngineError::NotFound(format!(
                    "open queue entry for content {content_id}"
                )));
            };

            let expected = entry.version;
            entry.status = QueueStatus::InReview;
            entry.assigned_to = Some(moderator_id.to_string());
            entry.updated_at = chrono::Utc::now();

            if self.store.update_queue_entry(entry.clone(), expected).await? {
                entry.version = expected + 1;
                return Ok(entry);
            }
        }

        Err(EngineError::Conflict(format!(
            "queue entry for content {content_id} kept changing during assignment"
        )))
    }

    /// Close the open entry for this content. Idempotent: resolving content
    /// with no open entry (including an already-resolved one) is a no-op,
    /// because the automatic and manual paths are expected to race.
    pub async fn resolve(&self, content_id: &str) -> Result<()> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some(mut entry) = self.store.get_open_queue_entry(content_id).await? else {
                return Ok(());
            };

            let expected = entry.version;
            entry.status = QueueStatus::Resolved;
            entry.updated_at = chrono::Utc::now();

            if self.store.update_queue_entry(entry, expected).await? {
                metrics::counter!("moderation_queue_resolved_total", 1);
                return Ok(());
            }
        }

        Err(EngineError::Conflict(format!(
            "queue entry for content {content_id} kept changing during resolve"
        )))
    }

    /// Entries awaiting a moderator, most urgent first
    pub async fn pending(&self) -> Result<Vec<ModerationQueueEntry>> {
        self.store
            .list_queue(&QueueFilter {
                status: Some(QueueStatus::Pending),
                ..QueueFilter::default()
            })
            .await
    }

    pub async fn list(&self, filter: &QueueFilter) -> Result<Vec<ModerationQueueEntry>> {
        self.store.list_queue(filter).await
    }
}
