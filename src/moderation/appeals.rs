use chrono::Utc;
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::models::{AppealRequest, AppealStatus, UserAppealStatus};
use crate::moderation::user_status::UserStatusMachine;
use crate::notify::{Notification, NotificationDispatcher, NotificationKind};
use crate::store::AppealStore;

/// How many times the compensating unblock is retried before the review
/// call surfaces a CompensationFailed error
const MAX_COMPENSATION_ATTEMPTS: u32 = 3;

/// Outcome a reviewer hands down
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppealDecision {
    Approved,
    Denied,
}

/// Drives appeals from submission through review
///
/// An approved appeal reverses the appealed action through the state
/// machine's explicit unblock (not the `approve` moderation action). The
/// reversal runs before the appeal status write and is retried, so the
/// system is never left with an approved appeal and a still-banned user.
#[derive(Clone)]
pub struct AppealWorkflow {
    store: Arc<dyn AppealStore>,
    status_machine: UserStatusMachine,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl AppealWorkflow {
    pub fn new(
        store: Arc<dyn AppealStore>,
        status_machine: UserStatusMachine,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            status_machine,
            dispatcher,
        }
    }

    /// File an appeal against a moderation action. A user can have only one
    /// appeal open at a time.
    pub async fn submit(
        &self,
        user_id: &str,
        action_id: &str,
        reason: &str,
        evidence: Option<String>,
    ) -> Result<AppealRequest> {
        for status in [AppealStatus::Pending, AppealStatus::UnderReview] {
            let open = self.store.list_appeals(Some(user_id), Some(status)).await?;
            if !open.is_empty() {
                return Err(EngineError::Conflict(format!(
                    "user {user_id} already has an open appeal"
                )));
            }
        }

        let appeal = AppealRequest::new(user_id, action_id, reason, evidence);
        self.store.insert_appeal(appeal.clone()).await?;
        self.status_machine
            .set_appeal_status(user_id, UserAppealStatus::Pending)
            .await?;

        metrics::counter!("appeals_submitted_total", 1);
        Ok(appeal)
    }

    /// Move a pending appeal into review
    pub async fn begin_review(&self, appeal_id: &str) -> Result<AppealRequest> {
        let mut appeal = self.get(appeal_id).await?;
        if appeal.status == AppealStatus::UnderReview {
            return Ok(appeal);
        }
        if appeal.status != AppealStatus::Pending {
            return Err(EngineError::InvalidTransition(format!(
                "appeal {appeal_id} is {:?}, not pending",
                appeal.status
            )));
        }

        appeal.status = AppealStatus::UnderReview;
        appeal.updated_at = Utc::now();
        if !self.store.update_appeal(appeal.clone(), AppealStatus::Pending).await? {
            return Err(EngineError::Conflict(format!(
                "appeal {appeal_id} changed during review start"
            )));
        }
        Ok(appeal)
    }

    /// Decide an appeal. Re-deciding a closed appeal with the same decision
    /// is a no-op; a different decision is an invalid transition.
    pub async fn review(
        &self,
        appeal_id: &str,
        decision: AppealDecision,
        notes: Option<String>,
    ) -> Result<AppealRequest> {
        let appeal = self.get(appeal_id).await?;

        let target = match decision {
            AppealDecision::Approved => AppealStatus::Approved,
            AppealDecision::Denied => AppealStatus::Denied,
        };

        match appeal.status {
            AppealStatus::Pending | AppealStatus::UnderReview => {}
            closed if closed == target => return Ok(appeal),
            closed => {
                return Err(EngineError::InvalidTransition(format!(
                    "appeal {appeal_id} already {closed:?}"
                )))
            }
        }

        // Approval reverses the action first. The unblock is idempotent, so
        // retrying a half-finished review converges rather than erroring.
        if decision == AppealDecision::Approved {
            self.unblock_with_retry(&appeal.user_id).await?;
        }

        let expected = appeal.status;
        let mut updated = appeal;
        updated.status = target;
        updated.moderator_notes = notes;
        updated.updated_at = Utc::now();

        if !self.store.update_appeal(updated.clone(), expected).await? {
            // Someone else closed it; converge if they reached the same
            // decision, otherwise surface the race
            let current = self.get(appeal_id).await?;
            if current.status == target {
                return Ok(current);
            }
            return Err(EngineError::Conflict(format!(
                "appeal {appeal_id} changed during review"
            )));
        }

        let user_appeal_status = match decision {
            AppealDecision::Approved => UserAppealStatus::Approved,
            AppealDecision::Denied => UserAppealStatus::Denied,
        };
        self.status_machine
            .set_appeal_status(&updated.user_id, user_appeal_status)
            .await?;

        metrics::counter!("appeals_decided_total", 1);
        self.notify_decision(&updated).await;
        Ok(updated)
    }

    pub async fn get(&self, appeal_id: &str) -> Result<AppealRequest> {
        self.store
            .get_appeal(appeal_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("appeal {appeal_id}")))
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<AppealRequest>> {
        self.store.list_appeals(Some(user_id), None).await
    }

    async fn unblock_with_retry(&self, user_id: &str) -> Result<()> {
        let mut last_err = None;
        for attempt in 1..=MAX_COMPENSATION_ATTEMPTS {
            match self.status_machine.unblock(user_id).await {
                Ok(_) => return Ok(()),
                Err(err) => {
                    tracing::warn!(user_id, attempt, error = %err, "appeal unblock attempt failed");
                    last_err = Some(err);
                }
            }
        }

        tracing::error!(user_id, "appeal approval could not unblock the user");
        Err(EngineError::CompensationFailed(format!(
            "unblock for {user_id} failed after {MAX_COMPENSATION_ATTEMPTS} attempts: {}",
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    async fn notify_decision(&self, appeal: &AppealRequest) {
        self.dispatcher
            .notify(Notification {
                user_id: appeal.user_id.clone(),
                kind: NotificationKind::AppealDecision,
                title: "Appeal decision".to_string(),
                message: format!("Your appeal was {:?}", appeal.status),
                data: serde_json::json!({
                    "appeal_id": appeal.id,
                    "status": appeal.status,
                }),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ActionType, ContentType, ModerationAction, Severity, UserStatus, SYSTEM_MODERATOR,
    };
    use crate::notify::BufferingDispatcher;
    use crate::store::MemoryStore;

    struct Fixture {
        workflow: AppealWorkflow,
        machine: UserStatusMachine,
        dispatcher: Arc<BufferingDispatcher>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(BufferingDispatcher::new());
        let machine = UserStatusMachine::new(store.clone(), dispatcher.clone());
        let workflow = AppealWorkflow::new(store, machine.clone(), dispatcher.clone());
        Fixture {
            workflow,
            machine,
            dispatcher,
        }
    }

    async fn ban_user(machine: &UserStatusMachine) -> ModerationAction {
        let action = ModerationAction::new(
            SYSTEM_MODERATOR,
            "c1",
            ContentType::Post,
            "u1",
            ActionType::Ban,
            "spam wave",
            Severity::High,
        );
        machine.apply_action(&action).await.unwrap();
        action
    }

    #[tokio::test]
    async fn test_approved_appeal_unbans() {
        let f = fixture();
        let action = ban_user(&f.machine).await;

        let appeal = f
            .workflow
            .submit("u1", &action.id, "I was hacked", None)
            .await
            .unwrap();
        assert_eq!(appeal.status, AppealStatus::Pending);
        assert_eq!(
            f.machine.status_of("u1").await.unwrap().appeal_status,
            UserAppealStatus::Pending
        );

        f.workflow.begin_review(&appeal.id).await.unwrap();
        f.dispatcher.drain();

        let decided = f
            .workflow
            .review(&appeal.id, AppealDecision::Approved, Some("verified".into()))
            .await
            .unwrap();
        assert_eq!(decided.status, AppealStatus::Approved);
        assert_eq!(decided.moderator_notes.as_deref(), Some("verified"));

        let status = f.machine.status_of("u1").await.unwrap();
        assert_eq!(status.status, UserStatus::Active);
        assert!(status.restrictions.is_empty());
        assert_eq!(status.appeal_status, UserAppealStatus::Approved);
        // Violation history survives the reversal
        assert_eq!(status.violations, 1);

        let kinds: Vec<_> = f.dispatcher.drain().into_iter().map(|n| n.kind).collect();
        assert!(kinds.contains(&NotificationKind::AppealDecision));
    }

    #[tokio::test]
    async fn test_denied_appeal_leaves_ban() {
        let f = fixture();
        let action = ban_user(&f.machine).await;

        let appeal = f
            .workflow
            .submit("u1", &action.id, "please", None)
            .await
            .unwrap();
        let decided = f
            .workflow
            .review(&appeal.id, AppealDecision::Denied, None)
            .await
            .unwrap();
        assert_eq!(decided.status, AppealStatus::Denied);

        let status = f.machine.status_of("u1").await.unwrap();
        assert_eq!(status.status, UserStatus::Banned);
        assert_eq!(status.appeal_status, UserAppealStatus::Denied);
    }

    #[tokio::test]
    async fn test_single_open_appeal_per_user() {
        let f = fixture();
        let action = ban_user(&f.machine).await;

        f.workflow.submit("u1", &action.id, "first", None).await.unwrap();
        let err = f
            .workflow
            .submit("u1", &action.id, "second", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_review_is_idempotent_per_decision() {
        let f = fixture();
        let action = ban_user(&f.machine).await;
        let appeal = f.workflow.submit("u1", &action.id, "x", None).await.unwrap();

        f.workflow
            .review(&appeal.id, AppealDecision::Denied, None)
            .await
            .unwrap();

        // Same decision again: no-op
        let again = f
            .workflow
            .review(&appeal.id, AppealDecision::Denied, None)
            .await
            .unwrap();
        assert_eq!(again.status, AppealStatus::Denied);

        // Opposite decision on a closed appeal is rejected
        let err = f
            .workflow
            .review(&appeal.id, AppealDecision::Approved, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_review_missing_appeal_is_not_found() {
        let f = fixture();
        let err = f
            .workflow
            .review("ghost", AppealDecision::Approved, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
