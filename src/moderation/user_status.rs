use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::models::{
    ActionType, ModerationAction, UserAppealStatus, UserModerationStatus, UserStatus,
    RESTRICTION_ALL, RESTRICTION_POSTING,
};
use crate::notify::{Notification, NotificationDispatcher, NotificationKind};
use crate::store::UserStatusStore;

/// Conditional writes retry this many times before giving up
const MAX_WRITE_ATTEMPTS: u32 = 10;

/// Pure transition table: the user state after one moderation action
///
/// | action  | status    | warnings | violations | restrictions |
/// |---------|-----------|----------|------------|--------------|
/// | warn    | warned    | +1       |            | unchanged    |
/// | suspend | suspended |          | +1         | + posting    |
/// | ban     | banned    |          | +1         | = {all}      |
/// | approve | active    |          |            | cleared      |
/// | remove  | unchanged |          | +1         | unchanged    |
/// | flag    | unchanged |          |            | unchanged    |
pub fn transition(current: &UserModerationStatus, action: &ModerationAction) -> UserModerationStatus {
    let mut next = current.clone();
    next.updated_at = Utc::now();

    match action.action_type {
        ActionType::Warn => {
            next.status = UserStatus::Warned;
            next.warnings += 1;
        }
        ActionType::Suspend => {
            next.status = UserStatus::Suspended;
            next.violations += 1;
            next.last_violation = Some(action.created_at);
            next.restrictions.insert(RESTRICTION_POSTING.to_string());
        }
        ActionType::Ban => {
            next.status = UserStatus::Banned;
            next.violations += 1;
            next.last_violation = Some(action.created_at);
            next.restrictions = BTreeSet::from([RESTRICTION_ALL.to_string()]);
        }
        ActionType::Approve => {
            next.status = UserStatus::Active;
            next.restrictions.clear();
        }
        ActionType::Remove => {
            // Content-level removal: counts a violation, leaves standing alone
            next.violations += 1;
            next.last_violation = Some(action.created_at);
        }
        ActionType::Flag => {}
    }

    next
}

/// Drives per-user moderation state through versioned writes
///
/// Every mutation is a load, pure transition, compare-and-swap loop, so
/// concurrent warn/suspend/ban actions on one user serialize instead of
/// overwriting each other. Missing rows are created from the zero baseline.
#[derive(Clone)]
pub struct UserStatusMachine {
    store: Arc<dyn UserStatusStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl UserStatusMachine {
    pub fn new(store: Arc<dyn UserStatusStore>, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// The user's current standing, or the zero baseline if none is stored
    pub async fn status_of(&self, user_id: &str) -> Result<UserModerationStatus> {
        Ok(self
            .store
            .get_user_status(user_id)
            .await?
            .unwrap_or_else(|| UserModerationStatus::baseline(user_id)))
    }

    /// Apply one moderation action to the user it targets
    pub async fn apply_action(&self, action: &ModerationAction) -> Result<UserModerationStatus> {
        self.mutate(&action.user_id, |current| transition(current, action))
            .await
    }

    /// Reset the user to active and clear restrictions without touching the
    /// warning and violation counters. Distinct from the `approve` action;
    /// this is the reversal used by approved appeals. Idempotent.
    pub async fn unblock(&self, user_id: &str) -> Result<UserModerationStatus> {
        self.mutate(user_id, |current| {
            let mut next = current.clone();
            next.status = UserStatus::Active;
            next.restrictions.clear();
            next.updated_at = Utc::now();
            next
        })
        .await
    }

    /// Put the user into the restricted state with the given capability tags
    pub async fn restrict(&self, user_id: &str, restrictions: BTreeSet<String>) -> Result<UserModerationStatus> {
        self.mutate(user_id, |current| {
            let mut next = current.clone();
            next.status = UserStatus::Restricted;
            next.restrictions = restrictions.clone();
            next.updated_at = Utc::now();
            next
        })
        .await
    }

    /// Mirror an appeal's standing onto the user row
    pub async fn set_appeal_status(&self, user_id: &str, appeal_status: UserAppealStatus) -> Result<UserModerationStatus> {
        self.mutate(user_id, |current| {
            let mut next = current.clone();
            next.appeal_status = appeal_status;
            next.updated_at = Utc::now();
            next
        })
        .await
    }

    async fn mutate<F>(&self, user_id: &str, apply: F) -> Result<UserModerationStatus>
    where
        F: Fn(&UserModerationStatus) -> UserModerationStatus,
    {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let current = self.status_of(user_id).await?;
            let expected = current.version;
            let mut next = apply(&current);

            if self.store.put_user_status(next.clone(), expected).await? {
                next.version = expected + 1;
                if next.status != current.status {
                    metrics::counter!("user_status_transitions_total", 1);
                    self.notify_status_change(&next).await;
                }
                return Ok(next);
            }
            // Lost the race; reload and try again
        }

        Err(EngineError::Conflict(format!(
            "user status for {user_id} kept changing during update"
        )))
    }

    async fn notify_status_change(&self, status: &UserModerationStatus) {
        self.dispatcher
            .notify(Notification {
                user_id: status.user_id.clone(),
                kind: NotificationKind::StatusChanged,
                title: "Account status updated".to_string(),
                message: format!("Your account standing is now {:?}", status.status),
                data: serde_json::json!({ "status": status.status }),
            })
            .await;
    }
}
