pub mod appeals;
pub mod queue;
pub mod reports;
pub mod user_status;

pub use appeals::{AppealDecision, AppealWorkflow};
pub use queue::{manual_review_required, priority_for, ModerationQueueManager, QueueThresholds};
pub use reports::ReportManager;
pub use user_status::{transition, UserStatusMachine};
