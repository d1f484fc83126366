use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::models::{ContentReport, ContentType, ReportStatus};
use crate::notify::{Notification, NotificationDispatcher, NotificationKind};
use crate::store::{ReportFilter, ReportStore};

/// Handles user-filed content reports
#[derive(Clone)]
pub struct ReportManager {
    store: Arc<dyn ReportStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl ReportManager {
    pub fn new(store: Arc<dyn ReportStore>, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Store a draft the reporter has not sent yet
    pub async fn save_draft(
        &self,
        reporter_id: &str,
        content_id: &str,
        content_type: ContentType,
        category: &str,
        answers: HashMap<String, String>,
    ) -> Result<ContentReport> {
        let mut report = ContentReport::draft(reporter_id, content_id, content_type, category);
        report.answers = answers;
        self.store.insert_report(report.clone()).await?;
        Ok(report)
    }

    /// File a report directly, skipping the draft stage
    pub async fn submit(
        &self,
        reporter_id: &str,
        content_id: &str,
        content_type: ContentType,
        category: &str,
        answers: HashMap<String, String>,
    ) -> Result<ContentReport> {
        let mut report = ContentReport::draft(reporter_id, content_id, content_type, category);
        report.answers = answers;
        report.status = ReportStatus::Submitted;
        report.updated_at = Utc::now();

        self.store.insert_report(report.clone()).await?;
        metrics::counter!("reports_submitted_total", 1);
        self.notify_submitted(&report).await;
        Ok(report)
    }

    /// Send a previously saved draft
    pub async fn submit_draft(&self, report_id: &str) -> Result<ContentReport> {
        let mut report = self.get(report_id).await?;
        if report.status != ReportStatus::Draft {
            return Err(EngineError::InvalidTransition(format!(
                "report {report_id} is {:?}, not a draft",
                report.status
            )));
        }

        report.status = ReportStatus::Submitted;
        report.updated_at = Utc::now();
        self.store.set_report_status(report_id, ReportStatus::Submitted).await?;

        metrics::counter!("reports_submitted_total", 1);
        self.notify_submitted(&report).await;
        Ok(report)
    }

    /// Move a submitted report into review
    pub async fn begin_review(&self, report_id: &str) -> Result<()> {
        let report = self.get(report_id).await?;
        if report.status != ReportStatus::Submitted {
            return Err(EngineError::InvalidTransition(format!(
                "report {report_id} is {:?}, not submitted",
                report.status
            )));
        }
        self.store.set_report_status(report_id, ReportStatus::UnderReview).await
    }

    /// Close a report with a terminal status
    pub async fn close(&self, report_id: &str, status: ReportStatus) -> Result<()> {
        if !matches!(
            status,
            ReportStatus::Resolved | ReportStatus::Rejected | ReportStatus::Dismissed
        ) {
            return Err(EngineError::InvalidTransition(format!(
                "{status:?} is not a terminal report status"
            )));
        }

        // Closing twice converges on the same state
        self.get(report_id).await?;
        self.store.set_report_status(report_id, status).await
    }

    pub async fn get(&self, report_id: &str) -> Result<ContentReport> {
        self.store
            .get_report(report_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("report {report_id}")))
    }

    pub async fn list(&self, filter: &ReportFilter) -> Result<Vec<ContentReport>> {
        self.store.list_reports(filter).await
    }

    async fn notify_submitted(&self, report: &ContentReport) {
        self.dispatcher
            .notify(Notification {
                user_id: report.reporter_id.clone(),
                kind: NotificationKind::ReportSubmitted,
                title: "Report received".to_string(),
                message: "Thanks, your report is in the review queue".to_string(),
                data: serde_json::json!({ "report_id": report.id }),
            })
            .await;
    }
}
