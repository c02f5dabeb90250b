use std::sync::Arc;

use super::audit::{AccessContext, AdminAccessAuditor};
use super::auth::{require_admin, Session};
use super::cases::{CaseClosure, CaseLifecycleManager, ConversationStatus};
use super::conversations::{ConversationGrouper, ConversationSummary};
use super::corrector::{ClassificationCorrector, CorrectionSummary};
use super::domain::{Message, Report, ReportId, UserId};
use super::error::ModerationError;
use super::follow_up::{FollowUpDispatcher, FollowUpSweep};
use super::reports::{Escalation, NewReport, ReportListing, ReportManager, ReportUpdate};
use super::store::{ModerationStore, ReportQuery};

/// Knobs the service reads once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationSettings {
    /// Administrator whose inbox receives report notices.
    pub support_admin_id: Option<UserId>,
    pub read_attempts: u32,
    pub follow_up_max_attempts: u32,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            support_admin_id: None,
            read_attempts: 3,
            follow_up_max_attempts: 5,
        }
    }
}

/// Service composing the grouper, case lifecycle, report manager, and corrector over one store.
pub struct ModerationService<S: ?Sized> {
    store: Arc<S>,
    grouper: ConversationGrouper<S>,
    cases: CaseLifecycleManager<S>,
    reports: ReportManager<S>,
    corrector: ClassificationCorrector<S>,
    follow_ups: Arc<FollowUpDispatcher<S>>,
}

impl<S> ModerationService<S>
where
    S: ModerationStore + ?Sized,
{
    pub fn new(store: Arc<S>, settings: ModerationSettings) -> Self {
        let follow_ups = Arc::new(FollowUpDispatcher::new(
            store.clone(),
            settings.follow_up_max_attempts,
        ));
        let auditor = Arc::new(AdminAccessAuditor::new(store.clone()));
        Self {
            grouper: ConversationGrouper::new(store.clone(), settings.read_attempts),
            cases: CaseLifecycleManager::new(
                store.clone(),
                follow_ups.clone(),
                auditor.clone(),
                settings.read_attempts,
            ),
            reports: ReportManager::new(
                store.clone(),
                follow_ups.clone(),
                auditor,
                settings.support_admin_id,
                settings.read_attempts,
            ),
            corrector: ClassificationCorrector::new(store.clone(), settings.read_attempts),
            follow_ups,
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn conversations(
        &self,
        session: &Session,
        counterpart: Option<&UserId>,
    ) -> Result<Vec<ConversationSummary>, ModerationError> {
        Ok(self.grouper.summaries(&session.user_id, counterpart)?)
    }

    pub fn thread(&self, session: &Session, counterpart: &UserId) -> Result<Vec<Message>, ModerationError> {
        Ok(self.grouper.thread(&session.user_id, counterpart)?)
    }

    pub fn mark_read(&self, session: &Session, counterpart: &UserId) -> Result<usize, ModerationError> {
        Ok(self.grouper.mark_read(&session.user_id, counterpart)?)
    }

    pub fn send_message(
        &self,
        session: &Session,
        recipient_id: &UserId,
        content: &str,
    ) -> Result<Message, ModerationError> {
        self.cases.send_message(session, recipient_id, content)
    }

    pub fn close_case(
        &self,
        session: &Session,
        user_id: &UserId,
        context: &AccessContext,
    ) -> Result<CaseClosure, ModerationError> {
        self.cases.close_case(session, user_id, context)
    }

    pub fn reopen_case(&self, user_id: &UserId, admin_id: &UserId) -> Result<usize, ModerationError> {
        self.cases.reopen_case(user_id, admin_id)
    }

    pub fn conversation_status(
        &self,
        session: &Session,
        recipient_id: &UserId,
        conversation_type: &str,
    ) -> Result<ConversationStatus, ModerationError> {
        self.cases
            .conversation_status(session, recipient_id, conversation_type)
    }

    pub fn create_report(&self, session: &Session, request: NewReport) -> Result<Report, ModerationError> {
        self.reports.create_report(session, request)
    }

    pub fn escalate(
        &self,
        session: &Session,
        request: Escalation,
        context: &AccessContext,
    ) -> Result<Report, ModerationError> {
        self.reports.escalate(session, request, context)
    }

    pub fn update_report(
        &self,
        session: &Session,
        report_id: &ReportId,
        update: ReportUpdate,
        context: &AccessContext,
    ) -> Result<Report, ModerationError> {
        self.reports.update_report(session, report_id, update, context)
    }

    pub fn list_reports(
        &self,
        session: &Session,
        query: ReportQuery,
        context: &AccessContext,
    ) -> Result<ReportListing, ModerationError> {
        self.reports.list_reports(session, query, context)
    }

    /// Admin-triggered classification pass.
    pub fn reclassify(&self, session: &Session) -> Result<CorrectionSummary, ModerationError> {
        require_admin(session)?;
        self.run_corrector()
    }

    /// Classification pass for operators running outside a request.
    pub fn run_corrector(&self) -> Result<CorrectionSummary, ModerationError> {
        Ok(self.corrector.run()?)
    }

    pub fn retry_follow_ups(&self, session: &Session) -> Result<FollowUpSweep, ModerationError> {
        require_admin(session)?;
        Ok(self.sweep_follow_ups())
    }

    /// Retry parked follow-ups; used by the periodic server task.
    pub fn sweep_follow_ups(&self) -> FollowUpSweep {
        self.follow_ups.retry_pending()
    }

    pub fn pending_follow_ups(&self) -> usize {
        self.follow_ups.pending()
    }
}
