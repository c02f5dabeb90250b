use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use super::domain::{AccessType, AdminAccessLogEntry, ReportId, UserId};
use super::store::AccessLogStore;

/// Request metadata attached to privileged actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Subject and justification of one privileged action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessDetails {
    pub user_id: Option<UserId>,
    pub report_id: Option<ReportId>,
    pub access_reason: String,
}

impl AccessDetails {
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            access_reason: reason.into(),
            ..Self::default()
        }
    }

    pub fn for_user(mut self, user_id: &UserId) -> Self {
        self.user_id = Some(user_id.clone());
        self
    }

    pub fn for_report(mut self, report_id: &ReportId) -> Self {
        self.report_id = Some(report_id.clone());
        self
    }
}

/// Append-only recorder of admin access; never fails the caller.
pub struct AdminAccessAuditor<L: ?Sized> {
    logs: Arc<L>,
}

impl<L> AdminAccessAuditor<L>
where
    L: AccessLogStore + ?Sized,
{
    pub fn new(logs: Arc<L>) -> Self {
        Self { logs }
    }

    /// Returns whether the entry landed; failures are logged as warnings only.
    pub fn record(
        &self,
        admin_id: &UserId,
        access_type: AccessType,
        details: AccessDetails,
        context: &AccessContext,
    ) -> bool {
        let entry = AdminAccessLogEntry {
            admin_id: admin_id.clone(),
            user_id: details.user_id,
            report_id: details.report_id,
            access_type,
            access_reason: details.access_reason,
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
            created_at: Utc::now(),
        };

        match self.logs.append_access_log(entry) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    admin_id = %admin_id,
                    access_type = access_type.label(),
                    error = %err,
                    "admin access log write failed"
                );
                false
            }
        }
    }
}
