//! Moderation reports: creation, escalation, review, and the admin queue.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::audit::{AccessContext, AccessDetails, AdminAccessAuditor};
use super::auth::{require_admin, Session};
use super::conversations::latest_between;
use super::domain::{
    AccessType, Report, ReportId, ReportReason, ReportStatus, UserAccount, UserId,
};
use super::error::ModerationError;
use super::follow_up::{FollowUp, FollowUpDispatcher};
use super::store::{retry_read, ModerationStore, ReportCounts, ReportQuery, StoreError};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 2_000;
const PREVIEW_CHARS: usize = 120;

/// Report filed by an end user against another user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewReport {
    pub reported_user_id: UserId,
    pub reason: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Admin request turning a support conversation into a report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Escalation {
    pub user_id: UserId,
    pub reported_user_id: UserId,
    pub reason: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub support_case_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReportUpdate {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub resolution_notes: Option<String>,
    #[serde(default)]
    pub assign_to_me: bool,
}

impl ReportUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.resolution_notes.is_none() && !self.assign_to_me
    }
}

/// Queue row joined with display names and a preview of the latest exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportView {
    #[serde(flatten)]
    pub report: Report,
    pub reporter_name: Option<String>,
    pub reported_name: Option<String>,
    pub last_message_preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportListing {
    pub reports: Vec<ReportView>,
    pub counts: ReportCounts,
}

pub struct ReportManager<S: ?Sized> {
    store: Arc<S>,
    follow_ups: Arc<FollowUpDispatcher<S>>,
    auditor: Arc<AdminAccessAuditor<S>>,
    support_admin_id: Option<UserId>,
    read_attempts: u32,
}

impl<S> ReportManager<S>
where
    S: ModerationStore + ?Sized,
{
    pub fn new(
        store: Arc<S>,
        follow_ups: Arc<FollowUpDispatcher<S>>,
        auditor: Arc<AdminAccessAuditor<S>>,
        support_admin_id: Option<UserId>,
        read_attempts: u32,
    ) -> Self {
        Self {
            store,
            follow_ups,
            auditor,
            support_admin_id,
            read_attempts,
        }
    }

    pub fn create_report(
        &self,
        session: &Session,
        request: NewReport,
    ) -> Result<Report, ModerationError> {
        let reporter_id = &session.user_id;
        let reason = parse_reason(&request.reason)?;
        let description = normalize_description(request.description)?;
        self.check_target(reporter_id, &request.reported_user_id)?;

        let now = Utc::now();
        let report = Report {
            id: ReportId::generate(),
            reporter_id: reporter_id.clone(),
            reported_user_id: request.reported_user_id,
            reason,
            description,
            status: ReportStatus::Pending,
            assigned_admin_id: None,
            resolution_notes: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };
        let report = self.insert(report)?;
        info!(
            report_id = %report.id,
            reporter_id = %report.reporter_id,
            reported_user_id = %report.reported_user_id,
            reason = reason.label(),
            "report created"
        );

        if let Some(admin_id) = self
            .support_admin_id
            .as_ref()
            .filter(|admin_id| *admin_id != reporter_id)
        {
            self.follow_ups.dispatch(FollowUp::ReportNotice {
                reporter_id: reporter_id.clone(),
                admin_id: admin_id.clone(),
                report_id: report.id.clone(),
                reported_user_id: report.reported_user_id.clone(),
                reason,
            });
        }
        Ok(report)
    }

    pub fn escalate(
        &self,
        session: &Session,
        request: Escalation,
        context: &AccessContext,
    ) -> Result<Report, ModerationError> {
        require_admin(session)?;
        if request.user_id.as_str().trim().is_empty() {
            return Err(ModerationError::validation("user_id is required"));
        }
        let reason = parse_reason(&request.reason)?;
        let description = normalize_description(request.description)?;
        self.check_target(&request.user_id, &request.reported_user_id)?;

        let marker = match request
            .support_case_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            Some(case_id) => format!("[Escalated from support case {case_id}]"),
            None => "[Escalated by administrator]".to_string(),
        };
        let description = match description {
            Some(text) => format!("{marker} {text}"),
            None => marker,
        };

        let now = Utc::now();
        let report = Report {
            id: ReportId::generate(),
            reporter_id: request.user_id,
            reported_user_id: request.reported_user_id,
            reason,
            description: Some(description),
            status: ReportStatus::Reviewing,
            assigned_admin_id: Some(session.user_id.clone()),
            resolution_notes: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };
        let report = self.insert(report)?;
        info!(
            report_id = %report.id,
            admin_id = %session.user_id,
            "support case escalated"
        );

        self.auditor.record(
            &session.user_id,
            AccessType::EscalateCase,
            AccessDetails::reason("support case escalated to report")
                .for_user(&report.reported_user_id)
                .for_report(&report.id),
            context,
        );
        Ok(report)
    }

    pub fn update_report(
        &self,
        session: &Session,
        report_id: &ReportId,
        update: ReportUpdate,
        context: &AccessContext,
    ) -> Result<Report, ModerationError> {
        require_admin(session)?;
        if report_id.as_str().trim().is_empty() {
            return Err(ModerationError::validation("report_id is required"));
        }
        if update.is_empty() {
            return Err(ModerationError::NoOp);
        }
        let requested = update
            .status
            .as_deref()
            .map(|raw| {
                ReportStatus::from_label(raw).ok_or_else(|| {
                    ModerationError::validation_with(
                        "invalid status",
                        format!("expected one of {}", status_labels()),
                    )
                })
            })
            .transpose()?;

        let mut report = retry_read(self.read_attempts, || self.store.fetch_report(report_id))?
            .ok_or_else(|| ModerationError::ReportNotFound(report_id.clone()))?;

        let current = report.status;
        let next = match requested {
            Some(status) => status,
            None if update.assign_to_me && current == ReportStatus::Pending => {
                ReportStatus::Reviewing
            }
            None => current,
        };
        if !current.can_transition_to(next) {
            return Err(ModerationError::InvalidTransition {
                from: current,
                to: next,
            });
        }

        let now = Utc::now();
        report.status = next;
        report.updated_at = now;
        if let Some(notes) = update.resolution_notes {
            report.resolution_notes = Some(notes);
        }
        if update.assign_to_me {
            report.assigned_admin_id = Some(session.user_id.clone());
        }
        if next.is_terminal() && next != current {
            report.resolved_at = Some(now);
        }

        self.store.update_report(&report).map_err(|err| match err {
            StoreError::NotFound { .. } => ModerationError::ReportNotFound(report_id.clone()),
            StoreError::Conflict { .. } => ModerationError::DuplicateReport { existing: None },
            other => ModerationError::Store(other),
        })?;
        info!(
            report_id = %report.id,
            admin_id = %session.user_id,
            from = current.label(),
            to = next.label(),
            "report updated"
        );

        self.auditor.record(
            &session.user_id,
            AccessType::for_report_status(next),
            AccessDetails::reason(format!("report moved from {current} to {next}"))
                .for_user(&report.reported_user_id)
                .for_report(&report.id),
            context,
        );
        Ok(report)
    }

    pub fn list_reports(
        &self,
        session: &Session,
        query: ReportQuery,
        context: &AccessContext,
    ) -> Result<ReportListing, ModerationError> {
        require_admin(session)?;
        let query = ReportQuery {
            limit: clamp_page_size(query.limit),
            ..query
        };
        let reports = retry_read(self.read_attempts, || self.store.list_reports(&query))?;
        let counts = retry_read(self.read_attempts, || self.store.report_counts())?;

        let mut names: HashMap<UserId, Option<String>> = HashMap::new();
        let mut views = Vec::with_capacity(reports.len());
        for report in reports {
            let reporter_name = self.display_name(&mut names, &report.reporter_id)?;
            let reported_name = self.display_name(&mut names, &report.reported_user_id)?;
            let last_message_preview = retry_read(self.read_attempts, || {
                latest_between(
                    self.store.as_ref(),
                    &report.reporter_id,
                    &report.reported_user_id,
                )
            })?
            .map(|message| preview(&message.content));
            views.push(ReportView {
                report,
                reporter_name,
                reported_name,
                last_message_preview,
            });
        }

        let reason = match query.status {
            Some(status) => format!("viewed {status} report queue"),
            None => "viewed report queue".to_string(),
        };
        self.auditor.record(
            &session.user_id,
            AccessType::ViewReportQueue,
            AccessDetails::reason(reason),
            context,
        );
        Ok(ReportListing {
            reports: views,
            counts,
        })
    }

    fn check_target(&self, reporter_id: &UserId, reported_id: &UserId) -> Result<(), ModerationError> {
        if reported_id.as_str().trim().is_empty() {
            return Err(ModerationError::validation("reported_user_id is required"));
        }
        if reporter_id == reported_id {
            return Err(ModerationError::SelfReport);
        }
        let target = retry_read(self.read_attempts, || self.store.fetch_user(reported_id))?
            .ok_or_else(|| ModerationError::TargetNotFound(reported_id.clone()))?;
        if target.is_admin() {
            return Err(ModerationError::ProtectedTarget);
        }
        if let Some(existing) = retry_read(self.read_attempts, || {
            self.store.active_report_for(reporter_id, reported_id)
        })? {
            return Err(ModerationError::DuplicateReport {
                existing: Some(existing.id),
            });
        }
        Ok(())
    }

    fn insert(&self, report: Report) -> Result<Report, ModerationError> {
        self.store.insert_report(report).map_err(|err| match err {
            StoreError::Conflict { .. } => ModerationError::DuplicateReport { existing: None },
            other => ModerationError::Store(other),
        })
    }

    fn display_name(
        &self,
        cache: &mut HashMap<UserId, Option<String>>,
        user_id: &UserId,
    ) -> Result<Option<String>, StoreError> {
        if let Some(name) = cache.get(user_id) {
            return Ok(name.clone());
        }
        let name = retry_read(self.read_attempts, || self.store.fetch_user(user_id))?
            .map(|account: UserAccount| account.display_name);
        cache.insert(user_id.clone(), name.clone());
        Ok(name)
    }
}

fn parse_reason(raw: &str) -> Result<ReportReason, ModerationError> {
    ReportReason::from_label(raw.trim()).ok_or_else(|| {
        let allowed: Vec<&str> = ReportReason::ALL.iter().map(|reason| reason.label()).collect();
        ModerationError::validation_with(
            "invalid reason",
            format!("expected one of {}", allowed.join(", ")),
        )
    })
}

fn normalize_description(raw: Option<String>) -> Result<Option<String>, ModerationError> {
    let Some(text) = raw.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
    else {
        return Ok(None);
    };
    if text.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(ModerationError::validation_with(
            "description too long",
            format!("at most {MAX_DESCRIPTION_CHARS} characters"),
        ));
    }
    Ok(Some(text))
}

fn status_labels() -> String {
    ReportStatus::ALL
        .iter()
        .map(|status| status.label())
        .collect::<Vec<_>>()
        .join(", ")
}

fn clamp_page_size(limit: usize) -> usize {
    match limit {
        0 => DEFAULT_PAGE_SIZE,
        n => n.min(MAX_PAGE_SIZE),
    }
}

fn preview(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    cut.push_str("...");
    cut
}
