use axum::http::StatusCode;

use super::auth::AuthError;
use super::domain::{ReportId, ReportStatus, UserId};
use super::store::StoreError;

/// Error raised by the moderation pipeline; each variant maps onto one HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error(transparent)]
    Authentication(#[from] AuthError),
    #[error("administrator privileges required")]
    Forbidden,
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<String>,
    },
    #[error("users cannot report themselves")]
    SelfReport,
    #[error("user {0} not found")]
    TargetNotFound(UserId),
    #[error("administrator accounts cannot be reported")]
    ProtectedTarget,
    #[error("report {0} not found")]
    ReportNotFound(ReportId),
    #[error("an active report already exists for this user")]
    DuplicateReport { existing: Option<ReportId> },
    #[error("no changes supplied")]
    NoOp,
    #[error("report cannot move from {from} to {to}")]
    InvalidTransition { from: ReportStatus, to: ReportStatus },
    #[error("failed to close the case in either direction")]
    CaseCloseFailed {
        outgoing: StoreError,
        incoming: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ModerationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: Some(details.into()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ModerationError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ModerationError::Forbidden | ModerationError::ProtectedTarget => StatusCode::FORBIDDEN,
            ModerationError::Validation { .. }
            | ModerationError::SelfReport
            | ModerationError::NoOp
            | ModerationError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            ModerationError::TargetNotFound(_) | ModerationError::ReportNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ModerationError::DuplicateReport { .. } => StatusCode::CONFLICT,
            ModerationError::CaseCloseFailed { .. } | ModerationError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Supplementary text for the `details` field of error bodies.
    pub fn details(&self) -> Option<String> {
        match self {
            ModerationError::Validation { details, .. } => details.clone(),
            ModerationError::DuplicateReport {
                existing: Some(report_id),
            } => Some(format!("existing report {report_id}")),
            ModerationError::CaseCloseFailed { outgoing, incoming } => {
                Some(format!("outgoing: {outgoing}; incoming: {incoming}"))
            }
            ModerationError::Store(err) => Some(err.operation().to_string()),
            _ => None,
        }
    }
}
