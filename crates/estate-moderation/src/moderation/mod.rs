//! Conversation threading, support-case lifecycle, and moderation reports.

pub mod audit;
pub mod auth;
pub mod cases;
pub mod conversations;
pub mod corrector;
pub mod domain;
pub mod error;
pub mod follow_up;
pub mod reports;
pub mod router;
pub mod service;
pub mod store;

pub use audit::{AccessContext, AccessDetails, AdminAccessAuditor};
pub use auth::{is_admin, require_admin, AuthError, Session, TokenAuthority};
pub use cases::{CaseClosure, CaseLifecycleManager, ConversationStatus};
pub use conversations::{group_conversations, ConversationGrouper, ConversationSummary};
pub use corrector::{ClassificationCorrector, CorrectionSummary};
pub use domain::{
    AccessType, AdminAccessLogEntry, CaseId, CaseStatus, ConversationType, Message, MessageId,
    MessageKind, Report, ReportId, ReportReason, ReportStatus, Role, UserAccount, UserId,
    REPORT_MARKER,
};
pub use error::ModerationError;
pub use follow_up::{FollowUp, FollowUpDispatcher, FollowUpSweep};
pub use reports::{Escalation, NewReport, ReportListing, ReportManager, ReportUpdate, ReportView};
pub use router::{moderation_router, ModerationState};
pub use service::{ModerationService, ModerationSettings};
pub use store::{
    MemoryStore, MessageFilter, MessagePatch, MessageStore, ModerationStore, ReportCounts,
    ReportQuery, SortOrder, SqliteStore, StoreError,
};

#[cfg(test)]
mod tests;
