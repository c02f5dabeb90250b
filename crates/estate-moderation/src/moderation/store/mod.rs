//! Persistence contracts consumed by the moderation pipeline.
//!
//! Every write is atomic per call and nothing assumes atomicity across calls. The
//! in-memory backend serves tests and demos; the SQLite backend is the durable one.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::domain::{
    AdminAccessLogEntry, CaseStatus, ConversationType, Message, Report, ReportId, ReportStatus,
    UserAccount, UserId,
};

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{operation}: uniqueness constraint violated")]
    Conflict { operation: &'static str },
    #[error("{operation}: record not found")]
    NotFound { operation: &'static str },
    #[error("{operation} failed: {cause}")]
    Unavailable {
        operation: &'static str,
        cause: String,
    },
}

impl StoreError {
    pub fn unavailable(operation: &'static str, cause: impl fmt::Display) -> Self {
        Self::Unavailable {
            operation,
            cause: cause.to_string(),
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            StoreError::Conflict { operation }
            | StoreError::NotFound { operation }
            | StoreError::Unavailable { operation, .. } => operation,
        }
    }

    /// Only transport-level failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

/// Ordering applied to message queries; ties keep insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// Conjunctive message predicate understood by every backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    pub sender_id: Option<UserId>,
    pub recipient_id: Option<UserId>,
    /// Sender or recipient.
    pub participant: Option<UserId>,
    /// Either direction between the two users.
    pub between: Option<(UserId, UserId)>,
    /// Sender or recipient is one of the listed users.
    pub involving_any: Option<Vec<UserId>>,
    pub conversation_type: Option<ConversationType>,
    pub exclude_conversation_type: Option<ConversationType>,
    pub case_status: Option<CaseStatus>,
    pub unread_only: bool,
    /// System report kind or content containing the marker.
    pub report_signature: Option<String>,
}

impl MessageFilter {
    /// Messages flowing from `sender` to `recipient` only.
    pub fn direction(sender: &UserId, recipient: &UserId) -> Self {
        Self {
            sender_id: Some(sender.clone()),
            recipient_id: Some(recipient.clone()),
            ..Self::default()
        }
    }

    pub fn between(a: &UserId, b: &UserId) -> Self {
        Self {
            between: Some((a.clone(), b.clone())),
            ..Self::default()
        }
    }

    pub fn participant(user: &UserId) -> Self {
        Self {
            participant: Some(user.clone()),
            ..Self::default()
        }
    }

    pub fn involving_any(users: Vec<UserId>) -> Self {
        Self {
            involving_any: Some(users),
            ..Self::default()
        }
    }

    pub fn report_signature(marker: &str) -> Self {
        Self {
            report_signature: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub fn with_case_status(mut self, status: CaseStatus) -> Self {
        self.case_status = Some(status);
        self
    }

    pub fn with_type(mut self, conversation_type: ConversationType) -> Self {
        self.conversation_type = Some(conversation_type);
        self
    }

    pub fn excluding_type(mut self, conversation_type: ConversationType) -> Self {
        self.exclude_conversation_type = Some(conversation_type);
        self
    }

    /// Restrict to messages addressed to `viewer` that carry no read receipt.
    pub fn unread_by(mut self, viewer: &UserId) -> Self {
        self.recipient_id = Some(viewer.clone());
        self.unread_only = true;
        self
    }

    pub fn matches(&self, message: &Message) -> bool {
        if let Some(sender) = &self.sender_id {
            if &message.sender_id != sender {
                return false;
            }
        }
        if let Some(recipient) = &self.recipient_id {
            if &message.recipient_id != recipient {
                return false;
            }
        }
        if let Some(participant) = &self.participant {
            if !message.involves(participant) {
                return false;
            }
        }
        if let Some((a, b)) = &self.between {
            let forward = &message.sender_id == a && &message.recipient_id == b;
            let backward = &message.sender_id == b && &message.recipient_id == a;
            if !(forward || backward) {
                return false;
            }
        }
        if let Some(users) = &self.involving_any {
            if !users.iter().any(|user| message.involves(user)) {
                return false;
            }
        }
        if let Some(kind) = self.conversation_type {
            if message.conversation_type != kind {
                return false;
            }
        }
        if let Some(kind) = self.exclude_conversation_type {
            if message.conversation_type == kind {
                return false;
            }
        }
        if let Some(status) = self.case_status {
            if message.case_status != Some(status) {
                return false;
            }
        }
        if self.unread_only && message.read_at.is_some() {
            return false;
        }
        if let Some(marker) = &self.report_signature {
            if !message.carries_marker(marker) {
                return false;
            }
        }
        true
    }
}

/// Column assignments applied by `update_messages`; `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub conversation_type: Option<ConversationType>,
    pub case_status: Option<CaseStatus>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<UserId>,
    pub reopened_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl MessagePatch {
    pub fn close(admin_id: &UserId, at: DateTime<Utc>) -> Self {
        Self {
            case_status: Some(CaseStatus::Closed),
            closed_at: Some(at),
            closed_by: Some(admin_id.clone()),
            ..Self::default()
        }
    }

    pub fn reopen(at: DateTime<Utc>) -> Self {
        Self {
            case_status: Some(CaseStatus::Open),
            reopened_at: Some(at),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, message: &mut Message) {
        if let Some(kind) = self.conversation_type {
            message.conversation_type = kind;
        }
        if let Some(status) = self.case_status {
            message.case_status = Some(status);
        }
        if let Some(at) = self.closed_at {
            message.closed_at = Some(at);
        }
        if let Some(admin) = &self.closed_by {
            message.closed_by = Some(admin.clone());
        }
        if let Some(at) = self.reopened_at {
            message.reopened_at = Some(at);
        }
        if let Some(at) = self.read_at {
            message.read_at = Some(at);
        }
    }
}

/// Paging and status filter for the admin report queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub status: Option<ReportStatus>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for ReportQuery {
    fn default() -> Self {
        Self {
            status: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Per-status report totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
    pub pending: usize,
    pub reviewing: usize,
    pub resolved: usize,
    pub dismissed: usize,
    pub total: usize,
}

impl ReportCounts {
    pub fn record(&mut self, status: ReportStatus) {
        match status {
            ReportStatus::Pending => self.pending += 1,
            ReportStatus::Reviewing => self.reviewing += 1,
            ReportStatus::Resolved => self.resolved += 1,
            ReportStatus::Dismissed => self.dismissed += 1,
        }
        self.total += 1;
    }
}

/// Append-only message table.
pub trait MessageStore: Send + Sync {
    fn insert_message(&self, message: Message) -> Result<Message, StoreError>;
    fn query_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError>;
    /// Returns the number of rows the patch touched.
    fn update_messages(
        &self,
        filter: &MessageFilter,
        patch: &MessagePatch,
    ) -> Result<usize, StoreError>;
}

/// Moderation report table.
pub trait ReportStore: Send + Sync {
    /// Fails with `StoreError::Conflict` when an active report already exists for the pair.
    fn insert_report(&self, report: Report) -> Result<Report, StoreError>;
    fn fetch_report(&self, id: &ReportId) -> Result<Option<Report>, StoreError>;
    fn active_report_for(
        &self,
        reporter_id: &UserId,
        reported_user_id: &UserId,
    ) -> Result<Option<Report>, StoreError>;
    fn update_report(&self, report: &Report) -> Result<(), StoreError>;
    fn list_reports(&self, query: &ReportQuery) -> Result<Vec<Report>, StoreError>;
    fn report_counts(&self) -> Result<ReportCounts, StoreError>;
}

/// Append-only audit table.
pub trait AccessLogStore: Send + Sync {
    fn append_access_log(&self, entry: AdminAccessLogEntry) -> Result<(), StoreError>;
    fn access_logs(&self, report_id: Option<&ReportId>)
        -> Result<Vec<AdminAccessLogEntry>, StoreError>;
}

/// Account lookups answering existence and privilege questions.
pub trait UserDirectory: Send + Sync {
    fn fetch_user(&self, id: &UserId) -> Result<Option<UserAccount>, StoreError>;
    fn admin_ids(&self) -> Result<Vec<UserId>, StoreError>;
    fn upsert_user(&self, account: UserAccount) -> Result<(), StoreError>;
}

/// Everything the moderation service needs from one backend.
pub trait ModerationStore: MessageStore + ReportStore + AccessLogStore + UserDirectory {}

impl<T> ModerationStore for T where T: MessageStore + ReportStore + AccessLogStore + UserDirectory {}

/// Re-run an idempotent read while the store reports transient failures.
pub fn retry_read<T, F>(attempts: u32, mut read: F) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match read() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                warn!(attempt, operation = err.operation(), error = %err, "retrying store read");
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
