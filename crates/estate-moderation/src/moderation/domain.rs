use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Literal prefix carried by system-generated report messages.
pub const REPORT_MARKER: &str = "[REPORT]";

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn generate() -> Self {
                Self(format!("{}-{}", $prefix, Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// Marketplace account identifier (end users and administrators alike).
    UserId,
    "usr"
);
identifier!(
    /// Identifier of a stored chat message.
    MessageId,
    "msg"
);
identifier!(
    /// Identifier of a moderation report.
    ReportId,
    "rpt"
);
identifier!(
    /// Identifier shared by every message of one support case.
    CaseId,
    "case"
);

/// Classification of a two-party thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationType {
    UserToUser,
    UserToAdmin,
    AdminToUser,
}

impl ConversationType {
    pub const fn label(self) -> &'static str {
        match self {
            ConversationType::UserToUser => "user_to_user",
            ConversationType::UserToAdmin => "user_to_admin",
            ConversationType::AdminToUser => "admin_to_user",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim() {
            "user_to_user" => Some(Self::UserToUser),
            "user_to_admin" => Some(Self::UserToAdmin),
            "admin_to_user" => Some(Self::AdminToUser),
            _ => None,
        }
    }

    /// Threads with an administrator on one side carry a support case.
    pub const fn is_support(self) -> bool {
        !matches!(self, ConversationType::UserToUser)
    }
}

/// Support-case state carried on `user_to_admin` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Open,
    Closed,
}

impl CaseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CaseStatus::Open => "open",
            CaseStatus::Closed => "closed",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim() {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Origin of a message, fixed when the message is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Chat,
    SystemReport,
    SystemNotice,
}

impl MessageKind {
    pub const fn label(self) -> &'static str {
        match self {
            MessageKind::Chat => "chat",
            MessageKind::SystemReport => "system_report",
            MessageKind::SystemNotice => "system_notice",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim() {
            "chat" => Some(Self::Chat),
            "system_report" => Some(Self::SystemReport),
            "system_notice" => Some(Self::SystemNotice),
            _ => None,
        }
    }
}

/// Row of the append-only `messages` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub conversation_type: ConversationType,
    pub case_status: Option<CaseStatus>,
    pub case_id: Option<CaseId>,
    pub closed_at: Option<DateTime<Utc>>,
    pub closed_by: Option<UserId>,
    pub reopened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message_kind: MessageKind,
}

impl Message {
    /// Fresh message with no read receipt and no case bookkeeping.
    pub fn new(
        sender_id: UserId,
        recipient_id: UserId,
        content: impl Into<String>,
        conversation_type: ConversationType,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            sender_id,
            recipient_id,
            content: content.into(),
            created_at,
            read_at: None,
            conversation_type,
            case_status: None,
            case_id: None,
            closed_at: None,
            closed_by: None,
            reopened_at: None,
            message_kind: MessageKind::Chat,
        }
    }

    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.message_kind = kind;
        self
    }

    pub fn with_case(mut self, case_id: Option<CaseId>, status: CaseStatus) -> Self {
        self.case_id = case_id;
        self.case_status = Some(status);
        self
    }

    pub fn involves(&self, user: &UserId) -> bool {
        &self.sender_id == user || &self.recipient_id == user
    }

    /// The other party of the message from the viewer's perspective.
    pub fn counterpart(&self, viewer: &UserId) -> &UserId {
        if &self.sender_id == viewer {
            &self.recipient_id
        } else {
            &self.sender_id
        }
    }

    pub fn is_unread_by(&self, viewer: &UserId) -> bool {
        &self.recipient_id == viewer && self.read_at.is_none()
    }

    pub fn carries_report_signature(&self) -> bool {
        self.carries_marker(REPORT_MARKER)
    }

    /// A system report, or any message whose body contains `marker`.
    pub fn carries_marker(&self, marker: &str) -> bool {
        self.message_kind == MessageKind::SystemReport || self.content.contains(marker)
    }
}

/// Closed set of reasons a user may be reported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Harassment,
    Spam,
    Fraud,
    FakeListing,
    Inappropriate,
    Impersonation,
    Other,
}

impl ReportReason {
    pub const ALL: [ReportReason; 7] = [
        ReportReason::Harassment,
        ReportReason::Spam,
        ReportReason::Fraud,
        ReportReason::FakeListing,
        ReportReason::Inappropriate,
        ReportReason::Impersonation,
        ReportReason::Other,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ReportReason::Harassment => "harassment",
            ReportReason::Spam => "spam",
            ReportReason::Fraud => "fraud",
            ReportReason::FakeListing => "fake_listing",
            ReportReason::Inappropriate => "inappropriate",
            ReportReason::Impersonation => "impersonation",
            ReportReason::Other => "other",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|reason| reason.label() == raw)
    }
}

/// Moderation report status machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Reviewing,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 4] = [
        ReportStatus::Pending,
        ReportStatus::Reviewing,
        ReportStatus::Resolved,
        ReportStatus::Dismissed,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Reviewing => "reviewing",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|status| status.label() == raw)
    }

    /// Pending and reviewing reports count against the one-per-pair limit.
    pub const fn is_active(self) -> bool {
        matches!(self, ReportStatus::Pending | ReportStatus::Reviewing)
    }

    pub const fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn can_transition_to(self, next: ReportStatus) -> bool {
        if self == next {
            return true;
        }
        match self {
            ReportStatus::Pending => next != ReportStatus::Pending,
            ReportStatus::Reviewing => next.is_terminal(),
            ReportStatus::Resolved | ReportStatus::Dismissed => false,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Row of the `conversation_reports` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub reporter_id: UserId,
    pub reported_user_id: UserId,
    pub reason: ReportReason,
    pub description: Option<String>,
    pub status: ReportStatus,
    pub assigned_admin_id: Option<UserId>,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Kind of privileged access recorded in the audit table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    ViewReportedConversation,
    ResolveReport,
    DismissReport,
    EscalateCase,
    ViewReportQueue,
    CloseCase,
}

impl AccessType {
    pub const ALL: [AccessType; 6] = [
        AccessType::ViewReportedConversation,
        AccessType::ResolveReport,
        AccessType::DismissReport,
        AccessType::EscalateCase,
        AccessType::ViewReportQueue,
        AccessType::CloseCase,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            AccessType::ViewReportedConversation => "view_reported_conversation",
            AccessType::ResolveReport => "resolve_report",
            AccessType::DismissReport => "dismiss_report",
            AccessType::EscalateCase => "escalate_case",
            AccessType::ViewReportQueue => "view_report_queue",
            AccessType::CloseCase => "close_case",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == raw)
    }

    /// Audit classification for a report after an update landed.
    pub const fn for_report_status(status: ReportStatus) -> Self {
        match status {
            ReportStatus::Resolved => AccessType::ResolveReport,
            ReportStatus::Dismissed => AccessType::DismissReport,
            ReportStatus::Pending | ReportStatus::Reviewing => {
                AccessType::ViewReportedConversation
            }
        }
    }
}

/// Row of the append-only `admin_access_logs` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAccessLogEntry {
    pub admin_id: UserId,
    pub user_id: Option<UserId>,
    pub report_id: Option<ReportId>,
    pub access_type: AccessType,
    pub access_reason: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Privilege level carried on accounts and session tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim() {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Directory entry for a marketplace account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub display_name: String,
    pub role: Role,
}

impl UserAccount {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(id),
            display_name: display_name.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_status_transitions_follow_the_machine() {
        assert!(ReportStatus::Pending.can_transition_to(ReportStatus::Reviewing));
        assert!(ReportStatus::Pending.can_transition_to(ReportStatus::Dismissed));
        assert!(ReportStatus::Reviewing.can_transition_to(ReportStatus::Resolved));
        assert!(ReportStatus::Reviewing.can_transition_to(ReportStatus::Reviewing));
        assert!(!ReportStatus::Reviewing.can_transition_to(ReportStatus::Pending));
        assert!(!ReportStatus::Resolved.can_transition_to(ReportStatus::Reviewing));
        assert!(!ReportStatus::Dismissed.can_transition_to(ReportStatus::Resolved));
    }

    #[test]
    fn labels_parse_back() {
        for reason in ReportReason::ALL {
            assert_eq!(ReportReason::from_label(reason.label()), Some(reason));
        }
        assert_eq!(ReportReason::from_label("rudeness"), None);
        assert_eq!(
            ConversationType::from_label("admin_to_user"),
            Some(ConversationType::AdminToUser)
        );
        assert_eq!(ReportStatus::from_label(" resolved "), Some(ReportStatus::Resolved));
    }

    #[test]
    fn report_signature_matches_kind_or_marker() {
        let now = Utc::now();
        let legacy = Message::new(
            UserId::new("u1"),
            UserId::new("a1"),
            format!("{REPORT_MARKER} spam from u2"),
            ConversationType::UserToUser,
            now,
        );
        let tagged = Message::new(
            UserId::new("u1"),
            UserId::new("a1"),
            "new report filed",
            ConversationType::UserToAdmin,
            now,
        )
        .with_kind(MessageKind::SystemReport);
        let chat = Message::new(
            UserId::new("u1"),
            UserId::new("u2"),
            "is the flat still available?",
            ConversationType::UserToUser,
            now,
        );

        assert!(legacy.carries_report_signature());
        assert!(tagged.carries_report_signature());
        assert!(!chat.carries_report_signature());
        assert_eq!(chat.counterpart(&UserId::new("u2")), &UserId::new("u1"));
    }
}
