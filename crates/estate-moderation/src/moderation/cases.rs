//! Support-case lifecycle between one end user and an administrator.
//!
//! A case has no row of its own: every message in the thread carries the case status and
//! the most recent message is authoritative.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::audit::{AccessContext, AccessDetails, AdminAccessAuditor};
use super::auth::{is_admin, require_admin, Session};
use super::conversations::{latest_between, latest_case_id};
use super::domain::{AccessType, CaseId, CaseStatus, ConversationType, Message, UserId};
use super::error::ModerationError;
use super::follow_up::{reopen_between, FollowUp, FollowUpDispatcher};
use super::store::{retry_read, MessageFilter, MessagePatch, ModerationStore};

pub const CLOSED_CASE_NOTICE: &str =
    "This support case is closed. Sending a new message will reopen it.";

/// Outcome of a close request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseClosure {
    pub closed_messages: usize,
    pub case_id: Option<CaseId>,
    pub closed_at: DateTime<Utc>,
    /// One of the two directional updates failed.
    pub partial: bool,
}

/// Answer to "may the chat input accept text for this thread".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationStatus {
    pub is_closed: bool,
    pub message: Option<String>,
}

pub struct CaseLifecycleManager<S: ?Sized> {
    store: Arc<S>,
    follow_ups: Arc<FollowUpDispatcher<S>>,
    auditor: Arc<AdminAccessAuditor<S>>,
    read_attempts: u32,
}

impl<S> CaseLifecycleManager<S>
where
    S: ModerationStore + ?Sized,
{
    pub fn new(
        store: Arc<S>,
        follow_ups: Arc<FollowUpDispatcher<S>>,
        auditor: Arc<AdminAccessAuditor<S>>,
        read_attempts: u32,
    ) -> Self {
        Self {
            store,
            follow_ups,
            auditor,
            read_attempts,
        }
    }

    /// Close every message between the calling admin and `user_id`, in both directions.
    /// The closure notice is only sent when something was closed.
    pub fn close_case(
        &self,
        session: &Session,
        user_id: &UserId,
        context: &AccessContext,
    ) -> Result<CaseClosure, ModerationError> {
        require_admin(session)?;
        if user_id.as_str().trim().is_empty() {
            return Err(ModerationError::validation("user_id is required"));
        }
        let admin_id = &session.user_id;
        if admin_id == user_id {
            return Err(ModerationError::validation(
                "an administrator cannot close a case with themselves",
            ));
        }

        retry_read(self.read_attempts, || self.store.fetch_user(user_id))?
            .ok_or_else(|| ModerationError::TargetNotFound(user_id.clone()))?;

        let case_id = retry_read(self.read_attempts, || {
            latest_case_id(self.store.as_ref(), admin_id, user_id)
        })?;
        let closed_at = Utc::now();
        let patch = MessagePatch::close(admin_id, closed_at);

        let outgoing = self
            .store
            .update_messages(&MessageFilter::direction(admin_id, user_id), &patch);
        let incoming = self
            .store
            .update_messages(&MessageFilter::direction(user_id, admin_id), &patch);

        let (closed_messages, partial) = match (outgoing, incoming) {
            (Ok(out), Ok(inc)) => (out + inc, false),
            (Ok(out), Err(err)) => {
                warn!(%admin_id, %user_id, error = %err, "closing user-to-admin direction failed");
                (out, true)
            }
            (Err(err), Ok(inc)) => {
                warn!(%admin_id, %user_id, error = %err, "closing admin-to-user direction failed");
                (inc, true)
            }
            (Err(outgoing), Err(incoming)) => {
                return Err(ModerationError::CaseCloseFailed { outgoing, incoming });
            }
        };
        info!(%admin_id, %user_id, closed_messages, partial, "support case closed");

        if closed_messages > 0 {
            self.follow_ups.dispatch(FollowUp::ClosureNotice {
                admin_id: admin_id.clone(),
                user_id: user_id.clone(),
                case_id: case_id.clone(),
                closed_at,
            });
        }
        self.auditor.record(
            admin_id,
            AccessType::CloseCase,
            AccessDetails::reason("support case closed").for_user(user_id),
            context,
        );

        Ok(CaseClosure {
            closed_messages,
            case_id,
            closed_at,
            partial,
        })
    }

    /// Flip closed messages between the pair back to open. Running it twice changes nothing.
    pub fn reopen_case(&self, user_id: &UserId, admin_id: &UserId) -> Result<usize, ModerationError> {
        let reopened = reopen_between(self.store.as_ref(), user_id, admin_id)?;
        if reopened > 0 {
            info!(%user_id, %admin_id, reopened, "support case reopened");
        }
        Ok(reopened)
    }

    /// Deliver a chat message, classifying the thread and reopening a closed case.
    pub fn send_message(
        &self,
        session: &Session,
        recipient_id: &UserId,
        content: &str,
    ) -> Result<Message, ModerationError> {
        let sender_id = &session.user_id;
        let content = content.trim();
        if content.is_empty() {
            return Err(ModerationError::validation("content must not be empty"));
        }
        if recipient_id.as_str().trim().is_empty() {
            return Err(ModerationError::validation("recipient_id is required"));
        }
        if recipient_id == sender_id {
            return Err(ModerationError::validation("cannot send a message to yourself"));
        }
        let recipient = retry_read(self.read_attempts, || self.store.fetch_user(recipient_id))?
            .ok_or_else(|| ModerationError::TargetNotFound(recipient_id.clone()))?;

        let sender_is_admin = is_admin(session);
        let support = sender_is_admin || recipient.is_admin();
        let previous = retry_read(self.read_attempts, || {
            latest_between(self.store.as_ref(), sender_id, recipient_id)
        })?;

        let message = if support {
            let case_id = match previous.as_ref().and_then(|m| m.case_id.clone()) {
                Some(case_id) => Some(case_id),
                None => retry_read(self.read_attempts, || {
                    latest_case_id(self.store.as_ref(), sender_id, recipient_id)
                })?,
            }
            .unwrap_or_else(CaseId::generate);
            Message::new(
                sender_id.clone(),
                recipient_id.clone(),
                content,
                ConversationType::UserToAdmin,
                Utc::now(),
            )
            .with_case(Some(case_id), CaseStatus::Open)
        } else {
            Message::new(
                sender_id.clone(),
                recipient_id.clone(),
                content,
                ConversationType::UserToUser,
                Utc::now(),
            )
        };
        let stored = self.store.insert_message(message)?;

        let was_closed = previous
            .as_ref()
            .map(|m| m.case_status == Some(CaseStatus::Closed))
            .unwrap_or(false);
        if support && was_closed {
            let (user_id, admin_id) = if sender_is_admin && !recipient.is_admin() {
                (recipient_id.clone(), sender_id.clone())
            } else {
                (sender_id.clone(), recipient_id.clone())
            };
            self.follow_ups
                .dispatch(FollowUp::ReopenCase { user_id, admin_id });
        }
        Ok(stored)
    }

    pub fn conversation_status(
        &self,
        session: &Session,
        recipient_id: &UserId,
        conversation_type: &str,
    ) -> Result<ConversationStatus, ModerationError> {
        let conversation_type = ConversationType::from_label(conversation_type).ok_or_else(|| {
            ModerationError::validation_with(
                "invalid conversation_type",
                format!("unsupported value '{conversation_type}'"),
            )
        })?;
        if recipient_id.as_str().trim().is_empty() {
            return Err(ModerationError::validation("recipient_id is required"));
        }
        if !conversation_type.is_support() {
            return Ok(ConversationStatus {
                is_closed: false,
                message: None,
            });
        }

        let latest = retry_read(self.read_attempts, || {
            latest_between(self.store.as_ref(), &session.user_id, recipient_id)
        })?;
        let is_closed = latest
            .map(|m| m.case_status == Some(CaseStatus::Closed))
            .unwrap_or(false);
        Ok(ConversationStatus {
            is_closed,
            message: is_closed.then(|| CLOSED_CASE_NOTICE.to_string()),
        })
    }
}
