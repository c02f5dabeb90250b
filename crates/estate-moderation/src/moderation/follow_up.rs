//! Secondary effects that run after a primary write has committed.
//!
//! Each follow-up is attempted inline once; failures are parked in the queue and
//! retried by `retry_pending` until the attempt budget is spent.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::conversations::{latest_between, latest_case_id};
use super::domain::{
    CaseId, CaseStatus, ConversationType, Message, MessageKind, ReportId, ReportReason, UserId,
    REPORT_MARKER,
};
use super::store::{MessageFilter, MessagePatch, MessageStore, StoreError};

pub const CLOSURE_NOTICE: &str =
    "This support case has been closed by an administrator. Send a new message to reopen it.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    /// Flip every closed message between the pair back to open.
    ReopenCase { user_id: UserId, admin_id: UserId },
    /// Courtesy message from the admin announcing a closure.
    ClosureNotice {
        admin_id: UserId,
        user_id: UserId,
        case_id: Option<CaseId>,
        closed_at: DateTime<Utc>,
    },
    /// Marker message routing a fresh report into the support inbox.
    ReportNotice {
        reporter_id: UserId,
        admin_id: UserId,
        report_id: ReportId,
        reported_user_id: UserId,
        reason: ReportReason,
    },
}

impl FollowUp {
    pub fn label(&self) -> &'static str {
        match self {
            FollowUp::ReopenCase { .. } => "reopen_case",
            FollowUp::ClosureNotice { .. } => "closure_notice",
            FollowUp::ReportNotice { .. } => "report_notice",
        }
    }
}

/// Tally of one retry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FollowUpSweep {
    pub retried: usize,
    pub completed: usize,
    pub abandoned: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Parked,
    Abandoned,
}

struct Queued {
    follow_up: FollowUp,
    attempts: u32,
}

pub struct FollowUpDispatcher<S: ?Sized> {
    store: Arc<S>,
    queue: Mutex<VecDeque<Queued>>,
    max_attempts: u32,
}

impl<S> FollowUpDispatcher<S>
where
    S: MessageStore + ?Sized,
{
    pub fn new(store: Arc<S>, max_attempts: u32) -> Self {
        Self {
            store,
            queue: Mutex::new(VecDeque::new()),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Attempt a follow-up now; returns `false` when it was parked or dropped.
    pub fn dispatch(&self, follow_up: FollowUp) -> bool {
        self.attempt(Queued {
            follow_up,
            attempts: 0,
        }) == Outcome::Completed
    }

    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    pub fn retry_pending(&self) -> FollowUpSweep {
        let parked: Vec<Queued> = self.queue().drain(..).collect();
        let mut sweep = FollowUpSweep {
            retried: parked.len(),
            ..FollowUpSweep::default()
        };
        for item in parked {
            match self.attempt(item) {
                Outcome::Completed => sweep.completed += 1,
                Outcome::Abandoned => sweep.abandoned += 1,
                Outcome::Parked => {}
            }
        }
        sweep.remaining = self.pending();
        sweep
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Queued>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn attempt(&self, mut item: Queued) -> Outcome {
        item.attempts += 1;
        match self.execute(&item.follow_up) {
            Ok(chained) => {
                for next in chained {
                    self.dispatch(next);
                }
                Outcome::Completed
            }
            Err(err) if item.attempts >= self.max_attempts => {
                error!(
                    follow_up = item.follow_up.label(),
                    attempts = item.attempts,
                    error = %err,
                    "abandoning follow-up"
                );
                Outcome::Abandoned
            }
            Err(err) => {
                warn!(
                    follow_up = item.follow_up.label(),
                    attempts = item.attempts,
                    error = %err,
                    "follow-up failed; parked for retry"
                );
                self.queue().push_back(item);
                Outcome::Parked
            }
        }
    }

    fn execute(&self, follow_up: &FollowUp) -> Result<Vec<FollowUp>, StoreError> {
        match follow_up {
            FollowUp::ReopenCase { user_id, admin_id } => {
                let reopened = reopen_between(self.store.as_ref(), user_id, admin_id)?;
                info!(%user_id, %admin_id, reopened, "support case reopened");
                Ok(Vec::new())
            }
            FollowUp::ClosureNotice {
                admin_id,
                user_id,
                case_id,
                closed_at,
            } => {
                // Stamped at the close so a late retry sorts behind newer replies.
                let mut notice = Message::new(
                    admin_id.clone(),
                    user_id.clone(),
                    CLOSURE_NOTICE,
                    ConversationType::UserToAdmin,
                    *closed_at,
                )
                .with_kind(MessageKind::SystemNotice)
                .with_case(case_id.clone(), CaseStatus::Closed);
                notice.closed_at = Some(*closed_at);
                notice.closed_by = Some(admin_id.clone());
                self.store.insert_message(notice)?;
                Ok(Vec::new())
            }
            FollowUp::ReportNotice {
                reporter_id,
                admin_id,
                report_id,
                reported_user_id,
                reason,
            } => {
                let previous = latest_between(self.store.as_ref(), reporter_id, admin_id)?;
                let case_id = latest_case_id(self.store.as_ref(), reporter_id, admin_id)?
                    .unwrap_or_else(CaseId::generate);
                let content = format!(
                    "{REPORT_MARKER} {} report against user {reported_user_id} (report {report_id})",
                    reason.label()
                );
                let notice = Message::new(
                    reporter_id.clone(),
                    admin_id.clone(),
                    content,
                    ConversationType::UserToAdmin,
                    Utc::now(),
                )
                .with_kind(MessageKind::SystemReport)
                .with_case(Some(case_id), CaseStatus::Open);
                self.store.insert_message(notice)?;

                let was_closed = previous
                    .map(|message| message.case_status == Some(CaseStatus::Closed))
                    .unwrap_or(false);
                if was_closed {
                    Ok(vec![FollowUp::ReopenCase {
                        user_id: reporter_id.clone(),
                        admin_id: admin_id.clone(),
                    }])
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }
}

/// Reopen every closed message between the pair; returns the number of rows touched.
pub fn reopen_between<S>(store: &S, user_id: &UserId, admin_id: &UserId) -> Result<usize, StoreError>
where
    S: MessageStore + ?Sized,
{
    store.update_messages(
        &MessageFilter::between(user_id, admin_id).with_case_status(CaseStatus::Closed),
        &MessagePatch::reopen(Utc::now()),
    )
}
