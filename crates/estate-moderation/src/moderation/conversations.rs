use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::domain::{CaseId, CaseStatus, ConversationType, Message, UserId};
use super::store::{retry_read, MessageFilter, MessagePatch, MessageStore, SortOrder, StoreError};

/// Per-counterpart view of a viewer's inbox. Derived on every read, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationSummary {
    pub counterpart_id: UserId,
    pub last_message: Message,
    pub message_count: usize,
    pub unread_count: usize,
    pub conversation_type: ConversationType,
    pub case_status: Option<CaseStatus>,
}

/// Fold newest-first messages into one summary per counterpart.
///
/// The first message seen for a counterpart becomes its `last_message`; messages with
/// identical timestamps keep the order they arrived in.
pub fn group_conversations(viewer: &UserId, newest_first: &[Message]) -> Vec<ConversationSummary> {
    let mut index: HashMap<&UserId, usize> = HashMap::new();
    let mut summaries: Vec<ConversationSummary> = Vec::new();

    for message in newest_first.iter().filter(|message| message.involves(viewer)) {
        let counterpart = message.counterpart(viewer);
        let unread = usize::from(message.is_unread_by(viewer));
        match index.get(counterpart) {
            Some(&position) => {
                let summary = &mut summaries[position];
                summary.message_count += 1;
                summary.unread_count += unread;
            }
            None => {
                index.insert(counterpart, summaries.len());
                summaries.push(ConversationSummary {
                    counterpart_id: counterpart.clone(),
                    last_message: message.clone(),
                    message_count: 1,
                    unread_count: unread,
                    conversation_type: message.conversation_type,
                    case_status: message.case_status,
                });
            }
        }
    }

    summaries.sort_by(|a, b| b.last_message.created_at.cmp(&a.last_message.created_at));
    summaries
}

/// Read side of the inbox: summaries, threads, and read receipts.
pub struct ConversationGrouper<M: ?Sized> {
    messages: Arc<M>,
    read_attempts: u32,
}

impl<M> ConversationGrouper<M>
where
    M: MessageStore + ?Sized,
{
    pub fn new(messages: Arc<M>, read_attempts: u32) -> Self {
        Self {
            messages,
            read_attempts,
        }
    }

    pub fn summaries(
        &self,
        viewer: &UserId,
        counterpart: Option<&UserId>,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        let filter = match counterpart {
            Some(other) => MessageFilter::between(viewer, other),
            None => MessageFilter::participant(viewer),
        };
        let messages = retry_read(self.read_attempts, || {
            self.messages
                .query_messages(&filter, SortOrder::NewestFirst, None)
        })?;
        Ok(group_conversations(viewer, &messages))
    }

    /// Full thread between two users, oldest first.
    pub fn thread(&self, viewer: &UserId, counterpart: &UserId) -> Result<Vec<Message>, StoreError> {
        let filter = MessageFilter::between(viewer, counterpart);
        retry_read(self.read_attempts, || {
            self.messages
                .query_messages(&filter, SortOrder::OldestFirst, None)
        })
    }

    /// Stamp a read receipt on everything the counterpart sent the viewer.
    pub fn mark_read(&self, viewer: &UserId, counterpart: &UserId) -> Result<usize, StoreError> {
        let filter = MessageFilter::direction(counterpart, viewer).unread_by(viewer);
        let patch = MessagePatch {
            read_at: Some(Utc::now()),
            ..MessagePatch::default()
        };
        self.messages.update_messages(&filter, &patch)
    }
}

/// Most recent message exchanged between two users, in either direction.
pub fn latest_between<S>(store: &S, a: &UserId, b: &UserId) -> Result<Option<Message>, StoreError>
where
    S: MessageStore + ?Sized,
{
    Ok(store
        .query_messages(&MessageFilter::between(a, b), SortOrder::NewestFirst, Some(1))?
        .into_iter()
        .next())
}

/// Most recent case id carried anywhere in the thread.
pub fn latest_case_id<S>(store: &S, a: &UserId, b: &UserId) -> Result<Option<CaseId>, StoreError>
where
    S: MessageStore + ?Sized,
{
    Ok(store
        .query_messages(&MessageFilter::between(a, b), SortOrder::NewestFirst, None)?
        .into_iter()
        .find_map(|message| message.case_id))
}
