use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    AccessLogStore, MessageFilter, MessagePatch, MessageStore, ReportCounts, ReportQuery,
    ReportStore, SortOrder, StoreError, UserDirectory,
};
use crate::moderation::domain::{
    AdminAccessLogEntry, Message, Report, ReportId, UserAccount, UserId,
};

#[derive(Default)]
struct Tables {
    messages: Vec<Message>,
    reports: Vec<Report>,
    access_logs: Vec<AdminAccessLogEntry>,
    users: BTreeMap<UserId, UserAccount>,
}

/// Process-local store; every call holds one lock so check-then-insert is atomic.
#[derive(Default, Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn with_users(accounts: impl IntoIterator<Item = UserAccount>) -> Self {
        let store = Self::default();
        {
            let mut tables = store
                .tables
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for account in accounts {
                tables.users.insert(account.id.clone(), account);
            }
        }
        store
    }

    fn tables(&self, operation: &'static str) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::unavailable(operation, "memory store lock poisoned"))
    }

    /// Snapshot of every stored message in insertion order.
    pub fn messages(&self) -> Vec<Message> {
        self.tables("messages.snapshot")
            .map(|tables| tables.messages.clone())
            .unwrap_or_default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.tables("reports.snapshot")
            .map(|tables| tables.reports.clone())
            .unwrap_or_default()
    }
}

impl MessageStore for MemoryStore {
    fn insert_message(&self, message: Message) -> Result<Message, StoreError> {
        let mut tables = self.tables("messages.insert")?;
        if tables.messages.iter().any(|existing| existing.id == message.id) {
            return Err(StoreError::Conflict {
                operation: "messages.insert",
            });
        }
        tables.messages.push(message.clone());
        Ok(message)
    }

    fn query_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError> {
        let tables = self.tables("messages.query")?;
        let mut matched: Vec<Message> = tables
            .messages
            .iter()
            .filter(|message| filter.matches(message))
            .cloned()
            .collect();
        drop(tables);

        match order {
            SortOrder::OldestFirst => matched.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            SortOrder::NewestFirst => matched.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        }
        if let Some(limit) = limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn update_messages(
        &self,
        filter: &MessageFilter,
        patch: &MessagePatch,
    ) -> Result<usize, StoreError> {
        if patch.is_empty() {
            return Ok(0);
        }
        let mut tables = self.tables("messages.update")?;
        let mut touched = 0;
        for message in tables.messages.iter_mut() {
            if filter.matches(message) {
                patch.apply(message);
                touched += 1;
            }
        }
        Ok(touched)
    }
}

impl ReportStore for MemoryStore {
    fn insert_report(&self, report: Report) -> Result<Report, StoreError> {
        let mut tables = self.tables("reports.insert")?;
        let duplicate_id = tables.reports.iter().any(|existing| existing.id == report.id);
        let duplicate_active = report.status.is_active()
            && tables.reports.iter().any(|existing| {
                existing.status.is_active()
                    && existing.reporter_id == report.reporter_id
                    && existing.reported_user_id == report.reported_user_id
            });
        if duplicate_id || duplicate_active {
            return Err(StoreError::Conflict {
                operation: "reports.insert",
            });
        }
        tables.reports.push(report.clone());
        Ok(report)
    }

    fn fetch_report(&self, id: &ReportId) -> Result<Option<Report>, StoreError> {
        let tables = self.tables("reports.fetch")?;
        Ok(tables.reports.iter().find(|report| &report.id == id).cloned())
    }

    fn active_report_for(
        &self,
        reporter_id: &UserId,
        reported_user_id: &UserId,
    ) -> Result<Option<Report>, StoreError> {
        let tables = self.tables("reports.active_for")?;
        Ok(tables
            .reports
            .iter()
            .find(|report| {
                report.status.is_active()
                    && &report.reporter_id == reporter_id
                    && &report.reported_user_id == reported_user_id
            })
            .cloned())
    }

    fn update_report(&self, report: &Report) -> Result<(), StoreError> {
        let mut tables = self.tables("reports.update")?;
        let reactivates_pair = report.status.is_active()
            && tables.reports.iter().any(|existing| {
                existing.id != report.id
                    && existing.status.is_active()
                    && existing.reporter_id == report.reporter_id
                    && existing.reported_user_id == report.reported_user_id
            });
        if reactivates_pair {
            return Err(StoreError::Conflict {
                operation: "reports.update",
            });
        }
        match tables.reports.iter_mut().find(|existing| existing.id == report.id) {
            Some(existing) => {
                *existing = report.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                operation: "reports.update",
            }),
        }
    }

    fn list_reports(&self, query: &ReportQuery) -> Result<Vec<Report>, StoreError> {
        let tables = self.tables("reports.list")?;
        let mut reports: Vec<Report> = tables
            .reports
            .iter()
            .filter(|report| query.status.map_or(true, |status| report.status == status))
            .cloned()
            .collect();
        drop(tables);

        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    fn report_counts(&self) -> Result<ReportCounts, StoreError> {
        let tables = self.tables("reports.counts")?;
        let mut counts = ReportCounts::default();
        for report in &tables.reports {
            counts.record(report.status);
        }
        Ok(counts)
    }
}

impl AccessLogStore for MemoryStore {
    fn append_access_log(&self, entry: AdminAccessLogEntry) -> Result<(), StoreError> {
        let mut tables = self.tables("admin_access_logs.append")?;
        tables.access_logs.push(entry);
        Ok(())
    }

    fn access_logs(
        &self,
        report_id: Option<&ReportId>,
    ) -> Result<Vec<AdminAccessLogEntry>, StoreError> {
        let tables = self.tables("admin_access_logs.list")?;
        Ok(tables
            .access_logs
            .iter()
            .filter(|entry| report_id.map_or(true, |id| entry.report_id.as_ref() == Some(id)))
            .cloned()
            .collect())
    }
}

impl UserDirectory for MemoryStore {
    fn fetch_user(&self, id: &UserId) -> Result<Option<UserAccount>, StoreError> {
        let tables = self.tables("users.fetch")?;
        Ok(tables.users.get(id).cloned())
    }

    fn admin_ids(&self) -> Result<Vec<UserId>, StoreError> {
        let tables = self.tables("users.admins")?;
        Ok(tables
            .users
            .values()
            .filter(|account| account.is_admin())
            .map(|account| account.id.clone())
            .collect())
    }

    fn upsert_user(&self, account: UserAccount) -> Result<(), StoreError> {
        let mut tables = self.tables("users.upsert")?;
        tables.users.insert(account.id.clone(), account);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::domain::{ConversationType, ReportReason, ReportStatus};
    use chrono::{Duration, TimeZone, Utc};

    fn report(reporter: &str, reported: &str, status: ReportStatus) -> Report {
        let now = Utc::now();
        Report {
            id: ReportId::generate(),
            reporter_id: UserId::new(reporter),
            reported_user_id: UserId::new(reported),
            reason: ReportReason::Spam,
            description: None,
            status,
            assigned_admin_id: None,
            resolution_notes: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    #[test]
    fn newest_first_keeps_insertion_order_on_ties() {
        let store = MemoryStore::default();
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        for content in ["first", "second"] {
            store
                .insert_message(Message::new(
                    UserId::new("u1"),
                    UserId::new("u2"),
                    content,
                    ConversationType::UserToUser,
                    at,
                ))
                .expect("insert succeeds");
        }
        store
            .insert_message(Message::new(
                UserId::new("u2"),
                UserId::new("u1"),
                "third",
                ConversationType::UserToUser,
                at + Duration::minutes(1),
            ))
            .expect("insert succeeds");

        let ordered = store
            .query_messages(
                &MessageFilter::participant(&UserId::new("u1")),
                SortOrder::NewestFirst,
                None,
            )
            .expect("query succeeds");
        let contents: Vec<&str> = ordered.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["third", "first", "second"]);
    }

    #[test]
    fn second_active_report_for_pair_conflicts() {
        let store = MemoryStore::default();
        store
            .insert_report(report("r", "t", ReportStatus::Pending))
            .expect("first insert");
        let err = store
            .insert_report(report("r", "t", ReportStatus::Reviewing))
            .expect_err("second active report rejected");
        assert!(matches!(err, StoreError::Conflict { .. }));

        store
            .insert_report(report("r", "t", ReportStatus::Resolved))
            .expect("closed reports are unconstrained");
        assert_eq!(store.reports().len(), 2);
    }
}
