//! Contract checks for the SQLite backend: uniqueness, ordering, filters, and patches
//! behave the way the in-memory store does.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};

use estate_moderation::moderation::{
    AccessType, AdminAccessLogEntry, CaseId, CaseStatus, ConversationType, Message, MessageFilter,
    MessageKind, MessagePatch, MessageStore, Report, ReportId, ReportQuery, ReportReason,
    ReportStatus, Role, SortOrder, SqliteStore, StoreError, UserAccount, UserId, REPORT_MARKER,
};
use estate_moderation::moderation::store::{AccessLogStore, ReportStore, UserDirectory};

fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn uid(raw: &str) -> UserId {
    UserId::new(raw)
}

fn message(sender: &str, recipient: &str, content: &str, minutes: i64) -> Message {
    Message::new(
        uid(sender),
        uid(recipient),
        content,
        ConversationType::UserToUser,
        at(minutes),
    )
}

fn report(reporter: &str, reported: &str, status: ReportStatus, minutes: i64) -> Report {
    Report {
        id: ReportId::generate(),
        reporter_id: uid(reporter),
        reported_user_id: uid(reported),
        reason: ReportReason::Spam,
        description: None,
        status,
        assigned_admin_id: None,
        resolution_notes: None,
        created_at: at(minutes),
        updated_at: at(minutes),
        resolved_at: None,
    }
}

fn store() -> SqliteStore {
    SqliteStore::open_in_memory().expect("in-memory sqlite opens")
}

#[test]
fn messages_round_trip_every_column() {
    let store = store();
    let mut original = message("u1", "a1", "[REPORT] spam", 1)
        .with_kind(MessageKind::SystemReport)
        .with_case(Some(CaseId::new("case-1")), CaseStatus::Closed);
    original.closed_at = Some(at(2));
    original.closed_by = Some(uid("a1"));
    original.read_at = Some(at(3));
    store.insert_message(original.clone()).expect("insert");

    let fetched = store
        .query_messages(&MessageFilter::default(), SortOrder::OldestFirst, None)
        .expect("query");
    assert_eq!(fetched, vec![original]);
}

#[test]
fn identical_timestamps_keep_insertion_order() {
    let store = store();
    for content in ["first", "second", "third"] {
        store.insert_message(message("u1", "u2", content, 5)).expect("insert");
    }

    let newest_first = store
        .query_messages(
            &MessageFilter::between(&uid("u2"), &uid("u1")),
            SortOrder::NewestFirst,
            None,
        )
        .expect("query");
    let contents: Vec<&str> = newest_first.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
}

#[test]
fn filters_and_patches_match_the_memory_semantics() {
    let store = store();
    store.insert_message(message("u1", "a1", "hello", 1)).expect("insert");
    store.insert_message(message("a1", "u1", "hi", 2)).expect("insert");
    store
        .insert_message(message("u2", "u3", &format!("{REPORT_MARKER} listing"), 3))
        .expect("insert");

    let closed = store
        .update_messages(
            &MessageFilter::direction(&uid("a1"), &uid("u1")),
            &MessagePatch::close(&uid("a1"), at(10)),
        )
        .expect("update");
    assert_eq!(closed, 1);

    let closed_rows = store
        .query_messages(
            &MessageFilter::participant(&uid("u1")).with_case_status(CaseStatus::Closed),
            SortOrder::OldestFirst,
            None,
        )
        .expect("query");
    assert_eq!(closed_rows.len(), 1);
    assert_eq!(closed_rows[0].closed_at, Some(at(10)));

    let signature = store
        .query_messages(
            &MessageFilter::report_signature(REPORT_MARKER)
                .excluding_type(ConversationType::UserToAdmin),
            SortOrder::OldestFirst,
            None,
        )
        .expect("query");
    assert_eq!(signature.len(), 1);

    let admin_threads = store
        .query_messages(
            &MessageFilter::involving_any(vec![uid("a1")]),
            SortOrder::NewestFirst,
            Some(1),
        )
        .expect("query");
    assert_eq!(admin_threads[0].content, "hi");

    let nobody = store
        .query_messages(&MessageFilter::involving_any(Vec::new()), SortOrder::OldestFirst, None)
        .expect("query");
    assert!(nobody.is_empty());

    let unread = store
        .update_messages(
            &MessageFilter::direction(&uid("a1"), &uid("u1")).unread_by(&uid("u1")),
            &MessagePatch {
                read_at: Some(at(11)),
                ..MessagePatch::default()
            },
        )
        .expect("update");
    assert_eq!(unread, 1);
}

#[test]
fn partial_unique_index_allows_one_active_report_per_pair() {
    let store = store();
    store
        .insert_report(report("u1", "u2", ReportStatus::Pending, 1))
        .expect("first active report");

    let err = store
        .insert_report(report("u1", "u2", ReportStatus::Reviewing, 2))
        .expect_err("second active report");
    assert!(matches!(err, StoreError::Conflict { .. }));

    store
        .insert_report(report("u1", "u2", ReportStatus::Dismissed, 3))
        .expect("terminal reports are not constrained");
    store
        .insert_report(report("u2", "u1", ReportStatus::Pending, 4))
        .expect("reverse pair is independent");

    let counts = store.report_counts().expect("counts");
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.dismissed, 1);
    assert_eq!(counts.total, 3);
}

#[test]
fn report_updates_and_listing() {
    let store = store();
    let mut stored = store
        .insert_report(report("u1", "u2", ReportStatus::Pending, 1))
        .expect("insert");
    store
        .insert_report(report("u3", "u2", ReportStatus::Pending, 2))
        .expect("insert");

    stored.status = ReportStatus::Resolved;
    stored.resolved_at = Some(at(5));
    stored.resolution_notes = Some("ok".to_string());
    store.update_report(&stored).expect("update");
    assert_eq!(
        store.fetch_report(&stored.id).expect("fetch"),
        Some(stored.clone())
    );
    assert!(store
        .active_report_for(&uid("u1"), &uid("u2"))
        .expect("lookup")
        .is_none());

    let missing = report("u9", "u2", ReportStatus::Pending, 9);
    assert!(matches!(
        store.update_report(&missing),
        Err(StoreError::NotFound { .. })
    ));

    let page = store
        .list_reports(&ReportQuery {
            status: None,
            limit: 1,
            offset: 0,
        })
        .expect("list");
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].reporter_id, uid("u3"));

    let resolved = store
        .list_reports(&ReportQuery {
            status: Some(ReportStatus::Resolved),
            ..ReportQuery::default()
        })
        .expect("list");
    assert_eq!(resolved, vec![stored]);
}

#[test]
fn users_and_access_logs_persist() {
    let store = store();
    store
        .upsert_user(UserAccount::new("a1", "Support", Role::Admin))
        .expect("upsert");
    store
        .upsert_user(UserAccount::new("u1", "Dana", Role::User))
        .expect("upsert");
    store
        .upsert_user(UserAccount::new("u1", "Dana B.", Role::User))
        .expect("upsert overwrites");

    assert_eq!(store.admin_ids().expect("admins"), vec![uid("a1")]);
    assert_eq!(
        store.fetch_user(&uid("u1")).expect("fetch").map(|u| u.display_name),
        Some("Dana B.".to_string())
    );
    assert_eq!(store.fetch_user(&uid("ghost")).expect("fetch"), None);

    let report_id = ReportId::new("rpt-1");
    let entry = AdminAccessLogEntry {
        admin_id: uid("a1"),
        user_id: Some(uid("u1")),
        report_id: Some(report_id.clone()),
        access_type: AccessType::ResolveReport,
        access_reason: "resolved".to_string(),
        ip_address: Some("198.51.100.4".to_string()),
        user_agent: None,
        created_at: at(1),
    };
    store.append_access_log(entry.clone()).expect("append");
    store
        .append_access_log(AdminAccessLogEntry {
            report_id: None,
            access_type: AccessType::ViewReportQueue,
            ..entry.clone()
        })
        .expect("append");

    assert_eq!(store.access_logs(Some(&report_id)).expect("logs"), vec![entry]);
    assert_eq!(store.access_logs(None).expect("logs").len(), 2);
}

#[test]
fn file_backed_store_survives_reopen() {
    let path = std::env::temp_dir().join(format!("estate-moderation-{}.db", uuid::Uuid::new_v4()));
    {
        let store = SqliteStore::open(&path, StdDuration::from_millis(250)).expect("open");
        store.insert_message(message("u1", "u2", "persisted", 1)).expect("insert");
    }
    let reopened = SqliteStore::open(&path, StdDuration::from_millis(250)).expect("reopen");
    let messages = reopened
        .query_messages(&MessageFilter::default(), SortOrder::OldestFirst, None)
        .expect("query");
    assert_eq!(messages.len(), 1);
    drop(reopened);
    let _ = std::fs::remove_file(&path);
}
