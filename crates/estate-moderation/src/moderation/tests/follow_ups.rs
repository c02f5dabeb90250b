use super::common::*;
use crate::moderation::domain::{CaseStatus, ConversationType, MessageKind, ReportReason};
use crate::moderation::follow_up::{FollowUp, FollowUpDispatcher, CLOSURE_NOTICE};
use crate::moderation::reports::NewReport;
use crate::moderation::ModerationSettings;
use std::sync::Arc;

#[test]
fn closure_notice_is_parked_and_retried() {
    let (service, store) = build_flaky_service();
    service
        .send_message(&user(BUYER), &uid(ADMIN), "listing photos missing")
        .expect("delivered");
    store.fail_inserts(true);

    let closure = service
        .close_case(&admin(), &uid(BUYER), &context())
        .expect("close does not depend on the notice");
    assert_eq!(closure.closed_messages, 1);
    assert_eq!(service.pending_follow_ups(), 1);

    store.fail_inserts(false);
    let sweep = service.sweep_follow_ups();
    assert_eq!(sweep.retried, 1);
    assert_eq!(sweep.completed, 1);
    assert_eq!(sweep.remaining, 0);
    assert!(store
        .inner
        .messages()
        .iter()
        .any(|message| message.content == CLOSURE_NOTICE));
}

#[test]
fn late_closure_notice_does_not_reclose_a_reopened_case() {
    let (service, store) = build_flaky_service();
    service
        .send_message(&user(BUYER), &uid(ADMIN), "listing photos missing")
        .expect("delivered");
    store.fail_inserts(true);
    let closure = service
        .close_case(&admin(), &uid(BUYER), &context())
        .expect("closed");
    store.fail_inserts(false);

    service
        .send_message(&user(BUYER), &uid(ADMIN), "one more thing")
        .expect("delivered");
    let sweep = service.sweep_follow_ups();
    assert_eq!(sweep.completed, 1);

    let notice = store
        .inner
        .messages()
        .into_iter()
        .find(|message| message.content == CLOSURE_NOTICE)
        .expect("notice delivered on retry");
    assert_eq!(notice.created_at, closure.closed_at);

    let latest = latest_message(&store.inner, BUYER, ADMIN);
    assert_eq!(latest.content, "one more thing");
    assert_eq!(latest.case_status, Some(CaseStatus::Open));
    let status = service
        .conversation_status(&user(BUYER), &uid(ADMIN), "user_to_admin")
        .expect("status");
    assert!(!status.is_closed);
}

#[test]
fn failed_reopen_never_blocks_delivery() {
    let (service, store) = build_flaky_service();
    service
        .send_message(&user(BUYER), &uid(ADMIN), "first")
        .expect("delivered");
    service
        .close_case(&admin(), &uid(BUYER), &context())
        .expect("closed");
    store.fail_reopens(true);

    let delivered = service
        .send_message(&user(BUYER), &uid(ADMIN), "are you there?")
        .expect("delivery succeeds without the reopen");
    assert_eq!(delivered.case_status, Some(CaseStatus::Open));
    assert_eq!(service.pending_follow_ups(), 1);
    assert!(store
        .inner
        .messages()
        .iter()
        .any(|message| message.case_status == Some(CaseStatus::Closed)));

    store.fail_reopens(false);
    let sweep = service.sweep_follow_ups();
    assert_eq!(sweep.completed, 1);
    assert!(store
        .inner
        .messages()
        .iter()
        .all(|message| message.case_status == Some(CaseStatus::Open)));
}

#[test]
fn follow_ups_are_abandoned_after_the_attempt_budget() {
    let store = Arc::new(FlakyStore::new());
    let dispatcher = FollowUpDispatcher::new(store.clone(), 2);
    store.fail_inserts(true);

    let delivered = dispatcher.dispatch(FollowUp::ClosureNotice {
        admin_id: uid(ADMIN),
        user_id: uid(BUYER),
        case_id: None,
        closed_at: at(0),
    });
    assert!(!delivered);
    assert_eq!(dispatcher.pending(), 1);

    let sweep = dispatcher.retry_pending();
    assert_eq!(sweep.abandoned, 1);
    assert_eq!(sweep.remaining, 0);
    assert!(store.inner.messages().is_empty());
}

#[test]
fn retry_requires_an_admin_session() {
    let (service, _) = build_service();
    assert!(service.retry_follow_ups(&user(BUYER)).is_err());
    assert_eq!(
        service.retry_follow_ups(&admin()).expect("admin sweep").retried,
        0
    );
}

#[test]
fn report_notice_lands_in_the_support_inbox_and_reopens() {
    let (service, store) = build_service_with(ModerationSettings {
        support_admin_id: Some(uid(ADMIN)),
        ..settings()
    });
    service
        .send_message(&user(BUYER), &uid(ADMIN), "earlier question")
        .expect("delivered");
    service
        .close_case(&admin(), &uid(BUYER), &context())
        .expect("closed");

    let report = service
        .create_report(
            &user(BUYER),
            NewReport {
                reported_user_id: uid(AGENT),
                reason: "fake_listing".to_string(),
                description: Some("photos are from another city".to_string()),
            },
        )
        .expect("report created");

    let notice = latest_message(&store, BUYER, ADMIN);
    assert_eq!(notice.message_kind, MessageKind::SystemReport);
    assert_eq!(notice.conversation_type, ConversationType::UserToAdmin);
    assert!(notice.content.contains(report.id.as_str()));
    assert!(notice.content.contains(ReportReason::FakeListing.label()));
    assert!(store
        .messages()
        .iter()
        .all(|message| message.case_status == Some(CaseStatus::Open)));
}
