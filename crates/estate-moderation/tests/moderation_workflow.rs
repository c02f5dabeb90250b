//! End-to-end moderation scenarios against the SQLite backend.
//!
//! Everything goes through the public service facade or the HTTP router so the
//! scenarios exercise the same wiring the API binary uses.

mod common {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use axum::response::Response;
    use serde_json::Value;

    use estate_moderation::moderation::store::UserDirectory;
    use estate_moderation::moderation::{
        ModerationService, ModerationSettings, Role, Session, SqliteStore, TokenAuthority,
        UserAccount, UserId,
    };

    pub(super) const SECRET: &[u8] = b"workflow-secret";

    pub(super) fn sqlite_service(
        support_admin: Option<&str>,
    ) -> (Arc<ModerationService<SqliteStore>>, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().expect("sqlite opens"));
        for account in [
            UserAccount::new("a1", "Support Desk", Role::Admin),
            UserAccount::new("r", "Riley Reporter", Role::User),
            UserAccount::new("t", "Taylor Target", Role::User),
            UserAccount::new("u1", "Dana Buyer", Role::User),
        ] {
            store.upsert_user(account).expect("seed user");
        }
        let settings = ModerationSettings {
            support_admin_id: support_admin.map(UserId::new),
            ..ModerationSettings::default()
        };
        (
            Arc::new(ModerationService::new(store.clone(), settings)),
            store,
        )
    }

    pub(super) fn admin() -> Session {
        Session::new("a1", Role::Admin)
    }

    pub(super) fn user(raw: &str) -> Session {
        Session::new(raw, Role::User)
    }

    pub(super) fn bearer(raw: &str, role: Role) -> String {
        let token = TokenAuthority::from_secret(SECRET, 15)
            .issue(&UserId::new(raw), role)
            .expect("token issues");
        format!("Bearer {token}")
    }

    pub(super) fn post(uri: &str, authorization: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, authorization)
            .body(Body::from(body.to_string()))
            .expect("request builds")
    }

    pub(super) async fn read_json_body(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&body).expect("json payload")
    }
}

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use common::*;
use estate_moderation::moderation::store::AccessLogStore;
use estate_moderation::moderation::{
    moderation_router, AccessContext, AccessType, CaseStatus, ConversationType, CorrectionSummary,
    Message, MessageFilter, MessageStore, ModerationError, NewReport, ReportStatus, ReportUpdate,
    Role, SortOrder, TokenAuthority, UserId,
};

fn thread(store: &impl MessageStore, a: &str, b: &str) -> Vec<Message> {
    store
        .query_messages(
            &MessageFilter::between(&UserId::new(a), &UserId::new(b)),
            SortOrder::OldestFirst,
            None,
        )
        .expect("thread readable")
}

#[test]
fn resolve_scenario_records_one_audit_entry() {
    let (service, store) = sqlite_service(None);
    let report = service
        .create_report(
            &user("r"),
            NewReport {
                reported_user_id: UserId::new("t"),
                reason: "spam".to_string(),
                description: None,
            },
        )
        .expect("report filed");
    assert_eq!(report.status, ReportStatus::Pending);

    let resolved = service
        .update_report(
            &admin(),
            &report.id,
            ReportUpdate {
                status: Some("resolved".to_string()),
                resolution_notes: Some("ok".to_string()),
                assign_to_me: false,
            },
            &AccessContext::default(),
        )
        .expect("resolved");
    assert_eq!(resolved.status, ReportStatus::Resolved);
    assert!(resolved.resolved_at.is_some());

    let entries = store.access_logs(Some(&report.id)).expect("logs");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].access_type, AccessType::ResolveReport);
}

#[test]
fn duplicate_reports_are_blocked_by_the_store_and_the_pre_check() {
    let (service, _) = sqlite_service(None);
    let request = || NewReport {
        reported_user_id: UserId::new("t"),
        reason: "harassment".to_string(),
        description: Some("repeated calls at night".to_string()),
    };
    service.create_report(&user("r"), request()).expect("first");
    let err = service
        .create_report(&user("r"), request())
        .expect_err("second active report");
    assert!(matches!(err, ModerationError::DuplicateReport { .. }));
    assert_eq!(err.status_code(), StatusCode::CONFLICT);
}

#[test]
fn corrector_scenario_converges_after_one_pass() {
    let (service, store) = sqlite_service(None);
    let mut misfiled = Message::new(
        UserId::new("u1"),
        UserId::new("a1"),
        "[REPORT] t keeps posting fake listings",
        ConversationType::UserToUser,
        chrono::Utc::now(),
    );
    misfiled.case_status = Some(CaseStatus::Closed);
    store.insert_message(misfiled).expect("seed");

    let first = service.run_corrector().expect("first pass");
    assert_eq!(first.marker_corrections, 1);
    assert_eq!(first.reopened, 1);

    let messages = thread(store.as_ref(), "u1", "a1");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].conversation_type, ConversationType::UserToAdmin);
    assert_eq!(messages[0].case_status, Some(CaseStatus::Open));

    let second = service.run_corrector().expect("second pass");
    assert_eq!(second, CorrectionSummary::default());
    assert_eq!(thread(store.as_ref(), "u1", "a1"), messages);
}

#[test]
fn report_notice_routes_into_the_support_inbox() {
    let (service, store) = sqlite_service(Some("a1"));
    service
        .create_report(
            &user("r"),
            NewReport {
                reported_user_id: UserId::new("t"),
                reason: "fraud".to_string(),
                description: None,
            },
        )
        .expect("report filed");

    let inbox = thread(store.as_ref(), "r", "a1");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].conversation_type, ConversationType::UserToAdmin);
    assert_eq!(inbox[0].case_status, Some(CaseStatus::Open));
    assert!(inbox[0].carries_report_signature());
}

#[tokio::test]
async fn close_and_reopen_over_http() {
    let (service, store) = sqlite_service(None);
    let router = moderation_router(
        service.clone(),
        Arc::new(TokenAuthority::from_secret(SECRET, 15)),
    );

    let response = router
        .clone()
        .oneshot(post(
            "/messages",
            &bearer("u1", Role::User),
            json!({ "recipient_id": "a1", "content": "my deposit never arrived" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = router
        .clone()
        .oneshot(post(
            "/case/close",
            &bearer("a1", Role::Admin),
            json!({ "user_id": "u1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["closed_messages"], 1);

    let response = router
        .clone()
        .oneshot(post(
            "/conversation/status",
            &bearer("u1", Role::User),
            json!({ "recipient_id": "a1", "conversation_type": "user_to_admin" }),
        ))
        .await
        .unwrap();
    assert_eq!(read_json_body(response).await["is_closed"], true);

    router
        .clone()
        .oneshot(post(
            "/messages",
            &bearer("u1", Role::User),
            json!({ "recipient_id": "a1", "content": "still waiting" }),
        ))
        .await
        .unwrap();

    let messages = thread(store.as_ref(), "u1", "a1");
    assert_eq!(messages.len(), 3);
    assert!(messages
        .iter()
        .all(|message| message.case_status == Some(CaseStatus::Open)));
    assert!(messages[..2].iter().all(|message| message.reopened_at.is_some()));

    let response = router
        .oneshot(post(
            "/conversation/status",
            &bearer("u1", Role::User),
            json!({ "recipient_id": "a1", "conversation_type": "user_to_admin" }),
        ))
        .await
        .unwrap();
    assert_eq!(read_json_body(response).await["is_closed"], false);
    assert_eq!(service.pending_follow_ups(), 0);
}
