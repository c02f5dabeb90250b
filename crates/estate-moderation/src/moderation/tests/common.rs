use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use axum::Router;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::moderation::domain::{
    AdminAccessLogEntry, CaseStatus, ConversationType, Message, Report, ReportId, Role,
    UserAccount, UserId,
};
use crate::moderation::store::{
    AccessLogStore, MemoryStore, MessageFilter, MessagePatch, MessageStore, ReportCounts,
    ReportQuery, ReportStore, SortOrder, StoreError, UserDirectory,
};
use crate::moderation::{
    moderation_router, AccessContext, ModerationService, ModerationSettings, Session,
    TokenAuthority,
};

pub(super) const ADMIN: &str = "a1";
pub(super) const BUYER: &str = "u1";
pub(super) const AGENT: &str = "u2";
pub(super) const SELLER: &str = "u3";

pub(super) fn accounts() -> Vec<UserAccount> {
    vec![
        UserAccount::new(ADMIN, "Support Desk", Role::Admin),
        UserAccount::new(BUYER, "Dana Buyer", Role::User),
        UserAccount::new(AGENT, "Lee Agent", Role::User),
        UserAccount::new(SELLER, "Sam Seller", Role::User),
    ]
}

pub(super) fn uid(raw: &str) -> UserId {
    UserId::new(raw)
}

pub(super) fn admin() -> Session {
    Session::new(ADMIN, Role::Admin)
}

pub(super) fn user(raw: &str) -> Session {
    Session::new(raw, Role::User)
}

pub(super) fn context() -> AccessContext {
    AccessContext {
        ip_address: Some("203.0.113.7".to_string()),
        user_agent: Some("moderation-tests".to_string()),
    }
}

pub(super) fn settings() -> ModerationSettings {
    ModerationSettings {
        support_admin_id: None,
        read_attempts: 2,
        follow_up_max_attempts: 3,
    }
}

pub(super) fn build_service() -> (ModerationService<MemoryStore>, Arc<MemoryStore>) {
    build_service_with(settings())
}

pub(super) fn build_service_with(
    settings: ModerationSettings,
) -> (ModerationService<MemoryStore>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_users(accounts()));
    (ModerationService::new(store.clone(), settings), store)
}

pub(super) fn build_flaky_service() -> (ModerationService<FlakyStore>, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::new());
    (ModerationService::new(store.clone(), settings()), store)
}

pub(super) fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap() + Duration::minutes(minutes)
}

pub(super) fn chat(sender: &str, recipient: &str, content: &str, minutes: i64) -> Message {
    Message::new(
        uid(sender),
        uid(recipient),
        content,
        ConversationType::UserToUser,
        at(minutes),
    )
}

pub(super) fn latest_message(store: &MemoryStore, a: &str, b: &str) -> Message {
    store
        .query_messages(
            &MessageFilter::between(&uid(a), &uid(b)),
            SortOrder::NewestFirst,
            Some(1),
        )
        .expect("query succeeds")
        .into_iter()
        .next()
        .expect("thread has messages")
}

pub(super) fn audit_entries(store: &MemoryStore, report_id: &ReportId) -> Vec<AdminAccessLogEntry> {
    store
        .access_logs(Some(report_id))
        .expect("access logs readable")
}

/// Memory store with switchable faults.
pub(super) struct FlakyStore {
    pub(super) inner: MemoryStore,
    failing_directions: Mutex<Vec<(UserId, UserId)>>,
    fail_inserts: AtomicBool,
    fail_reopens: AtomicBool,
    fail_access_logs: AtomicBool,
    transient_reads: AtomicU32,
}

impl FlakyStore {
    pub(super) fn new() -> Self {
        Self {
            inner: MemoryStore::with_users(accounts()),
            failing_directions: Mutex::new(Vec::new()),
            fail_inserts: AtomicBool::new(false),
            fail_reopens: AtomicBool::new(false),
            fail_access_logs: AtomicBool::new(false),
            transient_reads: AtomicU32::new(0),
        }
    }

    pub(super) fn fail_direction(&self, sender: &str, recipient: &str) {
        self.failing_directions
            .lock()
            .unwrap()
            .push((uid(sender), uid(recipient)));
    }

    pub(super) fn fail_inserts(&self, enabled: bool) {
        self.fail_inserts.store(enabled, Ordering::SeqCst);
    }

    pub(super) fn fail_reopens(&self, enabled: bool) {
        self.fail_reopens.store(enabled, Ordering::SeqCst);
    }

    pub(super) fn fail_access_logs(&self, enabled: bool) {
        self.fail_access_logs.store(enabled, Ordering::SeqCst);
    }

    pub(super) fn fail_next_reads(&self, count: u32) {
        self.transient_reads.store(count, Ordering::SeqCst);
    }

    fn take_transient_read(&self) -> bool {
        self.transient_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl MessageStore for FlakyStore {
    fn insert_message(&self, message: Message) -> Result<Message, StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("messages.insert", "injected fault"));
        }
        self.inner.insert_message(message)
    }

    fn query_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError> {
        if self.take_transient_read() {
            return Err(StoreError::unavailable("messages.query", "injected timeout"));
        }
        self.inner.query_messages(filter, order, limit)
    }

    fn update_messages(
        &self,
        filter: &MessageFilter,
        patch: &MessagePatch,
    ) -> Result<usize, StoreError> {
        if let (Some(sender), Some(recipient)) = (&filter.sender_id, &filter.recipient_id) {
            let failing = self.failing_directions.lock().unwrap();
            if failing
                .iter()
                .any(|(s, r)| s == sender && r == recipient)
            {
                return Err(StoreError::unavailable("messages.update", "injected fault"));
            }
        }
        if patch.case_status == Some(CaseStatus::Open) && self.fail_reopens.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("messages.update", "injected fault"));
        }
        self.inner.update_messages(filter, patch)
    }
}

impl ReportStore for FlakyStore {
    fn insert_report(&self, report: Report) -> Result<Report, StoreError> {
        self.inner.insert_report(report)
    }

    fn fetch_report(&self, id: &ReportId) -> Result<Option<Report>, StoreError> {
        self.inner.fetch_report(id)
    }

    fn active_report_for(
        &self,
        reporter_id: &UserId,
        reported_user_id: &UserId,
    ) -> Result<Option<Report>, StoreError> {
        self.inner.active_report_for(reporter_id, reported_user_id)
    }

    fn update_report(&self, report: &Report) -> Result<(), StoreError> {
        self.inner.update_report(report)
    }

    fn list_reports(&self, query: &ReportQuery) -> Result<Vec<Report>, StoreError> {
        self.inner.list_reports(query)
    }

    fn report_counts(&self) -> Result<ReportCounts, StoreError> {
        self.inner.report_counts()
    }
}

impl AccessLogStore for FlakyStore {
    fn append_access_log(&self, entry: AdminAccessLogEntry) -> Result<(), StoreError> {
        if self.fail_access_logs.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("admin_access_logs.append", "injected fault"));
        }
        self.inner.append_access_log(entry)
    }

    fn access_logs(
        &self,
        report_id: Option<&ReportId>,
    ) -> Result<Vec<AdminAccessLogEntry>, StoreError> {
        self.inner.access_logs(report_id)
    }
}

impl UserDirectory for FlakyStore {
    fn fetch_user(&self, id: &UserId) -> Result<Option<UserAccount>, StoreError> {
        self.inner.fetch_user(id)
    }

    fn admin_ids(&self) -> Result<Vec<UserId>, StoreError> {
        self.inner.admin_ids()
    }

    fn upsert_user(&self, account: UserAccount) -> Result<(), StoreError> {
        self.inner.upsert_user(account)
    }
}

pub(super) const TEST_SECRET: &[u8] = b"moderation-test-secret";

pub(super) fn tokens() -> TokenAuthority {
    TokenAuthority::from_secret(TEST_SECRET, 30)
}

pub(super) fn bearer(raw: &str, role: Role) -> String {
    let token = tokens().issue(&uid(raw), role).expect("token issues");
    format!("Bearer {token}")
}

pub(super) fn router_with_store() -> (Router, Arc<MemoryStore>) {
    let (service, store) = build_service();
    (
        moderation_router(Arc::new(service), Arc::new(tokens())),
        store,
    )
}

pub(super) fn json_request(
    method: Method,
    uri: &str,
    authorization: Option<&str>,
    body: &Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

pub(super) fn get_request(uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
