use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use super::audit::AccessContext;
use super::auth::{require_admin, Session, TokenAuthority};
use super::domain::{ReportId, ReportStatus, UserId};
use super::error::ModerationError;
use super::reports::{Escalation, NewReport, ReportUpdate, DEFAULT_PAGE_SIZE};
use super::service::ModerationService;
use super::store::{ModerationStore, ReportQuery};

/// Shared handler state: the service plus the bearer-token verifier.
pub struct ModerationState<S: ?Sized> {
    pub service: Arc<ModerationService<S>>,
    pub tokens: Arc<TokenAuthority>,
}

impl<S: ?Sized> Clone for ModerationState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            tokens: self.tokens.clone(),
        }
    }
}

/// Router builder exposing the support-case and moderation endpoints.
pub fn moderation_router<S>(
    service: Arc<ModerationService<S>>,
    tokens: Arc<TokenAuthority>,
) -> Router
where
    S: ModerationStore + ?Sized + 'static,
{
    Router::new()
        .route("/case/close", post(close_case_handler::<S>))
        .route("/report/create", post(create_report_handler::<S>))
        .route("/report/escalate", post(escalate_handler::<S>))
        .route(
            "/report/update",
            post(update_report_handler::<S>).put(update_report_handler::<S>),
        )
        .route("/reports", get(list_reports_handler::<S>))
        .route("/conversation/status", post(conversation_status_handler::<S>))
        .route("/messages", post(send_message_handler::<S>))
        .route("/conversations", get(conversations_handler::<S>))
        .route(
            "/conversations/:counterpart_id/messages",
            get(thread_handler::<S>),
        )
        .route(
            "/conversations/:counterpart_id/read",
            post(mark_read_handler::<S>),
        )
        .route("/maintenance/reclassify", post(reclassify_handler::<S>))
        .route("/maintenance/follow-ups", post(follow_ups_handler::<S>))
        .with_state(ModerationState { service, tokens })
}

impl IntoResponse for ModerationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "moderation request failed");
        }
        let mut payload = json!({ "error": self.to_string() });
        if let Some(details) = self.details() {
            payload["details"] = Value::String(details);
        }
        (status, Json(payload)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CloseCaseBody {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CreateReportBody {
    #[serde(default)]
    reported_user_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EscalateBody {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    reported_user_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    support_case_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UpdateReportBody {
    #[serde(default)]
    report_id: Option<String>,
    #[serde(flatten)]
    update: ReportUpdate,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReportsParams {
    status: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConversationStatusBody {
    #[serde(default)]
    recipient_id: Option<String>,
    #[serde(default)]
    conversation_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SendMessageBody {
    #[serde(default)]
    recipient_id: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ConversationsParams {
    counterpart_id: Option<String>,
}

fn authenticate<S: ?Sized>(state: &ModerationState<S>, headers: &HeaderMap) -> Result<Session, ModerationError> {
    Ok(state.tokens.authenticate(headers)?)
}

fn access_context(headers: &HeaderMap) -> AccessContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    AccessContext {
        ip_address: header("x-forwarded-for")
            .and_then(|forwarded| forwarded.split(',').next().map(|ip| ip.trim().to_string())),
        user_agent: header("user-agent"),
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ModerationError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ModerationError::validation_with("invalid request body", rejection.body_text()))
}

fn required(value: Option<String>, field: &str) -> Result<String, ModerationError> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| ModerationError::validation(format!("{field} is required")))
}

pub(crate) async fn close_case_handler<S>(
    State(state): State<ModerationState<S>>,
    headers: HeaderMap,
    payload: Result<Json<CloseCaseBody>, JsonRejection>,
) -> Response
where
    S: ModerationStore + ?Sized + 'static,
{
    let outcome = (|| -> Result<_, ModerationError> {
        let session = authenticate(&state, &headers)?;
        require_admin(&session)?;
        let body = json_body(payload)?;
        let user_id = UserId::new(required(body.user_id, "user_id")?);
        state
            .service
            .close_case(&session, &user_id, &access_context(&headers))
    })();
    match outcome {
        Ok(closure) => {
            let payload = json!({
                "success": true,
                "closed_messages": closure.closed_messages,
                "case_id": closure.case_id,
                "partial": closure.partial,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn create_report_handler<S>(
    State(state): State<ModerationState<S>>,
    headers: HeaderMap,
    payload: Result<Json<CreateReportBody>, JsonRejection>,
) -> Response
where
    S: ModerationStore + ?Sized + 'static,
{
    let outcome = (|| -> Result<_, ModerationError> {
        let session = authenticate(&state, &headers)?;
        let body = json_body(payload)?;
        let request = NewReport {
            reported_user_id: UserId::new(required(body.reported_user_id, "reported_user_id")?),
            reason: required(body.reason, "reason")?,
            description: body.description,
        };
        state.service.create_report(&session, request)
    })();
    match outcome {
        Ok(report) => {
            let payload = json!({
                "success": true,
                "report_id": report.id,
                "created_at": report.created_at,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn escalate_handler<S>(
    State(state): State<ModerationState<S>>,
    headers: HeaderMap,
    payload: Result<Json<EscalateBody>, JsonRejection>,
) -> Response
where
    S: ModerationStore + ?Sized + 'static,
{
    let outcome = (|| -> Result<_, ModerationError> {
        let session = authenticate(&state, &headers)?;
        let body = json_body(payload)?;
        let request = Escalation {
            user_id: UserId::new(required(body.user_id, "user_id")?),
            reported_user_id: UserId::new(required(body.reported_user_id, "reported_user_id")?),
            reason: required(body.reason, "reason")?,
            description: body.description,
            support_case_id: body.support_case_id,
        };
        state
            .service
            .escalate(&session, request, &access_context(&headers))
    })();
    match outcome {
        Ok(report) => {
            let payload = json!({
                "success": true,
                "report_id": report.id,
                "created_at": report.created_at,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn update_report_handler<S>(
    State(state): State<ModerationState<S>>,
    headers: HeaderMap,
    payload: Result<Json<UpdateReportBody>, JsonRejection>,
) -> Response
where
    S: ModerationStore + ?Sized + 'static,
{
    let outcome = (|| -> Result<_, ModerationError> {
        let session = authenticate(&state, &headers)?;
        let body = json_body(payload)?;
        let report_id = ReportId::new(required(body.report_id, "report_id")?);
        state
            .service
            .update_report(&session, &report_id, body.update, &access_context(&headers))
    })();
    match outcome {
        Ok(report) => {
            (StatusCode::OK, Json(json!({ "success": true, "report": report }))).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn list_reports_handler<S>(
    State(state): State<ModerationState<S>>,
    headers: HeaderMap,
    params: Result<Query<ReportsParams>, QueryRejection>,
) -> Response
where
    S: ModerationStore + ?Sized + 'static,
{
    let outcome = (|| -> Result<_, ModerationError> {
        let session = authenticate(&state, &headers)?;
        let Query(params) = params.map_err(|rejection| {
            ModerationError::validation_with("invalid query parameters", rejection.body_text())
        })?;
        let status = params
            .status
            .as_deref()
            .filter(|raw| !raw.is_empty() && *raw != "all")
            .map(|raw| {
                ReportStatus::from_label(raw)
                    .ok_or_else(|| ModerationError::validation("invalid status filter"))
            })
            .transpose()?;
        let query = ReportQuery {
            status,
            limit: params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
            offset: params.offset.unwrap_or(0),
        };
        state
            .service
            .list_reports(&session, query, &access_context(&headers))
    })();
    match outcome {
        Ok(listing) => (StatusCode::OK, Json(listing)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn conversation_status_handler<S>(
    State(state): State<ModerationState<S>>,
    headers: HeaderMap,
    payload: Result<Json<ConversationStatusBody>, JsonRejection>,
) -> Response
where
    S: ModerationStore + ?Sized + 'static,
{
    let outcome = (|| -> Result<_, ModerationError> {
        let session = authenticate(&state, &headers)?;
        let body = json_body(payload)?;
        let recipient_id = UserId::new(required(body.recipient_id, "recipient_id")?);
        let conversation_type = required(body.conversation_type, "conversation_type")?;
        state
            .service
            .conversation_status(&session, &recipient_id, &conversation_type)
    })();
    match outcome {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn send_message_handler<S>(
    State(state): State<ModerationState<S>>,
    headers: HeaderMap,
    payload: Result<Json<SendMessageBody>, JsonRejection>,
) -> Response
where
    S: ModerationStore + ?Sized + 'static,
{
    let outcome = (|| -> Result<_, ModerationError> {
        let session = authenticate(&state, &headers)?;
        let body = json_body(payload)?;
        let recipient_id = UserId::new(required(body.recipient_id, "recipient_id")?);
        let content = required(body.content, "content")?;
        state.service.send_message(&session, &recipient_id, &content)
    })();
    match outcome {
        Ok(message) => {
            (StatusCode::CREATED, Json(json!({ "success": true, "message": message })))
                .into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn conversations_handler<S>(
    State(state): State<ModerationState<S>>,
    headers: HeaderMap,
    params: Result<Query<ConversationsParams>, QueryRejection>,
) -> Response
where
    S: ModerationStore + ?Sized + 'static,
{
    let outcome = (|| -> Result<_, ModerationError> {
        let session = authenticate(&state, &headers)?;
        let Query(params) = params.map_err(|rejection| {
            ModerationError::validation_with("invalid query parameters", rejection.body_text())
        })?;
        let counterpart = params
            .counterpart_id
            .filter(|raw| !raw.trim().is_empty())
            .map(UserId::new);
        state.service.conversations(&session, counterpart.as_ref())
    })();
    match outcome {
        Ok(conversations) => {
            (StatusCode::OK, Json(json!({ "conversations": conversations }))).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn thread_handler<S>(
    State(state): State<ModerationState<S>>,
    headers: HeaderMap,
    Path(counterpart_id): Path<String>,
) -> Response
where
    S: ModerationStore + ?Sized + 'static,
{
    let counterpart = UserId::new(counterpart_id);
    let outcome = authenticate(&state, &headers)
        .and_then(|session| state.service.thread(&session, &counterpart));
    match outcome {
        Ok(messages) => (StatusCode::OK, Json(json!({ "messages": messages }))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn mark_read_handler<S>(
    State(state): State<ModerationState<S>>,
    headers: HeaderMap,
    Path(counterpart_id): Path<String>,
) -> Response
where
    S: ModerationStore + ?Sized + 'static,
{
    let counterpart = UserId::new(counterpart_id);
    let outcome = authenticate(&state, &headers)
        .and_then(|session| state.service.mark_read(&session, &counterpart));
    match outcome {
        Ok(marked) => {
            (StatusCode::OK, Json(json!({ "success": true, "marked_read": marked }))).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn reclassify_handler<S>(
    State(state): State<ModerationState<S>>,
    headers: HeaderMap,
) -> Response
where
    S: ModerationStore + ?Sized + 'static,
{
    let outcome = authenticate(&state, &headers)
        .and_then(|session| state.service.reclassify(&session));
    match outcome {
        Ok(summary) => {
            let payload = json!({
                "success": true,
                "marker_corrections": summary.marker_corrections,
                "admin_thread_corrections": summary.admin_thread_corrections,
                "reopened": summary.reopened,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn follow_ups_handler<S>(
    State(state): State<ModerationState<S>>,
    headers: HeaderMap,
) -> Response
where
    S: ModerationStore + ?Sized + 'static,
{
    let outcome = authenticate(&state, &headers)
        .and_then(|session| state.service.retry_follow_ups(&session));
    match outcome {
        Ok(sweep) => (StatusCode::OK, Json(sweep)).into_response(),
        Err(err) => err.into_response(),
    }
}
