use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};

use super::{
    AccessLogStore, MessageFilter, MessagePatch, MessageStore, ReportCounts, ReportQuery,
    ReportStore, SortOrder, StoreError, UserDirectory,
};
use crate::moderation::domain::{
    AccessType, AdminAccessLogEntry, CaseId, CaseStatus, ConversationType, Message, MessageId,
    MessageKind, Report, ReportId, ReportReason, ReportStatus, Role, UserAccount, UserId,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        display_name TEXT NOT NULL,
        role TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS messages (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        sender_id TEXT NOT NULL,
        recipient_id TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL,
        read_at TEXT,
        conversation_type TEXT NOT NULL,
        case_status TEXT,
        case_id TEXT,
        closed_at TEXT,
        closed_by TEXT,
        reopened_at TEXT,
        message_kind TEXT NOT NULL DEFAULT 'chat'
    );
    CREATE INDEX IF NOT EXISTS messages_pair_created
        ON messages (sender_id, recipient_id, created_at);
    CREATE TABLE IF NOT EXISTS conversation_reports (
        id TEXT PRIMARY KEY,
        reporter_id TEXT NOT NULL,
        reported_user_id TEXT NOT NULL,
        reason TEXT NOT NULL,
        description TEXT,
        status TEXT NOT NULL,
        assigned_admin_id TEXT,
        resolution_notes TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        resolved_at TEXT
    );
    CREATE UNIQUE INDEX IF NOT EXISTS conversation_reports_one_active
        ON conversation_reports (reporter_id, reported_user_id)
        WHERE status IN ('pending', 'reviewing');
    CREATE TABLE IF NOT EXISTS admin_access_logs (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        admin_id TEXT NOT NULL,
        user_id TEXT,
        report_id TEXT,
        access_type TEXT NOT NULL,
        access_reason TEXT NOT NULL,
        ip_address TEXT,
        user_agent TEXT,
        created_at TEXT NOT NULL
    );
";

const MESSAGE_COLUMNS: &str = "id, sender_id, recipient_id, content, created_at, read_at, \
    conversation_type, case_status, case_id, closed_at, closed_by, reopened_at, message_kind";

const REPORT_COLUMNS: &str = "id, reporter_id, reported_user_id, reason, description, status, \
    assigned_admin_id, resolution_notes, created_at, updated_at, resolved_at";

/// Durable store backed by a single SQLite connection.
///
/// Active-report uniqueness is enforced by a partial unique index, so concurrent
/// writers cannot both slip past the service-level pre-check.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::unavailable("sqlite.open", e))?;
        Self::initialise(conn, busy_timeout)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::unavailable("sqlite.open", e))?;
        Self::initialise(conn, Duration::from_millis(0))
    }

    fn initialise(conn: Connection, busy_timeout: Duration) -> Result<Self, StoreError> {
        conn.busy_timeout(busy_timeout)
            .map_err(|e| StoreError::unavailable("sqlite.busy_timeout", e))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::unavailable("sqlite.migrate", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self, operation: &'static str) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::unavailable(operation, "sqlite connection lock poisoned"))
    }
}

fn classify(operation: &'static str, err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict { operation }
        }
        _ => StoreError::unavailable(operation, err),
    }
}

fn encode_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(operation: &'static str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::unavailable(operation, format!("bad timestamp '{raw}': {e}")))
}

fn decode_optional_ts(
    operation: &'static str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.map(|value| decode_ts(operation, &value)).transpose()
}

fn decode_label<T>(
    operation: &'static str,
    column: &str,
    raw: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, StoreError> {
    parse(raw).ok_or_else(|| {
        StoreError::unavailable(operation, format!("unknown {column} value '{raw}'"))
    })
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, text)
}

fn message_where(filter: &MessageFilter, params: &mut Vec<Value>) -> String {
    let mut clauses: Vec<String> = Vec::new();

    if let Some(sender) = &filter.sender_id {
        clauses.push("sender_id = ?".to_string());
        params.push(text(sender.as_str()));
    }
    if let Some(recipient) = &filter.recipient_id {
        clauses.push("recipient_id = ?".to_string());
        params.push(text(recipient.as_str()));
    }
    if let Some(participant) = &filter.participant {
        clauses.push("(sender_id = ? OR recipient_id = ?)".to_string());
        params.push(text(participant.as_str()));
        params.push(text(participant.as_str()));
    }
    if let Some((a, b)) = &filter.between {
        clauses.push(
            "((sender_id = ? AND recipient_id = ?) OR (sender_id = ? AND recipient_id = ?))"
                .to_string(),
        );
        params.extend([
            text(a.as_str()),
            text(b.as_str()),
            text(b.as_str()),
            text(a.as_str()),
        ]);
    }
    if let Some(users) = &filter.involving_any {
        if users.is_empty() {
            clauses.push("0".to_string());
        } else {
            let placeholders = vec!["?"; users.len()].join(", ");
            clauses.push(format!(
                "(sender_id IN ({placeholders}) OR recipient_id IN ({placeholders}))"
            ));
            for _ in 0..2 {
                params.extend(users.iter().map(|user| text(user.as_str())));
            }
        }
    }
    if let Some(kind) = filter.conversation_type {
        clauses.push("conversation_type = ?".to_string());
        params.push(text(kind.label()));
    }
    if let Some(kind) = filter.exclude_conversation_type {
        clauses.push("conversation_type <> ?".to_string());
        params.push(text(kind.label()));
    }
    if let Some(status) = filter.case_status {
        clauses.push("case_status = ?".to_string());
        params.push(text(status.label()));
    }
    if filter.unread_only {
        clauses.push("read_at IS NULL".to_string());
    }
    if let Some(marker) = &filter.report_signature {
        clauses.push("(message_kind = ? OR instr(content, ?) > 0)".to_string());
        params.push(text(MessageKind::SystemReport.label()));
        params.push(text(marker));
    }

    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

struct RawMessage {
    id: String,
    sender_id: String,
    recipient_id: String,
    content: String,
    created_at: String,
    read_at: Option<String>,
    conversation_type: String,
    case_status: Option<String>,
    case_id: Option<String>,
    closed_at: Option<String>,
    closed_by: Option<String>,
    reopened_at: Option<String>,
    message_kind: String,
}

impl RawMessage {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            recipient_id: row.get(2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
            read_at: row.get(5)?,
            conversation_type: row.get(6)?,
            case_status: row.get(7)?,
            case_id: row.get(8)?,
            closed_at: row.get(9)?,
            closed_by: row.get(10)?,
            reopened_at: row.get(11)?,
            message_kind: row.get(12)?,
        })
    }

    fn decode(self) -> Result<Message, StoreError> {
        const OP: &str = "messages.decode";
        Ok(Message {
            id: MessageId(self.id),
            sender_id: UserId(self.sender_id),
            recipient_id: UserId(self.recipient_id),
            content: self.content,
            created_at: decode_ts(OP, &self.created_at)?,
            read_at: decode_optional_ts(OP, self.read_at)?,
            conversation_type: decode_label(
                OP,
                "conversation_type",
                &self.conversation_type,
                ConversationType::from_label,
            )?,
            case_status: self
                .case_status
                .map(|raw| decode_label(OP, "case_status", &raw, CaseStatus::from_label))
                .transpose()?,
            case_id: self.case_id.map(CaseId),
            closed_at: decode_optional_ts(OP, self.closed_at)?,
            closed_by: self.closed_by.map(UserId),
            reopened_at: decode_optional_ts(OP, self.reopened_at)?,
            message_kind: decode_label(
                OP,
                "message_kind",
                &self.message_kind,
                MessageKind::from_label,
            )?,
        })
    }
}

struct RawReport {
    id: String,
    reporter_id: String,
    reported_user_id: String,
    reason: String,
    description: Option<String>,
    status: String,
    assigned_admin_id: Option<String>,
    resolution_notes: Option<String>,
    created_at: String,
    updated_at: String,
    resolved_at: Option<String>,
}

impl RawReport {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            reporter_id: row.get(1)?,
            reported_user_id: row.get(2)?,
            reason: row.get(3)?,
            description: row.get(4)?,
            status: row.get(5)?,
            assigned_admin_id: row.get(6)?,
            resolution_notes: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            resolved_at: row.get(10)?,
        })
    }

    fn decode(self) -> Result<Report, StoreError> {
        const OP: &str = "reports.decode";
        Ok(Report {
            id: ReportId(self.id),
            reporter_id: UserId(self.reporter_id),
            reported_user_id: UserId(self.reported_user_id),
            reason: decode_label(OP, "reason", &self.reason, ReportReason::from_label)?,
            description: self.description,
            status: decode_label(OP, "status", &self.status, ReportStatus::from_label)?,
            assigned_admin_id: self.assigned_admin_id.map(UserId),
            resolution_notes: self.resolution_notes,
            created_at: decode_ts(OP, &self.created_at)?,
            updated_at: decode_ts(OP, &self.updated_at)?,
            resolved_at: decode_optional_ts(OP, self.resolved_at)?,
        })
    }
}

fn report_values(report: &Report) -> [Value; 11] {
    [
        text(report.id.as_str()),
        text(report.reporter_id.as_str()),
        text(report.reported_user_id.as_str()),
        text(report.reason.label()),
        optional_text(report.description.as_deref()),
        text(report.status.label()),
        optional_text(report.assigned_admin_id.as_ref().map(UserId::as_str)),
        optional_text(report.resolution_notes.as_deref()),
        text(&encode_ts(report.created_at)),
        text(&encode_ts(report.updated_at)),
        optional_text(report.resolved_at.map(encode_ts).as_deref()),
    ]
}

impl MessageStore for SqliteStore {
    fn insert_message(&self, message: Message) -> Result<Message, StoreError> {
        const OP: &str = "messages.insert";
        let conn = self.conn(OP)?;
        conn.execute(
            &format!(
                "INSERT INTO messages ({MESSAGE_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            params![
                message.id.as_str(),
                message.sender_id.as_str(),
                message.recipient_id.as_str(),
                message.content,
                encode_ts(message.created_at),
                message.read_at.map(encode_ts),
                message.conversation_type.label(),
                message.case_status.map(CaseStatus::label),
                message.case_id.as_ref().map(CaseId::as_str),
                message.closed_at.map(encode_ts),
                message.closed_by.as_ref().map(UserId::as_str),
                message.reopened_at.map(encode_ts),
                message.message_kind.label(),
            ],
        )
        .map_err(|e| classify(OP, e))?;
        Ok(message)
    }

    fn query_messages(
        &self,
        filter: &MessageFilter,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError> {
        const OP: &str = "messages.query";
        let mut values = Vec::new();
        let mut sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages{}",
            message_where(filter, &mut values)
        );
        sql.push_str(match order {
            SortOrder::OldestFirst => " ORDER BY created_at ASC, seq ASC",
            SortOrder::NewestFirst => " ORDER BY created_at DESC, seq ASC",
        });
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let conn = self.conn(OP)?;
        let mut statement = conn.prepare(&sql).map_err(|e| classify(OP, e))?;
        let rows = statement
            .query_map(params_from_iter(values.iter()), RawMessage::from_row)
            .map_err(|e| classify(OP, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| classify(OP, e))?;
        rows.into_iter().map(RawMessage::decode).collect()
    }

    fn update_messages(
        &self,
        filter: &MessageFilter,
        patch: &MessagePatch,
    ) -> Result<usize, StoreError> {
        const OP: &str = "messages.update";
        if patch.is_empty() {
            return Ok(0);
        }

        let mut assignments = Vec::new();
        let mut values = Vec::new();
        if let Some(kind) = patch.conversation_type {
            assignments.push("conversation_type = ?");
            values.push(text(kind.label()));
        }
        if let Some(status) = patch.case_status {
            assignments.push("case_status = ?");
            values.push(text(status.label()));
        }
        if let Some(at) = patch.closed_at {
            assignments.push("closed_at = ?");
            values.push(text(&encode_ts(at)));
        }
        if let Some(admin) = &patch.closed_by {
            assignments.push("closed_by = ?");
            values.push(text(admin.as_str()));
        }
        if let Some(at) = patch.reopened_at {
            assignments.push("reopened_at = ?");
            values.push(text(&encode_ts(at)));
        }
        if let Some(at) = patch.read_at {
            assignments.push("read_at = ?");
            values.push(text(&encode_ts(at)));
        }

        let sql = format!(
            "UPDATE messages SET {}{}",
            assignments.join(", "),
            message_where(filter, &mut values)
        );
        let conn = self.conn(OP)?;
        conn.execute(&sql, params_from_iter(values.iter()))
            .map_err(|e| classify(OP, e))
    }
}

impl ReportStore for SqliteStore {
    fn insert_report(&self, report: Report) -> Result<Report, StoreError> {
        const OP: &str = "reports.insert";
        let conn = self.conn(OP)?;
        conn.execute(
            &format!(
                "INSERT INTO conversation_reports ({REPORT_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params_from_iter(report_values(&report).iter()),
        )
        .map_err(|e| classify(OP, e))?;
        Ok(report)
    }

    fn fetch_report(&self, id: &ReportId) -> Result<Option<Report>, StoreError> {
        const OP: &str = "reports.fetch";
        let conn = self.conn(OP)?;
        let raw = conn
            .query_row(
                &format!("SELECT {REPORT_COLUMNS} FROM conversation_reports WHERE id = ?1"),
                params![id.as_str()],
                RawReport::from_row,
            )
            .optional()
            .map_err(|e| classify(OP, e))?;
        raw.map(RawReport::decode).transpose()
    }

    fn active_report_for(
        &self,
        reporter_id: &UserId,
        reported_user_id: &UserId,
    ) -> Result<Option<Report>, StoreError> {
        const OP: &str = "reports.active_for";
        let conn = self.conn(OP)?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {REPORT_COLUMNS} FROM conversation_reports \
                     WHERE reporter_id = ?1 AND reported_user_id = ?2 \
                     AND status IN ('pending', 'reviewing') LIMIT 1"
                ),
                params![reporter_id.as_str(), reported_user_id.as_str()],
                RawReport::from_row,
            )
            .optional()
            .map_err(|e| classify(OP, e))?;
        raw.map(RawReport::decode).transpose()
    }

    fn update_report(&self, report: &Report) -> Result<(), StoreError> {
        const OP: &str = "reports.update";
        let conn = self.conn(OP)?;
        let changed = conn
            .execute(
                "UPDATE conversation_reports SET reporter_id = ?2, reported_user_id = ?3, \
                 reason = ?4, description = ?5, status = ?6, assigned_admin_id = ?7, \
                 resolution_notes = ?8, created_at = ?9, updated_at = ?10, resolved_at = ?11 \
                 WHERE id = ?1",
                params_from_iter(report_values(report).iter()),
            )
            .map_err(|e| classify(OP, e))?;
        if changed == 0 {
            return Err(StoreError::NotFound { operation: OP });
        }
        Ok(())
    }

    fn list_reports(&self, query: &ReportQuery) -> Result<Vec<Report>, StoreError> {
        const OP: &str = "reports.list";
        let mut values = Vec::new();
        let mut sql = format!("SELECT {REPORT_COLUMNS} FROM conversation_reports");
        if let Some(status) = query.status {
            sql.push_str(" WHERE status = ?");
            values.push(text(status.label()));
        }
        sql.push_str(" ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?");
        values.push(Value::Integer(query.limit as i64));
        values.push(Value::Integer(query.offset as i64));

        let conn = self.conn(OP)?;
        let mut statement = conn.prepare(&sql).map_err(|e| classify(OP, e))?;
        let rows = statement
            .query_map(params_from_iter(values.iter()), RawReport::from_row)
            .map_err(|e| classify(OP, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| classify(OP, e))?;
        rows.into_iter().map(RawReport::decode).collect()
    }

    fn report_counts(&self) -> Result<ReportCounts, StoreError> {
        const OP: &str = "reports.counts";
        let conn = self.conn(OP)?;
        let mut statement = conn
            .prepare("SELECT status, COUNT(*) FROM conversation_reports GROUP BY status")
            .map_err(|e| classify(OP, e))?;
        let rows = statement
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(|e| classify(OP, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| classify(OP, e))?;

        let mut counts = ReportCounts::default();
        for (raw, count) in rows {
            let status = decode_label(OP, "status", &raw, ReportStatus::from_label)?;
            let count = count.max(0) as usize;
            match status {
                ReportStatus::Pending => counts.pending = count,
                ReportStatus::Reviewing => counts.reviewing = count,
                ReportStatus::Resolved => counts.resolved = count,
                ReportStatus::Dismissed => counts.dismissed = count,
            }
            counts.total += count;
        }
        Ok(counts)
    }
}

impl AccessLogStore for SqliteStore {
    fn append_access_log(&self, entry: AdminAccessLogEntry) -> Result<(), StoreError> {
        const OP: &str = "admin_access_logs.append";
        let conn = self.conn(OP)?;
        conn.execute(
            "INSERT INTO admin_access_logs \
             (admin_id, user_id, report_id, access_type, access_reason, ip_address, user_agent, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.admin_id.as_str(),
                entry.user_id.as_ref().map(UserId::as_str),
                entry.report_id.as_ref().map(ReportId::as_str),
                entry.access_type.label(),
                entry.access_reason,
                entry.ip_address,
                entry.user_agent,
                encode_ts(entry.created_at),
            ],
        )
        .map_err(|e| classify(OP, e))?;
        Ok(())
    }

    fn access_logs(
        &self,
        report_id: Option<&ReportId>,
    ) -> Result<Vec<AdminAccessLogEntry>, StoreError> {
        const OP: &str = "admin_access_logs.list";
        let conn = self.conn(OP)?;
        let mut statement = conn
            .prepare(
                "SELECT admin_id, user_id, report_id, access_type, access_reason, ip_address, \
                 user_agent, created_at FROM admin_access_logs \
                 WHERE ?1 IS NULL OR report_id = ?1 ORDER BY seq ASC",
            )
            .map_err(|e| classify(OP, e))?;
        let rows = statement
            .query_map(params![report_id.map(ReportId::as_str)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .map_err(|e| classify(OP, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| classify(OP, e))?;

        rows.into_iter()
            .map(
                |(admin_id, user_id, report_id, access_type, access_reason, ip, agent, at)|
                 -> Result<AdminAccessLogEntry, StoreError> {
                    Ok(AdminAccessLogEntry {
                        admin_id: UserId(admin_id),
                        user_id: user_id.map(UserId),
                        report_id: report_id.map(ReportId),
                        access_type: decode_label(
                            OP,
                            "access_type",
                            &access_type,
                            AccessType::from_label,
                        )?,
                        access_reason,
                        ip_address: ip,
                        user_agent: agent,
                        created_at: decode_ts(OP, &at)?,
                    })
                },
            )
            .collect()
    }
}

impl UserDirectory for SqliteStore {
    fn fetch_user(&self, id: &UserId) -> Result<Option<UserAccount>, StoreError> {
        const OP: &str = "users.fetch";
        let conn = self.conn(OP)?;
        let row = conn
            .query_row(
                "SELECT id, display_name, role FROM users WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| classify(OP, e))?;

        row.map(|(id, display_name, role)| -> Result<UserAccount, StoreError> {
            Ok(UserAccount {
                id: UserId(id),
                display_name,
                role: decode_label(OP, "role", &role, Role::from_label)?,
            })
        })
        .transpose()
    }

    fn admin_ids(&self) -> Result<Vec<UserId>, StoreError> {
        const OP: &str = "users.admins";
        let conn = self.conn(OP)?;
        let mut statement = conn
            .prepare("SELECT id FROM users WHERE role = ?1 ORDER BY id")
            .map_err(|e| classify(OP, e))?;
        let ids = statement
            .query_map(params![Role::Admin.label()], |row| row.get::<_, String>(0))
            .map_err(|e| classify(OP, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| classify(OP, e))?;
        Ok(ids.into_iter().map(UserId).collect())
    }

    fn upsert_user(&self, account: UserAccount) -> Result<(), StoreError> {
        const OP: &str = "users.upsert";
        let conn = self.conn(OP)?;
        conn.execute(
            "INSERT INTO users (id, display_name, role) VALUES (?1, ?2, ?3) \
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name, role = excluded.role",
            params![account.id.as_str(), account.display_name, account.role.label()],
        )
        .map_err(|e| classify(OP, e))?;
        Ok(())
    }
}
