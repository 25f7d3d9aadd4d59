use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::Postgres;
use sqlx::{FromRow, PgPool, QueryBuilder};
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::audit::models::{
    ActionResult, ActorStats, AdminAuditEvent, AuditAction, AuditQueryFilter, EventMetadata,
    RequestInfo, ResultStatus, ReviewAnnotation, Severity, TargetType,
};

/// Persistence boundary for the audit trail. The Postgres implementation is
/// the production store; tests inject an in-memory one.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert(&self, event: &AdminAuditEvent) -> Result<()>;

    async fn query(
        &self,
        filter: &AuditQueryFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<AdminAuditEvent>, i64)>;

    async fn security_events(&self, window_hours: i64) -> Result<Vec<AdminAuditEvent>>;

    async fn failed_events(&self, window_hours: i64) -> Result<Vec<AdminAuditEvent>>;

    async fn stats_by_actor(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ActorStats>>;

    async fn mark_reviewed(
        &self,
        id: Uuid,
        reviewed_by: &str,
        status: &str,
        notes: Option<&str>,
    ) -> Result<AdminAuditEvent>;
}

pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const EVENT_COLUMNS: &str = "id, actor_id, action, target_type, target_id, target_name, \
     description, changes_before, changes_after, request_method, request_endpoint, \
     request_user_agent, request_ip, request_session_id, result_status, result_message, \
     error_code, severity, requires_review, is_security_event, is_compliance, is_automated, \
     duration_ms, resources_affected, batch_id, feature, reviewed_by, reviewed_at, \
     review_status, review_notes, created_at";

#[derive(Debug, FromRow)]
struct AuditEventRow {
    id: Uuid,
    actor_id: String,
    action: String,
    target_type: String,
    target_id: Option<String>,
    target_name: Option<String>,
    description: String,
    changes_before: Option<serde_json::Value>,
    changes_after: Option<serde_json::Value>,
    request_method: Option<String>,
    request_endpoint: Option<String>,
    request_user_agent: Option<String>,
    request_ip: Option<String>,
    request_session_id: Option<String>,
    result_status: String,
    result_message: Option<String>,
    error_code: Option<String>,
    severity: String,
    requires_review: bool,
    is_security_event: bool,
    is_compliance: bool,
    is_automated: bool,
    duration_ms: Option<i64>,
    resources_affected: Option<i32>,
    batch_id: Option<String>,
    feature: Option<String>,
    reviewed_by: Option<String>,
    reviewed_at: Option<DateTime<Utc>>,
    review_status: Option<String>,
    review_notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditEventRow> for AdminAuditEvent {
    type Error = AppError;

    fn try_from(row: AuditEventRow) -> Result<Self> {
        let action = AuditAction::parse(&row.action)
            .ok_or_else(|| AppError::Internal(format!("Unknown audit action: {}", row.action)))?;
        let target_type = TargetType::parse(&row.target_type).ok_or_else(|| {
            AppError::Internal(format!("Unknown audit target type: {}", row.target_type))
        })?;
        let status = ResultStatus::parse(&row.result_status).ok_or_else(|| {
            AppError::Internal(format!("Unknown result status: {}", row.result_status))
        })?;
        let severity = Severity::parse(&row.severity)
            .ok_or_else(|| AppError::Internal(format!("Unknown severity: {}", row.severity)))?;

        let review = match (row.reviewed_by, row.reviewed_at, row.review_status) {
            (Some(reviewed_by), Some(reviewed_at), Some(review_status)) => Some(ReviewAnnotation {
                reviewed_by,
                reviewed_at,
                review_status,
                review_notes: row.review_notes,
            }),
            _ => None,
        };

        Ok(AdminAuditEvent {
            id: row.id,
            actor_id: row.actor_id,
            action,
            target_type,
            target_id: row.target_id,
            target_name: row.target_name,
            description: row.description,
            changes_before: row.changes_before,
            changes_after: row.changes_after,
            request: RequestInfo {
                method: row.request_method,
                endpoint: row.request_endpoint,
                user_agent: row.request_user_agent,
                ip: row.request_ip,
                session_id: row.request_session_id,
            },
            result: ActionResult {
                status,
                message: row.result_message,
                error_code: row.error_code,
            },
            severity,
            requires_review: row.requires_review,
            is_security_event: row.is_security_event,
            is_compliance: row.is_compliance,
            is_automated: row.is_automated,
            metadata: EventMetadata {
                duration_ms: row.duration_ms,
                resources_affected: row.resources_affected,
                batch_id: row.batch_id,
                feature: row.feature,
            },
            review,
            created_at: row.created_at,
        })
    }
}

fn apply_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &AuditQueryFilter) {
    if let Some(actor_id) = &filter.actor_id {
        builder.push(" AND actor_id = ").push_bind(actor_id.clone());
    }
    if let Some(action) = filter.action {
        builder.push(" AND action = ").push_bind(action.as_str());
    }
    if let Some(target_type) = filter.target_type {
        builder
            .push(" AND target_type = ")
            .push_bind(target_type.as_str());
    }
    if let Some(target_id) = &filter.target_id {
        builder
            .push(" AND target_id = ")
            .push_bind(target_id.clone());
    }
    if let Some(severity) = filter.severity {
        builder.push(" AND severity = ").push_bind(severity.as_str());
    }
    if let Some(is_security_event) = filter.is_security_event {
        builder
            .push(" AND is_security_event = ")
            .push_bind(is_security_event);
    }
    if let Some(status) = filter.status {
        builder
            .push(" AND result_status = ")
            .push_bind(status.as_str());
    }
    if let Some(from) = filter.from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND created_at <= ").push_bind(to);
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn insert(&self, event: &AdminAuditEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO admin_audit_events (
                id, actor_id, action, target_type, target_id, target_name,
                description, changes_before, changes_after,
                request_method, request_endpoint, request_user_agent,
                request_ip, request_session_id,
                result_status, result_message, error_code,
                severity, requires_review, is_security_event, is_compliance,
                is_automated, duration_ms, resources_affected, batch_id,
                feature, created_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27
            )
            "#,
        )
        .bind(event.id)
        .bind(&event.actor_id)
        .bind(event.action.as_str())
        .bind(event.target_type.as_str())
        .bind(&event.target_id)
        .bind(&event.target_name)
        .bind(&event.description)
        .bind(&event.changes_before)
        .bind(&event.changes_after)
        .bind(&event.request.method)
        .bind(&event.request.endpoint)
        .bind(&event.request.user_agent)
        .bind(&event.request.ip)
        .bind(&event.request.session_id)
        .bind(event.result.status.as_str())
        .bind(&event.result.message)
        .bind(&event.result.error_code)
        .bind(event.severity.as_str())
        .bind(event.requires_review)
        .bind(event.is_security_event)
        .bind(event.is_compliance)
        .bind(event.is_automated)
        .bind(event.metadata.duration_ms)
        .bind(event.metadata.resources_affected)
        .bind(&event.metadata.batch_id)
        .bind(&event.metadata.feature)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }

    async fn query(
        &self,
        filter: &AuditQueryFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<AdminAuditEvent>, i64)> {
        let mut count_builder =
            QueryBuilder::new("SELECT COUNT(*) FROM admin_audit_events WHERE 1=1");
        apply_filters(&mut count_builder, filter);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)?;

        let mut builder = QueryBuilder::new(format!(
            "SELECT {} FROM admin_audit_events WHERE 1=1",
            EVENT_COLUMNS
        ));
        apply_filters(&mut builder, filter);
        builder
            .push(" ORDER BY created_at DESC OFFSET ")
            .push_bind(offset)
            .push(" LIMIT ")
            .push_bind(limit);

        let rows: Vec<AuditEventRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)?;

        let events = rows
            .into_iter()
            .map(AdminAuditEvent::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((events, total))
    }

    async fn security_events(&self, window_hours: i64) -> Result<Vec<AdminAuditEvent>> {
        let since = Utc::now() - Duration::hours(window_hours);

        let rows: Vec<AuditEventRow> = sqlx::query_as(&format!(
            "SELECT {} FROM admin_audit_events \
             WHERE is_security_event AND created_at >= $1 \
             ORDER BY created_at DESC",
            EVENT_COLUMNS
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(AdminAuditEvent::try_from).collect()
    }

    async fn failed_events(&self, window_hours: i64) -> Result<Vec<AdminAuditEvent>> {
        let since = Utc::now() - Duration::hours(window_hours);

        let rows: Vec<AuditEventRow> = sqlx::query_as(&format!(
            "SELECT {} FROM admin_audit_events \
             WHERE result_status = 'error' AND created_at >= $1 \
             ORDER BY created_at DESC",
            EVENT_COLUMNS
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        rows.into_iter().map(AdminAuditEvent::try_from).collect()
    }

    async fn stats_by_actor(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ActorStats>> {
        #[derive(FromRow)]
        struct StatsRow {
            actor_id: String,
            total_actions: i64,
            successful_actions: i64,
            failed_actions: i64,
            security_events: i64,
            last_activity: Option<DateTime<Utc>>,
        }

        let rows: Vec<StatsRow> = sqlx::query_as(
            r#"
            SELECT actor_id,
                   COUNT(*) AS total_actions,
                   COUNT(*) FILTER (WHERE result_status = 'success') AS successful_actions,
                   COUNT(*) FILTER (WHERE result_status = 'error') AS failed_actions,
                   COUNT(*) FILTER (WHERE is_security_event) AS security_events,
                   MAX(created_at) AS last_activity
            FROM admin_audit_events
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at <= $2)
            GROUP BY actor_id
            ORDER BY total_actions DESC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows
            .into_iter()
            .map(|r| {
                let success_rate = if r.total_actions > 0 {
                    (r.successful_actions as f64 / r.total_actions as f64) * 100.0
                } else {
                    0.0
                };
                ActorStats {
                    actor_id: r.actor_id,
                    total_actions: r.total_actions,
                    successful_actions: r.successful_actions,
                    failed_actions: r.failed_actions,
                    security_events: r.security_events,
                    success_rate,
                    last_activity: r.last_activity,
                }
            })
            .collect())
    }

    async fn mark_reviewed(
        &self,
        id: Uuid,
        reviewed_by: &str,
        status: &str,
        notes: Option<&str>,
    ) -> Result<AdminAuditEvent> {
        let row: Option<AuditEventRow> = sqlx::query_as(&format!(
            "UPDATE admin_audit_events \
             SET reviewed_by = $1, reviewed_at = NOW(), review_status = $2, review_notes = $3 \
             WHERE id = $4 \
             RETURNING {}",
            EVENT_COLUMNS
        ))
        .bind(reviewed_by)
        .bind(status)
        .bind(notes)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        row.ok_or_else(|| AppError::NotFound(format!("Audit event {} not found", id)))?
            .try_into()
    }
}
