use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::future::Future;
use uuid::Uuid;

use super::notification_models::{NewNotification, Notification, NotificationType};
use crate::error::{AppError, Result};

pub trait NotificationRepository: Clone + Send + Sync + 'static {
    fn create(&self, notification: &NewNotification) -> impl Future<Output = Result<Notification>> + Send;

    /// Newest first.
    fn find_by_recipient(&self, recipient_id: Uuid) -> impl Future<Output = Result<Vec<Notification>>> + Send;

    fn mark_as_read(&self, id: Uuid, recipient_id: Uuid) -> impl Future<Output = Result<Option<Notification>>> + Send;

    fn mark_all_as_read(&self, recipient_id: Uuid) -> impl Future<Output = Result<u64>> + Send;

    fn count_unread(&self, recipient_id: Uuid, kind: NotificationType) -> impl Future<Output = Result<i64>> + Send;
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: Uuid,
    recipient_id: Uuid,
    appointment_id: Option<Uuid>,
    title: String,
    description: String,
    kind: String,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> Result<Self> {
        let kind = row.kind.parse().map_err(|e| {
            tracing::error!("Bad notification row {}: {}", row.id, e);
            AppError::InternalError
        })?;

        Ok(Notification {
            id: row.id,
            recipient_id: row.recipient_id,
            appointment_id: row.appointment_id,
            title: row.title,
            description: row.description,
            kind,
            read: row.is_read,
            time: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl NotificationRepository for PgNotificationRepository {
    async fn create(&self, notification: &NewNotification) -> Result<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(
            "INSERT INTO notifications (id, recipient_id, appointment_id, title, description, kind)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(notification.recipient_id)
        .bind(notification.appointment_id)
        .bind(&notification.title)
        .bind(&notification.description)
        .bind(notification.kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        Notification::try_from(row)
    }

    async fn find_by_recipient(&self, recipient_id: Uuid) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM notifications WHERE recipient_id = $1 ORDER BY created_at DESC",
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn mark_as_read(&self, id: Uuid, recipient_id: Uuid) -> Result<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(
            "UPDATE notifications SET is_read = true WHERE id = $1 AND recipient_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(recipient_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Notification::try_from).transpose()
    }

    async fn mark_all_as_read(&self, recipient_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = true WHERE recipient_id = $1 AND is_read = false",
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_unread(&self, recipient_id: Uuid, kind: NotificationType) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND kind = $2 AND is_read = false",
        )
        .bind(recipient_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
