use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use std::future::Future;
use uuid::Uuid;

use super::appointment_models::{Appointment, AppointmentStatus};
use crate::error::{AppError, Result};

/// Storage port for appointments.
pub trait AppointmentRepository: Clone + Send + Sync + 'static {
    /// Writes the appointment only if no active booking holds the same
    /// teacher, date and slot. `None` means the slot was taken.
    fn insert_if_slot_free(
        &self,
        appointment: &Appointment,
    ) -> impl Future<Output = Result<Option<Appointment>>> + Send;

    fn find_by_id(&self, id: Uuid) -> impl Future<Output = Result<Option<Appointment>>> + Send;

    fn find_by_teacher(&self, teacher_id: Uuid) -> impl Future<Output = Result<Vec<Appointment>>> + Send;

    fn find_by_student(&self, student_id: Uuid) -> impl Future<Output = Result<Vec<Appointment>>> + Send;

    /// Pending or Confirmed appointments dated strictly before `date`.
    fn find_active_before(&self, date: NaiveDate) -> impl Future<Output = Result<Vec<Appointment>>> + Send;

    /// Sets status and remarks only while the stored status is still `from`.
    /// `None` means the record is missing or moved on.
    fn update_status(
        &self,
        id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        remarks: &str,
    ) -> impl Future<Output = Result<Option<Appointment>>> + Send;
}

#[derive(Debug, FromRow)]
struct AppointmentRow {
    id: Uuid,
    student_id: Uuid,
    teacher_id: Uuid,
    date: NaiveDate,
    time_slot: String,
    kind: String,
    reason: String,
    status: String,
    remarks: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = AppError;

    fn try_from(row: AppointmentRow) -> Result<Self> {
        let status = row.status.parse().map_err(|e| {
            tracing::error!("Bad appointment row {}: {}", row.id, e);
            AppError::InternalError
        })?;
        let kind = row.kind.parse().map_err(|e| {
            tracing::error!("Bad appointment row {}: {}", row.id, e);
            AppError::InternalError
        })?;

        Ok(Appointment {
            id: row.id,
            student_id: row.student_id,
            teacher_id: row.teacher_id,
            date: row.date,
            time: row.time_slot,
            kind,
            reason: row.reason,
            status,
            remarks: row.remarks,
            created_at: row.created_at,
        })
    }
}

fn into_appointments(rows: Vec<AppointmentRow>) -> Result<Vec<Appointment>> {
    rows.into_iter().map(Appointment::try_from).collect()
}

#[derive(Clone)]
pub struct PgAppointmentRepository {
    pool: PgPool,
}

impl PgAppointmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AppointmentRepository for PgAppointmentRepository {
    async fn insert_if_slot_free(&self, appointment: &Appointment) -> Result<Option<Appointment>> {
        // The partial unique index on active (teacher_id, date, time_slot) turns a
        // double booking into a no-op insert.
        let row = sqlx::query_as::<_, AppointmentRow>(
            "INSERT INTO appointments
                (id, student_id, teacher_id, date, time_slot, kind, reason, status, remarks, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT DO NOTHING
             RETURNING *",
        )
        .bind(appointment.id)
        .bind(appointment.student_id)
        .bind(appointment.teacher_id)
        .bind(appointment.date)
        .bind(&appointment.time)
        .bind(appointment.kind.to_string())
        .bind(&appointment.reason)
        .bind(appointment.status.as_str())
        .bind(&appointment.remarks)
        .bind(appointment.created_at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Appointment::try_from).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>> {
        let row = sqlx::query_as::<_, AppointmentRow>("SELECT * FROM appointments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Appointment::try_from).transpose()
    }

    async fn find_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, AppointmentRow>(
            "SELECT * FROM appointments WHERE teacher_id = $1 ORDER BY date, created_at",
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await?;

        into_appointments(rows)
    }

    async fn find_by_student(&self, student_id: Uuid) -> Result<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, AppointmentRow>(
            "SELECT * FROM appointments WHERE student_id = $1 ORDER BY date, created_at",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        into_appointments(rows)
    }

    async fn find_active_before(&self, date: NaiveDate) -> Result<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, AppointmentRow>(
            "SELECT * FROM appointments
             WHERE status IN ('Pending', 'Confirmed') AND date < $1
             ORDER BY date",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        into_appointments(rows)
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        remarks: &str,
    ) -> Result<Option<Appointment>> {
        let row = sqlx::query_as::<_, AppointmentRow>(
            "UPDATE appointments SET status = $3, remarks = $4
             WHERE id = $1 AND status = $2
             RETURNING *",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(remarks)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Appointment::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appointment::AppointmentType;

    const CANONICAL_STATUS_MIGRATION: &str =
        include_str!("../../migrations/20241017000001_canonical_status.sql");

    fn row(status: &str) -> AppointmentRow {
        AppointmentRow {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            teacher_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            time_slot: "09:00 AM to 09:30 AM".to_string(),
            kind: "academic".to_string(),
            reason: "x".to_string(),
            status: status.to_string(),
            remarks: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_legacy_row_reads_canonical() {
        let appointment = Appointment::try_from(row("pending")).unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Pending);
        assert_eq!(appointment.kind, AppointmentType::Academic);

        let declined = Appointment::try_from(row("Declined")).unwrap();
        assert_eq!(declined.status, AppointmentStatus::Cancelled);

        assert!(matches!(
            Appointment::try_from(row("archived")),
            Err(AppError::InternalError)
        ));
    }

    #[test]
    fn test_stored_statuses_match_bound_values() {
        // Queries bind `as_str()`; the table only admits those values
        for status in AppointmentStatus::ALL {
            assert!(CANONICAL_STATUS_MIGRATION.contains(&format!("'{}'", status.as_str())));
        }
        assert!(CANONICAL_STATUS_MIGRATION.contains("CHECK (status IN"));
    }

    #[test]
    fn test_migration_rewrites_every_legacy_spelling() {
        for legacy in ["pending", "confirmed", "completed", "cancelled", "canceled", "declined"] {
            let canonical: AppointmentStatus = legacy.parse().unwrap();
            let rewrite = format!("WHEN '{}' THEN '{}'", legacy, canonical.as_str());
            assert!(CANONICAL_STATUS_MIGRATION.contains(&rewrite), "missing {rewrite}");
        }
    }
}
