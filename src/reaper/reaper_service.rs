use chrono::{Local, NaiveDate};
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::appointment::{Appointment, AppointmentRepository, AppointmentService};
use crate::auth::Session;
use crate::error::Result;
use crate::notification::NotificationRepository;
use crate::user::{Role, UserRepository};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
    pub examined: usize,
    pub expired: usize,
    /// Already resolved by someone else before our write landed.
    pub skipped: usize,
    pub failed: usize,
}

/// Cancels appointments left Pending or Confirmed past their date.
#[derive(Clone)]
pub struct ReaperService<A, U, N> {
    appointments: AppointmentService<A, U, N>,
}

impl<A, U, N> ReaperService<A, U, N>
where
    A: AppointmentRepository,
    U: UserRepository,
    N: NotificationRepository,
{
    pub fn new(appointments: AppointmentService<A, U, N>) -> Self {
        Self { appointments }
    }

    /// Sweeps every teacher's appointments dated before `today`.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self, today: NaiveDate) -> Result<ReapReport> {
        let stale = self.appointments.stale_before(today).await?;
        Ok(self.expire_all(stale).await)
    }

    /// Same sweep limited to what the viewer can see, run on home-screen load.
    #[tracing::instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn sweep_for(&self, session: &Session, today: NaiveDate) -> Result<ReapReport> {
        // Admins own no appointments
        if session.role == Role::Admin {
            return Ok(ReapReport::default());
        }
        let stale = self.appointments.stale_for(session, today).await?;
        Ok(self.expire_all(stale).await)
    }

    async fn expire_all(&self, stale: Vec<Appointment>) -> ReapReport {
        let mut report = ReapReport {
            examined: stale.len(),
            ..ReapReport::default()
        };

        for appointment in stale {
            let id = appointment.id;
            match self.appointments.expire(appointment).await {
                Ok(Some(_)) => report.expired += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    error!("Failed to expire appointment {}: {:?}", id, e);
                    report.failed += 1;
                }
            }
        }

        if report.examined > 0 {
            info!(
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "stale appointments swept"
            );
        }
        report
    }
}

/// Runs the sweep on `schedule` (six-field cron, seconds first) against the local date.
pub async fn start_reaper_service<A, U, N>(
    reaper: ReaperService<A, U, N>,
    schedule: &str,
) -> anyhow::Result<JobScheduler>
where
    A: AppointmentRepository,
    U: UserRepository,
    N: NotificationRepository,
{
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(schedule, move |_uuid, _l| {
        let reaper = reaper.clone();

        Box::pin(async move {
            let today = Local::now().date_naive();
            if let Err(e) = reaper.sweep(today).await {
                error!("Error sweeping stale appointments: {:?}", e);
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    info!(schedule, "Reaper service started");
    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appointment::{AppointmentStatus, AppointmentType, LATE_RESPONSE_REMARK};
    use crate::memory::InMemoryStore;
    use crate::notification::NotificationService;
    use uuid::Uuid;

    type TestReaper = ReaperService<InMemoryStore, InMemoryStore, InMemoryStore>;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 20).unwrap()
    }

    fn setup() -> (InMemoryStore, TestReaper) {
        let store = InMemoryStore::new();
        let service = AppointmentService::new(
            store.clone(),
            store.clone(),
            NotificationService::new(store.clone()),
        );
        (store, ReaperService::new(service))
    }

    async fn seed(store: &InMemoryStore, student: Uuid, date: NaiveDate) -> Appointment {
        let appointment = Appointment::pending(
            student,
            Uuid::new_v4(),
            date,
            "09:00 AM to 09:30 AM".to_string(),
            AppointmentType::Academic,
            "x".to_string(),
        );
        store.insert_if_slot_free(&appointment).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_yesterday_is_cancelled_with_remark() {
        let (store, reaper) = setup();
        let yesterday = today().pred_opt().unwrap();
        let appointment = seed(&store, Uuid::new_v4(), yesterday).await;

        let report = reaper.sweep(today()).await.unwrap();
        assert_eq!(report.expired, 1);

        let swept = store.find_by_id(appointment.id).await.unwrap().unwrap();
        assert_eq!(swept.status, AppointmentStatus::Cancelled);
        assert_eq!(swept.remarks, LATE_RESPONSE_REMARK);

        // Both parties hear about it
        assert_eq!(store.find_by_recipient(appointment.student_id).await.unwrap().len(), 1);
        assert_eq!(store.find_by_recipient(appointment.teacher_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let (store, reaper) = setup();
        seed(&store, Uuid::new_v4(), today().pred_opt().unwrap()).await;

        assert_eq!(reaper.sweep(today()).await.unwrap().expired, 1);
        assert_eq!(reaper.sweep(today()).await.unwrap(), ReapReport::default());
    }

    #[tokio::test]
    async fn test_older_dates_and_confirmed_swept() {
        let (store, reaper) = setup();
        let last_week = seed(&store, Uuid::new_v4(), NaiveDate::from_ymd_opt(2026, 10, 13).unwrap()).await;
        store
            .update_status(last_week.id, AppointmentStatus::Pending, AppointmentStatus::Confirmed, "")
            .await
            .unwrap();

        assert_eq!(reaper.sweep(today()).await.unwrap().expired, 1);
        let swept = store.find_by_id(last_week.id).await.unwrap().unwrap();
        assert_eq!(swept.status, AppointmentStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_today_future_and_resolved_untouched() {
        let (store, reaper) = setup();
        let current = seed(&store, Uuid::new_v4(), today()).await;
        let upcoming = seed(&store, Uuid::new_v4(), today().succ_opt().unwrap()).await;
        let done = seed(&store, Uuid::new_v4(), today().pred_opt().unwrap()).await;
        store
            .update_status(done.id, AppointmentStatus::Pending, AppointmentStatus::Confirmed, "")
            .await
            .unwrap();
        store
            .update_status(done.id, AppointmentStatus::Confirmed, AppointmentStatus::Completed, "")
            .await
            .unwrap();

        assert_eq!(reaper.sweep(today()).await.unwrap().examined, 0);
        for id in [current.id, upcoming.id] {
            let untouched = store.find_by_id(id).await.unwrap().unwrap();
            assert_eq!(untouched.status, AppointmentStatus::Pending);
        }
        let completed = store.find_by_id(done.id).await.unwrap().unwrap();
        assert_eq!(completed.status, AppointmentStatus::Completed);
    }

    #[tokio::test]
    async fn test_sweep_for_limits_to_viewer() {
        let (store, reaper) = setup();
        let student = Uuid::new_v4();
        let yesterday = today().pred_opt().unwrap();
        let mine = seed(&store, student, yesterday).await;
        let theirs = seed(&store, Uuid::new_v4(), yesterday).await;
        let session = Session {
            user_id: student,
            role: Role::Student,
            username: "student".to_string(),
        };

        let report = reaper.sweep_for(&session, today()).await.unwrap();
        assert_eq!(report.expired, 1);

        let mine = store.find_by_id(mine.id).await.unwrap().unwrap();
        let theirs = store.find_by_id(theirs.id).await.unwrap().unwrap();
        assert_eq!(mine.status, AppointmentStatus::Cancelled);
        assert_eq!(theirs.status, AppointmentStatus::Pending);
    }

    #[tokio::test]
    async fn test_admin_home_sweep_is_empty() {
        let (store, reaper) = setup();
        let stale = seed(&store, Uuid::new_v4(), today().pred_opt().unwrap()).await;
        let admin = Session {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
            username: "admin".to_string(),
        };

        let report = reaper.sweep_for(&admin, today()).await.unwrap();
        assert_eq!(report, ReapReport::default());

        let untouched = store.find_by_id(stale.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, AppointmentStatus::Pending);
    }
}
