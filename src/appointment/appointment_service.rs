use chrono::NaiveDate;
use futures::stream::{self, Stream, StreamExt};
use std::collections::HashMap;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;
use validator::Validate;

use super::appointment_dto::{require_remarks, AppointmentSummary, CreateAppointmentRequest, HomeSummary};
use super::appointment_models::{Actor, Appointment, AppointmentStatus, LATE_RESPONSE_REMARK};
use super::appointment_repository::AppointmentRepository;
use super::appointment_snapshot::{apply_appointment_snapshot, sort_key, DerivedLists};
use crate::auth::Session;
use crate::error::{AppError, FieldErrors, Result};
use crate::notification::{NotificationRepository, NotificationService};
use crate::schedule::{is_weekday, Availability};
use crate::user::{display_name_or, Role, User, UserRepository, UNKNOWN_STUDENT, UNKNOWN_TEACHER};

/// Booking and the appointment status lifecycle.
#[derive(Clone)]
pub struct AppointmentService<A, U, N> {
    appointments: A,
    users: U,
    notifications: NotificationService<N>,
    appointment_tx: broadcast::Sender<Appointment>,
}

impl<A, U, N> AppointmentService<A, U, N>
where
    A: AppointmentRepository,
    U: UserRepository,
    N: NotificationRepository,
{
    pub fn new(appointments: A, users: U, notifications: NotificationService<N>) -> Self {
        let (appointment_tx, _) = broadcast::channel(100);
        Self {
            appointments,
            users,
            notifications,
            appointment_tx,
        }
    }

    pub async fn list_teachers(&self) -> Result<Vec<User>> {
        self.users.list_teachers().await
    }

    pub async fn availability(&self, teacher_id: Uuid) -> Result<Availability> {
        let booked = self.appointments.find_by_teacher(teacher_id).await?;
        Ok(Availability::for_teacher(teacher_id, &booked))
    }

    #[tracing::instrument(skip(self, session, payload), fields(student_id = %session.user_id))]
    pub async fn create_appointment(
        &self,
        session: &Session,
        payload: CreateAppointmentRequest,
    ) -> Result<Appointment> {
        if session.role != Role::Student {
            return Err(AppError::Forbidden("Only students can book consultations".into()));
        }

        let mut errors = match payload.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };

        let teacher = match payload.teacher_id {
            Some(teacher_id) => match self.users.get_user_by_id(teacher_id).await? {
                Some(user) if user.role == Role::Teacher => Some(user),
                _ => {
                    errors.add("teacher_id", "Please select a teacher");
                    None
                }
            },
            None => None,
        };

        match (&teacher, payload.date) {
            (Some(teacher), Some(date)) => {
                let availability = self.availability(teacher.id).await?;
                errors.merge(availability.check(date, payload.time.as_deref().unwrap_or_default()));
            }
            (None, Some(date)) if !is_weekday(date) => {
                errors.add("date", "Please select a weekday.");
            }
            _ => {}
        }

        if !errors.is_empty() {
            tracing::debug!(%errors, "booking rejected");
            return Err(AppError::Validation(errors));
        }

        let (Some(teacher), Some(date), Some(time), Some(kind)) =
            (teacher, payload.date, payload.time, payload.kind)
        else {
            return Err(AppError::InternalError);
        };

        let candidate = Appointment::pending(
            session.user_id,
            teacher.id,
            date,
            time.trim().to_string(),
            kind,
            payload.reason.trim().to_string(),
        );

        // The availability check above can be stale; the conditional insert decides.
        let Some(appointment) = self.appointments.insert_if_slot_free(&candidate).await? else {
            tracing::warn!(teacher_id = %teacher.id, %date, time = %candidate.time, "slot claimed concurrently");
            return Err(AppError::SlotTaken {
                date,
                time: candidate.time,
            });
        };

        tracing::info!(appointment_id = %appointment.id, teacher_id = %teacher.id, "appointment requested");
        self.publish(&appointment);

        let teacher_name = display_name_or(Some(&teacher), UNKNOWN_TEACHER);
        if let Err(e) = self
            .notifications
            .appointment_created(&appointment, &teacher_name)
            .await
        {
            tracing::error!("Failed to write booking notifications for {}: {}", appointment.id, e);
        }

        Ok(appointment)
    }

    /// Teacher accepts a pending request.
    pub async fn accept(&self, session: &Session, id: Uuid) -> Result<Appointment> {
        self.transition(session, id, AppointmentStatus::Confirmed, "")
            .await
    }

    /// Teacher turns down a pending request with a reason.
    pub async fn decline(&self, session: &Session, id: Uuid, remarks: &str) -> Result<Appointment> {
        let remarks = require_remarks(remarks, "Please provide a reason for declining")?;
        self.transition(session, id, AppointmentStatus::Cancelled, &remarks)
            .await
    }

    /// Student withdraws a pending request with a reason.
    pub async fn cancel(&self, session: &Session, id: Uuid, reason: &str) -> Result<Appointment> {
        let reason = require_remarks(reason, "Please provide a reason for cancellation")?;
        self.transition(session, id, AppointmentStatus::Cancelled, &reason)
            .await
    }

    /// Teacher marks a confirmed consultation as held.
    pub async fn complete(&self, session: &Session, id: Uuid) -> Result<Appointment> {
        self.transition(session, id, AppointmentStatus::Completed, "")
            .await
    }

    /// System-driven expiry of a stale appointment. `None` when the record is
    /// no longer active, including when another sweep got there first.
    #[tracing::instrument(skip(self, appointment), fields(appointment_id = %appointment.id))]
    pub async fn expire(&self, appointment: Appointment) -> Result<Option<Appointment>> {
        if !appointment.status.is_active() {
            return Ok(None);
        }

        match self
            .apply(appointment, AppointmentStatus::Cancelled, LATE_RESPONSE_REMARK, Actor::System)
            .await
        {
            Ok(expired) => Ok(Some(expired)),
            Err(AppError::InvalidTransition { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Active appointments dated before `today`, across all teachers.
    pub async fn stale_before(&self, today: NaiveDate) -> Result<Vec<Appointment>> {
        self.appointments.find_active_before(today).await
    }

    /// Active appointments of the viewer dated before `today`.
    pub async fn stale_for(&self, session: &Session, today: NaiveDate) -> Result<Vec<Appointment>> {
        Ok(self
            .list_for(session)
            .await?
            .into_iter()
            .filter(|a| a.status.is_active() && a.date < today)
            .collect())
    }

    #[tracing::instrument(skip(self, session, to, remarks), fields(user_id = %session.user_id, %to))]
    async fn transition(
        &self,
        session: &Session,
        id: Uuid,
        to: AppointmentStatus,
        remarks: &str,
    ) -> Result<Appointment> {
        let actor = match session.role {
            Role::Student => Actor::Student,
            Role::Teacher => Actor::Teacher,
            Role::Admin => {
                return Err(AppError::Forbidden("Administrators cannot change appointments".into()))
            }
        };

        let current = self.find(id).await?;
        let owner = match actor {
            Actor::Student => current.student_id,
            Actor::Teacher | Actor::System => current.teacher_id,
        };
        if owner != session.user_id {
            return Err(AppError::Forbidden("Not your appointment".into()));
        }

        self.apply(current, to, remarks, actor).await
    }

    async fn apply(
        &self,
        current: Appointment,
        to: AppointmentStatus,
        remarks: &str,
        actor: Actor,
    ) -> Result<Appointment> {
        if !current.status.can_transition(to, actor) {
            return Err(AppError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        let Some(updated) = self
            .appointments
            .update_status(current.id, current.status, to, remarks)
            .await?
        else {
            // Someone else changed it between our read and write
            let latest = self.find(current.id).await?;
            tracing::warn!(appointment_id = %current.id, status = %latest.status, "status changed concurrently");
            return Err(AppError::InvalidTransition {
                from: latest.status,
                to,
            });
        };

        tracing::info!(appointment_id = %updated.id, from = %current.status, to = %updated.status, "appointment status changed");
        self.publish(&updated);

        if let Err(e) = self.notifications.status_changed(&updated, actor).await {
            tracing::error!("Failed to write status notifications for {}: {}", updated.id, e);
        }

        Ok(updated)
    }

    async fn find(&self, id: Uuid) -> Result<Appointment> {
        self.appointments
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Appointment not found".into()))
    }

    fn publish(&self, appointment: &Appointment) {
        // No subscribers is fine
        let _ = self.appointment_tx.send(appointment.clone());
    }

    /// The viewer's own appointments.
    pub async fn list_for(&self, session: &Session) -> Result<Vec<Appointment>> {
        match session.role {
            Role::Student => self.appointments.find_by_student(session.user_id).await,
            Role::Teacher => self.appointments.find_by_teacher(session.user_id).await,
            Role::Admin => Err(AppError::Forbidden("Administrators have no appointments".into())),
        }
    }

    pub async fn derived_lists(&self, session: &Session) -> Result<DerivedLists> {
        let records = self.list_for(session).await?;
        Ok(apply_appointment_snapshot(session, records))
    }

    /// Current lists first, then fresh lists after every write touching the
    /// viewer. Dropping the stream unsubscribes.
    pub fn watch(&self, session: Session) -> impl Stream<Item = Result<DerivedLists>> + Send + 'static {
        let viewer = session.user_id;
        let updates = BroadcastStream::new(self.appointment_tx.subscribe()).filter_map(move |event| async move {
            match event {
                Ok(appointment) if appointment.involves(viewer) => Some(()),
                Ok(_) => None,
                // Missed events; recompute anyway
                Err(_) => Some(()),
            }
        });

        let service = self.clone();
        stream::once(async {}).chain(updates).then(move |()| {
            let service = service.clone();
            let session = session.clone();
            async move { service.derived_lists(&session).await }
        })
    }

    async fn counterpart_name(&self, user_id: Uuid, placeholder: &str) -> String {
        match self.users.get_user_by_id(user_id).await {
            Ok(user) => display_name_or(user.as_ref(), placeholder),
            Err(e) => {
                tracing::warn!(%user_id, "profile lookup failed: {}", e);
                placeholder.to_string()
            }
        }
    }

    /// Appointments with the other party's name; failed lookups degrade to placeholders.
    pub async fn list_with_names(&self, session: &Session) -> Result<Vec<AppointmentSummary>> {
        let appointments = self.list_for(session).await?;
        let mut names: HashMap<Uuid, String> = HashMap::new();
        let mut summaries = Vec::with_capacity(appointments.len());

        for appointment in appointments {
            let (counterpart, placeholder) = match session.role {
                Role::Student => (appointment.teacher_id, UNKNOWN_TEACHER),
                _ => (appointment.student_id, UNKNOWN_STUDENT),
            };
            let counterpart_name = match names.get(&counterpart) {
                Some(name) => name.clone(),
                None => {
                    let name = self.counterpart_name(counterpart, placeholder).await;
                    names.insert(counterpart, name.clone());
                    name
                }
            };
            summaries.push(AppointmentSummary {
                appointment,
                counterpart_name,
            });
        }

        Ok(summaries)
    }

    /// Active appointments for the home screen, newest first.
    pub async fn home_summary(&self, session: &Session) -> Result<HomeSummary> {
        let mut appointments: Vec<AppointmentSummary> = self
            .list_with_names(session)
            .await?
            .into_iter()
            .filter(|s| s.appointment.status.is_active())
            .collect();
        appointments.sort_by(|a, b| sort_key(&b.appointment).cmp(&sort_key(&a.appointment)));

        let pending = appointments
            .iter()
            .filter(|s| s.appointment.status == AppointmentStatus::Pending)
            .count();

        Ok(HomeSummary {
            total: appointments.len(),
            pending,
            appointments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appointment::AppointmentType;
    use crate::memory::InMemoryStore;
    use crate::user::NewUser;

    type TestService = AppointmentService<InMemoryStore, InMemoryStore, InMemoryStore>;

    const NINE: &str = "09:00 AM to 09:30 AM";

    struct Fixture {
        store: InMemoryStore,
        service: TestService,
        student: Session,
        teacher: Session,
    }

    async fn register(store: &InMemoryStore, username: &str, role: Role) -> Session {
        let user = UserRepository::create(
            store,
            &NewUser {
                username: username.to_string(),
                password_hash: "hash".to_string(),
                role,
                first_name: username.to_string(),
                last_name: "Tester".to_string(),
                department: None,
                grade_level: None,
            },
        )
        .await
        .unwrap()
        .unwrap();
        Session::from(&user)
    }

    async fn fixture() -> Fixture {
        let store = InMemoryStore::new();
        let service = AppointmentService::new(
            store.clone(),
            store.clone(),
            NotificationService::new(store.clone()),
        );
        let student = register(&store, "student", Role::Student).await;
        let teacher = register(&store, "teacher", Role::Teacher).await;
        Fixture {
            store,
            service,
            student,
            teacher,
        }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn request(teacher: &Session, date: NaiveDate, time: &str) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            teacher_id: Some(teacher.user_id),
            date: Some(date),
            time: Some(time.to_string()),
            kind: Some(AppointmentType::Academic),
            reason: "x".to_string(),
        }
    }

    async fn book(f: &Fixture) -> Appointment {
        f.service
            .create_appointment(&f.student, request(&f.teacher, monday(), NINE))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_booking_creates_pending_and_two_notifications() {
        let f = fixture().await;
        let appointment = book(&f).await;

        assert_eq!(appointment.status, AppointmentStatus::Pending);
        assert_eq!(appointment.student_id, f.student.user_id);
        assert_eq!(appointment.teacher_id, f.teacher.user_id);
        assert_eq!(appointment.remarks, "");

        let to_teacher = f.store.find_by_recipient(f.teacher.user_id).await.unwrap();
        let to_student = f.store.find_by_recipient(f.student.user_id).await.unwrap();
        assert_eq!(to_teacher.len(), 1);
        assert_eq!(to_student.len(), 1);
        assert_eq!(to_teacher[0].appointment_id, Some(appointment.id));
        assert!(to_student[0].description.contains("Prof.teacher Tester"));
    }

    #[tokio::test]
    async fn test_missing_fields_block_submission() {
        let f = fixture().await;

        let err = f
            .service
            .create_appointment(&f.student, CreateAppointmentRequest::default())
            .await
            .unwrap_err();

        let fields = err.field_errors().unwrap();
        for field in ["teacher_id", "date", "time", "kind", "reason"] {
            assert!(fields.contains(field), "missing {field}");
        }
        assert!(f.service.list_for(&f.student).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_weekend_and_unknown_slot_rejected() {
        let f = fixture().await;
        let saturday = NaiveDate::from_ymd_opt(2026, 10, 24).unwrap();

        let err = f
            .service
            .create_appointment(&f.student, request(&f.teacher, saturday, "05:00 PM to 05:30 PM"))
            .await
            .unwrap_err();

        let fields = err.field_errors().unwrap();
        assert_eq!(fields.get("date"), Some("Please select a weekday."));
        assert_eq!(fields.get("time"), Some("Please select a valid time slot."));
    }

    #[tokio::test]
    async fn test_teacher_must_exist() {
        let f = fixture().await;

        let err = f
            .service
            .create_appointment(&f.student, request(&f.student, monday(), NINE))
            .await
            .unwrap_err();
        assert!(err.field_errors().unwrap().contains("teacher_id"));
    }

    #[tokio::test]
    async fn test_booked_slot_rejected_on_check() {
        let f = fixture().await;
        book(&f).await;

        let err = f
            .service
            .create_appointment(&f.student, request(&f.teacher, monday(), NINE))
            .await
            .unwrap_err();
        assert_eq!(
            err.field_errors().unwrap().get("time"),
            Some("This time slot is already booked.")
        );
    }

    #[tokio::test]
    async fn test_padded_label_for_booked_slot_is_field_error() {
        let f = fixture().await;
        book(&f).await;

        let err = f
            .service
            .create_appointment(&f.student, request(&f.teacher, monday(), " 09:00 AM to 09:30 AM "))
            .await
            .unwrap_err();
        assert_eq!(
            err.field_errors().unwrap().get("time"),
            Some("This time slot is already booked.")
        );
    }

    #[tokio::test]
    async fn test_only_students_book() {
        let f = fixture().await;

        let err = f
            .service
            .create_appointment(&f.teacher, request(&f.teacher, monday(), NINE))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_stale_check_cannot_double_book() {
        let f = fixture().await;

        // Both requests see a free slot before either write lands
        let availability = f.service.availability(f.teacher.user_id).await.unwrap();
        assert!(availability.is_time_slot_available(monday(), NINE));

        let first = book(&f).await;
        let rival = Appointment::pending(
            Uuid::new_v4(),
            f.teacher.user_id,
            monday(),
            NINE.to_string(),
            AppointmentType::Personal,
            "y".to_string(),
        );

        assert!(f.store.insert_if_slot_free(&rival).await.unwrap().is_none());
        assert_eq!(f.service.list_for(&f.teacher).await.unwrap(), vec![first]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_bookings_have_one_winner() {
        let f = fixture().await;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = f.service.clone();
                let student = f.student.clone();
                let payload = request(&f.teacher, monday(), NINE);
                tokio::spawn(async move { service.create_appointment(&student, payload).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(AppError::SlotTaken { .. }) | Err(AppError::Validation(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(f.service.list_for(&f.teacher).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_decline_with_remark() {
        let f = fixture().await;
        let appointment = book(&f).await;

        let declined = f
            .service
            .decline(&f.teacher, appointment.id, "schedule conflict")
            .await
            .unwrap();

        assert_eq!(declined.status, AppointmentStatus::Cancelled);
        assert_eq!(declined.remarks, "schedule conflict");

        let to_student = f.store.find_by_recipient(f.student.user_id).await.unwrap();
        assert!(to_student.iter().any(|n| n.title == "Consultation Declined"));
    }

    #[tokio::test]
    async fn test_blank_reason_writes_nothing() {
        let f = fixture().await;
        let appointment = book(&f).await;

        let decline = f.service.decline(&f.teacher, appointment.id, "   ").await.unwrap_err();
        let cancel = f.service.cancel(&f.student, appointment.id, "").await.unwrap_err();

        assert!(decline.field_errors().unwrap().contains("remarks"));
        assert!(cancel.field_errors().unwrap().contains("remarks"));
        let stored = f.store.find_by_id(appointment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Pending);
    }

    #[tokio::test]
    async fn test_student_cancel_frees_slot() {
        let f = fixture().await;
        let appointment = book(&f).await;

        let cancelled = f
            .service
            .cancel(&f.student, appointment.id, "  feeling unwell ")
            .await
            .unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert_eq!(cancelled.remarks, "feeling unwell");

        let availability = f.service.availability(f.teacher.user_id).await.unwrap();
        assert!(availability.is_time_slot_available(monday(), NINE));
        book(&f).await;
    }

    #[tokio::test]
    async fn test_accept_then_complete() {
        let f = fixture().await;
        let appointment = book(&f).await;

        let err = f.service.complete(&f.teacher, appointment.id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: AppointmentStatus::Pending,
                to: AppointmentStatus::Completed
            }
        ));

        let confirmed = f.service.accept(&f.teacher, appointment.id).await.unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);

        let completed = f.service.complete(&f.teacher, appointment.id).await.unwrap();
        assert_eq!(completed.status, AppointmentStatus::Completed);
        assert_eq!(completed.remarks, "");

        // Terminal
        let err = f.service.decline(&f.teacher, appointment.id, "late").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_student_cannot_cancel_confirmed() {
        let f = fixture().await;
        let appointment = book(&f).await;
        f.service.accept(&f.teacher, appointment.id).await.unwrap();

        let err = f.service.cancel(&f.student, appointment.id, "changed mind").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_other_teacher_forbidden() {
        let f = fixture().await;
        let appointment = book(&f).await;
        let stranger = register(&f.store, "other", Role::Teacher).await;

        let err = f.service.accept(&stranger, appointment.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = f.service.accept(&f.teacher, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_expire_is_idempotent() {
        let f = fixture().await;
        let appointment = book(&f).await;

        let expired = f.service.expire(appointment.clone()).await.unwrap().unwrap();
        assert_eq!(expired.status, AppointmentStatus::Cancelled);
        assert_eq!(expired.remarks, LATE_RESPONSE_REMARK);

        // Stale copy still says Pending; the store refuses the second write
        assert!(f.service.expire(appointment).await.unwrap().is_none());
        assert!(f.service.expire(expired).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lists_and_home_summary() {
        let f = fixture().await;
        let first = book(&f).await;
        let second = f
            .service
            .create_appointment(&f.student, request(&f.teacher, monday(), "10:00 AM to 10:30 AM"))
            .await
            .unwrap();
        f.service.accept(&f.teacher, second.id).await.unwrap();

        let lists = f.service.derived_lists(&f.teacher).await.unwrap();
        assert_eq!(lists.pending[0].id, first.id);
        assert_eq!(lists.upcoming[0].id, second.id);

        let home = f.service.home_summary(&f.student).await.unwrap();
        assert_eq!(home.total, 2);
        assert_eq!(home.pending, 1);
        assert_eq!(home.appointments[0].counterpart_name, "teacher Tester");

        let names = f.service.list_with_names(&f.teacher).await.unwrap();
        assert!(names.iter().all(|s| s.counterpart_name == "student Tester"));
    }

    #[tokio::test]
    async fn test_missing_profile_uses_placeholder() {
        let f = fixture().await;
        let orphan = Appointment::pending(
            f.student.user_id,
            Uuid::new_v4(),
            monday(),
            NINE.to_string(),
            AppointmentType::Personal,
            "x".to_string(),
        );
        f.store.insert_if_slot_free(&orphan).await.unwrap();

        let home = f.service.home_summary(&f.student).await.unwrap();
        assert_eq!(home.appointments[0].counterpart_name, UNKNOWN_TEACHER);
    }

    #[tokio::test]
    async fn test_watch_emits_on_change() {
        let f = fixture().await;
        let mut feed = Box::pin(f.service.watch(f.student.clone()));

        let initial = feed.next().await.unwrap().unwrap();
        assert!(initial.is_empty());

        let appointment = book(&f).await;
        let after_booking = feed.next().await.unwrap().unwrap();
        assert_eq!(after_booking.pending.len(), 1);

        f.service.accept(&f.teacher, appointment.id).await.unwrap();
        let after_accept = feed.next().await.unwrap().unwrap();
        assert!(after_accept.pending.is_empty());
        assert_eq!(after_accept.upcoming.len(), 1);
    }
}
