use chrono::NaiveDate;
use futures::stream::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use super::notification_models::{Inbox, NewNotification, Notification, NotificationType};
use super::notification_repository::NotificationRepository;
use crate::appointment::{Actor, Appointment, AppointmentStatus};
use crate::auth::Session;
use crate::error::{AppError, Result};

fn when(appointment: &Appointment) -> String {
    format!("{} at {}", appointment.date.format("%a %b %d %Y"), appointment.time)
}

/// The pair written when a student books: one to the teacher, one to the student.
pub fn creation_messages(appointment: &Appointment, teacher_name: &str) -> [NewNotification; 2] {
    [
        NewNotification::appointment(
            appointment.teacher_id,
            appointment.id,
            "New Appointment Request",
            format!("New {} appointment scheduled for {}", appointment.kind, when(appointment)),
        ),
        NewNotification::appointment(
            appointment.student_id,
            appointment.id,
            "New Consultation",
            format!(
                "Your {} consultation with Prof.{} has been scheduled on {}",
                appointment.kind,
                teacher_name,
                when(appointment)
            ),
        ),
    ]
}

/// One record per affected party after `actor` moved the appointment to its
/// current status.
pub fn status_change_messages(appointment: &Appointment, actor: Actor) -> Vec<NewNotification> {
    let id = appointment.id;
    let kind = appointment.kind;
    let when = when(appointment);

    match (appointment.status, actor) {
        (AppointmentStatus::Confirmed, _) => vec![NewNotification::appointment(
            appointment.student_id,
            id,
            "Consultation Accepted",
            format!("Your {} consultation on {} has been confirmed", kind, when),
        )],
        (AppointmentStatus::Completed, _) => vec![NewNotification::appointment(
            appointment.student_id,
            id,
            "Consultation Complete",
            format!("Your {} consultation on {} has been completed", kind, when),
        )],
        (AppointmentStatus::Cancelled, Actor::Teacher) => vec![NewNotification::appointment(
            appointment.student_id,
            id,
            "Consultation Declined",
            format!(
                "Your {} consultation on {} was declined: {}",
                kind, when, appointment.remarks
            ),
        )],
        (AppointmentStatus::Cancelled, Actor::Student) => vec![NewNotification::appointment(
            appointment.teacher_id,
            id,
            "Consultation Cancelled",
            format!(
                "The {} consultation on {} was cancelled by the student: {}",
                kind, when, appointment.remarks
            ),
        )],
        (AppointmentStatus::Cancelled, Actor::System) => [appointment.student_id, appointment.teacher_id]
            .into_iter()
            .map(|recipient| {
                NewNotification::appointment(
                    recipient,
                    id,
                    "Consultation Expired",
                    format!("The {} consultation on {} was cancelled due to late response", kind, when),
                )
            })
            .collect(),
        (AppointmentStatus::Pending, _) => Vec::new(),
    }
}

/// Writes notification records and fans them out to live subscribers.
/// Delivery to devices happens elsewhere; only the record is written here.
#[derive(Clone)]
pub struct NotificationService<N> {
    repo: N,
    notification_tx: broadcast::Sender<Notification>,
}

impl<N: NotificationRepository> NotificationService<N> {
    pub fn new(repo: N) -> Self {
        let (notification_tx, _) = broadcast::channel(100);
        Self {
            repo,
            notification_tx,
        }
    }

    #[tracing::instrument(skip(self, appointment, teacher_name), fields(appointment_id = %appointment.id))]
    pub async fn appointment_created(
        &self,
        appointment: &Appointment,
        teacher_name: &str,
    ) -> Result<Vec<Notification>> {
        self.emit(creation_messages(appointment, teacher_name).to_vec()).await
    }

    #[tracing::instrument(skip(self, appointment), fields(appointment_id = %appointment.id, status = %appointment.status))]
    pub async fn status_changed(&self, appointment: &Appointment, actor: Actor) -> Result<Vec<Notification>> {
        self.emit(status_change_messages(appointment, actor)).await
    }

    async fn emit(&self, messages: Vec<NewNotification>) -> Result<Vec<Notification>> {
        let mut sent = Vec::with_capacity(messages.len());

        for message in messages {
            let notification = self.repo.create(&message).await?;
            tracing::info!(
                notification_id = %notification.id,
                recipient_id = %notification.recipient_id,
                "notification created"
            );
            // No subscribers is fine
            let _ = self.notification_tx.send(notification.clone());
            sent.push(notification);
        }

        Ok(sent)
    }

    pub async fn list(&self, recipient_id: Uuid) -> Result<Vec<Notification>> {
        self.repo.find_by_recipient(recipient_id).await
    }

    pub async fn inbox(&self, recipient_id: Uuid, today: NaiveDate) -> Result<Inbox> {
        let (todays, earlier): (Vec<Notification>, Vec<Notification>) = self
            .repo
            .find_by_recipient(recipient_id)
            .await?
            .into_iter()
            .partition(|n| n.time.date_naive() == today);

        Ok(Inbox {
            today: todays,
            earlier,
        })
    }

    #[tracing::instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn mark_as_read(&self, session: &Session, id: Uuid) -> Result<Notification> {
        self.repo
            .mark_as_read(id, session.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification not found".into()))
    }

    #[tracing::instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn mark_all_as_read(&self, session: &Session) -> Result<u64> {
        let updated = self.repo.mark_all_as_read(session.user_id).await?;
        tracing::debug!(updated, "notifications marked as read");
        Ok(updated)
    }

    /// Unread appointment notifications, the badge count.
    pub async fn count_unread(&self, session: &Session) -> Result<i64> {
        self.repo
            .count_unread(session.user_id, NotificationType::Appointment)
            .await
    }

    /// Live feed of new notifications for one recipient. Dropping the stream unsubscribes.
    pub fn subscribe(&self, recipient_id: Uuid) -> impl Stream<Item = Notification> + Send + 'static {
        BroadcastStream::new(self.notification_tx.subscribe()).filter_map(move |msg| async move {
            match msg {
                Ok(notification) if notification.recipient_id == recipient_id => Some(notification),
                _ => None,
            }
        })
    }
}
