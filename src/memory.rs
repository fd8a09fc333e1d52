use chrono::{NaiveDate, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::appointment::{Appointment, AppointmentRepository, AppointmentStatus};
use crate::auth::{Session, SessionStore};
use crate::error::{AppError, Result};
use crate::notification::{NewNotification, Notification, NotificationRepository, NotificationType};
use crate::user::user_repository::username_taken;
use crate::user::{AccountStatus, NewUser, Role, User, UserRepository};

/// In-process implementation of every storage port.
///
/// Same semantics as the Postgres repositories: a slot claim keyed by
/// `teacherId:date:slot` stands in for the partial unique index, and status
/// updates are compare-and-set on the previous status.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    appointments: Arc<DashMap<Uuid, Appointment>>,
    slot_claims: Arc<DashMap<String, Uuid>>,
    notifications: Arc<DashMap<Uuid, Notification>>,
    users: Arc<DashMap<Uuid, User>>,
    usernames: Arc<DashMap<String, Uuid>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn select_appointments(&self, keep: impl Fn(&Appointment) -> bool) -> Vec<Appointment> {
        let mut found: Vec<Appointment> = self
            .appointments
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|a| (a.date, a.created_at));
        found
    }
}

impl AppointmentRepository for InMemoryStore {
    async fn insert_if_slot_free(&self, appointment: &Appointment) -> Result<Option<Appointment>> {
        if !appointment.status.is_active() {
            self.appointments.insert(appointment.id, appointment.clone());
            return Ok(Some(appointment.clone()));
        }

        match self.slot_claims.entry(appointment.slot_key()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(claim) => {
                claim.insert(appointment.id);
                self.appointments.insert(appointment.id, appointment.clone());
                Ok(Some(appointment.clone()))
            }
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>> {
        Ok(self.appointments.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<Appointment>> {
        Ok(self.select_appointments(|a| a.teacher_id == teacher_id))
    }

    async fn find_by_student(&self, student_id: Uuid) -> Result<Vec<Appointment>> {
        Ok(self.select_appointments(|a| a.student_id == student_id))
    }

    async fn find_active_before(&self, date: NaiveDate) -> Result<Vec<Appointment>> {
        Ok(self.select_appointments(|a| a.status.is_active() && a.date < date))
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
        remarks: &str,
    ) -> Result<Option<Appointment>> {
        let updated = {
            let Some(mut entry) = self.appointments.get_mut(&id) else {
                return Ok(None);
            };
            if entry.status != from {
                return Ok(None);
            }
            entry.status = to;
            entry.remarks = remarks.to_string();
            entry.clone()
        };

        if to.is_terminal() {
            self.slot_claims
                .remove_if(&updated.slot_key(), |_, holder| *holder == id);
        }

        Ok(Some(updated))
    }
}

impl UserRepository for InMemoryStore {
    async fn create(&self, user: &NewUser) -> Result<Option<User>> {
        match self.usernames.entry(user.username.clone()) {
            Entry::Occupied(_) => Ok(None),
            Entry::Vacant(name) => {
                let created = User {
                    id: Uuid::new_v4(),
                    username: user.username.clone(),
                    password_hash: Some(user.password_hash.clone()),
                    role: user.role,
                    first_name: user.first_name.clone(),
                    last_name: user.last_name.clone(),
                    department: user.department.clone(),
                    grade_level: user.grade_level.clone(),
                    account_status: AccountStatus::NotUpdated,
                    created_at: Utc::now(),
                };
                name.insert(created.id);
                self.users.insert(created.id, created.clone());
                Ok(Some(created))
            }
        }
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let Some(id) = self.usernames.get(username).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_teachers(&self) -> Result<Vec<User>> {
        let mut teachers: Vec<User> = self
            .users
            .iter()
            .filter(|entry| entry.role == Role::Teacher)
            .map(|entry| entry.value().clone())
            .collect();
        teachers.sort_by(|a, b| (&a.last_name, &a.first_name).cmp(&(&b.last_name, &b.first_name)));
        Ok(teachers)
    }

    async fn list_all(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.users.iter().map(|entry| entry.value().clone()).collect();
        users.sort_by(|a, b| {
            (a.role.as_str(), &a.last_name, &a.first_name).cmp(&(b.role.as_str(), &b.last_name, &b.first_name))
        });
        Ok(users)
    }

    async fn update(&self, user: &User) -> Result<Option<User>> {
        let Some(previous) = self.users.get(&user.id).map(|entry| entry.username.clone()) else {
            return Ok(None);
        };

        if previous != user.username {
            match self.usernames.entry(user.username.clone()) {
                Entry::Occupied(_) => return Err(username_taken()),
                Entry::Vacant(name) => {
                    name.insert(user.id);
                }
            }
            self.usernames.remove_if(&previous, |_, holder| *holder == user.id);
        }

        let Some(mut stored) = self.users.get_mut(&user.id) else {
            return Ok(None);
        };
        let merged = User {
            role: stored.role,
            created_at: stored.created_at,
            ..user.clone()
        };
        *stored = merged;
        Ok(Some(stored.clone()))
    }
}

impl NotificationRepository for InMemoryStore {
    async fn create(&self, notification: &NewNotification) -> Result<Notification> {
        let created = Notification {
            id: Uuid::new_v4(),
            recipient_id: notification.recipient_id,
            appointment_id: notification.appointment_id,
            title: notification.title.clone(),
            description: notification.description.clone(),
            kind: notification.kind,
            read: false,
            time: Utc::now(),
        };
        self.notifications.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_recipient(&self, recipient_id: Uuid) -> Result<Vec<Notification>> {
        let mut found: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|entry| entry.recipient_id == recipient_id)
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| b.time.cmp(&a.time));
        Ok(found)
    }

    async fn mark_as_read(&self, id: Uuid, recipient_id: Uuid) -> Result<Option<Notification>> {
        let Some(mut entry) = self.notifications.get_mut(&id) else {
            return Ok(None);
        };
        if entry.recipient_id != recipient_id {
            return Ok(None);
        }
        entry.read = true;
        Ok(Some(entry.clone()))
    }

    async fn mark_all_as_read(&self, recipient_id: Uuid) -> Result<u64> {
        let mut updated = 0;
        for mut entry in self.notifications.iter_mut() {
            if entry.recipient_id == recipient_id && !entry.read {
                entry.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn count_unread(&self, recipient_id: Uuid, kind: NotificationType) -> Result<i64> {
        let count = self
            .notifications
            .iter()
            .filter(|entry| entry.recipient_id == recipient_id && entry.kind == kind && !entry.read)
            .count();
        i64::try_from(count).map_err(|_| AppError::InternalError)
    }
}

#[derive(Clone, Default)]
pub struct MemorySessionStore {
    current: Arc<Mutex<Option<Session>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<Session>> {
        let current = self.current.lock().map_err(|_| AppError::InternalError)?;
        Ok(current.clone())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let mut current = self.current.lock().map_err(|_| AppError::InternalError)?;
        *current = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut current = self.current.lock().map_err(|_| AppError::InternalError)?;
        *current = None;
        Ok(())
    }
}
