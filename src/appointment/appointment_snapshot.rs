use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use super::appointment_models::{Appointment, AppointmentStatus};
use crate::auth::Session;
use crate::schedule::TimeSlot;
use crate::user::Role;

/// The four tabs every appointment screen shows, derived from raw records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DerivedLists {
    /// Oldest date first.
    pub pending: Vec<Appointment>,
    /// Confirmed, newest date first.
    pub upcoming: Vec<Appointment>,
    pub completed: Vec<Appointment>,
    pub cancelled: Vec<Appointment>,
}

impl DerivedLists {
    pub fn active_count(&self) -> usize {
        self.pending.len() + self.upcoming.len()
    }

    pub fn len(&self) -> usize {
        self.active_count() + self.completed.len() + self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn visible_to(viewer: &Session, appointment: &Appointment) -> bool {
    match viewer.role {
        Role::Student => appointment.student_id == viewer.user_id,
        Role::Teacher => appointment.teacher_id == viewer.user_id,
        Role::Admin => true,
    }
}

pub(crate) fn sort_key(appointment: &Appointment) -> (NaiveDate, Option<NaiveTime>) {
    (
        appointment.date,
        TimeSlot::from_label(&appointment.time).map(|slot| slot.start),
    )
}

/// Recomputes the derived lists from a full snapshot of records.
///
/// Pure: the same records always give the same lists, so every live update can
/// simply call this again with the latest snapshot.
pub fn apply_appointment_snapshot(
    viewer: &Session,
    records: impl IntoIterator<Item = Appointment>,
) -> DerivedLists {
    let mut lists = DerivedLists::default();

    for appointment in records {
        if !visible_to(viewer, &appointment) {
            continue;
        }
        match appointment.status {
            AppointmentStatus::Pending => lists.pending.push(appointment),
            AppointmentStatus::Confirmed => lists.upcoming.push(appointment),
            AppointmentStatus::Completed => lists.completed.push(appointment),
            AppointmentStatus::Cancelled => lists.cancelled.push(appointment),
        }
    }

    lists.pending.sort_by_key(sort_key);
    for list in [&mut lists.upcoming, &mut lists.completed, &mut lists.cancelled] {
        list.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
    }

    lists
}
