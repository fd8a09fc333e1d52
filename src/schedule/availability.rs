use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::slots::{generate_time_slots, TimeSlot};
use crate::appointment::Appointment;
use crate::error::FieldErrors;

pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Slots already taken for one teacher, grouped by day.
///
/// Built from an already-fetched set of appointments, so every check is
/// synchronous. Only Pending and Confirmed appointments hold a slot.
#[derive(Debug, Clone)]
pub struct Availability {
    teacher_id: Uuid,
    booked: HashMap<NaiveDate, HashSet<String>>,
}

impl Availability {
    pub fn for_teacher<'a>(
        teacher_id: Uuid,
        appointments: impl IntoIterator<Item = &'a Appointment>,
    ) -> Self {
        let mut booked: HashMap<NaiveDate, HashSet<String>> = HashMap::new();

        for appointment in appointments {
            if appointment.teacher_id != teacher_id || !appointment.status.is_active() {
                continue;
            }
            booked
                .entry(appointment.date)
                .or_default()
                .insert(appointment.time.clone());
        }

        tracing::debug!(%teacher_id, days = booked.len(), "built teacher availability");
        Self { teacher_id, booked }
    }

    pub fn teacher_id(&self) -> Uuid {
        self.teacher_id
    }

    pub fn is_time_slot_available(&self, date: NaiveDate, slot: &str) -> bool {
        self.booked
            .get(&date)
            .map_or(true, |taken| !taken.contains(slot))
    }

    pub fn is_date_available(&self, date: NaiveDate) -> bool {
        generate_time_slots()
            .iter()
            .any(|slot| self.is_time_slot_available(date, &slot.label()))
    }

    pub fn available_slots(&self, date: NaiveDate) -> Vec<TimeSlot> {
        generate_time_slots()
            .into_iter()
            .filter(|slot| self.is_time_slot_available(date, &slot.label()))
            .collect()
    }

    /// Field errors for a requested date and slot label, empty when bookable.
    pub fn check(&self, date: NaiveDate, time: &str) -> FieldErrors {
        let time = time.trim();
        let mut errors = FieldErrors::new();

        if !is_weekday(date) {
            errors.add("date", "Please select a weekday.");
        } else if !self.is_date_available(date) {
            errors.add("date", "No available time slots on this date.");
        }

        if TimeSlot::from_label(time).is_none() {
            errors.add("time", "Please select a valid time slot.");
        } else if !self.is_time_slot_available(date, time) {
            errors.add("time", "This time slot is already booked.");
        }

        errors
    }
}
