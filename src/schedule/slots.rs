use chrono::NaiveTime;
use serde::Serialize;
use std::fmt;

pub const SLOT_MINUTES: u32 = 30;

const DAY_START_MINUTES: u32 = 8 * 60;
/// Last slot starts at 16:00 and runs to 16:30.
const FINAL_START_MINUTES: u32 = 16 * 60;

/// A half-hour consultation window within the working day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeSlot {
    /// Label stored on appointments, e.g. `08:00 AM to 08:30 AM`.
    pub fn label(&self) -> String {
        format!(
            "{} to {}",
            self.start.format("%I:%M %p"),
            self.end.format("%I:%M %p")
        )
    }

    pub fn from_label(label: &str) -> Option<TimeSlot> {
        let label = label.trim();
        generate_time_slots()
            .into_iter()
            .find(|slot| slot.label() == label)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

fn minutes_to_time(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
}

/// Every bookable slot of a day, in ascending order. The set is the same for
/// every calendar day; weekends are rejected separately.
pub fn generate_time_slots() -> Vec<TimeSlot> {
    (DAY_START_MINUTES..=FINAL_START_MINUTES)
        .step_by(SLOT_MINUTES as usize)
        .filter_map(|start| {
            Some(TimeSlot {
                start: minutes_to_time(start)?,
                end: minutes_to_time(start + SLOT_MINUTES)?,
            })
        })
        .collect()
}

pub fn slot_labels() -> Vec<String> {
    generate_time_slots().iter().map(TimeSlot::label).collect()
}
