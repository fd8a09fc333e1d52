pub mod availability;
pub mod slots;

pub use availability::{is_weekday, Availability};
pub use slots::{generate_time_slots, slot_labels, TimeSlot, SLOT_MINUTES};
