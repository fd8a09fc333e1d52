use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::appointment_models::{Appointment, AppointmentType};

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateAppointmentRequest {
    #[validate(required(message = "Please select a teacher"))]
    pub teacher_id: Option<Uuid>,
    #[validate(required(message = "Please select a date"))]
    pub date: Option<NaiveDate>,
    #[validate(required(message = "Please select a time slot"))]
    pub time: Option<String>,
    #[validate(required(message = "Please select an appointment type"))]
    pub kind: Option<AppointmentType>,
    #[validate(custom(function = "not_blank", message = "Please provide a reason"))]
    pub reason: String,
}

/// A reason for declining or cancelling; blank reasons are rejected before any write.
pub fn require_remarks(remarks: &str, message: &str) -> crate::error::Result<String> {
    let trimmed = remarks.trim();
    if trimmed.is_empty() {
        return Err(crate::error::AppError::Validation(
            crate::error::FieldErrors::single("remarks", message),
        ));
    }
    Ok(trimmed.to_string())
}

/// Appointment with the counterpart's display name resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentSummary {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub counterpart_name: String,
}

/// Figures shown on a student's home screen.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeSummary {
    pub appointments: Vec<AppointmentSummary>,
    pub total: usize,
    pub pending: usize,
}
