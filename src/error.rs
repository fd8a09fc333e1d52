use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::appointment::AppointmentStatus;

/// Per-field validation messages, keyed by request field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: &str) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Keeps the first message reported for a field.
    pub fn add(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Adds every field of `other` not already reported.
    pub fn merge(&mut self, other: FieldErrors) {
        for (field, message) in other.0 {
            self.0.entry(field).or_insert(message);
        }
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    #[error("Time slot {time} on {date} is already booked")]
    SlotTaken { date: NaiveDate, time: String },

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error")]
    InternalError,
}

impl From<validator::ValidationErrors> for FieldErrors {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();
        for (field, errors) in err.field_errors() {
            let message = errors
                .iter()
                .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| "This field is required".to_string());
            fields.add(&field.to_string(), &message);
        }
        fields
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.into())
    }
}

/// What the user is shown when an operation fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub retry: bool,
}

impl Alert {
    fn new(title: &str, message: &str, retry: bool) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            retry,
        }
    }
}

impl AppError {
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            AppError::Validation(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn alert(&self) -> Alert {
        match self {
            AppError::Validation(_) => Alert::new(
                "Booking Failed",
                "Please fill in all required fields correctly.",
                false,
            ),
            AppError::SlotTaken { .. } => Alert::new(
                "Time Unavailable",
                "This time slot is already booked.",
                false,
            ),
            AppError::InvalidTransition { .. } => Alert::new(
                "Action Unavailable",
                "This consultation can no longer be updated.",
                false,
            ),
            AppError::NotFound(msg) => Alert::new("Not Found", msg, false),
            AppError::Forbidden(msg) => Alert::new("Not Allowed", msg, false),
            AppError::Authentication(msg) => Alert::new("Login Failed", msg, false),
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                Alert::new("Error", "Something went wrong. Please try again.", true)
            }
            AppError::Io(_)
            | AppError::Serialization(_)
            | AppError::Config(_)
            | AppError::InternalError => {
                tracing::error!("Internal error: {}", self);
                Alert::new("Error", "Something went wrong. Please try again.", true)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_keep_first_message() {
        let mut errors = FieldErrors::new();
        errors.add("date", "Please select a weekday.");
        errors.add("date", "No available time slots on this date.");

        assert_eq!(errors.len(), 1);
        assert_eq!(errors.get("date"), Some("Please select a weekday."));
    }

    #[test]
    fn test_empty_field_errors_is_ok() {
        assert!(FieldErrors::new().into_result().is_ok());

        let err = FieldErrors::single("reason", "required")
            .into_result()
            .unwrap_err();
        assert!(err.field_errors().unwrap().contains("reason"));
    }

    #[test]
    fn test_write_failures_share_generic_alert() {
        let db = AppError::Database(sqlx::Error::PoolTimedOut).alert();
        let internal = AppError::InternalError.alert();

        assert_eq!(db, internal);
        assert!(db.retry);
    }

    #[test]
    fn test_validation_alert_blocks_without_retry() {
        let alert = AppError::Validation(FieldErrors::single("time", "required")).alert();
        assert_eq!(alert.title, "Booking Failed");
        assert!(!alert.retry);
    }
}
