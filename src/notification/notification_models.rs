use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::appointment::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Appointment,
    Message,
    System,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Appointment => "appointment",
            NotificationType::Message => "message",
            NotificationType::System => "system",
        }
    }
}

impl FromStr for NotificationType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "appointment" => Ok(NotificationType::Appointment),
            "message" => Ok(NotificationType::Message),
            "system" => Ok(NotificationType::System),
            _ => Err(ParseEnumError {
                kind: "notification type",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub read: bool,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub kind: NotificationType,
}

impl NewNotification {
    pub fn appointment(recipient_id: Uuid, appointment_id: Uuid, title: &str, description: String) -> Self {
        Self {
            recipient_id,
            appointment_id: Some(appointment_id),
            title: title.to_string(),
            description,
            kind: NotificationType::Appointment,
        }
    }
}

/// A recipient's notifications split the way the inbox shows them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Inbox {
    pub today: Vec<Notification>,
    pub earlier: Vec<Notification>,
}
