use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Remark written when a stale appointment is expired.
pub const LATE_RESPONSE_REMARK: &str = "The appointment is cancelled due to late response";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "Pending",
            AppointmentStatus::Confirmed => "Confirmed",
            AppointmentStatus::Completed => "Completed",
            AppointmentStatus::Cancelled => "Cancelled",
        }
    }

    /// Active appointments hold their slot.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn can_transition(&self, to: AppointmentStatus, actor: Actor) -> bool {
        use AppointmentStatus::*;

        matches!(
            (actor, *self, to),
            (Actor::Student, Pending, Cancelled)
                | (Actor::Teacher, Pending, Confirmed)
                | (Actor::Teacher, Pending, Cancelled)
                | (Actor::Teacher, Confirmed, Completed)
                | (Actor::System, Pending | Confirmed, Cancelled)
        )
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Accepts the legacy spellings found in older records, case-insensitively.
/// "Canceled" and "Declined" both fold into `Cancelled`.
impl FromStr for AppointmentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" | "canceled" | "declined" => Ok(AppointmentStatus::Cancelled),
            _ => Err(ParseEnumError {
                kind: "appointment status",
                value: s.to_string(),
            }),
        }
    }
}

impl From<AppointmentStatus> for String {
    fn from(status: AppointmentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl TryFrom<String> for AppointmentStatus {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentType {
    Academic,
    Personal,
}

impl std::fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppointmentType::Academic => write!(f, "Academic"),
            AppointmentType::Personal => write!(f, "Personal"),
        }
    }
}

impl FromStr for AppointmentType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "academic" => Ok(AppointmentType::Academic),
            "personal" => Ok(AppointmentType::Personal),
            _ => Err(ParseEnumError {
                kind: "appointment type",
                value: s.to_string(),
            }),
        }
    }
}

/// Who is driving a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Student,
    Teacher,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub teacher_id: Uuid,
    pub date: NaiveDate,
    pub time: String,
    #[serde(rename = "type")]
    pub kind: AppointmentType,
    pub reason: String,
    pub status: AppointmentStatus,
    pub remarks: String,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn pending(
        student_id: Uuid,
        teacher_id: Uuid,
        date: NaiveDate,
        time: String,
        kind: AppointmentType,
        reason: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            teacher_id,
            date,
            time,
            kind,
            reason,
            status: AppointmentStatus::Pending,
            remarks: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn slot_key(&self) -> String {
        slot_key(self.teacher_id, self.date, &self.time)
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.student_id == user_id || self.teacher_id == user_id
    }
}

/// Uniqueness key for an active booking: `teacherId:date:slot`.
pub fn slot_key(teacher_id: Uuid, date: NaiveDate, time: &str) -> String {
    format!("{}:{}:{}", teacher_id, date, time.trim())
}
