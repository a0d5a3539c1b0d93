use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A committed booking. Slots are implicit one-hour blocks, so `date_time`
/// alone identifies the slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub phone_number: String,
    pub patient_name: String,
    pub date_time: NaiveDateTime,
    pub professional: Option<String>,
    pub specialty: Option<String>,
    pub status: AppointmentStatus,
    pub confirmation_sent: bool,
    pub followup_sent: bool,
    pub attended: Option<bool>,
    pub external_event_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    Absent,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Absent => "absent",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => AppointmentStatus::Confirmed,
            "cancelled" => AppointmentStatus::Cancelled,
            "completed" => AppointmentStatus::Completed,
            "absent" => AppointmentStatus::Absent,
            _ => AppointmentStatus::Pending,
        }
    }

    /// Statuses that occupy a slot on the schedule.
    pub fn is_active(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }
}

/// Image sent by a patient, linked to their most recent active appointment
/// when one exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub phone_number: String,
    pub appointment_id: Option<String>,
    pub media_url: String,
    pub media_type: Option<String>,
    pub created_at: NaiveDateTime,
}
