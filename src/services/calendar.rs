use anyhow::Context;
use async_trait::async_trait;
use chrono::Duration;
use serde_json::json;

use crate::models::Appointment;

const SLOT_MINUTES: i64 = 60;

/// External calendar the agenda is mirrored into. The local database stays
/// authoritative; mirror failures never block a booking.
#[async_trait]
pub trait CalendarMirror: Send + Sync {
    async fn check_availability(&self, appt: &Appointment) -> anyhow::Result<bool>;
    async fn create_event(&self, appt: &Appointment) -> anyhow::Result<String>;
    async fn delete_event(&self, event_id: &str) -> anyhow::Result<()>;
}

pub struct GoogleCalendarMirror {
    access_token: String,
    calendar_id: String,
    client: reqwest::Client,
}

impl GoogleCalendarMirror {
    pub fn new(access_token: String, calendar_id: String) -> Self {
        Self {
            access_token,
            calendar_id,
            client: reqwest::Client::new(),
        }
    }

    fn event_window(appt: &Appointment) -> (String, String) {
        let start = appt.date_time.format("%Y-%m-%dT%H:%M:%S").to_string();
        let end = (appt.date_time + Duration::minutes(SLOT_MINUTES))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();
        (start, end)
    }
}

#[async_trait]
impl CalendarMirror for GoogleCalendarMirror {
    async fn check_availability(&self, appt: &Appointment) -> anyhow::Result<bool> {
        let (start, end) = Self::event_window(appt);
        let body = json!({
            "timeMin": start,
            "timeMax": end,
            "items": [{"id": self.calendar_id}],
        });

        let resp = self
            .client
            .post("https://www.googleapis.com/calendar/v3/freeBusy")
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("failed to call freeBusy API")?
            .error_for_status()
            .context("freeBusy API returned error")?;

        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse freeBusy response")?;

        let busy = data["calendars"][&self.calendar_id]["busy"]
            .as_array()
            .map(|b| !b.is_empty())
            .unwrap_or(false);

        Ok(!busy)
    }

    async fn create_event(&self, appt: &Appointment) -> anyhow::Result<String> {
        let (start, end) = Self::event_window(appt);
        let url = format!(
            "https://www.googleapis.com/calendar/v3/calendars/{}/events",
            self.calendar_id
        );

        let body = json!({
            "summary": format!("Turno: {}", appt.patient_name),
            "description": format!("Teléfono: {}", appt.phone_number),
            "start": {"dateTime": start},
            "end": {"dateTime": end},
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("failed to create calendar event")?
            .error_for_status()
            .context("calendar API returned error")?;

        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse event response")?;

        data["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing event id in calendar response"))
    }

    async fn delete_event(&self, event_id: &str) -> anyhow::Result<()> {
        let url = format!(
            "https://www.googleapis.com/calendar/v3/calendars/{}/events/{}",
            self.calendar_id, event_id
        );

        self.client
            .delete(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("failed to delete calendar event")?
            .error_for_status()
            .context("calendar API returned error")?;

        Ok(())
    }
}

/// iCalendar invite for the clinic's notification email.
pub fn generate_ics(appt: &Appointment, clinic_name: &str) -> String {
    let dtstart = appt.date_time.format("%Y%m%dT%H%M%S").to_string();
    let dtend = (appt.date_time + Duration::minutes(SLOT_MINUTES))
        .format("%Y%m%dT%H%M%S")
        .to_string();
    let dtstamp = appt.created_at.format("%Y%m%dT%H%M%S").to_string();
    let uid = format!("{}@turnero", appt.id);

    let summary = format!("Turno: {} - {}", appt.patient_name, clinic_name);
    let description = format!("Paciente: {} ({})", appt.patient_name, appt.phone_number);

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Turnero//Appointment Agent//ES\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use chrono::NaiveDateTime;

    fn parse(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn generates_one_hour_event() {
        let appt = Appointment {
            id: "test-123".to_string(),
            phone_number: "+5491112345678".to_string(),
            patient_name: "Juan Perez".to_string(),
            date_time: parse("2027-03-15 14:00:00"),
            professional: None,
            specialty: None,
            status: AppointmentStatus::Pending,
            confirmation_sent: false,
            followup_sent: false,
            attended: None,
            external_event_id: None,
            created_at: parse("2027-03-10 10:00:00"),
            updated_at: parse("2027-03-10 10:00:00"),
        };

        let ics = generate_ics(&appt, "Clínica Demo");
        assert!(ics.contains("BEGIN:VCALENDAR"));
        assert!(ics.contains("DTSTART:20270315T140000"));
        assert!(ics.contains("DTEND:20270315T150000"));
        assert!(ics.contains("SUMMARY:Turno: Juan Perez - Clínica Demo"));
        assert!(ics.contains("UID:test-123@turnero"));
        assert!(ics.contains("END:VCALENDAR"));
    }
}
