//! Availability and booking commit. The clinic runs a single-track hourly
//! schedule from 09:00 to 17:00; a slot is free when no pending or
//! confirmed appointment already holds it.

use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::Appointment;

const OPENING_HOUR: u32 = 9;
const CLOSING_HOUR: u32 = 17;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("slot already taken")]
    SlotTaken,
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Hourly start times for a working day.
pub fn slot_template() -> Vec<NaiveTime> {
    (OPENING_HOUR..CLOSING_HOUR)
        .filter_map(|h| NaiveTime::from_hms_opt(h, 0, 0))
        .collect()
}

pub fn available_slots(conn: &Connection, date: NaiveDate) -> anyhow::Result<Vec<NaiveTime>> {
    let booked = queries::booked_times(conn, date)?;
    Ok(slot_template()
        .into_iter()
        .filter(|slot| !booked.contains(slot))
        .collect())
}

pub fn is_available(conn: &Connection, date: NaiveDate, time: NaiveTime) -> anyhow::Result<bool> {
    Ok(available_slots(conn, date)?.contains(&time))
}

pub fn format_slots(slots: &[NaiveTime]) -> String {
    slots
        .iter()
        .map(|t| t.format("%H:%M").to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Inserts the appointment inside a transaction. A unique-index violation
/// on the slot means another conversation won the race.
pub fn commit(conn: &mut Connection, appt: &Appointment) -> Result<(), BookingError> {
    let tx = conn.transaction()?;
    match queries::insert_appointment(&tx, appt) {
        Ok(()) => {
            tx.commit()?;
            Ok(())
        }
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(BookingError::SlotTaken)
        }
        Err(e) => Err(BookingError::Storage(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use chrono::{NaiveDateTime, Utc};

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(include_str!("../../migrations/001_init.sql"))
            .unwrap();
        conn
    }

    fn make_appointment(date_time: NaiveDateTime) -> Appointment {
        let now = Utc::now().naive_utc();
        Appointment {
            id: uuid::Uuid::new_v4().to_string(),
            phone_number: "+5491112345678".to_string(),
            patient_name: "Juan Perez".to_string(),
            date_time,
            professional: None,
            specialty: None,
            status: AppointmentStatus::Pending,
            confirmation_sent: false,
            followup_sent: false,
            attended: None,
            external_event_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn template_covers_working_hours() {
        let slots = slot_template();
        assert_eq!(slots.len(), 8);
        assert_eq!(slots[0], NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(slots[7], NaiveTime::from_hms_opt(16, 0, 0).unwrap());
    }

    #[test]
    fn booked_slot_drops_out_of_availability() {
        let mut conn = test_db();
        let date = NaiveDate::from_ymd_opt(2027, 3, 15).unwrap();
        let dt = date.and_hms_opt(10, 0, 0).unwrap();

        commit(&mut conn, &make_appointment(dt)).unwrap();

        let slots = available_slots(&conn, date).unwrap();
        assert_eq!(slots.len(), 7);
        assert!(!slots.contains(&NaiveTime::from_hms_opt(10, 0, 0).unwrap()));
        assert!(!is_available(&conn, date, NaiveTime::from_hms_opt(10, 0, 0).unwrap()).unwrap());
    }

    #[test]
    fn cancelled_appointment_frees_the_slot() {
        let mut conn = test_db();
        let date = NaiveDate::from_ymd_opt(2027, 3, 15).unwrap();
        let dt = date.and_hms_opt(10, 0, 0).unwrap();
        let appt = make_appointment(dt);

        commit(&mut conn, &appt).unwrap();
        queries::update_status(
            &conn,
            &appt.id,
            AppointmentStatus::Cancelled,
            Utc::now().naive_utc(),
        )
        .unwrap();

        assert!(is_available(&conn, date, NaiveTime::from_hms_opt(10, 0, 0).unwrap()).unwrap());
    }

    #[test]
    fn double_booking_is_rejected() {
        let mut conn = test_db();
        let dt = NaiveDate::from_ymd_opt(2027, 3, 15)
            .unwrap()
            .and_hms_opt(11, 0, 0)
            .unwrap();

        commit(&mut conn, &make_appointment(dt)).unwrap();
        let second = make_appointment(dt);
        assert!(matches!(
            commit(&mut conn, &second),
            Err(BookingError::SlotTaken)
        ));
    }

    #[test]
    fn format_slots_joins_times() {
        let slots = vec![
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        ];
        assert_eq!(format_slots(&slots), "09:00, 10:00");
    }
}
