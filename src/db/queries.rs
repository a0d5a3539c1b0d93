use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection};

use crate::models::{
    Appointment, AppointmentStatus, Attachment, ConversationState, Draft, Stage,
};

const DT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_dt(dt: &NaiveDateTime) -> String {
    dt.format(DT_FORMAT).to_string()
}

fn parse_dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DT_FORMAT)
        .unwrap_or_else(|_| chrono::Utc::now().naive_utc())
}

// ── Conversation state ──

pub fn get_conversation_state(
    conn: &Connection,
    phone: &str,
    ttl_minutes: i64,
    now: NaiveDateTime,
) -> anyhow::Result<Option<ConversationState>> {
    let result = conn.query_row(
        "SELECT phone, stage, last_intent, data, last_updated
         FROM conversation_state WHERE phone = ?1",
        params![phone],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        },
    );

    match result {
        Ok((phone, stage_str, last_intent, data_json, last_updated_str)) => {
            let last_updated = parse_dt(&last_updated_str);

            // A stale mid-flow conversation is treated as if it never
            // existed; the row is overwritten on the next save.
            if ttl_minutes > 0 && now - last_updated > chrono::Duration::minutes(ttl_minutes) {
                return Ok(None);
            }

            let data: serde_json::Value =
                serde_json::from_str(&data_json).unwrap_or(serde_json::json!({}));
            let draft: Draft = data
                .get("draft")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            let pending_cancellation = data
                .get("pending_cancellation")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());

            Ok(Some(ConversationState {
                phone,
                stage: Stage::parse(&stage_str),
                last_intent,
                draft,
                pending_cancellation,
                last_updated,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn save_conversation_state(conn: &Connection, state: &ConversationState) -> anyhow::Result<()> {
    let data = serde_json::json!({
        "draft": state.draft,
        "pending_cancellation": state.pending_cancellation,
    });
    let data_json = serde_json::to_string(&data)?;

    conn.execute(
        "INSERT INTO conversation_state (phone, stage, last_intent, data, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(phone) DO UPDATE SET
           stage = excluded.stage,
           last_intent = excluded.last_intent,
           data = excluded.data,
           last_updated = excluded.last_updated",
        params![
            state.phone,
            state.stage.as_str(),
            state.last_intent,
            data_json,
            fmt_dt(&state.last_updated),
        ],
    )?;
    Ok(())
}

pub fn clear_conversation_state(conn: &Connection, phone: &str) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM conversation_state WHERE phone = ?1",
        params![phone],
    )?;
    Ok(())
}

// ── Appointments ──

const APPOINTMENT_COLS: &str = "id, phone_number, patient_name, date_time, professional, \
     specialty, status, confirmation_sent, followup_sent, attended, external_event_id, \
     created_at, updated_at";

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO appointments (id, phone_number, patient_name, date_time, professional,
             specialty, status, confirmation_sent, followup_sent, attended, external_event_id,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            appt.id,
            appt.phone_number,
            appt.patient_name,
            fmt_dt(&appt.date_time),
            appt.professional,
            appt.specialty,
            appt.status.as_str(),
            appt.confirmation_sent as i32,
            appt.followup_sent as i32,
            appt.attended.map(|b| b as i32),
            appt.external_event_id,
            fmt_dt(&appt.created_at),
            fmt_dt(&appt.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &str) -> anyhow::Result<Option<Appointment>> {
    let sql = format!("SELECT {APPOINTMENT_COLS} FROM appointments WHERE id = ?1");
    let result = conn.query_row(&sql, params![id], parse_appointment_row);

    match result {
        Ok(appt) => Ok(Some(appt)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Most recent appointment for a patient, any status. Used to recognize a
/// returning patient and carry over professional/specialty on repeat.
pub fn get_last_appointment(conn: &Connection, phone: &str) -> anyhow::Result<Option<Appointment>> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLS} FROM appointments
         WHERE phone_number = ?1 ORDER BY date_time DESC LIMIT 1"
    );
    let result = conn.query_row(&sql, params![phone], parse_appointment_row);

    match result {
        Ok(appt) => Ok(Some(appt)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Nearest future appointment still occupying a slot.
pub fn get_upcoming_appointment(
    conn: &Connection,
    phone: &str,
    now: NaiveDateTime,
) -> anyhow::Result<Option<Appointment>> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLS} FROM appointments
         WHERE phone_number = ?1 AND date_time > ?2 AND status IN ('pending', 'confirmed')
         ORDER BY date_time ASC LIMIT 1"
    );
    let result = conn.query_row(&sql, params![phone, fmt_dt(&now)], parse_appointment_row);

    match result {
        Ok(appt) => Ok(Some(appt)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_appointments_for_phone(
    conn: &Connection,
    phone: &str,
    limit: i64,
) -> anyhow::Result<Vec<Appointment>> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLS} FROM appointments
         WHERE phone_number = ?1 ORDER BY date_time DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![phone, limit], parse_appointment_row)?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row?);
    }
    Ok(appointments)
}

/// Times already taken on a date by appointments that still hold their slot.
pub fn booked_times(conn: &Connection, date: NaiveDate) -> anyhow::Result<Vec<NaiveTime>> {
    let day_start = date.format("%Y-%m-%d 00:00:00").to_string();
    let day_end = date.format("%Y-%m-%d 23:59:59").to_string();

    let mut stmt = conn.prepare(
        "SELECT date_time FROM appointments
         WHERE date_time >= ?1 AND date_time <= ?2 AND status IN ('pending', 'confirmed')
         ORDER BY date_time ASC",
    )?;
    let rows = stmt.query_map(params![day_start, day_end], |row| {
        row.get::<_, String>(0)
    })?;

    let mut times = vec![];
    for row in rows {
        times.push(parse_dt(&row?).time());
    }
    Ok(times)
}

pub fn update_status(
    conn: &Connection,
    id: &str,
    status: AppointmentStatus,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), fmt_dt(&now), id],
    )?;
    Ok(count > 0)
}

pub fn set_external_event(
    conn: &Connection,
    id: &str,
    event_id: &str,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE appointments SET external_event_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![event_id, fmt_dt(&now), id],
    )?;
    Ok(())
}

pub fn mark_absent(conn: &Connection, id: &str, now: NaiveDateTime) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET status = 'absent', attended = 0, updated_at = ?1 WHERE id = ?2",
        params![fmt_dt(&now), id],
    )?;
    Ok(count > 0)
}

pub fn mark_completed(conn: &Connection, id: &str, now: NaiveDateTime) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE appointments SET status = 'completed', attended = 1, updated_at = ?1 WHERE id = ?2",
        params![fmt_dt(&now), id],
    )?;
    Ok(count > 0)
}

pub fn mark_followup_sent(conn: &Connection, id: &str, now: NaiveDateTime) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE appointments SET followup_sent = 1, updated_at = ?1 WHERE id = ?2",
        params![fmt_dt(&now), id],
    )?;
    Ok(())
}

/// Past-dated appointments that still hold a slot and whose attendance was
/// never resolved. The absence job flips these to `absent`.
pub fn find_past_unattended(
    conn: &Connection,
    now: NaiveDateTime,
) -> anyhow::Result<Vec<Appointment>> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLS} FROM appointments
         WHERE date_time < ?1 AND status IN ('pending', 'confirmed') AND attended IS NULL
         ORDER BY date_time ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![fmt_dt(&now)], parse_appointment_row)?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row?);
    }
    Ok(appointments)
}

pub fn find_completed_without_followup(conn: &Connection) -> anyhow::Result<Vec<Appointment>> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLS} FROM appointments
         WHERE status = 'completed' AND followup_sent = 0
         ORDER BY date_time ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], parse_appointment_row)?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row?);
    }
    Ok(appointments)
}

pub fn list_appointments(
    conn: &Connection,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Appointment>> {
    let mut appointments = vec![];

    match status_filter {
        Some(status) => {
            let sql = format!(
                "SELECT {APPOINTMENT_COLS} FROM appointments
                 WHERE status = ?1 ORDER BY date_time DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![status, limit], parse_appointment_row)?;
            for row in rows {
                appointments.push(row?);
            }
        }
        None => {
            let sql = format!(
                "SELECT {APPOINTMENT_COLS} FROM appointments
                 ORDER BY date_time DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![limit], parse_appointment_row)?;
            for row in rows {
                appointments.push(row?);
            }
        }
    }

    Ok(appointments)
}

fn parse_appointment_row(row: &rusqlite::Row) -> rusqlite::Result<Appointment> {
    let date_time_str: String = row.get(3)?;
    let status_str: String = row.get(6)?;
    let created_at_str: String = row.get(11)?;
    let updated_at_str: String = row.get(12)?;

    Ok(Appointment {
        id: row.get(0)?,
        phone_number: row.get(1)?,
        patient_name: row.get(2)?,
        date_time: parse_dt(&date_time_str),
        professional: row.get(4)?,
        specialty: row.get(5)?,
        status: AppointmentStatus::parse(&status_str),
        confirmation_sent: row.get::<_, i32>(7)? != 0,
        followup_sent: row.get::<_, i32>(8)? != 0,
        attended: row.get::<_, Option<i32>>(9)?.map(|v| v != 0),
        external_event_id: row.get(10)?,
        created_at: parse_dt(&created_at_str),
        updated_at: parse_dt(&updated_at_str),
    })
}

// ── Attachments ──

pub fn insert_attachment(conn: &Connection, attachment: &Attachment) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO attachments (id, phone_number, appointment_id, media_url, media_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            attachment.id,
            attachment.phone_number,
            attachment.appointment_id,
            attachment.media_url,
            attachment.media_type,
            fmt_dt(&attachment.created_at),
        ],
    )?;
    Ok(())
}
