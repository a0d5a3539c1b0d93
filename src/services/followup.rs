//! Periodic agenda maintenance: flag no-shows and send post-visit
//! follow-ups. Runs on an interval from main; every pass is idempotent.

use chrono::Utc;

use crate::db::queries;
use crate::models::Appointment;
use crate::state::AppState;

pub async fn run_jobs(state: &AppState) {
    if let Err(e) = mark_absences(state).await {
        tracing::error!(error = %e, "absence job failed");
    }
    if let Err(e) = send_followups(state).await {
        tracing::error!(error = %e, "followup job failed");
    }
}

/// Past appointments whose attendance was never resolved become absences,
/// and the patient gets a rebooking nudge.
pub async fn mark_absences(state: &AppState) -> anyhow::Result<()> {
    let now = Utc::now().naive_utc();

    let missed: Vec<Appointment> = {
        let conn = state.db.lock().unwrap();
        let missed = queries::find_past_unattended(&conn, now)?;
        for appt in &missed {
            queries::mark_absent(&conn, &appt.id, now)?;
        }
        missed
    };

    for appt in missed {
        tracing::info!(appointment_id = %appt.id, phone = %appt.phone_number, "marked absent");
        let body = format!(
            "Hola {}, notamos que no pudiste asistir a tu turno en {}. \
             Si deseas reprogramarlo, escribinos cuando quieras.",
            appt.patient_name, state.config.clinic_name
        );
        if let Err(e) = state.messaging.send_message(&appt.phone_number, &body).await {
            tracing::warn!(phone = %appt.phone_number, error = %e, "failed to send absence message");
        }
    }

    Ok(())
}

/// Completed visits get a one-time thank-you message.
pub async fn send_followups(state: &AppState) -> anyhow::Result<()> {
    let now = Utc::now().naive_utc();

    let pending: Vec<Appointment> = {
        let conn = state.db.lock().unwrap();
        queries::find_completed_without_followup(&conn)?
    };

    for appt in pending {
        let body = format!(
            "¡Gracias por tu visita a {}, {}! Esperamos que todo haya salido bien. \
             Cualquier consulta, estamos a tu disposición.",
            state.config.clinic_name, appt.patient_name
        );

        match state.messaging.send_message(&appt.phone_number, &body).await {
            Ok(()) => {
                let conn = state.db.lock().unwrap();
                queries::mark_followup_sent(&conn, &appt.id, now)?;
                tracing::info!(appointment_id = %appt.id, "followup sent");
            }
            Err(e) => {
                // Left unmarked so the next pass retries.
                tracing::warn!(appointment_id = %appt.id, error = %e, "failed to send followup");
            }
        }
    }

    Ok(())
}
