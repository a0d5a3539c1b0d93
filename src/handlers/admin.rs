use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::AppointmentStatus;
use crate::services::agenda;
use crate::state::AppState;

#[allow(clippy::result_large_err)]
fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), Response> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if expected_token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized.into_response());
    }
    Ok(())
}

fn internal_error(e: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": e.to_string()})),
    )
        .into_response()
}

// GET /api/admin/appointments
#[derive(Deserialize)]
pub struct AppointmentsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct AppointmentResponse {
    id: String,
    phone_number: String,
    patient_name: String,
    date_time: String,
    professional: Option<String>,
    specialty: Option<String>,
    status: String,
    attended: Option<bool>,
    created_at: String,
}

pub async fn get_appointments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AppointmentsQuery>,
) -> Result<Json<Vec<AppointmentResponse>>, Response> {
    check_auth(&headers, &state.config.admin_token)?;

    let limit = query.limit.unwrap_or(50);
    let status_filter = query.status.as_deref();

    let appointments = {
        let db = state.db.lock().unwrap();
        queries::list_appointments(&db, status_filter, limit).map_err(internal_error)?
    };

    let response = appointments
        .into_iter()
        .map(|a| AppointmentResponse {
            id: a.id,
            phone_number: a.phone_number,
            patient_name: a.patient_name,
            date_time: a.date_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            professional: a.professional,
            specialty: a.specialty,
            status: a.status.as_str().to_string(),
            attended: a.attended,
            created_at: a.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();

    Ok(Json(response))
}

// POST /api/admin/appointments/:id/cancel
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, Response> {
    check_auth(&headers, &state.config.admin_token)?;

    let now = Utc::now().naive_utc();
    let appt = {
        let db = state.db.lock().unwrap();
        let appt = queries::get_appointment(&db, &id).map_err(internal_error)?;
        match appt {
            Some(appt) if appt.status.is_active() => {
                queries::update_status(&db, &id, AppointmentStatus::Cancelled, now)
                    .map_err(internal_error)?;
                appt
            }
            Some(_) => {
                return Err((
                    StatusCode::CONFLICT,
                    Json(serde_json::json!({"error": "appointment is not active"})),
                )
                    .into_response())
            }
            None => {
                return Err(AppError::NotFound("appointment".to_string()).into_response())
            }
        }
    };

    if let (Some(calendar), Some(event_id)) = (&state.calendar, &appt.external_event_id) {
        if let Err(e) = calendar.delete_event(event_id).await {
            tracing::warn!(appointment_id = %id, error = %e, "failed to remove calendar event");
        }
    }

    let notice = format!(
        "Hola {}, lamentablemente tuvimos que cancelar tu turno del {}. \
         Escribe \"turno\" para reprogramarlo.",
        appt.patient_name,
        appt.date_time.format("%d/%m/%Y %H:%M")
    );
    if let Err(e) = state.messaging.send_message(&appt.phone_number, &notice).await {
        tracing::warn!(phone = %appt.phone_number, error = %e, "failed to notify patient of cancellation");
    }

    tracing::info!(appointment_id = %id, "appointment cancelled by admin");
    Ok(Json(serde_json::json!({"cancelled": true})))
}

// POST /api/admin/appointments/:id/complete
pub async fn complete_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, Response> {
    check_auth(&headers, &state.config.admin_token)?;

    let now = Utc::now().naive_utc();
    let updated = {
        let db = state.db.lock().unwrap();
        queries::mark_completed(&db, &id, now).map_err(internal_error)?
    };

    if !updated {
        return Err(AppError::NotFound("appointment".to_string()).into_response());
    }

    Ok(Json(serde_json::json!({"completed": true})))
}

// GET /api/admin/availability?date=DD/MM/YYYY
#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub date: String,
}

pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<serde_json::Value>, Response> {
    check_auth(&headers, &state.config.admin_token)?;

    let date = NaiveDate::parse_from_str(&query.date, "%d/%m/%Y")
        .map_err(|_| AppError::Validation("date must be DD/MM/YYYY".to_string()).into_response())?;

    let slots = {
        let db = state.db.lock().unwrap();
        agenda::available_slots(&db, date).map_err(internal_error)?
    };

    let times: Vec<String> = slots.iter().map(|t| t.format("%H:%M").to_string()).collect();
    Ok(Json(serde_json::json!({
        "date": query.date,
        "available": times,
    })))
}
