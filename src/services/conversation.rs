//! The conversation state machine. Every inbound message runs one pass of
//! a fixed routing sequence; the first matching rule produces the reply.

use std::sync::{Arc, OnceLock};

use chrono::{NaiveDate, NaiveTime, Utc};
use regex::Regex;

use crate::db::queries;
use crate::models::{
    Appointment, AppointmentStatus, Classification, ConversationState, IncomingMessage, Intent,
    Stage,
};
use crate::services::agenda::{self, BookingError};
use crate::services::calendar::generate_ics;
use crate::services::keywords::{self, matches};
use crate::services::media;
use crate::services::notify::{self, NotificationAttachment};
use crate::state::AppState;

fn date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{2}/\d{2}/\d{4})\b").unwrap())
}

fn time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([01]\d|2[0-3]):([0-5]\d)\b").unwrap())
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-zÁÉÍÓÚáéíóúÑñ ]{2,50}$").unwrap())
}

fn extract_date(text: &str) -> Option<&str> {
    date_regex().captures(text).map(|c| c.get(1).unwrap().as_str())
}

fn extract_time(text: &str) -> Option<&str> {
    time_regex().find(text).map(|m| m.as_str())
}

/// Full name: only letters and spaces, and at least two words, so a stray
/// "si" or "hola" never lands as a patient name.
fn is_valid_name(text: &str) -> bool {
    let trimmed = text.trim();
    name_regex().is_match(trimmed) && trimmed.split_whitespace().count() >= 2
}

pub async fn process_message(
    state: &Arc<AppState>,
    msg: &IncomingMessage,
) -> anyhow::Result<String> {
    let now = Utc::now().naive_utc();

    let mut conv = {
        let db = state.db.lock().unwrap();
        queries::get_conversation_state(&db, &msg.from, state.config.state_ttl_minutes, now)?
    }
    .unwrap_or_else(|| ConversationState::new(&msg.from, now));

    // The classifier is advisory: on error or below-threshold confidence
    // the keyword pass alone decides the route.
    let classification = match state.classifier.classify(&msg.body, Some(&conv)).await {
        Ok(c) if c.confidence >= state.config.confidence_threshold => c,
        Ok(_) => Classification::unknown(),
        Err(e) => {
            tracing::warn!(phone = %msg.from, error = %e, "classifier failed, using keywords only");
            Classification::unknown()
        }
    };

    tracing::info!(
        phone = %msg.from,
        intent = ?classification.intent,
        stage = conv.stage.as_str(),
        "processing message"
    );

    conv.last_intent = Some(classification.intent.as_str().to_string());
    let text = &msg.body;
    let normalized = keywords::normalize(text);

    // ── 0. Hard reset ──
    if normalized == "nuevo" {
        let db = state.db.lock().unwrap();
        queries::clear_conversation_state(&db, &msg.from)?;
        return Ok(
            "Empecemos de nuevo. ¿En qué puedo ayudarte? Escribe \"turno\" para reservar."
                .to_string(),
        );
    }

    // ── Cancellation confirmation has the floor while it is pending ──
    if conv.stage == Stage::AwaitingCancelConfirmation {
        let confirmed =
            matches(text, keywords::CONFIRM_KEYWORDS) || classification.intent == Intent::Confirm;
        return handle_cancel_confirmation(state, conv, confirmed, now).await;
    }

    // ── 1. Greeting ──
    // Reply only; a greeting in the middle of a booking leaves the flow
    // exactly where it was.
    if matches(text, keywords::GREETING_KEYWORDS) || classification.intent == Intent::Greeting {
        let previous = {
            let db = state.db.lock().unwrap();
            queries::get_last_appointment(&db, &msg.from)?
        };

        let mut reply = format!(
            "¡Hola! Soy el asistente de {}. Puedo ayudarte a reservar un turno (escribe \
             \"turno\"), cancelar uno (\"cancelar\") o responder tus consultas.",
            state.config.clinic_name
        );
        if previous.is_some() {
            reply.push_str(
                "\nVeo que ya nos visitaste: escribe \"repetir\" para reservar con el mismo \
                 profesional o \"historial\" para ver tus turnos.",
            );
        }

        return Ok(reply);
    }

    // ── 1b. Returning-patient shortcuts ──
    if matches(text, keywords::HISTORY_KEYWORDS) {
        let history = {
            let db = state.db.lock().unwrap();
            queries::get_appointments_for_phone(&db, &msg.from, 5)?
        };
        if history.is_empty() {
            return Ok("Todavía no tienes turnos registrados. Escribe \"turno\" para reservar uno.".to_string());
        }
        let lines: Vec<String> = history
            .iter()
            .map(|a| {
                format!(
                    "• {} - {} ({})",
                    a.date_time.format("%d/%m/%Y %H:%M"),
                    a.patient_name,
                    a.status.as_str()
                )
            })
            .collect();
        return Ok(format!("Tus últimos turnos:\n{}", lines.join("\n")));
    }

    if matches(text, keywords::REPEAT_KEYWORDS) {
        let previous = {
            let db = state.db.lock().unwrap();
            queries::get_last_appointment(&db, &msg.from)?
        };
        if let Some(prev) = previous {
            conv.draft.professional = prev.professional;
            conv.draft.specialty = prev.specialty;
            conv.stage = Stage::AwaitingDate;
            save(state, &conv)?;
            return Ok("Perfecto, repetimos tu turno habitual. ¿Para qué fecha? (DD/MM/YYYY)".to_string());
        }
        // No history: fall through to the normal booking entry below.
    }

    // ── 2. Cancellation ──
    if matches(text, keywords::CANCEL_KEYWORDS) || classification.intent == Intent::Cancel {
        let upcoming = {
            let db = state.db.lock().unwrap();
            queries::get_upcoming_appointment(&db, &msg.from, now)?
        };

        return match upcoming {
            Some(appt) => {
                conv.stage = Stage::AwaitingCancelConfirmation;
                conv.pending_cancellation = Some(appt.id.clone());
                save(state, &conv)?;
                Ok(format!(
                    "Tienes un turno el {} a nombre de {}. ¿Confirmas que deseas cancelarlo? \
                     (responde \"sí\" para confirmar)",
                    appt.date_time.format("%d/%m/%Y %H:%M"),
                    appt.patient_name
                ))
            }
            None => Ok(
                "No encuentro turnos próximos a tu nombre para cancelar. ¿Quieres reservar uno? \
                 Escribe \"turno\"."
                    .to_string(),
            ),
        };
    }

    // ── 3. Urgency ──
    if matches(text, keywords::URGENCY_KEYWORDS)
        || classification.intent == Intent::Urgency
        || classification.entities.urgency == Some(true)
    {
        let body = format!("Mensaje urgente de {}: {}", msg.from, text);
        notify::notify_clinic(state.notifier.as_ref(), "Urgencia", &body, None).await;
        return Ok(format!(
            "Lamento que estés pasando por esto. Ya avisamos al equipo de {} para que te \
             contacte a la brevedad. Si es una emergencia grave, llama al servicio de urgencias.",
            state.config.clinic_name
        ));
    }

    // ── 4. Images ──
    if let Some(reply) = media::handle_media(state, msg).await? {
        return Ok(reply);
    }

    // ── 5. FAQ ──
    if matches(text, keywords::FAQ_INSURANCE_KEYWORDS) {
        return Ok(format!(
            "Trabajamos con las siguientes obras sociales y prepagas: {}. Para otras \
             coberturas, consúltanos por este medio.",
            state.config.insurance_list
        ));
    }
    if matches(text, keywords::FAQ_FREE_KEYWORDS) {
        return Ok(format!(
            "La primera consulta de evaluación en {} es sin cargo. Las consultas siguientes \
             tienen un valor de {}.",
            state.config.clinic_name, state.config.consultation_cost
        ));
    }
    if matches(text, keywords::FAQ_COST_KEYWORDS) {
        return Ok(format!(
            "El valor de la consulta es {}. Si tienes obra social, puede estar cubierta.",
            state.config.consultation_cost
        ));
    }
    if matches(text, keywords::FAQ_LOCATION_KEYWORDS) {
        return Ok(format!(
            "Nos encontramos en {}. ¡Te esperamos!",
            state.config.clinic_address
        ));
    }
    // A confident FAQ classification without a keyword hit still gets an
    // answer: the general rundown.
    if classification.intent == Intent::Faq {
        return Ok(format!(
            "Te cuento: la consulta cuesta {}, trabajamos con {} y nos encontramos en {}. \
             ¿Hay algo más que quieras saber?",
            state.config.consultation_cost,
            state.config.insurance_list,
            state.config.clinic_address
        ));
    }

    // ── 6. Booking entry ──
    if matches(text, keywords::APPOINTMENT_KEYWORDS)
        || classification.intent == Intent::Appointment
    {
        // A date in the same message (or from the classifier) skips a turn.
        let inline_date = extract_date(text)
            .map(|d| d.to_string())
            .or(classification.entities.date.clone());
        if let Some(date_str) = inline_date {
            conv.stage = Stage::AwaitingDate;
            return handle_date_input(state, conv, &date_str, now).await;
        }

        conv.stage = Stage::AwaitingDate;
        save(state, &conv)?;
        return Ok("¡Perfecto! ¿Para qué fecha deseas el turno? (DD/MM/YYYY)".to_string());
    }

    // ── 7. Date input ──
    if let Some(date_str) = extract_date(text) {
        if conv.stage == Stage::AwaitingDate || conv.stage == Stage::Idle {
            let date_str = date_str.to_string();
            conv.stage = Stage::AwaitingDate;
            return handle_date_input(state, conv, &date_str, now).await;
        }
    }

    // ── 8. Time input ──
    if conv.stage == Stage::AwaitingTime {
        if let Some(time_str) = extract_time(text) {
            let time_str = time_str.to_string();
            return handle_time_input(state, conv, &time_str).await;
        }
    }

    // ── 9. Name input ──
    if conv.stage == Stage::AwaitingName {
        return handle_name_input(state, conv, text, now).await;
    }

    // ── 10. Fallback ──
    Ok(
        "No entendí tu mensaje. Puedo ayudarte a reservar un turno (escribe \"turno\"), \
         cancelar uno (\"cancelar\") o responder consultas sobre costos, cobertura y ubicación."
            .to_string(),
    )
}

async fn handle_cancel_confirmation(
    state: &Arc<AppState>,
    mut conv: ConversationState,
    confirmed: bool,
    now: chrono::NaiveDateTime,
) -> anyhow::Result<String> {
    if !confirmed {
        let db = state.db.lock().unwrap();
        queries::clear_conversation_state(&db, &conv.phone)?;
        return Ok("Entendido, tu turno sigue en pie. ¿Puedo ayudarte con algo más?".to_string());
    }

    let Some(appt_id) = conv.pending_cancellation.take() else {
        let db = state.db.lock().unwrap();
        queries::clear_conversation_state(&db, &conv.phone)?;
        return Ok("No hay ninguna cancelación pendiente. ¿Puedo ayudarte con algo más?".to_string());
    };

    let cancelled = {
        let db = state.db.lock().unwrap();
        let appt = queries::get_appointment(&db, &appt_id)?;
        match appt {
            Some(appt) if appt.status.is_active() => {
                queries::update_status(&db, &appt.id, AppointmentStatus::Cancelled, now)?;
                queries::clear_conversation_state(&db, &conv.phone)?;
                Some(appt)
            }
            _ => {
                queries::clear_conversation_state(&db, &conv.phone)?;
                None
            }
        }
    };

    let Some(appt) = cancelled else {
        return Ok("Ese turno ya no figura activo, no hay nada que cancelar.".to_string());
    };

    if let (Some(calendar), Some(event_id)) = (&state.calendar, &appt.external_event_id) {
        if let Err(e) = calendar.delete_event(event_id).await {
            tracing::warn!(appointment_id = %appt.id, error = %e, "failed to remove calendar event");
        }
    }

    let body = format!(
        "Turno cancelado: {} el {} ({})",
        appt.patient_name,
        appt.date_time.format("%d/%m/%Y %H:%M"),
        appt.phone_number
    );
    notify::notify_clinic(state.notifier.as_ref(), "Turno cancelado", &body, None).await;

    tracing::info!(appointment_id = %appt.id, phone = %appt.phone_number, "appointment cancelled");

    Ok(format!(
        "Listo, cancelamos tu turno del {}. Cuando quieras reservar otro, escribe \"turno\".",
        appt.date_time.format("%d/%m/%Y %H:%M")
    ))
}

async fn handle_date_input(
    state: &Arc<AppState>,
    mut conv: ConversationState,
    date_str: &str,
    now: chrono::NaiveDateTime,
) -> anyhow::Result<String> {
    let Ok(date) = NaiveDate::parse_from_str(date_str, "%d/%m/%Y") else {
        save(state, &conv)?;
        return Ok(format!(
            "La fecha {date_str} no es válida. Por favor, indícala en formato DD/MM/YYYY."
        ));
    };

    if date < now.date() {
        save(state, &conv)?;
        return Ok("Esa fecha ya pasó. Por favor, elige una fecha futura (DD/MM/YYYY).".to_string());
    }

    let slots = {
        let db = state.db.lock().unwrap();
        agenda::available_slots(&db, date)?
    };

    if slots.is_empty() {
        save(state, &conv)?;
        return Ok(format!(
            "No quedan turnos disponibles para el {}. ¿Quieres probar con otra fecha?",
            date.format("%d/%m/%Y")
        ));
    }

    conv.draft.date = Some(date_str.to_string());
    conv.stage = Stage::AwaitingTime;
    save(state, &conv)?;

    Ok(format!(
        "Para el {} tenemos estos horarios: {}. ¿Cuál prefieres? (HH:MM)",
        date.format("%d/%m/%Y"),
        agenda::format_slots(&slots)
    ))
}

async fn handle_time_input(
    state: &Arc<AppState>,
    mut conv: ConversationState,
    time_str: &str,
) -> anyhow::Result<String> {
    let Some(date_str) = conv.draft.date.clone() else {
        // Draft lost its date, restart the flow cleanly.
        conv.stage = Stage::AwaitingDate;
        save(state, &conv)?;
        return Ok("Primero necesito la fecha del turno. ¿Para qué día? (DD/MM/YYYY)".to_string());
    };
    let date = match NaiveDate::parse_from_str(&date_str, "%d/%m/%Y") {
        Ok(d) => d,
        Err(_) => {
            conv.draft.date = None;
            conv.stage = Stage::AwaitingDate;
            save(state, &conv)?;
            return Ok("Primero necesito la fecha del turno. ¿Para qué día? (DD/MM/YYYY)".to_string());
        }
    };

    let time = NaiveTime::parse_from_str(time_str, "%H:%M")
        .map_err(|e| anyhow::anyhow!("unreachable time parse failure: {e}"))?;

    if !agenda::slot_template().contains(&time) {
        save(state, &conv)?;
        let slots = {
            let db = state.db.lock().unwrap();
            agenda::available_slots(&db, date)?
        };
        return Ok(format!(
            "Atendemos de 09:00 a 17:00, en punto. Horarios disponibles: {}.",
            agenda::format_slots(&slots)
        ));
    }

    let (available, slots) = {
        let db = state.db.lock().unwrap();
        let slots = agenda::available_slots(&db, date)?;
        (slots.contains(&time), slots)
    };

    if !available {
        save(state, &conv)?;
        return Ok(format!(
            "Ese horario ya está ocupado. Quedan disponibles: {}. ¿Cuál prefieres?",
            agenda::format_slots(&slots)
        ));
    }

    conv.draft.time = Some(time_str.to_string());
    conv.stage = Stage::AwaitingName;
    save(state, &conv)?;

    Ok("Por favor, indícame tu nombre completo (nombre y apellido) para confirmar el turno.".to_string())
}

async fn handle_name_input(
    state: &Arc<AppState>,
    mut conv: ConversationState,
    text: &str,
    now: chrono::NaiveDateTime,
) -> anyhow::Result<String> {
    let name = text.trim();
    if !is_valid_name(name) {
        save(state, &conv)?;
        return Ok(
            "Ese nombre no parece válido. Por favor, escribe tu nombre y apellido, solo letras."
                .to_string(),
        );
    }

    let (Some(date_str), Some(time_str)) = (conv.draft.date.clone(), conv.draft.time.clone())
    else {
        conv.stage = Stage::AwaitingDate;
        conv.draft = Default::default();
        save(state, &conv)?;
        return Ok("Perdimos los datos del turno, empecemos de nuevo. ¿Para qué fecha? (DD/MM/YYYY)".to_string());
    };

    let date = NaiveDate::parse_from_str(&date_str, "%d/%m/%Y")
        .map_err(|e| anyhow::anyhow!("invalid draft date {date_str}: {e}"))?;
    let time = NaiveTime::parse_from_str(&time_str, "%H:%M")
        .map_err(|e| anyhow::anyhow!("invalid draft time {time_str}: {e}"))?;

    let mut appt = Appointment {
        id: uuid::Uuid::new_v4().to_string(),
        phone_number: conv.phone.clone(),
        patient_name: name.to_string(),
        date_time: date.and_time(time),
        professional: conv.draft.professional.clone(),
        specialty: conv.draft.specialty.clone(),
        status: AppointmentStatus::Pending,
        confirmation_sent: false,
        followup_sent: false,
        attended: None,
        external_event_id: None,
        created_at: now,
        updated_at: now,
    };

    // Auto-confirm only when the mirrored calendar also shows the slot free.
    if state.config.auto_confirm_enabled {
        let mirror_free = match &state.calendar {
            Some(calendar) => calendar.check_availability(&appt).await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "calendar availability check failed");
                false
            }),
            None => true,
        };
        if mirror_free {
            appt.status = AppointmentStatus::Confirmed;
        }
    }

    let commit_result = {
        let mut db = state.db.lock().unwrap();
        agenda::commit(&mut db, &appt)
    };

    match commit_result {
        Ok(()) => {}
        Err(BookingError::SlotTaken) => {
            conv.draft.time = None;
            conv.stage = Stage::AwaitingTime;
            save(state, &conv)?;
            let slots = {
                let db = state.db.lock().unwrap();
                agenda::available_slots(&db, date)?
            };
            return Ok(format!(
                "Justo se ocupó ese horario. Quedan disponibles: {}. ¿Cuál prefieres?",
                agenda::format_slots(&slots)
            ));
        }
        Err(BookingError::Storage(e)) => {
            tracing::error!(phone = %conv.phone, error = %e, "failed to store appointment");
            save(state, &conv)?;
            return Ok(
                "Tuvimos un problema al registrar tu turno. Por favor, intenta nuevamente en \
                 unos minutos."
                    .to_string(),
            );
        }
    }

    if let Some(calendar) = &state.calendar {
        match calendar.create_event(&appt).await {
            Ok(event_id) => {
                let db = state.db.lock().unwrap();
                queries::set_external_event(&db, &appt.id, &event_id, now)?;
            }
            Err(e) => {
                tracing::warn!(appointment_id = %appt.id, error = %e, "failed to mirror appointment to calendar");
            }
        }
    }

    {
        let db = state.db.lock().unwrap();
        queries::clear_conversation_state(&db, &conv.phone)?;
    }

    let ics = NotificationAttachment {
        filename: format!("turno-{}.ics", appt.id),
        content: generate_ics(&appt, &state.config.clinic_name),
        mime_type: "text/calendar".to_string(),
    };
    let body = format!(
        "Nuevo turno: {} el {} ({})",
        appt.patient_name,
        appt.date_time.format("%d/%m/%Y %H:%M"),
        appt.phone_number
    );
    notify::notify_clinic(state.notifier.as_ref(), "Nuevo turno", &body, Some(&ics)).await;

    tracing::info!(
        appointment_id = %appt.id,
        phone = %appt.phone_number,
        status = appt.status.as_str(),
        "appointment booked"
    );

    let status_note = match appt.status {
        AppointmentStatus::Confirmed => "Tu turno quedó confirmado.",
        _ => "Tu turno quedó registrado y la clínica lo confirmará a la brevedad.",
    };

    Ok(format!(
        "¡Listo, {}! Reservamos tu turno para el {} a las {}. {}",
        appt.patient_name,
        date.format("%d/%m/%Y"),
        time.format("%H:%M"),
        status_note
    ))
}

fn save(state: &Arc<AppState>, conv: &ConversationState) -> anyhow::Result<()> {
    let mut conv = conv.clone();
    conv.last_updated = Utc::now().naive_utc();
    let db = state.db.lock().unwrap();
    queries::save_conversation_state(&db, &conv)
}
