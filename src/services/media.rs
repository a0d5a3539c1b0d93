use chrono::Utc;

use crate::db::queries;
use crate::models::{Attachment, IncomingMessage};
use crate::services::notify;
use crate::state::AppState;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
const IMAGE_MIME_TYPES: &[&str] = &["image/jpeg", "image/png"];

fn is_supported_image(url: &str, mime: Option<&str>) -> bool {
    if let Some(mime) = mime {
        if IMAGE_MIME_TYPES.contains(&mime) {
            return true;
        }
    }
    let path = url.split('?').next().unwrap_or(url).to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(&format!(".{ext}")))
}

/// Handles an inbound media message. Returns `None` when the message
/// carries no media so text routing can proceed.
pub async fn handle_media(
    state: &AppState,
    msg: &IncomingMessage,
) -> anyhow::Result<Option<String>> {
    let Some(media_url) = msg.media_url.as_deref() else {
        return Ok(None);
    };

    if !is_supported_image(media_url, msg.media_type.as_deref()) {
        return Ok(Some(format!(
            "Solo podemos recibir imágenes (JPG o PNG). Si necesitas enviar otro archivo, \
             comunícate con {} directamente.",
            state.config.clinic_name
        )));
    }

    let now = Utc::now().naive_utc();
    let appointment_id = {
        let conn = state.db.lock().unwrap();

        let appointment_id = queries::get_upcoming_appointment(&conn, &msg.from, now)?
            .map(|a| a.id);

        let attachment = Attachment {
            id: uuid::Uuid::new_v4().to_string(),
            phone_number: msg.from.clone(),
            appointment_id: appointment_id.clone(),
            media_url: media_url.to_string(),
            media_type: msg.media_type.clone(),
            created_at: now,
        };
        queries::insert_attachment(&conn, &attachment)?;
        appointment_id
    };

    tracing::info!(phone = %msg.from, "stored image attachment");

    let body = match &appointment_id {
        Some(id) => format!(
            "El paciente {} envió una imagen (turno {}): {}",
            msg.from, id, media_url
        ),
        None => format!("El paciente {} envió una imagen: {}", msg.from, media_url),
    };
    notify::notify_clinic(state.notifier.as_ref(), "Imagen recibida", &body, None).await;

    Ok(Some(format!(
        "¡Gracias! Recibimos tu imagen y la compartimos con el equipo de {}.",
        state.config.clinic_name
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_supported_formats() {
        assert!(is_supported_image("https://cdn.example.com/foto.jpg", None));
        assert!(is_supported_image("https://cdn.example.com/foto.PNG?x=1", None));
        assert!(is_supported_image("https://api.twilio.com/media/abc", Some("image/jpeg")));
    }

    #[test]
    fn rejects_other_formats() {
        assert!(!is_supported_image("https://cdn.example.com/doc.pdf", None));
        assert!(!is_supported_image(
            "https://api.twilio.com/media/abc",
            Some("application/pdf")
        ));
    }
}
