use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use turnero::config::AppConfig;
use turnero::db;
use turnero::handlers;
use turnero::services::calendar::{CalendarMirror, GoogleCalendarMirror};
use turnero::services::classifier::openai::OpenAiClassifier;
use turnero::services::classifier::{DisabledClassifier, IntentClassifier};
use turnero::services::followup;
use turnero::services::messaging::twilio::TwilioWhatsAppProvider;
use turnero::services::notify::EmailNotifier;
use turnero::state::AppState;

const JOB_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let classifier: Box<dyn IntentClassifier> = if config.openai_api_key.is_empty() {
        tracing::info!("no OpenAI API key configured, intent classification disabled");
        Box::new(DisabledClassifier)
    } else {
        tracing::info!("using OpenAI classifier (model: {})", config.openai_model);
        Box::new(OpenAiClassifier::new(
            config.openai_api_key.clone(),
            config.openai_model.clone(),
        ))
    };

    let messaging = TwilioWhatsAppProvider::new(
        config.twilio_account_sid.clone(),
        config.twilio_auth_token.clone(),
        config.twilio_whatsapp_number.clone(),
    );

    let notifier = EmailNotifier::new(
        config.email_api_url.clone(),
        config.email_api_key.clone(),
        config.professional_email.clone(),
    );

    let calendar: Option<Box<dyn CalendarMirror>> =
        if config.google_calendar_token.is_empty() || config.google_calendar_id.is_empty() {
            tracing::info!("calendar mirroring disabled");
            None
        } else {
            tracing::info!("mirroring agenda to Google Calendar");
            Some(Box::new(GoogleCalendarMirror::new(
                config.google_calendar_token.clone(),
                config.google_calendar_id.clone(),
            )))
        };

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        classifier,
        messaging: Box::new(messaging),
        notifier: Box::new(notifier),
        calendar,
    });

    let job_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(JOB_INTERVAL);
        loop {
            interval.tick().await;
            followup::run_jobs(&job_state).await;
        }
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/webhook/whatsapp", post(handlers::webhook::whatsapp_webhook))
        .route(
            "/api/admin/appointments",
            get(handlers::admin::get_appointments),
        )
        .route(
            "/api/admin/appointments/:id/cancel",
            post(handlers::admin::cancel_appointment),
        )
        .route(
            "/api/admin/appointments/:id/complete",
            post(handlers::admin::complete_appointment),
        )
        .route(
            "/api/admin/availability",
            get(handlers::admin::get_availability),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
