use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub clinic_name: String,
    pub clinic_address: String,
    pub consultation_cost: String,
    pub insurance_list: String,
    pub professional_email: String,
    pub email_api_url: String,
    pub email_api_key: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_whatsapp_number: String,
    pub openai_api_key: String,
    pub openai_model: String,
    /// Classifier results below this confidence fall back to keyword routing.
    pub confidence_threshold: f32,
    /// When set, a booking whose slot the external calendar accepts is
    /// committed as `confirmed` instead of `pending`.
    pub auto_confirm_enabled: bool,
    /// Minutes before an abandoned mid-flow conversation expires back to
    /// idle. 0 disables expiry.
    pub state_ttl_minutes: i64,
    pub google_calendar_token: String,
    pub google_calendar_id: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "turnero.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            clinic_name: env::var("CLINIC_NAME").unwrap_or_else(|_| "Clínica Demo".to_string()),
            clinic_address: env::var("CLINIC_ADDRESS")
                .unwrap_or_else(|_| "Av. Siempreviva 123".to_string()),
            consultation_cost: env::var("CONSULTATION_COST")
                .unwrap_or_else(|_| "$15000".to_string()),
            insurance_list: env::var("INSURANCE_LIST")
                .unwrap_or_else(|_| "OSDE, Swiss Medical y Galeno".to_string()),
            professional_email: env::var("PROFESSIONAL_EMAIL").unwrap_or_default(),
            email_api_url: env::var("EMAIL_API_URL").unwrap_or_default(),
            email_api_key: env::var("EMAIL_API_KEY").unwrap_or_default(),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_whatsapp_number: env::var("TWILIO_WHATSAPP_NUMBER").unwrap_or_default(),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            confidence_threshold: env::var("CONFIDENCE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.7),
            auto_confirm_enabled: env::var("AUTO_CONFIRM_ENABLED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            state_ttl_minutes: env::var("STATE_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            google_calendar_token: env::var("GOOGLE_CALENDAR_TOKEN").unwrap_or_default(),
            google_calendar_id: env::var("GOOGLE_CALENDAR_ID").unwrap_or_default(),
        }
    }
}
