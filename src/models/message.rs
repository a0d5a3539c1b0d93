/// One inbound WhatsApp turn — the sole input to the state machine.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub from: String,
    pub body: String,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
}

impl IncomingMessage {
    pub fn text(from: &str, body: &str) -> Self {
        Self {
            from: from.to_string(),
            body: body.to_string(),
            media_url: None,
            media_type: None,
        }
    }
}
