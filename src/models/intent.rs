use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Appointment,
    Cancel,
    Confirm,
    Urgency,
    Faq,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greeting => "greeting",
            Intent::Appointment => "appointment",
            Intent::Cancel => "cancel",
            Intent::Confirm => "confirm",
            Intent::Urgency => "urgency",
            Intent::Faq => "faq",
            Intent::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entities {
    pub date: Option<String>,
    pub time: Option<String>,
    pub name: Option<String>,
    pub urgency: Option<bool>,
}

/// What the external classifier returns for one message. The state machine
/// trusts it only above the configured confidence threshold; everything the
/// classifier says is advisory, keyword routing is the source of truth for
/// high-stakes intents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f32,
    #[serde(default)]
    pub entities: Entities,
}

impl Classification {
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.0,
            entities: Entities::default(),
        }
    }
}
