use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Position in the booking flow. `Idle` is both the initial and the terminal
/// stage; every committed booking, completed cancellation or explicit reset
/// returns here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    AwaitingDate,
    AwaitingTime,
    AwaitingName,
    AwaitingCancelConfirmation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::AwaitingDate => "awaiting_date",
            Stage::AwaitingTime => "awaiting_time",
            Stage::AwaitingName => "awaiting_name",
            Stage::AwaitingCancelConfirmation => "awaiting_cancel_confirmation",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "awaiting_date" => Stage::AwaitingDate,
            "awaiting_time" => Stage::AwaitingTime,
            "awaiting_name" => Stage::AwaitingName,
            "awaiting_cancel_confirmation" => Stage::AwaitingCancelConfirmation,
            _ => Stage::Idle,
        }
    }
}

/// Partially collected booking fields. A scratchpad only — committed
/// appointments live in the appointments table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Draft {
    pub date: Option<String>,
    pub time: Option<String>,
    pub name: Option<String>,
    pub professional: Option<String>,
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub phone: String,
    pub stage: Stage,
    pub last_intent: Option<String>,
    pub draft: Draft,
    /// Appointment id awaiting a yes/no answer before cancellation.
    pub pending_cancellation: Option<String>,
    pub last_updated: NaiveDateTime,
}

impl ConversationState {
    pub fn new(phone: &str, now: NaiveDateTime) -> Self {
        Self {
            phone: phone.to_string(),
            stage: Stage::Idle,
            last_intent: None,
            draft: Draft::default(),
            pending_cancellation: None,
            last_updated: now,
        }
    }
}
