pub mod openai;

use async_trait::async_trait;

use crate::models::{Classification, ConversationState};

/// Pluggable intent classification. The keyword router works without it;
/// a classifier only refines routing when it answers confidently.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        message: &str,
        context: Option<&ConversationState>,
    ) -> anyhow::Result<Classification>;
}

/// Used when no API key is configured. Every message comes back unknown
/// with zero confidence, so keyword routing carries the conversation.
pub struct DisabledClassifier;

#[async_trait]
impl IntentClassifier for DisabledClassifier {
    async fn classify(
        &self,
        _message: &str,
        _context: Option<&ConversationState>,
    ) -> anyhow::Result<Classification> {
        Ok(Classification::unknown())
    }
}

/// Parses a model response into a classification. Tolerates markdown code
/// fences around the JSON; anything unparseable degrades to unknown.
pub fn parse_classification(raw: &str) -> Classification {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(cleaned).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to parse classifier response, treating as unknown");
        Classification::unknown()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Intent;

    #[test]
    fn parses_plain_json() {
        let c = parse_classification(
            r#"{"intent": "appointment", "confidence": 0.92, "entities": {"date": "15/03/2027"}}"#,
        );
        assert_eq!(c.intent, Intent::Appointment);
        assert!(c.confidence > 0.9);
        assert_eq!(c.entities.date.as_deref(), Some("15/03/2027"));
    }

    #[test]
    fn parses_fenced_json() {
        let c = parse_classification(
            "```json\n{\"intent\": \"cancel\", \"confidence\": 0.8}\n```",
        );
        assert_eq!(c.intent, Intent::Cancel);
    }

    #[test]
    fn garbage_degrades_to_unknown() {
        let c = parse_classification("I think the user wants an appointment");
        assert_eq!(c.intent, Intent::Unknown);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn missing_entities_defaults() {
        let c = parse_classification(r#"{"intent": "greeting", "confidence": 0.99}"#);
        assert_eq!(c.intent, Intent::Greeting);
        assert!(c.entities.date.is_none());
    }
}
