use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::{parse_classification, IntentClassifier};
use crate::models::{Classification, ConversationState};

const SYSTEM_PROMPT: &str = "Eres un clasificador de intenciones para el asistente de turnos \
de una clínica. Respondes únicamente con un objeto JSON, sin texto adicional, con esta forma: \
{\"intent\": \"greeting|appointment|cancel|confirm|urgency|faq|unknown\", \
\"confidence\": 0.0-1.0, \
\"entities\": {\"date\": \"DD/MM/YYYY o null\", \"time\": \"HH:MM o null\", \
\"name\": \"nombre completo o null\", \"urgency\": true/false/null}}. \
Si no estás seguro, usa \"unknown\" con confianza baja.";

pub struct OpenAiClassifier {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiClassifier {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IntentClassifier for OpenAiClassifier {
    async fn classify(
        &self,
        message: &str,
        context: Option<&ConversationState>,
    ) -> anyhow::Result<Classification> {
        let mut messages = vec![json!({
            "role": "system",
            "content": SYSTEM_PROMPT,
        })];

        if let Some(state) = context {
            messages.push(json!({
                "role": "system",
                "content": format!("Etapa actual de la conversación: {}", state.stage.as_str()),
            }));
        }

        messages.push(json!({
            "role": "user",
            "content": message,
        }));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.0,
        });

        let resp = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("failed to call OpenAI API")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse OpenAI response")?;

        if !status.is_success() {
            anyhow::bail!("OpenAI API error ({}): {}", status, data);
        }

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing content in OpenAI response"))?;

        Ok(parse_classification(content))
    }
}
