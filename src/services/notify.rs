//! Outbound notifications to the clinic staff. Delivery is best-effort:
//! failures are retried a few times and then logged, never surfaced to the
//! patient conversation.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// An optional file attached to a notification, e.g. a calendar invite.
#[derive(Debug, Clone)]
pub struct NotificationAttachment {
    pub filename: String,
    pub content: String,
    pub mime_type: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        subject: &str,
        body: &str,
        attachment: Option<&NotificationAttachment>,
    ) -> anyhow::Result<()>;
}

/// Sends notifications through an HTTP email API.
pub struct EmailNotifier {
    api_url: String,
    api_key: String,
    recipient: String,
    client: reqwest::Client,
}

impl EmailNotifier {
    pub fn new(api_url: String, api_key: String, recipient: String) -> Self {
        Self {
            api_url,
            api_key,
            recipient,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn notify(
        &self,
        subject: &str,
        body: &str,
        attachment: Option<&NotificationAttachment>,
    ) -> anyhow::Result<()> {
        let mut payload = json!({
            "to": self.recipient,
            "subject": subject,
            "text": body,
        });

        if let Some(att) = attachment {
            payload["attachments"] = json!([{
                "filename": att.filename,
                "content": att.content,
                "content_type": att.mime_type,
            }]);
        }

        self.client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("failed to call email API")?
            .error_for_status()
            .context("email API returned error")?;

        Ok(())
    }
}

/// Retries delivery up to [`MAX_ATTEMPTS`] times. Exhausting the retries
/// only logs; the caller's flow continues regardless.
pub async fn notify_clinic(
    notifier: &dyn Notifier,
    subject: &str,
    body: &str,
    attachment: Option<&NotificationAttachment>,
) {
    for attempt in 1..=MAX_ATTEMPTS {
        match notifier.notify(subject, body, attachment).await {
            Ok(()) => return,
            Err(e) if attempt < MAX_ATTEMPTS => {
                tracing::warn!(attempt, error = %e, "notification failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => {
                tracing::error!(error = %e, subject, "notification failed after all retries");
            }
        }
    }
}
