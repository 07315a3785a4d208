// Transactional email: the sender seam, its implementations, and the two
// message templates the marketplace sends.
//
// Delivery is best-effort: callers go through `send_best_effort`, which logs
// failures and never surfaces them.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Hands messages to an email provider.
#[async_trait]
pub trait EmailSender: Send + Sync + std::fmt::Debug {
    async fn send(&self, message: EmailMessage) -> Result<(), String>;
}

/// Send `message`, logging instead of failing.
pub async fn send_best_effort(sender: &dyn EmailSender, message: EmailMessage) {
    let to = message.to.clone();
    let subject = message.subject.clone();
    match sender.send(message).await {
        Ok(()) => tracing::debug!(%to, %subject, "email sent"),
        Err(err) => tracing::warn!(%to, %subject, error = %err, "failed to send email"),
    }
}

const BUTTON_STYLE: &str = "background-color: #4F46E5; color: white; padding: 12px 24px; \
text-decoration: none; border-radius: 6px; display: inline-block;";

/// Download link for a free route.
pub fn free_route_email(to: &str, route_title: &str, download_url: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: format!("Your Free Route: {route_title}"),
        html: format!(
            "<h1>Thanks for your interest!</h1>\
             <p>Here's your download link for <strong>{route_title}</strong>:</p>\
             <p><a href=\"{download_url}\" style=\"{BUTTON_STYLE}\">Download Route</a></p>\
             <p>This link will expire in 24 hours.</p>\
             <p>Explore more routes at our marketplace!</p>"
        ),
    }
}

/// Confirmation after a one-time purchase.
pub fn purchase_confirmation_email(to: &str, route_title: &str, download_url: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: format!("Purchase Confirmation: {route_title}"),
        html: format!(
            "<h1>Purchase Confirmed!</h1>\
             <p>Thank you for your purchase of <strong>{route_title}</strong>.</p>\
             <p><a href=\"{download_url}\" style=\"{BUTTON_STYLE}\">Download Your Route</a></p>\
             <p>You can access this route anytime from your dashboard.</p>"
        ),
    }
}

// ─── Resend ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Sends through the Resend HTTP API.
#[derive(Debug, Clone)]
pub struct ResendEmailSender {
    http: reqwest::Client,
    api_key: String,
    from: String,
    endpoint: String,
}

impl ResendEmailSender {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            from: from.into(),
            endpoint: "https://api.resend.com/emails".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send(&self, message: EmailMessage) -> Result<(), String> {
        let body = ResendRequest {
            from: &self.from,
            to: [message.to.as_str()],
            subject: &message.subject,
            html: &message.html,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("resend request failed: {e}"))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(format!("resend returned {status}: {text}"))
        }
    }
}

// ─── Log-only ────────────────────────────────────────────────────

/// Logs messages instead of delivering them. Used when no provider is configured.
#[derive(Debug, Clone, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: EmailMessage) -> Result<(), String> {
        tracing::info!(to = %message.to, subject = %message.subject, "email delivery disabled; message logged");
        Ok(())
    }
}

// ─── Recording ───────────────────────────────────────────────────

/// Keeps every message in memory. Can be told to fail every send.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmailSender {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    fail: bool,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: EmailMessage) -> Result<(), String> {
        if self.fail {
            return Err("recording sender configured to fail".into());
        }
        self.sent
            .lock()
            .map_err(|_| "recording sender poisoned".to_string())?
            .push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates() {
        let free = free_route_email("a@example.com", "Ridge Loop", "https://app/api/routes/download/abc");
        assert_eq!(free.subject, "Your Free Route: Ridge Loop");
        assert!(free.html.contains("https://app/api/routes/download/abc"));
        assert!(free.html.contains("expire in 24 hours"));

        let paid = purchase_confirmation_email("a@example.com", "Ridge Loop", "https://app/dashboard/routes/r1");
        assert_eq!(paid.subject, "Purchase Confirmation: Ridge Loop");
        assert!(paid.html.contains("/dashboard/routes/r1"));
    }

    #[tokio::test]
    async fn test_recording_sender() {
        let sender = RecordingEmailSender::new();
        send_best_effort(&sender, free_route_email("a@example.com", "T", "u")).await;
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let sender = RecordingEmailSender::failing();
        send_best_effort(&sender, free_route_email("a@example.com", "T", "u")).await;
        assert!(sender.sent().is_empty());
    }
}
