//! SMTP transport over an async lettre STARTTLS relay.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, Tokio1Executor};
use smelinx_core::config::SmtpConfig;
use smelinx_core::error::{Result, SmelinxError};
use smelinx_core::traits::Mailer;

use crate::text::html_to_text;

/// Connect and command timeout for the relay; stays below the dispatcher's
/// per-send bound.
pub const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SmtpMailer {
    config: SmtpConfig,
    from: String,
    from_name: Option<String>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig, from: String, from_name: Option<String>) -> Self {
        Self {
            config,
            from,
            from_name: from_name.filter(|n| !n.trim().is_empty()),
        }
    }

    /// Build the multipart/alternative message (plain + HTML).
    pub fn build_message(&self, to: &str, subject: &str, html: &str) -> Result<LettreMessage> {
        let from = match &self.from_name {
            Some(name) => format!("{name} <{}>", self.from),
            None => self.from.clone(),
        };
        let from_mailbox: Mailbox = from
            .parse()
            .map_err(|e| SmelinxError::Channel(format!("Invalid from: {e}")))?;
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| SmelinxError::Channel(format!("Invalid to: {e}")))?;

        LettreMessage::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                html_to_text(html),
                html.to_string(),
            ))
            .map_err(|e| SmelinxError::Channel(format!("Build email: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let email = self.build_message(to, subject, html)?;

        let mut transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
            .map_err(|e| SmelinxError::Channel(format!("SMTP relay: {e}")))?
            .port(self.config.port)
            .timeout(Some(SMTP_TIMEOUT));
        if !self.config.username.is_empty() {
            transport = transport.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.clone(),
            ));
        }

        transport
            .build()
            .send(email)
            .await
            .map_err(|e| SmelinxError::Channel(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent to: {to}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailer() -> SmtpMailer {
        SmtpMailer::new(
            SmtpConfig {
                host: "smtp.example.com".into(),
                port: 587,
                username: String::new(),
                password: String::new(),
            },
            "noreply@smelinx.dev".into(),
            Some("Smelinx".into()),
        )
    }

    #[test]
    fn test_build_message_is_multipart() {
        let msg = mailer()
            .build_message("dev@acme.io", "Sunset notice", "<p>Gone<br/>soon</p>")
            .unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("Subject: Sunset notice"));
        assert!(raw.contains("<noreply@smelinx.dev>"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn test_smtp_timeout_fits_inside_send_timeout() {
        let notify = smelinx_core::config::NotifyConfig::default();
        assert!(SMTP_TIMEOUT < notify.send_timeout());
    }

    #[test]
    fn test_invalid_recipient_is_channel_error() {
        let err = mailer().build_message("not an address", "s", "<p>x</p>").unwrap_err();
        assert!(matches!(err, SmelinxError::Channel(_)));
    }
}
