//! # Smelinx Channels
//! Mail transports for lifecycle notices.
//!
//! SendGrid over HTTPS, plain SMTP via lettre, and a console transport
//! for development. [`build_mailer`] picks one from configuration.

pub mod console;
pub mod email;
pub mod sendgrid;
mod text;

use std::sync::Arc;

use smelinx_core::config::{MailerConfig, MailerProvider};
use smelinx_core::traits::Mailer;

pub use console::ConsoleMailer;
pub use email::SmtpMailer;
pub use sendgrid::SendGridMailer;
pub use text::html_to_text;

/// Select a transport for `config`.
///
/// `auto` prefers SendGrid, then SMTP, then console. An explicit provider
/// whose credentials are missing falls back to console with a warning.
pub fn build_mailer(config: &MailerConfig) -> Arc<dyn Mailer> {
    let sendgrid_ready = config
        .sendgrid
        .as_ref()
        .is_some_and(|s| !s.api_key.trim().is_empty())
        && !config.from.trim().is_empty();
    let smtp_ready = config
        .smtp
        .as_ref()
        .is_some_and(|s| !s.host.trim().is_empty())
        && !config.from.trim().is_empty();

    let choice = match config.provider {
        MailerProvider::Console => MailerProvider::Console,
        MailerProvider::Auto if sendgrid_ready => MailerProvider::Sendgrid,
        MailerProvider::Auto if smtp_ready => MailerProvider::Smtp,
        MailerProvider::Auto => MailerProvider::Console,
        MailerProvider::Sendgrid if sendgrid_ready => MailerProvider::Sendgrid,
        MailerProvider::Smtp if smtp_ready => MailerProvider::Smtp,
        requested => {
            tracing::warn!(
                "Mailer {:?} requested but not configured (from/credentials missing); using console",
                requested
            );
            MailerProvider::Console
        }
    };

    let mailer: Arc<dyn Mailer> = match (choice, &config.sendgrid, &config.smtp) {
        (MailerProvider::Sendgrid, Some(sg), _) => Arc::new(SendGridMailer::new(
            sg.api_key.clone(),
            sg.api_base.clone(),
            config.from.clone(),
            config.from_name.clone(),
        )),
        (MailerProvider::Smtp, _, Some(smtp)) => Arc::new(SmtpMailer::new(
            smtp.clone(),
            config.from.clone(),
            config.from_name.clone(),
        )),
        _ => Arc::new(ConsoleMailer::new()),
    };

    tracing::info!("📮 Mailer: {}", mailer.name());
    mailer
}

#[cfg(test)]
mod tests {
    use super::*;
    use smelinx_core::config::{SendGridConfig, SmtpConfig};

    fn sendgrid() -> Option<SendGridConfig> {
        Some(SendGridConfig {
            api_key: "SG.key".into(),
            ..Default::default()
        })
    }

    fn smtp() -> Option<SmtpConfig> {
        Some(SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            username: "u".into(),
            password: "p".into(),
        })
    }

    #[test]
    fn test_auto_defaults_to_console() {
        let mailer = build_mailer(&MailerConfig::default());
        assert_eq!(mailer.name(), "console");
    }

    #[test]
    fn test_auto_prefers_sendgrid_then_smtp() {
        let mut config = MailerConfig {
            from: "noreply@smelinx.dev".into(),
            sendgrid: sendgrid(),
            smtp: smtp(),
            ..Default::default()
        };
        assert_eq!(build_mailer(&config).name(), "sendgrid");

        config.sendgrid = None;
        assert_eq!(build_mailer(&config).name(), "smtp");
    }

    #[test]
    fn test_sendgrid_without_sender_falls_back() {
        let config = MailerConfig {
            provider: MailerProvider::Sendgrid,
            sendgrid: sendgrid(),
            ..Default::default()
        };
        assert_eq!(build_mailer(&config).name(), "console");
    }

    #[test]
    fn test_explicit_console_wins() {
        let config = MailerConfig {
            provider: MailerProvider::Console,
            from: "noreply@smelinx.dev".into(),
            sendgrid: sendgrid(),
            ..Default::default()
        };
        assert_eq!(build_mailer(&config).name(), "console");
    }
}
