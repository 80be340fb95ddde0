//! SendGrid v3 mail transport.

use std::time::Duration;

use async_trait::async_trait;
use smelinx_core::error::{Result, SmelinxError};
use smelinx_core::traits::Mailer;

use crate::text::html_to_text;

/// Sends notices through `POST {api_base}/v3/mail/send`.
pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    from: String,
    from_name: Option<String>,
}

impl SendGridMailer {
    pub fn new(
        api_key: String,
        api_base: String,
        from: String,
        from_name: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            from,
            from_name: from_name.filter(|n| !n.trim().is_empty()),
        }
    }

    fn payload(&self, to: &str, subject: &str, html: &str) -> serde_json::Value {
        let mut from = serde_json::json!({ "email": self.from });
        if let Some(name) = &self.from_name {
            from["name"] = serde_json::Value::String(name.clone());
        }
        serde_json::json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": from,
            "subject": subject,
            "content": [
                { "type": "text/plain", "value": html_to_text(html) },
                { "type": "text/html", "value": html }
            ]
        })
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    fn name(&self) -> &str {
        "sendgrid"
    }

    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let url = format!("{}/v3/mail/send", self.api_base);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.payload(to, subject, html))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| SmelinxError::Channel(format!("SendGrid request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SmelinxError::Channel(format!(
                "SendGrid API error {status}: {body}"
            )));
        }

        tracing::info!("📤 SendGrid accepted mail to {to}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mailer(base: &str) -> SendGridMailer {
        SendGridMailer::new(
            "SG.test".into(),
            base.into(),
            "noreply@smelinx.dev".into(),
            Some("Smelinx".into()),
        )
    }

    #[test]
    fn test_payload_shape() {
        let m = mailer("https://api.sendgrid.com/");
        assert_eq!(m.api_base, "https://api.sendgrid.com");

        let p = m.payload("dev@acme.io", "Subject", "<p>Hello</p>");
        assert_eq!(p["personalizations"][0]["to"][0]["email"], "dev@acme.io");
        assert_eq!(p["from"]["email"], "noreply@smelinx.dev");
        assert_eq!(p["from"]["name"], "Smelinx");
        assert_eq!(p["content"][0]["type"], "text/plain");
        assert_eq!(p["content"][0]["value"], "Hello");
        assert_eq!(p["content"][1]["value"], "<p>Hello</p>");
    }

    #[tokio::test]
    async fn test_send_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(header("authorization", "Bearer SG.test"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let m = mailer(&server.uri());
        m.send("dev@acme.io", "Subject", "<p>Hello</p>").await.unwrap();
    }

    #[tokio::test]
    async fn test_send_rejected_reports_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad sender"))
            .mount(&server)
            .await;

        let err = mailer(&server.uri())
            .send("dev@acme.io", "Subject", "<p>Hello</p>")
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("400"), "{msg}");
        assert!(msg.contains("bad sender"), "{msg}");
    }
}
