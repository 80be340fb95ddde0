//! Console transport: logs the message instead of delivering it.

use async_trait::async_trait;
use smelinx_core::error::Result;
use smelinx_core::traits::Mailer;

#[derive(Debug, Default, Clone)]
pub struct ConsoleMailer;

impl ConsoleMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for ConsoleMailer {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        tracing::info!(
            to = %to,
            subject = %subject,
            "✉️ [console mailer]\n{}",
            crate::text::html_to_text(html)
        );
        Ok(())
    }
}
