//! Mail transport contract.

use async_trait::async_trait;

use crate::error::Result;

/// Delivers one rendered message to one recipient.
///
/// The dispatcher is transport-agnostic: it only cares whether a send
/// succeeded, and on failure uses the error text as the retry diagnostic.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Short transport name for logs ("sendgrid", "smtp", "console").
    fn name(&self) -> &str;

    /// Send an HTML message. `Err` means the notice was not delivered.
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()>;
}
