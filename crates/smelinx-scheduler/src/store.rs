//! Notification record store contract.
//!
//! The dispatcher only talks to this trait; [`crate::persistence::NotifyDb`]
//! is the SQLite implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smelinx_core::error::Result;

use crate::notification::{DueNotification, Notification, NotificationKind, NotificationStatus};

/// Batch size used when `list_due` is asked for `limit = 0`.
pub const DEFAULT_DUE_LIMIT: u32 = 50;

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Schedule a new pending notice for a live API version.
    async fn create(
        &self,
        api_id: &str,
        version_id: &str,
        kind: NotificationKind,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Notification>;

    async fn get_by_id(&self, id: &str) -> Result<Notification>;

    /// All notices of one API, earliest scheduled first.
    async fn list_for_api(&self, api_id: &str) -> Result<Vec<Notification>>;

    /// Pending notices due at `now` whose parents are live, earliest first.
    /// Read-only.
    async fn list_due(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<DueNotification>>;

    /// `pending -> sent`. Returns `false` when the record was already terminal.
    async fn mark_sent(&self, id: &str) -> Result<bool>;

    /// Record a failed attempt that will be retried at `retry_after`.
    /// Returns `false` when the record was already terminal.
    async fn schedule_retry(
        &self,
        id: &str,
        retry_after: DateTime<Utc>,
        attempts: u32,
        last_error: &str,
    ) -> Result<bool>;

    /// `pending -> canceled` after the attempt budget ran out.
    /// Returns `false` when the record was already terminal.
    async fn auto_cancel(&self, id: &str, attempts: u32, reason: &str) -> Result<bool>;

    /// Explicit status change from a user. Bypasses the dispatch logic but
    /// never leaves a terminal state.
    async fn set_status(&self, id: &str, status: NotificationStatus) -> Result<Notification>;

    /// Explicit user cancellation, optionally recording why.
    async fn cancel(&self, id: &str, reason: Option<&str>) -> Result<Notification>;
}
