//! Notification data model: kinds, statuses, stored records and the
//! denormalized due view handed to the dispatcher.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use smelinx_core::error::{Result, SmelinxError};

/// What the notice announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Deprecate,
    Sunset,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deprecate => "deprecate",
            Self::Sunset => "sunset",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = SmelinxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deprecate" => Ok(Self::Deprecate),
            "sunset" => Ok(Self::Sunset),
            other => Err(SmelinxError::Invalid(format!(
                "type must be 'deprecate' or 'sunset', got '{other}'"
            ))),
        }
    }
}

/// Delivery status. `Pending` is initial; `Sent` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Canceled,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Canceled)
    }

    /// Only `pending -> sent` and `pending -> canceled` exist.
    pub fn can_transition_to(&self, next: NotificationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Sent) | (Self::Pending, Self::Canceled)
        )
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = SmelinxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "canceled" => Ok(Self::Canceled),
            other => Err(SmelinxError::Invalid(format!("unknown status '{other}'"))),
        }
    }
}

/// A stored notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub api_id: String,
    pub version_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub scheduled_at: DateTime<Utc>,
    pub status: NotificationStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Whether the record is eligible at `now`, ignoring parent deletion.
    pub fn is_due_at(&self, now: DateTime<Utc>) -> bool {
        self.status == NotificationStatus::Pending
            && self.scheduled_at <= now
            && self.retry_after.is_none_or(|r| r <= now)
    }
}

/// A due notice plus the catalog context needed to compose the message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DueNotification {
    pub id: String,
    pub api_id: String,
    pub version_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub scheduled_at: DateTime<Utc>,
    pub attempts: u32,
    pub api_name: String,
    pub version: String,
    pub contact_email: Option<String>,
    pub base_url: Option<String>,
    pub docs_url: Option<String>,
}

/// Parse a schedule instant: RFC 3339, or `YYYY-MM-DD` meaning midnight UTC.
pub fn parse_schedule_time(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SmelinxError::Invalid("scheduled_at is required".into()));
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            SmelinxError::Invalid(format!(
                "scheduled_at must be RFC3339 or YYYY-MM-DD, got '{s}'"
            ))
        })
}
