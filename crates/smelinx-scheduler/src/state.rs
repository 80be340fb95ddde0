//! Notification state machine.
//!
//! ```text
//!            delivered                 ┌──────┐
//!   pending ──────────────────────────▶│ sent │
//!     │  ▲                             └──────┘
//!     │  │ failed, attempts < max
//!     │  └─(attempts += 1, retry_after = policy)
//!     │
//!     │ failed, attempts == max / user cancel   ┌──────────┐
//!     └────────────────────────────────────────▶│ canceled │
//!                                               └──────────┘
//! ```
//!
//! `transition` is pure; the dispatcher persists whatever it returns.

use chrono::{DateTime, Utc};

use crate::notification::NotificationStatus;
use crate::policy::{BackoffPolicy, RetryDecision};

/// Longest diagnostic kept in `last_error`, in bytes.
pub const MAX_ERROR_LEN: usize = 500;

/// Something that happened to a notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Delivered,
    DeliveryFailed { error: String },
    UserCanceled { reason: Option<String> },
}

/// The write that should follow a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    MarkSent,
    ScheduleRetry {
        attempts: u32,
        retry_after: DateTime<Utc>,
        last_error: String,
    },
    AutoCancel {
        attempts: u32,
        reason: String,
    },
    Cancel {
        reason: Option<String>,
    },
    /// Terminal record; nothing to write.
    Ignore,
}

/// Resolve `trigger` against a record currently in `status` with `attempts`
/// prior failures. `now` is the instant the trigger was observed.
pub fn transition(
    status: NotificationStatus,
    attempts: u32,
    trigger: Trigger,
    policy: &BackoffPolicy,
    now: DateTime<Utc>,
) -> Transition {
    if status.is_terminal() {
        return Transition::Ignore;
    }
    match trigger {
        Trigger::Delivered => Transition::MarkSent,
        Trigger::UserCanceled { reason } => Transition::Cancel { reason },
        Trigger::DeliveryFailed { error } => {
            let next = attempts.saturating_add(1);
            let diagnostic = failure_diagnostic(&error);
            match policy.decide(next, now) {
                RetryDecision::RetryAt { at, .. } => Transition::ScheduleRetry {
                    attempts: next,
                    retry_after: at,
                    last_error: diagnostic,
                },
                RetryDecision::Exhausted => Transition::AutoCancel {
                    attempts: next,
                    reason: format!("auto-canceled after max attempts; last error: {diagnostic}"),
                },
            }
        }
    }
}

/// `send failed: <error>`, cut to [`MAX_ERROR_LEN`] bytes.
pub fn failure_diagnostic(error: &str) -> String {
    truncate(&format!("send failed: {error}"), MAX_ERROR_LEN)
}

/// Cut `s` to at most `max` bytes without splitting a character.
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_secs(60),
            max_delay: Duration::from_secs(3600),
            max_attempts: 3,
        }
    }

    fn failed(msg: &str) -> Trigger {
        Trigger::DeliveryFailed { error: msg.into() }
    }

    #[test]
    fn test_delivery_marks_sent() {
        let t = transition(NotificationStatus::Pending, 2, Trigger::Delivered, &policy(), Utc::now());
        assert_eq!(t, Transition::MarkSent);
    }

    #[test]
    fn test_failure_schedules_retry() {
        let now = Utc::now();
        let t = transition(NotificationStatus::Pending, 0, failed("503"), &policy(), now);
        assert_eq!(
            t,
            Transition::ScheduleRetry {
                attempts: 1,
                retry_after: now + chrono::Duration::seconds(60),
                last_error: "send failed: 503".into(),
            }
        );
    }

    #[test]
    fn test_last_allowed_failure_cancels() {
        let t = transition(NotificationStatus::Pending, 2, failed("boom"), &policy(), Utc::now());
        assert_eq!(
            t,
            Transition::AutoCancel {
                attempts: 3,
                reason: "auto-canceled after max attempts; last error: send failed: boom".into(),
            }
        );
    }

    #[test]
    fn test_terminal_records_ignore_everything() {
        for status in [NotificationStatus::Sent, NotificationStatus::Canceled] {
            for trigger in [
                Trigger::Delivered,
                failed("x"),
                Trigger::UserCanceled { reason: None },
            ] {
                assert_eq!(
                    transition(status, 1, trigger, &policy(), Utc::now()),
                    Transition::Ignore
                );
            }
        }
    }

    #[test]
    fn test_user_cancel_keeps_reason() {
        let t = transition(
            NotificationStatus::Pending,
            0,
            Trigger::UserCanceled { reason: Some("API retired early".into()) },
            &policy(),
            Utc::now(),
        );
        assert_eq!(t, Transition::Cancel { reason: Some("API retired early".into()) });
    }

    #[test]
    fn test_diagnostic_truncates_on_char_boundary() {
        let long = "é".repeat(400);
        let d = failure_diagnostic(&long);
        assert!(d.len() <= MAX_ERROR_LEN);
        assert!(d.starts_with("send failed: é"));
        assert_eq!(truncate("short", 500), "short");
    }
}
