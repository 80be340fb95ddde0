//! Dispatch loop — wakes on a tokio interval, pulls a due batch, sends each
//! notice and writes the outcome back to the store.
//!
//! One cycle at a time; items inside a cycle are handled sequentially in
//! selector order. Every send is bounded by its own timeout so a hung
//! transport call ends as a recorded failure instead of being dropped with
//! the cycle. Assumes a single dispatcher process per database.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use smelinx_core::config::NotifyConfig;
use smelinx_core::error::{Result, SmelinxError};
use smelinx_core::traits::Mailer;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::clock::{Clock, SystemClock};
use crate::compose::compose;
use crate::notification::{DueNotification, NotificationStatus};
use crate::policy::BackoffPolicy;
use crate::state::{Transition, Trigger, transition};
use crate::store::NotificationStore;

/// Slack on top of the cycle budget before the whole cycle is abandoned.
/// Only reached when the store itself stalls.
const CYCLE_GRACE: Duration = Duration::from_secs(5);

/// Loop settings, usually built from `[notify]`.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub poll_interval: Duration,
    pub batch_limit: u32,
    pub cycle_timeout: Duration,
    /// Upper bound for one `Mailer::send`.
    pub send_timeout: Duration,
    /// Used when the API has no contact address.
    pub fallback_recipient: Option<String>,
    pub product_name: String,
}

impl DispatchSettings {
    pub fn from_config(config: &NotifyConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            batch_limit: config.batch_limit,
            cycle_timeout: config.cycle_timeout(),
            send_timeout: config.send_timeout(),
            fallback_recipient: config
                .fallback_recipient
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            product_name: config.product_name.clone(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&NotifyConfig::default())
    }
}

/// Counters for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub due: usize,
    pub sent: usize,
    pub retried: usize,
    pub canceled: usize,
    /// No recipient could be resolved; record left untouched.
    pub skipped: usize,
    /// Not attempted because the cycle budget ran out; picked up next tick.
    pub deferred: usize,
    pub store_errors: usize,
}

pub struct Dispatcher {
    store: Arc<dyn NotificationStore>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    policy: BackoffPolicy,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        mailer: Arc<dyn Mailer>,
        policy: BackoffPolicy,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            mailer,
            clock: Arc::new(SystemClock),
            policy,
            settings,
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Contact address of the API, else the configured fallback.
    pub fn resolve_recipient(&self, due: &DueNotification) -> Option<String> {
        due.contact_email
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or(self.settings.fallback_recipient.as_deref())
            .map(String::from)
    }

    /// Run one cycle with no overall budget. Each send is still bounded by
    /// `send_timeout`.
    ///
    /// Fails only when the due batch cannot be read; per-item store errors
    /// are logged and counted.
    pub async fn dispatch_once(&self) -> Result<CycleReport> {
        self.cycle(None).await
    }

    /// One cycle bounded by the configured timeout.
    ///
    /// Sends get whatever is left of the budget (capped at `send_timeout`);
    /// items reached after the budget is spent are deferred untouched.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let budget = self.settings.cycle_timeout;
        let deadline = Instant::now() + budget;
        tokio::time::timeout(budget + CYCLE_GRACE, self.cycle(Some(deadline)))
            .await
            .map_err(|_| {
                SmelinxError::Timeout(format!("dispatch cycle exceeded {}s", budget.as_secs()))
            })?
    }

    async fn cycle(&self, deadline: Option<Instant>) -> Result<CycleReport> {
        let now = self.clock.now();
        let batch = self.store.list_due(now, self.settings.batch_limit).await?;

        let mut report = CycleReport {
            due: batch.len(),
            ..Default::default()
        };
        if batch.is_empty() {
            tracing::info!("📭 No notifications due at {}", now.to_rfc3339());
            return Ok(report);
        }
        tracing::info!("📬 {} notification(s) due", batch.len());

        for (i, due) in batch.iter().enumerate() {
            let limit = match deadline {
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        report.deferred = batch.len() - i;
                        tracing::warn!(
                            "⏳ Cycle budget spent; {} notice(s) left for the next tick",
                            report.deferred
                        );
                        break;
                    }
                    left.min(self.settings.send_timeout)
                }
                None => self.settings.send_timeout,
            };
            self.process(due, limit, &mut report).await;
        }
        Ok(report)
    }

    async fn process(&self, due: &DueNotification, limit: Duration, report: &mut CycleReport) {
        let Some(to) = self.resolve_recipient(due) else {
            tracing::warn!(
                "⏭️ Notice {} (attempts={}) has no recipient; skipping",
                due.id,
                due.attempts
            );
            report.skipped += 1;
            return;
        };

        let message = compose(due, &self.settings.product_name);
        let send = self.mailer.send(&to, &message.subject, &message.html);
        let trigger = match tokio::time::timeout(limit, send).await {
            Ok(Ok(())) => Trigger::Delivered,
            Ok(Err(e)) => Trigger::DeliveryFailed {
                error: e.to_string(),
            },
            Err(_) => Trigger::DeliveryFailed {
                error: format!("send timed out after {limit:?}"),
            },
        };

        let next = transition(
            NotificationStatus::Pending,
            due.attempts,
            trigger,
            &self.policy,
            self.clock.now(),
        );
        self.persist(due, next, &to, report).await;
    }

    async fn persist(
        &self,
        due: &DueNotification,
        next: Transition,
        to: &str,
        report: &mut CycleReport,
    ) {
        let id = due.id.as_str();
        let written = match &next {
            Transition::MarkSent => self.store.mark_sent(id).await,
            Transition::ScheduleRetry {
                attempts,
                retry_after,
                last_error,
            } => {
                self.store
                    .schedule_retry(id, *retry_after, *attempts, last_error)
                    .await
            }
            Transition::AutoCancel { attempts, reason } => {
                self.store.auto_cancel(id, *attempts, reason).await
            }
            Transition::Cancel { .. } | Transition::Ignore => return,
        };

        match written {
            Ok(true) => match next {
                Transition::MarkSent => {
                    report.sent += 1;
                    tracing::info!("📤 Notice {id} sent to {to} (attempts={})", due.attempts);
                }
                Transition::ScheduleRetry {
                    attempts,
                    retry_after,
                    last_error,
                } => {
                    report.retried += 1;
                    tracing::warn!(
                        "🔁 Notice {id} failed (attempts={attempts}); retry at {}: {last_error}",
                        retry_after.to_rfc3339()
                    );
                }
                Transition::AutoCancel { attempts, reason } => {
                    report.canceled += 1;
                    tracing::warn!("🛑 Notice {id} canceled (attempts={attempts}): {reason}");
                }
                Transition::Cancel { .. } | Transition::Ignore => {}
            },
            Ok(false) => {
                tracing::debug!("Notice {id} became terminal during the cycle; write skipped");
            }
            Err(e) => {
                report.store_errors += 1;
                tracing::error!(
                    "❌ Failed to persist outcome for notice {id} (attempts={}): {e}",
                    due.attempts
                );
            }
        }
    }

    /// Start the periodic lane. The first cycle runs immediately; a slow
    /// cycle delays the next tick instead of bursting.
    pub fn spawn(self: Arc<Self>) -> DispatcherHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            tracing::info!(
                "⏰ Notification dispatcher started (every {}s, batch {}, mailer {})",
                self.settings.poll_interval.as_secs(),
                self.settings.batch_limit,
                self.mailer.name()
            );

            let mut interval = tokio::time::interval(self.settings.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match self.run_cycle().await {
                            Ok(report) if report.due > 0 => {
                                tracing::info!(
                                    "✅ Cycle done: sent={} retried={} canceled={} skipped={} deferred={} store_errors={}",
                                    report.sent,
                                    report.retried,
                                    report.canceled,
                                    report.skipped,
                                    report.deferred,
                                    report.store_errors
                                );
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!("❌ Dispatch cycle failed: {e}"),
                        }
                    }
                }
            }

            tracing::info!("⏹️ Notification dispatcher stopped");
        });

        DispatcherHandle { shutdown_tx, join }
    }
}

/// Handle to a running dispatcher lane.
pub struct DispatcherHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stop after the in-flight cycle (if any) and wait for the lane to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            tracing::error!("Dispatcher task ended abnormally: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
