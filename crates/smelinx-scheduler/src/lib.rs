//! # Smelinx Scheduler
//!
//! Deferred dispatch of API lifecycle notices (deprecation, sunset).
//!
//! ## Architecture
//! ```text
//! Dispatcher (tokio interval, one cycle at a time)
//!   ├── NotificationStore::list_due(now, limit)   pending, due, live parents
//!   ├── per notice, in scheduled order:
//!   │     resolve recipient → compose → Mailer::send
//!   │     └── state::transition(trigger, BackoffPolicy)
//!   │           ├── MarkSent
//!   │           ├── ScheduleRetry (attempts += 1, retry_after)
//!   │           └── AutoCancel    (budget exhausted)
//!   └── write back through the store
//! ```
//!
//! SQLite persistence lives in [`persistence::NotifyDb`]; a restart picks up
//! exactly where the database says.

pub mod clock;
pub mod compose;
pub mod engine;
pub mod notification;
pub mod persistence;
pub mod policy;
pub mod state;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use compose::{ComposedMessage, compose};
pub use engine::{CycleReport, DispatchSettings, Dispatcher, DispatcherHandle};
pub use notification::{
    DueNotification, Notification, NotificationKind, NotificationStatus, parse_schedule_time,
};
pub use persistence::{NewApi, NotifyDb};
pub use policy::{BackoffPolicy, RetryDecision};
pub use state::{Transition, Trigger, transition};
pub use store::NotificationStore;
