//! # Smelinx Core
//!
//! Shared building blocks for the Smelinx lifecycle notice dispatcher:
//! configuration, the error type, the mail transport trait, and a small
//! fixed-window throttle for the request layer.

pub mod config;
pub mod error;
pub mod throttle;
pub mod traits;

pub use config::SmelinxConfig;
pub use error::{Result, SmelinxError};
pub use traits::Mailer;
