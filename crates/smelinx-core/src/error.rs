//! Error type shared by every Smelinx crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmelinxError {
    #[error("Config error: {0}")]
    Config(String),

    /// Mail transport failure (network, provider rejection, bad address).
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SmelinxError>;
