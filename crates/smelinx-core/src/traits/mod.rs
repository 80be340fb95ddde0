//! Seams between the dispatcher and its external collaborators.

pub mod mailer;

pub use mailer::Mailer;
