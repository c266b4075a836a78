//! Shared Domain Types

pub mod connection;
pub mod notification;

pub use connection::{ConnectionStatus, WebhookStatus};
pub use notification::NotificationKind;
