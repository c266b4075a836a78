//! Hireline Server
//!
//! Page connection lifecycle backend for the recruiting dashboard.
//! Connects messaging pages through the provider's OAuth handshake,
//! watches token validity, and keeps the team informed before a
//! connection goes dark.

pub mod api;
pub mod auth;
pub mod config;
pub mod connections;
pub mod db;
pub mod email;
pub mod events;
pub mod monitor;
pub mod notifications;
pub mod provider;
pub mod secrets;
pub mod webhooks;
pub mod ws;
