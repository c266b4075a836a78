//! Hireline Common Library
//!
//! Shared types and the dashboard event protocol used by both the server
//! and dashboard clients. Enable the `postgres` feature for `sqlx` column
//! derives, `openapi` for `utoipa` schema derives.

pub mod error;
pub mod protocol;
pub mod types;

pub use error::{Error, Result};
pub use protocol::DashboardEvent;
pub use types::*;
