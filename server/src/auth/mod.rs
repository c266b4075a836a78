//! Authentication
//!
//! Bearer-token authentication for dashboard requests. Login and account
//! management live in the identity service; this server only validates
//! access tokens it is handed and resolves them to dashboard users.

mod error;
pub mod jwt;
mod middleware;

pub use error::{AuthError, AuthResult};
pub use middleware::{require_auth, AuthUser};
