//! Database Queries
//!
//! Runtime queries (no compile-time `DATABASE_URL` required).
//!
//! All query functions include error context logging to aid debugging.

use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use super::models::User;

/// Log and return a database error with context.
///
/// This helper ensures all database errors are logged with relevant context
/// before being propagated, making production debugging easier.
macro_rules! db_error {
    ($query:expr) => {
        |e| {
            error!(query = $query, error = %e, "Database query failed");
            e
        }
    };
    ($query:expr, $($field:tt)*) => {
        |e| {
            error!(query = $query, $($field)*, error = %e, "Database query failed");
            e
        }
    };
}

pub(crate) use db_error;

// ============================================================================
// User Queries
// ============================================================================

/// Find user by ID.
pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error!("find_user_by_id", user_id = %id))
}

/// List users with admin standing. Admins receive every lifecycle
/// notification alongside the page owner.
pub async fn list_admin_users(pool: &PgPool) -> sqlx::Result<Vec<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE is_admin = TRUE ORDER BY username")
        .fetch_all(pool)
        .await
        .map_err(db_error!("list_admin_users"))
}

/// Create a user. Used by provisioning tooling and tests.
pub async fn create_user(
    pool: &PgPool,
    username: &str,
    display_name: &str,
    email: Option<&str>,
) -> sqlx::Result<User> {
    sqlx::query_as::<_, User>(
        r"INSERT INTO users (id, username, display_name, email)
          VALUES ($1, $2, $3, $4)
          RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(username)
    .bind(display_name)
    .bind(email)
    .fetch_one(pool)
    .await
    .map_err(db_error!("create_user", username = %username))
}
