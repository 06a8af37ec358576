//! PostgreSQL persistence.
//!
//! `PgScheduleStore` and `PgAlertLog` back the engine's storage traits;
//! `PgInbox` backs the in-app notification channel and the inbox API.
//! Each store is a thin wrapper around a shared connection pool.

mod alert_log;
mod inbox;
mod schedules;

pub use alert_log::{AlertLogQuery, PgAlertLog};
pub use inbox::{InboxItem, PgInbox};
pub use schedules::PgScheduleStore;

use duewatch_engine::store::StoreError;

/// Connection-level trouble maps to `Unavailable` so it reads as retryable;
/// everything else is a query failure.
pub(crate) fn map_sqlx(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => {
            StoreError::Unavailable(e.to_string())
        }
        _ => StoreError::Query(e.to_string()),
    }
}

/// True for PostgreSQL unique violations (SQLSTATE 23505).
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = e {
        return db_err.code().as_deref() == Some("23505");
    }
    false
}
