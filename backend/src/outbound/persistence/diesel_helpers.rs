//! Shared error mapping and statement sizing for Diesel repository
//! implementations.

use std::num::NonZeroUsize;

use tracing::debug;

use super::pool::PoolError;

/// Extract a readable message from a pool error.
pub fn map_pool_error_message(error: PoolError) -> String {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => message,
    }
}

/// Extract a readable message from a Diesel error and emit debug context.
pub fn map_diesel_error_message(error: diesel::result::Error, operation: &str) -> String {
    use diesel::result::Error as DieselError;

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), %operation, "diesel operation failed");
        }
        _ => debug!(%error, %operation, "diesel operation failed"),
    }
    error.to_string()
}

/// Whether the error reports a dropped database connection.
pub fn is_connection_error(error: &diesel::result::Error) -> bool {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    matches!(
        error,
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _)
    )
}

/// PostgreSQL's ceiling on bind parameters in one statement.
pub const MAX_BIND_PARAMETERS: usize = 65_535;

/// Rows of `columns` bound values each that fit in one multi-row `INSERT`.
pub fn rows_per_insert(columns: usize) -> NonZeroUsize {
    NonZeroUsize::new(MAX_BIND_PARAMETERS / columns.max(1)).unwrap_or(NonZeroUsize::MIN)
}

/// Cast a SQL `COUNT(*)` into an unsigned counter.
#[expect(
    clippy::cast_sign_loss,
    reason = "COUNT(*) is never negative in PostgreSQL"
)]
pub fn cast_count(count: i64) -> u64 {
    count as u64
}
