//! PostgreSQL-backed `MapProcessingRepository` implementation.
//!
//! Every enqueue cycle stamps its messages with one `created_at`; the summary
//! reports the counts of the newest stamp for the requested map only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::Uuid as SqlUuid;
use diesel_async::AsyncConnection as _;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt as _;

use crate::domain::ports::{
    MapProcessingRepository, MapProcessingRepositoryError, MapProcessingSummary,
    ProcessingStatus,
};
use crate::domain::{MapId, MessageId};

use super::diesel_helpers::{
    cast_count, is_connection_error, map_diesel_error_message, map_pool_error_message,
    rows_per_insert,
};
use super::models::{NewQueueStateRow, QueueSummaryRow};
use super::pool::{DbPool, PoolError};
use super::schema::queue_processing_states;

const LATEST_SUMMARY_SQL: &str = r#"
SELECT created_at,
       COUNT(*) FILTER (WHERE status = 'queued') AS queued,
       COUNT(*) FILTER (WHERE status = 'complete') AS complete,
       COUNT(*) FILTER (WHERE status = 'failed') AS failed
FROM queue_processing_states
WHERE map_id = $1
  AND created_at = (
      SELECT MAX(created_at) FROM queue_processing_states WHERE map_id = $1
  )
GROUP BY created_at
"#;

/// Bound values per processing state row.
const QUEUE_STATE_COLUMNS: usize = 5;

/// Diesel-backed implementation of the map processing port.
#[derive(Clone)]
pub struct DieselMapProcessingRepository {
    pool: DbPool,
}

impl DieselMapProcessingRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> MapProcessingRepositoryError {
    MapProcessingRepositoryError::connection(map_pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> MapProcessingRepositoryError {
    if is_connection_error(&error) {
        return MapProcessingRepositoryError::connection(error.to_string());
    }
    MapProcessingRepositoryError::query(map_diesel_error_message(error, "map processing"))
}

#[async_trait]
impl MapProcessingRepository for DieselMapProcessingRepository {
    async fn record_queued(
        &self,
        map_id: MapId,
        created_at: DateTime<Utc>,
        message_ids: &[MessageId],
    ) -> Result<(), MapProcessingRepositoryError> {
        if message_ids.is_empty() {
            return Ok(());
        }

        let rows: Vec<NewQueueStateRow<'_>> = message_ids
            .iter()
            .map(|message_id| NewQueueStateRow {
                message_id: message_id.as_str(),
                map_id: *map_id.as_uuid(),
                status: ProcessingStatus::Queued.as_str(),
                created_at,
                updated_at: created_at,
            })
            .collect();

        let per_insert = rows_per_insert(QUEUE_STATE_COLUMNS).get();
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction(|conn| {
            async move {
                for chunk in rows.chunks(per_insert) {
                    diesel::insert_into(queue_processing_states::table)
                        .values(chunk)
                        .execute(conn)
                        .await?;
                }
                Ok::<_, diesel::result::Error>(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    async fn mark_status(
        &self,
        message_id: &MessageId,
        status: ProcessingStatus,
    ) -> Result<(), MapProcessingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(queue_processing_states::table)
            .filter(queue_processing_states::message_id.eq(message_id.as_str()))
            .set((
                queue_processing_states::status.eq(status.as_str()),
                queue_processing_states::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        if updated == 0 {
            return Err(MapProcessingRepositoryError::query(format!(
                "message {message_id} is not tracked"
            )));
        }
        Ok(())
    }

    async fn summary(
        &self,
        map_id: MapId,
    ) -> Result<Option<MapProcessingSummary>, MapProcessingRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<QueueSummaryRow> = sql_query(LATEST_SUMMARY_SQL)
            .bind::<SqlUuid, _>(*map_id.as_uuid())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;

        Ok(row.map(|row| MapProcessingSummary {
            created_at: row.created_at,
            queued: cast_count(row.queued),
            complete: cast_count(row.complete),
            failed: cast_count(row.failed),
        }))
    }
}
