//! Transactional-outbox adapter for the `TileQueue` port.
//!
//! Envelopes are written to `tile_render_messages` in one transaction: either
//! every batch of a rebuild is enqueued or none is. Large rebuilds span
//! several `INSERT` statements inside that transaction. A separate relay
//! forwards outbox rows to the render workers; each row's `message_id` is the
//! id the renderer reports progress against.

use async_trait::async_trait;
use chrono::Utc;
use diesel_async::AsyncConnection as _;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use tracing::debug;
use uuid::Uuid;

use crate::domain::ports::{TileQueue, TileQueueError};
use crate::domain::{MessageId, TileBatch};

use super::diesel_helpers::{
    map_diesel_error_message, map_pool_error_message, rows_per_insert,
};
use super::models::NewTileRenderMessageRow;
use super::pool::DbPool;
use super::schema::tile_render_messages;

/// Bound values per outbox row.
const OUTBOX_COLUMNS: usize = 5;

/// Diesel-backed outbox implementation of the tile queue port.
#[derive(Clone)]
pub struct DieselTileQueue {
    pool: DbPool,
}

impl DieselTileQueue {
    /// Create a new queue adapter with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_rows(batches: &[TileBatch]) -> Result<Vec<NewTileRenderMessageRow>, TileQueueError> {
    let created_at = Utc::now();
    batches
        .iter()
        .map(|batch| {
            let payload = serde_json::to_value(batch).map_err(|err| {
                TileQueueError::encode(format!(
                    "batch for map {} could not be serialised: {err}",
                    batch.map_id
                ))
            })?;
            Ok(NewTileRenderMessageRow {
                message_id: Uuid::new_v4(),
                map_id: *batch.map_id.as_uuid(),
                athlete_id: batch.athlete_id.get(),
                payload,
                created_at,
            })
        })
        .collect()
}

#[async_trait]
impl TileQueue for DieselTileQueue {
    async fn enqueue(&self, batches: &[TileBatch]) -> Result<Vec<MessageId>, TileQueueError> {
        if batches.is_empty() {
            return Ok(Vec::new());
        }

        let rows = to_rows(batches)?;
        let message_ids: Vec<MessageId> = rows
            .iter()
            .map(|row| MessageId::new(row.message_id.to_string()))
            .collect();

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|err| TileQueueError::unavailable(map_pool_error_message(err)))?;

        let per_insert = rows_per_insert(OUTBOX_COLUMNS).get();
        conn.transaction(|conn| {
            async move {
                for chunk in rows.chunks(per_insert) {
                    diesel::insert_into(tile_render_messages::table)
                        .values(chunk)
                        .execute(conn)
                        .await?;
                }
                Ok::<_, diesel::result::Error>(())
            }
            .scope_boxed()
        })
        .await
        .map_err(|err| TileQueueError::rejected(map_diesel_error_message(err, "outbox insert")))?;

        debug!(count = message_ids.len(), "tile batches written to outbox");
        Ok(message_ids)
    }
}
