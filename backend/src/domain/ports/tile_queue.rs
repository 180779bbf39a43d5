//! Driven port for dispatching tile render batches.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::athlete::MessageId;
use crate::domain::batch::TileBatch;

define_port_error! {
    /// Errors surfaced by the tile queue adapter.
    pub enum TileQueueError {
        /// Queue infrastructure is unavailable.
        Unavailable { message: String } => "tile queue is unavailable: {message}",
        /// A batch could not be encoded for the queue.
        Encode { message: String } => "tile batch could not be encoded: {message}",
        /// The queue refused or failed to persist the batches.
        Rejected { message: String } => "tile batches were rejected: {message}",
    }
}

/// Port for enqueueing render batches.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TileQueue: Send + Sync {
    /// Enqueue every batch and return the assigned message ids in input order.
    async fn enqueue(&self, batches: &[TileBatch]) -> Result<Vec<MessageId>, TileQueueError>;
}
