//! Driven port tracking render progress of queued tile batches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::define_port_error;
use crate::domain::athlete::{MapId, MessageId};

/// Render status of one queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStatus {
    Queued,
    Complete,
    Failed,
}

impl ProcessingStatus {
    /// Storage spelling of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// Parse the storage spelling.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "complete" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Status counts for the most recent batch of a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapProcessingSummary {
    pub created_at: DateTime<Utc>,
    pub queued: u64,
    pub complete: u64,
    pub failed: u64,
}

impl MapProcessingSummary {
    /// Messages counted across every status.
    pub fn total(&self) -> u64 {
        self.queued + self.complete + self.failed
    }

    /// Whether every message of the batch reached a terminal status.
    pub fn is_finished(&self) -> bool {
        self.queued == 0
    }
}

define_port_error! {
    /// Errors raised by map processing persistence adapters.
    pub enum MapProcessingRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "map processing connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "map processing query failed: {message}",
    }
}

/// Port for the `(map, message)` processing-state rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MapProcessingRepository: Send + Sync {
    /// Record `message_ids` as queued for `map_id`, stamped with the batch
    /// creation time.
    async fn record_queued(
        &self,
        map_id: MapId,
        created_at: DateTime<Utc>,
        message_ids: &[MessageId],
    ) -> Result<(), MapProcessingRepositoryError>;

    /// Move one message to a new status.
    async fn mark_status(
        &self,
        message_id: &MessageId,
        status: ProcessingStatus,
    ) -> Result<(), MapProcessingRepositoryError>;

    /// Counts for the latest batch of `map_id`, or `None` if nothing was
    /// queued yet.
    async fn summary(
        &self,
        map_id: MapId,
    ) -> Result<Option<MapProcessingSummary>, MapProcessingRepositoryError>;
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ProcessingStatus::Queued)]
    #[case(ProcessingStatus::Complete)]
    #[case(ProcessingStatus::Failed)]
    fn statuses_parse_from_their_storage_tag(#[case] status: ProcessingStatus) {
        assert_eq!(ProcessingStatus::parse(status.as_str()), Some(status));
    }

    #[rstest]
    fn unknown_status_tags_are_rejected() {
        assert_eq!(ProcessingStatus::parse("QUEUED"), None);
    }
}
