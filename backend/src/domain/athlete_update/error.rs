//! Stage-tagged failures collected during an update run.

use std::fmt::Display;

use crate::domain::athlete::ActivityId;
use crate::domain::executor::TaskJoinError;

/// One failure observed by the pipeline, tagged with the stage it came from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AthleteUpdateError {
    #[error("importing activities failed: {message}")]
    Import { message: String },
    #[error("listing activities without streams failed: {message}")]
    PendingStreams { message: String },
    #[error("downloading stream for activity {activity_id} failed: {message}")]
    Download {
        activity_id: ActivityId,
        message: String,
    },
    #[error("rebuilding map failed: {message}")]
    Rebuild { message: String },
    #[error("recording athlete state failed: {message}")]
    State { message: String },
    #[error("fan-out task aborted: {message}")]
    Aborted { message: String },
}

impl AthleteUpdateError {
    pub(super) fn rebuild(err: impl Display) -> Self {
        Self::Rebuild {
            message: err.to_string(),
        }
    }
}

impl From<TaskJoinError> for AthleteUpdateError {
    fn from(err: TaskJoinError) -> Self {
        Self::Aborted {
            message: err.to_string(),
        }
    }
}
