//! Per-athlete pipeline stage recorded after every orchestrator transition.

use std::fmt;

const ERROR_PREFIX: &str = "Error";
const ERROR_SEPARATOR: &str = "::";
const MESSAGE_SEPARATOR: &str = ",";

/// Latest pipeline stage for one athlete.
///
/// The storage encoding is the variant name, except for [`AthleteState::Error`]
/// which is stored as `Error::{count}::{messages joined by ","}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AthleteState {
    ImportingActivities,
    DownloadingActivities,
    ComputingMapParams,
    ProcessingMap,
    /// Absorbing state carrying every failure of the run.
    Error { count: usize, messages: String },
}

/// A stored state string could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised athlete state: {value}")]
pub struct AthleteStateParseError {
    pub value: String,
}

impl AthleteState {
    /// Fold a list of failures into the error state.
    pub fn from_errors<E: fmt::Display>(errors: &[E]) -> Self {
        let messages = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(MESSAGE_SEPARATOR);
        Self::Error {
            count: errors.len(),
            messages,
        }
    }

    /// Whether the athlete's last run failed.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Storage encoding of the state.
    pub fn as_db_value(&self) -> String {
        match self {
            Self::ImportingActivities => "ImportingActivities".to_owned(),
            Self::DownloadingActivities => "DownloadingActivities".to_owned(),
            Self::ComputingMapParams => "ComputingMapParams".to_owned(),
            Self::ProcessingMap => "ProcessingMap".to_owned(),
            Self::Error { count, messages } => {
                format!("{ERROR_PREFIX}{ERROR_SEPARATOR}{count}{ERROR_SEPARATOR}{messages}")
            }
        }
    }

    /// Decode a stored state string.
    ///
    /// # Examples
    ///
    /// ```
    /// use heatmap::domain::AthleteState;
    ///
    /// let state = AthleteState::parse("Error::2::a,b")?;
    /// assert_eq!(
    ///     state,
    ///     AthleteState::Error { count: 2, messages: "a,b".to_owned() }
    /// );
    /// # Ok::<(), heatmap::domain::AthleteStateParseError>(())
    /// ```
    pub fn parse(value: &str) -> Result<Self, AthleteStateParseError> {
        match value {
            "ImportingActivities" => Ok(Self::ImportingActivities),
            "DownloadingActivities" => Ok(Self::DownloadingActivities),
            "ComputingMapParams" => Ok(Self::ComputingMapParams),
            "ProcessingMap" => Ok(Self::ProcessingMap),
            other => parse_error_state(other).ok_or_else(|| AthleteStateParseError {
                value: other.to_owned(),
            }),
        }
    }
}

fn parse_error_state(value: &str) -> Option<AthleteState> {
    let rest = value
        .strip_prefix(ERROR_PREFIX)?
        .strip_prefix(ERROR_SEPARATOR)?;
    let (count, messages) = rest.split_once(ERROR_SEPARATOR)?;
    Some(AthleteState::Error {
        count: count.parse().ok()?,
        messages: messages.to_owned(),
    })
}

impl fmt::Display for AthleteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_db_value())
    }
}
