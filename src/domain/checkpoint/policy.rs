use std::fmt;
use std::time::Duration;

use crate::error::ConversionError;

pub const DEFAULT_GROUP_SIZE: usize = 3;

/// When finished tasks are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckpointPolicy {
    #[default]
    None,
    /// Every `span` finished tasks.
    FinishedTasks { span: u32 },
    /// On a timer.
    Periodic { interval: Duration },
    /// Tasks are grouped in submission order; a group is persisted once its `size` members finished.
    InstantiatedGroup { size: usize },
}

impl CheckpointPolicy {
    /// Builds a policy from its configured name and the parameters it uses. Missing parameters fall back to
    /// sensible values; a zero span or interval is rejected.
    pub fn from_parts(
        name: &str,
        span: Option<u32>,
        interval: Option<Duration>,
        size: Option<usize>,
    ) -> Result<Self, ConversionError> {
        let normalized = name.chars().filter(|c| !matches!(c, '_' | '-' | '.')).collect::<String>().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "none" | "nocheckpoint" => Ok(CheckpointPolicy::None),
            "finishedtasks" => match span {
                Some(0) => Err(ConversionError::MissingField("checkpoint.span".to_string())),
                Some(span) => Ok(CheckpointPolicy::FinishedTasks { span }),
                None => Err(ConversionError::MissingField("checkpoint.span".to_string())),
            },
            "periodic" | "periodtime" => match interval {
                Some(interval) if !interval.is_zero() => Ok(CheckpointPolicy::Periodic { interval }),
                _ => Err(ConversionError::MissingField("checkpoint.intervalMs".to_string())),
            },
            "instantiatedgroup" => {
                let size = size.filter(|s| *s > 0).unwrap_or(DEFAULT_GROUP_SIZE);
                Ok(CheckpointPolicy::InstantiatedGroup { size })
            }
            _ => Err(ConversionError::UnknownCheckpointPolicy(name.to_string())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self != CheckpointPolicy::None
    }
}

impl fmt::Display for CheckpointPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointPolicy::None => write!(f, "none"),
            CheckpointPolicy::FinishedTasks { span } => write!(f, "finished tasks (every {})", span),
            CheckpointPolicy::Periodic { interval } => write!(f, "periodic ({:?})", interval),
            CheckpointPolicy::InstantiatedGroup { size } => write!(f, "instantiated group (size {})", size),
        }
    }
}
