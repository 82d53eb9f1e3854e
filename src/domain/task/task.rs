use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::data::data_instance::DataInstanceId;
use crate::domain::task::implementation::Implementation;
use crate::domain::task::parameter::{DataType, Direction, Parameter};
use crate::domain::utils::id::{DataName, TaskGroupName, TaskId};
use crate::error::{ConversionError, Error, Result};

/// What happens to a task, and to the tasks depending on it, when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OnFailure {
    /// Reschedule while the retry budget lasts, then behave like `Fail`.
    #[default]
    Retry,
    /// Cancel successors and report the failure to the application.
    Fail,
    /// Treat the failure as a completion for the successors.
    Ignore,
    /// Cancel every transitive successor, without failing the application.
    CancelSuccessors,
}

impl FromStr for OnFailure {
    type Err = ConversionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RETRY" => Ok(OnFailure::Retry),
            "FAIL" => Ok(OnFailure::Fail),
            "IGNORE" => Ok(OnFailure::Ignore),
            "CANCEL_SUCCESSORS" => Ok(OnFailure::CancelSuccessors),
            _ => Err(ConversionError::UnknownOnFailure(s.to_string())),
        }
    }
}

/// Group of commutative tasks of which at most one runs at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutexGroupId(pub u64);

/// A task as submitted by the application, before dependency analysis.
#[derive(Debug, Clone)]
pub struct TaskDescription {
    pub signature: String,
    pub implementations: Vec<Implementation>,
    pub parameters: Vec<Parameter>,
    pub on_failure: OnFailure,
    pub priority: bool,
    pub group: Option<TaskGroupName>,
    /// Overrides the configured default timeout.
    pub timeout: Option<Duration>,
    /// Overrides the configured default retry budget.
    pub retry_budget: Option<u32>,
}

impl TaskDescription {
    pub fn new(signature: impl Into<String>, implementations: Vec<Implementation>) -> Self {
        TaskDescription {
            signature: signature.into(),
            implementations,
            parameters: Vec::new(),
            on_failure: OnFailure::default(),
            priority: false,
            group: None,
            timeout: None,
            retry_budget: None,
        }
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_on_failure(mut self, on_failure: OnFailure) -> Self {
        self.on_failure = on_failure;
        self
    }

    pub fn with_priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(TaskGroupName::new(group));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = Some(retry_budget);
        self
    }

    /// Rejects descriptions that can never be analysed or run.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Err(Error::InvalidTask { signature: self.signature.clone(), reason: reason.to_string() });

        if self.signature.trim().is_empty() {
            return invalid("empty signature");
        }
        if self.implementations.is_empty() {
            return invalid("no implementation");
        }
        for (index, parameter) in self.parameters.iter().enumerate() {
            match (parameter.data_type, &parameter.data) {
                (DataType::Basic, _) if parameter.direction != Direction::In => {
                    return invalid(&format!("basic parameter {} must be IN", index));
                }
                (DataType::Basic, _) if parameter.value.is_none() => {
                    return invalid(&format!("basic parameter {} has no value", index));
                }
                (DataType::Basic, _) => {}
                (_, None) => return invalid(&format!("parameter {} names no data", index)),
                (_, Some(_)) => {}
            }
        }
        Ok(())
    }
}

/// A submitted task after dependency analysis.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub description: TaskDescription,
    pub predecessors: BTreeSet<TaskId>,
    pub mutex_groups: Vec<MutexGroupId>,
    /// First parameter whose data could not be resolved. Such a task fails without being dispatched.
    pub missing_data: Option<DataName>,
}

impl Task {
    pub fn new(id: TaskId, description: TaskDescription) -> Self {
        Task { id, description, predecessors: BTreeSet::new(), mutex_groups: Vec::new(), missing_data: None }
    }

    pub fn signature(&self) -> &str {
        &self.description.signature
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.description.parameters
    }

    /// Versions the task reads, used for locality scoring.
    pub fn input_instances(&self) -> Vec<DataInstanceId> {
        self.description.parameters.iter().filter_map(|p| p.access.and_then(|a| a.read_instance())).collect()
    }

    /// Versions the task writes.
    pub fn output_instances(&self) -> Vec<DataInstanceId> {
        self.description.parameters.iter().filter_map(|p| p.access.and_then(|a| a.write_instance())).collect()
    }
}
