use actix::prelude::Message;
use tokio::sync::oneshot;

use crate::domain::action::orchestrator::TaskEnd;
use crate::domain::data::data_instance::DataInstanceId;
use crate::domain::data::data_location::DataLocation;
use crate::domain::runtime::task_handle::{TaskCounters, TaskHandle};
use crate::domain::task::parameter::DataType;
use crate::domain::task::task::TaskDescription;
use crate::domain::utils::id::{DataName, TaskGroupName};
use crate::error::Result;

#[derive(Message)]
#[rtype(result = "()")]
pub enum AccessProcessorMessage {
    SubmitTask { description: TaskDescription, reply: oneshot::Sender<Result<TaskHandle>> },
    RegisterData { name: DataName, data_type: DataType, location: DataLocation, reply: oneshot::Sender<Result<DataInstanceId>> },
    /// Answered once the latest version of `name` is produced.
    MainAccess { name: DataName, reply: oneshot::Sender<Result<Vec<DataLocation>>> },
    DeleteData { name: DataName, reply: oneshot::Sender<Result<()>> },
    /// Answered once every task (of `group`, when given) ended.
    Barrier { group: Option<TaskGroupName>, reply: oneshot::Sender<Result<()>> },
    TaskEnded(TaskEnd),
    Counters { reply: oneshot::Sender<TaskCounters> },
    /// Refuse further submissions.
    Close { reply: oneshot::Sender<()> },
    /// Flush checkpoints and stop the actor.
    Stop { reply: oneshot::Sender<Result<()>> },
}
