use actix::prelude::Message;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::domain::resource::resource_update::ResourceUpdate;
use crate::domain::resource::worker::Worker;
use crate::domain::task::task::Task;
use crate::domain::utils::id::{TaskId, WorkerName};
use crate::error::Result;

#[derive(Message)]
#[rtype(result = "()")]
pub enum DispatcherMessage {
    NewAction(Arc<Task>),
    CancelTask(TaskId),
    CancelAll { reply: oneshot::Sender<()> },
    /// Replies false when an active worker with that name exists.
    AddWorker { worker: Worker, reply: oneshot::Sender<bool> },
    UpdateWorker { name: WorkerName, update: ResourceUpdate, reply: oneshot::Sender<Result<()>> },
    RemoveWorker { name: WorkerName, reply: oneshot::Sender<bool> },
    /// Replies with the number of actions moved.
    StealTasks { from: WorkerName, to: WorkerName, count: usize, reply: oneshot::Sender<usize> },
    Status { reply: oneshot::Sender<DispatcherStatus> },
    /// Kills running jobs, flushes the trace and stops the actor.
    Stop { reply: oneshot::Sender<()> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub name: WorkerName,
    pub running: usize,
    pub queued: usize,
    pub terminated: bool,
}

/// Snapshot of the execution side.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherStatus {
    pub pending_actions: usize,
    pub running_jobs: usize,
    pub discarded_notifications: u64,
    pub workers: Vec<WorkerStatus>,
}
