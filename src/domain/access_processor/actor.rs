use actix::prelude::{Actor, Addr, AsyncContext, Context};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::domain::access_processor::access_processor::{AccessProcessor, Availability};
use crate::domain::checkpoint::manager::CheckpointManager;
use crate::domain::checkpoint::policy::CheckpointPolicy;
use crate::domain::data::data_instance::DataInstanceId;
use crate::domain::data::data_location::DataLocation;
use crate::domain::runtime::dispatcher::TaskDispatcher;
use crate::domain::runtime::task_handle::TaskCounters;
use crate::domain::task::outcome::TaskOutcome;
use crate::domain::task::task::Task;
use crate::domain::utils::id::{DataName, TaskGroupName, TaskId};
use crate::error::{Error, Result};

pub(super) struct PendingTask {
    pub task: Arc<Task>,
    pub outcome: oneshot::Sender<TaskOutcome>,
}

pub(super) struct MainAccessWaiter {
    pub name: DataName,
    pub instance: DataInstanceId,
    pub reply: oneshot::Sender<Result<Vec<DataLocation>>>,
}

pub(super) struct BarrierWaiter {
    pub group: Option<TaskGroupName>,
    pub reply: oneshot::Sender<Result<()>>,
}

/// A failure that aborts the application, reported by the next barrier.
#[derive(Debug, Clone)]
pub(super) struct ApplicationFailure {
    pub task_id: TaskId,
    pub signature: String,
    pub group: Option<TaskGroupName>,
    pub reason: String,
}

/// Serializes every request of the application: task submissions, data accesses and barriers. Owns the
/// dependency analysis and the checkpoint bookkeeping; execution is delegated to the [`TaskDispatcher`].
pub struct AccessProcessorActor {
    pub(super) processor: AccessProcessor,
    pub(super) checkpoint: CheckpointManager,
    pub(super) dispatcher: Addr<TaskDispatcher>,
    pub(super) pending: HashMap<TaskId, PendingTask>,
    pub(super) group_pending: HashMap<TaskGroupName, usize>,
    pub(super) failures: Vec<ApplicationFailure>,
    pub(super) main_waiters: Vec<MainAccessWaiter>,
    pub(super) barrier_waiters: Vec<BarrierWaiter>,
    pub(super) counters: TaskCounters,
    pub(super) closed: bool,
}

impl AccessProcessorActor {
    pub fn new(processor: AccessProcessor, checkpoint: CheckpointManager, dispatcher: Addr<TaskDispatcher>) -> Self {
        AccessProcessorActor {
            processor,
            checkpoint,
            dispatcher,
            pending: HashMap::new(),
            group_pending: HashMap::new(),
            failures: Vec::new(),
            main_waiters: Vec::new(),
            barrier_waiters: Vec::new(),
            counters: TaskCounters::default(),
            closed: false,
        }
    }

    /// Tasks of `group` (or of the whole application) that did not end yet.
    pub(super) fn outstanding(&self, group: Option<&TaskGroupName>) -> usize {
        match group {
            None => self.pending.len(),
            Some(group) => self.group_pending.get(group).copied().unwrap_or(0),
        }
    }

    pub(super) fn barrier_result(&self, group: Option<&TaskGroupName>) -> Result<()> {
        let failure = self.failures.iter().find(|f| group.is_none() || f.group.as_ref() == group);
        match failure {
            Some(f) => Err(Error::ApplicationFailed(format!("{} ({}) failed: {}", f.task_id, f.signature, f.reason))),
            None => Ok(()),
        }
    }

    /// Answers every parked main access and barrier whose condition now holds.
    pub(super) fn wake_waiters(&mut self) {
        for waiter in std::mem::take(&mut self.main_waiters) {
            match self.processor.availability(waiter.instance) {
                Availability::Pending => self.main_waiters.push(waiter),
                Availability::Ready(locations) => {
                    log::debug!("Main access to '{}' ({}) served.", waiter.name, waiter.instance);
                    let _ = waiter.reply.send(Ok(locations));
                }
                Availability::Failed => {
                    let _ = waiter.reply.send(Err(Error::DataNotAvailable(waiter.name)));
                }
            }
        }

        for waiter in std::mem::take(&mut self.barrier_waiters) {
            if self.outstanding(waiter.group.as_ref()) > 0 {
                self.barrier_waiters.push(waiter);
            } else {
                let _ = waiter.reply.send(self.barrier_result(waiter.group.as_ref()));
            }
        }
    }
}

impl Actor for AccessProcessorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        if let CheckpointPolicy::Periodic { interval } = self.checkpoint.policy() {
            ctx.run_interval(interval, |act, _ctx| {
                if let Err(e) = act.checkpoint.snapshot() {
                    log::error!("Periodic checkpoint failed: {}", e);
                }
            });
        }
        log::debug!("Access processor started (checkpoint policy: {}).", self.checkpoint.policy());
    }
}
