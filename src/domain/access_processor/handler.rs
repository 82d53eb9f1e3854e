use actix::prelude::{ActorContext, Handler};
use std::sync::Arc;

use crate::domain::access_processor::access_processor::Availability;
use crate::domain::access_processor::actor::{AccessProcessorActor, ApplicationFailure, BarrierWaiter, MainAccessWaiter, PendingTask};
use crate::domain::access_processor::messages::AccessProcessorMessage;
use crate::domain::action::orchestrator::TaskEnd;
use crate::domain::runtime::dispatcher::messages::DispatcherMessage;
use crate::domain::runtime::task_handle::TaskHandle;
use crate::domain::task::outcome::TaskOutcome;
use crate::domain::task::task::TaskDescription;
use crate::error::{Error, Result};

impl Handler<AccessProcessorMessage> for AccessProcessorActor {
    type Result = ();

    fn handle(&mut self, msg: AccessProcessorMessage, ctx: &mut Self::Context) {
        match msg {
            AccessProcessorMessage::SubmitTask { description, reply } => {
                let _ = reply.send(self.submit(description));
            }
            AccessProcessorMessage::RegisterData { name, data_type, location, reply } => {
                if self.closed {
                    let _ = reply.send(Err(Error::ShutdownInProgress));
                    return;
                }
                let _ = reply.send(Ok(self.processor.register_data(&name, data_type, location)));
            }
            AccessProcessorMessage::MainAccess { name, reply } => {
                let instance = match self.processor.main_access(&name) {
                    Ok(instance) => instance,
                    Err(e) => {
                        let _ = reply.send(Err(e));
                        return;
                    }
                };
                match self.processor.availability(instance) {
                    Availability::Ready(locations) => {
                        let _ = reply.send(Ok(locations));
                    }
                    Availability::Failed => {
                        let _ = reply.send(Err(Error::DataNotAvailable(name)));
                    }
                    Availability::Pending => {
                        log::debug!("Main access to '{}' waits for {}.", name, instance);
                        self.main_waiters.push(MainAccessWaiter { name, instance, reply });
                    }
                }
            }
            AccessProcessorMessage::DeleteData { name, reply } => {
                let _ = reply.send(self.processor.delete_data(&name));
            }
            AccessProcessorMessage::Barrier { group, reply } => {
                if self.outstanding(group.as_ref()) == 0 {
                    let _ = reply.send(self.barrier_result(group.as_ref()));
                } else {
                    self.barrier_waiters.push(BarrierWaiter { group, reply });
                }
            }
            AccessProcessorMessage::TaskEnded(end) => self.task_ended(end),
            AccessProcessorMessage::Counters { reply } => {
                let _ = reply.send(self.counters);
            }
            AccessProcessorMessage::Close { reply } => {
                self.closed = true;
                let _ = reply.send(());
            }
            AccessProcessorMessage::Stop { reply } => {
                self.closed = true;
                let _ = reply.send(self.checkpoint.shutdown());
                ctx.stop();
            }
        }
    }
}

impl AccessProcessorActor {
    fn submit(&mut self, description: TaskDescription) -> Result<TaskHandle> {
        if self.closed {
            return Err(Error::ShutdownInProgress);
        }
        let task = self.processor.register_task(description)?;
        let (outcome, handle) = TaskHandle::channel(task.id, task.signature());
        self.counters.submitted += 1;

        if self.checkpoint.recover_task(&task, self.processor.data()) {
            self.processor.task_ended(task.id);
            self.counters.record(&TaskOutcome::Recovered);
            let _ = outcome.send(TaskOutcome::Recovered);
            self.wake_waiters();
            return Ok(handle);
        }

        self.checkpoint.new_task(&task);
        if let Some(group) = &task.description.group {
            *self.group_pending.entry(group.clone()).or_default() += 1;
        }
        let task = Arc::new(task);
        self.pending.insert(task.id, PendingTask { task: task.clone(), outcome });
        self.dispatcher.do_send(DispatcherMessage::NewAction(task));
        Ok(handle)
    }

    fn task_ended(&mut self, end: TaskEnd) {
        self.processor.task_ended(end.task_id);
        let Some(pending) = self.pending.remove(&end.task_id) else {
            log::debug!("{} ended but is not pending.", end.task_id);
            return;
        };

        if let Some(group) = &pending.task.description.group {
            if let Some(count) = self.group_pending.get_mut(group) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.group_pending.remove(group);
                }
            }
        }

        let checkpointed = if end.outcome.is_success() {
            self.checkpoint.end_task(&pending.task, self.processor.data())
        } else {
            self.checkpoint.task_failed(end.task_id)
        };
        if let Err(e) = checkpointed {
            log::error!("Checkpointing {} failed: {}", end.task_id, e);
        }

        if end.fatal {
            let reason = match &end.outcome {
                TaskOutcome::Failed { error, .. } => error.to_string(),
                other => format!("{:?}", other),
            };
            log::error!("{} ({}) failed the application: {}", end.task_id, pending.task.signature(), reason);
            self.failures.push(ApplicationFailure {
                task_id: end.task_id,
                signature: pending.task.signature().to_string(),
                group: pending.task.description.group.clone(),
                reason,
            });
        }

        self.counters.record(&end.outcome);
        let _ = pending.outcome.send(end.outcome);
        self.wake_waiters();
    }
}
