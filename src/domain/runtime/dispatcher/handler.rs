use actix::prelude::{ActorContext, Handler};

use crate::domain::job::job::JobEvent;
use crate::domain::runtime::dispatcher::TaskDispatcher;
use crate::domain::runtime::dispatcher::messages::{DispatcherMessage, DispatcherStatus, WorkerStatus};
use crate::domain::utils::statistics::TraceEvent;

impl Handler<DispatcherMessage> for TaskDispatcher {
    type Result = ();

    fn handle(&mut self, msg: DispatcherMessage, ctx: &mut Self::Context) {
        match msg {
            DispatcherMessage::NewAction(task) => {
                let effects = self.orchestrator.new_action(task);
                self.apply(effects, ctx);
            }
            DispatcherMessage::CancelTask(task_id) => {
                let effects = self.orchestrator.cancel_task(task_id);
                self.apply(effects, ctx);
            }
            DispatcherMessage::CancelAll { reply } => {
                let effects = self.orchestrator.cancel_all();
                self.apply(effects, ctx);
                let _ = reply.send(());
            }
            DispatcherMessage::AddWorker { worker, reply } => {
                let known = self.orchestrator.scheduler().worker(&worker.name).is_some_and(|w| !w.is_terminated());
                let effects = self.orchestrator.add_worker(worker);
                self.apply(effects, ctx);
                let _ = reply.send(!known);
            }
            DispatcherMessage::UpdateWorker { name, update, reply } => match self.orchestrator.update_worker(&name, &update) {
                Ok(effects) => {
                    self.apply(effects, ctx);
                    let _ = reply.send(Ok(()));
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            DispatcherMessage::RemoveWorker { name, reply } => {
                let known = self.orchestrator.scheduler().worker(&name).is_some_and(|w| !w.is_terminated());
                let effects = self.orchestrator.remove_worker(&name);
                self.apply(effects, ctx);
                let _ = reply.send(known);
            }
            DispatcherMessage::StealTasks { from, to, count, reply } => {
                let (moved, effects) = self.orchestrator.steal_tasks(&from, &to, count);
                self.apply(effects, ctx);
                let _ = reply.send(moved);
            }
            DispatcherMessage::Status { reply } => {
                let _ = reply.send(self.status());
            }
            DispatcherMessage::Stop { reply } => {
                if let Some(mut tracer) = self.tracer.take() {
                    tracer.shutdown();
                }
                ctx.stop();
                let _ = reply.send(());
            }
        }
    }
}

impl Handler<JobEvent> for TaskDispatcher {
    type Result = ();

    fn handle(&mut self, event: JobEvent, ctx: &mut Self::Context) {
        self.jobs.job_finished(event.job_id);
        if let Some(tracer) = &self.tracer {
            tracer.add_event(TraceEvent::job_end(&event));
        }
        let effects = self.orchestrator.job_event(&event);
        self.apply(effects, ctx);
    }
}

impl TaskDispatcher {
    fn status(&self) -> DispatcherStatus {
        let scheduler = self.orchestrator.scheduler();
        let workers = scheduler
            .worker_names()
            .into_iter()
            .filter_map(|name| {
                let rs = scheduler.resource_scheduler(&name)?;
                Some(WorkerStatus {
                    name,
                    running: rs.running_len(),
                    queued: rs.queue_len(),
                    terminated: rs.worker().is_terminated(),
                })
            })
            .collect();

        DispatcherStatus {
            pending_actions: self.orchestrator.pending_actions(),
            running_jobs: self.jobs.running_jobs(),
            discarded_notifications: self.orchestrator.discarded_notifications(),
            workers,
        }
    }
}
