use actix::prelude::{ActorFutureExt, AsyncContext, Context, Recipient, WrapFuture};

use crate::domain::access_processor::messages::AccessProcessorMessage;
use crate::domain::action::orchestrator::{ActionOrchestrator, Effect, TaskEnd};
use crate::domain::job::job_manager::{DispatchOrder, JobManager};
use crate::domain::task::outcome::TaskOutcome;
use crate::domain::utils::statistics::{JobTracer, TraceEvent, TraceParameter};

mod actor;
mod handler;
pub mod messages;

/// Execution side of the runtime: owns the action graph, the scheduler and the jobs in flight.
///
/// Job futures run on the actor's context; their single event comes back as a message, so every state
/// change happens inside this actor.
pub struct TaskDispatcher {
    orchestrator: ActionOrchestrator,
    jobs: JobManager,
    tracer: Option<JobTracer>,
    access_processor: Recipient<AccessProcessorMessage>,
}

impl TaskDispatcher {
    pub fn new(
        orchestrator: ActionOrchestrator,
        jobs: JobManager,
        tracer: Option<JobTracer>,
        access_processor: Recipient<AccessProcessorMessage>,
    ) -> Self {
        TaskDispatcher { orchestrator, jobs, tracer, access_processor }
    }

    fn apply(&mut self, effects: Vec<Effect>, ctx: &mut Context<Self>) {
        for effect in effects {
            match effect {
                Effect::Dispatch(order) => self.dispatch(order, ctx),
                Effect::CancelJob { job_id, worker } => {
                    if !self.jobs.cancel(job_id) {
                        log::debug!("{} on '{}' already finished, nothing to cancel.", job_id, worker);
                    }
                }
                Effect::TaskEnded(end) => {
                    self.trace_task_end(&end);
                    self.access_processor.do_send(AccessProcessorMessage::TaskEnded(end));
                }
            }
        }
    }

    fn dispatch(&mut self, order: DispatchOrder, ctx: &mut Context<Self>) {
        let job = self.jobs.create_job(&order);
        if let Some(tracer) = &self.tracer {
            let mut event = TraceEvent::new("DISPATCH");
            event
                .set(TraceParameter::TaskId, job.task_id.to_string())
                .set(TraceParameter::JobId, job.id.to_string())
                .set(TraceParameter::Worker, job.worker.to_string())
                .set(TraceParameter::Signature, job.implementation.signature.as_str());
            tracer.add_event(event);
        }
        let future = self.jobs.submit(job);
        ctx.spawn(future.into_actor(self).map(|event, _act, ctx| ctx.notify(event)));
    }

    fn trace_task_end(&self, end: &TaskEnd) {
        let Some(tracer) = &self.tracer else {
            return;
        };
        let status = match &end.outcome {
            TaskOutcome::Completed => "COMPLETED",
            TaskOutcome::Recovered => "RECOVERED",
            TaskOutcome::Failed { ignored: true, .. } => "FAILED_IGNORED",
            TaskOutcome::Failed { .. } => "FAILED",
            TaskOutcome::Cancelled => "CANCELLED",
        };
        let mut event = TraceEvent::new("TASK");
        event.set(TraceParameter::TaskId, end.task_id.to_string()).set(TraceParameter::Status, status);
        if let TaskOutcome::Failed { error, .. } = &end.outcome {
            event.set(TraceParameter::Message, error.to_string());
        }
        tracer.add_event(event);
    }
}
