use actix::prelude::{Actor, Addr, AsyncContext, Context};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::domain::access_processor::access_processor::AccessProcessor;
use crate::domain::access_processor::actor::AccessProcessorActor;
use crate::domain::access_processor::messages::AccessProcessorMessage;
use crate::domain::action::orchestrator::ActionOrchestrator;
use crate::domain::adaptor::storage_backend::StorageBackend;
use crate::domain::adaptor::worker_adaptor::WorkerAdaptor;
use crate::domain::checkpoint::manager::CheckpointManager;
use crate::domain::checkpoint::record::CheckpointStore;
use crate::domain::data::data_info_provider::DataInfoProvider;
use crate::domain::data::data_instance::DataInstanceId;
use crate::domain::data::data_location::DataLocation;
use crate::domain::job::job_manager::JobManager;
use crate::domain::resource::resource_update::ResourceUpdate;
use crate::domain::resource::worker::Worker;
use crate::domain::runtime::config::RuntimeConfig;
use crate::domain::runtime::dispatcher::TaskDispatcher;
use crate::domain::runtime::dispatcher::messages::{DispatcherMessage, DispatcherStatus};
use crate::domain::runtime::task_handle::{TaskCounters, TaskHandle};
use crate::domain::scheduler::task_scheduler::TaskScheduler;
use crate::domain::task::parameter::DataType;
use crate::domain::task::task::TaskDescription;
use crate::domain::utils::id::{DataName, TaskGroupName, TaskId, WorkerName};
use crate::domain::utils::statistics::JobTracer;
use crate::error::{ConversionError, Error, Result};

/// What happens to tasks still pending when the runtime shuts down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownMode {
    /// Wait for every submitted task to end.
    #[default]
    Drain,
    /// Cancel queued tasks and kill running jobs.
    Cancel,
}

impl FromStr for ShutdownMode {
    type Err = ConversionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drain" => Ok(ShutdownMode::Drain),
            "cancel" => Ok(ShutdownMode::Cancel),
            _ => Err(ConversionError::UnknownShutdownMode(s.to_string())),
        }
    }
}

impl fmt::Display for ShutdownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownMode::Drain => write!(f, "drain"),
            ShutdownMode::Cancel => write!(f, "cancel"),
        }
    }
}

/// What the runtime reports once shut down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub counters: TaskCounters,
    /// Set when a task failure aborted the application.
    pub failure: Option<String>,
    pub discarded_notifications: u64,
}

/// Entry point of the application: submits tasks, accesses data and waits on barriers.
///
/// Every call is turned into a message to one of the two runtime actors, so calls from one caller are
/// processed in the order they were made. Must be used from within a running actix system.
pub struct Runtime {
    access_processor: Addr<AccessProcessorActor>,
    dispatcher: Addr<TaskDispatcher>,
    adaptor: Arc<dyn WorkerAdaptor>,
}

impl Runtime {
    pub async fn start(config: RuntimeConfig, adaptor: Arc<dyn WorkerAdaptor>) -> Result<Self> {
        Self::start_with_storage(config, adaptor, None).await
    }

    /// Starts both actors. Configured workers that do not answer a ping are left out.
    pub async fn start_with_storage(
        config: RuntimeConfig,
        adaptor: Arc<dyn WorkerAdaptor>,
        storage: Option<Arc<dyn StorageBackend>>,
    ) -> Result<Self> {
        let data = DataInfoProvider::new();

        let checkpoint = if config.checkpoint.policy.is_enabled() {
            CheckpointManager::new(
                config.checkpoint.policy,
                CheckpointStore::new(&config.checkpoint.directory),
                config.checkpoint.avoid_signatures.clone(),
            )?
        } else {
            CheckpointManager::disabled()
        };
        let tracer = if config.trace.enabled { Some(JobTracer::init(config.trace.path.clone())?) } else { None };

        let mut scheduler = TaskScheduler::new(config.policy, data.clone());
        let mut jobs = JobManager::new(adaptor.clone(), data.clone());
        if let Some(storage) = storage {
            scheduler = scheduler.with_storage(storage.clone());
            jobs = jobs.with_storage(storage);
        }
        for worker in config.workers {
            match adaptor.ping_worker(&worker.name).await {
                Ok(()) => {
                    scheduler.add_worker(worker);
                }
                Err(e) => log::warn!("Worker '{}' left out: {}", worker.name, e),
            }
        }
        let orchestrator = ActionOrchestrator::new(scheduler, data.clone(), config.orchestrator);

        let ap_context = Context::<AccessProcessorActor>::new();
        let dispatcher = TaskDispatcher::new(orchestrator, jobs, tracer, ap_context.address().recipient()).start();
        let access_processor =
            ap_context.run(AccessProcessorActor::new(AccessProcessor::new(data), checkpoint, dispatcher.clone()));

        log::info!("Runtime started with policy {} and checkpoint policy {}.", config.policy, config.checkpoint.policy);
        Ok(Runtime { access_processor, dispatcher, adaptor })
    }

    async fn ask_access_processor<T>(&self, message: impl FnOnce(oneshot::Sender<T>) -> AccessProcessorMessage) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.access_processor.send(message(reply)).await?;
        response.await.map_err(|_| Error::ShutdownInProgress)
    }

    async fn ask_dispatcher<T>(&self, message: impl FnOnce(oneshot::Sender<T>) -> DispatcherMessage) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.dispatcher.send(message(reply)).await?;
        response.await.map_err(|_| Error::ShutdownInProgress)
    }

    /// Analyses the task's accesses and queues it. Fails only for malformed descriptions or after shutdown.
    pub async fn submit_task(&self, description: TaskDescription) -> Result<TaskHandle> {
        self.ask_access_processor(|reply| AccessProcessorMessage::SubmitTask { description, reply }).await?
    }

    /// Makes a main program value available to tasks as a new version of `name`.
    pub async fn register_data(&self, name: &str, data_type: DataType, location: DataLocation) -> Result<DataInstanceId> {
        let name = DataName::new(name);
        self.ask_access_processor(|reply| AccessProcessorMessage::RegisterData { name, data_type, location, reply }).await?
    }

    /// Waits until the latest version of `name` is produced and returns where it lives.
    pub async fn main_access(&self, name: &str) -> Result<Vec<DataLocation>> {
        let name = DataName::new(name);
        self.ask_access_processor(|reply| AccessProcessorMessage::MainAccess { name, reply }).await?
    }

    pub async fn delete_data(&self, name: &str) -> Result<()> {
        let name = DataName::new(name);
        self.ask_access_processor(|reply| AccessProcessorMessage::DeleteData { name, reply }).await?
    }

    /// Waits until every submitted task ended. Reports `ApplicationFailed` once a task failed the application.
    pub async fn barrier(&self) -> Result<()> {
        self.ask_access_processor(|reply| AccessProcessorMessage::Barrier { group: None, reply }).await?
    }

    pub async fn barrier_group(&self, group: &str) -> Result<()> {
        let group = Some(TaskGroupName::new(group));
        self.ask_access_processor(|reply| AccessProcessorMessage::Barrier { group, reply }).await?
    }

    pub async fn cancel_task(&self, task_id: TaskId) -> Result<()> {
        self.dispatcher.send(DispatcherMessage::CancelTask(task_id)).await?;
        Ok(())
    }

    /// Adds a worker after checking the adaptor can reach it.
    pub async fn add_worker(&self, worker: Worker) -> Result<()> {
        let name = worker.name.clone();
        self.adaptor.ping_worker(&name).await.map_err(|e| {
            log::warn!("Worker '{}' does not answer: {}", name, e);
            Error::UnknownWorker(name.clone())
        })?;
        if self.ask_dispatcher(|reply| DispatcherMessage::AddWorker { worker, reply }).await? {
            Ok(())
        } else {
            Err(Error::ConversionError(ConversionError::DuplicateWorker(name.to_string())))
        }
    }

    pub async fn update_resources(&self, name: &str, update: ResourceUpdate) -> Result<()> {
        let name = WorkerName::new(name);
        self.ask_dispatcher(|reply| DispatcherMessage::UpdateWorker { name, update, reply }).await?
    }

    /// Stops scheduling on a worker, places its queued tasks elsewhere and shuts it down.
    pub async fn remove_worker(&self, name: &str) -> Result<()> {
        let name = WorkerName::new(name);
        let known = self.ask_dispatcher(|reply| DispatcherMessage::RemoveWorker { name: name.clone(), reply }).await?;
        if !known {
            return Err(Error::UnknownWorker(name));
        }
        if let Err(e) = self.adaptor.shutdown_worker(&name).await {
            log::warn!("Worker '{}' did not shut down cleanly: {}", name, e);
        }
        Ok(())
    }

    /// Moves up to `count` queued tasks from one worker to another. Returns how many moved.
    pub async fn steal_tasks(&self, from: &str, to: &str, count: usize) -> Result<usize> {
        let (from, to) = (WorkerName::new(from), WorkerName::new(to));
        self.ask_dispatcher(|reply| DispatcherMessage::StealTasks { from, to, count, reply }).await
    }

    pub async fn status(&self) -> Result<DispatcherStatus> {
        self.ask_dispatcher(|reply| DispatcherMessage::Status { reply }).await
    }

    pub async fn counters(&self) -> Result<TaskCounters> {
        self.ask_access_processor(|reply| AccessProcessorMessage::Counters { reply }).await
    }

    /// Refuses new work, settles pending tasks according to `mode`, persists checkpoints and stops the workers.
    pub async fn shutdown(self, mode: ShutdownMode) -> Result<ShutdownReport> {
        log::info!("Shutting down ({}).", mode);
        self.ask_access_processor(|reply| AccessProcessorMessage::Close { reply }).await?;
        if mode == ShutdownMode::Cancel {
            self.ask_dispatcher(|reply| DispatcherMessage::CancelAll { reply }).await?;
        }

        let failure = match self.barrier().await {
            Ok(()) => None,
            Err(Error::ApplicationFailed(reason)) => Some(reason),
            Err(e) => return Err(e),
        };
        let counters = self.counters().await?;
        let status = self.status().await?;

        let checkpointed = self.ask_access_processor(|reply| AccessProcessorMessage::Stop { reply }).await?;
        self.ask_dispatcher(|reply| DispatcherMessage::Stop { reply }).await?;
        for worker in status.workers.iter().filter(|w| !w.terminated) {
            if let Err(e) = self.adaptor.shutdown_worker(&worker.name).await {
                log::warn!("Worker '{}' did not shut down cleanly: {}", worker.name, e);
            }
        }
        checkpointed?;

        log::info!("Runtime stopped: {} task(s) submitted, {} completed.", counters.submitted, counters.completed);
        Ok(ShutdownReport { counters, failure, discarded_notifications: status.discarded_notifications })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_mode_from_str() {
        assert_eq!(ShutdownMode::from_str("Drain"), Ok(ShutdownMode::Drain));
        assert_eq!(ShutdownMode::from_str("cancel"), Ok(ShutdownMode::Cancel));
        assert!(ShutdownMode::from_str("abort").is_err());
    }
}
