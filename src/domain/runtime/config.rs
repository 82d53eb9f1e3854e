use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::api::config_dto::{CheckpointDto, RuntimeConfigDto, WorkerDto};
use crate::domain::action::orchestrator::OrchestratorConfig;
use crate::domain::checkpoint::policy::CheckpointPolicy;
use crate::domain::resource::resource_description::ResourceDescription;
use crate::domain::resource::worker::Worker;
use crate::domain::scheduler::scheduling_policy::SchedulingPolicy;
use crate::error::{ConversionError, Error};

const DEFAULT_CHECKPOINT_DIRECTORY: &str = "checkpoints";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointConfig {
    pub policy: CheckpointPolicy,
    pub directory: PathBuf,
    pub avoid_signatures: HashSet<String>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        CheckpointConfig {
            policy: CheckpointPolicy::None,
            directory: PathBuf::from(DEFAULT_CHECKPOINT_DIRECTORY),
            avoid_signatures: HashSet::new(),
        }
    }
}

/// Job trace output. Traces go to stdout when no path is set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TraceConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
}

/// Resolved runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    pub policy: SchedulingPolicy,
    pub orchestrator: OrchestratorConfig,
    pub checkpoint: CheckpointConfig,
    pub trace: TraceConfig,
    /// Workers available at start.
    pub workers: Vec<Worker>,
}

impl RuntimeConfig {
    pub fn with_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_worker(mut self, worker: Worker) -> Self {
        self.workers.push(worker);
        self
    }

    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.orchestrator.retry_budget = retry_budget;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.orchestrator.default_timeout = Some(timeout);
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: CheckpointConfig) -> Self {
        self.checkpoint = checkpoint;
        self
    }
}

impl TryFrom<RuntimeConfigDto> for RuntimeConfig {
    type Error = Error;

    fn try_from(dto: RuntimeConfigDto) -> Result<Self, Self::Error> {
        let policy = SchedulingPolicy::from_str(&dto.scheduler.policy)?;

        let mut orchestrator = OrchestratorConfig::default();
        if let Some(retry_budget) = dto.scheduler.retry_budget {
            orchestrator.retry_budget = retry_budget;
        }
        orchestrator.default_timeout = match dto.scheduler.task_timeout_ms {
            Some(0) => return Err(invalid("scheduler.taskTimeoutMs", "must be positive")),
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        };

        let checkpoint = convert_checkpoint(&dto.checkpoint)?;
        let trace = TraceConfig { enabled: dto.trace.enabled, path: dto.trace.path.map(PathBuf::from) };

        let mut names = HashSet::new();
        let mut workers = Vec::with_capacity(dto.workers.len());
        for (index, worker) in dto.workers.iter().enumerate() {
            if !names.insert(worker.name.clone()) {
                return Err(ConversionError::DuplicateWorker(worker.name.clone()).into());
            }
            workers.push(convert_worker(index, worker)?);
        }

        Ok(RuntimeConfig { policy, orchestrator, checkpoint, trace, workers })
    }
}

fn invalid(field: &str, reason: &str) -> Error {
    ConversionError::InvalidValue { field: field.to_string(), reason: reason.to_string() }.into()
}

fn convert_checkpoint(dto: &CheckpointDto) -> Result<CheckpointConfig, Error> {
    let policy = CheckpointPolicy::from_parts(&dto.policy, dto.span, dto.interval_ms.map(Duration::from_millis), dto.group_size)?;
    Ok(CheckpointConfig {
        policy,
        directory: dto.directory.as_deref().map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_DIRECTORY)),
        avoid_signatures: dto.avoid_signatures.iter().cloned().collect(),
    })
}

fn convert_worker(index: usize, dto: &WorkerDto) -> Result<Worker, Error> {
    if dto.name.trim().is_empty() {
        return Err(ConversionError::MissingField(format!("workers[{}].name", index)).into());
    }
    if dto.cores == 0 {
        return Err(invalid(&format!("workers[{}].cores", index), "a worker needs at least one core"));
    }

    let mut description = ResourceDescription::new(dto.cores, dto.memory_mb);
    description.architecture = dto.architecture.clone();
    description.disks.extend(dto.disks.iter().cloned());
    description.tags.extend(dto.tags.iter().cloned());

    let mut worker = Worker::new(dto.name.clone(), description);
    if let Some(limit) = dto.limit_of_tasks {
        worker = worker.with_limit_of_tasks(limit);
    }
    for disk in &dto.shared_disks {
        worker = worker.with_shared_disk(disk.clone());
    }
    Ok(worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parser::parse_json_str;

    #[test]
    fn test_defaults_from_empty_document() {
        let dto: RuntimeConfigDto = parse_json_str("{}").unwrap();
        let config = RuntimeConfig::try_from(dto).unwrap();
        assert_eq!(config.policy, SchedulingPolicy::Fifo);
        assert_eq!(config.orchestrator, OrchestratorConfig::default());
        assert_eq!(config.checkpoint, CheckpointConfig::default());
        assert!(config.workers.is_empty());
    }

    #[test]
    fn test_full_document() {
        let dto: RuntimeConfigDto = parse_json_str(
            r#"{
                "scheduler": { "policy": "LB", "retryBudget": 4, "taskTimeoutMs": 1500 },
                "checkpoint": { "policy": "finished_tasks", "span": 2, "directory": "/tmp/cp", "avoidSignatures": ["app.noisy"] },
                "trace": { "enabled": true, "path": "logs/trace.csv" },
                "workers": [
                    { "name": "w1", "cores": 4, "memoryMb": 2048, "sharedDisks": ["nfs"], "limitOfTasks": 2 },
                    { "name": "w2", "cores": 1, "architecture": "arm", "tags": ["gpu"] }
                ]
            }"#,
        )
        .unwrap();
        let config = RuntimeConfig::try_from(dto).unwrap();

        assert_eq!(config.policy, SchedulingPolicy::LoadBalancing);
        assert_eq!(config.orchestrator.retry_budget, 4);
        assert_eq!(config.orchestrator.default_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.checkpoint.policy, CheckpointPolicy::FinishedTasks { span: 2 });
        assert!(config.checkpoint.avoid_signatures.contains("app.noisy"));
        assert!(config.trace.enabled);

        let w1 = &config.workers[0];
        assert_eq!(w1.limit_of_tasks, 2);
        assert!(w1.shared_disks.contains("nfs"));
        assert!(w1.description.disks.contains("nfs"));
        assert_eq!(config.workers[1].description.architecture.as_deref(), Some("arm"));
    }

    #[test]
    fn test_rejects_bad_values() {
        let duplicate: RuntimeConfigDto =
            parse_json_str(r#"{ "workers": [ { "name": "w1", "cores": 1 }, { "name": "w1", "cores": 2 } ] }"#).unwrap();
        assert!(matches!(RuntimeConfig::try_from(duplicate), Err(Error::ConversionError(ConversionError::DuplicateWorker(_)))));

        let policy: RuntimeConfigDto = parse_json_str(r#"{ "scheduler": { "policy": "random" } }"#).unwrap();
        assert!(matches!(
            RuntimeConfig::try_from(policy),
            Err(Error::ConversionError(ConversionError::UnknownSchedulingPolicy(_)))
        ));

        let cores: RuntimeConfigDto = parse_json_str(r#"{ "workers": [ { "name": "w1", "cores": 0 } ] }"#).unwrap();
        assert!(matches!(RuntimeConfig::try_from(cores), Err(Error::ConversionError(ConversionError::InvalidValue { .. }))));
    }
}
