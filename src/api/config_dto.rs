use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfigDto {
    pub scheduler: SchedulerDto,
    pub checkpoint: CheckpointDto,
    pub trace: TraceDto,
    pub workers: Vec<WorkerDto>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerDto {
    pub policy: String,
    pub retry_budget: Option<u32>,
    pub task_timeout_ms: Option<u64>,
}

impl Default for SchedulerDto {
    fn default() -> Self {
        SchedulerDto { policy: "FIFO".to_string(), retry_budget: None, task_timeout_ms: None }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckpointDto {
    pub policy: String,
    pub span: Option<u32>,
    pub interval_ms: Option<u64>,
    pub group_size: Option<usize>,
    pub directory: Option<String>,
    pub avoid_signatures: Vec<String>,
}

impl Default for CheckpointDto {
    fn default() -> Self {
        CheckpointDto {
            policy: "none".to_string(),
            span: None,
            interval_ms: None,
            group_size: None,
            directory: None,
            avoid_signatures: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TraceDto {
    pub enabled: bool,
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WorkerDto {
    pub name: String,
    pub cores: u32,
    #[serde(default)]
    pub memory_mb: u64,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub disks: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub limit_of_tasks: Option<u32>,
    #[serde(default)]
    pub shared_disks: Vec<String>,
}
