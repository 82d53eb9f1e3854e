use serde::{Deserialize, Serialize};

/// An application run by the binary: input data, tasks in submission order and how the simulated workers
/// behave for each signature.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationDto {
    pub name: String,
    pub inputs: Vec<InputDataDto>,
    pub tasks: Vec<TaskDto>,
    /// Data the main program reads once every task was submitted.
    pub main_accesses: Vec<String>,
    pub simulation: Vec<SimulatedJobDto>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InputDataDto {
    pub name: String,
    #[serde(default = "default_data_type")]
    pub data_type: String,
    /// Worker holding the value. Exclusive with `disk` and `objectId`.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub disk: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub object_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskDto {
    pub signature: String,
    #[serde(default)]
    pub implementations: Vec<ImplementationDto>,
    #[serde(default)]
    pub parameters: Vec<ParameterDto>,
    #[serde(default)]
    pub on_failure: Option<String>,
    #[serde(default)]
    pub priority: bool,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_budget: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ImplementationDto {
    /// Defaults to the task signature.
    pub signature: Option<String>,
    /// Runs a binary instead of a method when set.
    pub binary: Option<String>,
    pub cores: Option<u32>,
    pub memory_mb: u64,
    pub architecture: Option<String>,
    pub disks: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDto {
    #[serde(default = "default_direction")]
    pub direction: String,
    #[serde(default = "default_data_type")]
    pub data_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulatedJobDto {
    pub signature: String,
    pub duration_ms: Option<u64>,
    pub fail_attempts: u32,
    pub always_fail: bool,
    pub hang: bool,
}

fn default_direction() -> String {
    "IN".to_string()
}

fn default_data_type() -> String {
    "FILE".to_string()
}
