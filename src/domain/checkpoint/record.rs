use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::domain::data::data_location::DataLocation;
use crate::domain::utils::id::{CheckpointGroupName, DataName, TaskId};
use crate::error::Result;

pub const CHECKPOINT_FILE_NAME: &str = "checkpoint.jsonl";

/// Value a checkpointed task wrote into one of its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedOutput {
    pub index: usize,
    pub data: DataName,
    pub locations: Vec<DataLocation>,
}

/// One finished task, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    pub task_id: TaskId,
    pub signature: String,
    pub group: CheckpointGroupName,
    pub outputs: Vec<RecordedOutput>,
    /// RFC 3339 time the record was written.
    #[serde(default)]
    pub saved_at: String,
}

/// Append-only JSON lines file holding the records of the current and previous runs.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        CheckpointStore { path: directory.as_ref().join(CHECKPOINT_FILE_NAME) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every record of previous runs. A missing file means nothing to recover; unreadable lines are
    /// skipped so a run killed mid-write can still be resumed.
    pub fn load(&self) -> Result<HashMap<TaskId, CheckpointRecord>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let mut records = HashMap::new();
        for (number, line) in BufReader::new(File::open(&self.path)?).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CheckpointRecord>(&line) {
                Ok(record) => {
                    records.insert(record.task_id, record);
                }
                Err(e) => log::warn!("Skipping checkpoint line {} of {}: {}", number + 1, self.path.display(), e),
            }
        }
        log::info!("Loaded {} checkpointed task(s) from {}.", records.len(), self.path.display());
        Ok(records)
    }

    pub fn append(&self, records: &[CheckpointRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let saved_at = chrono::Utc::now().to_rfc3339();
        for record in records {
            let mut record = record.clone();
            record.saved_at = saved_at.clone();
            writeln!(file, "{}", serde_json::to_string(&record)?)?;
        }
        file.flush()?;
        log::debug!("Checkpointed {} task(s).", records.len());
        Ok(())
    }
}
