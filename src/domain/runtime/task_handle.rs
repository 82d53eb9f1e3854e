use serde::Serialize;
use tokio::sync::oneshot;

use crate::domain::task::outcome::TaskOutcome;
use crate::domain::utils::id::TaskId;

/// Returned by a submission; resolves to the task's final outcome.
#[derive(Debug)]
pub struct TaskHandle {
    task_id: TaskId,
    signature: String,
    outcome: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub(crate) fn channel(task_id: TaskId, signature: &str) -> (oneshot::Sender<TaskOutcome>, Self) {
        let (sender, receiver) = oneshot::channel();
        (sender, TaskHandle { task_id, signature: signature.to_string(), outcome: receiver })
    }

    pub fn id(&self) -> TaskId {
        self.task_id
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Waits for the task to end. A task the runtime dropped without an outcome (shutdown) counts as cancelled.
    pub async fn wait(self) -> TaskOutcome {
        self.outcome.await.unwrap_or(TaskOutcome::Cancelled)
    }

    /// The outcome, if the task already ended.
    pub fn try_outcome(&mut self) -> Option<TaskOutcome> {
        self.outcome.try_recv().ok()
    }
}

/// How many submitted tasks ended in which way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCounters {
    pub submitted: usize,
    pub completed: usize,
    pub recovered: usize,
    pub failed: usize,
    /// Failed under the IGNORE policy.
    pub ignored: usize,
    pub cancelled: usize,
}

impl TaskCounters {
    pub fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed => self.completed += 1,
            TaskOutcome::Recovered => self.recovered += 1,
            TaskOutcome::Failed { ignored: true, .. } => self.ignored += 1,
            TaskOutcome::Failed { .. } => self.failed += 1,
            TaskOutcome::Cancelled => self.cancelled += 1,
        }
    }

    pub fn ended(&self) -> usize {
        self.completed + self.recovered + self.failed + self.ignored + self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::outcome::TaskError;

    #[tokio::test]
    async fn test_dropped_sender_means_cancelled() {
        let (sender, handle) = TaskHandle::channel(TaskId(3), "app.work");
        assert_eq!(handle.id(), TaskId(3));
        drop(sender);
        assert_eq!(handle.wait().await, TaskOutcome::Cancelled);
    }

    #[test]
    fn test_counters_split_ignored_failures() {
        let mut counters = TaskCounters::default();
        let error = TaskError::UnschedulableConstraint("gpu".into());
        counters.record(&TaskOutcome::Completed);
        counters.record(&TaskOutcome::Failed { error: error.clone(), ignored: true });
        counters.record(&TaskOutcome::Failed { error, ignored: false });
        assert_eq!((counters.completed, counters.ignored, counters.failed), (1, 1, 1));
        assert_eq!(counters.ended(), 3);
    }
}
