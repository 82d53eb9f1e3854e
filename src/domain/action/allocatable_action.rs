use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::action::action_graph::ActionKey;
use crate::domain::scheduler::score::Score;
use crate::domain::task::implementation::Implementation;
use crate::domain::task::task::Task;
use crate::domain::utils::id::{JobId, TaskId, WorkerName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionState {
    Created,
    WaitingDeps,
    Ready,
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ActionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionState::Completed | ActionState::Failed | ActionState::Cancelled)
    }

    fn can_become(&self, next: ActionState) -> bool {
        use ActionState::*;
        match (self, next) {
            (Completed | Failed | Cancelled, _) => false,
            (_, Cancelled) | (_, Failed) => true,
            (Created, WaitingDeps) => true,
            (WaitingDeps, Ready) => true,
            (Ready, Scheduled) => true,
            (Scheduled, Running) => true,
            // a worker that went away hands its reservation back
            (Scheduled, Ready) => true,
            (Running, Completed) => true,
            // retry
            (Running, WaitingDeps) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionState::Created => "CREATED",
            ActionState::WaitingDeps => "WAITING_DEPS",
            ActionState::Ready => "READY",
            ActionState::Scheduled => "SCHEDULED",
            ActionState::Running => "RUNNING",
            ActionState::Completed => "COMPLETED",
            ActionState::Failed => "FAILED",
            ActionState::Cancelled => "CANCELLED",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActionProfile {
    pub created_at: Option<Instant>,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

/// Schedulable unit wrapping one task. Owns the task's lifecycle state and its links in the action graph.
#[derive(Debug)]
pub struct AllocatableAction {
    /// Submission order, used for FIFO/LIFO ordering.
    pub id: u64,
    pub task: Arc<Task>,
    state: ActionState,
    pub(crate) predecessors: HashSet<ActionKey>,
    pub(crate) successors: HashSet<ActionKey>,
    pub assigned_worker: Option<WorkerName>,
    pub assigned_implementation: Option<Implementation>,
    pub score: Option<Score>,
    pub retries_left: u32,
    pub attempts: u32,
    pub excluded_worker: Option<WorkerName>,
    pub current_job: Option<JobId>,
    pub cancel_requested: bool,
    pub failure_ignored: bool,
    pub timeout: Option<Duration>,
    pub profile: ActionProfile,
}

impl AllocatableAction {
    pub fn new(id: u64, task: Arc<Task>, retries_left: u32, timeout: Option<Duration>) -> Self {
        AllocatableAction {
            id,
            task,
            state: ActionState::Created,
            predecessors: HashSet::new(),
            successors: HashSet::new(),
            assigned_worker: None,
            assigned_implementation: None,
            score: None,
            retries_left,
            attempts: 0,
            excluded_worker: None,
            current_job: None,
            cancel_requested: false,
            failure_ignored: false,
            timeout,
            profile: ActionProfile { created_at: Some(Instant::now()), ..Default::default() },
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task.id
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    pub fn has_pending_predecessors(&self) -> bool {
        !self.predecessors.is_empty()
    }

    pub fn successors(&self) -> impl Iterator<Item = &ActionKey> {
        self.successors.iter()
    }

    /// Moves to `next` when the state machine allows it. Terminal states never change again.
    pub fn transition(&mut self, next: ActionState) -> bool {
        if !self.state.can_become(next) {
            log::warn!("{}: illegal transition {} -> {} ignored.", self.task.id, self.state, next);
            return false;
        }

        log::trace!("{}: {} -> {}", self.task.id, self.state, next);
        match next {
            ActionState::Running => self.profile.started_at = Some(Instant::now()),
            s if s.is_terminal() => self.profile.finished_at = Some(Instant::now()),
            _ => {}
        }
        self.state = next;
        true
    }
}
