use slotmap::{SlotMap, new_key_type};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::action::allocatable_action::{ActionState, AllocatableAction};
use crate::domain::task::task::{MutexGroupId, Task};
use crate::domain::utils::id::TaskId;

new_key_type! {
    pub struct ActionKey;
}

/// How a freshly inserted action relates to its predecessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linked {
    /// Every predecessor is already satisfied.
    Free,
    /// At least one predecessor has not ended yet.
    Waiting,
    /// A predecessor failed or was cancelled without releasing its dependents.
    PredecessorFailed,
}

#[derive(Debug, Default)]
struct MutexState {
    holder: Option<ActionKey>,
    waiting: VecDeque<ActionKey>,
}

/// Store of every live action and the dependency edges between them.
///
/// Predecessors that already completed (or failed with an ignored failure) are not linked. Terminal actions
/// are pruned once nothing depends on them; of those that did not release their dependents only the task id
/// is kept.
#[derive(Debug, Default)]
pub struct ActionGraph {
    actions: SlotMap<ActionKey, AllocatableAction>,
    by_task: HashMap<TaskId, ActionKey>,
    failed_tasks: HashSet<TaskId>,
    mutexes: HashMap<MutexGroupId, MutexState>,
    next_action_id: u64,
}

impl ActionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, task: Arc<Task>, retries: u32, timeout: Option<Duration>) -> (ActionKey, Linked) {
        self.next_action_id += 1;
        let task_id = task.id;
        let predecessors: Vec<TaskId> = task.predecessors.iter().copied().collect();
        let key = self.actions.insert(AllocatableAction::new(self.next_action_id, task, retries, timeout));
        self.by_task.insert(task_id, key);

        let mut linked = Linked::Free;
        for predecessor in predecessors {
            if self.failed_tasks.contains(&predecessor) {
                linked = Linked::PredecessorFailed;
                continue;
            }
            // unknown predecessors ended long ago or were recovered from a checkpoint
            let Some(&pred_key) = self.by_task.get(&predecessor) else {
                continue;
            };
            let Some(pred) = self.actions.get_mut(pred_key) else {
                continue;
            };

            match pred.state() {
                ActionState::Completed => {}
                ActionState::Failed if pred.failure_ignored => {}
                ActionState::Failed | ActionState::Cancelled => linked = Linked::PredecessorFailed,
                _ => {
                    pred.successors.insert(key);
                    if let Some(action) = self.actions.get_mut(key) {
                        action.predecessors.insert(pred_key);
                    }
                    if linked == Linked::Free {
                        linked = Linked::Waiting;
                    }
                }
            }
        }
        (key, linked)
    }

    pub fn get(&self, key: ActionKey) -> Option<&AllocatableAction> {
        self.actions.get(key)
    }

    pub fn get_mut(&mut self, key: ActionKey) -> Option<&mut AllocatableAction> {
        self.actions.get_mut(key)
    }

    pub fn key_of(&self, task_id: TaskId) -> Option<ActionKey> {
        self.by_task.get(&task_id).copied()
    }

    pub fn state_of(&self, task_id: TaskId) -> Option<ActionState> {
        self.key_of(task_id).and_then(|key| self.actions.get(key)).map(|a| a.state())
    }

    pub fn state_of_key(&self, key: ActionKey) -> Option<ActionState> {
        self.actions.get(key).map(|a| a.state())
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Keys of all actions that have not reached a terminal state.
    pub fn live_keys(&self) -> Vec<ActionKey> {
        let mut keys: Vec<(u64, ActionKey)> =
            self.actions.iter().filter(|(_, a)| !a.state().is_terminal()).map(|(k, a)| (a.id, k)).collect();
        keys.sort();
        keys.into_iter().map(|(_, k)| k).collect()
    }

    /// Unlinks `key` from its successors and returns those left without pending predecessors, in submission order.
    pub fn release_successors(&mut self, key: ActionKey) -> Vec<ActionKey> {
        let successors: Vec<ActionKey> = match self.actions.get_mut(key) {
            Some(action) => action.successors.drain().collect(),
            None => return Vec::new(),
        };

        let mut freed = Vec::new();
        for successor in successors {
            if let Some(action) = self.actions.get_mut(successor) {
                action.predecessors.remove(&key);
                if !action.has_pending_predecessors() && action.state() == ActionState::WaitingDeps {
                    freed.push((action.id, successor));
                }
            }
        }
        freed.sort();
        freed.into_iter().map(|(_, k)| k).collect()
    }

    /// Marks every transitive successor of `key` as cancelled and returns them in submission order.
    /// None of them can be running, since each waits on `key` directly or indirectly.
    pub fn cancel_successors(&mut self, key: ActionKey) -> Vec<ActionKey> {
        let mut cancelled = Vec::new();
        let mut pending: VecDeque<ActionKey> = VecDeque::new();
        if let Some(action) = self.actions.get_mut(key) {
            pending.extend(action.successors.drain());
        }

        while let Some(current) = pending.pop_front() {
            let Some(action) = self.actions.get_mut(current) else {
                continue;
            };
            if action.state().is_terminal() {
                continue;
            }
            action.transition(ActionState::Cancelled);
            let predecessors: Vec<ActionKey> = action.predecessors.drain().collect();
            pending.extend(action.successors.drain());
            for predecessor in predecessors {
                if let Some(pred) = self.actions.get_mut(predecessor) {
                    pred.successors.remove(&current);
                }
            }
            cancelled.push(current);
        }

        cancelled.sort_by_key(|k| self.actions.get(*k).map(|a| a.id).unwrap_or(0));
        cancelled
    }

    /// Removes `key` from the successor sets of its predecessors.
    pub fn detach(&mut self, key: ActionKey) {
        let predecessors: Vec<ActionKey> = match self.actions.get_mut(key) {
            Some(action) => action.predecessors.drain().collect(),
            None => return,
        };
        for predecessor in predecessors {
            if let Some(pred) = self.actions.get_mut(predecessor) {
                pred.successors.remove(&key);
            }
        }
    }

    /// Forgets a terminal action that nothing depends on anymore. A failed or cancelled one leaves its task id
    /// behind so that late dependents are still cancelled.
    pub fn prune(&mut self, key: ActionKey) -> bool {
        let removable = self.actions.get(key).is_some_and(|a| a.state().is_terminal() && a.successors.is_empty());
        if !removable {
            return false;
        }
        let Some(action) = self.actions.remove(key) else {
            return false;
        };
        let task_id = action.task_id();
        self.by_task.remove(&task_id);
        let blocks_dependents = match action.state() {
            ActionState::Failed => !action.failure_ignored,
            ActionState::Cancelled => true,
            _ => false,
        };
        if blocks_dependents {
            self.failed_tasks.insert(task_id);
        }
        true
    }

    pub fn is_failed_task(&self, task_id: TaskId) -> bool {
        self.failed_tasks.contains(&task_id)
    }

    /// Takes every mutex group of the action, or none of them. A refused action is remembered and handed
    /// back by [`release_mutexes`](Self::release_mutexes) once the holder finishes.
    pub fn try_acquire_mutexes(&mut self, key: ActionKey) -> bool {
        let groups = match self.actions.get(key) {
            Some(action) => action.task.mutex_groups.clone(),
            None => return false,
        };

        let busy: Vec<MutexGroupId> = groups
            .iter()
            .filter(|g| self.mutexes.get(g).and_then(|m| m.holder).map(|holder| holder != key).unwrap_or(false))
            .copied()
            .collect();

        if !busy.is_empty() {
            for group in busy {
                let state = self.mutexes.entry(group).or_default();
                if !state.waiting.contains(&key) {
                    state.waiting.push_back(key);
                }
            }
            return false;
        }

        for group in groups {
            let state = self.mutexes.entry(group).or_default();
            state.holder = Some(key);
            state.waiting.retain(|k| *k != key);
        }
        true
    }

    /// Drops every mutex held by, or waited on by, `key`. Returns the actions that were waiting for them.
    pub fn release_mutexes(&mut self, key: ActionKey) -> Vec<ActionKey> {
        let mut woken = Vec::new();
        for state in self.mutexes.values_mut() {
            state.waiting.retain(|k| *k != key);
            if state.holder == Some(key) {
                state.holder = None;
                woken.extend(state.waiting.drain(..));
            }
        }
        self.mutexes.retain(|_, state| state.holder.is_some() || !state.waiting.is_empty());

        woken.sort_by_key(|k| self.actions.get(*k).map(|a| a.id).unwrap_or(u64::MAX));
        woken.dedup();
        woken
    }

    pub fn holds_mutex(&self, key: ActionKey) -> bool {
        self.mutexes.values().any(|m| m.holder == Some(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::implementation::{Constraints, Implementation};
    use crate::domain::task::task::TaskDescription;

    fn task(id: u64, predecessors: &[u64]) -> Arc<Task> {
        let description = TaskDescription::new("app.work", vec![Implementation::method(0, "app.work", Constraints::default())]);
        let mut task = Task::new(TaskId(id), description);
        task.predecessors = predecessors.iter().map(|p| TaskId(*p)).collect();
        Arc::new(task)
    }

    fn commutative(id: u64, group: u64) -> Arc<Task> {
        let mut task = (*task(id, &[])).clone();
        task.mutex_groups.push(MutexGroupId(group));
        Arc::new(task)
    }

    fn to_waiting(graph: &mut ActionGraph, key: ActionKey) {
        graph.get_mut(key).unwrap().transition(ActionState::WaitingDeps);
    }

    #[test]
    fn test_links_and_release() {
        let mut graph = ActionGraph::new();
        let (a, linked_a) = graph.insert(task(1, &[]), 0, None);
        let (b, linked_b) = graph.insert(task(2, &[1]), 0, None);
        let (c, linked_c) = graph.insert(task(3, &[1, 2]), 0, None);
        assert_eq!(linked_a, Linked::Free);
        assert_eq!(linked_b, Linked::Waiting);
        assert_eq!(linked_c, Linked::Waiting);
        for key in [a, b, c] {
            to_waiting(&mut graph, key);
        }

        assert_eq!(graph.release_successors(a), vec![b]);
        assert!(graph.get(c).unwrap().has_pending_predecessors());
        assert_eq!(graph.release_successors(b), vec![c]);
    }

    #[test]
    fn test_completed_predecessor_is_not_linked() {
        let mut graph = ActionGraph::new();
        let (a, _) = graph.insert(task(1, &[]), 0, None);
        for next in [ActionState::WaitingDeps, ActionState::Ready, ActionState::Scheduled, ActionState::Running, ActionState::Completed] {
            graph.get_mut(a).unwrap().transition(next);
        }
        let (_, linked) = graph.insert(task(2, &[1]), 0, None);
        assert_eq!(linked, Linked::Free);

        let (_, linked) = graph.insert(task(3, &[42]), 0, None);
        assert_eq!(linked, Linked::Free, "unknown predecessors are satisfied");
    }

    #[test]
    fn test_failed_predecessor_blocks() {
        let mut graph = ActionGraph::new();
        let (a, _) = graph.insert(task(1, &[]), 0, None);
        graph.get_mut(a).unwrap().transition(ActionState::Failed);
        let (_, linked) = graph.insert(task(2, &[1]), 0, None);
        assert_eq!(linked, Linked::PredecessorFailed);

        graph.get_mut(a).unwrap().failure_ignored = true;
        let (_, linked) = graph.insert(task(3, &[1]), 0, None);
        assert_eq!(linked, Linked::Free);
    }

    #[test]
    fn test_cancel_is_transitive() {
        let mut graph = ActionGraph::new();
        let (a, _) = graph.insert(task(1, &[]), 0, None);
        let (b, _) = graph.insert(task(2, &[1]), 0, None);
        let (c, _) = graph.insert(task(3, &[2]), 0, None);
        let (d, _) = graph.insert(task(4, &[]), 0, None);
        for key in [a, b, c, d] {
            to_waiting(&mut graph, key);
        }

        let cancelled = graph.cancel_successors(a);
        assert_eq!(cancelled, vec![b, c]);
        assert_eq!(graph.get(c).unwrap().state(), ActionState::Cancelled);
        assert_eq!(graph.get(d).unwrap().state(), ActionState::WaitingDeps);
    }

    #[test]
    fn test_prune_forgets_finished_action() {
        let mut graph = ActionGraph::new();
        let (a, _) = graph.insert(task(1, &[]), 0, None);
        graph.prune(a);
        assert_eq!(graph.len(), 1, "live actions are kept");

        graph.get_mut(a).unwrap().transition(ActionState::Cancelled);
        assert!(graph.prune(a));
        assert!(graph.is_empty());
        assert!(graph.key_of(TaskId(1)).is_none());
    }

    #[test]
    fn test_pruned_failure_still_blocks_dependents() {
        let mut graph = ActionGraph::new();
        let (a, _) = graph.insert(task(1, &[]), 0, None);
        let (b, _) = graph.insert(task(2, &[1]), 0, None);
        let (c, _) = graph.insert(task(3, &[]), 0, None);
        let (d, _) = graph.insert(task(4, &[2, 3]), 0, None);
        for key in [a, b, c, d] {
            to_waiting(&mut graph, key);
        }

        graph.get_mut(a).unwrap().transition(ActionState::Failed);
        assert_eq!(graph.cancel_successors(a), vec![b, d]);
        assert!(graph.get(c).unwrap().successors.is_empty(), "cancelled dependents are unlinked");
        for key in [a, b, d] {
            assert!(graph.prune(key));
        }
        assert_eq!(graph.len(), 1);
        assert!(graph.is_failed_task(TaskId(1)));
        assert!(graph.is_failed_task(TaskId(4)));

        let (_, linked) = graph.insert(task(5, &[2]), 0, None);
        assert_eq!(linked, Linked::PredecessorFailed);
        let (_, linked) = graph.insert(task(6, &[3]), 0, None);
        assert_eq!(linked, Linked::Waiting);
    }

    #[test]
    fn test_pruned_ignored_failure_frees_dependents() {
        let mut graph = ActionGraph::new();
        let (a, _) = graph.insert(task(1, &[]), 0, None);
        let action = graph.get_mut(a).unwrap();
        action.transition(ActionState::Failed);
        action.failure_ignored = true;
        assert!(graph.prune(a));
        assert!(!graph.is_failed_task(TaskId(1)));

        let (_, linked) = graph.insert(task(2, &[1]), 0, None);
        assert_eq!(linked, Linked::Free);
    }

    #[test]
    fn test_mutex_excludes_group_members() {
        let mut graph = ActionGraph::new();
        let (a, _) = graph.insert(commutative(1, 7), 0, None);
        let (b, _) = graph.insert(commutative(2, 7), 0, None);
        let (c, _) = graph.insert(commutative(3, 8), 0, None);

        assert!(graph.try_acquire_mutexes(a));
        assert!(!graph.try_acquire_mutexes(b));
        assert!(graph.try_acquire_mutexes(c), "other group is independent");
        assert!(graph.holds_mutex(a));

        assert_eq!(graph.release_mutexes(a), vec![b]);
        assert!(graph.try_acquire_mutexes(b));
    }
}
