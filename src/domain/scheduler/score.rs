/// Penalty added to the resource score of a worker that cannot start the action right now.
pub const UNAVAILABLE_PENALTY: i64 = 1 << 40;

/// Ranking of one (action, worker, implementation) candidate. Higher components are better, except where a
/// policy says otherwise for the tie-breaking fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    /// 1 for tasks flagged as priority.
    pub priority: i64,
    /// Input versions already on the worker, minus [`UNAVAILABLE_PENALTY`] when it is busy.
    pub resource_score: i64,
    /// Minus the number of actions already waiting on the worker.
    pub waiting_score: i64,
    /// Minus the average observed execution time (ms) of the implementation on the worker.
    pub implementation_score: i64,
    /// Submission order of the action, for FIFO/LIFO tie breaks.
    pub action_id: u64,
    /// Running plus queued actions on the worker, for load balancing.
    pub resource_load: u32,
}

impl Score {
    pub fn new(priority: bool, action_id: u64) -> Self {
        Score {
            priority: i64::from(priority),
            resource_score: 0,
            waiting_score: 0,
            implementation_score: 0,
            action_id,
            resource_load: 0,
        }
    }

    pub fn is_runnable_now(&self) -> bool {
        self.resource_score > -UNAVAILABLE_PENALTY / 2
    }

    /// The score without the parts describing the worker's momentary state. Actions queued on the same worker
    /// are ranked against each other with it.
    pub fn for_queue_ranking(&self) -> Score {
        let mut rank = *self;
        if !rank.is_runnable_now() {
            rank.resource_score += UNAVAILABLE_PENALTY;
        }
        rank.waiting_score = 0;
        rank.resource_load = 0;
        rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_ranking_ignores_worker_state() {
        let mut early = Score::new(false, 1);
        early.resource_score = 1 - UNAVAILABLE_PENALTY;
        let mut late = Score::new(false, 2);
        late.resource_score = 1;
        late.waiting_score = -4;
        late.resource_load = 6;

        assert!(!early.is_runnable_now());
        assert_eq!(early.for_queue_ranking().resource_score, 1);
        assert_eq!(late.for_queue_ranking(), Score { action_id: 2, resource_score: 1, ..Score::new(false, 2) });
    }
}
