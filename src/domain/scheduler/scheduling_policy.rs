use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::domain::scheduler::score::Score;
use crate::error::ConversionError;

/// Strategy deciding which of two scores wins.
///
/// Every policy puts priority tasks first. `Fifo` and `Lifo` then look at locality, queue length and speed and
/// fall back to submission order. `LoadBalancing` looks at the worker load first. `MultiObjective` favours the
/// fastest implementation before anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SchedulingPolicy {
    #[default]
    Fifo,
    Lifo,
    LoadBalancing,
    MultiObjective,
}

impl FromStr for SchedulingPolicy {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace(['-', '_'], "").as_str() {
            "FIFO" => Ok(SchedulingPolicy::Fifo),
            "LIFO" => Ok(SchedulingPolicy::Lifo),
            "LB" | "LOADBALANCING" => Ok(SchedulingPolicy::LoadBalancing),
            "MO" | "MULTIOBJECTIVE" => Ok(SchedulingPolicy::MultiObjective),
            _ => Err(ConversionError::UnknownSchedulingPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulingPolicy::Fifo => "FIFO",
            SchedulingPolicy::Lifo => "LIFO",
            SchedulingPolicy::LoadBalancing => "LoadBalancing",
            SchedulingPolicy::MultiObjective => "MultiObjective",
        };
        write!(f, "{}", name)
    }
}

impl SchedulingPolicy {
    /// `Ordering::Greater` means `a` is the better candidate.
    pub fn compare(&self, a: &Score, b: &Score) -> Ordering {
        let priority = a.priority.cmp(&b.priority);
        let older_first = b.action_id.cmp(&a.action_id);
        let lighter_first = b.resource_load.cmp(&a.resource_load);

        let rest = match self {
            SchedulingPolicy::Fifo => a
                .resource_score
                .cmp(&b.resource_score)
                .then(a.waiting_score.cmp(&b.waiting_score))
                .then(a.implementation_score.cmp(&b.implementation_score))
                .then(older_first),
            SchedulingPolicy::Lifo => a
                .resource_score
                .cmp(&b.resource_score)
                .then(a.waiting_score.cmp(&b.waiting_score))
                .then(a.implementation_score.cmp(&b.implementation_score))
                .then(a.action_id.cmp(&b.action_id)),
            SchedulingPolicy::LoadBalancing => a
                .resource_score
                .cmp(&b.resource_score)
                .then(lighter_first)
                .then(a.waiting_score.cmp(&b.waiting_score))
                .then(a.implementation_score.cmp(&b.implementation_score))
                .then(older_first),
            SchedulingPolicy::MultiObjective => {
                // still never prefer a busy worker over a free one
                a.is_runnable_now()
                    .cmp(&b.is_runnable_now())
                    .then(a.implementation_score.cmp(&b.implementation_score))
                    .then(a.resource_score.cmp(&b.resource_score))
                    .then(lighter_first)
                    .then(older_first)
            }
        };

        priority.then(rest)
    }

    /// Strict: equal scores are never better than each other.
    pub fn is_better(&self, a: &Score, b: &Score) -> bool {
        self.compare(a, b) == Ordering::Greater
    }
}
