use std::collections::HashSet;

use crate::domain::utils::id::JobId;

/// Guards the at-most-once handling of job notifications.
///
/// Only jobs in flight are remembered: a job is registered when dispatched and forgotten on its first terminal
/// event, so every later one (a late success after a timeout, a duplicate from the transport) is discarded.
#[derive(Debug, Default)]
pub struct JobListener {
    in_flight: HashSet<JobId>,
    discarded: u64,
}

impl JobListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&mut self, job_id: JobId) {
        self.in_flight.insert(job_id);
    }

    pub fn accept(&mut self, job_id: JobId) -> bool {
        if self.in_flight.remove(&job_id) {
            return true;
        }
        self.discard(job_id);
        false
    }

    /// Counts a notification rejected after it was accepted here, e.g. one for a superseded attempt.
    pub fn discard(&mut self, job_id: JobId) {
        self.discarded += 1;
        log::debug!("Notification for {} discarded.", job_id);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}
