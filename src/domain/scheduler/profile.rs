use std::time::Duration;

/// Observed execution times of one implementation on one worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionProfile {
    pub executions: u64,
    pub total_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl ExecutionProfile {
    pub fn record(&mut self, elapsed: Duration) {
        let ms = elapsed.as_millis() as u64;
        if self.executions == 0 {
            self.min_ms = ms;
            self.max_ms = ms;
        } else {
            self.min_ms = self.min_ms.min(ms);
            self.max_ms = self.max_ms.max(ms);
        }
        self.executions += 1;
        self.total_ms += ms;
    }

    /// Zero until the implementation ran once.
    pub fn average_ms(&self) -> u64 {
        if self.executions == 0 { 0 } else { self.total_ms / self.executions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record() {
        let mut profile = ExecutionProfile::default();
        assert_eq!(profile.average_ms(), 0);

        profile.record(Duration::from_millis(100));
        profile.record(Duration::from_millis(300));
        assert_eq!(profile.executions, 2);
        assert_eq!(profile.average_ms(), 200);
        assert_eq!(profile.min_ms, 100);
        assert_eq!(profile.max_ms, 300);
    }
}
