use std::collections::VecDeque;
use std::time::Duration;

/// Per-pass streaming statistics for instrumentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Distinct objects considered in the load/activation phase.
    pub candidates: usize,
    pub deactivated: usize,
    /// Objects deleted because their deactivation asked for it.
    pub destroyed: usize,
    /// Loaded objects that released resources after leaving prepare range.
    pub evicted: usize,
    pub loads_issued: usize,
    pub activated: usize,
    /// Candidates held back by an activated near substitute.
    pub occluded: usize,
    /// Candidates carried to the next pass by a budget.
    pub deferred: usize,
    pub pass_time: Duration,
}

/// Rolling window over the most recent passes.
#[derive(Debug, Clone)]
pub struct PassHistory {
    window: VecDeque<PassStats>,
    capacity: usize,
    total_passes: u64,
}

impl PassHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            total_passes: 0,
        }
    }

    pub fn record(&mut self, stats: PassStats) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(stats);
        self.total_passes += 1;
    }

    pub fn average_time(&self) -> Duration {
        if self.window.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.window.iter().map(|s| s.pass_time).sum();
        total / self.window.len() as u32
    }

    pub fn max_time(&self) -> Duration {
        self.window
            .iter()
            .map(|s| s.pass_time)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Passes in the window, oldest first.
    pub fn passes(&self) -> impl Iterator<Item = &PassStats> {
        self.window.iter()
    }

    /// Passes recorded since creation, including those that left the window.
    pub fn total_passes(&self) -> u64 {
        self.total_passes
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

impl Default for PassHistory {
    fn default() -> Self {
        Self::new(120)
    }
}
