use std::time::{Duration, Instant};

/// Wall-clock budget for one site scan.
///
/// Checked at every stage transition; every navigation timeout is clamped
/// to what is left.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn new(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Bound a per-call timeout by the remaining budget
    pub fn clamp(&self, timeout: Duration) -> Duration {
        timeout.min(self.remaining())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_deadline() {
        let deadline = Deadline::new(Duration::from_secs(60));
        assert!(!deadline.expired());
        assert!(deadline.remaining() <= Duration::from_secs(60));
        assert_eq!(deadline.clamp(Duration::from_secs(10)), Duration::from_secs(10));
    }

    #[test]
    fn test_clamp_to_remaining() {
        let deadline = Deadline::new(Duration::from_millis(50));
        assert!(deadline.clamp(Duration::from_secs(30)) <= Duration::from_millis(50));
    }

    #[test]
    fn test_zero_budget_is_expired() {
        let deadline = Deadline::new(Duration::ZERO);
        assert!(deadline.expired());
        assert_eq!(deadline.clamp(Duration::from_secs(5)), Duration::ZERO);
    }
}
