//! Quiet-period timer for a single connection.

use std::time::Duration;

pub const DEFAULT_IDLE_INITIAL: Duration = Duration::from_secs(60);
pub const DEFAULT_IDLE_STEP: Duration = Duration::from_secs(1);

/// Per-connection escalating quiet period.
///
/// Every timeout makes the next wait one `step` longer; any successful read
/// puts it back to `initial`.
#[derive(Debug, Clone)]
pub struct IdleTimer {
    initial: Duration,
    step: Duration,
    current: Duration,
}

impl IdleTimer {
    pub fn new(initial: Duration, step: Duration) -> Self {
        Self {
            initial,
            step,
            current: initial,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn on_timeout(&mut self) {
        self.current = self.current.saturating_add(self.step);
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for IdleTimer {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_INITIAL, DEFAULT_IDLE_STEP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_by_one_step_per_timeout() {
        let mut timer = IdleTimer::default();
        assert_eq!(timer.current(), Duration::from_secs(60));
        timer.on_timeout();
        timer.on_timeout();
        assert_eq!(timer.current(), Duration::from_secs(62));
    }

    #[test]
    fn non_decreasing_then_reset() {
        let mut timer = IdleTimer::new(Duration::from_millis(10), Duration::from_millis(3));
        let mut last = timer.current();
        for _ in 0..20 {
            timer.on_timeout();
            assert!(timer.current() > last);
            last = timer.current();
        }
        timer.reset();
        assert_eq!(timer.current(), timer.initial());
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let mut timer = IdleTimer::new(Duration::MAX, Duration::from_secs(1));
        timer.on_timeout();
        assert_eq!(timer.current(), Duration::MAX);
    }
}
