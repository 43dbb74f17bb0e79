//! Per-run loop bookkeeping, owned and mutated only by the driver.

use std::time::Duration;

use super::report::TerminationReason;

#[derive(Debug)]
pub struct IterationContext {
    /// Iterations attempted, successful read or not.
    pub iteration: usize,
    pub max_iterations: usize,
    pub min_interval: Duration,
    pub cancelled: bool,
    /// Fatal condition raised during the last iteration.
    pub fatal: Option<TerminationReason>,

    pub frames_read: usize,
    pub frame_failures: usize,
    pub consecutive_frame_failures: usize,
    pub estimates: usize,
    pub estimator_errors: usize,
    pub commands_applied: usize,
}

impl IterationContext {
    pub fn new(max_iterations: usize, min_interval: Duration) -> Self {
        Self {
            iteration: 0,
            max_iterations,
            min_interval,
            cancelled: false,
            fatal: None,
            frames_read: 0,
            frame_failures: 0,
            consecutive_frame_failures: 0,
            estimates: 0,
            estimator_errors: 0,
            commands_applied: 0,
        }
    }

    pub fn budget_exhausted(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    pub fn record_frame(&mut self) {
        self.frames_read += 1;
        self.consecutive_frame_failures = 0;
    }

    pub fn record_frame_failure(&mut self) {
        self.frame_failures += 1;
        self.consecutive_frame_failures += 1;
    }

    /// First matching termination condition, in priority order:
    /// iteration budget, cancellation, fatal condition.
    pub fn termination(&mut self) -> Option<TerminationReason> {
        if self.budget_exhausted() {
            Some(TerminationReason::IterationLimit)
        } else if self.cancelled {
            Some(TerminationReason::Cancelled)
        } else {
            self.fatal.take()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_wins_over_cancel_and_fatal() {
        let mut ctx = IterationContext::new(2, Duration::ZERO);
        ctx.iteration = 2;
        ctx.cancelled = true;
        ctx.fatal = Some(TerminationReason::FrameSourceClosed);
        assert_eq!(ctx.termination(), Some(TerminationReason::IterationLimit));
    }

    #[test]
    fn test_cancel_wins_over_fatal() {
        let mut ctx = IterationContext::new(10, Duration::ZERO);
        ctx.cancelled = true;
        ctx.fatal = Some(TerminationReason::FrameSourceClosed);
        assert_eq!(ctx.termination(), Some(TerminationReason::Cancelled));
    }

    #[test]
    fn test_frame_failure_streak_resets() {
        let mut ctx = IterationContext::new(10, Duration::ZERO);
        ctx.record_frame_failure();
        ctx.record_frame_failure();
        assert_eq!(ctx.consecutive_frame_failures, 2);
        ctx.record_frame();
        assert_eq!(ctx.consecutive_frame_failures, 0);
        assert_eq!(ctx.frame_failures, 2);
        assert_eq!(ctx.termination(), None);
    }
}
