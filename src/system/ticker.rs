//! Rate limiting for the control loop.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;

use super::cancel::CancelSignal;

/// Result of waiting for the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Ready,
    Cancelled,
}

/// Enforces a minimum interval between iteration starts.
///
/// The wait doubles as the cancellation poll point: a pending cancel ends
/// the wait immediately.
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
    next_deadline: Option<Instant>,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_deadline: None,
        }
    }

    /// Block until the next tick is due or cancellation arrives.
    /// The first call returns immediately unless a cancel is pending.
    pub fn wait(&mut self, signal: &CancelSignal) -> Tick {
        let deadline = self.next_deadline.unwrap_or_else(Instant::now);
        let tick = match signal.receiver().recv_deadline(deadline) {
            Ok(()) => Tick::Cancelled,
            Err(RecvTimeoutError::Timeout) => Tick::Ready,
            Err(RecvTimeoutError::Disconnected) => {
                // No producer left; plain sleep.
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                }
                Tick::Ready
            }
        };
        self.next_deadline = Some(Instant::now() + self.interval);
        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::cancel::cancel_channel;

    #[test]
    fn test_enforces_min_interval() {
        let (_handle, signal) = cancel_channel();
        let mut ticker = Ticker::new(Duration::from_millis(30));

        let start = Instant::now();
        for _ in 0..4 {
            assert_eq!(ticker.wait(&signal), Tick::Ready);
        }
        // First tick is immediate, then three intervals.
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[test]
    fn test_pending_cancel_interrupts_wait() {
        let (handle, signal) = cancel_channel();
        let mut ticker = Ticker::new(Duration::from_secs(60));

        assert_eq!(ticker.wait(&signal), Tick::Ready);
        handle.cancel();
        let start = Instant::now();
        assert_eq!(ticker.wait(&signal), Tick::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_disconnected_signal_still_rate_limits() {
        let (handle, signal) = cancel_channel();
        drop(handle);
        let mut ticker = Ticker::new(Duration::from_millis(20));

        let start = Instant::now();
        assert_eq!(ticker.wait(&signal), Tick::Ready);
        assert_eq!(ticker.wait(&signal), Tick::Ready);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
