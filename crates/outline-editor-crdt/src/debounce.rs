//! Trailing-edge debounce expressed as a deadline.

use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// A restartable quiet-period timer.
///
/// Each `trigger` pushes the deadline out to `window` from now. The owner
/// awaits `elapsed` in its select loop and calls `cancel` once it fires.
#[derive(Debug, Clone)]
pub struct Debounce {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    /// Create a disarmed timer with the given quiet period.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Arm the timer, or push an armed deadline out to `window` from now.
    pub fn trigger(&mut self) {
        self.deadline = Some(Instant::now() + self.window);
    }

    /// Disarm the timer.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves at the deadline; never resolves while disarmed.
    pub async fn elapsed(&self) {
        match self.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_retrigger_pushes_deadline_out() {
        let start = Instant::now();
        let mut debounce = Debounce::new(Duration::from_millis(1500));
        debounce.trigger();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        debounce.trigger();
        debounce.elapsed().await;
        assert!(Instant::now() - start >= Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarmed_never_fires() {
        let mut debounce = Debounce::new(Duration::from_millis(10));
        debounce.trigger();
        debounce.cancel();
        assert!(!debounce.is_armed());
        let fired = tokio::time::timeout(Duration::from_secs(60), debounce.elapsed()).await;
        assert!(fired.is_err());
    }
}
