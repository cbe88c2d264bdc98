use std::time::{Duration, Instant};

/// Trips after a configured number of consecutive failures within a rolling
/// window; once open, calls short-circuit until a successful health probe
/// records a success.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    window: Duration,
    consecutive_failures: u32,
    window_start: Option<Instant>,
    open: bool,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            consecutive_failures: 0,
            window_start: None,
            open: false,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.window_start = None;
        self.open = false;
    }

    pub fn record_failure(&mut self) {
        let now = Instant::now();

        match self.window_start {
            Some(start) if now.duration_since(start) <= self.window => {
                self.consecutive_failures += 1;
            }
            _ => {
                // Window expired or first failure: start counting afresh.
                self.window_start = Some(now);
                self.consecutive_failures = 1;
            }
        }

        if self.consecutive_failures >= self.threshold {
            self.open = true;
        }
    }
}
