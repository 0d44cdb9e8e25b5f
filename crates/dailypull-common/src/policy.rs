use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_POST_FIND_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_SCROLL_SETTLE: Duration = Duration::from_secs(1);

/// Wait/retry parameters attached to a single interaction call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on waiting for the element to become ready.
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Settle time between finding the element and acting on it.
    pub post_find_delay: Duration,
    /// Pause after scrolling an element into view in the fallback path.
    pub scroll_settle: Duration,
}

impl RetryPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn post_find_delay(mut self, delay: Duration) -> Self {
        self.post_find_delay = delay;
        self
    }

    pub fn scroll_settle(mut self, settle: Duration) -> Self {
        self.scroll_settle = settle;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: DEFAULT_POLL_INTERVAL,
            post_find_delay: DEFAULT_POST_FIND_DELAY,
            scroll_settle: DEFAULT_SCROLL_SETTLE,
        }
    }
}
