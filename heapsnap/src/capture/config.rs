use heapsnap_common::HEAP_DUMP_KEYWORDS;
use std::time::Duration;

/// Controls how a live capture drives the tracing session.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Name of the tracing session to create.
    pub session_name: String,
    /// Give up (no dump available) if no anchor collection starts within this window.
    pub grace_window: Duration,
    /// Absolute upper bound on the wait for a dump to complete.
    pub ceiling: Duration,
    /// Sleep between progress checks during the main wait.
    pub poll_interval: Duration,
    /// Sleep between checks while waiting for the listener to start.
    pub startup_poll: Duration,
    /// Pause after the GC-only enable; provider enablement is asynchronous.
    pub provider_settle: Duration,
    /// Bounded wait for the listener thread to unwind after disposal.
    pub listener_join_timeout: Duration,
    /// Keywords for the final runtime enable.
    pub heap_dump_keywords: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            session_name: "heapsnap-gc-dump".to_string(),
            grace_window: Duration::from_secs(5),
            ceiling: Duration::from_secs(100),
            poll_interval: Duration::from_millis(100),
            startup_poll: Duration::from_millis(1),
            provider_settle: Duration::from_millis(500),
            listener_join_timeout: Duration::from_secs(10),
            heap_dump_keywords: HEAP_DUMP_KEYWORDS,
        }
    }
}

impl CaptureConfig {
    #[must_use]
    pub fn with_grace_window(mut self, window: Duration) -> Self {
        self.grace_window = window;
        self
    }

    #[must_use]
    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_provider_settle(mut self, settle: Duration) -> Self {
        self.provider_settle = settle;
        self
    }

    #[must_use]
    pub fn with_listener_join_timeout(mut self, timeout: Duration) -> Self {
        self.listener_join_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = name.into();
        self
    }
}
