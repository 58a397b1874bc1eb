use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Configuration and streaming flags shared between the control-event
/// context (sole writer) and the streaming task.
#[derive(Debug, Default)]
pub struct DeviceState {
    configured: AtomicBool,
    streaming: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Configured,
    Streaming,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Idle => write!(f, "idle"),
            LifecycleState::Configured => write!(f, "configured"),
            LifecycleState::Streaming => write!(f, "streaming"),
        }
    }
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::Acquire)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub(crate) fn set_configured(&self, configured: bool) {
        self.configured.store(configured, Ordering::Release);
    }

    pub(crate) fn set_streaming(&self, streaming: bool) {
        self.streaming.store(streaming, Ordering::Release);
    }

    /// Streaming without configuration happens when the host selects an
    /// interface before SET_CONFIGURATION; it reports as `Streaming`.
    pub fn lifecycle(&self) -> LifecycleState {
        match (self.is_configured(), self.is_streaming()) {
            (_, true) => LifecycleState::Streaming,
            (true, false) => LifecycleState::Configured,
            (false, false) => LifecycleState::Idle,
        }
    }
}

/// Counters kept by the streaming task.
#[derive(Debug, Default)]
pub struct StreamStats {
    buffers_committed: AtomicU64,
    bytes_committed: AtomicU64,
    frames_completed: AtomicU64,
    sessions_started: AtomicU64,
    session_errors: AtomicU64,
    link_wakeups: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStatsSnapshot {
    pub buffers_committed: u64,
    pub bytes_committed: u64,
    pub frames_completed: u64,
    pub sessions_started: u64,
    pub session_errors: u64,
    pub link_wakeups: u64,
}

impl StreamStats {
    pub(crate) fn record_commit(&self, length: usize, end_of_frame: bool) {
        self.buffers_committed.fetch_add(1, Ordering::Relaxed);
        self.bytes_committed.fetch_add(length as u64, Ordering::Relaxed);
        if end_of_frame {
            self.frames_completed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_session(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.session_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_wakeup(&self) {
        self.link_wakeups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            buffers_committed: self.buffers_committed.load(Ordering::Relaxed),
            bytes_committed: self.bytes_committed.load(Ordering::Relaxed),
            frames_completed: self.frames_completed.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            session_errors: self.session_errors.load(Ordering::Relaxed),
            link_wakeups: self.link_wakeups.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for StreamStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames in {} buffers ({} bytes), {} sessions, {} errors, {} link wake-ups",
            self.frames_completed,
            self.buffers_committed,
            self.bytes_committed,
            self.sessions_started,
            self.session_errors,
            self.link_wakeups
        )
    }
}
