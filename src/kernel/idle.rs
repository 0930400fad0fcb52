//! Inactivity monitoring.
//! The host reports coarse interaction signals; while the session is
//! authenticated each signal re-arms a single inactivity timer. The kernel
//! attaches the monitor on entering the authenticated phase and detaches it
//! otherwise, so no timer or signal handling leaks across sign-out/sign-in
//! cycles.

use std::time::Duration;
use tokio::task::JoinHandle;

use super::scheduler::TimerHandle;

/// Coarse interaction signal classes the host forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleSignal {
    PointerDown,
    KeyDown,
    Scroll,
    TouchStart,
}

impl IdleSignal {
    pub fn name(&self) -> &'static str {
        match self {
            IdleSignal::PointerDown => "pointer_down",
            IdleSignal::KeyDown => "key_down",
            IdleSignal::Scroll => "scroll",
            IdleSignal::TouchStart => "touch_start",
        }
    }
}

/// Owns the single inactivity timer.
#[derive(Debug)]
pub struct IdleMonitor {
    threshold: Duration,
    timer: TimerHandle,
}

impl IdleMonitor {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold, timer: TimerHandle::new() }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Replace the pending timer with a fresh one. The caller supplies the
    /// already-spawned sleep task so the monitor stays runtime-agnostic.
    pub fn rearm(&mut self, task: JoinHandle<()>) {
        self.timer.rearm(task);
    }

    pub fn detach(&mut self) {
        self.timer.cancel();
    }

    pub fn is_attached(&self) -> bool {
        self.timer.is_armed()
    }
}
