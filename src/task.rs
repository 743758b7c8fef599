//! Cooperative task cancellation handle (spec.md §5).
//!
//! Grounded on `original_source/firmware/common/interfaces/iTaskRunner.hpp`'s
//! `ITaskRunner` (`run`, `requestStop`, `shouldRun`): every long-lived loop
//! (peer service, dispatch loop) polls `shouldRun()` each iteration and exits
//! cleanly when a `requestStop()` call flips the shared flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared stop flag, cloneable so a supervisor can hold a handle while the
/// task loop holds its own clone.
#[derive(Clone)]
pub struct TaskHandle {
    running: Arc<AtomicBool>,
}

impl TaskHandle {
    pub fn new() -> Self {
        Self { running: Arc::new(AtomicBool::new(true)) }
    }

    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn should_run(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll `handle.should_run()` until it returns false or `timeout` elapses.
///
/// Mirrors spec.md §5's task manager: "waits up to 5s (configurable) for all
/// tasks to exit; past that it reports a timeout but does not force-kill."
pub fn join_with_timeout(handle: &TaskHandle, is_finished: impl Fn() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if is_finished() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    is_finished()
}
