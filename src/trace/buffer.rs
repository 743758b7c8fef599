//! Fixed-size lossy event ring (spec.md §3, §4.7).
//!
//! The original is a lock-free SPSC ring usable from an ISR; this
//! implementation keeps the same drop-on-full contract but serialises
//! producer/consumer access through a mutex, since Rust gives us no
//! portable ISR context to design against. `record`/`record_from_isr` are
//! kept as distinct methods so a caller that *does* have a real
//! interrupt-safe allocator can swap the inner implementation without
//! changing call sites.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use super::event::{TASK_NAME_LEN, TraceEvent};
use super::{DEFAULT_BUFFER_EVENTS, MAX_TASK_ENTRIES};

struct Inner {
    events: VecDeque<TraceEvent>,
    capacity: usize,
    tasks: Vec<(u16, [u8; TASK_NAME_LEN])>,
}

pub struct TraceBuffer {
    inner: Mutex<Inner>,
    initialized: AtomicBool,
    enabled: AtomicBool,
    paused: AtomicBool,
    dropped: AtomicU32,
}

impl TraceBuffer {
    /// `init`: create the ring, clear the task-name table, set `enabled=false`.
    pub fn init(buffer_size_events: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: VecDeque::with_capacity(buffer_size_events),
                capacity: buffer_size_events,
                tasks: Vec::new(),
            }),
            initialized: AtomicBool::new(true),
            enabled: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            dropped: AtomicU32::new(0),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::init(DEFAULT_BUFFER_EVENTS)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn dropped_count(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn clear_dropped_count(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }

    fn push(&self, event: TraceEvent) {
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }
        if self.paused.load(Ordering::Acquire) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.events.len() >= inner.capacity {
            drop(inner);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        inner.events.push_back(event);
    }

    pub fn record(&self, event: TraceEvent) {
        self.push(event);
    }

    /// Same contract as [`Self::record`]; kept distinct to mirror the
    /// original's ISR-context entry point.
    pub fn record_from_isr(&self, event: TraceEvent) {
        self.push(event);
    }

    /// `registerTask`: populate the name table (max 32 entries); a
    /// duplicate `task_id` updates its name in place.
    pub fn register_task(&self, task_id: u16, name: &str) {
        let mut bytes = [0u8; TASK_NAME_LEN];
        let src = name.as_bytes();
        let n = src.len().min(TASK_NAME_LEN);
        bytes[..n].copy_from_slice(&src[..n]);

        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.tasks.iter_mut().find(|(id, _)| *id == task_id) {
            entry.1 = bytes;
            return;
        }
        if inner.tasks.len() < MAX_TASK_ENTRIES {
            inner.tasks.push((task_id, bytes));
        }
    }

    pub fn task_entries(&self) -> Vec<(u16, [u8; TASK_NAME_LEN])> {
        self.inner.lock().unwrap().tasks.clone()
    }

    /// Consumer dequeue, used only by the export protocol. Polls up to
    /// `timeout` for an event to become available.
    pub fn read(&self, timeout: Duration) -> Option<TraceEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(event) = inner.events.pop_front() {
                    return Some(event);
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Drain every currently-buffered event without waiting, for the
    /// export protocol's "pause, drain, send" sequence (spec.md §4.7).
    pub fn drain_all(&self) -> Vec<TraceEvent> {
        let mut inner = self.inner.lock().unwrap();
        inner.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
