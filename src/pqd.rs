//! Per-queue input state (focus, active and capture windows).
//!
//! One `PerQueueData` may be shared by several queues after
//! `AttachThreadInput`, so it carries its own lock, independent of any
//! queue lock. Lock order is always queue first, then PQD.
//!
//! Reference counting is the `Arc` strong count: a queue holds one reference
//! for as long as it points at the instance, and the instance is destroyed
//! when the last queue lets go of it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::handle::Hwnd;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct InputWindows {
    focus: Hwnd,
    active: Hwnd,
    capture: Hwnd,
    capture_hit_test: i32,
}

/// Focus/active/capture state shared by attached queues.
#[derive(Debug, Default)]
pub struct PerQueueData {
    state: Mutex<InputWindows>,
}

impl PerQueueData {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, InputWindows> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of queues (and other holders) referencing `this`.
    pub fn ref_count(this: &Arc<Self>) -> usize {
        Arc::strong_count(this)
    }

    pub fn focus(&self) -> Hwnd {
        self.lock().focus
    }

    /// Sets the focus window, returning the previous one.
    pub fn set_focus(&self, hwnd: Hwnd) -> Hwnd {
        std::mem::replace(&mut self.lock().focus, hwnd)
    }

    pub fn active(&self) -> Hwnd {
        self.lock().active
    }

    pub fn set_active(&self, hwnd: Hwnd) -> Hwnd {
        std::mem::replace(&mut self.lock().active, hwnd)
    }

    pub fn capture(&self) -> Hwnd {
        self.lock().capture
    }

    pub fn capture_hit_test(&self) -> i32 {
        self.lock().capture_hit_test
    }

    /// Sets the capture window and its hit-test code, returning the
    /// previous capture window.
    pub fn set_capture(&self, hwnd: Hwnd, hit_test: i32) -> Hwnd {
        let mut state = self.lock();
        state.capture_hit_test = hit_test;
        std::mem::replace(&mut state.capture, hwnd)
    }

    pub fn release_capture(&self) -> Hwnd {
        self.set_capture(Hwnd::NULL, 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
