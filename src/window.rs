//! Interfaces to the window manager and timer subsystem.
//!
//! Both are external to the queue core and consumed through narrow traits:
//! `WindowSystem` resolves windows to queues and runs window procedures,
//! `TimerService` owns timers. `WindowTable` is an in-memory window
//! manager, enough to drive the subsystem from the demo binary and tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::handle::{Hwnd, QueueHandle};
use crate::hook::marshal::{Rect, Representation};
use crate::message::{LParam, LResult, Msg, Point, WParam};
use crate::thread::Thread;

/// A resolved window: its handle and the queue that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRef {
    pub hwnd: Hwnd,
    pub queue: Option<QueueHandle>,
}

/// One window-procedure invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCall {
    pub hwnd: Hwnd,
    pub message: u32,
    pub wparam: WParam,
    pub lparam: LParam,
    /// Calling convention selected by the sender.
    pub repr: Representation,
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

pub trait WindowSystem: Send + Sync {
    fn resolve_window(&self, hwnd: Hwnd) -> Option<WindowRef>;

    /// Runs the window procedure on the calling thread.
    fn call_window_procedure(&self, thread: &Thread, window: &WindowRef, call: &WindowCall)
        -> LResult;

    /// Top-level window under `pt`, used to route mouse input.
    fn window_from_point(&self, _pt: Point) -> Option<Hwnd> {
        None
    }

    /// A window of `queue` with a pending update region.
    fn window_to_repaint(&self, _queue: QueueHandle) -> Option<Hwnd> {
        None
    }

    /// Drops the resident popup menu's reference to `queue`, if any.
    fn release_popup_menu(&self, _queue: QueueHandle) {}

    /// Resets every window owned by `queue` to no queue. Returns how many.
    fn detach_queue(&self, queue: QueueHandle) -> usize;
}

pub trait TimerService: Send + Sync {
    /// Returns the number of timers cancelled.
    fn cancel_all_timers_for_queue(&self, queue: QueueHandle) -> usize;

    /// Next expired timer of `queue` as a WM_TIMER message.
    fn next_timer_message(&self, _queue: QueueHandle, _remove: bool) -> Option<Msg> {
        None
    }
}

/// Timer service with no timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTimers;

impl TimerService for NoTimers {
    fn cancel_all_timers_for_queue(&self, _queue: QueueHandle) -> usize {
        0
    }
}

// ---------------------------------------------------------------------------
// In-memory window manager
// ---------------------------------------------------------------------------

pub type WndProc = Arc<dyn Fn(&Thread, &WindowCall) -> LResult + Send + Sync>;

struct WindowEntry {
    queue: Option<QueueHandle>,
    proc: WndProc,
    rect: Rect,
    needs_paint: bool,
}

#[derive(Default)]
struct TableState {
    windows: BTreeMap<Hwnd, WindowEntry>,
    next_hwnd: u32,
    popup_owner: Option<QueueHandle>,
}

/// Window handles start here and stay below 0x10000 so they survive the
/// 16-bit structure layouts.
const FIRST_HWND: u32 = 0x0100;

#[derive(Default)]
pub struct WindowTable {
    state: Mutex<TableState>,
}

impl WindowTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create_window(&self, queue: Option<QueueHandle>, proc: WndProc) -> Hwnd {
        let mut st = self.lock();
        let hwnd = Hwnd(FIRST_HWND + st.next_hwnd * 2);
        st.next_hwnd += 1;
        st.windows.insert(
            hwnd,
            WindowEntry {
                queue,
                proc,
                rect: Rect::default(),
                needs_paint: false,
            },
        );
        log::debug!("window: created {} for {:?}", hwnd, queue);
        hwnd
    }

    pub fn destroy_window(&self, hwnd: Hwnd) -> bool {
        self.lock().windows.remove(&hwnd).is_some()
    }

    pub fn set_rect(&self, hwnd: Hwnd, rect: Rect) -> bool {
        match self.lock().windows.get_mut(&hwnd) {
            Some(entry) => {
                entry.rect = rect;
                true
            }
            None => false,
        }
    }

    pub fn set_needs_paint(&self, hwnd: Hwnd, needs_paint: bool) -> bool {
        match self.lock().windows.get_mut(&hwnd) {
            Some(entry) => {
                entry.needs_paint = needs_paint;
                true
            }
            None => false,
        }
    }

    pub fn queue_of(&self, hwnd: Hwnd) -> Option<QueueHandle> {
        self.lock().windows.get(&hwnd).and_then(|w| w.queue)
    }

    /// Makes `queue` the owner of the resident popup menu.
    pub fn track_popup_menu(&self, queue: QueueHandle) {
        self.lock().popup_owner = Some(queue);
    }

    pub fn popup_menu_owner(&self) -> Option<QueueHandle> {
        self.lock().popup_owner
    }
}

impl WindowSystem for WindowTable {
    fn resolve_window(&self, hwnd: Hwnd) -> Option<WindowRef> {
        self.lock().windows.get(&hwnd).map(|w| WindowRef {
            hwnd,
            queue: w.queue,
        })
    }

    fn call_window_procedure(
        &self,
        thread: &Thread,
        window: &WindowRef,
        call: &WindowCall,
    ) -> LResult {
        // Never hold the table lock across a window procedure.
        let proc = match self.lock().windows.get(&window.hwnd) {
            Some(entry) => Arc::clone(&entry.proc),
            None => return 0,
        };
        proc(thread, call)
    }

    fn window_from_point(&self, pt: Point) -> Option<Hwnd> {
        self.lock()
            .windows
            .iter()
            .find(|(_, w)| {
                pt.x >= w.rect.left && pt.x < w.rect.right && pt.y >= w.rect.top && pt.y < w.rect.bottom
            })
            .map(|(hwnd, _)| *hwnd)
    }

    fn window_to_repaint(&self, queue: QueueHandle) -> Option<Hwnd> {
        self.lock()
            .windows
            .iter()
            .find(|(_, w)| w.needs_paint && w.queue == Some(queue))
            .map(|(hwnd, _)| *hwnd)
    }

    fn release_popup_menu(&self, queue: QueueHandle) {
        let mut st = self.lock();
        if st.popup_owner == Some(queue) {
            st.popup_owner = None;
        }
    }

    fn detach_queue(&self, queue: QueueHandle) -> usize {
        let mut st = self.lock();
        let mut count = 0;
        for entry in st.windows.values_mut() {
            if entry.queue == Some(queue) {
                entry.queue = None;
                count += 1;
            }
        }
        count
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
