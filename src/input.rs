//! Hardware input routing.
//!
//! Raw keyboard and mouse events are turned into posted messages on the
//! queue that should see them: keyboard input goes to the focus window,
//! mouse input to the capture window or the window under the cursor. With
//! no window to aim at, some queue is woken instead.

use std::sync::Arc;

use crate::handle::Hwnd;
use crate::hook::marshal::{EventMsg, HookData, HookParams};
use crate::hook::{HookType, HC_ACTION, HC_GETNEXT, HC_SKIP};
use crate::message::{
    is_keyboard_message, is_mouse_message, wake_bit_for, LParam, Msg, Point, QueueStatus, WParam,
};
use crate::queue::MessageQueue;
use crate::system::System;
use crate::thread::Thread;

/// One raw input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareEvent {
    pub message: u32,
    pub wparam: WParam,
    pub lparam: LParam,
    pub pt: Point,
    pub time: u32,
    pub extra_info: LParam,
}

impl HardwareEvent {
    pub fn new(message: u32, wparam: WParam, lparam: LParam, pt: Point) -> Self {
        Self {
            message,
            wparam,
            lparam,
            pt,
            time: 0,
            extra_info: 0,
        }
    }

    /// Journal form. Keyboard: virtual key and scan code in `param_l`,
    /// repeat count in `param_h`. Mouse: the cursor position.
    fn to_event_msg(self, hwnd: Hwnd) -> EventMsg {
        let (param_l, param_h) = if is_keyboard_message(self.message) {
            let lparam = self.lparam as u32;
            ((self.wparam as u32 & 0xff) | ((lparam >> 16) << 8), lparam & 0x7fff)
        } else {
            (self.pt.x as u32, self.pt.y as u32)
        };
        EventMsg {
            message: self.message,
            param_l,
            param_h,
            time: self.time,
            hwnd,
        }
    }

    fn from_event_msg(event: &EventMsg) -> Self {
        if is_keyboard_message(event.message) {
            let lparam = (((event.param_l >> 8) & 0xff) << 16) | (event.param_h & 0x7fff);
            let mut ev = Self::new(
                event.message,
                (event.param_l & 0xff) as WParam,
                lparam as LParam,
                Point::default(),
            );
            ev.time = event.time;
            ev
        } else {
            let pt = Point::new(event.param_l as i32, event.param_h as i32);
            let mut ev = Self::new(event.message, 0, pt.packed() as LParam, pt);
            ev.time = event.time;
            ev
        }
    }
}

impl System {
    /// `QUEUE_WakeSomeone`: a queue waiting for `bit`, else the active
    /// queue, else the first live queue.
    pub fn wake_someone(&self, bit: QueueStatus) -> Option<Arc<MessageQueue>> {
        let queues = self.live_queues();
        if let Some(queue) = queues.iter().find(|q| q.wake_mask().intersects(bit)) {
            return Some(Arc::clone(queue));
        }
        if let Some(active) = self.active_queue().and_then(|h| self.queue(h)) {
            return Some(active);
        }
        queues.into_iter().next()
    }

    /// Window that should receive `event`, from the input state of the
    /// active queue (or `fallback`'s when there is none).
    fn input_target(&self, event: &HardwareEvent, fallback: &MessageQueue) -> Hwnd {
        let pqd = self
            .active_queue()
            .and_then(|h| self.queue(h))
            .and_then(|q| q.pqd())
            .or_else(|| fallback.pqd());
        let Some(pqd) = pqd else {
            return Hwnd::NULL;
        };
        if is_keyboard_message(event.message) {
            return pqd.focus();
        }
        if is_mouse_message(event.message) {
            let capture = pqd.capture();
            if !capture.is_null() {
                return capture;
            }
            return self.windows().window_from_point(event.pt).unwrap_or(Hwnd::NULL);
        }
        Hwnd::NULL
    }
}

impl Thread {
    /// `hardware_event`: records, routes and posts one input event.
    /// Returns the receiving window (null when a queue was woken without
    /// one), or `None` when the event was dropped.
    pub fn hardware_event(&self, event: HardwareEvent) -> Option<Hwnd> {
        if self.system().input_disabled() {
            log::debug!(
                "input: {:#06x} dropped, journal playback active",
                event.message
            );
            return None;
        }
        self.inject(event)
    }

    fn inject(&self, mut event: HardwareEvent) -> Option<Hwnd> {
        let system = self.system();
        if event.time == 0 {
            event.time = system.tick_count();
        }
        if is_mouse_message(event.message) {
            system.set_cursor_pos(event.pt);
        }
        let own = self.queue();
        let hwnd = system.input_target(&event, &own);

        if system.with_hooks(|hooks| hooks.has_system_hook(HookType::JournalRecord)) {
            let mut params = HookParams::from_ansi(
                self.kind().representation(),
                0,
                HookData::EventMsg(event.to_event_msg(hwnd)),
                system.code_page(),
            );
            self.call_hooks(HookType::JournalRecord, HC_ACTION, &mut params);
        }

        let queue = if hwnd.is_null() {
            None
        } else {
            system.queue_for_window(hwnd).ok()
        };
        let Some(queue) = queue.or_else(|| system.wake_someone(wake_bit_for(event.message)))
        else {
            log::warn!("input: {:#06x} dropped, no queue to receive it", event.message);
            return None;
        };

        let msg = Msg {
            hwnd,
            message: event.message,
            wparam: event.wparam,
            lparam: event.lparam,
            time: event.time,
            pt: system.cursor_pos(),
            extra_info: event.extra_info,
        };
        match queue.post(msg) {
            Ok(_) => Some(hwnd),
            Err(err) => {
                log::warn!("input: {:#06x} dropped: {}", event.message, err);
                None
            }
        }
    }

    /// One journal playback step: asks the playback hook for the next event
    /// (HC_GETNEXT), injects it, then tells the hook to advance (HC_SKIP).
    /// `None` when no playback hook is installed.
    pub fn play_journal_event(&self) -> Option<HardwareEvent> {
        let system = self.system();
        if !system.with_hooks(|hooks| hooks.has_system_hook(HookType::JournalPlayback)) {
            return None;
        }
        let repr = self.kind().representation();
        let mut params = HookParams::from_ansi(
            repr,
            0,
            HookData::EventMsg(EventMsg::default()),
            system.code_page(),
        );
        self.call_hooks(HookType::JournalPlayback, HC_GETNEXT, &mut params);
        let event = HardwareEvent::from_event_msg(&params.event_msg()?);
        self.inject(event);

        let mut skip = HookParams::value(repr, 0, 0);
        self.call_hooks(HookType::JournalPlayback, HC_SKIP, &mut skip);
        Some(event)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
