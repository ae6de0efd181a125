//! Message API of a thread: posting, sending, replying, waiting and
//! retrieval.
//!
//! Sent messages always win over posted ones. Every wait, including the
//! sender's wait for its own reply, drains incoming sent messages before it
//! blocks, which is what keeps two threads that send to each other from
//! deadlocking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bitflags::bitflags;

use crate::error::{UserError, UserResult};
use crate::handle::{Hwnd, ThreadId};
use crate::hook::marshal::{CwpStruct, HookData, HookParams, MouseHookStruct, Representation};
use crate::hook::{HookType, HC_ACTION, HC_NOREMOVE};
use crate::message::{
    in_range, is_keyboard_message, is_mouse_message, wake_mask_for_range, LParam, LResult, Msg,
    PeekFlags, Point, QueueStatus, WParam, HTCLIENT, WM_PAINT, WM_SYSTIMER, WM_TIMER,
};
use crate::queue::{MessageQueue, SentMessage, WaitStep};
use crate::thread::Thread;
use crate::window::{WindowCall, WindowRef};

bitflags! {
    /// `InSendMessageEx` result (`ISMEX_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InSendFlags: u32 {
        const SEND = 0x0001;
        const REPLIED = 0x0008;
    }
}

/// Result of `Thread::wait_bits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
}

impl Thread {
    // -- waiting ------------------------------------------------------------

    /// `WaitBits`: blocks until a bit in `mask` changes, draining sent
    /// messages meanwhile. `None` waits forever.
    pub fn wait_bits(&self, mask: QueueStatus, timeout: Option<Duration>) -> WaitOutcome {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        self.wait_until(mask, deadline)
    }

    fn wait_until(&self, mask: QueueStatus, deadline: Option<Instant>) -> WaitOutcome {
        let queue = self.queue();
        loop {
            match queue.wait_step(mask, deadline) {
                WaitStep::Ready => return WaitOutcome::Signaled,
                WaitStep::TimedOut => return WaitOutcome::TimedOut,
                WaitStep::DrainSent => {
                    self.receive_sent_message(&queue);
                }
            }
        }
    }

    // -- sending ------------------------------------------------------------

    /// `SendMessage` with this thread's calling convention and the
    /// configured default timeout.
    pub fn send_message(
        &self,
        hwnd: Hwnd,
        message: u32,
        wparam: WParam,
        lparam: LParam,
    ) -> UserResult<LResult> {
        let timeout = self.system().config().default_send_timeout();
        self.send_message_with(hwnd, message, wparam, lparam, self.kind().representation(), timeout)
    }

    /// `SendMessageW`.
    pub fn send_message_w(
        &self,
        hwnd: Hwnd,
        message: u32,
        wparam: WParam,
        lparam: LParam,
    ) -> UserResult<LResult> {
        let timeout = self.system().config().default_send_timeout();
        self.send_message_with(hwnd, message, wparam, lparam, Representation::Unicode, timeout)
    }

    /// `SendMessageTimeout`. On expiry the receiver takes over cleanup and
    /// `UserError::Timeout` is returned, unless the reply won the race.
    pub fn send_message_timeout(
        &self,
        hwnd: Hwnd,
        message: u32,
        wparam: WParam,
        lparam: LParam,
        timeout: Duration,
    ) -> UserResult<LResult> {
        let repr = self.kind().representation();
        self.send_message_with(hwnd, message, wparam, lparam, repr, Some(timeout))
    }

    fn send_message_with(
        &self,
        hwnd: Hwnd,
        message: u32,
        wparam: WParam,
        lparam: LParam,
        repr: Representation,
        timeout: Option<Duration>,
    ) -> UserResult<LResult> {
        let system = self.system();
        let window = system
            .windows()
            .resolve_window(hwnd)
            .ok_or(UserError::WindowNotFound(hwnd))?;
        let dest_handle = window.queue.ok_or(UserError::NoQueue(hwnd))?;
        let queue = self.queue();

        if dest_handle == queue.handle() {
            return Ok(self.call_window_proc(&window, message, wparam, lparam, repr, true));
        }

        let dest = system.queue(dest_handle).ok_or(UserError::NoQueue(hwnd))?;
        let smsg = SentMessage::new(&queue, hwnd, message, wparam, lparam, repr);
        queue.push_waiting(Arc::clone(&smsg));
        if !dest.enqueue_sent(Arc::clone(&smsg)) {
            queue.pop_waiting(&smsg);
            return Err(UserError::QueueDestroyed);
        }

        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let outcome = loop {
            if let Some(result) = smsg.result() {
                break Ok(result);
            }
            // A nested send drained here may clear SMRESULT meant for this
            // one, so the result is re-read after every step.
            match queue.wait_step(QueueStatus::SMRESULT, deadline) {
                WaitStep::Ready => queue.clear_wake_bits(QueueStatus::SMRESULT),
                WaitStep::DrainSent => {
                    self.receive_sent_message(&queue);
                }
                WaitStep::TimedOut => {
                    break match smsg.abandon() {
                        Some(result) => Ok(result),
                        None => {
                            log::debug!(
                                "queue: {} gave up waiting for {:#06x} to {}",
                                queue.handle(),
                                message,
                                hwnd
                            );
                            Err(UserError::Timeout)
                        }
                    };
                }
            }
        };
        queue.pop_waiting(&smsg);
        outcome
    }

    /// Dispatches the oldest pending sent message. False when there is none.
    pub(crate) fn receive_sent_message(&self, queue: &Arc<MessageQueue>) -> bool {
        let Some(smsg) = queue.begin_processing() else {
            return false;
        };
        smsg.mark_received();
        let result = match self.system().windows().resolve_window(smsg.hwnd) {
            Some(window) => self.call_window_proc(
                &window,
                smsg.message,
                smsg.wparam,
                smsg.lparam,
                smsg.representation(),
                false,
            ),
            None => {
                log::warn!(
                    "queue: {:#06x} sent to vanished window {}",
                    smsg.message,
                    smsg.hwnd
                );
                0
            }
        };
        // No-op when the procedure already replied early.
        smsg.reply(result);
        queue.end_processing();
        if smsg.receiver_cleans() {
            log::debug!(
                "queue: reply to {:#06x} discarded, sender stopped waiting",
                smsg.message
            );
        }
        true
    }

    /// Runs the WH_CALLWNDPROC chain, then the window procedure.
    fn call_window_proc(
        &self,
        window: &WindowRef,
        message: u32,
        wparam: WParam,
        lparam: LParam,
        repr: Representation,
        same_thread: bool,
    ) -> LResult {
        let cwp = CwpStruct {
            lparam,
            wparam,
            message,
            hwnd: window.hwnd,
        };
        let mut params = HookParams::from_ansi(
            self.kind().representation(),
            same_thread as WParam,
            HookData::CallWndProc(cwp),
            self.system().code_page(),
        );
        self.call_hooks(HookType::CallWndProc, HC_ACTION, &mut params);
        let call = WindowCall {
            hwnd: window.hwnd,
            message,
            wparam,
            lparam,
            repr,
        };
        self.system()
            .windows()
            .call_window_procedure(self, window, &call)
    }

    /// `ReplyMessage`: answers the sent message being processed before the
    /// window procedure returns. False outside a sent message or when it
    /// was already answered.
    pub fn reply_message(&self, result: LResult) -> bool {
        match self.queue().processing_top() {
            Some(smsg) => smsg.reply(result),
            None => false,
        }
    }

    pub fn in_send_message(&self) -> bool {
        self.queue().processing_top().is_some()
    }

    pub fn in_send_message_ex(&self) -> InSendFlags {
        match self.queue().processing_top() {
            Some(smsg) if smsg.result().is_some() => InSendFlags::SEND | InSendFlags::REPLIED,
            Some(_) => InSendFlags::SEND,
            None => InSendFlags::empty(),
        }
    }

    // -- posting ------------------------------------------------------------

    /// Fills in time and cursor position like a freshly posted message.
    fn stamp(&self, mut msg: Msg) -> Msg {
        msg.time = self.system().tick_count();
        msg.pt = self.system().cursor_pos();
        msg
    }

    /// `PostMessage`. A null window posts to this thread's own queue.
    pub fn post_message(
        &self,
        hwnd: Hwnd,
        message: u32,
        wparam: WParam,
        lparam: LParam,
    ) -> UserResult<()> {
        let queue = if hwnd.is_null() {
            self.queue()
        } else {
            self.system().queue_for_window(hwnd)?
        };
        queue.post(self.stamp(Msg::new(hwnd, message, wparam, lparam)))?;
        Ok(())
    }

    pub fn post_thread_message(
        &self,
        thread: ThreadId,
        message: u32,
        wparam: WParam,
        lparam: LParam,
    ) -> UserResult<()> {
        let queue = self.system().thread_queue(thread)?;
        queue.post(self.stamp(Msg::new(Hwnd::NULL, message, wparam, lparam)))?;
        Ok(())
    }

    pub fn post_quit_message(&self, exit_code: i32) {
        self.queue().post_quit(exit_code);
    }

    /// Win16 `SetMessageQueue`.
    pub fn set_message_queue(&self, size: usize) -> bool {
        self.queue().set_max_posted(size)
    }

    // -- retrieval ----------------------------------------------------------

    /// `PeekMessage`. Sent messages are dispatched first; they are never
    /// returned.
    pub fn peek_message(&self, hwnd: Hwnd, first: u32, last: u32, flags: PeekFlags) -> Option<Msg> {
        let queue = self.queue();
        let remove = flags.contains(PeekFlags::REMOVE);
        let mask = wake_mask_for_range(first, last);
        loop {
            while self.receive_sent_message(&queue) {}

            let Some(picked) = queue.pick_posted(hwnd, first, last, mask, remove) else {
                let msg = self.synthesize_message(&queue, hwnd, first, last, remove)?;
                return Some(self.run_get_message_hook(msg, remove));
            };
            if self.input_hook_discards(&picked.msg, remove) {
                if let Some(key) = picked.key {
                    queue.remove(key);
                }
                continue;
            }
            queue.record_retrieved(&picked.msg);
            return Some(self.run_get_message_hook(picked.msg, remove));
        }
    }

    /// `GetMessage`. Returns WM_QUIT like any other message; check
    /// `Msg::is_quit`.
    pub fn get_message(&self, hwnd: Hwnd, first: u32, last: u32) -> Msg {
        let mask = wake_mask_for_range(first, last);
        loop {
            if let Some(msg) = self.peek_message(hwnd, first, last, PeekFlags::REMOVE) {
                return msg;
            }
            self.wait_bits(mask, None);
        }
    }

    /// `DispatchMessage`: calls the window procedure of a retrieved message.
    pub fn dispatch_message(&self, msg: &Msg) -> LResult {
        let Some(window) = self.system().windows().resolve_window(msg.hwnd) else {
            return 0;
        };
        let call = WindowCall {
            hwnd: msg.hwnd,
            message: msg.message,
            wparam: msg.wparam,
            lparam: msg.lparam,
            repr: self.kind().representation(),
        };
        self.system()
            .windows()
            .call_window_procedure(self, &window, &call)
    }

    /// WM_PAINT and WM_TIMER are generated from counters, not queued.
    fn synthesize_message(
        &self,
        queue: &MessageQueue,
        hwnd: Hwnd,
        first: u32,
        last: u32,
        remove: bool,
    ) -> Option<Msg> {
        let (_, wake) = queue.status();
        let wanted = |target: Hwnd| hwnd.is_null() || hwnd == target;
        if wake.contains(QueueStatus::PAINT) && in_range(WM_PAINT, first, last) {
            if let Some(target) = self.system().windows().window_to_repaint(queue.handle()) {
                if wanted(target) {
                    let msg = self.stamp(Msg::new(target, WM_PAINT, 0, 0));
                    queue.record_retrieved(&msg);
                    return Some(msg);
                }
            }
        }
        if wake.contains(QueueStatus::TIMER)
            && (in_range(WM_TIMER, first, last) || in_range(WM_SYSTIMER, first, last))
        {
            let msg = self
                .system()
                .timers()
                .next_timer_message(queue.handle(), remove)?;
            if wanted(msg.hwnd) {
                queue.record_retrieved(&msg);
                return Some(msg);
            }
        }
        None
    }

    /// WH_MOUSE / WH_KEYBOARD at retrieval. Nonzero means drop the message.
    fn input_hook_discards(&self, msg: &Msg, remove: bool) -> bool {
        let code = if remove { HC_ACTION } else { HC_NOREMOVE };
        let repr = self.kind().representation();
        if is_mouse_message(msg.message) {
            let data = HookData::Mouse(MouseHookStruct {
                pt: msg.pt,
                hwnd: msg.hwnd,
                hit_test: HTCLIENT as u32,
                extra_info: msg.extra_info as usize,
            });
            let mut params =
                HookParams::from_ansi(repr, msg.message as WParam, data, self.system().code_page());
            self.call_hooks(HookType::Mouse, code, &mut params) != 0
        } else if is_keyboard_message(msg.message) {
            let mut params = HookParams::value(repr, msg.wparam, msg.lparam);
            self.call_hooks(HookType::Keyboard, code, &mut params) != 0
        } else {
            false
        }
    }

    /// WH_GETMESSAGE, which may rewrite the message.
    fn run_get_message_hook(&self, msg: Msg, remove: bool) -> Msg {
        let mut params = HookParams::from_ansi(
            self.kind().representation(),
            remove as WParam,
            HookData::Msg(msg),
            self.system().code_page(),
        );
        self.call_hooks(HookType::GetMessage, HC_ACTION, &mut params);
        match params.msg() {
            Some(hooked) => Msg {
                extra_info: msg.extra_info,
                ..hooked
            },
            None => msg,
        }
    }

    // -- status -------------------------------------------------------------

    /// `GetQueueStatus`: changed bits in the high word, current bits in the
    /// low word.
    pub fn get_queue_status(&self, flags: QueueStatus) -> u32 {
        self.queue().get_queue_status(flags)
    }

    /// `GetInputState`: key or mouse-button input is waiting.
    pub fn get_input_state(&self) -> bool {
        let (_, wake) = self.queue().status();
        wake.intersects(QueueStatus::KEY | QueueStatus::MOUSEBUTTON)
    }

    /// `GetMessagePos`, packed as `MAKELONG(x, y)`.
    pub fn get_message_pos(&self) -> u32 {
        self.queue().message_pos().packed()
    }

    pub fn get_message_point(&self) -> Point {
        self.queue().message_pos()
    }

    pub fn get_message_time(&self) -> u32 {
        self.queue().message_time()
    }

    pub fn get_message_extra_info(&self) -> LParam {
        self.queue().message_extra_info()
    }

    /// Returns the previous value.
    pub fn set_message_extra_info(&self, info: LParam) -> LParam {
        self.queue().set_message_extra_info(info)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::handle::{ModuleId, QueueHandle};
    use crate::hook::HookProcedure;
    use crate::message::{WM_KEYDOWN, WM_QUIT, WM_USER};
    use crate::system::System;
    use crate::thread::ThreadKind;
    use crate::window::{WindowTable, WndProc};
    use std::sync::mpsc;
    use std::sync::Mutex;

    fn setup() -> (Arc<WindowTable>, System) {
        let _ = env_logger::builder().is_test(true).try_init();
        let windows = WindowTable::new();
        let system = System::with_windows(Config::default(), windows.clone()).unwrap();
        (windows, system)
    }

    fn returning(value: LResult) -> WndProc {
        Arc::new(move |_, _| value)
    }

    /// Spawns a thread that pumps messages until WM_QUIT. Returns its id and
    /// queue.
    fn spawn_pump(system: &System) -> (ThreadId, QueueHandle, std::thread::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel();
        let (id, join) = system
            .spawn_thread(ThreadKind::Win32, move |t| {
                tx.send(t.queue().handle()).unwrap();
                loop {
                    let msg = t.get_message(Hwnd::NULL, 0, 0);
                    if msg.is_quit() {
                        break;
                    }
                    t.dispatch_message(&msg);
                }
            })
            .unwrap();
        (id, rx.recv().unwrap(), join)
    }

    fn wait_for(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached");
            std::thread::yield_now();
        }
    }

    #[test]
    fn post_then_peek_in_order() {
        let (_, system) = setup();
        let t = system.create_thread(ThreadKind::Win32);
        for i in 0..3 {
            t.post_message(Hwnd::NULL, WM_USER + i, 0, 0).unwrap();
        }
        for i in 0..3 {
            let msg = t.peek_message(Hwnd::NULL, 0, 0, PeekFlags::REMOVE).unwrap();
            assert_eq!(msg.message, WM_USER + i);
        }
        assert!(t.peek_message(Hwnd::NULL, 0, 0, PeekFlags::REMOVE).is_none());
    }

    #[test]
    fn peek_without_remove_leaves_message() {
        let (_, system) = setup();
        let t = system.create_thread(ThreadKind::Win32);
        t.post_message(Hwnd::NULL, WM_USER, 1, 2).unwrap();
        assert!(t.peek_message(Hwnd::NULL, 0, 0, PeekFlags::empty()).is_some());
        assert_eq!(t.queue().posted_len(), 1);
    }

    #[test]
    fn same_thread_send_calls_procedure_directly() {
        let (windows, system) = setup();
        let t = system.create_thread(ThreadKind::Win32);
        let hwnd = windows.create_window(Some(t.queue().handle()), Arc::new(|_, call| call.wparam as LResult * 2));
        assert_eq!(t.send_message(hwnd, WM_USER, 21, 0), Ok(42));
        assert_eq!(t.queue().waiting_depth(), 0);
    }

    #[test]
    fn send_to_unknown_window_fails() {
        let (windows, system) = setup();
        let t = system.create_thread(ThreadKind::Win32);
        assert_eq!(
            t.send_message(Hwnd(0x9999), WM_USER, 0, 0),
            Err(UserError::WindowNotFound(Hwnd(0x9999)))
        );
        let orphan = windows.create_window(None, returning(0));
        assert_eq!(t.send_message(orphan, WM_USER, 0, 0), Err(UserError::NoQueue(orphan)));
    }

    #[test]
    fn cross_thread_send_returns_window_result() {
        let (windows, system) = setup();
        let (id, queue, join) = spawn_pump(&system);
        let hwnd = windows.create_window(Some(queue), Arc::new(|t, call| {
            assert!(t.in_send_message());
            call.lparam + 1
        }));
        let a = system.create_thread(ThreadKind::Win32);
        assert_eq!(a.send_message(hwnd, WM_USER, 0, 41), Ok(42));
        a.post_thread_message(id, WM_QUIT, 0, 0).unwrap();
        join.join().unwrap();
    }

    #[test]
    fn mutual_send_does_not_deadlock() {
        let (windows, system) = setup();
        let a = system.create_thread(ThreadKind::Win32);
        let hwnd_a = windows.create_window(Some(a.queue().handle()), returning(7));
        let (id, queue, join) = spawn_pump(&system);
        let hwnd_b = windows.create_window(
            Some(queue),
            Arc::new(move |t, _| t.send_message(hwnd_a, WM_USER + 1, 0, 0).unwrap_or(-1) + 1),
        );
        assert_eq!(a.send_message(hwnd_b, WM_USER, 0, 0), Ok(8));
        a.post_thread_message(id, WM_QUIT, 0, 0).unwrap();
        join.join().unwrap();
    }

    #[test]
    fn wait_after_receiving_a_send_blocks_until_timeout() {
        let (windows, system) = setup();
        let b = system.create_thread(ThreadKind::Win32);
        let hwnd = windows.create_window(Some(b.queue().handle()), returning(3));
        let (_, sender) = system
            .spawn_thread(ThreadKind::Win32, move |t| t.send_message(hwnd, WM_USER, 0, 0))
            .unwrap();
        let bq = b.queue();
        wait_for(|| bq.pending_sent() == 1);
        assert!(b.peek_message(Hwnd::NULL, 0, 0, PeekFlags::REMOVE).is_none());
        assert_eq!(sender.join().unwrap(), Ok(3));

        let started = Instant::now();
        assert_eq!(
            b.wait_bits(wake_mask_for_range(0, 0), Some(Duration::from_millis(50))),
            WaitOutcome::TimedOut
        );
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn nested_send_keeps_outer_reply() {
        let (windows, system) = setup();
        let a = system.create_thread(ThreadKind::Win32);
        let hwnd_a = windows.create_window(Some(a.queue().handle()), returning(1));
        let (id, queue, join) = spawn_pump(&system);
        let hwnd_b = windows.create_window(
            Some(queue),
            Arc::new(move |t, _| {
                let inner = t.send_message(hwnd_a, WM_USER + 1, 0, 0).unwrap_or(-1);
                assert!(t.reply_message(10 + inner));
                0
            }),
        );
        assert_eq!(a.send_message_timeout(hwnd_b, WM_USER, 0, 0, Duration::from_secs(10)), Ok(11));
        a.post_thread_message(id, WM_QUIT, 0, 0).unwrap();
        join.join().unwrap();
    }

    #[test]
    fn early_reply_wins_and_second_reply_fails() {
        let (windows, system) = setup();
        let (id, queue, join) = spawn_pump(&system);
        let hwnd = windows.create_window(
            Some(queue),
            Arc::new(|t, _| {
                assert_eq!(t.in_send_message_ex(), InSendFlags::SEND);
                assert!(t.reply_message(5));
                assert_eq!(t.in_send_message_ex(), InSendFlags::SEND | InSendFlags::REPLIED);
                assert!(!t.reply_message(6));
                9
            }),
        );
        let a = system.create_thread(ThreadKind::Win32);
        assert_eq!(a.send_message(hwnd, WM_USER, 0, 0), Ok(5));
        assert!(!a.reply_message(1));
        a.post_thread_message(id, WM_QUIT, 0, 0).unwrap();
        join.join().unwrap();
    }

    #[test]
    fn sent_message_is_dispatched_before_earlier_post() {
        let (windows, system) = setup();
        let order = Arc::new(Mutex::new(Vec::new()));
        let b = system.create_thread(ThreadKind::Win32);
        let log = Arc::clone(&order);
        let hwnd = windows.create_window(
            Some(b.queue().handle()),
            Arc::new(move |_, call| {
                log.lock().unwrap().push(call.message);
                0
            }),
        );
        let a = system.create_thread(ThreadKind::Win32);
        a.post_message(hwnd, WM_USER + 1, 0, 0).unwrap();
        let (_, sender) = system
            .spawn_thread(ThreadKind::Win32, move |t| t.send_message(hwnd, WM_USER + 2, 0, 0))
            .unwrap();
        let bq = b.queue();
        wait_for(|| bq.pending_sent() == 1);

        let msg = b.get_message(Hwnd::NULL, 0, 0);
        b.dispatch_message(&msg);
        assert_eq!(sender.join().unwrap(), Ok(0));
        assert_eq!(*order.lock().unwrap(), vec![WM_USER + 2, WM_USER + 1]);
    }

    #[test]
    fn teardown_releases_every_blocked_sender() {
        const SENDERS: usize = 4;
        let (windows, system) = setup();
        let b = system.create_thread(ThreadKind::Win32);
        let hwnd = windows.create_window(Some(b.queue().handle()), returning(99));
        let joins: Vec<_> = (0..SENDERS)
            .map(|i| {
                system
                    .spawn_thread(ThreadKind::Win32, move |t| {
                        t.send_message(hwnd, WM_USER + i as u32, 0, 0)
                    })
                    .unwrap()
                    .1
            })
            .collect();
        let bq = b.queue();
        wait_for(|| bq.pending_sent() == SENDERS);
        drop(b);
        for join in joins {
            assert_eq!(join.join().unwrap(), Ok(0));
        }
        assert_eq!(bq.pending_sent(), 0);
    }

    #[test]
    fn send_timeout_hands_cleanup_to_receiver() {
        let (windows, system) = setup();
        let b = system.create_thread(ThreadKind::Win32);
        let hwnd = windows.create_window(Some(b.queue().handle()), returning(3));
        let a = system.create_thread(ThreadKind::Win32);
        assert_eq!(
            a.send_message_timeout(hwnd, WM_USER, 0, 0, Duration::from_millis(20)),
            Err(UserError::Timeout)
        );
        assert_eq!(a.queue().waiting_depth(), 0);
        // The receiver still processes it; the reply goes nowhere.
        assert!(b.peek_message(Hwnd::NULL, 0, 0, PeekFlags::REMOVE).is_none());
        assert_eq!(b.queue().pending_sent(), 0);
        assert_eq!(b.queue().processing_depth(), 0);
    }

    #[test]
    fn wait_bits_times_out_and_returns_for_latched_post() {
        let (_, system) = setup();
        let t = system.create_thread(ThreadKind::Win32);
        assert_eq!(
            t.wait_bits(QueueStatus::POSTMESSAGE, Some(Duration::from_millis(10))),
            WaitOutcome::TimedOut
        );
        t.post_message(Hwnd::NULL, WM_USER, 0, 0).unwrap();
        assert_eq!(
            t.wait_bits(QueueStatus::POSTMESSAGE, Some(Duration::ZERO)),
            WaitOutcome::Signaled
        );
    }

    #[test]
    fn quit_arrives_after_pending_posts() {
        let (_, system) = setup();
        let t = system.create_thread(ThreadKind::Win32);
        t.post_message(Hwnd::NULL, WM_USER, 0, 0).unwrap();
        t.post_quit_message(4);
        assert_eq!(t.get_message(Hwnd::NULL, 0, 0).message, WM_USER);
        let quit = t.get_message(Hwnd::NULL, 0, 0);
        assert!(quit.is_quit());
        assert_eq!(quit.wparam, 4);
    }

    #[test]
    fn status_queries_reflect_retrieved_message() {
        let (_, system) = setup();
        let t = system.create_thread(ThreadKind::Win32);
        system.set_cursor_pos(Point::new(3, 4));
        t.post_message(Hwnd::NULL, WM_KEYDOWN, 0x41, 0).unwrap();
        assert!(t.get_input_state());
        let status = t.get_queue_status(QueueStatus::ALLINPUT);
        assert_eq!(status & 0xffff, QueueStatus::KEY.bits());
        assert_eq!(t.get_queue_status(QueueStatus::ALLINPUT) >> 16, 0);

        let msg = t.get_message(Hwnd::NULL, 0, 0);
        assert_eq!(t.get_message_point(), Point::new(3, 4));
        assert_eq!(t.get_message_pos(), (4 << 16) | 3);
        assert_eq!(t.get_message_time(), msg.time);
        assert!(!t.get_input_state());
        assert_eq!(t.set_message_extra_info(17), 0);
        assert_eq!(t.get_message_extra_info(), 17);
    }

    #[test]
    fn paint_message_is_synthesised_from_counter() {
        let (windows, system) = setup();
        let t = system.create_thread(ThreadKind::Win32);
        let queue = t.queue().handle();
        let hwnd = windows.create_window(Some(queue), returning(0));
        windows.set_needs_paint(hwnd, true);
        assert!(system.inc_paint_count(queue));
        let msg = t.get_message(Hwnd::NULL, 0, 0);
        assert_eq!((msg.hwnd, msg.message), (hwnd, WM_PAINT));
        windows.set_needs_paint(hwnd, false);
        system.dec_paint_count(queue);
        assert!(t.peek_message(Hwnd::NULL, 0, 0, PeekFlags::REMOVE).is_none());
    }

    #[test]
    fn soft_limit_and_set_message_queue() {
        let (_, system) = setup();
        let t = system.create_thread(ThreadKind::Win32);
        assert!(t.set_message_queue(2));
        assert!(!t.set_message_queue(0));
        t.post_message(Hwnd::NULL, WM_USER, 0, 0).unwrap();
        t.post_message(Hwnd::NULL, WM_USER, 0, 0).unwrap();
        assert_eq!(
            t.post_message(Hwnd::NULL, WM_USER, 0, 0),
            Err(UserError::QueueFull { limit: 2 })
        );
    }

    #[test]
    fn keyboard_hook_can_discard_at_retrieval() {
        let (_, system) = setup();
        let t = system.create_thread(ThreadKind::Win32);
        t.set_windows_hook_ex(
            HookType::Keyboard.raw(),
            HookProcedure::ansi(|_, code, params| {
                (code == HC_ACTION && params.wparam() == 0x1b) as LResult
            }),
            ModuleId(1),
            Some(t.id()),
        )
        .unwrap();
        t.post_message(Hwnd::NULL, WM_KEYDOWN, 0x1b, 0).unwrap();
        t.post_message(Hwnd::NULL, WM_KEYDOWN, 0x41, 0).unwrap();
        let msg = t.peek_message(Hwnd::NULL, 0, 0, PeekFlags::REMOVE).unwrap();
        assert_eq!(msg.wparam, 0x41);
        assert!(t.peek_message(Hwnd::NULL, 0, 0, PeekFlags::REMOVE).is_none());
    }

    #[test]
    fn get_message_hook_rewrites_message() {
        let (_, system) = setup();
        let t = system.create_thread(ThreadKind::Win32);
        t.set_windows_hook_ex(
            HookType::GetMessage.raw(),
            HookProcedure::unicode(|_, _, params| {
                if let HookParams::Unicode {
                    data: HookData::Msg(m),
                    ..
                } = params
                {
                    m.wparam += 100;
                }
                0
            }),
            ModuleId(1),
            Some(t.id()),
        )
        .unwrap();
        t.post_message(Hwnd::NULL, WM_USER, 1, 0).unwrap();
        let msg = t.get_message(Hwnd::NULL, 0, 0);
        assert_eq!(msg.wparam, 101);
    }

    #[test]
    fn call_wnd_proc_hook_sees_sent_messages() {
        let (windows, system) = setup();
        let t = system.create_thread(ThreadKind::Win32);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        t.set_windows_hook_ex(
            HookType::CallWndProc.raw(),
            HookProcedure::ansi(move |_, _, params| {
                if let HookParams::Ansi {
                    wparam,
                    data: HookData::CallWndProc(cwp),
                } = params
                {
                    log.lock().unwrap().push((*wparam, cwp.message));
                }
                0
            }),
            ModuleId(1),
            Some(t.id()),
        )
        .unwrap();
        let hwnd = windows.create_window(Some(t.queue().handle()), returning(1));
        t.send_message(hwnd, WM_USER + 5, 0, 0).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(1, WM_USER + 5)]);
    }
}
