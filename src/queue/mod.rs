//! Per-thread message queue.
//!
//! A queue holds the posted-message FIFO, the three sent-message lists and
//! the three wake-bit vectors:
//!
//! - `change_bits`: edges accumulated since the consumer last looked
//!   (sticky until a status read or a retrieval clears them),
//! - `wake_bits`: what is currently queued,
//! - `wake_mask`: what a blocked consumer wants; zero when nobody waits.
//!
//! Setting a bit that intersects `wake_mask` signals the consumer and clears
//! the mask (one-shot wake). Because the edge is also latched in
//! `change_bits`, a wait that starts after the event returns at once.
//!
//! Lock order: a queue lock is never held while taking another queue's
//! lock or the process-wide lock. It may be held while taking the PQD lock
//! or an SMSG lock.

pub mod posted;
pub mod sent;

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::error::{UserError, UserResult};
use crate::handle::{HookHandle, Hwnd, QueueHandle, ThreadId};
use crate::message::{
    in_range, wake_bit_for, LParam, Msg, Point, QueueStatus, WM_QUIT,
};
use crate::pqd::PerQueueData;

pub use posted::{PostedKey, PostedList, Pushed};
pub use sent::{SentMessage, SmsgFlags, SmsgState};

/// Stamp checked on every node while walking the process queue list.
pub const QUEUE_MAGIC: u32 = 0x5551_4d47;

// ---------------------------------------------------------------------------
// Queue state
// ---------------------------------------------------------------------------

pub(crate) struct QueueState {
    pub(crate) posted: PostedList,
    pub(crate) change_bits: QueueStatus,
    pub(crate) wake_bits: QueueStatus,
    pub(crate) wake_mask: QueueStatus,
    /// FIFO of messages sent to this queue and not yet dispatched.
    pub(crate) sm_pending: VecDeque<Arc<SentMessage>>,
    /// Stack of messages this queue is dispatching (innermost on top).
    pub(crate) sm_processing: Vec<Arc<SentMessage>>,
    /// Stack of messages this queue sent and is waiting on.
    pub(crate) sm_waiting: Vec<Arc<SentMessage>>,
    pub(crate) paint_count: u32,
    pub(crate) timer_count: u32,
    pub(crate) pqd: Option<Arc<PerQueueData>>,
    pub(crate) max_posted: usize,
    pub(crate) quit_code: Option<i32>,
    pub(crate) msg_time: u32,
    pub(crate) msg_pos: Point,
    pub(crate) extra_info: LParam,
    pub(crate) current_hook: Option<HookHandle>,
    pub(crate) destroyed: bool,
}

impl QueueState {
    fn raise(&mut self, bits: QueueStatus) -> bool {
        self.wake_bits |= bits;
        self.change_bits |= bits;
        if self.wake_mask.intersects(bits) {
            self.wake_mask = QueueStatus::empty();
            true
        } else {
            false
        }
    }

    pub(crate) fn remove_posted(&mut self, key: PostedKey) -> Option<Msg> {
        let (msg, mut drained) = self.posted.remove(key)?;
        if self.quit_code.is_some() {
            drained.remove(QueueStatus::POSTMESSAGE);
        }
        self.wake_bits.remove(drained);
        Some(msg)
    }
}

/// One step of a wake-bit wait, as seen by the waiting thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitStep {
    Ready,
    DrainSent,
    TimedOut,
}

/// A message picked by `MessageQueue::pick_posted`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Picked {
    pub(crate) msg: Msg,
    /// Still queued (peek without remove).
    pub(crate) key: Option<PostedKey>,
}

// ---------------------------------------------------------------------------
// Message queue
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MessageQueue {
    handle: QueueHandle,
    magic: u32,
    owner: ThreadId,
    state: Mutex<QueueState>,
    wakeup: Condvar,
}

impl std::fmt::Debug for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueState")
            .field("posted", &self.posted.len())
            .field("change_bits", &self.change_bits)
            .field("wake_bits", &self.wake_bits)
            .field("wake_mask", &self.wake_mask)
            .field("sm_pending", &self.sm_pending.len())
            .field("sm_processing", &self.sm_processing.len())
            .field("sm_waiting", &self.sm_waiting.len())
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl MessageQueue {
    pub fn new(
        handle: QueueHandle,
        owner: ThreadId,
        pqd: Arc<PerQueueData>,
        max_posted: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            handle,
            magic: QUEUE_MAGIC,
            owner,
            state: Mutex::new(QueueState {
                posted: PostedList::new(),
                change_bits: QueueStatus::empty(),
                wake_bits: QueueStatus::empty(),
                wake_mask: QueueStatus::empty(),
                sm_pending: VecDeque::new(),
                sm_processing: Vec::new(),
                sm_waiting: Vec::new(),
                paint_count: 0,
                timer_count: 0,
                pqd: Some(pqd),
                max_posted,
                quit_code: None,
                msg_time: 0,
                msg_pos: Point::default(),
                extra_info: 0,
                current_hook: None,
                destroyed: false,
            }),
            wakeup: Condvar::new(),
        })
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn is_valid(&self) -> bool {
        self.magic == QUEUE_MAGIC
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    // -- wake bits ----------------------------------------------------------

    pub fn set_wake_bits(&self, bits: QueueStatus) {
        let notify = self.lock().raise(bits);
        if notify {
            self.wakeup.notify_all();
        }
    }

    pub fn clear_wake_bits(&self, bits: QueueStatus) {
        let mut st = self.lock();
        st.wake_bits.remove(bits);
        st.change_bits.remove(bits);
    }

    /// `(change_bits, wake_bits)` without touching either.
    pub fn status(&self) -> (QueueStatus, QueueStatus) {
        let st = self.lock();
        (st.change_bits, st.wake_bits)
    }

    pub fn wake_mask(&self) -> QueueStatus {
        self.lock().wake_mask
    }

    pub(crate) fn signal_reply(&self) {
        self.set_wake_bits(QueueStatus::SMRESULT);
    }

    /// `GetQueueStatus`: high word is the change bits, low word the wake
    /// bits, both filtered by `flags`. Clears the reported change bits.
    pub fn get_queue_status(&self, flags: QueueStatus) -> u32 {
        let flags = flags & QueueStatus::ALLINPUT;
        let mut st = self.lock();
        let changed = st.change_bits & flags;
        let current = st.wake_bits & flags;
        st.change_bits.remove(flags);
        (changed.bits() << 16) | current.bits()
    }

    /// Blocks until `mask` intersects the change bits, a sent message needs
    /// draining, or `deadline` passes. Spurious wakeups re-check the bits.
    pub(crate) fn wait_step(&self, mask: QueueStatus, deadline: Option<Instant>) -> WaitStep {
        let mut st = self.lock();
        loop {
            if st.change_bits.intersects(mask) {
                st.wake_mask = QueueStatus::empty();
                return WaitStep::Ready;
            }
            if st.wake_bits.contains(QueueStatus::SENDMESSAGE) {
                st.wake_mask = QueueStatus::empty();
                return WaitStep::DrainSent;
            }
            st.wake_mask = mask | QueueStatus::SENDMESSAGE;
            st = match deadline {
                None => self.wakeup.wait(st).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        st.wake_mask = QueueStatus::empty();
                        return WaitStep::TimedOut;
                    }
                    self.wakeup
                        .wait_timeout(st, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|e| e.into_inner().0)
                }
            };
            st.wake_mask = QueueStatus::empty();
        }
    }

    // -- posted messages ----------------------------------------------------

    /// Appends `msg` to the FIFO and raises the matching wake bit.
    pub fn post(&self, msg: Msg) -> UserResult<Pushed> {
        let notify;
        let pushed;
        {
            let mut st = self.lock();
            if st.destroyed {
                return Err(UserError::QueueDestroyed);
            }
            pushed = st.posted.push(msg);
            if let Pushed::Appended(key) = pushed {
                if st.posted.len() > st.max_posted {
                    st.remove_posted(key);
                    log::warn!(
                        "queue: {} full ({} messages), dropping {:#06x}",
                        self.handle,
                        st.max_posted,
                        msg.message
                    );
                    return Err(UserError::QueueFull {
                        limit: st.max_posted,
                    });
                }
            }
            notify = st.raise(wake_bit_for(msg.message));
        }
        if notify {
            self.wakeup.notify_all();
        }
        Ok(pushed)
    }

    pub fn find(&self, hwnd: Hwnd, first: u32, last: u32) -> Option<(PostedKey, Msg)> {
        let st = self.lock();
        let key = st.posted.find(hwnd, first, last)?;
        st.posted.get(key).map(|m| (key, *m))
    }

    pub fn remove(&self, key: PostedKey) -> Option<Msg> {
        self.lock().remove_posted(key)
    }

    pub fn posted_len(&self) -> usize {
        self.lock().posted.len()
    }

    pub fn posted_messages(&self) -> Vec<Msg> {
        self.lock().posted.iter().copied().collect()
    }

    /// Clears the change bits a retrieval is about to examine and picks the
    /// first matching posted message, falling back to a pending WM_QUIT.
    pub(crate) fn pick_posted(
        &self,
        hwnd: Hwnd,
        first: u32,
        last: u32,
        mask: QueueStatus,
        remove: bool,
    ) -> Option<Picked> {
        let mut st = self.lock();
        st.change_bits
            .remove(mask - (QueueStatus::SENDMESSAGE | QueueStatus::SMRESULT));
        if let Some(key) = st.posted.find(hwnd, first, last) {
            let msg = *st.posted.get(key)?;
            if remove {
                st.remove_posted(key);
                return Some(Picked { msg, key: None });
            }
            return Some(Picked { msg, key: Some(key) });
        }
        let code = st.quit_code?;
        if !in_range(WM_QUIT, first, last) {
            return None;
        }
        if remove {
            st.quit_code = None;
            if !st
                .posted
                .iter()
                .any(|m| wake_bit_for(m.message) == QueueStatus::POSTMESSAGE)
            {
                st.wake_bits.remove(QueueStatus::POSTMESSAGE);
            }
        }
        Some(Picked {
            msg: Msg::new(Hwnd::NULL, WM_QUIT, code as usize, 0),
            key: None,
        })
    }

    /// `PostQuitMessage`: WM_QUIT is delivered once the posted FIFO has
    /// nothing matching left.
    pub fn post_quit(&self, exit_code: i32) {
        let notify = {
            let mut st = self.lock();
            st.quit_code = Some(exit_code);
            st.raise(QueueStatus::POSTMESSAGE)
        };
        if notify {
            self.wakeup.notify_all();
        }
    }

    /// Win16 `SetMessageQueue`: replaces the soft limit.
    pub fn set_max_posted(&self, limit: usize) -> bool {
        if limit == 0 {
            return false;
        }
        self.lock().max_posted = limit;
        true
    }

    // -- sent messages ------------------------------------------------------

    /// Appends to `sm_pending` and raises QS_SENDMESSAGE. Returns false if
    /// the queue is already gone.
    pub(crate) fn enqueue_sent(&self, smsg: Arc<SentMessage>) -> bool {
        let notify = {
            let mut st = self.lock();
            if st.destroyed {
                return false;
            }
            st.sm_pending.push_back(smsg);
            st.raise(QueueStatus::SENDMESSAGE)
        };
        if notify {
            self.wakeup.notify_all();
        }
        true
    }

    /// Pops the oldest pending SMSG and pushes it on the processing stack.
    pub(crate) fn begin_processing(&self) -> Option<Arc<SentMessage>> {
        let mut st = self.lock();
        let smsg = st.sm_pending.pop_front();
        if st.sm_pending.is_empty() {
            st.wake_bits.remove(QueueStatus::SENDMESSAGE);
            st.change_bits.remove(QueueStatus::SENDMESSAGE);
        }
        let smsg = smsg?;
        st.sm_processing.push(Arc::clone(&smsg));
        Some(smsg)
    }

    pub(crate) fn end_processing(&self) -> Option<Arc<SentMessage>> {
        self.lock().sm_processing.pop()
    }

    pub(crate) fn processing_top(&self) -> Option<Arc<SentMessage>> {
        self.lock().sm_processing.last().cloned()
    }

    pub(crate) fn push_waiting(&self, smsg: Arc<SentMessage>) {
        self.lock().sm_waiting.push(smsg);
    }

    /// Pops the waiting stack; `smsg` must be on top.
    pub(crate) fn pop_waiting(&self, smsg: &Arc<SentMessage>) {
        let mut st = self.lock();
        match st.sm_waiting.last() {
            Some(top) if Arc::ptr_eq(top, smsg) => {
                st.sm_waiting.pop();
            }
            _ => log::error!(
                "queue: {} waiting stack out of order for {:#06x}",
                self.handle,
                smsg.message
            ),
        }
    }

    pub fn pending_sent(&self) -> usize {
        self.lock().sm_pending.len()
    }

    pub fn processing_depth(&self) -> usize {
        self.lock().sm_processing.len()
    }

    pub fn waiting_depth(&self) -> usize {
        self.lock().sm_waiting.len()
    }

    // -- input state --------------------------------------------------------

    pub fn pqd(&self) -> Option<Arc<PerQueueData>> {
        self.lock().pqd.clone()
    }

    /// Swaps in `pqd`, returning the previous instance (whose reference is
    /// released when the caller drops it).
    pub(crate) fn replace_pqd(&self, pqd: Arc<PerQueueData>) -> Option<Arc<PerQueueData>> {
        self.lock().pqd.replace(pqd)
    }

    // -- counters -----------------------------------------------------------

    pub fn inc_paint_count(&self) {
        let notify = {
            let mut st = self.lock();
            st.paint_count += 1;
            st.raise(QueueStatus::PAINT)
        };
        if notify {
            self.wakeup.notify_all();
        }
    }

    pub fn dec_paint_count(&self) {
        let mut st = self.lock();
        st.paint_count = st.paint_count.saturating_sub(1);
        if st.paint_count == 0 {
            st.wake_bits.remove(QueueStatus::PAINT);
        }
    }

    pub fn inc_timer_count(&self) {
        let notify = {
            let mut st = self.lock();
            st.timer_count += 1;
            st.raise(QueueStatus::TIMER)
        };
        if notify {
            self.wakeup.notify_all();
        }
    }

    pub fn dec_timer_count(&self) {
        let mut st = self.lock();
        st.timer_count = st.timer_count.saturating_sub(1);
        if st.timer_count == 0 {
            st.wake_bits.remove(QueueStatus::TIMER);
        }
    }

    // -- last message info --------------------------------------------------

    pub(crate) fn record_retrieved(&self, msg: &Msg) {
        let mut st = self.lock();
        st.msg_time = msg.time;
        st.msg_pos = msg.pt;
        st.extra_info = msg.extra_info;
    }

    pub fn message_time(&self) -> u32 {
        self.lock().msg_time
    }

    pub fn message_pos(&self) -> Point {
        self.lock().msg_pos
    }

    pub fn message_extra_info(&self) -> LParam {
        self.lock().extra_info
    }

    pub fn set_message_extra_info(&self, info: LParam) -> LParam {
        std::mem::replace(&mut self.lock().extra_info, info)
    }

    pub(crate) fn swap_current_hook(&self, hook: Option<HookHandle>) -> Option<HookHandle> {
        std::mem::replace(&mut self.lock().current_hook, hook)
    }

    pub fn current_hook(&self) -> Option<HookHandle> {
        self.lock().current_hook
    }

    // -- teardown -----------------------------------------------------------

    /// Marks the queue dead and force-completes every pending SMSG with a
    /// zero result so no sender stays blocked. Messages this queue was
    /// waiting on are handed to their receivers for cleanup. Returns the
    /// number of senders released.
    pub(crate) fn flush(&self) -> usize {
        let (pending, processing, waiting) = {
            let mut st = self.lock();
            st.destroyed = true;
            st.posted.clear();
            st.quit_code = None;
            st.wake_bits = QueueStatus::empty();
            st.wake_mask = QueueStatus::empty();
            st.pqd = None;
            (
                std::mem::take(&mut st.sm_pending),
                std::mem::take(&mut st.sm_processing),
                std::mem::take(&mut st.sm_waiting),
            )
        };
        let mut released = 0;
        for smsg in pending.iter().chain(processing.iter()) {
            if smsg.reply(0) {
                released += 1;
            }
        }
        for smsg in &waiting {
            smsg.abandon();
        }
        if released > 0 {
            log::info!(
                "queue: {} flushed, released {} blocked sender(s)",
                self.handle,
                released
            );
        }
        released
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Arena;
    use crate::hook::marshal::Representation;
    use crate::message::{WM_KEYDOWN, WM_MOUSEMOVE, WM_USER};
    use std::time::Duration;

    fn queue_with_limit(limit: usize) -> Arc<MessageQueue> {
        let mut arena = Arena::new();
        let h = arena.insert(());
        MessageQueue::new(QueueHandle(h), ThreadId(1), PerQueueData::new(), limit)
    }

    fn queue() -> Arc<MessageQueue> {
        queue_with_limit(64)
    }

    #[test]
    fn post_sets_wake_and_change_bits_for_class() {
        let q = queue();
        q.post(Msg::new(Hwnd(1), WM_KEYDOWN, 0, 0)).unwrap();
        let (change, wake) = q.status();
        assert!(change.contains(QueueStatus::KEY));
        assert!(wake.contains(QueueStatus::KEY));
        assert!(!wake.contains(QueueStatus::POSTMESSAGE));
    }

    #[test]
    fn removing_last_message_clears_wake_bit_but_not_change_bit() {
        let q = queue();
        q.post(Msg::new(Hwnd(1), WM_USER, 0, 0)).unwrap();
        let (key, _) = q.find(Hwnd::NULL, 0, 0).unwrap();
        q.remove(key).unwrap();
        let (change, wake) = q.status();
        assert!(!wake.contains(QueueStatus::POSTMESSAGE));
        assert!(change.contains(QueueStatus::POSTMESSAGE));
    }

    #[test]
    fn queue_status_read_clears_reported_change_bits() {
        let q = queue();
        q.post(Msg::new(Hwnd(1), WM_USER, 0, 0)).unwrap();
        let status = q.get_queue_status(QueueStatus::ALLINPUT);
        assert_eq!(status >> 16, QueueStatus::POSTMESSAGE.bits());
        assert_eq!(status & 0xffff, QueueStatus::POSTMESSAGE.bits());
        let status = q.get_queue_status(QueueStatus::ALLINPUT);
        assert_eq!(status >> 16, 0);
        assert_eq!(status & 0xffff, QueueStatus::POSTMESSAGE.bits());
    }

    #[test]
    fn soft_limit_rejects_growth_but_allows_coalescing() {
        let q = queue_with_limit(1);
        q.post(Msg::new(Hwnd(1), WM_MOUSEMOVE, 0, 1)).unwrap();
        assert_eq!(
            q.post(Msg::new(Hwnd(1), WM_MOUSEMOVE, 0, 2)).unwrap(),
            Pushed::Coalesced(q.find(Hwnd::NULL, 0, 0).unwrap().0)
        );
        assert_eq!(
            q.post(Msg::new(Hwnd(1), WM_USER, 0, 0)),
            Err(UserError::QueueFull { limit: 1 })
        );
        assert_eq!(q.posted_len(), 1);
        // The rejected message left no wake bit behind.
        assert!(!q.status().1.contains(QueueStatus::POSTMESSAGE));
    }

    #[test]
    fn wait_returns_immediately_for_latched_edge() {
        let q = queue();
        q.post(Msg::new(Hwnd(1), WM_USER, 0, 0)).unwrap();
        let started = Instant::now();
        let step = q.wait_step(QueueStatus::POSTMESSAGE, None);
        assert_eq!(step, WaitStep::Ready);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wait_times_out_without_consuming() {
        let q = queue();
        let deadline = Instant::now() + Duration::from_millis(20);
        assert_eq!(q.wait_step(QueueStatus::KEY, Some(deadline)), WaitStep::TimedOut);
        assert!(q.wake_mask().is_empty());
    }

    #[test]
    fn wait_is_woken_by_post_from_another_thread() {
        let q = queue();
        let poster = Arc::clone(&q);
        let t = std::thread::spawn(move || {
            while poster.wake_mask().is_empty() {
                std::thread::yield_now();
            }
            poster.post(Msg::new(Hwnd(1), WM_KEYDOWN, 0, 0)).unwrap();
        });
        let deadline = Instant::now() + Duration::from_secs(10);
        assert_eq!(q.wait_step(QueueStatus::KEY, Some(deadline)), WaitStep::Ready);
        // One-shot wake: the mask is cleared once signalled.
        assert!(q.wake_mask().is_empty());
        t.join().unwrap();
    }

    #[test]
    fn pending_sent_message_interrupts_wait() {
        let q = queue();
        let smsg = SentMessage::new(&q, Hwnd(1), WM_USER, 0, 0, Representation::Ansi);
        assert!(q.enqueue_sent(smsg));
        assert_eq!(q.wait_step(QueueStatus::KEY, None), WaitStep::DrainSent);
    }

    #[test]
    fn draining_last_sent_message_clears_both_send_bits() {
        let q = queue();
        q.enqueue_sent(SentMessage::new(&q, Hwnd(1), WM_USER, 0, 0, Representation::Ansi));
        let mask = QueueStatus::POSTMESSAGE | QueueStatus::SENDMESSAGE;
        assert_eq!(q.wait_step(mask, None), WaitStep::Ready);
        q.begin_processing().unwrap();
        q.end_processing().unwrap();
        let (change, wake) = q.status();
        assert!(!change.contains(QueueStatus::SENDMESSAGE));
        assert!(!wake.contains(QueueStatus::SENDMESSAGE));
        let deadline = Instant::now() + Duration::from_millis(20);
        assert_eq!(q.wait_step(mask, Some(deadline)), WaitStep::TimedOut);
    }

    #[test]
    fn pending_list_is_fifo_and_processing_is_a_stack() {
        let q = queue();
        for i in 0..3 {
            q.enqueue_sent(SentMessage::new(&q, Hwnd(1), WM_USER + i, 0, 0, Representation::Ansi));
        }
        let first = q.begin_processing().unwrap();
        let second = q.begin_processing().unwrap();
        assert_eq!(first.message, WM_USER);
        assert_eq!(second.message, WM_USER + 1);
        assert_eq!(q.processing_top().unwrap().message, WM_USER + 1);
        assert_eq!(q.end_processing().unwrap().message, WM_USER + 1);
        assert_eq!(q.end_processing().unwrap().message, WM_USER);
        assert!(q.status().1.contains(QueueStatus::SENDMESSAGE));
        q.begin_processing().unwrap();
        assert!(!q.status().1.contains(QueueStatus::SENDMESSAGE));
    }

    #[test]
    fn flush_completes_pending_with_zero() {
        let sender = queue();
        let q = queue();
        let smsgs: Vec<_> = (0..3)
            .map(|i| SentMessage::new(&sender, Hwnd(1), WM_USER + i, 0, 0, Representation::Ansi))
            .collect();
        for s in &smsgs {
            q.enqueue_sent(Arc::clone(s));
        }
        assert_eq!(q.flush(), 3);
        for s in &smsgs {
            assert_eq!(s.result(), Some(0));
            assert!(s.flags().contains(SmsgFlags::HAVE_RESULT | SmsgFlags::ALREADY_REPLIED));
        }
        assert!(sender.status().0.contains(QueueStatus::SMRESULT));
        assert!(!q.enqueue_sent(SentMessage::new(&sender, Hwnd(1), WM_USER, 0, 0, Representation::Ansi)));
        assert_eq!(q.post(Msg::new(Hwnd(1), WM_USER, 0, 0)), Err(UserError::QueueDestroyed));
    }

    #[test]
    fn quit_is_picked_after_posted_messages() {
        let q = queue();
        q.post(Msg::new(Hwnd(1), WM_USER, 0, 0)).unwrap();
        q.post_quit(3);
        let mask = QueueStatus::ALLINPUT;
        let first = q.pick_posted(Hwnd::NULL, 0, 0, mask, true).unwrap();
        assert_eq!(first.msg.message, WM_USER);
        assert!(q.status().1.contains(QueueStatus::POSTMESSAGE));
        let quit = q.pick_posted(Hwnd::NULL, 0, 0, mask, true).unwrap();
        assert!(quit.msg.is_quit());
        assert_eq!(quit.msg.wparam, 3);
        assert!(!q.status().1.contains(QueueStatus::POSTMESSAGE));
        assert!(q.pick_posted(Hwnd::NULL, 0, 0, mask, true).is_none());
    }

    #[test]
    fn paint_bit_follows_counter() {
        let q = queue();
        q.inc_paint_count();
        q.inc_paint_count();
        q.dec_paint_count();
        assert!(q.status().1.contains(QueueStatus::PAINT));
        q.dec_paint_count();
        assert!(!q.status().1.contains(QueueStatus::PAINT));
    }
}
