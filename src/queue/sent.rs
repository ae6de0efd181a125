//! Sent messages (SMSG): one in-flight synchronous cross-thread call.
//!
//! Lifecycle: `Pending` (on the receiver's pending FIFO) -> `Processing`
//! (on the receiver's processing stack, while the sender keeps it on its
//! waiting stack) -> `Replied` -> `Freed` (dropped from the last list). The
//! result is written exactly once; `SMSG_ALREADY_REPLIED` turns every later
//! reply attempt into a no-op.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bitflags::bitflags;

use crate::handle::Hwnd;
use crate::hook::marshal::Representation;
use crate::message::{LParam, LResult, WParam};
use crate::queue::MessageQueue;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SmsgFlags: u16 {
        const HAVE_RESULT = 0x0001;
        const WIN32 = 0x0002;
        const UNICODE = 0x0004;
        const RECEIVER_CLEANS = 0x0010;
        const RECEIVED = 0x0020;
        const ALREADY_REPLIED = 0x0080;
    }
}

/// Where an SMSG currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsgState {
    Pending,
    Processing,
    Replied,
}

#[derive(Debug)]
struct SmsgSlot {
    result: LResult,
    flags: SmsgFlags,
}

#[derive(Debug)]
pub struct SentMessage {
    /// Queue waiting for the reply; `None` once it no longer exists.
    sender: Weak<MessageQueue>,
    pub hwnd: Hwnd,
    pub message: u32,
    pub wparam: WParam,
    pub lparam: LParam,
    slot: Mutex<SmsgSlot>,
}

impl SentMessage {
    pub fn new(
        sender: &Arc<MessageQueue>,
        hwnd: Hwnd,
        message: u32,
        wparam: WParam,
        lparam: LParam,
        repr: Representation,
    ) -> Arc<Self> {
        let flags = match repr {
            Representation::Win16 => SmsgFlags::empty(),
            Representation::Ansi => SmsgFlags::WIN32,
            Representation::Unicode => SmsgFlags::WIN32 | SmsgFlags::UNICODE,
        };
        Arc::new(Self {
            sender: Arc::downgrade(sender),
            hwnd,
            message,
            wparam,
            lparam,
            slot: Mutex::new(SmsgSlot { result: 0, flags }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SmsgSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn flags(&self) -> SmsgFlags {
        self.lock().flags
    }

    pub fn state(&self) -> SmsgState {
        let flags = self.flags();
        if flags.contains(SmsgFlags::HAVE_RESULT) {
            SmsgState::Replied
        } else if flags.contains(SmsgFlags::RECEIVED) {
            SmsgState::Processing
        } else {
            SmsgState::Pending
        }
    }

    /// Calling convention the sender used, from the origin flags.
    pub fn representation(&self) -> Representation {
        let flags = self.flags();
        if !flags.contains(SmsgFlags::WIN32) {
            Representation::Win16
        } else if flags.contains(SmsgFlags::UNICODE) {
            Representation::Unicode
        } else {
            Representation::Ansi
        }
    }

    pub fn sender(&self) -> Option<Arc<MessageQueue>> {
        self.sender.upgrade()
    }

    pub fn mark_received(&self) {
        self.lock().flags.insert(SmsgFlags::RECEIVED);
    }

    pub fn result(&self) -> Option<LResult> {
        let slot = self.lock();
        slot.flags
            .contains(SmsgFlags::HAVE_RESULT)
            .then_some(slot.result)
    }

    /// Stores the reply and wakes the sender. Returns false if a reply was
    /// already delivered.
    pub fn reply(&self, result: LResult) -> bool {
        {
            let mut slot = self.lock();
            if slot.flags.contains(SmsgFlags::ALREADY_REPLIED) {
                return false;
            }
            slot.result = result;
            slot.flags.insert(SmsgFlags::HAVE_RESULT | SmsgFlags::ALREADY_REPLIED);
        }
        if let Some(sender) = self.sender() {
            sender.signal_reply();
        }
        true
    }

    /// Sender gave up waiting. The receiver now owns cleanup. Returns the
    /// result instead if the reply won the race.
    pub fn abandon(&self) -> Option<LResult> {
        let mut slot = self.lock();
        if slot.flags.contains(SmsgFlags::HAVE_RESULT) {
            return Some(slot.result);
        }
        slot.flags.insert(SmsgFlags::RECEIVER_CLEANS);
        None
    }

    pub fn receiver_cleans(&self) -> bool {
        self.flags().contains(SmsgFlags::RECEIVER_CLEANS)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
