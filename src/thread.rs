//! Thread control blocks.
//!
//! A `Thread` is the calling thread's view of the subsystem: identity,
//! TLS slots and, once input is initialised, its message queue. Dropping
//! the handle exits the thread, which tears the queue down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{UserError, UserResult};
use crate::handle::ThreadId;
use crate::hook::marshal::Representation;
use crate::queue::MessageQueue;
use crate::system::System;

/// Slots per thread.
pub const TLS_MINIMUM_AVAILABLE: usize = 64;

/// Legacy cooperative task or native preemptive thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadKind {
    Win16,
    Win32,
}

impl ThreadKind {
    /// Convention of hooks and window procedures called on this thread.
    pub fn representation(self) -> Representation {
        match self {
            ThreadKind::Win16 => Representation::Win16,
            ThreadKind::Win32 => Representation::Ansi,
        }
    }
}

// ---------------------------------------------------------------------------
// TLS allocation
// ---------------------------------------------------------------------------

/// Process-wide slot bitmap, kept as two 32-bit halves.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TlsBitmap {
    halves: [u32; 2],
}

impl TlsBitmap {
    pub(crate) fn alloc(&mut self) -> Option<u32> {
        for (half, bits) in self.halves.iter_mut().enumerate() {
            if *bits != u32::MAX {
                let bit = (!*bits).trailing_zeros();
                *bits |= 1 << bit;
                return Some(half as u32 * 32 + bit);
            }
        }
        None
    }

    pub(crate) fn free(&mut self, index: u32) -> bool {
        if !self.is_allocated(index) {
            return false;
        }
        self.halves[(index / 32) as usize] &= !(1 << (index % 32));
        true
    }

    pub(crate) fn is_allocated(&self, index: u32) -> bool {
        (index as usize) < TLS_MINIMUM_AVAILABLE
            && self.halves[(index / 32) as usize] & (1 << (index % 32)) != 0
    }
}

// ---------------------------------------------------------------------------
// Thread data
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct ThreadData {
    pub(crate) id: ThreadId,
    pub(crate) process_id: u32,
    pub(crate) kind: ThreadKind,
    pub(crate) stack_size: usize,
    tls: Mutex<[usize; TLS_MINIMUM_AVAILABLE]>,
    /// Created lazily by `System::init_thread_input`.
    pub(crate) queue: Mutex<Option<Arc<MessageQueue>>>,
    exited: AtomicBool,
}

impl ThreadData {
    pub(crate) fn new(id: ThreadId, process_id: u32, kind: ThreadKind, stack_size: usize) -> Self {
        Self {
            id,
            process_id,
            kind,
            stack_size,
            tls: Mutex::new([0; TLS_MINIMUM_AVAILABLE]),
            queue: Mutex::new(None),
            exited: AtomicBool::new(false),
        }
    }

    fn tls(&self) -> MutexGuard<'_, [usize; TLS_MINIMUM_AVAILABLE]> {
        self.tls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn queue_slot(&self) -> MutexGuard<'_, Option<Arc<MessageQueue>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn clear_tls_slot(&self, index: u32) {
        if let Some(slot) = self.tls().get_mut(index as usize) {
            *slot = 0;
        }
    }

    /// True the first time only.
    pub(crate) fn mark_exited(&self) -> bool {
        !self.exited.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Thread handle
// ---------------------------------------------------------------------------

pub struct Thread {
    system: System,
    data: Arc<ThreadData>,
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.data.id)
            .field("kind", &self.data.kind)
            .finish()
    }
}

impl Thread {
    pub(crate) fn new(system: System, data: Arc<ThreadData>) -> Self {
        Self { system, data }
    }

    pub fn id(&self) -> ThreadId {
        self.data.id
    }

    pub fn process_id(&self) -> u32 {
        self.data.process_id
    }

    pub fn kind(&self) -> ThreadKind {
        self.data.kind
    }

    pub fn stack_size(&self) -> usize {
        self.data.stack_size
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    /// `InitThreadInput`: this thread's queue, created on first use.
    pub fn queue(&self) -> Arc<MessageQueue> {
        self.system.init_thread_input(&self.data)
    }

    pub fn has_queue(&self) -> bool {
        self.data.queue_slot().is_some()
    }

    pub fn tls_get_value(&self, index: u32) -> UserResult<usize> {
        if !self.system.tls_is_allocated(index) {
            return Err(UserError::InvalidTlsIndex(index));
        }
        Ok(self.data.tls()[index as usize])
    }

    pub fn tls_set_value(&self, index: u32, value: usize) -> UserResult<()> {
        if !self.system.tls_is_allocated(index) {
            return Err(UserError::InvalidTlsIndex(index));
        }
        self.data.tls()[index as usize] = value;
        Ok(())
    }

    /// `ExitThread`. Equivalent to dropping the handle.
    pub fn exit(self) {}
}

impl Drop for Thread {
    fn drop(&mut self) {
        self.system.exit_thread(&self.data);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::window::{NoTimers, WindowTable};

    fn system() -> System {
        System::new(Config::default(), WindowTable::new(), Arc::new(NoTimers)).unwrap()
    }

    #[test]
    fn bitmap_fills_low_half_first_then_high() {
        let mut bitmap = TlsBitmap::default();
        for expected in 0..TLS_MINIMUM_AVAILABLE as u32 {
            assert_eq!(bitmap.alloc(), Some(expected));
        }
        assert_eq!(bitmap.alloc(), None);
        assert!(bitmap.free(40));
        assert!(!bitmap.free(40));
        assert_eq!(bitmap.alloc(), Some(40));
        assert!(!bitmap.free(64));
    }

    #[test]
    fn tls_values_are_per_thread() {
        let system = system();
        let a = system.create_thread(ThreadKind::Win32);
        let b = system.create_thread(ThreadKind::Win32);
        let index = system.tls_alloc().unwrap();
        a.tls_set_value(index, 7).unwrap();
        assert_eq!(a.tls_get_value(index), Ok(7));
        assert_eq!(b.tls_get_value(index), Ok(0));
    }

    #[test]
    fn tls_free_clears_slot_everywhere() {
        let system = system();
        let a = system.create_thread(ThreadKind::Win32);
        let index = system.tls_alloc().unwrap();
        a.tls_set_value(index, 9).unwrap();
        assert!(system.tls_free(index));
        assert_eq!(a.tls_get_value(index), Err(UserError::InvalidTlsIndex(index)));
        let again = system.tls_alloc().unwrap();
        assert_eq!(again, index);
        assert_eq!(a.tls_get_value(again), Ok(0));
    }

    #[test]
    fn queue_is_created_lazily_once() {
        let system = system();
        let t = system.create_thread(ThreadKind::Win32);
        assert!(!t.has_queue());
        let q1 = t.queue();
        let q2 = t.queue();
        assert!(Arc::ptr_eq(&q1, &q2));
        assert_eq!(q1.owner(), t.id());
    }

    #[test]
    fn kinds_pick_their_calling_convention() {
        assert_eq!(ThreadKind::Win16.representation(), Representation::Win16);
        assert_eq!(ThreadKind::Win32.representation(), Representation::Ansi);
    }

    #[test]
    fn drop_exits_and_destroys_queue() {
        let system = system();
        let t = system.create_thread(ThreadKind::Win32);
        let id = t.id();
        let q = t.queue();
        drop(t);
        assert!(q.is_destroyed());
        assert!(system.queue(q.handle()).is_none());
        assert_eq!(
            system.thread_queue(id).map(|q| q.handle()),
            Err(UserError::ThreadNotFound(id))
        );
    }
}
