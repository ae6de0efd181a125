//! Process-wide context.
//!
//! `System` owns everything that is shared between threads: the queue list,
//! the thread registry, the hook table, the "last active queue" and the
//! TLS bitmap, all behind one process-wide lock. It is cheap to clone and is
//! passed to every entry point instead of living in statics.
//!
//! Lock order: thread queue slot, then the process-wide lock, then a queue,
//! then a PQD or an SMSG. The process-wide lock is never taken while a
//! queue lock is held.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::Instant;

use encoding_rs::Encoding;

use crate::config::{Config, ConfigError};
use crate::error::{UserError, UserResult};
use crate::handle::{Arena, HookHandle, Hwnd, ModuleId, QueueHandle, ThreadId};
use crate::hook::{HookState, HookTable, HookType};
use crate::message::Point;
use crate::pqd::PerQueueData;
use crate::queue::MessageQueue;
use crate::thread::{Thread, ThreadData, ThreadKind, TlsBitmap};
use crate::window::{NoTimers, TimerService, WindowSystem};

struct Globals {
    queues: Arena<Arc<MessageQueue>>,
    threads: HashMap<ThreadId, Arc<ThreadData>>,
    hooks: HookTable,
    active_queue: Option<QueueHandle>,
    cursor: Point,
    tls: TlsBitmap,
    /// A system WH_JOURNALPLAYBACK hook owns input.
    journal_playback: bool,
}

struct SystemInner {
    config: Config,
    code_page: &'static Encoding,
    windows: Arc<dyn WindowSystem>,
    timers: Arc<dyn TimerService>,
    globals: Mutex<Globals>,
    /// The one PQD every Win16 task shares, while any queue holds it.
    win16_pqd: Mutex<Weak<PerQueueData>>,
    next_thread_id: AtomicU32,
    started: Instant,
}

#[derive(Clone)]
pub struct System {
    inner: Arc<SystemInner>,
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let g = self.globals();
        f.debug_struct("System")
            .field("queues", &g.queues.len())
            .field("threads", &g.threads.len())
            .field("active_queue", &g.active_queue)
            .finish_non_exhaustive()
    }
}

impl System {
    pub fn new(
        config: Config,
        windows: Arc<dyn WindowSystem>,
        timers: Arc<dyn TimerService>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let code_page = config.code_page()?;
        log::debug!(
            "system: process {} using code page {}",
            config.process.id,
            code_page.name()
        );
        Ok(Self {
            inner: Arc::new(SystemInner {
                config,
                code_page,
                windows,
                timers,
                globals: Mutex::new(Globals {
                    queues: Arena::new(),
                    threads: HashMap::new(),
                    hooks: HookTable::new(),
                    active_queue: None,
                    cursor: Point::default(),
                    tls: TlsBitmap::default(),
                    journal_playback: false,
                }),
                win16_pqd: Mutex::new(Weak::new()),
                next_thread_id: AtomicU32::new(1),
                started: Instant::now(),
            }),
        })
    }

    /// A system with no timer subsystem.
    pub fn with_windows(config: Config, windows: Arc<dyn WindowSystem>) -> Result<Self, ConfigError> {
        Self::new(config, windows, Arc::new(NoTimers))
    }

    fn globals(&self) -> MutexGuard<'_, Globals> {
        self.inner
            .globals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn code_page(&self) -> &'static Encoding {
        self.inner.code_page
    }

    pub fn windows(&self) -> &Arc<dyn WindowSystem> {
        &self.inner.windows
    }

    pub fn timers(&self) -> &Arc<dyn TimerService> {
        &self.inner.timers
    }

    /// Milliseconds since the system was created (`GetTickCount`).
    pub fn tick_count(&self) -> u32 {
        self.inner.started.elapsed().as_millis() as u32
    }

    // -- threads ------------------------------------------------------------

    /// Registers a thread control block for the calling OS thread.
    pub fn create_thread(&self, kind: ThreadKind) -> Thread {
        let id = ThreadId(self.inner.next_thread_id.fetch_add(1, Ordering::Relaxed));
        let data = Arc::new(ThreadData::new(
            id,
            self.inner.config.process.id,
            kind,
            self.inner.config.thread.stack_size,
        ));
        self.globals().threads.insert(id, Arc::clone(&data));
        log::debug!("thread: created {} ({:?})", id, kind);
        Thread::new(self.clone(), data)
    }

    /// Starts an OS thread with the configured stack size and runs `f` on
    /// it with a fresh thread control block. The block exits when `f`
    /// returns.
    pub fn spawn_thread<F, R>(&self, kind: ThreadKind, f: F) -> std::io::Result<(ThreadId, JoinHandle<R>)>
    where
        F: FnOnce(&Thread) -> R + Send + 'static,
        R: Send + 'static,
    {
        let thread = self.create_thread(kind);
        let id = thread.id();
        let handle = std::thread::Builder::new()
            .name(format!("userqueue-{}", id.0))
            .stack_size(thread.stack_size())
            .spawn(move || {
                let result = f(&thread);
                drop(thread);
                result
            })?;
        Ok((id, handle))
    }

    pub(crate) fn thread_data(&self, id: ThreadId) -> Option<Arc<ThreadData>> {
        self.globals().threads.get(&id).cloned()
    }

    pub fn thread_ids(&self) -> Vec<ThreadId> {
        let mut ids: Vec<ThreadId> = self.globals().threads.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Thread exit: tears down the queue, then forgets the thread.
    pub(crate) fn exit_thread(&self, data: &Arc<ThreadData>) {
        if !data.mark_exited() {
            return;
        }
        let queue = data.queue_slot().take();
        if let Some(queue) = queue {
            self.cleanup_queue(&queue);
        }
        self.globals().threads.remove(&data.id);
        log::debug!("thread: {} exited", data.id);
    }

    // -- queues -------------------------------------------------------------

    /// `InitThreadInput`.
    pub(crate) fn init_thread_input(&self, data: &Arc<ThreadData>) -> Arc<MessageQueue> {
        let mut slot = data.queue_slot();
        self.fill_queue_slot(data, &mut slot)
    }

    fn fill_queue_slot(
        &self,
        data: &ThreadData,
        slot: &mut Option<Arc<MessageQueue>>,
    ) -> Arc<MessageQueue> {
        if let Some(queue) = slot.as_ref() {
            return Arc::clone(queue);
        }
        let pqd = self.create_pqd(data.kind);
        let max_posted = self.inner.config.queue.max_posted_messages;
        let queue = {
            let mut globals = self.globals();
            let (_, queue) = globals.queues.insert_with(|h| {
                MessageQueue::new(QueueHandle(h), data.id, pqd, max_posted)
            });
            Arc::clone(queue)
        };
        log::debug!("queue: created {} for {}", queue.handle(), data.id);
        *slot = Some(Arc::clone(&queue));
        queue
    }

    /// Win16 tasks share one PQD; Win32 threads get their own.
    fn create_pqd(&self, kind: ThreadKind) -> Arc<PerQueueData> {
        match kind {
            ThreadKind::Win32 => PerQueueData::new(),
            ThreadKind::Win16 => {
                let mut shared = self
                    .inner
                    .win16_pqd
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if let Some(pqd) = shared.upgrade() {
                    return pqd;
                }
                let pqd = PerQueueData::new();
                *shared = Arc::downgrade(&pqd);
                pqd
            }
        }
    }

    /// `QUEUE_Lock`: the queue behind `handle`, if it is still alive.
    pub fn queue(&self, handle: QueueHandle) -> Option<Arc<MessageQueue>> {
        self.globals().queues.get(handle.0).cloned()
    }

    pub fn queue_count(&self) -> usize {
        self.globals().queues.len()
    }

    /// Queue of thread `id`, initialising its input if needed. A thread that
    /// has started exiting no longer gets a queue.
    pub fn thread_queue(&self, id: ThreadId) -> UserResult<Arc<MessageQueue>> {
        let data = self.thread_data(id).ok_or(UserError::ThreadNotFound(id))?;
        // `exit_thread` marks the thread before taking the slot, so checking
        // under the slot lock means any queue made here is seen by it.
        let mut slot = data.queue_slot();
        if data.has_exited() {
            return Err(UserError::ThreadNotFound(id));
        }
        Ok(self.fill_queue_slot(&data, &mut slot))
    }

    /// Queue that owns `hwnd`.
    pub fn queue_for_window(&self, hwnd: Hwnd) -> UserResult<Arc<MessageQueue>> {
        let window = self
            .inner
            .windows
            .resolve_window(hwnd)
            .ok_or(UserError::WindowNotFound(hwnd))?;
        let handle = window.queue.ok_or(UserError::NoQueue(hwnd))?;
        self.queue(handle).ok_or(UserError::NoQueue(hwnd))
    }

    /// Snapshot of the queue list. A node with a bad magic number ends the
    /// walk.
    pub(crate) fn live_queues(&self) -> Vec<Arc<MessageQueue>> {
        let globals = self.globals();
        let mut out = Vec::with_capacity(globals.queues.len());
        for (handle, queue) in globals.queues.iter() {
            if !queue.is_valid() {
                log::error!("queue: list corrupted at {}, walk aborted", handle);
                break;
            }
            out.push(Arc::clone(queue));
        }
        out
    }

    pub fn active_queue(&self) -> Option<QueueHandle> {
        self.globals().active_queue
    }

    /// Returns the previous active queue. A handle to a queue that is gone
    /// is refused.
    pub fn set_active_queue(&self, queue: Option<QueueHandle>) -> UserResult<Option<QueueHandle>> {
        let mut globals = self.globals();
        if let Some(handle) = queue {
            if globals.queues.get(handle.0).is_none() {
                return Err(UserError::InvalidHandle);
            }
        }
        Ok(std::mem::replace(&mut globals.active_queue, queue))
    }

    pub fn inc_paint_count(&self, queue: QueueHandle) -> bool {
        self.queue(queue).map(|q| q.inc_paint_count()).is_some()
    }

    pub fn dec_paint_count(&self, queue: QueueHandle) -> bool {
        self.queue(queue).map(|q| q.dec_paint_count()).is_some()
    }

    pub fn inc_timer_count(&self, queue: QueueHandle) -> bool {
        self.queue(queue).map(|q| q.inc_timer_count()).is_some()
    }

    pub fn dec_timer_count(&self, queue: QueueHandle) -> bool {
        self.queue(queue).map(|q| q.dec_timer_count()).is_some()
    }

    /// Queue teardown, in dependency order: active queue pointer, popup
    /// menu, timers, hooks, windows, then the queue itself.
    fn cleanup_queue(&self, queue: &Arc<MessageQueue>) {
        let handle = queue.handle();
        {
            let mut globals = self.globals();
            if globals.active_queue == Some(handle) {
                let next = globals
                    .queues
                    .iter()
                    .map(|(h, _)| QueueHandle(h))
                    .find(|h| *h != handle);
                globals.active_queue = next;
                log::debug!("queue: active queue moved from {} to {:?}", handle, next);
            }
        }
        self.inner.windows.release_popup_menu(handle);
        let timers = self.inner.timers.cancel_all_timers_for_queue(handle);
        let hooks = self.with_hooks(|hooks| hooks.remove_queue_hooks(handle));
        let windows = self.inner.windows.detach_queue(handle);
        self.globals().queues.remove(handle.0);
        queue.flush();
        log::debug!(
            "queue: deleted {} ({} timers, {} hooks, {} windows released)",
            handle,
            timers,
            hooks,
            windows
        );
    }

    // -- input --------------------------------------------------------------

    /// `AttachThreadInput`: `from` starts sharing `to`'s input state, or
    /// gets a private one back.
    pub fn attach_thread_input(&self, from: ThreadId, to: ThreadId, attach: bool) -> UserResult<()> {
        if from == to {
            return Err(UserError::AttachToSelf);
        }
        if self.with_hooks(|hooks| hooks.has_system_hook(HookType::JournalRecord)) {
            return Err(UserError::JournalRecordActive);
        }
        let from_kind = self.thread_data(from).ok_or(UserError::ThreadNotFound(from))?.kind;
        let source = self.thread_queue(from)?;
        let target = self.thread_queue(to)?;
        let shared = target.pqd().ok_or(UserError::QueueDestroyed)?;
        let current = source.pqd().ok_or(UserError::QueueDestroyed)?;

        if attach {
            if Arc::ptr_eq(&current, &shared) {
                return Ok(());
            }
            drop(current);
            source.replace_pqd(shared);
            log::info!("input: {} attached to {}", from, to);
        } else {
            if !Arc::ptr_eq(&current, &shared) {
                return Err(UserError::NotAttached);
            }
            drop(current);
            source.replace_pqd(self.create_pqd(from_kind));
            log::info!("input: {} detached from {}", from, to);
        }
        Ok(())
    }

    pub fn cursor_pos(&self) -> Point {
        self.globals().cursor
    }

    pub fn set_cursor_pos(&self, pt: Point) {
        self.globals().cursor = pt;
    }

    /// Hardware input is suppressed while journal playback is installed.
    pub fn input_disabled(&self) -> bool {
        self.globals().journal_playback
    }

    // -- hooks --------------------------------------------------------------

    /// Runs `f` on the hook table under the process-wide lock and tracks
    /// journal playback coming and going.
    pub(crate) fn with_hooks<R>(&self, f: impl FnOnce(&mut HookTable) -> R) -> R {
        let mut globals = self.globals();
        let result = f(&mut globals.hooks);
        let playback = globals.hooks.has_system_hook(HookType::JournalPlayback);
        if playback != globals.journal_playback {
            globals.journal_playback = playback;
            if playback {
                log::info!("input: journal playback installed, hardware input disabled");
            } else {
                log::info!("input: journal playback removed, hardware input enabled");
            }
        }
        result
    }

    pub(crate) fn finish_hook_call(&self, hook: HookHandle) -> bool {
        self.with_hooks(|hooks| hooks.end_call(hook))
    }

    /// `UnhookWindowsHookEx`. False for an unknown or already removed hook.
    pub fn unhook_windows_hook_ex(&self, hook: HookHandle) -> bool {
        match self.with_hooks(|hooks| hooks.remove(hook)) {
            Some(HookState::PendingRemoval) => {
                log::info!("hook: {} in use, removal deferred", hook);
                true
            }
            Some(_) => {
                log::info!("hook: removed {}", hook);
                true
            }
            None => false,
        }
    }

    pub fn hook_state(&self, hook: HookHandle) -> HookState {
        self.with_hooks(|hooks| hooks.state(hook))
    }

    /// Hooks a walk for `id` from `thread`'s queue would visit, in order.
    /// `None` walks the system chain only.
    pub fn hook_chain(&self, id: HookType, thread: Option<ThreadId>) -> UserResult<Vec<HookHandle>> {
        let queue = match thread {
            Some(tid) => Some(self.thread_queue(tid)?.handle()),
            None => None,
        };
        Ok(self.with_hooks(|hooks| hooks.chain(id, queue)))
    }

    /// `FreeModuleHooks`: removes every hook owned by `module`.
    pub fn free_module_hooks(&self, module: ModuleId) -> usize {
        let count = self.with_hooks(|hooks| hooks.remove_module_hooks(module));
        if count > 0 {
            log::info!("hook: freed {} hook(s) of module {}", count, module.0);
        }
        count
    }

    // -- TLS ----------------------------------------------------------------

    pub fn tls_alloc(&self) -> UserResult<u32> {
        self.globals().tls.alloc().ok_or(UserError::TlsExhausted)
    }

    /// Frees `index` and zeroes it in every live thread.
    pub fn tls_free(&self, index: u32) -> bool {
        let threads: Vec<Arc<ThreadData>> = {
            let mut globals = self.globals();
            if !globals.tls.free(index) {
                return false;
            }
            globals.threads.values().cloned().collect()
        };
        for thread in threads {
            thread.clear_tls_slot(index);
        }
        true
    }

    pub(crate) fn tls_is_allocated(&self, index: u32) -> bool {
        self.globals().tls.is_allocated(index)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
