//! Hook chains.
//!
//! Every hook id has one system-wide chain and any number of queue-local
//! chains. A walk from a queue starts at its local head (or the system head
//! when it has none) and, when the local chain runs out, continues into the
//! system chain: local before global, most recently installed first.
//!
//! Entries move through `Active -> PendingRemoval -> Freed`. Unhooking an
//! entry whose procedure is running only marks it; the unlink happens when
//! the last invocation returns. Walks skip anything that is not `Active`.

pub mod marshal;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{UserError, UserResult};
use crate::handle::{Arena, HookHandle, ModuleId, QueueHandle, ThreadId};
use crate::message::{LResult, Msg};
use crate::thread::Thread;

use marshal::{DebugHookInfo, HookData, HookParams, Representation};

// ---------------------------------------------------------------------------
// Hook ids and codes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    MsgFilter = -1,
    JournalRecord = 0,
    JournalPlayback = 1,
    Keyboard = 2,
    GetMessage = 3,
    CallWndProc = 4,
    Cbt = 5,
    SysMsgFilter = 6,
    Mouse = 7,
    Hardware = 8,
    Debug = 9,
    Shell = 10,
    ForegroundIdle = 11,
    CallWndProcRet = 12,
    KeyboardLl = 13,
    MouseLl = 14,
}

pub const WH_MIN: i32 = HookType::MsgFilter as i32;
pub const WH_MAX: i32 = HookType::MouseLl as i32;
const NB_HOOKS: usize = (WH_MAX - WH_MIN + 1) as usize;

const ALL_HOOKS: [HookType; NB_HOOKS] = [
    HookType::MsgFilter,
    HookType::JournalRecord,
    HookType::JournalPlayback,
    HookType::Keyboard,
    HookType::GetMessage,
    HookType::CallWndProc,
    HookType::Cbt,
    HookType::SysMsgFilter,
    HookType::Mouse,
    HookType::Hardware,
    HookType::Debug,
    HookType::Shell,
    HookType::ForegroundIdle,
    HookType::CallWndProcRet,
    HookType::KeyboardLl,
    HookType::MouseLl,
];

impl HookType {
    pub fn from_raw(id: i32) -> Option<Self> {
        if !(WH_MIN..=WH_MAX).contains(&id) {
            return None;
        }
        Some(ALL_HOOKS[(id - WH_MIN) as usize])
    }

    pub fn raw(self) -> i32 {
        self as i32
    }

    fn index(self) -> usize {
        (self.raw() - WH_MIN) as usize
    }

    /// Ids that can only be installed with no target thread.
    pub fn is_global_only(self) -> bool {
        matches!(
            self,
            HookType::JournalRecord
                | HookType::JournalPlayback
                | HookType::SysMsgFilter
                | HookType::KeyboardLl
                | HookType::MouseLl
        )
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.raw())
    }
}

pub const HC_ACTION: i32 = 0;
pub const HC_GETNEXT: i32 = 1;
pub const HC_SKIP: i32 = 2;
pub const HC_NOREMOVE: i32 = 3;
pub const HC_SYSMODALON: i32 = 4;
pub const HC_SYSMODALOFF: i32 = 5;

pub const HCBT_MOVESIZE: i32 = 0;
pub const HCBT_MINMAX: i32 = 1;
pub const HCBT_QS: i32 = 2;
pub const HCBT_CREATEWND: i32 = 3;
pub const HCBT_DESTROYWND: i32 = 4;
pub const HCBT_ACTIVATE: i32 = 5;
pub const HCBT_CLICKSKIPPED: i32 = 6;
pub const HCBT_KEYSKIPPED: i32 = 7;
pub const HCBT_SYSCOMMAND: i32 = 8;
pub const HCBT_SETFOCUS: i32 = 9;

/// `CallMsgFilter` codes.
pub const MSGF_DIALOGBOX: i32 = 0;
pub const MSGF_MENU: i32 = 2;

// ---------------------------------------------------------------------------
// Procedures
// ---------------------------------------------------------------------------

pub type HookFn = dyn Fn(&HookContext<'_>, i32, &mut HookParams) -> LResult + Send + Sync;

/// A hook procedure plus the parameter layout it expects.
#[derive(Clone)]
pub struct HookProcedure {
    repr: Representation,
    func: Arc<HookFn>,
}

impl HookProcedure {
    pub fn new<F>(repr: Representation, func: F) -> Self
    where
        F: Fn(&HookContext<'_>, i32, &mut HookParams) -> LResult + Send + Sync + 'static,
    {
        Self {
            repr,
            func: Arc::new(func),
        }
    }

    pub fn win16<F>(func: F) -> Self
    where
        F: Fn(&HookContext<'_>, i32, &mut HookParams) -> LResult + Send + Sync + 'static,
    {
        Self::new(Representation::Win16, func)
    }

    pub fn ansi<F>(func: F) -> Self
    where
        F: Fn(&HookContext<'_>, i32, &mut HookParams) -> LResult + Send + Sync + 'static,
    {
        Self::new(Representation::Ansi, func)
    }

    pub fn unicode<F>(func: F) -> Self
    where
        F: Fn(&HookContext<'_>, i32, &mut HookParams) -> LResult + Send + Sync + 'static,
    {
        Self::new(Representation::Unicode, func)
    }

    pub fn repr(&self) -> Representation {
        self.repr
    }
}

impl fmt::Debug for HookProcedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookProcedure")
            .field("repr", &self.repr)
            .finish_non_exhaustive()
    }
}

/// What a running hook procedure knows about its own invocation.
pub struct HookContext<'a> {
    thread: &'a Thread,
    hook: HookHandle,
}

impl<'a> HookContext<'a> {
    pub fn thread(&self) -> &'a Thread {
        self.thread
    }

    pub fn hook(&self) -> HookHandle {
        self.hook
    }

    /// `CallNextHookEx` from inside this procedure.
    pub fn call_next(&self, code: i32, params: &mut HookParams) -> LResult {
        self.thread.call_next_hook_ex(self.hook, code, params)
    }
}

// ---------------------------------------------------------------------------
// Hook table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Active,
    PendingRemoval,
    Freed,
}

#[derive(Debug)]
struct HookEntry {
    id: HookType,
    proc: HookProcedure,
    module: ModuleId,
    /// `None` for a system-wide hook.
    queue: Option<QueueHandle>,
    installer: ThreadId,
    next: Option<HookHandle>,
    state: HookState,
    in_use: u32,
}

type ChainHeads = [Option<HookHandle>; NB_HOOKS];

/// All hook chains of the process. Lives under the process-wide lock.
#[derive(Debug, Default)]
pub(crate) struct HookTable {
    entries: Arena<HookEntry>,
    system_heads: ChainHeads,
    queue_heads: HashMap<QueueHandle, ChainHeads>,
}

impl HookTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn heads(&self, queue: Option<QueueHandle>) -> Option<&ChainHeads> {
        match queue {
            None => Some(&self.system_heads),
            Some(q) => self.queue_heads.get(&q),
        }
    }

    fn heads_mut(&mut self, queue: Option<QueueHandle>) -> &mut ChainHeads {
        match queue {
            None => &mut self.system_heads,
            Some(q) => self.queue_heads.entry(q).or_insert([None; NB_HOOKS]),
        }
    }

    /// Prepends a new entry to the (id, queue) chain.
    pub(crate) fn insert(
        &mut self,
        id: HookType,
        proc: HookProcedure,
        module: ModuleId,
        queue: Option<QueueHandle>,
        installer: ThreadId,
    ) -> HookHandle {
        let next = self.heads_mut(queue)[id.index()];
        let handle = HookHandle(self.entries.insert(HookEntry {
            id,
            proc,
            module,
            queue,
            installer,
            next,
            state: HookState::Active,
            in_use: 0,
        }));
        self.heads_mut(queue)[id.index()] = Some(handle);
        handle
    }

    pub(crate) fn state(&self, hook: HookHandle) -> HookState {
        self.entries
            .get(hook.0)
            .map_or(HookState::Freed, |e| e.state)
    }

    /// Where a walk goes after `entry`: its successor, or the system chain
    /// once a local chain runs out.
    fn successor(&self, entry: &HookEntry) -> Option<HookHandle> {
        match entry.next {
            Some(next) => Some(next),
            None if entry.queue.is_some() => self.system_heads[entry.id.index()],
            None => None,
        }
    }

    /// First `Active` entry from `start` onwards.
    fn first_active(&self, start: Option<HookHandle>) -> Option<HookHandle> {
        let mut cursor = start;
        while let Some(h) = cursor {
            let entry = self.entries.get(h.0)?;
            if entry.state == HookState::Active {
                return Some(h);
            }
            cursor = self.successor(entry);
        }
        None
    }

    /// `HOOK_GetHook`: where a walk for `id` from `queue` starts.
    pub(crate) fn first_hook(&self, id: HookType, queue: Option<QueueHandle>) -> Option<HookHandle> {
        match self.heads(queue).and_then(|h| h[id.index()]) {
            Some(local) => self.first_active(Some(local)),
            None => self.first_active(self.system_heads[id.index()]),
        }
    }

    /// Entry after `hook` in the walk.
    pub(crate) fn next_hook(&self, hook: HookHandle) -> Option<HookHandle> {
        let entry = self.entries.get(hook.0)?;
        self.first_active(self.successor(entry))
    }

    /// Any active system-wide hook of `id`.
    pub(crate) fn has_system_hook(&self, id: HookType) -> bool {
        self.first_active(self.system_heads[id.index()]).is_some()
    }

    /// Marks `hook` in use and hands out its procedure. `None` unless the
    /// entry is still `Active`.
    pub(crate) fn begin_call(&mut self, hook: HookHandle) -> Option<HookProcedure> {
        let entry = self.entries.get_mut(hook.0)?;
        if entry.state != HookState::Active {
            return None;
        }
        entry.in_use += 1;
        Some(entry.proc.clone())
    }

    /// Ends one invocation. Returns true if a pending removal was finalised.
    pub(crate) fn end_call(&mut self, hook: HookHandle) -> bool {
        let Some(entry) = self.entries.get_mut(hook.0) else {
            return false;
        };
        entry.in_use = entry.in_use.saturating_sub(1);
        if entry.state == HookState::PendingRemoval && entry.in_use == 0 {
            self.unlink(hook);
            return true;
        }
        false
    }

    /// `UnhookWindowsHookEx`. Returns the new state, or `None` when `hook`
    /// was not an active entry.
    pub(crate) fn remove(&mut self, hook: HookHandle) -> Option<HookState> {
        let entry = self.entries.get_mut(hook.0)?;
        if entry.state != HookState::Active {
            return None;
        }
        if entry.in_use > 0 {
            entry.state = HookState::PendingRemoval;
            return Some(HookState::PendingRemoval);
        }
        self.unlink(hook);
        Some(HookState::Freed)
    }

    fn unlink(&mut self, hook: HookHandle) {
        let Some(entry) = self.entries.get(hook.0) else {
            return;
        };
        let (id, queue, next) = (entry.id, entry.queue, entry.next);
        let head = self.heads(queue).and_then(|h| h[id.index()]);
        if head == Some(hook) {
            self.heads_mut(queue)[id.index()] = next;
        } else {
            let mut cursor = head;
            while let Some(h) = cursor {
                let Some(e) = self.entries.get_mut(h.0) else {
                    break;
                };
                if e.next == Some(hook) {
                    e.next = next;
                    break;
                }
                cursor = e.next;
            }
        }
        self.entries.remove(hook.0);
        if let Some(q) = queue {
            if self.queue_heads.get(&q).is_some_and(|h| h.iter().all(Option::is_none)) {
                self.queue_heads.remove(&q);
            }
        }
    }

    fn remove_where(&mut self, pred: impl Fn(&HookEntry) -> bool) -> usize {
        let doomed: Vec<HookHandle> = self
            .entries
            .iter()
            .filter(|(_, e)| e.state == HookState::Active && pred(e))
            .map(|(h, _)| HookHandle(h))
            .collect();
        doomed.into_iter().filter(|h| self.remove(*h).is_some()).count()
    }

    /// Every hook installed on `queue`'s local chains.
    pub(crate) fn remove_queue_hooks(&mut self, queue: QueueHandle) -> usize {
        self.remove_where(|e| e.queue == Some(queue))
    }

    /// `FreeModuleHooks`.
    pub(crate) fn remove_module_hooks(&mut self, module: ModuleId) -> usize {
        self.remove_where(|e| e.module == module)
    }

    /// Handles of the walk for (id, queue), in call order.
    pub(crate) fn chain(&self, id: HookType, queue: Option<QueueHandle>) -> Vec<HookHandle> {
        let mut out = Vec::new();
        let mut cursor = self.first_hook(id, queue);
        while let Some(h) = cursor {
            out.push(h);
            cursor = self.next_hook(h);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Installing and calling
// ---------------------------------------------------------------------------

impl Thread {
    /// `SetWindowsHookEx`. `target` of `None` installs a system-wide hook.
    pub fn set_windows_hook_ex(
        &self,
        id: i32,
        proc: HookProcedure,
        module: ModuleId,
        target: Option<ThreadId>,
    ) -> UserResult<HookHandle> {
        let kind = HookType::from_raw(id).ok_or(UserError::InvalidHookId(id))?;
        let queue = match target {
            None => None,
            Some(_) if kind.is_global_only() => return Err(UserError::GlobalOnlyHook(id)),
            Some(tid) => Some(self.system().thread_queue(tid)?.handle()),
        };
        let repr = proc.repr();
        let hook = self.system().with_hooks(|hooks| {
            hooks.insert(kind, proc, module, queue, self.id())
        });
        log::info!(
            "hook: installed {} {} ({:?}) on {}",
            hook,
            kind,
            repr,
            queue.map_or_else(|| "system".to_string(), |q| q.to_string())
        );
        Ok(hook)
    }

    /// `HOOK_CallHooks`: runs the chain for `id` as seen from this thread's
    /// queue. Returns 0 when nothing is installed.
    pub fn call_hooks(&self, id: HookType, code: i32, params: &mut HookParams) -> LResult {
        let queue = self.queue().handle();
        let Some(first) = self
            .system()
            .with_hooks(|hooks| hooks.first_hook(id, Some(queue)))
        else {
            return 0;
        };
        if id != HookType::Debug && self.debug_hook_vetoes(first, id, code, params) {
            log::debug!("hook: {} call skipped by WH_DEBUG", id);
            return 0;
        }
        self.call_hook(first, code, params)
    }

    /// `CallNextHookEx`.
    pub fn call_next_hook_ex(&self, hook: HookHandle, code: i32, params: &mut HookParams) -> LResult {
        match self.system().with_hooks(|hooks| hooks.next_hook(hook)) {
            Some(next) => self.call_hook(next, code, params),
            None => 0,
        }
    }

    /// `CallMsgFilter`: WH_SYSMSGFILTER first, then WH_MSGFILTER. True when
    /// a hook asked for the message to be skipped.
    pub fn call_msg_filter(&self, msg: &Msg, code: i32) -> bool {
        let code_page = self.system().code_page();
        let mut params =
            HookParams::from_ansi(self.kind().representation(), 0, HookData::Msg(*msg), code_page);
        if self.call_hooks(HookType::SysMsgFilter, code, &mut params) != 0 {
            return true;
        }
        self.call_hooks(HookType::MsgFilter, code, &mut params) != 0
    }

    /// `HOOK_CallHook`: runs one entry, converting the parameter block to
    /// the entry's layout and copying outputs back afterwards.
    fn call_hook(&self, hook: HookHandle, code: i32, params: &mut HookParams) -> LResult {
        let system = self.system();
        let Some(proc) = system.with_hooks(|hooks| hooks.begin_call(hook)) else {
            return 0;
        };
        let queue = self.queue();
        let previous = queue.swap_current_hook(Some(hook));
        let ctx = HookContext { thread: self, hook };

        let result = if proc.repr == params.repr() {
            (proc.func)(&ctx, code, params)
        } else {
            let code_page = system.code_page();
            let mut converted = params.convert(proc.repr, code_page);
            let result = (proc.func)(&ctx, code, &mut converted);
            params.merge_outputs(&converted, code_page);
            result
        };

        queue.swap_current_hook(previous);
        if system.finish_hook_call(hook) {
            log::debug!("hook: deferred removal of {} completed", hook);
        }
        result
    }

    fn debug_hook_vetoes(
        &self,
        target: HookHandle,
        id: HookType,
        code: i32,
        params: &HookParams,
    ) -> bool {
        let system = self.system();
        let queue = self.queue().handle();
        let (debug, installer) = system.with_hooks(|hooks| {
            let debug = hooks.first_hook(HookType::Debug, Some(queue));
            let installer = hooks.entries.get(target.0).map(|e| e.installer);
            (debug, installer)
        });
        let Some(debug) = debug else {
            return false;
        };
        let info = DebugHookInfo {
            thread_id: self.id().0,
            thread_installer: installer.map_or(0, |t| t.0),
            lparam: params.lparam_value(),
            wparam: params.wparam(),
            code,
        };
        let mut dbg = HookParams::from_ansi(
            self.kind().representation(),
            id.raw() as usize,
            HookData::Debug(info),
            system.code_page(),
        );
        self.call_hook(debug, HC_ACTION, &mut dbg) != 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::marshal::{AnsiString, CbtCreateWnd, ClassName, CreateStruct};
    use super::*;
    use crate::config::Config;
    use crate::system::System;
    use crate::thread::ThreadKind;
    use crate::window::WindowTable;
    use std::sync::Mutex;

    fn noop() -> HookProcedure {
        HookProcedure::ansi(|_, _, _| 0)
    }

    fn queue_handle(arena: &mut Arena<()>) -> QueueHandle {
        QueueHandle(arena.insert(()))
    }

    #[test]
    fn hook_ids_round_trip_and_reject_out_of_range() {
        assert_eq!(HookType::from_raw(-1), Some(HookType::MsgFilter));
        assert_eq!(HookType::from_raw(14), Some(HookType::MouseLl));
        assert_eq!(HookType::from_raw(-2), None);
        assert_eq!(HookType::from_raw(15), None);
        for id in WH_MIN..=WH_MAX {
            assert_eq!(HookType::from_raw(id).map(HookType::raw), Some(id));
        }
    }

    #[test]
    fn journal_and_sysmsgfilter_are_global_only() {
        assert!(HookType::JournalRecord.is_global_only());
        assert!(HookType::JournalPlayback.is_global_only());
        assert!(HookType::SysMsgFilter.is_global_only());
        assert!(!HookType::Keyboard.is_global_only());
    }

    #[test]
    fn walk_is_local_lifo_then_global() {
        let mut arena = Arena::new();
        let q = queue_handle(&mut arena);
        let mut table = HookTable::new();
        let h1 = table.insert(HookType::Keyboard, noop(), ModuleId(1), None, ThreadId(1));
        let h2 = table.insert(HookType::Keyboard, noop(), ModuleId(1), Some(q), ThreadId(1));
        let h3 = table.insert(HookType::Keyboard, noop(), ModuleId(1), Some(q), ThreadId(1));
        assert_eq!(table.chain(HookType::Keyboard, Some(q)), vec![h3, h2, h1]);
    }

    #[test]
    fn table_debug_shows_entries() {
        let mut table = HookTable::new();
        table.insert(HookType::Shell, noop(), ModuleId(4), None, ThreadId(1));
        let text = format!("{table:?}");
        assert!(text.contains("Shell"));
        assert!(text.contains("ModuleId(4)"));
    }

    #[test]
    fn queue_without_local_chain_sees_system_chain() {
        let mut arena = Arena::new();
        let q = queue_handle(&mut arena);
        let other = queue_handle(&mut arena);
        let mut table = HookTable::new();
        let global = table.insert(HookType::Mouse, noop(), ModuleId(1), None, ThreadId(1));
        table.insert(HookType::Mouse, noop(), ModuleId(1), Some(other), ThreadId(1));
        assert_eq!(table.chain(HookType::Mouse, Some(q)), vec![global]);
        assert!(table.chain(HookType::Keyboard, Some(q)).is_empty());
    }

    #[test]
    fn removal_while_in_use_is_deferred() {
        let mut table = HookTable::new();
        let h = table.insert(HookType::Cbt, noop(), ModuleId(1), None, ThreadId(1));
        let h2 = table.insert(HookType::Cbt, noop(), ModuleId(1), None, ThreadId(1));
        assert!(table.begin_call(h).is_some());
        assert_eq!(table.remove(h), Some(HookState::PendingRemoval));
        assert_eq!(table.state(h), HookState::PendingRemoval);
        // The walk skips it, and it cannot be entered again.
        assert_eq!(table.chain(HookType::Cbt, None), vec![h2]);
        assert!(table.begin_call(h).is_none());
        // Second unhook is a protocol violation.
        assert_eq!(table.remove(h), None);
        assert!(table.end_call(h));
        assert_eq!(table.state(h), HookState::Freed);
        assert_eq!(table.chain(HookType::Cbt, None), vec![h2]);
    }

    #[test]
    fn pending_entry_in_middle_is_skipped() {
        let mut arena = Arena::new();
        let q = queue_handle(&mut arena);
        let mut table = HookTable::new();
        let h1 = table.insert(HookType::GetMessage, noop(), ModuleId(1), None, ThreadId(1));
        let h2 = table.insert(HookType::GetMessage, noop(), ModuleId(1), Some(q), ThreadId(1));
        let h3 = table.insert(HookType::GetMessage, noop(), ModuleId(1), Some(q), ThreadId(1));
        table.begin_call(h2);
        table.remove(h2);
        assert_eq!(table.chain(HookType::GetMessage, Some(q)), vec![h3, h1]);
        assert_eq!(table.next_hook(h3), Some(h1));
    }

    #[test]
    fn immediate_removal_unlinks_middle_entry() {
        let mut table = HookTable::new();
        let a = table.insert(HookType::Shell, noop(), ModuleId(1), None, ThreadId(1));
        let b = table.insert(HookType::Shell, noop(), ModuleId(1), None, ThreadId(1));
        let c = table.insert(HookType::Shell, noop(), ModuleId(1), None, ThreadId(1));
        assert_eq!(table.remove(b), Some(HookState::Freed));
        assert_eq!(table.chain(HookType::Shell, None), vec![c, a]);
        assert_eq!(table.remove(b), None);
    }

    #[test]
    fn module_and_queue_sweeps() {
        let mut arena = Arena::new();
        let q = queue_handle(&mut arena);
        let mut table = HookTable::new();
        table.insert(HookType::Keyboard, noop(), ModuleId(7), None, ThreadId(1));
        table.insert(HookType::Mouse, noop(), ModuleId(7), Some(q), ThreadId(1));
        let keep = table.insert(HookType::Mouse, noop(), ModuleId(8), None, ThreadId(1));
        assert_eq!(table.remove_queue_hooks(q), 1);
        assert!(!table.queue_heads.contains_key(&q));
        assert_eq!(table.remove_module_hooks(ModuleId(7)), 1);
        assert_eq!(table.chain(HookType::Mouse, Some(q)), vec![keep]);
        assert!(table.chain(HookType::Keyboard, None).is_empty());
    }

    #[test]
    fn system_hook_presence() {
        let mut arena = Arena::new();
        let q = queue_handle(&mut arena);
        let mut table = HookTable::new();
        assert!(!table.has_system_hook(HookType::JournalPlayback));
        let h = table.insert(HookType::JournalPlayback, noop(), ModuleId(1), None, ThreadId(1));
        table.insert(HookType::Keyboard, noop(), ModuleId(1), Some(q), ThreadId(1));
        assert!(table.has_system_hook(HookType::JournalPlayback));
        assert!(!table.has_system_hook(HookType::Keyboard));
        table.remove(h);
        assert!(!table.has_system_hook(HookType::JournalPlayback));
    }

    // -- calls through a live system ---------------------------------------

    fn system() -> System {
        System::with_windows(Config::default(), WindowTable::new()).unwrap()
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> HookProcedure {
        let log = Arc::clone(log);
        HookProcedure::ansi(move |ctx, code, params| {
            log.lock().unwrap().push(name);
            ctx.call_next(code, params)
        })
    }

    #[test]
    fn call_next_walks_local_then_system() {
        let system = system();
        let t = system.create_thread(ThreadKind::Win32);
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = HookType::Cbt.raw();
        let h1 = t.set_windows_hook_ex(id, recorder("H1", &log), ModuleId(1), None).unwrap();
        let h2 = t.set_windows_hook_ex(id, recorder("H2", &log), ModuleId(1), Some(t.id())).unwrap();
        let h3 = t.set_windows_hook_ex(id, recorder("H3", &log), ModuleId(1), Some(t.id())).unwrap();

        assert_eq!(system.hook_chain(HookType::Cbt, Some(t.id())).unwrap(), vec![h3, h2, h1]);
        let mut params = HookParams::value(Representation::Ansi, 0, 0);
        t.call_hooks(HookType::Cbt, HCBT_ACTIVATE, &mut params);
        assert_eq!(*log.lock().unwrap(), vec!["H3", "H2", "H1"]);
        assert_eq!(t.queue().current_hook(), None);
    }

    #[test]
    fn install_validation() {
        let system = system();
        let t = system.create_thread(ThreadKind::Win32);
        assert_eq!(
            t.set_windows_hook_ex(42, noop(), ModuleId(1), None),
            Err(UserError::InvalidHookId(42))
        );
        assert_eq!(
            t.set_windows_hook_ex(HookType::JournalRecord.raw(), noop(), ModuleId(1), Some(t.id())),
            Err(UserError::GlobalOnlyHook(0))
        );
        assert_eq!(
            t.set_windows_hook_ex(HookType::Mouse.raw(), noop(), ModuleId(1), Some(ThreadId(999))),
            Err(UserError::ThreadNotFound(ThreadId(999)))
        );
    }

    #[test]
    fn hook_can_unhook_itself_mid_call() {
        let system = system();
        let t = system.create_thread(ThreadKind::Win32);
        let observed = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&observed);
        let hook = t
            .set_windows_hook_ex(
                HookType::Shell.raw(),
                HookProcedure::ansi(move |ctx, _, _| {
                    let system = ctx.thread().system();
                    assert!(system.unhook_windows_hook_ex(ctx.hook()));
                    *seen.lock().unwrap() = Some(system.hook_state(ctx.hook()));
                    1
                }),
                ModuleId(1),
                Some(t.id()),
            )
            .unwrap();

        let mut params = HookParams::value(Representation::Ansi, 0, 0);
        assert_eq!(t.call_hooks(HookType::Shell, HC_ACTION, &mut params), 1);
        assert_eq!(*observed.lock().unwrap(), Some(HookState::PendingRemoval));
        assert_eq!(system.hook_state(hook), HookState::Freed);
        assert_eq!(t.call_hooks(HookType::Shell, HC_ACTION, &mut params), 0);
    }

    #[test]
    fn debug_hook_can_veto_a_chain() {
        let system = system();
        let t = system.create_thread(ThreadKind::Win32);
        let calls = Arc::new(Mutex::new(Vec::new()));
        t.set_windows_hook_ex(HookType::Mouse.raw(), recorder("mouse", &calls), ModuleId(1), Some(t.id()))
            .unwrap();
        let veto = Arc::new(Mutex::new(true));
        let flag = Arc::clone(&veto);
        t.set_windows_hook_ex(
            HookType::Debug.raw(),
            HookProcedure::ansi(move |_, _, params| {
                let HookParams::Ansi {
                    wparam,
                    data: HookData::Debug(info),
                } = params
                else {
                    return 0;
                };
                assert_eq!(*wparam, HookType::Mouse.raw() as usize);
                assert_eq!(info.code, HC_NOREMOVE);
                *flag.lock().unwrap() as LResult
            }),
            ModuleId(1),
            Some(t.id()),
        )
        .unwrap();

        let mut params = HookParams::value(Representation::Ansi, 0, 0);
        t.call_hooks(HookType::Mouse, HC_NOREMOVE, &mut params);
        assert!(calls.lock().unwrap().is_empty());
        *veto.lock().unwrap() = false;
        t.call_hooks(HookType::Mouse, HC_NOREMOVE, &mut params);
        assert_eq!(*calls.lock().unwrap(), vec!["mouse"]);
    }

    #[test]
    fn msg_filter_runs_system_chain_first() {
        let system = system();
        let t = system.create_thread(ThreadKind::Win32);
        let log = Arc::new(Mutex::new(Vec::new()));
        t.set_windows_hook_ex(HookType::MsgFilter.raw(), recorder("local", &log), ModuleId(1), Some(t.id()))
            .unwrap();
        t.set_windows_hook_ex(HookType::SysMsgFilter.raw(), recorder("system", &log), ModuleId(1), None)
            .unwrap();
        let msg = Msg::new(crate::handle::Hwnd(1), crate::message::WM_KEYDOWN, 0, 0);
        assert!(!t.call_msg_filter(&msg, MSGF_DIALOGBOX));
        assert_eq!(*log.lock().unwrap(), vec!["system", "local"]);
    }

    #[test]
    fn unicode_hook_sees_widened_strings_and_can_move_window() {
        let system = system();
        let t = system.create_thread(ThreadKind::Win32);
        let names = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&names);
        t.set_windows_hook_ex(
            HookType::Cbt.raw(),
            HookProcedure::unicode(move |_, _, params| {
                if let HookParams::Unicode {
                    data: HookData::CreateWnd(cw),
                    ..
                } = params
                {
                    if let Some(name) = &cw.cs.name {
                        log.lock().unwrap().push(name.to_string_lossy());
                    }
                    cw.cs.x = 50;
                }
                0
            }),
            ModuleId(1),
            Some(t.id()),
        )
        .unwrap();

        let code_page = system.code_page();
        let create = CbtCreateWnd {
            cs: CreateStruct {
                name: Some(AnsiString::encode("caf\u{e9}", code_page)),
                class: ClassName::Name(AnsiString::encode("Button", code_page)),
                create_params: 0,
                instance: 0,
                menu: 0,
                hwnd_parent: crate::handle::Hwnd::NULL,
                cy: 20,
                cx: 80,
                y: 10,
                x: 10,
                style: 0,
                ex_style: 0,
            },
            hwnd_insert_after: crate::handle::Hwnd::NULL,
        };
        let mut params = HookParams::Ansi {
            wparam: 0x100,
            data: HookData::CreateWnd(create),
        };
        t.call_hooks(HookType::Cbt, HCBT_CREATEWND, &mut params);
        assert_eq!(*names.lock().unwrap(), vec!["caf\u{e9}".to_string()]);
        let HookParams::Ansi {
            data: HookData::CreateWnd(out),
            ..
        } = &params
        else {
            panic!("representation changed");
        };
        assert_eq!(out.cs.x, 50);
        assert_eq!(out.cs.name, Some(AnsiString(b"caf\xe9".to_vec())));
    }
}
