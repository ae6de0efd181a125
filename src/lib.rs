//! userqueue -- Win16/Win32 style message queues, sent messages and hooks.
//!
//! Every thread that touches the subsystem gets a `Thread` from a shared
//! `System`. The thread's message queue is created on first use and torn
//! down when the `Thread` is dropped.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod hook;
pub mod input;
pub mod message;
pub mod pqd;
pub mod queue;
pub mod system;
pub mod thread;
pub mod window;

pub use config::{Config, ConfigError};
pub use dispatch::{InSendFlags, WaitOutcome};
pub use error::{UserError, UserResult};
pub use handle::{HookHandle, Hwnd, ModuleId, QueueHandle, ThreadId};
pub use hook::marshal::{HookData, HookParams, Representation};
pub use hook::{HookContext, HookProcedure, HookState, HookType};
pub use input::HardwareEvent;
pub use message::{LParam, LResult, Msg, PeekFlags, Point, QueueStatus, WParam};
pub use queue::MessageQueue;
pub use system::System;
pub use thread::{Thread, ThreadKind};
pub use window::{NoTimers, TimerService, WindowCall, WindowRef, WindowSystem, WindowTable, WndProc};
