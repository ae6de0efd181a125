//! Error types for the queue and hook subsystem.

use thiserror::Error;

use crate::handle::{Hwnd, ThreadId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserError {
    #[error("invalid handle")]
    InvalidHandle,

    #[error("thread not found: {0}")]
    ThreadNotFound(ThreadId),

    #[error("window not found: {0}")]
    WindowNotFound(Hwnd),

    #[error("window {0} has no message queue")]
    NoQueue(Hwnd),

    #[error("destination queue has been destroyed")]
    QueueDestroyed,

    #[error("posted message limit reached ({limit})")]
    QueueFull { limit: usize },

    #[error("invalid hook id {0}")]
    InvalidHookId(i32),

    #[error("hook id {0} can only be installed system-wide")]
    GlobalOnlyHook(i32),

    #[error("cannot attach a thread's input to itself")]
    AttachToSelf,

    #[error("a journal record hook is active")]
    JournalRecordActive,

    #[error("threads are not attached")]
    NotAttached,

    #[error("no free TLS slot")]
    TlsExhausted,

    #[error("TLS index {0} is not allocated")]
    InvalidTlsIndex(u32),

    #[error("timed out waiting for a reply")]
    Timeout,
}

pub type UserResult<T> = Result<T, UserError>;
