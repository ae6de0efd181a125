//! Posted-message FIFO.
//!
//! A doubly linked list whose nodes live in an `Arena`, so `remove` is O(1)
//! given the `PostedKey` returned by `find`. Insertion order is delivery
//! order, except that a `WM_MOUSEMOVE` whose predecessor at the tail is an
//! unconsumed mouse-move for the same window with the same button state is
//! folded into that predecessor.

use crate::handle::{Arena, Handle, Hwnd};
use crate::message::{in_range, wake_bit_for, Msg, QueueStatus, WM_MOUSEMOVE};

/// Position of a message inside a `PostedList`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostedKey(Handle);

struct Node {
    msg: Msg,
    prev: Option<Handle>,
    next: Option<Handle>,
}

/// Outcome of `PostedList::push`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pushed {
    Appended(PostedKey),
    Coalesced(PostedKey),
}

/// Wake-bit classes tracked with a per-class count, so each bit can be
/// cleared exactly when its last message leaves the list.
const CLASSES: [QueueStatus; 4] = [
    QueueStatus::POSTMESSAGE,
    QueueStatus::MOUSEMOVE,
    QueueStatus::MOUSEBUTTON,
    QueueStatus::KEY,
];

fn class_index(bit: QueueStatus) -> usize {
    CLASSES.iter().position(|c| *c == bit).unwrap_or(0)
}

#[derive(Default)]
pub struct PostedList {
    nodes: Arena<Node>,
    head: Option<Handle>,
    tail: Option<Handle>,
    class_counts: [usize; 4],
}

impl PostedList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends `msg`, or merges it into the tail mouse-move.
    pub fn push(&mut self, msg: Msg) -> Pushed {
        if let Some(key) = self.try_coalesce(&msg) {
            return Pushed::Coalesced(key);
        }
        let handle = self.nodes.insert(Node {
            msg,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => {
                if let Some(node) = self.nodes.get_mut(tail) {
                    node.next = Some(handle);
                }
            }
            None => self.head = Some(handle),
        }
        self.tail = Some(handle);
        self.class_counts[class_index(wake_bit_for(msg.message))] += 1;
        Pushed::Appended(PostedKey(handle))
    }

    fn try_coalesce(&mut self, msg: &Msg) -> Option<PostedKey> {
        if msg.message != WM_MOUSEMOVE {
            return None;
        }
        let tail = self.tail?;
        let prev = self.nodes.get_mut(tail)?;
        if prev.msg.message != WM_MOUSEMOVE
            || prev.msg.hwnd != msg.hwnd
            || prev.msg.wparam != msg.wparam
        {
            return None;
        }
        prev.msg.lparam = msg.lparam;
        prev.msg.pt = msg.pt;
        prev.msg.time = msg.time;
        prev.msg.extra_info = msg.extra_info;
        Some(PostedKey(tail))
    }

    /// First message, from the head, matching the window and id filters.
    /// `Hwnd::NULL` matches any window; `0/0` matches any id.
    pub fn find(&self, hwnd: Hwnd, first: u32, last: u32) -> Option<PostedKey> {
        let mut cursor = self.head;
        while let Some(handle) = cursor {
            let node = self.nodes.get(handle)?;
            if (hwnd.is_null() || node.msg.hwnd == hwnd) && in_range(node.msg.message, first, last)
            {
                return Some(PostedKey(handle));
            }
            cursor = node.next;
        }
        None
    }

    pub fn get(&self, key: PostedKey) -> Option<&Msg> {
        self.nodes.get(key.0).map(|n| &n.msg)
    }

    /// Unlinks `key`. Returns the message and the wake bit that no longer has
    /// any message behind it (empty when others of the class remain).
    pub fn remove(&mut self, key: PostedKey) -> Option<(Msg, QueueStatus)> {
        let node = self.nodes.remove(key.0)?;
        match node.prev {
            Some(prev) => {
                if let Some(p) = self.nodes.get_mut(prev) {
                    p.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(n) = self.nodes.get_mut(next) {
                    n.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }
        let bit = wake_bit_for(node.msg.message);
        let count = &mut self.class_counts[class_index(bit)];
        *count = count.saturating_sub(1);
        let drained = if *count == 0 { bit } else { QueueStatus::empty() };
        Some((node.msg, drained))
    }

    /// Messages from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &Msg> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let node = self.nodes.get(cursor?)?;
            cursor = node.next;
            Some(&node.msg)
        })
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
