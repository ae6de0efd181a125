//! Opaque handles backed by a generational arena.
//!
//! Queues, hooks and posted-message nodes are addressed by `Handle`
//! (slot index + generation). A handle outlives the object it names without
//! ever aliasing a newer occupant of the same slot: the generation is bumped
//! on every removal, so stale lookups come back as `None`.

use std::fmt;

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Index + generation pair identifying one arena slot occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index, self.generation)
    }
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// Slot allocator with free-list reuse.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T: fmt::Debug> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, value: T) -> Handle {
        self.insert_with(|_| value).0
    }

    /// Inserts a value that needs to know its own handle.
    pub fn insert_with(&mut self, make: impl FnOnce(Handle) -> T) -> (Handle, &mut T) {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let generation = match slot {
                Slot::Vacant { generation } => *generation,
                // Free list only ever holds vacant slots.
                Slot::Occupied { generation, .. } => *generation,
            };
            let handle = Handle { index, generation };
            *slot = Slot::Occupied {
                generation,
                value: make(handle),
            };
            let Slot::Occupied { value, .. } = slot else {
                unreachable!("slot was just filled");
            };
            return (handle, value);
        }
        let index = self.slots.len() as u32;
        let handle = Handle {
            index,
            generation: 0,
        };
        self.slots.push(Slot::Occupied {
            generation: 0,
            value: make(handle),
        });
        match self.slots.last_mut() {
            Some(Slot::Occupied { value, .. }) => (handle, value),
            _ => unreachable!("slot was just pushed"),
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        match self.slots.get(handle.index as usize)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        match self.slots.get_mut(handle.index as usize)? {
            Slot::Occupied { generation, value } if *generation == handle.generation => {
                Some(value)
            }
            _ => None,
        }
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.get(handle).is_some()
    }

    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == handle.generation => {}
            _ => return None,
        }
        let next = Slot::Vacant {
            generation: handle.generation.wrapping_add(1),
        };
        let Slot::Occupied { value, .. } = std::mem::replace(slot, next) else {
            return None;
        };
        self.free.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Live entries in slot order (not insertion order).
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, value } => Some((
                    Handle {
                        index: index as u32,
                        generation: *generation,
                    },
                    value,
                )),
                Slot::Vacant { .. } => None,
            })
    }

    pub fn handles(&self) -> Vec<Handle> {
        self.iter().map(|(h, _)| h).collect()
    }
}

// ---------------------------------------------------------------------------
// Typed handles and plain ids
// ---------------------------------------------------------------------------

/// Message queue handle (the HQUEUE of this subsystem).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueHandle(pub Handle);

/// Hook handle returned by `set_windows_hook_ex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookHandle(pub Handle);

impl fmt::Display for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue#{}", self.0)
    }
}

impl fmt::Display for HookHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook#{}", self.0)
    }
}

/// Window handle, owned by the window manager. `Hwnd::NULL` matches any
/// window in message filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hwnd(pub u32);

impl Hwnd {
    pub const NULL: Hwnd = Hwnd(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Low word, as carried by 16-bit structures.
    pub fn to_16(self) -> u16 {
        self.0 as u16
    }

    pub fn from_16(h: u16) -> Self {
        Hwnd(h as u32)
    }
}

impl fmt::Display for Hwnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hwnd:{:#06x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid:{:#06x}", self.0)
    }
}

/// Module instance that owns a hook (HMODULE/HINSTANCE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ModuleId(pub u32);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
