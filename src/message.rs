//! Message records, message ids and queue wake bits.
//!
//! Values follow winuser.h so that collaborators can pass raw ids through
//! unchanged. Only the ids this subsystem interprets are named here.

use bitflags::bitflags;

use crate::handle::Hwnd;

pub type WParam = usize;
pub type LParam = isize;
pub type LResult = isize;

// ---------------------------------------------------------------------------
// Message ids
// ---------------------------------------------------------------------------

pub const WM_NULL: u32 = 0x0000;
pub const WM_PAINT: u32 = 0x000f;
pub const WM_QUIT: u32 = 0x0012;
pub const WM_NCMOUSEMOVE: u32 = 0x00a0;
pub const WM_NCMOUSEFIRST: u32 = WM_NCMOUSEMOVE;
pub const WM_NCMOUSELAST: u32 = 0x00ad;
pub const WM_KEYDOWN: u32 = 0x0100;
pub const WM_KEYUP: u32 = 0x0101;
pub const WM_CHAR: u32 = 0x0102;
pub const WM_KEYFIRST: u32 = WM_KEYDOWN;
pub const WM_KEYLAST: u32 = 0x0108;
pub const WM_TIMER: u32 = 0x0113;
pub const WM_SYSTIMER: u32 = 0x0118;
pub const WM_MOUSEMOVE: u32 = 0x0200;
pub const WM_LBUTTONDOWN: u32 = 0x0201;
pub const WM_LBUTTONUP: u32 = 0x0202;
pub const WM_MOUSEFIRST: u32 = WM_MOUSEMOVE;
pub const WM_MOUSELAST: u32 = 0x020d;
pub const WM_USER: u32 = 0x0400;

/// `wParam` button-state bits carried by mouse messages.
pub const MK_LBUTTON: WParam = 0x0001;
pub const MK_RBUTTON: WParam = 0x0002;

/// Hit-test code reported for the client area.
pub const HTCLIENT: i32 = 1;

// ---------------------------------------------------------------------------
// PeekMessage flags
// ---------------------------------------------------------------------------

bitflags! {
    /// `PeekFlags::empty()` is `PM_NOREMOVE`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PeekFlags: u32 {
        const REMOVE = 0x0001;
        const NOYIELD = 0x0002;
    }
}

// ---------------------------------------------------------------------------
// Wake bits
// ---------------------------------------------------------------------------

bitflags! {
    /// Queue status bits (`QS_*`), used for all three wake-bit vectors.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct QueueStatus: u32 {
        const KEY = 0x0001;
        const MOUSEMOVE = 0x0002;
        const MOUSEBUTTON = 0x0004;
        const POSTMESSAGE = 0x0008;
        const TIMER = 0x0010;
        const PAINT = 0x0020;
        const SENDMESSAGE = 0x0040;
        const HOTKEY = 0x0080;
        /// Internal: a reply has arrived for a message this queue sent.
        const SMRESULT = 0x8000;

        const MOUSE = Self::MOUSEMOVE.bits() | Self::MOUSEBUTTON.bits();
        const INPUT = Self::MOUSE.bits() | Self::KEY.bits();
        const ALLEVENTS = Self::INPUT.bits()
            | Self::POSTMESSAGE.bits()
            | Self::TIMER.bits()
            | Self::PAINT.bits()
            | Self::HOTKEY.bits();
        const ALLINPUT = Self::ALLEVENTS.bits() | Self::SENDMESSAGE.bits();
    }
}

/// Wake bit raised when a message with this id is posted.
pub fn wake_bit_for(message: u32) -> QueueStatus {
    match message {
        WM_MOUSEMOVE | WM_NCMOUSEMOVE => QueueStatus::MOUSEMOVE,
        WM_KEYFIRST..=WM_KEYLAST => QueueStatus::KEY,
        WM_MOUSEFIRST..=WM_MOUSELAST | WM_NCMOUSEFIRST..=WM_NCMOUSELAST => {
            QueueStatus::MOUSEBUTTON
        }
        _ => QueueStatus::POSTMESSAGE,
    }
}

pub fn is_mouse_message(message: u32) -> bool {
    matches!(message, WM_MOUSEFIRST..=WM_MOUSELAST | WM_NCMOUSEFIRST..=WM_NCMOUSELAST)
}

pub fn is_keyboard_message(message: u32) -> bool {
    (WM_KEYFIRST..=WM_KEYLAST).contains(&message)
}

/// Wake bits a retrieval filtered to `[first, last]` has to wait for.
///
/// `0/0` means no filter. Posted and sent messages are always selected.
pub fn wake_mask_for_range(first: u32, last: u32) -> QueueStatus {
    let mut mask = QueueStatus::POSTMESSAGE | QueueStatus::SENDMESSAGE;
    if first == 0 && last == 0 {
        return mask | QueueStatus::MOUSE | QueueStatus::KEY | QueueStatus::TIMER | QueueStatus::PAINT;
    }
    let overlaps = |lo: u32, hi: u32| first <= hi && last >= lo;
    if overlaps(WM_KEYFIRST, WM_KEYLAST) {
        mask |= QueueStatus::KEY;
    }
    if overlaps(WM_MOUSEFIRST, WM_MOUSELAST) || overlaps(WM_NCMOUSEFIRST, WM_NCMOUSELAST) {
        mask |= QueueStatus::MOUSE;
    }
    if overlaps(WM_TIMER, WM_TIMER) || overlaps(WM_SYSTIMER, WM_SYSTIMER) {
        mask |= QueueStatus::TIMER;
    }
    if overlaps(WM_PAINT, WM_PAINT) {
        mask |= QueueStatus::PAINT;
    }
    mask
}

/// True when `message` lies in the filter range (`0/0` accepts everything).
pub fn in_range(message: u32, first: u32, last: u32) -> bool {
    (first == 0 && last == 0) || (first <= message && message <= last)
}

// ---------------------------------------------------------------------------
// Message record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// `MAKELONG(x, y)` as returned by `GetMessagePos`.
    pub fn packed(self) -> u32 {
        (self.x as u16 as u32) | ((self.y as u16 as u32) << 16)
    }
}

/// A queued message (the 32-bit `MSG` plus the extra-info word).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Msg {
    pub hwnd: Hwnd,
    pub message: u32,
    pub wparam: WParam,
    pub lparam: LParam,
    pub time: u32,
    pub pt: Point,
    pub extra_info: LParam,
}

impl Msg {
    pub fn new(hwnd: Hwnd, message: u32, wparam: WParam, lparam: LParam) -> Self {
        Self {
            hwnd,
            message,
            wparam,
            lparam,
            ..Default::default()
        }
    }

    pub fn is_quit(&self) -> bool {
        self.message == WM_QUIT
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
