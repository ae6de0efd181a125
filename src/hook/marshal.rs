//! Hook parameter representations and conversions between them.
//!
//! A hook procedure is written against one of three conventions: 16-bit,
//! 32-bit ANSI or 32-bit Unicode. `HookParams` carries the structured
//! parameter of a hook call tagged with the convention it is laid out in.
//! `convert` produces the same parameter in another convention (narrowing
//! or widening integer fields, transcoding embedded strings through the
//! ANSI code page), and `merge_outputs` propagates the fields a hook may
//! write back into the caller's original block.

use encoding_rs::{EncoderResult, Encoding};

use crate::handle::Hwnd;
use crate::message::{LParam, Msg, Point, WParam};

/// Calling convention of a hook, window procedure or sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    Win16,
    Ansi,
    Unicode,
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

/// Byte string in the process ANSI code page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnsiString(pub Vec<u8>);

/// UTF-16 string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WideString(pub Vec<u16>);

impl AnsiString {
    pub fn encode(text: &str, code_page: &'static Encoding) -> Self {
        wide_to_ansi(&WideString::from(text), code_page)
    }

    pub fn decode(&self, code_page: &'static Encoding) -> String {
        let (text, _) = code_page.decode_without_bom_handling(&self.0);
        text.into_owned()
    }
}

impl From<&str> for WideString {
    fn from(text: &str) -> Self {
        WideString(text.encode_utf16().collect())
    }
}

impl WideString {
    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.0)
    }
}

pub fn ansi_to_wide(text: &AnsiString, code_page: &'static Encoding) -> WideString {
    WideString::from(text.decode(code_page).as_str())
}

/// Characters the code page cannot express become `?`.
pub fn wide_to_ansi(text: &WideString, code_page: &'static Encoding) -> AnsiString {
    let mut encoder = code_page.new_encoder();
    let mut out = Vec::with_capacity(text.0.len());
    let mut src = text.0.as_slice();
    let mut buf = [0u8; 64];
    loop {
        let (result, read, written) =
            encoder.encode_from_utf16_without_replacement(src, &mut buf, true);
        out.extend_from_slice(&buf[..written]);
        src = &src[read..];
        match result {
            EncoderResult::InputEmpty => break,
            EncoderResult::OutputFull => {}
            EncoderResult::Unmappable(_) => out.push(b'?'),
        }
    }
    AnsiString(out)
}

// ---------------------------------------------------------------------------
// 32-bit structures (strings generic over ANSI/Unicode)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CwpStruct {
    pub lparam: LParam,
    pub wparam: WParam,
    pub message: u32,
    pub hwnd: Hwnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseHookStruct {
    pub pt: Point,
    pub hwnd: Hwnd,
    pub hit_test: u32,
    pub extra_info: usize,
}

/// Journal record/playback event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMsg {
    pub message: u32,
    pub param_l: u32,
    pub param_h: u32,
    pub time: u32,
    pub hwnd: Hwnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugHookInfo {
    pub thread_id: u32,
    pub thread_installer: u32,
    pub lparam: LParam,
    pub wparam: WParam,
    pub code: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CbtActivate {
    pub mouse: bool,
    pub hwnd_active: Hwnd,
}

/// Window class given either by atom or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassName<S> {
    Atom(u16),
    Name(S),
}

impl<S> ClassName<S> {
    fn map<T>(&self, f: impl Fn(&S) -> T) -> ClassName<T> {
        match self {
            ClassName::Atom(atom) => ClassName::Atom(*atom),
            ClassName::Name(name) => ClassName::Name(f(name)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStruct<S> {
    pub create_params: usize,
    pub instance: u32,
    pub menu: u32,
    pub hwnd_parent: Hwnd,
    pub cy: i32,
    pub cx: i32,
    pub y: i32,
    pub x: i32,
    pub style: u32,
    pub name: Option<S>,
    pub class: ClassName<S>,
    pub ex_style: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CbtCreateWnd<S> {
    pub cs: CreateStruct<S>,
    pub hwnd_insert_after: Hwnd,
}

/// Structured `lParam` of a 32-bit hook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookData<S> {
    /// Plain `lParam` with no structure behind it.
    Value(LParam),
    Msg(Msg),
    CallWndProc(CwpStruct),
    Mouse(MouseHookStruct),
    EventMsg(EventMsg),
    Debug(DebugHookInfo),
    Activate(CbtActivate),
    CreateWnd(CbtCreateWnd<S>),
    Rect(Rect),
}

// ---------------------------------------------------------------------------
// 16-bit structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point16 {
    pub x: i16,
    pub y: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect16 {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Msg16 {
    pub hwnd: u16,
    pub message: u16,
    pub wparam: u16,
    pub lparam: i32,
    pub time: u32,
    pub pt: Point16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CwpStruct16 {
    pub lparam: i32,
    pub wparam: u16,
    pub message: u16,
    pub hwnd: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseHookStruct16 {
    pub pt: Point16,
    pub hwnd: u16,
    pub hit_test: u16,
    pub extra_info: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMsg16 {
    pub message: u16,
    pub param_l: u16,
    pub param_h: u16,
    pub time: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugHookInfo16 {
    pub module: u16,
    pub reserved: u16,
    pub lparam: i32,
    pub wparam: u16,
    pub code: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CbtActivate16 {
    pub mouse: bool,
    pub hwnd_active: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStruct16 {
    pub create_params: u32,
    pub instance: u16,
    pub menu: u16,
    pub hwnd_parent: u16,
    pub cy: i16,
    pub cx: i16,
    pub y: i16,
    pub x: i16,
    pub style: u32,
    pub name: Option<AnsiString>,
    pub class: ClassName<AnsiString>,
    pub ex_style: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CbtCreateWnd16 {
    pub cs: CreateStruct16,
    pub hwnd_insert_after: u16,
}

/// Structured `lParam` of a 16-bit hook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookData16 {
    Value(i32),
    Msg(Msg16),
    CallWndProc(CwpStruct16),
    Mouse(MouseHookStruct16),
    EventMsg(EventMsg16),
    Debug(DebugHookInfo16),
    Activate(CbtActivate16),
    CreateWnd(CbtCreateWnd16),
    Rect(Rect16),
}

// ---------------------------------------------------------------------------
// Tagged parameter block
// ---------------------------------------------------------------------------

/// `wParam` plus structured `lParam` of one hook call, in one representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookParams {
    Win16 { wparam: u16, data: HookData16 },
    Ansi { wparam: WParam, data: HookData<AnsiString> },
    Unicode { wparam: WParam, data: HookData<WideString> },
}

impl HookParams {
    /// Unstructured parameters in `repr`.
    pub fn value(repr: Representation, wparam: WParam, lparam: LParam) -> Self {
        match repr {
            Representation::Win16 => HookParams::Win16 {
                wparam: wparam as u16,
                data: HookData16::Value(lparam as i32),
            },
            Representation::Ansi => HookParams::Ansi {
                wparam,
                data: HookData::Value(lparam),
            },
            Representation::Unicode => HookParams::Unicode {
                wparam,
                data: HookData::Value(lparam),
            },
        }
    }

    /// Builds a block from its ANSI form, laid out for `repr`.
    pub fn from_ansi(
        repr: Representation,
        wparam: WParam,
        data: HookData<AnsiString>,
        code_page: &'static Encoding,
    ) -> Self {
        HookParams::Ansi { wparam, data }.convert(repr, code_page)
    }

    pub fn repr(&self) -> Representation {
        match self {
            HookParams::Win16 { .. } => Representation::Win16,
            HookParams::Ansi { .. } => Representation::Ansi,
            HookParams::Unicode { .. } => Representation::Unicode,
        }
    }

    pub fn wparam(&self) -> WParam {
        match self {
            HookParams::Win16 { wparam, .. } => *wparam as WParam,
            HookParams::Ansi { wparam, .. } | HookParams::Unicode { wparam, .. } => *wparam,
        }
    }

    /// Unstructured `lParam`, or 0 for a structured block.
    pub fn lparam_value(&self) -> LParam {
        match self {
            HookParams::Win16 {
                data: HookData16::Value(v),
                ..
            } => *v as LParam,
            HookParams::Ansi {
                data: HookData::Value(v),
                ..
            }
            | HookParams::Unicode {
                data: HookData::Value(v),
                ..
            } => *v,
            _ => 0,
        }
    }

    /// The block laid out for `target`.
    pub fn convert(&self, target: Representation, code_page: &'static Encoding) -> HookParams {
        let to_wide = |a: &AnsiString| ansi_to_wide(a, code_page);
        let to_ansi = |w: &WideString| wide_to_ansi(w, code_page);
        match (self, target) {
            (HookParams::Win16 { .. }, Representation::Win16)
            | (HookParams::Ansi { .. }, Representation::Ansi)
            | (HookParams::Unicode { .. }, Representation::Unicode) => self.clone(),

            (HookParams::Win16 { wparam, data }, Representation::Ansi) => HookParams::Ansi {
                wparam: *wparam as WParam,
                data: widen(data, AnsiString::clone),
            },
            (HookParams::Win16 { wparam, data }, Representation::Unicode) => {
                HookParams::Unicode {
                    wparam: *wparam as WParam,
                    data: widen(data, to_wide),
                }
            }
            (HookParams::Ansi { wparam, data }, Representation::Win16) => HookParams::Win16 {
                wparam: *wparam as u16,
                data: narrow(data, AnsiString::clone),
            },
            (HookParams::Unicode { wparam, data }, Representation::Win16) => HookParams::Win16 {
                wparam: *wparam as u16,
                data: narrow(data, to_ansi),
            },
            (HookParams::Ansi { wparam, data }, Representation::Unicode) => HookParams::Unicode {
                wparam: *wparam,
                data: restring(data, to_wide),
            },
            (HookParams::Unicode { wparam, data }, Representation::Ansi) => HookParams::Ansi {
                wparam: *wparam,
                data: restring(data, to_ansi),
            },
        }
    }

    /// Copies the output fields of `returned` (a converted block the hook
    /// may have written to) back into `self`.
    pub fn merge_outputs(&mut self, returned: &HookParams, code_page: &'static Encoding) {
        let back = returned.convert(self.repr(), code_page);
        match (self, back) {
            (HookParams::Win16 { data, .. }, HookParams::Win16 { data: out, .. }) => {
                data.merge_outputs(out)
            }
            (HookParams::Ansi { data, .. }, HookParams::Ansi { data: out, .. }) => {
                data.merge_outputs(out)
            }
            (HookParams::Unicode { data, .. }, HookParams::Unicode { data: out, .. }) => {
                data.merge_outputs(out)
            }
            _ => {}
        }
    }

    /// The message carried by a WH_GETMESSAGE / WH_MSGFILTER block, widened.
    pub fn msg(&self) -> Option<Msg> {
        match self {
            HookParams::Win16 {
                data: HookData16::Msg(m),
                ..
            } => Some(msg_from_16(m)),
            HookParams::Ansi {
                data: HookData::Msg(m),
                ..
            }
            | HookParams::Unicode {
                data: HookData::Msg(m),
                ..
            } => Some(*m),
            _ => None,
        }
    }

    /// The event carried by a journal block, widened.
    pub fn event_msg(&self) -> Option<EventMsg> {
        match self {
            HookParams::Win16 {
                data: HookData16::EventMsg(e),
                ..
            } => Some(event_from_16(e)),
            HookParams::Ansi {
                data: HookData::EventMsg(e),
                ..
            }
            | HookParams::Unicode {
                data: HookData::EventMsg(e),
                ..
            } => Some(*e),
            _ => None,
        }
    }
}

impl HookData16 {
    fn merge_outputs(&mut self, out: HookData16) {
        match (self, out) {
            (HookData16::Msg(a), HookData16::Msg(b)) => *a = b,
            (HookData16::EventMsg(a), HookData16::EventMsg(b)) => *a = b,
            (HookData16::Rect(a), HookData16::Rect(b)) => *a = b,
            (HookData16::CreateWnd(a), HookData16::CreateWnd(b)) => {
                a.hwnd_insert_after = b.hwnd_insert_after;
                a.cs.x = b.cs.x;
                a.cs.y = b.cs.y;
                a.cs.cx = b.cs.cx;
                a.cs.cy = b.cs.cy;
            }
            _ => {}
        }
    }
}

impl<S> HookData<S> {
    fn merge_outputs(&mut self, out: HookData<S>) {
        match (self, out) {
            (HookData::Msg(a), HookData::Msg(b)) => {
                // extra_info is not part of MSG; keep the caller's.
                let extra_info = a.extra_info;
                *a = b;
                a.extra_info = extra_info;
            }
            (HookData::EventMsg(a), HookData::EventMsg(b)) => *a = b,
            (HookData::Rect(a), HookData::Rect(b)) => *a = b,
            (HookData::CreateWnd(a), HookData::CreateWnd(b)) => {
                a.hwnd_insert_after = b.hwnd_insert_after;
                a.cs.x = b.cs.x;
                a.cs.y = b.cs.y;
                a.cs.cx = b.cs.cx;
                a.cs.cy = b.cs.cy;
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Field conversions
// ---------------------------------------------------------------------------

fn point_from_16(p: Point16) -> Point {
    Point::new(p.x as i32, p.y as i32)
}

fn point_to_16(p: Point) -> Point16 {
    Point16 {
        x: p.x as i16,
        y: p.y as i16,
    }
}

fn msg_from_16(m: &Msg16) -> Msg {
    Msg {
        hwnd: Hwnd::from_16(m.hwnd),
        message: m.message as u32,
        wparam: m.wparam as WParam,
        lparam: m.lparam as LParam,
        time: m.time,
        pt: point_from_16(m.pt),
        extra_info: 0,
    }
}

fn msg_to_16(m: &Msg) -> Msg16 {
    Msg16 {
        hwnd: m.hwnd.to_16(),
        message: m.message as u16,
        wparam: m.wparam as u16,
        lparam: m.lparam as i32,
        time: m.time,
        pt: point_to_16(m.pt),
    }
}

fn event_from_16(e: &EventMsg16) -> EventMsg {
    EventMsg {
        message: e.message as u32,
        param_l: e.param_l as u32,
        param_h: e.param_h as u32,
        time: e.time,
        hwnd: Hwnd::NULL,
    }
}

fn event_to_16(e: &EventMsg) -> EventMsg16 {
    EventMsg16 {
        message: e.message as u16,
        param_l: e.param_l as u16,
        param_h: e.param_h as u16,
        time: e.time,
    }
}

fn create_from_16<S>(cs: &CreateStruct16, s: &impl Fn(&AnsiString) -> S) -> CreateStruct<S> {
    CreateStruct {
        create_params: cs.create_params as usize,
        instance: cs.instance as u32,
        menu: cs.menu as u32,
        hwnd_parent: Hwnd::from_16(cs.hwnd_parent),
        cy: cs.cy as i32,
        cx: cs.cx as i32,
        y: cs.y as i32,
        x: cs.x as i32,
        style: cs.style,
        name: cs.name.as_ref().map(s),
        class: cs.class.map(s),
        ex_style: cs.ex_style,
    }
}

fn create_to_16<S>(cs: &CreateStruct<S>, s: &impl Fn(&S) -> AnsiString) -> CreateStruct16 {
    CreateStruct16 {
        create_params: cs.create_params as u32,
        instance: cs.instance as u16,
        menu: cs.menu as u16,
        hwnd_parent: cs.hwnd_parent.to_16(),
        cy: cs.cy as i16,
        cx: cs.cx as i16,
        y: cs.y as i16,
        x: cs.x as i16,
        style: cs.style,
        name: cs.name.as_ref().map(s),
        class: cs.class.map(s),
        ex_style: cs.ex_style,
    }
}

fn widen<S>(data: &HookData16, s: impl Fn(&AnsiString) -> S) -> HookData<S> {
    match data {
        HookData16::Value(v) => HookData::Value(*v as LParam),
        HookData16::Msg(m) => HookData::Msg(msg_from_16(m)),
        HookData16::CallWndProc(c) => HookData::CallWndProc(CwpStruct {
            lparam: c.lparam as LParam,
            wparam: c.wparam as WParam,
            message: c.message as u32,
            hwnd: Hwnd::from_16(c.hwnd),
        }),
        HookData16::Mouse(m) => HookData::Mouse(MouseHookStruct {
            pt: point_from_16(m.pt),
            hwnd: Hwnd::from_16(m.hwnd),
            hit_test: m.hit_test as u32,
            extra_info: m.extra_info as usize,
        }),
        HookData16::EventMsg(e) => HookData::EventMsg(event_from_16(e)),
        HookData16::Debug(d) => HookData::Debug(DebugHookInfo {
            thread_id: 0,
            thread_installer: 0,
            lparam: d.lparam as LParam,
            wparam: d.wparam as WParam,
            code: d.code as i32,
        }),
        HookData16::Activate(a) => HookData::Activate(CbtActivate {
            mouse: a.mouse,
            hwnd_active: Hwnd::from_16(a.hwnd_active),
        }),
        HookData16::CreateWnd(c) => HookData::CreateWnd(CbtCreateWnd {
            cs: create_from_16(&c.cs, &s),
            hwnd_insert_after: Hwnd::from_16(c.hwnd_insert_after),
        }),
        HookData16::Rect(r) => HookData::Rect(Rect {
            left: r.left as i32,
            top: r.top as i32,
            right: r.right as i32,
            bottom: r.bottom as i32,
        }),
    }
}

fn narrow<S>(data: &HookData<S>, s: impl Fn(&S) -> AnsiString) -> HookData16 {
    match data {
        HookData::Value(v) => HookData16::Value(*v as i32),
        HookData::Msg(m) => HookData16::Msg(msg_to_16(m)),
        HookData::CallWndProc(c) => HookData16::CallWndProc(CwpStruct16 {
            lparam: c.lparam as i32,
            wparam: c.wparam as u16,
            message: c.message as u16,
            hwnd: c.hwnd.to_16(),
        }),
        HookData::Mouse(m) => HookData16::Mouse(MouseHookStruct16 {
            pt: point_to_16(m.pt),
            hwnd: m.hwnd.to_16(),
            hit_test: m.hit_test as u16,
            extra_info: m.extra_info as u32,
        }),
        HookData::EventMsg(e) => HookData16::EventMsg(event_to_16(e)),
        HookData::Debug(d) => HookData16::Debug(DebugHookInfo16 {
            module: 0,
            reserved: 0,
            lparam: d.lparam as i32,
            wparam: d.wparam as u16,
            code: d.code as i16,
        }),
        HookData::Activate(a) => HookData16::Activate(CbtActivate16 {
            mouse: a.mouse,
            hwnd_active: a.hwnd_active.to_16(),
        }),
        HookData::CreateWnd(c) => HookData16::CreateWnd(CbtCreateWnd16 {
            cs: create_to_16(&c.cs, &s),
            hwnd_insert_after: c.hwnd_insert_after.to_16(),
        }),
        HookData::Rect(r) => HookData16::Rect(Rect16 {
            left: r.left as i16,
            top: r.top as i16,
            right: r.right as i16,
            bottom: r.bottom as i16,
        }),
    }
}

fn restring<S, T>(data: &HookData<S>, s: impl Fn(&S) -> T) -> HookData<T> {
    match data {
        HookData::Value(v) => HookData::Value(*v),
        HookData::Msg(m) => HookData::Msg(*m),
        HookData::CallWndProc(c) => HookData::CallWndProc(*c),
        HookData::Mouse(m) => HookData::Mouse(*m),
        HookData::EventMsg(e) => HookData::EventMsg(*e),
        HookData::Debug(d) => HookData::Debug(*d),
        HookData::Activate(a) => HookData::Activate(*a),
        HookData::CreateWnd(c) => HookData::CreateWnd(CbtCreateWnd {
            cs: CreateStruct {
                create_params: c.cs.create_params,
                instance: c.cs.instance,
                menu: c.cs.menu,
                hwnd_parent: c.cs.hwnd_parent,
                cy: c.cs.cy,
                cx: c.cs.cx,
                y: c.cs.y,
                x: c.cs.x,
                style: c.cs.style,
                name: c.cs.name.as_ref().map(&s),
                class: c.cs.class.map(&s),
                ex_style: c.cs.ex_style,
            },
            hwnd_insert_after: c.hwnd_insert_after,
        }),
        HookData::Rect(r) => HookData::Rect(*r),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
