// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The `DV` opcode's handler table: assert, panic recovery (`catch`),
//! bounds-checked memory primitives, the bump allocator, conditional
//! logging, and the single in-flight source file's open/close/read and
//! scan dispatch.
//!
//! Two handlers read as a host-file ref and an arena ref upstream,
//! neither of which this port can express that way: a `Reader`/`File`
//! pair here is a host value, not an image byte range, and a `Bba`
//! lives directly in `Kern` rather than behind an addressable pointer.
//! Both device ops are narrowed accordingly: `file`/`scan` always
//! operate on `Globals::src` (there is exactly one file a compilation
//! has open at a time), and `bump` takes a small 0/nonzero discriminant
//! selecting `Kern::bba`/`Kern::bba_tmp` in place of an arena pointer.


use crate::bytecode::{SZ4, XLW, encode};
use crate::error::{ErrorCode, Panic, VmResult};
use crate::log::Sink;
use crate::memory::Mem;
use crate::reader::{Reader, read_at_least, skip_line_comment};
use crate::vm::{Device, Machine, execute};

/// `DV` selector byte values. Not generated from an upstream constant
/// table (none was available to ground these in); assigned in the
/// same order the reference interpreter's `executeDV` switch lists
/// them.
pub mod selector {
    pub const ASSERT: u32 = 0;
    pub const CATCH: u32 = 1;
    pub const MEMSET: u32 = 2;
    pub const MEMCMP: u32 = 3;
    pub const MEMMOVE: u32 = 4;
    pub const BUMP: u32 = 5;
    pub const LOG: u32 = 6;
    pub const FILE: u32 = 7;
    pub const SCAN: u32 = 8;
}

/// `file`'s method sub-selector, mirroring `FileMethods`'s field order
/// upstream.
mod file_method {
    pub const OPEN: u32 = 0;
    pub const CLOSE: u32 = 1;
    pub const READ: u32 = 2;
}

/// `scan`'s method sub-selector.
mod scan_method {
    pub const READ_AT_LEAST: u32 = 0;
    pub const SKIP_COMMENT: u32 = 1;
    pub const SCAN: u32 = 2;
}

/// The device table's host half: the reader backing the in-flight
/// source file, and where `D_log` writes.
pub struct HostDevice<R, S> {
    pub reader: R,
    pub sink: S,
}

impl<R, S> HostDevice<R, S> {
    pub const fn new(reader: R, sink: S) -> Self {
        HostDevice { reader, sink }
    }
}

impl<M: Mem, R: Reader, S: Sink> Device<M> for HostDevice<R, S> {
    fn dispatch(&mut self, selector: u32, m: &mut Machine<'_, M>) -> VmResult<()> {
        match selector {
            selector::ASSERT => d_assert(m),
            selector::CATCH => self.d_catch(m),
            selector::MEMSET => d_memset(m),
            selector::MEMCMP => d_memcmp(m),
            selector::MEMMOVE => d_memmove(m),
            selector::BUMP => d_bump(m),
            selector::LOG => self.d_log(m),
            selector::FILE => self.d_file(m),
            selector::SCAN => self.d_scan(m),
            _ => Err(Panic::new(ErrorCode::Dv, 0)),
        }
    }
}

fn ws_pop<M: Mem>(m: &mut Machine<'_, M>) -> VmResult<u32> {
    crate::stack::pop_reg(&mut m.thread.ws, m.mem)
}

fn ws_push<M: Mem>(m: &mut Machine<'_, M>, v: u32) -> VmResult<()> {
    crate::stack::push_reg(&mut m.thread.ws, m.mem, v)
}

/// Pop the condition, pop the error code; panic with the code only if
/// the condition is falsy. (The source this is grounded on expands
/// `ASM_ASSERT(chk, WS_POP())` as a macro, so the code is fetched from
/// WS only on the failing path — leaving it unpopped, and the stack
/// unbalanced, on success. Always popping both keeps the stack
/// discipline every other handler here follows.)
fn d_assert<M: Mem>(m: &mut Machine<'_, M>) -> VmResult<()> {
    let chk = ws_pop(m)?;
    let code = ws_pop(m)?;
    if chk == 0 {
        Err(Panic::new(ErrorCode::from_code(code as u16), m.globals.line))
    } else {
        Ok(())
    }
}

fn d_memset<M: Mem>(m: &mut Machine<'_, M>) -> VmResult<()> {
    let len = ws_pop(m)?;
    let value = ws_pop(m)?;
    let dst = ws_pop(m)?;
    m.mem
        .memset(crate::types::Ref::new(dst), len, value as u8)
}

fn d_memcmp<M: Mem>(m: &mut Machine<'_, M>) -> VmResult<()> {
    let len = ws_pop(m)?;
    let r = ws_pop(m)?;
    let l = ws_pop(m)?;
    let cmp = m
        .mem
        .memcmp(crate::types::Ref::new(l), crate::types::Ref::new(r), len)?;
    ws_push(m, cmp as u32)
}

fn d_memmove<M: Mem>(m: &mut Machine<'_, M>) -> VmResult<()> {
    let len = ws_pop(m)?;
    let src = ws_pop(m)?;
    let dst = ws_pop(m)?;
    m.mem
        .copy_within(crate::types::Ref::new(src), crate::types::Ref::new(dst), len)
}

/// `aligned` selects `Bba::alloc` (from the block's top) vs.
/// `Bba::alloc_unaligned` (from the block's bottom); `arena` is `0` for
/// the long-lived code/dictionary arena (`Kern::bba`), nonzero for the
/// scratch arena (`Kern::bba_tmp`), in place of an in-image arena
/// pointer neither arena has.
fn d_bump<M: Mem>(m: &mut Machine<'_, M>) -> VmResult<()> {
    let arena = ws_pop(m)?;
    let aligned = ws_pop(m)?;
    let size = ws_pop(m)?;
    let (bba, ba) = if arena == 0 {
        (&mut m.kern.bba, &mut m.kern.ba)
    } else {
        (&mut m.kern.bba_tmp, &mut m.kern.ba)
    };
    let r = if aligned != 0 {
        bba.alloc(ba, size as u16)?
    } else {
        bba.alloc_unaligned(ba, size as u16)?
    };
    ws_push(m, r.offset())
}

impl<R: Reader, S: Sink> HostDevice<R, S> {
    /// Snapshot EP/CS.sp/LS.sp, run a large call popped off WS, then
    /// unconditionally restore them and push the error code (`0` on
    /// success), clearing `Globals::err`. `CS`/`CSZ`/`LS` are restored
    /// regardless of outcome; arena allocations made during the call
    /// are not rolled back.
    fn d_catch<M: Mem>(&mut self, m: &mut Machine<'_, M>) -> VmResult<()> {
        let ep = m.thread.ep;
        let cs_sp = m.thread.cs.sp;
        let csz_sp = m.thread.csz.sp;
        let ls_sp = m.thread.ls.sp;

        let result = execute(m, self, encode(XLW, SZ4));

        m.thread.ep = ep;
        m.thread.cs.sp = cs_sp;
        m.thread.csz.sp = csz_sp;
        m.thread.ls.sp = ls_sp;
        m.thread.ws.sp = m.thread.ws.cap;

        let code: u16 = match result {
            Ok(()) => 0,
            Err(panic) => panic.code.code(),
        };
        m.globals.err = 0;
        ws_push(m, u32::from(code))
    }

    /// `lvl`/`len`: the message's level and how many WS words follow
    /// it. Prints `"D_log [lvl]"` plus each word in hex if
    /// `Globals::log_lvl_usr` permits this level, otherwise just drops
    /// the `len` words to keep the stack balanced. Filtering is an
    /// ordinal threshold (message level must be at or below the
    /// configured level) rather than the bitmask test the source this
    /// is grounded on uses, matching the severity-threshold model
    /// `log`/`tracing`-style Rust logging uses.
    fn d_log<M: Mem>(&mut self, m: &mut Machine<'_, M>) -> VmResult<()> {
        let lvl = crate::log::Level::from_u8(ws_pop(m)? as u8);
        let len = ws_pop(m)?;
        if lvl <= m.globals.log_lvl_usr {
            self.sink.write(b"D_log [");
            write_hex(&mut self.sink, u32::from(lvl as u8), 2);
            self.sink.write(b"]");
            for _ in 0..len {
                let v = ws_pop(m)?;
                self.sink.write(b" ");
                write_hex(&mut self.sink, v, 8);
            }
            self.sink.write(b"\n");
        } else {
            for _ in 0..len {
                ws_pop(m)?;
            }
        }
        Ok(())
    }

    fn d_file<M: Mem>(&mut self, m: &mut Machine<'_, M>) -> VmResult<()> {
        match ws_pop(m)? {
            file_method::OPEN => self.reader.open(&mut m.globals.src),
            file_method::CLOSE => self.reader.close(&mut m.globals.src),
            file_method::READ => self.reader.read(m.mem, &mut m.globals.src),
            _ => Err(Panic::new(ErrorCode::Dv, m.globals.line)),
        }
    }

    fn d_scan<M: Mem>(&mut self, m: &mut Machine<'_, M>) -> VmResult<()> {
        match ws_pop(m)? {
            scan_method::READ_AT_LEAST => {
                read_at_least(&mut self.reader, m.mem, &mut m.globals.src, 1)
            }
            scan_method::SKIP_COMMENT => skip_line_comment(
                &mut self.reader,
                m.mem,
                &mut m.globals.src,
                &mut m.globals.line,
            ),
            scan_method::SCAN => {
                let tok = crate::reader::scan(
                    &mut self.reader,
                    m.mem,
                    &mut m.globals.src,
                    &mut m.globals.line,
                )?;
                ws_push(m, tok.r.offset())?;
                ws_push(m, tok.len)
            }
            _ => Err(Panic::new(ErrorCode::Dv, m.globals.line)),
        }
    }
}

/// Write `v`'s low `digits * 4` bits as uppercase hex, no allocation.
fn write_hex(sink: &mut impl Sink, v: u32, digits: usize) {
    const TABLE: &[u8; 16] = b"0123456789ABCDEF";
    let mut buf = [0u8; 8];
    for (i, slot) in buf[..digits].iter_mut().enumerate() {
        let shift = 4 * (digits - 1 - i);
        *slot = TABLE[((v >> shift) & 0xF) as usize];
    }
    sink.write(&buf[..digits]);
}
