// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The character-dispatched assembler: one handler per leading token
//! character, each reading and writing directly against the in-flight
//! source file and the current bump arena.
//!
//! `compile` dispatches the token `compiler::driver::compile_loop`
//! already scanned; everything else in this module is the nine
//! handlers it dispatches to (`.  \  #  =  @  ,  %  ^  $`) plus the
//! `scanInstr` helper `%`/`^` share.
//!
//! Not carried over: the original `Compiler` struct also holds an
//! `instr` field, set once at init and never read again anywhere in
//! the dispatch table grepped here — there is no behavior left to
//! port, so [`CompilerState`] only keeps the size class.

#[cfg(test)]
mod mod_test;

pub mod driver;

use crate::bytecode::{self, SZ1, SZ2, SZ4, XLW, XSW};
use crate::dict::{self, DNODE_SIZE};
use crate::error::{ErrorCode, Panic, VmResult};
use crate::globals::ArenaSel;
use crate::memory::{Mem, RSIZE};
use crate::reader::{Reader, TOKEN_SIZE, read_at_least, scan, skip_line_comment};
use crate::slice::{Slc, cdata_size, cdata_write};
use crate::types::Ref;
use crate::vm::{Device, Machine, execute, step};

/// The compiler's one byte of persistent state: the current size
/// class in bytes (1, 2 or 4), set by `.` and consulted by `,`, `%`
/// and `^`. Defaults to [`RSIZE`], matching the original's `compiler =
/// (Compiler) { .sz = RSIZE, ... }`.
#[derive(Clone, Copy, Debug)]
pub struct CompilerState {
    pub sz: u8,
}

impl CompilerState {
    #[must_use]
    pub const fn new() -> Self {
        CompilerState { sz: RSIZE as u8 }
    }
}

impl Default for CompilerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Redirect `curBBA` to the scratch arena for the duration of `f`,
/// restoring the previous selection afterward regardless of outcome.
/// Backs nested/temporary compiles (spec.md §5's "a compilation may
/// switch `curBBA`"), concretely the original's `bbaTmp` usage.
pub fn with_scratch_arena<M: Mem, T>(
    m: &mut Machine<'_, M>,
    f: impl FnOnce(&mut Machine<'_, M>) -> VmResult<T>,
) -> VmResult<T> {
    let prev = m.globals.cur_bba;
    m.globals.cur_bba = ArenaSel::Scratch;
    let result = f(m);
    m.globals.cur_bba = prev;
    result
}

/// Dispatch one already-scanned token on its first character. `tok`
/// must be non-empty; callers (the compile loop) are responsible for
/// treating an empty token as end-of-input rather than calling here.
pub fn compile<M: Mem, D: Device<M>, R: Reader>(
    m: &mut Machine<'_, M>,
    reader: &mut R,
    device: &mut D,
    state: &mut CompilerState,
    tok: Slc,
) -> VmResult<()> {
    let c = m.mem.read_u8(tok.r)?;
    match c {
        b'.' => c_dot(m, reader, state),
        b'\\' => c_backslash(m, reader),
        b'#' => c_hash(m, reader),
        b'=' => c_equal(m, reader),
        b'@' => c_at(m, reader),
        b',' => c_comma(m, state),
        b'%' => c_percent(m, reader, state),
        b'^' => c_caret(m, reader, device, state),
        b'$' => c_dollar(m, reader, device),
        _ => Err(Panic::new(ErrorCode::CToken, m.globals.line)),
    }
}

/// `.` — read the next raw byte straight out of the file's buffer
/// (not a fresh scanned token: `.4` is two characters of one
/// directive, with no separating whitespace) and set the size class.
pub fn c_dot<M: Mem, R: Reader>(
    m: &mut Machine<'_, M>,
    reader: &mut R,
    state: &mut CompilerState,
) -> VmResult<()> {
    if m.globals.src.buf.plc >= m.globals.src.buf.len {
        read_at_least(reader, m.mem, &mut m.globals.src, 1)?;
    }
    if m.globals.src.buf.plc >= m.globals.src.buf.len {
        return Err(Panic::new(ErrorCode::Eof, m.globals.line));
    }
    let pos = m.globals.src.buf.r.add(m.globals.src.buf.plc);
    let c = m.mem.read_u8(pos)?;
    state.sz = char_to_sz(c, m.globals.line)?;
    m.globals.src.buf.plc += 1;
    Ok(())
}

/// `\` — line comment.
pub fn c_backslash<M: Mem, R: Reader>(m: &mut Machine<'_, M>, reader: &mut R) -> VmResult<()> {
    skip_line_comment(reader, m.mem, &mut m.globals.src, &mut m.globals.line)
}

/// `#` — scan a token, parse it as hex (`_` is a separator, never a
/// digit), push the result.
pub fn c_hash<M: Mem, R: Reader>(m: &mut Machine<'_, M>, reader: &mut R) -> VmResult<()> {
    let tok = scan(reader, m.mem, &mut m.globals.src, &mut m.globals.line)?;
    let mut value: u32 = 0;
    for i in 0..tok.len {
        let c = m.mem.read_u8(tok.r.add(i))?;
        if c == b'_' {
            continue;
        }
        value = (value << 4) | u32::from(hex_digit(c, m.globals.line)?);
    }
    ws_push(m, value)
}

/// `=` — pop meta then value, scan the name, write a cdata key and a
/// [`dict::DNode`](crate::dict) from the current arena, and insert.
pub fn c_equal<M: Mem, R: Reader>(m: &mut Machine<'_, M>, reader: &mut R) -> VmResult<()> {
    let meta = ws_pop(m)? as u8;
    let value = ws_pop(m)?;
    let tok = scan(reader, m.mem, &mut m.globals.src, &mut m.globals.line)?;

    let mut keybuf = [0u8; TOKEN_SIZE as usize];
    let keylen = tok.len as usize;
    keybuf[..keylen].copy_from_slice(m.mem.slice(tok.r, tok.len)?);

    let ckey = kbump(m, false, cdata_size(tok.len))?;
    cdata_write(m.mem, ckey, &keybuf[..keylen])?;

    let node = kbump(m, true, DNODE_SIZE)?;
    dict::init(m.mem, node, ckey, value, meta)?;

    let mut root = m.globals.dict_root;
    dict::add(m.mem, &mut root, node)?;
    m.globals.dict_root = root;
    Ok(())
}

/// `@` — scan a name, look it up, push its value.
pub fn c_at<M: Mem, R: Reader>(m: &mut Machine<'_, M>, reader: &mut R) -> VmResult<()> {
    let tok = scan(reader, m.mem, &mut m.globals.src, &mut m.globals.line)?;
    let node = dict::get(m.mem, m.globals.dict_root, tok)?;
    let v = dict::value(m.mem, node)?;
    ws_push(m, v)
}

/// `,` — pop a value, write it `sz` bytes big-endian at the bump
/// pointer.
pub fn c_comma<M: Mem>(m: &mut Machine<'_, M>, state: &CompilerState) -> VmResult<()> {
    let value = ws_pop(m)?;
    let r = kbump(m, false, u32::from(state.sz))?;
    m.mem.sr_be(r, state.sz, value)
}

/// `%` — scan an instruction mnemonic, write its opcode byte (or'd
/// with the size class if sized) at the bump pointer.
pub fn c_percent<M: Mem, R: Reader>(
    m: &mut Machine<'_, M>,
    reader: &mut R,
    state: &CompilerState,
) -> VmResult<()> {
    let instr = scan_instr(m, reader, state)?;
    let r = kbump(m, false, 1)?;
    m.mem.sr_be(r, 1, u32::from(instr))
}

/// `^` — scan an instruction mnemonic and execute it immediately, as
/// though EP already pointed at it.
pub fn c_caret<M: Mem, D: Device<M>, R: Reader>(
    m: &mut Machine<'_, M>,
    reader: &mut R,
    device: &mut D,
    state: &CompilerState,
) -> VmResult<()> {
    let instr = scan_instr(m, reader, state)?;
    m.thread.ep = m.thread.ep.add(1);
    step(m, device, instr)
}

/// `$` — scan a name and execute it: inline bodies are copied to the
/// heap verbatim, syntax functions get `asNow = false` pushed ahead
/// of their address, everything else dispatches `XLW`/`XSW` per the
/// large/small meta bit.
pub fn c_dollar<M: Mem, D: Device<M>, R: Reader>(
    m: &mut Machine<'_, M>,
    reader: &mut R,
    device: &mut D,
) -> VmResult<()> {
    let tok = scan(reader, m.mem, &mut m.globals.src, &mut m.globals.line)?;
    let node = dict::get(m.mem, m.globals.dict_root, tok)?;
    let meta = dict::meta_of(m.mem, node)?;
    let value = dict::value(m.mem, node)?;
    let fn_ty = meta & dict::meta::TY_FN_TY_MASK;

    if fn_ty == dict::meta::TY_FN_INLINE {
        let body = Ref::new(value);
        let len = u32::from(m.mem.read_u8(body)?);
        let dst = kbump(m, false, len)?;
        m.mem.copy_within(body.add(1), dst, len)?;
        return Ok(());
    }

    if fn_ty == dict::meta::TY_FN_SYN {
        ws_push(m, 0)?;
    }
    ws_push(m, value)?;

    let instr = if meta & dict::meta::TY_FN_LARGE != 0 {
        bytecode::encode(XLW, SZ4)
    } else {
        bytecode::encode(XSW, SZ4)
    };
    execute(m, device, instr)
}

/// Scan one instruction mnemonic from the dictionary, combining it
/// with the current size class when it belongs to the memory or jump
/// family (see [`bytecode::is_sized_family`]).
fn scan_instr<M: Mem, R: Reader>(
    m: &mut Machine<'_, M>,
    reader: &mut R,
    state: &CompilerState,
) -> VmResult<u8> {
    let tok = scan(reader, m.mem, &mut m.globals.src, &mut m.globals.line)?;
    let node = dict::get(m.mem, m.globals.dict_root, tok)?;
    let op = (dict::value(m.mem, node)? as u8) & bytecode::OP_MASK;
    if bytecode::is_sized_family(op) {
        Ok(bytecode::encode(op, size_class_byte(state.sz, m.globals.line)?))
    } else {
        Ok(op)
    }
}

fn char_to_sz(c: u8, line: u32) -> VmResult<u8> {
    match c {
        b'1' => Ok(1),
        b'2' => Ok(2),
        b'4' => Ok(4),
        b'R' => Ok(RSIZE as u8),
        _ => Err(Panic::new(ErrorCode::Sz, line)),
    }
}

fn size_class_byte(sz: u8, line: u32) -> VmResult<u8> {
    match sz {
        1 => Ok(SZ1),
        2 => Ok(SZ2),
        4 => Ok(SZ4),
        _ => Err(Panic::new(ErrorCode::Intern, line)),
    }
}

fn hex_digit(c: u8, line: u32) -> VmResult<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(Panic::new(ErrorCode::CHex, line)),
    }
}

/// Allocate from whichever arena `Globals::cur_bba` currently names,
/// failing `E_oom` on reservation failure rather than returning
/// `Ref::NULL` the way [`crate::memory::Bba`] itself does.
fn kbump<M: Mem>(m: &mut Machine<'_, M>, aligned: bool, size: u32) -> VmResult<Ref> {
    let (bba, ba) = match m.globals.cur_bba {
        ArenaSel::Code => (&mut m.kern.bba, &mut m.kern.ba),
        ArenaSel::Scratch => (&mut m.kern.bba_tmp, &mut m.kern.ba),
    };
    let r = if aligned {
        bba.alloc(ba, size as u16)?
    } else {
        bba.alloc_unaligned(ba, size as u16)?
    };
    if r.is_null() {
        return Err(Panic::new(ErrorCode::Oom, m.globals.line));
    }
    Ok(r)
}

fn ws_pop<M: Mem>(m: &mut Machine<'_, M>) -> VmResult<u32> {
    crate::stack::pop_reg(&mut m.thread.ws, m.mem)
}

fn ws_push<M: Mem>(m: &mut Machine<'_, M>, v: u32) -> VmResult<()> {
    crate::stack::push_reg(&mut m.thread.ws, m.mem, v)
}
