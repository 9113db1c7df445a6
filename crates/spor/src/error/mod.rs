// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Error codes and the panic type threaded through the dispatch loop.
//!
//! There are no `thiserror`/`anyhow` dependencies anywhere in this
//! crate's lineage, so errors here are a plain enum with a manual
//! `Display`, matching `RuntimeError`/`IntrinsicError`/`CompileError` in
//! the VM this crate descends from.


use core::fmt;

/// A 16-bit error code. All core codes occupy the `0xE0xx` range, the
/// same numbering band used by the compiled-in `E_io`/`E_unreach`
/// constants observed in the upstream error table; codes at or above
/// `0xE080` are reserved for layers built on top of this core and are
/// carried as [`ErrorCode::Other`] without further interpretation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u16)]
pub enum ErrorCode {
    /// Dereference of the null reference.
    Null = 0xE000,
    /// Reference plus size exceeds the image bound.
    Oob = 0xE001,
    /// Stack pop with insufficient data.
    StkUnd = 0xE002,
    /// Stack push with insufficient capacity.
    StkOvr = 0xE004,
    /// Invalid operand size (must be 1, 2 or 4).
    Sz = 0xE005,
    /// Division or modulo by zero.
    DivZero = 0xE006,
    /// Internal invariant violated; never reachable in correct code.
    Intern = 0xE007,
    /// A call's locals-grow size was not a multiple of `RSIZE`.
    Align4 = 0xE008,
    /// Arena or block allocator exhausted.
    Oom = 0xE009,
    /// A bump arena failed to reserve a fresh block.
    NewBlock = 0xE00A,
    /// Unknown opcode byte.
    CInstr = 0xE00B,
    /// Unknown register selector byte.
    CReg = 0xE00C,
    /// Compiler saw an unrecognised leading token character.
    CToken = 0xE00D,
    /// Dictionary insertion of an already-present key.
    CKey = 0xE00E,
    /// Dictionary lookup of a missing key.
    CNoKey = 0xE00F,
    /// File/reader I/O error escalated to a panic.
    Io = 0xE010,
    /// Non-hex, non-`_` character in a `#` numeric literal.
    CHex = 0xE011,
    /// Scanned token exceeded `TOKEN_SIZE`.
    CTLen = 0xE012,
    /// End of file reached where more input was required.
    Eof = 0xE013,
    /// Unknown device-operation selector.
    Dv = 0xE014,
    /// Any code outside the core's own table, e.g. from a layer built
    /// on top of this assembler.
    Other(u16),
}

impl ErrorCode {
    /// The raw 16-bit value stored in `Globals::err`.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            ErrorCode::Null => 0xE000,
            ErrorCode::Oob => 0xE001,
            ErrorCode::StkUnd => 0xE002,
            ErrorCode::StkOvr => 0xE004,
            ErrorCode::Sz => 0xE005,
            ErrorCode::DivZero => 0xE006,
            ErrorCode::Intern => 0xE007,
            ErrorCode::Align4 => 0xE008,
            ErrorCode::Oom => 0xE009,
            ErrorCode::NewBlock => 0xE00A,
            ErrorCode::CInstr => 0xE00B,
            ErrorCode::CReg => 0xE00C,
            ErrorCode::CToken => 0xE00D,
            ErrorCode::CKey => 0xE00E,
            ErrorCode::CNoKey => 0xE00F,
            ErrorCode::Io => 0xE010,
            ErrorCode::CHex => 0xE011,
            ErrorCode::CTLen => 0xE012,
            ErrorCode::Eof => 0xE013,
            ErrorCode::Dv => 0xE014,
            ErrorCode::Other(v) => v,
        }
    }

    /// Decode a raw 16-bit value back into a named code, falling back
    /// to `Other` for anything this core doesn't define.
    #[must_use]
    pub const fn from_code(v: u16) -> Self {
        match v {
            0xE000 => ErrorCode::Null,
            0xE001 => ErrorCode::Oob,
            0xE002 => ErrorCode::StkUnd,
            0xE004 => ErrorCode::StkOvr,
            0xE005 => ErrorCode::Sz,
            0xE006 => ErrorCode::DivZero,
            0xE007 => ErrorCode::Intern,
            0xE008 => ErrorCode::Align4,
            0xE009 => ErrorCode::Oom,
            0xE00A => ErrorCode::NewBlock,
            0xE00B => ErrorCode::CInstr,
            0xE00C => ErrorCode::CReg,
            0xE00D => ErrorCode::CToken,
            0xE00E => ErrorCode::CKey,
            0xE00F => ErrorCode::CNoKey,
            0xE010 => ErrorCode::Io,
            0xE011 => ErrorCode::CHex,
            0xE012 => ErrorCode::CTLen,
            0xE013 => ErrorCode::Eof,
            0xE014 => ErrorCode::Dv,
            other => ErrorCode::Other(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::Null => "E_null",
            ErrorCode::Oob => "E_oob",
            ErrorCode::StkUnd => "E_stkUnd",
            ErrorCode::StkOvr => "E_stkOvr",
            ErrorCode::Sz => "E_sz",
            ErrorCode::DivZero => "E_divZero",
            ErrorCode::Intern => "E_intern",
            ErrorCode::Align4 => "E_align4",
            ErrorCode::Oom => "E_oom",
            ErrorCode::NewBlock => "E_newBlock",
            ErrorCode::CInstr => "E_cInstr",
            ErrorCode::CReg => "E_cReg",
            ErrorCode::CToken => "E_cToken",
            ErrorCode::CKey => "E_cKey",
            ErrorCode::CNoKey => "E_cNoKey",
            ErrorCode::Io => "E_io",
            ErrorCode::CHex => "E_cHex",
            ErrorCode::CTLen => "E_cTLen",
            ErrorCode::Eof => "E_eof",
            ErrorCode::Dv => "E_dv",
            ErrorCode::Other(v) => return write!(f, "E_0x{v:04X}"),
        };
        write!(f, "{name} (0x{:04X})", self.code())
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for ErrorCode {}

/// A non-local exit raised by `SET_ERR`/`ASM_ASSERT` in the original:
/// the error code plus the source line active when it fired. Threaded
/// through the dispatch loop as a `Result` rather than a `longjmp`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Panic {
    pub code: ErrorCode,
    pub line: u32,
}

impl Panic {
    #[must_use]
    pub const fn new(code: ErrorCode, line: u32) -> Self {
        Panic { code, line }
    }
}

impl fmt::Display for Panic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}", self.code, self.line)
    }
}

#[cfg(any(test, feature = "std"))]
impl std::error::Error for Panic {}

/// The result type threaded through the VM, compiler and allocators.
pub type VmResult<T> = Result<T, Panic>;
