// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Character classification and the re-entrant token scanner.
//!
//! Tokens are delimited directly in the file's place-buffer: `scan`
//! compacts the buffer so the next token starts at offset 0, then
//! extends `plc` while the character group stays compatible with the
//! first character's group.

use crate::error::{ErrorCode, Panic, VmResult};
use crate::memory::Mem;
use crate::slice::Slc;

use super::file::{File, Reader, read_at_least};

/// Bound on a single token's length; the place-buffer's capacity must
/// be at least this large.
pub const TOKEN_SIZE: u32 = 128;

/// A character's lexical class. Numeric, hex-digit and alpha
/// characters all freely mix within one token (so `1a2b` and `abc123`
/// are each single tokens); single-char tokens and whitespace never
/// extend a token they didn't start.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenGroup {
    Numeric,
    Hex,
    Alpha,
    Single,
    Symbol,
    White,
}

impl TokenGroup {
    /// Numeric/hex/alpha characters mix freely within a single token.
    const fn mixable(self) -> bool {
        matches!(self, TokenGroup::Numeric | TokenGroup::Hex | TokenGroup::Alpha)
    }
}

/// Classify one byte. The seven single-character tokens are `% \ $ | . ( )`.
#[must_use]
pub const fn classify(c: u8) -> TokenGroup {
    match c {
        b'0'..=b'9' => TokenGroup::Numeric,
        b'a'..=b'f' | b'A'..=b'F' | b'_' => TokenGroup::Hex,
        b'g'..=b'z' | b'G'..=b'Z' => TokenGroup::Alpha,
        b'%' | b'\\' | b'$' | b'|' | b'.' | b'(' | b')' => TokenGroup::Single,
        0..=b' ' => TokenGroup::White,
        _ => TokenGroup::Symbol,
    }
}

/// Scan the next token: skip whitespace (bumping `*line` on newlines),
/// compact the buffer, then extend `plc` per the group-matching rule.
/// Returns the token as a slice over the file's buffer; an empty slice
/// means the source is exhausted.
pub fn scan(
    reader: &mut impl Reader,
    mem: &mut impl Mem,
    file: &mut File,
    line: &mut u32,
) -> VmResult<Slc> {
    loop {
        if file.buf.plc >= file.buf.len {
            read_at_least(reader, mem, file, 1)?;
        }
        if file.buf.plc >= file.buf.len {
            return Ok(Slc::new(file.buf.r, 0));
        }
        let c = mem.read_u8(file.buf.r.add(file.buf.plc))?;
        if classify(c) != TokenGroup::White {
            break;
        }
        if c == b'\n' {
            *line += 1;
        }
        file.buf.plc += 1;
    }

    file.buf.compact(mem)?;
    if file.buf.len == 0 {
        read_at_least(reader, mem, file, 1)?;
    }
    if file.buf.len == 0 {
        return Ok(Slc::new(file.buf.r, 0));
    }

    let first = classify(mem.read_u8(file.buf.r)?);
    if first == TokenGroup::Single {
        file.buf.plc = 1;
        return Ok(Slc::new(file.buf.r, file.buf.plc));
    }

    loop {
        if file.buf.plc >= file.buf.len {
            if file.buf.plc >= file.buf.cap {
                return Err(Panic::new(ErrorCode::CTLen, *line));
            }
            read_at_least(reader, mem, file, 1)?;
            if file.buf.plc >= file.buf.len {
                break;
            }
        }
        let c = mem.read_u8(file.buf.r.add(file.buf.plc))?;
        let tg = classify(c);
        if tg != first && !(tg.mixable() && first.mixable()) {
            break;
        }
        file.buf.plc += 1;
    }

    Ok(Slc::new(file.buf.r, file.buf.plc))
}

/// Consume bytes up to and including the next newline, or through EOF
/// if none remains; increments `*line` when a newline terminates the
/// comment. Backs `\`'s line-comment dispatch and the scan device
/// op's comment-skip selector.
pub fn skip_line_comment(
    reader: &mut impl Reader,
    mem: &mut impl Mem,
    file: &mut File,
    line: &mut u32,
) -> VmResult<()> {
    loop {
        if file.buf.plc >= file.buf.len {
            file.buf.compact(mem)?;
            read_at_least(reader, mem, file, 1)?;
            if file.buf.plc >= file.buf.len {
                return Ok(());
            }
        }
        let c = mem.read_u8(file.buf.r.add(file.buf.plc))?;
        file.buf.plc += 1;
        if c == b'\n' {
            *line += 1;
            return Ok(());
        }
    }
}
