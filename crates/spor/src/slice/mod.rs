// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Views over the image: slices, growable buffers, and the
//! length-prefixed counted-data encoding used for dictionary keys.


use crate::error::{ErrorCode, Panic, VmResult};
use crate::memory::Mem;
use crate::types::Ref;

/// A read-only view `{ref, len}` over the image.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Slc {
    pub r: Ref,
    pub len: u32,
}

impl Slc {
    #[must_use]
    pub const fn new(r: Ref, len: u32) -> Self {
        Slc { r, len }
    }

    /// Byte-wise lexicographic comparison: a shorter slice sorts before
    /// a longer one sharing its prefix. Returns -1/0/+1.
    pub fn cmp(self, other: Slc, mem: &impl Mem) -> VmResult<i32> {
        let a = mem.slice(self.r, self.len)?;
        let b = mem.slice(other.r, other.len)?;
        Ok(match a.cmp(b) {
            core::cmp::Ordering::Less => -1,
            core::cmp::Ordering::Equal => 0,
            core::cmp::Ordering::Greater => 1,
        })
    }
}

/// A growable view `{ref, len, cap}` over the image.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Buf {
    pub r: Ref,
    pub len: u32,
    pub cap: u32,
}

impl Buf {
    #[must_use]
    pub const fn new(r: Ref, cap: u32) -> Self {
        Buf { r, len: 0, cap }
    }

    #[must_use]
    pub const fn as_slc(self) -> Slc {
        Slc::new(self.r, self.len)
    }

    #[must_use]
    pub const fn remaining(self) -> u32 {
        self.cap - self.len
    }
}

/// A cursor `{ref, len, cap, plc}` into a bounded buffer, used by the
/// scanner: `plc` marks how much of `[0, len)` has already been
/// consumed by the caller.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PlcBuf {
    pub r: Ref,
    pub len: u32,
    pub cap: u32,
    pub plc: u32,
}

impl PlcBuf {
    #[must_use]
    pub const fn new(r: Ref, cap: u32) -> Self {
        PlcBuf {
            r,
            len: 0,
            cap,
            plc: 0,
        }
    }

    #[must_use]
    pub const fn as_buf(self) -> Buf {
        Buf {
            r: self.r,
            len: self.len,
            cap: self.cap,
        }
    }

    /// Shift the unconsumed tail `[plc, len)` down to offset 0, so the
    /// next token starts at the front of the buffer.
    pub fn compact(&mut self, mem: &mut impl Mem) -> VmResult<()> {
        if self.plc == 0 {
            return Ok(());
        }
        let tail = self.len - self.plc;
        if tail > 0 {
            mem.copy_within(self.r.add(self.plc), self.r, tail)?;
        }
        self.len = tail;
        self.plc = 0;
        Ok(())
    }
}

/// Read a cdata value (one length byte followed by that many payload
/// bytes) at `r` as a [`Slc`] over just its payload.
pub fn cdata_slc(mem: &impl Mem, r: Ref) -> VmResult<Slc> {
    let len = u32::from(mem.read_u8(r)?);
    Ok(Slc::new(r.add(1), len))
}

/// Write `payload` as a cdata value at `r`: the length byte followed by
/// the bytes themselves. `payload.len()` must fit in a `u8`.
pub fn cdata_write(mem: &mut impl Mem, r: Ref, payload: &[u8]) -> VmResult<()> {
    if payload.len() > 0xFF {
        return Err(Panic::new(ErrorCode::CTLen, 0));
    }
    mem.write_u8(r, payload.len() as u8)?;
    mem.slice_mut(r.add(1), payload.len() as u32)?
        .copy_from_slice(payload);
    Ok(())
}

/// Total size in bytes of a cdata value holding `payload_len` bytes.
#[must_use]
pub const fn cdata_size(payload_len: u32) -> u32 {
    1 + payload_len
}
