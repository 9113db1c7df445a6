// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The block bump arena (BBA): a two-ended bump pointer over one
//! [`Ba`], reserving a fresh block whenever the current one can't fit
//! the next request.

#[cfg(test)]
mod arena_test;

use crate::error::VmResult;
use crate::types::Ref;

use super::BLOCK_SIZE;
use super::block::{BLOCK_END, Ba};

/// Bump arena layered over a [`Ba`]. `len` grows up from the block's
/// base (unaligned allocations); `cap` shrinks down from the block's
/// top (aligned allocations). The block is exhausted when the two
/// pointers would cross.
pub struct Bba {
    rooti: u8,
    len: u16,
    cap: u16,
}

impl Bba {
    #[must_use]
    pub const fn new() -> Self {
        Bba {
            rooti: BLOCK_END,
            len: 0,
            cap: 0,
        }
    }

    fn reserve_if_small(&mut self, ba: &mut Ba, size: u16) -> VmResult<bool> {
        if u32::from(self.cap) < u32::from(self.len) + u32::from(size) {
            let r = ba.alloc(&mut self.rooti)?;
            if r.is_null() {
                return Ok(false);
            }
            self.len = 0;
            self.cap = BLOCK_SIZE as u16;
        }
        Ok(true)
    }

    /// Allocate `size` bytes from the top of the current block. Callers
    /// are responsible for passing a size that respects their own
    /// alignment; the arena enforces none. Returns `Ref::NULL` on
    /// reservation failure.
    pub fn alloc(&mut self, ba: &mut Ba, size: u16) -> VmResult<Ref> {
        if !self.reserve_if_small(ba, size)? {
            return Ok(Ref::NULL);
        }
        self.cap -= size;
        Ok(ba.block(self.rooti).add(u32::from(self.cap)))
    }

    /// Allocate `size` bytes from the bottom of the current block.
    pub fn alloc_unaligned(&mut self, ba: &mut Ba, size: u16) -> VmResult<Ref> {
        if !self.reserve_if_small(ba, size)? {
            return Ok(Ref::NULL);
        }
        let out = ba.block(self.rooti).add(u32::from(self.len));
        self.len += size;
        Ok(out)
    }

    /// Return the entire block chain owned by this arena to `ba` in
    /// one operation.
    pub fn drop_all(&mut self, ba: &mut Ba) -> VmResult<()> {
        ba.free_all(&mut self.rooti)?;
        self.len = 0;
        self.cap = 0;
        Ok(())
    }
}

impl Default for Bba {
    fn default() -> Self {
        Self::new()
    }
}
