// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The single memory image every other module addresses by [`Ref`],
//! plus the block allocator and bump arena layered over it.
//!
//! `Mem` plays the role `MemorySpace` plays in the VM this crate
//! descends from: a trait that can be backed by a plain owned buffer on
//! a host, or by a different backing store on a constrained target.
//! Unlike that trait, reads and writes here are explicit-width and
//! explicit-endianness, matching the big-endian codec the assembler and
//! VM share (`ft_be`/`sr_be`) rather than transmuting arbitrary `Copy`
//! types.


pub mod arena;
pub mod block;

pub use arena::Bba;
pub use block::Ba;

use crate::error::{ErrorCode, Panic, VmResult};
use crate::types::Ref;

/// `BLOCK_SIZE = 1 << BLOCK_PO2`; the unit of allocation for the block
/// allocator and bump arena.
pub const BLOCK_PO2: u32 = 12;
pub const BLOCK_SIZE: u32 = 1 << BLOCK_PO2;

/// Register size: the width of a working-stack slot and of a call-stack
/// saved execution pointer.
pub const RSIZE: u32 = 4;

/// Validate that `r` is non-null and `r + size` lies within the image,
/// the one function through which every typed view into the image is
/// produced. Arithmetic on a bare `Ref` outside this check is a bug.
pub fn bounds_check(len: u32, r: Ref, size: u32) -> VmResult<()> {
    if r.is_null() {
        return Err(Panic::new(ErrorCode::Null, 0));
    }
    let end = r
        .offset()
        .checked_add(size)
        .ok_or(Panic::new(ErrorCode::Oob, 0))?;
    if end > len {
        return Err(Panic::new(ErrorCode::Oob, 0));
    }
    Ok(())
}

/// Big-endian fetch of `sz` bytes (1, 2 or 4) from `bytes`, matching the
/// original's `ftBE`.
pub fn ft_be(bytes: &[u8], sz: u8) -> VmResult<u32> {
    match sz {
        1 => Ok(u32::from(bytes[0])),
        2 => Ok(u32::from(u16::from_be_bytes([bytes[0], bytes[1]]))),
        4 => Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        _ => Err(Panic::new(ErrorCode::Sz, 0)),
    }
}

/// Big-endian store of the low `sz` bytes (1, 2 or 4) of `value` into
/// `bytes`, matching the original's `srBE`.
pub fn sr_be(bytes: &mut [u8], sz: u8, value: u32) -> VmResult<()> {
    match sz {
        1 => {
            bytes[0] = value as u8;
        }
        2 => {
            let b = (value as u16).to_be_bytes();
            bytes[0] = b[0];
            bytes[1] = b[1];
        }
        4 => {
            let b = value.to_be_bytes();
            bytes[..4].copy_from_slice(&b);
        }
        _ => return Err(Panic::new(ErrorCode::Sz, 0)),
    }
    Ok(())
}

/// The memory image trait: every structure in the system — stacks,
/// arenas, dictionary nodes — is ultimately a view produced by one of
/// these operations over a single implementor.
pub trait Mem {
    /// Total image length in bytes.
    fn len(&self) -> u32;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slice(&self, r: Ref, len: u32) -> VmResult<&[u8]>;
    fn slice_mut(&mut self, r: Ref, len: u32) -> VmResult<&mut [u8]>;

    /// Big-endian fetch of 1/2/4 bytes at `r`.
    fn ft_be(&self, r: Ref, sz: u8) -> VmResult<u32> {
        ft_be(self.slice(r, u32::from(sz))?, sz)
    }

    /// Big-endian store of 1/2/4 bytes at `r`.
    fn sr_be(&mut self, r: Ref, sz: u8, value: u32) -> VmResult<()> {
        sr_be(self.slice_mut(r, u32::from(sz))?, sz, value)
    }

    fn read_u8(&self, r: Ref) -> VmResult<u8> {
        Ok(self.slice(r, 1)?[0])
    }

    fn write_u8(&mut self, r: Ref, v: u8) -> VmResult<()> {
        self.slice_mut(r, 1)?[0] = v;
        Ok(())
    }

    fn copy_within(&mut self, src: Ref, dst: Ref, len: u32) -> VmResult<()>;

    /// memcmp over two equal-length regions. `0` if equal, `-1`/`1` by
    /// first differing byte, matching `Slc_cmp`'s sign convention.
    fn memcmp(&self, a: Ref, b: Ref, len: u32) -> VmResult<i32> {
        let sa = self.slice(a, len)?;
        let sb = self.slice(b, len)?;
        Ok(match sa.cmp(sb) {
            core::cmp::Ordering::Less => -1,
            core::cmp::Ordering::Equal => 0,
            core::cmp::Ordering::Greater => 1,
        })
    }

    fn memset(&mut self, r: Ref, len: u32, value: u8) -> VmResult<()> {
        self.slice_mut(r, len)?.fill(value);
        Ok(())
    }
}

#[cfg(any(test, feature = "std"))]
pub use host::Image;

#[cfg(any(test, feature = "std"))]
mod host {
    use super::{Mem, bounds_check};
    use crate::error::VmResult;
    use crate::types::Ref;
    use std::{vec, vec::Vec};

    /// A heap-backed image, the host (`std`) implementation of [`Mem`].
    /// Sized to a whole number of blocks at construction.
    pub struct Image {
        bytes: Vec<u8>,
    }

    impl Image {
        /// Allocate a zeroed image of `blocks` blocks.
        #[must_use]
        pub fn new(blocks: u32) -> Self {
            Image {
                bytes: vec![0u8; (blocks * super::BLOCK_SIZE) as usize],
            }
        }

        #[must_use]
        pub fn raw(&self) -> &[u8] {
            &self.bytes
        }

        #[must_use]
        pub fn raw_mut(&mut self) -> &mut [u8] {
            &mut self.bytes
        }
    }

    impl Mem for Image {
        fn len(&self) -> u32 {
            self.bytes.len() as u32
        }

        fn slice(&self, r: Ref, len: u32) -> VmResult<&[u8]> {
            bounds_check(self.len(), r, len)?;
            let start = r.offset() as usize;
            Ok(&self.bytes[start..start + len as usize])
        }

        fn slice_mut(&mut self, r: Ref, len: u32) -> VmResult<&mut [u8]> {
            bounds_check(self.len(), r, len)?;
            let start = r.offset() as usize;
            Ok(&mut self.bytes[start..start + len as usize])
        }

        fn copy_within(&mut self, src: Ref, dst: Ref, len: u32) -> VmResult<()> {
            bounds_check(self.len(), src, len)?;
            bounds_check(self.len(), dst, len)?;
            let src = src.offset() as usize;
            let dst = dst.offset() as usize;
            self.bytes.copy_within(src..src + len as usize, dst);
            Ok(())
        }
    }
}
