// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The block allocator (BA): a fixed-size block pool managed by two
//! doubly-linked index chains (the free chain and, per client, an
//! owned chain), so that a whole client chain can be released in one
//! `free_all` without walking the image itself.

#[cfg(test)]
mod block_test;

use crate::error::{ErrorCode, Panic, VmResult};
use crate::types::Ref;

use super::BLOCK_PO2;

#[cfg(any(test, feature = "std"))]
use std::{vec, vec::Vec};

#[cfg(not(any(test, feature = "std")))]
use alloc::{vec, vec::Vec};

/// Sentinel marking "no next/previous node" — the end of a chain.
pub const BLOCK_END: u8 = 0xFF;

/// One node in the allocator's parallel index array.
#[derive(Clone, Copy, Debug, Default)]
pub struct BANode {
    pub previ: u8,
    pub nexti: u8,
}

/// Owns a contiguous range of blocks plus the node array tracking
/// which chain each block belongs to.
pub struct Ba {
    /// Offset of the first block this allocator owns.
    blocks: Ref,
    /// Number of blocks owned.
    cap: u8,
    /// Free-chain root index, or `BLOCK_END` if empty.
    rooti: u8,
    nodes: Vec<BANode>,
}

impl Ba {
    /// Link `cap` blocks starting at `blocks` into one free chain.
    /// `cap` must be strictly less than `BLOCK_END` (0xFF is reserved).
    pub fn init(blocks: Ref, cap: u8) -> VmResult<Self> {
        if cap == BLOCK_END {
            return Err(Panic::new(ErrorCode::Intern, 0));
        }
        let mut nodes = vec![BANode::default(); cap as usize];
        let mut previ = BLOCK_END;
        for (i, node) in nodes.iter_mut().enumerate() {
            node.previ = previ;
            node.nexti = if i as u8 + 1 == cap {
                BLOCK_END
            } else {
                i as u8 + 1
            };
            previ = i as u8;
        }
        Ok(Ba {
            blocks,
            cap,
            rooti: if cap == 0 { BLOCK_END } else { 0 },
            nodes,
        })
    }

    #[must_use]
    pub const fn cap(&self) -> u8 {
        self.cap
    }

    pub(crate) fn block(&self, index: u8) -> Ref {
        self.blocks.add(u32::from(index) << BLOCK_PO2)
    }

    fn index_of(&self, block: Ref) -> VmResult<u8> {
        if block.offset() < self.blocks.offset() {
            return Err(Panic::new(ErrorCode::Oob, 0));
        }
        let delta = (block.offset() - self.blocks.offset()) >> BLOCK_PO2;
        if delta >= u32::from(self.cap) {
            return Err(Panic::new(ErrorCode::Oob, 0));
        }
        Ok(delta as u8)
    }

    /// Detach the free-chain root and push it onto the client chain.
    /// Returns `Ref::NULL` on exhaustion — allocators never panic on
    /// their own exhaustion, callers decide.
    pub fn alloc(&mut self, client_rooti: &mut u8) -> VmResult<Ref> {
        let di = self.rooti;
        if di == BLOCK_END {
            return Ok(Ref::NULL);
        }
        self.rooti = self.nodes[di as usize].nexti;
        if self.rooti != BLOCK_END {
            self.nodes[self.rooti as usize].previ = BLOCK_END;
        }
        if self.nodes[di as usize].previ != BLOCK_END {
            return Err(Panic::new(ErrorCode::Intern, 0));
        }

        self.nodes[di as usize].nexti = *client_rooti;
        if *client_rooti != BLOCK_END {
            self.nodes[*client_rooti as usize].previ = di;
        }
        *client_rooti = di;
        Ok(self.block(di))
    }

    /// Splice `block` out of the client chain and push it onto the
    /// free chain. `block` must lie within this allocator's range and
    /// currently belong to the client chain rooted at `client_rooti`.
    pub fn free(&mut self, client_rooti: &mut u8, block: Ref) -> VmResult<()> {
        let ci = self.index_of(block)?;

        if ci == *client_rooti {
            if self.nodes[ci as usize].previ != BLOCK_END {
                return Err(Panic::new(ErrorCode::Intern, 0));
            }
            *client_rooti = self.nodes[ci as usize].nexti;
            if *client_rooti != BLOCK_END {
                self.nodes[*client_rooti as usize].previ = BLOCK_END;
            }
        } else {
            let (previ, nexti) = (self.nodes[ci as usize].previ, self.nodes[ci as usize].nexti);
            self.nodes[previ as usize].nexti = nexti;
            if nexti != BLOCK_END {
                self.nodes[nexti as usize].previ = previ;
            }
        }

        self.nodes[ci as usize].nexti = self.rooti;
        if self.rooti != BLOCK_END {
            self.nodes[self.rooti as usize].previ = ci;
        }
        self.rooti = ci;
        self.nodes[ci as usize].previ = BLOCK_END;
        Ok(())
    }

    /// Repeatedly free the client chain's root until it is empty.
    pub fn free_all(&mut self, client_rooti: &mut u8) -> VmResult<()> {
        while *client_rooti != BLOCK_END {
            let b = self.block(*client_rooti);
            self.free(client_rooti, b)?;
        }
        Ok(())
    }

    /// Debug helper: is `index` currently on the free chain?
    #[cfg(test)]
    fn previ(&self, index: u8) -> u8 {
        self.nodes[index as usize].previ
    }

    #[cfg(test)]
    fn nexti(&self, index: u8) -> u8 {
        self.nodes[index as usize].nexti
    }

    #[cfg(test)]
    const fn rooti(&self) -> u8 {
        self.rooti
    }
}
