// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The dictionary: an unbalanced binary search tree of [`DNode`]
//! records, keyed by lexicographic comparison of cdata byte strings.
//! No rebalancing — worst case degenerates to a linked list, same as
//! the assembler it serves.


use crate::error::{ErrorCode, Panic, VmResult};
use crate::memory::Mem;
use crate::slice::{Slc, cdata_slc};
use crate::types::Ref;

/// `DNode { ckey: ref->cdata, l, r: ref->DNode, v: u32, m1: meta byte }`,
/// packed to 20 bytes (aligned to `RSIZE` for bump-arena friendliness).
pub const DNODE_SIZE: u32 = 20;

mod field {
    pub const CKEY: u32 = 0;
    pub const L: u32 = 4;
    pub const R: u32 = 8;
    pub const V: u32 = 12;
    pub const M1: u32 = 16;
}

/// Meta-byte tag bits, reusing the layout of the higher-level `TY_*`
/// constants this dictionary format was bootstrapped from: bits 7-6
/// classify the entry kind, the rest qualify function entries.
pub mod meta {
    pub const TY_MASK: u8 = 0xC0;
    pub const TY_CONST: u8 = 0x00;
    pub const TY_VAR: u8 = 0x40;
    pub const TY_FN: u8 = 0x80;
    pub const TY_DICT: u8 = 0xC0;

    pub const TY_FN_NATIVE: u8 = 0x20;
    /// Not part of the upstream constant table: this core additionally
    /// needs to distinguish functions with a locals frame (`XL`/`XLW`)
    /// from those without (`XS`/`XSW`); it reuses an otherwise-unused
    /// bit in the function-entry byte for that.
    pub const TY_FN_LARGE: u8 = 0x10;
    pub const TY_FN_TY_MASK: u8 = 0x07;
    pub const TY_FN_NORMAL: u8 = 0x00;
    pub const TY_FN_NOW: u8 = 0x01;
    pub const TY_FN_SYN: u8 = 0x02;
    pub const TY_FN_INLINE: u8 = 0x03;
    pub const TY_FN_COMMENT: u8 = 0x04;
}

fn ckey(mem: &impl Mem, node: Ref) -> VmResult<Ref> {
    Ok(Ref::new(mem.ft_be(node.add(field::CKEY), 4)?))
}

fn set_ckey(mem: &mut impl Mem, node: Ref, v: Ref) -> VmResult<()> {
    mem.sr_be(node.add(field::CKEY), 4, v.offset())
}

fn l(mem: &impl Mem, node: Ref) -> VmResult<Ref> {
    Ok(Ref::new(mem.ft_be(node.add(field::L), 4)?))
}

fn set_l(mem: &mut impl Mem, node: Ref, v: Ref) -> VmResult<()> {
    mem.sr_be(node.add(field::L), 4, v.offset())
}

fn r(mem: &impl Mem, node: Ref) -> VmResult<Ref> {
    Ok(Ref::new(mem.ft_be(node.add(field::R), 4)?))
}

fn set_r(mem: &mut impl Mem, node: Ref, v: Ref) -> VmResult<()> {
    mem.sr_be(node.add(field::R), 4, v.offset())
}

/// Read a node's value.
pub fn value(mem: &impl Mem, node: Ref) -> VmResult<u32> {
    mem.ft_be(node.add(field::V), 4)
}

pub fn set_value(mem: &mut impl Mem, node: Ref, v: u32) -> VmResult<()> {
    mem.sr_be(node.add(field::V), 4, v)
}

/// Read a node's meta byte.
pub fn meta_of(mem: &impl Mem, node: Ref) -> VmResult<u8> {
    mem.read_u8(node.add(field::M1))
}

pub fn set_meta(mem: &mut impl Mem, node: Ref, m1: u8) -> VmResult<()> {
    mem.write_u8(node.add(field::M1), m1)
}

/// Initialize a freshly allocated node's fixed fields.
pub fn init(
    mem: &mut impl Mem,
    node: Ref,
    key: Ref,
    value_v: u32,
    m1: u8,
) -> VmResult<()> {
    set_ckey(mem, node, key)?;
    set_l(mem, node, Ref::NULL)?;
    set_r(mem, node, Ref::NULL)?;
    set_value(mem, node, value_v)?;
    set_meta(mem, node, m1)?;
    Ok(())
}

/// Walk from `root` comparing `key` against each node's stored cdata
/// key. Returns `(0, matching_node)` on an exact match, or
/// `(sign_of_last_comparison, last_visited_node)` when the key is
/// absent — matching `Dict_find`'s "`0` if the tree is empty" contract.
pub fn find(mem: &impl Mem, root: Ref, key: Slc) -> VmResult<(i32, Ref)> {
    if root.is_null() {
        return Ok((0, root));
    }
    let mut node = root;
    loop {
        let node_key = cdata_slc(mem, ckey(mem, node)?)?;
        let cmp = key.cmp(node_key, mem)?;
        if cmp == 0 {
            return Ok((0, node));
        }
        let child = if cmp < 0 { l(mem, node)? } else { r(mem, node)? };
        if child.is_null() {
            return Ok((cmp, node));
        }
        node = child;
    }
}

/// Insert `new_node` (already initialized via [`init`], with its `ckey`
/// pointing at the key to insert under) into the tree rooted at
/// `*root`. Fails with `E_cKey` on an exact-match collision.
pub fn add(mem: &mut impl Mem, root: &mut Ref, new_node: Ref) -> VmResult<()> {
    if root.is_null() {
        *root = new_node;
        return Ok(());
    }
    let key = cdata_slc(mem, ckey(mem, new_node)?)?;
    let (cmp, parent) = find(mem, *root, key)?;
    if cmp == 0 {
        return Err(Panic::new(ErrorCode::CKey, 0));
    }
    if cmp < 0 {
        set_l(mem, parent, new_node)?;
    } else {
        set_r(mem, parent, new_node)?;
    }
    set_l(mem, new_node, Ref::NULL)?;
    set_r(mem, new_node, Ref::NULL)?;
    Ok(())
}

/// Find `key` under `root`, failing with `E_cNoKey` if absent.
pub fn get(mem: &impl Mem, root: Ref, key: Slc) -> VmResult<Ref> {
    let (cmp, node) = find(mem, root, key)?;
    if cmp != 0 {
        return Err(Panic::new(ErrorCode::CNoKey, 0));
    }
    Ok(node)
}
