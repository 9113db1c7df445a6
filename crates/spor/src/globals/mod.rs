// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Kernel-owned allocators (`Kern`), the single execution thread
//! (`Thread`), and the process-wide compiler/runtime state
//! (`Globals`), plus `init` which lays all four out over a fresh
//! [`Image`].
//!
//! Unlike the source this crate descends from, `Kern`/`Thread`/
//! `Globals` are plain host structs rather than views mapped onto the
//! front of the image: the image holds only the bytes these
//! structures address (stack slots, arena blocks, the source token
//! buffer), which keeps the allocator/stack logic borrow-checkable
//! without `unsafe` pointer games.


use crate::error::VmResult;
use crate::log::Level;
use crate::memory::{Ba, Bba, BLOCK_SIZE, Image, RSIZE};
use crate::reader::{File, TOKEN_SIZE};
use crate::slice::{Buf, PlcBuf};
use crate::stack::Stk;
use crate::types::Ref;

/// Working-stack depth in `RSIZE` slots.
pub const WS_DEPTH: u32 = 16;
/// Call-stack depth in frames (shared by CS and CSZ).
pub const CS_DEPTH: u32 = 16;

/// Which bump arena a compilation is currently emitting into: the
/// long-lived code/dictionary arena, or the scratch arena used for
/// nested/temporary compiles (spec.md §5's "a compilation may switch
/// `curBBA`", concretely the original's `bbaTmp`).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ArenaSel {
    #[default]
    Code,
    Scratch,
}

/// Allocators shared by the whole process: the block pool and the two
/// bump arenas layered over it.
pub struct Kern {
    pub ba: Ba,
    pub bba: Bba,
    pub bba_tmp: Bba,
}

impl Kern {
    /// Borrow whichever arena `sel` names.
    pub fn arena_mut(&mut self, sel: ArenaSel) -> &mut Bba {
        match sel {
            ArenaSel::Code => &mut self.bba,
            ArenaSel::Scratch => &mut self.bba_tmp,
        }
    }
}

/// The single execution thread: its program counter and its four
/// stacks.
pub struct Thread {
    pub ep: Ref,
    pub ws: Stk,
    pub cs: Stk,
    pub csz: Stk,
    pub ls: Stk,
}

/// Process-wide compiler/runtime state threaded through every call.
pub struct Globals {
    /// General-purpose scratch buffer (numeric literal assembly,
    /// disassembly formatting).
    pub gbuf: Buf,
    /// The file currently being compiled.
    pub src: File,
    /// Current line number in `src`, for panic/diagnostic reporting.
    pub line: u32,
    /// Which arena `=`/`,`/`%` etc. currently allocate from.
    pub cur_bba: ArenaSel,
    /// Last VM-level error code, `0` when clear.
    pub err: u16,
    /// Host errno from the most recent I/O device op, distinct from
    /// `err`.
    pub syserr: i32,
    pub log_lvl_usr: Level,
    pub log_lvl_sys: Level,
    /// Root of the dictionary binary search tree, `Ref::NULL` when
    /// empty.
    pub dict_root: Ref,
}

const GBUF_SIZE: u32 = 256;

/// Lay `Kern`/`Thread`/`Globals` out over a fresh image of `total_blocks`
/// blocks: block 0 holds WS/CS/CSZ/gbuf/the source token buffer, block 1
/// is reserved whole for LS, and the block allocator manages every
/// block from index 2 onward — mirroring the upstream `initEnv`
/// layout, minus the header structs this port keeps off the image.
pub fn init(total_blocks: u32) -> VmResult<(Kern, Thread, Globals, Image)> {
    let image = Image::new(total_blocks);

    let ws = Stk::new(Ref::new(0), WS_DEPTH * RSIZE);
    let cs = Stk::new(ws.r.add(ws.cap), CS_DEPTH * RSIZE);
    let csz = Stk::new(cs.r.add(cs.cap), CS_DEPTH);
    let ls = Stk::new(Ref::new(BLOCK_SIZE), BLOCK_SIZE);

    let gbuf_ref = csz.r.add(csz.cap);
    let gbuf = Buf::new(gbuf_ref, GBUF_SIZE);
    let buf0_ref = gbuf_ref.add(GBUF_SIZE);

    let ba_cap = (total_blocks.saturating_sub(2)).min(u32::from(u8::MAX) - 1) as u8;
    let ba = Ba::init(Ref::new(BLOCK_SIZE * 2), ba_cap)?;

    let kern = Kern {
        ba,
        bba: Bba::new(),
        bba_tmp: Bba::new(),
    };
    let thread = Thread {
        ep: Ref::new(1),
        ws,
        cs,
        csz,
        ls,
    };
    let globals = Globals {
        gbuf,
        src: File::new(PlcBuf::new(buf0_ref, TOKEN_SIZE), -1),
        line: 1,
        cur_bba: ArenaSel::Code,
        err: 0,
        syserr: 0,
        log_lvl_usr: Level::Off,
        log_lvl_sys: Level::Off,
        dict_root: Ref::NULL,
    };

    Ok((kern, thread, globals, image))
}
