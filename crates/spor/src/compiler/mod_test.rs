// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the character-dispatched compiler handlers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::error::ErrorCode;
use crate::globals::{self, Globals, Kern, Thread};
use crate::memory::{BLOCK_SIZE, Image};
use crate::reader::{File, FileCode};
use crate::stack::push_reg;

/// A source-only [`Reader`]: serves the whole fixture in one `read`
/// call, same as `device::mod_test`'s mock but private to this module
/// since the upstream one lives behind a private sibling module.
struct MockReader {
    source: std::vec::Vec<u8>,
    pos: usize,
}

impl MockReader {
    fn new(source: &[u8]) -> Self {
        MockReader {
            source: source.to_vec(),
            pos: 0,
        }
    }
}

impl Reader for MockReader {
    fn open(&mut self, _file: &mut File) -> VmResult<()> {
        Ok(())
    }

    fn close(&mut self, _file: &mut File) -> VmResult<()> {
        Ok(())
    }

    fn read(&mut self, mem: &mut impl crate::memory::Mem, file: &mut File) -> VmResult<()> {
        if self.pos >= self.source.len() {
            file.code = FileCode::Eof;
            return Ok(());
        }
        let n = (self.source.len() - self.pos).min((file.buf.cap - file.buf.len) as usize);
        let dst = file.buf.r.add(file.buf.len);
        mem.slice_mut(dst, n as u32)?
            .copy_from_slice(&self.source[self.pos..self.pos + n]);
        file.buf.len += n as u32;
        self.pos += n;
        file.code = FileCode::Done;
        Ok(())
    }
}

struct NoopDevice;

impl<M: Mem> Device<M> for NoopDevice {
    fn dispatch(&mut self, _selector: u32, m: &mut Machine<'_, M>) -> VmResult<()> {
        Err(Panic::new(ErrorCode::Dv, m.globals.line))
    }
}

fn harness() -> (Kern, Thread, Globals, Image) {
    globals::init(4).unwrap()
}

fn push(thread: &mut Thread, mem: &mut Image, v: u32) {
    push_reg(&mut thread.ws, mem, v).unwrap();
}

fn pop(thread: &mut Thread, mem: &mut Image) -> u32 {
    crate::stack::pop_reg(&mut thread.ws, mem).unwrap()
}

/// Seed `globals.src.buf` as though a leading token character was
/// already scanned, with `rest` sitting right after it in the buffer —
/// the precondition `c_dot` relies on (it reads the raw next byte, not
/// a fresh scanned token).
fn seed_dot_buffer(globals: &mut Globals, mem: &mut Image, rest: &[u8]) {
    let r = globals.src.buf.r;
    mem.slice_mut(r, rest.len() as u32)
        .unwrap()
        .copy_from_slice(rest);
    globals.src.buf.len = rest.len() as u32;
    globals.src.buf.plc = 1;
}

#[test]
fn dot_sets_size_class_from_the_next_raw_byte() {
    let (mut kern, mut thread, mut globals, mut image) = harness();
    seed_dot_buffer(&mut globals, &mut image, b"4");
    let mut reader = MockReader::new(b"");
    let mut state = CompilerState::new();
    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };
    c_dot(&mut m, &mut reader, &mut state).unwrap();
    assert_eq!(state.sz, 4);
}

#[test]
fn dot_rejects_an_unrecognised_size_character() {
    let (mut kern, mut thread, mut globals, mut image) = harness();
    seed_dot_buffer(&mut globals, &mut image, b"9");
    let mut reader = MockReader::new(b"");
    let mut state = CompilerState::new();
    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };
    let err = c_dot(&mut m, &mut reader, &mut state).unwrap_err();
    assert_eq!(err.code, ErrorCode::Sz);
}

#[test]
fn hash_parses_hex_with_underscore_separators() {
    let (mut kern, mut thread, mut globals, mut image) = harness();
    let mut reader = MockReader::new(b"1_2");
    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };
    c_hash(&mut m, &mut reader).unwrap();
    assert_eq!(pop(m.thread, m.mem), 0x12);
}

#[test]
fn hash_rejects_a_non_hex_character() {
    let (mut kern, mut thread, mut globals, mut image) = harness();
    let mut reader = MockReader::new(b"1g2");
    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };
    let err = c_hash(&mut m, &mut reader).unwrap_err();
    assert_eq!(err.code, ErrorCode::CHex);
}

#[test]
fn equal_then_at_round_trip_through_the_dictionary() {
    let (mut kern, mut thread, mut globals, mut image) = harness();
    push(&mut thread, &mut image, 0x42); // value
    push(&mut thread, &mut image, 0); // meta
    let mut define_reader = MockReader::new(b"mid");
    {
        let mut m = Machine {
            mem: &mut image,
            kern: &mut kern,
            thread: &mut thread,
            globals: &mut globals,
        };
        c_equal(&mut m, &mut define_reader).unwrap();
    }

    let mut lookup_reader = MockReader::new(b"mid");
    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };
    c_at(&mut m, &mut lookup_reader).unwrap();
    assert_eq!(pop(m.thread, m.mem), 0x42);
}

#[test]
fn at_fails_on_an_undefined_name() {
    let (mut kern, mut thread, mut globals, mut image) = harness();
    let mut reader = MockReader::new(b"nope");
    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };
    let err = c_at(&mut m, &mut reader).unwrap_err();
    assert_eq!(err.code, ErrorCode::CNoKey);
}

#[test]
fn comma_writes_sz_bytes_at_the_bump_pointer() {
    let (mut kern, mut thread, mut globals, mut image) = harness();
    // First unaligned bump allocation in a fresh arena always lands at
    // the base of the block allocator's first reserved block.
    let first_ref = Ref::new(BLOCK_SIZE * 2);
    let mut state = CompilerState::new();
    state.sz = 2;
    push(&mut thread, &mut image, 0x1234);
    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };
    c_comma(&mut m, &state).unwrap();
    assert_eq!(m.mem.ft_be(first_ref, 2).unwrap(), 0x1234);
}

#[test]
fn percent_writes_the_opcode_ored_with_the_size_class() {
    let (mut kern, mut thread, mut globals, mut image) = harness();
    push(&mut thread, &mut image, u32::from(bytecode::FT)); // value
    push(&mut thread, &mut image, 0); // meta
    let mut define_reader = MockReader::new(b"ft");
    {
        let mut m = Machine {
            mem: &mut image,
            kern: &mut kern,
            thread: &mut thread,
            globals: &mut globals,
        };
        c_equal(&mut m, &mut define_reader).unwrap();
    }

    // "ft" costs a 3-byte cdata key (1 length byte + 2 chars) out of the
    // same unaligned arena `%` bumps from, so the opcode byte lands 3
    // bytes past the arena's base.
    let opcode_ref = Ref::new(BLOCK_SIZE * 2 + 3);
    let mut state = CompilerState::new();
    state.sz = 2;
    let mut percent_reader = MockReader::new(b"ft");
    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };
    c_percent(&mut m, &mut percent_reader, &state).unwrap();
    assert_eq!(
        m.mem.read_u8(opcode_ref).unwrap(),
        bytecode::encode(bytecode::FT, SZ2)
    );
}

#[test]
fn caret_executes_the_scanned_instruction_immediately() {
    let (mut kern, mut thread, mut globals, mut image) = harness();
    push(&mut thread, &mut image, u32::from(bytecode::ADD)); // value
    push(&mut thread, &mut image, 0); // meta
    let mut define_reader = MockReader::new(b"ad");
    {
        let mut m = Machine {
            mem: &mut image,
            kern: &mut kern,
            thread: &mut thread,
            globals: &mut globals,
        };
        c_equal(&mut m, &mut define_reader).unwrap();
    }

    push(&mut thread, &mut image, 3);
    push(&mut thread, &mut image, 4);
    let starting_ep = thread.ep;
    let mut caret_reader = MockReader::new(b"ad");
    let state = CompilerState::new();
    let mut device = NoopDevice;
    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };
    c_caret(&mut m, &mut caret_reader, &mut device, &state).unwrap();
    assert_eq!(pop(m.thread, m.mem), 7);
    assert_eq!(m.thread.ep, starting_ep.add(1));
}

#[test]
fn dollar_copies_an_inline_function_body_to_the_bump_pointer() {
    let (mut kern, mut thread, mut globals, mut image) = harness();
    let mut device = NoopDevice;

    let body_ref = {
        let mut m = Machine {
            mem: &mut image,
            kern: &mut kern,
            thread: &mut thread,
            globals: &mut globals,
        };
        let r = kbump(&mut m, false, 3).unwrap(); // len byte + 2 payload bytes
        m.mem.write_u8(r, 2).unwrap();
        m.mem
            .slice_mut(r.add(1), 2)
            .unwrap()
            .copy_from_slice(&[0xAA, 0xBB]);
        r
    };

    push(&mut thread, &mut image, body_ref.offset()); // value
    push(
        &mut thread,
        &mut image,
        u32::from(dict::meta::TY_FN | dict::meta::TY_FN_INLINE),
    ); // meta
    let mut define_reader = MockReader::new(b"inl");
    {
        let mut m = Machine {
            mem: &mut image,
            kern: &mut kern,
            thread: &mut thread,
            globals: &mut globals,
        };
        c_equal(&mut m, &mut define_reader).unwrap();
    }

    // The inline body's bytes land at the next unaligned slot, right
    // after the 3 bytes the `ckey` for "inl" itself just consumed.
    let dst_ref = Ref::new(BLOCK_SIZE * 2 + 3 + 4);
    let mut dollar_reader = MockReader::new(b"inl");
    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };
    c_dollar(&mut m, &mut dollar_reader, &mut device).unwrap();
    assert_eq!(m.mem.slice(dst_ref, 2).unwrap(), &[0xAA, 0xBB]);
}

#[test]
fn dollar_dispatches_a_small_normal_function_and_returns() {
    let (mut kern, mut thread, mut globals, mut image) = harness();
    let mut device = NoopDevice;
    let starting_ep = thread.ep;

    let body_ref = Ref::new(BLOCK_SIZE * 2 + 500);
    image
        .write_u8(body_ref, bytecode::encode(bytecode::RET, SZ1))
        .unwrap();

    push(&mut thread, &mut image, body_ref.offset()); // value
    push(
        &mut thread,
        &mut image,
        u32::from(dict::meta::TY_FN | dict::meta::TY_FN_NORMAL),
    ); // meta
    let mut define_reader = MockReader::new(b"foo");
    {
        let mut m = Machine {
            mem: &mut image,
            kern: &mut kern,
            thread: &mut thread,
            globals: &mut globals,
        };
        c_equal(&mut m, &mut define_reader).unwrap();
    }

    let mut dollar_reader = MockReader::new(b"foo");
    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };
    c_dollar(&mut m, &mut dollar_reader, &mut device).unwrap();
    assert!(m.thread.cs.is_empty());
    assert_eq!(m.thread.ep, starting_ep);
}
