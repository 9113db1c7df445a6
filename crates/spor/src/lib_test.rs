// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! End-to-end fixtures for the six concrete scenarios: these exercise
//! the scanner, compiler, dictionary, arena and VM together rather
//! than any one module in isolation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::bytecode;
use crate::compiler::CompilerState;
use crate::compiler::driver::compile_file;
use crate::device::{HostDevice, selector};
use crate::error::{ErrorCode, VmResult};
use crate::globals::{self, Globals, Kern, Thread};
use crate::log::BufSink;
use crate::memory::{BLOCK_SIZE, Image, Mem};
use crate::reader::{File, FileCode, Reader, scan};
use crate::stack::{pop_reg, push_reg};
use crate::types::Ref;
use crate::vm::{Device, Machine, step};

/// Serves a fixed byte string in one `read` call. Private to this
/// module: the reader tests' own mock lives behind a private sibling
/// module and isn't reachable from here.
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

    fn read(&mut self, mem: &mut impl Mem, file: &mut File) -> VmResult<()> {
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
        Err(crate::error::Panic::new(ErrorCode::Dv, m.globals.line))
    }
}

fn harness() -> (Kern, Thread, Globals, Image) {
    globals::init(4).unwrap()
}

fn pop(thread: &mut Thread, mem: &Image) -> u32 {
    pop_reg(&mut thread.ws, mem).unwrap()
}

fn push(thread: &mut Thread, mem: &mut Image, v: u32) {
    push_reg(&mut thread.ws, mem, v).unwrap();
}

/// Scenario 1: push `0x10`, push `0x11`, execute ADD -> WS top =
/// `0x21`, one item remains; then DRP -> WS empty. Driven through the
/// compiler's `#`/`^` handlers rather than direct `step` calls, so the
/// scanner and dictionary lookup are exercised too.
#[test]
fn stack_arithmetic_through_source_text() {
    let (mut kern, mut thread, mut globals, mut image) = harness();
    let mut device = NoopDevice;
    let mut state = CompilerState::new();

    // Register "ad"/"dp" as ADD/DRP before compiling the program that
    // uses them, the same dictionary entries real source would create
    // with `#17 #0 =ad` / `#0C #0 =dp`.
    {
        let mut m = Machine {
            mem: &mut image,
            kern: &mut kern,
            thread: &mut thread,
            globals: &mut globals,
        };
        push_reg(&mut m.thread.ws, m.mem, u32::from(bytecode::ADD)).unwrap();
        push_reg(&mut m.thread.ws, m.mem, 0).unwrap();
        crate::compiler::c_equal(&mut m, &mut MockReader::new(b"ad")).unwrap();
        push_reg(&mut m.thread.ws, m.mem, u32::from(bytecode::DRP)).unwrap();
        push_reg(&mut m.thread.ws, m.mem, 0).unwrap();
        crate::compiler::c_equal(&mut m, &mut MockReader::new(b"dp")).unwrap();
    }

    {
        let mut m = Machine {
            mem: &mut image,
            kern: &mut kern,
            thread: &mut thread,
            globals: &mut globals,
        };
        let mut reader = MockReader::new(b"#10 #11 ^ad");
        compile_file(&mut m, &mut reader, &mut device, &mut state).unwrap();
        assert_eq!(m.thread.ws.len(), 4);
        assert_eq!(m.thread.ws.peek(m.mem, 4).unwrap(), 0x21);
    }

    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };
    let mut reader = MockReader::new(b"^dp");
    compile_file(&mut m, &mut reader, &mut device, &mut state).unwrap();
    assert!(m.thread.ws.is_empty());
}

/// Scenario 2: source `#1234` followed by `.2 ,` at heap address `H`
/// writes two bytes `0x12 0x34` big-endian at `H`; `ftBE(H,2) ==
/// 0x1234` afterward.
#[test]
fn literal_and_store() {
    let (mut kern, mut thread, mut globals, mut image) = harness();
    let mut reader = MockReader::new(b"#1234 .2 ,");
    let mut device = NoopDevice;
    let mut state = CompilerState::new();

    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };
    compile_file(&mut m, &mut reader, &mut device, &mut state).unwrap();
    assert!(m.thread.ws.is_empty());

    let h = Ref::new(BLOCK_SIZE * 2);
    assert_eq!(m.mem.ft_be(h, 2).unwrap(), 0x1234);
}

/// Scenario 3: source `#42 #0 =mid @mid` — first push `0x42` and `0`
/// (value, meta); `=mid` consumes them and inserts; `@mid` retrieves
/// the value back onto WS.
#[test]
fn dictionary_round_trip() {
    let (mut kern, mut thread, mut globals, mut image) = harness();
    let mut reader = MockReader::new(b"#42 #0 =mid @mid");
    let mut device = NoopDevice;
    let mut state = CompilerState::new();

    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };
    compile_file(&mut m, &mut reader, &mut device, &mut state).unwrap();
    assert_eq!(pop(m.thread, m.mem), 0x42);
    assert!(m.thread.ws.is_empty());
}

/// Scenario 4: source `hi there$==` scans to tokens `hi`, `there`,
/// `$`, `==`.
fn token_text(img: &Image, s: crate::slice::Slc) -> std::string::String {
    std::string::String::from_utf8(img.slice(s.r, s.len).unwrap().to_vec()).unwrap()
}

#[test]
fn scanner_groups() {
    let (_kern, _thread, _globals, mut image) = harness();
    let mut reader = MockReader::new(b"hi there$==");
    let mut file = File::new(crate::slice::PlcBuf::new(Ref::new(0), 64), -1);
    let mut line = 1u32;

    for want in ["hi", "there", "$", "=="] {
        let tok = scan(&mut reader, &mut image, &mut file, &mut line).unwrap();
        assert_eq!(token_text(&image, tok), want);
    }
    let eof = scan(&mut reader, &mut image, &mut file, &mut line).unwrap();
    assert_eq!(eof.len, 0);
}

/// Scenario 5: source `.4 #1002_3004` pushes `0x10023004` onto WS;
/// `_` is a separator, never a hex digit.
#[test]
fn hex_with_underscore() {
    let (mut kern, mut thread, mut globals, mut image) = harness();
    let mut reader = MockReader::new(b".4 #1002_3004");
    let mut device = NoopDevice;
    let mut state = CompilerState::new();

    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };
    compile_file(&mut m, &mut reader, &mut device, &mut state).unwrap();
    assert_eq!(pop(m.thread, m.mem), 0x1002_3004);
    assert!(m.thread.ws.is_empty());
}

/// Scenario 6: executing a function that divides by zero under
/// `catch` returns with WS = `{E_divZero}` and CS/LS restored to their
/// pre-call state.
#[test]
fn catch_recovers_a_division_by_zero() {
    let (mut kern, mut thread, mut globals, mut image) = harness();

    // The callee: growSz=0, then a single DIV_U instruction that pops
    // 0 (the divisor) over 1 (the dividend) straight off WS.
    let target = Ref::new(900);
    image.write_u8(target, 0).unwrap();
    image
        .write_u8(target.add(1), bytecode::encode(bytecode::DIV_U, 0))
        .unwrap();

    push(&mut thread, &mut image, 1); // dividend
    push(&mut thread, &mut image, 0); // divisor
    push(&mut thread, &mut image, target.offset()); // XLW target

    let cs_len_before = thread.cs.len();
    let ls_sp_before = thread.ls.sp;

    let mut device = HostDevice::new(MockReader::new(b""), BufSink::default());
    {
        let mut m = Machine {
            mem: &mut image,
            kern: &mut kern,
            thread: &mut thread,
            globals: &mut globals,
        };
        m.thread.ep = Ref::new(700);
        m.mem.write_u8(Ref::new(700), selector::CATCH as u8).unwrap();
        step(&mut m, &mut device, bytecode::encode(bytecode::DV, 0)).unwrap();
    }

    assert_eq!(thread.cs.len(), cs_len_before);
    assert_eq!(thread.ls.sp, ls_sp_before);
    assert_eq!(thread.ws.len(), 4);
    assert_eq!(pop(&mut thread, &image), u32::from(ErrorCode::DivZero.code()));
}
