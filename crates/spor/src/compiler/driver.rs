// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The outer compile loop: scan, dispatch, repeat until the source is
//! exhausted.

#[cfg(test)]
mod driver_test;

use super::{CompilerState, compile};
use crate::error::VmResult;
use crate::memory::Mem;
use crate::reader::{Reader, scan};
use crate::vm::{Device, Machine};

/// Scan and compile tokens until `scan` returns an empty token, i.e.
/// the source is exhausted.
pub fn compile_loop<M: Mem, D: Device<M>, R: Reader>(
    m: &mut Machine<'_, M>,
    reader: &mut R,
    device: &mut D,
    state: &mut CompilerState,
) -> VmResult<()> {
    loop {
        let tok = scan(reader, m.mem, &mut m.globals.src, &mut m.globals.line)?;
        if tok.len == 0 {
            return Ok(());
        }
        compile(m, reader, device, state, tok)?;
    }
}

/// Compile a whole file: reset the line counter, open the reader's
/// source, run [`compile_loop`] to completion, and close it — the
/// close happens whether or not the loop succeeded, but a loop error
/// takes priority over a close error.
pub fn compile_file<M: Mem, D: Device<M>, R: Reader>(
    m: &mut Machine<'_, M>,
    reader: &mut R,
    device: &mut D,
    state: &mut CompilerState,
) -> VmResult<()> {
    m.globals.line = 1;
    reader.open(&mut m.globals.src)?;
    let result = compile_loop(m, reader, device, state);
    reader.close(&mut m.globals.src)?;
    result
}
