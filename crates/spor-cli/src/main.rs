// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Host command-line front end: compile a single source, from a path
//! argument or from stdin, printing a fatal panic's error code and
//! source line to stderr and exiting non-zero.
//!
//! This is the minimal host shell needed to exercise the compile
//! driver at all, not a demonstration or test harness in its own
//! right: it takes no flags, runs one file to completion, and reports
//! exactly the outcome the core crate gives it.

mod host_reader;

use std::process::ExitCode;

use spor::compiler::CompilerState;
use spor::compiler::driver::compile_file;
use spor::device::HostDevice;
use spor::globals;
use spor::log::StderrSink;
use spor::vm::Machine;

use host_reader::{HostReader, HostSource};

fn main() -> ExitCode {
    let source = match std::env::args().nth(1) {
        Some(path) => HostSource::Path(std::path::PathBuf::from(path)),
        None => HostSource::Stdin,
    };

    let (mut kern, mut thread, mut globals, mut image) = match globals::init(256) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("spor: failed to initialise image: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut reader = HostReader::new(source.clone());
    // The device table's own `file`/`scan` selectors operate on a
    // self-hosted program's file opens, independent of the top-level
    // source the driver is already scanning; give it an unopened
    // reader over the same source so a program that reopens its own
    // input sees the same bytes.
    let mut device = HostDevice::new(HostReader::new(source), StderrSink);
    let mut state = CompilerState::new();

    let mut m = Machine {
        mem: &mut image,
        kern: &mut kern,
        thread: &mut thread,
        globals: &mut globals,
    };

    match compile_file(&mut m, &mut reader, &mut device, &mut state) {
        Ok(()) => ExitCode::SUCCESS,
        Err(panic) => {
            eprintln!("spor: {panic}");
            ExitCode::FAILURE
        }
    }
}
