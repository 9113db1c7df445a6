// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! A [`Reader`] backed by a host byte source: a named file or stdin.
//!
//! Grounded in the pattern of giving a trait that also has a
//! hardware-facing implementation a second, host-testable one: here the
//! scanner's `Reader` is backed by `std::fs::File`/`std::io::Stdin`
//! instead of the in-memory `MockReader` the core crate's own tests use.

use std::fs;
use std::io::{self, Read as _};

use spor::error::{ErrorCode, Panic, VmResult};
use spor::memory::Mem;
use spor::reader::{File as SourceFile, FileCode, Reader};

/// Either a named path or stdin, opened lazily so `open` can surface
/// the host error as a proper panic instead of a `main`-time `unwrap`.
#[derive(Clone)]
pub enum HostSource {
    Path(std::path::PathBuf),
    Stdin,
}

/// Reads from whichever [`HostSource`] it was built with. A single
/// `read` call reports whatever the underlying `read()` syscall
/// returned as already available, treating a host file as always
/// ready: there is no async I/O in this single-threaded CLI.
pub struct HostReader {
    source: HostSource,
    handle: Option<Box<dyn io::Read>>,
}

impl HostReader {
    #[must_use]
    pub const fn new(source: HostSource) -> Self {
        HostReader {
            source,
            handle: None,
        }
    }
}

impl Reader for HostReader {
    fn open(&mut self, _file: &mut SourceFile) -> VmResult<()> {
        let handle: Box<dyn io::Read> = match &self.source {
            HostSource::Path(path) => {
                Box::new(fs::File::open(path).map_err(|_| Panic::new(ErrorCode::Io, 0))?)
            }
            HostSource::Stdin => Box::new(io::stdin()),
        };
        self.handle = Some(handle);
        Ok(())
    }

    fn close(&mut self, _file: &mut SourceFile) -> VmResult<()> {
        self.handle = None;
        Ok(())
    }

    fn read(&mut self, mem: &mut impl Mem, file: &mut SourceFile) -> VmResult<()> {
        let Some(handle) = self.handle.as_mut() else {
            file.code = FileCode::Eof;
            return Ok(());
        };
        let cap = (file.buf.cap - file.buf.len) as usize;
        if cap == 0 {
            return Ok(());
        }
        let mut staging = vec![0u8; cap];
        let n = match handle.read(&mut staging) {
            Ok(n) => n,
            Err(e) => {
                file.code = FileCode::Error {
                    errno: e.raw_os_error().unwrap_or(-1),
                };
                return Ok(());
            }
        };
        if n == 0 {
            file.code = FileCode::Eof;
            return Ok(());
        }
        let dst = file.buf.r.add(file.buf.len);
        mem.slice_mut(dst, n as u32)?
            .copy_from_slice(&staging[..n]);
        file.buf.len += n as u32;
        file.code = FileCode::Done;
        Ok(())
    }
}

