// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The `D_log` device op writes through a small [`Sink`] trait instead
//! of a hardcoded stream, so the core stays usable where `std::io` is
//! unavailable.


/// A byte sink for log output. Implementors decide what a "line" means;
/// the device op only ever calls [`Sink::write`].
pub trait Sink {
    fn write(&mut self, bytes: &[u8]);
}

/// Writes to stderr, for hosted builds.
#[cfg(any(test, feature = "std"))]
pub struct StderrSink;

#[cfg(any(test, feature = "std"))]
impl Sink for StderrSink {
    fn write(&mut self, bytes: &[u8]) {
        use std::io::Write;
        let _ = std::io::stderr().write_all(bytes);
    }
}

/// Collects log output into an owned buffer, for `no_std` targets that
/// inject their own transport, and for tests on hosted targets that
/// don't want to capture stderr.
#[derive(Default)]
pub struct BufSink {
    #[cfg(any(test, feature = "std"))]
    pub bytes: std::vec::Vec<u8>,
    #[cfg(not(any(test, feature = "std")))]
    pub bytes: alloc::vec::Vec<u8>,
}

impl Sink for BufSink {
    fn write(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }
}

/// The two independently-gated log levels the device op checks before
/// writing: one for user code (`DV log` calls compiled by a program),
/// one for the system's own diagnostics.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
#[repr(u8)]
pub enum Level {
    #[default]
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl Level {
    #[must_use]
    pub const fn from_u8(v: u8) -> Self {
        match v {
            0 => Level::Off,
            1 => Level::Error,
            2 => Level::Warn,
            3 => Level::Info,
            _ => Level::Debug,
        }
    }
}
