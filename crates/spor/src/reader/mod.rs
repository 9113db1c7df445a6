// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! File/source abstraction and the re-entrant scanner layered over it.
//!
//! A `File` is a byte source with a staging buffer the scanner reads
//! ahead into; a concrete `Reader` decides how that buffer gets filled
//! (mocked in-memory bytes for tests, the host filesystem for the CLI).


mod file;
mod scanner;

pub use file::{File, FileCode, Reader, read_at_least};
pub use scanner::{TOKEN_SIZE, TokenGroup, classify, scan, skip_line_comment};
