// Copyright 2026 The sectweave Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! # sectweave
//!
//! A binary-patch composer: injects new, independently compiled code and
//! data into an already-linked native executable without access to its
//! original build.
//!
//! Hook addresses are declared in header-like stub files; a synthetic
//! name-mangling scheme correlates those declarations with the mangled
//! symbols a real compiler emits for the same functions; a similarity
//! scored resolver picks the best real symbol per address; and compiled
//! hook code is spliced into a newly appended section of the target image
//! at computed file/virtual offsets, optionally followed by raw wildcard
//! signature patches.
//!
//! # Architecture
//!
//! The pipeline is strictly sequential; each stage's output is the next
//! stage's required input:
//!
//! - [`scan`] + [`mangle`] read stub headers into a declared-symbol table
//! - [`resolve`] + [`demangle`] score harvested real symbols against it
//! - [`gen`] emits the generated build inputs the external toolchain
//!   consumes (driver source, linker scripts, definition header)
//! - [`coff`] recovers compiled sizes and placement addresses from the
//!   hook objects
//! - [`pe`] models the target image's section table for in-place rewrite
//! - [`splice`] computes the layout, copies hook bytes and commits the new
//!   section
//! - [`sig`] applies trailing wildcard byte patches
//!
//! External tools (compiler, linker, `strings`) are synchronous black
//! boxes behind [`tools`]; a non-zero exit aborts the run.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use sectweave::{pe::PeImage, splice};
//!
//! let image = PeImage::open(Path::new("program_patched.exe"))?;
//! let layout = splice::compute_layout(&image);
//! println!(
//!     "next section fits at virtual 0x{:x}, file 0x{:x}",
//!     layout.virtual_offset, layout.raw_offset
//! );
//! # Ok::<(), sectweave::Error>(())
//! ```

#![warn(missing_docs)]

#[macro_use]
mod error;

pub mod coff;
pub mod config;
pub mod demangle;
pub mod gen;
pub mod io;
pub mod mangle;
pub mod pe;
pub mod prelude;
pub mod resolve;
pub mod scan;
pub mod sig;
pub mod splice;
pub mod tools;

/// `sectweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type
/// is always [`Error`], used for all fallible operations in the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// `sectweave` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;
