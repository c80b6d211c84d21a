// Copyright 2025 Johann Kempter
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

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # refrewrite
//!
//! A retargeting tool for compiled .NET modules. `refrewrite` takes a module built against one
//! framework surface and rewrites its references so that it runs against another one, where a
//! part of the original APIs is missing and replaced by a support library.
//!
//! ## Features
//!
//! - **Reference redirection** - Types, fields and methods missing on the target framework are
//!   redirected into a support module, or into per-namespace alternate modules
//! - **Overload patching** - Calls whose exact overload is missing are rewritten to call a
//!   `params` overload, packing the trailing arguments into an array in place
//! - **Framework equivalences** - Type aliases and template arguments are compared the way the
//!   different framework flavours name them
//! - **Generic constraint restoration** - Constraints dropped on compiler-generated iterator
//!   classes are copied back from the overridden methods
//! - **Manifest cleanup** - Strong names, reference versions and windows runtime flags follow
//!   the new framework
//! - **Assembly resolution** - Search directories and NuGet project lock files
//!
//! ## Architecture
//!
//! - [`metadata`] - The module graph: tables, tokens, signatures, identities and providers
//! - [`assembly`] - CIL opcodes, instructions and method bodies
//! - [`resolver`] - Locating dependencies and resolving references against them
//! - [`rewrite`] - The rewrite pipeline and its diagnostics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use refrewrite::prelude::*;
//! use std::path::{Path, PathBuf};
//!
//! let options = RewriteOptions {
//!     target: PathBuf::from("Game.dll"),
//!     support: PathBuf::from("WinRTLegacy.dll"),
//!     framework_paths: vec![PathBuf::from("/opt/framework")],
//!     ..Default::default()
//! };
//!
//! let provider = JsonModuleProvider;
//! let mut ctx = RewriteContext::load(&options, &provider)?;
//! RewriteOperation::create(support_namespace_mapper("WinRTLegacy")).execute(&mut ctx)?;
//!
//! println!("{} unresolved references", ctx.diagnostics.len());
//! if ctx.save_if_dirty(&provider, Path::new("Game.dll"))? {
//!     println!("Module rewritten");
//! }
//! # Ok::<(), refrewrite::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). References that cannot be resolved are
//! not errors; they are collected as [`rewrite::Diagnostic`] entries on the context:
//!
//! ```rust,no_run
//! use refrewrite::{Error, metadata::provider::{DebugSymbolFormat, JsonModuleProvider, MetadataProvider}};
//! use std::path::Path;
//!
//! match JsonModuleProvider.load(Path::new("Game.dll"), DebugSymbolFormat::None) {
//!     Ok(module) => println!("Loaded {}", module.assembly),
//!     Err(Error::FileError(e)) => println!("Cannot read module: {e}"),
//!     Err(e) => println!("Other error: {e}"),
//! }
//! ```

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use refrewrite::prelude::*;
///
/// let module = ModuleBuilder::new("Game", AssemblyVersion::new(1, 0, 0, 0)).build();
/// assert_eq!(module.assembly.name, "Game");
/// ```
pub mod prelude;

pub mod assembly;
pub mod metadata;
pub mod resolver;
pub mod rewrite;

/// The result type used throughout `refrewrite`
pub type Result<T> = std::result::Result<T, Error>;

pub use error::Error;
