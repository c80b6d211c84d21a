//! Rewriting a module against a different target framework.
//!
//! A rewrite takes a compiled module (the target), a support module providing replacements for
//! framework APIs that are missing on the target framework, and the framework's own reference
//! assemblies. It then runs the [`RewriteOperation`] pipeline over the target:
//!
//! - references that do not resolve on the target framework are redirected into the support
//!   module (or a per-namespace alternate module)
//! - calls whose exact overload is missing are rewritten to use a `params` overload
//! - generic constraints lost by some compilers are restored
//! - strong names and reference identities are adjusted to the new framework
//!
//! Anything that cannot be fixed is reported as a [`Diagnostic`].
//!
//! # Key Components
//!
//! - [`RewriteContext`] - The target, the oracle modules and the configuration
//! - [`RewriteOperation`] / [`RewriteStep`] - The pipeline
//! - [`ReferenceWalker`] / [`ReferenceVisitor`] - Traversal of every reference of the target
//! - [`ReferenceRewriter`] - Resolution and redirection of references
//! - [`equivalence`] - Type and method aliases between framework flavours
//!
//! # Example
//!
//! ```rust,no_run
//! use refrewrite::metadata::provider::JsonModuleProvider;
//! use refrewrite::rewrite::{support_namespace_mapper, RewriteContext, RewriteOperation, RewriteOptions};
//! use std::path::{Path, PathBuf};
//!
//! let options = RewriteOptions {
//!     target: PathBuf::from("Game.dll"),
//!     support: PathBuf::from("WinRTLegacy.dll"),
//!     framework_paths: vec![PathBuf::from("/opt/framework")],
//!     ..Default::default()
//! };
//!
//! let mut ctx = RewriteContext::load(&options, &JsonModuleProvider)?;
//! RewriteOperation::create(support_namespace_mapper("WinRTLegacy")).execute(&mut ctx)?;
//! for diagnostic in ctx.diagnostics.iter() {
//!     println!("{diagnostic}");
//! }
//! ctx.save_if_dirty(&JsonModuleProvider, Path::new("Game.dll"))?;
//! # Ok::<(), refrewrite::Error>(())
//! ```

mod constraints;
mod context;
mod diagnostics;
pub mod equivalence;
mod manifest;
mod methodspec;
mod operation;
mod patcher;
mod references;
mod strongnames;
mod walker;

pub use constraints::GenericConstraints;
pub use context::{RewriteContext, RewriteOptions};
pub use diagnostics::{Diagnostic, Diagnostics, ReferenceKind};
pub use manifest::AssemblyManifest;
pub use methodspec::MethodSpecReferences;
pub use operation::{support_namespace_mapper, RewriteOperation, RewriteStep};
pub use patcher::{pack_params_call, ParamsCall};
pub use references::{NamespaceMapper, ReferenceRewriter, TypeReferences};
pub use strongnames::StrongNameReferences;
pub use walker::{Reference, ReferenceVisitor, ReferenceWalker, VisitOutcome};
