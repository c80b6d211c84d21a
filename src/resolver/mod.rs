//! Locating, loading and resolving against the modules a target depends on.
//!
//! # Key Components
//!
//! - [`AssemblyResolver`] - Maps an assembly reference to a file
//! - [`SearchPathResolver`] - Ordered search directories
//! - [`LockFileResolver`] - References selected by a NuGet project lock file
//! - [`ModuleSet`] - The read-only oracle modules, indexed by assembly name
//! - [`Resolver`] - Type, field and method resolution over the target and a module set
//!
//! # Example
//!
//! ```rust,no_run
//! use refrewrite::metadata::provider::{DebugSymbolFormat, JsonModuleProvider, MetadataProvider};
//! use refrewrite::resolver::{ModuleSet, SearchPathResolver};
//! use std::path::Path;
//!
//! let target = JsonModuleProvider.load(Path::new("Game.dll"), DebugSymbolFormat::None)?;
//!
//! let mut search = SearchPathResolver::new();
//! search.add_search_path("/opt/framework");
//!
//! let mut modules = ModuleSet::new();
//! let missing = modules.load_closure(
//!     &target.assembly_refs,
//!     &[target.assembly.name.as_str()],
//!     &search,
//!     &JsonModuleProvider,
//! )?;
//! println!("{} modules loaded, {} missing", modules.len(), missing.len());
//! # Ok::<(), refrewrite::Error>(())
//! ```

use std::path::PathBuf;

use crate::metadata::identity::AssemblyIdentity;

mod lockfile;
mod modules;
mod resolution;
mod search;

pub use lockfile::{packages_directory, resolve_lock_file, LockFileResolver, DEFAULT_TARGET_MONIKER};
pub use modules::{ModuleId, ModuleSet};
pub use resolution::{MemberHandle, ModuleKey, Resolver, TypeHandle};
pub use search::SearchPathResolver;

/// Maps assembly references to the files that hold them
pub trait AssemblyResolver {
    /// The file holding `reference`, `None` if it cannot be found
    fn resolve(&self, reference: &AssemblyIdentity) -> Option<PathBuf>;
}
