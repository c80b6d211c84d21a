//! The module graph the rewriter operates on.
//!
//! This module contains the in-memory representation of a managed module: metadata tables
//! addressed by tokens, type and method signatures, assembly identities, and the provider
//! abstraction that loads and stores modules.
//!
//! # Key Components
//!
//! - [`module`] - [`module::Module`] with its tables, lookups and name rendering
//! - [`token`] - Metadata table row references used throughout .NET
//! - [`typesystem`] - Type definitions, type references and generic parameters
//! - [`method`] - Fields, methods, member references and method specs
//! - [`signatures`] - Type and method signatures
//! - [`identity`] - Assembly names, versions and public key tokens
//! - [`import`] - Copying references from an oracle module into the target
//! - [`provider`] - Loading and saving modules
//! - [`builder`] - Fluent construction of modules
//!
//! # Examples
//!
//! ```rust,no_run
//! use refrewrite::metadata::provider::{DebugSymbolFormat, JsonModuleProvider, MetadataProvider};
//! use std::path::Path;
//!
//! let module = JsonModuleProvider.load(Path::new("Game.dll"), DebugSymbolFormat::None)?;
//! println!("Assembly: {}", module.assembly);
//! println!("Types: {}", module.type_defs.len());
//! # Ok::<(), refrewrite::Error>(())
//! ```

/// Fluent module construction
pub mod builder;
/// Custom attribute instances
pub mod customattributes;
/// Assembly identities
pub mod identity;
/// Cross-module imports
pub mod import;
/// Fields, methods and member references
pub mod method;
/// The module graph
pub mod module;
/// Module storage
pub mod provider;
/// Type and method signatures
pub mod signatures;
/// Metadata tokens
pub mod token;
/// Types and generic parameters
pub mod typesystem;
