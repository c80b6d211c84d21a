//! # refrewrite Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the refrewrite library. Import this module to get quick access to the essential
//! types for loading, rewriting and saving modules.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all refrewrite operations
pub use crate::Error;

/// The result type used throughout refrewrite
pub use crate::Result;

// ================================================================================================
// Metadata System - Core Types
// ================================================================================================

/// Metadata token type for referencing table entries
pub use crate::metadata::token::{TableId, Token};

/// The module graph and its construction
pub use crate::metadata::{builder::ModuleBuilder, module::Module};

/// Assembly names and versions
pub use crate::metadata::identity::{AssemblyIdentity, AssemblyVersion};

// ================================================================================================
// Type System
// ================================================================================================

/// Types, type references and generic parameters
pub use crate::metadata::typesystem::{
    GenericParam, GenericParamAttributes, ResolutionScope, TypeAttributes, TypeDef, TypeRef,
};

/// Fields, methods and member references
pub use crate::metadata::method::{
    FieldDef, MemberRef, MemberRefSignature, MethodAttributes, MethodDef, MethodSpec,
};

/// Type and method signatures
pub use crate::metadata::signatures::{MethodSignature, TypeSignature};

// ================================================================================================
// Method Bodies
// ================================================================================================

/// CIL instructions and method bodies
pub use crate::assembly::{InstrId, Instruction, MethodBody, OpCode, Operand};

// ================================================================================================
// Loading and Resolution
// ================================================================================================

/// Module storage
pub use crate::metadata::provider::{DebugSymbolFormat, JsonModuleProvider, MetadataProvider};

/// Dependency lookup and reference resolution
pub use crate::resolver::{
    AssemblyResolver, LockFileResolver, ModuleId, ModuleKey, ModuleSet, Resolver,
    SearchPathResolver,
};

// ================================================================================================
// Rewriting
// ================================================================================================

/// The rewrite pipeline and its configuration
pub use crate::rewrite::{
    support_namespace_mapper, RewriteContext, RewriteOperation, RewriteOptions, RewriteStep,
};

/// Unresolved references reported by a rewrite
pub use crate::rewrite::{Diagnostic, Diagnostics, ReferenceKind};
