//! Type definitions, type references and generic parameters.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::metadata::{
    customattributes::CustomAttribute, signatures::TypeSignature, token::Token,
};

bitflags! {
    /// Type attributes (II.23.1.15), the subset the rewriter inspects
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TypeAttributes: u32 {
        /// Visible outside the assembly
        const PUBLIC = 0x0000_0001;
        /// Nested, public
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested, private
        const NESTED_PRIVATE = 0x0000_0003;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Type is abstract
        const ABSTRACT = 0x0000_0080;
        /// Type cannot be derived from
        const SEALED = 0x0000_0100;
        /// Type name is special
        const SPECIAL_NAME = 0x0000_0400;
        /// Type is a Windows Runtime type
        const WINDOWS_RUNTIME = 0x0000_4000;
        /// Static constructor may run lazily
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

bitflags! {
    /// Generic parameter attributes (II.23.1.7)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct GenericParamAttributes: u16 {
        /// Parameter is covariant
        const COVARIANT = 0x0001;
        /// Parameter is contravariant
        const CONTRAVARIANT = 0x0002;
        /// Argument must be a reference type (`class` constraint)
        const REFERENCE_TYPE_CONSTRAINT = 0x0004;
        /// Argument must be a non-nullable value type (`struct` constraint)
        const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT = 0x0008;
        /// Argument must have a public parameterless constructor (`new()` constraint)
        const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x0010;
    }
}

impl Default for TypeAttributes {
    fn default() -> Self {
        TypeAttributes::empty()
    }
}

impl Default for GenericParamAttributes {
    fn default() -> Self {
        GenericParamAttributes::empty()
    }
}

impl GenericParamAttributes {
    /// The three special constraints
    pub const SPECIAL_CONSTRAINT_MASK: GenericParamAttributes = GenericParamAttributes::from_bits_retain(
        GenericParamAttributes::REFERENCE_TYPE_CONSTRAINT.bits()
            | GenericParamAttributes::NOT_NULLABLE_VALUE_TYPE_CONSTRAINT.bits()
            | GenericParamAttributes::DEFAULT_CONSTRUCTOR_CONSTRAINT.bits(),
    );
}

/// A generic parameter of a type or method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericParam {
    /// Declared name (`T`)
    pub name: String,
    /// Position in the owner's parameter list
    pub number: u16,
    /// Variance and special constraints
    #[serde(default)]
    pub flags: GenericParamAttributes,
    /// Type constraints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<TypeSignature>,
    /// Custom attributes applied to the parameter
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_attributes: Vec<CustomAttribute>,
}

impl GenericParam {
    /// Creates an unconstrained parameter
    pub fn new(name: impl Into<String>, number: u16) -> Self {
        GenericParam {
            name: name.into(),
            number,
            flags: GenericParamAttributes::empty(),
            constraints: Vec::new(),
            custom_attributes: Vec::new(),
        }
    }

    /// Returns true if the parameter carries a type constraint or a special constraint
    #[must_use]
    pub fn has_constraints(&self) -> bool {
        !self.constraints.is_empty()
            || self
                .flags
                .intersects(GenericParamAttributes::SPECIAL_CONSTRAINT_MASK)
    }
}

/// Where a type reference claims its type lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionScope {
    /// The referencing module itself
    Module,
    /// Another assembly - `AssemblyRef` token
    AssemblyRef(Token),
    /// The enclosing type of a nested type - `TypeRef` token
    TypeRef(Token),
}

/// A reference to a type defined in another module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    /// Namespace, empty for nested types
    #[serde(default)]
    pub namespace: String,
    /// Simple name, including the generic arity suffix (`List`1`)
    pub name: String,
    /// Where the type is expected to be found
    pub scope: ResolutionScope,
}

/// A property of a type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Property name
    pub name: String,
    /// Property type
    pub property_type: TypeSignature,
    /// Indexer parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<TypeSignature>,
    /// Custom attributes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_attributes: Vec<CustomAttribute>,
}

/// An event of a type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name
    pub name: String,
    /// Delegate type of the event
    pub event_type: TypeSignature,
    /// Custom attributes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_attributes: Vec<CustomAttribute>,
}

/// A type defined in a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    /// Namespace, empty for nested types
    #[serde(default)]
    pub namespace: String,
    /// Simple name, including the generic arity suffix
    pub name: String,
    /// Type attributes
    #[serde(default)]
    pub flags: TypeAttributes,
    /// Base type; `None` for `System.Object` and interfaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<TypeSignature>,
    /// Implemented interfaces
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<TypeSignature>,
    /// Generic parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generic_params: Vec<GenericParam>,
    /// Fields - `Field` tokens
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Token>,
    /// Methods - `MethodDef` tokens
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<Token>,
    /// Properties
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
    /// Events
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,
    /// Nested types - `TypeDef` tokens
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested_types: Vec<Token>,
    /// Enclosing type of a nested type - `TypeDef` token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosing: Option<Token>,
    /// Custom attributes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_attributes: Vec<CustomAttribute>,
}

impl TypeDef {
    /// Creates an empty top-level type
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeDef {
            namespace: namespace.into(),
            name: name.into(),
            flags: TypeAttributes::PUBLIC,
            base: None,
            interfaces: Vec::new(),
            generic_params: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            nested_types: Vec::new(),
            enclosing: None,
            custom_attributes: Vec::new(),
        }
    }

    /// Returns true if the type is an interface
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags.contains(TypeAttributes::INTERFACE)
    }
}

/// A type forwarded to another assembly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedType {
    /// Namespace of the forwarded type
    #[serde(default)]
    pub namespace: String,
    /// Name of the forwarded type
    pub name: String,
    /// Assembly the type now lives in - `AssemblyRef` token
    pub assembly: Token,
}
