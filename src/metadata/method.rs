//! Field and method definitions, member references and method specifications.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    assembly::MethodBody,
    metadata::{
        customattributes::CustomAttribute,
        signatures::{MethodSignature, TypeSignature},
        token::Token,
        typesystem::GenericParam,
    },
};

bitflags! {
    /// Method attributes (II.23.1.10)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MethodAttributes: u16 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessibly by anyone in the Assembly
        const ASSEM = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessibly by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// CLI provides 'special' behavior, dpending upon the name of the method
        const RTSPECIAL_NAME = 0x1000;
    }
}

bitflags! {
    /// Field attributes (II.23.1.5)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct FieldAttributes: u16 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessibly by anyone in the Assembly
        const ASSEMBLY = 0x0003;
        /// Accessibly by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Field can only be initialized, not written to after init
        const INIT_ONLY = 0x0020;
        /// Value is compile time constant
        const LITERAL = 0x0040;
    }
}

impl Default for MethodAttributes {
    fn default() -> Self {
        MethodAttributes::empty()
    }
}

impl Default for FieldAttributes {
    fn default() -> Self {
        FieldAttributes::empty()
    }
}

/// A parameter of a method definition
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Param {
    /// Declared name
    #[serde(default)]
    pub name: String,
    /// Custom attributes applied to the parameter
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_attributes: Vec<CustomAttribute>,
}

/// A field defined in a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field attributes
    #[serde(default)]
    pub flags: FieldAttributes,
    /// Owning type - `TypeDef` token
    pub declaring: Token,
    /// Field type
    pub signature: TypeSignature,
    /// Custom attributes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_attributes: Vec<CustomAttribute>,
}

/// A method defined in a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Method attributes
    #[serde(default)]
    pub flags: MethodAttributes,
    /// Owning type - `TypeDef` token
    pub declaring: Token,
    /// Calling convention, return type and parameter types
    pub signature: MethodSignature,
    /// Names and attributes of the parameters, parallel to `signature.params`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
    /// Custom attributes applied to the return value
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub return_attributes: Vec<CustomAttribute>,
    /// Generic parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generic_params: Vec<GenericParam>,
    /// Explicitly implemented methods - `MethodDef` or `MemberRef` tokens
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<Token>,
    /// Code, `None` for abstract and runtime-implemented methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<MethodBody>,
    /// Custom attributes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_attributes: Vec<CustomAttribute>,
}

impl MethodDef {
    /// Creates a public method without parameters names, body or attributes
    pub fn new(name: impl Into<String>, declaring: Token, signature: MethodSignature) -> Self {
        let mut flags = MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG;
        if !signature.has_this {
            flags |= MethodAttributes::STATIC;
        }

        MethodDef {
            name: name.into(),
            flags,
            declaring,
            signature,
            params: Vec::new(),
            return_attributes: Vec::new(),
            generic_params: Vec::new(),
            overrides: Vec::new(),
            body: None,
            custom_attributes: Vec::new(),
        }
    }

    /// Returns true for virtual methods
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.flags.contains(MethodAttributes::VIRTUAL)
    }

    /// Returns true for abstract methods
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodAttributes::ABSTRACT)
    }

    /// Returns true for static methods
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }
}

/// Signature of a member reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberRefSignature {
    /// Field reference with the field type
    Field(TypeSignature),
    /// Method reference with the method signature
    Method(MethodSignature),
}

/// A reference to a field or method of another type, usually in another module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberRef {
    /// Declaring type; a generic instantiation or an array for members of constructed types
    pub declaring: TypeSignature,
    /// Member name
    pub name: String,
    /// Field or method signature
    pub signature: MemberRefSignature,
}

impl MemberRef {
    /// The method signature, `None` for field references
    #[must_use]
    pub fn method_signature(&self) -> Option<&MethodSignature> {
        match &self.signature {
            MemberRefSignature::Method(sig) => Some(sig),
            MemberRefSignature::Field(_) => None,
        }
    }

    /// The field type, `None` for method references
    #[must_use]
    pub fn field_type(&self) -> Option<&TypeSignature> {
        match &self.signature {
            MemberRefSignature::Field(sig) => Some(sig),
            MemberRefSignature::Method(_) => None,
        }
    }
}

/// A generic method instantiation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSpec {
    /// Instantiated method - `MethodDef` or `MemberRef` token
    pub method: Token,
    /// Generic arguments
    pub instantiation: Vec<TypeSignature>,
}
