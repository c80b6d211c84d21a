//! Type, field and method signatures.
//!
//! Signatures reference other types through [`Token`]s into the tables of the module that owns
//! them (`TypeRef`, `TypeDef` or `TypeSpec`). They never carry names directly, so the same
//! signature value renders differently depending on the module used to look its tokens up; see
//! [`crate::metadata::module::Module::signature_name`].

use serde::{Deserialize, Serialize};

use crate::metadata::token::Token;

/// Represents a parsed type in various signatures
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeSignature {
    /// void
    Void,
    /// bool
    Boolean,
    /// char
    Char,
    /// signed 8bit integer
    I1,
    /// unsigned 8bit integer
    U1,
    /// signed 16bit integer
    I2,
    /// unsigned 16bit integer
    U2,
    /// signed 32bit integer
    I4,
    /// unsigned 32bit integer
    U4,
    /// signed 64bit integer
    I8,
    /// unsigned 64bit integer
    U8,
    /// 32bit floating-point
    R4,
    /// 64bit floating-point
    R8,
    /// signed integer, sized to executing platform
    I,
    /// unsigned integer, sized to executing platform
    U,
    /// System.String
    String,
    /// System.Object
    Object,
    /// System.TypedReference
    TypedByRef,
    /// CIL Class - `TypeDef`, `TypeRef` or `TypeSpec` token
    Class(Token),
    /// CIL value-type - `TypeDef`, `TypeRef` or `TypeSpec` token
    ValueType(Token),
    /// Generic type and its arguments
    GenericInst(Box<TypeSignature>, Vec<TypeSignature>),
    /// Single dimension, zero based array
    SzArray(Box<TypeSignature>),
    /// Multi dimensional array
    Array {
        /// The type in the array
        element: Box<TypeSignature>,
        /// The number of dimensions
        rank: u32,
    },
    /// Type by reference
    ByRef(Box<TypeSignature>),
    /// Unmanaged pointer
    Ptr(Box<TypeSignature>),
    /// Generic type parameter, by position
    GenericParamType(u32),
    /// Generic method parameter, by position
    GenericParamMethod(u32),
}

impl TypeSignature {
    /// The `System` name of a primitive signature, `None` for constructed and token-based types
    #[must_use]
    pub fn primitive_name(&self) -> Option<&'static str> {
        let name = match self {
            TypeSignature::Void => "System.Void",
            TypeSignature::Boolean => "System.Boolean",
            TypeSignature::Char => "System.Char",
            TypeSignature::I1 => "System.SByte",
            TypeSignature::U1 => "System.Byte",
            TypeSignature::I2 => "System.Int16",
            TypeSignature::U2 => "System.UInt16",
            TypeSignature::I4 => "System.Int32",
            TypeSignature::U4 => "System.UInt32",
            TypeSignature::I8 => "System.Int64",
            TypeSignature::U8 => "System.UInt64",
            TypeSignature::R4 => "System.Single",
            TypeSignature::R8 => "System.Double",
            TypeSignature::I => "System.IntPtr",
            TypeSignature::U => "System.UIntPtr",
            TypeSignature::String => "System.String",
            TypeSignature::Object => "System.Object",
            TypeSignature::TypedByRef => "System.TypedReference",
            _ => return None,
        };
        Some(name)
    }

    /// Returns true for primitives that are value types (everything but `String` and `Object`)
    #[must_use]
    pub fn is_primitive_value_type(&self) -> bool {
        self.primitive_name().is_some()
            && !matches!(self, TypeSignature::String | TypeSignature::Object)
    }

    /// Returns true if values of this type are not object references: value primitives,
    /// `ValueType` tokens and instantiations of generic value types
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match self {
            TypeSignature::ValueType(_) => true,
            TypeSignature::GenericInst(base, _) => base.is_value_type(),
            other => other.is_primitive_value_type() && !matches!(other, TypeSignature::Void),
        }
    }

    /// The innermost type of arrays, by-refs, pointers and generic instantiations
    #[must_use]
    pub fn element_type(&self) -> &TypeSignature {
        match self {
            TypeSignature::GenericInst(base, _)
            | TypeSignature::SzArray(base)
            | TypeSignature::Array { element: base, .. }
            | TypeSignature::ByRef(base)
            | TypeSignature::Ptr(base) => base.element_type(),
            other => other,
        }
    }

    /// The token of a `Class` or `ValueType` signature, looking through a generic instantiation
    #[must_use]
    pub fn type_token(&self) -> Option<Token> {
        match self {
            TypeSignature::Class(token) | TypeSignature::ValueType(token) => Some(*token),
            TypeSignature::GenericInst(base, _) => base.type_token(),
            _ => None,
        }
    }

    /// The generic arguments of an instantiation, empty for anything else
    #[must_use]
    pub fn generic_args(&self) -> &[TypeSignature] {
        match self {
            TypeSignature::GenericInst(_, args) => args,
            _ => &[],
        }
    }

    /// Returns true for `GenericParamType` and `GenericParamMethod`
    #[must_use]
    pub fn is_generic_param(&self) -> bool {
        matches!(
            self,
            TypeSignature::GenericParamType(_) | TypeSignature::GenericParamMethod(_)
        )
    }

    /// Returns true if the signature is a single or multi dimensional array
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, TypeSignature::SzArray(_) | TypeSignature::Array { .. })
    }

    /// Element type of an array signature
    #[must_use]
    pub fn array_element(&self) -> Option<&TypeSignature> {
        match self {
            TypeSignature::SzArray(element) | TypeSignature::Array { element, .. } => {
                Some(element.as_ref())
            }
            _ => None,
        }
    }

    /// Replaces generic parameters by the matching entries of `type_args` / `method_args`.
    ///
    /// Parameters without a matching argument are kept as they are.
    #[must_use]
    pub fn substitute(
        &self,
        type_args: &[TypeSignature],
        method_args: &[TypeSignature],
    ) -> TypeSignature {
        match self {
            TypeSignature::GenericParamType(n) => type_args
                .get(*n as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeSignature::GenericParamMethod(n) => method_args
                .get(*n as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            _ => self.map(&mut |inner| inner.substitute(type_args, method_args)),
        }
    }

    /// Rebuilds the signature with every token replaced through `f`
    pub fn map_tokens(&self, f: &mut impl FnMut(Token) -> Token) -> TypeSignature {
        match self {
            TypeSignature::Class(token) => TypeSignature::Class(f(*token)),
            TypeSignature::ValueType(token) => TypeSignature::ValueType(f(*token)),
            _ => self.map(&mut |inner| inner.map_tokens(f)),
        }
    }

    /// Visits every token of the signature, outermost first
    pub fn for_each_token(&self, f: &mut impl FnMut(Token)) {
        match self {
            TypeSignature::Class(token) | TypeSignature::ValueType(token) => f(*token),
            TypeSignature::GenericInst(base, args) => {
                base.for_each_token(f);
                for arg in args {
                    arg.for_each_token(f);
                }
            }
            TypeSignature::SzArray(inner)
            | TypeSignature::Array { element: inner, .. }
            | TypeSignature::ByRef(inner)
            | TypeSignature::Ptr(inner) => inner.for_each_token(f),
            _ => {}
        }
    }

    /// Applies `f` to every direct child signature; leaves are cloned unchanged
    fn map(&self, f: &mut impl FnMut(&TypeSignature) -> TypeSignature) -> TypeSignature {
        match self {
            TypeSignature::GenericInst(base, args) => TypeSignature::GenericInst(
                Box::new(f(base.as_ref())),
                args.iter().map(|arg| f(arg)).collect(),
            ),
            TypeSignature::SzArray(inner) => TypeSignature::SzArray(Box::new(f(inner.as_ref()))),
            TypeSignature::Array { element, rank } => TypeSignature::Array {
                element: Box::new(f(element.as_ref())),
                rank: *rank,
            },
            TypeSignature::ByRef(inner) => TypeSignature::ByRef(Box::new(f(inner.as_ref()))),
            TypeSignature::Ptr(inner) => TypeSignature::Ptr(Box::new(f(inner.as_ref()))),
            other => other.clone(),
        }
    }
}

/// Represents a method signature (II.23.2.1)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    /// Instance method, `this` is passed as hidden first argument
    #[serde(default)]
    pub has_this: bool,
    /// Number of generic parameters of the method
    #[serde(default)]
    pub generic_param_count: u32,
    /// The return type of this `Method`
    pub return_type: TypeSignature,
    /// The parameters of this `Method`
    #[serde(default)]
    pub params: Vec<TypeSignature>,
}

impl MethodSignature {
    /// A static, non-generic signature
    #[must_use]
    pub fn new_static(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        MethodSignature {
            has_this: false,
            generic_param_count: 0,
            return_type,
            params,
        }
    }

    /// An instance, non-generic signature
    #[must_use]
    pub fn new_instance(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        MethodSignature {
            has_this: true,
            generic_param_count: 0,
            return_type,
            params,
        }
    }

    /// Rebuilds the signature with every token replaced through `f`
    pub fn map_tokens(&self, f: &mut impl FnMut(Token) -> Token) -> MethodSignature {
        MethodSignature {
            has_this: self.has_this,
            generic_param_count: self.generic_param_count,
            return_type: self.return_type.map_tokens(f),
            params: self.params.iter().map(|p| p.map_tokens(f)).collect(),
        }
    }
}
