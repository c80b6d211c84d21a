//! Custom attribute instances.
//!
//! Only the parts that can carry symbolic references are modelled with structure: the
//! constructor, and arguments of type `System.Type` (stored as a [`TypeSignature`]). Everything
//! else is kept as a plain value so it survives a load/save cycle.

use serde::{Deserialize, Serialize};

use crate::metadata::{signatures::TypeSignature, token::Token};

/// A custom attribute argument value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CustomAttributeArgument {
    /// Boolean value
    Boolean(bool),
    /// Any integral value, including enum values
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value, `None` for a null string
    String(Option<String>),
    /// `System.Type` value
    Type(TypeSignature),
    /// Single dimensional array of values
    Array(Vec<CustomAttributeArgument>),
}

impl CustomAttributeArgument {
    /// Visits every type carried by the argument, descending into arrays
    pub fn for_each_type(&self, f: &mut impl FnMut(&TypeSignature)) {
        match self {
            CustomAttributeArgument::Type(sig) => f(sig),
            CustomAttributeArgument::Array(items) => {
                for item in items {
                    item.for_each_type(f);
                }
            }
            _ => {}
        }
    }
}

/// A named (field or property) argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomAttributeNamedArgument {
    /// True for a field, false for a property
    pub is_field: bool,
    /// Member name
    pub name: String,
    /// Argument value
    pub value: CustomAttributeArgument,
}

/// A custom attribute applied to some metadata entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomAttribute {
    /// Attribute constructor - `MethodDef` or `MemberRef` token
    pub constructor: Token,
    /// Positional constructor arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixed_args: Vec<CustomAttributeArgument>,
    /// Named field and property arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub named_args: Vec<CustomAttributeNamedArgument>,
}

impl CustomAttribute {
    /// Creates an attribute without arguments
    #[must_use]
    pub fn new(constructor: Token) -> Self {
        CustomAttribute {
            constructor,
            fixed_args: Vec::new(),
            named_args: Vec::new(),
        }
    }

    /// Every argument value, positional first
    pub fn arguments(&self) -> impl Iterator<Item = &CustomAttributeArgument> {
        self.fixed_args
            .iter()
            .chain(self.named_args.iter().map(|named| &named.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::TableId;

    #[test]
    fn test_type_arguments_are_found() {
        let type_ref = Token::from_parts(TableId::TypeRef, 4);
        let mut attribute = CustomAttribute::new(Token::from_parts(TableId::MemberRef, 1));
        attribute.fixed_args.push(CustomAttributeArgument::Integer(3));
        attribute
            .fixed_args
            .push(CustomAttributeArgument::Array(vec![CustomAttributeArgument::Type(
                TypeSignature::Class(type_ref),
            )]));
        attribute.named_args.push(CustomAttributeNamedArgument {
            is_field: false,
            name: "Target".to_string(),
            value: CustomAttributeArgument::Type(TypeSignature::String),
        });

        let mut types = Vec::new();
        for argument in attribute.arguments() {
            argument.for_each_type(&mut |sig| types.push(sig.clone()));
        }
        assert_eq!(types, vec![TypeSignature::Class(type_ref), TypeSignature::String]);
    }
}
