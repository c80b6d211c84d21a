//! The in-memory module graph.
//!
//! A [`Module`] is a set of row vectors, one per modelled metadata table, addressed through
//! [`Token`]s. Rows are never removed, so tokens handed out by the `add_*` helpers stay valid
//! for the lifetime of the module.
//!
//! Names are rendered the way the rest of the .NET tool chain prints them: `Ns.Type`,
//! `Ns.Outer/Inner`, ``Ns.List`1<System.Int32>``, `System.Int32[]`, `T&`, `!0`, `!!0`.

use std::{fmt::Write, path::PathBuf};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    metadata::{
        customattributes::CustomAttribute,
        identity::AssemblyIdentity,
        method::{FieldDef, MemberRef, MemberRefSignature, MethodDef, MethodSpec},
        signatures::{MethodSignature, TypeSignature},
        token::{TableId, Token},
        typesystem::{ExportedType, ResolutionScope, TypeDef, TypeRef},
    },
    Error, Result,
};

/// Depth limit for walking chains of enclosing types
const MAX_NESTING_DEPTH: usize = 64;

bitflags! {
    /// Runtime flags of a module image (II.25.3.3.1)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ModuleAttributes: u32 {
        /// Image contains only IL code
        const IL_ONLY = 0x0000_0001;
        /// Image requires a 32-bit process
        const REQUIRED_32BIT = 0x0000_0002;
        /// Image is signed with a strong name
        const STRONG_NAME_SIGNED = 0x0000_0008;
        /// Image prefers a 32-bit process
        const PREFERRED_32BIT = 0x0002_0000;
    }
}

impl Default for ModuleAttributes {
    fn default() -> Self {
        ModuleAttributes::IL_ONLY
    }
}

fn row<T>(items: &[T], token: Token, table: TableId) -> Result<&T> {
    if !token.is_table(table) {
        return Err(Error::TokenNotFound(token));
    }
    token
        .index()
        .and_then(|index| items.get(index))
        .ok_or(Error::TokenNotFound(token))
}

fn row_mut<T>(items: &mut [T], token: Token, table: TableId) -> Result<&mut T> {
    if !token.is_table(table) {
        return Err(Error::TokenNotFound(token));
    }
    token
        .index()
        .and_then(|index| items.get_mut(index))
        .ok_or(Error::TokenNotFound(token))
}

fn push<T>(items: &mut Vec<T>, item: T, table: TableId) -> Token {
    items.push(item);
    Token::from_index(table, items.len() - 1)
}

/// A module and the metadata tables it owns
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Module {
    /// Module file name (`Game.dll`)
    pub name: String,
    /// Identity of the assembly manifest
    pub assembly: AssemblyIdentity,
    /// Runtime flags
    #[serde(default)]
    pub flags: ModuleAttributes,
    /// `AssemblyRef` table
    #[serde(default)]
    pub assembly_refs: Vec<AssemblyIdentity>,
    /// `TypeRef` table
    #[serde(default)]
    pub type_refs: Vec<TypeRef>,
    /// `TypeDef` table
    #[serde(default)]
    pub type_defs: Vec<TypeDef>,
    /// `Field` table
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// `MethodDef` table
    #[serde(default)]
    pub methods: Vec<MethodDef>,
    /// `MemberRef` table
    #[serde(default)]
    pub member_refs: Vec<MemberRef>,
    /// `TypeSpec` table
    #[serde(default)]
    pub type_specs: Vec<TypeSignature>,
    /// `MethodSpec` table
    #[serde(default)]
    pub method_specs: Vec<MethodSpec>,
    /// `ExportedType` table, type forwarders only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exported_types: Vec<ExportedType>,
    /// Assembly level custom attributes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_attributes: Vec<CustomAttribute>,
    /// File the module was loaded from
    #[serde(skip)]
    pub location: Option<PathBuf>,
}

impl Module {
    /// Creates an empty module for `assembly`, named `<assembly>.dll`
    #[must_use]
    pub fn new(assembly: AssemblyIdentity) -> Self {
        Module {
            name: format!("{}.dll", assembly.name),
            assembly,
            ..Default::default()
        }
    }

    /// The assembly reference `token`
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if `token` does not address an `AssemblyRef` row.
    pub fn assembly_ref(&self, token: Token) -> Result<&AssemblyIdentity> {
        row(&self.assembly_refs, token, TableId::AssemblyRef)
    }

    /// The assembly reference `token`, mutably
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if `token` does not address an `AssemblyRef` row.
    pub fn assembly_ref_mut(&mut self, token: Token) -> Result<&mut AssemblyIdentity> {
        row_mut(&mut self.assembly_refs, token, TableId::AssemblyRef)
    }

    /// The type reference `token`
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if `token` does not address a `TypeRef` row.
    pub fn type_ref(&self, token: Token) -> Result<&TypeRef> {
        row(&self.type_refs, token, TableId::TypeRef)
    }

    /// The type reference `token`, mutably
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if `token` does not address a `TypeRef` row.
    pub fn type_ref_mut(&mut self, token: Token) -> Result<&mut TypeRef> {
        row_mut(&mut self.type_refs, token, TableId::TypeRef)
    }

    /// The type definition `token`
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if `token` does not address a `TypeDef` row.
    pub fn type_def(&self, token: Token) -> Result<&TypeDef> {
        row(&self.type_defs, token, TableId::TypeDef)
    }

    /// The type definition `token`, mutably
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if `token` does not address a `TypeDef` row.
    pub fn type_def_mut(&mut self, token: Token) -> Result<&mut TypeDef> {
        row_mut(&mut self.type_defs, token, TableId::TypeDef)
    }

    /// The field definition `token`
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if `token` does not address a `Field` row.
    pub fn field(&self, token: Token) -> Result<&FieldDef> {
        row(&self.fields, token, TableId::Field)
    }

    /// The method definition `token`
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if `token` does not address a `MethodDef` row.
    pub fn method(&self, token: Token) -> Result<&MethodDef> {
        row(&self.methods, token, TableId::MethodDef)
    }

    /// The method definition `token`, mutably
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if `token` does not address a `MethodDef` row.
    pub fn method_mut(&mut self, token: Token) -> Result<&mut MethodDef> {
        row_mut(&mut self.methods, token, TableId::MethodDef)
    }

    /// The member reference `token`
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if `token` does not address a `MemberRef` row.
    pub fn member_ref(&self, token: Token) -> Result<&MemberRef> {
        row(&self.member_refs, token, TableId::MemberRef)
    }

    /// The type specification `token`
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if `token` does not address a `TypeSpec` row.
    pub fn type_spec(&self, token: Token) -> Result<&TypeSignature> {
        row(&self.type_specs, token, TableId::TypeSpec)
    }

    /// The method specification `token`
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if `token` does not address a `MethodSpec` row.
    pub fn method_spec(&self, token: Token) -> Result<&MethodSpec> {
        row(&self.method_specs, token, TableId::MethodSpec)
    }

    /// The method specification `token`, mutably
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if `token` does not address a `MethodSpec` row.
    pub fn method_spec_mut(&mut self, token: Token) -> Result<&mut MethodSpec> {
        row_mut(&mut self.method_specs, token, TableId::MethodSpec)
    }

    /// Tokens of every type definition, in declaration order
    pub fn type_def_tokens(&self) -> impl Iterator<Item = Token> {
        (0..self.type_defs.len()).map(|index| Token::from_index(TableId::TypeDef, index))
    }

    /// Tokens of every method definition, in declaration order
    pub fn method_tokens(&self) -> impl Iterator<Item = Token> {
        (0..self.methods.len()).map(|index| Token::from_index(TableId::MethodDef, index))
    }

    /// Tokens of every assembly reference, in declaration order
    pub fn assembly_ref_tokens(&self) -> impl Iterator<Item = Token> {
        (0..self.assembly_refs.len()).map(|index| Token::from_index(TableId::AssemblyRef, index))
    }

    /// Appends an assembly reference without checking for duplicates
    pub fn add_assembly_ref(&mut self, identity: AssemblyIdentity) -> Token {
        push(&mut self.assembly_refs, identity, TableId::AssemblyRef)
    }

    /// The first assembly reference whose full name is `full_name`
    #[must_use]
    pub fn find_assembly_ref(&self, full_name: &str) -> Option<Token> {
        self.assembly_refs
            .iter()
            .position(|candidate| candidate.full_name() == full_name)
            .map(|index| Token::from_index(TableId::AssemblyRef, index))
    }

    /// The first assembly reference with the simple name `name`
    #[must_use]
    pub fn find_assembly_ref_by_name(&self, name: &str) -> Option<Token> {
        self.assembly_refs
            .iter()
            .position(|candidate| candidate.name == name)
            .map(|index| Token::from_index(TableId::AssemblyRef, index))
    }

    /// The reference matching `identity` by full name, added if missing.
    ///
    /// Returns the token and whether a row was added.
    pub fn find_or_add_assembly_ref(&mut self, identity: &AssemblyIdentity) -> (Token, bool) {
        match self.find_assembly_ref(&identity.full_name()) {
            Some(token) => (token, false),
            None => (self.add_assembly_ref(identity.to_reference()), true),
        }
    }

    /// Appends a type reference
    pub fn add_type_ref(&mut self, type_ref: TypeRef) -> Token {
        push(&mut self.type_refs, type_ref, TableId::TypeRef)
    }

    /// The type reference with the given name and scope, added if missing
    pub fn find_or_add_type_ref(&mut self, type_ref: TypeRef) -> Token {
        match self.type_refs.iter().position(|candidate| *candidate == type_ref) {
            Some(index) => Token::from_index(TableId::TypeRef, index),
            None => self.add_type_ref(type_ref),
        }
    }

    /// Appends a type definition. Nested types must still be linked through
    /// [`TypeDef::enclosing`] and [`TypeDef::nested_types`].
    pub fn add_type_def(&mut self, type_def: TypeDef) -> Token {
        push(&mut self.type_defs, type_def, TableId::TypeDef)
    }

    /// Appends a field and registers it with its declaring type
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if the declaring type does not exist.
    pub fn add_field(&mut self, field: FieldDef) -> Result<Token> {
        let declaring = field.declaring;
        self.type_def(declaring)?;

        let token = push(&mut self.fields, field, TableId::Field);
        self.type_def_mut(declaring)?.fields.push(token);
        Ok(token)
    }

    /// Appends a method and registers it with its declaring type
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if the declaring type does not exist.
    pub fn add_method(&mut self, method: MethodDef) -> Result<Token> {
        let declaring = method.declaring;
        self.type_def(declaring)?;

        let token = push(&mut self.methods, method, TableId::MethodDef);
        self.type_def_mut(declaring)?.methods.push(token);
        Ok(token)
    }

    /// The member reference equal to `member_ref`, added if missing
    pub fn find_or_add_member_ref(&mut self, member_ref: MemberRef) -> Token {
        match self.member_refs.iter().position(|candidate| *candidate == member_ref) {
            Some(index) => Token::from_index(TableId::MemberRef, index),
            None => push(&mut self.member_refs, member_ref, TableId::MemberRef),
        }
    }

    /// The type specification equal to `signature`, added if missing
    pub fn find_or_add_type_spec(&mut self, signature: TypeSignature) -> Token {
        match self.type_specs.iter().position(|candidate| *candidate == signature) {
            Some(index) => Token::from_index(TableId::TypeSpec, index),
            None => push(&mut self.type_specs, signature, TableId::TypeSpec),
        }
    }

    /// The method specification equal to `spec`, added if missing
    pub fn find_or_add_method_spec(&mut self, spec: MethodSpec) -> Token {
        match self.method_specs.iter().position(|candidate| *candidate == spec) {
            Some(index) => Token::from_index(TableId::MethodSpec, index),
            None => push(&mut self.method_specs, spec, TableId::MethodSpec),
        }
    }

    /// The top-level type definition `namespace.name`
    #[must_use]
    pub fn find_type_def(&self, namespace: &str, name: &str) -> Option<Token> {
        self.type_defs
            .iter()
            .position(|def| def.enclosing.is_none() && def.namespace == namespace && def.name == name)
            .map(|index| Token::from_index(TableId::TypeDef, index))
    }

    /// The nested type `name` of the type definition `enclosing`
    #[must_use]
    pub fn find_nested_type(&self, enclosing: Token, name: &str) -> Option<Token> {
        let outer = self.type_def(enclosing).ok()?;
        outer
            .nested_types
            .iter()
            .copied()
            .find(|nested| self.type_def(*nested).is_ok_and(|def| def.name == name))
    }

    /// Returns true if the type definition derives directly from `System.ValueType` or
    /// `System.Enum`
    #[must_use]
    pub fn is_value_type_def(&self, token: Token) -> bool {
        let Ok(def) = self.type_def(token) else {
            return false;
        };
        let Some(base) = &def.base else {
            return false;
        };

        let base_name = self.signature_name(base);
        match base_name.as_str() {
            "System.Enum" => true,
            "System.ValueType" => !(def.namespace == "System" && def.name == "Enum"),
            _ => false,
        }
    }

    /// The forwarder for `namespace.name`, if the module exports one
    #[must_use]
    pub fn find_exported_type(&self, namespace: &str, name: &str) -> Option<&ExportedType> {
        self.exported_types
            .iter()
            .find(|exported| exported.namespace == namespace && exported.name == name)
    }

    /// The assembly a type reference ultimately points at, following enclosing type references.
    ///
    /// Returns `ResolutionScope::Module` for references into this module.
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] for dangling scopes and [`Error::RecursionLimit`] for
    /// cyclic ones.
    pub fn root_scope(&self, token: Token) -> Result<ResolutionScope> {
        let mut current = token;
        for _ in 0..MAX_NESTING_DEPTH {
            match self.type_ref(current)?.scope {
                ResolutionScope::TypeRef(outer) => current = outer,
                scope => return Ok(scope),
            }
        }
        Err(Error::RecursionLimit(MAX_NESTING_DEPTH))
    }

    /// The assembly reference a type reference is scoped to, `None` for module scoped ones
    ///
    /// # Errors
    /// See [`Module::root_scope`].
    pub fn type_ref_assembly(&self, token: Token) -> Result<Option<&AssemblyIdentity>> {
        match self.root_scope(token)? {
            ResolutionScope::AssemblyRef(assembly) => Ok(Some(self.assembly_ref(assembly)?)),
            _ => Ok(None),
        }
    }

    /// Full name of the type addressed by a `TypeRef`, `TypeDef` or `TypeSpec` token.
    ///
    /// Unknown tokens render as their hex value so diagnostics stay printable.
    #[must_use]
    pub fn type_name(&self, token: Token) -> String {
        let mut out = String::new();
        self.write_type_name(&mut out, token, 0);
        out
    }

    fn write_type_name(&self, out: &mut String, token: Token, depth: usize) {
        if depth > MAX_NESTING_DEPTH {
            out.push_str("...");
            return;
        }

        match token.table_id() {
            Some(TableId::TypeRef) => match self.type_ref(token) {
                Ok(type_ref) => {
                    if let ResolutionScope::TypeRef(outer) = type_ref.scope {
                        self.write_type_name(out, outer, depth + 1);
                        out.push('/');
                    } else if !type_ref.namespace.is_empty() {
                        out.push_str(&type_ref.namespace);
                        out.push('.');
                    }
                    out.push_str(&type_ref.name);
                }
                Err(_) => {
                    let _ = write!(out, "{token}");
                }
            },
            Some(TableId::TypeDef) => match self.type_def(token) {
                Ok(type_def) => {
                    if let Some(outer) = type_def.enclosing {
                        self.write_type_name(out, outer, depth + 1);
                        out.push('/');
                    } else if !type_def.namespace.is_empty() {
                        out.push_str(&type_def.namespace);
                        out.push('.');
                    }
                    out.push_str(&type_def.name);
                }
                Err(_) => {
                    let _ = write!(out, "{token}");
                }
            },
            Some(TableId::TypeSpec) => match self.type_spec(token) {
                Ok(spec) => self.write_signature_name(out, spec, depth + 1),
                Err(_) => {
                    let _ = write!(out, "{token}");
                }
            },
            _ => {
                let _ = write!(out, "{token}");
            }
        }
    }

    /// Full name of a type signature
    #[must_use]
    pub fn signature_name(&self, signature: &TypeSignature) -> String {
        let mut out = String::new();
        self.write_signature_name(&mut out, signature, 0);
        out
    }

    fn write_signature_name(&self, out: &mut String, signature: &TypeSignature, depth: usize) {
        if let Some(name) = signature.primitive_name() {
            out.push_str(name);
            return;
        }

        match signature {
            TypeSignature::Class(token) | TypeSignature::ValueType(token) => {
                self.write_type_name(out, *token, depth + 1);
            }
            TypeSignature::GenericInst(base, args) => {
                self.write_signature_name(out, base, depth + 1);
                out.push('<');
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        out.push(',');
                    }
                    self.write_signature_name(out, arg, depth + 1);
                }
                out.push('>');
            }
            TypeSignature::SzArray(element) => {
                self.write_signature_name(out, element, depth + 1);
                out.push_str("[]");
            }
            TypeSignature::Array { element, rank } => {
                self.write_signature_name(out, element, depth + 1);
                out.push('[');
                for _ in 1..*rank {
                    out.push(',');
                }
                out.push(']');
            }
            TypeSignature::ByRef(inner) => {
                self.write_signature_name(out, inner, depth + 1);
                out.push('&');
            }
            TypeSignature::Ptr(inner) => {
                self.write_signature_name(out, inner, depth + 1);
                out.push('*');
            }
            TypeSignature::GenericParamType(number) => {
                let _ = write!(out, "!{number}");
            }
            TypeSignature::GenericParamMethod(number) => {
                let _ = write!(out, "!!{number}");
            }
            _ => {}
        }
    }

    /// Renders `ret decl::name<args>(params)`
    fn write_method_name(
        &self,
        out: &mut String,
        declaring: &str,
        name: &str,
        signature: &MethodSignature,
        instantiation: &[TypeSignature],
    ) {
        out.push_str(&self.signature_name(&signature.return_type));
        out.push(' ');
        out.push_str(declaring);
        out.push_str("::");
        out.push_str(name);
        if !instantiation.is_empty() {
            out.push('<');
            let args: Vec<String> = instantiation
                .iter()
                .map(|arg| self.signature_name(arg))
                .collect();
            out.push_str(&args.join(","));
            out.push('>');
        }
        out.push('(');
        let params: Vec<String> = signature
            .params
            .iter()
            .map(|param| self.signature_name(param))
            .collect();
        out.push_str(&params.join(","));
        out.push(')');
    }

    /// Full name of a `MethodDef`, `MemberRef` or `MethodSpec` token, e.g.
    /// `System.Void Game.Player::Move(System.Single)` or, for a field reference,
    /// `System.Int32 Game.Player::health`
    #[must_use]
    pub fn member_full_name(&self, token: Token) -> String {
        let mut out = String::new();
        match token.table_id() {
            Some(TableId::MethodDef) => {
                if let Ok(method) = self.method(token) {
                    let declaring = self.type_name(method.declaring);
                    self.write_method_name(&mut out, &declaring, &method.name, &method.signature, &[]);
                    return out;
                }
            }
            Some(TableId::MemberRef) => {
                if let Ok(member) = self.member_ref(token) {
                    let declaring = self.signature_name(&member.declaring);
                    match &member.signature {
                        MemberRefSignature::Method(signature) => {
                            self.write_method_name(&mut out, &declaring, &member.name, signature, &[]);
                        }
                        MemberRefSignature::Field(field_type) => {
                            let _ = write!(
                                out,
                                "{} {}::{}",
                                self.signature_name(field_type),
                                declaring,
                                member.name
                            );
                        }
                    }
                    return out;
                }
            }
            Some(TableId::MethodSpec) => {
                if let Ok(spec) = self.method_spec(token) {
                    let (declaring, name, signature) = match spec.method.table_id() {
                        Some(TableId::MethodDef) => match self.method(spec.method) {
                            Ok(m) => (self.type_name(m.declaring), &m.name, &m.signature),
                            Err(_) => return format!("{token}"),
                        },
                        _ => match self.member_ref(spec.method) {
                            Ok(MemberRef {
                                declaring,
                                name,
                                signature: MemberRefSignature::Method(signature),
                            }) => (self.signature_name(declaring), name, signature),
                            _ => return format!("{token}"),
                        },
                    };
                    self.write_method_name(&mut out, &declaring, name, signature, &spec.instantiation);
                    return out;
                }
            }
            _ => {}
        }
        format!("{token}")
    }

    /// Full name of a field definition, e.g. `System.Int32 Game.Player::health`
    #[must_use]
    pub fn field_full_name(&self, token: Token) -> String {
        match self.field(token) {
            Ok(field) => format!(
                "{} {}::{}",
                self.signature_name(&field.signature),
                self.type_name(field.declaring),
                field.name
            ),
            Err(_) => format!("{token}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{identity::AssemblyVersion, typesystem::TypeDef};

    fn corlib() -> AssemblyIdentity {
        AssemblyIdentity::new("mscorlib", AssemblyVersion::new(4, 0, 0, 0))
    }

    #[test]
    fn test_find_or_add_assembly_ref() {
        let mut module = Module::new(AssemblyIdentity::new("Game", AssemblyVersion::default()));
        let (first, added) = module.find_or_add_assembly_ref(&corlib());
        assert!(added);
        let (second, added) = module.find_or_add_assembly_ref(&corlib());
        assert!(!added);
        assert_eq!(first, second);
        assert_eq!(module.assembly_refs.len(), 1);
        assert_eq!(module.name, "Game.dll");
    }

    #[test]
    fn test_token_table_mismatch() {
        let module = Module::default();
        let token = Token::from_parts(TableId::TypeDef, 1);
        assert!(matches!(module.type_ref(token), Err(Error::TokenNotFound(_))));
        assert!(matches!(module.type_def(token), Err(Error::TokenNotFound(_))));
    }

    #[test]
    fn test_type_names() {
        let mut module = Module::default();
        let corlib = module.add_assembly_ref(corlib());
        let list = module.add_type_ref(TypeRef {
            namespace: "System.Collections.Generic".to_string(),
            name: "List`1".to_string(),
            scope: ResolutionScope::AssemblyRef(corlib),
        });
        let enumerator = module.add_type_ref(TypeRef {
            namespace: String::new(),
            name: "Enumerator".to_string(),
            scope: ResolutionScope::TypeRef(list),
        });

        let outer = module.add_type_def(TypeDef::new("Game", "Player"));
        let mut inner = TypeDef::new("", "State");
        inner.enclosing = Some(outer);
        let inner = module.add_type_def(inner);
        module.type_def_mut(outer).unwrap().nested_types.push(inner);

        assert_eq!(module.type_name(enumerator), "System.Collections.Generic.List`1/Enumerator");
        assert_eq!(module.type_name(inner), "Game.Player/State");
        assert_eq!(module.find_nested_type(outer, "State"), Some(inner));
        assert_eq!(module.find_type_def("Game", "Player"), Some(outer));
        assert_eq!(module.find_type_def("", "State"), None);

        let sig = TypeSignature::SzArray(Box::new(TypeSignature::GenericInst(
            Box::new(TypeSignature::Class(list)),
            vec![TypeSignature::I4, TypeSignature::GenericParamMethod(0)],
        )));
        assert_eq!(
            module.signature_name(&sig),
            "System.Collections.Generic.List`1<System.Int32,!!0>[]"
        );
        let matrix = TypeSignature::Array {
            element: Box::new(TypeSignature::R8),
            rank: 2,
        };
        assert_eq!(module.signature_name(&matrix), "System.Double[,]");
        assert_eq!(
            module.root_scope(enumerator).unwrap(),
            ResolutionScope::AssemblyRef(corlib)
        );
    }

    #[test]
    fn test_member_full_name() {
        let mut module = Module::default();
        let player = module.add_type_def(TypeDef::new("Game", "Player"));
        let method = module
            .add_method(MethodDef::new(
                "Move",
                player,
                MethodSignature::new_instance(TypeSignature::Void, vec![TypeSignature::R4]),
            ))
            .unwrap();

        assert_eq!(
            module.member_full_name(method),
            "System.Void Game.Player::Move(System.Single)"
        );
        assert_eq!(module.type_def(player).unwrap().methods, vec![method]);

        let health = module.find_or_add_member_ref(MemberRef {
            declaring: TypeSignature::Class(player),
            name: "health".to_string(),
            signature: MemberRefSignature::Field(TypeSignature::I4),
        });
        assert_eq!(
            module.member_full_name(health),
            "System.Int32 Game.Player::health"
        );
    }

    #[test]
    fn test_root_scope_cycle() {
        let mut module = Module::default();
        let first = Token::from_parts(TableId::TypeRef, 1);
        let second = Token::from_parts(TableId::TypeRef, 2);
        module.add_type_ref(TypeRef {
            namespace: String::new(),
            name: "A".to_string(),
            scope: ResolutionScope::TypeRef(second),
        });
        module.add_type_ref(TypeRef {
            namespace: String::new(),
            name: "B".to_string(),
            scope: ResolutionScope::TypeRef(first),
        });

        assert!(matches!(
            module.root_scope(first),
            Err(Error::RecursionLimit(_))
        ));
    }
}
