//! Type, field and method resolution across the target and the oracle modules.
//!
//! A [`Resolver`] borrows the target module and the [`ModuleSet`] immutably and answers
//! "which definition does this reference denote". Results are plain handles
//! ([`TypeHandle`], [`MemberHandle`]) so callers can drop the resolver, mutate the target and
//! resolve again.
//!
//! Resolution follows the resolution scope of a type reference (the module itself, an assembly
//! reference, or the enclosing type of a nested type), then type forwarders. Members are looked
//! up on the resolved declaring type and its base types, comparing name, generic arity,
//! calling convention and the full names of return and parameter types.

use std::collections::HashSet;

use crate::{
    metadata::{
        method::{MemberRefSignature, MethodDef},
        module::Module,
        signatures::{MethodSignature, TypeSignature},
        token::{TableId, Token},
        typesystem::ResolutionScope,
    },
    resolver::modules::{ModuleId, ModuleSet},
    Error, Result,
};

/// Maximum length of scope, forwarder and base type chains
const MAX_CHAIN_DEPTH: usize = 64;

/// Identifies a module known to a [`Resolver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKey {
    /// The module being rewritten
    Target,
    /// A module of the [`ModuleSet`]
    Loaded(ModuleId),
}

/// A resolved type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle {
    /// Module defining the type
    pub module: ModuleKey,
    /// `TypeDef` token inside that module
    pub token: Token,
}

/// A resolved field or method definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberHandle {
    /// Module defining the member
    pub module: ModuleKey,
    /// `Field` or `MethodDef` token inside that module
    pub token: Token,
}

/// Resolves references of the target and of oracle modules
pub struct Resolver<'a> {
    target: &'a Module,
    modules: &'a ModuleSet,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver over `target` and `modules`
    pub fn new(target: &'a Module, modules: &'a ModuleSet) -> Self {
        Resolver { target, modules }
    }

    /// The module behind `key`
    ///
    /// # Errors
    /// Returns [`Error::AssemblyNotFound`] for ids of another module set.
    pub fn module(&self, key: ModuleKey) -> Result<&'a Module> {
        match key {
            ModuleKey::Target => Ok(self.target),
            ModuleKey::Loaded(id) => self
                .modules
                .get(id)
                .ok_or_else(|| Error::AssemblyNotFound(format!("module #{}", id.index()))),
        }
    }

    /// The module of the assembly `name`; the target's own name maps to the target
    #[must_use]
    pub fn module_for_assembly(&self, name: &str) -> Option<ModuleKey> {
        if name == self.target.assembly.name {
            return Some(ModuleKey::Target);
        }
        self.modules.find(name).map(ModuleKey::Loaded)
    }

    /// Resolves a `TypeRef`, `TypeDef` or `TypeSpec` token of the module `key`.
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] for dangling tokens and [`Error::RecursionLimit`] for
    /// cyclic scope or forwarder chains. A type that simply does not exist is `Ok(None)`.
    pub fn resolve_type(&self, key: ModuleKey, token: Token) -> Result<Option<TypeHandle>> {
        self.resolve_type_at(key, token, 0)
    }

    fn resolve_type_at(&self, key: ModuleKey, token: Token, depth: usize) -> Result<Option<TypeHandle>> {
        if depth > MAX_CHAIN_DEPTH {
            return Err(Error::RecursionLimit(MAX_CHAIN_DEPTH));
        }

        let module = self.module(key)?;
        match token.table_id() {
            Some(TableId::TypeDef) => {
                module.type_def(token)?;
                Ok(Some(TypeHandle { module: key, token }))
            }
            Some(TableId::TypeRef) => {
                let type_ref = module.type_ref(token)?;
                match type_ref.scope {
                    ResolutionScope::Module => {
                        self.find_in_module(key, &type_ref.namespace, &type_ref.name, depth + 1)
                    }
                    ResolutionScope::AssemblyRef(assembly) => {
                        let identity = module.assembly_ref(assembly)?;
                        match self.module_for_assembly(&identity.name) {
                            Some(scope) => self.find_in_module(
                                scope,
                                &type_ref.namespace,
                                &type_ref.name,
                                depth + 1,
                            ),
                            None => Ok(None),
                        }
                    }
                    ResolutionScope::TypeRef(outer) => {
                        let Some(outer) = self.resolve_type_at(key, outer, depth + 1)? else {
                            return Ok(None);
                        };
                        let outer_module = self.module(outer.module)?;
                        Ok(outer_module
                            .find_nested_type(outer.token, &type_ref.name)
                            .map(|token| TypeHandle {
                                module: outer.module,
                                token,
                            }))
                    }
                }
            }
            Some(TableId::TypeSpec) => {
                let spec = module.type_spec(token)?;
                self.resolve_signature_at(key, spec, depth + 1)
            }
            _ => Err(Error::TokenNotFound(token)),
        }
    }

    /// Looks up the top-level type `namespace.name` in the module `key`, following its type
    /// forwarders.
    ///
    /// # Errors
    /// Returns [`Error::RecursionLimit`] for cyclic forwarders.
    pub fn find_in_module(
        &self,
        key: ModuleKey,
        namespace: &str,
        name: &str,
        depth: usize,
    ) -> Result<Option<TypeHandle>> {
        if depth > MAX_CHAIN_DEPTH {
            return Err(Error::RecursionLimit(MAX_CHAIN_DEPTH));
        }

        let module = self.module(key)?;
        if let Some(token) = module.find_type_def(namespace, name) {
            return Ok(Some(TypeHandle { module: key, token }));
        }

        let Some(exported) = module.find_exported_type(namespace, name) else {
            return Ok(None);
        };
        let identity = module.assembly_ref(exported.assembly)?;
        match self.module_for_assembly(&identity.name) {
            Some(forwarded) if forwarded != key => {
                self.find_in_module(forwarded, namespace, name, depth + 1)
            }
            _ => Ok(None),
        }
    }

    /// Resolves the type a signature denotes: the generic type of an instantiation, the
    /// corlib definition of a primitive. Arrays, pointers, by-refs and generic parameters do
    /// not resolve to a definition.
    ///
    /// # Errors
    /// See [`Resolver::resolve_type`].
    pub fn resolve_signature(&self, key: ModuleKey, signature: &TypeSignature) -> Result<Option<TypeHandle>> {
        self.resolve_signature_at(key, signature, 0)
    }

    fn resolve_signature_at(
        &self,
        key: ModuleKey,
        signature: &TypeSignature,
        depth: usize,
    ) -> Result<Option<TypeHandle>> {
        match signature {
            TypeSignature::Class(token) | TypeSignature::ValueType(token) => {
                self.resolve_type_at(key, *token, depth + 1)
            }
            TypeSignature::GenericInst(base, _) => self.resolve_signature_at(key, base, depth + 1),
            other => match other.primitive_name() {
                Some(full_name) => Ok(self.corlib_type(full_name)),
                None => Ok(None),
            },
        }
    }

    /// The definition of a `System.*` type in the core library, found as the oracle module that
    /// defines `System.Object` without a base type
    #[must_use]
    pub fn corlib_type(&self, full_name: &str) -> Option<TypeHandle> {
        let name = full_name.strip_prefix("System.")?;
        self.modules.iter().find_map(|(id, module)| {
            let object = module.find_type_def("System", "Object")?;
            if module.type_def(object).ok()?.base.is_some() {
                return None;
            }
            module.find_type_def("System", name).map(|token| TypeHandle {
                module: ModuleKey::Loaded(id),
                token,
            })
        })
    }

    /// Full name of a resolved type
    #[must_use]
    pub fn type_name(&self, handle: TypeHandle) -> String {
        match self.module(handle.module) {
            Ok(module) => module.type_name(handle.token),
            Err(_) => handle.token.to_string(),
        }
    }

    /// The resolved base type of `handle`, `None` at the root of the hierarchy
    ///
    /// # Errors
    /// See [`Resolver::resolve_type`].
    pub fn base_type(&self, handle: TypeHandle) -> Result<Option<TypeHandle>> {
        let module = self.module(handle.module)?;
        match &module.type_def(handle.token)?.base {
            Some(base) => self.resolve_signature(handle.module, base),
            None => Ok(None),
        }
    }

    /// `handle` followed by its resolvable base types, most derived first. The walk stops at
    /// the first base that cannot be resolved or that was already seen.
    ///
    /// # Errors
    /// See [`Resolver::resolve_type`].
    pub fn type_chain(&self, handle: TypeHandle) -> Result<Vec<TypeHandle>> {
        let mut chain = vec![handle];
        let mut seen: HashSet<TypeHandle> = HashSet::from([handle]);
        let mut current = handle;

        while let Some(base) = self.base_type(current)? {
            if !seen.insert(base) || chain.len() > MAX_CHAIN_DEPTH {
                break;
            }
            chain.push(base);
            current = base;
        }
        Ok(chain)
    }

    /// Full names of `signature` and every type it derives from, starting with the signature
    /// itself. Primitives fall back to the built-in hierarchy when no core library is loaded.
    ///
    /// # Errors
    /// See [`Resolver::resolve_type`].
    pub fn ancestor_names(&self, key: ModuleKey, signature: &TypeSignature) -> Result<Vec<String>> {
        let module = self.module(key)?;
        let mut names = vec![module.signature_name(signature)];

        match self.resolve_signature(key, signature)? {
            Some(handle) => {
                for base in self.type_chain(handle)?.into_iter().skip(1) {
                    names.push(self.type_name(base));
                }
            }
            None if signature.is_primitive_value_type() => {
                names.push("System.ValueType".to_string());
                names.push("System.Object".to_string());
            }
            None if signature.is_array() => {
                names.push("System.Array".to_string());
                names.push("System.Object".to_string());
            }
            None if matches!(signature, TypeSignature::String) => {
                names.push("System.Object".to_string());
            }
            None => {}
        }
        Ok(names)
    }

    /// Resolves a `Field` token or a field `MemberRef` of the module `key`
    ///
    /// # Errors
    /// See [`Resolver::resolve_type`].
    pub fn resolve_field(&self, key: ModuleKey, token: Token) -> Result<Option<MemberHandle>> {
        let module = self.module(key)?;
        if token.is_table(TableId::Field) {
            module.field(token)?;
            return Ok(Some(MemberHandle { module: key, token }));
        }

        let member = module.member_ref(token)?;
        let MemberRefSignature::Field(field_type) = &member.signature else {
            return Ok(None);
        };
        let Some(declaring) = self.resolve_signature(key, &member.declaring)? else {
            return Ok(None);
        };

        let wanted_type = module.signature_name(field_type);
        for handle in self.type_chain(declaring)? {
            let owner = self.module(handle.module)?;
            for field_token in &owner.type_def(handle.token)?.fields {
                let field = owner.field(*field_token)?;
                if field.name == member.name && owner.signature_name(&field.signature) == wanted_type {
                    return Ok(Some(MemberHandle {
                        module: handle.module,
                        token: *field_token,
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Resolves a `MethodDef`, method `MemberRef` or `MethodSpec` token of the module `key`.
    ///
    /// A method spec resolves to the definition of the method it instantiates.
    ///
    /// # Errors
    /// See [`Resolver::resolve_type`].
    pub fn resolve_method(&self, key: ModuleKey, token: Token) -> Result<Option<MemberHandle>> {
        let module = self.module(key)?;
        match token.table_id() {
            Some(TableId::MethodDef) => {
                module.method(token)?;
                Ok(Some(MemberHandle { module: key, token }))
            }
            Some(TableId::MethodSpec) => {
                let spec = module.method_spec(token)?;
                self.resolve_method(key, spec.method)
            }
            Some(TableId::MemberRef) => {
                let member = module.member_ref(token)?;
                let MemberRefSignature::Method(signature) = &member.signature else {
                    return Ok(None);
                };
                let Some(declaring) = self.resolve_signature(key, &member.declaring)? else {
                    return Ok(None);
                };

                for handle in self.type_chain(declaring)? {
                    let owner = self.module(handle.module)?;
                    for method_token in &owner.type_def(handle.token)?.methods {
                        let method = owner.method(*method_token)?;
                        if method.name == member.name
                            && self.signatures_match(module, signature, owner, &method.signature)
                        {
                            return Ok(Some(MemberHandle {
                                module: handle.module,
                                token: *method_token,
                            }));
                        }
                    }
                }
                Ok(None)
            }
            _ => Err(Error::TokenNotFound(token)),
        }
    }

    /// The method definition behind a handle
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] if the handle is not a method.
    pub fn method_def(&self, handle: MemberHandle) -> Result<&'a MethodDef> {
        self.module(handle.module)?.method(handle.token)
    }

    /// Returns true if two method signatures, each read in its own module, are identical
    #[must_use]
    pub fn signatures_match(
        &self,
        left_module: &Module,
        left: &MethodSignature,
        right_module: &Module,
        right: &MethodSignature,
    ) -> bool {
        left.has_this == right.has_this
            && left.generic_param_count == right.generic_param_count
            && left.params.len() == right.params.len()
            && left_module.signature_name(&left.return_type)
                == right_module.signature_name(&right.return_type)
            && left
                .params
                .iter()
                .zip(&right.params)
                .all(|(l, r)| left_module.signature_name(l) == right_module.signature_name(r))
    }
}
