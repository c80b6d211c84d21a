//! Importing types and methods of one module into another.
//!
//! The rewriter finds replacement members in read-only oracle modules (support framework,
//! alternate modules) and has to reference them from the target. [`Importer`] turns tokens of
//! the source module into tokens of the target, creating assembly references, type references,
//! type specs and member references on demand and reusing equal rows that already exist.

use crate::{
    metadata::{
        identity::AssemblyIdentity,
        method::{MemberRef, MemberRefSignature},
        module::Module,
        signatures::{MethodSignature, TypeSignature},
        token::{TableId, Token},
        typesystem::{ResolutionScope, TypeRef},
    },
    Error, Result,
};

const MAX_IMPORT_DEPTH: usize = 64;

/// Copies references from `source` into `target`
pub struct Importer<'a> {
    source: &'a Module,
    target: &'a mut Module,
}

impl<'a> Importer<'a> {
    /// Creates an importer from `source` into `target`
    pub fn new(source: &'a Module, target: &'a mut Module) -> Self {
        Importer { source, target }
    }

    fn import_scope(&mut self, identity: &AssemblyIdentity) -> ResolutionScope {
        if identity.name == self.target.assembly.name {
            return ResolutionScope::Module;
        }
        let (token, _) = self.target.find_or_add_assembly_ref(identity);
        ResolutionScope::AssemblyRef(token)
    }

    /// Imports a `TypeDef`, `TypeRef` or `TypeSpec` token of the source.
    ///
    /// Definitions and references become type references of the target; specs become type specs.
    ///
    /// # Errors
    /// Returns [`Error::TokenNotFound`] for tokens the source does not contain.
    pub fn import_type(&mut self, token: Token) -> Result<Token> {
        self.import_type_at(token, 0)
    }

    fn import_type_at(&mut self, token: Token, depth: usize) -> Result<Token> {
        if depth > MAX_IMPORT_DEPTH {
            return Err(Error::RecursionLimit(MAX_IMPORT_DEPTH));
        }

        let source = self.source;
        match token.table_id() {
            Some(TableId::TypeDef) => {
                let def = source.type_def(token)?;
                let scope = match def.enclosing {
                    Some(outer) => ResolutionScope::TypeRef(self.import_type_at(outer, depth + 1)?),
                    None => {
                        let identity = source.assembly.clone();
                        self.import_scope(&identity)
                    }
                };
                Ok(self.target.find_or_add_type_ref(TypeRef {
                    namespace: def.namespace.clone(),
                    name: def.name.clone(),
                    scope,
                }))
            }
            Some(TableId::TypeRef) => {
                let type_ref = source.type_ref(token)?;
                let scope = match type_ref.scope {
                    ResolutionScope::TypeRef(outer) => {
                        ResolutionScope::TypeRef(self.import_type_at(outer, depth + 1)?)
                    }
                    ResolutionScope::AssemblyRef(assembly) => {
                        let identity = source.assembly_ref(assembly)?.clone();
                        self.import_scope(&identity)
                    }
                    ResolutionScope::Module => {
                        let identity = source.assembly.clone();
                        self.import_scope(&identity)
                    }
                };
                Ok(self.target.find_or_add_type_ref(TypeRef {
                    namespace: type_ref.namespace.clone(),
                    name: type_ref.name.clone(),
                    scope,
                }))
            }
            Some(TableId::TypeSpec) => {
                let spec = source.type_spec(token)?.clone();
                let imported = self.import_signature_at(&spec, depth + 1)?;
                Ok(self.target.find_or_add_type_spec(imported))
            }
            _ => Err(Error::TokenNotFound(token)),
        }
    }

    /// Imports every token of a type signature
    ///
    /// # Errors
    /// See [`Importer::import_type`].
    pub fn import_signature(&mut self, signature: &TypeSignature) -> Result<TypeSignature> {
        self.import_signature_at(signature, 0)
    }

    fn import_signature_at(
        &mut self,
        signature: &TypeSignature,
        depth: usize,
    ) -> Result<TypeSignature> {
        let imported = match signature {
            TypeSignature::Class(token) => {
                TypeSignature::Class(self.import_type_at(*token, depth + 1)?)
            }
            TypeSignature::ValueType(token) => {
                TypeSignature::ValueType(self.import_type_at(*token, depth + 1)?)
            }
            TypeSignature::GenericInst(base, args) => {
                let base = self.import_signature_at(base, depth + 1)?;
                let args = args
                    .iter()
                    .map(|arg| self.import_signature_at(arg, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                TypeSignature::GenericInst(Box::new(base), args)
            }
            TypeSignature::SzArray(inner) => {
                TypeSignature::SzArray(Box::new(self.import_signature_at(inner, depth + 1)?))
            }
            TypeSignature::Array { element, rank } => TypeSignature::Array {
                element: Box::new(self.import_signature_at(element, depth + 1)?),
                rank: *rank,
            },
            TypeSignature::ByRef(inner) => {
                TypeSignature::ByRef(Box::new(self.import_signature_at(inner, depth + 1)?))
            }
            TypeSignature::Ptr(inner) => {
                TypeSignature::Ptr(Box::new(self.import_signature_at(inner, depth + 1)?))
            }
            other => other.clone(),
        };
        Ok(imported)
    }

    /// Imports a method signature
    ///
    /// # Errors
    /// See [`Importer::import_type`].
    pub fn import_method_signature(&mut self, signature: &MethodSignature) -> Result<MethodSignature> {
        Ok(MethodSignature {
            has_this: signature.has_this,
            generic_param_count: signature.generic_param_count,
            return_type: self.import_signature(&signature.return_type)?,
            params: signature
                .params
                .iter()
                .map(|param| self.import_signature(param))
                .collect::<Result<Vec<_>>>()?,
        })
    }

    /// Imports a `MethodDef` of the source as a member reference of the target.
    ///
    /// `declaring` overrides the declaring type of the reference; it must already be a signature
    /// of the target, typically the generic instantiation used at the call site. Without it the
    /// reference is declared on the imported definition of the method's own type.
    ///
    /// # Errors
    /// See [`Importer::import_type`].
    pub fn import_method(
        &mut self,
        method: Token,
        declaring: Option<TypeSignature>,
    ) -> Result<Token> {
        let source = self.source;
        let def = source.method(method)?;
        let declaring = match declaring {
            Some(declaring) => declaring,
            None => {
                let owner = self.import_type(def.declaring)?;
                if source.is_value_type_def(def.declaring) {
                    TypeSignature::ValueType(owner)
                } else {
                    TypeSignature::Class(owner)
                }
            }
        };
        let signature = self.import_method_signature(&def.signature)?;

        Ok(self.target.find_or_add_member_ref(MemberRef {
            declaring,
            name: def.name.clone(),
            signature: MemberRefSignature::Method(signature),
        }))
    }
}
