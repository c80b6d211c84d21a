//! Fluent construction of in-memory modules.
//!
//! [`ModuleBuilder`] is how tests and tools synthesize modules without going through a
//! [`crate::metadata::provider::MetadataProvider`]. It keeps the cross links of the tables
//! consistent: methods and fields are registered with their declaring type, nested types with
//! their enclosing type.
//!
//! # Example
//! ```rust
//! use refrewrite::metadata::{builder::ModuleBuilder, identity::AssemblyVersion};
//! use refrewrite::metadata::signatures::{MethodSignature, TypeSignature};
//!
//! let mut builder = ModuleBuilder::new("Game", AssemblyVersion::new(1, 0, 0, 0));
//! let object = builder.system_type("Object");
//! let player = builder.class("Game", "Player").base(object).build_token();
//! builder.method_named(player, "Jump", MethodSignature::new_instance(TypeSignature::Void, vec![]))?;
//!
//! let module = builder.build();
//! assert_eq!(module.type_name(player), "Game.Player");
//! # Ok::<(), refrewrite::Error>(())
//! ```

use crate::{
    metadata::{
        identity::{AssemblyIdentity, AssemblyVersion},
        method::{FieldAttributes, FieldDef, MemberRef, MemberRefSignature, MethodDef, MethodSpec},
        module::Module,
        signatures::{MethodSignature, TypeSignature},
        token::Token,
        typesystem::{GenericParam, ResolutionScope, TypeAttributes, TypeDef, TypeRef},
    },
    Result,
};

/// Builds a [`Module`] step by step
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    /// Starts a module for the assembly `name`
    pub fn new(name: &str, version: AssemblyVersion) -> Self {
        ModuleBuilder {
            module: Module::new(AssemblyIdentity::new(name, version)),
        }
    }

    /// Sets the public key of the assembly
    #[must_use]
    pub fn public_key(mut self, key: Vec<u8>) -> Self {
        self.module.assembly.public_key = key;
        self
    }

    /// Gives access to the module being built
    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    /// The assembly reference `name, version`, added if missing
    pub fn assembly_ref(&mut self, name: &str, version: AssemblyVersion) -> Token {
        self.assembly_ref_identity(&AssemblyIdentity::new(name, version))
    }

    /// The assembly reference `identity`, added if missing
    pub fn assembly_ref_identity(&mut self, identity: &AssemblyIdentity) -> Token {
        self.module.find_or_add_assembly_ref(identity).0
    }

    /// A reference to a top-level type of another assembly
    pub fn type_ref(&mut self, assembly: Token, namespace: &str, name: &str) -> Token {
        self.module.find_or_add_type_ref(TypeRef {
            namespace: namespace.to_string(),
            name: name.to_string(),
            scope: ResolutionScope::AssemblyRef(assembly),
        })
    }

    /// A reference to a type nested in the referenced type `outer`
    pub fn nested_type_ref(&mut self, outer: Token, name: &str) -> Token {
        self.module.find_or_add_type_ref(TypeRef {
            namespace: String::new(),
            name: name.to_string(),
            scope: ResolutionScope::TypeRef(outer),
        })
    }

    /// A class signature for `System.<name>` of `mscorlib 4.0.0.0`
    pub fn system_type(&mut self, name: &str) -> TypeSignature {
        let corlib = self.assembly_ref("mscorlib", AssemblyVersion::new(4, 0, 0, 0));
        TypeSignature::Class(self.type_ref(corlib, "System", name))
    }

    /// Starts a top-level class definition
    pub fn class(&mut self, namespace: &str, name: &str) -> TypeDefBuilder<'_> {
        TypeDefBuilder {
            builder: self,
            def: TypeDef::new(namespace, name),
        }
    }

    /// Adds an empty nested class to `outer`
    ///
    /// # Errors
    /// Returns [`crate::Error::TokenNotFound`] if `outer` is not a type of this module.
    pub fn nested_class(&mut self, outer: Token, name: &str) -> Result<Token> {
        self.nested(outer, TypeDef::new("", name))
    }

    /// Adds `def` as a nested type of `outer`
    ///
    /// # Errors
    /// Returns [`crate::Error::TokenNotFound`] if `outer` is not a type of this module.
    pub fn nested(&mut self, outer: Token, mut def: TypeDef) -> Result<Token> {
        self.module.type_def(outer)?;

        def.enclosing = Some(outer);
        def.flags.remove(TypeAttributes::PUBLIC);
        def.flags.insert(TypeAttributes::NESTED_PRIVATE);
        let token = self.module.add_type_def(def);
        self.module.type_def_mut(outer)?.nested_types.push(token);
        Ok(token)
    }

    /// Adds `method` to `owner`
    ///
    /// # Errors
    /// Returns [`crate::Error::TokenNotFound`] if `owner` is not a type of this module.
    pub fn method(&mut self, owner: Token, mut method: MethodDef) -> Result<Token> {
        method.declaring = owner;
        self.module.add_method(method)
    }

    /// Adds a public method without body to `owner`
    ///
    /// # Errors
    /// Returns [`crate::Error::TokenNotFound`] if `owner` is not a type of this module.
    pub fn method_named(
        &mut self,
        owner: Token,
        name: &str,
        signature: MethodSignature,
    ) -> Result<Token> {
        self.method(owner, MethodDef::new(name, owner, signature))
    }

    /// Adds a public field to `owner`
    ///
    /// # Errors
    /// Returns [`crate::Error::TokenNotFound`] if `owner` is not a type of this module.
    pub fn field(&mut self, owner: Token, name: &str, signature: TypeSignature) -> Result<Token> {
        self.module.add_field(FieldDef {
            name: name.to_string(),
            flags: FieldAttributes::PUBLIC,
            declaring: owner,
            signature,
            custom_attributes: Vec::new(),
        })
    }

    /// A method reference on `declaring`
    pub fn method_ref(
        &mut self,
        declaring: TypeSignature,
        name: &str,
        signature: MethodSignature,
    ) -> Token {
        self.module.find_or_add_member_ref(MemberRef {
            declaring,
            name: name.to_string(),
            signature: MemberRefSignature::Method(signature),
        })
    }

    /// A field reference on `declaring`
    pub fn field_ref(&mut self, declaring: TypeSignature, name: &str, field_type: TypeSignature) -> Token {
        self.module.find_or_add_member_ref(MemberRef {
            declaring,
            name: name.to_string(),
            signature: MemberRefSignature::Field(field_type),
        })
    }

    /// A generic instantiation of `method`
    pub fn method_spec(&mut self, method: Token, instantiation: Vec<TypeSignature>) -> Token {
        self.module.find_or_add_method_spec(MethodSpec {
            method,
            instantiation,
        })
    }

    /// A type spec for `signature`
    pub fn type_spec(&mut self, signature: TypeSignature) -> Token {
        self.module.find_or_add_type_spec(signature)
    }

    /// Finishes the module
    #[must_use]
    pub fn build(self) -> Module {
        self.module
    }
}

/// Builds a single [`TypeDef`]; created by [`ModuleBuilder::class`]
pub struct TypeDefBuilder<'a> {
    builder: &'a mut ModuleBuilder,
    def: TypeDef,
}

impl TypeDefBuilder<'_> {
    /// Sets the base type
    #[must_use]
    pub fn base(mut self, base: TypeSignature) -> Self {
        self.def.base = Some(base);
        self
    }

    /// Adds an implemented interface
    #[must_use]
    pub fn interface(mut self, interface: TypeSignature) -> Self {
        self.def.interfaces.push(interface);
        self
    }

    /// Adds type attributes
    #[must_use]
    pub fn flags(mut self, flags: TypeAttributes) -> Self {
        self.def.flags |= flags;
        self
    }

    /// Adds a generic parameter
    #[must_use]
    pub fn generic_param(mut self, param: GenericParam) -> Self {
        self.def.generic_params.push(param);
        self
    }

    /// Adds the type to the module and returns its token
    pub fn build_token(self) -> Token {
        self.builder.module.add_type_def(self.def)
    }
}
