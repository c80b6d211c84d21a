//! Deterministic traversal of every symbolic reference held by the target module.
//!
//! The [`ReferenceWalker`] visits the types of the target in declaration order. For each type
//! it reports the references found in the base type, generic parameters, interfaces, custom
//! attributes, fields, properties and events, then walks every method: return type, parameters,
//! explicit overrides, generic parameters, local variables, the instruction stream and finally
//! the catch types of its exception handlers.
//!
//! References are reported to a [`ReferenceVisitor`] as [`Reference`] values together with the
//! name of the entity holding them. A few rules shape what gets reported:
//!
//! - generic arguments are reported before the instantiated type
//! - a nested type reference is reported as its outermost enclosing reference
//! - references whose scope is the target module itself are never reported
//! - member references are reported after the types they mention, and only when their
//!   declaring type lives outside the target
//!
//! When the visitor answers a call site with [`VisitOutcome::PackParams`], the call is patched
//! on the spot and the walk continues after the patched call. Anywhere else the answer cannot
//! be applied and is handed back through [`ReferenceVisitor::unpackable`].
//!
//! Calls into `UnityScript.Lang` types are not visited at all.

use log::trace;

use crate::{
    assembly::{OpCode, OperandKind},
    metadata::{
        customattributes::CustomAttribute,
        method::MemberRefSignature,
        module::Module,
        signatures::{MethodSignature, TypeSignature},
        token::{TableId, Token},
        typesystem::{GenericParam, ResolutionScope},
    },
    rewrite::{
        context::RewriteContext,
        patcher::{pack_params_call, ParamsCall},
    },
    Error, Result,
};

/// Nesting limit for signatures and type specs
const MAX_SIGNATURE_DEPTH: usize = 64;

/// Namespace prefix of declaring types whose methods are never visited as operands
const SKIPPED_NAMESPACE: &str = "UnityScript.Lang";

/// A symbolic reference of the target module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reference {
    /// A `TypeRef` token
    Type(Token),
    /// A field `MemberRef` token
    Field(Token),
    /// A method `MemberRef` or `MethodSpec` token
    Method(Token),
}

/// What the walker does after a reference was visited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOutcome {
    /// Nothing more to do
    Done,
    /// The call site must be rewritten to pass its trailing arguments to a `params` overload
    PackParams(ParamsCall),
}

/// Receives the references found by a [`ReferenceWalker`]
pub trait ReferenceVisitor {
    /// Handles `reference`, held by `entity`
    ///
    /// # Errors
    /// Errors abort the walk.
    fn visit(
        &mut self,
        ctx: &mut RewriteContext,
        reference: Reference,
        entity: &str,
    ) -> Result<VisitOutcome>;

    /// Called when a [`VisitOutcome::PackParams`] answer for `reference` cannot be applied,
    /// because it is not held by a call instruction
    ///
    /// # Errors
    /// Errors abort the walk.
    fn unpackable(
        &mut self,
        _ctx: &mut RewriteContext,
        _reference: Reference,
        _entity: &str,
    ) -> Result<()> {
        Ok(())
    }
}

/// Walks the target module of a [`RewriteContext`] and reports its references
pub struct ReferenceWalker<'v, V: ReferenceVisitor + ?Sized> {
    visitor: &'v mut V,
    packed: usize,
}

impl<'v, V: ReferenceVisitor + ?Sized> ReferenceWalker<'v, V> {
    /// Creates a walker reporting to `visitor`
    pub fn new(visitor: &'v mut V) -> Self {
        ReferenceWalker { visitor, packed: 0 }
    }

    /// Walks the whole target module; returns the number of call sites packed
    ///
    /// # Errors
    /// Returns visitor and patcher errors, [`Error::TokenNotFound`] for dangling tokens and
    /// [`Error::RecursionLimit`] for signatures nested too deeply.
    pub fn walk(&mut self, ctx: &mut RewriteContext) -> Result<usize> {
        let assembly_attributes = ctx.target.custom_attributes.clone();
        let module_name = ctx.target.name.clone();
        self.attributes(ctx, &assembly_attributes, &module_name)?;

        let types: Vec<Token> = ctx.target.type_def_tokens().collect();
        for token in types {
            self.walk_type(ctx, token)?;
        }
        Ok(self.packed)
    }

    fn walk_type(&mut self, ctx: &mut RewriteContext, token: Token) -> Result<()> {
        let def = ctx.target.type_def(token)?.clone();
        let entity = ctx.target.type_name(token);
        trace!("Walking {entity}");

        if let Some(base) = &def.base {
            self.signature(ctx, base, &entity)?;
        }
        for param in &def.generic_params {
            self.generic_param(ctx, param, &entity)?;
        }
        for interface in &def.interfaces {
            self.signature(ctx, interface, &entity)?;
        }
        self.attributes(ctx, &def.custom_attributes, &entity)?;

        for field in &def.fields {
            let (signature, attributes) = {
                let field_def = ctx.target.field(*field)?;
                (field_def.signature.clone(), field_def.custom_attributes.clone())
            };
            let field_entity = ctx.target.field_full_name(*field);
            self.signature(ctx, &signature, &field_entity)?;
            self.attributes(ctx, &attributes, &field_entity)?;
        }

        for property in &def.properties {
            let property_entity = format!("{}::{}", entity, property.name);
            self.signature(ctx, &property.property_type, &property_entity)?;
            for param in &property.params {
                self.signature(ctx, param, &property_entity)?;
            }
            self.attributes(ctx, &property.custom_attributes, &property_entity)?;
        }

        for event in &def.events {
            let event_entity = format!("{}::{}", entity, event.name);
            self.signature(ctx, &event.event_type, &event_entity)?;
            self.attributes(ctx, &event.custom_attributes, &event_entity)?;
        }

        for method in &def.methods {
            self.walk_method(ctx, *method)?;
        }
        Ok(())
    }

    fn walk_method(&mut self, ctx: &mut RewriteContext, token: Token) -> Result<()> {
        let entity = ctx.target.member_full_name(token);
        let (signature, return_attributes, params, overrides, generic_params, locals) = {
            let method = ctx.target.method(token)?;
            (
                method.signature.clone(),
                method.return_attributes.clone(),
                method.params.clone(),
                method.overrides.clone(),
                method.generic_params.clone(),
                method.body.as_ref().map(|body| body.locals.clone()),
            )
        };

        self.signature(ctx, &signature.return_type, &entity)?;
        self.attributes(ctx, &return_attributes, &entity)?;
        for (index, param_type) in signature.params.iter().enumerate() {
            self.signature(ctx, param_type, &entity)?;
            if let Some(param) = params.get(index) {
                self.attributes(ctx, &param.custom_attributes, &entity)?;
            }
        }
        for overridden in overrides {
            let outcome = self.member(ctx, overridden, &entity)?;
            self.settle(ctx, outcome, overridden, &entity)?;
        }
        for param in &generic_params {
            self.generic_param(ctx, param, &entity)?;
        }

        let Some(locals) = locals else {
            return Ok(());
        };
        for local in &locals {
            self.signature(ctx, local, &entity)?;
        }

        let mut index = 0;
        while let Some((opcode, operand)) = operand_at(&ctx.target, token, index)? {
            if let Some(operand) = operand {
                index = self.instruction(ctx, token, index, opcode, operand, &entity)?;
            }
            index += 1;
        }

        let catch_types: Vec<TypeSignature> = ctx
            .target
            .method(token)?
            .body
            .as_ref()
            .map(|body| {
                body.exception_handlers
                    .iter()
                    .filter_map(|handler| handler.catch_type.clone())
                    .collect()
            })
            .unwrap_or_default();
        for catch_type in &catch_types {
            self.signature(ctx, catch_type, &entity)?;
        }
        Ok(())
    }

    /// Visits the token operand of the instruction at `index`; returns the index the
    /// instruction ended up at
    fn instruction(
        &mut self,
        ctx: &mut RewriteContext,
        method: Token,
        index: usize,
        opcode: OpCode,
        operand: Token,
        entity: &str,
    ) -> Result<usize> {
        match opcode.operand_kind() {
            OperandKind::Type => self.type_token(ctx, operand, entity)?,
            OperandKind::Field | OperandKind::Token if !is_type_token(operand) => {
                let outcome = self.member(ctx, operand, entity)?;
                self.settle(ctx, outcome, operand, entity)?;
            }
            OperandKind::Token => self.type_token(ctx, operand, entity)?,
            OperandKind::Method => {
                if declaring_type_name(&ctx.target, operand)?.starts_with(SKIPPED_NAMESPACE) {
                    return Ok(index);
                }
                match self.member(ctx, operand, entity)? {
                    VisitOutcome::PackParams(call) if opcode.is_call() => {
                        self.packed += 1;
                        return pack_params_call(ctx, method, index, &call);
                    }
                    outcome => self.settle(ctx, outcome, operand, entity)?,
                }
            }
            _ => {}
        }
        Ok(index)
    }

    fn generic_param(
        &mut self,
        ctx: &mut RewriteContext,
        param: &GenericParam,
        entity: &str,
    ) -> Result<()> {
        self.attributes(ctx, &param.custom_attributes, entity)?;
        for constraint in &param.constraints {
            self.signature(ctx, constraint, entity)?;
        }
        Ok(())
    }

    fn attributes(
        &mut self,
        ctx: &mut RewriteContext,
        attributes: &[CustomAttribute],
        entity: &str,
    ) -> Result<()> {
        for attribute in attributes {
            let outcome = self.member(ctx, attribute.constructor, entity)?;
            self.settle(ctx, outcome, attribute.constructor, entity)?;

            let mut types = Vec::new();
            for argument in attribute.arguments() {
                argument.for_each_type(&mut |signature| types.push(signature.clone()));
            }
            for signature in &types {
                self.signature(ctx, signature, entity)?;
            }
        }
        Ok(())
    }

    fn signature(
        &mut self,
        ctx: &mut RewriteContext,
        signature: &TypeSignature,
        entity: &str,
    ) -> Result<()> {
        let mut references = Vec::new();
        signature_references(&ctx.target, signature, &mut references, 0)?;
        self.emit(ctx, references, entity).map(|_| ())
    }

    fn type_token(&mut self, ctx: &mut RewriteContext, token: Token, entity: &str) -> Result<()> {
        let mut references = Vec::new();
        type_references(&ctx.target, token, &mut references, 0)?;
        self.emit(ctx, references, entity).map(|_| ())
    }

    fn member(
        &mut self,
        ctx: &mut RewriteContext,
        token: Token,
        entity: &str,
    ) -> Result<VisitOutcome> {
        let mut references = Vec::new();
        member_references(&ctx.target, token, &mut references)?;
        self.emit(ctx, references, entity)
    }

    /// Hands a packing answer for `token` back to the visitor when it cannot be applied
    fn settle(
        &mut self,
        ctx: &mut RewriteContext,
        outcome: VisitOutcome,
        token: Token,
        entity: &str,
    ) -> Result<()> {
        match outcome {
            VisitOutcome::PackParams(_) => {
                self.visitor.unpackable(ctx, Reference::Method(token), entity)
            }
            VisitOutcome::Done => Ok(()),
        }
    }

    /// Reports `references` in order; the outcome is that of the last one
    fn emit(
        &mut self,
        ctx: &mut RewriteContext,
        references: Vec<Reference>,
        entity: &str,
    ) -> Result<VisitOutcome> {
        let mut outcome = VisitOutcome::Done;
        for reference in references {
            outcome = self.visitor.visit(ctx, reference, entity)?;
        }
        Ok(outcome)
    }
}

/// Opcode and token operand of the instruction at `index`, `None` past the end of the body
fn operand_at(module: &Module, method: Token, index: usize) -> Result<Option<(OpCode, Option<Token>)>> {
    Ok(module
        .method(method)?
        .body
        .as_ref()
        .and_then(|body| body.at(index))
        .map(|instruction| (instruction.opcode, instruction.operand.token())))
}

/// Full name of the type declaring the method behind a `MethodDef`, `MemberRef` or
/// `MethodSpec` token
fn declaring_type_name(module: &Module, token: Token) -> Result<String> {
    match token.table_id() {
        Some(TableId::MethodDef) => Ok(module.type_name(module.method(token)?.declaring)),
        Some(TableId::MemberRef) => Ok(module.signature_name(&module.member_ref(token)?.declaring)),
        Some(TableId::MethodSpec) => {
            let method = module.method_spec(token)?.method;
            if method.is_table(TableId::MethodSpec) {
                return Err(Error::TokenNotFound(method));
            }
            declaring_type_name(module, method)
        }
        _ => Err(Error::TokenNotFound(token)),
    }
}

fn is_type_token(token: Token) -> bool {
    matches!(
        token.table_id(),
        Some(TableId::TypeDef | TableId::TypeRef | TableId::TypeSpec)
    )
}

/// Returns true if the type a member reference is declared on is defined by `module`
fn declared_locally(module: &Module, declaring: &TypeSignature) -> Result<bool> {
    let base = match declaring {
        TypeSignature::GenericInst(base, _) => base.as_ref(),
        other => other,
    };
    match base.type_token() {
        Some(token) if token.is_table(TableId::TypeDef) => Ok(true),
        Some(token) if token.is_table(TableId::TypeRef) => {
            Ok(module.root_scope(token)? == ResolutionScope::Module)
        }
        _ => Ok(false),
    }
}

fn method_signature_references(
    module: &Module,
    signature: &MethodSignature,
    out: &mut Vec<Reference>,
) -> Result<()> {
    signature_references(module, &signature.return_type, out, 0)?;
    for param in &signature.params {
        signature_references(module, param, out, 0)?;
    }
    Ok(())
}

/// References held by a field, method, member reference or method spec token
fn member_references(module: &Module, token: Token, out: &mut Vec<Reference>) -> Result<()> {
    match token.table_id() {
        Some(TableId::MemberRef) => {
            let member = module.member_ref(token)?;
            signature_references(module, &member.declaring, out, 0)?;
            let reference = match &member.signature {
                MemberRefSignature::Field(field_type) => {
                    signature_references(module, field_type, out, 0)?;
                    Reference::Field(token)
                }
                MemberRefSignature::Method(signature) => {
                    method_signature_references(module, signature, out)?;
                    Reference::Method(token)
                }
            };
            if !declared_locally(module, &member.declaring)? {
                out.push(reference);
            }
        }
        Some(TableId::MethodSpec) => {
            let spec = module.method_spec(token)?;
            for argument in &spec.instantiation {
                signature_references(module, argument, out, 0)?;
            }
            if spec.method.is_table(TableId::MemberRef) {
                let member = module.member_ref(spec.method)?;
                signature_references(module, &member.declaring, out, 0)?;
                if let Some(signature) = member.method_signature() {
                    method_signature_references(module, signature, out)?;
                }
                if !declared_locally(module, &member.declaring)? {
                    out.push(Reference::Method(token));
                }
            }
        }
        Some(TableId::Field | TableId::MethodDef) => {}
        _ => return Err(Error::TokenNotFound(token)),
    }
    Ok(())
}

/// References held by a `TypeDef`, `TypeRef` or `TypeSpec` token
fn type_references(module: &Module, token: Token, out: &mut Vec<Reference>, depth: usize) -> Result<()> {
    if depth > MAX_SIGNATURE_DEPTH {
        return Err(Error::RecursionLimit(MAX_SIGNATURE_DEPTH));
    }

    match token.table_id() {
        Some(TableId::TypeDef) => Ok(()),
        Some(TableId::TypeRef) => {
            let mut outermost = token;
            while let ResolutionScope::TypeRef(outer) = module.type_ref(outermost)?.scope {
                outermost = outer;
            }
            if module.type_ref(outermost)?.scope != ResolutionScope::Module {
                out.push(Reference::Type(outermost));
            }
            Ok(())
        }
        Some(TableId::TypeSpec) => {
            signature_references(module, module.type_spec(token)?, out, depth + 1)
        }
        _ => Err(Error::TokenNotFound(token)),
    }
}

/// References held by a type signature, generic arguments before the instantiated type
fn signature_references(
    module: &Module,
    signature: &TypeSignature,
    out: &mut Vec<Reference>,
    depth: usize,
) -> Result<()> {
    if depth > MAX_SIGNATURE_DEPTH {
        return Err(Error::RecursionLimit(MAX_SIGNATURE_DEPTH));
    }

    match signature {
        TypeSignature::Class(token) | TypeSignature::ValueType(token) => {
            type_references(module, *token, out, depth + 1)
        }
        TypeSignature::GenericInst(base, args) => {
            for arg in args {
                signature_references(module, arg, out, depth + 1)?;
            }
            signature_references(module, base, out, depth + 1)
        }
        TypeSignature::SzArray(inner)
        | TypeSignature::Array { element: inner, .. }
        | TypeSignature::ByRef(inner)
        | TypeSignature::Ptr(inner) => signature_references(module, inner, out, depth + 1),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Instruction, MethodBody, Operand},
        metadata::{
            builder::ModuleBuilder,
            identity::AssemblyVersion,
            method::MethodDef,
            typesystem::TypeRef,
        },
        resolver::{ModuleKey, ModuleSet},
    };

    #[derive(Default)]
    struct Recorder {
        seen: Vec<(Reference, String)>,
    }

    impl ReferenceVisitor for Recorder {
        fn visit(
            &mut self,
            _ctx: &mut RewriteContext,
            reference: Reference,
            entity: &str,
        ) -> Result<VisitOutcome> {
            self.seen.push((reference, entity.to_string()));
            Ok(VisitOutcome::Done)
        }
    }

    fn context(module: Module) -> RewriteContext {
        let mut modules = ModuleSet::new();
        let support = modules
            .register(ModuleBuilder::new("Support", AssemblyVersion::default()).build())
            .unwrap();
        RewriteContext::new(module, modules, support)
    }

    fn walk(ctx: &mut RewriteContext) -> Vec<(Reference, String)> {
        let mut recorder = Recorder::default();
        ReferenceWalker::new(&mut recorder).walk(ctx).unwrap();
        recorder.seen
    }

    #[test]
    fn test_type_level_order() {
        let mut builder = ModuleBuilder::new("Game", AssemblyVersion::default());
        let engine = builder.assembly_ref("UnityEngine", AssemblyVersion::default());
        let behaviour = builder.type_ref(engine, "UnityEngine", "MonoBehaviour");
        let list = builder.type_ref(engine, "System.Collections.Generic", "List`1");
        let vector = builder.type_ref(engine, "UnityEngine", "Vector3");
        let disposable = builder.type_ref(engine, "System", "IDisposable");

        let player = builder
            .class("Game", "Player")
            .base(TypeSignature::Class(behaviour))
            .interface(TypeSignature::Class(disposable))
            .build_token();
        builder
            .field(
                player,
                "path",
                TypeSignature::GenericInst(
                    Box::new(TypeSignature::Class(list)),
                    vec![TypeSignature::ValueType(vector)],
                ),
            )
            .unwrap();

        let mut ctx = context(builder.build());
        let seen = walk(&mut ctx);
        let references: Vec<Reference> = seen.iter().map(|(r, _)| *r).collect();
        assert_eq!(
            references,
            vec![
                Reference::Type(behaviour),
                Reference::Type(disposable),
                Reference::Type(vector),
                Reference::Type(list),
            ]
        );
        assert_eq!(seen[0].1, "Game.Player");
        assert_eq!(
            seen[2].1,
            "System.Collections.Generic.List`1<UnityEngine.Vector3> Game.Player::path"
        );
    }

    #[test]
    fn test_nested_and_self_references() {
        let mut builder = ModuleBuilder::new("Game", AssemblyVersion::default());
        let engine = builder.assembly_ref("UnityEngine", AssemblyVersion::default());
        let outer = builder.type_ref(engine, "UnityEngine", "Camera");
        let nested = builder.nested_type_ref(outer, "RenderRequest");
        let own = builder.module_mut().add_type_ref(TypeRef {
            namespace: "Game".to_string(),
            name: "Helper".to_string(),
            scope: ResolutionScope::Module,
        });

        let owner = builder.class("Game", "Owner").build_token();
        builder.field(owner, "request", TypeSignature::Class(nested)).unwrap();
        builder.field(owner, "helper", TypeSignature::Class(own)).unwrap();

        let mut ctx = context(builder.build());
        let seen = walk(&mut ctx);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, Reference::Type(outer));
    }

    #[test]
    fn test_body_operands() {
        let mut builder = ModuleBuilder::new("Game", AssemblyVersion::default());
        let object = builder.system_type("Object");
        let console = builder.system_type("Console");
        let write_line = builder.method_ref(
            console.clone(),
            "WriteLine",
            MethodSignature::new_static(TypeSignature::Void, vec![object.clone()]),
        );
        let player = builder.class("Game", "Player").build_token();
        let health = builder.field(player, "health", TypeSignature::I4).unwrap();
        let local_call = builder.method_ref(
            TypeSignature::Class(player),
            "Reset",
            MethodSignature::new_instance(TypeSignature::Void, vec![]),
        );

        let mut body = MethodBody::from_instructions(vec![
            Instruction::simple(OpCode::Ldarg0).unwrap(),
            Instruction::new(OpCode::Ldfld, Operand::Token(health)).unwrap(),
            Instruction::new(OpCode::Box, Operand::Token(Token::from_parts(TableId::TypeRef, 1))).unwrap(),
            Instruction::new(OpCode::Call, Operand::Token(write_line)).unwrap(),
            Instruction::simple(OpCode::Ldarg0).unwrap(),
            Instruction::new(OpCode::Call, Operand::Token(local_call)).unwrap(),
            Instruction::simple(OpCode::Ret).unwrap(),
        ]);
        body.locals.push(console.clone());
        let mut method = MethodDef::new(
            "Print",
            player,
            MethodSignature::new_instance(TypeSignature::Void, vec![]),
        );
        method.body = Some(body);
        builder.method(player, method).unwrap();

        let mut ctx = context(builder.build());
        let seen = walk(&mut ctx);
        let references: Vec<Reference> = seen.iter().map(|(r, _)| *r).collect();

        let object_token = object.type_token().unwrap();
        let console_token = console.type_token().unwrap();
        assert_eq!(
            references,
            vec![
                Reference::Type(console_token),
                Reference::Type(object_token),
                Reference::Type(console_token),
                Reference::Type(object_token),
                Reference::Method(write_line),
            ]
        );
        assert!(seen
            .iter()
            .all(|(_, entity)| entity == "System.Void Game.Player::Print()"));
    }

    #[test]
    fn test_generic_method_spec() {
        let mut builder = ModuleBuilder::new("Game", AssemblyVersion::default());
        let engine = builder.assembly_ref("UnityEngine", AssemblyVersion::default());
        let component = builder.type_ref(engine, "UnityEngine", "Component");
        let rigidbody = builder.type_ref(engine, "UnityEngine", "Rigidbody");
        let mut signature = MethodSignature::new_instance(TypeSignature::GenericParamMethod(0), vec![]);
        signature.generic_param_count = 1;
        let get_component = builder.method_ref(TypeSignature::Class(component), "GetComponent", signature);
        let spec = builder.method_spec(get_component, vec![TypeSignature::Class(rigidbody)]);

        let owner = builder.class("Game", "Player").build_token();
        let mut method = MethodDef::new(
            "Awake",
            owner,
            MethodSignature::new_instance(TypeSignature::Void, vec![]),
        );
        method.body = Some(MethodBody::from_instructions(vec![
            Instruction::simple(OpCode::Ldarg0).unwrap(),
            Instruction::new(OpCode::Callvirt, Operand::Token(spec)).unwrap(),
            Instruction::simple(OpCode::Pop).unwrap(),
            Instruction::simple(OpCode::Ret).unwrap(),
        ]));
        builder.method(owner, method).unwrap();

        let mut ctx = context(builder.build());
        let references: Vec<Reference> = walk(&mut ctx).into_iter().map(|(r, _)| r).collect();
        assert_eq!(
            references,
            vec![
                Reference::Type(rigidbody),
                Reference::Type(component),
                Reference::Method(spec),
            ]
        );
    }

    #[test]
    fn test_unity_script_calls_skipped() {
        let mut builder = ModuleBuilder::new("Game", AssemblyVersion::default());
        let unity_script = builder.assembly_ref("UnityScript.Lang", AssemblyVersion::default());
        let runtime = builder.type_ref(unity_script, "UnityScript.Lang", "UnityRuntimeServices");
        let object = builder.system_type("Object");
        let console = builder.system_type("Console");
        let invoke = builder.method_ref(
            TypeSignature::Class(runtime),
            "Invoke",
            MethodSignature::new_static(object.clone(), vec![object.clone()]),
        );
        let write_line = builder.method_ref(
            console.clone(),
            "WriteLine",
            MethodSignature::new_static(TypeSignature::Void, vec![object.clone()]),
        );

        let player = builder.class("Game", "Player").build_token();
        let mut run = MethodDef::new(
            "Run",
            player,
            MethodSignature::new_static(TypeSignature::Void, vec![]),
        );
        run.body = Some(MethodBody::from_instructions(vec![
            Instruction::simple(OpCode::Ldnull).unwrap(),
            Instruction::new(OpCode::Call, Operand::Token(invoke)).unwrap(),
            Instruction::simple(OpCode::Pop).unwrap(),
            Instruction::simple(OpCode::Ret).unwrap(),
        ]));
        builder.method(player, run).unwrap();

        let extensions = builder.class("UnityScript.Lang", "Extensions").build_token();
        let mut print = MethodDef::new(
            "Print",
            extensions,
            MethodSignature::new_static(TypeSignature::Void, vec![]),
        );
        print.body = Some(MethodBody::from_instructions(vec![
            Instruction::simple(OpCode::Ldnull).unwrap(),
            Instruction::new(OpCode::Call, Operand::Token(write_line)).unwrap(),
            Instruction::simple(OpCode::Ret).unwrap(),
        ]));
        builder.method(extensions, print).unwrap();

        let mut ctx = context(builder.build());
        let seen = walk(&mut ctx);
        assert!(seen.iter().all(|(_, entity)| !entity.contains("Game.Player")));
        let references: Vec<Reference> = seen.iter().map(|(r, _)| *r).collect();
        assert_eq!(
            references,
            vec![
                Reference::Type(console.type_token().unwrap()),
                Reference::Type(object.type_token().unwrap()),
                Reference::Method(write_line),
            ]
        );
        assert_eq!(seen[2].1, "System.Void UnityScript.Lang.Extensions::Print()");
    }

    #[derive(Default)]
    struct Packer {
        unpackable: Vec<(Reference, String)>,
    }

    impl ReferenceVisitor for Packer {
        fn visit(
            &mut self,
            _ctx: &mut RewriteContext,
            reference: Reference,
            _entity: &str,
        ) -> Result<VisitOutcome> {
            Ok(match reference {
                Reference::Method(_) => VisitOutcome::PackParams(ParamsCall {
                    module: ModuleKey::Target,
                    method: Token::from_parts(TableId::MethodDef, 1),
                }),
                _ => VisitOutcome::Done,
            })
        }

        fn unpackable(
            &mut self,
            _ctx: &mut RewriteContext,
            reference: Reference,
            entity: &str,
        ) -> Result<()> {
            self.unpackable.push((reference, entity.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_packing_outside_call_handed_back() {
        let mut builder = ModuleBuilder::new("Game", AssemblyVersion::default());
        let string = builder.system_type("String");
        let format = builder.method_ref(
            string.clone(),
            "Format",
            MethodSignature::new_static(string.clone(), vec![string.clone(), string]),
        );
        let player = builder.class("Game", "Player").build_token();
        let mut method = MethodDef::new(
            "Bind",
            player,
            MethodSignature::new_static(TypeSignature::Void, vec![]),
        );
        method.body = Some(MethodBody::from_instructions(vec![
            Instruction::new(OpCode::Ldftn, Operand::Token(format)).unwrap(),
            Instruction::simple(OpCode::Pop).unwrap(),
            Instruction::simple(OpCode::Ret).unwrap(),
        ]));
        let bind = builder.method(player, method).unwrap();

        let mut ctx = context(builder.build());
        let mut packer = Packer::default();
        let packed = ReferenceWalker::new(&mut packer).walk(&mut ctx).unwrap();

        assert_eq!(packed, 0);
        assert_eq!(
            packer.unpackable,
            vec![(
                Reference::Method(format),
                "System.Void Game.Player::Bind()".to_string()
            )]
        );
        let body = ctx.target.method(bind).unwrap().body.as_ref().unwrap();
        assert_eq!(body.len(), 3);
        assert_eq!(body.at(0).unwrap().operand.token(), Some(format));
    }
}
