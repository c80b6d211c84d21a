//! Resolving the references of the target against the target framework.
//!
//! [`ReferenceRewriter`] is the [`ReferenceVisitor`] behind the type reference step:
//!
//! - a type reference that does not resolve where it points is moved to the support module
//!   (with its namespace mapped) or to one of the alternate modules registered for its
//!   namespace
//! - field references are only checked
//! - a method reference that does not resolve is matched by hand along the declaring type's
//!   base chain, first exactly (modulo type and method aliases), then against overloads whose
//!   last parameter is an array that can take the trailing arguments
//!
//! Whatever cannot be found is reported as a [`Diagnostic`] and left as it is.

use log::{debug, info};

use crate::{
    metadata::{
        method::{MemberRef, MethodDef},
        module::Module,
        signatures::{MethodSignature, TypeSignature},
        token::{TableId, Token},
        typesystem::ResolutionScope,
    },
    resolver::{ModuleId, ModuleKey, Resolver, TypeHandle},
    rewrite::{
        context::RewriteContext,
        diagnostics::{Diagnostic, ReferenceKind},
        equivalence::{methods_equivalent, types_equivalent},
        operation::RewriteStep,
        patcher::ParamsCall,
        walker::{Reference, ReferenceVisitor, ReferenceWalker, VisitOutcome},
    },
    Error, Result,
};

/// Root of every type hierarchy; generic parameters may always be passed as one
const OBJECT: &str = "System.Object";

/// Maps a namespace of the target to the matching namespace of the support module
pub type NamespaceMapper = dyn Fn(&str) -> String;

/// Outcome of matching a method reference by hand
enum MethodMatch {
    Exact,
    Params(ParamsCall),
}

/// Visitor resolving and redirecting the references of the target
pub struct ReferenceRewriter<'m> {
    mapper: &'m NamespaceMapper,
    changed: bool,
}

impl<'m> ReferenceRewriter<'m> {
    /// Creates a rewriter mapping namespaces into the support module through `mapper`
    pub fn new(mapper: &'m NamespaceMapper) -> Self {
        ReferenceRewriter {
            mapper,
            changed: false,
        }
    }

    /// Returns true once a type reference was redirected
    #[must_use]
    pub fn changed(&self) -> bool {
        self.changed
    }

    fn visit_type(&mut self, ctx: &mut RewriteContext, token: Token, entity: &str) -> Result<()> {
        let (namespace, name) = {
            let type_ref = ctx.target.type_ref(token)?;
            (type_ref.namespace.clone(), type_ref.name.clone())
        };
        let full_name = ctx.target.type_name(token);

        if let Some(assembly) = ctx.target.type_ref_assembly(token)? {
            if ctx.is_ignored(&assembly.name, &full_name) {
                return Ok(());
            }
        }

        if Resolver::new(&ctx.target, &ctx.modules)
            .resolve_type(ModuleKey::Target, token)?
            .is_some()
        {
            return Ok(());
        }

        let mapped = (self.mapper)(&namespace);
        let support = ctx.support;
        if self.rebind(ctx, token, support, &mapped, &name)? {
            return Ok(());
        }

        let alternates = ctx.alt_modules.get(&namespace).cloned().unwrap_or_default();
        for alternate in alternates {
            if self.rebind(ctx, token, alternate, &namespace, &name)? {
                return Ok(());
            }
        }

        report(ctx, ReferenceKind::Type, full_name, entity);
        Ok(())
    }

    /// Points `token` at `namespace.name` of the module `id` if that module defines it
    fn rebind(
        &mut self,
        ctx: &mut RewriteContext,
        token: Token,
        id: ModuleId,
        namespace: &str,
        name: &str,
    ) -> Result<bool> {
        let found = Resolver::new(&ctx.target, &ctx.modules).find_in_module(
            ModuleKey::Loaded(id),
            namespace,
            name,
            0,
        )?;
        if found.is_none() {
            return Ok(false);
        }

        let identity = ctx
            .modules
            .get(id)
            .ok_or_else(|| Error::AssemblyNotFound(format!("module #{}", id.index())))?
            .assembly
            .clone();
        let before = ctx.target.type_name(token);
        let (assembly, added) = ctx.target.find_or_add_assembly_ref(&identity);
        if added {
            debug!("Added reference to {}", identity.full_name());
        }

        let type_ref = ctx.target.type_ref_mut(token)?;
        type_ref.scope = ResolutionScope::AssemblyRef(assembly);
        type_ref.namespace = namespace.to_string();
        self.changed = true;

        debug!(
            "Redirected {} to {} in {}",
            before,
            ctx.target.type_name(token),
            identity.name
        );
        Ok(true)
    }

    fn visit_field(ctx: &mut RewriteContext, token: Token, entity: &str) -> Result<()> {
        let resolved = Resolver::new(&ctx.target, &ctx.modules).resolve_field(ModuleKey::Target, token)?;
        if resolved.is_none() {
            let name = ctx.target.member_full_name(token);
            report(ctx, ReferenceKind::Field, name, entity);
        }
        Ok(())
    }

    fn visit_method(ctx: &mut RewriteContext, token: Token, entity: &str) -> Result<VisitOutcome> {
        let found = {
            let resolver = Resolver::new(&ctx.target, &ctx.modules);
            if resolver.resolve_method(ModuleKey::Target, token)?.is_some() {
                return Ok(VisitOutcome::Done);
            }

            let member_token = if token.is_table(TableId::MethodSpec) {
                ctx.target.method_spec(token)?.method
            } else {
                token
            };
            let member = ctx.target.member_ref(member_token)?;
            if member.declaring.is_array() {
                return Ok(VisitOutcome::Done);
            }
            match member.method_signature() {
                Some(signature) => match_by_hand(&resolver, member, signature)?,
                None => None,
            }
        };

        match found {
            Some(MethodMatch::Exact) => Ok(VisitOutcome::Done),
            Some(MethodMatch::Params(call)) => Ok(VisitOutcome::PackParams(call)),
            None => {
                let name = ctx.target.member_full_name(token);
                report(ctx, ReferenceKind::Method, name, entity);
                Ok(VisitOutcome::Done)
            }
        }
    }
}

impl ReferenceVisitor for ReferenceRewriter<'_> {
    fn visit(
        &mut self,
        ctx: &mut RewriteContext,
        reference: Reference,
        entity: &str,
    ) -> Result<VisitOutcome> {
        match reference {
            Reference::Type(token) => {
                self.visit_type(ctx, token, entity)?;
                Ok(VisitOutcome::Done)
            }
            Reference::Field(token) => {
                Self::visit_field(ctx, token, entity)?;
                Ok(VisitOutcome::Done)
            }
            Reference::Method(token) => Self::visit_method(ctx, token, entity),
        }
    }

    fn unpackable(
        &mut self,
        ctx: &mut RewriteContext,
        reference: Reference,
        entity: &str,
    ) -> Result<()> {
        if let Reference::Method(token) = reference {
            let name = ctx.target.member_full_name(token);
            report(ctx, ReferenceKind::Method, name, entity);
        }
        Ok(())
    }
}

fn report(ctx: &mut RewriteContext, kind: ReferenceKind, reference: String, entity: &str) {
    debug!("Unresolved {kind} {reference} in {entity}");
    let module = ctx.target.name.clone();
    ctx.diagnostics.push(Diagnostic {
        kind,
        reference,
        module,
        entity: entity.to_string(),
    });
}

/// Searches the declaring type of `member` and its bases, exact matches first
fn match_by_hand(
    resolver: &Resolver<'_>,
    member: &MemberRef,
    signature: &MethodSignature,
) -> Result<Option<MethodMatch>> {
    let Some(declaring) = resolver.resolve_signature(ModuleKey::Target, &member.declaring)? else {
        return Ok(None);
    };
    let chain = resolver.type_chain(declaring)?;
    let site = resolver.module(ModuleKey::Target)?;

    for handle in &chain {
        let exact = first_match(resolver, *handle, |owner, candidate| {
            exact_match(site, member, signature, owner, candidate)
        })?;
        if exact.is_some() {
            return Ok(Some(MethodMatch::Exact));
        }
    }

    for handle in &chain {
        if let Some(method) = first_match(resolver, *handle, |owner, candidate| {
            params_match(resolver, site, member, signature, owner, candidate)
        })? {
            debug!(
                "{}::{} matches params overload {}",
                site.signature_name(&member.declaring),
                member.name,
                resolver.module(handle.module)?.member_full_name(method)
            );
            return Ok(Some(MethodMatch::Params(ParamsCall {
                module: handle.module,
                method,
            })));
        }
    }
    Ok(None)
}

/// First method of `handle`, in declaration order, accepted by `accept`
fn first_match(
    resolver: &Resolver<'_>,
    handle: TypeHandle,
    mut accept: impl FnMut(&Module, &MethodDef) -> Result<bool>,
) -> Result<Option<Token>> {
    let owner = resolver.module(handle.module)?;
    for token in &owner.type_def(handle.token)?.methods {
        if accept(owner, owner.method(*token)?)? {
            return Ok(Some(*token));
        }
    }
    Ok(None)
}

/// Name or alias, generic arity and return type
fn head_match(
    site: &Module,
    member: &MemberRef,
    signature: &MethodSignature,
    owner: &Module,
    candidate: &MethodDef,
) -> Result<bool> {
    Ok(methods_equivalent(&candidate.name, &member.name)
        && candidate.signature.generic_param_count == signature.generic_param_count
        && types_equivalent(
            &owner.signature_name(&candidate.signature.return_type),
            &site.signature_name(&signature.return_type),
        ))
}

fn exact_match(
    site: &Module,
    member: &MemberRef,
    signature: &MethodSignature,
    owner: &Module,
    candidate: &MethodDef,
) -> Result<bool> {
    if candidate.signature.params.len() != signature.params.len()
        || !head_match(site, member, signature, owner, candidate)?
    {
        return Ok(false);
    }
    params_equivalent(site, &signature.params, owner, &candidate.signature.params)
}

fn params_equivalent(
    site: &Module,
    arguments: &[TypeSignature],
    owner: &Module,
    params: &[TypeSignature],
) -> Result<bool> {
    for (argument, param) in arguments.iter().zip(params) {
        if !types_equivalent(&site.signature_name(argument), &owner.signature_name(param)) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Returns true if `candidate` ends in an array parameter that can take the trailing
/// arguments of the reference
fn params_match(
    resolver: &Resolver<'_>,
    site: &Module,
    member: &MemberRef,
    signature: &MethodSignature,
    owner: &Module,
    candidate: &MethodDef,
) -> Result<bool> {
    let params = &candidate.signature.params;
    let Some((TypeSignature::SzArray(element), leading)) = params.split_last() else {
        return Ok(false);
    };
    if signature.params.len() < leading.len()
        || !head_match(site, member, signature, owner, candidate)?
        || !params_equivalent(site, &signature.params[..leading.len()], owner, leading)?
    {
        return Ok(false);
    }

    let element_name = owner.signature_name(element);
    for argument in &signature.params[leading.len()..] {
        let mut ancestors = resolver.ancestor_names(ModuleKey::Target, argument)?;
        if argument.is_generic_param() {
            ancestors.push(OBJECT.to_string());
        }

        if !ancestors
            .iter()
            .any(|ancestor| types_equivalent(ancestor, &element_name))
        {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Pipeline step resolving every reference of the target and redirecting what is missing
pub struct TypeReferences {
    mapper: Box<NamespaceMapper>,
}

impl TypeReferences {
    /// Creates the step with the namespace mapping into the support module
    pub fn new(mapper: impl Fn(&str) -> String + 'static) -> Self {
        TypeReferences {
            mapper: Box::new(mapper),
        }
    }
}

impl RewriteStep for TypeReferences {
    fn name(&self) -> &'static str {
        "type references"
    }

    fn description(&self) -> &'static str {
        "Redirects unresolved type references and packs params call sites"
    }

    fn run(&mut self, ctx: &mut RewriteContext) -> Result<bool> {
        let reported = ctx.diagnostics.len();
        let mut rewriter = ReferenceRewriter::new(self.mapper.as_ref());
        let packed = ReferenceWalker::new(&mut rewriter).walk(ctx)?;

        info!(
            "Resolved references of {}: {} unresolved, {} call sites packed",
            ctx.target.name,
            ctx.diagnostics.len() - reported,
            packed
        );
        Ok(rewriter.changed() || packed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Instruction, MethodBody, OpCode, Operand},
        metadata::{builder::ModuleBuilder, identity::AssemblyVersion},
        resolver::ModuleSet,
    };
    use std::collections::HashSet;

    fn support_mapper(namespace: &str) -> String {
        match namespace.strip_prefix("System") {
            Some(rest) if rest.is_empty() || rest.starts_with('.') => format!("Sup{rest}"),
            _ => namespace.to_string(),
        }
    }

    fn corlib() -> Module {
        let mut builder = ModuleBuilder::new("mscorlib", AssemblyVersion::new(4, 0, 0, 0));
        let object = builder.class("System", "Object").build_token();
        builder
            .class("System", "String")
            .base(TypeSignature::Class(object))
            .build_token();
        builder.build()
    }

    fn support() -> Module {
        let mut builder = ModuleBuilder::new("Support", AssemblyVersion::new(1, 0, 0, 0));
        let object = builder.system_type("Object");
        let text = builder.class("Sup", "Text").build_token();
        builder
            .method_named(
                text,
                "Format",
                MethodSignature::new_static(
                    TypeSignature::String,
                    vec![TypeSignature::String, TypeSignature::SzArray(Box::new(object.clone()))],
                ),
            )
            .unwrap();
        builder
            .method_named(
                text,
                "Format",
                MethodSignature::new_static(
                    TypeSignature::String,
                    vec![TypeSignature::String, object],
                ),
            )
            .unwrap();
        builder.class("Sup.IO", "Path").build_token();
        builder.build()
    }

    fn context(target: Module) -> RewriteContext {
        let mut modules = ModuleSet::new();
        modules.register(corlib()).unwrap();
        let support = modules.register(support()).unwrap();
        RewriteContext::new(target, modules, support)
    }

    fn visit(ctx: &mut RewriteContext, reference: Reference) -> VisitOutcome {
        let mapper = support_mapper;
        let mut rewriter = ReferenceRewriter::new(&mapper);
        let outcome = rewriter.visit(ctx, reference, "Game.Player").unwrap();
        assert_eq!(rewriter.changed(), matches!(reference, Reference::Type(_)) && ctx.diagnostics.is_empty());
        outcome
    }

    #[test]
    fn test_type_redirected_to_support() {
        let mut builder = ModuleBuilder::new("Game", AssemblyVersion::default());
        let net = builder.assembly_ref("System.Runtime", AssemblyVersion::default());
        let path = builder.type_ref(net, "System.IO", "Path");
        let mut ctx = context(builder.build());

        assert_eq!(visit(&mut ctx, Reference::Type(path)), VisitOutcome::Done);
        assert_eq!(ctx.target.type_name(path), "Sup.IO.Path");
        assert_eq!(
            ctx.target.type_ref_assembly(path).unwrap().unwrap().name,
            "Support"
        );
        assert_eq!(ctx.target.assembly_refs.len(), 2);
        assert!(ctx.diagnostics.is_empty());
    }

    #[test]
    fn test_unresolved_type_reported() {
        let mut builder = ModuleBuilder::new("Game", AssemblyVersion::default());
        let net = builder.assembly_ref("System.Runtime", AssemblyVersion::default());
        let list = builder.type_ref(net, "System.Collections", "ArrayList");
        let mut ctx = context(builder.build());

        visit(&mut ctx, Reference::Type(list));
        assert_eq!(ctx.target.type_name(list), "System.Collections.ArrayList");
        let lines: Vec<String> = ctx.diagnostics.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec!["Error: type `System.Collections.ArrayList` doesn't exist in target framework. \
                  It is referenced from Game.dll at Game.Player."]
        );
    }

    #[test]
    fn test_ignored_type_left_alone() {
        let mut builder = ModuleBuilder::new("Game", AssemblyVersion::default());
        let net = builder.assembly_ref("System.Runtime", AssemblyVersion::default());
        let list = builder.type_ref(net, "System.Collections", "ArrayList");
        let mut ctx = context(builder.build());
        ctx.ignore.insert(
            "System.Runtime".to_string(),
            HashSet::from(["System.Collections.ArrayList".to_string()]),
        );

        let mapper = support_mapper;
        let mut rewriter = ReferenceRewriter::new(&mapper);
        rewriter.visit(&mut ctx, Reference::Type(list), "Game.Player").unwrap();
        assert!(!rewriter.changed());
        assert!(ctx.diagnostics.is_empty());
    }

    #[test]
    fn test_alternate_module() {
        let mut builder = ModuleBuilder::new("Game", AssemblyVersion::default());
        let net = builder.assembly_ref("System.Runtime", AssemblyVersion::default());
        let socket = builder.type_ref(net, "Net", "Socket");
        let mut ctx = context(builder.build());

        let mut sockets = ModuleBuilder::new("Sockets", AssemblyVersion::default());
        sockets.class("Net", "Socket").build_token();
        let id = ctx.modules.register(sockets.build()).unwrap();
        ctx.alt_modules.insert("Net".to_string(), vec![id]);

        let mapper = support_mapper;
        let mut rewriter = ReferenceRewriter::new(&mapper);
        rewriter.visit(&mut ctx, Reference::Type(socket), "Game.Player").unwrap();
        assert!(rewriter.changed());
        assert_eq!(
            ctx.target.type_ref_assembly(socket).unwrap().unwrap().name,
            "Sockets"
        );
    }

    fn format_call(arguments: Vec<TypeSignature>) -> (RewriteContext, Token) {
        let mut builder = ModuleBuilder::new("Game", AssemblyVersion::default());
        let support = builder.assembly_ref("Support", AssemblyVersion::new(1, 0, 0, 0));
        let text = builder.type_ref(support, "Sup", "Text");
        let call = builder.method_ref(
            TypeSignature::Class(text),
            "Format",
            MethodSignature::new_static(TypeSignature::String, arguments),
        );
        (context(builder.build()), call)
    }

    #[test]
    fn test_exact_match_wins_over_params() {
        let (mut ctx, call) = format_call(vec![TypeSignature::String, TypeSignature::Object]);
        assert_eq!(visit(&mut ctx, Reference::Method(call)), VisitOutcome::Done);
        assert!(ctx.diagnostics.is_empty());
    }

    #[test]
    fn test_params_overload_selected() {
        let (mut ctx, call) = format_call(vec![
            TypeSignature::String,
            TypeSignature::String,
            TypeSignature::Object,
        ]);
        let VisitOutcome::PackParams(params) = visit(&mut ctx, Reference::Method(call)) else {
            panic!("expected a params match");
        };
        let support = ctx.support_module().unwrap();
        assert_eq!(params.module, ModuleKey::Loaded(ctx.support));
        assert_eq!(
            support.member_full_name(params.method),
            "System.String Sup.Text::Format(System.String,System.Object[])"
        );
        assert!(ctx.diagnostics.is_empty());
    }

    #[test]
    fn test_incompatible_arguments_reported() {
        let (mut ctx, call) = format_call(vec![TypeSignature::I4, TypeSignature::String]);
        assert_eq!(visit(&mut ctx, Reference::Method(call)), VisitOutcome::Done);
        assert_eq!(ctx.diagnostics.count(ReferenceKind::Method), 1);
    }

    #[test]
    fn test_step_packs_call_site() {
        let (mut ctx, call) = format_call(vec![
            TypeSignature::String,
            TypeSignature::String,
            TypeSignature::String,
        ]);
        let owner = ctx
            .target
            .add_type_def(crate::metadata::typesystem::TypeDef::new("Game", "Player"));
        let mut method = MethodDef::new(
            "Describe",
            owner,
            MethodSignature::new_static(TypeSignature::String, vec![]),
        );
        method.body = Some(MethodBody::from_instructions(vec![
            Instruction::new(OpCode::Ldstr, Operand::String("{0}{1}".to_string())).unwrap(),
            Instruction::new(OpCode::Ldstr, Operand::String("a".to_string())).unwrap(),
            Instruction::new(OpCode::Ldstr, Operand::String("b".to_string())).unwrap(),
            Instruction::new(OpCode::Call, Operand::Token(call)).unwrap(),
            Instruction::simple(OpCode::Ret).unwrap(),
        ]));
        let describe = ctx.target.add_method(method).unwrap();

        let mut step = TypeReferences::new(support_mapper);
        assert!(step.run(&mut ctx).unwrap());
        assert!(ctx.diagnostics.is_empty());

        let body = ctx.target.method(describe).unwrap().body.as_ref().unwrap();
        let call = body
            .iter()
            .find(|instruction| instruction.opcode == OpCode::Call)
            .and_then(|instruction| instruction.operand.token())
            .unwrap();
        assert_eq!(
            ctx.target.member_full_name(call),
            "System.String Sup.Text::Format(System.String,System.Object[])"
        );
        assert_eq!(body.len(), 5 + 14);
    }

    #[test]
    fn test_function_pointer_to_params_overload_reported() {
        let (mut ctx, format) = format_call(vec![
            TypeSignature::String,
            TypeSignature::String,
            TypeSignature::String,
        ]);
        let owner = ctx
            .target
            .add_type_def(crate::metadata::typesystem::TypeDef::new("Game", "Player"));
        let mut method = MethodDef::new(
            "Bind",
            owner,
            MethodSignature::new_static(TypeSignature::Void, vec![]),
        );
        method.body = Some(MethodBody::from_instructions(vec![
            Instruction::new(OpCode::Ldftn, Operand::Token(format)).unwrap(),
            Instruction::simple(OpCode::Pop).unwrap(),
            Instruction::simple(OpCode::Ret).unwrap(),
        ]));
        let bind = ctx.target.add_method(method).unwrap();

        let mut step = TypeReferences::new(support_mapper);
        assert!(!step.run(&mut ctx).unwrap());
        assert_eq!(ctx.diagnostics.count(ReferenceKind::Method), 1);
        let lines: Vec<String> = ctx.diagnostics.iter().map(ToString::to_string).collect();
        assert!(lines[0].contains("Sup.Text::Format(System.String,System.String,System.String)"));
        assert!(lines[0].ends_with("at System.Void Game.Player::Bind()."));

        let body = ctx.target.method(bind).unwrap().body.as_ref().unwrap();
        assert_eq!(body.len(), 3);
        assert_eq!(body.at(0).unwrap().operand.token(), Some(format));
    }
}
