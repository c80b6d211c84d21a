//! Restoring generic constraints on compiler-generated iterator classes.
//!
//! Some compilers drop the constraints of a generic method when they generate the state
//! machine class of an iterator that overrides a constrained base method:
//!
//! ```text
//! class Base  { public abstract IEnumerator GetResource<T>(Ready<T> ready) where T : Asset; }
//! class Child { public override IEnumerator GetResource<T>(Ready<T> ready) { yield ... } }
//!
//! .class nested private '<GetResource>c__Iterator0`1'<T>            // should be <(Asset) T>
//! ```
//!
//! Runtimes that verify constraints reject such a type as soon as it is instantiated. The
//! [`GenericConstraints`] step finds the overriding iterator methods, locates their state
//! machine class and copies the constraints of the method's generic parameters onto it.

use log::{debug, info};

use crate::{
    metadata::{
        method::MethodDef,
        module::Module,
        signatures::TypeSignature,
        token::Token,
        typesystem::{GenericParam, GenericParamAttributes},
    },
    resolver::{MemberHandle, ModuleKey, Resolver, TypeHandle},
    rewrite::{context::RewriteContext, operation::RewriteStep},
    Error, Result,
};

/// Maximum number of base types searched for the overridden method
const MAX_BASE_DEPTH: usize = 64;

const ENUMERATOR: &str = "System.Collections.IEnumerator";
const GENERIC_ENUMERATOR: &str = "System.Collections.Generic.IEnumerator`1";

fn returns_enumerator(module: &Module, method: &MethodDef) -> bool {
    let name = module.signature_name(&method.signature.return_type);
    name == ENUMERATOR || name.starts_with(GENERIC_ENUMERATOR)
}

fn is_candidate(module: &Module, method: &MethodDef) -> bool {
    method.body.is_some()
        && !method.generic_params.is_empty()
        && method.is_virtual()
        && !method.is_abstract()
        && returns_enumerator(module, method)
        && method.generic_params.iter().any(GenericParam::has_constraints)
}

/// Full name of `signature` with the type generic parameters replaced by `type_args`
fn substituted_name(module: &Module, signature: &TypeSignature, type_args: &[String]) -> String {
    match signature {
        TypeSignature::GenericParamType(number) => type_args
            .get(*number as usize)
            .cloned()
            .unwrap_or_else(|| format!("!{number}")),
        TypeSignature::GenericInst(base, args) => {
            let args: Vec<String> = args
                .iter()
                .map(|arg| substituted_name(module, arg, type_args))
                .collect();
            format!("{}<{}>", substituted_name(module, base, type_args), args.join(","))
        }
        TypeSignature::SzArray(inner) => format!("{}[]", substituted_name(module, inner, type_args)),
        TypeSignature::Array { element, rank } => format!(
            "{}[{}]",
            substituted_name(module, element, type_args),
            ",".repeat((*rank as usize).saturating_sub(1))
        ),
        TypeSignature::ByRef(inner) => format!("{}&", substituted_name(module, inner, type_args)),
        TypeSignature::Ptr(inner) => format!("{}*", substituted_name(module, inner, type_args)),
        other => module.signature_name(other),
    }
}

/// The nearest virtual method of a base type that `method` overrides
fn overridden_method(resolver: &Resolver<'_>, method: &MethodDef) -> Result<Option<MemberHandle>> {
    let target = resolver.module(ModuleKey::Target)?;
    let wanted_return = target.signature_name(&method.signature.return_type);
    let wanted_params: Vec<String> = method
        .signature
        .params
        .iter()
        .map(|param| target.signature_name(param))
        .collect();

    let mut current = TypeHandle {
        module: ModuleKey::Target,
        token: method.declaring,
    };
    let mut args: Vec<String> = Vec::new();

    for _ in 0..MAX_BASE_DEPTH {
        let module = resolver.module(current.module)?;
        let Some(base_signature) = &module.type_def(current.token)?.base else {
            return Ok(None);
        };
        let Some(base) = resolver.resolve_signature(current.module, base_signature)? else {
            return Ok(None);
        };
        let base_args: Vec<String> = base_signature
            .generic_args()
            .iter()
            .map(|arg| substituted_name(module, arg, &args))
            .collect();

        let owner = resolver.module(base.module)?;
        for token in &owner.type_def(base.token)?.methods {
            let candidate = owner.method(*token)?;
            if candidate.name == method.name
                && candidate.is_virtual()
                && candidate.generic_params.len() == method.generic_params.len()
                && candidate.signature.params.len() == wanted_params.len()
                && substituted_name(owner, &candidate.signature.return_type, &base_args)
                    == wanted_return
                && candidate
                    .signature
                    .params
                    .iter()
                    .zip(&wanted_params)
                    .all(|(param, wanted)| substituted_name(owner, param, &base_args) == *wanted)
            {
                return Ok(Some(MemberHandle {
                    module: base.module,
                    token: *token,
                }));
            }
        }

        current = base;
        args = base_args;
    }
    Err(Error::RecursionLimit(MAX_BASE_DEPTH))
}

/// The nested state machine class of the iterator `method`
fn iterator_class(module: &Module, method: &MethodDef) -> Result<Option<Token>> {
    let Some(body) = &method.body else {
        return Ok(None);
    };

    for nested in &module.type_def(method.declaring)?.nested_types {
        let def = module.type_def(*nested)?;
        if !def.name.contains(method.name.as_str())
            || def.generic_params.len() != method.generic_params.len()
        {
            continue;
        }

        let mut used = false;
        for local in &body.locals {
            local.for_each_token(&mut |token| used |= token == *nested);
        }
        if used {
            return Ok(Some(*nested));
        }
    }
    Ok(None)
}

/// Copies the constraints of `sources` onto `params`; returns true if anything was added
fn merge_constraints(params: &mut [GenericParam], sources: &[GenericParam]) -> bool {
    // Method parameters of the constraints become type parameters of the class.
    let as_type_params: Vec<TypeSignature> = (0..sources.len())
        .map(|number| TypeSignature::GenericParamType(u32::try_from(number).unwrap_or(u32::MAX)))
        .collect();

    let mut changed = false;
    for (param, source) in params.iter_mut().zip(sources) {
        let special = source.flags & GenericParamAttributes::SPECIAL_CONSTRAINT_MASK;
        if !param.flags.contains(special) {
            param.flags |= special;
            changed = true;
        }

        for constraint in &source.constraints {
            let constraint = constraint.substitute(&[], &as_type_params);
            if !param.constraints.contains(&constraint) {
                param.constraints.push(constraint);
                changed = true;
            }
        }
    }
    changed
}

/// Pipeline step adding missing generic constraints to iterator state machine classes
pub struct GenericConstraints;

impl GenericConstraints {
    /// Candidate methods paired with the state machine class to fix
    fn broken_iterators(ctx: &RewriteContext) -> Result<Vec<(Token, Token)>> {
        let resolver = Resolver::new(&ctx.target, &ctx.modules);
        let mut found = Vec::new();

        for token in ctx.target.method_tokens() {
            let method = ctx.target.method(token)?;
            if !is_candidate(&ctx.target, method) {
                continue;
            }
            if overridden_method(&resolver, method)?.is_none() {
                continue;
            }
            if let Some(class) = iterator_class(&ctx.target, method)? {
                found.push((token, class));
            }
        }
        Ok(found)
    }
}

impl RewriteStep for GenericConstraints {
    fn name(&self) -> &'static str {
        "generic constraints"
    }

    fn description(&self) -> &'static str {
        "Copies generic constraints of overriding iterator methods to their state machines"
    }

    fn run(&mut self, ctx: &mut RewriteContext) -> Result<bool> {
        let mut changed = false;
        for (method, class) in Self::broken_iterators(ctx)? {
            let sources = ctx.target.method(method)?.generic_params.clone();
            let params = &mut ctx.target.type_def_mut(class)?.generic_params;
            if merge_constraints(params, &sources) {
                debug!(
                    "Copied generic constraints of {} to {}",
                    ctx.target.member_full_name(method),
                    ctx.target.type_name(class)
                );
                changed = true;
            }
        }

        info!("Checked iterator constraints of {} (changed: {})", ctx.target.name, changed);
        Ok(changed)
    }
}
