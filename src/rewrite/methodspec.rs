//! Generic instantiations of the target's own methods.
//!
//! A method spec whose method is a member reference that resolves back into the target (for
//! instance through a reference to the target's own assembly) is re-pointed at the method
//! definition.

use log::debug;

use crate::{
    metadata::token::{TableId, Token},
    resolver::{ModuleKey, Resolver},
    rewrite::{context::RewriteContext, operation::RewriteStep},
    Result,
};

/// Pipeline step re-pointing method specs at method definitions of the target
pub struct MethodSpecReferences;

impl RewriteStep for MethodSpecReferences {
    fn name(&self) -> &'static str {
        "method specs"
    }

    fn description(&self) -> &'static str {
        "Replaces member references of the target's own generic methods by their definitions"
    }

    fn run(&mut self, ctx: &mut RewriteContext) -> Result<bool> {
        let local: Vec<(Token, Token)> = {
            let resolver = Resolver::new(&ctx.target, &ctx.modules);
            let mut local = Vec::new();
            for (index, spec) in ctx.target.method_specs.iter().enumerate() {
                if !spec.method.is_table(TableId::MemberRef) {
                    continue;
                }
                if let Some(handle) = resolver.resolve_method(ModuleKey::Target, spec.method)? {
                    if handle.module == ModuleKey::Target {
                        local.push((Token::from_index(TableId::MethodSpec, index), handle.token));
                    }
                }
            }
            local
        };

        for (spec, definition) in &local {
            debug!(
                "Method spec {} now instantiates {}",
                spec,
                ctx.target.member_full_name(*definition)
            );
            ctx.target.method_spec_mut(*spec)?.method = *definition;
        }
        Ok(!local.is_empty())
    }
}
