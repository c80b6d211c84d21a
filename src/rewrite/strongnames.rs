//! Final strong name cleanup of assembly references.
//!
//! References added while redirecting types (the support module, alternates) are created
//! after the manifest step ran, so their public key tokens are cleared here.

use log::debug;

use crate::{
    rewrite::{context::RewriteContext, operation::RewriteStep},
    Result,
};

/// Pipeline step clearing the public key token of references that are neither kept nor part
/// of the target framework
pub struct StrongNameReferences;

impl RewriteStep for StrongNameReferences {
    fn name(&self) -> &'static str {
        "strong names"
    }

    fn run(&mut self, ctx: &mut RewriteContext) -> Result<bool> {
        let mut changed = false;
        for index in 0..ctx.target.assembly_refs.len() {
            let reference = &ctx.target.assembly_refs[index];
            if reference.public_key_token.is_empty() || ctx.keeps_strong_name(&reference.name) {
                continue;
            }
            let Some(id) = ctx.modules.find(&reference.name) else {
                continue;
            };
            if ctx.is_framework_module(id) {
                continue;
            }

            debug!("Removed public key token of reference {}", reference.name);
            ctx.target.assembly_refs[index].public_key_token.clear();
            changed = true;
        }
        Ok(changed)
    }
}
