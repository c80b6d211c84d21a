//! Assembly manifest cleanup.
//!
//! The rewritten module can no longer carry a valid signature, and its references must name
//! the framework assemblies it will actually run against.

use log::{debug, warn};

use crate::{
    metadata::module::ModuleAttributes,
    rewrite::{context::RewriteContext, operation::RewriteStep},
    Result,
};

/// Pipeline step fixing the strong name of the target and the identities it references
pub struct AssemblyManifest;

impl AssemblyManifest {
    fn strip_own_strong_name(ctx: &mut RewriteContext) -> bool {
        let assembly = &mut ctx.target.assembly;
        let signed = ctx.target.flags.contains(ModuleAttributes::STRONG_NAME_SIGNED);
        if ctx.strong_name_references.iter().any(|name| *name == assembly.name)
            || (!signed && assembly.public_key.is_empty() && assembly.public_key_token.is_empty())
        {
            return false;
        }

        assembly.public_key.clear();
        assembly.public_key_token.clear();
        ctx.target.flags.remove(ModuleAttributes::STRONG_NAME_SIGNED);
        debug!("Removed strong name of {}", ctx.target.assembly.name);
        true
    }

    fn mark_windows_runtime(ctx: &mut RewriteContext) -> bool {
        let mut changed = false;
        for reference in &mut ctx.target.assembly_refs {
            if !reference.windows_runtime
                && ctx.winmd_references.iter().any(|name| *name == reference.name)
            {
                reference.windows_runtime = true;
                debug!("{} is now a windows runtime reference", reference.name);
                changed = true;
            }
        }
        changed
    }

    fn update_references(ctx: &mut RewriteContext) -> bool {
        let mut changed = false;
        for index in 0..ctx.target.assembly_refs.len() {
            let name = ctx.target.assembly_refs[index].name.clone();
            let Some(id) = ctx.modules.find(&name) else {
                warn!("Unable to resolve assembly reference {name}");
                continue;
            };

            let framework = if ctx.is_framework_module(id) {
                ctx.modules
                    .get(id)
                    .map(|module| (module.assembly.version, module.assembly.public_key_token()))
            } else {
                None
            };
            let keep = ctx.keeps_strong_name(&name);
            let reference = &mut ctx.target.assembly_refs[index];

            match framework {
                Some((version, token)) => {
                    if reference.version != version || reference.public_key_token != token {
                        debug!(
                            "Retargeted {} from {} to {}",
                            name, reference.version, version
                        );
                        reference.version = version;
                        reference.public_key_token = token;
                        changed = true;
                    }
                }
                None if !keep && !reference.public_key_token.is_empty() => {
                    debug!("Removed public key token of reference {name}");
                    reference.public_key_token.clear();
                    changed = true;
                }
                None => {}
            }
        }
        changed
    }
}

impl RewriteStep for AssemblyManifest {
    fn name(&self) -> &'static str {
        "assembly manifest"
    }

    fn description(&self) -> &'static str {
        "Removes the target's strong name and retargets its assembly references"
    }

    fn run(&mut self, ctx: &mut RewriteContext) -> Result<bool> {
        let stripped = Self::strip_own_strong_name(ctx);
        let winmd = Self::mark_windows_runtime(ctx);
        let references = Self::update_references(ctx);
        Ok(stripped || winmd || references)
    }
}
