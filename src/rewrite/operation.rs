//! Step traits and the rewrite pipeline.
//!
//! A rewrite is a fixed sequence of [`RewriteStep`]s run against one [`RewriteContext`]:
//!
//! 1. **Assembly manifest**: strong name of the target, windows-runtime references,
//!    framework reference versions
//! 2. **Type references**: resolution, redirection and params call packing
//! 3. **Method specs**: instantiations of the target's own methods
//! 4. **Generic constraints**: constraints missing on iterator state machines
//! 5. **Strong names**: public key tokens of references that are not kept
//!
//! Steps run strictly in order; every step sees the changes of the steps before it.

use log::info;

use crate::{
    rewrite::{
        constraints::GenericConstraints, context::RewriteContext, manifest::AssemblyManifest,
        methodspec::MethodSpecReferences, references::TypeReferences,
        strongnames::StrongNameReferences,
    },
    Result,
};

/// A step of the rewrite pipeline.
///
/// Steps receive exclusive access to the context. The target module is the only module they
/// may change; everything in the module set is read-only.
pub trait RewriteStep {
    /// Unique name for logging
    fn name(&self) -> &'static str;

    /// Get a description of what this step does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Runs the step.
    ///
    /// Returns `true` if the target module was changed, `false` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the step cannot process the module. Unresolved references are
    /// not errors; they are recorded in the context's diagnostics.
    fn run(&mut self, ctx: &mut RewriteContext) -> Result<bool>;
}

/// The ordered list of steps making up a rewrite
pub struct RewriteOperation {
    steps: Vec<Box<dyn RewriteStep>>,
}

impl RewriteOperation {
    /// Builds the standard pipeline; `mapper` maps namespaces of the target into the support
    /// module (see [`support_namespace_mapper`])
    pub fn create(mapper: impl Fn(&str) -> String + 'static) -> Self {
        RewriteOperation {
            steps: vec![
                Box::new(AssemblyManifest),
                Box::new(TypeReferences::new(mapper)),
                Box::new(MethodSpecReferences),
                Box::new(GenericConstraints),
                Box::new(StrongNameReferences),
            ],
        }
    }

    /// Names of the steps, in execution order
    pub fn step_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.steps.iter().map(|step| step.name())
    }

    /// Runs every step and records in [`RewriteContext::rewrite_target`] whether the target
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns the first step error; the remaining steps are not run.
    pub fn execute(&mut self, ctx: &mut RewriteContext) -> Result<()> {
        for step in &mut self.steps {
            info!("Running {}: {}", step.name(), step.description());
            let changed = step.run(ctx)?;
            info!("Finished {} (changed: {})", step.name(), changed);
            ctx.rewrite_target |= changed;
        }
        Ok(())
    }
}

/// Maps `System` and `System.*` namespaces to the same namespaces under `system`; other
/// namespaces are returned unchanged.
///
/// ```rust
/// use refrewrite::rewrite::support_namespace_mapper;
///
/// let mapper = support_namespace_mapper("WinRTLegacy");
/// assert_eq!(mapper("System.Collections"), "WinRTLegacy.Collections");
/// assert_eq!(mapper("System"), "WinRTLegacy");
/// assert_eq!(mapper("SystemX"), "SystemX");
/// assert_eq!(mapper("UnityEngine"), "UnityEngine");
/// ```
pub fn support_namespace_mapper(system: &str) -> impl Fn(&str) -> String + 'static {
    let system = system.to_string();
    move |namespace: &str| match namespace.strip_prefix("System") {
        Some(rest) if rest.is_empty() || rest.starts_with('.') => format!("{system}{rest}"),
        _ => namespace.to_string(),
    }
}
