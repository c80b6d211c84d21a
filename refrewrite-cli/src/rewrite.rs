use std::io::Write;

use anyhow::Context;
use log::info;
use refrewrite::{
    metadata::provider::JsonModuleProvider,
    rewrite::{support_namespace_mapper, Diagnostics, RewriteContext, RewriteOperation},
};

use crate::app::Cli;

/// Loads the target, runs the rewrite pipeline, prints the diagnostics and writes the result
pub fn run(cli: &Cli) -> anyhow::Result<()> {
    let options = cli.rewrite_options();
    let provider = JsonModuleProvider;

    let mut ctx = RewriteContext::load(&options, &provider)
        .with_context(|| format!("Failed to set up the rewrite of {}", cli.target.display()))?;

    let mut operation = RewriteOperation::create(support_namespace_mapper(&cli.system));
    let executed = operation.execute(&mut ctx);
    report(executed, &ctx.diagnostics, &mut std::io::stdout().lock())?;

    let output = cli.output_path();
    if ctx
        .save_if_dirty(&provider, output)
        .with_context(|| format!("Failed to write {}", output.display()))?
    {
        info!(
            "{} unresolved references left in {}",
            ctx.diagnostics.len(),
            output.display()
        );
    }
    Ok(())
}

/// Prints the diagnostics collected so far, then the pipeline error if there was one
fn report(
    executed: refrewrite::Result<()>,
    diagnostics: &Diagnostics,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    for diagnostic in diagnostics.iter() {
        writeln!(out, "{diagnostic}")?;
    }
    out.flush()?;
    Ok(executed?)
}
