//! `hatch plan`: print the load order and every tier without loading.

use super::Context;
use hatch_runtime::LoadPlan;
use std::path::Path;

pub async fn execute(ctx: &mut Context, archive: &Path) -> anyhow::Result<()> {
    let opened = ctx.open(archive).await?;
    let prepared = ctx.pipeline.prepare(opened).await?;
    let out = &mut ctx.out;

    out.heading("Order");
    for (i, path) in prepared.order.iter().enumerate() {
        out.plain(&format!("  {:>2}. {}\n", i + 1, path));
    }
    out.newline();

    print_plan(ctx, "Styles", &prepared.styles);
    print_plan(ctx, "Scripts", &prepared.scripts);

    let out = &mut ctx.out;
    if !prepared.diagnostics.is_empty() {
        out.diagnostics(&prepared.diagnostics);
    }
    out.flush();
    Ok(())
}

fn print_plan(ctx: &mut Context, title: &str, plan: &LoadPlan) {
    let out = &mut ctx.out;
    out.heading(&format!(
        "{} ({} files in {} tiers)",
        title,
        plan.file_count(),
        plan.tiers.len()
    ));
    for tier in &plan.tiers {
        out.info(&format!("  {}\n", tier.package_path));
        for asset in &tier.assets {
            out.plain(&format!("    {}", asset.path));
            if ctx.verbose {
                out.plain(&format!("  {}", asset.handle));
            }
            out.newline();
        }
    }
    out.newline();
}
