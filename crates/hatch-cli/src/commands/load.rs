//! `hatch load`: run the whole pipeline against a recording host.
//!
//! Nothing is executed; the host records each injection so the order the
//! assets would reach a real page can be checked from the terminal.

use super::Context;
use hatch_runtime::{MemoryUserData, RecordingHost, RecordingRuntime, RecordingSink};
use std::path::Path;
use std::sync::Arc;

pub async fn execute(ctx: &mut Context, archive: &Path) -> anyhow::Result<()> {
    let opened = ctx.open(archive).await?;
    let prepared = ctx.pipeline.prepare(opened).await?;

    let host = Arc::new(RecordingHost::new());
    let runtime = RecordingRuntime::new();
    let report = ctx
        .pipeline
        .run(
            prepared,
            Arc::clone(&host),
            &runtime,
            Arc::new(MemoryUserData::new()),
            Arc::new(RecordingSink::new()),
        )
        .await?;

    let out = &mut ctx.out;
    if ctx.verbose {
        for injection in host.injections() {
            out.info(&format!("  {:<6}", injection.kind));
            out.plain(&format!(
                " {}/{}  {}\n",
                injection.package, injection.path, injection.handle
            ));
        }
        out.newline();
    }

    if !report.diagnostics.is_empty() {
        out.diagnostics(&report.diagnostics);
    }

    let init = runtime.take_init();
    out.success("Loaded");
    out.plain(&format!(
        " {} styles and {} scripts across {} packages\n",
        report.styles_loaded,
        report.scripts_loaded,
        report.order.len()
    ));
    if let Some(init) = init {
        out.success("Initialized");
        out.plain(&format!(
            " {} ({})\n",
            init.main_package.as_deref().unwrap_or("no entry package"),
            report.root.title
        ));
    }
    out.flush();
    Ok(())
}
