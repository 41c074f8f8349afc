//! `hatch extract`: unpack an archive into a directory.

use super::Context;
use anyhow::Context as _;
use hatch_pm::Archive;
use std::path::Path;

pub fn execute(ctx: &mut Context, archive: &Path, out_dir: &Path) -> anyhow::Result<()> {
    let bytes =
        std::fs::read(archive).with_context(|| format!("failed to read {}", archive.display()))?;
    let opened = Archive::open(bytes)?;
    let extracted = opened.extract_to(out_dir)?;

    let out = &mut ctx.out;
    if ctx.verbose {
        for file in &extracted.files {
            out.plain(&format!("  {}\n", file.display()));
        }
    }
    for name in &extracted.skipped {
        out.warning("warning");
        out.plain(&format!(": skipped entry outside the output directory: {}\n", name));
    }

    out.success("Extracted");
    out.plain(&format!(
        " {} files to {}\n",
        extracted.files.len(),
        out_dir.display()
    ));
    out.flush();
    Ok(())
}
