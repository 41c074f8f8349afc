//! `hatch inspect`: show what an archive declares and what resolved.

use super::Context;
use hatch_pm::RootConfig;
use hatch_runtime::{Diagnostics, Prepared};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct Summary<'a> {
    entries: usize,
    root: &'a RootConfig,
    packages: Vec<PackageSummary<'a>>,
    content_files: usize,
    has_content_description: bool,
    diagnostics: &'a Diagnostics,
}

#[derive(Serialize)]
struct PackageSummary<'a> {
    package_path: &'a str,
    machine_name: &'a str,
    dependencies: Vec<&'a str>,
    scripts: &'a [String],
    styles: &'a [String],
    files: usize,
}

fn summarize(prepared: &Prepared, entries: usize) -> Summary<'_> {
    let packages = prepared
        .order
        .iter()
        .filter_map(|path| {
            let record = prepared.graph.get(path)?;
            Some(PackageSummary {
                package_path: path,
                machine_name: &record.machine_name,
                dependencies: prepared.graph.edges(path),
                scripts: &record.preloaded_scripts,
                styles: &record.preloaded_styles,
                files: prepared.store.package(path).map_or(0, |p| p.len()),
            })
        })
        .collect();

    Summary {
        entries,
        root: &prepared.root,
        packages,
        content_files: prepared.store.content().len(),
        has_content_description: prepared.store.content().description().is_some(),
        diagnostics: &prepared.diagnostics,
    }
}

pub async fn execute(ctx: &mut Context, archive: &Path, json: bool) -> anyhow::Result<()> {
    let opened = ctx.open(archive).await?;
    let entries = opened.len();
    let prepared = ctx.pipeline.prepare(opened).await?;
    let summary = summarize(&prepared, entries);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let out = &mut ctx.out;
    let root = summary.root;
    out.heading(&root.title);
    out.field(
        "main library",
        &format!(
            "{} ({})",
            root.main_library,
            root.main_package.as_deref().unwrap_or("unmatched")
        ),
    );
    if let Some(ref language) = root.language {
        out.field("language", language);
    }
    if let Some(ref license) = root.license {
        out.field("license", license);
    }
    if let Some(ref source) = root.source {
        out.field("source", source);
    }
    if !root.embed_types.is_empty() {
        out.field("embed types", &root.embed_types.join(", "));
    }
    out.field("entries", &summary.entries.to_string());
    out.newline();

    out.heading(&format!("Packages ({})", summary.packages.len()));
    for package in &summary.packages {
        out.info(&format!("  {}", package.package_path));
        out.plain(&format!("  {} files", package.files));
        out.newline();
        if !package.dependencies.is_empty() {
            out.plain(&format!("    depends on: {}\n", package.dependencies.join(", ")));
        }
        if !package.scripts.is_empty() {
            out.plain(&format!("    scripts:    {}\n", package.scripts.join(", ")));
        }
        if !package.styles.is_empty() {
            out.plain(&format!("    styles:     {}\n", package.styles.join(", ")));
        }
    }
    out.newline();

    out.heading("Content");
    out.field("files", &summary.content_files.to_string());
    out.field(
        "description",
        if summary.has_content_description { "present" } else { "missing" },
    );

    if !summary.diagnostics.is_empty() {
        out.newline();
        out.diagnostics(summary.diagnostics);
    }
    out.flush();
    Ok(())
}
