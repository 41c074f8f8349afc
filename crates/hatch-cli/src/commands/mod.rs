//! Subcommand implementations and the state they share.

pub mod extract;
pub mod inspect;
pub mod load;
pub mod plan;

use crate::output::{resolve_color_choice, StyledOutput};
use anyhow::Context as _;
use hatch_pm::Archive;
use hatch_runtime::{HatchConfig, Pipeline};
use std::path::Path;

/// Configuration, output and flags shared by every command
pub struct Context {
    pub pipeline: Pipeline,
    pub out: StyledOutput,
    pub verbose: bool,
}

impl Context {
    pub fn new(config: Option<&Path>, color: Option<&str>, verbose: bool) -> anyhow::Result<Self> {
        let config = match config {
            Some(path) => HatchConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => HatchConfig::default(),
        };
        Ok(Self {
            pipeline: Pipeline::new(config),
            out: StyledOutput::new(resolve_color_choice(color)),
            verbose,
        })
    }

    /// Read `path` through the pipeline's fetch step
    pub async fn open(&self, path: &Path) -> anyhow::Result<Archive> {
        let archive = self
            .pipeline
            .fetch(&path.display().to_string(), |origin| async move {
                tokio::fs::read(origin).await
            })
            .await?;
        Ok(archive)
    }
}
