//! Ordered asset loading
//!
//! A [`LoadPlan`] is the package load order filtered to the packages that
//! declare assets of one kind. Each package is a tier: tier N+1 starts only
//! after every file of tier N has loaded, while files inside a tier load
//! concurrently.

use crate::error::RuntimeError;
use crate::host::HostContext;
use crate::store::{AssetStore, Blob, ResourceHandle};
use hatch_pm::{ArchiveError, DependencyGraph};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Kind of preloaded asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Style,
    Script,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Style => f.pad("style"),
            AssetKind::Script => f.pad("script"),
        }
    }
}

/// A resource ready for injection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub kind: AssetKind,
    pub package: String,

    /// Package-relative path
    pub path: String,

    pub handle: ResourceHandle,
    pub blob: Blob,
}

/// All files of one package, in declared order
#[derive(Debug, Clone)]
pub struct LoadTier {
    pub package_path: String,
    pub assets: Vec<Asset>,
}

/// Tiers of one asset kind, in load order
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub kind: AssetKind,
    pub tiers: Vec<LoadTier>,
}

impl LoadPlan {
    /// Build the plan for `kind` following `order`
    ///
    /// Packages that declare no asset of this kind are skipped.
    pub fn build(
        kind: AssetKind,
        order: &[String],
        graph: &DependencyGraph,
        store: &AssetStore,
    ) -> Result<Self, ArchiveError> {
        let mut tiers = Vec::new();

        for package_path in order {
            let Some(record) = graph.get(package_path) else {
                continue;
            };
            let declared = match kind {
                AssetKind::Style => &record.preloaded_styles,
                AssetKind::Script => &record.preloaded_scripts,
            };
            if declared.is_empty() {
                continue;
            }

            let mut assets = Vec::with_capacity(declared.len());
            for path in declared {
                let missing = || ArchiveError::EntryNotFound(format!("{}/{}", package_path, path));
                let handle = store
                    .package(package_path)
                    .and_then(|resources| resources.handle(path))
                    .ok_or_else(missing)?;
                let blob = store.blob(handle).cloned().ok_or_else(missing)?;

                assets.push(Asset {
                    kind,
                    package: package_path.clone(),
                    path: path.clone(),
                    handle: handle.clone(),
                    blob,
                });
            }

            tiers.push(LoadTier {
                package_path: package_path.clone(),
                assets,
            });
        }

        Ok(Self { kind, tiers })
    }

    /// Number of files across all tiers
    pub fn file_count(&self) -> usize {
        self.tiers.iter().map(|tier| tier.assets.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

/// Feeds load plans to a host, tier by tier
pub struct OrderedLoader<H> {
    host: Arc<H>,
}

impl<H: HostContext> OrderedLoader<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self { host }
    }

    /// Load every tier of a plan; returns the number of files loaded
    ///
    /// A script error stops the chain after the failing tier settles. Tiers
    /// that already loaded stay loaded.
    pub async fn load_plan(&self, plan: &LoadPlan) -> Result<usize, RuntimeError> {
        match plan.kind {
            AssetKind::Style => self.load_styles(plan),
            AssetKind::Script => self.load_scripts(plan).await,
        }
    }

    fn load_styles(&self, plan: &LoadPlan) -> Result<usize, RuntimeError> {
        let mut loaded = 0;
        for asset in plan.tiers.iter().flat_map(|tier| &tier.assets) {
            self.host.inject_style(asset)?;
            loaded += 1;
        }
        Ok(loaded)
    }

    async fn load_scripts(&self, plan: &LoadPlan) -> Result<usize, RuntimeError> {
        let mut loaded = 0;

        for tier in &plan.tiers {
            let mut set = JoinSet::new();
            for asset in tier.assets.iter().cloned() {
                let host = Arc::clone(&self.host);
                set.spawn(async move {
                    let path = asset.path.clone();
                    let result = host.inject_script(asset).await;
                    (path, result)
                });
            }

            let mut failure = None;
            while let Some(joined) = set.join_next().await {
                let (path, reason) = match joined {
                    Ok((_, Ok(()))) => {
                        loaded += 1;
                        continue;
                    }
                    Ok((path, Err(e))) => (path, e.to_string()),
                    // The host task panicked; its path is lost with it
                    Err(e) => ("<unknown>".to_string(), e.to_string()),
                };
                failure.get_or_insert(RuntimeError::ScriptLoad {
                    package: tier.package_path.clone(),
                    path,
                    reason,
                });
            }

            if let Some(error) = failure {
                return Err(error);
            }
        }

        Ok(loaded)
    }
}
