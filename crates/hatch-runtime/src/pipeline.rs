//! Load pipeline
//!
//! One [`Pipeline`] run takes an archive from raw bytes to an initialized
//! content runtime:
//!
//! 1. fetch the bytes (the loader is invoked exactly once)
//! 2. resolve the dependency graph and sort it
//! 3. materialize the asset store and rewrite stylesheets
//! 4. inject every style tier, then every script tier
//! 5. hand the runtime its init signal with the override adapter
//!
//! Each step finishes before the next begins. Any fatal error stops the run
//! before the runtime is initialized.

use crate::config::HatchConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::RuntimeError;
use crate::events::{EventDispatcher, EventSink};
use crate::host::{HostContext, HostError};
use crate::loader::{AssetKind, LoadPlan, OrderedLoader};
use crate::overrides::{ArchiveOverrides, RuntimeOverrides, UserDataStore};
use crate::store::AssetStore;
use hatch_pm::{Archive, DependencyGraph, DependencyResolver, RootConfig};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Everything the content runtime receives once all assets are loaded
pub struct RuntimeInit {
    pub root: RootConfig,

    /// Raw text of the content description
    pub content_json: Option<String>,

    /// Package path of the entry package, if the main library matched one
    pub main_package: Option<String>,

    pub overrides: Arc<dyn RuntimeOverrides>,
}

impl fmt::Debug for RuntimeInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeInit")
            .field("root", &self.root)
            .field("main_package", &self.main_package)
            .field("content_json", &self.content_json.as_ref().map(String::len))
            .finish_non_exhaustive()
    }
}

/// The external content runtime
pub trait ContentRuntime: Send + Sync {
    fn initialize(&self, init: RuntimeInit) -> Result<(), HostError>;
}

/// An archive resolved and materialized, ready to load
#[derive(Debug)]
pub struct Prepared {
    pub root: RootConfig,
    pub graph: DependencyGraph,

    /// Distinct package paths, dependencies first
    pub order: Vec<String>,

    pub store: AssetStore,
    pub styles: LoadPlan,
    pub scripts: LoadPlan,
    pub diagnostics: Diagnostics,
}

/// Summary of a completed load
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub root: RootConfig,
    pub order: Vec<String>,
    pub styles_loaded: usize,
    pub scripts_loaded: usize,
    pub diagnostics: Diagnostics,
}

/// Orchestrates one archive load
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: HatchConfig,
}

impl Pipeline {
    pub fn new(config: HatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HatchConfig {
        &self.config
    }

    /// Fetch the archive bytes through `loader` and open them
    pub async fn fetch<F, Fut, E>(&self, origin: &str, loader: F) -> Result<Archive, RuntimeError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Vec<u8>, E>>,
        E: fmt::Display,
    {
        let bytes = loader(origin.to_string())
            .await
            .map_err(|e| RuntimeError::Source {
                origin: origin.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Archive::open(bytes)?)
    }

    /// Resolve, sort, materialize and plan
    pub async fn prepare(&self, archive: Archive) -> Result<Prepared, RuntimeError> {
        let layout = &self.config.archive;
        let mut diagnostics = Diagnostics::new();

        let resolution = DependencyResolver::new(&archive)
            .with_layout(layout.clone())
            .resolve()
            .await?;
        if resolution.root.main_package.is_none() {
            diagnostics.push(Diagnostic::UnmatchedMainLibrary {
                main_library: resolution.root.main_library.clone(),
            });
        }
        diagnostics.extend(resolution.truncated.iter().map(|edge| {
            Diagnostic::CyclicDependency {
                from: edge.from.clone(),
                to: edge.to.clone(),
            }
        }));

        let graph = resolution.graph;
        let order = graph.topological_order();

        let mut store = AssetStore::materialize(&archive, &graph, layout, &mut diagnostics).await?;
        store.rewrite_styles(&mut diagnostics);

        let styles = LoadPlan::build(AssetKind::Style, &order, &graph, &store)?;
        let scripts = LoadPlan::build(AssetKind::Script, &order, &graph, &store)?;

        Ok(Prepared {
            root: resolution.root,
            graph,
            order,
            store,
            styles,
            scripts,
            diagnostics,
        })
    }

    /// Load every tier into `host`, then initialize `runtime`
    pub async fn run<H, R>(
        &self,
        prepared: Prepared,
        host: Arc<H>,
        runtime: &R,
        user_data: Arc<dyn UserDataStore>,
        sink: Arc<dyn EventSink>,
    ) -> Result<LoadReport, RuntimeError>
    where
        H: HostContext,
        R: ContentRuntime + ?Sized,
    {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|e| RuntimeError::Init(e.to_string()))?;

        let loader = OrderedLoader::new(host);
        let styles_loaded = loader.load_plan(&prepared.styles).await?;
        let scripts_loaded = loader.load_plan(&prepared.scripts).await?;

        let libraries = prepared
            .order
            .iter()
            .filter_map(|path| {
                prepared
                    .graph
                    .get(path)
                    .map(|record| (record.machine_name.clone(), path.clone()))
            })
            .collect();

        let content_json = prepared.store.content().description().map(str::to_string);
        let events = EventDispatcher::new(&self.config.events, sink, handle);
        let overrides = ArchiveOverrides::new(
            Arc::new(prepared.store),
            self.config.archive.content_namespace.clone(),
            libraries,
            user_data,
            events,
        );

        runtime
            .initialize(RuntimeInit {
                root: prepared.root.clone(),
                content_json,
                main_package: prepared.root.main_package.clone(),
                overrides: Arc::new(overrides),
            })
            .map_err(|e| RuntimeError::Init(e.to_string()))?;

        Ok(LoadReport {
            root: prepared.root,
            order: prepared.order,
            styles_loaded,
            scripts_loaded,
            diagnostics: prepared.diagnostics,
        })
    }

    /// Fetch, prepare and run in one call
    pub async fn load<F, Fut, E, H, R>(
        &self,
        origin: &str,
        loader: F,
        host: Arc<H>,
        runtime: &R,
        user_data: Arc<dyn UserDataStore>,
        sink: Arc<dyn EventSink>,
    ) -> Result<LoadReport, RuntimeError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Vec<u8>, E>>,
        E: fmt::Display,
        H: HostContext,
        R: ContentRuntime + ?Sized,
    {
        let archive = self.fetch(origin, loader).await?;
        let prepared = self.prepare(archive).await?;
        self.run(prepared, host, runtime, user_data, sink).await
    }
}
