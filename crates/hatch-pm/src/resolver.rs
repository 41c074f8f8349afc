//! Dependency resolution
//!
//! Walks the package descriptors in an archive, starting from the root
//! descriptor, and records every package reached together with its
//! dependencies and preloaded assets.
//!
//! Cycle detection is per branch: each recursive step receives its own copy
//! of the ancestor chain, so a package seen on a sibling branch is visited
//! again (diamonds are recorded once per branch) while an edge back into
//! the current chain is truncated.

use crate::archive::{Archive, ArchiveError};
use crate::descriptor::{DescriptorError, LibraryDescriptor, PackageDescriptor, RootDescriptor};
use crate::graph::DependencyGraph;
use crate::layout::ArchiveLayout;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during dependency resolution
#[derive(Debug, Error)]
pub enum ResolverError {
    /// Missing entry, unreadable archive
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Malformed descriptor
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

/// Root configuration retained from the root descriptor
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RootConfig {
    pub title: String,

    /// Source identifier (URL or free text), if declared
    pub source: Option<String>,

    pub language: Option<String>,

    pub license: Option<String>,

    pub embed_types: Vec<String>,

    /// Machine name of the entry package
    pub main_library: String,

    /// Package path of the entry package, if `main_library` names one of
    /// the root's direct dependencies
    pub main_package: Option<String>,

    /// Package paths the root depends on directly
    pub dependencies: Vec<String>,
}

/// A dependency edge skipped because it closes a cycle on its branch
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TruncatedEdge {
    pub from: String,
    pub to: String,
}

/// Outcome of a successful resolution
#[derive(Debug, Clone)]
pub struct Resolution {
    pub root: RootConfig,
    pub graph: DependencyGraph,
    pub truncated: Vec<TruncatedEdge>,
}

type VisitFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ResolverError>> + Send + 'a>>;

#[derive(Default)]
struct State {
    graph: DependencyGraph,
    truncated: Vec<TruncatedEdge>,
}

/// Dependency resolver over one archive
pub struct DependencyResolver<'a> {
    archive: &'a Archive,
    layout: ArchiveLayout,
}

impl<'a> DependencyResolver<'a> {
    /// Create a new resolver with the default archive layout
    pub fn new(archive: &'a Archive) -> Self {
        Self {
            archive,
            layout: ArchiveLayout::default(),
        }
    }

    /// Use a custom archive layout
    pub fn with_layout(mut self, layout: ArchiveLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Resolve the whole dependency graph
    ///
    /// Any missing or malformed descriptor aborts the resolution.
    pub async fn resolve(&self) -> Result<Resolution, ResolverError> {
        let root_path = self.layout.root_descriptor.as_str();
        let text = self.archive.read_text(root_path).await?;
        let root = RootDescriptor::parse(root_path, &text)?;

        let main_package = root.main_dependency().map(|dep| dep.package_path());

        let mut state = State::default();
        let mut dependencies = Vec::with_capacity(root.preloaded_dependencies.len());

        // The root is not a package: its ancestor chain starts empty.
        for dep in &root.preloaded_dependencies {
            let package_path = dep.package_path();
            let ancestors = HashSet::from([package_path.clone()]);
            self.visit(
                package_path.clone(),
                dep.machine_name.clone(),
                ancestors,
                &mut state,
            )
            .await?;
            dependencies.push(package_path);
        }

        let config = RootConfig {
            title: root.title,
            source: root.source,
            language: root.language,
            license: root.license,
            embed_types: root.embed_types,
            main_library: root.main_library,
            main_package,
            dependencies,
        };

        Ok(Resolution {
            root: config,
            graph: state.graph,
            truncated: state.truncated,
        })
    }

    /// Visit one package; `ancestors` already contains `package_path`
    fn visit<'s>(
        &'s self,
        package_path: String,
        machine_name: String,
        ancestors: HashSet<String>,
        state: &'s mut State,
    ) -> VisitFuture<'s> {
        Box::pin(async move {
            let descriptor_path = self.layout.descriptor_path(&package_path);
            let text = self.archive.read_text(&descriptor_path).await?;
            let library = LibraryDescriptor::parse(&descriptor_path, &text)?;

            let mut dependencies = Vec::with_capacity(library.preloaded_dependencies.len());
            for dep in &library.preloaded_dependencies {
                let child = dep.package_path();

                if ancestors.contains(&child) {
                    state.truncated.push(TruncatedEdge {
                        from: package_path.clone(),
                        to: child,
                    });
                    continue;
                }

                let mut chain = ancestors.clone();
                chain.insert(child.clone());
                self.visit(child.clone(), dep.machine_name.clone(), chain, &mut *state)
                    .await?;
                dependencies.push(child);
            }

            state.graph.record(PackageDescriptor {
                preloaded_scripts: library.script_paths(),
                preloaded_styles: library.style_paths(),
                package_path,
                machine_name,
                dependencies,
            });

            Ok(())
        })
    }
}
