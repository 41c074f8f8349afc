//! Hatch Package Library
//!
//! This crate turns a content archive into a resolved package graph:
//! - Archive access (zip container, lazy entry reads)
//! - Descriptor parsing (root `h5p.json`, per-package `library.json`)
//! - Dependency graph construction with per-branch cycle truncation
//! - Topological load ordering

pub mod archive;
pub mod descriptor;
pub mod graph;
pub mod layout;
pub mod resolver;

pub use archive::{Archive, ArchiveError, Entry, EntryData, EntryPattern, Extracted, ReadMode};
pub use descriptor::{
    DescriptorError, FileRef, LibraryDescriptor, LibraryRef, PackageDescriptor, RootDescriptor,
};
pub use graph::DependencyGraph;
pub use layout::{normalize_path, ArchiveLayout};
pub use resolver::{DependencyResolver, Resolution, ResolverError, RootConfig, TruncatedEdge};
