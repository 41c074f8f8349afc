//! Virtual asset store
//!
//! Every archive entry the content runtime may ask for is materialized here
//! as an in-memory blob behind an opaque [`ResourceHandle`]. Handles are
//! content-addressed (SHA-256 of the bytes), so identical files share one
//! blob and the same bytes always get the same handle.
//!
//! Two passes fill the store:
//! - the content pass maps content-relative paths to handles, keeping the
//!   content description as raw text
//! - the package pass maps each package's relative paths to handles, holding
//!   declared stylesheets as text until [`AssetStore::rewrite_styles`] runs

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::mime::mime_for_path;
use crate::stylesheet::rewrite_stylesheet;
use hatch_pm::{
    normalize_path, Archive, ArchiveError, ArchiveLayout, DependencyGraph, EntryPattern,
    PackageDescriptor,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::hash_map::Entry as MapEntry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Opaque, addressable handle to a blob (`hatch:<sha256 hex>`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResourceHandle(String);

impl ResourceHandle {
    /// Scheme prefix of every handle
    pub const SCHEME: &'static str = "hatch:";

    /// Handle for the given bytes
    pub fn for_bytes(bytes: &[u8]) -> Self {
        let checksum: [u8; 32] = Sha256::digest(bytes).into();
        Self(format!("{}{}", Self::SCHEME, hex::encode(checksum)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bytes behind a handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// MIME type, if the file extension was recognized
    pub mime: Option<String>,
    pub bytes: Arc<[u8]>,
}

impl Blob {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Contents as UTF-8 text, if valid
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

/// A package file: a handle, or stylesheet text awaiting rewriting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Handle(ResourceHandle),
    Text(String),
}

impl Resource {
    pub fn handle(&self) -> Option<&ResourceHandle> {
        match self {
            Resource::Handle(handle) => Some(handle),
            Resource::Text(_) => None,
        }
    }
}

/// Files of one package, keyed by package-relative path
#[derive(Debug, Clone, Default)]
pub struct PackageResources {
    files: BTreeMap<String, Resource>,
    loaded_scripts: BTreeSet<String>,
}

impl PackageResources {
    pub fn get(&self, path: &str) -> Option<&Resource> {
        self.files.get(path)
    }

    /// Handle of a file, if it has one
    pub fn handle(&self, path: &str) -> Option<&ResourceHandle> {
        self.files.get(path).and_then(Resource::handle)
    }

    /// All files, sorted by path
    pub fn files(&self) -> impl Iterator<Item = (&str, &Resource)> {
        self.files.iter().map(|(path, res)| (path.as_str(), res))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Check if a path is one of the package's declared scripts
    pub fn is_loaded_script(&self, path: &str) -> bool {
        self.loaded_scripts.contains(path)
    }

    /// Number of stylesheets still held as text
    pub fn pending_styles(&self) -> usize {
        self.files
            .values()
            .filter(|res| matches!(res, Resource::Text(_)))
            .count()
    }
}

/// Content files, keyed by path relative to the content namespace
#[derive(Debug, Clone, Default)]
pub struct ContentMap {
    description: Option<String>,
    files: BTreeMap<String, ResourceHandle>,
}

impl ContentMap {
    /// Raw text of the content description, if the archive has one
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn resolve(&self, path: &str) -> Option<&ResourceHandle> {
        self.files.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResourceHandle)> {
        self.files.iter().map(|(path, handle)| (path.as_str(), handle))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// In-memory store of every addressable resource of one load
#[derive(Debug, Clone, Default)]
pub struct AssetStore {
    blobs: HashMap<ResourceHandle, Blob>,
    content: ContentMap,
    packages: BTreeMap<String, PackageResources>,
}

impl AssetStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize the content namespace and every package in the graph
    ///
    /// Fails if an entry cannot be read or a declared script or stylesheet
    /// is missing from its package. Text that is not valid UTF-8 is decoded
    /// lossily.
    pub async fn materialize(
        archive: &Archive,
        graph: &DependencyGraph,
        layout: &ArchiveLayout,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self, ArchiveError> {
        let mut store = Self::new();
        store.load_content(archive, layout, diagnostics).await?;

        for package_path in graph.package_paths() {
            if let Some(record) = graph.get(package_path) {
                store.load_package(archive, record).await?;
            }
        }

        Ok(store)
    }

    /// Register bytes and return their handle
    ///
    /// Registering the same bytes twice returns the same handle; an untyped
    /// blob picks up the first MIME type registered for it afterwards.
    pub fn register(&mut self, bytes: impl Into<Arc<[u8]>>, mime: Option<&str>) -> ResourceHandle {
        let bytes: Arc<[u8]> = bytes.into();
        let handle = ResourceHandle::for_bytes(&bytes);

        match self.blobs.entry(handle.clone()) {
            MapEntry::Occupied(mut entry) => {
                if entry.get().mime.is_none() {
                    entry.get_mut().mime = mime.map(str::to_string);
                }
            }
            MapEntry::Vacant(entry) => {
                entry.insert(Blob {
                    mime: mime.map(str::to_string),
                    bytes,
                });
            }
        }

        handle
    }

    pub fn blob(&self, handle: &ResourceHandle) -> Option<&Blob> {
        self.blobs.get(handle)
    }

    /// Number of distinct blobs
    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    pub fn content(&self) -> &ContentMap {
        &self.content
    }

    pub fn package(&self, package_path: &str) -> Option<&PackageResources> {
        self.packages.get(package_path)
    }

    /// All packages, sorted by package path
    pub fn packages(&self) -> impl Iterator<Item = (&str, &PackageResources)> {
        self.packages.iter().map(|(path, res)| (path.as_str(), res))
    }

    /// Rewrite every stylesheet still held as text and replace it by a handle
    pub fn rewrite_styles(&mut self, diagnostics: &mut Diagnostics) {
        let mut rewritten = Vec::new();

        for (package_path, resources) in &self.packages {
            for (path, resource) in &resources.files {
                let Resource::Text(css) = resource else {
                    continue;
                };

                let rewrite = rewrite_stylesheet(css, package_path, path, |target| {
                    resources.handle(target).map(|handle| handle.to_string())
                });
                diagnostics.extend(rewrite.unresolved.into_iter().map(|reference| {
                    Diagnostic::UnresolvedStylesheetReference {
                        package: package_path.clone(),
                        stylesheet: path.clone(),
                        reference,
                    }
                }));
                rewritten.push((package_path.clone(), path.clone(), rewrite.text));
            }
        }

        for (package_path, path, text) in rewritten {
            let handle = self.register(text.into_bytes(), Some("text/css"));
            if let Some(resources) = self.packages.get_mut(&package_path) {
                resources.files.insert(path, Resource::Handle(handle));
            }
        }
    }

    async fn load_content(
        &mut self,
        archive: &Archive,
        layout: &ArchiveLayout,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), ArchiveError> {
        let pattern = EntryPattern::Prefix(layout.content_namespace.clone());
        let names = archive
            .list_entries(&pattern)
            .into_iter()
            .map(|entry| entry.name)
            .collect();

        for (name, bytes) in read_all(archive, names).await? {
            let Some(relative) = layout.content_relative(&name) else {
                continue;
            };
            let relative = normalize_path(relative);

            if relative == layout.content_descriptor {
                self.content.description = Some(String::from_utf8_lossy(&bytes).into_owned());
                continue;
            }

            let mime = mime_for_path(&relative);
            if mime.is_none() {
                diagnostics.push(Diagnostic::UnknownMimeType { path: name });
            }
            let handle = self.register(bytes, mime);
            self.content.files.insert(relative, handle);
        }

        Ok(())
    }

    async fn load_package(
        &mut self,
        archive: &Archive,
        record: &PackageDescriptor,
    ) -> Result<(), ArchiveError> {
        let prefix = format!("{}/", record.package_path);
        let names = archive
            .list_entries(&EntryPattern::Prefix(prefix.clone()))
            .into_iter()
            .map(|entry| entry.name)
            .collect();

        let mut resources = PackageResources::default();
        for (name, bytes) in read_all(archive, names).await? {
            let relative = normalize_path(&name[prefix.len()..]);

            if record.preloaded_scripts.contains(&relative) {
                let handle = self.register(bytes, Some("text/javascript"));
                resources.loaded_scripts.insert(relative.clone());
                resources.files.insert(relative, Resource::Handle(handle));
            } else if record.preloaded_styles.contains(&relative) {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                resources.files.insert(relative, Resource::Text(text));
            } else {
                let handle = self.register(bytes, mime_for_path(&relative));
                resources.files.insert(relative, Resource::Handle(handle));
            }
        }

        let declared = record
            .preloaded_scripts
            .iter()
            .chain(&record.preloaded_styles);
        for path in declared {
            if !resources.files.contains_key(path) {
                return Err(ArchiveError::EntryNotFound(format!("{}{}", prefix, path)));
            }
        }

        self.packages.insert(record.package_path.clone(), resources);
        Ok(())
    }
}

/// Read entries concurrently, returning them in the requested order
async fn read_all(
    archive: &Archive,
    names: Vec<String>,
) -> Result<Vec<(String, Vec<u8>)>, ArchiveError> {
    let mut set = JoinSet::new();
    let count = names.len();

    for (index, name) in names.into_iter().enumerate() {
        let archive = archive.clone();
        set.spawn(async move {
            let bytes = archive.read_bytes(&name).await;
            (index, name, bytes)
        });
    }

    let mut slots: Vec<Option<(String, Vec<u8>)>> = (0..count).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        let (index, name, bytes) = joined.map_err(|e| ArchiveError::Task(e.to_string()))?;
        slots[index] = Some((name, bytes?));
    }

    Ok(slots.into_iter().flatten().collect())
}
